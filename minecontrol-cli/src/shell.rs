use crossterm::tty::IsTty;
use rustyline_async::{Readline, ReadlineError, SharedWriter};
use std::io::{BufRead, Lines, Stderr, StdinLock, Stdout, Write};

pub struct ShellRead {
    prompt: String,
    inner: ShellReadInner,
}

pub struct ShellWrite {
    inner: ShellWriteInner,
}

enum ShellReadInner {
    Interactive(Readline, SharedWriter),
    Stream(Lines<StdinLock<'static>>),
}

enum ShellWriteInner {
    Interactive(SharedWriter),
    Stream(Stdout, Stderr),
}

/// Uses an interactive prompt with history when stdout is a terminal, plain stdin lines otherwise.
pub fn new_shell(prompt: String, disable_interactive: bool) -> (ShellRead, ShellWrite) {
    if !disable_interactive && std::io::stdout().is_tty() {
        match Readline::new(prompt.clone()) {
            Ok((read_line, writer)) => {
                return (
                    ShellRead {
                        prompt,
                        inner: ShellReadInner::Interactive(read_line, writer.clone()),
                    },
                    ShellWrite {
                        inner: ShellWriteInner::Interactive(writer),
                    },
                )
            }
            Err(err) => log::warn!("Falling back to plain input: {:?}", err),
        }
    }

    (
        ShellRead {
            prompt,
            inner: ShellReadInner::Stream(std::io::stdin().lock().lines()),
        },
        ShellWrite {
            inner: ShellWriteInner::Stream(std::io::stdout(), std::io::stderr()),
        },
    )
}

impl ShellRead {
    /// Blocks until the next line. `None` once input is exhausted.
    pub fn read_line(&mut self) -> Option<String> {
        match &mut self.inner {
            ShellReadInner::Interactive(read, writer) => {
                let line = match futures::executor::block_on(read.readline()) {
                    Ok(line) => line,
                    Err(ReadlineError::IO(err)) => {
                        eprintln!("An error occurred: {}", err);
                        return None;
                    }
                    Err(ReadlineError::Eof | ReadlineError::Closed) => return None,
                    Err(ReadlineError::Interrupted) => proc_exit::Code::SIGINT.process_exit(),
                };

                read.add_history_entry(line.clone());

                if let Err(err) = writeln!(writer, "{}{}", self.prompt, line) {
                    log::debug!("Could not echo input line: {}", err);
                }

                Some(line)
            }
            ShellReadInner::Stream(stream) => match stream.next() {
                Some(Ok(line)) => Some(line),
                Some(Err(err)) => {
                    eprintln!("An error occurred: {}", err);
                    None
                }
                None => None,
            },
        }
    }
}

impl ShellWrite {
    pub fn out(&mut self) -> &mut dyn Write {
        match &mut self.inner {
            ShellWriteInner::Interactive(writer) => writer,
            ShellWriteInner::Stream(stdout, _) => stdout,
        }
    }

    pub fn err(&mut self) -> &mut dyn Write {
        match &mut self.inner {
            ShellWriteInner::Interactive(writer) => writer,
            ShellWriteInner::Stream(_, stderr) => stderr,
        }
    }
}

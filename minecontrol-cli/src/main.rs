use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ansi_term::Colour::{Fixed, Green, Yellow};
use clap::{Args, Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use minecontrol_rcon::{AsyncClient, Client};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

mod config;
mod players;
mod server;
mod shell;

use crate::config::{ServerSettings, Settings};

#[derive(Parser, Debug)]
#[clap(name = "minecontrol", author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// The IP address or domain name of the server to connect to [default: 127.0.0.1]
    #[clap(short, long, global = true)]
    pub address: Option<String>,

    /// The RCON port of the server [default: 25566]
    #[clap(short, long, global = true)]
    pub port: Option<u16>,

    /// The RCON password needed to connect to the server. Prompted for when not set here or in
    /// the config file.
    #[clap(short = 'P', long, global = true)]
    pub password: Option<String>,

    /// Config file to read instead of `minecontrol.json` in the working directory
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Set verbose mode
    #[clap(long, global = true)]
    pub verbose: bool,

    /// Reject response packets whose padding bytes are not null
    #[clap(long, global = true)]
    pub strict_padding: bool,

    /// Give up on the server after this long, e.g. `5s` [default: wait forever]
    #[clap(long, global = true, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the provided command on the server, then exit
    Run {
        /// The command and its arguments, e.g. `time set 0`
        #[clap(required = true)]
        command: Vec<String>,
    },

    /// Open a REPL for your Minecraft server
    Repl {
        /// Read commands line by line instead of using an interactive prompt
        #[clap(long)]
        plain: bool,
    },

    /// Create an HTTP server for the REST API and GUI
    Server(ServerArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Port to run the REST server on [default: 7767]
    #[clap(long)]
    pub server_port: Option<u16>,

    /// HTTP basic auth username that the REST server will require
    #[clap(long)]
    pub server_username: Option<String>,

    /// HTTP basic auth password that the REST server will require
    #[clap(long)]
    pub server_password: Option<String>,

    /// Directory of static files served under `/gui/` [default: gui/assets]
    #[clap(long)]
    pub assets: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let loaded = match config::load(cli.global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{}", err);
            proc_exit::Code::FAILURE.process_exit();
        }
    };
    let mut settings = Settings::resolve(&cli.global, &loaded.file);

    let level = if settings.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("Could not set up logging: {}", err);
    }

    match &loaded.source {
        Some(path) => debug!("Loaded configuration from {}", path.display()),
        None => info!("No config file found, using default values."),
    }

    if settings.password.is_none() {
        settings.password = Some(prompt_password());
    }

    match cli.command {
        Command::Run { command } => run_command(&settings, &command.join(" ")),
        Command::Repl { plain } => run_repl(&settings, plain),
        Command::Server(args) => {
            let server_settings = ServerSettings::resolve(&args, &loaded.file);
            run_server(&settings, server_settings)
        }
    }
}

fn prompt_password() -> String {
    print!("Enter RCON password: ");
    if let Err(err) = std::io::stdout().flush() {
        debug!("Could not flush stdout: {}", err);
    }

    match rpassword::read_password() {
        Ok(password) => password,
        Err(err) => {
            error!("Could not read password: {}", err);
            proc_exit::Code::FAILURE.process_exit();
        }
    }
}

fn connect(settings: &Settings) -> Client {
    let password = settings.password.as_deref().unwrap_or_default();

    match Client::connect_with(settings.target(), password, settings.options) {
        Ok(client) => client,
        Err(err) => {
            error!(
                "Could not connect to RCON server at {}: {}",
                settings.target_string(),
                report(&err)
            );
            proc_exit::Code::FAILURE.process_exit();
        }
    }
}

/// Connects, runs a single command, prints its output and exits.
fn run_command(settings: &Settings, command: &str) {
    let client = connect(settings);

    info!("Executing command: {}", command);
    let result = client.execute(command);
    client.close();

    match result {
        Ok(output) => println!("{}", output),
        Err(err) => {
            error!("FATAL: {}", report(&err));
            proc_exit::Code::FAILURE.process_exit();
        }
    }
}

fn run_repl(settings: &Settings, plain: bool) {
    let client = connect(settings);

    info!(
        "Connected. Type \"exit\" to quit, \"!help\" for builtins. {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let prompt = format!("{}> ", Fixed(10).paint(settings.target_string()));
    let (mut read, mut write) = shell::new_shell(prompt, plain);

    while let Some(line) = read.read_line() {
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "!help" => print_help(&mut write),
            command => match client.execute(command) {
                Ok(output) => {
                    let _ = writeln!(write.out(), "{}", output);
                }
                Err(err) => {
                    let _ = writeln!(write.err(), "FATAL: {}", report(&err));
                }
            },
        }
    }

    client.close();
}

fn print_help(write: &mut shell::ShellWrite) {
    let out = write.out();
    let _ = writeln!(
        out,
        "{} {}",
        Green.paint(env!("CARGO_PKG_NAME")),
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", Yellow.paint("BUILTINS"));
    let _ = writeln!(out, "    !help                View this help listing");
    let _ = writeln!(out, "    exit, quit           Close the connection and leave");
    let _ = writeln!(
        out,
        "    {}  Run a command on the server",
        Green.paint("<COMMAND> [ARGS...]")
    );
}

fn run_server(settings: &Settings, server_settings: ServerSettings) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Could not start async runtime: {}", err);
            proc_exit::Code::FAILURE.process_exit();
        }
    };

    let result = runtime.block_on(async {
        let password = settings.password.as_deref().unwrap_or_default();
        let client =
            match AsyncClient::connect_with(settings.target(), password, settings.options).await {
                Ok(client) => client,
                Err(err) => {
                    error!(
                        "Could not connect to RCON server at {}: {}",
                        settings.target_string(),
                        report(&err)
                    );
                    proc_exit::Code::FAILURE.process_exit();
                }
            };

        let state = Arc::new(server::AppState {
            rcon: Arc::new(client),
            target: settings.target_string(),
            credentials: server_settings.credentials.clone(),
        });
        server::serve(server_settings.port, state, &server_settings.assets).await
    });

    if let Err(err) = result {
        error!("HTTP server failed: {}", err);
        proc_exit::Code::FAILURE.process_exit();
    }
}

/// Formats an error followed by its chain of causes.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

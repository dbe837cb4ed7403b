//! Blocking Client Tests
//!
//! Each test runs a scripted RCON server on a local port in a background thread.

use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minecontrol_rcon::{Client, ErrorKind, Options, Packet, PacketType, PaddingMode};

const PASSWORD: &str = "hunter2";

// =============================================================================
// Fake server
// =============================================================================

/// Accepts one connection and answers the login. A correct password is answered with a command
/// packet echoing the request id; a wrong one with id -1.
fn accept_and_login(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().unwrap();
    let login = Packet::decode(&mut stream, PaddingMode::Strict).unwrap();
    assert_eq!(login.packet_type(), PacketType::Login);

    let id = if login.payload() == PASSWORD.as_bytes() {
        login.request_id()
    } else {
        -1
    };
    Packet::new(id, PacketType::Command, "")
        .unwrap()
        .encode(&mut stream)
        .unwrap();
    stream
}

/// Starts a server that answers every command with `reply(command)`, until the client hangs up.
/// Returns the commands it received.
fn serve<F>(reply: F) -> (SocketAddr, JoinHandle<Vec<String>>)
where
    F: Fn(&str) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut stream = accept_and_login(&listener);
        let mut received = Vec::new();

        loop {
            let request = match Packet::decode(&mut stream, PaddingMode::Strict) {
                Ok(request) => request,
                Err(err) if err.kind() == ErrorKind::TruncatedStream => break,
                Err(err) => panic!("server failed to decode request: {}", err),
            };
            assert_eq!(request.packet_type(), PacketType::Command);

            let command = request.payload_text().into_owned();
            Packet::new(request.request_id(), PacketType::Response, reply(&command))
                .unwrap()
                .encode(&mut stream)
                .unwrap();
            received.push(command);
        }

        received
    });

    (addr, handle)
}

// =============================================================================
// Handshake
// =============================================================================

#[test]
fn test_connect_and_list_players() {
    let (addr, server) = serve(|command| match command {
        "/list" => "There are 2 of a max of 20 players online: alice, bob".to_string(),
        _ => String::new(),
    });

    let client = Client::connect(addr, PASSWORD).unwrap();
    assert!(client.is_authenticated());
    assert_eq!(client.peer_addr(), addr);

    let output = client.execute("/list").unwrap();
    assert_eq!(output, "There are 2 of a max of 20 players online: alice, bob");

    client.close();
    assert_eq!(server.join().unwrap(), vec!["/list".to_string()]);
}

#[test]
fn test_wrong_password_fails_authentication() {
    let (addr, _server) = serve(|_| String::new());

    let err = Client::connect(addr, "not the password").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
}

#[test]
fn test_client_is_unusable_after_failed_authentication() {
    let (addr, server) = serve(|_| String::new());

    let client = Client::open(addr).unwrap();
    let err = client.authenticate("not the password").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    assert!(!client.is_authenticated());

    let err = client.execute("/list").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    let err = client.authenticate(PASSWORD).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    // The socket was closed, so the server sees the end of the stream.
    assert!(server.join().unwrap().is_empty());
}

#[test]
fn test_login_answered_with_wrong_type_fails_authentication() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let login = Packet::decode(&mut stream, PaddingMode::Strict).unwrap();
        Packet::new(login.request_id(), PacketType::Login, "")
            .unwrap()
            .encode(&mut stream)
            .unwrap();
    });

    let err = Client::connect(addr, PASSWORD).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
    server.join().unwrap();
}

#[test]
fn test_connection_refused() {
    // Bind then drop to find a port nothing listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let err = Client::connect(addr, PASSWORD).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
}

#[test]
fn test_server_hanging_up_during_login() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        Packet::decode(&mut stream, PaddingMode::Strict).unwrap();
        // Half a packet, then hang up.
        stream.write_all(&14i32.to_le_bytes()).unwrap();
        stream.write_all(&[1, 0]).unwrap();
    });

    let err = Client::connect(addr, PASSWORD).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TruncatedStream);
    server.join().unwrap();
}

// =============================================================================
// Execution
// =============================================================================

#[test]
fn test_execute_before_authentication() {
    let (addr, server) = serve(|_| String::new());

    let client = Client::open(addr).unwrap();
    let err = client.execute("/list").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    client.authenticate(PASSWORD).unwrap();
    client.authenticate(PASSWORD).unwrap();
    client.execute("/list").unwrap();

    client.close();
    assert_eq!(server.join().unwrap(), vec!["/list".to_string()]);
}

#[test]
fn test_execute_after_close_does_no_io() {
    let (addr, server) = serve(|command| command.to_uppercase());

    let client = Client::connect(addr, PASSWORD).unwrap();
    assert_eq!(client.execute("say hi").unwrap(), "SAY HI");

    client.close();
    client.close();

    for _ in 0..3 {
        let err = client.execute("say again").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    assert_eq!(server.join().unwrap(), vec!["say hi".to_string()]);
}

#[test]
fn test_commands_run_in_order() {
    let (addr, server) = serve(|command| format!("ran {}", command));
    let client = Client::connect(addr, PASSWORD).unwrap();

    for i in 0..10 {
        let command = format!("say {}", i);
        assert_eq!(client.execute(&command).unwrap(), format!("ran {}", command));
    }

    client.close();
    assert_eq!(server.join().unwrap().len(), 10);
}

#[test]
fn test_concurrent_commands_never_interleave() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut stream = accept_and_login(&listener);
        let mut count = 0;

        loop {
            let request = match Packet::decode(&mut stream, PaddingMode::Strict) {
                Ok(request) => request,
                Err(_) => break,
            };

            // Give any other writer the chance to misbehave, then check nothing arrived before
            // this request was answered.
            thread::sleep(Duration::from_millis(5));
            stream.set_nonblocking(true).unwrap();
            let mut probe = [0u8; 1];
            match stream.peek(&mut probe) {
                Err(err) if err.kind() == IoErrorKind::WouldBlock => {}
                other => panic!("request written before previous response: {:?}", other),
            }
            stream.set_nonblocking(false).unwrap();

            Packet::new(request.request_id(), PacketType::Response, request.payload())
                .unwrap()
                .encode(&mut stream)
                .unwrap();
            count += 1;
        }

        count
    });

    let client = Arc::new(Client::connect(addr, PASSWORD).unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let client = Arc::clone(&client);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..10 {
                    let command = format!("say {}-{}", worker, i);
                    assert_eq!(client.execute(&command).unwrap(), command);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    client.close();
    assert_eq!(server.join().unwrap(), 40);
}

#[test]
fn test_only_first_packet_of_response_is_read() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut stream = accept_and_login(&listener);

        let first = Packet::decode(&mut stream, PaddingMode::Strict).unwrap();
        for part in ["part one, ", "part two"] {
            Packet::new(first.request_id(), PacketType::Response, part)
                .unwrap()
                .encode(&mut stream)
                .unwrap();
        }

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let client = Client::connect(addr, PASSWORD).unwrap();
    assert_eq!(client.execute("help").unwrap(), "part one, ");

    client.close();
    server.join().unwrap();
}

#[test]
fn test_oversized_command_is_rejected_without_io() {
    let (addr, server) = serve(|_| String::new());
    let client = Client::connect(addr, PASSWORD).unwrap();

    let err = client.execute(&"a".repeat(2000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
    assert!(client.is_authenticated());

    client.close();
    assert!(server.join().unwrap().is_empty());
}

#[test]
fn test_strict_padding_rejects_response() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut stream = accept_and_login(&listener);

        let request = Packet::decode(&mut stream, PaddingMode::Strict).unwrap();
        let mut bytes = Vec::new();
        Packet::new(request.request_id(), PacketType::Response, "ok")
            .unwrap()
            .encode(&mut bytes)
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 7;
        stream.write_all(&bytes).unwrap();

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let options = Options::default().padding(PaddingMode::Strict);
    let client = Client::connect_with(addr, PASSWORD, options).unwrap();

    let err = client.execute("list").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedPacket);
    // A failed command does not log the client out.
    assert!(client.is_authenticated());

    client.close();
    server.join().unwrap();
}

#[test]
fn test_io_timeout_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let mut stream = accept_and_login(&listener);
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let options = Options::default().io_timeout(Duration::from_millis(100));
    let client = Client::connect_with(addr, PASSWORD, options).unwrap();

    let err = client.execute("list").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadFailed);

    client.close();
    server.join().unwrap();
}

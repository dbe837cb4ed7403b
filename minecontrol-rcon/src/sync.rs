use std::io::{BufReader, BufWriter};
use std::mem;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;

use crate::packet::{self, Packet, PacketType, AUTH_FAILURE_ID};
use crate::{Options, RconError};

/// Connects to an RCON server and logs in. Shorthand for [`Client::connect`].
pub fn connect<A: ToSocketAddrs>(addr: A, password: &str) -> crate::Result<Client> {
    Client::connect(addr, password)
}

/// A blocking RCON client.
///
/// All methods take `&self`; the client can be shared between threads (for example behind an
/// [`Arc`](std::sync::Arc)) and commands from different threads are run one after the other.
#[derive(Debug)]
pub struct Client {
    state: Mutex<State>,
    peer_addr: SocketAddr,
    options: Options,
}

#[derive(Debug)]
enum State {
    Unauthenticated(Connection),
    Authenticated(Connection),
    Closed,
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Opens a connection without logging in. [`Client::execute`] fails with
    /// [`ErrorKind::NotConnected`](crate::ErrorKind::NotConnected) until
    /// [`Client::authenticate`] succeeds.
    pub fn open<A: ToSocketAddrs>(addr: A) -> crate::Result<Self> {
        Self::open_with(addr, Options::default())
    }

    pub fn open_with<A: ToSocketAddrs>(addr: A, options: Options) -> crate::Result<Self> {
        let stream = dial(addr, options.io_timeout).map_err(RconError::ConnectionFailed)?;
        let peer_addr = stream.peer_addr().map_err(RconError::ConnectionFailed)?;
        let connection = Connection::new(stream, options.io_timeout)?;

        debug!("Opened RCON connection to {}", peer_addr);

        Ok(Client {
            state: Mutex::new(State::Unauthenticated(connection)),
            peer_addr,
            options,
        })
    }

    /// Connects to an RCON server and logs in with `password`.
    ///
    /// # Example
    /// ```rust,no_run
    /// use minecontrol_rcon::{Client, ErrorKind};
    ///
    /// match Client::connect(("localhost", 25575), "password123") {
    ///     Ok(client) => println!("{}", client.execute("/list").unwrap()),
    ///     Err(err) if err.kind() == ErrorKind::AuthenticationFailed => eprintln!("Wrong password."),
    ///     Err(err) => eprintln!("Connection failed: {}", err),
    /// }
    /// ```
    pub fn connect<A: ToSocketAddrs>(addr: A, password: &str) -> crate::Result<Self> {
        Self::connect_with(addr, password, Options::default())
    }

    pub fn connect_with<A: ToSocketAddrs>(
        addr: A,
        password: &str,
        options: Options,
    ) -> crate::Result<Self> {
        let client = Self::open_with(addr, options)?;
        client.authenticate(password)?;
        Ok(client)
    }

    /// Logs in. On any failure the connection is closed and the client can no longer be used.
    pub fn authenticate(&self, password: &str) -> crate::Result<()> {
        let mut state = self.state.lock();

        let mut connection = match mem::replace(&mut *state, State::Closed) {
            State::Unauthenticated(connection) => connection,
            authenticated @ State::Authenticated(_) => {
                *state = authenticated;
                return Ok(());
            }
            State::Closed => return Err(RconError::NotConnected.into()),
        };

        let response = connection.exchange(
            packet::request(PacketType::Login, password)?,
            &self.options,
        )?;

        // Servers answer a successful login with a command packet, not a login packet.
        if response.request_id() == AUTH_FAILURE_ID
            || response.packet_type() != PacketType::Command
        {
            info!("RCON server at {} rejected the login", self.peer_addr);
            return Err(RconError::AuthenticationFailed.into());
        }

        *state = State::Authenticated(connection);
        debug!("Authenticated with {}", self.peer_addr);
        Ok(())
    }

    /// Runs a command and returns its output.
    ///
    /// Only the first packet of the response is read; output a server splits over several
    /// packets is cut short.
    pub fn execute(&self, command: &str) -> crate::Result<String> {
        let mut state = self.state.lock();

        let connection = match &mut *state {
            State::Authenticated(connection) => connection,
            State::Unauthenticated(_) | State::Closed => {
                return Err(RconError::NotConnected.into())
            }
        };

        let response = connection.exchange(
            packet::request(PacketType::Command, command)?,
            &self.options,
        )?;
        Ok(response.payload_text().into_owned())
    }

    /// Closes the connection. Later calls to [`Client::execute`] fail with
    /// [`ErrorKind::NotConnected`](crate::ErrorKind::NotConnected). Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, State::Closed) {
            debug!("Closing RCON connection to {}", self.peer_addr);
        }
        *state = State::Closed;
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock(), State::Authenticated(_))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection {
    fn new(stream: TcpStream, timeout: Option<Duration>) -> crate::Result<Self> {
        stream
            .set_read_timeout(timeout)
            .and_then(|_| stream.set_write_timeout(timeout))
            .map_err(RconError::ConnectionFailed)?;

        let write_stream = stream.try_clone().map_err(RconError::ConnectionFailed)?;
        Ok(Connection {
            reader: BufReader::new(stream),
            writer: BufWriter::new(write_stream),
        })
    }

    /// Writes a request and reads the single packet that answers it.
    fn exchange(&mut self, request: Packet, options: &Options) -> crate::Result<Packet> {
        debug!(
            "Sending packet id={} type={:?}",
            request.request_id(),
            request.packet_type()
        );
        request.encode(&mut self.writer)?;
        Packet::decode(&mut self.reader, options.padding)
    }
}

fn dial<A: ToSocketAddrs>(addr: A, timeout: Option<Duration>) -> std::io::Result<TcpStream> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return TcpStream::connect(addr),
    };

    let mut last_err = None;
    for addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "address did not resolve to anything",
        )
    }))
}

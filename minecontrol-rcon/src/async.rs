use std::future::Future;
use std::mem;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use crate::packet::{self, Packet, PacketType, AUTH_FAILURE_ID, HEADER_LEN};
use crate::{read_error, Options, RconError};

/// An asynchronous RCON client, with the same guarantees as the blocking
/// [`Client`](crate::Client).
#[derive(Debug)]
pub struct AsyncClient {
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
    read: BufReader<OwnedReadHalf>,
    write: BufWriter<OwnedWriteHalf>,
}

impl AsyncClient {
    pub async fn open<A: ToSocketAddrs>(addr: A) -> crate::Result<Self> {
        Self::open_with(addr, Options::default()).await
    }

    pub async fn open_with<A: ToSocketAddrs>(addr: A, options: Options) -> crate::Result<Self> {
        let stream = with_deadline(options.io_timeout, TcpStream::connect(addr))
            .await
            .map_err(RconError::ConnectionFailed)?;
        let peer_addr = stream.peer_addr().map_err(RconError::ConnectionFailed)?;

        debug!("Opened RCON connection to {}", peer_addr);

        let (read, write) = stream.into_split();
        Ok(AsyncClient {
            state: Mutex::new(State::Unauthenticated(Connection {
                read: BufReader::new(read),
                write: BufWriter::new(write),
            })),
            peer_addr,
            options,
        })
    }

    /// Asynchronously connect to an RCON server and log in with `password`.
    ///
    /// # Example
    /// ```rust,no_run
    /// use minecontrol_rcon::AsyncClient;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = AsyncClient::connect("localhost:25575", "password123")
    ///         .await
    ///         .unwrap();
    ///
    ///     println!("{}", client.execute("/list").await.unwrap());
    /// }
    /// ```
    pub async fn connect<A: ToSocketAddrs>(addr: A, password: &str) -> crate::Result<Self> {
        Self::connect_with(addr, password, Options::default()).await
    }

    pub async fn connect_with<A: ToSocketAddrs>(
        addr: A,
        password: &str,
        options: Options,
    ) -> crate::Result<Self> {
        let client = Self::open_with(addr, options).await?;
        client.authenticate(password).await?;
        Ok(client)
    }

    /// Logs in. On any failure the connection is closed and the client can no longer be used.
    pub async fn authenticate(&self, password: &str) -> crate::Result<()> {
        let mut state = self.state.lock().await;

        let mut connection = match mem::replace(&mut *state, State::Closed) {
            State::Unauthenticated(connection) => connection,
            authenticated @ State::Authenticated(_) => {
                *state = authenticated;
                return Ok(());
            }
            State::Closed => return Err(RconError::NotConnected.into()),
        };

        let response = connection
            .exchange(packet::request(PacketType::Login, password)?, &self.options)
            .await?;

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

    /// Runs a command and returns the first packet of its output.
    ///
    /// Dropping the returned future before it completes closes the client: the response to the
    /// abandoned command may still be in flight, so later calls fail with
    /// [`ErrorKind::NotConnected`](crate::ErrorKind::NotConnected) instead of reading it.
    pub async fn execute(&self, command: &str) -> crate::Result<String> {
        let request = packet::request(PacketType::Command, command)?;
        let mut state = self.state.lock().await;

        // The connection is only put back once the exchange has run to completion.
        let mut connection = match mem::replace(&mut *state, State::Closed) {
            State::Authenticated(connection) => connection,
            other => {
                *state = other;
                return Err(RconError::NotConnected.into());
            }
        };

        let result = connection.exchange(request, &self.options).await;
        *state = State::Authenticated(connection);

        Ok(result?.payload_text().into_owned())
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let State::Unauthenticated(connection) | State::Authenticated(connection) =
            mem::replace(&mut *state, State::Closed)
        {
            debug!("Closing RCON connection to {}", self.peer_addr);
            connection.shutdown().await;
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock().await, State::Authenticated(_))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection {
    async fn exchange(&mut self, request: Packet, options: &Options) -> crate::Result<Packet> {
        debug!(
            "Sending packet id={} type={:?}",
            request.request_id(),
            request.packet_type()
        );

        let mut buf = Vec::with_capacity(request.length() as usize + 4);
        request.encode(&mut buf)?;
        with_deadline(options.io_timeout, async {
            self.write.write_all(&buf).await?;
            self.write.flush().await
        })
        .await
        .map_err(RconError::WriteFailed)?;

        let (length, rest) = with_deadline(options.io_timeout, self.read_frame())
            .await
            .map_err(read_error)??;

        Packet::decode_after_length(length, &mut rest.as_slice(), options.padding)
    }

    /// Reads the length field and the bytes it announces.
    async fn read_frame(&mut self) -> std::io::Result<crate::Result<(i32, Vec<u8>)>> {
        let length = self.read.read_i32_le().await?;
        let payload_len = match packet::payload_len(length) {
            Ok(payload_len) => payload_len,
            Err(err) => return Ok(Err(err)),
        };

        let mut rest = vec![0; HEADER_LEN + payload_len];
        self.read.read_exact(&mut rest).await?;
        Ok(Ok((length, rest)))
    }

    async fn shutdown(mut self) {
        if let Err(err) = self.write.shutdown().await {
            debug!("Error while shutting down RCON connection: {}", err);
        }
    }
}

async fn with_deadline<T, F>(timeout: Option<Duration>, fut: F) -> std::io::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "RCON I/O timed out"))?,
        None => fut.await,
    }
}

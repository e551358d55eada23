// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Framed, blocking connection to a renderer peer.
//!
//! One persistent byte stream per session. Sends are fire-and-forget; the
//! only blocking operation is [`Connection::receive`], which reads exactly
//! one frame or gives up after an optional bound.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bridge_scene_port::IdWidth;
use bridge_session_proto::wire::{
    decode_server_payload, encode_client_payload, encode_frame, FrameHeader, DEFAULT_MAX_PAYLOAD,
    HEADER_LEN,
};
use bridge_session_proto::{FromClient, FromServer, WireError};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, EncodingError, SessionError};

/// Byte stream the connection runs over.
pub trait Transport: Read + Write {
    /// Bound subsequent reads; `None` blocks indefinitely.
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_receive_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero duration is rejected by the OS; treat it as the shortest wait.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.set_read_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No stream.
    Disconnected,
    /// Connect in progress. Only held inside [`Connection::connect`]; a
    /// returned connection is always `Connected` or `Disconnected`.
    Connecting,
    /// Stream open.
    Connected,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Peer host name or address.
    pub host: String,
    /// Peer port.
    pub port: u16,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Default bound for receives; `None` blocks.
    pub receive_timeout: Option<Duration>,
    /// Largest inbound payload accepted.
    pub max_payload: u32,
    /// Id width spoken on the wire.
    pub id_width: IdWidth,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9093,
            connect_timeout: Duration::from_millis(5000),
            receive_timeout: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
            id_width: IdWidth::Narrow,
        }
    }
}

/// One inbound frame, borrowed from the connection's receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Raw message type.
    pub kind: u16,
    /// Payload bytes.
    pub payload: &'a [u8],
}

impl RawFrame<'_> {
    /// Declared payload size.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

enum Fill {
    Complete,
    Eof(usize),
    TimedOut(usize),
}

fn fill<S: Read>(stream: &mut S, buf: &mut [u8]) -> io::Result<Fill> {
    let mut read = 0;
    while read < buf.len() {
        match stream.read(&mut buf[read..]) {
            Ok(0) => return Ok(Fill::Eof(read)),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(Fill::TimedOut(read));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(Fill::Complete)
}

/// Framed connection over a [`Transport`].
#[derive(Debug)]
pub struct Connection<S: Transport = TcpStream> {
    stream: Option<S>,
    state: ConnectionState,
    id_width: IdWidth,
    max_payload: u32,
    receive_timeout: Option<Duration>,
    buf: Vec<u8>,
}

impl Connection<TcpStream> {
    /// Open a TCP connection to `opts.host:opts.port`.
    pub fn connect(opts: &ConnectOptions) -> Result<Self, SessionError> {
        let mut conn = Self::detached(opts);
        conn.state = ConnectionState::Connecting;
        let addrs = (opts.host.as_str(), opts.port).to_socket_addrs()?;
        let mut last_err =
            io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", opts.host));
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, opts.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(%addr, "connected to renderer");
                    conn.stream = Some(stream);
                    conn.state = ConnectionState::Connected;
                    return Ok(conn);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = e;
                }
            }
        }
        conn.state = ConnectionState::Disconnected;
        if matches!(last_err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
            return Err(ConnectionError::Timeout(opts.connect_timeout).into());
        }
        Err(last_err.into())
    }
}

impl<S: Transport> Connection<S> {
    fn detached(opts: &ConnectOptions) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Disconnected,
            id_width: opts.id_width,
            max_payload: opts.max_payload,
            receive_timeout: opts.receive_timeout,
            buf: Vec::new(),
        }
    }

    /// Wrap an already-open stream.
    pub fn from_stream(stream: S, opts: &ConnectOptions) -> Self {
        let mut conn = Self::detached(opts);
        conn.stream = Some(stream);
        conn.state = ConnectionState::Connected;
        conn
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id width spoken on this connection.
    pub fn id_width(&self) -> IdWidth {
        self.id_width
    }

    /// Default receive bound.
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    /// The underlying stream, while connected.
    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Encode and transmit one message.
    ///
    /// Encoding happens before any byte is written, so a rejected message
    /// leaves the stream untouched.
    pub fn send(&mut self, msg: &FromClient) -> Result<usize, SessionError> {
        if self.stream.is_none() {
            return Err(ConnectionError::NotConnected.into());
        }
        let payload = encode_client_payload(msg, self.id_width)?;
        let frame = encode_frame(msg.kind().code(), &payload)
            .map_err(|e| SessionError::Encoding(EncodingError::Frame(e)))?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };
        if let Err(e) = stream.write_all(&frame).and_then(|()| stream.flush()) {
            warn!(error = %e, "send failed, closing connection");
            self.close();
            return Err(e.into());
        }
        debug!(op = msg.op_name(), bytes = frame.len(), "sent");
        Ok(frame.len())
    }

    /// Read exactly one frame and hand it to `handler`.
    ///
    /// Returns `Ok(None)` when `timeout` elapses before the first header
    /// byte; the connection stays open. A peer that closes at a frame
    /// boundary yields [`ConnectionError::Closed`]. Framing errors close the
    /// connection and yield [`SessionError::Protocol`].
    pub fn receive<R>(
        &mut self,
        timeout: Option<Duration>,
        handler: impl FnOnce(RawFrame<'_>) -> R,
    ) -> Result<Option<R>, SessionError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };
        stream.set_receive_timeout(timeout)?;

        let mut raw = [0u8; HEADER_LEN];
        match fill(stream, &mut raw) {
            Ok(Fill::Complete) => {}
            Ok(Fill::TimedOut(0)) => return Ok(None),
            Ok(Fill::Eof(0)) => {
                info!("renderer closed the connection");
                self.close();
                return Err(ConnectionError::Closed.into());
            }
            Ok(Fill::Eof(got)) => {
                return Err(self.protocol_failure(WireError::Truncated {
                    expected: HEADER_LEN,
                    got,
                }))
            }
            Ok(Fill::TimedOut(_)) => return Err(self.timeout_failure(timeout)),
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        }

        let header = match FrameHeader::from_bytes(raw).check(self.max_payload) {
            Ok(header) => header,
            Err(e) => return Err(self.protocol_failure(e)),
        };
        let size = header.payload_size as usize;
        self.buf.clear();
        self.buf.resize(size, 0);
        let Some(stream) = self.stream.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };
        match fill(stream, &mut self.buf) {
            Ok(Fill::Complete) => {}
            Ok(Fill::Eof(got)) => {
                return Err(self.protocol_failure(WireError::Truncated {
                    expected: size,
                    got,
                }))
            }
            Ok(Fill::TimedOut(_)) => return Err(self.timeout_failure(timeout)),
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        }
        debug!(kind = header.kind, size, "received");
        Ok(Some(handler(RawFrame {
            kind: header.kind,
            payload: &self.buf,
        })))
    }

    /// Receive and decode one server message.
    ///
    /// Unknown message types decode to [`FromServer::Unknown`]; a known type
    /// whose payload does not decode is a protocol error.
    pub fn receive_message(&mut self, timeout: Option<Duration>) -> Result<Option<FromServer>, SessionError> {
        match self.receive(timeout, |frame| decode_server_payload(frame.kind, frame.payload))? {
            None => Ok(None),
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(self.protocol_failure(e.into())),
        }
    }

    fn protocol_failure(&mut self, err: WireError) -> SessionError {
        warn!(error = %err, "protocol error, closing connection");
        self.close();
        SessionError::Protocol(err)
    }

    fn timeout_failure(&mut self, timeout: Option<Duration>) -> SessionError {
        warn!("timed out inside a frame, closing connection");
        self.close();
        ConnectionError::Timeout(timeout.unwrap_or_default()).into()
    }

    /// Shut the stream down. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown() {
                debug!(error = %e, "shutdown failed");
            }
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl<S: Transport> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

//! Transport primitives for the shipping handler.
//!
//! [`TcpTransport`] keeps one long-lived stream to the collector. The
//! connection is opened lazily by the first send, replaced after a write
//! failure, and invalidated wholesale by [`LogTransport::cancel`]. Each
//! connection is stamped with the generation it was opened in; cancelling
//! bumps the generation and shuts the socket down underneath any write that
//! is still blocked on it.

use std::{
    fmt,
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};
use native_tls::{TlsConnector, TlsStream};
use parking_lot::Mutex;

use super::{
    buffer::{Batch, Entry, FailureMap},
    config::ShipHandlerConfig,
    error::TransportError,
};

/// Converts an entry into the bytes written for it.
pub type Serialiser<'a> = &'a dyn Fn(&Entry) -> Result<Vec<u8>, TransportError>;

/// Stream transport delivering batches to the collector.
pub trait LogTransport: Send + Sync {
    /// Write every entry of `batch` in ascending tag order.
    ///
    /// A failed entry does not stop the batch. The returned map holds exactly
    /// the tags that failed; tags whose writes were aborted by
    /// [`cancel`](Self::cancel) are left out.
    fn send_batch(&self, batch: &Batch, serialise: Serialiser<'_>) -> FailureMap;

    /// Abort in-flight writes and force a fresh connection for later sends.
    fn cancel(&self);
}

/// TCP endpoint of the collector.
#[derive(Clone, Debug)]
pub struct TcpEndpoint {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// TLS settings; `None` ships over plain TCP without any trust check.
    pub tls: Option<TlsOptions>,
}

impl TcpEndpoint {
    fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|iter| iter.collect())
    }

    fn display_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Name the server certificate must match.
    pub domain: String,
}

fn tls_connector() -> io::Result<TlsConnector> {
    TlsConnector::builder().build().map_err(io::Error::other)
}

enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveConnection {
    fn write_frame(&mut self, frame: &[u8], timeout: Duration) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => {
                stream.set_write_timeout(Some(timeout))?;
                stream.write_all(frame)?;
                stream.flush()
            }
            ActiveConnection::Tls(stream) => {
                stream.get_ref().set_write_timeout(Some(timeout))?;
                stream.write_all(frame)?;
                stream.flush()
            }
        }
    }
}

struct Connection {
    stream: ActiveConnection,
    generation: u64,
}

fn connect_tcp(endpoint: &TcpEndpoint, timeout: Duration) -> io::Result<TcpStream> {
    let addrs = endpoint.socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}", endpoint.display_addr()),
        )
    }))
}

/// Persistent, optionally TLS-secured, TCP transport.
pub struct TcpTransport {
    endpoint: TcpEndpoint,
    connect_timeout: Duration,
    write_timeout: Duration,
    log_activity: bool,
    connection: Mutex<Option<Connection>>,
    // Clone of the raw socket so `cancel` can shut it down without waiting
    // for the writer holding `connection`.
    abort_handle: Mutex<Option<TcpStream>>,
    generation: AtomicU64,
}

impl TcpTransport {
    pub fn new(endpoint: TcpEndpoint, connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            write_timeout,
            log_activity: false,
            connection: Mutex::new(None),
            abort_handle: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ShipHandlerConfig) -> Self {
        let mut transport = Self::new(
            config.endpoint.clone(),
            config.connect_timeout,
            config.write_timeout,
        );
        transport.log_activity = config.log_activity;
        transport
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn ensure_connected<'a>(
        &self,
        slot: &'a mut Option<Connection>,
        generation: u64,
    ) -> Result<&'a mut Connection, TransportError> {
        let conn = match slot.take() {
            Some(conn) if conn.generation == generation => conn,
            _ => self.connect(generation)?,
        };
        Ok(slot.insert(conn))
    }

    fn connect(&self, generation: u64) -> Result<Connection, TransportError> {
        let connect_err = |source: io::Error| TransportError::Connect {
            addr: self.endpoint.display_addr(),
            source: Arc::new(source),
        };
        let stream = connect_tcp(&self.endpoint, self.connect_timeout).map_err(connect_err)?;
        self.arm_abort_handle(&stream, generation).map_err(connect_err)?;
        let stream = match &self.endpoint.tls {
            None => ActiveConnection::PlainTcp(stream),
            Some(tls) => self.handshake(tls, stream)?,
        };
        if self.log_activity {
            debug!(
                "FemtoShipHandler connected to {}",
                self.endpoint.display_addr()
            );
        }
        Ok(Connection { stream, generation })
    }

    /// Publish a clone of `stream` for [`LogTransport::cancel`] to shut down.
    ///
    /// A cancel that ran while the socket was still connecting finds no
    /// handle, so the generation is rechecked once the handle is in place.
    fn arm_abort_handle(&self, stream: &TcpStream, generation: u64) -> io::Result<()> {
        let mut handle = self.abort_handle.lock();
        *handle = Some(stream.try_clone()?);
        if self.is_current(generation) {
            return Ok(());
        }
        *handle = None;
        let _ = stream.shutdown(Shutdown::Both);
        Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "connection cancelled while connecting",
        ))
    }

    fn release_connection(&self, slot: &mut Option<Connection>) {
        *slot = None;
        *self.abort_handle.lock() = None;
    }

    fn handshake(
        &self,
        tls: &TlsOptions,
        stream: TcpStream,
    ) -> Result<ActiveConnection, TransportError> {
        if self.log_activity {
            debug!(
                "FemtoShipHandler verifying server identity for {}",
                tls.domain
            );
        }
        let trust_failure = |message: String| {
            if self.log_activity {
                warn!("FemtoShipHandler could not start tls: invalid trust ({message})");
            }
            TransportError::Tls {
                host: tls.domain.clone(),
                message,
            }
        };
        let connector = tls_connector().map_err(|err| trust_failure(err.to_string()))?;
        stream
            .set_read_timeout(Some(self.connect_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.connect_timeout)))
            .map_err(|err| trust_failure(err.to_string()))?;
        let stream = connector
            .connect(&tls.domain, stream)
            .map_err(|err| trust_failure(err.to_string()))?;
        stream
            .get_ref()
            .set_read_timeout(None)
            .map_err(|err| trust_failure(err.to_string()))?;
        Ok(ActiveConnection::Tls(Box::new(stream)))
    }
}

impl LogTransport for TcpTransport {
    fn send_batch(&self, batch: &Batch, serialise: Serialiser<'_>) -> FailureMap {
        let generation = self.generation.load(Ordering::Acquire);
        let mut failures = FailureMap::new();
        let mut slot = self.connection.lock();
        let mut entries = batch.iter();
        while let Some((tag, entry)) = entries.next() {
            if !self.is_current(generation) {
                break;
            }
            let frame = match serialise(entry) {
                Ok(frame) => frame,
                Err(err) => {
                    failures.insert(tag, err);
                    continue;
                }
            };
            let conn = match self.ensure_connected(&mut slot, generation) {
                Ok(conn) => conn,
                Err(err) => {
                    if !self.is_current(generation) {
                        break;
                    }
                    // Nothing else in this batch can go out on this attempt.
                    failures.extend(entries.by_ref().map(|(tag, _)| (tag, err.clone())));
                    failures.insert(tag, err);
                    break;
                }
            };
            if let Err(err) = conn.stream.write_frame(&frame, self.write_timeout) {
                self.release_connection(&mut slot);
                if !self.is_current(generation) {
                    break;
                }
                failures.insert(tag, TransportError::write(err));
            }
        }
        failures
    }

    fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(stream) = self.abort_handle.lock().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if self.log_activity {
            debug!(
                "FemtoShipHandler cancelled connection to {}",
                self.endpoint.display_addr()
            );
        }
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("endpoint", &self.endpoint)
            .field("write_timeout", &self.write_timeout)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

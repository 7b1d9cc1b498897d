//! Configuration structures consumed by the shipping handler lifecycle.
//!
//! `ShipHandlerBuilder` constructs these values before passing them to
//! [`FemtoShipHandler`](super::FemtoShipHandler) for runtime use.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::transport::{TcpEndpoint, TlsOptions};

/// Default bounded channel capacity used by the handler.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout applied to each entry write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Field name used for the static token merged into every entry.
pub const TOKEN_FIELD: &str = "token";

/// What `record()` does when the intake queue is full.
///
/// The intake worker never performs network I/O, so [`Block`](Self::Block)
/// only waits for records ahead in the queue to be parsed. The other policies
/// trade completeness for a bounded caller latency: records they reject are
/// lost and only counted in a rate-limited warning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for queue space. No record is lost.
    #[default]
    Block,
    /// Drop the record immediately.
    Drop,
    /// Wait up to the given duration, then drop the record.
    Timeout(Duration),
}

/// Configuration object describing how to construct a [`FemtoShipHandler`](super::FemtoShipHandler).
#[derive(Clone, Debug)]
pub struct ShipHandlerConfig {
    pub capacity: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub endpoint: TcpEndpoint,
    /// Static token merged into every outgoing entry under [`TOKEN_FIELD`].
    pub token: Option<String>,
    /// Emit activity diagnostics through the `log` crate.
    pub log_activity: bool,
    pub warn_interval: Duration,
    pub overflow_policy: OverflowPolicy,
}

impl Default for ShipHandlerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            endpoint: TcpEndpoint {
                host: "localhost".into(),
                port: 5000,
                tls: Some(TlsOptions {
                    domain: "localhost".into(),
                }),
            },
            token: None,
            log_activity: false,
            warn_interval: DEFAULT_WARN_INTERVAL,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl ShipHandlerConfig {
    /// Override the endpoint configuration.
    pub fn with_endpoint(mut self, endpoint: TcpEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// True when entries go out over plain TCP without a trust check.
    pub fn allow_untrusted_server(&self) -> bool {
        self.endpoint.tls.is_none()
    }

    /// Upper bound on how long a close waits for the final flush.
    pub(crate) fn shutdown_timeout(&self) -> Duration {
        self.connect_timeout.saturating_add(self.write_timeout)
    }
}

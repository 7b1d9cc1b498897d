//! Builder for [`FemtoShipHandler`](crate::ship_handler::FemtoShipHandler).
//!
//! Exposes the collector endpoint, timeout tuning, the static token and the
//! trust policy. Validation happens in [`build_inner`](HandlerBuilderTrait::build_inner)
//! so a misconfigured handler never spawns its worker threads.

use std::{sync::Arc, time::Duration};

use crate::ship_handler::{
    FemtoShipHandler, LogTransport, OverflowPolicy, ShipHandlerConfig, TcpEndpoint, TlsOptions,
};

use super::{HandlerBuildError, HandlerBuilderTrait};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(HandlerBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

#[derive(Clone, Debug)]
struct TcpTarget {
    host: String,
    port: u16,
}

/// Builder for constructing [`FemtoShipHandler`] instances.
#[derive(Clone, Default)]
pub struct ShipHandlerBuilder {
    capacity: Option<usize>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    overflow_policy: Option<OverflowPolicy>,
    target: Option<TcpTarget>,
    token: Option<String>,
    log_activity: bool,
    allow_untrusted_server: bool,
    transport: Option<Arc<dyn LogTransport>>,
}

impl ShipHandlerBuilder {
    /// Create a new builder with no collector configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ship to the collector at `host:port`.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.target = Some(TcpTarget {
            host: host.into(),
            port,
        });
        self
    }

    /// Merge `token` into every outgoing entry.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Emit activity diagnostics through the `log` crate.
    pub fn with_log_activity(mut self, log_activity: bool) -> Self {
        self.log_activity = log_activity;
        self
    }

    /// Ship over plain TCP, skipping the server trust check.
    pub fn with_allow_untrusted_server(mut self, allow: bool) -> Self {
        self.allow_untrusted_server = allow;
        self
    }

    /// Replace the TCP transport, typically with a test double.
    pub fn with_transport(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    option_setter!(
        #[doc = "Set the bounded channel capacity."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(
        #[doc = "Set the timeout applied to each entry write."]
        with_write_timeout_ms,
        write_timeout_ms,
        u64
    );
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);
    option_setter!(
        #[doc = "Choose what `record()` does when the intake queue is full."]
        #[doc = ""]
        #[doc = "Defaults to [`OverflowPolicy::Block`]; the other policies may lose records."]
        with_overflow_policy,
        overflow_policy,
        OverflowPolicy
    );

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_target()?;
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(OverflowPolicy::Timeout(dur)) = self.overflow_policy {
            ensure_positive!(dur.as_millis(), "overflow timeout")?;
        }
        Ok(())
    }

    fn validate_target(&self) -> Result<(), HandlerBuildError> {
        match &self.target {
            None if self.transport.is_none() => Err(HandlerBuildError::InvalidConfig(
                "ship handler requires a tcp endpoint".into(),
            )),
            Some(target) if target.host.trim().is_empty() => Err(
                HandlerBuildError::InvalidConfig("tcp host must not be empty".into()),
            ),
            Some(target) if target.port == 0 => Err(HandlerBuildError::InvalidConfig(
                "tcp port must be greater than zero".into(),
            )),
            _ => Ok(()),
        }
    }

    fn build_config(&self) -> Result<ShipHandlerConfig, HandlerBuildError> {
        self.validate()?;
        let mut config = ShipHandlerConfig::default();
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
        if let Some(policy) = self.overflow_policy {
            config.overflow_policy = policy;
        }
        if let Some(target) = &self.target {
            config.endpoint = self.build_endpoint(target);
        }
        config.token = self.token.clone();
        config.log_activity = self.log_activity;
        Ok(config)
    }

    fn build_endpoint(&self, target: &TcpTarget) -> TcpEndpoint {
        let tls = (!self.allow_untrusted_server).then(|| TlsOptions {
            domain: target.host.clone(),
        });
        TcpEndpoint {
            host: target.host.clone(),
            port: target.port,
            tls,
        }
    }
}

impl std::fmt::Debug for ShipHandlerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipHandlerBuilder")
            .field("capacity", &self.capacity)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("overflow_policy", &self.overflow_policy)
            .field("target", &self.target)
            .field("has_token", &self.token.is_some())
            .field("log_activity", &self.log_activity)
            .field("allow_untrusted_server", &self.allow_untrusted_server)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl HandlerBuilderTrait for ShipHandlerBuilder {
    type Handler = FemtoShipHandler;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        let config = self.build_config()?;
        Ok(match &self.transport {
            Some(transport) => FemtoShipHandler::with_transport(config, Arc::clone(transport)),
            None => FemtoShipHandler::with_config(config),
        })
    }
}

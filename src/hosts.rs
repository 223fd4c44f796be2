use crate::{
    config::PROBE_TIMEOUT,
    error::{
        ConnectError,
        TransportError,
    },
    protocol::{
        Connector,
        Principal,
    },
    retry::advisory_timeout,
};
use std::time::{
    Duration,
    Instant,
};
use tracing::{
    info,
    warn,
};

/// Short-lived bias toward the host that last accepted a write, so
/// immediately-following reads do not land on a lagging replica.
#[derive(Clone, Debug)]
pub struct StickyHost {
    pub host: String,
    pub expires_at: Instant,
}

impl StickyHost {
    pub fn pin(host: impl Into<String>, window: Duration) -> Self {
        Self {
            host: host.into(),
            expires_at: Instant::now() + window,
        }
    }

    /// Pure time check; there is no active teardown.
    pub fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Probes a fixed, ordered list of boundary hosts and returns the first
/// working connection. Probing is sequential: a later-preferred host must
/// never win a race against an earlier one.
pub struct HostSelector<C> {
    connector: C,
    hosts: Vec<String>,
    probe_timeout: Duration,
}

impl<C: Connector> HostSelector<C> {
    pub fn new(connector: C, hosts: Vec<String>) -> Self {
        Self {
            connector,
            hosts,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Bounded connect to a single host. `Connector::connect` performs the
    /// liveness exchange, so this is the per-candidate probe.
    pub async fn connect_to(
        &self,
        host: &str,
        identity: Option<&Principal>,
    ) -> Result<C::Connection, TransportError> {
        advisory_timeout(
            self.probe_timeout,
            host,
            self.connector.connect(host, identity),
        )
        .await
    }

    /// Find a working host. An unexpired sticky host is tried first, out of
    /// order; on its failure (or absence) every candidate except
    /// `exclude_host` is probed in list order. All candidates failing is
    /// terminal and carries the last per-host error.
    pub async fn connect(
        &self,
        identity: Option<&Principal>,
        exclude_host: Option<&str>,
        sticky: Option<&StickyHost>,
    ) -> Result<C::Connection, ConnectError> {
        let mut tried = Vec::new();
        let mut last_error = None;

        if let Some(sticky) = sticky
            && sticky.is_live()
        {
            match self.connect_to(&sticky.host, identity).await {
                Ok(connection) => {
                    info!(host = %sticky.host, "sticky host answered probe");
                    return Ok(connection);
                }
                Err(error) => {
                    warn!(
                        host = %sticky.host,
                        %error,
                        "sticky host failed, falling back to ordered probe"
                    );
                    tried.push(sticky.host.clone());
                    last_error = Some(error);
                }
            }
        }

        for host in &self.hosts {
            if Some(host.as_str()) == exclude_host {
                continue;
            }
            // A host already tried via the sticky path is not probed twice
            // within one call.
            if tried.iter().any(|t| t == host) {
                continue;
            }
            match self.connect_to(host, identity).await {
                Ok(connection) => {
                    info!(%host, "connected to boundary host");
                    return Ok(connection);
                }
                Err(error) => {
                    warn!(%host, %error, "boundary host probe failed");
                    tried.push(host.clone());
                    last_error = Some(error);
                }
            }
        }

        let last = last_error.unwrap_or(TransportError::Unreachable {
            host: String::new(),
            message: String::from("no candidate hosts configured"),
        });
        Err(ConnectError { tried, last })
    }
}

use crate::{
    config::BALANCE_READ_TIMEOUT,
    error::TransportError,
    hosts::HostSelector,
    protocol::{
        BoundaryConnection,
        Connector,
        Principal,
    },
    retry::advisory_timeout,
    session::Session,
};
use tracing::{
    error,
    info,
    warn,
};

/// Caller-visible outcome of the most recent refresh attempt. Refresh
/// failures are reported here and in the log, never propagated to callers
/// that cannot act on them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BalanceState {
    Unknown,
    Fresh,
    Failed,
}

/// Single-use handle to an optimistic balance deduction. Consumed by value,
/// so it can be resolved (committed or rolled back) at most once.
#[must_use = "an optimistic ticket must be committed or rolled back"]
pub struct OptimisticTicket {
    prior_e8s: u64,
    resolved: bool,
}

impl Drop for OptimisticTicket {
    fn drop(&mut self) {
        if !self.resolved {
            error!(
                prior_e8s = self.prior_e8s,
                "optimistic balance ticket dropped unresolved"
            );
        }
    }
}

/// Last-known ledger balance with an optimistic local copy.
pub struct BalanceTracker {
    e8s: u64,
    state: BalanceState,
}

impl Default for BalanceTracker {
    fn default() -> Self {
        Self {
            e8s: 0,
            state: BalanceState::Unknown,
        }
    }
}

impl BalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn e8s(&self) -> u64 {
        self.e8s
    }

    pub fn state(&self) -> BalanceState {
        self.state
    }

    /// Sign-out hook.
    pub fn reset(&mut self) {
        self.e8s = 0;
        self.state = BalanceState::Unknown;
    }

    /// Deduct `total_e8s` immediately, before remote confirmation. The
    /// returned ticket restores the exact prior value on rollback.
    pub fn begin_optimistic(&mut self, total_e8s: u64) -> OptimisticTicket {
        let prior_e8s = self.e8s;
        debug_assert!(total_e8s <= prior_e8s);
        self.e8s = prior_e8s.saturating_sub(total_e8s);
        OptimisticTicket {
            prior_e8s,
            resolved: false,
        }
    }

    /// Keep the deduction; the ledger has confirmed the spend.
    pub fn commit(&mut self, mut ticket: OptimisticTicket) {
        ticket.resolved = true;
    }

    /// Restore the exact pre-adjustment value. No partial rollback states.
    pub fn rollback(&mut self, mut ticket: OptimisticTicket) {
        self.e8s = ticket.prior_e8s;
        ticket.resolved = true;
    }

    /// Refresh the stored balance through the session's connection.
    ///
    /// Normal path (`hard_retry = false`): one attempt against the current
    /// connection; on failure the balance is left unmodified and the state
    /// marked `Failed`. Hard path: on failure, reconnect excluding the
    /// failed host and retry against each remaining untried candidate in
    /// list order; only exhaustion is terminal.
    pub async fn refresh<C: Connector>(
        &mut self,
        selector: &HostSelector<C>,
        session: &mut Session<C::Connection>,
        hard_retry: bool,
    ) {
        let Some(owner) = session.identity().cloned() else {
            return;
        };

        let failed_host = match session.connection() {
            Some(connection) => {
                match Self::read_once(connection, &owner).await {
                    Ok(e8s) => {
                        self.adopt(e8s, connection.host(), &owner);
                        return;
                    }
                    Err(error) => {
                        warn!(
                            host = connection.host(),
                            %error,
                            "balance read failed on current host"
                        );
                        connection.host().to_string()
                    }
                }
            }
            None => String::new(),
        };

        if !hard_retry {
            self.state = BalanceState::Failed;
            return;
        }

        let mut tried = vec![failed_host];
        for host in selector.hosts() {
            if tried.iter().any(|t| t == host) {
                continue;
            }
            tried.push(host.clone());
            let connection = match selector.connect_to(host, Some(&owner)).await {
                Ok(connection) => connection,
                Err(error) => {
                    warn!(%host, %error, "balance retry host unreachable");
                    continue;
                }
            };
            match Self::read_once(&connection, &owner).await {
                Ok(e8s) => {
                    self.adopt(e8s, connection.host(), &owner);
                    session.adopt_connection(connection);
                    return;
                }
                Err(error) => {
                    warn!(%host, %error, "balance retry host failed");
                }
            }
        }

        warn!("balance refresh exhausted every candidate host");
        self.state = BalanceState::Failed;
    }

    /// One attempt against one host: the primary query first, then the
    /// alternate certified construction of the same read, same account.
    async fn read_once<Conn: BoundaryConnection>(
        connection: &Conn,
        owner: &Principal,
    ) -> Result<u64, TransportError> {
        let host = connection.host();
        match advisory_timeout(
            BALANCE_READ_TIMEOUT,
            host,
            connection.balance_of(owner),
        )
        .await
        {
            Ok(e8s) => Ok(e8s),
            Err(primary) => {
                warn!(%host, error = %primary, "primary balance query failed");
                advisory_timeout(
                    BALANCE_READ_TIMEOUT,
                    host,
                    connection.balance_of_certified(owner),
                )
                .await
            }
        }
    }

    fn adopt(&mut self, e8s: u64, host: &str, owner: &Principal) {
        self.e8s = e8s;
        self.state = BalanceState::Fresh;
        info!(%host, principal = %owner, e8s, "balance refreshed");
    }
}

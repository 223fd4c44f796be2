use crate::{
    config::{
        DEFAULT_FEE_E8S,
        TRANSFER_TRANSIENT_BACKOFF,
    },
    error::{
        TransferFailure,
        TransportError,
    },
    protocol::{
        BlockIndex,
        BoundaryConnection,
        Principal,
        TransferArgs,
        TransferError,
        TransferReply,
    },
};
use tokio::time;
use tracing::{
    info,
    warn,
};

/// Executes a single ledger transfer with fee discovery, time-skew
/// correction and error-class-specific recovery. Fails closed: a block
/// index is returned only when the ledger confirmed the transfer.
pub struct TransferExecutor {
    receiver: Principal,
    cached_fee_e8s: Option<u64>,
}

impl TransferExecutor {
    pub fn new(receiver: Principal) -> Self {
        Self {
            receiver,
            cached_fee_e8s: None,
        }
    }

    /// Current fee estimate, cached after the first successful discovery.
    pub async fn fee_estimate<Conn: BoundaryConnection>(
        &mut self,
        connection: &Conn,
    ) -> u64 {
        if let Some(fee) = self.cached_fee_e8s {
            return fee;
        }
        self.authoritative_fee(connection).await
    }

    /// Re-query the ledger for its fee, bypassing the cache: the direct fee
    /// query first, the metadata key/value list as fallback, then a fixed
    /// default.
    async fn authoritative_fee<Conn: BoundaryConnection>(
        &mut self,
        connection: &Conn,
    ) -> u64 {
        let fee = match connection.transfer_fee().await {
            Ok(fee) => Some(fee),
            Err(error) => {
                warn!(%error, "fee query failed, trying metadata");
                match connection.fee_metadata().await {
                    Ok(entries) => entries
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case("ledger:fee"))
                        .and_then(|(_, value)| value.parse::<u64>().ok()),
                    Err(error) => {
                        warn!(%error, "fee metadata query failed");
                        None
                    }
                }
            }
        };
        let fee = fee.unwrap_or(DEFAULT_FEE_E8S);
        self.cached_fee_e8s = Some(fee);
        fee
    }

    /// Send `amount_e8s` to the configured receiver. At most one recovery
    /// attempt per error class; once a block index is obtained it is the
    /// immutable proof of payment and is never re-requested.
    pub async fn transfer<Conn: BoundaryConnection>(
        &mut self,
        connection: &Conn,
        amount_e8s: u64,
        fee_e8s: u64,
    ) -> Result<BlockIndex, TransferFailure> {
        match self.send(connection, amount_e8s, fee_e8s, true).await {
            Ok(reply) => {
                self.recover(connection, reply, amount_e8s, fee_e8s).await
            }
            Err(error) => {
                // Transport-level failure: one fallback attempt without a
                // client timestamp; its own failure is terminal.
                warn!(%error, "transfer transport failure, one fallback attempt");
                match self.send(connection, amount_e8s, fee_e8s, false).await {
                    Ok(Ok(index)) => Ok(index),
                    Ok(Err(rejection)) => Err(terminal(rejection)),
                    Err(error) => Err(TransferFailure::Transport(error)),
                }
            }
        }
    }

    /// Apply the structured-error recovery table to the first reply.
    async fn recover<Conn: BoundaryConnection>(
        &mut self,
        connection: &Conn,
        reply: TransferReply,
        amount_e8s: u64,
        fee_e8s: u64,
    ) -> Result<BlockIndex, TransferFailure> {
        let rejection = match reply {
            Ok(index) => return Ok(index),
            Err(rejection) => rejection,
        };

        match rejection {
            TransferError::BadFee { expected_fee_e8s } => {
                warn!(
                    offered = fee_e8s,
                    expected = expected_fee_e8s,
                    "fee mismatch, re-querying authoritative fee"
                );
                self.cached_fee_e8s = None;
                let corrected = self.authoritative_fee(connection).await;
                // Same timestamp policy as the first attempt.
                self.retry(connection, amount_e8s, corrected, true).await
            }
            TransferError::CreatedInFuture | TransferError::TooOld => {
                warn!("ledger rejected client timestamp, retrying without one");
                self.retry(connection, amount_e8s, fee_e8s, false).await
            }
            TransferError::TemporarilyUnavailable => {
                time::sleep(TRANSFER_TRANSIENT_BACKOFF).await;
                self.retry(connection, amount_e8s, fee_e8s, false).await
            }
            other => Err(terminal(other)),
        }
    }

    /// The single permitted retry. Any rejection here is terminal.
    async fn retry<Conn: BoundaryConnection>(
        &mut self,
        connection: &Conn,
        amount_e8s: u64,
        fee_e8s: u64,
        with_time: bool,
    ) -> Result<BlockIndex, TransferFailure> {
        match self.send(connection, amount_e8s, fee_e8s, with_time).await {
            Ok(Ok(index)) => Ok(index),
            Ok(Err(rejection)) => Err(terminal(rejection)),
            Err(error) => Err(TransferFailure::Transport(error)),
        }
    }

    async fn send<Conn: BoundaryConnection>(
        &self,
        connection: &Conn,
        amount_e8s: u64,
        fee_e8s: u64,
        with_time: bool,
    ) -> Result<TransferReply, TransportError> {
        let args = TransferArgs {
            to: self.receiver.clone(),
            amount_e8s,
            fee_e8s,
            created_at_time_ns: with_time.then(now_ns),
            memo: None,
        };
        let reply = connection.transfer(args).await?;
        if let Ok(index) = &reply {
            info!(block_index = index, amount_e8s, fee_e8s, "transfer accepted");
        }
        Ok(reply)
    }
}

/// Map a structured rejection with no recovery path to its terminal form.
fn terminal(rejection: TransferError) -> TransferFailure {
    match rejection {
        TransferError::InsufficientFunds { balance_e8s } => {
            TransferFailure::InsufficientFunds { balance_e8s }
        }
        TransferError::Duplicate { duplicate_of } => {
            // Terminal non-error: already submitted, do not retry, do not
            // re-deduct.
            TransferFailure::AlreadySubmitted { duplicate_of }
        }
        TransferError::Rejected { message } => TransferFailure::Rejected { message },
        TransferError::BadFee { expected_fee_e8s } => TransferFailure::Rejected {
            message: format!(
                "fee still rejected after correction (expected {expected_fee_e8s} e8s)"
            ),
        },
        TransferError::CreatedInFuture => TransferFailure::Rejected {
            message: String::from("transfer timestamp still rejected as in the future"),
        },
        TransferError::TooOld => TransferFailure::Rejected {
            message: String::from("transfer timestamp still rejected as too old"),
        },
        TransferError::TemporarilyUnavailable => TransferFailure::Rejected {
            message: String::from("ledger temporarily unavailable"),
        },
    }
}

fn now_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|ns| ns as u64)
        .unwrap_or_default()
}

use thiserror::Error;

/// A remote call that failed before producing a structured reply.
///
/// A `Timeout` is advisory: the remote operation was not cancelled and may
/// still complete server-side, so retries must be safe under at-least-once
/// execution.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    #[error("request to {host} timed out")]
    Timeout { host: String },
    #[error("{host} unreachable: {message}")]
    Unreachable { host: String, message: String },
    #[error("unexpected reply from {host}: {message}")]
    Decode { host: String, message: String },
}

/// No candidate boundary host accepted a connection.
#[derive(Debug, Error)]
#[error("no boundary host reachable (tried {tried:?}): {last}")]
pub struct ConnectError {
    pub tried: Vec<String>,
    pub last: TransportError,
}

/// Terminal outcomes of a transfer attempt after all recovery steps.
#[derive(Debug, Error)]
pub enum TransferFailure {
    #[error("ledger reports insufficient funds (balance {balance_e8s} e8s)")]
    InsufficientFunds { balance_e8s: u64 },
    /// Not an error in the user's eyes: the payment was already captured by
    /// an earlier submission, so nothing new was deducted.
    #[error("payment already submitted (duplicate of block {duplicate_of})")]
    AlreadySubmitted { duplicate_of: u64 },
    #[error("ledger rejected transfer: {message}")]
    Rejected { message: String },
    #[error("transfer failed in transport: {0}")]
    Transport(TransportError),
}

/// The commit step that did not complete after payment was captured.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitStage {
    Claim,
    Paint,
}

impl std::fmt::Display for CommitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitStage::Claim => write!(f, "claim"),
            CommitStage::Paint => write!(f, "paint"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid link {0:?}: an http(s) URL is required")]
    InvalidLink(String),
    #[error("another purchase is still in flight")]
    PurchaseInFlight,
    #[error("balance too low: need {required_e8s} e8s, have {available_e8s}")]
    Affordability {
        required_e8s: u64,
        available_e8s: u64,
    },
    #[error(transparent)]
    Connectivity(#[from] ConnectError),
    /// No block index was obtained; local state has been rolled back.
    #[error("payment failed: {0}")]
    Payment(TransferFailure),
    /// Payment is final but a later step failed. Local balance stays
    /// deducted: reversing a ledger transfer is not a client-side operation.
    #[error(
        "payment captured at block {block_index} but the {stage} step did \
         not complete: {source}"
    )]
    PartialCommit {
        block_index: u64,
        stage: CommitStage,
        source: TransportError,
    },
}

impl PurchaseError {
    /// Shortfall shown to the user on an affordability failure.
    pub fn shortfall_e8s(&self) -> Option<u64> {
        match self {
            PurchaseError::Affordability {
                required_e8s,
                available_e8s,
            } => Some(required_e8s - available_e8s),
            _ => None,
        }
    }
}

//! The fixed, versioned remote interface to a boundary host.
//!
//! Every remote operation the client consumes lives on one connection
//! handle. The protocol version is negotiated exactly once, when the
//! connection is established, and never re-detected per call.

use crate::{
    canvas::{
        PixelWrite,
        Region,
    },
    error::TransportError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

pub type BlockIndex = u64;

/// Textual principal identifying a ledger account owner.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend protocol revision, chosen once from the probe reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    pub fn route_prefix(self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "api/v1",
            ProtocolVersion::V2 => "api/v2",
        }
    }
}

/// Liveness reply from a boundary host.
#[derive(Clone, Debug)]
pub struct ProbeReply {
    pub version: ProtocolVersion,
    pub ledger_symbol: String,
    pub ledger_decimals: u8,
}

/// Arguments for a single ledger transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferArgs {
    pub to: Principal,
    pub amount_e8s: u64,
    pub fee_e8s: u64,
    /// Client-supplied creation time in nanoseconds. Omitted on the
    /// clock-skew retry path so the ledger stamps the transfer itself.
    pub created_at_time_ns: Option<u64>,
    pub memo: Option<u64>,
}

/// Structured rejection returned by the ledger inside a well-formed reply.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransferError {
    BadFee { expected_fee_e8s: u64 },
    CreatedInFuture,
    TooOld,
    TemporarilyUnavailable,
    InsufficientFunds { balance_e8s: u64 },
    Duplicate { duplicate_of: BlockIndex },
    Rejected { message: String },
}

/// The ledger's answer to a transfer: a monotonically increasing block
/// index, or a structured rejection.
pub type TransferReply = Result<BlockIndex, TransferError>;

/// A host-bound capability to invoke remote operations. Carries the host it
/// was established against; never mutated, only replaced on reconnect.
pub trait BoundaryConnection {
    fn host(&self) -> &str;

    fn protocol_version(&self) -> ProtocolVersion;

    /// Cheap liveness read, also reporting the host's protocol version.
    fn probe(&self) -> impl Future<Output = Result<ProbeReply, TransportError>>;

    /// Primary balance query.
    fn balance_of(
        &self,
        owner: &Principal,
    ) -> impl Future<Output = Result<u64, TransportError>>;

    /// Alternate construction of the same balance read, tolerated as a
    /// fallback when a host mishandles the primary call shape. Same account.
    fn balance_of_certified(
        &self,
        owner: &Principal,
    ) -> impl Future<Output = Result<u64, TransportError>>;

    fn transfer_fee(&self) -> impl Future<Output = Result<u64, TransportError>>;

    /// Key/value ledger metadata; fallback fee source.
    fn fee_metadata(
        &self,
    ) -> impl Future<Output = Result<Vec<(String, String)>, TransportError>>;

    fn transfer(
        &self,
        args: TransferArgs,
    ) -> impl Future<Output = Result<TransferReply, TransportError>>;

    /// Permanently assign ownership and the link to the given cells.
    /// Idempotent: re-claiming already-owned cells by their rightful owner
    /// must not error.
    fn claim_pixels(
        &self,
        indices: &[u32],
        link: Option<&str>,
    ) -> impl Future<Output = Result<(), TransportError>>;

    fn paint_pixels(
        &self,
        writes: &[PixelWrite],
    ) -> impl Future<Output = Result<(), TransportError>>;

    /// Row-major flat color buffer for a rectangle, one 32-bit color per
    /// cell. This is the public replicated read path.
    fn read_region(
        &self,
        region: Region,
    ) -> impl Future<Output = Result<Vec<u32>, TransportError>>;

    fn link_at(
        &self,
        x: u32,
        y: u32,
    ) -> impl Future<Output = Result<Option<String>, TransportError>>;
}

/// Establishes connections against named boundary hosts. `connect` performs
/// the bounded liveness exchange itself, so a returned connection is known
/// live and carries its negotiated protocol version.
pub trait Connector {
    type Connection: BoundaryConnection;

    fn connect(
        &self,
        host: &str,
        identity: Option<&Principal>,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>>;
}

//! Scriptable in-memory boundary network used by the test suites.

use crate::{
    canvas::{
        PixelWrite,
        Region,
    },
    config::WIDTH,
    error::TransportError,
    protocol::{
        BoundaryConnection,
        Connector,
        Principal,
        ProbeReply,
        ProtocolVersion,
        TransferArgs,
        TransferError,
        TransferReply,
    },
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostHealth {
    Healthy,
    Offline,
}

/// A reply forced onto the next transfer call, ahead of the organic ledger
/// behavior.
pub enum ScriptedReply {
    Ledger(TransferError),
    Transport(TransportError),
}

#[derive(Default)]
struct NetState {
    hosts: HashMap<String, HostHealth>,
    probe_log: Vec<String>,
    balances: HashMap<Principal, u64>,
    fee_e8s: u64,
    fee_query_unavailable: bool,
    pending_fee_change: Option<u64>,
    next_block_index: u64,
    scripted_transfers: VecDeque<ScriptedReply>,
    transfer_log: Vec<(String, TransferArgs)>,
    claim_log: Vec<(Vec<u32>, Option<String>)>,
    paint_log: Vec<usize>,
    fail_next_claim: Option<TransportError>,
    fail_next_paint: Option<TransportError>,
    primary_balance_broken: Vec<String>,
    balance_broken: Vec<String>,
    committed_colors: HashMap<u32, u32>,
    committed_links: HashMap<u32, String>,
    visible_colors: HashMap<u32, u32>,
    visible_links: HashMap<u32, String>,
    visibility_lag_reads: u32,
}

impl NetState {
    /// Serve one canvas read: stale state while the lag counter drains,
    /// converged state afterwards.
    fn on_canvas_read(&mut self) {
        if self.visibility_lag_reads > 0 {
            self.visibility_lag_reads -= 1;
        } else {
            self.visible_colors = self.committed_colors.clone();
            self.visible_links = self.committed_links.clone();
        }
    }
}

/// Shared handle onto the fake network; clones observe the same state.
#[derive(Clone)]
pub struct FakeNetwork {
    state: Arc<Mutex<NetState>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetState {
                fee_e8s: crate::config::DEFAULT_FEE_E8S,
                ..NetState::default()
            })),
        }
    }

    pub fn with_healthy_hosts(hosts: &[&str]) -> Self {
        let net = Self::new();
        for host in hosts {
            net.set_host_health(host, HostHealth::Healthy);
        }
        net
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetState> {
        self.state.lock().unwrap()
    }

    pub fn set_host_health(&self, host: &str, health: HostHealth) {
        self.lock().hosts.insert(host.to_string(), health);
    }

    pub fn set_balance(&self, owner: &Principal, e8s: u64) {
        self.lock().balances.insert(owner.clone(), e8s);
    }

    pub fn balance_of(&self, owner: &Principal) -> u64 {
        self.lock().balances.get(owner).copied().unwrap_or(0)
    }

    pub fn set_fee(&self, e8s: u64) {
        self.lock().fee_e8s = e8s;
    }

    pub fn set_fee_query_unavailable(&self, unavailable: bool) {
        self.lock().fee_query_unavailable = unavailable;
    }

    /// Change the ledger fee as of the next transfer call, as if the fee
    /// moved while a purchase was already underway.
    pub fn schedule_fee_change(&self, e8s: u64) {
        self.lock().pending_fee_change = Some(e8s);
    }

    /// Pin the block index the next accepted transfer will report.
    pub fn set_next_block_index(&self, index: u64) {
        self.lock().next_block_index = index - 1;
    }

    /// Make the primary balance query fail on `host` while the certified
    /// fallback keeps working.
    pub fn break_primary_balance(&self, host: &str) {
        self.lock().primary_balance_broken.push(host.to_string());
    }

    /// Make both balance read shapes fail on `host`.
    pub fn break_balance(&self, host: &str) {
        self.lock().balance_broken.push(host.to_string());
    }

    pub fn script_transfer(&self, reply: ScriptedReply) {
        self.lock().scripted_transfers.push_back(reply);
    }

    pub fn fail_next_claim(&self, error: TransportError) {
        self.lock().fail_next_claim = Some(error);
    }

    pub fn fail_next_paint(&self, error: TransportError) {
        self.lock().fail_next_paint = Some(error);
    }

    /// Number of canvas reads served from stale state before the read path
    /// converges on committed writes.
    pub fn set_visibility_lag(&self, reads: u32) {
        self.lock().visibility_lag_reads = reads;
    }

    pub fn probe_log(&self) -> Vec<String> {
        self.lock().probe_log.clone()
    }

    pub fn transfer_log(&self) -> Vec<(String, TransferArgs)> {
        self.lock().transfer_log.clone()
    }

    pub fn claim_log(&self) -> Vec<(Vec<u32>, Option<String>)> {
        self.lock().claim_log.clone()
    }

    pub fn paint_calls(&self) -> usize {
        self.lock().paint_log.len()
    }

    pub fn committed_link_at(&self, x: u32, y: u32) -> Option<String> {
        self.lock().committed_links.get(&(y * WIDTH + x)).cloned()
    }

    pub fn committed_color_at(&self, x: u32, y: u32) -> Option<u32> {
        self.lock().committed_colors.get(&(y * WIDTH + x)).copied()
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FakeConnector {
    net: FakeNetwork,
}

impl FakeConnector {
    pub fn new(net: FakeNetwork) -> Self {
        Self { net }
    }
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        host: &str,
        identity: Option<&Principal>,
    ) -> Result<FakeConnection, TransportError> {
        let mut state = self.net.lock();
        state.probe_log.push(host.to_string());
        match state.hosts.get(host) {
            Some(HostHealth::Healthy) => Ok(FakeConnection {
                host: host.to_string(),
                identity: identity.cloned(),
                net: self.net.clone(),
            }),
            _ => Err(TransportError::Unreachable {
                host: host.to_string(),
                message: String::from("host offline"),
            }),
        }
    }
}

pub struct FakeConnection {
    host: String,
    identity: Option<Principal>,
    net: FakeNetwork,
}

impl FakeConnection {
    fn unreachable(&self, message: &str) -> TransportError {
        TransportError::Unreachable {
            host: self.host.clone(),
            message: message.to_string(),
        }
    }
}

impl BoundaryConnection for FakeConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    async fn probe(&self) -> Result<ProbeReply, TransportError> {
        match self.net.lock().hosts.get(&self.host) {
            Some(HostHealth::Healthy) => Ok(ProbeReply {
                version: ProtocolVersion::V2,
                ledger_symbol: String::from("ICP"),
                ledger_decimals: 8,
            }),
            _ => Err(self.unreachable("host offline")),
        }
    }

    async fn balance_of(&self, owner: &Principal) -> Result<u64, TransportError> {
        let state = self.net.lock();
        if state.balance_broken.iter().any(|h| h == &self.host) {
            return Err(self.unreachable("balance reads broken"));
        }
        if state.primary_balance_broken.iter().any(|h| h == &self.host) {
            return Err(TransportError::Decode {
                host: self.host.clone(),
                message: String::from("primary balance call shape rejected"),
            });
        }
        Ok(state.balances.get(owner).copied().unwrap_or(0))
    }

    async fn balance_of_certified(
        &self,
        owner: &Principal,
    ) -> Result<u64, TransportError> {
        let state = self.net.lock();
        if state.balance_broken.iter().any(|h| h == &self.host) {
            return Err(self.unreachable("balance reads broken"));
        }
        Ok(state.balances.get(owner).copied().unwrap_or(0))
    }

    async fn transfer_fee(&self) -> Result<u64, TransportError> {
        let state = self.net.lock();
        if state.fee_query_unavailable {
            return Err(TransportError::Decode {
                host: self.host.clone(),
                message: String::from("fee query unsupported"),
            });
        }
        Ok(state.fee_e8s)
    }

    async fn fee_metadata(&self) -> Result<Vec<(String, String)>, TransportError> {
        let state = self.net.lock();
        Ok(vec![
            (String::from("ledger:symbol"), String::from("ICP")),
            (String::from("ledger:fee"), state.fee_e8s.to_string()),
        ])
    }

    async fn transfer(
        &self,
        args: TransferArgs,
    ) -> Result<TransferReply, TransportError> {
        let mut state = self.net.lock();
        state.transfer_log.push((self.host.clone(), args.clone()));
        if let Some(fee) = state.pending_fee_change.take() {
            state.fee_e8s = fee;
        }

        if let Some(scripted) = state.scripted_transfers.pop_front() {
            return match scripted {
                ScriptedReply::Ledger(rejection) => Ok(Err(rejection)),
                ScriptedReply::Transport(error) => Err(error),
            };
        }

        let Some(owner) = self.identity.clone() else {
            return Ok(Err(TransferError::Rejected {
                message: String::from("anonymous transfer"),
            }));
        };
        if args.fee_e8s != state.fee_e8s {
            return Ok(Err(TransferError::BadFee {
                expected_fee_e8s: state.fee_e8s,
            }));
        }
        let balance = state.balances.get(&owner).copied().unwrap_or(0);
        let total = args.amount_e8s + args.fee_e8s;
        if balance < total {
            return Ok(Err(TransferError::InsufficientFunds {
                balance_e8s: balance,
            }));
        }
        state.balances.insert(owner, balance - total);
        state.next_block_index += 1;
        Ok(Ok(state.next_block_index))
    }

    async fn claim_pixels(
        &self,
        indices: &[u32],
        link: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut state = self.net.lock();
        if let Some(error) = state.fail_next_claim.take() {
            return Err(error);
        }
        state
            .claim_log
            .push((indices.to_vec(), link.map(String::from)));
        if let Some(link) = link {
            for &index in indices {
                state.committed_links.insert(index, link.to_string());
            }
        }
        Ok(())
    }

    async fn paint_pixels(&self, writes: &[PixelWrite]) -> Result<(), TransportError> {
        let mut state = self.net.lock();
        if let Some(error) = state.fail_next_paint.take() {
            return Err(error);
        }
        state.paint_log.push(writes.len());
        for write in writes {
            state.committed_colors.insert(write.index, write.color);
        }
        Ok(())
    }

    async fn read_region(&self, region: Region) -> Result<Vec<u32>, TransportError> {
        let mut state = self.net.lock();
        state.on_canvas_read();
        let mut out = Vec::with_capacity(region.pixel_count() as usize);
        for y in region.y0..=region.y1 {
            for x in region.x0..=region.x1 {
                let index = y * WIDTH + x;
                out.push(state.visible_colors.get(&index).copied().unwrap_or(0));
            }
        }
        Ok(out)
    }

    async fn link_at(&self, x: u32, y: u32) -> Result<Option<String>, TransportError> {
        let mut state = self.net.lock();
        state.on_canvas_read();
        Ok(state.visible_links.get(&(y * WIDTH + x)).cloned())
    }
}

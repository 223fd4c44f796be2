use crate::{
    balance::BalanceTracker,
    canvas::{
        self,
        PaintBuffer,
        Region,
    },
    config::{
        CLAIM_SLICE,
        PAINT_SLICE,
        STICKY_AFTER_PAYMENT,
        STICKY_AFTER_VERIFY,
        VERIFY_DEADLINE,
    },
    error::{
        CommitStage,
        ConnectError,
        PurchaseError,
    },
    hosts::HostSelector,
    protocol::{
        BlockIndex,
        BoundaryConnection,
        Connector,
        Principal,
    },
    session::Session,
    transfer::TransferExecutor,
    verify::ConvergenceVerifier,
};
use tracing::{
    info,
    warn,
};

/// Client-held proposed paint for a region, staged until the purchase
/// commits or the user cancels.
#[derive(Clone, Debug)]
pub struct PendingPreview {
    pub region: Region,
    pub paint: PaintBuffer,
}

/// Progress record of a committed purchase. `claimed` implies payment,
/// `painted` implies `claimed`; `verified` is best-effort and never required
/// for the purchase to be financially final.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PurchaseReceipt {
    pub block_index: BlockIndex,
    pub claimed: bool,
    pub painted: bool,
    pub verified: bool,
}

/// Sequences payment, claim, paint and visibility verification for one
/// region, with optimistic balance accounting and partial-failure recovery.
pub struct PurchaseOrchestrator<C: Connector> {
    selector: HostSelector<C>,
    session: Session<C::Connection>,
    balance: BalanceTracker,
    transfers: TransferExecutor,
    verifier: ConvergenceVerifier,
    pending: Option<PendingPreview>,
    purchase_in_flight: bool,
}

impl<C: Connector> PurchaseOrchestrator<C> {
    pub fn new(connector: C, hosts: Vec<String>, receiver: Principal) -> Self {
        Self {
            selector: HostSelector::new(connector, hosts),
            session: Session::new(),
            balance: BalanceTracker::new(),
            transfers: TransferExecutor::new(receiver),
            verifier: ConvergenceVerifier::default(),
            pending: None,
            purchase_in_flight: false,
        }
    }

    pub fn session(&self) -> &Session<C::Connection> {
        &self.session
    }

    pub fn balance(&self) -> &BalanceTracker {
        &self.balance
    }

    pub fn selector(&self) -> &HostSelector<C> {
        &self.selector
    }

    pub fn pending_preview(&self) -> Option<&PendingPreview> {
        self.pending.as_ref()
    }

    /// Establish the session: probe for a working host, adopt the identity,
    /// then acquire an initial balance with hard retry across hosts.
    pub async fn sign_in(&mut self, identity: Principal) -> Result<(), ConnectError> {
        let connection = self
            .selector
            .connect(Some(&identity), None, self.session.sticky())
            .await?;
        self.session.sign_in(identity, connection);
        self.balance
            .refresh(&self.selector, &mut self.session, true)
            .await;
        Ok(())
    }

    /// Reset identity, connection, sticky bias, balance and any staged
    /// preview in one step.
    pub fn sign_out(&mut self) {
        self.session.sign_out();
        self.balance.reset();
        self.pending = None;
    }

    /// Refresh the balance through the current session.
    pub async fn refresh_balance(&mut self, hard_retry: bool) {
        self.balance
            .refresh(&self.selector, &mut self.session, hard_retry)
            .await;
    }

    pub fn stage_preview(&mut self, region: Region, paint: PaintBuffer) {
        self.pending = Some(PendingPreview { region, paint });
    }

    pub fn cancel_preview(&mut self) {
        self.pending = None;
    }

    /// Purchase `region`, painting it with `paint` when supplied and
    /// attaching `link` to every cell.
    ///
    /// Single-flight: a purchase while another is unresolved is rejected,
    /// not queued. Failures before a block index exists roll the optimistic
    /// balance back to its exact prior value; once payment is captured,
    /// later failures surface as partial-commit anomalies and nothing is
    /// reverted.
    pub async fn purchase(
        &mut self,
        region: Region,
        paint: Option<&PaintBuffer>,
        link: &str,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        if self.purchase_in_flight {
            return Err(PurchaseError::PurchaseInFlight);
        }
        self.purchase_in_flight = true;
        let result = self.run_purchase(region, paint, link).await;
        self.purchase_in_flight = false;
        result
    }

    async fn run_purchase(
        &mut self,
        region: Region,
        paint: Option<&PaintBuffer>,
        link: &str,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        if !self.session.is_signed_in() {
            return Err(PurchaseError::NotSignedIn);
        }
        if !canvas::is_valid_http_url(link) {
            return Err(PurchaseError::InvalidLink(link.to_string()));
        }

        let cost = canvas::cost_e8s(&region);
        let fee = {
            let connection =
                self.session.connection().ok_or(PurchaseError::NotSignedIn)?;
            self.transfers.fee_estimate(connection).await
        };
        let total = cost + fee;

        if self.balance.e8s() < total {
            return Err(PurchaseError::Affordability {
                required_e8s: total,
                available_e8s: self.balance.e8s(),
            });
        }

        info!(
            ?region,
            pixels = region.pixel_count(),
            cost_e8s = cost,
            fee_e8s = fee,
            "starting purchase"
        );
        let ticket = self.balance.begin_optimistic(total);

        let block_index = {
            let connection = match self.session.connection() {
                Some(connection) => connection,
                None => {
                    self.balance.rollback(ticket);
                    return Err(PurchaseError::NotSignedIn);
                }
            };
            match self.transfers.transfer(connection, cost, fee).await {
                Ok(index) => index,
                Err(failure) => {
                    // No payment captured: claim and paint are never
                    // attempted, and the deduction is undone verbatim.
                    self.balance.rollback(ticket);
                    return Err(PurchaseError::Payment(failure));
                }
            }
        };

        // Payment is final from here on. Keep the deduction and bias reads
        // toward the host that accepted the write.
        self.balance.commit(ticket);
        self.session.pin_sticky(STICKY_AFTER_PAYMENT);

        let connection =
            self.session.connection().ok_or(PurchaseError::NotSignedIn)?;

        let indices = region.indices();
        for chunk in indices.chunks(CLAIM_SLICE) {
            if let Err(source) = connection.claim_pixels(chunk, Some(link)).await {
                // Payment already captured; a claim failure is a reported
                // inconsistency, not a retry, since the transfer must not
                // be duplicated.
                return Err(PurchaseError::PartialCommit {
                    block_index,
                    stage: CommitStage::Claim,
                    source,
                });
            }
        }

        let mut painted = false;
        if let Some(paint) = paint {
            let writes = paint.writes_for(&region);
            for chunk in writes.chunks(PAINT_SLICE) {
                if let Err(source) = connection.paint_pixels(chunk).await {
                    return Err(PurchaseError::PartialCommit {
                        block_index,
                        stage: CommitStage::Paint,
                        source,
                    });
                }
            }
            painted = true;
        }

        // Best-effort local re-read; failure here never fails the purchase.
        if let Err(error) = connection.read_region(region).await {
            warn!(%error, "post-commit region read failed");
        }

        let verified = self
            .verifier
            .await_visible(connection, region, paint, link, VERIFY_DEADLINE)
            .await;

        self.session.pin_sticky(STICKY_AFTER_VERIFY);
        self.pending = None;
        self.refresh_balance(true).await;

        info!(
            block_index,
            painted, verified, "purchase complete"
        );
        Ok(PurchaseReceipt {
            block_index,
            claimed: true,
            painted,
            verified,
        })
    }
}

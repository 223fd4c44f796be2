#![allow(non_snake_case)]

use billboard_client::{
    PaintBuffer,
    Principal,
    PurchaseError,
    PurchaseOrchestrator,
    Region,
    TransferFailure,
    error::{
        CommitStage,
        TransportError,
    },
    protocol::{
        BoundaryConnection,
        Connector,
        TransferError,
    },
    test_helpers::{
        FakeConnector,
        FakeNetwork,
        ScriptedReply,
    },
};

const HOSTS: [&str; 3] = ["https://a", "https://b", "https://c"];
const LINK: &str = "https://example.com/page";

fn ten_by_ten() -> Region {
    Region {
        x0: 0,
        y0: 0,
        x1: 9,
        y1: 9,
    }
}

fn hosts() -> Vec<String> {
    HOSTS.iter().map(|h| h.to_string()).collect()
}

async fn signed_in_client(
    net: &FakeNetwork,
    balance_e8s: u64,
) -> PurchaseOrchestrator<FakeConnector> {
    let alice = Principal::from_text("alice");
    net.set_balance(&alice, balance_e8s);
    let mut client = PurchaseOrchestrator::new(
        FakeConnector::new(net.clone()),
        hosts(),
        Principal::from_text("owner"),
    );
    client.sign_in(alice).await.unwrap();
    client
}

#[tokio::test]
async fn purchase__aborts_on_affordability_with_no_state_mutated() {
    // given: 100 px at 1_000_000 e8s/px against a 50_000_000 e8s balance
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = signed_in_client(&net, 50_000_000).await;

    // when
    let result = client.purchase(ten_by_ten(), None, LINK).await;

    // then
    match result {
        Err(PurchaseError::Affordability {
            required_e8s,
            available_e8s,
        }) => {
            assert_eq!(required_e8s, 100_010_000);
            assert_eq!(available_e8s, 50_000_000);
        }
        other => panic!("expected affordability error, got {other:?}"),
    }
    assert_eq!(client.balance().e8s(), 50_000_000);
    assert!(net.transfer_log().is_empty());
    assert!(net.claim_log().is_empty());
}

#[tokio::test]
async fn purchase__commits_payment_claim_and_paint_once_each() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.set_next_block_index(42);
    let mut client = signed_in_client(&net, 200_000_000).await;
    let region = ten_by_ten();
    let paint = PaintBuffer::solid(region.width(), region.height(), 0xFFAA_5500);

    // when
    let receipt = client
        .purchase(region, Some(&paint), LINK)
        .await
        .unwrap();

    // then: one transfer, one claim batch, one paint batch
    assert_eq!(receipt.block_index, 42);
    assert!(receipt.claimed && receipt.painted && receipt.verified);
    assert_eq!(net.transfer_log().len(), 1);
    let claims = net.claim_log();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].0.len(), 100);
    assert_eq!(claims[0].1.as_deref(), Some(LINK));
    assert_eq!(net.paint_calls(), 1);
    assert_eq!(client.balance().e8s(), 200_000_000 - 100_010_000);
    assert_eq!(net.committed_link_at(5, 5).as_deref(), Some(LINK));
    assert_eq!(net.committed_color_at(9, 9), Some(0xFFAA_5500));
}

#[tokio::test]
async fn purchase__sets_a_sticky_bias_toward_the_paying_host() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    client.purchase(ten_by_ten(), None, LINK).await.unwrap();

    // then
    let sticky = client.session().sticky().expect("sticky host pinned");
    assert_eq!(sticky.host, "https://a");
    assert!(sticky.is_live());
}

#[tokio::test]
async fn purchase__retries_once_with_the_corrected_fee_on_bad_fee() {
    // given: the ledger fee moves to 20_000 under the client's 10_000 guess
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.schedule_fee_change(20_000);
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let receipt = client.purchase(ten_by_ten(), None, LINK).await.unwrap();

    // then: exactly one retry, corrected fee, same timestamp policy
    let log = net.transfer_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].1.fee_e8s, 10_000);
    assert!(log[0].1.created_at_time_ns.is_some());
    assert_eq!(log[1].1.fee_e8s, 20_000);
    assert!(log[1].1.created_at_time_ns.is_some());
    assert!(receipt.claimed);
    // Total deducted reflects the corrected fee, not the original guess.
    assert_eq!(client.balance().e8s(), 200_000_000 - 100_020_000);
}

#[tokio::test]
async fn purchase__retries_without_timestamp_on_clock_skew() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.script_transfer(ScriptedReply::Ledger(TransferError::TooOld));
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let receipt = client.purchase(ten_by_ten(), None, LINK).await.unwrap();

    // then
    let log = net.transfer_log();
    assert_eq!(log.len(), 2);
    assert!(log[0].1.created_at_time_ns.is_some());
    assert!(log[1].1.created_at_time_ns.is_none());
    assert!(receipt.claimed);
}

#[tokio::test]
async fn purchase__falls_back_without_timestamp_on_transport_failure() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.script_transfer(ScriptedReply::Transport(TransportError::Timeout {
        host: String::from("https://a"),
    }));
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let receipt = client.purchase(ten_by_ten(), None, LINK).await.unwrap();

    // then
    let log = net.transfer_log();
    assert_eq!(log.len(), 2);
    assert!(log[1].1.created_at_time_ns.is_none());
    assert!(receipt.claimed);
}

#[tokio::test]
async fn purchase__rolls_back_the_exact_balance_when_payment_fails() {
    // given: the ledger drained after sign-in, so the transfer is rejected
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = signed_in_client(&net, 200_000_000).await;
    net.set_balance(&Principal::from_text("alice"), 10_000);

    // when
    let result = client.purchase(ten_by_ten(), None, LINK).await;

    // then: no claim attempted, local balance restored verbatim
    assert!(matches!(
        result,
        Err(PurchaseError::Payment(TransferFailure::InsufficientFunds { .. }))
    ));
    assert_eq!(client.balance().e8s(), 200_000_000);
    assert!(net.claim_log().is_empty());
}

#[tokio::test]
async fn purchase__treats_a_duplicate_as_terminal_without_rededucting() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.script_transfer(ScriptedReply::Ledger(TransferError::Duplicate {
        duplicate_of: 7,
    }));
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let result = client.purchase(ten_by_ten(), None, LINK).await;

    // then: no retry, no re-deduction, claim never attempted
    assert!(matches!(
        result,
        Err(PurchaseError::Payment(TransferFailure::AlreadySubmitted {
            duplicate_of: 7
        }))
    ));
    assert_eq!(net.transfer_log().len(), 1);
    assert_eq!(client.balance().e8s(), 200_000_000);
    assert!(net.claim_log().is_empty());
}

#[tokio::test]
async fn purchase__surfaces_a_claim_failure_as_partial_commit() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.set_next_block_index(42);
    net.fail_next_claim(TransportError::Unreachable {
        host: String::from("https://a"),
        message: String::from("claim route down"),
    });
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let result = client.purchase(ten_by_ten(), None, LINK).await;

    // then: payment is final, balance stays deducted, transfer never re-run
    match result {
        Err(PurchaseError::PartialCommit {
            block_index,
            stage,
            ..
        }) => {
            assert_eq!(block_index, 42);
            assert_eq!(stage, CommitStage::Claim);
        }
        other => panic!("expected partial commit, got {other:?}"),
    }
    assert_eq!(net.transfer_log().len(), 1);
    assert_eq!(client.balance().e8s(), 200_000_000 - 100_010_000);
}

#[tokio::test]
async fn purchase__surfaces_a_paint_failure_after_a_successful_claim() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    net.fail_next_paint(TransportError::Unreachable {
        host: String::from("https://a"),
        message: String::from("paint route down"),
    });
    let mut client = signed_in_client(&net, 200_000_000).await;
    let region = ten_by_ten();
    let paint = PaintBuffer::solid(region.width(), region.height(), 0xFF00_FF00);

    // when
    let result = client.purchase(region, Some(&paint), LINK).await;

    // then
    assert!(matches!(
        result,
        Err(PurchaseError::PartialCommit {
            stage: CommitStage::Paint,
            ..
        })
    ));
    assert_eq!(net.claim_log().len(), 1);
    assert_eq!(net.transfer_log().len(), 1);
}

#[tokio::test]
async fn purchase__rejects_an_invalid_link_before_any_remote_call() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = signed_in_client(&net, 200_000_000).await;

    // when
    let result = client.purchase(ten_by_ten(), None, "ftp://nope").await;

    // then
    assert!(matches!(result, Err(PurchaseError::InvalidLink(_))));
    assert!(net.transfer_log().is_empty());
}

#[tokio::test]
async fn purchase__requires_a_signed_in_session() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = PurchaseOrchestrator::new(
        FakeConnector::new(net.clone()),
        hosts(),
        Principal::from_text("owner"),
    );

    // when
    let result = client.purchase(ten_by_ten(), None, LINK).await;

    // then
    assert!(matches!(result, Err(PurchaseError::NotSignedIn)));
}

#[tokio::test]
async fn claim_pixels__is_idempotent_for_the_same_region_and_link() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let conn = FakeConnector::new(net.clone())
        .connect("https://a", None)
        .await
        .unwrap();
    let region = ten_by_ten();

    // when: the rightful owner claims the same cells twice
    conn.claim_pixels(&region.indices(), Some(LINK)).await.unwrap();
    let after_once = net.committed_link_at(5, 5);
    conn.claim_pixels(&region.indices(), Some(LINK)).await.unwrap();

    // then: the second claim neither errors nor changes the final state
    assert_eq!(net.committed_link_at(5, 5), after_once);
    assert_eq!(net.claim_log().len(), 2);
}

#[tokio::test]
async fn sign_out__resets_balance_and_preview() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&HOSTS);
    let mut client = signed_in_client(&net, 200_000_000).await;
    let region = ten_by_ten();
    client.stage_preview(
        region,
        PaintBuffer::solid(region.width(), region.height(), 1),
    );

    // when
    client.sign_out();

    // then
    assert_eq!(client.balance().e8s(), 0);
    assert!(client.pending_preview().is_none());
    assert!(!client.session().is_signed_in());
}

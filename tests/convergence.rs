#![allow(non_snake_case)]

use billboard_client::{
    PaintBuffer,
    Region,
    canvas::PixelWrite,
    protocol::{
        BoundaryConnection,
        Connector,
    },
    test_helpers::{
        FakeConnector,
        FakeNetwork,
    },
    verify::ConvergenceVerifier,
};
use std::time::{
    Duration,
    Instant,
};

const LINK: &str = "https://example.com/page";

fn region() -> Region {
    Region {
        x0: 0,
        y0: 0,
        x1: 4,
        y1: 4,
    }
}

fn fast_verifier() -> ConvergenceVerifier {
    ConvergenceVerifier::new(
        Duration::from_millis(10),
        1.3,
        Duration::from_millis(40),
    )
}

async fn connection(net: &FakeNetwork) -> impl BoundaryConnection {
    FakeConnector::new(net.clone())
        .connect("https://a", None)
        .await
        .unwrap()
}

/// Commit a solid paint plus the link for the test region, as a purchase
/// would have.
async fn commit_region(conn: &impl BoundaryConnection, paint: &PaintBuffer) {
    let region = region();
    conn.claim_pixels(&region.indices(), Some(LINK)).await.unwrap();
    let writes: Vec<PixelWrite> = paint.writes_for(&region);
    conn.paint_pixels(&writes).await.unwrap();
}

#[tokio::test]
async fn await_visible__returns_true_when_the_read_path_already_converged() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    let paint = PaintBuffer::solid(5, 5, 0xFF12_3456);
    commit_region(&conn, &paint).await;

    // when
    let visible = fast_verifier()
        .await_visible(&conn, region(), Some(&paint), LINK, Duration::from_secs(2))
        .await;

    // then
    assert!(visible);
}

#[tokio::test]
async fn await_visible__converges_once_the_replicas_catch_up() {
    // given: the first several reads serve stale state
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    let paint = PaintBuffer::solid(5, 5, 0xFF12_3456);
    commit_region(&conn, &paint).await;
    net.set_visibility_lag(7);

    // when
    let visible = fast_verifier()
        .await_visible(&conn, region(), Some(&paint), LINK, Duration::from_secs(5))
        .await;

    // then
    assert!(visible);
}

#[tokio::test]
async fn await_visible__returns_false_at_the_deadline_when_never_converged() {
    // given: nothing was ever committed
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    let deadline = Duration::from_millis(150);

    // when
    let started = Instant::now();
    let visible = fast_verifier()
        .await_visible(&conn, region(), None, LINK, deadline)
        .await;

    // then: false, after the full deadline, without an error
    assert!(!visible);
    assert!(started.elapsed() >= deadline);
}

#[tokio::test]
async fn await_visible__fails_while_only_some_samples_match() {
    // given: the link is committed but the paint never lands
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    let paint = PaintBuffer::solid(5, 5, 0xFFAB_CDEF);
    conn.claim_pixels(&region().indices(), Some(LINK))
        .await
        .unwrap();

    // when
    let visible = fast_verifier()
        .await_visible(
            &conn,
            region(),
            Some(&paint),
            LINK,
            Duration::from_millis(200),
        )
        .await;

    // then
    assert!(!visible);
}

#[tokio::test]
async fn await_visible__accepts_a_stored_link_with_the_expected_prefix() {
    // given: the stored link carries a tracking suffix
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    let stored = format!("{LINK}?utm=pixel");
    conn.claim_pixels(&region().indices(), Some(&stored))
        .await
        .unwrap();

    // when: position-only verification, no paint expectations
    let visible = fast_verifier()
        .await_visible(&conn, region(), None, LINK, Duration::from_secs(1))
        .await;

    // then
    assert!(visible);
}

#[tokio::test]
async fn await_visible__rejects_a_different_link() {
    // given
    let net = FakeNetwork::with_healthy_hosts(&["https://a"]);
    let conn = connection(&net).await;
    conn.claim_pixels(&region().indices(), Some("https://other.example"))
        .await
        .unwrap();

    // when
    let visible = fast_verifier()
        .await_visible(&conn, region(), None, LINK, Duration::from_millis(120))
        .await;

    // then
    assert!(!visible);
}

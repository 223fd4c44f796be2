//! Fixed configuration for the billboard client. The orchestrator treats all
//! of these as build-time constants; none are re-read at runtime.

use std::time::Duration;

/// Canvas dimensions in pixels.
pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 1000;

/// Tile edge used by the parallel canvas fetch fallback.
pub const TILE: u32 = 125;

/// Maximum pixel indices per claim call.
pub const CLAIM_SLICE: usize = 4000;
/// Maximum pixel writes per paint call.
pub const PAINT_SLICE: usize = 2000;

/// 0.01 tokens per pixel, in e8s.
pub const PRICE_E8S: u64 = 1_000_000;

/// Last-resort transfer fee when neither the fee query nor the metadata
/// fallback yields one.
pub const DEFAULT_FEE_E8S: u64 = 10_000;

/// Boundary hosts to probe, in preference order.
pub const HOSTS: [&str; 3] = [
    "https://icp-api.io",
    "https://ic0.app",
    "https://boundary.ic0.app",
];

/// Ledger service id on the boundary hosts.
pub const LEDGER_SERVICE_ID: &str = "ryjl3-tyaaa-aaaaa-aaaba-cai";

/// Billboard service id on the boundary hosts.
pub const BILLBOARD_SERVICE_ID: &str = "ombb-billboard";

/// Receiver of all purchase payments.
pub const OWNER_RECEIVER: &str =
    "o72d6-axkp7-lv7lv-24bj5-vldpt-tqd2q-3f3n6-5wdn6-tizzq-ubugz-bae";

/// Bounded liveness probe per candidate host.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2_500);

/// Interval between periodic balance refreshes while watching.
pub const BALANCE_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Advisory timeout on a single balance read.
pub const BALANCE_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Sleep before the single retry of a transiently-unavailable transfer.
pub const TRANSFER_TRANSIENT_BACKOFF: Duration = Duration::from_millis(400);

/// Overall deadline for post-commit visibility verification.
pub const VERIFY_DEADLINE: Duration = Duration::from_secs(15);

/// Sticky-host window opened right after a payment is accepted.
pub const STICKY_AFTER_PAYMENT: Duration = Duration::from_secs(90);

/// Shorter sticky-host window refreshed once verification finishes.
pub const STICKY_AFTER_VERIFY: Duration = Duration::from_secs(60);

/// Concurrency cap for the tiled canvas fetch.
pub const RENDER_CONCURRENCY: usize = 16;

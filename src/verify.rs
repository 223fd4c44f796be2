use crate::{
    canvas::{
        PaintBuffer,
        Region,
    },
    protocol::BoundaryConnection,
    retry::Backoff,
};
use std::time::{
    Duration,
    Instant,
};
use tokio::time;
use tracing::{
    debug,
    info,
    warn,
};

const POLL_BASE: Duration = Duration::from_millis(250);
const POLL_MULTIPLIER: f64 = 1.3;
const POLL_CAP: Duration = Duration::from_millis(1_200);

/// Polls the public read path after a commit until the replicated state
/// reflects the write, or a deadline elapses. Best-effort by contract: the
/// purchase is already financially final when this runs.
pub struct ConvergenceVerifier {
    base: Duration,
    multiplier: f64,
    cap: Duration,
}

impl Default for ConvergenceVerifier {
    fn default() -> Self {
        Self {
            base: POLL_BASE,
            multiplier: POLL_MULTIPLIER,
            cap: POLL_CAP,
        }
    }
}

impl ConvergenceVerifier {
    pub fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// True once every sampled color equals the expected paint and the link
    /// at the centroid matches (exactly, or as a prefix of the stored
    /// value); false when `deadline` elapses first. Never errors: read
    /// failures simply fail the round.
    pub async fn await_visible<Conn: BoundaryConnection>(
        &self,
        connection: &Conn,
        region: Region,
        expected_paint: Option<&PaintBuffer>,
        expected_link: &str,
        deadline: Duration,
    ) -> bool {
        let samples = region.sample_points();
        let expected_colors: Option<Vec<(u32, u32, u32)>> =
            expected_paint.map(|paint| {
                samples
                    .iter()
                    .map(|&(x, y)| (x, y, paint.expected_at(&region, x, y)))
                    .collect()
            });

        let started = Instant::now();
        let mut backoff = Backoff::new(self.base, self.multiplier, self.cap);
        loop {
            if round_matches(connection, region, &expected_colors, expected_link)
                .await
            {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "write visible on the read path"
                );
                return true;
            }
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "visibility not confirmed before deadline"
                );
                return false;
            }
            time::sleep(backoff.next_delay().min(remaining)).await;
            if started.elapsed() >= deadline {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "visibility not confirmed before deadline"
                );
                return false;
            }
        }
    }
}

/// One polling round: the link at the centroid, then every sampled color.
/// All must match.
async fn round_matches<Conn: BoundaryConnection>(
    connection: &Conn,
    region: Region,
    expected_colors: &Option<Vec<(u32, u32, u32)>>,
    expected_link: &str,
) -> bool {
    let (cx, cy) = region.centroid();
    match connection.link_at(cx, cy).await {
        Ok(Some(stored)) => {
            if stored != expected_link && !stored.starts_with(expected_link) {
                debug!(%stored, expected = expected_link, "link not yet visible");
                return false;
            }
        }
        Ok(None) => return false,
        Err(error) => {
            debug!(%error, "link read failed this round");
            return false;
        }
    }

    let Some(expected_colors) = expected_colors else {
        return true;
    };
    for &(x, y, expected) in expected_colors {
        let cell = Region {
            x0: x,
            y0: y,
            x1: x,
            y1: y,
        };
        match connection.read_region(cell).await {
            Ok(colors) if colors.first() == Some(&expected) => {}
            Ok(_) => {
                debug!(x, y, expected, "color not yet visible");
                return false;
            }
            Err(error) => {
                debug!(%error, "color read failed this round");
                return false;
            }
        }
    }
    true
}

use crate::kinetics::{DelaySampler, EmitReport, HumanDelaySampler, KineticScrollEngine};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tablescroll_common::Result;
use tablescroll_drivers::Surface;
use tokio::time::sleep;

/// Signed pixel deltas; positive is right/down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollRequest {
    pub horizontal_delta: i64,
    pub vertical_delta: i64,
}

impl ScrollRequest {
    pub fn new(horizontal_delta: i64, vertical_delta: i64) -> Self {
        Self {
            horizontal_delta,
            vertical_delta,
        }
    }

    pub fn down(px: i64) -> Self {
        Self::new(0, px)
    }

    pub fn is_noop(&self) -> bool {
        self.horizontal_delta == 0 && self.vertical_delta == 0
    }
}

/// `240 pixels down`, `30 pixels right and 400 pixels up`, `no movement`.
impl fmt::Display for ScrollRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.horizontal_delta != 0 {
            let dir = if self.horizontal_delta > 0 { "right" } else { "left" };
            parts.push(format!("{} pixels {dir}", self.horizontal_delta.unsigned_abs()));
        }
        if self.vertical_delta != 0 {
            let dir = if self.vertical_delta > 0 { "down" } else { "up" };
            parts.push(format!("{} pixels {dir}", self.vertical_delta.unsigned_abs()));
        }
        if parts.is_empty() {
            f.write_str("no movement")
        } else {
            f.write_str(&parts.join(" and "))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrollOutcome {
    pub segments: usize,
    pub impulses: EmitReport,
    /// `false` when the settle wait timed out or could not be observed.
    pub settled: bool,
}

/// Plans both axes, emits the segment pairs with pauses in between, then
/// waits for the page to settle.
pub struct HumanScroller<D = HumanDelaySampler, R = StdRng> {
    engine: KineticScrollEngine<D, R>,
    settle_timeout: Duration,
}

impl HumanScroller {
    pub fn human(settle_timeout: Duration) -> Self {
        Self::new(KineticScrollEngine::human(), settle_timeout)
    }
}

impl<D: DelaySampler, R: Rng + Send> HumanScroller<D, R> {
    pub fn new(engine: KineticScrollEngine<D, R>, settle_timeout: Duration) -> Self {
        Self {
            engine,
            settle_timeout,
        }
    }

    pub async fn perform<S>(&mut self, surface: &S, request: ScrollRequest) -> Result<ScrollOutcome>
    where
        S: Surface + ?Sized,
    {
        let mut outcome = ScrollOutcome::default();
        if request.is_noop() {
            outcome.settled = true;
            return Ok(outcome);
        }

        let mut xs = self.engine.plan(request.horizontal_delta);
        let mut ys = self.engine.plan(request.vertical_delta);
        let pairs = xs.len().max(ys.len());
        xs.resize(pairs, 0);
        ys.resize(pairs, 0);
        outcome.segments = pairs;

        tracing::info!(request = %request, segments = pairs, "scroll.start");
        for (i, (sx, sy)) in xs.into_iter().zip(ys).enumerate() {
            let report = self.engine.emit(surface, sx, sy).await?;
            outcome.impulses.absorb(report);
            tracing::debug!(
                segment = i + 1,
                of = pairs,
                dx = sx,
                dy = sy,
                tremors = report.tremors,
                "scroll.segment.done"
            );
            if i + 1 < pairs {
                sleep(self.engine.sampler_mut().between_segments()).await;
            }
        }

        outcome.settled = match surface.wait_for_quiescence(self.settle_timeout).await {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!(error = %e, "scroll.settle.failed");
                false
            }
        };
        tracing::info!(
            request = %request,
            settled = outcome.settled,
            tremors = outcome.impulses.tremors,
            "scroll.done"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::FixedDelay;
    use rand::SeedableRng;
    use tablescroll_drivers::{MemorySurface, SurfaceEvent};

    fn scroller(seed: u64) -> HumanScroller<FixedDelay, StdRng> {
        HumanScroller::new(
            KineticScrollEngine::new(FixedDelay::default(), StdRng::seed_from_u64(seed)),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn summary_text_reads_naturally() {
        assert_eq!(ScrollRequest::down(240).to_string(), "240 pixels down");
        assert_eq!(
            ScrollRequest::new(30, -400).to_string(),
            "30 pixels right and 400 pixels up"
        );
        assert_eq!(ScrollRequest::new(-5, 0).to_string(), "5 pixels left");
        assert_eq!(ScrollRequest::default().to_string(), "no movement");
    }

    #[tokio::test]
    async fn full_request_lands_exactly_and_settles_once() {
        let surface = MemorySurface::new();
        let mut s = scroller(4);
        let outcome = s.perform(&surface, ScrollRequest::new(-120, 600)).await.unwrap();
        assert_eq!(surface.wheel_totals(), (-120, 600));
        assert_eq!(outcome.segments, 6);
        assert!(outcome.settled);
        let settles = surface
            .events()
            .iter()
            .filter(|e| **e == SurfaceEvent::Settle)
            .count();
        assert_eq!(settles, 1);
        assert_eq!(surface.events().last(), Some(&SurfaceEvent::Settle));
    }

    #[tokio::test]
    async fn settle_timeout_is_not_an_error() {
        let surface = MemorySurface::new().never_settles();
        let mut s = scroller(8);
        let outcome = s.perform(&surface, ScrollRequest::down(40)).await.unwrap();
        assert!(!outcome.settled);
        assert_eq!(surface.wheel_totals(), (0, 40));
    }

    #[tokio::test]
    async fn noop_request_touches_nothing() {
        let surface = MemorySurface::new();
        let mut s = scroller(1);
        let outcome = s.perform(&surface, ScrollRequest::default()).await.unwrap();
        assert_eq!(outcome.segments, 0);
        assert!(surface.events().is_empty());
    }
}

//! Wheel impulse emission with a human timing model.
//!
//! [`KineticScrollEngine::emit`] walks one segment pair down to zero, one
//! 1-px impulse at a time. Which axis advances is drawn in proportion to the
//! distance each axis still has to travel. A small tremor chance swallows an
//! impulse without consuming distance, so the effective impulse count always
//! equals the requested magnitude. All pauses come from a [`DelaySampler`].

use crate::segment;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use tablescroll_common::Result;
use tablescroll_drivers::Surface;
use tokio::time::sleep;

const TREMOR_CHANCE: f64 = 0.02;
const PROGRESS_LOG_EVERY: u64 = 50;

/// Why a pause has the length it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    Base,
    Burst,
    Medium,
    Cognitive,
    ClusterBoundary,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    pub kind: PauseKind,
    pub duration: Duration,
}

/// Source of every pause the engine takes.
///
/// Swapping in [`FixedDelay`] makes emission deterministic and instant.
pub trait DelaySampler: Send {
    /// Called once at the start of every `emit` call.
    fn begin_emit(&mut self) {}

    /// Optional settling pause before the first impulse of a call.
    fn initial_pause(&mut self) -> Option<Duration>;

    /// Pause after impulse number `step` (1-based within the call).
    fn impulse_delay(&mut self, step: u64) -> Pause;

    /// Pause between two segment pairs of one scroll request.
    fn between_segments(&mut self) -> Duration;
}

/// Layered human timing model.
///
/// Later layers override earlier ones for the same impulse:
/// base 15–18 ms, 8% bursts of 7–9 ms, an occasional 24–33 ms medium pause
/// after 15–25 impulses, a weighted cognitive pause every 30–40 impulses,
/// and an 80–110 ms break at every cluster boundary (clusters of 10–20).
pub struct HumanDelaySampler {
    rng: StdRng,
    since_medium: u64,
    medium_after: u64,
    next_cognitive: u64,
    cluster_len: u64,
    cluster_size: u64,
}

/// Cognitive pause bands in ms, with decreasing odds for longer bands.
const COGNITIVE_BANDS: [(u64, u64, f64); 4] = [
    (65, 85, 0.4),
    (90, 120, 0.3),
    (130, 160, 0.2),
    (350, 450, 0.1),
];

impl HumanDelaySampler {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let cluster_size = rng.gen_range(10..=20);
        let next_cognitive = rng.gen_range(30..=40);
        let medium_after = rng.gen_range(15..=25);
        Self {
            rng,
            since_medium: 0,
            medium_after,
            next_cognitive,
            cluster_len: 0,
            cluster_size,
        }
    }

    fn millis(&mut self, lo: u64, hi: u64) -> Duration {
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }
}

impl Default for HumanDelaySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl DelaySampler for HumanDelaySampler {
    fn begin_emit(&mut self) {
        self.since_medium = 0;
        self.medium_after = self.rng.gen_range(15..=25);
        self.cluster_len = 0;
        self.cluster_size = self.rng.gen_range(10..=20);
        self.next_cognitive = self.rng.gen_range(30..=40);
    }

    fn initial_pause(&mut self) -> Option<Duration> {
        if self.rng.gen_bool(0.7) {
            Some(self.millis(2_000, 2_600))
        } else {
            None
        }
    }

    fn impulse_delay(&mut self, step: u64) -> Pause {
        self.since_medium += 1;
        self.cluster_len += 1;

        let mut pause = Pause {
            kind: PauseKind::Base,
            duration: self.millis(15, 18),
        };
        if self.rng.gen_bool(0.08) {
            pause = Pause {
                kind: PauseKind::Burst,
                duration: self.millis(7, 9),
            };
        }
        if self.since_medium > self.medium_after && self.rng.gen_bool(0.3) {
            pause = Pause {
                kind: PauseKind::Medium,
                duration: self.millis(24, 33),
            };
            self.since_medium = 0;
            self.medium_after = self.rng.gen_range(15..=25);
        }
        if step >= self.next_cognitive {
            let (lo, hi) = COGNITIVE_BANDS
                .choose_weighted(&mut self.rng, |band| band.2)
                .map(|band| (band.0, band.1))
                .unwrap_or((COGNITIVE_BANDS[0].0, COGNITIVE_BANDS[0].1));
            pause = Pause {
                kind: PauseKind::Cognitive,
                duration: self.millis(lo, hi),
            };
            self.next_cognitive = step + self.rng.gen_range(30..=40);
        }
        if self.cluster_len >= self.cluster_size {
            pause = Pause {
                kind: PauseKind::ClusterBoundary,
                duration: self.millis(80, 110),
            };
            self.cluster_len = 0;
            self.cluster_size = self.rng.gen_range(10..=20);
        }
        pause
    }

    fn between_segments(&mut self) -> Duration {
        self.millis(200, 1_200)
    }
}

/// Constant pauses and no initial pause.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl DelaySampler for FixedDelay {
    fn initial_pause(&mut self) -> Option<Duration> {
        None
    }

    fn impulse_delay(&mut self, _step: u64) -> Pause {
        Pause {
            kind: PauseKind::Fixed,
            duration: self.0,
        }
    }

    fn between_segments(&mut self) -> Duration {
        self.0
    }
}

/// What one `emit` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitReport {
    pub x_impulses: u64,
    pub y_impulses: u64,
    pub tremors: u64,
    pub steps: u64,
}

impl EmitReport {
    pub fn absorb(&mut self, other: EmitReport) {
        self.x_impulses += other.x_impulses;
        self.y_impulses += other.y_impulses;
        self.tremors += other.tremors;
        self.steps += other.steps;
    }
}

pub struct KineticScrollEngine<D, R> {
    sampler: D,
    rng: R,
    tremor_chance: f64,
}

impl KineticScrollEngine<HumanDelaySampler, StdRng> {
    /// Production engine: human timing, entropy-seeded.
    pub fn human() -> Self {
        Self::new(HumanDelaySampler::new(), StdRng::from_entropy())
    }
}

impl<D: DelaySampler, R: Rng + Send> KineticScrollEngine<D, R> {
    pub fn new(sampler: D, rng: R) -> Self {
        Self {
            sampler,
            rng,
            tremor_chance: TREMOR_CHANCE,
        }
    }

    /// Override the tremor probability; clamped to `[0, 0.5]` so emission
    /// always terminates.
    pub fn with_tremor_chance(mut self, chance: f64) -> Self {
        self.tremor_chance = chance.clamp(0.0, 0.5);
        self
    }

    /// Plan one axis with this engine's RNG.
    pub fn plan(&mut self, total: i64) -> Vec<i64> {
        segment::plan_with(total, &mut self.rng)
    }

    pub fn sampler_mut(&mut self) -> &mut D {
        &mut self.sampler
    }

    /// Dispatch `|sx| + |sy|` single-pixel wheel impulses.
    pub async fn emit<S>(&mut self, surface: &S, sx: i64, sy: i64) -> Result<EmitReport>
    where
        S: Surface + ?Sized,
    {
        let mut report = EmitReport::default();
        let (dir_x, dir_y) = (sx.signum() as i32, sy.signum() as i32);
        let (mut rem_x, mut rem_y) = (sx.unsigned_abs(), sy.unsigned_abs());
        if rem_x == 0 && rem_y == 0 {
            return Ok(report);
        }
        let total = rem_x.saturating_add(rem_y);

        self.sampler.begin_emit();
        if let Some(pause) = self.sampler.initial_pause() {
            tracing::trace!(pause_ms = pause.as_millis() as u64, "scroll.initial_pause");
            sleep(pause).await;
        }

        while rem_x > 0 || rem_y > 0 {
            report.steps += 1;
            let move_x = if rem_x > 0 && rem_y > 0 {
                self.rng.gen_bool(rem_x as f64 / (rem_x as f64 + rem_y as f64))
            } else {
                rem_x > 0
            };

            if self.rng.gen_bool(self.tremor_chance) {
                report.tremors += 1;
            } else if move_x {
                surface.dispatch_wheel(dir_x, 0).await?;
                rem_x -= 1;
                report.x_impulses += 1;
            } else {
                surface.dispatch_wheel(0, dir_y).await?;
                rem_y -= 1;
                report.y_impulses += 1;
            }

            let pause = self.sampler.impulse_delay(report.steps);
            if pause.kind == PauseKind::Cognitive || pause.kind == PauseKind::ClusterBoundary {
                tracing::trace!(
                    step = report.steps,
                    kind = ?pause.kind,
                    pause_ms = pause.duration.as_millis() as u64,
                    "scroll.pause"
                );
            }
            if report.steps % PROGRESS_LOG_EVERY == 0 {
                let done = report.x_impulses + report.y_impulses;
                tracing::debug!(
                    step = report.steps,
                    done,
                    total,
                    tremors = report.tremors,
                    "scroll.progress"
                );
            }
            sleep(pause.duration).await;
        }

        Ok(report)
    }
}

//! The driving loop: observe, extract, judge, scroll, repeat.
//!
//! One session owns one surface, one store file, and its own oracle and
//! extractor; nothing is shared between sessions. Cancellation is checked
//! between steps and during retry backoff.

use crate::extract::Extractor;
use crate::frame::ObservationFrame;
use crate::kinetics::{DelaySampler, HumanDelaySampler};
use crate::oracle::StopOracle;
use crate::scroll::{HumanScroller, ScrollRequest};
use crate::verdict::StopVerdict;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tablescroll_common::Result;
use tablescroll_config::{Point, SessionSettings};
use tablescroll_drivers::browser::behavioral::glide_pointer;
use tablescroll_drivers::Surface;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Stopped,
    Cancelled,
    CycleLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: u32,
    pub written: usize,
    pub skipped_duplicates: usize,
    pub store_path: PathBuf,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per cycle, at least one.
    pub attempts: u32,
    /// Multiplied by the attempt number before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for RetryPolicy {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            attempts: settings.retry_attempts.max(1),
            backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Pointer glide performed once before the first cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerGlide {
    pub from: (i32, i32),
    pub to: Point,
    pub steps: u32,
}

enum CycleEnd {
    Continue,
    Stop,
    Cancelled,
}

pub struct ScrollSession<D = HumanDelaySampler, R = StdRng> {
    surface: Arc<dyn Surface>,
    oracle: StopOracle,
    extractor: Extractor,
    scroller: HumanScroller<D, R>,
    store_path: PathBuf,
    retry: RetryPolicy,
    max_cycles: u32,
    glide: Option<PointerGlide>,
    archive_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<D: DelaySampler, R: Rng + Send> ScrollSession<D, R> {
    pub fn new(
        surface: Arc<dyn Surface>,
        oracle: StopOracle,
        extractor: Extractor,
        scroller: HumanScroller<D, R>,
        store_path: impl Into<PathBuf>,
    ) -> Self {
        let defaults = SessionSettings::default();
        Self {
            surface,
            oracle,
            extractor,
            scroller,
            store_path: store_path.into(),
            retry: RetryPolicy::from(&defaults),
            max_cycles: defaults.max_cycles,
            glide: None,
            archive_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: &SessionSettings) -> Self {
        self.retry = RetryPolicy::from(settings);
        self.max_cycles = settings.max_cycles;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            attempts: retry.attempts.max(1),
            ..retry
        };
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_glide(mut self, glide: PointerGlide) -> Self {
        self.glide = Some(glide);
        self
    }

    pub fn with_archive_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.archive_dir = dir;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run at the next step boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary {
            cycles: 0,
            written: 0,
            skipped_duplicates: 0,
            store_path: self.store_path.clone(),
            outcome: RunOutcome::CycleLimit,
        };

        if let Some(glide) = self.glide {
            let mut rng = StdRng::from_entropy();
            let to = (glide.to.x, glide.to.y);
            glide_pointer(self.surface.as_ref(), glide.from, to, glide.steps, &mut rng).await?;
            info!(x = to.0, y = to.1, "session.anchored");
        }

        let mut failures = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                summary.outcome = RunOutcome::Cancelled;
                break;
            }
            if summary.cycles >= self.max_cycles {
                warn!(max_cycles = self.max_cycles, "session.cycle_limit");
                summary.outcome = RunOutcome::CycleLimit;
                break;
            }

            let cycle = summary.cycles + 1;
            match self.cycle(cycle, &mut summary).await {
                Ok(end) => {
                    failures = 0;
                    summary.cycles = cycle;
                    match end {
                        CycleEnd::Continue => {}
                        CycleEnd::Stop => {
                            summary.outcome = RunOutcome::Stopped;
                            break;
                        }
                        CycleEnd::Cancelled => {
                            summary.outcome = RunOutcome::Cancelled;
                            break;
                        }
                    }
                }
                Err(e) if e.is_retryable() && failures + 1 < self.retry.attempts => {
                    failures += 1;
                    let backoff = self.retry.backoff * failures;
                    warn!(
                        cycle,
                        attempt = failures,
                        of = self.retry.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "session.retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            summary.outcome = RunOutcome::Cancelled;
                            break;
                        }
                        _ = sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    warn!(cycle, error = %e, retryable = e.is_retryable(), "session.aborted");
                    return Err(e);
                }
            }
        }

        info!(
            cycles = summary.cycles,
            written = summary.written,
            skipped_duplicates = summary.skipped_duplicates,
            outcome = ?summary.outcome,
            path = %summary.store_path.display(),
            "session.finished"
        );
        Ok(summary)
    }

    /// One cycle from a fresh frame. The store is only touched by a
    /// successful extraction, and its counts land in `summary` as soon as
    /// the merge is saved, even if the judgment or the scroll fails later.
    async fn cycle(&mut self, cycle: u32, summary: &mut RunSummary) -> Result<CycleEnd> {
        let frame = ObservationFrame::capture(self.surface.as_ref()).await?;
        if let Some(dir) = &self.archive_dir {
            frame.archive(dir);
        }

        let report = self
            .extractor
            .extract_and_merge(&frame, &self.store_path)
            .await?;
        summary.written += report.written;
        summary.skipped_duplicates += report.skipped_duplicate;
        let verdict: StopVerdict = self.oracle.evaluate(&frame).await?;
        info!(
            cycle,
            decision = %verdict.decision(),
            written = report.written,
            skipped_duplicate = report.skipped_duplicate,
            "session.cycle"
        );

        let Some(px) = verdict.scroll_px() else {
            return Ok(CycleEnd::Stop);
        };
        if self.cancel.is_cancelled() {
            return Ok(CycleEnd::Cancelled);
        }
        let outcome = self
            .scroller
            .perform(self.surface.as_ref(), ScrollRequest::down(i64::from(px)))
            .await?;
        if !outcome.settled {
            info!(cycle, "session.settle_timeout");
        }
        Ok(CycleEnd::Continue)
    }
}

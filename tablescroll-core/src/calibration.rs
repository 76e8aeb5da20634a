//! Few-shot exemplars for the stop oracle.
//!
//! A calibration directory holds `*.png` screenshots. An optional
//! `calibration.json` manifest names each file and its verdict:
//!
//! ```json
//! [{"file": "gap_6_rows.png", "decision": "CONTINUE", "scroll_px": 500, "rationale": "..."}]
//! ```
//!
//! Without a manifest the images are taken in name order and paired with
//! [`CalibrationSet::builtin_verdicts`].

use crate::verdict::StopVerdict;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tablescroll_common::{Result, ScrollError};
use tablescroll_vision::ImageData;
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "calibration.json";
pub const MAX_EXEMPLARS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    pub label: String,
    pub image: ImageData,
    pub verdict: StopVerdict,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    file: PathBuf,
    decision: String,
    #[serde(default)]
    scroll_px: Option<u32>,
    #[serde(default)]
    rationale: String,
}

impl ManifestEntry {
    fn verdict(&self) -> Result<StopVerdict> {
        match self.decision.as_str() {
            "STOP" => Ok(StopVerdict::stop(self.rationale.clone())),
            "CONTINUE" => {
                let px = self.scroll_px.and_then(NonZeroU32::new).ok_or_else(|| {
                    ScrollError::Config(format!(
                        "calibration entry {} is CONTINUE without a positive scroll_px",
                        self.file.display()
                    ))
                })?;
                Ok(StopVerdict::cont(px, self.rationale.clone()))
            }
            other => Err(ScrollError::Config(format!(
                "calibration entry {} has unknown decision `{other}`",
                self.file.display()
            ))),
        }
    }
}

/// Exemplars loaded once and shared by every oracle call of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSet {
    exemplars: Vec<Exemplar>,
}

impl CalibrationSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_exemplars(mut exemplars: Vec<Exemplar>) -> Self {
        exemplars.truncate(MAX_EXEMPLARS);
        Self { exemplars }
    }

    pub fn exemplars(&self) -> &[Exemplar] {
        &self.exemplars
    }

    pub fn len(&self) -> usize {
        self.exemplars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exemplars.is_empty()
    }

    /// Verdicts paired with manifest-less calibration images, in name order.
    pub fn builtin_verdicts() -> Vec<StopVerdict> {
        let px = |n: u32| NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
        vec![
            StopVerdict::cont(
                px(500),
                "The gap between the bottom of the scroll bar and the bottom border of the table is about 5 rows.",
            ),
            StopVerdict::cont(
                px(100),
                "The gap between the bottom of the scroll bar and the bottom border of the table is about 2 rows.",
            ),
            StopVerdict::cont(
                px(100),
                "The gap between the bottom of the scroll bar and the bottom border of the table is a little over 1 row.",
            ),
            StopVerdict::stop(
                "The scroll bar touches the bottom border of the table; less than one row remains.",
            ),
            StopVerdict::cont(
                px(600),
                "The gap between the bottom of the scroll bar and the bottom border of the table is about 9 rows.",
            ),
        ]
    }

    /// Load exemplars from `dir`, keeping at most `max` (capped at six).
    ///
    /// A missing directory is not an error; a malformed manifest is.
    pub fn load(dir: &Path, max: usize) -> Result<Self> {
        let max = max.min(MAX_EXEMPLARS);
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "calibration.dir_missing");
            return Ok(Self::empty());
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        let pairs: Vec<(PathBuf, StopVerdict)> = if manifest_path.is_file() {
            let raw = fs::read_to_string(&manifest_path).map_err(|e| {
                ScrollError::Config(format!("{}: {e}", manifest_path.display()))
            })?;
            let entries: Vec<ManifestEntry> = serde_json::from_str(&raw).map_err(|e| {
                ScrollError::Config(format!("{}: {e}", manifest_path.display()))
            })?;
            entries
                .iter()
                .map(|entry| Ok((dir.join(&entry.file), entry.verdict()?)))
                .collect::<Result<_>>()?
        } else {
            let mut images = png_files(dir)?;
            images.sort();
            images.into_iter().zip(Self::builtin_verdicts()).collect()
        };

        let mut exemplars = Vec::with_capacity(pairs.len().min(max));
        for (path, verdict) in pairs {
            if exemplars.len() >= max {
                break;
            }
            match fs::read(&path) {
                Ok(bytes) if !bytes.is_empty() => {
                    let label = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    debug!(label = %label, decision = %verdict.decision(), "calibration.exemplar");
                    exemplars.push(Exemplar {
                        label,
                        image: ImageData::from_base64(&STANDARD.encode(bytes)),
                        verdict,
                    });
                }
                Ok(_) => warn!(path = %path.display(), "calibration.exemplar_empty"),
                Err(e) => warn!(path = %path.display(), error = %e, "calibration.exemplar_unreadable"),
            }
        }

        info!(dir = %dir.display(), count = exemplars.len(), "calibration.loaded");
        Ok(Self { exemplars })
    }
}

fn png_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ScrollError::Config(format!("{}: {e}", dir.display())))?;
    Ok(entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect())
}

//! Closed-loop scroll, observe and extract controller for virtualized tables.
//!
//! - [`segment`]: bell-shaped split of a distance into segments
//! - [`kinetics`]: one-pixel wheel impulses with a human timing model
//! - [`scroll`]: a full [`ScrollRequest`] across both axes plus the settle wait
//! - [`oracle`] and [`verdict`]: few-shot stop/continue judgment and its grammar
//! - [`extract`] and [`store`]: row transcription merged into an append-only store
//! - [`session`]: the driving loop
pub mod calibration;
pub mod extract;
pub mod frame;
pub mod kinetics;
pub mod oracle;
pub mod scroll;
pub mod segment;
pub mod session;
pub mod store;
pub mod verdict;

pub use calibration::{CalibrationSet, Exemplar};
pub use extract::{ExtractedRecord, Extractor};
pub use frame::ObservationFrame;
pub use kinetics::{DelaySampler, FixedDelay, HumanDelaySampler, KineticScrollEngine};
pub use oracle::StopOracle;
pub use scroll::{HumanScroller, ScrollOutcome, ScrollRequest};
pub use session::{PointerGlide, RetryPolicy, RunOutcome, RunSummary, ScrollSession};
pub use store::{MergeReport, ResultStore, StoreRef};
pub use verdict::{Decision, StopVerdict, TaggedVerdictParser, VerdictParseError, VerdictParser};

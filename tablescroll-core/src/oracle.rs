//! The stop oracle: a few-shot vision judgment on whether the table end is
//! in view.
//!
//! Decision bands, measured in row heights between the bottom edge of the
//! scroll bar thumb and the bottom border of the table:
//!
//! | gap            | verdict        |
//! |----------------|----------------|
//! | 7 rows or more | CONTINUE 600px |
//! | 3 to 7 rows    | CONTINUE 500px |
//! | 1 to 3 rows    | CONTINUE 100px |
//! | 1 row or less  | STOP           |

use crate::calibration::CalibrationSet;
use crate::frame::ObservationFrame;
use crate::verdict::{StopVerdict, TaggedVerdictParser, VerdictAnomaly, VerdictParser};
use std::sync::Arc;
use tablescroll_common::Result;
use tablescroll_config::OracleSettings;
use tablescroll_vision::traits::VisionClient;
use tablescroll_vision::{Part, Turn, VisionRequest};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "\
You judge screenshots of a scrollable data table and decide how far to keep scrolling.

Look at the vertical scroll bar of the table. Count how many table rows fit between \
the bottom edge of the scroll bar thumb and the bottom border of the table, then apply \
these rules exactly:
- 7 rows or more: CONTINUE with 600px
- between 3 and 7 rows: CONTINUE with 500px
- between 1 and 3 rows: CONTINUE with 100px
- 1 row or less: STOP

Answer in exactly this format and nothing else:
<reasoning>
one or two sentences describing the gap you measured
</reasoning>

<decision>
CONTINUE or STOP
the pixel amount such as 500px, or NONE when stopping
</decision>";

const INTRO: &str = "I will show you some example screenshots together with the correct answer for each, \
then a new screenshot to judge.";

const ACKNOWLEDGEMENT: &str = "Understood. I will study the examples and answer the new screenshot in the same format.";

pub const QUESTION: &str = "What is the number of rows between the bottom edge of the scroll bar and the bottom border of the table?";

const LIVE_PROMPT: &str = "Now judge this screenshot. What is the number of rows between the bottom edge \
of the scroll bar and the bottom border of the table, and should scrolling continue?";

/// Asks the judgment service whether to keep scrolling.
///
/// Holds its client and calibration explicitly so independent sessions never
/// share state.
pub struct StopOracle {
    client: Arc<dyn VisionClient>,
    calibration: Arc<CalibrationSet>,
    parser: Box<dyn VerdictParser>,
    settings: OracleSettings,
}

impl StopOracle {
    pub fn new(
        client: Arc<dyn VisionClient>,
        calibration: Arc<CalibrationSet>,
        settings: OracleSettings,
    ) -> Self {
        let parser = TaggedVerdictParser::new(settings.default_continue_px);
        Self {
            client,
            calibration,
            parser: Box::new(parser),
            settings,
        }
    }

    pub fn with_parser(mut self, parser: impl VerdictParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    /// Intro, one question/answer pair per exemplar, then the live frame.
    pub fn build_request(&self, frame: &ObservationFrame) -> VisionRequest {
        let mut turns = Vec::with_capacity(self.calibration.len() * 2 + 3);
        if !self.calibration.is_empty() {
            turns.push(Turn::user_text(INTRO));
            turns.push(Turn::assistant_text(ACKNOWLEDGEMENT));
            for exemplar in self.calibration.exemplars() {
                turns.push(Turn::user(vec![
                    Part::Image(exemplar.image.clone()),
                    Part::Text(QUESTION.to_string()),
                ]));
                turns.push(Turn::assistant_text(exemplar.verdict.to_tagged()));
            }
        }
        turns.push(Turn::user(vec![
            Part::Text(LIVE_PROMPT.to_string()),
            Part::Image(frame.image.clone()),
        ]));

        VisionRequest::new(turns)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
    }

    /// Service failures propagate; they are never read as a verdict.
    pub async fn evaluate(&self, frame: &ObservationFrame) -> Result<StopVerdict> {
        let request = self.build_request(frame);
        debug!(
            frame = %frame.id,
            exemplars = self.calibration.len(),
            images = request.image_count(),
            "oracle.request"
        );
        let reply = self.client.complete(&request).await?;
        debug!(frame = %frame.id, response = %reply.text, "oracle.response");

        let parsed = self.parser.parse(&reply.text)?;
        for anomaly in &parsed.anomalies {
            match anomaly {
                VerdictAnomaly::DefaultedScroll { raw, used } => warn!(
                    frame = %frame.id,
                    raw = raw.as_deref().unwrap_or("<missing>"),
                    used_px = used,
                    "oracle.scroll_defaulted"
                ),
                VerdictAnomaly::StopWithValue(value) => warn!(
                    frame = %frame.id,
                    value = %value,
                    "oracle.stop_with_value"
                ),
            }
        }

        let verdict = parsed.verdict;
        info!(
            frame = %frame.id,
            decision = %verdict.decision(),
            scroll_px = verdict.scroll_px(),
            "oracle.verdict"
        );
        Ok(verdict)
    }
}

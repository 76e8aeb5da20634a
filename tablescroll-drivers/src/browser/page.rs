use crate::surface::{PageInfo, Surface};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fantoccini::actions::{InputSource, MouseActions, PointerAction, WheelAction, WheelActions};
use fantoccini::Client;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tablescroll_common::{Result, ScrollError};
use tokio::time::sleep;

const QUIESCENCE_POLL: Duration = Duration::from_millis(250);

/// Counts loaded resources so two equal samples mean nothing new arrived.
const LOAD_PROBE: &str = r#"
    return {
        ready: document.readyState,
        resources: performance.getEntriesByType('resource').length
    };
"#;

/// A live page exposed as a [`Surface`].
///
/// Wheel events originate at the last pointer position, so glide the pointer
/// onto the table before scrolling.
pub struct TablePage {
    client: Client,
    pointer: Mutex<(i32, i32)>,
}

impl TablePage {
    pub fn new(client: Client, pointer: (i32, i32)) -> Self {
        Self {
            client,
            pointer: Mutex::new(pointer),
        }
    }

    pub fn pointer(&self) -> Result<(i32, i32)> {
        self.pointer
            .lock()
            .map(|p| *p)
            .map_err(|_| ScrollError::device("pointer state poisoned"))
    }

    async fn load_state(&self) -> Result<(bool, u64)> {
        let v = self
            .client
            .execute(LOAD_PROBE, vec![])
            .await
            .map_err(|e| ScrollError::device(format!("load probe failed: {e}")))?;
        let ready = v.get("ready").and_then(|r| r.as_str()) == Some("complete");
        let resources = v.get("resources").and_then(|r| r.as_u64()).unwrap_or(0);
        Ok((ready, resources))
    }
}

#[async_trait]
impl Surface for TablePage {
    async fn current_page(&self) -> Result<PageInfo> {
        let url = self
            .client
            .current_url()
            .await
            .map_err(|e| ScrollError::device(format!("current_url failed: {e}")))?;
        let title = self
            .client
            .title()
            .await
            .map_err(|e| ScrollError::device(format!("title failed: {e}")))?;
        Ok(PageInfo {
            url: url.to_string(),
            title,
        })
    }

    /// WebDriver only captures the viewport; `full_page` is accepted for
    /// interface parity and the viewport is what shows the table.
    async fn take_screenshot(&self, full_page: bool) -> Result<String> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| ScrollError::device(format!("screenshot failed: {e}")))?;
        tracing::trace!(bytes = png.len(), full_page, "browser.screenshot");
        Ok(STANDARD.encode(png))
    }

    async fn dispatch_wheel(&self, dx: i32, dy: i32) -> Result<()> {
        let (x, y) = self.pointer()?;
        let wheel = WheelActions::new("wheel".to_string()).then(WheelAction::Scroll {
            duration: None,
            x: x.into(),
            y: y.into(),
            delta_x: dx.into(),
            delta_y: dy.into(),
        });
        self.client
            .perform_actions(wheel)
            .await
            .map_err(|e| ScrollError::device(format!("wheel dispatch failed: {e}")))
    }

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        let mouse = MouseActions::new("mouse".to_string()).then(PointerAction::MoveTo {
            duration: None,
            x: x.into(),
            y: y.into(),
        });
        self.client
            .perform_actions(mouse)
            .await
            .map_err(|e| ScrollError::device(format!("pointer move failed: {e}")))?;
        let mut pointer = self
            .pointer
            .lock()
            .map_err(|_| ScrollError::device("pointer state poisoned"))?;
        *pointer = (x, y);
        Ok(())
    }

    async fn wait_for_quiescence(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut last = None;
        loop {
            let (ready, resources) = self.load_state().await?;
            if ready && last == Some(resources) {
                return Ok(true);
            }
            last = Some(resources);
            if Instant::now() + QUIESCENCE_POLL > deadline {
                tracing::debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    resources,
                    "browser.quiescence.timeout"
                );
                return Ok(false);
            }
            sleep(QUIESCENCE_POLL).await;
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tablescroll_common::{Result, ScrollError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// Browser control operations consumed by the scroll controller.
///
/// Every failure is a [`ScrollError::Device`], which the driving loop treats
/// as retryable.
#[async_trait]
pub trait Surface: Send + Sync {
    async fn current_page(&self) -> Result<PageInfo>;

    /// Base64-encoded screenshot of the current rendering.
    async fn take_screenshot(&self, full_page: bool) -> Result<String>;

    /// One wheel event at the current pointer position.
    async fn dispatch_wheel(&self, dx: i32, dy: i32) -> Result<()>;

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()>;

    /// Wait until the page stops loading resources.
    ///
    /// Returns `Ok(false)` on timeout; that is a signal to proceed, not an error.
    async fn wait_for_quiescence(&self, timeout: Duration) -> Result<bool>;
}

/// Input recorded by [`MemorySurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Wheel { dx: i32, dy: i32 },
    Pointer { x: i32, y: i32 },
    Screenshot,
    Settle,
}

/// In-memory surface that records input and replays queued screenshots.
///
/// When the screenshot queue runs dry the last frame is repeated.
#[derive(Debug, Default)]
pub struct MemorySurface {
    events: Mutex<Vec<SurfaceEvent>>,
    frames: Mutex<VecDeque<String>>,
    last_frame: Mutex<Option<String>>,
    failures: Mutex<VecDeque<String>>,
    settles: bool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            settles: true,
            ..Self::default()
        }
    }

    pub fn with_frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let surface = Self::new();
        if let Ok(mut q) = surface.frames.lock() {
            q.extend(frames.into_iter().map(Into::into));
        }
        surface
    }

    /// Make the settle wait time out instead of reporting quiescence.
    pub fn never_settles(mut self) -> Self {
        self.settles = false;
        self
    }

    /// Queue a device failure for the next screenshot request.
    pub fn fail_next_screenshot(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.failures.lock() {
            q.push_back(message.into());
        }
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Net wheel travel per axis.
    pub fn wheel_totals(&self) -> (i64, i64) {
        self.events()
            .iter()
            .fold((0, 0), |(x, y), ev| match ev {
                SurfaceEvent::Wheel { dx, dy } => (x + i64::from(*dx), y + i64::from(*dy)),
                _ => (x, y),
            })
    }

    pub fn wheel_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Wheel { .. }))
            .count()
    }

    fn record(&self, event: SurfaceEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| ScrollError::device("surface event log poisoned"))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl Surface for MemorySurface {
    async fn current_page(&self) -> Result<PageInfo> {
        Ok(PageInfo {
            url: "about:blank".into(),
            title: "memory".into(),
        })
    }

    async fn take_screenshot(&self, _full_page: bool) -> Result<String> {
        if let Some(msg) = self
            .failures
            .lock()
            .map_err(|_| ScrollError::device("surface failure queue poisoned"))?
            .pop_front()
        {
            return Err(ScrollError::Device(msg));
        }
        self.record(SurfaceEvent::Screenshot)?;
        let next = self
            .frames
            .lock()
            .map_err(|_| ScrollError::device("surface frame queue poisoned"))?
            .pop_front();
        let mut last = self
            .last_frame
            .lock()
            .map_err(|_| ScrollError::device("surface frame cache poisoned"))?;
        if let Some(frame) = next {
            *last = Some(frame);
        }
        let frame = last.clone();
        frame.ok_or_else(|| ScrollError::device("no screenshot queued"))
    }

    async fn dispatch_wheel(&self, dx: i32, dy: i32) -> Result<()> {
        self.record(SurfaceEvent::Wheel { dx, dy })
    }

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.record(SurfaceEvent::Pointer { x, y })
    }

    async fn wait_for_quiescence(&self, _timeout: Duration) -> Result<bool> {
        self.record(SurfaceEvent::Settle)?;
        Ok(self.settles)
    }
}

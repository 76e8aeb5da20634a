//! Rendering/control layer for the scroll controller.
//!
//! The core only talks to a [`surface::Surface`]; this crate provides the
//! WebDriver-backed implementation plus an in-memory one for tests.
//!
//! - [`browser::driver::TableDriver`]: WebDriver session with stealth launch arguments
//! - [`browser::page::TablePage`]: the [`surface::Surface`] implementation over a live page
//! - [`browser::behavioral`]: human-like pointer glides
//! - [`browser::stealth`]: launch arguments and JS evasions per stealth level
//! - [`surface::MemorySurface`]: records dispatched input, serves canned screenshots
pub mod browser;
pub mod surface;

pub use surface::{MemorySurface, PageInfo, Surface, SurfaceEvent};

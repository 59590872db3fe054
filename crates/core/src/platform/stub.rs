use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use image::RgbImage;

use crate::types::*;
use crate::logger;
use super::{display_list, Pointer, Screen};

/// Fake displays. Captures return `frame` when set, else a black image.
pub struct StubScreen {
    pub displays: Vec<MonitorInfo>,
    pub frame: Option<RgbImage>,
    /// Every capture fails, like a display that went away.
    pub fail_capture: bool,
}

impl Default for StubScreen {
    fn default() -> Self {
        Self {
            displays: vec![
                MonitorInfo { name: "stub-0".into(), region: Region::new(0, 0, 1920, 1080) },
                MonitorInfo { name: "stub-1".into(), region: Region::new(1920, 0, 1920, 1080) },
            ],
            frame: None,
            fail_capture: false,
        }
    }
}

impl StubScreen {
    pub fn with_frame(displays: Vec<MonitorInfo>, frame: RgbImage) -> Self {
        Self { displays, frame: Some(frame), fail_capture: false }
    }
}

impl Screen for StubScreen {
    fn monitors(&self) -> Result<Vec<MonitorInfo>> {
        Ok(display_list(self.displays.clone()))
    }

    fn capture(&self, region: &CaptureRegion) -> Result<RgbImage> {
        logger::info_p("stub", &format!("capture({:?})", region));
        if self.fail_capture {
            bail!("display for {:?} is gone", region);
        }
        Ok(match &self.frame {
            Some(f) => f.clone(),
            None => RgbImage::new(region.w, region.h),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Moved(Point),
    Clicked(Point),
}

/// Pointer operation a `StubPointer` refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Move,
    Click,
}

/// Records pointer activity into a shared list instead of moving anything.
#[derive(Default)]
pub struct StubPointer {
    pub(crate) pos: Point,
    pub events: Arc<Mutex<Vec<PointerEvent>>>,
    pub fail_on: Option<FailOn>,
}

impl StubPointer {
    fn record(&self, ev: PointerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ev);
        }
    }
}

impl Pointer for StubPointer {
    fn position(&mut self) -> Result<Point> {
        Ok(self.pos)
    }

    fn warp(&mut self, to: Point) -> Result<()> {
        if self.fail_on == Some(FailOn::Move) {
            bail!("input injection refused");
        }
        self.pos = to;
        self.record(PointerEvent::Moved(to));
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        if self.fail_on == Some(FailOn::Click) {
            bail!("input injection refused");
        }
        logger::info_p("stub", &format!("click at ({}, {})", self.pos.x, self.pos.y));
        self.record(PointerEvent::Clicked(self.pos));
        Ok(())
    }

    fn glide(&mut self, to: Point, duration: Duration) -> Result<()> {
        logger::info_p("stub", &format!("glide to ({}, {}) over {:?}", to.x, to.y, duration));
        self.warp(to)
    }
}

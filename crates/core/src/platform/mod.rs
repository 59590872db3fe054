pub mod stub;
pub mod desktop;
pub mod hotkey;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::RgbImage;

use crate::types::*;
use crate::logger;

/// Interval between intermediate pointer positions during a glide.
const GLIDE_STEP: Duration = Duration::from_millis(10);

/// Display enumeration and region capture.
pub trait Screen {
    /// Display list: index 0 is the union of all displays, then each display.
    fn monitors(&self) -> Result<Vec<MonitorInfo>>;
    /// Fresh capture of `region`, alpha already stripped.
    fn capture(&self, region: &CaptureRegion) -> Result<RgbImage>;
}

/// Absolute pointer movement and left clicks.
pub trait Pointer {
    fn position(&mut self) -> Result<Point>;
    fn warp(&mut self, to: Point) -> Result<()>;
    fn click(&mut self) -> Result<()>;

    /// Move to `to` over roughly `duration`, in straight-line steps.
    fn glide(&mut self, to: Point, duration: Duration) -> Result<()> {
        let from = self.position()?;
        let steps = (duration.as_millis() / GLIDE_STEP.as_millis()).max(1) as u32;
        let step_sleep = duration / steps;
        for p in glide_path(from, to, steps) {
            self.warp(p)?;
            thread::sleep(step_sleep);
        }
        Ok(())
    }
}

/// Intermediate points from `from` (exclusive) to `to` (inclusive).
pub fn glide_path(from: Point, to: Point, steps: u32) -> Vec<Point> {
    let steps = steps.max(1) as i64;
    let (dx, dy) = ((to.x - from.x) as i64, (to.y - from.y) as i64);
    (1..=steps)
        .map(|i| Point::new(
            from.x + (dx * i / steps) as i32,
            from.y + (dy * i / steps) as i32,
        ))
        .collect()
}

/// Build the display list from physical displays, primary first.
pub fn display_list(physical: Vec<MonitorInfo>) -> Vec<MonitorInfo> {
    let regions: Vec<Region> = physical.iter().map(|m| m.region).collect();
    let mut list = Vec::with_capacity(physical.len() + 1);
    list.push(MonitorInfo {
        name: "all displays".into(),
        region: Region::union(&regions),
    });
    list.extend(physical);
    list
}

/// Create the screen and pointer for this machine, or the stub pair.
pub fn create_platform(force_stub: bool) -> Result<(Box<dyn Screen>, Box<dyn Pointer>)> {
    if force_stub {
        logger::info_p("stub", "using stub platform");
        return Ok((
            Box::new(stub::StubScreen::default()),
            Box::new(stub::StubPointer::default()),
        ));
    }
    Ok((
        Box::new(desktop::DesktopScreen),
        Box::new(desktop::DesktopPointer::new()?),
    ))
}

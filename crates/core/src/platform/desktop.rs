use anyhow::{bail, Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse};
use image::{imageops, DynamicImage, RgbImage};

use crate::types::*;
use crate::logger;
use super::{display_list, Pointer, Screen};

/// Real displays through xcap. Holds no capture handle between calls.
pub struct DesktopScreen;

fn monitor_region(m: &xcap::Monitor) -> Result<Region> {
    Ok(Region::new(m.x()?, m.y()?, m.width()?, m.height()?))
}

/// Pixel rectangle of `region` inside a `full_w`x`full_h` capture of the
/// display at `bounds`. Captures come back in physical pixels while display
/// bounds are logical, so the crop is scaled by their ratio.
fn physical_crop(
    region: &Region,
    bounds: &Region,
    full_w: u32,
    full_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    if bounds.w == 0 || bounds.h == 0 {
        return None;
    }
    let sx = full_w as f64 / bounds.w as f64;
    let sy = full_h as f64 / bounds.h as f64;
    let x = (((region.l - bounds.l) as f64 * sx).round() as u32).min(full_w);
    let y = (((region.t - bounds.t) as f64 * sy).round() as u32).min(full_h);
    let w = ((region.w as f64 * sx).round() as u32).min(full_w - x);
    let h = ((region.h as f64 * sy).round() as u32).min(full_h - y);
    (w > 0 && h > 0).then_some((x, y, w, h))
}

impl Screen for DesktopScreen {
    fn monitors(&self) -> Result<Vec<MonitorInfo>> {
        let mut physical = Vec::new();
        for m in xcap::Monitor::all().context("failed to enumerate displays")? {
            let primary = m.is_primary().unwrap_or(false);
            let scale = m.scale_factor().unwrap_or(1.0);
            if scale != 1.0 {
                let name = m.name().unwrap_or_default();
                logger::warn_p(
                    "desktop",
                    &format!("display {} is scaled x{:.2}; captures are resampled to logical size", name, scale),
                );
            }
            let info = MonitorInfo {
                name: m.name().unwrap_or_default(),
                region: monitor_region(&m)?,
            };
            physical.push((primary, info));
        }
        physical.sort_by_key(|(primary, _)| !*primary);
        Ok(display_list(physical.into_iter().map(|(_, info)| info).collect()))
    }

    fn capture(&self, region: &CaptureRegion) -> Result<RgbImage> {
        for m in xcap::Monitor::all().context("failed to enumerate displays")? {
            let bounds = monitor_region(&m)?;
            if !bounds.contains(region.l, region.t) {
                continue;
            }
            let full = m.capture_image().context("display capture failed")?;
            let Some((x, y, w, h)) = physical_crop(region, &bounds, full.width(), full.height()) else {
                bail!("capture of {:?} came back empty", region);
            };
            let mut cropped = imageops::crop_imm(&full, x, y, w, h).to_image();
            // Keep capture pixels 1:1 with the logical coordinates clicks use.
            let lw = region.w.min((bounds.r() - region.l) as u32);
            let lh = region.h.min((bounds.b() - region.t) as u32);
            if (w, h) != (lw, lh) {
                cropped = imageops::resize(&cropped, lw, lh, imageops::FilterType::Triangle);
            }
            return Ok(DynamicImage::ImageRgba8(cropped).to_rgb8());
        }
        logger::warn_p("desktop", &format!("no display contains {:?}", region));
        bail!("no display contains region {:?}", region)
    }
}

/// Real pointer through enigo.
pub struct DesktopPointer {
    enigo: Enigo,
}

impl DesktopPointer {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&enigo::Settings::default())
            .context("failed to connect to the input system")?;
        Ok(Self { enigo })
    }
}

impl Pointer for DesktopPointer {
    fn position(&mut self) -> Result<Point> {
        let (x, y) = self.enigo.location()?;
        Ok(Point::new(x, y))
    }

    fn warp(&mut self, to: Point) -> Result<()> {
        self.enigo.move_mouse(to.x, to.y, Coordinate::Abs)?;
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        self.enigo.button(Button::Left, Direction::Click)?;
        Ok(())
    }
}

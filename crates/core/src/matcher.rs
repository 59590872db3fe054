use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{ImageBuffer, Luma, RgbImage};
use imageproc::template_matching::{find_extremes, Extremes};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::logger;
use crate::platform::{Pointer, Screen};
use crate::types::*;

/// Similarity surface: one score per valid template placement.
pub type Surface = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Energy below which a window or template counts as flat.
const FLAT_ENERGY: f64 = 0.5;

/// Load a template from disk as 3-channel color. Alpha is dropped, not composited.
pub fn load_template(path: &Path) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("cannot decode template {}", path.display()))?;
    Ok(img.to_rgb8())
}

/// Summed-area tables of every channel and of its square.
struct Integral {
    stride: usize,
    sum: Vec<[f64; 3]>,
    sq: Vec<[f64; 3]>,
}

impl Integral {
    fn new(img: &RgbImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![[0.0; 3]; stride * (h + 1)];
        let mut sq = vec![[0.0; 3]; stride * (h + 1)];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row_sum = [0.0; 3];
            let mut row_sq = [0.0; 3];
            for x in 0..w {
                let px = &raw[(y * w + x) * 3..][..3];
                let (above, here) = (y * stride + x + 1, (y + 1) * stride + x + 1);
                for c in 0..3 {
                    let v = px[c] as f64;
                    row_sum[c] += v;
                    row_sq[c] += v * v;
                    sum[here][c] = sum[above][c] + row_sum[c];
                    sq[here][c] = sq[above][c] + row_sq[c];
                }
            }
        }

        Self { stride, sum, sq }
    }

    /// Per-channel (sum, sum of squares) over the w*h window at (x, y).
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> ([f64; 3], [f64; 3]) {
        let tl = y * self.stride + x;
        let tr = tl + w;
        let bl = (y + h) * self.stride + x;
        let br = bl + w;
        let mut s = [0.0; 3];
        let mut q = [0.0; 3];
        for c in 0..3 {
            s[c] = self.sum[br][c] - self.sum[tr][c] - self.sum[bl][c] + self.sum[tl][c];
            q[c] = self.sq[br][c] - self.sq[tr][c] - self.sq[bl][c] + self.sq[tl][c];
        }
        (s, q)
    }
}

/// 2-D transforms over a fixed size. Spectra are kept column-major
/// (transposed) between `forward` and `inverse`.
struct Fft2d {
    w: usize,
    h: usize,
    row_fwd: Arc<dyn Fft<f64>>,
    col_fwd: Arc<dyn Fft<f64>>,
    row_inv: Arc<dyn Fft<f64>>,
    col_inv: Arc<dyn Fft<f64>>,
    tmp: Vec<Complex<f64>>,
}

fn transpose(src: &[Complex<f64>], dst: &mut [Complex<f64>], rows: usize, cols: usize) {
    for r in 0..rows {
        for c in 0..cols {
            dst[c * rows + r] = src[r * cols + c];
        }
    }
}

impl Fft2d {
    fn new(w: usize, h: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            w,
            h,
            row_fwd: planner.plan_fft_forward(w),
            col_fwd: planner.plan_fft_forward(h),
            row_inv: planner.plan_fft_inverse(w),
            col_inv: planner.plan_fft_inverse(h),
            tmp: vec![Complex::default(); w * h],
        }
    }

    /// Row-major h*w signal in, transposed spectrum out.
    fn forward(&mut self, buf: &mut [Complex<f64>]) {
        self.row_fwd.process(buf);
        transpose(buf, &mut self.tmp, self.h, self.w);
        self.col_fwd.process(&mut self.tmp);
        buf.copy_from_slice(&self.tmp);
    }

    /// Transposed spectrum in, row-major h*w signal out (unnormalized).
    fn inverse(&mut self, buf: &mut [Complex<f64>]) {
        self.col_inv.process(buf);
        transpose(buf, &mut self.tmp, self.w, self.h);
        self.row_inv.process(&mut self.tmp);
        buf.copy_from_slice(&self.tmp);
    }
}

/// Sum over channels of the cross-correlation of `haystack` with the
/// zero-mean template, at every offset (row-major, haystack-sized).
/// Only offsets where the template fits are wrap-free.
fn cross_correlation(haystack: &RgbImage, centered: &[f64], tw: usize, th: usize) -> Vec<f64> {
    let (hw, hh) = (haystack.width() as usize, haystack.height() as usize);
    let len = hw * hh;
    let mut fft = Fft2d::new(hw, hh);
    let mut acc = vec![Complex::default(); len];
    let mut img = vec![Complex::default(); len];
    let mut tpl = vec![Complex::default(); len];
    let raw = haystack.as_raw();

    for c in 0..3 {
        for (dst, px) in img.iter_mut().zip(raw.chunks_exact(3)) {
            *dst = Complex::new(px[c] as f64, 0.0);
        }
        tpl.fill(Complex::default());
        for dy in 0..th {
            for dx in 0..tw {
                tpl[dy * hw + dx] = Complex::new(centered[(dy * tw + dx) * 3 + c], 0.0);
            }
        }
        fft.forward(&mut img);
        fft.forward(&mut tpl);
        for ((a, i), t) in acc.iter_mut().zip(&img).zip(&tpl) {
            *a += i * t.conj();
        }
    }

    fft.inverse(&mut acc);
    let scale = 1.0 / len as f64;
    acc.iter().map(|v| v.re * scale).collect()
}

/// Normalized correlation coefficient of `template` at every placement over
/// `haystack`, all three channels pooled. Scores lie in [-1, 1]; a flat window
/// or flat template scores 0. None when the template does not fit.
pub fn correlation_surface(haystack: &RgbImage, template: &RgbImage) -> Option<Surface> {
    let (hw, hh) = (haystack.width() as usize, haystack.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }

    let n = (tw * th) as f64;
    let mut mean = [0.0; 3];
    for px in template.pixels() {
        for c in 0..3 {
            mean[c] += px[c] as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    // Zero-mean template; its correlation with a window needs no window mean.
    let centered: Vec<f64> = template
        .as_raw()
        .iter()
        .enumerate()
        .map(|(i, &v)| v as f64 - mean[i % 3])
        .collect();
    let t_energy: f64 = centered.iter().map(|v| v * v).sum();

    let integral = Integral::new(haystack);
    let numerator = cross_correlation(haystack, &centered, tw, th);
    let (ow, oh) = (hw - tw + 1, hh - th + 1);

    let mut surface = Surface::new(ow as u32, oh as u32);
    for y in 0..oh {
        for x in 0..ow {
            let (s, q) = integral.window(x, y, tw, th);
            let w_energy: f64 = (0..3).map(|c| q[c] - s[c] * s[c] / n).sum();
            // Integer pixels: any non-flat window has energy of at least 1 - 1/n.
            let score = if w_energy < FLAT_ENERGY || t_energy < FLAT_ENERGY {
                0.0
            } else {
                (numerator[y * hw + x] / (t_energy * w_energy).sqrt()).clamp(-1.0, 1.0)
            };
            surface.put_pixel(x as u32, y as u32, Luma([score as f32]));
        }
    }
    Some(surface)
}

/// Best placement of `template` in `haystack`.
pub fn match_template(haystack: &RgbImage, template: &RgbImage) -> Option<MatchResult> {
    let surface = correlation_surface(haystack, template)?;
    let Extremes { max_value, max_value_location, .. } = find_extremes(&surface);
    Some(MatchResult {
        score: max_value,
        x: max_value_location.0,
        y: max_value_location.1,
        template_w: template.width(),
        template_h: template.height(),
    })
}

/// Screen point for an accepted match, before the vertical click bias.
/// None when the score is under `confidence`.
pub fn click_point(
    m: &MatchResult,
    confidence: f32,
    offset: ScreenOffset,
    sub_offset: Option<Offset>,
) -> Option<Point> {
    if m.score < confidence {
        return None;
    }
    let center = m.center();
    let absolute = Point::new(center.x + offset.left, center.y + offset.top);
    Some(absolute.shifted(sub_offset.unwrap_or_default()))
}

/// Find a template on screen and click it.
pub trait Locate {
    /// Click at most once; true only when a click was dispatched.
    fn locate_and_click(
        &mut self,
        template: &Path,
        confidence: f32,
        region: &CaptureRegion,
        offset: ScreenOffset,
        sub_offset: Option<Offset>,
    ) -> bool;
}

/// Captures, matches and clicks through the platform traits.
pub struct Clicker {
    screen: Box<dyn Screen>,
    pointer: Box<dyn Pointer>,
    click_bias_y: i32,
    move_duration: Duration,
}

impl Clicker {
    pub fn new(
        screen: Box<dyn Screen>,
        pointer: Box<dyn Pointer>,
        click_bias_y: i32,
        move_duration: Duration,
    ) -> Self {
        Self { screen, pointer, click_bias_y, move_duration }
    }

    fn find(
        &self,
        template: &Path,
        region: &CaptureRegion,
    ) -> Result<Option<MatchResult>> {
        let capture = self.screen.capture(region).context("screen capture failed")?;
        let needle = load_template(template)?;
        Ok(match_template(&capture, &needle))
    }
}

impl Locate for Clicker {
    fn locate_and_click(
        &mut self,
        template: &Path,
        confidence: f32,
        region: &CaptureRegion,
        offset: ScreenOffset,
        sub_offset: Option<Offset>,
    ) -> bool {
        let name = template.display();
        let m = match self.find(template, region) {
            Ok(Some(m)) => m,
            Ok(None) => {
                logger::warn_p("matcher", &format!("template {} is larger than the capture", name));
                return false;
            }
            Err(e) => {
                logger::error_p("matcher", &format!("{:#}", e));
                return false;
            }
        };

        let Some(point) = click_point(&m, confidence, offset, sub_offset) else {
            logger::info_p("matcher", &format!("no match for {} (best {:.2})", name, m.score));
            return false;
        };
        logger::info_p("matcher", &format!("match for {} with confidence {:.2}", name, m.score));

        let target = point.shifted(Offset::new(0, self.click_bias_y));
        if let Err(e) = self.pointer.glide(target, self.move_duration) {
            logger::error_p("matcher", &format!("pointer move failed: {:#}", e));
            return false;
        }
        if let Err(e) = self.pointer.click() {
            logger::error_p("matcher", &format!("click failed: {:#}", e));
            return false;
        }
        true
    }
}

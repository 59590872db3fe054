use serde::{Deserialize, Serialize};

/// Screen-coordinate rectangle of a display or a capture area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub l: i32,
    pub t: i32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(l: i32, t: i32, w: u32, h: u32) -> Self {
        Self { l, t, w, h }
    }

    pub fn r(&self) -> i32 {
        self.l + self.w as i32
    }

    pub fn b(&self) -> i32 {
        self.t + self.h as i32
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.l && x < self.r() && y >= self.t && y < self.b()
    }

    /// Smallest rectangle covering every region in `regions`.
    pub fn union(regions: &[Region]) -> Region {
        let Some(first) = regions.first() else {
            return Region::default();
        };
        let (mut l, mut t, mut r, mut b) = (first.l, first.t, first.r(), first.b());
        for reg in &regions[1..] {
            l = l.min(reg.l);
            t = t.min(reg.t);
            r = r.max(reg.r());
            b = b.max(reg.b());
        }
        Region::new(l, t, (r - l) as u32, (b - t) as u32)
    }
}

/// Area grabbed on every detection attempt
pub type CaptureRegion = Region;

/// Translation from capture-local to absolute screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenOffset {
    pub left: i32,
    pub top: i32,
}

impl From<&Region> for ScreenOffset {
    fn from(r: &Region) -> Self {
        Self { left: r.l, top: r.t }
    }
}

/// Pixel shift applied to a click target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Absolute screen point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn shifted(self, by: Offset) -> Self {
        Self { x: self.x + by.x, y: self.y + by.y }
    }
}

/// One entry of the display list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    pub name: String,
    pub region: Region,
}

/// Best match of a template inside a capture (capture-local coordinates)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub score: f32,
    pub x: u32,
    pub y: u32,
    pub template_w: u32,
    pub template_h: u32,
}

impl MatchResult {
    /// Geometric center of the matched area, integer-truncated.
    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.template_w / 2) as i32,
            (self.y + self.template_h / 2) as i32,
        )
    }
}

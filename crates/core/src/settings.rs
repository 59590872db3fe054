use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::logger;
use crate::types::Offset;

/// A template image and the shift applied to its click point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub click_offset: Option<Offset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub primary: TemplateConfig,
    pub dialog: TemplateConfig,
    /// Index into the display list; 0 is the all-displays union and is rejected.
    pub monitor_index: usize,
    pub confidence: f32,
    /// Added to every click's y coordinate, on top of any template offset.
    pub click_bias_y: i32,
    pub move_duration_ms: u64,
    pub cooldown_secs: u64,
    pub idle_tick_secs: u64,
    pub settle_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary: TemplateConfig {
                path: PathBuf::from("bonus_unclaimed.png"),
                click_offset: None,
            },
            dialog: TemplateConfig {
                path: PathBuf::from("dialog_unclaimed.png"),
                click_offset: Some(Offset::new(0, 200)),
            },
            monitor_index: 2,
            confidence: 0.8,
            click_bias_y: 45,
            move_duration_ms: 500,
            cooldown_secs: 3600,
            idle_tick_secs: 5,
            settle_secs: 3,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Load `path`; when it does not exist yet, write the defaults there so
    /// they can be edited.
    pub fn load_or_init(path: &Path) -> Self {
        if path.exists() {
            return Self::load(path);
        }
        let s = Self::default();
        match s.save(path) {
            Ok(()) => logger::info_p("settings", &format!("wrote defaults to {}", path.display())),
            Err(e) => logger::warn_p("settings", &format!("{:#}", e)),
        }
        s
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            bail!("confidence must be in (0, 1], got {}", self.confidence);
        }
        if self.idle_tick_secs == 0 {
            bail!("idle_tick_secs must be at least 1");
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            cooldown: Duration::from_secs(self.cooldown_secs),
            idle_tick: Duration::from_secs(self.idle_tick_secs),
            settle: Duration::from_secs(self.settle_secs),
        }
    }
}

/// Pacing of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub cooldown: Duration,
    pub idle_tick: Duration,
    pub settle: Duration,
}

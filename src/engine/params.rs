//! Per-mode parameter records.
//!
//! Each mode that takes parameters owns its own strongly typed record; a
//! parameter set by name is routed only to the record of the active mode.

use serde::{Deserialize, Serialize};

use crate::vision::color::{HsvBounds, HUE_MAX};

/// Result of `DetectionEngine::set_parameter`.
///
/// `Ignored` is the documented default for names that do not belong to the
/// active mode and for out-of-range values; the engine state is unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamOutcome {
    Applied,
    Ignored,
}

/// Lowercase, trimmed, with spaces and dashes folded to underscores.
///
/// `"H min"`, `"h-min"` and `"h_min"` all address the same field.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn to_u8(value: i64, max: u8) -> Option<u8> {
    u8::try_from(value).ok().filter(|v| *v <= max)
}

/// HSV range and accepted contour size for Motion mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionParams {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
    /// Smallest accepted bounding-rect side, in pixels.
    pub min_size: u32,
    /// Largest accepted bounding-rect side, in pixels.
    pub max_size: u32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            h_min: 0,
            h_max: HUE_MAX,
            s_min: 0,
            s_max: 255,
            v_min: 0,
            v_max: 255,
            min_size: 10,
            max_size: 300,
        }
    }
}

impl MotionParams {
    pub const NAMES: [&'static str; 8] = [
        "h_min", "h_max", "s_min", "s_max", "v_min", "v_max", "min_size", "max_size",
    ];

    pub fn bounds(&self) -> HsvBounds {
        HsvBounds {
            lower: [self.h_min, self.s_min, self.v_min],
            upper: [self.h_max, self.s_max, self.v_max],
        }
    }

    /// Whether a `width x height` rect passes the size filter on both sides.
    pub fn accepts(&self, width: i32, height: i32) -> bool {
        let fits = |side: i32| {
            u32::try_from(side)
                .map(|side| side >= self.min_size && side <= self.max_size)
                .unwrap_or(false)
        };
        fits(width) && fits(height)
    }

    pub fn set(&mut self, name: &str, value: i64) -> ParamOutcome {
        let slot = match name {
            "h_min" => &mut self.h_min,
            "h_max" => &mut self.h_max,
            "s_min" => &mut self.s_min,
            "s_max" => &mut self.s_max,
            "v_min" => &mut self.v_min,
            "v_max" => &mut self.v_max,
            "min_size" | "max_size" => {
                let Ok(size) = u32::try_from(value) else {
                    return ParamOutcome::Ignored;
                };
                if name == "min_size" {
                    self.min_size = size;
                } else {
                    self.max_size = size;
                }
                return ParamOutcome::Applied;
            }
            _ => return ParamOutcome::Ignored,
        };
        let max = if name.starts_with('h') { HUE_MAX } else { u8::MAX };
        match to_u8(value, max) {
            Some(v) => {
                *slot = v;
                ParamOutcome::Applied
            }
            None => ParamOutcome::Ignored,
        }
    }
}

/// Brightness band for Contrast mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContrastParams {
    pub brightness_min: u8,
    pub brightness_max: u8,
}

impl Default for ContrastParams {
    fn default() -> Self {
        Self {
            brightness_min: 200,
            brightness_max: 255,
        }
    }
}

impl ContrastParams {
    pub const NAMES: [&'static str; 2] = ["brightness_min", "brightness_max"];

    pub fn set(&mut self, name: &str, value: i64) -> ParamOutcome {
        let slot = match name {
            "brightness_min" => &mut self.brightness_min,
            "brightness_max" => &mut self.brightness_max,
            _ => return ParamOutcome::Ignored,
        };
        match to_u8(value, u8::MAX) {
            Some(v) => {
                *slot = v;
                ParamOutcome::Applied
            }
            None => ParamOutcome::Ignored,
        }
    }
}

/// Snapshot of the active mode's parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModeParameters {
    None,
    Motion(MotionParams),
    Contrast(ContrastParams),
}

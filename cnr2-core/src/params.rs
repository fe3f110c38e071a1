//! Filter parameters.
//!
//! Defaults match the classic `Cnr2()` defaults. Parameter files are JSON;
//! any field left out keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Cnr2Error, Result};

/// Temporal chroma noise reduction parameters (8-bit scale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cnr2Params {
    /// Curve per channel (Y, U, V): `'x'` = linear cosine, anything else = quadratic
    pub mode: String,
    /// Scene-change threshold, percent of the maximum theoretical difference
    pub scdthr: f64,
    /// Luma radius
    pub ln: i32,
    /// Luma amplitude
    pub lm: i32,
    /// U radius
    pub un: i32,
    /// U amplitude
    pub um: i32,
    /// V radius
    pub vn: i32,
    /// V amplitude
    pub vm: i32,
    /// Add chroma differences to the scene-change metric
    pub scene_chroma: bool,
}

impl Default for Cnr2Params {
    fn default() -> Self {
        Self {
            mode: "oxx".to_string(),
            scdthr: 10.0,
            ln: 35,
            lm: 192,
            un: 47,
            um: 255,
            vn: 47,
            vm: 255,
            scene_chroma: false,
        }
    }
}

/// Curve shape of one weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// `1 + cos(j·π / n)`
    Linear,
    /// `1 + cos(j²·π / n²)`
    Quadratic,
}

impl Curve {
    pub fn from_selector(c: char) -> Self {
        if c == 'x' {
            Curve::Linear
        } else {
            Curve::Quadratic
        }
    }
}

impl Cnr2Params {
    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.mode.chars().count() < 3 {
            return Err(Cnr2Error::InvalidMode(self.mode.clone()));
        }
        if !(0.0..=100.0).contains(&self.scdthr) {
            return Err(Cnr2Error::OutOfRange {
                name: "scdthr",
                value: self.scdthr,
                min: 0.0,
                max: 100.0,
            });
        }

        // A zero radius would divide by zero in the curve.
        for (name, value) in [("ln", self.ln), ("un", self.un), ("vn", self.vn)] {
            check_int(name, value, 1, 255)?;
        }
        for (name, value) in [("lm", self.lm), ("um", self.um), ("vm", self.vm)] {
            check_int(name, value, 0, 255)?;
        }
        Ok(())
    }

    /// Curves for Y, U and V. Only valid after `validate`.
    pub fn curves(&self) -> [Curve; 3] {
        let mut chars = self.mode.chars();
        let mut next = || Curve::from_selector(chars.next().unwrap_or('o'));
        [next(), next(), next()]
    }

    /// Radius/amplitude pairs for Y, U and V scaled to `depth`.
    pub fn scaled(&self, depth: u32) -> [(i32, i32); 3] {
        let factor = depth_scale(depth);
        [
            (self.ln * factor, self.lm * factor),
            (self.un * factor, self.um * factor),
            (self.vn * factor, self.vm * factor),
        ]
    }
}

/// Integer factor mapping 8-bit parameters to `depth` (peak / 255).
pub fn depth_scale(depth: u32) -> i32 {
    if depth <= 8 {
        1
    } else {
        ((1i32 << depth) - 1) / 255
    }
}

fn check_int(name: &'static str, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(Cnr2Error::OutOfRange {
            name,
            value: value as f64,
            min: min as f64,
            max: max as f64,
        });
    }
    Ok(())
}

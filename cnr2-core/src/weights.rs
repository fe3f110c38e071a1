//! Similarity weight tables.
//!
//! One table per channel, indexed by the signed difference between the
//! current and previous sample. The weight falls from the amplitude at a
//! zero difference to zero at the radius along a raised-cosine curve.

use std::f64::consts::PI;

use crate::error::{Cnr2Error, Result};
use crate::params::Curve;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: Vec<u32>,
    /// Offset added to a difference to get its index (`2^depth`)
    range_max: i32,
}

impl WeightTable {
    /// Build a table for differences of a `depth`-bit signal.
    ///
    /// `radius` and `amplitude` are already scaled to `depth`.
    pub fn build(radius: i32, amplitude: i32, curve: Curve, depth: u32) -> Result<Self> {
        let range_max = 1i32 << depth;
        if radius < 1 || radius >= range_max {
            return Err(Cnr2Error::OutOfRange {
                name: "radius",
                value: radius as f64,
                min: 1.0,
                max: (range_max - 1) as f64,
            });
        }
        if amplitude < 0 {
            return Err(Cnr2Error::OutOfRange {
                name: "amplitude",
                value: amplitude as f64,
                min: 0.0,
                max: (range_max - 1) as f64,
            });
        }

        let mut weights = vec![0u32; 2 * range_max as usize + 1];
        let half = amplitude as f64 / 2.0;
        let n = radius as f64;

        for j in -radius..=radius {
            let j = j as f64;
            let phase = match curve {
                Curve::Quadratic => j * j * PI / (n * n),
                Curve::Linear => j * PI / n,
            };
            let weight = (half * (1.0 + phase.cos())).round().max(0.0);
            weights[(j as i32 + range_max) as usize] = weight as u32;
        }

        Ok(Self { weights, range_max })
    }

    /// Weight for a signed difference.
    #[inline(always)]
    pub fn get(&self, diff: i32) -> u32 {
        self.weights[(diff + self.range_max) as usize]
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn range_max(&self) -> i32 {
        self.range_max
    }
}

/// The Y, U and V tables of one filter instance.
#[derive(Debug, Clone)]
pub struct WeightTables {
    pub y: WeightTable,
    pub u: WeightTable,
    pub v: WeightTable,
}

impl WeightTables {
    /// `scaled` holds (radius, amplitude) for Y, U, V.
    pub fn build(scaled: [(i32, i32); 3], curves: [Curve; 3], depth: u32) -> Result<Self> {
        let [(ln, lm), (un, um), (vn, vm)] = scaled;
        Ok(Self {
            y: WeightTable::build(ln, lm, curves[0], depth)?,
            u: WeightTable::build(un, um, curves[1], depth)?,
            v: WeightTable::build(vn, vm, curves[2], depth)?,
        })
    }
}

//! # Chroma Blending
//!
//! Fixed-point interpolation between the previous and current chroma sample:
//!
//! ```text
//! w   = tableY[curY - prevY] * tableC[curC - prevC]
//! out = (w * prevC + (SHIFT - w) * curC + SHIFT / 2) >> (2 * depth)
//! ```
//!
//! `SHIFT = 2^(2·depth)` is the product of two full-scale table weights, so
//! `w` never exceeds it. While scanning, the absolute differences are
//! accumulated; once the running total passes the scene-change threshold at
//! the end of a row the blend is abandoned.

use crate::frame::Frame;
use crate::sample::Sample;
use crate::weights::WeightTables;

/// Largest luma excursion in 8-bit video range (16..235).
pub const MAX_LUMA_DIFF: i64 = 219;
/// Largest chroma excursion in 8-bit video range (16..240).
pub const MAX_CHROMA_DIFF: i64 = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOutcome {
    /// Both chroma planes of the destination are fully written.
    Committed,
    /// Difference total exceeded the threshold after `row`; the destination
    /// holds partial output and must be discarded.
    SceneChange { row: usize, diff_total: i64 },
}

/// Scene-change threshold for a clip.
///
/// `width`/`height` are luma dimensions. The result is in the units of the
/// running total the blender accumulates.
pub fn scene_change_threshold(
    scdthr: f64,
    width: usize,
    height: usize,
    depth: u32,
    subsampling_w: u32,
    subsampling_h: u32,
    scene_chroma: bool,
) -> i64 {
    let max_pixel_diff = if scene_chroma {
        (MAX_LUMA_DIFF + 2 * MAX_CHROMA_DIFF) >> (subsampling_w + subsampling_h)
    } else {
        MAX_LUMA_DIFF
    };
    let base = (scdthr * width as f64 * height as f64 * max_pixel_diff as f64) / 100.0;
    (base as i64) << depth.saturating_sub(8)
}

#[derive(Debug, Clone)]
pub struct ChromaBlender {
    /// Chroma plane width
    width: usize,
    /// Chroma plane height
    height: usize,
    subsampling_w: u32,
    subsampling_h: u32,
    scene_chroma: bool,
    diff_max: i64,
    shift: i64,
    round: i64,
    shift_bits: u32,
}

impl ChromaBlender {
    pub fn new(
        chroma_width: usize,
        chroma_height: usize,
        depth: u32,
        subsampling_w: u32,
        subsampling_h: u32,
        scene_chroma: bool,
        diff_max: i64,
    ) -> Self {
        let shift_bits = 2 * depth;
        let shift = 1i64 << shift_bits;
        Self {
            width: chroma_width,
            height: chroma_height,
            subsampling_w,
            subsampling_h,
            scene_chroma,
            diff_max,
            shift,
            round: shift >> 1,
            shift_bits,
        }
    }

    pub fn diff_max(&self) -> i64 {
        self.diff_max
    }

    /// One blended sample.
    #[inline(always)]
    pub fn mix(&self, weight: i64, prev: i32, cur: i32) -> i32 {
        ((weight * prev as i64 + (self.shift - weight) * cur as i64 + self.round) >> self.shift_bits) as i32
    }

    /// Blend the chroma of `cur` towards `prev` into `dst`.
    ///
    /// `cur_luma` and `prev_luma` are luma buffers already downsampled to the
    /// chroma grid (tightly packed, `width` samples per row).
    pub fn blend<T: Sample>(
        &self,
        tables: &WeightTables,
        cur: &Frame<T>,
        prev: &Frame<T>,
        cur_luma: &[T],
        prev_luma: &[T],
        dst: &mut Frame<T>,
    ) -> BlendOutcome {
        let (cur_u, cur_v) = (cur.plane(1), cur.plane(2));
        let (prev_u, prev_v) = (prev.plane(1), prev.plane(2));
        let (dst_u, dst_v) = dst.chroma_planes_mut();
        let luma_shift = self.subsampling_w + self.subsampling_h;

        let mut diff_total = 0i64;

        for y in 0..self.height {
            let row = y * self.width;
            let cy = &cur_luma[row..row + self.width];
            let py = &prev_luma[row..row + self.width];
            let (cu, cv) = (cur_u.row(y), cur_v.row(y));
            let (pu, pv) = (prev_u.row(y), prev_v.row(y));
            let du = dst_u.row_mut(y);
            let dv = dst_v.row_mut(y);

            for x in 0..self.width {
                let (cu_x, pu_x) = (cu[x].to_i32(), pu[x].to_i32());
                let (cv_x, pv_x) = (cv[x].to_i32(), pv[x].to_i32());
                let diff_y = cy[x].to_i32() - py[x].to_i32();
                let diff_u = cu_x - pu_x;
                let diff_v = cv_x - pv_x;

                diff_total += ((diff_y << luma_shift) as i64).abs();
                if self.scene_chroma {
                    diff_total += (diff_u.abs() + diff_v.abs()) as i64;
                }

                let wy = tables.y.get(diff_y) as i64;
                let weight_u = wy * tables.u.get(diff_u) as i64;
                let weight_v = wy * tables.v.get(diff_v) as i64;

                du[x] = T::from_i32(self.mix(weight_u, pu_x, cu_x));
                dv[x] = T::from_i32(self.mix(weight_v, pv_x, cv_x));
            }

            if diff_total > self.diff_max {
                return BlendOutcome::SceneChange { row: y, diff_total };
            }
        }

        BlendOutcome::Committed
    }
}

//! Luma downsampling onto the chroma grid.
//!
//! Each output sample is the rounded box average of the luma block that
//! shares its position with one chroma sample. Rows are independent and are
//! processed in parallel.

use rayon::prelude::*;

use crate::frame::Plane;
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumaDownsampler {
    /// Output (chroma) width
    width: usize,
    /// Output (chroma) height
    height: usize,
    subsampling_w: u32,
    subsampling_h: u32,
}

impl LumaDownsampler {
    pub fn new(chroma_width: usize, chroma_height: usize, subsampling_w: u32, subsampling_h: u32) -> Self {
        Self {
            width: chroma_width,
            height: chroma_height,
            subsampling_w,
            subsampling_h,
        }
    }

    /// Samples in one output buffer.
    pub fn buffer_len(&self) -> usize {
        self.width * self.height
    }

    /// Downsample `luma` into the tightly packed `dst`.
    pub fn run<T: Sample>(&self, luma: &Plane<T>, dst: &mut [T]) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let dst = &mut dst[..self.buffer_len()];
        let (sw, sh) = (self.subsampling_w, self.subsampling_h);

        dst.par_chunks_mut(self.width)
            .enumerate()
            .for_each(|(y, out)| {
                let top = luma.row(y << sh);
                match (sw, sh) {
                    (1, 1) => {
                        let bottom = luma.row((y << 1) + 1);
                        for (x, o) in out.iter_mut().enumerate() {
                            let lx = x << 1;
                            let sum = top[lx].to_i32()
                                + top[lx + 1].to_i32()
                                + bottom[lx].to_i32()
                                + bottom[lx + 1].to_i32();
                            *o = T::from_i32((sum + 2) >> 2);
                        }
                    }
                    (1, 0) => {
                        for (x, o) in out.iter_mut().enumerate() {
                            let lx = x << 1;
                            *o = T::from_i32((top[lx].to_i32() + top[lx + 1].to_i32() + 1) >> 1);
                        }
                    }
                    (0, 1) => {
                        let bottom = luma.row((y << 1) + 1);
                        for (x, o) in out.iter_mut().enumerate() {
                            *o = T::from_i32((top[x].to_i32() + bottom[x].to_i32() + 1) >> 1);
                        }
                    }
                    _ => out.copy_from_slice(&top[..out.len()]),
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_4x4() -> Plane<u8> {
        Plane::from_vec(
            4,
            4,
            vec![
                10, 20, 30, 41, //
                11, 21, 30, 40, //
                0, 1, 255, 255, //
                1, 1, 254, 255,
            ],
        )
        .unwrap()
    }

    #[test]
    fn box_420() {
        let ds = LumaDownsampler::new(2, 2, 1, 1);
        let mut out = vec![0u8; ds.buffer_len()];
        ds.run(&plane_4x4(), &mut out);
        // (10+20+11+21+2)>>2 = 16, (30+41+30+40+2)>>2 = 35
        // (0+1+1+1+2)>>2 = 1, (255+255+254+255+2)>>2 = 255
        assert_eq!(out, vec![16, 35, 1, 255]);
    }

    #[test]
    fn box_422_and_440() {
        let mut out = vec![0u8; 8];
        LumaDownsampler::new(2, 4, 1, 0).run(&plane_4x4(), &mut out);
        assert_eq!(out, vec![15, 36, 16, 35, 1, 255, 1, 255]);

        LumaDownsampler::new(4, 2, 0, 1).run(&plane_4x4(), &mut out);
        assert_eq!(out, vec![11, 21, 30, 41, 1, 1, 255, 255]);
    }

    #[test]
    fn copy_444() {
        let plane = plane_4x4();
        let mut out = vec![0u8; 16];
        LumaDownsampler::new(4, 4, 0, 0).run(&plane, &mut out);
        assert_eq!(out, plane.data());
    }

    #[test]
    fn strided_16bit_source() {
        let mut plane = Plane::<u16>::with_stride(4, 2, 16);
        plane.row_mut(0).copy_from_slice(&[1000, 1001, 4, 4]);
        plane.row_mut(1).copy_from_slice(&[1000, 1000, 1023, 1023]);

        let mut out = vec![0u16; 2];
        LumaDownsampler::new(2, 1, 1, 1).run(&plane, &mut out);
        assert_eq!(out, vec![1000, 514]);
    }
}

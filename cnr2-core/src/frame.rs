//! # Frames and Planes
//!
//! The host-facing side of the filter: clip format, planar frame buffers,
//! the block-copy primitive and the pull-based `FrameSource` trait.
//!
//! Frames are shared as `Arc<Frame<T>>`. The filter never keeps more than
//! one previous frame alive between requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Cnr2Error, Result};
use crate::sample::Sample;

// ============================================================================
// Clip Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFamily {
    Gray,
    Rgb,
    Yuv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    Integer,
    Float,
}

/// Format of every frame a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Luma width in pixels
    pub width: usize,
    /// Luma height in pixels
    pub height: usize,
    pub color_family: ColorFamily,
    pub sample_type: SampleType,
    pub bits_per_sample: u32,
    /// log2 of the horizontal chroma subsampling factor
    pub subsampling_w: u32,
    /// log2 of the vertical chroma subsampling factor
    pub subsampling_h: u32,
    pub num_planes: usize,
}

impl VideoFormat {
    /// Planar integer YUV with three planes.
    pub fn yuv(width: usize, height: usize, subsampling_w: u32, subsampling_h: u32, bits_per_sample: u32) -> Self {
        Self {
            width,
            height,
            color_family: ColorFamily::Yuv,
            sample_type: SampleType::Integer,
            bits_per_sample,
            subsampling_w,
            subsampling_h,
            num_planes: 3,
        }
    }

    /// Chroma width, rounded up for odd luma widths
    pub fn chroma_width(&self) -> usize {
        (self.width + (1 << self.subsampling_w) - 1) >> self.subsampling_w
    }

    pub fn chroma_height(&self) -> usize {
        (self.height + (1 << self.subsampling_h) - 1) >> self.subsampling_h
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize + 7) / 8
    }

    /// Dimensions of plane `index`
    pub fn plane_dimensions(&self, index: usize) -> (usize, usize) {
        if index == 0 || self.color_family != ColorFamily::Yuv {
            (self.width, self.height)
        } else {
            (self.chroma_width(), self.chroma_height())
        }
    }

    /// Bytes of sample data in one frame (no padding)
    pub fn frame_size(&self) -> usize {
        (0..self.num_planes)
            .map(|i| {
                let (w, h) = self.plane_dimensions(i);
                w * h
            })
            .sum::<usize>()
            * self.bytes_per_sample()
    }
}

// ============================================================================
// Frame Properties
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropValue {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Per-frame metadata, inherited by frames allocated from a template.
pub type FrameProps = BTreeMap<String, PropValue>;

// ============================================================================
// Plane
// ============================================================================

/// One plane of samples with its own row pitch.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<T: Sample> {
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row pitch in samples
    stride: usize,
}

impl<T: Sample> Plane<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_stride(width, height, width)
    }

    pub fn with_stride(width: usize, height: usize, stride: usize) -> Self {
        let stride = stride.max(width);
        Self {
            data: vec![T::default(); stride * height],
            width,
            height,
            stride,
        }
    }

    /// Build a tightly packed plane from row-major samples.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Cnr2Error::UnsupportedFormat(format!(
                "plane size mismatch: expected {} samples, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride: width,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whole backing buffer, including stride padding
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Visible samples of row `y`
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    pub fn fill(&mut self, value: T) {
        for y in 0..self.height {
            self.row_mut(y).fill(value);
        }
    }

    /// Copy the visible area of `src` into this plane.
    pub fn copy_from(&mut self, src: &Plane<T>) {
        let width = self.width.min(src.width);
        let height = self.height.min(src.height);
        let dst_stride = self.stride;
        blit(&mut self.data, dst_stride, &src.data, src.stride, width, height);
    }
}

/// Copy a `row_size` × `height` rectangle between strided buffers.
pub fn blit<T: Copy>(
    dst: &mut [T],
    dst_stride: usize,
    src: &[T],
    src_stride: usize,
    row_size: usize,
    height: usize,
) {
    if height == 0 || row_size == 0 {
        return;
    }
    if dst_stride == row_size && src_stride == row_size {
        let len = row_size * height;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for y in 0..height {
        let d = y * dst_stride;
        let s = y * src_stride;
        dst[d..d + row_size].copy_from_slice(&src[s..s + row_size]);
    }
}

// ============================================================================
// Frame
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Frame<T: Sample> {
    planes: Vec<Plane<T>>,
    pub props: FrameProps,
}

impl<T: Sample> Frame<T> {
    /// Allocate a zeroed frame for `format`.
    pub fn new(format: &VideoFormat) -> Self {
        let planes = (0..format.num_planes)
            .map(|i| {
                let (w, h) = format.plane_dimensions(i);
                Plane::new(w, h)
            })
            .collect();
        Self {
            planes,
            props: FrameProps::new(),
        }
    }

    /// Allocate a frame that inherits the properties of `template`.
    pub fn new_from_template(format: &VideoFormat, template: &Frame<T>) -> Self {
        let mut frame = Self::new(format);
        frame.props = template.props.clone();
        frame
    }

    pub fn from_planes(planes: Vec<Plane<T>>) -> Self {
        Self {
            planes,
            props: FrameProps::new(),
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> &Plane<T> {
        &self.planes[index]
    }

    pub fn plane_mut(&mut self, index: usize) -> &mut Plane<T> {
        &mut self.planes[index]
    }

    pub fn planes(&self) -> &[Plane<T>] {
        &self.planes
    }

    /// Both chroma planes, mutably.
    pub fn chroma_planes_mut(&mut self) -> (&mut Plane<T>, &mut Plane<T>) {
        let (_, chroma) = self.planes.split_at_mut(1);
        let (u, v) = chroma.split_at_mut(1);
        (&mut u[0], &mut v[0])
    }

    /// Copy every plane of `src` (dimensions must match).
    pub fn copy_planes_from(&mut self, src: &Frame<T>) {
        for (dst, src) in self.planes.iter_mut().zip(src.planes.iter()) {
            dst.copy_from(src);
        }
    }
}

// ============================================================================
// Frame Source
// ============================================================================

/// Pull-based frame provider the filter reads from.
pub trait FrameSource<T: Sample> {
    fn format(&self) -> &VideoFormat;

    fn frame_count(&self) -> usize;

    fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<T>>>;
}

/// Frames held in memory.
pub struct MemorySource<T: Sample> {
    format: VideoFormat,
    frames: Vec<Arc<Frame<T>>>,
}

impl<T: Sample> MemorySource<T> {
    pub fn new(format: VideoFormat, frames: Vec<Frame<T>>) -> Self {
        Self {
            format,
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }
}

impl<T: Sample> FrameSource<T> for MemorySource<T> {
    fn format(&self) -> &VideoFormat {
        &self.format
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<T>>> {
        self.frames.get(n).cloned().ok_or_else(|| Cnr2Error::Source {
            index: n,
            message: format!("only {} frames available", self.frames.len()),
        })
    }
}

//! # CNR2 Filter
//!
//! Per-request controller around the weight tables, luma downsampler and
//! chroma blender, plus the single-slot cache of the previous frame.
//!
//! ## Cache
//!
//! ```text
//! request n ─► last == n-1 ? ──yes──► reuse prev frame + prev luma
//!                   │
//!                   no ──► fetch n-1, downsample its luma (cache miss)
//! ```
//!
//! A blended frame becomes the next request's previous frame, so the filter
//! is recursive. On a scene change the current frame is returned as-is and
//! nothing in the cache moves; the luma computed for the aborted frame stays
//! in the working buffer and is never promoted to "previous".

use std::sync::Arc;

use parking_lot::Mutex;

use crate::blend::{scene_change_threshold, BlendOutcome, ChromaBlender};
use crate::downsample::LumaDownsampler;
use crate::error::{Cnr2Error, Result};
use crate::frame::{ColorFamily, Frame, FrameSource, SampleType, VideoFormat};
use crate::params::Cnr2Params;
use crate::sample::Sample;
use crate::weights::WeightTables;

/// Threading contract a filter declares to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtMode {
    /// Any number of concurrent requests
    Parallel,
    /// One request at a time per instance
    Serialized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Frames returned with blended chroma
    pub frames_blended: u64,
    /// Frames returned untouched because of a scene change
    pub scene_changes: u64,
    /// Requests that had to refetch frame n-1
    pub cache_misses: u64,
    /// Frame 0 requests
    pub passthrough: u64,
}

/// Previous frame and the luma double buffer.
struct FilterState<T: Sample> {
    last_frame: Option<usize>,
    prev: Option<Arc<Frame<T>>>,
    /// Working buffer: luma of the frame being processed
    cur_luma: Vec<T>,
    /// Luma of `prev`, valid while `last_frame` is set or after a refetch
    prev_luma: Vec<T>,
}

impl<T: Sample> FilterState<T> {
    fn new(len: usize) -> Self {
        Self {
            last_frame: None,
            prev: None,
            cur_luma: vec![T::default(); len],
            prev_luma: vec![T::default(); len],
        }
    }
}

pub struct Cnr2<T: Sample, S: FrameSource<T>> {
    source: S,
    format: VideoFormat,
    params: Cnr2Params,
    tables: WeightTables,
    downsampler: LumaDownsampler,
    blender: ChromaBlender,
    state: FilterState<T>,
    stats: FilterStats,
}

impl<T: Sample, S: FrameSource<T>> Cnr2<T, S> {
    pub const MT_MODE: MtMode = MtMode::Serialized;

    /// Validate the clip format and parameters and build the filter.
    pub fn new(source: S, params: Cnr2Params) -> Result<Self> {
        let format = *source.format();
        check_format::<T>(&format)?;
        params.validate()?;

        let depth = format.bits_per_sample;
        let (subw, subh) = (format.subsampling_w, format.subsampling_h);
        let (chroma_width, chroma_height) = (format.chroma_width(), format.chroma_height());

        let tables = WeightTables::build(params.scaled(depth), params.curves(), depth)?;
        let downsampler = LumaDownsampler::new(chroma_width, chroma_height, subw, subh);
        let diff_max = scene_change_threshold(
            params.scdthr,
            format.width,
            format.height,
            depth,
            subw,
            subh,
            params.scene_chroma,
        );
        let blender = ChromaBlender::new(chroma_width, chroma_height, depth, subw, subh, params.scene_chroma, diff_max);

        tracing::info!(
            "CNR2 {}x{} {}-bit, chroma {}x{}, mode {:?}, scene-change limit {}",
            format.width,
            format.height,
            depth,
            chroma_width,
            chroma_height,
            params.mode,
            diff_max
        );

        Ok(Self {
            source,
            format,
            params,
            tables,
            state: FilterState::new(downsampler.buffer_len()),
            downsampler,
            blender,
            stats: FilterStats::default(),
        })
    }

    /// Produce output frame `n`.
    pub fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<T>>> {
        let cur = self.source.get_frame(n)?;

        if n == 0 {
            // prev_luma no longer matches prev
            self.state.last_frame = None;
            self.state.prev = Some(Arc::clone(&cur));
            self.stats.passthrough += 1;
            return Ok(cur);
        }

        let cached = match (&self.state.prev, self.state.last_frame) {
            (Some(prev), Some(last)) if last + 1 == n => Some(Arc::clone(prev)),
            _ => None,
        };
        let prev = match cached {
            Some(prev) => prev,
            None => self.reload_previous(n - 1)?,
        };

        let mut dst = Frame::new_from_template(&self.format, &cur);
        dst.copy_planes_from(&cur);

        self.downsampler.run(cur.plane(0), &mut self.state.cur_luma);

        match self.blender.blend(
            &self.tables,
            &cur,
            &prev,
            &self.state.cur_luma,
            &self.state.prev_luma,
            &mut dst,
        ) {
            BlendOutcome::Committed => {
                std::mem::swap(&mut self.state.cur_luma, &mut self.state.prev_luma);
                let dst = Arc::new(dst);
                self.state.prev = Some(Arc::clone(&dst));
                self.state.last_frame = Some(n);
                self.stats.frames_blended += 1;
                Ok(dst)
            }
            BlendOutcome::SceneChange { row, diff_total } => {
                tracing::debug!(
                    "Frame {}: scene change at chroma row {} ({} > {}), passing through",
                    n,
                    row,
                    diff_total,
                    self.blender.diff_max()
                );
                self.stats.scene_changes += 1;
                Ok(cur)
            }
        }
    }

    /// Refetch frame `index` as the previous frame and rebuild its luma.
    fn reload_previous(&mut self, index: usize) -> Result<Arc<Frame<T>>> {
        tracing::debug!("Non-sequential request, reloading frame {} (last {:?})", index, self.state.last_frame);
        let prev = self.source.get_frame(index)?;
        self.downsampler.run(prev.plane(0), &mut self.state.prev_luma);
        self.state.prev = Some(Arc::clone(&prev));
        self.stats.cache_misses += 1;
        Ok(prev)
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn params(&self) -> &Cnr2Params {
        &self.params
    }

    pub fn frame_count(&self) -> usize {
        self.source.frame_count()
    }

    /// Index of the last frame that was blended and committed
    pub fn last_frame(&self) -> Option<usize> {
        self.state.last_frame
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

fn check_format<T: Sample>(format: &VideoFormat) -> Result<()> {
    if format.color_family != ColorFamily::Yuv
        || format.sample_type != SampleType::Integer
        || format.num_planes < 3
        || !(8..=16).contains(&format.bits_per_sample)
    {
        return Err(Cnr2Error::UnsupportedFormat(format!(
            "{:?} {:?} {}-bit with {} planes",
            format.color_family, format.sample_type, format.bits_per_sample, format.num_planes
        )));
    }
    if format.bytes_per_sample() != T::BYTES || format.bits_per_sample > T::MAX_DEPTH {
        return Err(Cnr2Error::UnsupportedFormat(format!(
            "{}-bit samples cannot be stored in {}-byte samples",
            format.bits_per_sample,
            T::BYTES
        )));
    }
    if format.subsampling_w > 1 || format.subsampling_h > 1 {
        return Err(Cnr2Error::UnsupportedSubsampling {
            subw: format.subsampling_w,
            subh: format.subsampling_h,
        });
    }
    if format.width % (1 << format.subsampling_w) != 0 || format.height % (1 << format.subsampling_h) != 0 {
        return Err(Cnr2Error::UnsupportedFormat(format!(
            "{}x{} is not a multiple of the chroma subsampling ({}x{} log2)",
            format.width, format.height, format.subsampling_w, format.subsampling_h
        )));
    }
    Ok(())
}

// ============================================================================
// Shared Access
// ============================================================================

/// A filter behind a lock, for hosts that only hold shared references.
///
/// Every request takes the lock, which is how `MtMode::Serialized` is honored.
pub struct SharedCnr2<T: Sample, S: FrameSource<T>> {
    inner: Mutex<Cnr2<T, S>>,
}

impl<T: Sample, S: FrameSource<T>> SharedCnr2<T, S> {
    pub fn new(filter: Cnr2<T, S>) -> Self {
        Self {
            inner: Mutex::new(filter),
        }
    }

    pub fn get_frame(&self, n: usize) -> Result<Arc<Frame<T>>> {
        self.inner.lock().get_frame(n)
    }

    pub fn stats(&self) -> FilterStats {
        self.inner.lock().stats()
    }

    pub fn into_inner(self) -> Cnr2<T, S> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MemorySource, PropValue};

    /// Memory source that records every fetch.
    struct CountingSource {
        inner: MemorySource<u8>,
        fetches: Vec<usize>,
    }

    impl FrameSource<u8> for CountingSource {
        fn format(&self) -> &VideoFormat {
            self.inner.format()
        }

        fn frame_count(&self) -> usize {
            self.inner.frame_count()
        }

        fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<u8>>> {
            self.fetches.push(n);
            self.inner.get_frame(n)
        }
    }

    const W: usize = 16;
    const H: usize = 16;

    fn format() -> VideoFormat {
        VideoFormat::yuv(W, H, 1, 1, 8)
    }

    /// Flat luma with a little chroma noise that changes every frame.
    fn noisy_frame(n: usize, luma: u8) -> Frame<u8> {
        let mut frame = Frame::new(&format());
        frame.plane_mut(0).fill(luma);
        for p in 1..3 {
            let plane = frame.plane_mut(p);
            for y in 0..plane.height() {
                for (x, s) in plane.row_mut(y).iter_mut().enumerate() {
                    *s = 120 + ((x * 7 + y * 3 + n * 11 + p) % 9) as u8;
                }
            }
        }
        frame.props.insert("_Index".into(), PropValue::Int(n as i64));
        frame
    }

    fn filter(frames: Vec<Frame<u8>>) -> Cnr2<u8, CountingSource> {
        let source = CountingSource {
            inner: MemorySource::new(format(), frames),
            fetches: Vec::new(),
        };
        Cnr2::new(source, Cnr2Params::default()).unwrap()
    }

    fn clip(len: usize) -> Vec<Frame<u8>> {
        (0..len).map(|n| noisy_frame(n, 100)).collect()
    }

    #[test]
    fn frame_zero_passes_through() {
        let mut cnr = filter(clip(2));
        let out = cnr.get_frame(0).unwrap();

        assert_eq!(*out, noisy_frame(0, 100));
        assert_eq!(cnr.last_frame(), None);
        assert_eq!(cnr.stats().frames_blended, 0);
        assert_eq!(cnr.stats().passthrough, 1);
    }

    #[test]
    fn frame_one_after_zero_reloads_previous_luma() {
        let mut cnr = filter(clip(2));
        cnr.get_frame(0).unwrap();
        cnr.get_frame(1).unwrap();

        // frame 0 never set last_frame, so frame 1 refetches it
        assert_eq!(cnr.source().fetches, vec![0, 1, 0]);
        assert_eq!(cnr.last_frame(), Some(1));
    }

    #[test]
    fn sequential_requests_use_cache() {
        let mut cnr = filter(clip(5));
        for n in 0..5 {
            cnr.get_frame(n).unwrap();
        }

        assert_eq!(cnr.source().fetches, vec![0, 1, 0, 2, 3, 4]);
        assert_eq!(cnr.stats().cache_misses, 1);
        assert_eq!(cnr.stats().frames_blended, 4);
        assert_eq!(cnr.last_frame(), Some(4));
    }

    #[test]
    fn blended_output_smooths_chroma_and_keeps_luma() {
        let frames = clip(2);
        let mut cnr = filter(frames.clone());
        let out = cnr.get_frame(1).unwrap();

        assert_eq!(out.plane(0), frames[1].plane(0));
        assert_ne!(out.plane(1), frames[1].plane(1));

        // every output sample lies between the previous and current sample
        for y in 0..out.plane(1).height() {
            let (o, c, p) = (out.plane(1).row(y), frames[1].plane(1).row(y), frames[0].plane(1).row(y));
            for x in 0..o.len() {
                assert!(o[x] >= c[x].min(p[x]) && o[x] <= c[x].max(p[x]));
            }
        }
        assert_eq!(out.props.get("_Index"), Some(&PropValue::Int(1)));
    }

    #[test]
    fn blended_frame_becomes_previous() {
        let frames = clip(3);

        let mut sequential = filter(frames.clone());
        sequential.get_frame(1).unwrap();
        let recursive = sequential.get_frame(2).unwrap();

        // a jump to 2 compares against the unfiltered frame 1 instead
        let mut jumped = filter(frames);
        let direct = jumped.get_frame(2).unwrap();

        assert_ne!(recursive.plane(1), direct.plane(1));
    }

    #[test]
    fn non_sequential_request_reloads_from_n_minus_one() {
        let frames = clip(12);
        let mut cnr = filter(frames.clone());
        for n in 0..=3 {
            cnr.get_frame(n).unwrap();
        }
        let before = cnr.source().fetches.len();

        let jumped = cnr.get_frame(8).unwrap();
        assert_eq!(&cnr.source().fetches[before..], &[8, 7]);
        assert_eq!(cnr.last_frame(), Some(8));

        let mut fresh = filter(frames);
        let expected = fresh.get_frame(8).unwrap();
        assert_eq!(*jumped, *expected);
    }

    #[test]
    fn revisiting_frame_zero_invalidates_cache() {
        let mut frames = clip(7);
        frames[0].plane_mut(1).fill(110);
        for frame in &mut frames[1..6] {
            frame.plane_mut(1).fill(100);
        }
        frames[6].plane_mut(1).fill(102);

        let mut cnr = filter(frames.clone());
        for n in 0..=5 {
            cnr.get_frame(n).unwrap();
        }
        cnr.get_frame(0).unwrap();
        assert_eq!(cnr.last_frame(), None);

        let before = cnr.source().fetches.len();
        let out = cnr.get_frame(6).unwrap();
        assert_eq!(&cnr.source().fetches[before..], &[6, 5]);
        assert_eq!(cnr.stats().cache_misses, 2);

        // blended against frame 5, never frame 0
        assert!(out.plane(1).data().iter().all(|&u| (100..=102).contains(&u)));
        let mut fresh = filter(frames);
        assert_eq!(*out, *fresh.get_frame(6).unwrap());
    }

    #[test]
    fn backward_jump_reloads_from_n_minus_one() {
        let frames = clip(6);
        let mut cnr = filter(frames.clone());
        for n in 0..=5 {
            cnr.get_frame(n).unwrap();
        }
        let before = cnr.source().fetches.len();

        let out = cnr.get_frame(3).unwrap();
        assert_eq!(&cnr.source().fetches[before..], &[3, 2]);
        assert_eq!(cnr.last_frame(), Some(3));

        let mut fresh = filter(frames);
        assert_eq!(*out, *fresh.get_frame(3).unwrap());
    }

    #[test]
    fn scene_change_returns_current_frame_and_keeps_cache() {
        let mut frames = clip(4);
        // every chroma position sees |100 << 2| against a limit of 5606
        frames[2] = noisy_frame(2, 200);
        let mut cnr = filter(frames.clone());

        cnr.get_frame(0).unwrap();
        cnr.get_frame(1).unwrap();
        let out = cnr.get_frame(2).unwrap();

        assert_eq!(*out, frames[2]);
        assert_eq!(cnr.last_frame(), Some(1));
        assert_eq!(cnr.stats().scene_changes, 1);
    }

    // The aborted frame's luma is computed but never committed: the cached
    // previous luma still belongs to frame 1 after frame 2 aborts.
    #[test]
    fn scene_change_does_not_promote_working_luma() {
        let mut frames = clip(4);
        frames[2] = noisy_frame(2, 200);
        frames[3] = noisy_frame(3, 200);
        let mut cnr = filter(frames.clone());
        cnr.get_frame(1).unwrap();
        cnr.get_frame(2).unwrap();
        let fetches = cnr.source().fetches.len();

        // Asking for 2 again is still a cache hit against frame 1.
        let again = cnr.get_frame(2).unwrap();
        assert_eq!(*again, frames[2]);
        assert_eq!(cnr.source().fetches.len(), fetches + 1);
        assert_eq!(cnr.stats().cache_misses, 1);

        // Moving on to 3 must refetch 2 rather than trust the working buffer.
        cnr.get_frame(3).unwrap();
        assert_eq!(&cnr.source().fetches[fetches + 1..], &[3, 2]);
        assert_eq!(cnr.stats().cache_misses, 2);
        assert_eq!(cnr.last_frame(), Some(3));
    }

    #[test]
    fn zero_threshold_always_passes_through_moving_luma() {
        let frames: Vec<_> = (0..3).map(|n| noisy_frame(n, 100 + n as u8)).collect();
        let source = CountingSource {
            inner: MemorySource::new(format(), frames.clone()),
            fetches: Vec::new(),
        };
        let params = Cnr2Params { scdthr: 0.0, ..Default::default() };
        let mut cnr = Cnr2::new(source, params).unwrap();

        assert_eq!(*cnr.get_frame(1).unwrap(), frames[1]);
        assert_eq!(*cnr.get_frame(2).unwrap(), frames[2]);
        assert_eq!(cnr.last_frame(), None);
    }

    #[test]
    fn source_errors_propagate() {
        let mut cnr = filter(clip(2));
        assert!(matches!(cnr.get_frame(5), Err(Cnr2Error::Source { index: 5, .. })));
    }

    #[test]
    fn rejects_unsupported_formats() {
        let rgb = VideoFormat { color_family: ColorFamily::Rgb, ..format() };
        let float = VideoFormat { sample_type: SampleType::Float, bits_per_sample: 32, ..format() };
        let gray = VideoFormat { color_family: ColorFamily::Gray, num_planes: 1, ..format() };
        for bad in [rgb, float, gray] {
            let source = MemorySource::<u16>::new(bad, Vec::new());
            assert!(matches!(
                Cnr2::new(source, Cnr2Params::default()),
                Err(Cnr2Error::UnsupportedFormat(_))
            ));
        }

        let yuv411 = VideoFormat::yuv(W, H, 2, 0, 8);
        let source = MemorySource::<u8>::new(yuv411, Vec::new());
        assert!(matches!(
            Cnr2::new(source, Cnr2Params::default()),
            Err(Cnr2Error::UnsupportedSubsampling { subw: 2, subh: 0 })
        ));

        for odd in [VideoFormat::yuv(15, H, 1, 1, 8), VideoFormat::yuv(W, 15, 1, 1, 8), VideoFormat::yuv(15, H, 1, 0, 8)] {
            let source = MemorySource::<u8>::new(odd, Vec::new());
            assert!(matches!(
                Cnr2::new(source, Cnr2Params::default()),
                Err(Cnr2Error::UnsupportedFormat(_))
            ));
        }
        // odd sizes are fine on axes without subsampling
        let source = MemorySource::<u8>::new(VideoFormat::yuv(W, 15, 1, 0, 8), Vec::new());
        assert!(Cnr2::new(source, Cnr2Params::default()).is_ok());

        let ten_bit = VideoFormat::yuv(W, H, 1, 1, 10);
        let source = MemorySource::<u8>::new(ten_bit, Vec::new());
        assert!(Cnr2::new(source, Cnr2Params::default()).is_err());
    }

    #[test]
    fn rejects_invalid_params() {
        let source = MemorySource::<u8>::new(format(), Vec::new());
        let params = Cnr2Params { ln: 0, ..Default::default() };
        assert!(matches!(
            Cnr2::new(source, params),
            Err(Cnr2Error::OutOfRange { name: "ln", .. })
        ));
    }

    #[test]
    fn shared_filter_serializes_requests() {
        let shared = SharedCnr2::new(filter(clip(6)));
        assert_eq!(Cnr2::<u8, CountingSource>::MT_MODE, MtMode::Serialized);

        std::thread::scope(|scope| {
            for n in 1..6 {
                let shared = &shared;
                scope.spawn(move || shared.get_frame(n).unwrap());
            }
        });

        let stats = shared.stats();
        assert_eq!(stats.frames_blended + stats.scene_changes, 5);
    }
}

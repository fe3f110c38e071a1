//! # CNR2 Core
//!
//! Temporal chroma noise reduction for planar YUV video.
//!
//! Chroma of the current frame is blended with the previous frame's chroma,
//! weighted by how similar luma and chroma are at each co-located pixel. A
//! scene-change guard bypasses blending across cuts.
//!
//! ```text
//! FrameSource ─► Cnr2 ─┬─► downsample (luma → chroma grid, row parallel)
//!                      ├─► blend (weighted chroma, scene-change scan)
//!                      └─► FilterState (prev frame, luma double buffer)
//! ```

// ============================================================================
// Errors / Configuration
// ============================================================================
pub mod error;
pub mod params;

// ============================================================================
// Frames
// ============================================================================
pub mod sample;
pub mod frame;
pub mod y4m;

// ============================================================================
// Filter
// ============================================================================
pub mod weights;
pub mod downsample;
pub mod blend;
pub mod filter;

pub use error::{Cnr2Error, Result};
pub use filter::{Cnr2, FilterStats, MtMode, SharedCnr2};
pub use frame::{Frame, FrameSource, MemorySource, Plane, VideoFormat};
pub use params::Cnr2Params;
pub use sample::Sample;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

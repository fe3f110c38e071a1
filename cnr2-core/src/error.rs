use thiserror::Error;

#[derive(Debug, Error)]
pub enum Cnr2Error {
    #[error("clip must be in YUV 8..16-bit planar format and must have at least three planes ({0})")]
    UnsupportedFormat(String),
    #[error("clip must have chroma subsampling 420, 422, 440 or 444 (got {subw}x{subh} log2)")]
    UnsupportedSubsampling { subw: u32, subh: u32 },
    #[error("mode must have at least three characters (got {0:?})")]
    InvalidMode(String),
    #[error("{name} must be between {min} and {max} (inclusive), got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("frame source failed at frame {index}: {message}")]
    Source { index: usize, message: String },
    #[error("invalid YUV4MPEG2 stream: {0}")]
    InvalidY4m(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parameter file error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Cnr2Error>;

//! # YUV4MPEG2 I/O
//!
//! `Y4mReader` indexes every frame offset up front so frames can be fetched
//! in any order, which is what the filter's cache-miss path needs.
//! Samples wider than 8 bits are little-endian, two bytes each.
//!
//! ```text
//! YUV4MPEG2 W1920 H1080 F24000:1001 Ip A1:1 C420p10\n
//! FRAME\n <Y plane> <U plane> <V plane>
//! FRAME\n ...
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Cnr2Error, Result};
use crate::frame::{ColorFamily, Frame, FrameSource, Plane, PropValue, SampleType, VideoFormat};
use crate::sample::Sample;

const STREAM_MAGIC: &str = "YUV4MPEG2";
const FRAME_MAGIC: &str = "FRAME";
/// Longest header line we accept
const MAX_HEADER_LEN: usize = 4096;

// ============================================================================
// Header
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Y4mHeader {
    pub width: usize,
    pub height: usize,
    /// Frame rate numerator/denominator
    pub fps: (u32, u32),
    /// Interlacing tag (`p`, `t`, `b`, `m`, `?`)
    pub interlace: char,
    /// Pixel aspect ratio
    pub aspect: (u32, u32),
    /// Colorspace tag without the leading `C`
    pub colorspace: String,
    /// `X` tags, kept verbatim
    pub extensions: Vec<String>,
}

impl Y4mHeader {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tags = line.split_ascii_whitespace();
        if tags.next() != Some(STREAM_MAGIC) {
            return Err(Cnr2Error::InvalidY4m("missing YUV4MPEG2 signature".into()));
        }

        let mut header = Self {
            width: 0,
            height: 0,
            fps: (25, 1),
            interlace: '?',
            aspect: (0, 0),
            colorspace: "420jpeg".into(),
            extensions: Vec::new(),
        };

        for tag in tags {
            let mut chars = tag.chars();
            let key = chars.next();
            let value = chars.as_str();
            match key {
                Some('W') => header.width = parse_number(tag, value)?,
                Some('H') => header.height = parse_number(tag, value)?,
                Some('F') => header.fps = parse_ratio(tag, value)?,
                Some('A') => header.aspect = parse_ratio(tag, value)?,
                Some('I') => header.interlace = value.chars().next().unwrap_or('?'),
                Some('C') => header.colorspace = value.to_string(),
                Some('X') => header.extensions.push(value.to_string()),
                _ => tracing::debug!("Ignoring unknown Y4M tag {:?}", tag),
            }
        }

        if header.width == 0 || header.height == 0 {
            return Err(Cnr2Error::InvalidY4m("missing frame dimensions".into()));
        }
        Ok(header)
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} W{} H{} F{}:{} I{} A{}:{} C{}",
            STREAM_MAGIC,
            self.width,
            self.height,
            self.fps.0,
            self.fps.1,
            self.interlace,
            self.aspect.0,
            self.aspect.1,
            self.colorspace
        );
        for ext in &self.extensions {
            line.push_str(" X");
            line.push_str(ext);
        }
        line.push('\n');
        line
    }

    /// Clip format described by the colorspace tag.
    pub fn format(&self) -> Result<VideoFormat> {
        let cs = self.colorspace.as_str();

        if let Some(bits) = cs.strip_prefix("mono") {
            let bits = if bits.is_empty() { 8 } else { parse_depth(cs, bits)? };
            return Ok(VideoFormat {
                width: self.width,
                height: self.height,
                color_family: ColorFamily::Gray,
                sample_type: SampleType::Integer,
                bits_per_sample: bits,
                subsampling_w: 0,
                subsampling_h: 0,
                num_planes: 1,
            });
        }

        let (layout, bits) = match cs.split_once('p') {
            // "420paldv" is an 8-bit siting variant, not a depth suffix
            Some((layout, rest)) if rest.chars().all(|c| c.is_ascii_digit()) => (layout, parse_depth(cs, rest)?),
            _ => (cs, 8),
        };

        let (subw, subh, planes) = match layout {
            "420" | "420jpeg" | "420paldv" | "420mpeg2" => (1, 1, 3),
            "422" => (1, 0, 3),
            "440" => (0, 1, 3),
            "444" => (0, 0, 3),
            "444alpha" => (0, 0, 4),
            "411" => (2, 0, 3),
            _ => {
                return Err(Cnr2Error::InvalidY4m(format!("unsupported colorspace C{}", cs)));
            }
        };

        Ok(VideoFormat {
            num_planes: planes,
            ..VideoFormat::yuv(self.width, self.height, subw, subh, bits)
        })
    }
}

fn parse_number<N: std::str::FromStr>(tag: &str, value: &str) -> Result<N> {
    value
        .parse()
        .map_err(|_| Cnr2Error::InvalidY4m(format!("bad tag {:?}", tag)))
}

fn parse_ratio(tag: &str, value: &str) -> Result<(u32, u32)> {
    let (num, den) = value
        .split_once(':')
        .ok_or_else(|| Cnr2Error::InvalidY4m(format!("bad ratio {:?}", tag)))?;
    Ok((parse_number(tag, num)?, parse_number(tag, den)?))
}

fn parse_depth(cs: &str, bits: &str) -> Result<u32> {
    match bits.parse::<u32>() {
        Ok(bits @ 8..=16) => Ok(bits),
        _ => Err(Cnr2Error::InvalidY4m(format!("unsupported bit depth in C{}", cs))),
    }
}

/// Read one `\n`-terminated line (newline not included).
fn read_line<R: Read>(reader: &mut R) -> Result<Option<String>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            return Err(Cnr2Error::InvalidY4m("unexpected end of stream in header".into()));
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_HEADER_LEN {
            return Err(Cnr2Error::InvalidY4m("header line too long".into()));
        }
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| Cnr2Error::InvalidY4m("header is not ASCII".into()))
}

// ============================================================================
// Reader
// ============================================================================

pub struct Y4mReader<R: Read + Seek> {
    reader: R,
    header: Y4mHeader,
    format: VideoFormat,
    /// Byte offset of each frame's sample data
    offsets: Vec<u64>,
}

impl Y4mReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> Y4mReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let line = read_line(&mut reader)?.ok_or_else(|| Cnr2Error::InvalidY4m("empty stream".into()))?;
        let header = Y4mHeader::parse(&line)?;
        let format = header.format()?;
        let frame_size = format.frame_size() as u64;

        let mut pos = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;

        let mut offsets = Vec::new();
        while pos < len {
            let frame_line = read_line(&mut reader)?
                .ok_or_else(|| Cnr2Error::InvalidY4m("unexpected end of stream".into()))?;
            if !frame_line.starts_with(FRAME_MAGIC) {
                return Err(Cnr2Error::InvalidY4m(format!("expected FRAME, got {:?}", frame_line)));
            }
            let data = reader.stream_position()?;
            if data + frame_size > len {
                return Err(Cnr2Error::InvalidY4m(format!("frame {} is truncated", offsets.len())));
            }
            offsets.push(data);
            pos = reader.seek(SeekFrom::Start(data + frame_size))?;
        }

        tracing::debug!(
            "Y4M {}x{} C{}: {} frames",
            header.width,
            header.height,
            header.colorspace,
            offsets.len()
        );

        Ok(Self {
            reader,
            header,
            format,
            offsets,
        })
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }

    fn read_frame<T: Sample>(&mut self, n: usize) -> Result<Frame<T>> {
        if self.format.bytes_per_sample() != T::BYTES {
            return Err(Cnr2Error::Source {
                index: n,
                message: format!(
                    "{}-bit stream read as {}-byte samples",
                    self.format.bits_per_sample,
                    T::BYTES
                ),
            });
        }
        let offset = *self.offsets.get(n).ok_or_else(|| Cnr2Error::Source {
            index: n,
            message: format!("stream has {} frames", self.offsets.len()),
        })?;

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; self.format.frame_size()];
        self.reader.read_exact(&mut bytes)?;

        let mut planes = Vec::with_capacity(self.format.num_planes);
        let mut rest = bytes.as_slice();
        for p in 0..self.format.num_planes {
            let (w, h) = self.format.plane_dimensions(p);
            let (plane_bytes, tail) = rest.split_at(w * h * T::BYTES);
            let samples = plane_bytes.chunks_exact(T::BYTES).map(T::from_le_slice).collect();
            planes.push(Plane::from_vec(w, h, samples)?);
            rest = tail;
        }

        let mut frame = Frame::from_planes(planes);
        let (num, den) = self.header.fps;
        frame.props.insert("_DurationNum".into(), PropValue::Int(den as i64));
        frame.props.insert("_DurationDen".into(), PropValue::Int(num as i64));
        if self.header.aspect.0 > 0 {
            frame.props.insert("_SARNum".into(), PropValue::Int(self.header.aspect.0 as i64));
            frame.props.insert("_SARDen".into(), PropValue::Int(self.header.aspect.1 as i64));
        }
        Ok(frame)
    }
}

impl<R: Read + Seek> FrameSource<u8> for Y4mReader<R> {
    fn format(&self) -> &VideoFormat {
        &self.format
    }

    fn frame_count(&self) -> usize {
        self.offsets.len()
    }

    fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<u8>>> {
        self.read_frame(n).map(Arc::new)
    }
}

impl<R: Read + Seek> FrameSource<u16> for Y4mReader<R> {
    fn format(&self) -> &VideoFormat {
        &self.format
    }

    fn frame_count(&self) -> usize {
        self.offsets.len()
    }

    fn get_frame(&mut self, n: usize) -> Result<Arc<Frame<u16>>> {
        self.read_frame(n).map(Arc::new)
    }
}

// ============================================================================
// Writer
// ============================================================================

pub struct Y4mWriter<W: Write> {
    writer: W,
    frames_written: usize,
    buffer: Vec<u8>,
}

impl Y4mWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: &Y4mHeader) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write> Y4mWriter<W> {
    pub fn new(mut writer: W, header: &Y4mHeader) -> Result<Self> {
        writer.write_all(header.to_line().as_bytes())?;
        Ok(Self {
            writer,
            frames_written: 0,
            buffer: Vec::new(),
        })
    }

    pub fn write_frame<T: Sample>(&mut self, frame: &Frame<T>) -> Result<()> {
        self.buffer.clear();
        self.buffer.extend_from_slice(FRAME_MAGIC.as_bytes());
        self.buffer.push(b'\n');
        for plane in frame.planes() {
            for y in 0..plane.height() {
                for &s in plane.row(y) {
                    s.extend_le(&mut self.buffer);
                }
            }
        }
        self.writer.write_all(&self.buffer)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

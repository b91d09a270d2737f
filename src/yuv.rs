//! Raw planar yuv frame reading.
use crate::asset::PixelFormat;
use anyhow::{Context, ensure};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    /// Row-major samples, 10-bit samples are stored as-is.
    pub data: Vec<u16>,
}

/// A single decoded frame, planes are Y, Cb, Cr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub planes: [Plane; 3],
    pub bit_depth: u8,
}

impl Picture {
    /// Build a picture from a single raw frame of `format`.
    pub fn from_bytes(
        bytes: &[u8],
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> anyhow::Result<Self> {
        ensure!(
            bytes.len() == format.frame_size(width, height),
            "expected {} bytes for a {width}x{height} {format} frame, got {}",
            format.frame_size(width, height),
            bytes.len()
        );
        let bps = format.bytes_per_sample();
        let mut offset = 0;
        let planes = format.plane_dimensions(width, height).map(|(w, h)| {
            let len = w * h * bps;
            let raw = &bytes[offset..offset + len];
            offset += len;
            let data = match bps {
                1 => raw.iter().map(|b| u16::from(*b)).collect(),
                _ => raw
                    .chunks_exact(2)
                    .map(|le| u16::from_le_bytes([le[0], le[1]]))
                    .collect(),
            };
            Plane {
                width: w,
                height: h,
                data,
            }
        });
        Ok(Self {
            planes,
            bit_depth: format.bit_depth(),
        })
    }

    pub fn luma(&self) -> &Plane {
        &self.planes[0]
    }
}

/// Sequential frame reader over a raw yuv file.
pub struct YuvReader {
    file: BufReader<File>,
    width: usize,
    height: usize,
    format: PixelFormat,
    buf: Vec<u8>,
}

impl YuvReader {
    pub fn open(
        path: &Path,
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
        Ok(Self {
            file: BufReader::new(file),
            width,
            height,
            format,
            buf: vec![0; format.frame_size(width, height)],
        })
    }

    /// Read the next frame, `None` at the end of the file.
    pub fn next_picture(&mut self) -> anyhow::Result<Option<Picture>> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.file.read(&mut self.buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        ensure!(
            filled == self.buf.len(),
            "truncated frame, read {filled} of {} bytes",
            self.buf.len()
        );
        Picture::from_bytes(&self.buf, self.width, self.height, self.format).map(Some)
    }
}

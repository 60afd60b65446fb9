//! Raw interleaved pixel buffers handed to and returned by the lossy codec.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};

/// Channel counts the engine accepts: gray, RGB, RGBA.
pub const SUPPORTED_CHANNELS: [u8; 3] = [1, 3, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Interleaved 8-bit samples, row-major.
///
/// Always satisfies `data.len() == width * height * channels`, a non-zero area
/// and a supported channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidParameter(format!(
                "zero-area pixel buffer {width}x{height}"
            )));
        }
        if !SUPPORTED_CHANNELS.contains(&channels) {
            return Err(CompressError::InvalidParameter(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(CompressError::InvalidParameter(format!(
                "pixel data has {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self> {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Split interleaved samples into one plane per channel.
    pub(crate) fn planes(&self) -> Vec<Vec<u8>> {
        let c = self.channels as usize;
        (0..c)
            .map(|ch| self.data.iter().skip(ch).step_by(c).copied().collect())
            .collect()
    }

    /// Interleave per-channel planes back into a buffer.
    pub(crate) fn from_planes(width: u32, height: u32, planes: &[Vec<u8>]) -> Result<Self> {
        let channels = u8::try_from(planes.len())
            .map_err(|_| CompressError::InvalidParameter(format!("{} planes", planes.len())))?;
        let pixels = width as usize * height as usize;
        if planes.iter().any(|p| p.len() != pixels) {
            return Err(CompressError::InvalidParameter("plane size does not match dimensions".into()));
        }
        let mut data = Vec::with_capacity(pixels * planes.len());
        for i in 0..pixels {
            data.extend(planes.iter().map(|p| p[i]));
        }
        Self::new(width, height, channels, data)
    }

    /// Resample to `width` x `height`.
    ///
    /// Each axis is filtered separately: shrinking averages the source
    /// samples an output sample covers (weighted by overlap), enlarging
    /// interpolates linearly between the two nearest source samples.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CompressError::InvalidParameter(format!(
                "zero-area resize target {width}x{height}"
            )));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(self.clone());
        }
        let c = self.channels as usize;
        let (src_w, src_h) = (self.width as usize, self.height as usize);
        let (dst_w, dst_h) = (width as usize, height as usize);
        let x_taps = axis_taps(src_w, dst_w);
        let y_taps = axis_taps(src_h, dst_h);

        let mut rows = vec![0.0f32; src_h * dst_w * c];
        for y in 0..src_h {
            let src_row = &self.data[y * src_w * c..(y + 1) * src_w * c];
            for (x, taps) in x_taps.iter().enumerate() {
                for ch in 0..c {
                    rows[(y * dst_w + x) * c + ch] =
                        taps.iter().map(|&(s, w)| w * f32::from(src_row[s * c + ch])).sum();
                }
            }
        }

        let mut data = Vec::with_capacity(dst_w * dst_h * c);
        for taps in &y_taps {
            for x in 0..dst_w {
                for ch in 0..c {
                    let v: f32 = taps.iter().map(|&(s, w)| w * rows[(s * dst_w + x) * c + ch]).sum();
                    data.push(v.round().clamp(0.0, 255.0) as u8);
                }
            }
        }
        Self::new(width, height, self.channels, data)
    }
}

/// Source indices and weights for every output sample along one axis.
fn axis_taps(src: usize, dst: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            if dst <= src {
                let start = i as f64 * scale;
                let end = start + scale;
                let last = (end.ceil() as usize).min(src);
                (start.floor() as usize..last)
                    .filter_map(|s| {
                        let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                        (overlap > 0.0).then_some((s, (overlap / scale) as f32))
                    })
                    .collect()
            } else {
                let center = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, (src - 1) as f64);
                let s0 = center.floor() as usize;
                let frac = (center - s0 as f64) as f32;
                vec![(s0, 1.0 - frac), ((s0 + 1).min(src - 1), frac)]
            }
        })
        .collect()
}

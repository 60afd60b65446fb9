//! Lossy JPEG-style image codec built on the DCT block codec.
//!
//! Stream layout: a bincode header (magic `IPJL`, version, width, height,
//! channels, quality, flags) followed by one length-prefixed entropy-coded
//! segment per plane. Quantization tables are rebuilt from the quality on
//! decode, so they are not transmitted. When a resize target is set the
//! image is resampled first and the header records the coded dimensions.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dct::{decode_plane, encode_plane, QuantTable};
use crate::error::{CompressError, Result};
use crate::pixel::{PixelBuffer, SUPPORTED_CHANNELS};

pub const MAGIC: [u8; 4] = *b"IPJL";
pub const VERSION: u8 = 1;
/// Serialized size of [`JpegLiteHeader`].
pub const HEADER_LEN: usize = 16;

const FLAG_YCBCR: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegLiteOptions {
    /// Code RGB as YCbCr so chroma can use the coarser table.
    pub color_transform: bool,
    /// Resample to this width and height before coding.
    pub target: Option<(u32, u32)>,
}

impl Default for JpegLiteOptions {
    fn default() -> Self {
        Self {
            color_transform: true,
            target: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JpegLiteHeader {
    magic: [u8; 4],
    version: u8,
    width: u32,
    height: u32,
    channels: u8,
    quality: u8,
    flags: u8,
}

pub fn compress(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    compress_with(pixels, quality, &JpegLiteOptions::default())
}

pub fn compress_with(pixels: &PixelBuffer, quality: u8, options: &JpegLiteOptions) -> Result<Vec<u8>> {
    if quality > 100 {
        return Err(CompressError::InvalidParameter(format!("quality {quality} outside 0..=100")));
    }
    let resized;
    let pixels = match options.target {
        Some((width, height)) => {
            resized = pixels.resize(width, height)?;
            &resized
        }
        None => pixels,
    };
    let ycbcr = options.color_transform && pixels.channels() >= 3;
    let header = JpegLiteHeader {
        magic: MAGIC,
        version: VERSION,
        width: pixels.width(),
        height: pixels.height(),
        channels: pixels.channels(),
        quality,
        flags: if ycbcr { FLAG_YCBCR } else { 0 },
    };
    let mut out = bincode::serialize(&header).map_err(|e| CompressError::SerializationError(e.to_string()))?;

    let mut planes = pixels.planes();
    if ycbcr {
        rgb_to_ycbcr(&mut planes);
    }
    let (width, height) = (pixels.width() as usize, pixels.height() as usize);
    for (index, plane) in planes.iter().enumerate() {
        let table = plane_table(index, ycbcr, quality)?;
        let segment = encode_plane(plane, width, height, &table)?;
        trace!(plane = index, bytes = segment.len(), "jpeg-lite plane");
        out.extend_from_slice(&(segment.len() as u32).to_le_bytes());
        out.extend_from_slice(&segment);
    }

    debug!(
        width,
        height,
        channels = pixels.channels(),
        quality,
        ycbcr,
        original = pixels.data().len(),
        compressed = out.len(),
        "jpeg-lite compress"
    );
    Ok(out)
}

pub fn decompress(data: &[u8]) -> Result<PixelBuffer> {
    let mut rest = data;
    let header: JpegLiteHeader = bincode::deserialize_from(&mut rest)
        .map_err(|e| CompressError::CorruptStream(format!("jpeg-lite header: {e}")))?;
    if header.magic != MAGIC {
        return Err(CompressError::CorruptStream("not a jpeg-lite stream".into()));
    }
    if header.version != VERSION {
        return Err(CompressError::CorruptStream(format!(
            "unsupported jpeg-lite version {}",
            header.version
        )));
    }
    if header.width == 0
        || header.height == 0
        || !SUPPORTED_CHANNELS.contains(&header.channels)
        || header.quality > 100
        || header.flags & !FLAG_YCBCR != 0
        || (header.flags & FLAG_YCBCR != 0 && header.channels < 3)
    {
        return Err(CompressError::CorruptStream("invalid jpeg-lite header fields".into()));
    }
    let ycbcr = header.flags & FLAG_YCBCR != 0;
    let (width, height) = (header.width as usize, header.height as usize);

    let mut planes = Vec::with_capacity(header.channels as usize);
    for index in 0..header.channels as usize {
        if rest.len() < 4 {
            return Err(CompressError::CorruptStream(format!("plane {index} length missing")));
        }
        let (len_bytes, tail) = rest.split_at(4);
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if tail.len() < len {
            return Err(CompressError::CorruptStream(format!("plane {index} truncated")));
        }
        let (segment, tail) = tail.split_at(len);
        let table = plane_table(index, ycbcr, header.quality)?;
        let plane = decode_plane(segment, width, height, &table)
            .map_err(|e| e.into_corrupt(&format!("jpeg-lite plane {index}")))?;
        planes.push(plane);
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(CompressError::CorruptStream("trailing bytes after last plane".into()));
    }

    if ycbcr {
        ycbcr_to_rgb(&mut planes);
    }
    let pixels = PixelBuffer::from_planes(header.width, header.height, &planes)?;
    debug!(width, height, channels = header.channels, compressed = data.len(), "jpeg-lite decompress");
    Ok(pixels)
}

/// Chroma planes of a YCbCr image use the chroma table; everything else
/// (gray, Y, alpha, untransformed RGB) uses the luma table.
fn plane_table(index: usize, ycbcr: bool, quality: u8) -> Result<QuantTable> {
    if ycbcr && (index == 1 || index == 2) {
        QuantTable::chroma(quality)
    } else {
        QuantTable::luma(quality)
    }
}

fn to_sample(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// JFIF full-range RGB to YCbCr on the first three planes.
fn rgb_to_ycbcr(planes: &mut [Vec<u8>]) {
    let [r, g, b, ..] = planes else { return };
    for i in 0..r.len() {
        let (rf, gf, bf) = (f32::from(r[i]), f32::from(g[i]), f32::from(b[i]));
        let y = 0.299 * rf + 0.587 * gf + 0.114 * bf;
        let cb = -0.168_736 * rf - 0.331_264 * gf + 0.5 * bf + 128.0;
        let cr = 0.5 * rf - 0.418_688 * gf - 0.081_312 * bf + 128.0;
        r[i] = to_sample(y);
        g[i] = to_sample(cb);
        b[i] = to_sample(cr);
    }
}

fn ycbcr_to_rgb(planes: &mut [Vec<u8>]) {
    let [y, cb, cr, ..] = planes else { return };
    for i in 0..y.len() {
        let yf = f32::from(y[i]);
        let cbf = f32::from(cb[i]) - 128.0;
        let crf = f32::from(cr[i]) - 128.0;
        y[i] = to_sample(yf + 1.402 * crf);
        cb[i] = to_sample(yf - 0.344_136 * cbf - 0.714_136 * crf);
        cr[i] = to_sample(yf + 1.772 * cbf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::compute_fidelity;

    fn test_image(width: u32, height: u32, channels: u8) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height) as usize * channels as usize);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels as u32 {
                    let v = (x * 7 + y * 3 + c * 40) % 256;
                    data.push(v as u8);
                }
            }
        }
        PixelBuffer::new(width, height, channels, data).unwrap()
    }

    #[test]
    fn test_header_len() {
        let header = JpegLiteHeader {
            magic: MAGIC,
            version: VERSION,
            width: 1,
            height: 1,
            channels: 1,
            quality: 1,
            flags: 0,
        };
        assert_eq!(bincode::serialize(&header).unwrap().len(), HEADER_LEN);
    }

    #[test]
    fn test_gray_roundtrip_keeps_dimensions() {
        let image = test_image(13, 7, 1);
        let decoded = decompress(&compress(&image, 75).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), image.dimensions());
    }

    #[test]
    fn test_rgba_roundtrip() {
        let image = test_image(9, 17, 4);
        let decoded = decompress(&compress(&image, 90).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), image.dimensions());
        assert!(compute_fidelity(&image, &decoded).unwrap().psnr > 25.0);
    }

    #[test]
    fn test_without_color_transform() {
        let image = test_image(16, 16, 3);
        let options = JpegLiteOptions {
            color_transform: false,
            ..JpegLiteOptions::default()
        };
        let compressed = compress_with(&image, 85, &options).unwrap();
        assert_eq!(compressed[HEADER_LEN - 1], 0);
        let decoded = decompress(&compressed).unwrap();
        assert!(compute_fidelity(&image, &decoded).unwrap().psnr > 25.0);
    }

    #[test]
    fn test_resize_target_sets_coded_dimensions() {
        let image = test_image(32, 20, 3);
        let options = JpegLiteOptions {
            target: Some((10, 6)),
            ..JpegLiteOptions::default()
        };
        let compressed = compress_with(&image, 80, &options).unwrap();
        let decoded = decompress(&compressed).unwrap();
        assert_eq!((decoded.width(), decoded.height(), decoded.channels()), (10, 6, 3));
        let reference = image.resize(10, 6).unwrap();
        assert!(compute_fidelity(&reference, &decoded).unwrap().psnr > 20.0);
        assert!(compressed.len() < compress(&image, 80).unwrap().len());
    }

    #[test]
    fn test_resize_target_rejects_zero_area() {
        let image = test_image(8, 8, 1);
        let options = JpegLiteOptions {
            target: Some((0, 8)),
            ..JpegLiteOptions::default()
        };
        assert!(matches!(
            compress_with(&image, 80, &options),
            Err(CompressError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_color_conversion_near_identity() {
        let mut planes = vec![vec![255, 0, 10, 200], vec![0, 255, 20, 100], vec![0, 0, 30, 50]];
        let original = planes.clone();
        rgb_to_ycbcr(&mut planes);
        ycbcr_to_rgb(&mut planes);
        for (a, b) in original.iter().flatten().zip(planes.iter().flatten()) {
            assert!((i16::from(*a) - i16::from(*b)).abs() <= 2, "{a} vs {b}");
        }
    }

    #[test]
    fn test_rejects_bad_quality() {
        let image = test_image(8, 8, 1);
        assert!(matches!(compress(&image, 101), Err(CompressError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_corrupt_streams() {
        let image = test_image(8, 8, 3);
        let compressed = compress(&image, 50).unwrap();

        let mut bad_magic = compressed.clone();
        bad_magic[1] = 0;
        assert!(matches!(decompress(&bad_magic), Err(CompressError::CorruptStream(_))));

        let mut bad_channels = compressed.clone();
        bad_channels[13] = 2;
        assert!(matches!(decompress(&bad_channels), Err(CompressError::CorruptStream(_))));

        assert!(matches!(
            decompress(&compressed[..compressed.len() - 1]),
            Err(CompressError::CorruptStream(_))
        ));

        let mut trailing = compressed.clone();
        trailing.push(0);
        assert!(matches!(decompress(&trailing), Err(CompressError::CorruptStream(_))));
    }
}

//! imgpress: self-contained image compression engine.
//!
//! Two codecs, both written from scratch:
//! - Deflate-family lossless byte compression (LZ77 + canonical Huffman)
//! - JPEG-style lossy image compression (8x8 DCT, quantization, zig-zag,
//!   run-length + Huffman entropy coding)
//!
//! plus the metrics that show what each one bought: size ratio for both,
//! MSE/PSNR for the lossy path. Every call is a pure function of its inputs.

pub mod bitio;
pub mod config;
pub mod dct;
pub mod deflate;
pub mod error;
pub mod huffman;
pub mod jpeg_lite;
pub mod lz77;
pub mod metrics;
pub mod pixel;

use tracing::{debug, warn};

use crate::config::CompressionConfig;
pub use crate::error::{CompressError, Result};
pub use crate::metrics::{CompressionMetrics, Fidelity};
pub use crate::pixel::{Dimensions, PixelBuffer};

/// Codec that produced a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CompressionMethod {
    Deflate,
    JpegLite,
}

/// Compressed output plus what it cost.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompressionResult {
    pub method: CompressionMethod,
    pub data: Vec<u8>,
    pub metrics: CompressionMetrics,
    /// Shannon entropy of the input in bits per byte.
    pub entropy_bits: f64,
}

impl CompressionResult {
    pub fn original_size(&self) -> usize {
        self.metrics.original_size
    }

    pub fn compressed_size(&self) -> usize {
        self.metrics.compressed_size
    }

    pub fn ratio(&self) -> f64 {
        self.metrics.ratio
    }
}

/// Output of [`Compressor::decompress`], tagged by codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decompressed {
    Bytes(Vec<u8>),
    Image(PixelBuffer),
}

/// Lossless round trip, verified byte for byte.
#[derive(Debug, Clone)]
pub struct LosslessReport {
    pub result: CompressionResult,
    pub decompressed: Vec<u8>,
}

/// Lossy round trip with fidelity against the original.
#[derive(Debug, Clone)]
pub struct LossyReport {
    pub result: CompressionResult,
    pub reconstructed: PixelBuffer,
    pub fidelity: Fidelity,
}

/// Compress bytes losslessly with a 32 KiB window at level 9.
pub fn deflate_compress(bytes: &[u8]) -> Result<Vec<u8>> {
    deflate::compress(bytes)
}

pub fn deflate_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    deflate::decompress(bytes)
}

/// Compress an image at `quality` (0–100, higher keeps more detail).
pub fn jpeg_lite_compress(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    jpeg_lite::compress(pixels, quality)
}

pub fn jpeg_lite_decompress(bytes: &[u8]) -> Result<PixelBuffer> {
    jpeg_lite::decompress(bytes)
}

pub fn compute_metrics(original_size: usize, compressed_size: usize) -> CompressionMetrics {
    metrics::compute_metrics(original_size, compressed_size)
}

pub fn compute_fidelity(original: &PixelBuffer, reconstructed: &PixelBuffer) -> Result<Fidelity> {
    metrics::compute_fidelity(original, reconstructed)
}

/// Identify the codec of a stream from its magic bytes.
pub fn detect_method(data: &[u8]) -> Option<CompressionMethod> {
    match data.get(..4)? {
        m if m == &deflate::MAGIC[..] => Some(CompressionMethod::Deflate),
        m if m == &jpeg_lite::MAGIC[..] => Some(CompressionMethod::JpegLite),
        _ => None,
    }
}

/// The main compressor engine
pub struct Compressor {
    config: CompressionConfig,
}

impl Compressor {
    /// Create a new compressor with the given configuration
    pub fn new(config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn compress_bytes(&self, data: &[u8]) -> Result<CompressionResult> {
        self.check_size(data.len())?;
        let compressed = deflate::compress_with(data, &self.config.deflate_options())?;
        Ok(self.result(CompressionMethod::Deflate, data, compressed))
    }

    /// Compress an image; `quality` falls back to the configured default.
    /// With `target_dimensions` configured the image is resampled first.
    pub fn compress_image(&self, pixels: &PixelBuffer, quality: Option<u8>) -> Result<CompressionResult> {
        self.check_size(pixels.data().len())?;
        if let Some((width, height)) = self.config.target_dimensions {
            self.check_size(width as usize * height as usize * pixels.channels() as usize)?;
        }
        let quality = quality.unwrap_or(self.config.default_quality);
        let compressed = jpeg_lite::compress_with(pixels, quality, &self.config.jpeg_lite_options())?;
        Ok(self.result(CompressionMethod::JpegLite, pixels.data(), compressed))
    }

    /// Decompress a stream from either codec.
    pub fn decompress(&self, data: &[u8]) -> Result<Decompressed> {
        let decoded = match detect_method(data) {
            Some(CompressionMethod::Deflate) => deflate::decompress(data).map(Decompressed::Bytes),
            Some(CompressionMethod::JpegLite) => jpeg_lite::decompress(data).map(Decompressed::Image),
            None => Err(CompressError::CorruptStream("unrecognized stream format".into())),
        };
        if let Err(e) = &decoded {
            warn!(error = %e, len = data.len(), "rejected compressed stream");
        }
        decoded
    }

    /// Compress, decompress and confirm the bytes survived unchanged.
    pub fn evaluate_bytes(&self, data: &[u8]) -> Result<LosslessReport> {
        let result = self.compress_bytes(data)?;
        let decompressed = deflate::decompress(&result.data)?;
        if decompressed != data {
            return Err(CompressError::CorruptStream("lossless round trip changed the data".into()));
        }
        debug!(ratio = result.metrics.ratio, "lossless evaluation");
        Ok(LosslessReport { result, decompressed })
    }

    /// Compress, decompress and measure how far the image drifted. A resized
    /// image is measured against the resampled original.
    pub fn evaluate_image(&self, pixels: &PixelBuffer, quality: Option<u8>) -> Result<LossyReport> {
        let result = self.compress_image(pixels, quality)?;
        let reconstructed = jpeg_lite::decompress(&result.data)?;
        let fidelity = match self.config.target_dimensions {
            Some((width, height)) => metrics::compute_fidelity(&pixels.resize(width, height)?, &reconstructed)?,
            None => metrics::compute_fidelity(pixels, &reconstructed)?,
        };
        debug!(
            ratio = result.metrics.ratio,
            psnr = fidelity.psnr,
            mse = fidelity.mse,
            "lossy evaluation"
        );
        Ok(LossyReport {
            result,
            reconstructed,
            fidelity,
        })
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.config.max_input_size {
            return Err(CompressError::InvalidParameter(format!(
                "input of {len} bytes exceeds limit of {}",
                self.config.max_input_size
            )));
        }
        Ok(())
    }

    fn result(&self, method: CompressionMethod, input: &[u8], compressed: Vec<u8>) -> CompressionResult {
        CompressionResult {
            method,
            metrics: metrics::compute_metrics(input.len(), compressed.len()),
            entropy_bits: metrics::shannon_entropy(input),
            data: compressed,
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            config: CompressionConfig::default(),
        }
    }
}

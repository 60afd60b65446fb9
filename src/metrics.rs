//! Size and fidelity metrics for compression results.

use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};
use crate::pixel::PixelBuffer;

const PEAK: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionMetrics {
    pub original_size: usize,
    pub compressed_size: usize,
    /// original / compressed; `f64::INFINITY` when nothing was produced.
    pub ratio: f64,
    /// 1 - compressed / original; 0 for empty input.
    pub space_savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fidelity {
    pub mse: f64,
    /// Peak signal-to-noise ratio in dB; `f64::INFINITY` for identical buffers.
    pub psnr: f64,
    pub max_abs_error: u8,
}

pub fn compute_metrics(original_size: usize, compressed_size: usize) -> CompressionMetrics {
    let ratio = if compressed_size == 0 {
        f64::INFINITY
    } else {
        original_size as f64 / compressed_size as f64
    };
    let space_savings = if original_size == 0 {
        0.0
    } else {
        1.0 - compressed_size as f64 / original_size as f64
    };
    CompressionMetrics {
        original_size,
        compressed_size,
        ratio,
        space_savings,
    }
}

pub fn compute_fidelity(original: &PixelBuffer, reconstructed: &PixelBuffer) -> Result<Fidelity> {
    if original.dimensions() != reconstructed.dimensions() {
        return Err(CompressError::SizeMismatch {
            expected: original.dimensions(),
            actual: reconstructed.dimensions(),
        });
    }
    let mut sum_sq = 0u64;
    let mut max_abs_error = 0u8;
    for (&a, &b) in original.data().iter().zip(reconstructed.data()) {
        let diff = a.abs_diff(b);
        sum_sq += u64::from(diff) * u64::from(diff);
        max_abs_error = max_abs_error.max(diff);
    }
    let mse = sum_sq as f64 / original.data().len() as f64;
    let psnr = if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (PEAK * PEAK / mse).log10()
    };
    Ok(Fidelity {
        mse,
        psnr,
        max_abs_error,
    })
}

/// Shannon entropy of a byte stream in bits per byte.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &f in &freq {
        if f > 0 {
            let p = f as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

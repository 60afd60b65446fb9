//! 8x8 block transform codec: DCT, quantization, zig-zag and entropy coding.
//!
//! A plane is padded to whole blocks by edge replication, each block is
//! transformed and quantized independently (on the rayon pool), then the
//! coefficients are run-length coded in zig-zag order and Huffman coded with
//! tables built from the plane's own statistics. Decoding mirrors every step
//! and crops the padding away.

use std::sync::OnceLock;

use rayon::prelude::*;
use tracing::trace;

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CompressError, Result};
use crate::huffman::{read_code_lengths, write_code_lengths, HuffmanTree, MAX_CODE_LENGTH};

pub const BLOCK_SIZE: usize = 8;

/// Maps zig-zag index to natural row-major index.
#[rustfmt::skip]
pub const ZIGZAG_TO_NATURAL: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Inverse of [`ZIGZAG_TO_NATURAL`].
pub const NATURAL_TO_ZIGZAG: [usize; 64] = {
    let mut table = [0usize; 64];
    let mut i = 0;
    while i < 64 {
        table[ZIGZAG_TO_NATURAL[i]] = i;
        i += 1;
    }
    table
};

/// Luminance base table (ITU-T T.81 Annex K.1), natural order.
#[rustfmt::skip]
const LUMA_BASE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61,
    12, 12, 14, 19, 26, 58, 60, 55,
    14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62,
    18, 22, 37, 56, 68, 109, 103, 77,
    24, 35, 55, 64, 81, 104, 113, 92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// Chrominance base table (ITU-T T.81 Annex K.2), natural order.
#[rustfmt::skip]
const CHROMA_BASE: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

const DC_SYMBOLS: usize = 16;
const AC_SYMBOLS: usize = 256;
const EOB: u8 = 0x00;
const ZRL: u8 = 0xF0;

/// Quantization divisors in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub values: [u16; 64],
}

impl QuantTable {
    pub fn luma(quality: u8) -> Result<Self> {
        Self::scaled(&LUMA_BASE, quality)
    }

    pub fn chroma(quality: u8) -> Result<Self> {
        Self::scaled(&CHROMA_BASE, quality)
    }

    /// IJG quality scaling: 50 keeps the base table, 100 gives all ones,
    /// lower qualities grow the divisors up to 255.
    fn scaled(base: &[u16; 64], quality: u8) -> Result<Self> {
        if quality > 100 {
            return Err(CompressError::InvalidParameter(format!("quality {quality} outside 0..=100")));
        }
        let q = u32::from(quality.max(1));
        let scale = if q < 50 { 5000 / q } else { 200 - 2 * q };
        let mut values = [0u16; 64];
        for (v, &b) in values.iter_mut().zip(base) {
            *v = ((u32::from(b) * scale + 50) / 100).clamp(1, 255) as u16;
        }
        Ok(Self { values })
    }
}

/// `BASIS[u][x] = c(u) * cos((2x + 1) u π / 16)`, orthonormal.
static BASIS: OnceLock<[[f32; 8]; 8]> = OnceLock::new();

fn basis() -> &'static [[f32; 8]; 8] {
    BASIS.get_or_init(|| {
        let mut table = [[0.0f32; 8]; 8];
        for (u, row) in table.iter_mut().enumerate() {
            let c = if u == 0 { (1.0f64 / 8.0).sqrt() } else { 0.5 };
            for (x, v) in row.iter_mut().enumerate() {
                let angle = (2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0;
                *v = (c * angle.cos()) as f32;
            }
        }
        table
    })
}

/// Level-shift by -128 and apply the separable 2D DCT-II (rows, then columns).
pub fn forward_dct(samples: &[u8; 64]) -> [f32; 64] {
    let c = basis();
    let mut rows = [0.0f32; 64];
    for r in 0..8 {
        for u in 0..8 {
            rows[r * 8 + u] = (0..8)
                .map(|x| c[u][x] * (f32::from(samples[r * 8 + x]) - 128.0))
                .sum();
        }
    }
    let mut out = [0.0f32; 64];
    for u in 0..8 {
        for v in 0..8 {
            out[v * 8 + u] = (0..8).map(|y| c[v][y] * rows[y * 8 + u]).sum();
        }
    }
    out
}

/// Inverse 2D DCT, undo the level shift, round and clamp to [0, 255].
pub fn inverse_dct(coeffs: &[f32; 64]) -> [u8; 64] {
    let c = basis();
    let mut cols = [0.0f32; 64];
    for u in 0..8 {
        for y in 0..8 {
            cols[y * 8 + u] = (0..8).map(|v| c[v][y] * coeffs[v * 8 + u]).sum();
        }
    }
    let mut out = [0u8; 64];
    for y in 0..8 {
        for x in 0..8 {
            let s: f32 = (0..8).map(|u| c[u][x] * cols[y * 8 + u]).sum();
            out[y * 8 + x] = (s + 128.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

pub fn quantize(coeffs: &[f32; 64], table: &QuantTable) -> [i16; 64] {
    let mut out = [0i16; 64];
    for i in 0..64 {
        out[i] = (coeffs[i] / f32::from(table.values[i])).round() as i16;
    }
    out
}

pub fn dequantize(quantized: &[i16; 64], table: &QuantTable) -> [f32; 64] {
    let mut out = [0.0f32; 64];
    for i in 0..64 {
        out[i] = f32::from(quantized[i]) * f32::from(table.values[i]);
    }
    out
}

/// Magnitude category and one's-complement bits of a coefficient.
fn encode_value(value: i32) -> (u8, u32) {
    if value == 0 {
        return (0, 0);
    }
    let size = (32 - value.unsigned_abs().leading_zeros()) as u8;
    let bits = if value > 0 { value } else { value - 1 };
    (size, (bits as u32) & ((1u32 << size) - 1))
}

/// Inverse of [`encode_value`].
fn extend_sign(bits: u32, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let half = 1i32 << (size - 1);
    if (bits as i32) < half {
        bits as i32 - (1i32 << size) + 1
    } else {
        bits as i32
    }
}

#[derive(Debug, Clone, Copy)]
enum Symbol {
    Dc { category: u8, bits: u32 },
    Ac { symbol: u8, bits: u32 },
}

fn block_symbols(block: &[i16; 64], prev_dc: &mut i32, out: &mut Vec<Symbol>) {
    let dc = i32::from(block[0]);
    let (category, bits) = encode_value(dc - *prev_dc);
    *prev_dc = dc;
    out.push(Symbol::Dc { category, bits });

    let mut run = 0u8;
    for &natural in &ZIGZAG_TO_NATURAL[1..] {
        let v = block[natural];
        if v == 0 {
            run += 1;
            continue;
        }
        while run > 15 {
            out.push(Symbol::Ac { symbol: ZRL, bits: 0 });
            run -= 16;
        }
        let (size, bits) = encode_value(i32::from(v));
        out.push(Symbol::Ac {
            symbol: (run << 4) | size,
            bits,
        });
        run = 0;
    }
    if run > 0 {
        out.push(Symbol::Ac { symbol: EOB, bits: 0 });
    }
}

/// Pad to whole blocks by replicating the last row/column and split into
/// blocks in raster order.
fn split_blocks(plane: &[u8], width: usize, height: usize) -> Vec<[u8; 64]> {
    let bw = width.div_ceil(BLOCK_SIZE);
    let bh = height.div_ceil(BLOCK_SIZE);
    let mut blocks = Vec::with_capacity(bw * bh);
    for by in 0..bh {
        for bx in 0..bw {
            let mut block = [0u8; 64];
            for y in 0..BLOCK_SIZE {
                let sy = (by * BLOCK_SIZE + y).min(height - 1);
                for x in 0..BLOCK_SIZE {
                    let sx = (bx * BLOCK_SIZE + x).min(width - 1);
                    block[y * BLOCK_SIZE + x] = plane[sy * width + sx];
                }
            }
            blocks.push(block);
        }
    }
    blocks
}

/// Reassemble blocks and crop back to `width` x `height`.
fn merge_blocks(blocks: &[[u8; 64]], width: usize, height: usize) -> Vec<u8> {
    let bw = width.div_ceil(BLOCK_SIZE);
    let mut plane = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let block = &blocks[(y / BLOCK_SIZE) * bw + x / BLOCK_SIZE];
            plane[y * width + x] = block[(y % BLOCK_SIZE) * BLOCK_SIZE + x % BLOCK_SIZE];
        }
    }
    plane
}

/// Transform, quantize and entropy code one `width` x `height` plane.
pub fn encode_plane(plane: &[u8], width: usize, height: usize, table: &QuantTable) -> Result<Vec<u8>> {
    debug_assert_eq!(plane.len(), width * height);
    let quantized: Vec<[i16; 64]> = split_blocks(plane, width, height)
        .par_iter()
        .map(|block| quantize(&forward_dct(block), table))
        .collect();

    let mut symbols = Vec::with_capacity(quantized.len() * 8);
    let mut prev_dc = 0i32;
    for block in &quantized {
        block_symbols(block, &mut prev_dc, &mut symbols);
    }

    let mut dc_freqs = vec![0u64; DC_SYMBOLS];
    let mut ac_freqs = vec![0u64; AC_SYMBOLS];
    for sym in &symbols {
        match *sym {
            Symbol::Dc { category, .. } => dc_freqs[category as usize] += 1,
            Symbol::Ac { symbol, .. } => ac_freqs[symbol as usize] += 1,
        }
    }
    let dc_tree = HuffmanTree::from_frequencies(&dc_freqs, MAX_CODE_LENGTH)?;
    let ac_tree = HuffmanTree::from_frequencies(&ac_freqs, MAX_CODE_LENGTH)?;

    let mut writer = BitWriter::new();
    let mut lengths = dc_tree.lengths().to_vec();
    lengths.extend_from_slice(ac_tree.lengths());
    write_code_lengths(&mut writer, &lengths)?;

    for sym in &symbols {
        match *sym {
            Symbol::Dc { category, bits } => {
                dc_tree.encode_symbol(&mut writer, u16::from(category))?;
                writer.write_bits(bits, u32::from(category))?;
            }
            Symbol::Ac { symbol, bits } => {
                ac_tree.encode_symbol(&mut writer, u16::from(symbol))?;
                writer.write_bits(bits, u32::from(symbol & 0x0F))?;
            }
        }
    }
    let out = writer.flush()?;
    trace!(width, height, blocks = quantized.len(), bytes = out.len(), "plane encoded");
    Ok(out)
}

/// Decode a plane written by [`encode_plane`] with the same geometry and table.
pub fn decode_plane(bytes: &[u8], width: usize, height: usize, table: &QuantTable) -> Result<Vec<u8>> {
    let block_count = width.div_ceil(BLOCK_SIZE) * height.div_ceil(BLOCK_SIZE);
    // Every block costs at least a DC and an AC code of one bit each.
    if block_count > bytes.len().saturating_mul(4) {
        return Err(CompressError::CorruptStream(format!(
            "{} bytes cannot hold {block_count} blocks",
            bytes.len()
        )));
    }
    let mut reader = BitReader::new(bytes);
    let lengths = read_code_lengths(&mut reader, DC_SYMBOLS + AC_SYMBOLS)?;
    let dc_tree = HuffmanTree::from_lengths(&lengths[..DC_SYMBOLS])?;
    let ac_tree = HuffmanTree::from_lengths(&lengths[DC_SYMBOLS..])?;

    let mut quantized = Vec::with_capacity(block_count);
    let mut prev_dc = 0i32;
    for _ in 0..block_count {
        let mut block = [0i16; 64];
        let category = dc_tree.decode_symbol(&mut reader)? as u8;
        prev_dc += extend_sign(reader.read_bits(u32::from(category))?, category);
        block[0] = clamp_coefficient(prev_dc)?;

        let mut k = 1usize;
        while k < 64 {
            let symbol = ac_tree.decode_symbol(&mut reader)? as u8;
            let run = usize::from(symbol >> 4);
            let size = symbol & 0x0F;
            if size == 0 {
                match symbol {
                    EOB => break,
                    ZRL => {
                        k += 16;
                        if k > 63 {
                            return Err(CompressError::CorruptStream("zero run past end of block".into()));
                        }
                        continue;
                    }
                    _ => return Err(CompressError::CorruptStream(format!("invalid AC symbol {symbol:#04x}"))),
                }
            }
            k += run;
            if k > 63 {
                return Err(CompressError::CorruptStream("coefficient index past end of block".into()));
            }
            let value = extend_sign(reader.read_bits(u32::from(size))?, size);
            block[ZIGZAG_TO_NATURAL[k]] = clamp_coefficient(value)?;
            k += 1;
        }
        quantized.push(block);
    }
    if reader.bits_remaining() >= 8 {
        return Err(CompressError::CorruptStream("trailing bytes after plane".into()));
    }

    let blocks: Vec<[u8; 64]> = quantized
        .par_iter()
        .map(|q| inverse_dct(&dequantize(q, table)))
        .collect();
    Ok(merge_blocks(&blocks, width, height))
}

fn clamp_coefficient(value: i32) -> Result<i16> {
    i16::try_from(value).map_err(|_| CompressError::CorruptStream(format!("coefficient {value} out of range")))
}

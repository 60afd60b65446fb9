//! Lossless Deflate-family codec: LZ77 tokens entropy coded with two canonical
//! Huffman trees (literal/length and distance).
//!
//! Stream layout:
//! - header (bincode): magic `IPDF`, version, window size, level, original
//!   length, Adler-32 of the original bytes
//! - block mode byte: 0 = stored, 1 = Huffman
//! - stored: the raw bytes; Huffman: a bitstream with HLIT/HDIST counts, one
//!   tree descriptor covering both alphabets, then the coded tokens and an
//!   end-of-block symbol.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CompressError, Result};
use crate::huffman::{read_code_lengths, write_code_lengths, HuffmanTree, MAX_CODE_LENGTH};
use crate::lz77::{copy_match, Matcher, Token, MAX_LEVEL, MAX_WINDOW_SIZE};

pub const MAGIC: [u8; 4] = *b"IPDF";
pub const VERSION: u8 = 1;
/// Serialized size of [`DeflateHeader`].
pub const HEADER_LEN: usize = 22;

const BLOCK_STORED: u8 = 0;
const BLOCK_HUFFMAN: u8 = 1;

const END_OF_BLOCK: u16 = 256;
const LITLEN_SYMBOLS: usize = 286;
const DIST_SYMBOLS: usize = 30;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131, 163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537, 2049, 3073, 4097, 6145,
    8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateOptions {
    pub window_size: usize,
    pub level: u8,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        Self {
            window_size: MAX_WINDOW_SIZE,
            level: MAX_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeflateHeader {
    magic: [u8; 4],
    version: u8,
    window_size: u32,
    level: u8,
    original_len: u64,
    checksum: u32,
}

/// Compress with the default window (32 KiB) and level 9.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &DeflateOptions::default())
}

pub fn compress_with(data: &[u8], options: &DeflateOptions) -> Result<Vec<u8>> {
    let matcher = Matcher::new(options.window_size, options.level)?;
    let header = DeflateHeader {
        magic: MAGIC,
        version: VERSION,
        window_size: options.window_size as u32,
        level: options.level,
        original_len: data.len() as u64,
        checksum: simd_adler32::adler32(&data),
    };
    let mut out = bincode::serialize(&header).map_err(|e| CompressError::SerializationError(e.to_string()))?;
    debug_assert_eq!(out.len(), HEADER_LEN);

    let body = if options.level == 0 || data.is_empty() {
        None
    } else {
        let tokens = matcher.tokenize(data);
        trace!(tokens = tokens.len(), "lz77 tokenized");
        Some(encode_block(&tokens)?)
    };

    // Fall back to a stored block whenever entropy coding does not pay off.
    let mode = match body {
        Some(bits) if bits.len() < data.len() => {
            out.push(BLOCK_HUFFMAN);
            out.extend_from_slice(&bits);
            BLOCK_HUFFMAN
        }
        _ => {
            out.push(BLOCK_STORED);
            out.extend_from_slice(data);
            BLOCK_STORED
        }
    };

    debug!(
        original = data.len(),
        compressed = out.len(),
        mode,
        level = options.level,
        window = options.window_size,
        "deflate compress"
    );
    Ok(out)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut rest = data;
    let header: DeflateHeader = bincode::deserialize_from(&mut rest)
        .map_err(|e| CompressError::CorruptStream(format!("deflate header: {e}")))?;
    if header.magic != MAGIC {
        return Err(CompressError::CorruptStream("not a deflate stream".into()));
    }
    if header.version != VERSION {
        return Err(CompressError::CorruptStream(format!(
            "unsupported deflate version {}",
            header.version
        )));
    }
    let window = header.window_size as usize;
    if window == 0 || window > MAX_WINDOW_SIZE || header.level > MAX_LEVEL {
        return Err(CompressError::CorruptStream("invalid deflate parameters".into()));
    }
    let expected = usize::try_from(header.original_len)
        .map_err(|_| CompressError::CorruptStream("original length too large".into()))?;

    let (&mode, payload) = rest
        .split_first()
        .ok_or_else(|| CompressError::CorruptStream("missing block mode".into()))?;
    let out = match mode {
        BLOCK_STORED => payload.to_vec(),
        BLOCK_HUFFMAN => decode_block(payload, window, expected).map_err(|e| e.into_corrupt("deflate block"))?,
        other => return Err(CompressError::CorruptStream(format!("unknown block mode {other}"))),
    };

    if out.len() != expected {
        return Err(CompressError::CorruptStream(format!(
            "decoded {} bytes, header says {expected}",
            out.len()
        )));
    }
    let checksum = simd_adler32::adler32(&out.as_slice());
    if checksum != header.checksum {
        return Err(CompressError::CorruptStream(format!(
            "checksum {checksum:#010x} does not match {:#010x}",
            header.checksum
        )));
    }
    debug!(compressed = data.len(), original = out.len(), mode, "deflate decompress");
    Ok(out)
}

/// (symbol index, extra bit count, extra value) for a match length.
fn length_code(length: u16) -> (usize, u8, u16) {
    let i = LENGTH_BASE.iter().rposition(|&b| b <= length).unwrap_or(0);
    (i, LENGTH_EXTRA[i], length - LENGTH_BASE[i])
}

fn distance_code(distance: u16) -> (usize, u8, u16) {
    let i = DIST_BASE.iter().rposition(|&b| b <= distance).unwrap_or(0);
    (i, DIST_EXTRA[i], distance - DIST_BASE[i])
}

fn encode_block(tokens: &[Token]) -> Result<Vec<u8>> {
    let mut lit_freqs = vec![0u64; LITLEN_SYMBOLS];
    let mut dist_freqs = vec![0u64; DIST_SYMBOLS];
    for &token in tokens {
        match token {
            Token::Literal(b) => lit_freqs[b as usize] += 1,
            Token::Match { distance, length } => {
                lit_freqs[257 + length_code(length).0] += 1;
                dist_freqs[distance_code(distance).0] += 1;
            }
        }
    }
    lit_freqs[END_OF_BLOCK as usize] += 1;

    let lit_tree = HuffmanTree::from_frequencies(&lit_freqs, MAX_CODE_LENGTH)?;
    let dist_tree = HuffmanTree::from_frequencies(&dist_freqs, MAX_CODE_LENGTH)?;

    let hlit = lit_tree.lengths().iter().rposition(|&l| l > 0).map_or(257, |p| (p + 1).max(257));
    let hdist = dist_tree.lengths().iter().rposition(|&l| l > 0).map_or(1, |p| p + 1);

    let mut writer = BitWriter::new();
    writer.write_bits((hlit - 257) as u32, 5)?;
    writer.write_bits((hdist - 1) as u32, 5)?;
    let mut lengths = lit_tree.lengths()[..hlit].to_vec();
    lengths.extend_from_slice(&dist_tree.lengths()[..hdist]);
    write_code_lengths(&mut writer, &lengths)?;

    for &token in tokens {
        match token {
            Token::Literal(b) => lit_tree.encode_symbol(&mut writer, u16::from(b))?,
            Token::Match { distance, length } => {
                let (li, lbits, lextra) = length_code(length);
                lit_tree.encode_symbol(&mut writer, 257 + li as u16)?;
                writer.write_bits(u32::from(lextra), u32::from(lbits))?;
                let (di, dbits, dextra) = distance_code(distance);
                dist_tree.encode_symbol(&mut writer, di as u16)?;
                writer.write_bits(u32::from(dextra), u32::from(dbits))?;
            }
        }
    }
    lit_tree.encode_symbol(&mut writer, END_OF_BLOCK)?;
    writer.flush()
}

fn decode_block(payload: &[u8], window: usize, expected: usize) -> Result<Vec<u8>> {
    let mut reader = BitReader::new(payload);
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    if hlit > LITLEN_SYMBOLS || hdist > DIST_SYMBOLS {
        return Err(CompressError::CorruptStream(format!("bad alphabet sizes {hlit}/{hdist}")));
    }
    let lengths = read_code_lengths(&mut reader, hlit + hdist)?;
    let lit_tree = HuffmanTree::from_lengths(&lengths[..hlit])?;
    let dist_tree = HuffmanTree::from_lengths(&lengths[hlit..])?;

    let mut out = Vec::with_capacity(expected.min(payload.len().saturating_mul(4)));
    loop {
        match lit_tree.decode_symbol(&mut reader)? {
            sym @ 0..=255 => out.push(sym as u8),
            END_OF_BLOCK => break,
            sym @ 257..=285 => {
                let i = (sym - 257) as usize;
                let length = LENGTH_BASE[i] as usize + reader.read_bits(u32::from(LENGTH_EXTRA[i]))? as usize;
                let d = dist_tree.decode_symbol(&mut reader)? as usize;
                if d >= DIST_SYMBOLS {
                    return Err(CompressError::CorruptStream(format!("distance symbol {d}")));
                }
                let distance = DIST_BASE[d] as usize + reader.read_bits(u32::from(DIST_EXTRA[d]))? as usize;
                if distance > window {
                    return Err(CompressError::CorruptStream(format!(
                        "distance {distance} exceeds window {window}"
                    )));
                }
                copy_match(&mut out, distance, length)?;
            }
            sym => return Err(CompressError::CorruptStream(format!("literal/length symbol {sym}"))),
        }
        if out.len() > expected {
            return Err(CompressError::CorruptStream("output longer than header length".into()));
        }
    }

    if reader.bits_remaining() >= 8 {
        return Err(CompressError::CorruptStream("trailing bytes after end of block".into()));
    }
    Ok(out)
}

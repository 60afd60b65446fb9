//! Canonical Huffman coding
//!
//! Code lengths come from the classic greedy merge of the two lightest nodes.
//! Codes are then assigned canonically in (length, symbol) order, so a decoder
//! can rebuild the exact table from the lengths alone. The same module carries
//! the tree descriptor format both codecs use to ship their code lengths.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::bitio::{BitReader, BitWriter};
use crate::error::{CompressError, Result};

/// Longest code either codec's alphabets may use.
pub const MAX_CODE_LENGTH: u8 = 15;

/// Longest code for the code-length alphabet inside a tree descriptor.
const CL_MAX_LENGTH: u8 = 7;

/// Order in which code-length code lengths are transmitted; rarely used
/// lengths come last so trailing zeros can be dropped.
const CL_ORDER: [usize; 19] = [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

/// Canonical Huffman code table for an alphabet of `lengths.len()` symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTree {
    lengths: Vec<u8>,
    codes: Vec<u16>,
    /// counts[l] = number of codes of length l (index 0 unused).
    counts: [u16; MAX_CODE_LENGTH as usize + 1],
    /// Used symbols sorted by (length, symbol).
    sorted: Vec<u16>,
    max_len: u8,
}

impl HuffmanTree {
    /// Build a tree from per-symbol counts, limiting code lengths to `max_len`.
    ///
    /// Symbols with a zero count get no code. When the merge produces a code
    /// longer than `max_len`, counts are halved (staying non-zero) and the
    /// merge is redone.
    pub fn from_frequencies(freqs: &[u64], max_len: u8) -> Result<Self> {
        debug_assert!(max_len >= 1 && max_len <= MAX_CODE_LENGTH);
        let mut scaled = freqs.to_vec();
        loop {
            let lengths = merge_code_lengths(&scaled);
            if lengths.iter().all(|&l| l <= max_len) {
                return Self::canonical(lengths);
            }
            for f in scaled.iter_mut().filter(|f| **f > 0) {
                *f = (*f >> 1).max(1);
            }
        }
    }

    /// Rebuild a tree from transmitted code lengths.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        Self::canonical(lengths.to_vec())
    }

    fn canonical(lengths: Vec<u8>) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH as usize + 1];
        for &len in &lengths {
            if len > MAX_CODE_LENGTH {
                return Err(CompressError::CorruptStream(format!("code length {len} too long")));
            }
            if len > 0 {
                counts[len as usize] += 1;
            }
        }

        // Kraft inequality: an over-subscribed set of lengths is not a prefix code.
        let mut left: i64 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - i64::from(count);
            if left < 0 {
                return Err(CompressError::CorruptStream("over-subscribed code lengths".into()));
            }
        }

        let mut next_code = [0u16; MAX_CODE_LENGTH as usize + 2];
        let mut code = 0u16;
        for len in 1..=MAX_CODE_LENGTH as usize {
            code = (code + counts[len - 1]) << 1;
            next_code[len] = code;
        }

        let mut codes = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len > 0 {
                codes[sym] = next_code[len as usize];
                next_code[len as usize] += 1;
            }
        }

        let mut sorted: Vec<u16> = (0..lengths.len() as u16)
            .filter(|&s| lengths[s as usize] > 0)
            .collect();
        sorted.sort_by_key(|&s| (lengths[s as usize], s));

        let max_len = lengths.iter().copied().max().unwrap_or(0);

        Ok(Self {
            lengths,
            codes,
            counts,
            sorted,
            max_len,
        })
    }

    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    /// `(code, length)` for a symbol, or `None` if it has no code.
    pub fn code(&self, symbol: u16) -> Option<(u16, u8)> {
        match self.lengths.get(symbol as usize) {
            Some(&len) if len > 0 => Some((self.codes[symbol as usize], len)),
            _ => None,
        }
    }

    pub fn encode_symbol(&self, writer: &mut BitWriter, symbol: u16) -> Result<()> {
        let (code, len) = self
            .code(symbol)
            .ok_or_else(|| CompressError::InvalidParameter(format!("symbol {symbol} has no code")))?;
        writer.write_bits(u32::from(code), u32::from(len))
    }

    /// Decode one symbol, reading a bit at a time until a code of the current
    /// length matches.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u16> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=self.max_len as usize {
            code |= i32::from(reader.read_bit()?);
            let count = i32::from(self.counts[len]);
            if code - first < count {
                return Ok(self.sorted[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(CompressError::InvalidCode)
    }
}

/// Code lengths by greedy merging. Ties go to the node holding the lowest symbol.
fn merge_code_lengths(freqs: &[u64]) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let used: Vec<usize> = (0..freqs.len()).filter(|&s| freqs[s] > 0).collect();
    match used.len() {
        0 => return lengths,
        1 => {
            lengths[used[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    const ROOT: usize = usize::MAX;
    let mut parent = vec![ROOT; used.len()];
    let mut heap = BinaryHeap::with_capacity(used.len());
    for (leaf, &sym) in used.iter().enumerate() {
        heap.push(Reverse((freqs[sym], sym, leaf)));
    }
    while let (Some(Reverse((w1, s1, a))), Some(Reverse((w2, s2, b)))) = (heap.pop(), heap.pop()) {
        let node = parent.len();
        parent.push(ROOT);
        parent[a] = node;
        parent[b] = node;
        heap.push(Reverse((w1 + w2, s1.min(s2), node)));
    }

    for (leaf, &sym) in used.iter().enumerate() {
        let mut depth = 0usize;
        let mut n = leaf;
        while parent[n] != ROOT {
            n = parent[n];
            depth += 1;
        }
        lengths[sym] = u8::try_from(depth).unwrap_or(u8::MAX);
    }
    lengths
}

/// Encode a whole symbol stream.
pub fn encode(symbols: &[u16], tree: &HuffmanTree) -> Result<Vec<u8>> {
    let mut writer = BitWriter::new();
    for &sym in symbols {
        tree.encode_symbol(&mut writer, sym)?;
    }
    writer.flush()
}

/// Decode `count` symbols from a stream produced by [`encode`].
pub fn decode(bytes: &[u8], tree: &HuffmanTree, count: usize) -> Result<Vec<u16>> {
    let mut reader = BitReader::new(bytes);
    (0..count).map(|_| tree.decode_symbol(&mut reader)).collect()
}

/// Run-length form of a code length list: (code-length symbol, extra value).
fn rle_code_lengths(lengths: &[u8]) -> Vec<(u8, u8)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < lengths.len() {
        let len = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == len {
            run += 1;
        }

        let mut left = run;
        if len == 0 {
            while left >= 11 {
                let r = left.min(138);
                out.push((18, (r - 11) as u8));
                left -= r;
            }
            if left >= 3 {
                out.push((17, (left - 3) as u8));
                left = 0;
            }
        } else {
            out.push((len, 0));
            left -= 1;
            while left >= 3 {
                let r = left.min(6);
                out.push((16, (r - 3) as u8));
                left -= r;
            }
        }
        out.extend(std::iter::repeat((len, 0)).take(left));
        i += run;
    }
    out
}

fn extra_bits(cl_symbol: u8) -> u32 {
    match cl_symbol {
        16 => 2,
        17 => 3,
        18 => 7,
        _ => 0,
    }
}

/// Write a tree descriptor for `lengths`. The reader must know the count.
pub fn write_code_lengths(writer: &mut BitWriter, lengths: &[u8]) -> Result<()> {
    let rle = rle_code_lengths(lengths);
    let mut freqs = [0u64; 19];
    for &(sym, _) in &rle {
        freqs[sym as usize] += 1;
    }
    let cl_tree = HuffmanTree::from_frequencies(&freqs, CL_MAX_LENGTH)?;

    let hclen = CL_ORDER
        .iter()
        .rposition(|&s| cl_tree.lengths()[s] > 0)
        .map_or(4, |p| (p + 1).max(4));
    writer.write_bits((hclen - 4) as u32, 4)?;
    for &s in &CL_ORDER[..hclen] {
        writer.write_bits(u32::from(cl_tree.lengths()[s]), 3)?;
    }

    for &(sym, extra) in &rle {
        cl_tree.encode_symbol(writer, u16::from(sym))?;
        writer.write_bits(u32::from(extra), extra_bits(sym))?;
    }
    Ok(())
}

/// Read a tree descriptor written by [`write_code_lengths`].
pub fn read_code_lengths(reader: &mut BitReader, count: usize) -> Result<Vec<u8>> {
    let hclen = reader.read_bits(4)? as usize + 4;
    let mut cl_lengths = [0u8; 19];
    for &s in &CL_ORDER[..hclen] {
        cl_lengths[s] = reader.read_bits(3)? as u8;
    }
    let cl_tree = HuffmanTree::from_lengths(&cl_lengths)?;

    let mut lengths = Vec::with_capacity(count);
    while lengths.len() < count {
        let sym = cl_tree.decode_symbol(reader)?;
        let (value, repeat) = match sym {
            0..=15 => (sym as u8, 1),
            16 => {
                let prev = *lengths
                    .last()
                    .ok_or_else(|| CompressError::CorruptStream("repeat with no previous length".into()))?;
                (prev, 3 + reader.read_bits(2)? as usize)
            }
            17 => (0, 3 + reader.read_bits(3)? as usize),
            18 => (0, 11 + reader.read_bits(7)? as usize),
            _ => return Err(CompressError::InvalidCode),
        };
        if lengths.len() + repeat > count {
            return Err(CompressError::CorruptStream("code length run overflows alphabet".into()));
        }
        lengths.extend(std::iter::repeat(value).take(repeat));
    }
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_freqs(data: &[u8]) -> Vec<u64> {
        let mut freqs = vec![0u64; 256];
        for &b in data {
            freqs[b as usize] += 1;
        }
        freqs
    }

    #[test]
    fn test_huffman_roundtrip() {
        let data = b"hello world hello world hello";
        let tree = HuffmanTree::from_frequencies(&byte_freqs(data), MAX_CODE_LENGTH).unwrap();
        let symbols: Vec<u16> = data.iter().map(|&b| u16::from(b)).collect();
        let encoded = encode(&symbols, &tree).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(decode(&encoded, &tree, symbols.len()).unwrap(), symbols);
    }

    #[test]
    fn test_huffman_single_symbol() {
        let tree = HuffmanTree::from_frequencies(&byte_freqs(b"aaaaaa"), MAX_CODE_LENGTH).unwrap();
        assert_eq!(tree.code(u16::from(b'a')), Some((0, 1)));
        let symbols = vec![u16::from(b'a'); 6];
        let encoded = encode(&symbols, &tree).unwrap();
        assert_eq!(encoded, vec![0]);
        assert_eq!(decode(&encoded, &tree, 6).unwrap(), symbols);
    }

    #[test]
    fn test_canonical_order() {
        // a:5 b:2 c:1 d:1 → lengths a=1 b=2 c=3 d=3
        let tree = HuffmanTree::from_frequencies(&[5, 2, 1, 1], MAX_CODE_LENGTH).unwrap();
        assert_eq!(tree.lengths(), &[1, 2, 3, 3]);
        assert_eq!(tree.code(0), Some((0b0, 1)));
        assert_eq!(tree.code(1), Some((0b10, 2)));
        assert_eq!(tree.code(2), Some((0b110, 3)));
        assert_eq!(tree.code(3), Some((0b111, 3)));
    }

    #[test]
    fn test_ties_are_deterministic() {
        let a = HuffmanTree::from_frequencies(&[1, 1, 1, 1, 1], MAX_CODE_LENGTH).unwrap();
        let b = HuffmanTree::from_frequencies(&[1, 1, 1, 1, 1], MAX_CODE_LENGTH).unwrap();
        assert_eq!(a, b);
        // Lowest symbols merge first and sink deepest.
        assert_eq!(a.lengths(), &[3, 3, 2, 2, 2]);
    }

    #[test]
    fn test_rebuild_from_lengths() {
        let freqs: Vec<u64> = (1..=40).map(|i| i * i).collect();
        let tree = HuffmanTree::from_frequencies(&freqs, MAX_CODE_LENGTH).unwrap();
        let rebuilt = HuffmanTree::from_lengths(tree.lengths()).unwrap();
        assert_eq!(tree, rebuilt);
    }

    #[test]
    fn test_prefix_free() {
        let freqs: Vec<u64> = (0..30).map(|i| 1 + (i % 7) * 13).collect();
        let tree = HuffmanTree::from_frequencies(&freqs, MAX_CODE_LENGTH).unwrap();
        let codes: Vec<(u16, u8)> = (0..30).filter_map(|s| tree.code(s)).collect();
        for (i, &(ca, la)) in codes.iter().enumerate() {
            for &(cb, lb) in &codes[i + 1..] {
                let l = la.min(lb);
                assert_ne!(ca >> (la - l), cb >> (lb - l), "codes share a prefix");
            }
        }
    }

    #[test]
    fn test_length_limit() {
        // Fibonacci weights force a maximally skewed tree.
        let mut freqs = vec![1u64, 1];
        while freqs.len() < 30 {
            let n = freqs.len();
            freqs.push(freqs[n - 1] + freqs[n - 2]);
        }
        let tree = HuffmanTree::from_frequencies(&freqs, MAX_CODE_LENGTH).unwrap();
        assert!(tree.lengths().iter().all(|&l| (1..=MAX_CODE_LENGTH).contains(&l)));
        let symbols: Vec<u16> = (0..30).collect();
        let encoded = encode(&symbols, &tree).unwrap();
        assert_eq!(decode(&encoded, &tree, 30).unwrap(), symbols);
    }

    #[test]
    fn test_oversubscribed_rejected() {
        assert!(matches!(
            HuffmanTree::from_lengths(&[1, 1, 1]),
            Err(CompressError::CorruptStream(_))
        ));
        assert!(matches!(
            HuffmanTree::from_lengths(&[16, 1]),
            Err(CompressError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_invalid_code() {
        // Only code "0" exists; a "1" bit matches nothing.
        let tree = HuffmanTree::from_lengths(&[1]).unwrap();
        let mut reader = BitReader::new(&[0x80]);
        assert!(matches!(tree.decode_symbol(&mut reader), Err(CompressError::InvalidCode)));
    }

    #[test]
    fn test_decode_out_of_data() {
        let tree = HuffmanTree::from_lengths(&[2, 2, 2, 2]).unwrap();
        assert!(matches!(decode(&[0x00], &tree, 5), Err(CompressError::OutOfData)));
    }

    #[test]
    fn test_code_length_descriptor_roundtrip() {
        let mut lengths = vec![0u8; 300];
        for (i, len) in lengths.iter_mut().enumerate().take(144) {
            *len = 8 + (i % 2) as u8;
        }
        lengths[256] = 7;
        lengths[280..290].fill(5);

        let mut writer = BitWriter::new();
        write_code_lengths(&mut writer, &lengths).unwrap();
        writer.write_bits(0b101, 3).unwrap();
        let bytes = writer.flush().unwrap();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(read_code_lengths(&mut reader, lengths.len()).unwrap(), lengths);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
    }

    #[test]
    fn test_code_length_descriptor_all_zero() {
        let lengths = vec![0u8; 19];
        let mut writer = BitWriter::new();
        write_code_lengths(&mut writer, &lengths).unwrap();
        let bytes = writer.flush().unwrap();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(read_code_lengths(&mut reader, 19).unwrap(), lengths);
    }

    #[test]
    fn test_rle_uses_repeat_symbols() {
        let rle = rle_code_lengths(&[4, 4, 4, 4, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(rle, vec![(4, 0), (16, 1), (18, 1)]);
    }
}

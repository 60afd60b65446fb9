//! LZ77 matcher with hash chains over 3-byte prefixes.

use crate::error::{CompressError, Result};

pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = 258;
pub const MAX_WINDOW_SIZE: usize = 32768;
pub const MAX_LEVEL: u8 = 9;

const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NIL: usize = usize::MAX;

/// One unit of LZ77 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    /// Copy `length` bytes starting `distance` bytes back in the output.
    Match { distance: u16, length: u16 },
}

/// Chain depth for a compression level. `None` searches every candidate.
fn max_chain(level: u8) -> Option<usize> {
    match level {
        0 => Some(0),
        1 => Some(4),
        2 => Some(8),
        3 => Some(16),
        4 => Some(32),
        5 => Some(64),
        6 => Some(128),
        7 => Some(256),
        8 => Some(1024),
        _ => None,
    }
}

#[inline]
fn hash3(data: &[u8], pos: usize) -> usize {
    let h = u32::from(data[pos]) | (u32::from(data[pos + 1]) << 8) | (u32::from(data[pos + 2]) << 16);
    (h.wrapping_mul(2_654_435_769) >> (32 - HASH_BITS)) as usize
}

/// Greedy longest-match tokenizer.
///
/// Candidates are visited newest first and only a strictly longer match
/// replaces the current best, so equal lengths resolve to the nearest distance.
pub struct Matcher {
    window_size: usize,
    max_chain: Option<usize>,
}

impl Matcher {
    pub fn new(window_size: usize, level: u8) -> Result<Self> {
        if window_size == 0 || window_size > MAX_WINDOW_SIZE {
            return Err(CompressError::InvalidParameter(format!(
                "window size {window_size} outside 1..={MAX_WINDOW_SIZE}"
            )));
        }
        if level > MAX_LEVEL {
            return Err(CompressError::InvalidParameter(format!(
                "level {level} outside 0..={MAX_LEVEL}"
            )));
        }
        Ok(Self {
            window_size,
            max_chain: max_chain(level),
        })
    }

    pub fn tokenize(&self, data: &[u8]) -> Vec<Token> {
        let mut tokens = Vec::with_capacity(data.len() / 2);
        let mut head = vec![NIL; HASH_SIZE];
        let mut prev = vec![NIL; data.len()];

        let insert = |pos: usize, head: &mut [usize], prev: &mut [usize]| {
            if pos + MIN_MATCH <= data.len() {
                let h = hash3(data, pos);
                prev[pos] = head[h];
                head[h] = pos;
            }
        };

        let mut pos = 0;
        while pos < data.len() {
            match self.longest_match(data, pos, &head, &prev) {
                Some((distance, length)) => {
                    tokens.push(Token::Match {
                        distance: distance as u16,
                        length: length as u16,
                    });
                    for p in pos..pos + length {
                        insert(p, &mut head, &mut prev);
                    }
                    pos += length;
                }
                None => {
                    tokens.push(Token::Literal(data[pos]));
                    insert(pos, &mut head, &mut prev);
                    pos += 1;
                }
            }
        }
        tokens
    }

    fn longest_match(&self, data: &[u8], pos: usize, head: &[usize], prev: &[usize]) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > data.len() || self.max_chain == Some(0) {
            return None;
        }
        let max_len = (data.len() - pos).min(MAX_MATCH);
        let mut best = (0usize, MIN_MATCH - 1);
        let mut candidate = head[hash3(data, pos)];
        let mut visited = 0usize;

        while candidate != NIL {
            let distance = pos - candidate;
            if distance > self.window_size {
                break;
            }
            if self.max_chain.is_some_and(|limit| visited >= limit) {
                break;
            }
            visited += 1;

            let length = data[candidate..]
                .iter()
                .zip(&data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            if length > best.1 {
                best = (distance, length);
                if length == max_len {
                    break;
                }
            }
            candidate = prev[candidate];
        }

        (best.1 >= MIN_MATCH).then_some(best)
    }
}

/// Replay tokens into the bytes they describe. Overlapping copies repeat the
/// most recent output, so `distance < length` is valid.
pub fn expand(tokens: &[Token]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for &token in tokens {
        match token {
            Token::Literal(b) => out.push(b),
            Token::Match { distance, length } => copy_match(&mut out, distance as usize, length as usize)?,
        }
    }
    Ok(out)
}

pub(crate) fn copy_match(out: &mut Vec<u8>, distance: usize, length: usize) -> Result<()> {
    if distance == 0 || distance > out.len() {
        return Err(CompressError::CorruptStream(format!(
            "distance {distance} reaches before start of output ({} bytes)",
            out.len()
        )));
    }
    let start = out.len() - distance;
    out.reserve(length);
    for i in 0..length {
        let b = out[start + i];
        out.push(b);
    }
    Ok(())
}

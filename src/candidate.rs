//! Password candidate spaces: user wordlists and fixed-length brute-force enumeration.
//!
//! Both modes are random-access over `0..len()`, which is what lets the crack
//! engine hand each worker a contiguous index range without any coordination.

use std::ops::Range;

use crate::error::{EngineError, Result};

/// Smallest shard handed to a worker.
pub const MIN_SHARD: u64 = 1000;

/// Symbols appended to the default alphabet, in enumeration order.
pub const SYMBOLS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+', '-', '=', '[', ']', '{', '}', '|',
    ';', ':', ',', '.', '<', '>', '?', '/', '`', '~',
];

/// An ordered set of symbols used for brute-force enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    symbols: Vec<char>,
}

impl Charset {
    /// Builds a charset from user input, keeping the first occurrence of each symbol.
    ///
    /// Blank input selects [`Charset::default`].
    pub fn new(input: &str) -> Self {
        if input.trim().is_empty() {
            return Self::default();
        }

        let mut symbols: Vec<char> = Vec::with_capacity(input.len());
        for ch in input.chars() {
            if !symbols.contains(&ch) {
                symbols.push(ch);
            }
        }
        Self { symbols }
    }

    /// Symbols in enumeration order.
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// True when no symbol is available.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for Charset {
    /// Lowercase letters, uppercase letters, digits, then punctuation.
    fn default() -> Self {
        let symbols = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(SYMBOLS.iter().copied())
            .collect();
        Self { symbols }
    }
}

/// The full, finite sequence of candidates a crack job will try.
#[derive(Debug, Clone)]
pub enum CandidateSpace {
    Dictionary(Vec<String>),
    BruteForce {
        charset: Charset,
        length: usize,
        total: u64,
    },
}

impl CandidateSpace {
    /// Wordlist mode: entries are trimmed, blank entries dropped, duplicates and order kept.
    pub fn dictionary<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = lines
            .into_iter()
            .filter_map(|line| {
                let word = line.as_ref().trim();
                (!word.is_empty()).then(|| word.to_string())
            })
            .collect();
        CandidateSpace::Dictionary(words)
    }

    /// Every `length`-symbol string over `charset`, in lexicographic charset order.
    pub fn brute_force(charset: Charset, length: usize) -> Result<Self> {
        if length == 0 {
            return Err(EngineError::InvalidInput(
                "password length must be at least 1".to_string(),
            ));
        }
        if charset.is_empty() {
            return Err(EngineError::InvalidInput("charset is empty".to_string()));
        }

        let total = u32::try_from(length)
            .ok()
            .and_then(|exp| (charset.len() as u64).checked_pow(exp))
            .ok_or_else(|| {
                EngineError::ResourceExceeded(format!(
                    "search space of {} symbols at length {} is too large",
                    charset.len(),
                    length
                ))
            })?;

        Ok(CandidateSpace::BruteForce {
            charset,
            length,
            total,
        })
    }

    /// Number of candidates in the space.
    pub fn len(&self) -> u64 {
        match self {
            CandidateSpace::Dictionary(words) => words.len() as u64,
            CandidateSpace::BruteForce { total, .. } => *total,
        }
    }

    /// True when there is nothing to try.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short label used in logs and user-facing messages.
    pub fn mode(&self) -> &'static str {
        match self {
            CandidateSpace::Dictionary(_) => "dictionary",
            CandidateSpace::BruteForce { .. } => "brute",
        }
    }

    /// Writes the candidate at `index` into `buffer`, replacing its contents.
    ///
    /// `index` must be below [`CandidateSpace::len`].
    pub fn candidate_at(&self, index: u64, buffer: &mut String) {
        match self {
            CandidateSpace::Dictionary(words) => {
                buffer.clear();
                buffer.push_str(&words[index as usize]);
            }
            CandidateSpace::BruteForce {
                charset, length, ..
            } => index_to_password_with_buffer(index, *length, charset.symbols(), buffer),
        }
    }

    /// Lazily yields every candidate in order.
    pub fn iter(&self) -> Candidates<'_> {
        self.iter_range(0..self.len())
    }

    /// Lazily yields the candidates in `range`, clamped to the space.
    pub fn iter_range(&self, range: Range<u64>) -> Candidates<'_> {
        let end = range.end.min(self.len());
        Candidates {
            space: self,
            next: range.start.min(end),
            end,
        }
    }

    /// Splits `0..len()` into contiguous, ordered, non-overlapping shards.
    pub fn shards(&self, workers: usize) -> Vec<Range<u64>> {
        let total = self.len();
        if total == 0 {
            return Vec::new();
        }

        // Enough shards per worker to keep the pool busy when one shard finishes early.
        let workers = workers.max(1) as u64;
        let chunk_size = std::cmp::max(MIN_SHARD, total / (workers * 4));
        let num_chunks = total.div_ceil(chunk_size);

        (0..num_chunks)
            .map(|chunk_idx| {
                let start = chunk_idx * chunk_size;
                start..std::cmp::min(start + chunk_size, total)
            })
            .collect()
    }
}

/// Iterator over a range of a [`CandidateSpace`].
pub struct Candidates<'a> {
    space: &'a CandidateSpace,
    next: u64,
    end: u64,
}

impl Iterator for Candidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next >= self.end {
            return None;
        }
        let mut buffer = String::new();
        self.space.candidate_at(self.next, &mut buffer);
        self.next += 1;
        Some(buffer)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Translate a numeric index into a password string using the selected charset.
fn index_to_password_with_buffer(
    mut index: u64,
    target_len: usize,
    charset: &[char],
    buffer: &mut String,
) {
    buffer.clear();
    if target_len == 0 {
        return;
    }

    buffer.reserve(target_len);
    let base = charset.len() as u64;
    let mut chars_reversed = Vec::with_capacity(target_len);

    for _ in 0..target_len {
        let char_index = (index % base) as usize;
        chars_reversed.push(charset[char_index]);
        index /= base;
    }

    for &ch in chars_reversed.iter().rev() {
        buffer.push(ch);
    }
}

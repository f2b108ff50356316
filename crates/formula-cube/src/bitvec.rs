/// Fixed-size bit vector used for selectors, shadows and bit-set filters.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// Bits past the end of the last word are always kept clear so word-level operations
/// (`intersects`, `count_ones`) never see garbage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_len_all_true(bits: usize) -> Self {
        if bits == 0 {
            return Self::new();
        }

        let mut words = vec![u64::MAX; word_len(bits)];
        let rem = bits % 64;
        if rem != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << rem) - 1;
            }
        }

        Self {
            words,
            len: bits,
            ones: bits,
        }
    }

    pub fn with_len_all_false(bits: usize) -> Self {
        Self {
            words: vec![0u64; word_len(bits)],
            len: bits,
            ones: 0,
        }
    }

    /// Build a vector of `bits` length with the given positions set. Positions past the end are
    /// ignored.
    pub fn from_indices(bits: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut out = Self::with_len_all_false(bits);
        for idx in indices {
            if idx < bits {
                out.set(idx, true);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }

        if value {
            let word = self.len / 64;
            self.words[word] |= 1u64 << bit;
            self.ones += 1;
        }

        self.len += 1;
    }

    /// Returns the bit at `index`; positions past the end read as `false`.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let word = self.words[index / 64];
        ((word >> (index % 64)) & 1) == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        if index >= self.len {
            return;
        }
        let word_idx = index / 64;
        let mask = 1u64 << (index % 64);
        let was_set = (self.words[word_idx] & mask) != 0;

        match (was_set, value) {
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                self.words[word_idx] |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn set_all(&mut self, value: bool) {
        *self = if value {
            Self::with_len_all_true(self.len)
        } else {
            Self::with_len_all_false(self.len)
        };
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    /// True when at least one bit is set.
    pub fn any(&self) -> bool {
        self.ones > 0
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn as_words(&self) -> &[u64] {
        &self.words
    }

    pub fn and_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "BitVec length mismatch");
        let mut ones = 0usize;
        for (i, w) in self.words.iter_mut().enumerate() {
            *w &= other.words.get(i).copied().unwrap_or(0);
            ones += w.count_ones() as usize;
        }
        self.ones = ones;
    }

    pub fn or_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "BitVec length mismatch");
        for (i, w) in self.words.iter_mut().enumerate() {
            *w |= other.words.get(i).copied().unwrap_or(0);
        }
        self.mask_tail();
        self.ones = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    pub fn not_inplace(&mut self) {
        if self.len == 0 {
            return;
        }
        for w in &mut self.words {
            *w = !*w;
        }
        self.mask_tail();
        self.ones = self.len - self.ones;
    }

    /// True when both vectors have a set bit at the same position.
    pub fn intersects(&self, other: &BitVec) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Iterate the positions of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut remaining = word;
            std::iter::from_fn(move || {
                if remaining == 0 {
                    return None;
                }
                let bit = remaining.trailing_zeros() as usize;
                remaining &= remaining - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    /// Re-index this vector through `mapping`: bit `i` of the result is the bit at `mapping[i]`.
    /// Unmapped positions are `false`.
    pub fn gather(&self, mapping: &[Option<usize>]) -> BitVec {
        let mut out = BitVec::with_len_all_false(mapping.len());
        for (i, target) in mapping.iter().enumerate() {
            if let Some(target) = target {
                if self.get(*target) {
                    out.set(i, true);
                }
            }
        }
        out
    }

    pub fn from_words(words: Vec<u64>, len: usize) -> Self {
        let mut out = Self {
            words,
            len,
            ones: 0,
        };
        out.words.resize(word_len(len), 0);
        out.mask_tail();
        out.ones = out.words.iter().map(|w| w.count_ones() as usize).sum();
        out
    }

    fn mask_tail(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl Default for BitVec {
    fn default() -> Self {
        Self::new()
    }
}

fn word_len(bits: usize) -> usize {
    (bits + 63) / 64
}

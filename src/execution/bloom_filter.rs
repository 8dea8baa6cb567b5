use ahash::RandomState;

use crate::error::ExecutionError;
use crate::execution::hash_table::hash_state;
use crate::operators::scalar::value::ScalarValue;

/// The default false positive rate.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.1;

/// A bloom filter over tuples of key values. Uses `k` hash functions derived from a single 64-bit hash
/// by double hashing. A bloom filter never reports that it does not contain an inserted key.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    hash_state: RandomState,
}

impl BloomFilter {
    /// Creates a bloom filter for the expected number of keys and the given false positive rate.
    pub fn new(expected_entries: usize, fp_rate: f64) -> Self {
        let n = expected_entries.max(1) as f64;
        let p = if fp_rate > 0.0 && fp_rate < 1.0 {
            fp_rate
        } else {
            DEFAULT_FALSE_POSITIVE_RATE
        };
        let ln2 = std::f64::consts::LN_2;
        let m = (-n * p.ln() / (ln2 * ln2)).ceil().max(64.0);
        let k = ((m / n) * ln2).round().max(1.0);

        let num_words = ((m as u64) + 63) / 64;
        BloomFilter {
            bits: vec![0; num_words as usize],
            num_bits: num_words * 64,
            num_hashes: k as u32,
            hash_state: hash_state(),
        }
    }

    /// Computes the hash of the given keys. Uses the same hash function as [OaHashTable].
    ///
    /// [OaHashTable]: crate::execution::hash_table::OaHashTable
    pub fn hash_keys(&self, keys: &[ScalarValue]) -> u64 {
        self.hash_state.hash_one(keys)
    }

    pub fn insert(&mut self, keys: &[ScalarValue]) {
        let hash = self.hash_keys(keys);
        self.insert_hash(hash)
    }

    pub fn insert_hash(&mut self, hash: u64) {
        for i in 0..self.num_hashes {
            let bit = self.bit_index(hash, i);
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Returns `false` if the given keys have definitely not been inserted into this filter.
    pub fn contains(&self, keys: &[ScalarValue]) -> bool {
        self.contains_hash(self.hash_keys(keys))
    }

    pub fn contains_hash(&self, hash: u64) -> bool {
        (0..self.num_hashes).all(|i| {
            let bit = self.bit_index(hash, i);
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    /// Adds all keys of the given filter to this filter. Both filters must have the same shape.
    pub fn union(&mut self, other: &BloomFilter) -> Result<(), ExecutionError> {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return Err(ExecutionError::internal(format!(
                "Bloom filters have different shapes: bits={}/{} hashes={}/{}",
                self.num_bits, other.num_bits, self.num_hashes, other.num_hashes
            )));
        }
        for (word, other) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word |= *other;
        }
        Ok(())
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    fn bit_index(&self, hash: u64, i: u32) -> u64 {
        let h1 = hash & 0xFFFF_FFFF;
        let h2 = (hash >> 32) | 1;
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

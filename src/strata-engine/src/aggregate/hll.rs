//! HyperLogLog distinct-count sketch.
//!
//! `2^p` registers; each hashed item selects a register with its top `p` bits
//! and records the position of the first set bit in the rest. Merging takes
//! the register-wise maximum, so the result does not depend on how the input
//! was partitioned. The standard error is `1.04 / sqrt(2^p)`;
//! [`HyperLogLog::relative_error_bound`] reports three standard errors.
//!
//! Keys are hashed with MurmurHash64A under a fixed seed, so register
//! contents are stable across builds and platforms.

use common_error::{StrataError, StrataResult};

pub const MIN_PRECISION: u8 = 4;
pub const MAX_PRECISION: u8 = 18;
pub const DEFAULT_PRECISION: u8 = 12;

const MURMUR_PRIME: u64 = 0xc6a4_a793_5bd1_e995;
const MURMUR_SEED: u32 = 0xadc8_3b19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    pub fn new(precision: u8) -> StrataResult<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(StrataError::value_error(format!(
                "precision must be in {MIN_PRECISION}..={MAX_PRECISION} (got {precision})"
            )));
        }
        Ok(Self {
            precision,
            registers: vec![0; 1 << precision],
        })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Add an item by its canonical key.
    pub fn insert(&mut self, key: &str) {
        let hash = murmur_hash64a(key.as_bytes(), MURMUR_SEED);

        let p = u32::from(self.precision);
        let index = (hash >> (64 - p)) as usize;
        let rest = hash << p;
        let rank = (rest.leading_zeros() + 1).min(64 - p + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn merge(&mut self, other: &Self) -> StrataResult<()> {
        if self.precision != other.precision {
            return Err(StrataError::merge(format!(
                "cannot merge HyperLogLog sketches with precision {} and {}",
                self.precision, other.precision
            )));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(&other.registers) {
            *mine = (*mine).max(*theirs);
        }
        Ok(())
    }

    /// Estimated number of distinct items.
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-i32::from(r)))
            .sum();
        let raw = alpha * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        }
    }

    /// Three standard errors, relative to the true count.
    pub fn relative_error_bound(&self) -> f64 {
        3.0 * 1.04 / (self.registers.len() as f64).sqrt()
    }
}

fn murmur_hash64a(data: &[u8], seed: u32) -> u64 {
    const R: u32 = 47;
    let mut h = u64::from(seed) ^ (data.len() as u64).wrapping_mul(MURMUR_PRIME);

    let mut blocks = data.chunks_exact(8);
    for block in &mut blocks {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(block);
        let mut k = u64::from_le_bytes(bytes).wrapping_mul(MURMUR_PRIME);
        k ^= k >> R;
        k = k.wrapping_mul(MURMUR_PRIME);
        h ^= k;
        h = h.wrapping_mul(MURMUR_PRIME);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        for (idx, byte) in tail.iter().enumerate() {
            h ^= u64::from(*byte) << (idx * 8);
        }
        h = h.wrapping_mul(MURMUR_PRIME);
    }

    h ^= h >> R;
    h = h.wrapping_mul(MURMUR_PRIME);
    h ^= h >> R;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_range() {
        assert!(HyperLogLog::new(3).is_err());
        assert!(HyperLogLog::new(19).is_err());
        assert_eq!(HyperLogLog::new(4).unwrap().registers.len(), 16);
    }

    #[test]
    fn test_empty_and_small() {
        let mut hll = HyperLogLog::new(DEFAULT_PRECISION).unwrap();
        assert_eq!(hll.estimate(), 0.0);
        for key in ["a", "b", "c", "a", "b"] {
            hll.insert(key);
        }
        assert!((hll.estimate() - 3.0).abs() < 0.5);
    }

    #[test]
    fn test_estimate_within_bound() {
        let n = 10_000;
        let mut hll = HyperLogLog::new(DEFAULT_PRECISION).unwrap();
        for i in 0..n {
            hll.insert(&i.to_string());
        }
        let rel = (hll.estimate() - n as f64).abs() / n as f64;
        assert!(rel <= hll.relative_error_bound(), "relative error {rel}");
    }

    #[test]
    fn test_merge_is_partition_independent() {
        let mut whole = HyperLogLog::new(10).unwrap();
        let mut left = HyperLogLog::new(10).unwrap();
        let mut right = HyperLogLog::new(10).unwrap();
        for i in 0..5000 {
            let key = format!("doc-{i}");
            whole.insert(&key);
            if i % 3 == 0 {
                left.insert(&key);
            } else {
                right.insert(&key);
            }
        }
        left.merge(&right).unwrap();
        assert_eq!(left, whole);
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(murmur_hash64a(b"", MURMUR_SEED), 0xd8df_ea65_85bc_9732);
        assert_eq!(murmur_hash64a(b"strata", MURMUR_SEED), 0x4508_705f_7316_f069);
        assert_eq!(
            murmur_hash64a(b"\"hello world\"", MURMUR_SEED),
            0x9f4f_1e73_2e78_eea6
        );
    }

    #[test]
    fn test_merge_precision_mismatch() {
        let mut a = HyperLogLog::new(10).unwrap();
        let b = HyperLogLog::new(12).unwrap();
        assert!(matches!(
            a.merge(&b),
            Err(StrataError::AggregationMerge { .. })
        ));
    }
}

//! Mergeable quantile sketch.
//!
//! A stack of compactors: level `h` holds items of weight `2^h`. When a
//! level reaches `k` items it is sorted and every other item (alternating
//! between even and odd offsets on successive compactions) is promoted to
//! level `h + 1` with doubled weight. Total weight is conserved, so the sum
//! of weights always equals the number of inserted values.
//!
//! # Error bound
//!
//! A compaction at level `h` shifts the rank of any query point by at most
//! `2^h`, and it consumes at least `k` items of weight `2^h`, so level `h`
//! compacts at most `n / (k * 2^h)` times and contributes at most `n / k`
//! rank error. With `H` compacted levels this is `H * n / k`; resolving the
//! query to a single retained item adds at most one top-level weight, which
//! is below `2n / k`. Hence the normalized rank error of
//! [`QuantileSketch::quantile`] is at most `(H + 2) / k`, reported by
//! [`QuantileSketch::rank_error_bound`]. The bound holds for any merge order
//! because merging only concatenates levels before compacting.

use common_error::{StrataError, StrataResult};

/// Default items per level.
pub const DEFAULT_K: usize = 256;

/// Smallest accepted `k`.
pub const MIN_K: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileSketch {
    k: usize,
    levels: Vec<Vec<f64>>,
    /// Offset to use for the next compaction of each level.
    odd_offset: Vec<bool>,
    count: u64,
}

impl QuantileSketch {
    /// Create an empty sketch. `k` must be even and at least [`MIN_K`].
    pub fn new(k: usize) -> StrataResult<Self> {
        if k < MIN_K || k % 2 != 0 {
            return Err(StrataError::value_error(format!(
                "sketch size k must be even and >= {MIN_K} (got {k})"
            )));
        }
        Ok(Self {
            k,
            levels: vec![Vec::new()],
            odd_offset: vec![false],
            count: 0,
        })
    }

    /// Items per level.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of inserted values.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of levels that have compacted at least once.
    pub fn compacted_levels(&self) -> usize {
        self.levels.len() - 1
    }

    /// Number of retained items.
    pub fn retained(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Upper bound on the normalized rank error of [`Self::quantile`].
    ///
    /// Zero while no compaction has happened.
    pub fn rank_error_bound(&self) -> f64 {
        match self.compacted_levels() {
            0 => 0.0,
            h => (h + 2) as f64 / self.k as f64,
        }
    }

    /// Insert one value. NaN is rejected.
    pub fn insert(&mut self, value: f64) -> StrataResult<()> {
        if value.is_nan() {
            return Err(StrataError::value_error("quantile input is NaN"));
        }
        self.levels[0].push(value);
        self.count += 1;
        self.compress();
        Ok(())
    }

    /// Merge another sketch into this one.
    pub fn merge(&mut self, other: Self) -> StrataResult<()> {
        if self.k != other.k {
            return Err(StrataError::merge(format!(
                "cannot merge quantile sketches with k={} and k={}",
                self.k, other.k
            )));
        }
        for (h, items) in other.levels.into_iter().enumerate() {
            self.ensure_level(h);
            self.levels[h].extend(items);
        }
        self.count += other.count;
        self.compress();
        Ok(())
    }

    fn ensure_level(&mut self, h: usize) {
        while self.levels.len() <= h {
            self.levels.push(Vec::new());
            self.odd_offset.push(false);
        }
    }

    fn compress(&mut self) {
        let mut h = 0;
        while h < self.levels.len() {
            if self.levels[h].len() >= self.k {
                self.compact(h);
            }
            h += 1;
        }
    }

    /// Promote every other item of level `h` to level `h + 1`.
    fn compact(&mut self, h: usize) {
        self.ensure_level(h + 1);
        let mut items = std::mem::take(&mut self.levels[h]);
        items.sort_by(f64::total_cmp);

        // An odd item out stays behind at this level.
        let leftover = if items.len() % 2 == 1 { items.pop() } else { None };
        let offset = usize::from(self.odd_offset[h]);
        self.odd_offset[h] = !self.odd_offset[h];

        let promoted: Vec<f64> = items.iter().skip(offset).step_by(2).copied().collect();
        self.levels[h + 1].extend(promoted);
        self.levels[h].extend(leftover);
    }

    /// Approximate `q`-quantile: the smallest retained item whose
    /// cumulative weight reaches `q * count`.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 || !(0.0..=1.0).contains(&q) {
            return None;
        }
        let mut weighted: Vec<(f64, u64)> = self
            .levels
            .iter()
            .enumerate()
            .flat_map(|(h, items)| items.iter().map(move |&v| (v, 1u64 << h)))
            .collect();
        weighted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let target = q * self.count as f64;
        let mut cumulative = 0u64;
        for (value, weight) in &weighted {
            cumulative += weight;
            if cumulative as f64 >= target {
                return Some(*value);
            }
        }
        weighted.last().map(|(v, _)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permuted(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 7919) % n) as f64).collect()
    }

    fn normalized_rank(value: f64, n: usize) -> f64 {
        // Values are 0..n, so the rank of v is v + 1.
        (value + 1.0) / n as f64
    }

    #[test]
    fn test_rejects_bad_k() {
        assert!(QuantileSketch::new(7).is_err());
        assert!(QuantileSketch::new(10).is_ok());
        assert!(QuantileSketch::new(4).is_err());
    }

    #[test]
    fn test_exact_without_compaction() {
        let mut sketch = QuantileSketch::new(64).unwrap();
        for v in [5.0, 1.0, 3.0, 2.0, 4.0] {
            sketch.insert(v).unwrap();
        }
        assert_eq!(sketch.rank_error_bound(), 0.0);
        assert_eq!(sketch.quantile(0.5), Some(3.0));
        assert_eq!(sketch.quantile(0.0), Some(1.0));
        assert_eq!(sketch.quantile(1.0), Some(5.0));
    }

    #[test]
    fn test_weight_is_conserved() {
        let mut sketch = QuantileSketch::new(16).unwrap();
        for v in permuted(1000) {
            sketch.insert(v).unwrap();
        }
        let total: u64 = sketch
            .levels
            .iter()
            .enumerate()
            .map(|(h, items)| items.len() as u64 * (1 << h))
            .sum();
        assert_eq!(total, 1000);
        assert!(sketch.retained() < 200);
    }

    #[test]
    fn test_bound_holds_single_stream() {
        let n = 10_000;
        let mut sketch = QuantileSketch::new(DEFAULT_K).unwrap();
        for v in permuted(n) {
            sketch.insert(v).unwrap();
        }
        let bound = sketch.rank_error_bound();
        assert!(bound > 0.0);
        for q in [0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
            let v = sketch.quantile(q).unwrap();
            let err = (normalized_rank(v, n) - q).abs();
            assert!(err <= bound + 1.0 / n as f64, "q={q} err={err} bound={bound}");
        }
    }

    #[test]
    fn test_merge_bound() {
        let n = 10_000;
        let values = permuted(n);
        let mut parts = Vec::new();
        for chunk in values.chunks(n / 64) {
            let mut s = QuantileSketch::new(DEFAULT_K).unwrap();
            for &v in chunk {
                s.insert(v).unwrap();
            }
            parts.push(s);
        }
        let mut merged = parts.remove(0);
        for part in parts {
            merged.merge(part).unwrap();
        }
        assert_eq!(merged.count(), n as u64);
        let bound = merged.rank_error_bound();
        let v = merged.quantile(0.5).unwrap();
        assert!((normalized_rank(v, n) - 0.5).abs() <= bound + 1.0 / n as f64);
    }

    #[test]
    fn test_merge_mismatched_k() {
        let mut a = QuantileSketch::new(16).unwrap();
        let b = QuantileSketch::new(32).unwrap();
        assert!(matches!(
            a.merge(b),
            Err(StrataError::AggregationMerge { .. })
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let mut sketch = QuantileSketch::new(16).unwrap();
        assert!(matches!(
            sketch.insert(f64::NAN),
            Err(StrataError::ValueError(_))
        ));
        assert!(sketch.is_empty());
    }
}

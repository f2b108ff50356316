//! Aggregators consumed by [`AttributeContainer::aggregate`](crate::AttributeContainer::aggregate).
//!
//! An aggregator is called once per matching index, in ascending index order, and exposes its
//! result through its own accessors once the aggregate call returns.

use crate::bitvec::BitVec;
use crate::error::{CubeError, CubeResult};
use crate::store::{DoubleArrayStore, Store};

pub trait Aggregator {
    fn accumulate(&mut self, index: usize);
}

/// Aggregator whose partial results can be combined.
///
/// A caller partitioning the index space forks one instance per partition, runs each partition
/// with [`AttributeContainer::aggregate_range`](crate::AttributeContainer::aggregate_range), and
/// folds the forks back with `reduce_with`.
pub trait MapReduceAggregator: Aggregator + Sized {
    /// Fresh aggregator with the same sources and an empty result.
    fn fork(&self) -> Self;

    fn reduce_with(&mut self, other: Self);
}

/// Writes a bit per matching index.
#[derive(Clone, Debug)]
pub struct SelectorAggregator {
    bits: BitVec,
}

impl SelectorAggregator {
    pub fn new(len: usize) -> Self {
        Self {
            bits: BitVec::with_len_all_false(len),
        }
    }

    pub fn bits(&self) -> &BitVec {
        &self.bits
    }

    pub fn into_bits(self) -> BitVec {
        self.bits
    }
}

impl Aggregator for SelectorAggregator {
    fn accumulate(&mut self, index: usize) {
        if index < self.bits.len() {
            self.bits.set(index, true);
        }
    }
}

/// Sets the bit of each matching index's parent ordinal.
#[derive(Clone, Debug)]
pub struct ParentAggregator<'s> {
    parents: &'s Store<usize>,
    bits: BitVec,
    dropped: usize,
}

impl<'s> ParentAggregator<'s> {
    pub fn new(parents: &'s Store<usize>, parent_len: usize) -> Self {
        Self {
            parents,
            bits: BitVec::with_len_all_false(parent_len),
            dropped: 0,
        }
    }

    /// Links that pointed outside the parent's extent.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_bits(self) -> BitVec {
        self.bits
    }
}

impl Aggregator for ParentAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(&parent) = self.parents.value(index) {
            if parent < self.bits.len() {
                self.bits.set(parent, true);
            } else {
                self.dropped += 1;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CountAggregator {
    count: usize,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Aggregator for CountAggregator {
    fn accumulate(&mut self, _index: usize) {
        self.count += 1;
    }
}

impl MapReduceAggregator for CountAggregator {
    fn fork(&self) -> Self {
        Self::new()
    }

    fn reduce_with(&mut self, other: Self) {
        self.count += other.count;
    }
}

/// Sum of a double attribute; absent values are skipped.
#[derive(Clone, Debug)]
pub struct DoubleSumAggregator<'s> {
    values: &'s Store<f64>,
    sum: f64,
    count: usize,
}

impl<'s> DoubleSumAggregator<'s> {
    pub fn new(values: &'s Store<f64>) -> Self {
        Self {
            values,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of present values summed.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Aggregator for DoubleSumAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(v) = self.values.value(index) {
            self.sum += v;
            self.count += 1;
        }
    }
}

impl MapReduceAggregator for DoubleSumAggregator<'_> {
    fn fork(&self) -> Self {
        Self::new(self.values)
    }

    fn reduce_with(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// Minimum and maximum of a double attribute; `None` until a present value is seen.
#[derive(Clone, Debug)]
pub struct DoubleMinMaxAggregator<'s> {
    values: &'s Store<f64>,
    range: Option<(f64, f64)>,
}

impl<'s> DoubleMinMaxAggregator<'s> {
    pub fn new(values: &'s Store<f64>) -> Self {
        Self {
            values,
            range: None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.range.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<f64> {
        self.range.map(|(_, max)| max)
    }

    fn merge(&mut self, v_min: f64, v_max: f64) {
        self.range = Some(match self.range {
            None => (v_min, v_max),
            Some((min, max)) => (min.min(v_min), max.max(v_max)),
        });
    }
}

impl Aggregator for DoubleMinMaxAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(&v) = self.values.value(index) {
            self.merge(v, v);
        }
    }
}

impl MapReduceAggregator for DoubleMinMaxAggregator<'_> {
    fn fork(&self) -> Self {
        Self::new(self.values)
    }

    fn reduce_with(&mut self, other: Self) {
        if let Some((min, max)) = other.range {
            self.merge(min, max);
        }
    }
}

/// Element-wise sum of a double-array attribute; absent rows are skipped.
#[derive(Clone, Debug)]
pub struct DoubleArraySumAggregator<'s> {
    values: &'s DoubleArrayStore,
    sums: Vec<f64>,
    count: usize,
}

impl<'s> DoubleArraySumAggregator<'s> {
    pub fn new(values: &'s DoubleArrayStore) -> Self {
        Self {
            values,
            sums: vec![0.0; values.width()],
            count: 0,
        }
    }

    /// One total per array position.
    pub fn sums(&self) -> &[f64] {
        &self.sums
    }

    pub fn into_sums(self) -> Vec<f64> {
        self.sums
    }

    /// Number of present rows summed.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Aggregator for DoubleArraySumAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(row) = self.values.value(index) {
            for (sum, v) in self.sums.iter_mut().zip(row) {
                *sum += v;
            }
            self.count += 1;
        }
    }
}

impl MapReduceAggregator for DoubleArraySumAggregator<'_> {
    fn fork(&self) -> Self {
        Self::new(self.values)
    }

    fn reduce_with(&mut self, other: Self) {
        for (sum, v) in self.sums.iter_mut().zip(other.sums) {
            *sum += v;
        }
        self.count += other.count;
    }
}

/// Sum of the position-wise products of two double-array attributes over their first `horizon`
/// positions, e.g. units times price per period. Rows absent from either store are skipped.
#[derive(Clone, Debug)]
pub struct DoubleProductSumAggregator<'s> {
    first: &'s DoubleArrayStore,
    second: &'s DoubleArrayStore,
    horizon: usize,
    result: f64,
}

impl<'s> DoubleProductSumAggregator<'s> {
    pub fn new(
        first: &'s DoubleArrayStore,
        second: &'s DoubleArrayStore,
        horizon: usize,
    ) -> CubeResult<Self> {
        let width = first.width().min(second.width());
        if horizon > width {
            return Err(CubeError::HorizonOutOfRange { horizon, width });
        }
        Ok(Self {
            first,
            second,
            horizon,
            result: 0.0,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn result(&self) -> f64 {
        self.result
    }
}

impl Aggregator for DoubleProductSumAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let (Some(a), Some(b)) = (self.first.value(index), self.second.value(index)) {
            self.result += a[..self.horizon]
                .iter()
                .zip(&b[..self.horizon])
                .map(|(x, y)| x * y)
                .sum::<f64>();
        }
    }
}

impl MapReduceAggregator for DoubleProductSumAggregator<'_> {
    fn fork(&self) -> Self {
        Self {
            result: 0.0,
            ..self.clone()
        }
    }

    fn reduce_with(&mut self, other: Self) {
        self.result += other.result;
    }
}

/// Logical AND of a boolean attribute. `true` when nothing (present) was accumulated.
#[derive(Clone, Debug)]
pub struct BooleanAndAggregator<'s> {
    values: &'s Store<bool>,
    result: bool,
}

impl<'s> BooleanAndAggregator<'s> {
    pub fn new(values: &'s Store<bool>) -> Self {
        Self {
            values,
            result: true,
        }
    }

    pub fn result(&self) -> bool {
        self.result
    }
}

impl Aggregator for BooleanAndAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(&v) = self.values.value(index) {
            self.result = self.result && v;
        }
    }
}

impl MapReduceAggregator for BooleanAndAggregator<'_> {
    fn fork(&self) -> Self {
        Self::new(self.values)
    }

    fn reduce_with(&mut self, other: Self) {
        self.result = self.result && other.result;
    }
}

/// Logical OR of a boolean attribute. `false` when nothing (present) was accumulated.
#[derive(Clone, Debug)]
pub struct BooleanOrAggregator<'s> {
    values: &'s Store<bool>,
    result: bool,
}

impl<'s> BooleanOrAggregator<'s> {
    pub fn new(values: &'s Store<bool>) -> Self {
        Self {
            values,
            result: false,
        }
    }

    pub fn result(&self) -> bool {
        self.result
    }
}

impl Aggregator for BooleanOrAggregator<'_> {
    fn accumulate(&mut self, index: usize) {
        if let Some(&v) = self.values.value(index) {
            self.result = self.result || v;
        }
    }
}

impl MapReduceAggregator for BooleanOrAggregator<'_> {
    fn fork(&self) -> Self {
        Self::new(self.values)
    }

    fn reduce_with(&mut self, other: Self) {
        self.result = self.result || other.result;
    }
}

/// Collects the matched indices of a level or intersection as a bit vector.
#[derive(Clone, Debug)]
pub struct ShadowAggregator {
    shadow: BitVec,
}

impl ShadowAggregator {
    /// `len` is the size of the level or intersection being aggregated.
    pub fn new(len: usize) -> Self {
        Self {
            shadow: BitVec::with_len_all_false(len),
        }
    }

    pub fn shadow(&self) -> &BitVec {
        &self.shadow
    }

    pub fn into_shadow(self) -> BitVec {
        self.shadow
    }
}

impl Aggregator for ShadowAggregator {
    fn accumulate(&mut self, index: usize) {
        if index < self.shadow.len() {
            self.shadow.set(index, true);
        }
    }
}

impl MapReduceAggregator for ShadowAggregator {
    fn fork(&self) -> Self {
        Self::new(self.shadow.len())
    }

    fn reduce_with(&mut self, other: Self) {
        self.shadow.or_inplace(&other.shadow);
    }
}

/// Collects matching ordinals in visit (ascending) order.
#[derive(Clone, Debug, Default)]
pub struct MemberAggregator {
    members: Vec<usize>,
}

impl MemberAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn into_members(self) -> Vec<usize> {
        self.members
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

impl Aggregator for MemberAggregator {
    fn accumulate(&mut self, index: usize) {
        self.members.push(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_skips_absent_values() {
        let values: Store<f64> = [Some(3.0), None, Some(-1.5), Some(7.25)]
            .into_iter()
            .collect();
        let mut agg = DoubleMinMaxAggregator::new(&values);
        assert_eq!(agg.min(), None);
        for i in 0..4 {
            agg.accumulate(i);
        }
        assert_eq!(agg.min(), Some(-1.5));
        assert_eq!(agg.max(), Some(7.25));
    }

    #[test]
    fn forks_reduce_to_the_sequential_result() {
        let values: Store<f64> = (0..10).map(|i| Some(i as f64)).collect();
        let mut whole = DoubleSumAggregator::new(&values);
        for i in 0..10 {
            whole.accumulate(i);
        }

        let mut left = whole.fork();
        let mut right = whole.fork();
        for i in 0..4 {
            left.accumulate(i);
        }
        for i in 4..10 {
            right.accumulate(i);
        }
        left.reduce_with(right);
        assert_eq!(left.sum(), whole.sum());
        assert_eq!(left.count(), 10);
    }

    fn weekly_units() -> DoubleArrayStore {
        let mut units = DoubleArrayStore::new(3);
        units.push(vec![1.0, 2.0, 3.0]).unwrap();
        units.push_absent();
        units.push(vec![10.0, 20.0, 30.0]).unwrap();
        units.push(vec![0.5, 0.5, 0.5]).unwrap();
        units
    }

    #[test]
    fn double_arrays_sum_position_by_position() {
        let units = weekly_units();
        let mut agg = DoubleArraySumAggregator::new(&units);
        assert_eq!(agg.sums(), &[0.0, 0.0, 0.0]);
        for i in 0..4 {
            agg.accumulate(i);
        }
        assert_eq!(agg.sums(), &[11.5, 22.5, 33.5]);
        assert_eq!(agg.count(), 3);

        let mut left = agg.fork();
        let mut right = agg.fork();
        left.accumulate(0);
        right.accumulate(2);
        right.accumulate(3);
        left.reduce_with(right);
        assert_eq!(left.into_sums(), vec![11.5, 22.5, 33.5]);
    }

    #[test]
    fn product_sum_stops_at_the_horizon() {
        let units = weekly_units();
        let mut price = DoubleArrayStore::new(4);
        price.push(vec![2.0, 2.0, 2.0, 100.0]).unwrap();
        price.push(vec![9.0, 9.0, 9.0, 9.0]).unwrap();
        price.push(vec![1.0, 0.0, 1.0, 100.0]).unwrap();

        let mut agg = DoubleProductSumAggregator::new(&units, &price, 2).unwrap();
        for i in 0..4 {
            agg.accumulate(i);
        }
        // Row 0: 1*2 + 2*2; row 1 has no units; row 2: 10*1 + 20*0; row 3 has no price.
        assert_eq!(agg.result(), 16.0);

        let mut full = DoubleProductSumAggregator::new(&units, &price, 3).unwrap();
        let mut tail = full.fork();
        full.accumulate(0);
        tail.accumulate(2);
        full.reduce_with(tail);
        assert_eq!(full.result(), 12.0 + 40.0);

        assert_eq!(
            DoubleProductSumAggregator::new(&units, &price, 4).unwrap_err(),
            CubeError::HorizonOutOfRange {
                horizon: 4,
                width: 3,
            }
        );
    }

    #[test]
    fn boolean_identities() {
        let values: Store<bool> = [Some(true), Some(false)].into_iter().collect();
        let and = BooleanAndAggregator::new(&values);
        let or = BooleanOrAggregator::new(&values);
        assert!(and.result());
        assert!(!or.result());
    }
}

//! Multi-key ordering of aggregated rows (typically sibling members) by measure values.

use crate::error::{CubeError, CubeResult};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;

/// Where absent values land relative to present ones. The rule holds for both sort
/// directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NullOrder {
    #[default]
    Last,
    First,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MeasureValues {
    Boolean(Vec<Option<bool>>),
    Int(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl MeasureValues {
    pub fn len(&self) -> usize {
        match self {
            MeasureValues::Boolean(v) => v.len(),
            MeasureValues::Int(v) => v.len(),
            MeasureValues::Double(v) => v.len(),
            MeasureValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_null(&self, row: usize) -> bool {
        match self {
            MeasureValues::Boolean(v) => v[row].is_none(),
            MeasureValues::Int(v) => v[row].is_none(),
            MeasureValues::Double(v) => v[row].is_none(),
            MeasureValues::Text(v) => v[row].is_none(),
        }
    }

    /// Ascending comparison of two present values; absent values compare equal here and are
    /// ordered by the caller.
    fn compare_present(&self, a: usize, b: usize) -> Ordering {
        match self {
            MeasureValues::Boolean(v) => v[a].cmp(&v[b]),
            MeasureValues::Int(v) => v[a].cmp(&v[b]),
            MeasureValues::Double(v) => v[a].map(OrderedFloat).cmp(&v[b].map(OrderedFloat)),
            MeasureValues::Text(v) => v[a].cmp(&v[b]),
        }
    }
}

/// One named column of aggregated values, e.g. the summed sales of each child member.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedMeasure {
    name: String,
    values: MeasureValues,
    ascending: bool,
    nulls: NullOrder,
}

impl AggregatedMeasure {
    pub fn new(name: impl Into<String>, values: MeasureValues) -> Self {
        Self {
            name: name.into(),
            values,
            ascending: true,
            nulls: NullOrder::default(),
        }
    }

    pub fn doubles(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self::new(
            name,
            MeasureValues::Double(values.into_iter().map(Some).collect()),
        )
    }

    pub fn ints(name: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        Self::new(name, MeasureValues::Int(values.into_iter().map(Some).collect()))
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn with_null_order(mut self, nulls: NullOrder) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &MeasureValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub fn set_ascending(&mut self, ascending: bool) {
        self.ascending = ascending;
    }

    pub fn null_order(&self) -> NullOrder {
        self.nulls
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.values.is_null(row)
    }

    /// Order of rows `a` and `b` under this measure alone. Two absent values tie; otherwise an
    /// absent value goes where the null rule puts it, independent of direction.
    pub fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        match (self.values.is_null(a), self.values.is_null(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.nulls {
                NullOrder::Last => Ordering::Greater,
                NullOrder::First => Ordering::Less,
            },
            (false, true) => match self.nulls {
                NullOrder::Last => Ordering::Less,
                NullOrder::First => Ordering::Greater,
            },
            (false, false) => {
                let ord = self.values.compare_present(a, b);
                if self.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
        }
    }
}

/// Orders rows by a chosen subset of equally sized measures, most significant first.
///
/// Rows that tie on every sort measure keep their original relative order, so the result is a
/// total, deterministic permutation of `0..rows`.
#[derive(Clone, Debug, Default)]
pub struct MeasureValueSorter {
    rows: Option<usize>,
    measures: Vec<AggregatedMeasure>,
    sort_measures: Vec<usize>,
    order: Option<Vec<usize>>,
}

impl MeasureValueSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows every measure holds (0 before the first measure is added).
    pub fn rows(&self) -> usize {
        self.rows.unwrap_or(0)
    }

    pub fn measures(&self) -> &[AggregatedMeasure] {
        &self.measures
    }

    pub fn measure(&self, name: &str) -> Option<&AggregatedMeasure> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn add_measure(&mut self, measure: AggregatedMeasure) -> CubeResult<()> {
        match self.rows {
            None => self.rows = Some(measure.len()),
            Some(expected) if expected != measure.len() => {
                let actual = measure.len();
                return Err(CubeError::MeasureLengthMismatch {
                    measure: measure.name,
                    expected,
                    actual,
                });
            }
            Some(_) => {}
        }
        self.measures.push(measure);
        Ok(())
    }

    /// Choose the sort keys by name, most significant first. Names that match no measure are
    /// skipped. Any previously computed order is discarded.
    pub fn set_sort_measures<S: AsRef<str>>(&mut self, names: &[S]) {
        self.clear_sort_order();
        self.sort_measures = names
            .iter()
            .filter_map(|name| {
                let found = self.measures.iter().position(|m| m.name == name.as_ref());
                if found.is_none() {
                    log::debug!("ignoring unknown sort measure {}", name.as_ref());
                }
                found
            })
            .collect();
    }

    pub fn sort_measure_names(&self) -> Vec<&str> {
        self.sort_measures
            .iter()
            .map(|&i| self.measures[i].name())
            .collect()
    }

    /// Row indices in sorted order. Computed on first use and cached until the sort measures
    /// change or [`MeasureValueSorter::clear_sort_order`] is called.
    pub fn sort_order(&mut self) -> &[usize] {
        let rows = self.rows();
        let measures = &self.measures;
        let keys = &self.sort_measures;
        self.order.get_or_insert_with(|| {
            let mut order: Vec<usize> = (0..rows).collect();
            // `sort_by` is stable, which gives the row-index tie-break.
            order.sort_by(|&a, &b| {
                keys.iter()
                    .map(|&k| measures[k].compare_rows(a, b))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
            order
        })
    }

    pub fn clear_sort_order(&mut self) {
        self.order = None;
    }
}

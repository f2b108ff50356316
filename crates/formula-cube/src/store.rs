//! Growable typed attribute stores.
//!
//! A store is a plain resizable array where every slot is either present or absent. Absence is
//! represented with `None` rather than a per-type sentinel, so legitimate values (`i64::MIN`,
//! `NaN`, empty strings) never collide with "no value". Growing a store (`ensure_size`, `set`
//! past the end) fills the new slots with absent values.

use crate::error::{CubeError, CubeResult};

/// Read past the populated extent of a store. Stores are unnamed; callers that know the owning
/// container turn this into a [`CubeError`] with [`OutOfExtent::in_container`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("index {index} is past the populated extent of the store (size {len})")]
pub struct OutOfExtent {
    pub index: usize,
    pub len: usize,
}

impl OutOfExtent {
    pub fn in_container(self, container: impl Into<String>) -> CubeError {
        CubeError::OrdinalOutOfRange {
            container: container.into(),
            ordinal: self.index,
            len: self.len,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Store<T> {
    values: Vec<Option<T>>,
}

impl<T> Store<T> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    /// Grow the store to at least `size` slots, padding with absent values. Never shrinks.
    /// Returns the resulting size.
    pub fn ensure_size(&mut self, size: usize) -> usize {
        if self.values.len() < size {
            self.values.resize_with(size, || None);
        }
        self.values.len()
    }

    /// Value at `index`, failing when `index` is past the populated extent.
    pub fn get(&self, index: usize) -> Result<Option<&T>, OutOfExtent> {
        match self.values.get(index) {
            Some(slot) => Ok(slot.as_ref()),
            None => Err(OutOfExtent {
                index,
                len: self.values.len(),
            }),
        }
    }

    /// Value at `index`, treating positions past the end as absent.
    pub fn value(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn is_absent(&self, index: usize) -> bool {
        self.value(index).is_none()
    }

    /// Write `value` at `index`, extending with absent slots as needed. Returns the previous value.
    pub fn set(&mut self, index: usize, value: Option<T>) -> Option<T> {
        self.ensure_size(index + 1);
        std::mem::replace(&mut self.values[index], value)
    }

    /// Append a value and return its index.
    pub fn push(&mut self, value: T) -> usize {
        self.values.push(Some(value));
        self.values.len() - 1
    }

    pub fn push_absent(&mut self) -> usize {
        self.values.push(None);
        self.values.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> + '_ {
        self.values.iter().map(Option::as_ref)
    }
}

impl<T: Clone> Store<T> {
    /// Copy the store into a plain vector of optional values.
    pub fn to_vec(&self) -> Vec<Option<T>> {
        self.values.clone()
    }
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<Option<T>> for Store<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Store of fixed-width `f64` arrays, one per item (e.g. a time-phased measure with one value per
/// period). Every present row has exactly `width` values.
#[derive(Clone, Debug, PartialEq)]
pub struct DoubleArrayStore {
    width: usize,
    rows: Store<Vec<f64>>,
}

impl DoubleArrayStore {
    pub fn new(width: usize) -> Self {
        Self::with_capacity(width, 0)
    }

    pub fn with_capacity(width: usize, capacity: usize) -> Self {
        Self {
            width,
            rows: Store::with_capacity(capacity),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ensure_size(&mut self, size: usize) -> usize {
        self.rows.ensure_size(size)
    }

    pub fn get(&self, index: usize) -> Result<Option<&[f64]>, OutOfExtent> {
        Ok(self.rows.get(index)?.map(Vec::as_slice))
    }

    pub fn value(&self, index: usize) -> Option<&[f64]> {
        self.rows.value(index).map(Vec::as_slice)
    }

    pub fn is_absent(&self, index: usize) -> bool {
        self.rows.is_absent(index)
    }

    /// Write a row at `index`, extending with absent rows as needed. Returns the previous row.
    pub fn set(&mut self, index: usize, row: Option<Vec<f64>>) -> CubeResult<Option<Vec<f64>>> {
        if let Some(row) = &row {
            self.check_width(row)?;
        }
        Ok(self.rows.set(index, row))
    }

    pub fn push(&mut self, row: Vec<f64>) -> CubeResult<usize> {
        self.check_width(&row)?;
        Ok(self.rows.push(row))
    }

    pub fn push_absent(&mut self) -> usize {
        self.rows.push_absent()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&[f64]>> + '_ {
        self.rows.iter().map(|row| row.map(Vec::as_slice))
    }

    fn check_width(&self, row: &[f64]) -> CubeResult<()> {
        if row.len() != self.width {
            return Err(CubeError::ArrayWidthMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreType {
    Ordinal,
    Int,
    Double,
    Boolean,
    Text,
    DoubleArray { width: usize },
}

impl StoreType {
    /// Kind name without parameters, as reported in type errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StoreType::Ordinal => "ordinal",
            StoreType::Int => "int",
            StoreType::Double => "double",
            StoreType::Boolean => "boolean",
            StoreType::Text => "text",
            StoreType::DoubleArray { .. } => "double array",
        }
    }
}

/// A named attribute's storage inside an [`AttributeContainer`](crate::AttributeContainer).
///
/// `Ordinal` stores hold member positions in some level: parent links on levels, related-level
/// keys on intersections.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeStore {
    Ordinal(Store<usize>),
    Int(Store<i64>),
    Double(Store<f64>),
    Boolean(Store<bool>),
    Text(Store<String>),
    DoubleArray(DoubleArrayStore),
}

impl AttributeStore {
    pub fn new(store_type: StoreType, capacity: usize) -> Self {
        match store_type {
            StoreType::Ordinal => AttributeStore::Ordinal(Store::with_capacity(capacity)),
            StoreType::Int => AttributeStore::Int(Store::with_capacity(capacity)),
            StoreType::Double => AttributeStore::Double(Store::with_capacity(capacity)),
            StoreType::Boolean => AttributeStore::Boolean(Store::with_capacity(capacity)),
            StoreType::Text => AttributeStore::Text(Store::with_capacity(capacity)),
            StoreType::DoubleArray { width } => {
                AttributeStore::DoubleArray(DoubleArrayStore::with_capacity(width, capacity))
            }
        }
    }

    pub fn store_type(&self) -> StoreType {
        match self {
            AttributeStore::Ordinal(_) => StoreType::Ordinal,
            AttributeStore::Int(_) => StoreType::Int,
            AttributeStore::Double(_) => StoreType::Double,
            AttributeStore::Boolean(_) => StoreType::Boolean,
            AttributeStore::Text(_) => StoreType::Text,
            AttributeStore::DoubleArray(s) => StoreType::DoubleArray { width: s.width() },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttributeStore::Ordinal(s) => s.len(),
            AttributeStore::Int(s) => s.len(),
            AttributeStore::Double(s) => s.len(),
            AttributeStore::Boolean(s) => s.len(),
            AttributeStore::Text(s) => s.len(),
            AttributeStore::DoubleArray(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ensure_size(&mut self, size: usize) -> usize {
        match self {
            AttributeStore::Ordinal(s) => s.ensure_size(size),
            AttributeStore::Int(s) => s.ensure_size(size),
            AttributeStore::Double(s) => s.ensure_size(size),
            AttributeStore::Boolean(s) => s.ensure_size(size),
            AttributeStore::Text(s) => s.ensure_size(size),
            AttributeStore::DoubleArray(s) => s.ensure_size(size),
        }
    }

    /// Approximate heap footprint of the stored values in bytes.
    pub fn data_size(&self) -> usize {
        match self {
            AttributeStore::Ordinal(s) => s.len() * std::mem::size_of::<Option<usize>>(),
            AttributeStore::Int(s) => s.len() * std::mem::size_of::<Option<i64>>(),
            AttributeStore::Double(s) => s.len() * std::mem::size_of::<Option<f64>>(),
            AttributeStore::Boolean(s) => s.len() * std::mem::size_of::<Option<bool>>(),
            AttributeStore::Text(s) => s
                .iter()
                .map(|v| std::mem::size_of::<Option<String>>() + v.map_or(0, String::len))
                .sum(),
            AttributeStore::DoubleArray(s) => s
                .iter()
                .map(|row| {
                    std::mem::size_of::<Option<Vec<f64>>>()
                        + row.map_or(0, |r| std::mem::size_of_val(r))
                })
                .sum(),
        }
    }
}

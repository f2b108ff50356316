use crate::aggregator::{Aggregator, ParentAggregator, SelectorAggregator};
use crate::bitvec::BitVec;
use crate::error::{CubeError, CubeResult};
use crate::filter::FilterRef;
use crate::store::{AttributeStore, DoubleArrayStore, Store, StoreType};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique handle of an attribute container.
///
/// Filters are scoped by this handle rather than by a reference to the container, so a filter can
/// be built, grouped and matched without borrowing the container it targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl ContainerId {
    fn next() -> Self {
        ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocate a new generation stamp. Stamps are globally monotonic, so two different mutations of
/// any containers never share a stamp.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

macro_rules! typed_store_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, attribute: &str) -> CubeResult<&Store<$ty>> {
            match self.attribute(attribute)? {
                AttributeStore::$variant(store) => Ok(store),
                _ => Err(self.type_error(attribute, StoreType::$variant.kind_name())),
            }
        }

        pub fn $get_mut(&mut self, attribute: &str) -> CubeResult<&mut Store<$ty>> {
            let err = self.type_error(attribute, StoreType::$variant.kind_name());
            match self.attribute_mut(attribute)? {
                AttributeStore::$variant(store) => Ok(store),
                _ => Err(err),
            }
        }
    };
}

/// A named set of attribute stores sharing one index space, plus the filter/aggregate loop that
/// runs over that index space.
#[derive(Debug)]
pub struct AttributeContainer {
    id: ContainerId,
    name: String,
    attributes: HashMap<String, AttributeStore>,
}

impl AttributeContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ContainerId::next(),
            name: name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Container created with one store already in place.
    pub fn with_attribute(
        name: impl Into<String>,
        attribute: impl Into<String>,
        store: AttributeStore,
    ) -> Self {
        let mut container = Self::new(name);
        container.attributes.insert(attribute.into(), store);
        container
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of addressable indices: the size of the largest attribute store.
    ///
    /// Stores may be populated independently during a load, so they are allowed to disagree in
    /// length for a while; the shorter ones read as absent past their end.
    pub fn member_count(&self) -> usize {
        self.attributes
            .values()
            .map(AttributeStore::len)
            .max()
            .unwrap_or(0)
    }

    /// Grow every store to at least `size` slots. Returns the resulting member count.
    pub fn ensure_size(&mut self, size: usize) -> usize {
        for store in self.attributes.values_mut() {
            store.ensure_size(size);
        }
        self.member_count()
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Attribute names in lexical order.
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Add an empty store sized to the current member count.
    pub fn add_attribute(&mut self, attribute: &str, store_type: StoreType) -> CubeResult<()> {
        if self.attributes.contains_key(attribute) {
            return Err(CubeError::DuplicateAttribute {
                container: self.name.clone(),
                attribute: attribute.to_string(),
            });
        }
        let size = self.member_count();
        let mut store = AttributeStore::new(store_type, size);
        store.ensure_size(size);
        self.attributes.insert(attribute.to_string(), store);
        Ok(())
    }

    /// Add a pre-populated store.
    pub fn insert_attribute(&mut self, attribute: &str, store: AttributeStore) -> CubeResult<()> {
        if self.attributes.contains_key(attribute) {
            return Err(CubeError::DuplicateAttribute {
                container: self.name.clone(),
                attribute: attribute.to_string(),
            });
        }
        self.attributes.insert(attribute.to_string(), store);
        Ok(())
    }

    pub fn remove_attribute(&mut self, attribute: &str) -> Option<AttributeStore> {
        self.attributes.remove(attribute)
    }

    pub fn attribute(&self, attribute: &str) -> CubeResult<&AttributeStore> {
        self.attributes
            .get(attribute)
            .ok_or_else(|| CubeError::UnknownAttribute {
                container: self.name.clone(),
                attribute: attribute.to_string(),
            })
    }

    pub fn attribute_mut(&mut self, attribute: &str) -> CubeResult<&mut AttributeStore> {
        let name = &self.name;
        self.attributes
            .get_mut(attribute)
            .ok_or_else(|| CubeError::UnknownAttribute {
                container: name.clone(),
                attribute: attribute.to_string(),
            })
    }

    typed_store_accessors!(ordinal_store, ordinal_store_mut, Ordinal, usize);
    typed_store_accessors!(int_store, int_store_mut, Int, i64);
    typed_store_accessors!(double_store, double_store_mut, Double, f64);
    typed_store_accessors!(boolean_store, boolean_store_mut, Boolean, bool);
    typed_store_accessors!(text_store, text_store_mut, Text, String);

    pub fn double_array_store(&self, attribute: &str) -> CubeResult<&DoubleArrayStore> {
        match self.attribute(attribute)? {
            AttributeStore::DoubleArray(store) => Ok(store),
            _ => Err(self.type_error(attribute, "double array")),
        }
    }

    pub fn double_array_store_mut(&mut self, attribute: &str) -> CubeResult<&mut DoubleArrayStore> {
        let err = self.type_error(attribute, "double array");
        match self.attribute_mut(attribute)? {
            AttributeStore::DoubleArray(store) => Ok(store),
            _ => Err(err),
        }
    }

    fn type_error(&self, attribute: &str, expected: &'static str) -> CubeError {
        CubeError::AttributeType {
            container: self.name.clone(),
            attribute: attribute.to_string(),
            expected,
        }
    }

    /// Run every aggregator over the indices matching all `filters`.
    ///
    /// Filters are combined with logical AND and evaluated in order, stopping at the first one
    /// that rejects an index. With no filters every index in `[0, member_count)` is accumulated.
    /// Filters are expected to be scoped to this container.
    pub fn aggregate(&self, filters: &[FilterRef<'_>], aggregators: &mut [&mut dyn Aggregator]) {
        self.aggregate_range(0..self.member_count(), filters, aggregators);
    }

    /// Same as [`AttributeContainer::aggregate`] over one partition of the index space. The
    /// range is clamped to the member count.
    pub fn aggregate_range(
        &self,
        range: Range<usize>,
        filters: &[FilterRef<'_>],
        aggregators: &mut [&mut dyn Aggregator],
    ) {
        let end = range.end.min(self.member_count());
        let start = range.start.min(end);

        debug_assert!(
            filters.iter().all(|f| f.container() == self.id),
            "filter scoped to a different container than {}",
            self.name
        );

        for index in start..end {
            if filters.iter().all(|f| f.is_match(index)) {
                for aggregator in aggregators.iter_mut() {
                    aggregator.accumulate(index);
                }
            }
        }
    }

    /// Bit vector over this container with a bit set for every index matching all `filters`.
    pub fn selector(&self, filters: &[FilterRef<'_>]) -> BitVec {
        let mut selector = SelectorAggregator::new(self.member_count());
        self.aggregate(filters, &mut [&mut selector]);
        selector.into_bits()
    }

    /// Cast the matching indices up to a parent container.
    ///
    /// The result is sized to `parent_len`; a parent bit is set when *any* matching index links
    /// to it through the ordinal store `parent_attribute`. Absent links are skipped, as are links
    /// that point past the parent's extent.
    pub fn parent_selector(
        &self,
        filters: &[FilterRef<'_>],
        parent_attribute: &str,
        parent_len: usize,
    ) -> CubeResult<BitVec> {
        let parents = self.ordinal_store(parent_attribute)?;
        let mut aggregator = ParentAggregator::new(parents, parent_len);
        self.aggregate(filters, &mut [&mut aggregator]);
        if aggregator.dropped() > 0 {
            log::warn!(
                "{}: {} parent links in {parent_attribute} point past the parent level (size {parent_len})",
                self.name,
                aggregator.dropped()
            );
        }
        Ok(aggregator.into_bits())
    }

    /// Approximate heap footprint of all attribute values in bytes.
    pub fn data_size(&self) -> usize {
        self.attributes.values().map(AttributeStore::data_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ElementFilter, IntGreaterThanFilter};
    use std::sync::Arc;

    #[test]
    fn container_ids_are_unique() {
        let a = AttributeContainer::new("a");
        let b = AttributeContainer::new("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn member_count_tolerates_misaligned_stores() {
        let mut c = AttributeContainer::new("c");
        c.add_attribute("x", StoreType::Int).unwrap();
        c.add_attribute("y", StoreType::Text).unwrap();
        c.int_store_mut("x").unwrap().push(1);
        c.int_store_mut("x").unwrap().push(2);
        c.text_store_mut("y").unwrap().push("a".into());
        assert_eq!(c.member_count(), 2);
        assert_eq!(c.ensure_size(4), 4);
        assert_eq!(c.text_store("y").unwrap().len(), 4);
    }

    #[test]
    fn filters_are_anded() {
        let mut c = AttributeContainer::new("c");
        c.add_attribute("x", StoreType::Int).unwrap();
        c.ensure_size(6);
        let filters: Vec<FilterRef> = vec![
            Arc::new(IntGreaterThanFilter::new(c.id(), 1)),
            Arc::new(ElementFilter::new(c.id(), 4)),
        ];
        assert_eq!(c.selector(&filters).iter_ones().collect::<Vec<_>>(), vec![4]);
        assert_eq!(c.selector(&[]).count_ones(), 6);
    }

    #[test]
    fn wrong_store_type_is_reported() {
        let mut c = AttributeContainer::new("c");
        c.add_attribute("x", StoreType::Int).unwrap();
        assert!(matches!(
            c.text_store("x"),
            Err(CubeError::AttributeType {
                expected: "text",
                ..
            })
        ));
        assert!(matches!(
            c.add_attribute("x", StoreType::Int),
            Err(CubeError::DuplicateAttribute { .. })
        ));
    }
}

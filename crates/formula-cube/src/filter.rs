use crate::bitvec::BitVec;
use crate::container::ContainerId;
use crate::store::Store;
use std::fmt;
use std::sync::Arc;

/// Per-index predicate scoped to exactly one attribute container.
///
/// Filters passed together to an aggregate call are combined with logical AND.
pub trait Filter: fmt::Debug + Send + Sync {
    /// Handle of the container this filter is evaluated against.
    fn container(&self) -> ContainerId;

    fn is_match(&self, index: usize) -> bool;
}

/// Shared filter handle. Derived filters produced during selector resolution may borrow stores
/// of the levels or intersection they were built from, hence the lifetime.
pub type FilterRef<'a> = Arc<dyn Filter + 'a>;

/// Matches a single member ordinal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementFilter {
    container: ContainerId,
    ordinal: usize,
}

impl ElementFilter {
    pub fn new(container: ContainerId, ordinal: usize) -> Self {
        Self { container, ordinal }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl Filter for ElementFilter {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, index: usize) -> bool {
        index == self.ordinal
    }
}

/// Matches indices whose bit is set in a selector over the container itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelFilter {
    container: ContainerId,
    selector: BitVec,
}

impl LevelFilter {
    pub fn new(container: ContainerId, selector: BitVec) -> Self {
        Self {
            container,
            selector,
        }
    }

    pub fn selector(&self) -> &BitVec {
        &self.selector
    }
}

impl Filter for LevelFilter {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, index: usize) -> bool {
        self.selector.get(index)
    }
}

/// Matches indices whose ordinal attribute value is set in `selector`.
///
/// Used to push a selector on one level down to its child level (through the child's parent
/// link) or onto an intersection (through its related-level store). Absent values never match.
#[derive(Clone, Debug)]
pub struct AttributeSetFilter<'s> {
    container: ContainerId,
    values: &'s Store<usize>,
    selector: BitVec,
}

impl<'s> AttributeSetFilter<'s> {
    pub fn new(container: ContainerId, values: &'s Store<usize>, selector: BitVec) -> Self {
        Self {
            container,
            values,
            selector,
        }
    }
}

impl Filter for AttributeSetFilter<'_> {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, index: usize) -> bool {
        match self.values.value(index) {
            Some(&ordinal) => self.selector.get(ordinal),
            None => false,
        }
    }
}

/// Matches indices whose text attribute equals `target`. A `None` target matches absent values.
#[derive(Clone, Debug)]
pub struct TextFilter<'s> {
    container: ContainerId,
    values: &'s Store<String>,
    target: Option<String>,
}

impl<'s> TextFilter<'s> {
    pub fn new(container: ContainerId, values: &'s Store<String>, target: Option<String>) -> Self {
        Self {
            container,
            values,
            target,
        }
    }
}

impl Filter for TextFilter<'_> {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, index: usize) -> bool {
        self.values.value(index).map(String::as_str) == self.target.as_deref()
    }
}

/// Matches indices strictly greater than `threshold`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntGreaterThanFilter {
    container: ContainerId,
    threshold: usize,
}

impl IntGreaterThanFilter {
    pub fn new(container: ContainerId, threshold: usize) -> Self {
        Self {
            container,
            threshold,
        }
    }
}

impl Filter for IntGreaterThanFilter {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, index: usize) -> bool {
        index > self.threshold
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoMatchFilter {
    container: ContainerId,
}

impl NoMatchFilter {
    pub fn new(container: ContainerId) -> Self {
        Self { container }
    }
}

impl Filter for NoMatchFilter {
    fn container(&self) -> ContainerId {
        self.container
    }

    fn is_match(&self, _index: usize) -> bool {
        false
    }
}

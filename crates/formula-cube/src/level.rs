use crate::bitvec::BitVec;
use crate::container::{next_generation, AttributeContainer, ContainerId};
use crate::element::LevelKey;
use crate::error::{CubeError, CubeResult};
use crate::filter::{ElementFilter, FilterRef};
use crate::store::{AttributeStore, Store, StoreType};
use std::collections::HashMap;

/// A level of a dimension: a set of members with a unique name per member (the identity
/// attribute) and one ordinal parent-link store per ancestor level it is linked to.
///
/// Every mutation refreshes the level's generation stamp, which derived caches (intersection
/// projections) compare against to detect staleness.
#[derive(Debug)]
pub struct HierarchyLevel {
    container: AttributeContainer,
    dimension: String,
    identity_attribute: String,
    identity_index: HashMap<String, usize>,
    generation: u64,
}

impl HierarchyLevel {
    /// Level whose identity attribute is named after the level itself.
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        let name = name.into();
        let identity = name.clone();
        Self::with_identity_attribute(name, dimension, identity)
    }

    pub fn with_identity_attribute(
        name: impl Into<String>,
        dimension: impl Into<String>,
        identity_attribute: impl Into<String>,
    ) -> Self {
        let identity_attribute = identity_attribute.into();
        let container = AttributeContainer::with_attribute(
            name,
            identity_attribute.clone(),
            AttributeStore::Text(Store::new()),
        );
        Self {
            container,
            dimension: dimension.into(),
            identity_attribute,
            identity_index: HashMap::new(),
            generation: next_generation(),
        }
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn key(&self) -> LevelKey {
        LevelKey::new(self.dimension.clone(), self.name())
    }

    pub fn id(&self) -> ContainerId {
        self.container.id()
    }

    pub fn identity_attribute(&self) -> &str {
        &self.identity_attribute
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn member_count(&self) -> usize {
        self.container.member_count()
    }

    pub fn container(&self) -> &AttributeContainer {
        &self.container
    }

    /// Mutable access to the underlying attribute stores. Member names must still be changed
    /// through [`HierarchyLevel::add_member`] / [`HierarchyLevel::set_member_at`] so the name
    /// index stays in sync.
    pub fn container_mut(&mut self) -> &mut AttributeContainer {
        self.touch();
        &mut self.container
    }

    fn touch(&mut self) {
        self.generation = next_generation();
    }

    /// Append a member and return its ordinal.
    pub fn add_member(&mut self, name: impl Into<String>) -> CubeResult<usize> {
        let name = name.into();
        if self.identity_index.contains_key(&name) {
            return Err(CubeError::DuplicateMember {
                level: self.name().to_string(),
                member: name,
            });
        }
        let ordinal = self.member_count();
        self.touch();
        let store = self.container.text_store_mut(&self.identity_attribute)?;
        store.set(ordinal, Some(name.clone()));
        self.identity_index.insert(name, ordinal);
        Ok(ordinal)
    }

    /// Rename the member at `ordinal`, returning its previous name. Renaming to the name the
    /// member already has is allowed.
    pub fn set_member_at(
        &mut self,
        ordinal: usize,
        name: impl Into<String>,
    ) -> CubeResult<Option<String>> {
        let name = name.into();
        if let Some(&existing) = self.identity_index.get(&name) {
            if existing != ordinal {
                return Err(CubeError::DuplicateMember {
                    level: self.name().to_string(),
                    member: name,
                });
            }
        }
        self.touch();
        let store = self.container.text_store_mut(&self.identity_attribute)?;
        let previous = store.set(ordinal, Some(name.clone()));
        if let Some(previous) = &previous {
            self.identity_index.remove(previous);
        }
        self.identity_index.insert(name, ordinal);
        Ok(previous)
    }

    /// Ordinal of the member with the given name.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.identity_index.get(name).copied()
    }

    pub fn member_name(&self, ordinal: usize) -> Option<&str> {
        self.container
            .text_store(&self.identity_attribute)
            .ok()
            .and_then(|store| store.value(ordinal))
            .map(String::as_str)
    }

    /// Grow every store (identity included) to at least `size` members.
    pub fn ensure_size(&mut self, size: usize) -> usize {
        self.touch();
        self.container.ensure_size(size)
    }

    /// Add an ordinal store linking members to `parent` level ordinals.
    pub fn add_parent_attribute(&mut self, parent: &str) -> CubeResult<()> {
        self.touch();
        self.container.add_attribute(parent, StoreType::Ordinal)
    }

    pub fn has_parent_link(&self, parent: &str) -> bool {
        matches!(self.container.ordinal_store(parent), Ok(_))
    }

    pub fn parent_link(&self, parent: &str) -> CubeResult<&Store<usize>> {
        self.container
            .ordinal_store(parent)
            .map_err(|_| CubeError::MissingParentLink {
                level: self.name().to_string(),
                parent: parent.to_string(),
            })
    }

    /// Link member `ordinal` to `parent_ordinal` in level `parent` (or unlink it with `None`).
    /// Returns the previous link.
    pub fn set_parent(
        &mut self,
        ordinal: usize,
        parent: &str,
        parent_ordinal: Option<usize>,
    ) -> CubeResult<Option<usize>> {
        if !self.has_parent_link(parent) {
            return Err(CubeError::MissingParentLink {
                level: self.name().to_string(),
                parent: parent.to_string(),
            });
        }
        self.touch();
        let store = self.container.ordinal_store_mut(parent)?;
        Ok(store.set(ordinal, parent_ordinal))
    }

    pub fn element_filter(&self, ordinal: usize) -> ElementFilter {
        ElementFilter::new(self.id(), ordinal)
    }

    pub fn selector(&self, filters: &[FilterRef<'_>]) -> BitVec {
        self.container.selector(filters)
    }

    pub fn parent_selector(
        &self,
        filters: &[FilterRef<'_>],
        parent: &HierarchyLevel,
    ) -> CubeResult<BitVec> {
        if !self.has_parent_link(parent.name()) {
            return Err(CubeError::MissingParentLink {
                level: self.name().to_string(),
                parent: parent.name().to_string(),
            });
        }
        self.container
            .parent_selector(filters, parent.name(), parent.member_count())
    }
}

use crate::aggregator::Aggregator;
use crate::bitvec::BitVec;
use crate::cartesian;
use crate::container::{next_generation, AttributeContainer, ContainerId};
use crate::cube::CubeDs;
use crate::dimension::Dimension;
use crate::element::{LevelKey, LevelMemberTuple};
use crate::error::{CubeError, CubeResult};
use crate::filter::FilterRef;
use crate::level::HierarchyLevel;
use crate::store::{Store, StoreType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tuning knobs for an [`Intersection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntersectionOptions {
    /// Cache per-level projections computed by
    /// [`Intersection::target_aggregation_inds`].
    pub cache_projections: bool,
    /// Expected number of items; reserves room in the related-level stores up front.
    pub capacity: Option<usize>,
}

impl Default for IntersectionOptions {
    fn default() -> Self {
        Self {
            cache_projections: true,
            capacity: None,
        }
    }
}

#[derive(Debug)]
struct CachedProjection {
    stamp: Vec<u64>,
    inds: Arc<[Option<usize>]>,
}

/// A set of items, each keyed by a tuple of member ordinals on its related levels (one related
/// level per dimension).
///
/// The tuple of related-level ordinals is unique across items. Lookups pack the tuple into a
/// single mixed-radix key using the related levels' cardinalities as recorded at the last key
/// rebuild; once a related level grows past its recorded cardinality the key index must be rebuilt
/// ([`CubeDs::recalculate_lookup_keys`], or the automatic refresh in [`CubeDs::lookup`]).
#[derive(Debug)]
pub struct Intersection {
    container: AttributeContainer,
    related: Vec<LevelKey>,
    primary_dimensions: usize,
    cardinalities: Vec<usize>,
    weights: Vec<u64>,
    tuple_index: HashMap<u64, usize>,
    keys_stale: bool,
    generation: u64,
    projections: Mutex<HashMap<LevelKey, CachedProjection>>,
    options: IntersectionOptions,
}

impl Intersection {
    pub fn new(name: impl Into<String>, levels: &[&HierarchyLevel]) -> CubeResult<Self> {
        Self::with_options(name, levels, IntersectionOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        levels: &[&HierarchyLevel],
        options: IntersectionOptions,
    ) -> CubeResult<Self> {
        let name = name.into();
        if levels.is_empty() {
            return Err(CubeError::InvalidTuple(format!(
                "intersection {name} needs at least one related level"
            )));
        }
        let mut intersection = Self {
            container: AttributeContainer::new(name),
            related: Vec::with_capacity(levels.len()),
            primary_dimensions: levels.len(),
            cardinalities: Vec::with_capacity(levels.len()),
            weights: Vec::new(),
            tuple_index: HashMap::new(),
            keys_stale: false,
            generation: next_generation(),
            projections: Mutex::new(HashMap::new()),
            options,
        };
        for level in levels {
            intersection.push_related(level)?;
        }
        intersection.weights = cartesian::unit_poly(&intersection.cardinalities);
        Ok(intersection)
    }

    fn push_related(&mut self, level: &HierarchyLevel) -> CubeResult<()> {
        if self.related_level(level.dimension()).is_some() {
            return Err(CubeError::DuplicateRelatedDimension {
                intersection: self.name().to_string(),
                dimension: level.dimension().to_string(),
            });
        }
        self.container.add_attribute(level.name(), StoreType::Ordinal)?;
        if let Some(capacity) = self.options.capacity {
            self.container
                .ordinal_store_mut(level.name())?
                .reserve(capacity);
        }
        self.related.push(level.key());
        self.cardinalities.push(level.member_count());
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn id(&self) -> ContainerId {
        self.container.id()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn options(&self) -> &IntersectionOptions {
        &self.options
    }

    /// Number of items.
    pub fn size(&self) -> usize {
        self.container.member_count()
    }

    pub fn container(&self) -> &AttributeContainer {
        &self.container
    }

    /// Mutable access to the attribute stores. Writing to a related-level store through this
    /// marks the key index stale until the next rebuild.
    pub fn container_mut(&mut self) -> &mut AttributeContainer {
        self.touch();
        self.keys_stale = true;
        &mut self.container
    }

    /// Add a measure (or any other non-key) attribute.
    pub fn add_attribute(&mut self, attribute: &str, store_type: StoreType) -> CubeResult<()> {
        self.touch();
        self.container.add_attribute(attribute, store_type)
    }

    fn touch(&mut self) {
        self.generation = next_generation();
    }

    /// Related levels in tuple order.
    pub fn related_levels(&self) -> &[LevelKey] {
        &self.related
    }

    /// The levels given at construction; their dimensions cannot be removed from the cube while
    /// this intersection exists.
    pub fn primary_key_levels(&self) -> &[LevelKey] {
        &self.related[..self.primary_dimensions]
    }

    pub fn is_primary_dimension(&self, dimension: &str) -> bool {
        self.primary_key_levels()
            .iter()
            .any(|k| k.dimension == dimension)
    }

    /// Name of the level this intersection relates to in `dimension`.
    pub fn related_level(&self, dimension: &str) -> Option<&str> {
        self.related
            .iter()
            .find(|k| k.dimension == dimension)
            .map(|k| k.level.as_str())
    }

    /// Per-item ordinals of the related level for `dimension`.
    pub fn related_store(&self, dimension: &str) -> CubeResult<&Store<usize>> {
        let level = self
            .related_level(dimension)
            .ok_or_else(|| CubeError::UnknownLevel {
                dimension: dimension.to_string(),
                level: format!("<related to {}>", self.name()),
            })?;
        self.container.ordinal_store(level)
    }

    /// Related-level cardinalities recorded at the last key rebuild.
    pub fn cardinalities(&self) -> &[usize] {
        &self.cardinalities
    }

    /// True when the key index no longer reflects the related-level stores.
    pub fn keys_stale(&self) -> bool {
        self.keys_stale
    }

    /// Relate a further level (from a dimension not yet related). Existing items get no ordinal
    /// for it, and the key index is stale until rebuilt.
    pub fn add_related_level(&mut self, level: &HierarchyLevel) -> CubeResult<()> {
        self.push_related(level)?;
        let size = self.size();
        self.container.ordinal_store_mut(level.name())?.ensure_size(size);
        self.weights = cartesian::unit_poly(&self.cardinalities);
        self.keys_stale = true;
        self.touch();
        self.clear_level_mapping_cache();
        Ok(())
    }

    /// Drop the related level of `dimension` and its store, then rebuild the key index over the
    /// remaining levels.
    pub fn remove_related_level(&mut self, dimension: &str) -> CubeResult<()> {
        if self.is_primary_dimension(dimension) {
            return Err(CubeError::PrimaryDimensionInUse {
                dimension: dimension.to_string(),
                intersection: self.name().to_string(),
            });
        }
        let Some(pos) = self.related.iter().position(|k| k.dimension == dimension) else {
            return Ok(());
        };
        let key = self.related.remove(pos);
        self.cardinalities.remove(pos);
        self.container.remove_attribute(&key.level);
        let cardinalities = self.cardinalities.clone();
        self.rebuild_keys(cardinalities)?;
        self.clear_level_mapping_cache();
        Ok(())
    }

    fn check_arity(&self, tuple: &[usize]) -> CubeResult<()> {
        if tuple.len() != self.related.len() {
            return Err(CubeError::TupleArity {
                intersection: self.name().to_string(),
                expected: self.related.len(),
                actual: tuple.len(),
            });
        }
        Ok(())
    }

    fn check_range(&self, tuple: &[usize]) -> CubeResult<()> {
        for (k, (&ordinal, &cardinality)) in tuple.iter().zip(&self.cardinalities).enumerate() {
            if ordinal >= cardinality {
                return Err(CubeError::OrdinalOutOfRange {
                    container: self.related[k].to_string(),
                    ordinal,
                    len: cardinality,
                });
            }
        }
        Ok(())
    }

    fn pack(&self, tuple: &[usize]) -> CubeResult<u64> {
        if !cartesian::check_dimensionality(&self.cardinalities) {
            return Err(CubeError::CartesianOverflow {
                cardinalities: self.cardinalities.clone(),
            });
        }
        Ok(cartesian::pack_unchecked(&self.weights, tuple))
    }

    /// Position of the item keyed by `tuple` (one ordinal per related level, in tuple order).
    ///
    /// Ordinals beyond the recorded cardinalities cannot be keyed yet and yield `None`.
    pub fn lookup(&self, tuple: &[usize]) -> CubeResult<Option<usize>> {
        self.check_arity(tuple)?;
        if self.keys_stale {
            return Err(CubeError::StaleLookupKeys {
                intersection: self.name().to_string(),
            });
        }
        if self.check_range(tuple).is_err() {
            return Ok(None);
        }
        let key = self.pack(tuple)?;
        Ok(self.tuple_index.get(&key).copied())
    }

    /// Position of the item keyed by `tuple`, appending a new item when there is none.
    pub fn lookup_or_add(&mut self, tuple: &[usize]) -> CubeResult<usize> {
        if let Some(index) = self.lookup(tuple)? {
            return Ok(index);
        }
        self.check_range(tuple)?;
        let key = self.pack(tuple)?;
        let index = self.next_item_index()?;
        self.write_key(index, tuple)?;
        self.tuple_index.insert(key, index);
        Ok(index)
    }

    /// Write `tuple` as the key of item `index`, replacing whatever key the item had.
    ///
    /// Fails with [`CubeError::DuplicateTuple`] when another item already holds `tuple`; the
    /// item keeps its current key in that case.
    pub fn add_key(&mut self, index: usize, tuple: &[usize]) -> CubeResult<usize> {
        self.check_arity(tuple)?;
        if self.keys_stale {
            return Err(CubeError::StaleLookupKeys {
                intersection: self.name().to_string(),
            });
        }
        self.check_range(tuple)?;
        let key = self.pack(tuple)?;
        if let Some(&existing) = self.tuple_index.get(&key) {
            if existing != index {
                return Err(CubeError::DuplicateTuple {
                    intersection: self.name().to_string(),
                    tuple: tuple.to_vec(),
                    existing,
                });
            }
        }
        if let Some(previous) = self.key(index).ok().flatten() {
            let previous = cartesian::pack_unchecked(&self.weights, &previous);
            if self.tuple_index.get(&previous) == Some(&index) {
                self.tuple_index.remove(&previous);
            }
        }
        self.write_key(index, tuple)?;
        self.tuple_index.insert(key, index);
        Ok(index)
    }

    /// Key tuple of item `index`; `None` when any related ordinal is absent.
    pub fn key(&self, index: usize) -> CubeResult<Option<Vec<usize>>> {
        if index >= self.size() {
            return Err(CubeError::OrdinalOutOfRange {
                container: self.name().to_string(),
                ordinal: index,
                len: self.size(),
            });
        }
        let mut tuple = Vec::with_capacity(self.related.len());
        for key in &self.related {
            match self.container.ordinal_store(&key.level)?.value(index) {
                Some(&ordinal) => tuple.push(ordinal),
                None => return Ok(None),
            }
        }
        Ok(Some(tuple))
    }

    fn next_item_index(&self) -> CubeResult<usize> {
        let mut next = 0;
        for key in &self.related {
            next = next.max(self.container.ordinal_store(&key.level)?.len());
        }
        Ok(next)
    }

    fn write_key(&mut self, index: usize, tuple: &[usize]) -> CubeResult<()> {
        for (k, &ordinal) in tuple.iter().enumerate() {
            let level = self.related[k].level.clone();
            self.container
                .ordinal_store_mut(&level)?
                .set(index, Some(ordinal));
        }
        self.touch();
        Ok(())
    }

    /// Rebuild the key index against new related-level cardinalities (one per related level, in
    /// tuple order).
    pub fn recalculate_lookup_keys(&mut self, cardinalities: &[usize]) -> CubeResult<()> {
        if cardinalities.len() != self.related.len() {
            return Err(CubeError::TupleArity {
                intersection: self.name().to_string(),
                expected: self.related.len(),
                actual: cardinalities.len(),
            });
        }
        self.rebuild_keys(cardinalities.to_vec())
    }

    /// [`Intersection::recalculate_lookup_keys`] plus dropping every cached projection.
    pub fn update_cache_and_mappings(&mut self, cardinalities: &[usize]) -> CubeResult<()> {
        self.recalculate_lookup_keys(cardinalities)?;
        self.clear_level_mapping_cache();
        Ok(())
    }

    fn rebuild_keys(&mut self, cardinalities: Vec<usize>) -> CubeResult<()> {
        if !cartesian::check_dimensionality(&cardinalities) {
            return Err(CubeError::CartesianOverflow { cardinalities });
        }
        self.weights = cartesian::unit_poly(&cardinalities);
        self.cardinalities = cardinalities;
        self.tuple_index.clear();

        let mut unkeyed = 0usize;
        for index in 0..self.size() {
            match self.key(index)? {
                Some(tuple) if self.check_range(&tuple).is_ok() => {
                    let key = cartesian::pack_unchecked(&self.weights, &tuple);
                    self.tuple_index.insert(key, index);
                }
                _ => unkeyed += 1,
            }
        }
        if unkeyed > 0 {
            log::warn!(
                "intersection {}: {unkeyed} items have absent or out-of-range related ordinals and are not keyed",
                self.name()
            );
        }
        log::debug!(
            "intersection {}: rebuilt {} lookup keys for cardinalities {:?}",
            self.name(),
            self.tuple_index.len(),
            self.cardinalities
        );
        self.keys_stale = false;
        self.touch();
        Ok(())
    }

    fn projections(&self) -> MutexGuard<'_, HashMap<LevelKey, CachedProjection>> {
        match self.projections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn clear_level_mapping_cache(&self) {
        self.projections().clear();
    }

    /// Number of cached per-level projections.
    pub fn cached_projection_count(&self) -> usize {
        self.projections().len()
    }

    /// Bit vector of the items matching all `filters` (every item when `filters` is empty).
    pub fn composite_filter(&self, filters: &[FilterRef<'_>]) -> BitVec {
        self.container.selector(filters)
    }

    pub fn aggregate(&self, filters: &[FilterRef<'_>], aggregators: &mut [&mut dyn Aggregator]) {
        self.container.aggregate(filters, aggregators);
    }

    /// For every member of this intersection's related level in `dimension`, the ordinal of its
    /// ancestor at `upper` in `hierarchy` (the default hierarchy when `None`).
    ///
    /// `None` when the intersection has no related level in `dimension`, or `upper` is not at or
    /// above it in the hierarchy.
    pub fn project_to_intersection(
        &self,
        dimension: &Dimension,
        hierarchy: Option<&str>,
        upper: &str,
    ) -> CubeResult<Option<Vec<Option<usize>>>> {
        let hierarchy = match hierarchy {
            Some(name) => dimension.hierarchy(name)?,
            None => dimension.default_hierarchy()?,
        };
        let Some(related) = self.related_level(dimension.name()) else {
            return Ok(None);
        };
        match (hierarchy.position(upper), hierarchy.position(related)) {
            (Some(u), Some(r)) if u <= r => {
                Ok(Some(dimension.level_mapping(hierarchy.name(), upper, related)?))
            }
            _ => Ok(None),
        }
    }

    /// For every item, the ordinal of the member of `level` (in `dimension`'s default hierarchy)
    /// it rolls up to; `None` everywhere when `level` is not at or above the related level.
    ///
    /// Results are cached per level and stamped with the generations of every level on the
    /// projection path and of the intersection itself, so a cached entry is recomputed as soon as
    /// any of them changes.
    pub fn target_aggregation_inds(
        &self,
        dimension: &Dimension,
        level: &str,
    ) -> CubeResult<Arc<[Option<usize>]>> {
        let size = self.size();
        let unmapped = || -> Arc<[Option<usize>]> { vec![None; size].into() };
        let Some(related) = self.related_level(dimension.name()) else {
            return Ok(unmapped());
        };
        let hierarchy = dimension.default_hierarchy()?;
        let (upper, lower) = match (hierarchy.position(level), hierarchy.position(related)) {
            (Some(u), Some(r)) if u <= r => (u, r),
            _ => return Ok(unmapped()),
        };

        let key = LevelKey::new(dimension.name(), level);
        let mut stamp = Vec::with_capacity(lower - upper + 2);
        for name in &hierarchy.levels()[upper..=lower] {
            stamp.push(dimension.level(name)?.generation());
        }
        stamp.push(self.generation);

        if self.options.cache_projections {
            if let Some(cached) = self.projections().get(&key) {
                if cached.stamp == stamp {
                    return Ok(Arc::clone(&cached.inds));
                }
                log::debug!(
                    "intersection {}: cached projection to {key} is stale, recomputing",
                    self.name()
                );
            }
        }

        let mapping = dimension.level_mapping(hierarchy.name(), level, related)?;
        let related_store = self.container.ordinal_store(related)?;
        let inds: Arc<[Option<usize>]> = (0..size)
            .map(|i| {
                related_store
                    .value(i)
                    .and_then(|&r| mapping.get(r).copied().flatten())
            })
            .collect();

        if self.options.cache_projections {
            self.projections().insert(
                key,
                CachedProjection {
                    stamp,
                    inds: Arc::clone(&inds),
                },
            );
        }
        Ok(inds)
    }

    /// Items descending from every member of `tuple` (AND across dimensions). Empty tuples, and
    /// members whose dimension does not reach this intersection, select nothing.
    pub fn tuple_shadow(&self, cube: &CubeDs, tuple: &LevelMemberTuple) -> CubeResult<BitVec> {
        let size = self.size();
        let mut shadow: Option<BitVec> = None;
        for member in tuple.members() {
            let dimension = cube.dimension(member.dimension())?;
            let level = dimension.level(&member.level.level)?;
            let inds = self.target_aggregation_inds(dimension, level.name())?;
            if inds.iter().all(Option::is_none) {
                return Ok(BitVec::with_len_all_false(size));
            }
            let selected = BitVec::from_indices(level.member_count(), [member.ordinal]);
            let projected = selected.gather(&inds);
            shadow = Some(match shadow {
                Some(mut acc) => {
                    acc.and_inplace(&projected);
                    acc
                }
                None => projected,
            });
        }
        Ok(shadow.unwrap_or_else(|| BitVec::with_len_all_false(size)))
    }

    /// Approximate heap footprint of all attribute values in bytes.
    pub fn data_size(&self) -> usize {
        self.container.data_size()
    }
}

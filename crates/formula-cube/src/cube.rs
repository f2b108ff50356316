use crate::aggregator::Aggregator;
use crate::bitvec::BitVec;
use crate::container::ContainerId;
use crate::dimension::Dimension;
use crate::element::{LevelKey, LevelMemberTuple};
use crate::error::{CubeError, CubeResult};
use crate::filter::{AttributeSetFilter, FilterRef, LevelFilter, TextFilter};
use crate::intersection::{Intersection, IntersectionOptions};
use crate::level::HierarchyLevel;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of dimensions and intersections, and the entry point for multi-dimensional
/// aggregation.
#[derive(Debug, Default)]
pub struct CubeDs {
    dimensions: HashMap<String, Dimension>,
    intersections: HashMap<String, Intersection>,
}

impl CubeDs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dimension(&mut self, dimension: Dimension) -> CubeResult<&mut Dimension> {
        let name = dimension.name().to_string();
        if self.dimensions.contains_key(&name) {
            return Err(CubeError::DuplicateDimension(name));
        }
        Ok(self.dimensions.entry(name).or_insert(dimension))
    }

    pub fn dimension(&self, name: &str) -> CubeResult<&Dimension> {
        self.dimensions
            .get(name)
            .ok_or_else(|| CubeError::UnknownDimension(name.to_string()))
    }

    pub fn dimension_mut(&mut self, name: &str) -> CubeResult<&mut Dimension> {
        self.dimensions
            .get_mut(name)
            .ok_or_else(|| CubeError::UnknownDimension(name.to_string()))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> + '_ {
        self.dimensions.values()
    }

    /// Dimension names in lexical order.
    pub fn dimension_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dimensions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Remove a dimension, dropping it from every intersection that relates to it.
    ///
    /// Fails when the dimension is part of any intersection's primary key. Removing an unknown
    /// dimension is a no-op.
    pub fn remove_dimension(&mut self, name: &str) -> CubeResult<Option<Dimension>> {
        if !self.dimensions.contains_key(name) {
            return Ok(None);
        }
        if let Some(intersection) = self
            .intersections
            .values()
            .find(|i| i.is_primary_dimension(name))
        {
            return Err(CubeError::PrimaryDimensionInUse {
                dimension: name.to_string(),
                intersection: intersection.name().to_string(),
            });
        }
        for intersection in self.intersections.values_mut() {
            intersection.remove_related_level(name)?;
        }
        log::debug!("removed dimension {name}");
        Ok(self.dimensions.remove(name))
    }

    /// The level any dimension owns under container handle `id`.
    pub fn level_by_container(&self, id: ContainerId) -> Option<&HierarchyLevel> {
        self.dimensions
            .values()
            .find_map(|d| d.level_by_container(id))
    }

    pub fn level(&self, key: &LevelKey) -> CubeResult<&HierarchyLevel> {
        self.dimension(&key.dimension)?.level(&key.level)
    }

    /// Name of each dimension's default hierarchy; dimensions without one are left out.
    pub fn default_hierarchies(&self) -> HashMap<String, String> {
        self.dimensions
            .values()
            .filter_map(|d| {
                d.default_hierarchy()
                    .ok()
                    .map(|h| (d.name().to_string(), h.name().to_string()))
            })
            .collect()
    }

    /// Create an intersection related to the given `(dimension, level)` pairs, in tuple order.
    pub fn add_intersection(
        &mut self,
        name: &str,
        levels: &[(&str, &str)],
    ) -> CubeResult<&mut Intersection> {
        self.add_intersection_with_options(name, levels, IntersectionOptions::default())
    }

    pub fn add_intersection_with_options(
        &mut self,
        name: &str,
        levels: &[(&str, &str)],
        options: IntersectionOptions,
    ) -> CubeResult<&mut Intersection> {
        if self.intersections.contains_key(name) {
            return Err(CubeError::DuplicateIntersection(name.to_string()));
        }
        let mut related = Vec::with_capacity(levels.len());
        for (dimension, level) in levels {
            related.push(self.dimension(dimension)?.level(level)?);
        }
        let intersection = Intersection::with_options(name, &related, options)?;
        Ok(self
            .intersections
            .entry(name.to_string())
            .or_insert(intersection))
    }

    pub fn intersection(&self, name: &str) -> CubeResult<&Intersection> {
        self.intersections
            .get(name)
            .ok_or_else(|| CubeError::UnknownIntersection(name.to_string()))
    }

    pub fn intersection_mut(&mut self, name: &str) -> CubeResult<&mut Intersection> {
        self.intersections
            .get_mut(name)
            .ok_or_else(|| CubeError::UnknownIntersection(name.to_string()))
    }

    pub fn intersections(&self) -> impl Iterator<Item = &Intersection> + '_ {
        self.intersections.values()
    }

    pub fn intersection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.intersections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn remove_intersection(&mut self, name: &str) -> Option<Intersection> {
        self.intersections.remove(name)
    }

    /// Relate `intersection` to a level of a dimension it does not reference yet.
    pub fn add_related_level(
        &mut self,
        intersection: &str,
        dimension: &str,
        level: &str,
    ) -> CubeResult<()> {
        let level = self
            .dimensions
            .get(dimension)
            .ok_or_else(|| CubeError::UnknownDimension(dimension.to_string()))?
            .level(level)?;
        let target = self
            .intersections
            .get_mut(intersection)
            .ok_or_else(|| CubeError::UnknownIntersection(intersection.to_string()))?;
        target.add_related_level(level)
    }

    /// Current member counts of `intersection`'s related levels, in tuple order.
    pub fn related_cardinalities(&self, intersection: &str) -> CubeResult<Vec<usize>> {
        self.intersection(intersection)?
            .related_levels()
            .iter()
            .map(|key| self.level(key).map(HierarchyLevel::member_count))
            .collect()
    }

    fn refresh_if_stale(&mut self, intersection: &str) -> CubeResult<()> {
        let cardinalities = self.related_cardinalities(intersection)?;
        let target = self.intersection_mut(intersection)?;
        if target.keys_stale() || target.cardinalities() != cardinalities.as_slice() {
            log::debug!(
                "intersection {intersection}: related level sizes changed from {:?} to {cardinalities:?}",
                target.cardinalities()
            );
            target.recalculate_lookup_keys(&cardinalities)?;
        }
        Ok(())
    }

    /// Position of the item keyed by `tuple`, rebuilding the key index first if a related level
    /// changed size since the last rebuild.
    pub fn lookup(&mut self, intersection: &str, tuple: &[usize]) -> CubeResult<Option<usize>> {
        self.refresh_if_stale(intersection)?;
        self.intersection(intersection)?.lookup(tuple)
    }

    pub fn lookup_or_add(&mut self, intersection: &str, tuple: &[usize]) -> CubeResult<usize> {
        self.refresh_if_stale(intersection)?;
        self.intersection_mut(intersection)?.lookup_or_add(tuple)
    }

    /// Re-key item `index` of `intersection` to `tuple`, refreshing stale keys first. A tuple
    /// already held by another item is rejected with [`CubeError::DuplicateTuple`].
    pub fn add_key(&mut self, intersection: &str, index: usize, tuple: &[usize]) -> CubeResult<usize> {
        self.refresh_if_stale(intersection)?;
        self.intersection_mut(intersection)?.add_key(index, tuple)
    }

    /// Rebuild the key index of `intersection` against the current related-level sizes.
    pub fn recalculate_lookup_keys(&mut self, intersection: &str) -> CubeResult<()> {
        let cardinalities = self.related_cardinalities(intersection)?;
        self.intersection_mut(intersection)?
            .recalculate_lookup_keys(&cardinalities)
    }

    /// Rebuild the key index and drop cached projections of `intersection`.
    pub fn update_cache_and_mappings(&mut self, intersection: &str) -> CubeResult<()> {
        let cardinalities = self.related_cardinalities(intersection)?;
        self.intersection_mut(intersection)?
            .update_cache_and_mappings(&cardinalities)
    }

    pub fn target_aggregation_inds(
        &self,
        intersection: &str,
        level: &LevelKey,
    ) -> CubeResult<Arc<[Option<usize>]>> {
        let dimension = self.dimension(&level.dimension)?;
        dimension.level(&level.level)?;
        self.intersection(intersection)?
            .target_aggregation_inds(dimension, &level.level)
    }

    pub fn tuple_shadow(&self, intersection: &str, tuple: &LevelMemberTuple) -> CubeResult<BitVec> {
        self.intersection(intersection)?.tuple_shadow(self, tuple)
    }

    /// Aggregate the items of `intersection` matching all `filters`.
    ///
    /// Filters on levels are grouped per dimension and resolved into a selector on the
    /// intersection's related level of that dimension (using the hierarchy named in
    /// `hierarchies`, or the dimension's default hierarchy). Filters on dimensions the
    /// intersection is not related to have no effect. If any dimension selects nothing, no
    /// aggregator is called. Filters scoped to the intersection itself are applied as they are.
    pub fn aggregate<'a>(
        &'a self,
        hierarchies: &HashMap<String, String>,
        intersection: &str,
        aggregators: &mut [&mut dyn Aggregator],
        filters: &[FilterRef<'a>],
    ) -> CubeResult<()> {
        let target = self.intersection(intersection)?;

        let mut native: Vec<FilterRef<'a>> = Vec::new();
        let mut per_dimension: Vec<(&'a str, Vec<FilterRef<'a>>)> = Vec::new();
        for filter in filters {
            if filter.container() == target.id() {
                native.push(Arc::clone(filter));
                continue;
            }
            let Some(level) = self.level_by_container(filter.container()) else {
                return Err(CubeError::UnknownFilterContainer(filter.container()));
            };
            match per_dimension
                .iter_mut()
                .find(|(d, _)| *d == level.dimension())
            {
                Some((_, group)) => group.push(Arc::clone(filter)),
                None => per_dimension.push((level.dimension(), vec![Arc::clone(filter)])),
            }
        }

        let mut combined: Vec<FilterRef<'a>> = Vec::with_capacity(per_dimension.len() + native.len());
        for (dimension_name, dimension_filters) in per_dimension {
            let Some(related) = target.related_level(dimension_name) else {
                log::debug!(
                    "{intersection}: ignoring {} filters on unrelated dimension {dimension_name}",
                    dimension_filters.len()
                );
                continue;
            };
            let dimension = self.dimension(dimension_name)?;
            let hierarchy = match hierarchies.get(dimension_name) {
                Some(name) => name.as_str(),
                None => dimension.default_hierarchy()?.name(),
            };
            let selected = dimension.selector(hierarchy, related, &dimension_filters, false)?;
            if !selected.any() {
                log::debug!(
                    "{intersection}: no {related} member of {dimension_name} matches, nothing to aggregate"
                );
                return Ok(());
            }
            combined.push(Arc::new(AttributeSetFilter::new(
                target.id(),
                target.related_store(dimension_name)?,
                selected,
            )));
        }
        combined.extend(native);

        target.aggregate(&combined, aggregators);
        Ok(())
    }

    /// Aggregate every item of `intersection`.
    pub fn aggregate_all(
        &self,
        intersection: &str,
        aggregators: &mut [&mut dyn Aggregator],
    ) -> CubeResult<()> {
        self.intersection(intersection)?.aggregate(&[], aggregators);
        Ok(())
    }

    /// Aggregate the immediate children (in `hierarchy`) of the `parent_level` members whose text
    /// attribute `parent_attribute` equals `parent_value`.
    ///
    /// `filters` may be scoped to any level of the hierarchy; filters below the child level keep a
    /// child when any of its descendants match. A leaf parent level has no children and
    /// aggregates nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate_children<'a>(
        &'a self,
        dimension: &str,
        hierarchy: &str,
        parent_level: &str,
        parent_attribute: &str,
        parent_value: &str,
        aggregators: &mut [&mut dyn Aggregator],
        filters: &[FilterRef<'a>],
    ) -> CubeResult<()> {
        let dimension = self.dimension(dimension)?;
        let levels = dimension.hierarchy(hierarchy)?.levels();
        let pos = levels
            .iter()
            .position(|l| l == parent_level)
            .ok_or_else(|| CubeError::LevelNotInHierarchy {
                level: parent_level.to_string(),
                hierarchy: hierarchy.to_string(),
            })?;
        let Some(child_name) = levels.get(pos + 1) else {
            return Ok(());
        };

        let parent = dimension.level(parent_level)?;
        let child = dimension.level(child_name)?;
        let mut all_filters: Vec<FilterRef<'a>> = filters.to_vec();
        all_filters.push(Arc::new(TextFilter::new(
            parent.id(),
            parent.container().text_store(parent_attribute)?,
            Some(parent_value.to_string()),
        )));
        let selected = dimension.selector(hierarchy, child.name(), &all_filters, true)?;
        let children: [FilterRef<'a>; 1] = [Arc::new(LevelFilter::new(child.id(), selected))];
        child.container().aggregate(&children, aggregators);
        Ok(())
    }
}

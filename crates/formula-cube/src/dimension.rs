use crate::aggregator::ShadowAggregator;
use crate::bitvec::BitVec;
use crate::container::ContainerId;
use crate::cube::CubeDs;
use crate::element::{Element, LevelKey, LevelMember, LevelMemberInfo, LevelMemberTuple};
use crate::error::{CubeError, CubeResult};
use crate::filter::{AttributeSetFilter, ElementFilter, FilterRef, LevelFilter};
use crate::level::HierarchyLevel;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Ordered list of level names, top level first and leaf level last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    name: String,
    levels: Vec<String>,
}

impl Hierarchy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Depth of `level` in this hierarchy (0 = top).
    pub fn position(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A named set of levels plus the hierarchies declared over them.
///
/// The first hierarchy declared is the dimension's default hierarchy; it is the one used when an
/// operation does not name a hierarchy explicitly (projections onto intersections, child member
/// enumeration).
#[derive(Debug)]
pub struct Dimension {
    name: String,
    levels: Vec<HierarchyLevel>,
    hierarchies: Vec<Hierarchy>,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            levels: Vec::new(),
            hierarchies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_level(&mut self, level: HierarchyLevel) -> CubeResult<&mut HierarchyLevel> {
        if level.dimension() != self.name {
            return Err(CubeError::DimensionMismatch {
                expected: self.name.clone(),
                actual: level.dimension().to_string(),
            });
        }
        if self.levels.iter().any(|l| l.name() == level.name()) {
            return Err(CubeError::DuplicateLevel {
                dimension: self.name.clone(),
                level: level.name().to_string(),
            });
        }
        self.levels.push(level);
        let last = self.levels.len() - 1;
        Ok(&mut self.levels[last])
    }

    /// Create an empty level in this dimension.
    pub fn new_level(&mut self, name: &str) -> CubeResult<&mut HierarchyLevel> {
        self.add_level(HierarchyLevel::new(name, self.name.clone()))
    }

    pub fn level(&self, name: &str) -> CubeResult<&HierarchyLevel> {
        self.levels
            .iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| CubeError::UnknownLevel {
                dimension: self.name.clone(),
                level: name.to_string(),
            })
    }

    pub fn level_mut(&mut self, name: &str) -> CubeResult<&mut HierarchyLevel> {
        let dimension = &self.name;
        self.levels
            .iter_mut()
            .find(|l| l.name() == name)
            .ok_or_else(|| CubeError::UnknownLevel {
                dimension: dimension.clone(),
                level: name.to_string(),
            })
    }

    /// Levels in the order they were added (not hierarchy order).
    pub fn levels(&self) -> &[HierarchyLevel] {
        &self.levels
    }

    pub fn level_by_container(&self, id: ContainerId) -> Option<&HierarchyLevel> {
        self.levels.iter().find(|l| l.id() == id)
    }

    /// Declare a hierarchy over existing levels, top level first.
    ///
    /// Every child level gets a parent-link store named after its parent level unless it already
    /// has one.
    pub fn add_hierarchy(&mut self, name: &str, levels: &[&str]) -> CubeResult<()> {
        if self.hierarchies.iter().any(|h| h.name == name) {
            return Err(CubeError::DuplicateHierarchy {
                dimension: self.name.clone(),
                hierarchy: name.to_string(),
            });
        }
        for level in levels {
            self.level(level)?;
        }
        for pair in levels.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            let child = self.level_mut(child)?;
            if !child.has_parent_link(parent) {
                child.add_parent_attribute(parent)?;
            }
        }
        log::debug!(
            "dimension {}: hierarchy {name} declared over {levels:?}",
            self.name
        );
        self.hierarchies.push(Hierarchy {
            name: name.to_string(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        });
        Ok(())
    }

    pub fn hierarchy(&self, name: &str) -> CubeResult<&Hierarchy> {
        self.hierarchies
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| CubeError::UnknownHierarchy {
                dimension: self.name.clone(),
                hierarchy: name.to_string(),
            })
    }

    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    pub fn hierarchy_names(&self) -> Vec<&str> {
        self.hierarchies.iter().map(|h| h.name.as_str()).collect()
    }

    pub fn default_hierarchy(&self) -> CubeResult<&Hierarchy> {
        self.hierarchies
            .first()
            .ok_or_else(|| CubeError::NoHierarchy(self.name.clone()))
    }

    /// Leaf level of the default hierarchy.
    pub fn leaf_level(&self) -> CubeResult<&HierarchyLevel> {
        let hierarchy = self.non_empty_hierarchy(self.default_hierarchy()?.name())?;
        let leaf = hierarchy.levels.last().ok_or_else(|| CubeError::EmptyHierarchy {
            dimension: self.name.clone(),
            hierarchy: hierarchy.name.clone(),
        })?;
        self.level(leaf)
    }

    /// Validated member reference.
    pub fn member(&self, level: &str, ordinal: usize) -> CubeResult<LevelMember> {
        let level = self.level(level)?;
        if ordinal >= level.member_count() {
            return Err(CubeError::OrdinalOutOfRange {
                container: level.name().to_string(),
                ordinal,
                len: level.member_count(),
            });
        }
        Ok(LevelMember::new(level.key(), ordinal))
    }

    /// `context` with its member for this dimension (if any) replaced by `level[ordinal]`.
    pub fn combine_tuple(
        &self,
        context: Option<&LevelMemberTuple>,
        level: &str,
        ordinal: usize,
    ) -> CubeResult<LevelMemberTuple> {
        let member = self.member(level, ordinal)?;
        Ok(match context {
            Some(context) => context.with_member(member),
            None => LevelMemberTuple::single(member),
        })
    }

    fn non_empty_hierarchy(&self, name: &str) -> CubeResult<&Hierarchy> {
        let hierarchy = self.hierarchy(name)?;
        if hierarchy.is_empty() {
            return Err(CubeError::EmptyHierarchy {
                dimension: self.name.clone(),
                hierarchy: name.to_string(),
            });
        }
        Ok(hierarchy)
    }

    fn hierarchy_levels(&self, hierarchy: &Hierarchy) -> CubeResult<Vec<&HierarchyLevel>> {
        hierarchy.levels.iter().map(|l| self.level(l)).collect()
    }

    fn check_element(&self, element: &Element) -> CubeResult<()> {
        if element.dimension != self.name {
            return Err(CubeError::DimensionMismatch {
                expected: self.name.clone(),
                actual: element.dimension.clone(),
            });
        }
        Ok(())
    }

    fn level_position(&self, hierarchy: &Hierarchy, level: &str) -> CubeResult<usize> {
        hierarchy
            .position(level)
            .ok_or_else(|| CubeError::LevelNotInHierarchy {
                level: level.to_string(),
                hierarchy: hierarchy.name.clone(),
            })
    }

    fn elements_of(&self, level: &str, ordinals: impl IntoIterator<Item = usize>) -> Vec<Element> {
        ordinals
            .into_iter()
            .map(|ordinal| Element::new(self.name.clone(), level, ordinal))
            .collect()
    }

    /// Resolve `filters` into a selector over `target`.
    ///
    /// Each filter must be scoped to a level of `hierarchy`. Filters at or above the target are
    /// cast down through parent links (a member matches when its parent matches, so ancestor
    /// filters narrow by AND). Filters below the target are only accepted with `include_lower`,
    /// and are folded up one level at a time: a parent matches when *any* of its children match.
    ///
    /// A filter on a level outside the hierarchy, or below the target without `include_lower`,
    /// makes the whole set unsatisfiable: the result is an all-false selector, not an error.
    /// Unknown hierarchies and targets outside the hierarchy are errors.
    pub fn selector<'a>(
        &'a self,
        hierarchy: &str,
        target: &str,
        filters: &[FilterRef<'a>],
        include_lower: bool,
    ) -> CubeResult<BitVec> {
        let hierarchy = self.hierarchy(hierarchy)?;
        let target_level = self.level(target)?;
        let target_pos = self.level_position(hierarchy, target)?;
        let path = self.hierarchy_levels(hierarchy)?;
        let target_len = target_level.member_count();

        if filters.is_empty() {
            return Ok(BitVec::with_len_all_true(target_len));
        }

        let mut buckets: Vec<Vec<FilterRef<'a>>> = vec![Vec::new(); path.len()];
        for filter in filters {
            let mut found = None;
            for (pos, level) in path.iter().enumerate() {
                if level.id() == filter.container() {
                    found = Some(pos);
                    break;
                }
                if pos == target_pos && !include_lower {
                    break;
                }
            }
            match found {
                Some(pos) => buckets[pos].push(Arc::clone(filter)),
                None => {
                    log::trace!(
                        "{}: filter on container {} cannot be applied to {target} in hierarchy {}",
                        self.name,
                        filter.container(),
                        hierarchy.name
                    );
                    return Ok(BitVec::with_len_all_false(target_len));
                }
            }
        }

        if include_lower {
            for pos in (target_pos + 1..path.len()).rev() {
                if buckets[pos].is_empty() {
                    continue;
                }
                let level_filters = std::mem::take(&mut buckets[pos]);
                let parent = path[pos - 1];
                let parents = path[pos].parent_selector(&level_filters, parent)?;
                log::trace!(
                    "{}: cast {} filters on {} up to {} ({} members)",
                    self.name,
                    level_filters.len(),
                    path[pos].name(),
                    parent.name(),
                    parents.count_ones()
                );
                buckets[pos - 1].push(Arc::new(LevelFilter::new(parent.id(), parents)));
            }
        }

        for pos in 0..target_pos {
            if buckets[pos].is_empty() {
                continue;
            }
            let level = path[pos];
            let selected = level.selector(&buckets[pos]);
            if selected.all_true() {
                continue;
            }
            let child = path[pos + 1];
            let links = child.parent_link(level.name())?;
            log::trace!(
                "{}: cast {} selected members of {} down to {}",
                self.name,
                selected.count_ones(),
                level.name(),
                child.name()
            );
            buckets[pos + 1].push(Arc::new(AttributeSetFilter::new(child.id(), links, selected)));
        }

        Ok(path[target_pos].selector(&buckets[target_pos]))
    }

    /// Immediate children of `element`, or the top-level members when `element` is `None`.
    /// A leaf element has no children.
    pub fn child_elements(
        &self,
        hierarchy: &str,
        element: Option<&Element>,
    ) -> CubeResult<Vec<Element>> {
        if let Some(element) = element {
            self.check_element(element)?;
        }
        let hierarchy = self.non_empty_hierarchy(hierarchy)?;

        let Some(element) = element else {
            let top = self.level(&hierarchy.levels[0])?;
            return Ok(self.elements_of(top.name(), 0..top.member_count()));
        };

        let pos = self.level_position(hierarchy, &element.level)?;
        let Some(child_name) = hierarchy.levels.get(pos + 1) else {
            return Ok(Vec::new());
        };
        let child = self.level(child_name)?;
        let links = child.parent_link(&element.level)?;
        let ordinals = (0..links.len()).filter(|&i| links.value(i) == Some(&element.ordinal));
        Ok(self.elements_of(child.name(), ordinals))
    }

    /// Members of `target` descending from `element`.
    ///
    /// - no element, no target: the top-level members
    /// - no element: every member of `target`
    /// - no target: the immediate children of `element`
    /// - both: the descendants of `element` at `target`; empty when `target` is the element's
    ///   own level
    pub fn descendant_elements(
        &self,
        hierarchy: &str,
        element: Option<&Element>,
        target: Option<&str>,
    ) -> CubeResult<Vec<Element>> {
        let hierarchy = self.non_empty_hierarchy(hierarchy)?;
        if let Some(element) = element {
            self.check_element(element)?;
        }

        match (element, target) {
            (None, None) => {
                let top = self.level(&hierarchy.levels[0])?;
                Ok(self.elements_of(top.name(), 0..top.member_count()))
            }
            (None, Some(target)) => {
                self.level_position(hierarchy, target)?;
                let level = self.level(target)?;
                Ok(self.elements_of(level.name(), 0..level.member_count()))
            }
            (Some(element), None) => self.child_elements(&hierarchy.name, Some(element)),
            (Some(element), Some(target)) => {
                let element_pos = self.level_position(hierarchy, &element.level)?;
                let target_pos = self.level_position(hierarchy, target)?;
                if target_pos < element_pos {
                    return Err(CubeError::TargetLevelAboveElement {
                        target: target.to_string(),
                        element_level: element.level.clone(),
                    });
                }
                if target_pos == element_pos {
                    return Ok(Vec::new());
                }
                let ancestor = self.level(&element.level)?;
                let filters: Vec<FilterRef> =
                    vec![Arc::new(ElementFilter::new(ancestor.id(), element.ordinal))];
                let selected = self.selector(&hierarchy.name, target, &filters, false)?;
                Ok(self.elements_of(target, selected.iter_ones()))
            }
        }
    }

    /// Immediate parent of `element`; `None` for top-level members, orphans and a missing element.
    pub fn parent_element(
        &self,
        hierarchy: &str,
        element: Option<&Element>,
    ) -> CubeResult<Option<Element>> {
        let Some(element) = element else {
            return Ok(None);
        };
        self.check_element(element)?;
        let hierarchy = self.non_empty_hierarchy(hierarchy)?;
        let pos = self.level_position(hierarchy, &element.level)?;
        if pos == 0 {
            return Ok(None);
        }
        let parent = &hierarchy.levels[pos - 1];
        let parent_ordinal = self.parent_ordinal(&element.level, parent, element.ordinal)?;
        Ok(parent_ordinal.map(|ordinal| Element::new(self.name.clone(), parent.clone(), ordinal)))
    }

    /// Ancestor of `element` at `target`.
    ///
    /// - no element: `None`
    /// - no target: the immediate parent of `element`
    /// - `target` is the element's own level: `None`
    /// - otherwise the ancestor, found by following parent links level by level; `None` when the
    ///   chain is broken by an orphan
    pub fn ancestor_element(
        &self,
        hierarchy: &str,
        element: Option<&Element>,
        target: Option<&str>,
    ) -> CubeResult<Option<Element>> {
        let hierarchy_ref = self.non_empty_hierarchy(hierarchy)?;
        let Some(element) = element else {
            return Ok(None);
        };
        self.check_element(element)?;
        let Some(target) = target else {
            return self.parent_element(hierarchy, Some(element));
        };
        if element.level == target {
            return Ok(None);
        }

        let hierarchy = hierarchy_ref;
        let element_pos = self.level_position(hierarchy, &element.level)?;
        let target_pos = self.level_position(hierarchy, target)?;
        if target_pos > element_pos {
            return Err(CubeError::TargetLevelBelowElement {
                target: target.to_string(),
                element_level: element.level.clone(),
            });
        }

        let mut ordinal = element.ordinal;
        for pos in (target_pos + 1..=element_pos).rev() {
            let level = &hierarchy.levels[pos];
            let parent = &hierarchy.levels[pos - 1];
            match self.parent_ordinal(level, parent, ordinal)? {
                Some(p) => ordinal = p,
                None => return Ok(None),
            }
        }
        Ok(Some(Element::new(self.name.clone(), target, ordinal)))
    }

    fn parent_ordinal(&self, level: &str, parent: &str, ordinal: usize) -> CubeResult<Option<usize>> {
        let level = self.level(level)?;
        let links = level.parent_link(parent)?;
        if ordinal >= level.member_count() {
            return Err(CubeError::OrdinalOutOfRange {
                container: level.name().to_string(),
                ordinal,
                len: level.member_count(),
            });
        }
        Ok(links.value(ordinal).copied())
    }

    /// For every member of `lower`, the ordinal of its ancestor at `upper` (`None` for orphans).
    pub fn level_mapping(
        &self,
        hierarchy: &str,
        upper: &str,
        lower: &str,
    ) -> CubeResult<Vec<Option<usize>>> {
        let hierarchy = self.hierarchy(hierarchy)?;
        let upper_pos = self.level_position(hierarchy, upper)?;
        let lower_pos = self.level_position(hierarchy, lower)?;
        if lower_pos < upper_pos {
            return Err(CubeError::TargetLevelBelowElement {
                target: upper.to_string(),
                element_level: lower.to_string(),
            });
        }

        let mut mapping: Vec<Option<usize>> = (0..self.level(upper)?.member_count())
            .map(Some)
            .collect();
        for pos in upper_pos + 1..=lower_pos {
            let level = self.level(&hierarchy.levels[pos])?;
            let links = level.parent_link(&hierarchy.levels[pos - 1])?;
            mapping = (0..level.member_count())
                .map(|i| {
                    links
                        .value(i)
                        .and_then(|&p| mapping.get(p).copied().flatten())
                })
                .collect();
        }
        Ok(mapping)
    }

    /// Enumerate the members of a child level under one parent member, in ordinal order, flagging
    /// those with members at a grandchild level.
    ///
    /// With `exclude_empty`, a child is kept only when its shadow on at least one of the query's
    /// intersections overlaps the shadow of the context (the context tuple, the query filters
    /// on other dimensions and any intersection views) and that intersection is related to this
    /// dimension at or below the child level. `has_children` then additionally requires such an
    /// overlap on an intersection related at or below the grandchild level.
    pub fn child_members<'a>(
        &'a self,
        cube: &'a CubeDs,
        query: &ChildMembersQuery<'a>,
    ) -> CubeResult<Vec<LevelMemberInfo>> {
        let hierarchy = self.non_empty_hierarchy(self.default_hierarchy()?.name())?;
        let child_level = self.level(&query.child_level)?;

        let (mut own_filters, other_filters): (Vec<FilterRef<'a>>, Vec<FilterRef<'a>>) = query
            .filters
            .iter()
            .cloned()
            .partition(|f| self.level_by_container(f.container()).is_some());
        if let Some((parent, ordinal)) = &query.parent {
            let parent = self.level(parent)?;
            own_filters.push(Arc::new(ElementFilter::new(parent.id(), *ordinal)));
        }

        let mut children: BTreeMap<usize, bool> = self
            .selector(&hierarchy.name, child_level.name(), &own_filters, true)?
            .iter_ones()
            .map(|ordinal| (ordinal, false))
            .collect();

        if let Some(grandchild) = &query.grandchild_level {
            let grandchildren =
                self.selector(&hierarchy.name, grandchild, &own_filters, true)?;
            let mapping = self.level_mapping(&hierarchy.name, child_level.name(), grandchild)?;
            for g in grandchildren.iter_ones() {
                if let Some(Some(c)) = mapping.get(g) {
                    children.insert(*c, true);
                }
            }
        }

        let info = |ordinal: usize, has_children: bool| LevelMemberInfo {
            member: LevelMember::new(child_level.key(), ordinal),
            name: child_level.member_name(ordinal).map(str::to_string),
            has_children,
        };

        if !query.exclude_empty {
            return Ok(children
                .into_iter()
                .map(|(ordinal, has_children)| info(ordinal, has_children))
                .collect());
        }

        let mut context_filters = other_filters;
        if let Some(context) = &query.context {
            for member in context.members() {
                let level = cube
                    .dimension(&member.level.dimension)?
                    .level(&member.level.level)?;
                context_filters.push(Arc::new(ElementFilter::new(level.id(), member.ordinal)));
            }
        }

        let hierarchies = cube.default_hierarchies();
        let mut contexts = Vec::with_capacity(query.intersections.len());
        for name in &query.intersections {
            let intersection = cube.intersection(name)?;
            let applicable: Vec<FilterRef<'a>> = context_filters
                .iter()
                .filter(|f| {
                    f.container() == intersection.id()
                        || cube.level_by_container(f.container()).is_some()
                })
                .cloned()
                .collect();
            let mut shadow = if applicable.is_empty() {
                BitVec::with_len_all_true(intersection.size())
            } else {
                let mut aggregator = ShadowAggregator::new(intersection.size());
                cube.aggregate(&hierarchies, name, &mut [&mut aggregator], &applicable)?;
                aggregator.into_shadow()
            };
            if let Some(view) = query.views.get(name.as_str()) {
                shadow = BitVec::from_indices(
                    shadow.len(),
                    shadow.iter_ones().filter(|&i| view.get(i)),
                );
            }
            let depth = intersection
                .related_level(&self.name)
                .and_then(|level| hierarchy.position(level));
            contexts.push((intersection, shadow, depth));
        }

        let child_depth = self.level_position(hierarchy, child_level.name())?;
        let grandchild_depth = match &query.grandchild_level {
            Some(level) => Some(self.level_position(hierarchy, level)?),
            None => None,
        };

        let mut out = Vec::new();
        for (ordinal, has_children) in children {
            let tuple = LevelMemberTuple::single(LevelMember::new(child_level.key(), ordinal));
            let mut non_empty = false;
            let mut non_empty_grandchildren = false;
            for (intersection, context_shadow, depth) in &contexts {
                let Some(depth) = *depth else {
                    continue;
                };
                let child_shadow = intersection.tuple_shadow(cube, &tuple)?;
                if !context_shadow.intersects(&child_shadow) {
                    continue;
                }
                non_empty |= depth >= child_depth;
                non_empty_grandchildren |= grandchild_depth.is_some_and(|g| depth >= g);
            }
            if non_empty {
                out.push(info(ordinal, has_children && non_empty_grandchildren));
            }
        }
        Ok(out)
    }
}

/// Parameters of [`Dimension::child_members`].
#[derive(Clone, Debug, Default)]
pub struct ChildMembersQuery<'a> {
    pub parent: Option<(String, usize)>,
    pub child_level: String,
    pub grandchild_level: Option<String>,
    pub context: Option<LevelMemberTuple>,
    pub filters: Vec<FilterRef<'a>>,
    pub intersections: Vec<String>,
    pub views: HashMap<String, BitVec>,
    pub exclude_empty: bool,
}

impl<'a> ChildMembersQuery<'a> {
    pub fn new(child_level: impl Into<String>) -> Self {
        Self {
            child_level: child_level.into(),
            ..Self::default()
        }
    }

    pub fn parent(mut self, level: impl Into<String>, ordinal: usize) -> Self {
        self.parent = Some((level.into(), ordinal));
        self
    }

    pub fn grandchild(mut self, level: impl Into<String>) -> Self {
        self.grandchild_level = Some(level.into());
        self
    }

    pub fn context(mut self, context: LevelMemberTuple) -> Self {
        self.context = Some(context);
        self
    }

    pub fn filter(mut self, filter: FilterRef<'a>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn intersection(mut self, name: impl Into<String>) -> Self {
        self.intersections.push(name.into());
        self
    }

    /// Restrict intersection `name` to the items set in `view`.
    pub fn view(mut self, name: impl Into<String>, view: BitVec) -> Self {
        self.views.insert(name.into(), view);
        self
    }

    pub fn exclude_empty(mut self, exclude_empty: bool) -> Self {
        self.exclude_empty = exclude_empty;
        self
    }
}

impl LevelKey {
    /// Resolve this key against `cube`.
    pub fn resolve<'c>(&self, cube: &'c CubeDs) -> CubeResult<&'c HierarchyLevel> {
        cube.dimension(&self.dimension)?.level(&self.level)
    }
}

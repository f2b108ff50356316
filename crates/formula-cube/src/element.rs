use crate::error::{CubeError, CubeResult};
use std::fmt;

/// Names one level of one dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelKey {
    pub dimension: String,
    pub level: String,
}

impl LevelKey {
    pub fn new(dimension: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            level: level.into(),
        }
    }
}

impl fmt::Display for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dimension, self.level)
    }
}

/// One member of a level, identified by names and ordinal rather than by a live reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Element {
    pub dimension: String,
    pub level: String,
    pub ordinal: usize,
}

impl Element {
    pub fn new(dimension: impl Into<String>, level: impl Into<String>, ordinal: usize) -> Self {
        Self {
            dimension: dimension.into(),
            level: level.into(),
            ordinal,
        }
    }

    pub fn level_key(&self) -> LevelKey {
        LevelKey::new(self.dimension.clone(), self.level.clone())
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.dimension, self.level, self.ordinal)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelMember {
    pub level: LevelKey,
    pub ordinal: usize,
}

impl LevelMember {
    pub fn new(level: LevelKey, ordinal: usize) -> Self {
        Self { level, ordinal }
    }

    pub fn dimension(&self) -> &str {
        &self.level.dimension
    }
}

impl From<Element> for LevelMember {
    fn from(element: Element) -> Self {
        Self {
            level: LevelKey::new(element.dimension, element.level),
            ordinal: element.ordinal,
        }
    }
}

impl From<LevelMember> for Element {
    fn from(member: LevelMember) -> Self {
        Element::new(member.level.dimension, member.level.level, member.ordinal)
    }
}

/// A multi-dimensional selection point: at most one member per dimension.
///
/// Members are kept ordered by dimension name so two tuples holding the same members compare
/// equal regardless of construction order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LevelMemberTuple {
    members: Vec<LevelMember>,
}

impl LevelMemberTuple {
    pub fn new(members: impl IntoIterator<Item = LevelMember>) -> CubeResult<Self> {
        let mut members: Vec<LevelMember> = members.into_iter().collect();
        members.sort();
        if let Some(pair) = members
            .windows(2)
            .find(|pair| pair[0].dimension() == pair[1].dimension())
        {
            return Err(CubeError::InvalidTuple(format!(
                "members {} and {} both come from dimension {}",
                pair[0].level,
                pair[1].level,
                pair[0].dimension()
            )));
        }
        Ok(Self { members })
    }

    pub fn single(member: LevelMember) -> Self {
        Self {
            members: vec![member],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[LevelMember] {
        &self.members
    }

    pub fn member(&self, dimension: &str) -> Option<&LevelMember> {
        self.members.iter().find(|m| m.dimension() == dimension)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Copy of this tuple with `member` replacing whatever member it held for the same dimension.
    pub fn with_member(&self, member: LevelMember) -> Self {
        let mut members: Vec<LevelMember> = self
            .members
            .iter()
            .filter(|m| m.dimension() != member.dimension())
            .cloned()
            .collect();
        members.push(member);
        members.sort();
        Self { members }
    }
}

/// A child member returned by [`Dimension::child_members`](crate::Dimension::child_members).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelMemberInfo {
    pub member: LevelMember,
    pub name: Option<String>,
    pub has_children: bool,
}

impl LevelMemberInfo {
    pub fn ordinal(&self) -> usize {
        self.member.ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_rejects_two_members_of_one_dimension() {
        let err = LevelMemberTuple::new([
            LevelMember::new(LevelKey::new("Location", "Store"), 1),
            LevelMember::new(LevelKey::new("Product", "Sku"), 0),
            LevelMember::new(LevelKey::new("Location", "Region"), 0),
        ])
        .unwrap_err();
        assert!(matches!(err, CubeError::InvalidTuple(_)));
    }

    #[test]
    fn with_member_replaces_same_dimension() {
        let tuple = LevelMemberTuple::new([
            LevelMember::new(LevelKey::new("Location", "Store"), 1),
            LevelMember::new(LevelKey::new("Product", "Sku"), 0),
        ])
        .unwrap();
        let combined = tuple.with_member(LevelMember::new(LevelKey::new("Location", "Region"), 2));
        assert_eq!(combined.len(), 2);
        assert_eq!(
            combined.member("Location"),
            Some(&LevelMember::new(LevelKey::new("Location", "Region"), 2))
        );
    }
}

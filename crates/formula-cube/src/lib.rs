//! In-memory multidimensional index over hierarchical dimensions.
//!
//! A [`CubeDs`] owns [`Dimension`]s (levels of members linked child-to-parent and arranged into
//! named [`Hierarchy`]s) and [`Intersection`]s (fact containers keyed by one member per related
//! dimension). Queries are expressed as [`Filter`]s over containers and evaluated into
//! [`BitVec`] selectors, which are then fed to [`Aggregator`]s.

#![forbid(unsafe_code)]

mod aggregator;
mod bitvec;
pub mod cartesian;
mod container;
mod cube;
mod dimension;
mod element;
mod error;
mod filter;
mod intersection;
mod level;
mod sort;
mod store;

pub use crate::aggregator::{
    Aggregator, BooleanAndAggregator, BooleanOrAggregator, CountAggregator,
    DoubleArraySumAggregator, DoubleMinMaxAggregator, DoubleProductSumAggregator,
    DoubleSumAggregator, MapReduceAggregator, MemberAggregator, ParentAggregator,
    SelectorAggregator, ShadowAggregator,
};
pub use crate::bitvec::BitVec;
pub use crate::container::{AttributeContainer, ContainerId};
pub use crate::cube::CubeDs;
pub use crate::dimension::{ChildMembersQuery, Dimension, Hierarchy};
pub use crate::element::{Element, LevelKey, LevelMember, LevelMemberInfo, LevelMemberTuple};
pub use crate::error::{CubeError, CubeResult};
pub use crate::filter::{
    AttributeSetFilter, ElementFilter, Filter, FilterRef, IntGreaterThanFilter, LevelFilter,
    NoMatchFilter, TextFilter,
};
pub use crate::intersection::{Intersection, IntersectionOptions};
pub use crate::level::HierarchyLevel;
pub use crate::sort::{AggregatedMeasure, MeasureValueSorter, MeasureValues, NullOrder};
pub use crate::store::{AttributeStore, DoubleArrayStore, OutOfExtent, Store, StoreType};

use crate::container::ContainerId;

pub type CubeResult<T> = Result<T, CubeError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CubeError {
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown intersection: {0}")]
    UnknownIntersection(String),

    #[error("hierarchy {hierarchy} does not exist in dimension {dimension}")]
    UnknownHierarchy { dimension: String, hierarchy: String },

    #[error("level {level} does not exist in dimension {dimension}")]
    UnknownLevel { dimension: String, level: String },

    #[error("attribute {attribute} does not exist on {container}")]
    UnknownAttribute { container: String, attribute: String },

    #[error("attribute {attribute} on {container} is not a {expected} store")]
    AttributeType {
        container: String,
        attribute: String,
        expected: &'static str,
    },

    #[error("duplicate dimension: {0}")]
    DuplicateDimension(String),

    #[error("duplicate intersection: {0}")]
    DuplicateIntersection(String),

    #[error("duplicate level {level} in dimension {dimension}")]
    DuplicateLevel { dimension: String, level: String },

    #[error("duplicate hierarchy {hierarchy} in dimension {dimension}")]
    DuplicateHierarchy { dimension: String, hierarchy: String },

    #[error("duplicate member name '{member}' in level {level}")]
    DuplicateMember { level: String, member: String },

    #[error("duplicate attribute {attribute} on {container}")]
    DuplicateAttribute { container: String, attribute: String },

    #[error("intersection {intersection} already has a related level for dimension {dimension}")]
    DuplicateRelatedDimension {
        intersection: String,
        dimension: String,
    },

    #[error("dimension {0} does not declare any hierarchy")]
    NoHierarchy(String),

    #[error("hierarchy {hierarchy} does not have any levels in dimension {dimension}")]
    EmptyHierarchy { dimension: String, hierarchy: String },

    #[error("element dimension {actual} doesn't match dimension name {expected}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("level {level} is not in the hierarchy {hierarchy}")]
    LevelNotInHierarchy { level: String, hierarchy: String },

    #[error("target level {target} is above element level {element_level}")]
    TargetLevelAboveElement {
        target: String,
        element_level: String,
    },

    #[error("target level {target} is below element level {element_level}")]
    TargetLevelBelowElement {
        target: String,
        element_level: String,
    },

    #[error("level {level} does not have a link to parent level {parent}")]
    MissingParentLink { level: String, parent: String },

    #[error("ordinal {ordinal} is out of bounds for {container} (size {len})")]
    OrdinalOutOfRange {
        container: String,
        ordinal: usize,
        len: usize,
    },

    #[error("total cardinality {cardinalities:?} overflows the 32-bit packing domain")]
    CartesianOverflow { cardinalities: Vec<usize> },

    #[error("intersection {intersection} expects tuples of {expected} ordinals, got {actual}")]
    TupleArity {
        intersection: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("filter scoped to container {0} which is neither a level of a known dimension nor the target intersection")]
    UnknownFilterContainer(ContainerId),

    #[error("dimension {dimension} keys intersection {intersection} and cannot be removed")]
    PrimaryDimensionInUse {
        dimension: String,
        intersection: String,
    },

    #[error("lookup keys of intersection {intersection} are stale; recalculate before lookup")]
    StaleLookupKeys { intersection: String },

    #[error("intersection {intersection} already keys tuple {tuple:?} to item {existing}")]
    DuplicateTuple {
        intersection: String,
        tuple: Vec<usize>,
        existing: usize,
    },

    #[error("double array row has {actual} values, store width is {expected}")]
    ArrayWidthMismatch { expected: usize, actual: usize },

    #[error("horizon {horizon} exceeds double array width {width}")]
    HorizonOutOfRange { horizon: usize, width: usize },

    #[error("measure {measure} has {actual} values, expected {expected}")]
    MeasureLengthMismatch {
        measure: String,
        expected: usize,
        actual: usize,
    },
}

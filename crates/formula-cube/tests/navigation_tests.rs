use formula_cube::{CubeError, Dimension, Element, LevelKey, LevelMember, LevelMemberTuple};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn location() -> Dimension {
    let mut dim = Dimension::new("Location");
    for level in ["Country", "Region", "Store"] {
        dim.new_level(level).unwrap();
    }
    dim.add_hierarchy("Geo", &["Country", "Region", "Store"])
        .unwrap();
    for c in 0..2 {
        dim.level_mut("Country")
            .unwrap()
            .add_member(format!("C{c}"))
            .unwrap();
    }
    for r in 0..6 {
        let region = dim.level_mut("Region").unwrap();
        let ordinal = region.add_member(format!("R{r}")).unwrap();
        region.set_parent(ordinal, "Country", Some(r / 3)).unwrap();
    }
    for s in 0..12 {
        let store = dim.level_mut("Store").unwrap();
        let ordinal = store.add_member(format!("S{s}")).unwrap();
        store.set_parent(ordinal, "Region", Some(s / 2)).unwrap();
    }
    dim
}

fn el(level: &str, ordinal: usize) -> Element {
    Element::new("Location", level, ordinal)
}

fn els(level: &str, ordinals: impl IntoIterator<Item = usize>) -> Vec<Element> {
    ordinals.into_iter().map(|o| el(level, o)).collect()
}

#[test]
fn child_elements() {
    let dim = location();
    assert_eq!(dim.child_elements("Geo", None).unwrap(), els("Country", 0..2));
    assert_eq!(
        dim.child_elements("Geo", Some(&el("Region", 1))).unwrap(),
        els("Store", [2, 3])
    );
    assert_eq!(
        dim.child_elements("Geo", Some(&el("Store", 4))).unwrap(),
        Vec::new()
    );
}

#[test]
fn descendant_elements_cover_all_four_cases() {
    let dim = location();
    assert_eq!(
        dim.descendant_elements("Geo", None, None).unwrap(),
        els("Country", 0..2)
    );
    assert_eq!(
        dim.descendant_elements("Geo", None, Some("Store")).unwrap(),
        els("Store", 0..12)
    );
    assert_eq!(
        dim.descendant_elements("Geo", Some(&el("Country", 1)), None)
            .unwrap(),
        els("Region", 3..6)
    );
    assert_eq!(
        dim.descendant_elements("Geo", Some(&el("Country", 1)), Some("Store"))
            .unwrap(),
        els("Store", 6..12)
    );
    assert_eq!(
        dim.descendant_elements("Geo", Some(&el("Region", 2)), Some("Region"))
            .unwrap(),
        Vec::new()
    );
}

#[test]
fn descendant_target_above_element_is_an_error() {
    let dim = location();
    assert_eq!(
        dim.descendant_elements("Geo", Some(&el("Region", 2)), Some("Country")),
        Err(CubeError::TargetLevelAboveElement {
            target: "Country".to_string(),
            element_level: "Region".to_string(),
        })
    );
}

#[test]
fn parent_element() {
    let mut dim = location();
    assert_eq!(
        dim.parent_element("Geo", Some(&el("Store", 5))).unwrap(),
        Some(el("Region", 2))
    );
    assert_eq!(dim.parent_element("Geo", Some(&el("Country", 0))).unwrap(), None);
    assert_eq!(dim.parent_element("Geo", None).unwrap(), None);

    dim.level_mut("Store").unwrap().add_member("S12").unwrap();
    assert_eq!(dim.parent_element("Geo", Some(&el("Store", 12))).unwrap(), None);

    assert!(matches!(
        dim.parent_element("Geo", Some(&el("Store", 40))),
        Err(CubeError::OrdinalOutOfRange { ordinal: 40, .. })
    ));
}

#[test]
fn ancestor_element_cover_all_four_cases() {
    let dim = location();
    assert_eq!(dim.ancestor_element("Geo", None, None).unwrap(), None);
    assert_eq!(
        dim.ancestor_element("Geo", None, Some("Country")).unwrap(),
        None
    );
    assert_eq!(
        dim.ancestor_element("Geo", Some(&el("Store", 11)), None)
            .unwrap(),
        Some(el("Region", 5))
    );
    assert_eq!(
        dim.ancestor_element("Geo", Some(&el("Store", 11)), Some("Country"))
            .unwrap(),
        Some(el("Country", 1))
    );
    assert_eq!(
        dim.ancestor_element("Geo", Some(&el("Store", 3)), Some("Store"))
            .unwrap(),
        None
    );
    assert!(matches!(
        dim.ancestor_element("Geo", Some(&el("Region", 0)), Some("Store")),
        Err(CubeError::TargetLevelBelowElement { .. })
    ));
}

#[test]
fn ancestor_chain_broken_by_orphan_region() {
    let mut dim = location();
    dim.level_mut("Region")
        .unwrap()
        .set_parent(4, "Country", None)
        .unwrap();
    assert_eq!(
        dim.ancestor_element("Geo", Some(&el("Store", 9)), Some("Country"))
            .unwrap(),
        None
    );
    assert_eq!(
        dim.ancestor_element("Geo", Some(&el("Store", 9)), Some("Region"))
            .unwrap(),
        Some(el("Region", 4))
    );
}

#[test]
fn navigation_validates_its_inputs() {
    let mut dim = location();
    let foreign = Element::new("Product", "Sku", 0);
    assert!(matches!(
        dim.child_elements("Geo", Some(&foreign)),
        Err(CubeError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        dim.parent_element("Calendar", Some(&el("Store", 0))),
        Err(CubeError::UnknownHierarchy { .. })
    ));

    dim.add_hierarchy("Flat", &[]).unwrap();
    assert!(matches!(
        dim.child_elements("Flat", None),
        Err(CubeError::EmptyHierarchy { .. })
    ));

    dim.new_level("Format").unwrap();
    assert!(matches!(
        dim.child_elements("Geo", Some(&el("Format", 0))),
        Err(CubeError::LevelNotInHierarchy { .. })
    ));
}

#[test]
fn level_mapping_composes_parent_links() {
    let dim = location();
    let mapping = dim.level_mapping("Geo", "Country", "Store").unwrap();
    let expected: Vec<Option<usize>> = (0..12).map(|s| Some(s / 6)).collect();
    assert_eq!(mapping, expected);

    let identity = dim.level_mapping("Geo", "Region", "Region").unwrap();
    assert_eq!(identity, (0..6).map(Some).collect::<Vec<_>>());

    assert!(matches!(
        dim.level_mapping("Geo", "Store", "Country"),
        Err(CubeError::TargetLevelBelowElement { .. })
    ));
}

#[test]
fn leaf_level_and_tuple_combination() {
    let mut dim = location();
    assert_eq!(dim.leaf_level().unwrap().name(), "Store");

    let sku = LevelMember::new(LevelKey::new("Product", "Sku"), 2);
    let store = LevelMember::new(LevelKey::new("Location", "Store"), 1);
    let context = LevelMemberTuple::new([sku.clone(), store]).unwrap();
    let combined = dim.combine_tuple(Some(&context), "Region", 4).unwrap();
    let region = LevelMember::new(LevelKey::new("Location", "Region"), 4);
    assert_eq!(combined, LevelMemberTuple::new([sku, region]).unwrap());
    assert_eq!(
        dim.combine_tuple(None, "Country", 1).unwrap().members(),
        &[LevelMember::new(LevelKey::new("Location", "Country"), 1)]
    );
    assert!(matches!(
        dim.combine_tuple(None, "Country", 2),
        Err(CubeError::OrdinalOutOfRange { .. })
    ));

    let mut bare = Dimension::new("Scenario");
    bare.new_level("Version").unwrap();
    assert_eq!(
        bare.leaf_level().unwrap_err(),
        CubeError::NoHierarchy("Scenario".to_string())
    );
    assert!(matches!(
        dim.add_level(formula_cube::HierarchyLevel::new("Sku", "Product")),
        Err(CubeError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        dim.new_level("Store"),
        Err(CubeError::DuplicateLevel { .. })
    ));
}

fn random_dimension(
    countries: usize,
    region_parents: &[Option<usize>],
    store_parents: &[Option<usize>],
) -> Dimension {
    let mut dim = Dimension::new("Location");
    for level in ["Country", "Region", "Store"] {
        dim.new_level(level).unwrap();
    }
    dim.add_hierarchy("Geo", &["Country", "Region", "Store"])
        .unwrap();
    for c in 0..countries {
        dim.level_mut("Country")
            .unwrap()
            .add_member(format!("C{c}"))
            .unwrap();
    }
    for (r, parent) in region_parents.iter().enumerate() {
        let region = dim.level_mut("Region").unwrap();
        region.add_member(format!("R{r}")).unwrap();
        region.set_parent(r, "Country", *parent).unwrap();
    }
    for (s, parent) in store_parents.iter().enumerate() {
        let store = dim.level_mut("Store").unwrap();
        store.add_member(format!("S{s}")).unwrap();
        store.set_parent(s, "Region", *parent).unwrap();
    }
    dim
}

fn hierarchy_shape() -> impl Strategy<Value = (usize, Vec<Option<usize>>, Vec<Option<usize>>)> {
    (1usize..5, 1usize..8).prop_flat_map(|(countries, regions)| {
        (
            Just(countries),
            proptest::collection::vec(proptest::option::of(0..countries), regions),
            proptest::collection::vec(proptest::option::of(0..regions), 0..24),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn level_mapping_is_associative((countries, regions, stores) in hierarchy_shape()) {
        let dim = random_dimension(countries, &regions, &stores);
        let direct = dim.level_mapping("Geo", "Country", "Store").unwrap();
        let upper = dim.level_mapping("Geo", "Country", "Region").unwrap();
        let lower = dim.level_mapping("Geo", "Region", "Store").unwrap();
        let composed: Vec<Option<usize>> = lower
            .iter()
            .map(|r| r.and_then(|r| upper[r]))
            .collect();
        prop_assert_eq!(direct, composed);
    }

    #[test]
    fn ancestor_agrees_with_level_mapping((countries, regions, stores) in hierarchy_shape()) {
        let dim = random_dimension(countries, &regions, &stores);
        let mapping = dim.level_mapping("Geo", "Country", "Store").unwrap();
        for (s, expected) in mapping.iter().enumerate() {
            let ancestor = dim
                .ancestor_element("Geo", Some(&Element::new("Location", "Store", s)), Some("Country"))
                .unwrap();
            prop_assert_eq!(ancestor.map(|e| e.ordinal), *expected);
        }
    }
}

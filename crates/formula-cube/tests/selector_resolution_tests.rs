use formula_cube::{
    BitVec, CubeError, Dimension, ElementFilter, FilterRef, IntGreaterThanFilter, LevelFilter,
    TextFilter,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

/// Location: 2 countries, 3 regions per country, 2 stores per region, plus a `Format` level that
/// is not part of the `Geo` hierarchy.
fn location() -> Dimension {
    let mut dim = Dimension::new("Location");
    for level in ["Country", "Region", "Store", "Format"] {
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
    for format in ["Mall", "Street"] {
        dim.level_mut("Format").unwrap().add_member(format).unwrap();
    }
    dim
}

fn ones(bits: &BitVec) -> Vec<usize> {
    bits.iter_ones().collect()
}

#[test]
fn ancestor_filter_is_cast_down_to_every_lower_level() {
    let dim = location();
    let country = dim.level("Country").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(ElementFilter::new(country, 0))];

    let regions = dim.selector("Geo", "Region", &filters, false).unwrap();
    assert_eq!(regions.len(), 6);
    assert_eq!(ones(&regions), vec![0, 1, 2]);

    let stores = dim.selector("Geo", "Store", &filters, false).unwrap();
    assert_eq!(stores.len(), 12);
    assert_eq!(ones(&stores), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn no_filters_selects_every_member() {
    let dim = location();
    let stores = dim.selector("Geo", "Store", &[], false).unwrap();
    assert_eq!(stores.len(), 12);
    assert!(stores.all_true());
}

#[test]
fn filter_on_target_level_applies_directly() {
    let dim = location();
    let store = dim.level("Store").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(IntGreaterThanFilter::new(store, 9))];
    let stores = dim.selector("Geo", "Store", &filters, false).unwrap();
    assert_eq!(ones(&stores), vec![10, 11]);
}

#[test]
fn filter_outside_the_hierarchy_selects_nothing() {
    let dim = location();
    let format = dim.level("Format").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(ElementFilter::new(format, 0))];
    let stores = dim.selector("Geo", "Store", &filters, true).unwrap();
    assert_eq!(stores.len(), 12);
    assert!(!stores.any());
}

#[test]
fn lower_level_filter_requires_opt_in() {
    let dim = location();
    let store = dim.level("Store").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(ElementFilter::new(store, 7))];

    let rejected = dim.selector("Geo", "Region", &filters, false).unwrap();
    assert_eq!(rejected.len(), 6);
    assert!(!rejected.any());

    let regions = dim.selector("Geo", "Region", &filters, true).unwrap();
    assert_eq!(ones(&regions), vec![3]);

    let countries = dim.selector("Geo", "Country", &filters, true).unwrap();
    assert_eq!(ones(&countries), vec![1]);
}

#[test]
fn descendant_filters_match_when_any_child_matches() {
    let dim = location();
    let store = dim.level("Store").unwrap().id();
    // Stores 1, 2 and 11 sit in regions 0, 1 and 5.
    let picked = BitVec::from_indices(12, [1, 2, 11]);
    let filters: Vec<FilterRef> = vec![Arc::new(LevelFilter::new(store, picked))];
    let regions = dim.selector("Geo", "Region", &filters, true).unwrap();
    assert_eq!(ones(&regions), vec![0, 1, 5]);
}

#[test]
fn filters_on_several_levels_narrow_by_and() {
    let dim = location();
    let country = dim.level("Country").unwrap().id();
    let region = dim.level("Region").unwrap().id();

    // Region 4 belongs to country 1, so nothing survives both filters.
    let disjoint: Vec<FilterRef> = vec![
        Arc::new(ElementFilter::new(country, 0)),
        Arc::new(ElementFilter::new(region, 4)),
    ];
    let stores = dim.selector("Geo", "Store", &disjoint, false).unwrap();
    assert!(!stores.any());

    let overlapping: Vec<FilterRef> = vec![
        Arc::new(ElementFilter::new(country, 1)),
        Arc::new(ElementFilter::new(region, 4)),
    ];
    let stores = dim.selector("Geo", "Store", &overlapping, false).unwrap();
    assert_eq!(ones(&stores), vec![8, 9]);
}

#[test]
fn level_filter_on_a_middle_level() {
    let dim = location();
    let region = dim.level("Region").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(LevelFilter::new(
        region,
        BitVec::from_indices(6, [1, 5]),
    ))];
    let stores = dim.selector("Geo", "Store", &filters, false).unwrap();
    assert_eq!(ones(&stores), vec![2, 3, 10, 11]);
}

#[test]
fn text_filter_on_identity_attribute() {
    let dim = location();
    let country = dim.level("Country").unwrap();
    let names = country.container().text_store("Country").unwrap();
    let filters: Vec<FilterRef> = vec![Arc::new(TextFilter::new(
        country.id(),
        names,
        Some("C1".to_string()),
    ))];
    let regions = dim.selector("Geo", "Region", &filters, false).unwrap();
    assert_eq!(ones(&regions), vec![3, 4, 5]);
}

#[test]
fn orphans_survive_only_unrestricted_ancestors() {
    let mut dim = location();
    dim.level_mut("Store").unwrap().add_member("S12").unwrap();

    let stores = dim.selector("Geo", "Store", &[], false).unwrap();
    assert_eq!(stores.len(), 13);
    assert!(stores.get(12));

    let country = dim.level("Country").unwrap().id();
    let all_countries: Vec<FilterRef> = vec![Arc::new(LevelFilter::new(
        country,
        BitVec::with_len_all_true(2),
    ))];
    let stores = dim.selector("Geo", "Store", &all_countries, false).unwrap();
    assert!(stores.get(12));

    let one_country: Vec<FilterRef> = vec![Arc::new(ElementFilter::new(country, 1))];
    let stores = dim.selector("Geo", "Store", &one_country, false).unwrap();
    assert_eq!(ones(&stores), vec![6, 7, 8, 9, 10, 11]);
}

#[test]
fn unknown_hierarchy_and_foreign_target_are_errors() {
    let dim = location();
    assert!(matches!(
        dim.selector("Calendar", "Store", &[], false),
        Err(CubeError::UnknownHierarchy { .. })
    ));
    assert!(matches!(
        dim.selector("Geo", "Format", &[], false),
        Err(CubeError::LevelNotInHierarchy { .. })
    ));
    assert!(matches!(
        dim.selector("Geo", "Mall", &[], false),
        Err(CubeError::UnknownLevel { .. })
    ));
}

#[test]
fn second_hierarchy_reuses_existing_levels() {
    let mut dim = location();
    dim.add_hierarchy("ByFormat", &["Format", "Store"]).unwrap();
    for s in 0..12 {
        dim.level_mut("Store")
            .unwrap()
            .set_parent(s, "Format", Some(s % 2))
            .unwrap();
    }
    assert_eq!(dim.hierarchy_names(), vec!["Geo", "ByFormat"]);
    assert_eq!(dim.default_hierarchy().unwrap().name(), "Geo");

    let format = dim.level("Format").unwrap().id();
    let filters: Vec<FilterRef> = vec![Arc::new(ElementFilter::new(format, 1))];
    let stores = dim.selector("ByFormat", "Store", &filters, false).unwrap();
    assert_eq!(ones(&stores), vec![1, 3, 5, 7, 9, 11]);

    // The same filter has no place in Geo.
    let stores = dim.selector("Geo", "Store", &filters, false).unwrap();
    assert!(!stores.any());

    assert!(matches!(
        dim.add_hierarchy("Geo", &["Country"]),
        Err(CubeError::DuplicateHierarchy { .. })
    ));
}

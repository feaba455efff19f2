use super::*;

fn coll(entries: &[&str]) -> Collection {
    Collection::from(entries.to_vec())
}

#[test]
fn intersect_preserves_left_order() {
    let left = coll(&["c", "a", "b"]);
    let right = coll(&["a", "b", "c"]);
    assert_eq!(left.intersect(&right), coll(&["c", "a", "b"]));
}

#[test]
fn intersect_drops_missing() {
    let left = coll(&["a", "b", "c"]);
    let right = coll(&["b"]);
    assert_eq!(left.intersect(&right), coll(&["b"]));
}

#[test]
fn remove_is_difference() {
    let left = coll(&["a", "b", "c"]);
    assert_eq!(left.remove(&coll(&["b"])), coll(&["a", "c"]));
    assert_eq!(left.remove(&coll(&[])), left);
}

#[test]
fn union_appends_new_in_right_order() {
    let left = coll(&["a", "b"]);
    let right = coll(&["d", "b", "c"]);
    assert_eq!(left.union(&right), coll(&["a", "b", "d", "c"]));
}

#[test]
fn union_with_empty_is_identity() {
    let left = coll(&["a", "b"]);
    assert_eq!(left.union(&coll(&[])), left);
    assert_eq!(coll(&[]).union(&left), left);
}

#[test]
fn expand_globs_against_base() {
    let base = coll(&["EC2Instance", "EC2Volume", "S3Bucket"]);
    let patterns = coll(&["EC2*"]);
    assert_eq!(patterns.expand(&base), coll(&["EC2Instance", "EC2Volume"]));
}

#[test]
fn expand_passes_through_unmatched() {
    let base = coll(&["EC2Instance"]);
    let patterns = coll(&["S3*", "EC2Instance"]);
    assert_eq!(patterns.expand(&base), coll(&["S3*", "EC2Instance"]));
}

#[test]
fn expand_passes_through_invalid_pattern() {
    let base = coll(&["EC2Instance"]);
    let patterns = coll(&["[oops"]);
    assert_eq!(patterns.expand(&base), coll(&["[oops"]));
}

#[test]
fn resolve_with_no_rules_is_identity() {
    let base = coll(&["a", "b", "c"]);
    let resolved = resolve_resource_types(base.clone(), &[], &[], &[], &HashMap::new());
    assert_eq!(resolved, base);
}

#[test]
fn resolve_include_and_exclude_same_kind_is_empty() {
    let base = coll(&["x", "y"]);
    let resolved =
        resolve_resource_types(base, &[coll(&["x"])], &[coll(&["x"])], &[], &HashMap::new());
    assert!(resolved.is_empty());
}

#[test]
fn resolve_intersects_each_include_list() {
    let base = coll(&["a", "b", "c"]);
    let resolved =
        resolve_resource_types(base, &[coll(&["a", "b"]), coll(&["b", "c"])], &[], &[], &HashMap::new());
    assert_eq!(resolved, coll(&["b"]));
}

#[test]
fn resolve_ignores_empty_include_lists() {
    let base = coll(&["a", "b"]);
    let resolved = resolve_resource_types(base.clone(), &[coll(&[])], &[], &[], &HashMap::new());
    assert_eq!(resolved, base);
}

#[test]
fn resolve_alternatives_replace_their_origin() {
    let base = coll(&["OldThing", "Other"]);
    let alt_map = HashMap::from([("NewThing".to_string(), "OldThing".to_string())]);
    let resolved = resolve_resource_types(base, &[], &[], &[coll(&["NewThing"])], &alt_map);
    assert_eq!(resolved, coll(&["Other", "NewThing"]));
}

#[test]
fn resolve_alternative_without_origin_mapping_just_unions() {
    let base = coll(&["Other"]);
    let resolved = resolve_resource_types(base, &[], &[], &[coll(&["NewThing"])], &HashMap::new());
    assert_eq!(resolved, coll(&["Other", "NewThing"]));
}

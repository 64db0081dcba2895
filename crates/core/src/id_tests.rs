// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

crate::define_id! {
    pub struct TestId("test");
}

#[test]
fn new_has_prefix_and_length() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("test"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn round_trips_through_string() {
    let id = TestId::new();
    let s = id.to_string();
    let back = TestId::from_string(&s);
    assert_eq!(id, back);
}

#[test]
fn suffix_strips_prefix() {
    let id = TestId::from_string("test0123456789abcdefghi");
    assert_eq!(id.suffix(), "0123456789abcdefghi");
}

#[test]
fn short_truncates_suffix() {
    let id = TestId::from_string("test0123456789abcdefghi");
    assert_eq!(id.short(4), "0123");
}

#[test]
fn distinct_ids_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert_ne!(a, b);
}

#[test]
fn borrow_str_allows_map_lookup_by_str() {
    use std::collections::HashMap;
    let id = TestId::from_string("test0123456789abcdefghi");
    let mut map: HashMap<TestId, u32> = HashMap::new();
    map.insert(id, 42);
    assert_eq!(map.get("test0123456789abcdefghi"), Some(&42));
}

//! Set differences between observed and desired items.
//!
//! Containment is decided by an identity predicate (usually the object
//! name), never by comparing full payloads. Input order is preserved.

/// Desired items with no counterpart in `current`.
pub fn create_set<T: Clone>(current: &[T], desired: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<T> {
    desired
        .iter()
        .filter(|d| !current.iter().any(|c| eq(c, *d)))
        .cloned()
        .collect()
}

/// Current items that are no longer desired.
pub fn delete_set<T: Clone>(current: &[T], desired: &[T], eq: impl Fn(&T, &T) -> bool) -> Vec<T> {
    current
        .iter()
        .filter(|c| !desired.iter().any(|d| eq(*c, d)))
        .cloned()
        .collect()
}

/// Pairs of (current, desired) items that share an identity but whose
/// payload has drifted.
pub fn update_set<'a, T>(
    current: &'a [T],
    desired: &'a [T],
    eq: impl Fn(&T, &T) -> bool,
    drifted: impl Fn(&T, &T) -> bool,
) -> Vec<(&'a T, &'a T)> {
    desired
        .iter()
        .filter_map(|d| current.iter().find(|c| eq(*c, d)).map(|c| (c, d)))
        .filter(|(c, d)| drifted(*c, *d))
        .collect()
}

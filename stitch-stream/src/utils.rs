// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::hash::Hash as StdHash;

/// Removes duplicates, keeping the order in which values were first seen.
pub(crate) fn distinct<T>(values: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Clone + Eq + StdHash,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

//! Type aliases for the collection types used throughout the crate.
//!
//! Hypothesis state numbering must be deterministic for a fixed SUL and
//! oracle, so every map or set whose iteration order is observable uses an
//! insertion-ordered implementation.

use std::collections::{BTreeMap, BTreeSet};

/// Type alias for maps, we use this to hide which type of `HashMap` we are actually using.
pub type Map<K, V> = indexmap::IndexMap<K, V>;
/// Type alias for sets, we use this to hide which type of `HashSet` we are actually using.
pub type Set<S> = indexmap::IndexSet<S>;

/// Type alias for maps that iterate in key order.
pub type OrderedMap<K, V> = BTreeMap<K, V>;
/// Type alias for sets that iterate in element order.
pub type OrderedSet<S> = BTreeSet<S>;

/// Represents a bijective mapping between `L` and `R`, that is a mapping which
/// associates each `L` with precisely one `R` and vice versa.
pub type Bijection<L, R> = bimap::BiBTreeMap<L, R>;

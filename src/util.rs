/// An interned string.
///
/// This is provided by the
/// [`symbol_table`](https://crates.io/crates/symbol_table) crate.
///
/// `circuitry` frequently compares register names, rule names, pattern
/// places and operation names. To keep comparisons fast they are
/// interned: a [`Symbol`] is a 4-byte wrapper around an index into a
/// global table, which cheaply implements `Copy`, `Eq`, `Ord` and
/// `Hash`. The table leaks its strings, which is fine for identifiers.
pub use symbol_table::GlobalSymbol as Symbol;

pub(crate) type BuildHasher = fxhash::FxBuildHasher;

pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, BuildHasher>;
pub(crate) type HashSet<K> = hashbrown::HashSet<K, BuildHasher>;

pub(crate) type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasher>;

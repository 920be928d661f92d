//! # Indexed Maps
//!
//! Keyed containers stored as a structure of arrays.
//!
//! ## Design Philosophy
//!
//! - One dense key array, one or more parallel value columns, one hash index
//! - Every column has the same length after every mutation
//! - Removal is swap-back: O(1), no holes, no stable order
//! - Lookups that miss return `Option`/`bool`, never an error

mod fast_read_map;
mod multi_column_map;
mod sharded_map;

use std::hash::Hash;

pub use fast_read_map::FastReadIndexedMap;
pub use multi_column_map::{ColumnSet, MultiColumnIndexedMap};
pub use sharded_map::ShardedIndexedMap;

/// Key usable by the indexed maps: fixed-size, copyable, hashable.
pub trait MapKey: Copy + Eq + Hash {}

impl<T: Copy + Eq + Hash> MapKey for T {}

//! Property-based tests for the indexed maps.
//!
//! Random add/update/remove sequences are replayed against a `std` map as
//! the model; after every operation the container must agree with the model
//! and keep its parallel arrays consistent.

use proptest::prelude::*;
use std::collections::HashMap;

use strata_core::{AllocHandle, FastReadIndexedMap, MultiColumnIndexedMap, RawArray, ShardedIndexedMap};

// =============================================================================
// GENERATORS
// =============================================================================

#[derive(Debug, Clone)]
enum MapOp {
    Upsert(u16, u32),
    TryAdd(u16, u32),
    Remove(u16),
}

/// Small key space so removes and updates hit existing keys often.
fn map_ops_strategy() -> impl Strategy<Value = Vec<MapOp>> {
    prop::collection::vec(
        prop_oneof![
            (0u16..64, any::<u32>()).prop_map(|(k, v)| MapOp::Upsert(k, v)),
            (0u16..64, any::<u32>()).prop_map(|(k, v)| MapOp::TryAdd(k, v)),
            (0u16..64).prop_map(MapOp::Remove),
        ],
        0..400,
    )
}

// =============================================================================
// FAST-READ MAP
// =============================================================================

proptest! {
    #[test]
    fn prop_fast_read_map_matches_model(ops in map_ops_strategy()) {
        let mut map: FastReadIndexedMap<u16, u32> = FastReadIndexedMap::new(AllocHandle::heap(), 4);
        let mut model: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                MapOp::Upsert(k, v) => {
                    map.add_or_update(k, v);
                    model.insert(k, v);
                }
                MapOp::TryAdd(k, v) => {
                    let added = map.try_add(k, v);
                    prop_assert_eq!(added, !model.contains_key(&k));
                    model.entry(k).or_insert(v);
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(map.try_remove(&k), model.remove(&k));
                    prop_assert!(!map.contains(&k));
                    prop_assert_eq!(map.try_get_value(&k), None);
                }
            }
            prop_assert_eq!(map.keys().len(), map.values().len());
            prop_assert_eq!(map.len(), model.len());
            prop_assert!(map.validate().is_ok());
        }

        for (k, v) in &model {
            prop_assert_eq!(map.try_get_value(k), Some(*v));
        }
    }

    #[test]
    fn prop_swap_back_relocates_last_key(
        len in 2usize..64,
        victim in any::<prop::sample::Index>()
    ) {
        let mut map: FastReadIndexedMap<u32, u32> = FastReadIndexedMap::new(AllocHandle::heap(), len);
        for key in 0..len as u32 {
            map.add_or_update(key, key);
        }
        let slot = victim.index(len);
        let removed = map.keys()[slot];
        let last = map.keys()[len - 1];
        let before: Vec<u32> = map.keys()[..len - 1].to_vec();

        map.try_remove(&removed);

        if slot == len - 1 {
            prop_assert_eq!(map.keys(), &before[..]);
        } else {
            prop_assert_eq!(map.keys()[slot], last);
            prop_assert_eq!(map.slot_of(&last), Some(slot));
        }
        prop_assert!(map.validate().is_ok());
    }

    #[test]
    fn prop_bulk_load_then_lookup(keys in prop::collection::hash_set(any::<u64>(), 0..500)) {
        let keys: Vec<u64> = keys.into_iter().collect();
        let values: Vec<u64> = keys.iter().map(|k| k.wrapping_mul(31)).collect();

        let mut map: FastReadIndexedMap<u64, u64> = FastReadIndexedMap::new(AllocHandle::heap(), 0);
        map.add_range_from_zero(&keys, &values).unwrap();

        prop_assert_eq!(map.len(), keys.len());
        for (k, v) in keys.iter().zip(&values) {
            prop_assert_eq!(map.try_get_value(k), Some(*v));
        }
    }
}

// =============================================================================
// MULTI-COLUMN AND SHARDED MAPS
// =============================================================================

proptest! {
    #[test]
    fn prop_multi_column_columns_stay_aligned(ops in map_ops_strategy()) {
        let mut map: MultiColumnIndexedMap<u16, (u32, u64, u8)> =
            MultiColumnIndexedMap::new(AllocHandle::heap(), 2);
        let mut model: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                MapOp::Upsert(k, v) | MapOp::TryAdd(k, v) => {
                    map.add_or_update(k, (v, u64::from(v) << 1, k as u8));
                    model.insert(k, v);
                }
                MapOp::Remove(k) => {
                    let removed = map.try_remove(&k).map(|row| row.0);
                    prop_assert_eq!(removed, model.remove(&k));
                }
            }
            prop_assert_eq!(map.column::<u32>(0).unwrap().len(), map.len());
            prop_assert_eq!(map.column::<u64>(1).unwrap().len(), map.len());
            prop_assert_eq!(map.column::<u8>(2).unwrap().len(), map.len());
            prop_assert!(map.validate().is_ok());
        }

        for (k, v) in &model {
            prop_assert_eq!(map.try_get_value(k), Some((*v, u64::from(*v) << 1, *k as u8)));
        }
    }

    #[test]
    fn prop_sharded_shard_count_is_ceiling(
        count in 0usize..300,
        shard_capacity in 1usize..40
    ) {
        let mut map: ShardedIndexedMap<u32, u32> =
            ShardedIndexedMap::with_shard_capacity(AllocHandle::heap(), shard_capacity, 4);
        for key in 0..count as u32 {
            prop_assert!(map.try_add(key, !key));
        }

        prop_assert_eq!(map.shard_count(), count.div_ceil(shard_capacity));
        for key in 0..count as u32 {
            prop_assert_eq!(map.try_get_value(&key), Some(!key));
        }
        prop_assert!(map.validate().is_ok());
    }

    #[test]
    fn prop_sharded_matches_model(ops in map_ops_strategy(), shard_capacity in 1usize..16) {
        let mut map: ShardedIndexedMap<u16, u32> =
            ShardedIndexedMap::with_shard_capacity(AllocHandle::heap(), shard_capacity, 2);
        let mut model: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                MapOp::Upsert(k, v) => {
                    map.add_or_update(k, v);
                    model.insert(k, v);
                }
                MapOp::TryAdd(k, v) => {
                    prop_assert_eq!(map.try_add(k, v), !model.contains_key(&k));
                    model.entry(k).or_insert(v);
                }
                MapOp::Remove(k) => {
                    prop_assert_eq!(map.try_remove(&k), model.remove(&k));
                }
            }
            prop_assert_eq!(map.len(), model.len());
            prop_assert!(map.free_shard_index() <= map.shard_count());
        }
        prop_assert!(map.validate().is_ok());
    }
}

// =============================================================================
// RAW ARRAY
// =============================================================================

proptest! {
    #[test]
    fn prop_raw_array_matches_vec(values in prop::collection::vec(any::<i64>(), 0..2000)) {
        let mut array = RawArray::new(AllocHandle::heap());
        for &value in &values {
            array.push(value);
        }
        prop_assert_eq!(array.as_slice(), &values[..]);
        prop_assert!(array.capacity() >= array.len());

        array.truncate(values.len() / 2);
        prop_assert_eq!(array.as_slice(), &values[..values.len() / 2]);
    }
}

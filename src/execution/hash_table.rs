//! An open addressing hash table used by the hash join, hash group by and distinct operators.

use ahash::RandomState;

use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::storage::{CompactStorage, UpdateableStorage, VarlenHeap};
use crate::operators::scalar::value::ScalarValue;

/// The initial number of buckets.
pub const DEFAULT_INITIAL_SIZE: usize = 8 * 1024;
/// The initial capacity of a list of values of duplicate keys.
pub const INITIAL_KV_LIST_CAPACITY: usize = 8;

const EMPTY_BUCKET: usize = usize::MAX;

// All tables use the same seeds so hashes computed by thread-local tables remain valid
// when their entries are merged into the global table.
const SEEDS: [u64; 4] = [0x243f_6a88_85a3_08d3, 0x1319_8a2e_0370_7344, 0xa409_3822_299f_31d0, 0x082e_fa98_ec4e_6c89];

/// Creates a hasher used by hash tables and bloom filters.
pub fn hash_state() -> RandomState {
    RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3])
}

#[derive(Debug)]
struct HashEntry {
    hash: u64,
    keys: Box<[u8]>,
    value: Box<[u8]>,
    /// Values of entries with the same keys.
    overflow: Option<Vec<Box<[u8]>>>,
}

impl HashEntry {
    fn values(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(&self.value)
            .chain(self.overflow.iter().flatten())
            .map(|v| &v[..])
    }
}

/// Keys an entry is looked up by.
#[derive(Clone, Copy)]
enum KeyRef<'a> {
    Values(&'a [ScalarValue]),
    /// Keys serialized by the key storage of the table.
    Stored(&'a [u8]),
}

/// A hash table with linear probing. The number of buckets is a power of two and the table grows
/// when it becomes half full. Values of duplicate keys are stored in a list attached to the entry
/// of the first inserted value.
///
/// Keys and values are serialized by [CompactStorage]s. Lookups compare keys with the serialized bytes,
/// keys are deserialized only by [load_keys](Self::load_keys). Entries can either be placed into buckets
/// immediately or inserted lazily and placed later by [build_lazy](Self::build_lazy).
#[derive(Debug)]
pub struct OaHashTable {
    buckets: Vec<usize>,
    entries: Vec<HashEntry>,
    lazy_entries: Vec<HashEntry>,
    num_values: usize,
    key_storage: CompactStorage,
    value_storage: CompactStorage,
    heap: VarlenHeap,
    hash_state: RandomState,
}

/// A mutable reference to the value of an entry.
pub struct EntryMut<'a> {
    pub layout: &'a UpdateableStorage,
    pub value: &'a mut [u8],
    pub heap: &'a mut VarlenHeap,
}

impl EntryMut<'_> {
    pub fn get(&self, index: usize) -> Result<ScalarValue, ExecutionError> {
        self.layout.get_value(self.value, index, self.heap)
    }

    pub fn set(&mut self, index: usize, value: &ScalarValue) -> Result<(), ExecutionError> {
        self.layout.set_value(self.value, index, value, self.heap)
    }
}

impl OaHashTable {
    /// Creates a hash table with keys and values of the given types.
    pub fn new(key_types: &[DataType], value_types: &[DataType], initial_size: usize) -> Self {
        let num_buckets = initial_size.max(2).next_power_of_two();
        OaHashTable {
            buckets: vec![EMPTY_BUCKET; num_buckets],
            entries: Vec::new(),
            lazy_entries: Vec::new(),
            num_values: 0,
            key_storage: CompactStorage::setup(key_types),
            value_storage: CompactStorage::setup(value_types),
            heap: VarlenHeap::new(),
            hash_state: hash_state(),
        }
    }

    /// Creates an empty table with the same key and value layouts as this table.
    pub fn new_like(&self, initial_size: usize) -> Self {
        OaHashTable::new(self.key_storage.types(), self.value_storage.types(), initial_size)
    }

    /// Computes the hash of the given keys.
    pub fn hash_keys(&self, keys: &[ScalarValue]) -> u64 {
        self.hash_state.hash_one(keys)
    }

    /// Inserts the given key-value pair.
    pub fn insert(&mut self, keys: Vec<ScalarValue>, values: &[ScalarValue]) -> Result<(), ExecutionError> {
        let entry = self.new_entry(&keys, values)?;
        self.num_values += 1;
        self.place(entry)?;
        Ok(())
    }

    /// Stores the given key-value pair. The pair is placed into a bucket by [build_lazy](Self::build_lazy)
    /// or when this table is merged into another table.
    pub fn insert_lazy(&mut self, keys: Vec<ScalarValue>, values: &[ScalarValue]) -> Result<(), ExecutionError> {
        let entry = self.new_entry(&keys, values)?;
        self.num_values += 1;
        self.lazy_entries.push(entry);
        Ok(())
    }

    /// Places all lazily inserted entries.
    pub fn build_lazy(&mut self) -> Result<(), ExecutionError> {
        let lazy_entries = std::mem::take(&mut self.lazy_entries);
        self.reserve(self.entries.len() + lazy_entries.len());
        for entry in lazy_entries {
            self.place(entry)?;
        }
        Ok(())
    }

    /// Grows this table so entries of the given tables can be merged into it without resizing.
    pub fn reserve_lazy(&mut self, tables: &[OaHashTable]) {
        let num_entries: usize = tables.iter().map(|t| t.entries.len() + t.lazy_entries.len()).sum();
        self.reserve(self.entries.len() + self.lazy_entries.len() + num_entries);
    }

    /// Moves all entries of the given table (placed or not) into this table.
    pub fn merge_lazy_unfinished(&mut self, other: OaHashTable) -> Result<(), ExecutionError> {
        let OaHashTable {
            entries,
            lazy_entries,
            heap,
            ..
        } = other;

        self.reserve(self.entries.len() + entries.len() + lazy_entries.len());

        for entry in entries.into_iter().chain(lazy_entries.into_iter()) {
            let HashEntry {
                hash,
                keys,
                value,
                overflow,
            } = entry;
            let keys = rebase(&self.key_storage, keys, &heap, &mut self.heap)?;
            let values = std::iter::once(value).chain(overflow.into_iter().flatten());
            for value in values {
                let value = rebase(&self.value_storage, value, &heap, &mut self.heap)?;
                self.num_values += 1;
                self.place(HashEntry {
                    hash,
                    keys: keys.clone(),
                    value,
                    overflow: None,
                })?;
            }
        }
        Ok(())
    }

    /// Finds an entry with the given keys or inserts a new entry with zeroed value.
    /// Returns `true` and the value of the existing entry or `false` and the value of the new entry.
    pub fn probe_or_insert(&mut self, keys: &[ScalarValue]) -> Result<(bool, EntryMut<'_>), ExecutionError> {
        let hash = self.hash_keys(keys);
        let (found, index) = match self.find_index(hash, KeyRef::Values(keys))? {
            Some(index) => (true, index),
            None => {
                let entry = HashEntry {
                    hash,
                    keys: self.key_storage.store(keys, &mut self.heap)?,
                    value: vec![0u8; self.value_storage.max_storage_size()].into_boxed_slice(),
                    overflow: None,
                };
                self.num_values += 1;
                (false, self.place(entry)?)
            }
        };
        let entry = EntryMut {
            layout: self.value_storage.layout(),
            value: &mut self.entries[index].value,
            heap: &mut self.heap,
        };
        Ok((found, entry))
    }

    /// Returns serialized values of all entries with the given keys.
    pub fn find_all(&self, keys: &[ScalarValue]) -> Result<impl Iterator<Item = &[u8]>, ExecutionError> {
        let hash = self.hash_keys(keys);
        self.find_all_with_hash(hash, keys)
    }

    /// Same as [find_all](Self::find_all) but uses a precomputed hash of the keys.
    pub fn find_all_with_hash(
        &self,
        hash: u64,
        keys: &[ScalarValue],
    ) -> Result<impl Iterator<Item = &[u8]>, ExecutionError> {
        let entry = self.find_index(hash, KeyRef::Values(keys))?.map(|i| &self.entries[i]);
        Ok(entry.into_iter().flat_map(|e| e.values()))
    }

    /// Returns `true` if this table contains an entry with the given keys.
    pub fn contains(&self, keys: &[ScalarValue]) -> Result<bool, ExecutionError> {
        let hash = self.hash_keys(keys);
        Ok(self.find_index(hash, KeyRef::Values(keys))?.is_some())
    }

    /// Loads the prefix of the probe sequence of the given hash into the cache.
    pub fn prefetch_bucket(&self, hash: u64) {
        let bucket = self.buckets[self.bucket_index(hash)];
        if bucket != EMPTY_BUCKET {
            std::hint::black_box(self.entries[bucket].hash);
        }
    }

    /// Returns an iterator over all placed pairs of serialized keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .flat_map(|e| e.values().map(move |v| (&e.keys[..], v)))
    }

    /// Returns an iterator over vectors of placed pairs of serialized keys and values. Each vector contains pairs
    /// of at most `vector_size` entries.
    pub fn vector_iter(&self, vector_size: usize) -> impl Iterator<Item = Vec<(&[u8], &[u8])>> {
        self.entries.chunks(vector_size.max(1)).map(|chunk| {
            chunk
                .iter()
                .flat_map(|e| e.values().map(move |v| (&e.keys[..], v)))
                .collect()
        })
    }

    /// Deserializes the given keys.
    pub fn load_keys(&self, keys: &[u8]) -> Result<Vec<ScalarValue>, ExecutionError> {
        self.key_storage.load_values(keys, &self.heap)
    }

    /// Deserializes the given value.
    pub fn load_value(&self, value: &[u8]) -> Result<Vec<ScalarValue>, ExecutionError> {
        self.value_storage.load_values(value, &self.heap)
    }

    /// The total number of key-value pairs including pairs that have not been placed yet.
    pub fn num_entries(&self) -> usize {
        self.num_values
    }

    /// The number of distinct placed keys.
    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn key_storage(&self) -> &CompactStorage {
        &self.key_storage
    }

    pub fn value_storage(&self) -> &CompactStorage {
        &self.value_storage
    }

    fn new_entry(&mut self, keys: &[ScalarValue], values: &[ScalarValue]) -> Result<HashEntry, ExecutionError> {
        let hash = self.hash_keys(keys);
        let keys = self.key_storage.store(keys, &mut self.heap)?;
        let value = self.value_storage.store(values, &mut self.heap)?;
        Ok(HashEntry {
            hash,
            keys,
            value,
            overflow: None,
        })
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    fn find_index(&self, hash: u64, keys: KeyRef<'_>) -> Result<Option<usize>, ExecutionError> {
        if let KeyRef::Values(values) = keys {
            if values.len() != self.key_storage.num_values() {
                return Err(ExecutionError::argument(format!(
                    "Expected {} keys but got {}",
                    self.key_storage.num_values(),
                    values.len()
                )));
            }
        }
        let mask = self.buckets.len() - 1;
        let mut bucket = self.bucket_index(hash);
        loop {
            let index = self.buckets[bucket];
            if index == EMPTY_BUCKET {
                return Ok(None);
            }
            let entry = &self.entries[index];
            if entry.hash == hash && self.keys_equal(&entry.keys, keys)? {
                return Ok(Some(index));
            }
            bucket = (bucket + 1) & mask;
        }
    }

    fn keys_equal(&self, stored: &[u8], keys: KeyRef<'_>) -> Result<bool, ExecutionError> {
        let layout = self.key_storage.layout();
        for i in 0..layout.num_slots() {
            let equal = match keys {
                KeyRef::Values(values) => layout.value_equals(stored, i, &values[i], &self.heap)?,
                KeyRef::Stored(other) => layout.slot_equals(stored, other, i, &self.heap)?,
            };
            if !equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Places the given entry into a bucket and returns the index of the entry that stores its value.
    fn place(&mut self, entry: HashEntry) -> Result<usize, ExecutionError> {
        if let Some(index) = self.find_index(entry.hash, KeyRef::Stored(&entry.keys))? {
            let existing = &mut self.entries[index];
            let overflow = existing
                .overflow
                .get_or_insert_with(|| Vec::with_capacity(INITIAL_KV_LIST_CAPACITY));
            overflow.push(entry.value);
            if let Some(values) = entry.overflow {
                overflow.extend(values);
            }
            return Ok(index);
        }

        if (self.entries.len() + 1) * 2 > self.buckets.len() {
            self.resize(self.buckets.len() * 2);
        }

        let index = self.entries.len();
        let bucket = self.free_bucket(entry.hash);
        self.buckets[bucket] = index;
        self.entries.push(entry);
        Ok(index)
    }

    fn free_bucket(&self, hash: u64) -> usize {
        let mask = self.buckets.len() - 1;
        let mut bucket = self.bucket_index(hash);
        while self.buckets[bucket] != EMPTY_BUCKET {
            bucket = (bucket + 1) & mask;
        }
        bucket
    }

    fn reserve(&mut self, num_entries: usize) {
        let num_buckets = (num_entries * 2).max(2).next_power_of_two();
        if num_buckets > self.buckets.len() {
            self.resize(num_buckets);
        }
    }

    fn resize(&mut self, num_buckets: usize) {
        log::debug!("Resizing hash table: {} -> {} buckets", self.buckets.len(), num_buckets);

        self.buckets = vec![EMPTY_BUCKET; num_buckets];
        for i in 0..self.entries.len() {
            let bucket = self.free_bucket(self.entries[i].hash);
            self.buckets[bucket] = i;
        }
    }
}

/// Copies variable-length data referenced by the given serialized row into another heap.
fn rebase(
    storage: &CompactStorage,
    bytes: Box<[u8]>,
    from: &VarlenHeap,
    to: &mut VarlenHeap,
) -> Result<Box<[u8]>, ExecutionError> {
    if storage.types().iter().any(|t| t.is_variable_length()) {
        let values = storage.load_values(&bytes, from)?;
        storage.store(&values, to)
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    const INT_KEY: [DataType; 1] = [DataType::Int32];

    fn int(v: i32) -> ScalarValue {
        ScalarValue::Int32(v)
    }

    fn find_all(table: &OaHashTable, key: i32) -> Vec<String> {
        table
            .find_all(&[int(key)])
            .unwrap()
            .map(|v| table.load_value(v).unwrap().iter().join(","))
            .sorted()
            .collect()
    }

    #[test]
    fn insert_and_find() {
        let mut table = OaHashTable::new(&INT_KEY, &[DataType::Int32, DataType::String], 4);
        table.insert(vec![int(1)], &[int(10), ScalarValue::String("a".into())]).unwrap();
        table.insert(vec![int(2)], &[int(20), ScalarValue::Null]).unwrap();
        table.insert(vec![int(1)], &[int(11), ScalarValue::String("b".into())]).unwrap();

        assert_eq!(find_all(&table, 1), vec!["10,'a'", "11,'b'"]);
        assert_eq!(find_all(&table, 2), vec!["20,NULL"]);
        assert!(find_all(&table, 3).is_empty(), "no entries for key 3");

        assert!(table.contains(&[int(2)]).unwrap(), "contains 2");
        assert!(!table.contains(&[int(3)]).unwrap(), "does not contain 3");
        assert_eq!(table.num_entries(), 3);
        assert_eq!(table.num_keys(), 2);
    }

    #[test]
    fn keys_are_serialized() {
        let key_types = [DataType::String, DataType::Int64];
        let mut table = OaHashTable::new(&key_types, &[DataType::Int32], 4);
        let key = |s: &str, i: i64| vec![ScalarValue::String(s.into()), ScalarValue::Int64(i)];

        table.insert(key("ab", 1), &[int(1)]).unwrap();
        table.insert(key("ab", 2), &[int(2)]).unwrap();
        table.insert(vec![ScalarValue::Null, ScalarValue::Int64(1)], &[int(3)]).unwrap();
        table.insert(key("ab", 1), &[int(4)]).unwrap();

        let (stored_keys, _) = table.iter().next().unwrap();
        assert_eq!(stored_keys.len(), table.key_storage().max_storage_size());
        assert_eq!(table.load_keys(stored_keys).unwrap(), key("ab", 1));

        assert_eq!(table.find_all(&key("ab", 1)).unwrap().count(), 2);
        assert_eq!(table.find_all(&key("ab", 2)).unwrap().count(), 1);
        assert_eq!(table.find_all(&key("a", 1)).unwrap().count(), 0);
        assert!(table.contains(&[ScalarValue::Null, ScalarValue::Int64(1)]).unwrap(), "NULL key");
        assert_eq!(table.num_keys(), 3);

        let err = table.find_all(&[int(1)]).err().expect("wrong number of keys");
        assert!(matches!(err, ExecutionError::Argument(_)), "unexpected error: {}", err);
    }

    #[test]
    fn grows_at_half_load() {
        let mut table = OaHashTable::new(&INT_KEY, &[DataType::Int32], 4);
        for i in 0..100 {
            table.insert(vec![int(i)], &[int(i)]).unwrap();
        }
        assert_eq!(table.num_keys(), 100);
        assert!(table.num_buckets() >= 200, "buckets: {}", table.num_buckets());
        assert!(table.num_buckets().is_power_of_two(), "buckets: {}", table.num_buckets());
        for i in 0..100 {
            assert_eq!(find_all(&table, i), vec![i.to_string()]);
        }
    }

    #[test]
    fn lazy_build() {
        let mut table = OaHashTable::new(&INT_KEY, &[DataType::Int32], 2);
        for i in 0..10 {
            table.insert_lazy(vec![int(i % 3)], &[int(i)]).unwrap();
        }
        assert!(!table.contains(&[int(0)]).unwrap(), "lazy entries are not placed");

        table.build_lazy().unwrap();
        assert_eq!(find_all(&table, 0), vec!["0", "3", "6", "9"]);
        assert_eq!(table.num_entries(), 10);
        assert_eq!(table.num_keys(), 3);
    }

    #[test]
    fn merge_thread_local_tables() {
        let mut global = OaHashTable::new(&[DataType::String], &[DataType::String], 2);
        let mut local1 = global.new_like(2);
        let mut local2 = global.new_like(2);
        let key = |s: &str| vec![ScalarValue::String(s.into())];

        local1.insert_lazy(key("x"), &[ScalarValue::String("a".into())]).unwrap();
        local2.insert_lazy(key("x"), &[ScalarValue::String("b".into())]).unwrap();
        local2.insert(key("yy"), &[ScalarValue::String("c".into())]).unwrap();

        let locals = vec![local1, local2];
        global.reserve_lazy(&locals);
        for local in locals {
            global.merge_lazy_unfinished(local).unwrap();
        }

        let values = |k: &str| -> Vec<String> {
            global
                .find_all(&key(k))
                .unwrap()
                .map(|v| global.load_value(v).unwrap().iter().join(","))
                .sorted()
                .collect()
        };
        assert_eq!(values("x"), vec!["'a'", "'b'"]);
        assert_eq!(values("yy"), vec!["'c'"]);
        assert_eq!(global.num_entries(), 3);
        assert_eq!(global.num_keys(), 2);

        let keys: Vec<Vec<ScalarValue>> =
            global.iter().map(|(k, _)| global.load_keys(k).unwrap()).sorted().dedup().collect();
        assert_eq!(keys, vec![key("x"), key("yy")]);
    }

    #[test]
    fn probe_or_insert() {
        let mut table = OaHashTable::new(&INT_KEY, &[DataType::Int64], 4);
        for key in [1, 2, 1, 1].iter() {
            let (found, mut entry) = table.probe_or_insert(&[int(*key)]).unwrap();
            if found {
                let count = entry.get(0).unwrap().as_i64().unwrap();
                entry.set(0, &ScalarValue::Int64(count + 1)).unwrap();
            } else {
                entry.set(0, &ScalarValue::Int64(1)).unwrap();
            }
        }
        assert_eq!(find_all(&table, 1), vec!["3"]);
        assert_eq!(find_all(&table, 2), vec!["1"]);
    }

    #[test]
    fn vector_iter() {
        let mut table = OaHashTable::new(&INT_KEY, &[DataType::Int32], 4);
        for i in 0..5 {
            table.insert(vec![int(i)], &[int(i)]).unwrap();
        }
        let sizes: Vec<usize> = table.vector_iter(2).map(|v| v.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(table.iter().count(), 5);
    }
}

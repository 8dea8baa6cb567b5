use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::storage::{UpdateableStorage, VarlenHeap};
use crate::operators::scalar::value::ScalarValue;

/// Serializes rows of values of fixed types into byte buffers.
#[derive(Debug, Clone, Default)]
pub struct CompactStorage {
    storage: UpdateableStorage,
}

impl CompactStorage {
    /// Creates a storage for rows of the given types.
    pub fn setup(types: &[DataType]) -> Self {
        let mut storage = UpdateableStorage::new();
        for data_type in types {
            storage.add_type(*data_type);
        }
        storage.finalize();
        CompactStorage { storage }
    }

    /// The number of bytes required to store a row.
    pub fn max_storage_size(&self) -> usize {
        self.storage.storage_size()
    }

    pub fn num_values(&self) -> usize {
        self.storage.num_slots()
    }

    pub fn types(&self) -> &[DataType] {
        self.storage.types()
    }

    /// The layout of a row.
    pub fn layout(&self) -> &UpdateableStorage {
        &self.storage
    }

    /// Writes the given values into the given buffer. Variable-length data is written into the heap.
    pub fn store_values(
        &self,
        bytes: &mut [u8],
        values: &[ScalarValue],
        heap: &mut VarlenHeap,
    ) -> Result<(), ExecutionError> {
        if values.len() != self.storage.num_slots() {
            return Err(ExecutionError::argument(format!(
                "Expected {} values but got {}",
                self.storage.num_slots(),
                values.len()
            )));
        }
        for (i, value) in values.iter().enumerate() {
            if value.is_null() {
                self.storage.set_null(bytes, i)?;
            } else {
                self.storage.set_value_skip_null(bytes, i, value, heap)?;
            }
        }
        if self.storage.num_slots() > 0 {
            let mut bitmap = self.storage.null_bitmap(bytes);
            for (i, value) in values.iter().enumerate() {
                bitmap.set_null(i, value.is_null());
            }
            bitmap.write_back();
        }
        Ok(())
    }

    /// Serializes the given values into a new buffer.
    pub fn store(&self, values: &[ScalarValue], heap: &mut VarlenHeap) -> Result<Box<[u8]>, ExecutionError> {
        let mut bytes = vec![0u8; self.max_storage_size()].into_boxed_slice();
        self.store_values(&mut bytes, values, heap)?;
        Ok(bytes)
    }

    /// Reads all values from the given buffer.
    pub fn load_values(&self, bytes: &[u8], heap: &VarlenHeap) -> Result<Vec<ScalarValue>, ExecutionError> {
        let mut values = Vec::with_capacity(self.storage.num_slots());
        for i in 0..self.storage.num_slots() {
            values.push(self.storage.get_value(bytes, i, heap)?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_and_load_rows() {
        let storage = CompactStorage::setup(&[DataType::Int32, DataType::String, DataType::Bool]);
        let mut heap = VarlenHeap::new();

        let row1 = vec![ScalarValue::Int32(1), ScalarValue::String("a".into()), ScalarValue::Null];
        let row2 = vec![ScalarValue::Null, ScalarValue::String("bc".into()), ScalarValue::Bool(false)];

        let bytes1 = storage.store(&row1, &mut heap).unwrap();
        let bytes2 = storage.store(&row2, &mut heap).unwrap();

        assert_eq!(bytes1.len(), storage.max_storage_size());
        assert_eq!(storage.load_values(&bytes1, &heap).unwrap(), row1);
        assert_eq!(storage.load_values(&bytes2, &heap).unwrap(), row2);
        assert_eq!(heap.size(), 3);
    }

    #[test]
    fn null_values_write_null_markers() {
        let storage = CompactStorage::setup(&[DataType::Int32, DataType::String]);
        let mut heap = VarlenHeap::new();

        let bytes = storage.store(&[ScalarValue::Null, ScalarValue::Null], &mut heap).unwrap();
        let layout = storage.layout();

        assert_eq!(layout.get_value_skip_null(&bytes, 0, &heap).unwrap(), ScalarValue::Int32(i32::MIN));
        assert_eq!(layout.get_value_skip_null(&bytes, 1, &heap).unwrap(), ScalarValue::Null);

        let length = layout.entries().iter().find(|e| e.logical_index == 1 && e.is_length).unwrap();
        let raw = &bytes[length.offset..length.offset + 4];
        assert_eq!(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), -1);
        assert_eq!(storage.load_values(&bytes, &heap).unwrap(), vec![ScalarValue::Null, ScalarValue::Null]);
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn wrong_number_of_values() {
        let storage = CompactStorage::setup(&[DataType::Int32]);
        let mut heap = VarlenHeap::new();
        let err = storage.store(&[], &mut heap).expect_err("no values");
        assert!(matches!(err, ExecutionError::Argument(_)), "unexpected error: {}", err);
    }
}

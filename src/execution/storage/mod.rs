//! Byte-level storage of typed values.
//!
//! [UpdateableStorage] describes the layout of a storage region: values are identified by
//! their logical index (the order in which their types were added), while the physical layout packs
//! slots by descending width and ends with a NULL bitmap. [CompactStorage] uses that layout to
//! serialize rows into byte buffers.

use std::convert::TryInto;

use crate::datatypes::{DataType, PhysicalType};
use crate::error::ExecutionError;
use crate::operators::scalar::value::{
    date_to_days, days_to_date, micros_to_timestamp, timestamp_to_micros, ScalarValue,
};

pub mod compact;
pub mod null_bitmap;
pub mod varlen;

pub use compact::CompactStorage;
pub use null_bitmap::NullBitmap;
pub use varlen::VarlenHeap;

use null_bitmap::read_null_bit;

/// Describes a physical slot of a storage region.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EntryInfo {
    /// The position of this slot in the physical layout.
    pub physical_index: usize,
    /// The logical slot this physical slot belongs to.
    pub logical_index: usize,
    /// Whether this slot stores the length of a variable-length value.
    pub is_length: bool,
    pub physical_type: PhysicalType,
    pub num_bytes: usize,
    /// The offset of this slot from the start of a region.
    pub offset: usize,
}

/// The layout of a storage region. Types are added with [add_type](Self::add_type), then the layout
/// is computed by [finalize](Self::finalize).
#[derive(Debug, Clone, Default)]
pub struct UpdateableStorage {
    types: Vec<DataType>,
    entries: Vec<EntryInfo>,
    storage_size: usize,
    null_bitmap_offset: usize,
    finalized: bool,
}

impl UpdateableStorage {
    pub fn new() -> Self {
        UpdateableStorage::default()
    }

    /// Adds a logical slot of the given type and returns its logical index.
    ///
    /// # Panics
    ///
    /// This method panics if the layout has already been finalized.
    pub fn add_type(&mut self, data_type: DataType) -> usize {
        assert!(!self.finalized, "Can not add a type to a finalized storage");
        self.types.push(data_type);
        self.types.len() - 1
    }

    /// Computes the physical layout. Calling this method more than once has no effect.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }

        let mut entries = Vec::with_capacity(self.types.len());
        for (logical_index, data_type) in self.types.iter().enumerate() {
            let materialization = data_type.materialization();
            entries.push(Self::new_entry(logical_index, false, materialization.value));
            if let Some(length) = materialization.length {
                entries.push(Self::new_entry(logical_index, true, length));
            }
        }
        // Wider slots go first so narrower slots do not require padding.
        entries.sort_by(|a, b| b.num_bytes.cmp(&a.num_bytes));

        let mut offset = 0;
        for (physical_index, entry) in entries.iter_mut().enumerate() {
            entry.physical_index = physical_index;
            entry.offset = offset;
            offset += entry.num_bytes;
        }

        self.null_bitmap_offset = offset;
        if !self.types.is_empty() {
            offset += NullBitmap::num_bytes(self.types.len());
        }
        self.entries = entries;
        self.storage_size = offset;
        self.finalized = true;
    }

    fn new_entry(logical_index: usize, is_length: bool, physical_type: PhysicalType) -> EntryInfo {
        EntryInfo {
            physical_index: 0,
            logical_index,
            is_length,
            physical_type,
            num_bytes: physical_type.num_bytes(),
            offset: 0,
        }
    }

    /// The number of bytes of a storage region including the NULL bitmap.
    pub fn storage_size(&self) -> usize {
        self.storage_size
    }

    /// The number of logical slots.
    pub fn num_slots(&self) -> usize {
        self.types.len()
    }

    pub fn data_type(&self, index: usize) -> DataType {
        self.types[index]
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// Physical slots in the order of their offsets.
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn null_bitmap_offset(&self) -> usize {
        self.null_bitmap_offset
    }

    /// Returns a NULL bitmap of the given region.
    pub fn null_bitmap<'a>(&self, bytes: &'a mut [u8]) -> NullBitmap<'a> {
        NullBitmap::new(&mut bytes[self.null_bitmap_offset..], self.types.len())
    }

    /// Reads the value of the given logical slot. Returns NULL if the slot is NULL.
    pub fn get_value(&self, bytes: &[u8], index: usize, heap: &VarlenHeap) -> Result<ScalarValue, ExecutionError> {
        self.check_access(bytes, index)?;
        if read_null_bit(&bytes[self.null_bitmap_offset..], index) {
            Ok(ScalarValue::Null)
        } else {
            self.get_value_skip_null(bytes, index, heap)
        }
    }

    /// Reads the value of the given logical slot without checking the NULL bitmap.
    /// A NULL slot returns the NULL marker of its type.
    pub fn get_value_skip_null(
        &self,
        bytes: &[u8],
        index: usize,
        heap: &VarlenHeap,
    ) -> Result<ScalarValue, ExecutionError> {
        self.check_access(bytes, index)?;
        let (value_entry, length_entry) = self.find_entries(index)?;
        let data_type = self.types[index];

        let value = match data_type {
            DataType::Null => ScalarValue::Null,
            DataType::Bool => ScalarValue::Bool(read_i8(bytes, value_entry.offset)? != 0),
            DataType::TinyInt => ScalarValue::TinyInt(read_i8(bytes, value_entry.offset)?),
            DataType::SmallInt => ScalarValue::SmallInt(read_i16(bytes, value_entry.offset)?),
            DataType::Int32 => ScalarValue::Int32(read_i32(bytes, value_entry.offset)?),
            DataType::Int64 => ScalarValue::Int64(read_i64(bytes, value_entry.offset)?),
            DataType::Decimal => ScalarValue::decimal(read_f64(bytes, value_entry.offset)?),
            DataType::Date => {
                let days = read_i32(bytes, value_entry.offset)?;
                let date =
                    days_to_date(days).ok_or_else(|| ExecutionError::internal(format!("Invalid date: {}", days)))?;
                ScalarValue::Date(date)
            }
            DataType::Timestamp => {
                let micros = read_i64(bytes, value_entry.offset)?;
                let ts = micros_to_timestamp(micros)
                    .ok_or_else(|| ExecutionError::internal(format!("Invalid timestamp: {}", micros)))?;
                ScalarValue::Timestamp(ts)
            }
            DataType::String => match string_bytes(bytes, index, value_entry, length_entry, heap)? {
                Some(data) => {
                    let value = String::from_utf8(data.to_vec())
                        .map_err(|e| ExecutionError::internal(format!("Invalid string in slot {}: {}", index, e)))?;
                    ScalarValue::String(value)
                }
                None => ScalarValue::Null,
            },
        };
        Ok(value)
    }

    /// Writes the given value into the given logical slot and updates the NULL bitmap.
    pub fn set_value(
        &self,
        bytes: &mut [u8],
        index: usize,
        value: &ScalarValue,
        heap: &mut VarlenHeap,
    ) -> Result<(), ExecutionError> {
        if value.is_null() {
            return self.set_null(bytes, index);
        }
        self.check_access(bytes, index)?;
        {
            let mut bitmap = self.null_bitmap(bytes);
            bitmap.set_null(index, false);
            bitmap.write_back();
        }
        self.set_value_skip_null(bytes, index, value, heap)
    }

    /// Writes the given non-NULL value into the given logical slot. The NULL bitmap is not updated.
    pub fn set_value_skip_null(
        &self,
        bytes: &mut [u8],
        index: usize,
        value: &ScalarValue,
        heap: &mut VarlenHeap,
    ) -> Result<(), ExecutionError> {
        self.check_access(bytes, index)?;
        let (value_entry, length_entry) = self.find_entries(index)?;
        let data_type = self.types[index];
        let value = match value.cast(data_type) {
            Some(value) => value,
            None => return Err(ExecutionError::type_mismatch(data_type, value.data_type())),
        };
        let offset = value_entry.offset;

        match &value {
            ScalarValue::Null => write_null_marker(bytes, value_entry),
            ScalarValue::String(v) => {
                let length_entry = length_entry
                    .ok_or_else(|| ExecutionError::internal(format!("No length slot for slot {}", index)))?;
                let len: i32 = v
                    .len()
                    .try_into()
                    .map_err(|_| ExecutionError::argument(format!("String is too long: {} bytes", v.len())))?;
                let heap_offset = heap.add(v.as_bytes());
                write_bytes(bytes, offset, &heap_offset.to_le_bytes());
                write_bytes(bytes, length_entry.offset, &len.to_le_bytes());
            }
            value => {
                let mut buf = [0u8; 8];
                let len = encode_fixed(value, &mut buf);
                write_bytes(bytes, offset, &buf[..len]);
            }
        }
        Ok(())
    }

    /// Compares the value of the given logical slot with the given value without deserializing the slot.
    /// Fixed-width values are compared as bytes and strings are compared with their bytes in the heap.
    /// NULL is equal to NULL.
    pub fn value_equals(
        &self,
        bytes: &[u8],
        index: usize,
        value: &ScalarValue,
        heap: &VarlenHeap,
    ) -> Result<bool, ExecutionError> {
        self.check_access(bytes, index)?;
        let is_null = read_null_bit(&bytes[self.null_bitmap_offset..], index);
        if is_null || value.is_null() {
            return Ok(is_null && value.is_null());
        }
        let (value_entry, length_entry) = self.find_entries(index)?;
        let value = match value.cast(self.types[index]) {
            Some(value) => value,
            None => return Ok(false),
        };
        match &value {
            ScalarValue::String(v) => {
                let stored = string_bytes(bytes, index, value_entry, length_entry, heap)?;
                Ok(stored == Some(v.as_bytes()))
            }
            value => {
                let mut buf = [0u8; 8];
                let len = encode_fixed(value, &mut buf);
                Ok(bytes[value_entry.offset..value_entry.offset + value_entry.num_bytes] == buf[..len])
            }
        }
    }

    /// Compares the values of the given logical slot of two storage regions whose variable-length data
    /// is stored in the given heap. NULL is equal to NULL.
    pub fn slot_equals(
        &self,
        left: &[u8],
        right: &[u8],
        index: usize,
        heap: &VarlenHeap,
    ) -> Result<bool, ExecutionError> {
        self.check_access(left, index)?;
        self.check_access(right, index)?;
        let left_null = read_null_bit(&left[self.null_bitmap_offset..], index);
        let right_null = read_null_bit(&right[self.null_bitmap_offset..], index);
        if left_null || right_null {
            return Ok(left_null && right_null);
        }
        let (value_entry, length_entry) = self.find_entries(index)?;
        if self.types[index].is_variable_length() {
            let l = string_bytes(left, index, value_entry, length_entry, heap)?;
            let r = string_bytes(right, index, value_entry, length_entry, heap)?;
            Ok(l == r)
        } else {
            let range = value_entry.offset..value_entry.offset + value_entry.num_bytes;
            Ok(left[range.clone()] == right[range])
        }
    }

    /// Marks the given logical slot as NULL and writes the NULL marker of its type into the slot.
    pub fn set_null(&self, bytes: &mut [u8], index: usize) -> Result<(), ExecutionError> {
        self.check_access(bytes, index)?;
        let (value_entry, length_entry) = self.find_entries(index)?;
        write_null_marker(bytes, value_entry);
        if let Some(length_entry) = length_entry {
            write_bytes(bytes, length_entry.offset, &(-1i32).to_le_bytes());
        }
        let mut bitmap = self.null_bitmap(bytes);
        bitmap.set_null(index, true);
        bitmap.write_back();
        Ok(())
    }

    fn find_entries(&self, index: usize) -> Result<(&EntryInfo, Option<&EntryInfo>), ExecutionError> {
        let mut value = None;
        let mut length = None;
        for entry in self.entries.iter().filter(|e| e.logical_index == index) {
            if entry.is_length {
                length = Some(entry);
            } else {
                value = Some(entry);
            }
        }
        match value {
            Some(value) => Ok((value, length)),
            None => Err(ExecutionError::argument(format!("Unknown slot: {}", index))),
        }
    }

    fn check_access(&self, bytes: &[u8], index: usize) -> Result<(), ExecutionError> {
        assert!(self.finalized, "Storage layout has not been finalized");
        if index >= self.types.len() {
            return Err(ExecutionError::argument(format!(
                "Slot index {} is out of bounds. Number of slots: {}",
                index,
                self.types.len()
            )));
        }
        if bytes.len() < self.storage_size {
            return Err(ExecutionError::argument(format!(
                "Storage region is too small. Expected: {} bytes. Got: {}",
                self.storage_size,
                bytes.len()
            )));
        }
        Ok(())
    }
}

fn write_null_marker(bytes: &mut [u8], entry: &EntryInfo) {
    let offset = entry.offset;
    match entry.physical_type {
        PhysicalType::Int8 => write_bytes(bytes, offset, &i8::MIN.to_le_bytes()),
        PhysicalType::Int16 => write_bytes(bytes, offset, &i16::MIN.to_le_bytes()),
        PhysicalType::Int32 => write_bytes(bytes, offset, &i32::MIN.to_le_bytes()),
        PhysicalType::Int64 => write_bytes(bytes, offset, &i64::MIN.to_le_bytes()),
        PhysicalType::Double => write_bytes(bytes, offset, &f64::MIN.to_le_bytes()),
        PhysicalType::Offset => write_bytes(bytes, offset, &u64::MAX.to_le_bytes()),
    }
}

/// Writes the little-endian bytes of a fixed-width value into the given buffer and returns their number.
fn encode_fixed(value: &ScalarValue, buf: &mut [u8; 8]) -> usize {
    fn put(buf: &mut [u8; 8], bytes: &[u8]) -> usize {
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len()
    }
    match value {
        ScalarValue::Null | ScalarValue::String(_) => 0,
        ScalarValue::Bool(v) => put(buf, &(*v as i8).to_le_bytes()),
        ScalarValue::TinyInt(v) => put(buf, &v.to_le_bytes()),
        ScalarValue::SmallInt(v) => put(buf, &v.to_le_bytes()),
        ScalarValue::Int32(v) => put(buf, &v.to_le_bytes()),
        ScalarValue::Int64(v) => put(buf, &v.to_le_bytes()),
        ScalarValue::Decimal(v) => put(buf, &v.0.to_le_bytes()),
        ScalarValue::Date(v) => put(buf, &date_to_days(v).to_le_bytes()),
        ScalarValue::Timestamp(v) => put(buf, &timestamp_to_micros(v).to_le_bytes()),
    }
}

/// Returns the heap bytes of a string slot or `None` if the slot holds the NULL marker.
fn string_bytes<'h>(
    bytes: &[u8],
    index: usize,
    value_entry: &EntryInfo,
    length_entry: Option<&EntryInfo>,
    heap: &'h VarlenHeap,
) -> Result<Option<&'h [u8]>, ExecutionError> {
    let length_entry =
        length_entry.ok_or_else(|| ExecutionError::internal(format!("No length slot for slot {}", index)))?;
    let offset = read_i64(bytes, value_entry.offset)? as u64;
    let len = read_i32(bytes, length_entry.offset)?;
    if offset == u64::MAX || len < 0 {
        return Ok(None);
    }
    heap.get(offset, len as usize).map(Some)
}

fn write_bytes(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], ExecutionError> {
    bytes
        .get(offset..offset + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| ExecutionError::internal(format!("Can not read {} bytes at offset {}", N, offset)))
}

fn read_i8(bytes: &[u8], offset: usize) -> Result<i8, ExecutionError> {
    read_array::<1>(bytes, offset).map(i8::from_le_bytes)
}

fn read_i16(bytes: &[u8], offset: usize) -> Result<i16, ExecutionError> {
    read_array::<2>(bytes, offset).map(i16::from_le_bytes)
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, ExecutionError> {
    read_array::<4>(bytes, offset).map(i32::from_le_bytes)
}

fn read_i64(bytes: &[u8], offset: usize) -> Result<i64, ExecutionError> {
    read_array::<8>(bytes, offset).map(i64::from_le_bytes)
}

fn read_f64(bytes: &[u8], offset: usize) -> Result<f64, ExecutionError> {
    read_array::<8>(bytes, offset).map(f64::from_le_bytes)
}

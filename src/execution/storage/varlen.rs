use crate::error::ExecutionError;

/// An append-only heap that stores variable-length values referenced from fixed-size storage slots.
#[derive(Debug, Clone, Default)]
pub struct VarlenHeap {
    data: Vec<u8>,
}

impl VarlenHeap {
    pub fn new() -> Self {
        VarlenHeap::default()
    }

    /// Copies the given bytes into this heap and returns their offset.
    pub fn add(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Returns the bytes stored at the given offset.
    pub fn get(&self, offset: u64, len: usize) -> Result<&[u8], ExecutionError> {
        let start = offset as usize;
        let end = start.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[start..end]),
            None => Err(ExecutionError::internal(format!(
                "Varlen value out of bounds. Offset: {} length: {} heap size: {}",
                offset,
                len,
                self.data.len()
            ))),
        }
    }

    /// The number of bytes stored in this heap.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

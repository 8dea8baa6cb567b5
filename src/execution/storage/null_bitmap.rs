/// A bitmap that tracks NULL values of a storage region. Bit `i` is set when slot `i` is NULL.
///
/// Bytes of the bitmap are loaded into a working copy when they are accessed for the first time
/// and written back to the underlying region only by [write_back](Self::write_back).
#[derive(Debug)]
pub struct NullBitmap<'a> {
    bytes: &'a mut [u8],
    num_slots: usize,
    cache: Vec<Option<u8>>,
    dirty: Vec<bool>,
}

impl<'a> NullBitmap<'a> {
    /// The number of bytes required to store a bitmap for the given number of slots.
    pub fn num_bytes(num_slots: usize) -> usize {
        (num_slots + 7) / 8
    }

    /// Creates a bitmap over the given bytes.
    ///
    /// # Panics
    ///
    /// This method panics if the region is too small to store a bitmap of the given number of slots.
    pub fn new(bytes: &'a mut [u8], num_slots: usize) -> Self {
        let num_bytes = Self::num_bytes(num_slots);
        assert!(
            bytes.len() >= num_bytes,
            "Bitmap of {} slots requires {} bytes but got {}",
            num_slots,
            num_bytes,
            bytes.len()
        );
        NullBitmap {
            bytes,
            num_slots,
            cache: vec![None; num_bytes],
            dirty: vec![false; num_bytes],
        }
    }

    /// Marks all slots as NULL.
    pub fn init_all_null(&mut self) {
        for i in 0..self.cache.len() {
            self.cache[i] = Some(0xFF);
            self.dirty[i] = true;
        }
    }

    pub fn is_null(&mut self, slot: usize) -> bool {
        self.check_slot(slot);
        let byte = self.load_byte(slot / 8);
        byte & (1 << (slot % 8)) != 0
    }

    pub fn set_null(&mut self, slot: usize, is_null: bool) {
        self.check_slot(slot);
        let pos = slot / 8;
        let byte = self.load_byte(pos);
        let mask = 1 << (slot % 8);
        let byte = if is_null { byte | mask } else { byte & !mask };
        self.cache[pos] = Some(byte);
        self.dirty[pos] = true;
    }

    /// Writes modified bytes to the underlying region.
    pub fn write_back(&mut self) {
        for (pos, dirty) in self.dirty.iter_mut().enumerate() {
            if *dirty {
                if let Some(byte) = self.cache[pos] {
                    self.bytes[pos] = byte;
                }
                *dirty = false;
            }
        }
    }

    fn load_byte(&mut self, pos: usize) -> u8 {
        match self.cache[pos] {
            Some(byte) => byte,
            None => {
                let byte = self.bytes[pos];
                self.cache[pos] = Some(byte);
                byte
            }
        }
    }

    fn check_slot(&self, slot: usize) {
        assert!(slot < self.num_slots, "Slot {} is out of bounds. Number of slots: {}", slot, self.num_slots);
    }
}

/// Reads the NULL bit of the given slot directly from a bitmap region.
pub fn read_null_bit(bytes: &[u8], slot: usize) -> bool {
    bytes[slot / 8] & (1 << (slot % 8)) != 0
}

use crate::error::BufferError;

/// Fixed-size strand of packed colors, one `bytes_per_color` slot per pixel
#[derive(Debug, Clone)]
pub struct PixelColorBuffer {
    data: Vec<u8>,
    count: usize,
    bytes_per_color: usize,
}

impl PixelColorBuffer {
    pub fn new(count: usize, bytes_per_color: usize) -> Self {
        PixelColorBuffer {
            data: vec![0u8; count * bytes_per_color],
            count,
            bytes_per_color,
        }
    }

    #[allow(dead_code)]
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bytes_per_color(&self) -> usize {
        self.bytes_per_color
    }

    pub fn get(&self, index: usize) -> Result<&[u8], BufferError> {
        let range = self.slot(index)?;
        Ok(&self.data[range])
    }

    /// Replace one slot. A color of the wrong length leaves the slot untouched.
    pub fn set(&mut self, index: usize, color: &[u8]) -> Result<(), BufferError> {
        let range = self.slot(index)?;
        if color.len() != self.bytes_per_color {
            return Err(BufferError::Length {
                expected: self.bytes_per_color,
                actual: color.len(),
            });
        }

        self.data[range].copy_from_slice(color);
        Ok(())
    }

    /// The whole strand, slot after slot
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn slot(&self, index: usize) -> Result<std::ops::Range<usize>, BufferError> {
        if index >= self.count {
            return Err(BufferError::Index { index, count: self.count });
        }
        let start = index * self.bytes_per_color;
        Ok(start..start + self.bytes_per_color)
    }
}

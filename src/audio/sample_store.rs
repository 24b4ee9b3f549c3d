/// Fixed-capacity stereo sample storage owned by one layer.
///
/// Allocated once at construction; reads and writes outside the capacity are
/// ignored rather than panicking so the block callback can never fault here.
#[derive(Debug, Clone)]
pub struct SampleStore {
    left: Box<[f32]>,
    right: Box<[f32]>,
}

impl SampleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            left: vec![0.0; capacity].into_boxed_slice(),
            right: vec![0.0; capacity].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Stores one stereo frame. Returns false when `index` is past the end.
    #[inline]
    pub fn write(&mut self, index: usize, left: f32, right: f32) -> bool {
        match (self.left.get_mut(index), self.right.get_mut(index)) {
            (Some(l), Some(r)) => {
                *l = left;
                *r = right;
                true
            }
            _ => false,
        }
    }

    /// Reads one stereo frame; out-of-range indices read as silence.
    #[inline]
    pub fn read(&self, index: usize) -> (f32, f32) {
        (
            self.left.get(index).copied().unwrap_or(0.0),
            self.right.get(index).copied().unwrap_or(0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read() {
        let mut store = SampleStore::new(4);
        assert_eq!(store.capacity(), 4);
        assert!(store.write(2, 0.25, -0.5));
        assert_eq!(store.read(2), (0.25, -0.5));
        assert_eq!(store.read(0), (0.0, 0.0));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut store = SampleStore::new(2);
        assert!(!store.write(2, 1.0, 1.0));
        assert_eq!(store.read(2), (0.0, 0.0));
        assert_eq!(store.read(usize::MAX), (0.0, 0.0));
    }
}

//! # Arena Allocator
//!
//! Fixed-capacity bump allocator backing the private context of every
//! opened sensor driver.
//!
//! The region is created once at startup and never grows. Allocations hand
//! out [`ArenaHandle`]s instead of pointers; a handle is only valid for the
//! generation it was issued in, so contexts recycled by [`Arena::reset`]
//! cannot be reached through old handles.

use crate::error::{FetcherError, Result};

/// Bounds-checked reference to a range inside an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaHandle {
    offset: usize,
    len: usize,
    generation: u32,
}

impl ArenaHandle {
    /// Size of the referenced range in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for zero-size contexts
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset inside the arena
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Bump allocator over one fixed region
#[derive(Debug)]
pub struct Arena {
    region: Box<[u8]>,
    cursor: usize,
    generation: u32,
}

impl Arena {
    /// Create an arena with `capacity` bytes of backing storage
    ///
    /// # Examples
    ///
    /// ```
    /// use fetcher::arena::Arena;
    ///
    /// let mut arena = Arena::with_capacity(64);
    /// let ctx = arena.allocate(16, 4).unwrap();
    /// assert_eq!(arena.get(ctx).unwrap().len(), 16);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            region: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            generation: 0,
        }
    }

    /// Total size of the backing region
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Bytes handed out since the last reset (including alignment padding)
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes still available before alignment
    pub fn remaining(&self) -> usize {
        self.region.len() - self.cursor
    }

    /// Carve `size` bytes aligned to `align` from the region
    ///
    /// The returned range is not zeroed.
    ///
    /// # Errors
    ///
    /// * `InvalidAlignment` if `align` is not a power of two
    /// * `OutOfArena` if the aligned request does not fit; the cursor is
    ///   left untouched
    pub fn allocate(&mut self, size: usize, align: usize) -> Result<ArenaHandle> {
        if !align.is_power_of_two() {
            return Err(FetcherError::InvalidAlignment(align));
        }

        if size == 0 {
            return Ok(ArenaHandle {
                offset: self.cursor,
                len: 0,
                generation: self.generation,
            });
        }

        let available = self.remaining();
        let offset = self
            .cursor
            .checked_add(align - 1)
            .map(|value| value & !(align - 1))
            .ok_or(FetcherError::OutOfArena { requested: size, available })?;
        let end = offset
            .checked_add(size)
            .ok_or(FetcherError::OutOfArena { requested: size, available })?;

        if end > self.region.len() {
            return Err(FetcherError::OutOfArena { requested: size, available });
        }

        self.cursor = end;
        Ok(ArenaHandle {
            offset,
            len: size,
            generation: self.generation,
        })
    }

    /// Release every allocation at once
    ///
    /// Handles issued before the reset become stale.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Borrow the bytes behind `handle`
    pub fn get(&self, handle: ArenaHandle) -> Result<&[u8]> {
        let range = self.check(handle)?;
        Ok(&self.region[range])
    }

    /// Mutably borrow the bytes behind `handle`
    pub fn get_mut(&mut self, handle: ArenaHandle) -> Result<&mut [u8]> {
        let range = self.check(handle)?;
        Ok(&mut self.region[range])
    }

    /// Fill the range behind `handle` with zeros
    pub fn zero(&mut self, handle: ArenaHandle) -> Result<()> {
        self.get_mut(handle)?.fill(0);
        Ok(())
    }

    fn check(&self, handle: ArenaHandle) -> Result<std::ops::Range<usize>> {
        if handle.generation != self.generation || handle.offset + handle.len > self.cursor {
            return Err(FetcherError::StaleContext);
        }
        Ok(handle.offset..handle.offset + handle.len)
    }
}

/// Round `size` up to a multiple of `align` (power of two)
pub fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_within_capacity() {
        let mut arena = Arena::with_capacity(32);
        let a = arena.allocate(10, 1).unwrap();
        let b = arena.allocate(4, 4).unwrap();

        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 12);
        assert_eq!(arena.used(), 16);
        assert_eq!(arena.remaining(), 16);
    }

    #[test]
    fn test_allocate_exactly_fills_region() {
        let mut arena = Arena::with_capacity(16);
        arena.allocate(8, 8).unwrap();
        arena.allocate(8, 8).unwrap();
        assert_eq!(arena.remaining(), 0);

        let err = arena.allocate(1, 1).unwrap_err();
        assert!(matches!(err, FetcherError::OutOfArena { requested: 1, available: 0 }));
    }

    #[test]
    fn test_overflow_leaves_cursor_untouched() {
        let mut arena = Arena::with_capacity(16);
        arena.allocate(12, 1).unwrap();

        assert!(arena.allocate(8, 1).is_err());
        assert_eq!(arena.used(), 12);
        assert!(arena.allocate(4, 1).is_ok());
    }

    #[test]
    fn test_padding_counts_against_capacity() {
        let mut arena = Arena::with_capacity(8);
        arena.allocate(1, 1).unwrap();
        // 1 byte used, aligning to 8 leaves no room
        assert!(arena.allocate(1, 8).is_err());
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let mut arena = Arena::with_capacity(8);
        assert!(matches!(arena.allocate(4, 3), Err(FetcherError::InvalidAlignment(3))));
        assert!(matches!(arena.allocate(4, 0), Err(FetcherError::InvalidAlignment(0))));
    }

    #[test]
    fn test_zero_size_allocation() {
        let mut arena = Arena::with_capacity(0);
        let handle = arena.allocate(0, 4).unwrap();
        assert!(handle.is_empty());
        assert_eq!(arena.get(handle).unwrap().len(), 0);
    }

    #[test]
    fn test_reset_reuses_region() {
        let mut arena = Arena::with_capacity(8);
        arena.allocate(8, 1).unwrap();
        arena.reset();

        assert_eq!(arena.used(), 0);
        assert!(arena.allocate(8, 1).is_ok());
    }

    #[test]
    fn test_fill_reset_and_replay() {
        // Sizes/alignments of a typical board: 8 + pad 0 + 36 + 16 + 4 = 64
        let sequence = [(8, 8), (36, 4), (16, 4), (4, 4)];
        let mut arena = Arena::with_capacity(64);

        let first: Vec<_> = sequence
            .iter()
            .map(|&(size, align)| arena.allocate(size, align).unwrap())
            .collect();
        assert_eq!(arena.remaining(), 0);
        assert!(matches!(
            arena.allocate(1, 1),
            Err(FetcherError::OutOfArena { requested: 1, available: 0 })
        ));

        arena.reset();

        let replay: Vec<_> = sequence
            .iter()
            .map(|&(size, align)| arena.allocate(size, align).unwrap())
            .collect();
        assert_eq!(arena.remaining(), 0);
        for (old, new) in first.iter().zip(&replay) {
            assert_eq!(old.offset(), new.offset());
            assert_eq!(old.len(), new.len());
        }
        assert!(arena.allocate(1, 1).is_err());
    }

    #[test]
    fn test_stale_handle_after_reset() {
        let mut arena = Arena::with_capacity(8);
        let old = arena.allocate(4, 1).unwrap();
        arena.reset();
        let fresh = arena.allocate(4, 1).unwrap();

        assert!(matches!(arena.get(old), Err(FetcherError::StaleContext)));
        assert!(arena.get_mut(fresh).is_ok());
    }

    #[test]
    fn test_contexts_do_not_overlap() {
        let mut arena = Arena::with_capacity(16);
        let a = arena.allocate(4, 4).unwrap();
        let b = arena.allocate(4, 4).unwrap();

        arena.get_mut(a).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        arena.get_mut(b).unwrap().copy_from_slice(&[5, 6, 7, 8]);

        assert_eq!(arena.get(a).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(arena.get(b).unwrap(), &[5, 6, 7, 8]);

        arena.zero(a).unwrap();
        assert_eq!(arena.get(a).unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(16, 8), 16);
    }
}

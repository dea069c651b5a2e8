//! Bounds-checked view over one native heap block
//!
//! A `ManagedAllocation` owns a block obtained from the C allocator. Every
//! accessor validates `offset >= 0 && offset + width <= size` before touching
//! memory and fails with `AccessError::OutOfBounds` otherwise, so a rejected
//! access never writes or reads a single byte.
//!
//! Release is explicit: `release(self)` consumes the allocation, so a second
//! release or a use after release does not type-check. Dropping an allocation
//! that was never released leaks the block and logs a warning.

use crate::error::{AccessError, AllocError};
use crate::pointer::{buffer_range, fold_address, NativePointer, PointerKind, RawPointer};
use crate::types::{Element, POINTER_SIZE};
use std::fmt;

pub struct ManagedAllocation {
    pointer: RawPointer,
    size: usize,
    released: bool,
}

impl ManagedAllocation {
    /// Request `size` bytes from the native allocator
    ///
    /// A zero-size request still asks the allocator for one byte, so a null
    /// result always means exhaustion. The recorded size stays 0.
    pub fn allocate(size: usize) -> Result<Self, AllocError> {
        // SAFETY: malloc has no preconditions
        let ptr = unsafe { libc::malloc(size.max(1)) };
        if ptr.is_null() {
            log::warn!("native allocator returned null for {} bytes", size);
            return Err(AllocError::OutOfMemory { size });
        }
        let pointer = RawPointer::from_ptr(ptr);
        log::debug!("allocated {} bytes at {}", size, pointer);
        Ok(Self {
            pointer,
            size,
            released: false,
        })
    }

    /// Wrap a block that native code allocated
    ///
    /// # Safety
    ///
    /// `pointer` must come from the C allocator (`malloc`/`calloc`/`realloc`),
    /// must not be owned by anything else, and must span at least `size` bytes.
    pub unsafe fn adopt(pointer: RawPointer, size: usize) -> Self {
        log::debug!("adopted {} bytes at {}", size, pointer);
        Self {
            pointer,
            size,
            released: false,
        }
    }

    /// Allocate `size` bytes, run `f`, and release the block on every exit path
    ///
    /// The block is released whether `f` returns `Ok`, returns `Err`, or unwinds.
    pub fn scoped<R, E, F>(size: usize, f: F) -> Result<R, E>
    where
        E: From<AllocError>,
        F: FnOnce(&mut ManagedAllocation) -> Result<R, E>,
    {
        struct Guard(Option<ManagedAllocation>);

        impl Drop for Guard {
            fn drop(&mut self) {
                if let Some(allocation) = self.0.take() {
                    allocation.release();
                }
            }
        }

        let mut guard = Guard(Some(ManagedAllocation::allocate(size)?));
        match guard.0.as_mut() {
            Some(allocation) => f(allocation),
            None => Err(AllocError::OutOfMemory { size }.into()),
        }
    }

    /// Return the block to the native allocator
    pub fn release(mut self) {
        log::debug!("releasing {} bytes at {}", self.size, self.pointer);
        // SAFETY: the block came from the C allocator and is released once,
        // since `self` is consumed here
        unsafe { libc::free(self.pointer.as_ptr()) };
        self.released = true;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether `width` bytes at `offset` lie inside the block
    pub fn contains(&self, offset: i64, width: usize) -> bool {
        if offset < 0 {
            return false;
        }
        (offset as u64)
            .checked_add(width as u64)
            .map_or(false, |end| end <= self.size as u64)
    }

    fn bounds_check(&self, offset: i64, width: usize) -> Result<(), AccessError> {
        if self.contains(offset, width) {
            Ok(())
        } else {
            Err(AccessError::OutOfBounds {
                offset,
                width,
                size: self.size,
            })
        }
    }

    /// Checked read of one element
    pub fn get<T: Element>(&self, offset: i64) -> Result<T, AccessError> {
        self.bounds_check(offset, T::WIDTH)?;
        // SAFETY: the range lies inside the owned block
        Ok(unsafe { self.pointer.read(offset) })
    }

    /// Checked write of one element
    pub fn set<T: Element>(&mut self, offset: i64, value: T) -> Result<(), AccessError> {
        self.bounds_check(offset, T::WIDTH)?;
        // SAFETY: the range lies inside the owned block
        unsafe { self.pointer.write(offset, value) };
        Ok(())
    }

    pub fn get_byte(&self, offset: i64) -> Result<i8, AccessError> {
        self.get(offset)
    }

    pub fn get_short(&self, offset: i64) -> Result<i16, AccessError> {
        self.get(offset)
    }

    pub fn get_char(&self, offset: i64) -> Result<u16, AccessError> {
        self.get(offset)
    }

    pub fn get_int(&self, offset: i64) -> Result<i32, AccessError> {
        self.get(offset)
    }

    pub fn get_long(&self, offset: i64) -> Result<i64, AccessError> {
        self.get(offset)
    }

    pub fn get_float(&self, offset: i64) -> Result<f32, AccessError> {
        self.get(offset)
    }

    pub fn get_double(&self, offset: i64) -> Result<f64, AccessError> {
        self.get(offset)
    }

    pub fn get_pointer(&self, offset: i64) -> Result<RawPointer, AccessError> {
        self.bounds_check(offset, POINTER_SIZE)?;
        // SAFETY: the range lies inside the owned block
        Ok(unsafe { self.pointer.get_pointer(offset) })
    }

    /// Read a NUL-terminated string starting at `offset`
    ///
    /// Only the start offset is checked (width 0). The terminator is not
    /// searched for within the block, so a block without a NUL at or after
    /// `offset` is read past its end. Callers reading untrusted contents
    /// should write the terminator themselves first.
    pub fn get_string(&self, offset: i64) -> Result<String, AccessError> {
        self.bounds_check(offset, 0)?;
        // SAFETY: start offset checked; termination is the caller's obligation
        Ok(unsafe { self.pointer.get_string(offset) })
    }

    pub fn set_byte(&mut self, offset: i64, value: i8) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_short(&mut self, offset: i64, value: i16) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_char(&mut self, offset: i64, value: u16) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_int(&mut self, offset: i64, value: i32) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_long(&mut self, offset: i64, value: i64) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_float(&mut self, offset: i64, value: f32) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_double(&mut self, offset: i64, value: f64) -> Result<(), AccessError> {
        self.set(offset, value)
    }

    pub fn set_pointer(&mut self, offset: i64, value: RawPointer) -> Result<(), AccessError> {
        self.bounds_check(offset, POINTER_SIZE)?;
        // SAFETY: the range lies inside the owned block
        unsafe { self.pointer.set_pointer(offset, value) };
        Ok(())
    }

    /// Write `value` and a NUL terminator; checks `value.len() + 1` bytes
    pub fn set_string(&mut self, offset: i64, value: &str) -> Result<(), AccessError> {
        let width = value.len().checked_add(1).ok_or(AccessError::WidthOverflow)?;
        self.bounds_check(offset, width)?;
        // SAFETY: the range lies inside the owned block
        unsafe { self.pointer.set_string(offset, value) };
        Ok(())
    }

    /// Copy `buffer[index..index + length]` into the block at `offset`
    pub fn copy_in<T: Element>(
        &mut self,
        offset: i64,
        buffer: &[T],
        index: usize,
        length: usize,
    ) -> Result<(), AccessError> {
        buffer_range(buffer.len(), index, length)?;
        self.bounds_check(offset, transfer_width::<T>(length)?)?;
        // SAFETY: both ranges validated
        unsafe { self.pointer.copy_in(offset, buffer, index, length) }
    }

    /// Copy `length` elements at `offset` into `buffer[index..index + length]`
    pub fn copy_out<T: Element>(
        &self,
        offset: i64,
        buffer: &mut [T],
        index: usize,
        length: usize,
    ) -> Result<(), AccessError> {
        buffer_range(buffer.len(), index, length)?;
        self.bounds_check(offset, transfer_width::<T>(length)?)?;
        // SAFETY: both ranges validated
        unsafe { self.pointer.copy_out(offset, buffer, index, length) }
    }
}

fn transfer_width<T: Element>(length: usize) -> Result<usize, AccessError> {
    length
        .checked_mul(T::WIDTH)
        .ok_or(AccessError::WidthOverflow)
}

impl NativePointer for ManagedAllocation {
    fn address(&self) -> u64 {
        self.pointer.address()
    }

    fn kind(&self) -> PointerKind {
        PointerKind::Allocation
    }

    fn as_raw(&self) -> RawPointer {
        self.pointer
    }
}

impl PartialEq for ManagedAllocation {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer
    }
}

impl Eq for ManagedAllocation {}

impl std::hash::Hash for ManagedAllocation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        fold_address(self.address()).hash(state)
    }
}

impl fmt::Debug for ManagedAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedAllocation")
            .field("address", &format_args!("{}", self.pointer))
            .field("size", &self.size)
            .finish()
    }
}

impl Drop for ManagedAllocation {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "allocation of {} bytes at {} dropped without release; leaking it",
                self.size,
                self.pointer
            );
        }
    }
}

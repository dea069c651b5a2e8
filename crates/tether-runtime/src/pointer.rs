//! Native address values and unchecked indirection
//!
//! `RawPointer` is the bare handle kind: an address with identity and raw,
//! unchecked typed access. Bounds-checked access lives on `ManagedAllocation`;
//! calling lives on `DynamicSymbol`. All three share the `NativePointer`
//! identity capability.

use crate::error::AccessError;
use crate::types::{Element, POINTER_SIZE};
use std::ffi::CStr;
use std::fmt;
use std::ops::Range;
use std::os::raw::{c_char, c_void};

/// Concrete kind of a native pointer, part of its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointerKind {
    Raw,
    Allocation,
    Symbol,
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerKind::Raw => write!(f, "raw"),
            PointerKind::Allocation => write!(f, "allocation"),
            PointerKind::Symbol => write!(f, "symbol"),
        }
    }
}

/// Identity capability shared by every native pointer kind
///
/// Two native pointers are the same pointer iff they have the same kind and the
/// same address. Compare values of different Rust types through `handle()`.
pub trait NativePointer {
    /// Native address as a 64-bit integer
    fn address(&self) -> u64;

    fn kind(&self) -> PointerKind;

    fn is_null(&self) -> bool {
        self.address() == 0
    }

    /// 32-bit hash folding the high and low halves of the address
    fn hash_code(&self) -> i32 {
        fold_address(self.address())
    }

    /// Bare handle to the same address
    fn as_raw(&self) -> RawPointer {
        RawPointer::new(self.address() as usize)
    }

    /// Kind-tagged identity of this pointer
    fn handle(&self) -> PointerHandle {
        PointerHandle::new(self.kind(), self.address())
    }
}

pub(crate) fn fold_address(address: u64) -> i32 {
    (address >> 32).wrapping_add(address & 0xFFFF_FFFF) as i32
}

/// Kind-tagged address used for heterogeneous pointer comparison and as the
/// payload of pointer arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerHandle {
    kind: PointerKind,
    address: u64,
}

impl PointerHandle {
    pub fn new(kind: PointerKind, address: u64) -> Self {
        Self { kind, address }
    }
}

impl NativePointer for PointerHandle {
    fn address(&self) -> u64 {
        self.address
    }

    fn kind(&self) -> PointerKind {
        self.kind
    }
}

impl From<RawPointer> for PointerHandle {
    fn from(pointer: RawPointer) -> Self {
        pointer.handle()
    }
}

impl fmt::Display for PointerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.kind, self.address)
    }
}

/// Opaque native address with raw, unchecked indirection
///
/// A `RawPointer` does not own the memory it points to; dropping it has no
/// native side effect. Every accessor is `unsafe`: the caller guarantees that
/// `address + offset .. address + offset + width` is valid for the access.
/// Accesses are unaligned.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawPointer {
    address: usize,
}

impl RawPointer {
    pub const fn null() -> Self {
        Self { address: 0 }
    }

    pub const fn new(address: usize) -> Self {
        Self { address }
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self {
            address: ptr as usize,
        }
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.address as *mut c_void
    }

    /// Pointer `bytes` away from this one, wrapping on overflow
    pub fn offset(self, bytes: i64) -> Self {
        Self {
            address: self.address.wrapping_add_signed(bytes as isize),
        }
    }

    fn at<T>(self, offset: i64) -> *mut T {
        self.offset(offset).address as *mut T
    }

    /// Read one element at `address + offset`
    ///
    /// # Safety
    ///
    /// The `T::WIDTH` bytes at the target must be readable.
    pub unsafe fn read<T: Element>(self, offset: i64) -> T {
        std::ptr::read_unaligned(self.at::<T>(offset))
    }

    /// Write one element at `address + offset`
    ///
    /// # Safety
    ///
    /// The `T::WIDTH` bytes at the target must be writable.
    pub unsafe fn write<T: Element>(self, offset: i64, value: T) {
        std::ptr::write_unaligned(self.at::<T>(offset), value)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_byte(self, offset: i64) -> i8 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_short(self, offset: i64) -> i16 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_char(self, offset: i64) -> u16 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_int(self, offset: i64) -> i32 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_long(self, offset: i64) -> i64 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_float(self, offset: i64) -> f32 {
        self.read(offset)
    }

    /// # Safety
    /// See [`RawPointer::read`].
    pub unsafe fn get_double(self, offset: i64) -> f64 {
        self.read(offset)
    }

    /// Read a pointer-sized address at `address + offset`
    ///
    /// # Safety
    ///
    /// `POINTER_SIZE` bytes at the target must be readable.
    pub unsafe fn get_pointer(self, offset: i64) -> RawPointer {
        RawPointer::new(std::ptr::read_unaligned(self.at::<usize>(offset)))
    }

    /// Read a NUL-terminated byte sequence, decoding it lossily as UTF-8
    ///
    /// # Safety
    ///
    /// A NUL byte must be reachable from the target through readable memory.
    pub unsafe fn get_string(self, offset: i64) -> String {
        CStr::from_ptr(self.at::<c_char>(offset))
            .to_string_lossy()
            .into_owned()
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_byte(self, offset: i64, value: i8) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_short(self, offset: i64, value: i16) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_char(self, offset: i64, value: u16) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_int(self, offset: i64, value: i32) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_long(self, offset: i64, value: i64) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_float(self, offset: i64, value: f32) {
        self.write(offset, value)
    }

    /// # Safety
    /// See [`RawPointer::write`].
    pub unsafe fn set_double(self, offset: i64, value: f64) {
        self.write(offset, value)
    }

    /// # Safety
    ///
    /// `POINTER_SIZE` bytes at the target must be writable.
    pub unsafe fn set_pointer(self, offset: i64, value: RawPointer) {
        std::ptr::write_unaligned(self.at::<usize>(offset), value.address)
    }

    /// Write the UTF-8 bytes of `value` followed by a NUL terminator
    ///
    /// # Safety
    ///
    /// `value.len() + 1` bytes at the target must be writable.
    pub unsafe fn set_string(self, offset: i64, value: &str) {
        let dst = self.at::<u8>(offset);
        std::ptr::copy_nonoverlapping(value.as_ptr(), dst, value.len());
        *dst.add(value.len()) = 0;
    }

    /// Copy `buffer[index..index + length]` into native memory at `address + offset`
    ///
    /// The buffer range is validated; the native range is not.
    ///
    /// # Safety
    ///
    /// `length * T::WIDTH` bytes at the target must be writable.
    pub unsafe fn copy_in<T: Element>(
        self,
        offset: i64,
        buffer: &[T],
        index: usize,
        length: usize,
    ) -> Result<(), AccessError> {
        let range = buffer_range(buffer.len(), index, length)?;
        let src = buffer[range].as_ptr() as *const u8;
        std::ptr::copy_nonoverlapping(src, self.at::<u8>(offset), length * T::WIDTH);
        Ok(())
    }

    /// Copy `length` elements from native memory at `address + offset` into
    /// `buffer[index..index + length]`
    ///
    /// # Safety
    ///
    /// `length * T::WIDTH` bytes at the target must be readable.
    pub unsafe fn copy_out<T: Element>(
        self,
        offset: i64,
        buffer: &mut [T],
        index: usize,
        length: usize,
    ) -> Result<(), AccessError> {
        let range = buffer_range(buffer.len(), index, length)?;
        let dst = buffer[range].as_mut_ptr() as *mut u8;
        std::ptr::copy_nonoverlapping(self.at::<u8>(offset) as *const u8, dst, length * T::WIDTH);
        Ok(())
    }
}

/// Validate an element range of a managed buffer
pub(crate) fn buffer_range(
    buffer_len: usize,
    index: usize,
    length: usize,
) -> Result<Range<usize>, AccessError> {
    match index.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(index..end),
        _ => Err(AccessError::BufferRange {
            index,
            length,
            buffer_len,
        }),
    }
}

impl NativePointer for RawPointer {
    fn address(&self) -> u64 {
        self.address as u64
    }

    fn kind(&self) -> PointerKind {
        PointerKind::Raw
    }

    fn as_raw(&self) -> RawPointer {
        *self
    }
}

impl fmt::Debug for RawPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawPointer({:#x})", self.address)
    }
}

impl fmt::Display for RawPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.address)
    }
}

impl<T> From<*const T> for RawPointer {
    fn from(ptr: *const T) -> Self {
        Self::from_ptr(ptr)
    }
}

impl<T> From<*mut T> for RawPointer {
    fn from(ptr: *mut T) -> Self {
        Self::from_ptr(ptr as *const T)
    }
}

const _: () = assert!(POINTER_SIZE == std::mem::size_of::<usize>());

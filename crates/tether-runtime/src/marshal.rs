//! Argument marshaling - tagged values to native call-frame slots
//!
//! `Arg` is the tagged argument value callers build. `MarshalContext` turns a
//! list of them into native values and owns everything those values point to:
//!
//! - integers → `sint32` / `sint64`
//! - floats → `float` / `double`
//! - strings → pointer to a transient NUL-terminated copy
//! - pointer handles → their address
//! - null → a zero pointer
//!
//! The transient string buffers are freed when the context drops, which the
//! dispatcher arranges to happen after the call returns on every path.

use crate::allocation::ManagedAllocation;
use crate::error::MarshalError;
use crate::pointer::{NativePointer, PointerHandle, PointerKind, RawPointer};
use crate::types::{NativeValue, ValueKind, POINTER_SIZE};
use libffi::middle::Arg as FfiArg;
use std::ffi::CString;
use std::fmt;
use std::os::raw::c_void;
use std::str::FromStr;

/// Tagged argument value
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Copied into a NUL-terminated native buffer for the duration of the call
    Str(String),
    /// Address of a raw pointer, allocation, symbol or callback
    Pointer(PointerHandle),
    Null,
}

impl Arg {
    /// Native slot type this argument occupies
    pub fn kind(&self) -> ValueKind {
        match self {
            Arg::Int(_) => ValueKind::Int,
            Arg::Long(_) => ValueKind::Long,
            Arg::Float(_) => ValueKind::Float,
            Arg::Double(_) => ValueKind::Double,
            Arg::Str(_) | Arg::Pointer(_) | Arg::Null => ValueKind::Pointer,
        }
    }

    /// A `size_t` argument: `Long` on 64-bit targets, `Int` elsewhere
    pub fn size(n: usize) -> Self {
        if POINTER_SIZE == 8 {
            Arg::Long(n as i64)
        } else {
            Arg::Int(n as i32)
        }
    }

    fn parse_literal<T: FromStr>(tag: &str, literal: &str) -> Result<T, MarshalError> {
        literal.trim().parse().map_err(|_| MarshalError::InvalidLiteral {
            tag: tag.to_string(),
            literal: literal.to_string(),
        })
    }

    fn parse_address(literal: &str) -> Result<u64, MarshalError> {
        let trimmed = literal.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse(),
        };
        parsed.map_err(|_| MarshalError::InvalidLiteral {
            tag: "ptr".to_string(),
            literal: literal.to_string(),
        })
    }
}

/// Parse the textual form `tag:literal`
///
/// Tags: `i32`, `i64`, `f32`, `f64`, `str`, `ptr` (hex with `0x` or decimal),
/// and the bare word `null`.
impl FromStr for Arg {
    type Err = MarshalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "null" {
            return Ok(Arg::Null);
        }
        let (tag, literal) = s
            .split_once(':')
            .ok_or_else(|| MarshalError::UnsupportedTag(s.to_string()))?;
        match tag {
            "i32" => Ok(Arg::Int(Self::parse_literal(tag, literal)?)),
            "i64" => Ok(Arg::Long(Self::parse_literal(tag, literal)?)),
            "f32" => Ok(Arg::Float(Self::parse_literal(tag, literal)?)),
            "f64" => Ok(Arg::Double(Self::parse_literal(tag, literal)?)),
            "str" => Ok(Arg::Str(literal.to_string())),
            "ptr" => Ok(Arg::Pointer(PointerHandle::new(
                PointerKind::Raw,
                Self::parse_address(literal)?,
            ))),
            other => Err(MarshalError::UnsupportedTag(other.to_string())),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "i32:{}", v),
            Arg::Long(v) => write!(f, "i64:{}", v),
            Arg::Float(v) => write!(f, "f32:{}", v),
            Arg::Double(v) => write!(f, "f64:{}", v),
            Arg::Str(s) => write!(f, "str:{}", s),
            Arg::Pointer(p) => write!(f, "ptr:{:#x}", p.address()),
            Arg::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Long(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Double(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Str(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Str(v)
    }
}

impl From<PointerHandle> for Arg {
    fn from(handle: PointerHandle) -> Self {
        Arg::Pointer(handle)
    }
}

impl From<RawPointer> for Arg {
    fn from(pointer: RawPointer) -> Self {
        Arg::Pointer(pointer.handle())
    }
}

impl From<&RawPointer> for Arg {
    fn from(pointer: &RawPointer) -> Self {
        Arg::Pointer(pointer.handle())
    }
}

impl From<&ManagedAllocation> for Arg {
    fn from(allocation: &ManagedAllocation) -> Self {
        Arg::Pointer(allocation.handle())
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Null, Into::into)
    }
}

/// Marshal context for one native call
///
/// Tracks allocated C strings and the native value slots the call frame
/// references. Both are freed on drop.
#[derive(Debug, Default)]
pub struct MarshalContext {
    allocated_strings: Vec<CString>,
    values: Vec<NativeValue>,
}

impl MarshalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marshal one argument and append it to the frame
    pub fn push(&mut self, arg: &Arg) -> Result<NativeValue, MarshalError> {
        let value = match arg {
            Arg::Int(v) => NativeValue::Int(*v),
            Arg::Long(v) => NativeValue::Long(*v),
            Arg::Float(v) => NativeValue::Float(*v),
            Arg::Double(v) => NativeValue::Double(*v),
            Arg::Str(s) => {
                let c_string = CString::new(s.as_str())
                    .map_err(|e| MarshalError::InvalidString(e.to_string()))?;
                let ptr = c_string.as_ptr() as *const c_void;
                self.allocated_strings.push(c_string);
                NativeValue::Pointer(ptr)
            }
            Arg::Pointer(handle) => NativeValue::Pointer(handle.address() as usize as *const c_void),
            Arg::Null => NativeValue::Pointer(std::ptr::null()),
        };
        log::trace!("marshaled {} as {:?}", arg, value);
        self.values.push(value);
        Ok(value)
    }

    /// Marshal every argument in order
    pub fn push_all(&mut self, args: &[Arg]) -> Result<(), MarshalError> {
        for arg in args {
            self.push(arg)?;
        }
        Ok(())
    }

    /// Marshaled values in call order
    pub fn values(&self) -> &[NativeValue] {
        &self.values
    }

    /// Slot types in call order
    pub fn kinds(&self) -> impl Iterator<Item = ValueKind> + '_ {
        self.values.iter().map(NativeValue::kind)
    }

    /// libffi argument references into this context's slots
    ///
    /// The returned references are valid while `self` is neither moved nor
    /// mutated.
    pub fn ffi_args(&self) -> Vec<FfiArg> {
        self.values
            .iter()
            .map(|value| match value {
                NativeValue::Int(v) => FfiArg::new(v),
                NativeValue::Long(v) => FfiArg::new(v),
                NativeValue::Float(v) => FfiArg::new(v),
                NativeValue::Double(v) => FfiArg::new(v),
                NativeValue::Pointer(p) => FfiArg::new(p),
            })
            .collect()
    }

    /// Number of transient string buffers owned by this context
    pub fn string_count(&self) -> usize {
        self.allocated_strings.len()
    }
}

//! Native type vocabulary shared by the pointer, marshaling and dispatch layers
//!
//! Defines:
//! - `Element`: scalar types that can be read from or written to native memory
//! - `ValueKind`: native slot types an argument or callback parameter occupies
//! - `NativeValue`: a marshaled argument ready to be placed in a call frame
//! - `ReturnKind` / `ReturnValue`: the return-type category of a call and its result
//! - `CallingConvention`: the two conventions a symbol can be called with
//!
//! Type mapping:
//! - ValueKind::Int → NativeValue::Int(i32) → ffi `sint32`
//! - ValueKind::Long → NativeValue::Long(i64) → ffi `sint64`
//! - ValueKind::Float → NativeValue::Float(f32) → ffi `float`
//! - ValueKind::Double → NativeValue::Double(f64) → ffi `double`
//! - ValueKind::Pointer → NativeValue::Pointer(*const c_void) → ffi `pointer`

use crate::error::ConventionError;
use crate::pointer::RawPointer;
use libffi::middle::{FfiAbi, Type};
use std::fmt;
use std::os::raw::c_void;
use std::str::FromStr;

/// Width in bytes of a native pointer
pub const POINTER_SIZE: usize = std::mem::size_of::<*const c_void>();

/// Element type of a typed or bulk indirection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Byte,
    Short,
    /// UTF-16 code unit
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl ElementKind {
    /// Byte span of one element
    pub fn width(self) -> usize {
        match self {
            ElementKind::Byte => 1,
            ElementKind::Short | ElementKind::Char => 2,
            ElementKind::Int | ElementKind::Float => 4,
            ElementKind::Long | ElementKind::Double => 8,
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for u16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Scalar that can be transferred to and from native memory
///
/// Implemented for `i8` (byte), `i16` (short), `u16` (char), `i32` (int),
/// `i64` (long), `f32` (float) and `f64` (double).
pub trait Element: Copy + Default + sealed::Sealed {
    const KIND: ElementKind;
    const WIDTH: usize = std::mem::size_of::<Self>();
}

impl Element for i8 {
    const KIND: ElementKind = ElementKind::Byte;
}
impl Element for i16 {
    const KIND: ElementKind = ElementKind::Short;
}
impl Element for u16 {
    const KIND: ElementKind = ElementKind::Char;
}
impl Element for i32 {
    const KIND: ElementKind = ElementKind::Int;
}
impl Element for i64 {
    const KIND: ElementKind = ElementKind::Long;
}
impl Element for f32 {
    const KIND: ElementKind = ElementKind::Float;
}
impl Element for f64 {
    const KIND: ElementKind = ElementKind::Double;
}

/// Native slot type of an argument or callback parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// C int (32-bit signed)
    Int,
    /// 64-bit signed integer
    Long,
    /// C float (single precision)
    Float,
    /// C double
    Double,
    /// Any data or code pointer, including C strings and null
    Pointer,
}

impl ValueKind {
    /// libffi type describing this slot
    pub fn ffi_type(self) -> Type {
        match self {
            ValueKind::Int => Type::i32(),
            ValueKind::Long => Type::i64(),
            ValueKind::Float => Type::f32(),
            ValueKind::Double => Type::f64(),
            ValueKind::Pointer => Type::pointer(),
        }
    }

    /// Get a display name for this slot type
    pub fn display_name(self) -> &'static str {
        match self {
            ValueKind::Int => "c_int",
            ValueKind::Long => "c_long",
            ValueKind::Float => "c_float",
            ValueKind::Double => "c_double",
            ValueKind::Pointer => "c_ptr",
        }
    }
}

/// Marshaled argument, ready to be referenced from a call frame
///
/// # Safety
///
/// `Pointer` values that came from string arguments point into buffers owned
/// by the `MarshalContext` that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Pointer(*const c_void),
}

impl NativeValue {
    /// Slot type this value occupies
    pub fn kind(&self) -> ValueKind {
        match self {
            NativeValue::Int(_) => ValueKind::Int,
            NativeValue::Long(_) => ValueKind::Long,
            NativeValue::Float(_) => ValueKind::Float,
            NativeValue::Double(_) => ValueKind::Double,
            NativeValue::Pointer(_) => ValueKind::Pointer,
        }
    }
}

/// Return-type category of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Int,
    Long,
    Void,
    Float,
    Double,
    Pointer,
}

impl ReturnKind {
    /// libffi type describing the result slot
    pub fn ffi_type(self) -> Type {
        match self {
            ReturnKind::Int => Type::i32(),
            ReturnKind::Long => Type::i64(),
            ReturnKind::Void => Type::void(),
            ReturnKind::Float => Type::f32(),
            ReturnKind::Double => Type::f64(),
            ReturnKind::Pointer => Type::pointer(),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ReturnKind::Int => "int",
            ReturnKind::Long => "long",
            ReturnKind::Void => "void",
            ReturnKind::Float => "float",
            ReturnKind::Double => "double",
            ReturnKind::Pointer => "pointer",
        }
    }
}

impl FromStr for ReturnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "i32" => Ok(ReturnKind::Int),
            "long" | "i64" => Ok(ReturnKind::Long),
            "void" => Ok(ReturnKind::Void),
            "float" | "f32" => Ok(ReturnKind::Float),
            "double" | "f64" => Ok(ReturnKind::Double),
            "pointer" | "ptr" => Ok(ReturnKind::Pointer),
            other => Err(format!("unknown return kind '{}'", other)),
        }
    }
}

/// Unmarshaled result of a call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnValue {
    Int(i32),
    Long(i64),
    Void,
    Float(f32),
    Double(f64),
    Pointer(RawPointer),
}

impl ReturnValue {
    pub fn kind(&self) -> ReturnKind {
        match self {
            ReturnValue::Int(_) => ReturnKind::Int,
            ReturnValue::Long(_) => ReturnKind::Long,
            ReturnValue::Void => ReturnKind::Void,
            ReturnValue::Float(_) => ReturnKind::Float,
            ReturnValue::Double(_) => ReturnKind::Double,
            ReturnValue::Pointer(_) => ReturnKind::Pointer,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ReturnValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            ReturnValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ReturnValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            ReturnValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<RawPointer> {
        match self {
            ReturnValue::Pointer(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Int(v) => write!(f, "{}", v),
            ReturnValue::Long(v) => write!(f, "{}", v),
            ReturnValue::Void => write!(f, "void"),
            ReturnValue::Float(v) => write!(f, "{}", v),
            ReturnValue::Double(v) => write!(f, "{}", v),
            ReturnValue::Pointer(p) => write!(f, "{}", p),
        }
    }
}

/// Calling convention a symbol is invoked with
///
/// `Native` is the platform's standard C convention (token `"C"`).
/// `BridgeNative` is the convention used by entry points written against the
/// bridge's own calling idiom (token `"JNI"`): stdcall on 32-bit x86 Windows,
/// identical to `Native` everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    #[default]
    Native,
    BridgeNative,
}

impl CallingConvention {
    /// Parse a convention token; exactly `"C"` and `"JNI"` are recognized
    pub fn parse(token: &str) -> Result<Self, ConventionError> {
        match token {
            "C" => Ok(CallingConvention::Native),
            "JNI" => Ok(CallingConvention::BridgeNative),
            other => Err(ConventionError::Unrecognized(other.to_string())),
        }
    }

    /// Token this convention is spelled with
    pub fn token(self) -> &'static str {
        match self {
            CallingConvention::Native => "C",
            CallingConvention::BridgeNative => "JNI",
        }
    }

    /// libffi ABI used to build call frames for this convention
    pub fn abi(self) -> FfiAbi {
        match self {
            CallingConvention::Native => libffi::middle::ffi_abi_FFI_DEFAULT_ABI,
            CallingConvention::BridgeNative => bridge_abi(),
        }
    }
}

#[cfg(all(target_arch = "x86", windows))]
fn bridge_abi() -> FfiAbi {
    libffi::raw::ffi_abi_FFI_STDCALL
}

#[cfg(not(all(target_arch = "x86", windows)))]
fn bridge_abi() -> FfiAbi {
    libffi::middle::ffi_abi_FFI_DEFAULT_ABI
}

impl FromStr for CallingConvention {
    type Err = ConventionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_widths_match_kinds() {
        assert_eq!(<i8 as Element>::WIDTH, ElementKind::Byte.width());
        assert_eq!(<i16 as Element>::WIDTH, ElementKind::Short.width());
        assert_eq!(<u16 as Element>::WIDTH, ElementKind::Char.width());
        assert_eq!(<i32 as Element>::WIDTH, ElementKind::Int.width());
        assert_eq!(<i64 as Element>::WIDTH, ElementKind::Long.width());
        assert_eq!(<f32 as Element>::WIDTH, ElementKind::Float.width());
        assert_eq!(<f64 as Element>::WIDTH, ElementKind::Double.width());
    }

    #[test]
    fn test_convention_tokens() {
        assert_eq!(CallingConvention::parse("C"), Ok(CallingConvention::Native));
        assert_eq!(
            CallingConvention::parse("JNI"),
            Ok(CallingConvention::BridgeNative)
        );
        assert_eq!(CallingConvention::Native.token(), "C");
        assert_eq!(CallingConvention::BridgeNative.to_string(), "JNI");
    }

    #[test]
    fn test_convention_rejects_other_tokens() {
        for token in ["Pascal", "", "c", "jni", "stdcall", " C"] {
            assert_eq!(
                CallingConvention::parse(token),
                Err(ConventionError::Unrecognized(token.to_string()))
            );
        }
    }

    #[cfg(not(all(target_arch = "x86", windows)))]
    #[test]
    fn test_bridge_convention_is_default_abi_off_win32() {
        assert_eq!(
            CallingConvention::BridgeNative.abi(),
            CallingConvention::Native.abi()
        );
    }

    #[test]
    fn test_return_kind_parsing() {
        assert_eq!("int".parse::<ReturnKind>(), Ok(ReturnKind::Int));
        assert_eq!("f64".parse::<ReturnKind>(), Ok(ReturnKind::Double));
        assert_eq!("ptr".parse::<ReturnKind>(), Ok(ReturnKind::Pointer));
        assert!("struct".parse::<ReturnKind>().is_err());
    }

    #[test]
    fn test_return_value_accessors() {
        assert_eq!(ReturnValue::Int(5).as_int(), Some(5));
        assert_eq!(ReturnValue::Int(5).as_long(), None);
        assert_eq!(ReturnValue::Double(0.5).as_double(), Some(0.5));
        assert_eq!(ReturnValue::Void.kind(), ReturnKind::Void);
        assert_eq!(
            ReturnValue::Pointer(RawPointer::new(0x10)).as_pointer(),
            Some(RawPointer::new(0x10))
        );
    }

    #[test]
    fn test_native_value_kinds() {
        assert_eq!(NativeValue::Int(1).kind(), ValueKind::Int);
        assert_eq!(NativeValue::Double(1.0).kind(), ValueKind::Double);
        assert_eq!(
            NativeValue::Pointer(std::ptr::null()).kind(),
            ValueKind::Pointer
        );
    }
}

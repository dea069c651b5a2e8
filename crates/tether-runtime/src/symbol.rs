//! Callable native symbols
//!
//! A `DynamicSymbol` is a resolved function address plus the calling
//! convention it is invoked with. It exposes one entry point per return
//! category; each delegates to the `CallDispatcher`.

use crate::bridge;
use crate::caller::CallDispatcher;
use crate::error::{BridgeResult, CallError};
use crate::loader::LibraryLoader;
use crate::marshal::Arg;
use crate::pointer::{fold_address, NativePointer, PointerKind, RawPointer};
use crate::types::{CallingConvention, ReturnKind, ReturnValue};
use std::fmt;

#[derive(Clone, Copy)]
pub struct DynamicSymbol {
    pointer: RawPointer,
    convention: CallingConvention,
    dispatcher: CallDispatcher,
}

impl DynamicSymbol {
    /// Resolve `symbol` in `library` through the process-wide loader
    ///
    /// The convention token is parsed before anything is loaded, so an
    /// unrecognized token never triggers a library load or symbol lookup.
    pub fn new(library: &str, symbol: &str, convention: &str) -> BridgeResult<Self> {
        let convention = CallingConvention::parse(convention)?;
        let pointer = bridge::resolve(library, symbol)?;
        Ok(Self::resolved(pointer, convention, CallDispatcher::global()))
    }

    /// Resolve with the configured default convention (`C` unless set otherwise)
    pub fn native(library: &str, symbol: &str) -> BridgeResult<Self> {
        let convention = bridge::settings()
            .map(|s| s.default_convention)
            .unwrap_or_default();
        Self::new(library, symbol, convention.token())
    }

    /// Resolve through a caller-owned loader
    ///
    /// The symbol is only valid while `loader` keeps the library loaded.
    pub fn with_loader(
        loader: &mut LibraryLoader,
        library: &str,
        symbol: &str,
        convention: &str,
    ) -> BridgeResult<Self> {
        let convention = CallingConvention::parse(convention)?;
        let pointer = loader.resolve(library, symbol)?;
        Ok(Self::resolved(pointer, convention, CallDispatcher::default()))
    }

    /// Treat an existing address as a callable symbol; no lookup is performed
    pub fn from_pointer(pointer: &impl NativePointer, convention: &str) -> BridgeResult<Self> {
        let convention = CallingConvention::parse(convention)?;
        Ok(Self::resolved(
            pointer.as_raw(),
            convention,
            CallDispatcher::global(),
        ))
    }

    fn resolved(pointer: RawPointer, convention: CallingConvention, dispatcher: CallDispatcher) -> Self {
        Self {
            pointer,
            convention,
            dispatcher,
        }
    }

    /// Replace the dispatcher, e.g. to change the argument limit
    pub fn with_dispatcher(mut self, dispatcher: CallDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    /// Call and read the result as `ret`
    ///
    /// # Safety
    ///
    /// The symbol must be a function taking arguments of the slot types of
    /// `args`, in order, under this symbol's convention, and returning `ret`.
    pub unsafe fn call(&self, ret: ReturnKind, args: &[Arg]) -> Result<ReturnValue, CallError> {
        self.dispatcher
            .dispatch(self.pointer, self.convention, args, ret)
    }

    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_int(&self, args: &[Arg]) -> Result<i32, CallError> {
        self.call(ReturnKind::Int, args)
            .map(|v| v.as_int().unwrap_or_default())
    }

    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_long(&self, args: &[Arg]) -> Result<i64, CallError> {
        self.call(ReturnKind::Long, args)
            .map(|v| v.as_long().unwrap_or_default())
    }

    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_void(&self, args: &[Arg]) -> Result<(), CallError> {
        self.call(ReturnKind::Void, args).map(|_| ())
    }

    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_float(&self, args: &[Arg]) -> Result<f32, CallError> {
        self.call(ReturnKind::Float, args)
            .map(|v| v.as_float().unwrap_or_default())
    }

    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_double(&self, args: &[Arg]) -> Result<f64, CallError> {
        self.call(ReturnKind::Double, args)
            .map(|v| v.as_double().unwrap_or_default())
    }

    /// Call and wrap the returned address as a bare `RawPointer`
    ///
    /// # Safety
    /// See [`DynamicSymbol::call`].
    pub unsafe fn call_pointer(&self, args: &[Arg]) -> Result<RawPointer, CallError> {
        self.call(ReturnKind::Pointer, args)
            .map(|v| v.as_pointer().unwrap_or_default())
    }
}

impl NativePointer for DynamicSymbol {
    fn address(&self) -> u64 {
        self.pointer.address()
    }

    fn kind(&self) -> PointerKind {
        PointerKind::Symbol
    }

    fn as_raw(&self) -> RawPointer {
        self.pointer
    }
}

impl PartialEq for DynamicSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer
    }
}

impl Eq for DynamicSymbol {}

impl std::hash::Hash for DynamicSymbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        fold_address(self.address()).hash(state)
    }
}

impl From<&DynamicSymbol> for Arg {
    fn from(symbol: &DynamicSymbol) -> Self {
        Arg::Pointer(symbol.handle())
    }
}

impl fmt::Debug for DynamicSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicSymbol")
            .field("address", &format_args!("{}", self.pointer))
            .field("convention", &self.convention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, ConventionError, LinkError};
    use std::os::raw::c_int;

    extern "C" fn test_add(a: c_int, b: c_int) -> c_int {
        a + b
    }

    fn add_pointer() -> RawPointer {
        RawPointer::from_ptr(test_add as *const ())
    }

    #[test]
    fn test_from_pointer_calls() {
        let symbol = DynamicSymbol::from_pointer(&add_pointer(), "C").unwrap();
        let sum = unsafe { symbol.call_int(&[Arg::Int(2), Arg::Int(3)]) };
        assert_eq!(sum, Ok(5));
        assert_eq!(symbol.convention(), CallingConvention::Native);
    }

    #[test]
    fn test_bridge_convention_accepted() {
        let symbol = DynamicSymbol::from_pointer(&add_pointer(), "JNI").unwrap();
        assert_eq!(symbol.convention(), CallingConvention::BridgeNative);
    }

    #[test]
    fn test_unrecognized_convention() {
        let err = DynamicSymbol::from_pointer(&add_pointer(), "Pascal").unwrap_err();
        assert_eq!(
            err,
            BridgeError::Convention(ConventionError::Unrecognized("Pascal".to_string()))
        );
    }

    #[test]
    fn test_convention_checked_before_lookup() {
        let mut loader = LibraryLoader::new();
        let err = DynamicSymbol::with_loader(&mut loader, "nonexistent_xyz", "f", "").unwrap_err();
        assert!(matches!(err, BridgeError::Convention(_)));
        assert_eq!(loader.lookup_count(), 0);
        assert_eq!(loader.loaded_count(), 0);
    }

    #[test]
    fn test_missing_library_is_link_error() {
        let mut loader = LibraryLoader::new();
        let err = DynamicSymbol::with_loader(&mut loader, "nonexistent_xyz", "f", "C").unwrap_err();
        assert!(matches!(err, BridgeError::Link(LinkError::LibraryNotFound { .. })));
    }

    #[test]
    fn test_identity_is_by_kind_and_address() {
        let a = DynamicSymbol::from_pointer(&add_pointer(), "C").unwrap();
        let b = DynamicSymbol::from_pointer(&add_pointer(), "JNI").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), add_pointer().hash_code());
        assert_ne!(a.handle(), add_pointer().handle());
        assert_eq!(a.as_raw(), add_pointer());
    }

    #[test]
    fn test_null_symbol_not_dispatched() {
        let symbol = DynamicSymbol::from_pointer(&RawPointer::null(), "C").unwrap();
        assert_eq!(unsafe { symbol.call_int(&[]) }, Err(CallError::NullFunction));
    }
}

//! Generic native call dispatch through libffi
//!
//! One code path calls any resolved function: the argument list is marshaled
//! into native slots, a call interface is built from the slot types, the
//! return category and the calling convention, and libffi performs the call.
//! No signature verification happens; a return category or argument list that
//! does not match the callee is undefined behavior.

use crate::bridge;
use crate::error::{CallError, MarshalError};
use crate::marshal::{Arg, MarshalContext};
use crate::pointer::{NativePointer, RawPointer};
use crate::types::{CallingConvention, ReturnKind, ReturnValue, ValueKind};
use libffi::middle::{Builder, CodePtr};
use std::os::raw::c_void;

/// Result slot for integral returns; libffi widens results narrower than a
/// machine word to a full word
type WordSlot = isize;

/// Native call engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDispatcher {
    max_arguments: usize,
}

impl CallDispatcher {
    pub fn new(max_arguments: usize) -> Self {
        Self { max_arguments }
    }

    /// Dispatcher using the process-wide argument limit
    pub fn global() -> Self {
        Self::new(bridge::max_arguments())
    }

    pub fn max_arguments(&self) -> usize {
        self.max_arguments
    }

    /// Call `function` with `args` and read the result as `ret`
    ///
    /// Fails before any native code runs when the address is null, when there
    /// are more than `max_arguments` arguments, or when an argument cannot be
    /// marshaled. String buffers live until the call returns.
    ///
    /// # Safety
    ///
    /// `function` must be callable with `convention`, with parameters matching
    /// the slot types of `args` in order, and must return a value of category
    /// `ret`. Pointer arguments must be valid for whatever the callee does
    /// with them.
    pub unsafe fn dispatch(
        &self,
        function: RawPointer,
        convention: CallingConvention,
        args: &[Arg],
        ret: ReturnKind,
    ) -> Result<ReturnValue, CallError> {
        if function.is_null() {
            return Err(CallError::NullFunction);
        }
        if args.len() > self.max_arguments {
            return Err(MarshalError::TooManyArguments {
                count: args.len(),
                max: self.max_arguments,
            }
            .into());
        }

        let mut ctx = MarshalContext::new();
        ctx.push_all(args)?;

        let cif = Builder::new()
            .args(ctx.kinds().map(ValueKind::ffi_type))
            .res(ret.ffi_type())
            .abi(convention.abi())
            .into_cif();
        let code = CodePtr::from_ptr(function.as_ptr() as *const c_void);
        let ffi_args = ctx.ffi_args();

        log::debug!(
            "dispatching {} ({}) with {} arguments returning {}",
            function,
            convention,
            args.len(),
            ret.display_name()
        );

        let value = match ret {
            ReturnKind::Int => ReturnValue::Int(cif.call::<WordSlot>(code, &ffi_args) as i32),
            ReturnKind::Long => ReturnValue::Long(cif.call::<i64>(code, &ffi_args)),
            ReturnKind::Void => {
                cif.call::<()>(code, &ffi_args);
                ReturnValue::Void
            }
            ReturnKind::Float => ReturnValue::Float(cif.call::<f32>(code, &ffi_args)),
            ReturnKind::Double => ReturnValue::Double(cif.call::<f64>(code, &ffi_args)),
            ReturnKind::Pointer => {
                ReturnValue::Pointer(RawPointer::from_ptr(cif.call::<*mut c_void>(code, &ffi_args)))
            }
        };

        log::debug!("{} returned {}", function, value);
        Ok(value)
    }
}

impl Default for CallDispatcher {
    fn default() -> Self {
        Self::new(bridge::DEFAULT_MAX_ARGUMENTS)
    }
}

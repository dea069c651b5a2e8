//! Native callbacks - let native code call back into Rust closures
//!
//! A `NativeCallback` wraps a closure in a libffi closure and exposes its code
//! address, which can be passed to native code as a function-pointer argument
//! (for example a `qsort` comparator). The address stays callable until the
//! `NativeCallback` is dropped.

use crate::marshal::Arg;
use crate::pointer::{NativePointer, PointerKind, RawPointer};
use crate::types::{ReturnKind, ReturnValue, ValueKind};
use libffi::low::ffi_cif;
use libffi::middle::{Builder, Closure};
use std::fmt;
use std::mem::ManuallyDrop;
use std::os::raw::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Parameter value received by a callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Pointer(RawPointer),
}

impl CallbackValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CallbackValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            CallbackValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            CallbackValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            CallbackValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<RawPointer> {
        match self {
            CallbackValue::Pointer(p) => Some(*p),
            _ => None,
        }
    }
}

type Handler = dyn Fn(&[CallbackValue]) -> ReturnValue + Send + Sync + 'static;

struct CallbackState {
    params: Vec<ValueKind>,
    ret: ReturnKind,
    handler: Box<Handler>,
}

/// Rust closure callable from native code
pub struct NativeCallback {
    /// Freed before `state`, which it references
    closure: ManuallyDrop<Closure<'static>>,
    state: *mut CallbackState,
}

// The handler is Send + Sync and the closure code is immutable once prepared
unsafe impl Send for NativeCallback {}
unsafe impl Sync for NativeCallback {}

impl NativeCallback {
    /// Wrap `handler` as a native function taking `params` and returning `ret`
    /// under the platform C convention
    pub fn new<F>(params: Vec<ValueKind>, ret: ReturnKind, handler: F) -> Self
    where
        F: Fn(&[CallbackValue]) -> ReturnValue + Send + Sync + 'static,
    {
        let cif = Builder::new()
            .args(params.iter().copied().map(ValueKind::ffi_type))
            .res(ret.ffi_type())
            .into_cif();

        let state = Box::into_raw(Box::new(CallbackState {
            params,
            ret,
            handler: Box::new(handler),
        }));
        // SAFETY: `state` is freed only in Drop, after the closure
        let userdata: &'static CallbackState = unsafe { &*state };
        let closure = Closure::new(cif, trampoline, userdata);

        let callback = Self {
            closure: ManuallyDrop::new(closure),
            state,
        };
        log::debug!(
            "created callback at {} ({})",
            callback.as_raw(),
            signature_string(&userdata.params, userdata.ret)
        );
        callback
    }

    pub fn params(&self) -> &[ValueKind] {
        // SAFETY: state lives as long as self
        unsafe { &(*self.state).params }
    }

    pub fn return_kind(&self) -> ReturnKind {
        // SAFETY: state lives as long as self
        unsafe { (*self.state).ret }
    }
}

fn signature_string(params: &[ValueKind], ret: ReturnKind) -> String {
    let params: Vec<&str> = params.iter().map(|p| p.display_name()).collect();
    format!("({}) -> {}", params.join(", "), ret.display_name())
}

unsafe extern "C" fn trampoline(
    _cif: &ffi_cif,
    result: &mut c_void,
    args: *const *const c_void,
    state: &CallbackState,
) {
    let values: Vec<CallbackValue> = state
        .params
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let slot = *args.add(i);
            match kind {
                ValueKind::Int => CallbackValue::Int(*(slot as *const i32)),
                ValueKind::Long => CallbackValue::Long(*(slot as *const i64)),
                ValueKind::Float => CallbackValue::Float(*(slot as *const f32)),
                ValueKind::Double => CallbackValue::Double(*(slot as *const f64)),
                ValueKind::Pointer => {
                    CallbackValue::Pointer(RawPointer::from_ptr(*(slot as *const *const c_void)))
                }
            }
        })
        .collect();

    let value = match catch_unwind(AssertUnwindSafe(|| (state.handler)(&values))) {
        Ok(value) => value,
        Err(_) => {
            log::error!("callback panicked; returning zero to native caller");
            zero_of(state.ret)
        }
    };

    let value = if value.kind() == state.ret {
        value
    } else {
        log::warn!(
            "callback returned {} but is declared to return {}; returning zero",
            value.kind().display_name(),
            state.ret.display_name()
        );
        zero_of(state.ret)
    };

    // libffi sizes the result buffer to at least one machine word
    let out = result as *mut c_void;
    match value {
        ReturnValue::Int(v) => *(out as *mut isize) = v as isize,
        ReturnValue::Long(v) => *(out as *mut i64) = v,
        ReturnValue::Void => {}
        ReturnValue::Float(v) => *(out as *mut f32) = v,
        ReturnValue::Double(v) => *(out as *mut f64) = v,
        ReturnValue::Pointer(p) => *(out as *mut *mut c_void) = p.as_ptr(),
    }
}

fn zero_of(kind: ReturnKind) -> ReturnValue {
    match kind {
        ReturnKind::Int => ReturnValue::Int(0),
        ReturnKind::Long => ReturnValue::Long(0),
        ReturnKind::Void => ReturnValue::Void,
        ReturnKind::Float => ReturnValue::Float(0.0),
        ReturnKind::Double => ReturnValue::Double(0.0),
        ReturnKind::Pointer => ReturnValue::Pointer(RawPointer::null()),
    }
}

impl NativePointer for NativeCallback {
    fn address(&self) -> u64 {
        *self.closure.code_ptr() as usize as u64
    }

    fn kind(&self) -> PointerKind {
        PointerKind::Raw
    }
}

impl From<&NativeCallback> for Arg {
    fn from(callback: &NativeCallback) -> Self {
        Arg::Pointer(callback.handle())
    }
}

impl fmt::Debug for NativeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCallback")
            .field("address", &format_args!("{}", self.as_raw()))
            .field("signature", &signature_string(self.params(), self.return_kind()))
            .finish()
    }
}

impl Drop for NativeCallback {
    fn drop(&mut self) {
        // SAFETY: dropped exactly once here, closure before the state it points to
        unsafe {
            ManuallyDrop::drop(&mut self.closure);
            drop(Box::from_raw(self.state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::CallDispatcher;
    use crate::types::CallingConvention;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn invoke(callback: &NativeCallback, args: &[Arg]) -> ReturnValue {
        unsafe {
            CallDispatcher::default()
                .dispatch(
                    callback.as_raw(),
                    CallingConvention::Native,
                    args,
                    callback.return_kind(),
                )
                .unwrap()
        }
    }

    #[test]
    fn test_callback_no_params_int_return() {
        let cb = NativeCallback::new(vec![], ReturnKind::Int, |_| ReturnValue::Int(42));
        assert!(!cb.is_null());
        assert_eq!(invoke(&cb, &[]), ReturnValue::Int(42));
    }

    #[test]
    fn test_callback_double_param_double_return() {
        let cb = NativeCallback::new(vec![ValueKind::Double], ReturnKind::Double, |args| {
            ReturnValue::Double(args[0].as_double().unwrap_or_default() * 2.0)
        });
        assert_eq!(invoke(&cb, &[Arg::Double(5.5)]), ReturnValue::Double(11.0));
    }

    #[test]
    fn test_callback_receives_mixed_params() {
        let cb = NativeCallback::new(
            vec![ValueKind::Int, ValueKind::Long, ValueKind::Float, ValueKind::Pointer],
            ReturnKind::Long,
            |args| {
                let a = args[0].as_int().unwrap_or_default() as i64;
                let b = args[1].as_long().unwrap_or_default();
                let c = args[2].as_float().unwrap_or_default() as i64;
                let d = args[3].as_pointer().map_or(0, |p| p.address() as i64);
                ReturnValue::Long(a + b + c + d)
            },
        );
        let result = invoke(
            &cb,
            &[
                Arg::Int(-1),
                Arg::Long(10_000_000_000),
                Arg::Float(3.0),
                Arg::from(RawPointer::new(4)),
            ],
        );
        assert_eq!(result, ReturnValue::Long(10_000_000_006));
    }

    #[test]
    fn test_value_accessors_match_only_their_kind() {
        let float = CallbackValue::Float(1.5);
        assert_eq!(float.as_float(), Some(1.5));
        assert_eq!(float.as_double(), None);

        let double = CallbackValue::Double(2.5);
        assert_eq!(double.as_double(), Some(2.5));
        assert_eq!(double.as_float(), None);

        let int = CallbackValue::Int(3);
        assert_eq!(int.as_long(), None);
        assert_eq!(int.as_pointer(), None);
    }

    #[test]
    fn test_callback_float_param_is_not_widened() {
        let cb = NativeCallback::new(vec![ValueKind::Float], ReturnKind::Float, |args| {
            match (args[0].as_float(), args[0].as_double()) {
                (Some(v), None) => ReturnValue::Float(v + 0.5),
                _ => ReturnValue::Float(-1.0),
            }
        });
        assert_eq!(invoke(&cb, &[Arg::Float(2.0)]), ReturnValue::Float(2.5));
    }

    #[test]
    fn test_callback_negative_int_return() {
        let cb = NativeCallback::new(vec![ValueKind::Int], ReturnKind::Int, |args| {
            ReturnValue::Int(-args[0].as_int().unwrap_or_default())
        });
        assert_eq!(invoke(&cb, &[Arg::Int(9)]), ReturnValue::Int(-9));
    }

    #[test]
    fn test_callback_void_side_effect() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let cb = NativeCallback::new(vec![], ReturnKind::Void, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            ReturnValue::Void
        });
        invoke(&cb, &[]);
        invoke(&cb, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mismatched_return_becomes_zero() {
        let cb = NativeCallback::new(vec![], ReturnKind::Int, |_| ReturnValue::Double(1.0));
        assert_eq!(invoke(&cb, &[]), ReturnValue::Int(0));
    }

    #[test]
    fn test_callback_signature_string() {
        assert_eq!(
            signature_string(&[ValueKind::Pointer, ValueKind::Pointer], ReturnKind::Int),
            "(c_ptr, c_ptr) -> int"
        );
        assert_eq!(signature_string(&[], ReturnKind::Void), "() -> void");
    }

    #[test]
    fn test_callback_as_argument() {
        let cb = NativeCallback::new(vec![], ReturnKind::Int, |_| ReturnValue::Int(1));
        let arg = Arg::from(&cb);
        assert_eq!(arg, Arg::Pointer(cb.handle()));
        assert_eq!(cb.kind(), PointerKind::Raw);
    }
}

//! Tether runtime - a shared-stub bridge for calling native functions
//!
//! Any exported native function can be resolved by library and symbol name and
//! called with a dynamically built argument list, through one generic dispatch
//! path and without per-function glue:
//!
//! - [`RawPointer`]: a native address with identity and unchecked access
//! - [`ManagedAllocation`]: a native heap block with bounds-checked access
//! - [`DynamicSymbol`]: a resolved function plus its calling convention
//! - [`CallDispatcher`]: marshals [`Arg`] values and performs the call
//! - [`NativeCallback`]: a Rust closure native code can call back into
//!
//! # Example
//!
//! ```no_run
//! use tether_runtime::{Arg, BridgeSettings, DynamicSymbol};
//!
//! tether_runtime::init(BridgeSettings::default());
//! let strlen = DynamicSymbol::native("c", "strlen")?;
//! let len = unsafe { strlen.call_int(&[Arg::from("abcde")])? };
//! assert_eq!(len, 5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The bridge validates everything on its own side (bounds, conventions,
//! argument tags, argument counts). It cannot validate what native code does
//! with the arguments it receives; that is the caller's obligation, which is
//! why every call entry point is `unsafe`.

pub mod allocation;
pub mod bridge;
pub mod callbacks;
pub mod caller;
pub mod error;
pub mod loader;
pub mod marshal;
pub mod pointer;
pub mod symbol;
pub mod types;

pub use allocation::ManagedAllocation;
pub use bridge::{init, is_initialized, settings, BridgeSettings, DEFAULT_MAX_ARGUMENTS};
pub use callbacks::{CallbackValue, NativeCallback};
pub use caller::CallDispatcher;
pub use error::{
    AccessError, AllocError, BridgeError, BridgeResult, CallError, ConventionError, LinkError,
    MarshalError,
};
pub use loader::{platform_aliases, LibraryLoader};
pub use marshal::{Arg, MarshalContext};
pub use pointer::{NativePointer, PointerHandle, PointerKind, RawPointer};
pub use symbol::DynamicSymbol;
pub use types::{
    CallingConvention, Element, ElementKind, NativeValue, ReturnKind, ReturnValue, ValueKind,
    POINTER_SIZE,
};

/// Tether runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

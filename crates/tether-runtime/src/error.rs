//! Error taxonomy for the bridge
//!
//! Every failure on the managed side of the boundary is reported synchronously
//! at the operation that caused it. Faults inside native code are outside this
//! taxonomy: once control crosses into a callee, nothing here can observe them.

use thiserror::Error;

/// Library or symbol resolution failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No candidate file for the library could be found or opened
    #[error("Library not found: {library}")]
    LibraryNotFound { library: String },

    /// A candidate file was found but the platform loader rejected it
    #[error("Failed to load library '{library}': {reason}")]
    LoadFailed { library: String, reason: String },

    /// The library loaded but does not export the symbol
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },
}

/// Unrecognized calling-convention token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConventionError {
    #[error("unrecognized calling convention: {0:?}")]
    Unrecognized(String),
}

/// Rejected indirection through a managed allocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Byte range `offset..offset + width` falls outside the allocation
    #[error("access of {width} bytes at offset {offset} is out of bounds for allocation of {size} bytes")]
    OutOfBounds { offset: i64, width: usize, size: usize },

    /// Element range of the managed buffer side of a bulk copy is invalid
    #[error("buffer range {index}..{index}+{length} is out of bounds for buffer of length {buffer_len}")]
    BufferRange {
        index: usize,
        length: usize,
        buffer_len: usize,
    },

    /// The byte width of a bulk copy does not fit in `usize`
    #[error("transfer width overflows")]
    WidthOverflow,
}

/// Native allocator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("native allocator returned null for a request of {size} bytes")]
    OutOfMemory { size: usize },
}

/// Argument marshaling failure, raised before any native call is issued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// The argument's tag is not one of the supported categories
    #[error("unrecognized argument type: {0}")]
    UnsupportedTag(String),

    /// The tag is known but its literal does not parse
    #[error("invalid {tag} literal: {literal:?}")]
    InvalidLiteral { tag: String, literal: String },

    /// String argument cannot be represented as a NUL-terminated buffer
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// More arguments than a single dispatch accepts
    #[error("too many arguments: {count} (maximum {max})")]
    TooManyArguments { count: usize, max: usize },
}

/// Dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// The target address is null and must not be called
    #[error("attempted to call a null function pointer")]
    NullFunction,
}

/// Any bridge failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Convention(#[from] ConventionError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Call(#[from] CallError),

    /// Resolution through the process-wide loader was attempted before `init`
    #[error("bridge is not initialized; call tether_runtime::init first")]
    NotInitialized,
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

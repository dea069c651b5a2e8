//! Process-wide bridge state
//!
//! Symbol resolution by library name goes through one shared `LibraryLoader`.
//! It is created by an explicit, one-time `init` call; resolving before `init`
//! fails with `BridgeError::NotInitialized`.

use crate::error::{BridgeError, BridgeResult};
use crate::loader::{platform_aliases, LibraryLoader};
use crate::pointer::RawPointer;
use crate::types::CallingConvention;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Maximum arguments a single dispatch accepts unless configured otherwise
pub const DEFAULT_MAX_ARGUMENTS: usize = 32;

/// Settings the process-wide bridge is initialized with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Searched before the platform default directories, in order
    pub search_paths: Vec<PathBuf>,
    /// Logical library names mapped to platform file names
    pub aliases: HashMap<String, String>,
    pub max_arguments: usize,
    /// Convention used by `DynamicSymbol::native`
    pub default_convention: CallingConvention,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            aliases: platform_aliases(),
            max_arguments: DEFAULT_MAX_ARGUMENTS,
            default_convention: CallingConvention::Native,
        }
    }
}

struct Bridge {
    settings: BridgeSettings,
    loader: Mutex<LibraryLoader>,
}

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Initialize the process-wide bridge
///
/// Returns `true` if this call performed the initialization. Later calls leave
/// the bridge untouched and return `false`.
pub fn init(settings: BridgeSettings) -> bool {
    let mut performed = false;
    BRIDGE.get_or_init(|| {
        performed = true;
        log::debug!(
            "initializing bridge: {} extra search paths, {} aliases, max {} arguments",
            settings.search_paths.len(),
            settings.aliases.len(),
            settings.max_arguments
        );
        Bridge {
            loader: Mutex::new(LibraryLoader::with_settings(&settings)),
            settings,
        }
    });
    if !performed {
        log::debug!("bridge already initialized; ignoring new settings");
    }
    performed
}

pub fn is_initialized() -> bool {
    BRIDGE.get().is_some()
}

/// Settings the bridge was initialized with
pub fn settings() -> Option<&'static BridgeSettings> {
    BRIDGE.get().map(|bridge| &bridge.settings)
}

pub(crate) fn max_arguments() -> usize {
    settings().map_or(DEFAULT_MAX_ARGUMENTS, |s| s.max_arguments)
}

/// Resolve a symbol through the process-wide loader
///
/// The loader lock is held only for the resolution itself.
pub(crate) fn resolve(library: &str, symbol: &str) -> BridgeResult<RawPointer> {
    let bridge = BRIDGE.get().ok_or(BridgeError::NotInitialized)?;
    let mut loader = bridge
        .loader
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    Ok(loader.resolve(library, symbol)?)
}

//! Dynamic library loading and symbol resolution
//!
//! Provides cross-platform dynamic library loading using `libloading`.
//! Handles platform-specific library naming conventions, search paths and
//! logical library aliases. Loaded libraries stay open for the life of the
//! loader, so every address it resolves stays valid while the loader lives.

use crate::bridge::BridgeSettings;
use crate::error::LinkError;
use crate::pointer::{NativePointer, RawPointer};
use libloading::Library;
use std::collections::HashMap;
use std::os::raw::c_void;
use std::path::{Path, PathBuf};

/// Dynamic library loader with caching and platform-specific path resolution
///
/// # Safety
///
/// Loading dynamic libraries is inherently unsafe. The loaded code runs in the
/// same process and can perform arbitrary operations.
pub struct LibraryLoader {
    /// Cache of loaded libraries by resolved path, or by bare name when the
    /// platform loader found them
    loaded: HashMap<PathBuf, Library>,
    search_paths: Vec<PathBuf>,
    /// Logical name to platform file name
    aliases: HashMap<String, String>,
    lookups: usize,
}

impl LibraryLoader {
    /// Create a new library loader with default search paths and no aliases
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            search_paths: Self::default_search_paths(),
            aliases: HashMap::new(),
            lookups: 0,
        }
    }

    /// Create a loader configured from bridge settings
    ///
    /// Settings search paths are searched before the platform defaults, in the
    /// order given.
    pub fn with_settings(settings: &BridgeSettings) -> Self {
        let mut loader = Self::new();
        for path in settings.search_paths.iter().rev() {
            loader.add_search_path(path.clone());
        }
        for (name, file) in &settings.aliases {
            loader.add_alias(name, file);
        }
        loader
    }

    /// Get platform-specific default library search paths
    ///
    /// Returns standard system library paths for the current platform:
    /// - Linux: /usr/lib, /usr/local/lib, /lib (plus lib64 variants)
    /// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib
    /// - Windows: %SystemRoot%\System32
    /// - All platforms: current working directory, searched first
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));

            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            let root = std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string());
            paths.push(PathBuf::from(format!("{}\\System32", root)));
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Map a logical library name to a platform file name
    pub fn add_alias(&mut self, name: &str, file: &str) {
        self.aliases.insert(name.to_string(), file.to_string());
    }

    /// Add a custom search path (prepended to search list)
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn file_name_for<'a>(&'a self, library: &'a str) -> &'a str {
        self.aliases
            .get(library)
            .map(String::as_str)
            .unwrap_or(library)
    }

    /// Resolve a library file name to a path in the search list
    ///
    /// Handles platform-specific library naming conventions:
    /// - Linux: lib{name}.so
    /// - macOS: lib{name}.dylib or lib{name}.so
    /// - Windows: {name}.dll
    ///
    /// A name that already carries an extension is also tried verbatim.
    fn resolve_library_path(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if (path.is_absolute() || path.components().count() > 1) && path.exists() {
            return Some(path.to_path_buf());
        }

        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so"]
        };

        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        let mut candidates = Vec::new();
        if path.extension().is_some() {
            candidates.push(name.to_string());
        }
        for prefix in prefixes {
            for ext in extensions {
                candidates.push(format!("{}{}.{}", prefix, name, ext));
            }
        }

        self.search_paths
            .iter()
            .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
            .find(|full_path| full_path.is_file())
    }

    /// Open a library, returning its cache key
    fn open(&mut self, library: &str) -> Result<PathBuf, LinkError> {
        let file = self.file_name_for(library).to_string();

        let (key, found_on_path) = match self.resolve_library_path(&file) {
            Some(path) => (path, true),
            None => (PathBuf::from(&file), false),
        };

        if self.loaded.contains_key(&key) {
            return Ok(key);
        }

        // SAFETY: running library initializers is the accepted cost of loading
        let opened = unsafe { Library::new(&key) };
        match opened {
            Ok(handle) => {
                log::debug!("loaded library '{}' from {}", library, key.display());
                self.loaded.insert(key.clone(), handle);
                Ok(key)
            }
            Err(e) if found_on_path => Err(LinkError::LoadFailed {
                library: library.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => {
                log::debug!("platform loader could not open '{}': {}", file, e);
                Err(LinkError::LibraryNotFound {
                    library: library.to_string(),
                })
            }
        }
    }

    /// Load a library by logical name, file name or path
    ///
    /// Loads the library if not already loaded. Library name can be:
    /// - An alias: "c" -> "libc.so.6"
    /// - Short name: "m" -> lib{m}.{ext} in the search paths
    /// - File name known to the platform loader: "libc.so.6"
    /// - Full path: "/path/to/libfoo.so"
    pub fn load(&mut self, library: &str) -> Result<(), LinkError> {
        self.open(library).map(|_| ())
    }

    /// Resolve `symbol` in `library` to its address
    ///
    /// A symbol that resolves to a null address is reported as not found.
    pub fn resolve(&mut self, library: &str, symbol: &str) -> Result<RawPointer, LinkError> {
        self.lookups += 1;
        let key = self.open(library)?;
        let not_found = || LinkError::SymbolNotFound {
            library: library.to_string(),
            symbol: symbol.to_string(),
        };

        let handle = self.loaded.get(&key).ok_or_else(not_found)?;
        // SAFETY: the symbol is only read as an address, never called here
        let address = unsafe {
            handle
                .get::<*mut c_void>(symbol.as_bytes())
                .map(|sym| *sym)
                .map_err(|_| not_found())?
        };

        let pointer = RawPointer::from_ptr(address);
        if pointer.is_null() {
            return Err(not_found());
        }
        log::debug!("resolved {}!{} at {}", library, symbol, pointer);
        Ok(pointer)
    }

    /// Get the number of loaded libraries
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Number of symbol resolutions attempted
    pub fn lookup_count(&self) -> usize {
        self.lookups
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LibraryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryLoader")
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .field("search_paths", &self.search_paths)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Aliases for the C runtime (`c`) and math (`m`) libraries on this platform
pub fn platform_aliases() -> HashMap<String, String> {
    let pairs: &[(&str, &str)] = if cfg!(target_os = "linux") {
        &[("c", "libc.so.6"), ("m", "libm.so.6")]
    } else if cfg!(target_os = "macos") {
        &[("c", "libSystem.B.dylib"), ("m", "libSystem.B.dylib")]
    } else if cfg!(target_os = "windows") {
        &[("c", "msvcrt.dll"), ("m", "msvcrt.dll")]
    } else {
        &[]
    };
    pairs
        .iter()
        .map(|(name, file)| (name.to_string(), file.to_string()))
        .collect()
}

//! # urverk-loader
//!
//! Resolves a `(package, library)` pair to a registered module symbol. The
//! registry is the process-wide factory cache: packages register their
//! libraries once, the kernel resolves them at run-start, and everything is
//! dropped on teardown.
//!
//! The registry is generic over the symbol type so this crate stays free of
//! kernel types; the kernel instantiates it with its factory enum. A single
//! mutex guards load/unload, which keeps the registry re-entrancy-safe when
//! several kernels share one process.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// The module ABI version this kernel speaks. A module whose major differs
/// is refused.
pub const API_VERSION: ApiVersion = ApiVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn compatible_with(self, other: ApiVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("library not found: {package}/{library}")]
    LibraryNotFound { package: String, library: String },

    #[error("module {package}/{library} does not expose symbol '{symbol}'")]
    SymbolMissing {
        package: String,
        library: String,
        symbol: String,
    },

    #[error("module {package}/{library} targets API {found}, kernel speaks {expected}")]
    ApiVersionMismatch {
        package: String,
        library: String,
        found: ApiVersion,
        expected: ApiVersion,
    },
}

/// One registered library: its declared ABI version plus the factory symbol.
#[derive(Clone, Debug)]
pub struct Module<S> {
    pub api_version: ApiVersion,
    pub symbol: S,
}

#[derive(Default)]
struct PackageEntry<S> {
    libraries: BTreeMap<String, Module<S>>,
}

/// The `(package, library) → factory` registry. Owned by the host (or CLI)
/// and borrowed by the coordinator; it must outlive every simulator built
/// from it.
pub struct ModuleRegistry<S> {
    packages: Mutex<BTreeMap<String, PackageEntry<S>>>,
}

impl<S> Default for ModuleRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ModuleRegistry<S> {
    pub fn new() -> Self {
        Self {
            packages: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers (or replaces) a library under a package, creating the
    /// package entry on first use.
    pub fn register(
        &self,
        package: impl Into<String>,
        library: impl Into<String>,
        api_version: ApiVersion,
        symbol: S,
    ) {
        let package = package.into();
        let library = library.into();
        debug!(%package, %library, version = %api_version, "registering module");
        self.packages
            .lock()
            .entry(package)
            .or_insert_with(|| PackageEntry {
                libraries: BTreeMap::new(),
            })
            .libraries
            .insert(
                library,
                Module {
                    api_version,
                    symbol,
                },
            );
    }

    /// Drops a whole package and its factories.
    pub fn unload(&self, package: &str) {
        if self.packages.lock().remove(package).is_some() {
            info!(%package, "unloaded package");
        }
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.packages.lock().contains_key(package)
    }

    /// Registered `(package, library)` pairs, sorted.
    pub fn list(&self) -> Vec<(String, String)> {
        let packages = self.packages.lock();
        packages
            .iter()
            .flat_map(|(p, entry)| {
                entry
                    .libraries
                    .keys()
                    .map(move |l| (p.clone(), l.clone()))
            })
            .collect()
    }
}

impl<S: Clone> ModuleRegistry<S> {
    /// Resolves a library, enforcing the ABI major-version gate.
    pub fn resolve(&self, package: &str, library: &str) -> Result<Module<S>, LoadError> {
        let packages = self.packages.lock();
        let entry = packages
            .get(package)
            .ok_or_else(|| LoadError::PackageNotFound(package.to_string()))?;
        let module = entry
            .libraries
            .get(library)
            .ok_or_else(|| LoadError::LibraryNotFound {
                package: package.to_string(),
                library: library.to_string(),
            })?;
        if !module.api_version.compatible_with(API_VERSION) {
            return Err(LoadError::ApiVersionMismatch {
                package: package.to_string(),
                library: library.to_string(),
                found: module.api_version,
                expected: API_VERSION,
            });
        }
        Ok(module.clone())
    }
}

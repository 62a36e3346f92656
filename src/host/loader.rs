//! Loading bundles from shared libraries.
//!
//! A dynamic bundle is a `cdylib` built with [`crate::declare_bundle!`]. It
//! exports its binary interface version and a constructor returning the
//! bundle. The library stays loaded for as long as any effect from it is
//! alive.

use crate::core::error::PluginError;
use crate::plugin::bundle::{PluginBundle, ABI_SYMBOL, ABI_VERSION, BUNDLE_SYMBOL};
use libloading::{Library, Symbol};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// File extensions scanned for bundles.
pub const LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// A bundle and the library its code lives in.
pub struct LoadedBundle {
    // Dropped before `library`.
    bundle: Box<dyn PluginBundle>,
    library: Library,
    path: PathBuf,
}

impl LoadedBundle {
    /// The bundle.
    pub fn bundle(&self) -> &dyn PluginBundle {
        self.bundle.as_ref()
    }

    /// Where it was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying library.
    pub fn library(&self) -> &Library {
        &self.library
    }
}

fn load_failed(path: &Path, error: impl ToString) -> PluginError {
    PluginError::LoadFailed {
        path: path.display().to_string(),
        error: error.to_string(),
    }
}

/// Load one bundle library.
///
/// # Safety
///
/// Loading a library runs its initialisers, and the constructor is trusted
/// to return a bundle built against this crate's [`ABI_VERSION`].
pub unsafe fn load_bundle(path: &Path) -> Result<LoadedBundle, PluginError> {
    let library = unsafe { Library::new(path) }.map_err(|e| load_failed(path, e))?;

    let abi: Symbol<*const u32> = unsafe { library.get(ABI_SYMBOL) }.map_err(|e| load_failed(path, e))?;
    let plugin_version = unsafe { **abi };
    if plugin_version != ABI_VERSION {
        return Err(PluginError::IncompatibleVersion {
            host_version: ABI_VERSION,
            plugin_version,
        });
    }

    let constructor: Symbol<unsafe extern "C" fn() -> *mut dyn PluginBundle> =
        unsafe { library.get(BUNDLE_SYMBOL) }.map_err(|e| load_failed(path, e))?;
    let raw = unsafe { constructor() };
    if raw.is_null() {
        return Err(load_failed(path, "bundle constructor returned null"));
    }
    let bundle = unsafe { Box::from_raw(raw) };
    info!(
        "Loaded bundle {} with {} effect(s)",
        path.display(),
        bundle.number_of_plugins()
    );
    Ok(LoadedBundle {
        bundle,
        library,
        path: path.to_path_buf(),
    })
}

/// Library files under `dir`, recursively, in sorted order.
pub fn bundle_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            LIBRARY_EXTENSIONS.contains(&extension.as_str())
        })
        .collect();
    paths.sort();
    debug!("Found {} candidate bundle(s) under {}", paths.len(), dir.display());
    paths
}

/// Load every bundle under `dir`. Failures are returned alongside
/// successes so one bad file does not hide the rest.
///
/// # Safety
///
/// See [`load_bundle`]; every library found is loaded.
pub unsafe fn discover_bundles(dir: &Path) -> Vec<Result<LoadedBundle, PluginError>> {
    bundle_paths(dir)
        .iter()
        .map(|path| unsafe { load_bundle(path) })
        .collect()
}

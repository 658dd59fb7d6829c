//! Dynamic plugin loading.
//!
//! Plugins are cdylibs exporting `hearth_plugin_create` and
//! `hearth_plugin_destroy` (emitted by `hearth_core::export_plugin!`). The
//! library must stay alive for as long as the plugin instance exists, so
//! the pair travels together in [`LoadedLibrary`].

use std::path::Path;

use hearth_core::plugin::Plugin;
use libloading::{Library, Symbol};
use tracing::debug;

use crate::HostError;

type CreateFn = unsafe extern "C" fn() -> *mut dyn Plugin;

/// A plugin instance together with the library it came from.
///
/// Field order matters: the plugin box drops before the library unloads.
pub struct LoadedLibrary {
    pub plugin: Box<dyn Plugin>,
    _library: Library,
}

/// Loads a plugin cdylib and constructs its plugin instance.
///
/// # Safety-relevant contract
/// The library must have been built against the same `hearth_core` version
/// as the host; the `create` export returns an owning raw pointer (or null
/// when construction panicked on the plugin side).
pub fn load_plugin_library(path: &Path) -> Result<LoadedLibrary, HostError> {
    debug!("loading plugin library from {}", path.display());

    let library = unsafe {
        Library::new(path).map_err(|e| HostError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    let plugin_ptr = {
        let create: Symbol<CreateFn> = unsafe {
            library
                .get(b"hearth_plugin_create")
                .map_err(|e| HostError::Library {
                    path: path.to_path_buf(),
                    reason: format!("missing hearth_plugin_create export: {e}"),
                })?
        };
        unsafe { create() }
    };

    if plugin_ptr.is_null() {
        return Err(HostError::Library {
            path: path.to_path_buf(),
            reason: "hearth_plugin_create returned null".to_string(),
        });
    }

    let plugin = unsafe { Box::from_raw(plugin_ptr) };
    Ok(LoadedLibrary {
        plugin,
        _library: library,
    })
}

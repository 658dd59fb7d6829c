//! Plugin lifecycle contract and cdylib export glue.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::PluginContext;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin initialization failed: {0}")]
    InitializationFailed(String),
    #[error("plugin execution error: {0}")]
    ExecutionError(String),
    #[error("plugin not found: {0}")]
    NotFound(String),
}

/// A Hearth plugin entrypoint.
///
/// The host provides a [`PluginContext`]; plugin code talks to the runtime
/// contracts, never to platform types, so the same plugin runs against a
/// real adapter or the fake server unchanged.
///
/// Lifecycle:
/// 1. `on_load` — wiring only: register services, read static metadata.
///    Avoid listeners that assume a running server.
/// 2. `on_enable` — register listeners and commands, start scheduled tasks.
/// 3. `on_disable` — release resources; the host tears the context down
///    right after, which cancels anything still registered.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    async fn on_load(&mut self, _context: Arc<PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn on_enable(&mut self, context: Arc<PluginContext>) -> Result<(), PluginError>;

    async fn on_disable(&mut self, _context: Arc<PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Emits the `hearth_plugin_create` / `hearth_plugin_destroy` exports a
/// cdylib plugin needs for dynamic loading.
///
/// The plugin type must implement [`Default`] (the host constructs it with
/// no arguments) and [`Plugin`]. Both exports catch panics at the FFI
/// boundary: creation returns null on panic, destruction swallows it.
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[no_mangle]
        pub unsafe extern "C" fn hearth_plugin_create() -> *mut dyn $crate::plugin::Plugin {
            match ::std::panic::catch_unwind(|| {
                let plugin: Box<dyn $crate::plugin::Plugin> =
                    Box::new(<$plugin_type as ::std::default::Default>::default());
                Box::into_raw(plugin)
            }) {
                Ok(plugin_ptr) => plugin_ptr,
                Err(_) => ::std::ptr::null_mut::<$plugin_type>() as *mut dyn $crate::plugin::Plugin,
            }
        }

        #[no_mangle]
        pub unsafe extern "C" fn hearth_plugin_destroy(plugin: *mut dyn $crate::plugin::Plugin) {
            if plugin.is_null() {
                return;
            }
            let _ = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                let _ = Box::from_raw(plugin);
            }));
        }
    };
}

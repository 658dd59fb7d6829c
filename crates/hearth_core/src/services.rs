//! Per-context service registry ("DI-light").
//!
//! A runtime registry keeps the core adaptable to unknown host lifecycles
//! without forcing a dependency-injection framework on plugins. Entries are
//! the one intentionally shared resource between plugins that opt into it.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::context::ContextGate;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service registry is torn down")]
    ContextClosed,
    #[error("service already registered for type {type_name}")]
    Duplicate { type_name: &'static str },
    #[error("missing service for type {type_name}")]
    Missing { type_name: &'static str },
}

struct ServiceEntry {
    instance: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Maps a capability type to a single registered instance.
///
/// Registration rejects duplicates so a second provider fails loudly at
/// registration time instead of silently overriding the first;
/// [`register_replacing`](Self::register_replacing) is the explicit opt-in
/// for replacement.
pub struct ServiceRegistry {
    entries: DashMap<TypeId, ServiceEntry>,
    gate: ContextGate,
}

impl ServiceRegistry {
    /// A stand-alone registry, for tests and tools that do not go through a
    /// [`PluginContext`](crate::context::PluginContext).
    pub fn new() -> Self {
        Self::scoped(ContextGate::new())
    }

    pub(crate) fn scoped(gate: ContextGate) -> Self {
        Self {
            entries: DashMap::new(),
            gate,
        }
    }

    /// Registers `instance` as the provider for `T`.
    pub fn register<T: Send + Sync + 'static>(&self, instance: T) -> Result<(), ServiceError> {
        // The gate is checked while the entry holds its shard lock, so a
        // registration racing teardown is either cleared with the rest or
        // rejected outright.
        let slot = self.entries.entry(TypeId::of::<T>());
        if self.gate.is_closed() {
            return Err(ServiceError::ContextClosed);
        }
        match slot {
            Entry::Occupied(_) => Err(ServiceError::Duplicate {
                type_name: std::any::type_name::<T>(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(ServiceEntry {
                    instance: Arc::new(instance),
                    type_name: std::any::type_name::<T>(),
                });
                Ok(())
            }
        }
    }

    /// Registers `instance`, replacing any existing provider for `T`.
    pub fn register_replacing<T: Send + Sync + 'static>(
        &self,
        instance: T,
    ) -> Result<(), ServiceError> {
        let slot = self.entries.entry(TypeId::of::<T>());
        if self.gate.is_closed() {
            return Err(ServiceError::ContextClosed);
        }
        slot.insert(ServiceEntry {
            instance: Arc::new(instance),
            type_name: std::any::type_name::<T>(),
        });
        Ok(())
    }

    /// Returns the provider for `T`, if registered.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entry = self.entries.get(&TypeId::of::<T>())?;
        entry.instance.clone().downcast::<T>().ok()
    }

    /// Returns the provider for `T`, or an error naming the missing type.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ServiceError> {
        self.get::<T>().ok_or(ServiceError::Missing {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Unregisters the provider for `T`.
    pub fn remove<T: Send + Sync + 'static>(&self) {
        self.entries.remove(&TypeId::of::<T>());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered type names, for diagnostics.
    pub fn registered_types(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.type_name).collect()
    }

    /// Drops every entry. Used by context teardown.
    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Economy {
        starting_balance: u64,
    }

    #[test]
    fn register_get_require_remove_roundtrip() {
        let registry = ServiceRegistry::new();

        assert!(registry.get::<Economy>().is_none());
        assert!(matches!(
            registry.require::<Economy>(),
            Err(ServiceError::Missing { .. })
        ));

        registry
            .register(Economy {
                starting_balance: 100,
            })
            .unwrap();
        assert_eq!(registry.get::<Economy>().unwrap().starting_balance, 100);
        assert_eq!(registry.require::<Economy>().unwrap().starting_balance, 100);

        registry.remove::<Economy>();
        assert!(registry.get::<Economy>().is_none());
    }

    #[test]
    fn duplicate_registration_fails_fast() {
        let registry = ServiceRegistry::new();
        registry
            .register(Economy {
                starting_balance: 100,
            })
            .unwrap();

        let second = registry.register(Economy {
            starting_balance: 500,
        });
        assert!(matches!(second, Err(ServiceError::Duplicate { .. })));
        assert_eq!(registry.get::<Economy>().unwrap().starting_balance, 100);
    }

    #[test]
    fn register_replacing_overwrites() {
        let registry = ServiceRegistry::new();
        registry
            .register(Economy {
                starting_balance: 100,
            })
            .unwrap();
        registry
            .register_replacing(Economy {
                starting_balance: 500,
            })
            .unwrap();
        assert_eq!(registry.get::<Economy>().unwrap().starting_balance, 500);
    }

    #[test]
    fn closed_registry_rejects_registration() {
        let gate = ContextGate::new();
        let registry = ServiceRegistry::scoped(gate.clone());
        gate.close();

        assert!(matches!(
            registry.register(Economy {
                starting_balance: 0
            }),
            Err(ServiceError::ContextClosed)
        ));
    }
}

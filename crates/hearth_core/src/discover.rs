//! Explicit discovery pass for bulk registration.
//!
//! Instead of scanning for annotated classes the way reflective hosts do,
//! plugins hand the host a list of [`Registration`] descriptors built from
//! plain constructors. The pass walks the list and calls the same manual
//! `register`/`subscribe` entry points a plugin would call by hand, keeping
//! discovery and runtime registration decoupled.

use std::sync::Arc;

use crate::commands::{CommandDefinition, CommandError};
use crate::context::PluginContext;
use crate::events::{Event, EventBus, EventError, EventPriority, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Event(#[from] EventError),
}

enum RegistrationKind {
    Command(Box<dyn Fn() -> CommandDefinition + Send + Sync>),
    Subscriber(Box<dyn Fn(&EventBus) -> Result<Subscription, EventError> + Send + Sync>),
}

/// One discoverable registration: a command constructor or a declared
/// event subscriber.
pub struct Registration {
    kind: RegistrationKind,
}

impl Registration {
    /// A command built by a no-argument constructor.
    pub fn command(make: impl Fn() -> CommandDefinition + Send + Sync + 'static) -> Self {
        Self {
            kind: RegistrationKind::Command(Box::new(make)),
        }
    }

    /// An event subscriber with a declared priority and cancelled-event
    /// behavior, equivalent to a manual `subscribe` call.
    pub fn subscriber<E, F>(priority: EventPriority, ignore_cancelled: bool, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + Clone + 'static,
    {
        Self {
            kind: RegistrationKind::Subscriber(Box::new(move |bus| {
                bus.subscribe(priority, ignore_cancelled, handler.clone())
            })),
        }
    }
}

/// Registers every entry against `context`, stopping at the first failure.
///
/// Subscriber handles are discarded: discovered listeners live until the
/// context is torn down.
pub fn register_all(
    registrations: &[Registration],
    context: &Arc<PluginContext>,
) -> Result<(), DiscoveryError> {
    for registration in registrations {
        match &registration.kind {
            RegistrationKind::Command(make) => {
                context.commands().register(make())?;
            }
            RegistrationKind::Subscriber(install) => {
                install(context.events())?;
            }
        }
    }
    Ok(())
}

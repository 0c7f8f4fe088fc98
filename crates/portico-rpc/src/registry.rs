// crates/portico-rpc/src/registry.rs
//
// Service registry.
//
// Handler modules contribute a ServiceRegistration each; the composition root
// adds them to a ServiceRegistry, and the server applies the registry exactly
// once while configuring. After that the registry is frozen.

use std::fmt;

use crate::error::{RegistrationError, RpcError};
use crate::method::MethodTable;

type RegisterFn = Box<dyn FnOnce(&mut MethodTable) -> Result<(), RegistrationError> + Send>;

/// A callback attaching one logical service's methods to the method table.
pub struct ServiceRegistration {
    name: String,
    register: RegisterFn,
}

impl ServiceRegistration {
    pub fn new<F>(name: impl Into<String>, register: F) -> Self
    where
        F: FnOnce(&mut MethodTable) -> Result<(), RegistrationError> + Send + 'static,
    {
        Self {
            name: name.into(),
            register: Box::new(register),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of registrations, applied once.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    pending: Vec<ServiceRegistration>,
    applied: Vec<String>,
    frozen: bool,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration. Fails once the registry has been applied.
    pub fn add(&mut self, registration: ServiceRegistration) -> Result<(), RpcError> {
        if self.frozen {
            return Err(RpcError::RegistryFrozen);
        }
        self.pending.push(registration);
        Ok(())
    }

    /// Builder-style `add`.
    pub fn with(mut self, registration: ServiceRegistration) -> Result<Self, RpcError> {
        self.add(registration)?;
        Ok(self)
    }

    /// Run every callback in insertion order against `table`, then freeze.
    ///
    /// The first failing callback aborts the apply and is reported by name.
    /// The registry is frozen either way; a second apply is rejected.
    pub fn apply(&mut self, table: &mut MethodTable) -> Result<(), RpcError> {
        if self.frozen {
            return Err(RpcError::RegistryFrozen);
        }
        self.frozen = true;

        for registration in std::mem::take(&mut self.pending) {
            let ServiceRegistration { name, register } = registration;
            let before = table.len();
            register(table).map_err(|source| RpcError::Registration {
                service: name.clone(),
                source,
            })?;
            tracing::debug!(
                "Registered service {} ({} methods)",
                name,
                table.len() - before
            );
            self.applied.push(name);
        }
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Registrations waiting to be applied.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Names of registrations applied so far, in order.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }
}

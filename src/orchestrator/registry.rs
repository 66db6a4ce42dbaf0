//! Capability registry
//!
//! Read-only catalog from `CapabilityId` to its handler. Built once at startup
//! and shared across requests behind an `Arc`.

use crate::orchestrator::capability::{Capability, CapabilityId, OracleCapability};
use crate::orchestrator::error::OrchestrationError;
use crate::orchestrator::oracle::Oracle;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable mapping of capability identifiers to handlers
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    handlers: BTreeMap<CapabilityId, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Start building a registry
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::default()
    }

    /// Registry with a prompt-backed handler for every vocabulary entry
    pub fn with_oracle_defaults(oracle: Arc<dyn Oracle>) -> Self {
        CapabilityId::ALL
            .into_iter()
            .fold(Self::builder(), |builder, id| {
                builder.register(id, Arc::new(OracleCapability::new(id, oracle.clone())))
            })
            .build()
    }

    /// Resolve a wire name to its identifier and handler
    ///
    /// # Errors
    /// * `UnknownCapability` if the name is not in the vocabulary
    /// * `CapabilityNotRegistered` if the name is known but has no handler
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(CapabilityId, Arc<dyn Capability>), OrchestrationError> {
        let id: CapabilityId = name.parse()?;
        self.handlers
            .get(&id)
            .map(|handler| (id, handler.clone()))
            .ok_or_else(|| OrchestrationError::CapabilityNotRegistered(id.name().to_string()))
    }

    /// Registered identifiers
    pub fn ids(&self) -> impl Iterator<Item = CapabilityId> + '_ {
        self.handlers.keys().copied()
    }

    /// Whether `id` has a handler
    pub fn contains(&self, id: CapabilityId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for `CapabilityRegistry`
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    handlers: BTreeMap<CapabilityId, Arc<dyn Capability>>,
}

impl CapabilityRegistryBuilder {
    /// Register (or replace) the handler for `id`
    pub fn register(mut self, id: CapabilityId, handler: Arc<dyn Capability>) -> Self {
        if self.handlers.insert(id, handler).is_some() {
            tracing::debug!(capability = %id, "Replaced capability handler");
        }
        self
    }

    /// Freeze the registry
    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            handlers: self.handlers,
        }
    }
}

//! Startup-resolved table of which capability families exist in this process.

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;

use crate::{Capability, Error, PipelineLoader, Result};

#[derive(Clone)]
pub enum Availability {
    Ready(Arc<dyn PipelineLoader>),
    /// Switched off by configuration.
    Disabled(String),
    /// Switched on, but the backend it needs is missing.
    Unavailable(String),
}

impl Availability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn status(&self) -> CapabilityStatus {
        match self {
            Self::Ready(_) => CapabilityStatus {
                available: true,
                reason: None,
            },
            Self::Disabled(reason) | Self::Unavailable(reason) => CapabilityStatus {
                available: false,
                reason: Some(reason.clone()),
            },
        }
    }
}

impl std::fmt::Debug for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready"),
            Self::Disabled(reason) => f.debug_tuple("Disabled").field(reason).finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One descriptor per family. Families never registered count as disabled.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<Capability, Availability>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, availability: Availability) -> Self {
        self.entries.insert(capability, availability);
        self
    }

    pub fn availability(&self, capability: Capability) -> Availability {
        self.entries.get(&capability).cloned().unwrap_or_else(|| {
            Availability::Disabled(format!("{capability} capability is not configured"))
        })
    }

    pub fn is_ready(&self, capability: Capability) -> bool {
        self.entries
            .get(&capability)
            .is_some_and(Availability::is_ready)
    }

    /// The loader for `capability`, or the error that explains why there is none.
    pub fn loader(&self, capability: Capability) -> Result<Arc<dyn PipelineLoader>> {
        match self.availability(capability) {
            Availability::Ready(loader) => Ok(loader),
            Availability::Disabled(reason) => Err(Error::ConfigurationMissing(reason)),
            Availability::Unavailable(reason) => Err(Error::ResourceUnavailable(reason)),
        }
    }

    pub fn statuses(&self) -> BTreeMap<Capability, CapabilityStatus> {
        Capability::ALL
            .into_iter()
            .map(|c| (c, self.availability(c).status()))
            .collect()
    }
}

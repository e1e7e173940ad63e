//! Lazily constructed, single-occupancy pipeline slots.
//!
//! Each [`SlotKey`] owns one async mutex that is held across construction and
//! invocation, so concurrent callers for an empty slot trigger exactly one load
//! and never run the same occupant concurrently. Different slots are independent.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Instant,
};

use image::DynamicImage;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    CapabilityTable, DeviceConfig, Error, GenerationRequest, LoadSpec, ModelSource, Pipeline,
    Result, SlotKey,
};

struct Occupant {
    identifier: String,
    pipeline: Arc<dyn Pipeline>,
}

type SlotCell = Arc<Mutex<Option<Occupant>>>;

pub struct Registry {
    capabilities: CapabilityTable,
    device: DeviceConfig,
    slots: HashMap<SlotKey, SlotCell>,
    /// Mirror of the occupied slots, readable while a slot is busy.
    occupied: StdMutex<BTreeMap<SlotKey, String>>,
}

/// Exclusive use of one slot's occupant for the lifetime of the lease.
pub struct SlotLease {
    slot: SlotKey,
    pipeline: Arc<dyn Pipeline>,
    _guard: OwnedMutexGuard<Option<Occupant>>,
}

impl SlotLease {
    pub fn slot(&self) -> SlotKey {
        self.slot
    }

    pub async fn run(&self, request: GenerationRequest) -> Result<DynamicImage> {
        let started = Instant::now();
        let result = self.pipeline.run(request).await;
        match &result {
            Ok(_) => tracing::info!(
                slot = %self.slot,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "pipeline call finished"
            ),
            Err(e) => tracing::warn!(slot = %self.slot, error = %e, "pipeline call failed"),
        }
        result
    }
}

impl Registry {
    pub fn new(capabilities: CapabilityTable, device: DeviceConfig) -> Self {
        let slots = SlotKey::ALL
            .into_iter()
            .map(|key| (key, Arc::new(Mutex::new(None))))
            .collect();
        Self {
            capabilities,
            device,
            slots,
            occupied: StdMutex::new(BTreeMap::new()),
        }
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn cell(&self, slot: SlotKey) -> SlotCell {
        // Every key is inserted in `new`.
        Arc::clone(&self.slots[&slot])
    }

    fn index(&self) -> std::sync::MutexGuard<'_, BTreeMap<SlotKey, String>> {
        self.occupied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a lease on `slot`, constructing its occupant from `source` if the slot
    /// is empty or currently holds a different source.
    pub async fn acquire(&self, slot: SlotKey, source: &ModelSource) -> Result<SlotLease> {
        // Fail before queueing behind the slot lock when the family is absent.
        let loader = self.capabilities.loader(slot.capability())?;
        let identifier = source.identifier();

        let mut guard = self.cell(slot).lock_owned().await;
        if let Some(occupant) = guard.as_ref() {
            if occupant.identifier == identifier {
                tracing::debug!(%slot, source = %identifier, "reusing loaded pipeline");
                let pipeline = Arc::clone(&occupant.pipeline);
                return Ok(SlotLease {
                    slot,
                    pipeline,
                    _guard: guard,
                });
            }
        }

        if let Some(previous) = guard.take() {
            tracing::info!(
                %slot,
                previous = %previous.identifier,
                next = %identifier,
                "replacing loaded pipeline"
            );
            self.index().remove(&slot);
            release_occupant(slot, previous).await;
        }

        let spec = LoadSpec {
            slot,
            kind: slot.kind(),
            source: source.clone(),
            device: self.device.clone(),
        };
        tracing::info!(
            %slot,
            source = %identifier,
            device = %spec.device.device,
            precision = spec.device.precision.as_str(),
            "loading pipeline"
        );
        let started = Instant::now();
        let pipeline = loader.load(&spec).await.map_err(|e| match e {
            e @ (Error::ResourceLoadFailed { .. }
            | Error::ResourceUnavailable(_)
            | Error::ConfigurationMissing(_)) => e,
            other => Error::load_failed(slot, other),
        })?;
        tracing::info!(
            %slot,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline loaded"
        );

        *guard = Some(Occupant {
            identifier: identifier.clone(),
            pipeline: Arc::clone(&pipeline),
        });
        self.index().insert(slot, identifier);
        Ok(SlotLease {
            slot,
            pipeline,
            _guard: guard,
        })
    }

    /// Acquires `slot` and runs one request while holding it.
    pub async fn run(
        &self,
        slot: SlotKey,
        source: &ModelSource,
        request: GenerationRequest,
    ) -> Result<DynamicImage> {
        self.acquire(slot, source).await?.run(request).await
    }

    /// Drops the occupant of `slot`. Returns whether anything was loaded.
    pub async fn release(&self, slot: SlotKey) -> bool {
        let mut guard = self.cell(slot).lock_owned().await;
        match guard.take() {
            Some(occupant) => {
                self.index().remove(&slot);
                release_occupant(slot, occupant).await;
                true
            }
            None => false,
        }
    }

    /// Releases every slot, returning the keys that held an occupant.
    pub async fn release_all(&self) -> Vec<SlotKey> {
        let mut released = Vec::new();
        for slot in SlotKey::ALL {
            if self.release(slot).await {
                released.push(slot);
            }
        }
        released
    }

    /// Occupied slots with the source identifier each was loaded from.
    pub fn list_occupied(&self) -> BTreeMap<SlotKey, String> {
        self.index().clone()
    }
}

async fn release_occupant(slot: SlotKey, occupant: Occupant) {
    if let Err(e) = occupant.pipeline.release().await {
        tracing::warn!(%slot, error = %e, "backend did not confirm release");
    }
    tracing::info!(%slot, source = %occupant.identifier, "pipeline released");
}

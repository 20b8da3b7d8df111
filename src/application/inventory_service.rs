//! Remote-facing facade over the reader link.
//!
//! The published contract has no error channel: inventory failures become
//! an empty list and an unknown power becomes `-1`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::domain::{LinkStatus, POWER_UNKNOWN};

use super::reader_link::ReaderLink;
use super::supervisor::{Cadence, SupervisorHandle};

/// Version string of the published interface.
pub const SERVICE_VERSION: &str = "1.0";

/// Link status plus the power reading, as published.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    /// Link state.
    #[serde(flatten)]
    pub link: LinkStatus,
    /// Whether the reader answered a probe made for this report.
    pub responding: bool,
    /// Reader power in mW, `-1` when unknown.
    pub power_mw: i64,
}

/// Inventory service backed by one reader link.
#[derive(Debug)]
pub struct InventoryService {
    link: Arc<ReaderLink>,
    cadence: Cadence,
    started: AtomicBool,
    supervisor: Mutex<Option<SupervisorHandle>>,
}

impl InventoryService {
    /// Wrap a link. The supervisor is not running until [`start`](Self::start).
    #[must_use]
    pub fn new(link: Arc<ReaderLink>, cadence: Cadence) -> Self {
        Self {
            link,
            cadence,
            started: AtomicBool::new(false),
            supervisor: Mutex::new(None),
        }
    }

    /// The underlying link.
    #[must_use]
    pub const fn link(&self) -> &Arc<ReaderLink> {
        &self.link
    }

    /// Spawn the supervisor on the current tokio runtime.
    ///
    /// Only the first call starts it; later calls (including after
    /// [`stop`](Self::stop)) return `false`.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) || self.link.is_shut_down() {
            return false;
        }

        let handle = SupervisorHandle::spawn(Arc::clone(&self.link), self.cadence);
        *self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!("Inventory service started");
        true
    }

    /// Tear the link down for good, then stop the supervisor.
    ///
    /// The link goes first so a connect already scanning ports gives up
    /// after the port it is on instead of walking the rest.
    pub async fn stop(&self) {
        let link = Arc::clone(&self.link);
        if let Err(e) = tokio::task::spawn_blocking(move || link.shutdown()).await {
            tracing::error!(error = %e, "Link shutdown panicked");
        }

        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.stop().await;
        }

        tracing::info!("Inventory service stopped");
    }

    /// Tags currently visible, or an empty list if the reader is unreachable.
    pub async fn inventory(&self) -> Vec<String> {
        let link = Arc::clone(&self.link);

        match tokio::task::spawn_blocking(move || link.inventory()).await {
            Ok(Ok(inventory)) => {
                tracing::info!(count = inventory.len(), tags = ?inventory, "getInventory");
                inventory
            }
            Ok(Err(e)) if e.is_link_failure() => {
                tracing::debug!(error = %e, "getInventory returned empty");
                Vec::new()
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "getInventory failed");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "Inventory call panicked");
                Vec::new()
            }
        }
    }

    /// Interface version.
    #[must_use]
    pub const fn version(&self) -> &'static str {
        SERVICE_VERSION
    }

    /// Reader power in mW, `-1` when unknown.
    pub async fn power(&self) -> i64 {
        let link = Arc::clone(&self.link);

        tokio::task::spawn_blocking(move || link.power())
            .await
            .ok()
            .flatten()
            .map_or(POWER_UNKNOWN, i64::from)
    }

    /// Pass `power_mw` to the reader and report the power it now uses.
    ///
    /// A rejected value leaves the previous setting in place.
    pub async fn set_power(&self, power_mw: u32) -> i64 {
        let link = Arc::clone(&self.link);

        if let Err(e) = tokio::task::spawn_blocking(move || link.set_power(power_mw)).await {
            tracing::error!(error = %e, "Set power call panicked");
        }

        self.power().await
    }

    /// Link status with a fresh probe and power reading.
    pub async fn status(&self) -> ProxyStatus {
        let link = Arc::clone(&self.link);

        let (responding, power) = tokio::task::spawn_blocking(move || (link.probe(), link.power()))
            .await
            .unwrap_or((false, None));

        ProxyStatus {
            link: self.link.status(),
            responding,
            power_mw: power.map_or(POWER_UNKNOWN, i64::from),
        }
    }
}

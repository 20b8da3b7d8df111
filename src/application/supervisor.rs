//! Background loop that keeps the reader link alive.
//!
//! Probes the reader on a steady cadence; after a failed probe it retries
//! `connect` on a tighter cadence until the reader is back. Driver calls are
//! blocking, so each one runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{AppError, SupervisorConfig};

use super::reader_link::ReaderLink;

/// Probe and retry cadence.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    /// Pause between probes while connected.
    pub probe_interval: Duration,
    /// Pause between connect attempts while recovering.
    pub retry_interval: Duration,
}

impl From<&SupervisorConfig> for Cadence {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            probe_interval: config.probe_interval(),
            retry_interval: config.retry_interval(),
        }
    }
}

/// Handle to a running supervisor task.
#[derive(Debug)]
pub struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Spawn the supervisor for `link` on the current tokio runtime.
    #[must_use]
    pub fn spawn(link: Arc<ReaderLink>, cadence: Cadence) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            supervise(link, cadence, task_cancel).await;
        });

        Self { cancel, task }
    }

    /// Stop the loop and wait for it to exit.
    ///
    /// A connect attempt already running on the blocking pool is not
    /// interrupted; its result is discarded by the link once shut down.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Supervisor task ended abnormally");
        }
    }
}

/// Sleep for `period`, returning `false` if cancelled first.
async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(period) => true,
    }
}

/// Run a blocking link call on the blocking pool.
async fn on_link<T, F>(link: &Arc<ReaderLink>, call: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&ReaderLink) -> T + Send + 'static,
{
    let link = Arc::clone(link);
    match tokio::task::spawn_blocking(move || call(&link)).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Reader call panicked");
            None
        }
    }
}

/// Supervisor loop body. Returns on cancellation or link shutdown.
async fn supervise(link: Arc<ReaderLink>, cadence: Cadence, cancel: CancellationToken) {
    tracing::info!(
        probe_ms = cadence.probe_interval.as_millis(),
        retry_ms = cadence.retry_interval.as_millis(),
        "Reader supervisor started"
    );

    'outer: loop {
        if !pause(cadence.probe_interval, &cancel).await || link.is_shut_down() {
            break;
        }

        if on_link(&link, ReaderLink::heartbeat).await.unwrap_or(false) {
            continue;
        }

        on_link(&link, ReaderLink::begin_recovery).await;
        let mut attempts: u64 = 0;

        loop {
            if !pause(cadence.retry_interval, &cancel).await {
                break 'outer;
            }

            attempts += 1;
            tracing::debug!(attempt = attempts, "Trying to connect to the reader");

            match on_link(&link, ReaderLink::connect).await {
                Some(Ok(())) => {
                    tracing::info!(attempts, "Reader link recovered");
                    break;
                }
                Some(Err(AppError::ShutDown)) => break 'outer,
                Some(Err(e)) => {
                    tracing::trace!(attempt = attempts, error = %e, "Connect attempt failed");
                    on_link(&link, ReaderLink::begin_recovery).await;
                }
                None => {
                    on_link(&link, ReaderLink::begin_recovery).await;
                }
            }
        }
    }

    tracing::info!("Reader supervisor stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::application::reader_link::LinkSettings;
    use crate::domain::LinkPhase;
    use crate::infrastructure::SimulatedReader;

    const FAST: Cadence = Cadence {
        probe_interval: Duration::from_millis(10),
        retry_interval: Duration::from_millis(5),
    };

    fn link_with(reader: &SimulatedReader) -> Arc<ReaderLink> {
        Arc::new(ReaderLink::new(
            LinkSettings {
                configured_port: Some("/dev/ttyUSB0".into()),
                logical_source: "Source_0".into(),
                target_power_mw: 199,
                call_timeout: Duration::from_millis(500),
            },
            Box::new(reader.clone()),
            Box::new(reader.clone()),
        ))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connects_from_cold_start() {
        let reader = SimulatedReader::new(&["/dev/ttyUSB0"], "/dev/ttyUSB0");
        let link = link_with(&reader);

        let handle = SupervisorHandle::spawn(Arc::clone(&link), FAST);

        assert!(wait_for(|| link.is_live()).await);
        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_recovers_after_port_renumbering() {
        let reader = SimulatedReader::new(&["/dev/ttyUSB0", "/dev/ttyUSB1"], "/dev/ttyUSB0");
        let link = link_with(&reader);
        link.connect().unwrap();
        let handle = SupervisorHandle::spawn(Arc::clone(&link), FAST);

        reader.unplug();
        assert!(wait_for(|| !link.is_live()).await);
        reader.plug_into("/dev/ttyUSB1");

        assert!(
            wait_for(|| link.is_live() && link.status().port.as_deref() == Some("/dev/ttyUSB1"))
                .await
        );
        assert_eq!(reader.open_sessions(), 1);
        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inventory_during_recovery_fails_fast() {
        let reader = SimulatedReader::new(&["/dev/ttyUSB0"], "/dev/ttyUSB0");
        let link = link_with(&reader);
        link.connect().unwrap();
        reader.set_open_delay(Duration::from_millis(300));
        let handle = SupervisorHandle::spawn(Arc::clone(&link), FAST);

        reader.unplug();
        assert!(wait_for(|| link.phase() == LinkPhase::Connecting).await);

        let started = Instant::now();
        let result = link.inventory();

        assert!(matches!(result, Err(AppError::LinkDown)));
        assert!(started.elapsed() < Duration::from_millis(100));
        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_attempts_after_stop_and_shutdown() {
        let reader = SimulatedReader::new(&["/dev/ttyUSB0"], "/dev/ttyUSB0");
        reader.unplug();
        let link = link_with(&reader);
        let handle = SupervisorHandle::spawn(Arc::clone(&link), FAST);
        assert!(wait_for(|| !reader.open_attempts().is_empty()).await);

        handle.stop().await;
        link.shutdown();
        reader.clear_open_attempts();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(reader.open_attempts().is_empty());
        assert_eq!(link.phase(), LinkPhase::Shutdown);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loop_exits_when_link_shut_down() {
        let reader = SimulatedReader::new(&["/dev/ttyUSB0"], "/dev/ttyUSB0");
        let link = link_with(&reader);
        let handle = SupervisorHandle::spawn(Arc::clone(&link), FAST);
        assert!(wait_for(|| link.is_live()).await);

        link.shutdown();

        assert!(wait_for(|| handle.task.is_finished()).await);
    }
}

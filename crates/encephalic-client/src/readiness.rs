use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::client::ServiceClient;
use crate::error::ClientError;
use crate::types::Health;

/// Service-level availability, separate from any individual request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    Initializing,
    Healthy,
    Unavailable(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    /// Re-poll delay after the service reports it is still initializing
    pub poll_interval: Duration,
    /// Retry delay after a transport failure
    pub error_interval: Duration,
    /// Consecutive transport failures before giving up as `Unavailable`
    pub max_failures: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_interval: Duration::from_secs(3),
            max_failures: 10,
        }
    }
}

/// Background worker polling `/api/health` until the service is ready with
/// data loaded. Emits at most one terminal transition (`Healthy` or
/// `Unavailable`); consumers start from `Initializing` themselves.
///
/// Dropping the probe cancels any scheduled poll without a final emission.
pub struct ReadinessProbe {
    stop_tx: Sender<()>,
    state_rx: Receiver<ReadinessState>,
    handle: Option<JoinHandle<()>>,
}

impl ReadinessProbe {
    pub fn spawn(client: Arc<ServiceClient>, config: ProbeConfig) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let (state_tx, state_rx) = bounded(1);
        let handle = std::thread::spawn(move || {
            run_probe_loop(|| client.health(), config, &stop_rx, &state_tx);
        });
        Self {
            stop_tx,
            state_rx,
            handle: Some(handle),
        }
    }

    /// Non-blocking check for the terminal transition.
    pub fn try_state(&self) -> Option<ReadinessState> {
        self.state_rx.try_recv().ok()
    }
}

impl Drop for ReadinessProbe {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_probe_loop(
    mut health: impl FnMut() -> Result<Health, ClientError>,
    config: ProbeConfig,
    stop_rx: &Receiver<()>,
    state_tx: &Sender<ReadinessState>,
) {
    let mut failures = 0u32;
    loop {
        let delay = match health() {
            Ok(report) if report.is_ready() => {
                log::info!("analysis service is ready");
                let _ = state_tx.send(ReadinessState::Healthy);
                return;
            }
            Ok(report) => {
                log::debug!("service not ready yet (status '{}')", report.status);
                failures = 0;
                config.poll_interval
            }
            Err(err) => {
                failures += 1;
                if failures >= config.max_failures {
                    log::warn!("giving up on health probe after {failures} failures: {err}");
                    let _ = state_tx.send(ReadinessState::Unavailable(err.to_string()));
                    return;
                }
                config.error_interval
            }
        };
        match stop_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => continue,
            // Cancelled (or the handle is gone): stop silently.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ProbeConfig {
        ProbeConfig {
            poll_interval: Duration::ZERO,
            error_interval: Duration::ZERO,
            max_failures: 3,
        }
    }

    fn health(status: &str, data_loaded: bool) -> Health {
        Health {
            status: status.to_string(),
            data_loaded,
        }
    }

    #[test]
    fn transitions_to_healthy_once_data_is_loaded() {
        let (_stop_tx, stop_rx) = bounded(1);
        let (state_tx, state_rx) = bounded(1);
        let mut responses = vec![
            Ok(health("initializing", false)),
            Ok(health("healthy", false)),
            Ok(health("healthy", true)),
        ]
        .into_iter();

        run_probe_loop(|| responses.next().unwrap(), fast_config(), &stop_rx, &state_tx);

        assert_eq!(state_rx.try_recv().unwrap(), ReadinessState::Healthy);
        assert!(state_rx.try_recv().is_err());
    }

    #[test]
    fn transport_failures_are_retried_then_reported() {
        let (_stop_tx, stop_rx) = bounded(1);
        let (state_tx, state_rx) = bounded(1);
        let mut calls = 0;

        run_probe_loop(
            || {
                calls += 1;
                Err(ClientError::transport("connection refused"))
            },
            fast_config(),
            &stop_rx,
            &state_tx,
        );

        assert_eq!(calls, 3);
        assert!(matches!(
            state_rx.try_recv().unwrap(),
            ReadinessState::Unavailable(_)
        ));
    }

    #[test]
    fn a_successful_poll_resets_the_failure_budget() {
        let (_stop_tx, stop_rx) = bounded(1);
        let (state_tx, state_rx) = bounded(1);
        let mut responses = vec![
            Err(ClientError::transport("refused")),
            Err(ClientError::transport("refused")),
            Ok(health("initializing", false)),
            Err(ClientError::transport("refused")),
            Err(ClientError::transport("refused")),
            Err(ClientError::transport("refused")),
        ]
        .into_iter();

        run_probe_loop(|| responses.next().unwrap(), fast_config(), &stop_rx, &state_tx);

        assert!(matches!(
            state_rx.try_recv().unwrap(),
            ReadinessState::Unavailable(_)
        ));
    }

    #[test]
    fn cancellation_stops_polling_without_a_final_emission() {
        let (stop_tx, stop_rx) = bounded(1);
        let (state_tx, state_rx) = bounded(1);
        stop_tx.send(()).unwrap();
        let config = ProbeConfig {
            poll_interval: Duration::from_secs(60),
            ..fast_config()
        };

        run_probe_loop(
            || Ok(health("initializing", false)),
            config,
            &stop_rx,
            &state_tx,
        );

        assert!(state_rx.try_recv().is_err());
    }
}

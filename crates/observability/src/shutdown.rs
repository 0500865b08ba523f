use std::fmt;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::config::Signal;
use crate::error::{ShutdownError, TelemetryError, TelemetryResult};

type ShutdownFn = Box<dyn FnOnce() -> TelemetryResult<()> + Send + 'static>;

struct ShutdownHook {
    signal: Signal,
    run: ShutdownFn,
}

/// Composed shutdown for every provider registered during setup.
///
/// `shutdown` consumes the handle, so each registered provider is shut down at
/// most once. An empty handle shuts down successfully.
#[derive(Default)]
pub struct ShutdownHandle {
    hooks: Vec<ShutdownHook>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, signal: Signal, shutdown: F)
    where
        F: FnOnce() -> TelemetryResult<()> + Send + 'static,
    {
        self.hooks.push(ShutdownHook {
            signal,
            run: Box::new(shutdown),
        });
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.hooks.iter().map(|hook| hook.signal).collect()
    }

    /// Shuts down every registered provider concurrently against one shared
    /// deadline and joins all failures. Only a provider that is still running
    /// at the deadline yields a timeout error.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + timeout;

        let running: Vec<_> = self
            .hooks
            .into_iter()
            .map(|hook| {
                debug!(signal = %hook.signal, "shutting down telemetry provider");
                (hook.signal, tokio::task::spawn_blocking(hook.run))
            })
            .collect();

        let mut failures = Vec::new();
        for (signal, task) in running {
            let outcome = match timeout_at(deadline, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TelemetryError::ShutdownAborted { signal }),
                Err(_) => Err(TelemetryError::ShutdownTimeout { signal, timeout }),
            };
            if let Err(err) = outcome {
                failures.push(err);
            }
        }

        match ShutdownError::from_failures(failures) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("signals", &self.signals())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_handle_is_a_noop() {
        let handle = ShutdownHandle::new();
        assert!(handle.is_empty());
        assert!(handle.shutdown(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn every_hook_runs_once_and_errors_are_joined() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handle = ShutdownHandle::new();

        let counter = Arc::clone(&calls);
        handle.register(Signal::Traces, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TelemetryError::ShutdownAborted {
                signal: Signal::Traces,
            })
        });
        let counter = Arc::clone(&calls);
        handle.register(Signal::Metrics, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let counter = Arc::clone(&calls);
        handle.register(Signal::Logs, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TelemetryError::ShutdownAborted {
                signal: Signal::Logs,
            })
        });

        let err = handle.shutdown(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let signals: Vec<_> = err.failures().iter().filter_map(|e| e.signal()).collect();
        assert_eq!(signals, vec![Signal::Traces, Signal::Logs]);
    }

    #[tokio::test]
    async fn only_the_slow_provider_times_out() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut handle = ShutdownHandle::new();

        handle.register(Signal::Traces, || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });
        for signal in [Signal::Metrics, Signal::Logs] {
            let counter = Arc::clone(&finished);
            handle.register(signal, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let err = handle
            .shutdown(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert!(err.failures()[0].is_timeout());
        assert_eq!(err.failures()[0].signal(), Some(Signal::Traces));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn providers_shut_down_concurrently() {
        let mut handle = ShutdownHandle::new();
        for signal in Signal::ALL {
            handle.register(signal, || {
                std::thread::sleep(Duration::from_millis(100));
                Ok(())
            });
        }

        // sequential shutdown would need 300ms
        assert!(handle.shutdown(Duration::from_millis(250)).await.is_ok());
    }

    #[tokio::test]
    async fn panicking_hook_is_reported() {
        let mut handle = ShutdownHandle::new();
        handle.register(Signal::Logs, || panic!("exporter exploded"));

        let err = handle.shutdown(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err.failures()[0],
            TelemetryError::ShutdownAborted {
                signal: Signal::Logs
            }
        ));
    }
}

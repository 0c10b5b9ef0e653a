//! Bridge runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use modbus_push_common::init_tracing;

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// How long spawned tasks get to finish after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Receiver side of the shutdown broadcast.
///
/// The value flips to `true` once the runner is stopping.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Bridge runner that manages the lifecycle of a bridge process.
///
/// Handles:
/// - Logging initialization
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C
///
/// # Example
///
/// ```ignore
/// use modbus_push_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let mut runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///
///     let shutdown = runner.shutdown_signal();
///     runner.spawn(async move {
///         // Worker logic here, stop when `shutdown` flips
///     });
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Shutdown broadcast.
    shutdown_tx: watch::Sender<bool>,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let runner = Self::without_logging(name, config);

        let level_override = args.and_then(|a| a.log_level.as_deref());
        let log_config = runner.config.logging().with_level_override(level_override);

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %runner.name, version = %runner.version, "Starting bridge");

        Ok(runner)
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn without_logging(name: impl Into<String>, config: C) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Subscribe to the shutdown broadcast.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a worker task.
    ///
    /// The task is told to stop through [`shutdown_signal`](Self::shutdown_signal)
    /// and aborted if it outlives the grace period.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run the bridge until Ctrl+C is received or every worker has exited.
    ///
    /// This will:
    /// 1. Wait for Ctrl+C (or for all tasks to finish on their own)
    /// 2. Broadcast the shutdown signal
    /// 3. Give tasks a grace period, then abort the stragglers
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the bridge until `stop` resolves or every worker has exited.
    pub async fn run_until<S>(mut self, stop: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let name = self.name.clone();
        let mut tasks = std::mem::take(&mut self.tasks);

        tracing::info!(
            bridge = %name,
            tasks = tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        let mut failed = 0;
        let mut joined = 0;

        {
            let all_done = async {
                for task in tasks.iter_mut() {
                    if let Err(e) = task.await {
                        tracing::warn!(error = %e, "Worker task ended abnormally");
                        failed += 1;
                    }
                    joined += 1;
                }
            };

            tokio::select! {
                _ = stop => {
                    tracing::info!(bridge = %name, "Received shutdown signal");
                }
                _ = all_done => {
                    tracing::info!(bridge = %name, "All workers exited");
                }
            }
        }

        // Receivers may already be gone if every worker finished.
        let _ = self.shutdown_tx.send(true);

        // Tasks already joined above must not be polled again.
        for mut task in tasks.into_iter().skip(joined) {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Worker task ended abnormally");
                    failed += 1;
                }
                Err(_) => {
                    tracing::warn!("Worker did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        tracing::info!(bridge = %name, "Goodbye!");

        if failed > 0 {
            return Err(BridgeError::worker(format!("{} worker(s) panicked", failed)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoggingConfig;
    use serde::Deserialize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    fn test_runner() -> BridgeRunner<TestConfig> {
        BridgeRunner::without_logging(
            "test",
            TestConfig {
                logging: LoggingConfig::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_shutdown_signal_reaches_workers() {
        let mut runner = test_runner();
        let stopped = Arc::new(AtomicBool::new(false));

        let mut shutdown = runner.shutdown_signal();
        let flag = stopped.clone();
        runner.spawn(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        runner.run_until(async {}).await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_run_returns_when_workers_finish() {
        let mut runner = test_runner();
        runner.spawn(async {});
        runner.spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        // The stop future never resolves; the runner exits because workers did.
        runner
            .run_until(std::future::pending::<()>())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_panicking_worker_is_reported() {
        let mut runner = test_runner();
        runner.spawn(async { panic!("worker exploded") });

        let result = runner.run_until(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(BridgeError::Worker(_))));
    }
}

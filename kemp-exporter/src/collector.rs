//! Periodic fetch loop feeding the metric registry.

use std::time::Duration;

use kemp_client::StatisticsSource;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{ExporterError, Result};
use crate::metrics::SharedRegistry;
use crate::shutdown_requested;

/// Fetches statistics and applies them to the registry, forever.
///
/// The wait is a delay measured from the end of one update to the start of the
/// next fetch, so a slow appliance stretches the effective sampling period.
/// The fetch itself is never timed out: a hung appliance stalls the loop until
/// shutdown is requested.
pub struct CollectorLoop<S> {
    source: S,
    registry: SharedRegistry,
    wait: Duration,
}

impl<S: StatisticsSource> CollectorLoop<S> {
    pub fn new(source: S, registry: SharedRegistry, wait: Duration) -> Self {
        Self {
            source,
            registry,
            wait,
        }
    }

    /// Run until a fetch fails or shutdown is requested.
    ///
    /// A fetch error is returned as-is; the caller is expected to stop the
    /// process. A fetch still in flight at shutdown is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(wait_secs = self.wait.as_secs(), "Starting collector");

        loop {
            tokio::select! {
                res = self.run_cycle() => res?,
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Collector stopped during fetch");
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.wait) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Collector stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Fetch one snapshot and apply it.
    pub async fn run_cycle(&self) -> Result<()> {
        let started = Instant::now();

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Error getting statistics");
                return Err(ExporterError::Fetch(e));
            }
        };
        let elapsed = started.elapsed();

        self.registry.apply(&snapshot);
        self.registry.record_fetch(elapsed);

        debug!(
            virtual_servers = snapshot.virtual_servers.len(),
            real_servers = snapshot.real_servers.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Applied statistics snapshot"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;
    use kemp_client::{ClientError, ServerCounters, Snapshot, Totals, VirtualServerStat};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Source replaying a script of results and recording what it saw.
    struct ScriptedSource {
        script: Mutex<VecDeque<kemp_client::Result<Snapshot>>>,
        registry: SharedRegistry,
        fetch_delay: Duration,
        calls: Arc<Mutex<Vec<(Instant, String)>>>,
    }

    impl StatisticsSource for ScriptedSource {
        async fn fetch(&self) -> kemp_client::Result<Snapshot> {
            let rendered = self.registry.render().unwrap();
            self.calls.lock().unwrap().push((Instant::now(), rendered));

            tokio::time::sleep(self.fetch_delay).await;

            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Api("script exhausted".to_string())))
        }
    }

    fn snapshot(total_connections: u64) -> Snapshot {
        Snapshot {
            totals: Totals {
                connections_per_sec: total_connections,
                bytes_per_sec: 0,
                packets_per_sec: 0,
            },
            virtual_servers: vec![VirtualServerStat::new(
                "10.0.0.1",
                80,
                ServerCounters {
                    total_connections,
                    ..Default::default()
                },
            )],
            real_servers: Vec::new(),
        }
    }

    fn scripted(
        script: Vec<kemp_client::Result<Snapshot>>,
        fetch_delay: Duration,
    ) -> (
        ScriptedSource,
        SharedRegistry,
        Arc<Mutex<Vec<(Instant, String)>>>,
    ) {
        let registry = Arc::new(MetricRegistry::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = ScriptedSource {
            script: Mutex::new(script.into()),
            registry: registry.clone(),
            fetch_delay,
            calls: calls.clone(),
        };
        (source, registry, calls)
    }

    fn vs_total(output: &str) -> Option<f64> {
        let prefix = r#"kemp_virtual_server_total_connections{address="10.0.0.1",port="80"} "#;
        output
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .and_then(|v| v.parse().ok())
    }

    #[tokio::test]
    async fn test_run_cycle_applies_snapshot() {
        let (source, registry, _) = scripted(vec![Ok(snapshot(100))], Duration::ZERO);
        let collector = CollectorLoop::new(source, registry.clone(), Duration::from_secs(10));

        collector.run_cycle().await.unwrap();

        assert_eq!(registry.fetch_count(), 1);
        assert_eq!(vs_total(&registry.render().unwrap()), Some(100.0));
    }

    #[tokio::test]
    async fn test_run_cycle_error_leaves_registry_untouched() {
        let (source, registry, _) = scripted(
            vec![Ok(snapshot(100)), Err(ClientError::Api("boom".into()))],
            Duration::ZERO,
        );
        let collector = CollectorLoop::new(source, registry.clone(), Duration::from_secs(10));

        collector.run_cycle().await.unwrap();
        let before = registry.render().unwrap();

        let err = collector.run_cycle().await.unwrap_err();
        assert!(matches!(err, ExporterError::Fetch(ClientError::Api(_))));
        assert_eq!(registry.render().unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_on_third_cycle() {
        let (source, registry, calls) = scripted(
            vec![
                Ok(snapshot(100)),
                Ok(snapshot(150)),
                Err(ClientError::Api("appliance unreachable".into())),
                Ok(snapshot(999)),
            ],
            Duration::ZERO,
        );
        let (_tx, rx) = watch::channel(false);
        let collector = CollectorLoop::new(source, registry.clone(), Duration::from_secs(10));

        let result = collector.run(rx).await;

        assert!(matches!(result, Err(ExporterError::Fetch(_))));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3, "no fetch after the failure");
        assert_eq!(vs_total(&calls[0].1), None);
        assert_eq!(vs_total(&calls[1].1), Some(100.0));
        assert_eq!(vs_total(&calls[2].1), Some(150.0));

        assert_eq!(registry.fetch_count(), 2);
        assert_eq!(vs_total(&registry.render().unwrap()), Some(150.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_starts_after_update() {
        let (source, registry, calls) = scripted(
            vec![Ok(snapshot(1)), Ok(snapshot(2))],
            Duration::from_secs(3),
        );
        let (_tx, rx) = watch::channel(false);
        let collector = CollectorLoop::new(source, registry, Duration::from_secs(10));

        // Script runs out on the third fetch, which ends the loop.
        let result = collector.run(rx).await;
        assert!(result.is_err());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);

        let period = calls[1].0 - calls[0].0;
        assert!(period >= Duration::from_secs(13), "period was {:?}", period);
        assert!(period < Duration::from_secs(14), "period was {:?}", period);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_wait() {
        let script = (0..100).map(|i| Ok(snapshot(i))).collect();
        let (source, registry, calls) = scripted(script, Duration::ZERO);
        let (tx, rx) = watch::channel(false);
        let collector = CollectorLoop::new(source, registry, Duration::from_secs(10));

        let handle = tokio::spawn(collector.run(rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_fetch() {
        let (source, registry, calls) = scripted(vec![Ok(snapshot(1))], Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);
        let collector = CollectorLoop::new(source, registry.clone(), Duration::from_secs(10));

        let handle = tokio::spawn(collector.run(rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(registry.fetch_count(), 0);
    }
}

//! Supervision of the collector and HTTP server tasks.

use std::future::Future;
use std::time::Duration;

use kemp_client::StatisticsSource;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::collector::CollectorLoop;
use crate::error::{ExporterError, Result};
use crate::http::HttpServer;
use crate::metrics::SharedRegistry;

/// How long tasks get to finish after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type JoinResult = std::result::Result<Result<()>, tokio::task::JoinError>;

/// Which task ended first.
enum Exit {
    Collector(JoinResult),
    Http(JoinResult),
    Stop,
}

/// The assembled exporter: one collector loop plus one HTTP server sharing a
/// registry.
pub struct Exporter<S> {
    source: S,
    registry: SharedRegistry,
    http: HttpServer,
    wait: Duration,
}

impl<S: StatisticsSource + 'static> Exporter<S> {
    pub fn new(source: S, registry: SharedRegistry, http: HttpServer, wait: Duration) -> Self {
        Self {
            source,
            registry,
            http,
            wait,
        }
    }

    /// Run until `stop` resolves or either task ends.
    ///
    /// A fetch error shuts the HTTP server down and is returned, so the
    /// process exits without serving further scrapes.
    pub async fn run<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let collector = CollectorLoop::new(self.source, self.registry, self.wait);
        let mut collector_task = tokio::spawn(collector.run(shutdown_rx.clone()));
        let mut http_task = tokio::spawn(self.http.run(shutdown_rx));

        let exit = tokio::select! {
            res = &mut collector_task => Exit::Collector(res),
            res = &mut http_task => Exit::Http(res),
            _ = stop => Exit::Stop,
        };

        if shutdown_tx.send(true).is_err() {
            warn!("All tasks already stopped before shutdown was signalled");
        }

        let collector_done = matches!(exit, Exit::Collector(_));
        let http_done = matches!(exit, Exit::Http(_));

        let drain = async {
            let mut errors = Vec::new();
            if !collector_done {
                errors.extend(drained_error("collector", (&mut collector_task).await));
            }
            if !http_done {
                errors.extend(drained_error("http", (&mut http_task).await));
            }
            errors
        };

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, drain).await;
        let drained = match drained {
            Ok(errors) => errors,
            Err(_) => {
                warn!("Tasks did not stop in time, aborting");
                collector_task.abort();
                http_task.abort();
                Vec::new()
            }
        };

        let primary = match exit {
            Exit::Collector(Ok(result)) => result,
            Exit::Http(Ok(Ok(()))) => {
                error!("HTTP server stopped unexpectedly");
                Err(ExporterError::Task("HTTP server stopped".to_string()))
            }
            Exit::Http(Ok(Err(e))) => Err(e),
            Exit::Collector(Err(e)) | Exit::Http(Err(e)) => Err(ExporterError::Task(e.to_string())),
            Exit::Stop => {
                info!("Shutdown requested");
                Ok(())
            }
        };

        settle(primary, drained)
    }
}

/// The error a task reported while being drained, if any.
fn drained_error(task: &str, result: JoinResult) -> Option<ExporterError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!(task, error = %e, "Task failed during shutdown");
            Some(e)
        }
        Err(e) => {
            error!(task, error = %e, "Task panicked during shutdown");
            Some(ExporterError::Task(e.to_string()))
        }
    }
}

/// Keep the first task's outcome; a clean exit still fails if a drained task
/// reported an error.
fn settle(primary: Result<()>, drained: Vec<ExporterError>) -> Result<()> {
    match (primary, drained.into_iter().next()) {
        (Ok(()), Some(e)) => Err(e),
        (primary, _) => primary,
    }
}

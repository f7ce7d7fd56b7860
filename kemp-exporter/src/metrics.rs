//! Metric registry holding the exported gauges.
//!
//! Every series stores its value in an atomic, so a scrape running while a
//! snapshot is applied sees either the old or the new value of each series,
//! never a mix. Label sets are created on first sight and never removed:
//! a server that disappears from the appliance keeps reporting its last value
//! until the process restarts.

use std::fmt::{self, Write};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use kemp_client::{ServerStat, Snapshot};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Gauge holding an `f64`, stored as raw bits in an `AtomicU64`.
pub type FloatGauge = Gauge<f64, AtomicU64>;

/// Label value whose backslashes, double quotes and newlines are escaped on
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EscapedLabel(String);

impl EscapedLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EscapedLabel {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl EncodeLabelValue for EscapedLabel {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), fmt::Error> {
        for c in self.0.chars() {
            match c {
                '\\' => encoder.write_str("\\\\")?,
                '"' => encoder.write_str("\\\"")?,
                '\n' => encoder.write_str("\\n")?,
                c => encoder.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Label set identifying a virtual or real server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct ServerLabels {
    pub address: EscapedLabel,
    pub port: String,
}

impl ServerLabels {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.into(),
            port: port.to_string(),
        }
    }
}

/// Unlabeled appliance-wide gauges.
#[derive(Debug, Default)]
struct TotalsGauges {
    connections_per_sec: FloatGauge,
    bytes_per_sec: FloatGauge,
    packets_per_sec: FloatGauge,
}

impl TotalsGauges {
    fn register(registry: &mut Registry) -> Self {
        let gauges = Self::default();

        registry.register(
            "connections_per_second",
            "The number of connections per second",
            gauges.connections_per_sec.clone(),
        );
        registry.register(
            "bytes_per_second",
            "The number of bytes per second",
            gauges.bytes_per_sec.clone(),
        );
        registry.register(
            "packets_per_second",
            "The number of packets per second",
            gauges.packets_per_sec.clone(),
        );

        gauges
    }
}

/// The seven per-server gauge families for one kind of server.
#[derive(Debug, Default)]
struct ServerGauges {
    total_connections: Family<ServerLabels, FloatGauge>,
    total_packets: Family<ServerLabels, FloatGauge>,
    total_bytes: Family<ServerLabels, FloatGauge>,
    active_connections: Family<ServerLabels, FloatGauge>,
    connections_per_sec: Family<ServerLabels, FloatGauge>,
    bytes_read: Family<ServerLabels, FloatGauge>,
    bytes_written: Family<ServerLabels, FloatGauge>,
}

impl ServerGauges {
    /// Register the families; `kind` reads e.g. "virtual server".
    fn register(registry: &mut Registry, kind: &str) -> Self {
        let gauges = Self::default();

        registry.register(
            "total_connections",
            format!("The number of total connections per {}", kind),
            gauges.total_connections.clone(),
        );
        registry.register(
            "total_packets",
            format!("The number of total packets per {}", kind),
            gauges.total_packets.clone(),
        );
        registry.register(
            "total_bytes",
            format!("The number of total bytes per {}", kind),
            gauges.total_bytes.clone(),
        );
        registry.register(
            "active_connections",
            format!("The number of active connections per {}", kind),
            gauges.active_connections.clone(),
        );
        registry.register(
            "connections_per_second",
            format!("The number of connections per second per {}", kind),
            gauges.connections_per_sec.clone(),
        );
        registry.register(
            "bytes_read",
            format!("The number of bytes read per {}", kind),
            gauges.bytes_read.clone(),
        );
        registry.register(
            "bytes_written",
            format!("The number of bytes written per {}", kind),
            gauges.bytes_written.clone(),
        );

        gauges
    }

    fn set<S: ServerStat>(&self, server: &S) {
        let labels = ServerLabels::new(server.address(), server.port());
        let counters = server.counters();

        self.total_connections
            .get_or_create(&labels)
            .set(counters.total_connections as f64);
        self.total_packets
            .get_or_create(&labels)
            .set(counters.total_packets as f64);
        self.total_bytes
            .get_or_create(&labels)
            .set(counters.total_bytes as f64);
        self.active_connections
            .get_or_create(&labels)
            .set(counters.active_connections as f64);
        self.connections_per_sec
            .get_or_create(&labels)
            .set(counters.connections_per_sec as f64);
        self.bytes_read
            .get_or_create(&labels)
            .set(counters.bytes_read as f64);
        self.bytes_written
            .get_or_create(&labels)
            .set(counters.bytes_written as f64);
    }
}

/// Bookkeeping about the collector itself.
#[derive(Debug, Default)]
struct ExporterGauges {
    fetches: Counter,
    last_fetch_duration: FloatGauge,
    last_success_timestamp: Gauge,
}

impl ExporterGauges {
    fn register(registry: &mut Registry) -> Self {
        let gauges = Self::default();

        registry.register(
            "fetches",
            "The number of successful statistics fetches",
            gauges.fetches.clone(),
        );
        registry.register(
            "last_fetch_duration_seconds",
            "Duration of the last successful statistics fetch",
            gauges.last_fetch_duration.clone(),
        );
        registry.register(
            "last_success_timestamp_seconds",
            "Unix time of the last successful statistics fetch",
            gauges.last_success_timestamp.clone(),
        );

        gauges
    }
}

/// Thread-safe registry of everything the exporter publishes.
pub struct MetricRegistry {
    registry: Registry,
    totals: TotalsGauges,
    virtual_servers: ServerGauges,
    real_servers: ServerGauges,
    exporter: ExporterGauges,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    /// Create an empty registry whose metric names start with `prefix`.
    pub fn new(prefix: &str) -> Self {
        let mut registry = Registry::with_prefix(prefix);

        let totals = TotalsGauges::register(registry.sub_registry_with_prefix("totals"));
        let virtual_servers = ServerGauges::register(
            registry.sub_registry_with_prefix("virtual_server"),
            "virtual server",
        );
        let real_servers = ServerGauges::register(
            registry.sub_registry_with_prefix("real_server"),
            "real server",
        );
        let exporter = ExporterGauges::register(registry.sub_registry_with_prefix("exporter"));

        Self {
            registry,
            totals,
            virtual_servers,
            real_servers,
            exporter,
        }
    }

    /// Write every value of `snapshot` into the gauges.
    ///
    /// Values overwrite whatever was there; nothing is accumulated.
    pub fn apply(&self, snapshot: &Snapshot) {
        let totals = &snapshot.totals;
        self.totals
            .connections_per_sec
            .set(totals.connections_per_sec as f64);
        self.totals.bytes_per_sec.set(totals.bytes_per_sec as f64);
        self.totals
            .packets_per_sec
            .set(totals.packets_per_sec as f64);

        for vs in &snapshot.virtual_servers {
            self.virtual_servers.set(vs);
        }

        for rs in &snapshot.real_servers {
            self.real_servers.set(rs);
        }
    }

    /// Record a completed fetch.
    pub fn record_fetch(&self, duration: Duration) {
        self.exporter.fetches.inc();
        self.exporter
            .last_fetch_duration
            .set(duration.as_secs_f64());
        self.exporter
            .last_success_timestamp
            .set(chrono::Utc::now().timestamp());
    }

    /// Number of successful fetches recorded so far.
    pub fn fetch_count(&self) -> u64 {
        self.exporter.fetches.get()
    }

    /// Render the registry in the text exposition format.
    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut output = String::new();
        encode(&mut output, &self.registry)?;
        Ok(output)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new("kemp")
    }
}

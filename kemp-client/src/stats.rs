//! Statistics snapshot returned by a LoadMaster.
//!
//! Field names on the wire follow the appliance's statistics document
//! (`Totals`, `VS`, `Rs`), so the same types deserialize the API response
//! and serialize a fixture for tests.

use serde::{Deserialize, Serialize};

/// One fetched statistics payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Global throughput figures.
    #[serde(rename = "Totals", default)]
    pub totals: Totals,

    /// Virtual servers, in the order reported by the appliance.
    #[serde(rename = "VS", default)]
    pub virtual_servers: Vec<VirtualServerStat>,

    /// Real servers, in the order reported by the appliance.
    #[serde(rename = "Rs", default)]
    pub real_servers: Vec<RealServerStat>,
}

/// Appliance-wide rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "ConnsPerSec", default)]
    pub connections_per_sec: u64,

    #[serde(rename = "BytesPerSec", default)]
    pub bytes_per_sec: u64,

    #[serde(rename = "PktsPerSec", default)]
    pub packets_per_sec: u64,
}

/// Traffic counters shared by virtual and real servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCounters {
    #[serde(rename = "TotalConns", default)]
    pub total_connections: u64,

    #[serde(rename = "TotalPkts", default)]
    pub total_packets: u64,

    #[serde(rename = "TotalBytes", default)]
    pub total_bytes: u64,

    #[serde(rename = "ActiveConns", default)]
    pub active_connections: u64,

    #[serde(rename = "ConnsPerSec", default)]
    pub connections_per_sec: u64,

    #[serde(rename = "BytesRead", default)]
    pub bytes_read: u64,

    #[serde(rename = "BytesWritten", default)]
    pub bytes_written: u64,
}

/// Statistics for one virtual service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualServerStat {
    #[serde(rename = "VSAddress")]
    pub address: String,

    #[serde(rename = "VSPort")]
    pub port: u16,

    #[serde(flatten)]
    pub counters: ServerCounters,
}

/// Statistics for one real (backend) server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealServerStat {
    #[serde(rename = "Addr")]
    pub address: String,

    #[serde(rename = "Port")]
    pub port: u16,

    #[serde(flatten)]
    pub counters: ServerCounters,
}

impl VirtualServerStat {
    pub fn new(address: impl Into<String>, port: u16, counters: ServerCounters) -> Self {
        Self {
            address: address.into(),
            port,
            counters,
        }
    }
}

impl RealServerStat {
    pub fn new(address: impl Into<String>, port: u16, counters: ServerCounters) -> Self {
        Self {
            address: address.into(),
            port,
            counters,
        }
    }
}

/// Common view over virtual and real server records.
pub trait ServerStat {
    fn address(&self) -> &str;
    fn port(&self) -> u16;
    fn counters(&self) -> &ServerCounters;
}

impl ServerStat for VirtualServerStat {
    fn address(&self) -> &str {
        &self.address
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn counters(&self) -> &ServerCounters {
        &self.counters
    }
}

impl ServerStat for RealServerStat {
    fn address(&self) -> &str {
        &self.address
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn counters(&self) -> &ServerCounters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_snapshot() {
        let json = r#"{
            "Totals": { "ConnsPerSec": 5, "BytesPerSec": 1000, "PktsPerSec": 50 },
            "VS": [
                {
                    "VSAddress": "10.0.0.1",
                    "VSPort": 80,
                    "TotalConns": 100,
                    "TotalPkts": 2000,
                    "TotalBytes": 300000,
                    "ActiveConns": 4,
                    "ConnsPerSec": 2,
                    "BytesRead": 120000,
                    "BytesWritten": 180000
                }
            ],
            "Rs": [
                { "Addr": "192.168.1.10", "Port": 8080, "TotalConns": 60, "ActiveConns": 1 }
            ]
        }"#;

        let snapshot: Snapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.totals.connections_per_sec, 5);
        assert_eq!(snapshot.totals.bytes_per_sec, 1000);
        assert_eq!(snapshot.totals.packets_per_sec, 50);

        let vs = &snapshot.virtual_servers[0];
        assert_eq!(vs.address, "10.0.0.1");
        assert_eq!(vs.port, 80);
        assert_eq!(vs.counters.total_connections, 100);
        assert_eq!(vs.counters.bytes_written, 180000);

        let rs = &snapshot.real_servers[0];
        assert_eq!(rs.address(), "192.168.1.10");
        assert_eq!(rs.port(), 8080);
        assert_eq!(rs.counters().total_connections, 60);
        assert_eq!(rs.counters().total_bytes, 0);
    }

    #[test]
    fn test_parse_empty_document() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn test_missing_address_is_error() {
        let json = r#"{ "VS": [ { "VSPort": 80, "TotalConns": 1 } ] }"#;
        assert!(serde_json::from_str::<Snapshot>(json).is_err());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let snapshot = Snapshot {
            totals: Totals::default(),
            virtual_servers: vec![VirtualServerStat::new(
                "10.0.0.1",
                443,
                ServerCounters::default(),
            )],
            real_servers: vec![RealServerStat::new(
                "10.0.1.1",
                8443,
                ServerCounters::default(),
            )],
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["VS"][0]["VSAddress"], "10.0.0.1");
        assert_eq!(value["VS"][0]["TotalConns"], 0);
        assert_eq!(value["Rs"][0]["Addr"], "10.0.1.1");
        assert_eq!(value["Totals"]["PktsPerSec"], 0);
    }
}

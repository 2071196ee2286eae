//! Uniform probe contract (§4.2) and the two stateless drivers. Both
//! drivers are pure w.r.t. engine state: they take target parameters and
//! return a `ProbeResult`, with no hidden retries beyond what's named
//! below.

pub mod icmp;
pub mod snmp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Icmp,
    Snmp,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Icmp => "icmp",
            ProbeKind::Snmp => "snmp",
        }
    }
}

/// A single per-packet ICMP outcome, preserved for forensic logging
/// (§4.2, `extra.responses`; supplemented detail from `ping_monitor.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub seq: u32,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProbeExtra {
    pub packet_loss: Option<f64>,
    pub responses: Vec<PingResponse>,
    pub uptime_ticks: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub latency_ms: Option<f64>,
    pub protocol: ProbeKind,
    pub extra: ProbeExtra,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timeout probing {target}")]
    Timeout { target: Ipv4Addr },
    #[error("protocol error probing {target}: {message}")]
    Protocol { target: Ipv4Addr, message: String },
}

/// Parameters common to a single probe invocation.
#[derive(Debug, Clone)]
pub struct IcmpParams {
    pub target: Ipv4Addr,
    pub count: u32,
    pub per_packet_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SnmpParams {
    pub target: Ipv4Addr,
    pub port: u16,
    pub community: String,
    pub timeout: Duration,
}

#[async_trait]
pub trait IcmpProbeDriver: Send + Sync {
    async fn probe(&self, params: &IcmpParams) -> ProbeResult;
}

#[async_trait]
pub trait SnmpProbeDriver: Send + Sync {
    async fn probe(&self, params: &SnmpParams) -> ProbeResult;

    /// A single scalar SNMP GET used by the metric collector sub-loop
    /// (§4.7's "SNMP metric collector"), distinct from the reachability
    /// `sysUpTime` probe above.
    async fn get_scalar(
        &self,
        target: Ipv4Addr,
        port: u16,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> Result<String, ProbeError>;
}

/// Scripted ICMP driver for tests: always returns the configured outcome
/// regardless of target.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeIcmpDriver {
    pub success: bool,
    pub latency_ms: Option<f64>,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl IcmpProbeDriver for FakeIcmpDriver {
    async fn probe(&self, _params: &IcmpParams) -> ProbeResult {
        ProbeResult {
            success: self.success,
            latency_ms: self.latency_ms,
            protocol: ProbeKind::Icmp,
            extra: ProbeExtra {
                packet_loss: Some(if self.success { 0.0 } else { 100.0 }),
                responses: Vec::new(),
                uptime_ticks: None,
            },
            error: if self.success { None } else { Some("fake failure".to_string()) },
        }
    }
}

/// Scripted SNMP driver for tests: `get_scalar` always returns `value`.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeSnmpDriver {
    pub success: bool,
    pub value: String,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl SnmpProbeDriver for FakeSnmpDriver {
    async fn probe(&self, _params: &SnmpParams) -> ProbeResult {
        ProbeResult {
            success: self.success,
            latency_ms: Some(1.0),
            protocol: ProbeKind::Snmp,
            extra: ProbeExtra::default(),
            error: if self.success { None } else { Some("fake failure".to_string()) },
        }
    }

    async fn get_scalar(
        &self,
        _target: Ipv4Addr,
        _port: u16,
        _community: &str,
        _oid: &str,
        _timeout: Duration,
    ) -> Result<String, ProbeError> {
        Ok(self.value.clone())
    }
}

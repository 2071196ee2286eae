//! SNMP v2c driver (§4.2): a single `GET` of `sysUpTime.0`, zero retries,
//! caller-supplied timeout, mirrors `snmp_monitor.py`'s use of
//! `pysnmp.hlapi.asyncio` (`CommunityData(community, mpModel=1)`,
//! `UdpTransportTarget(..., retries=0)`). `csnmp` is this codebase's
//! equivalent async v2c client.

use super::{ProbeError, ProbeExtra, ProbeKind, ProbeResult, SnmpParams, SnmpProbeDriver};
use async_trait::async_trait;
use csnmp::{ObjectIdentifier, Snmp2cClient};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};

/// `1.3.6.1.2.1.1.3.0`, `sysUpTime.0`.
const SYS_UPTIME_OID: &str = "1.3.6.1.2.1.1.3.0";

pub struct RealSnmpDriver;

impl RealSnmpDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealSnmpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnmpProbeDriver for RealSnmpDriver {
    async fn probe(&self, params: &SnmpParams) -> ProbeResult {
        let start = Instant::now();
        let addr = SocketAddr::from((params.target, params.port));

        let client = match Snmp2cClient::new(
            addr,
            params.community.as_bytes().to_vec(),
            None,
            0,
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                return ProbeResult {
                    success: false,
                    latency_ms: None,
                    protocol: ProbeKind::Snmp,
                    extra: ProbeExtra::default(),
                    error: Some(format!("snmp session error: {e}")),
                }
            }
        };

        let oid = match ObjectIdentifier::from_str(SYS_UPTIME_OID) {
            Ok(oid) => oid,
            Err(e) => {
                return ProbeResult {
                    success: false,
                    latency_ms: None,
                    protocol: ProbeKind::Snmp,
                    extra: ProbeExtra::default(),
                    error: Some(format!("bad OID: {e}")),
                }
            }
        };

        match tokio::time::timeout(params.timeout, client.get(oid)).await {
            Ok(Ok(value)) => {
                let uptime_ticks = value.as_u32().map(u64::from);
                ProbeResult {
                    success: uptime_ticks.is_some(),
                    latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
                    protocol: ProbeKind::Snmp,
                    extra: ProbeExtra {
                        uptime_ticks,
                        ..Default::default()
                    },
                    error: if uptime_ticks.is_some() {
                        None
                    } else {
                        Some("sysUpTime did not decode as an integer".to_string())
                    },
                }
            }
            Ok(Err(e)) => ProbeResult {
                success: false,
                latency_ms: None,
                protocol: ProbeKind::Snmp,
                extra: ProbeExtra::default(),
                error: Some(format!("snmp get failed: {e}")),
            },
            Err(_) => ProbeResult {
                success: false,
                latency_ms: None,
                protocol: ProbeKind::Snmp,
                extra: ProbeExtra::default(),
                error: Some("snmp get timed out".to_string()),
            },
        }
    }

    async fn get_scalar(
        &self,
        target: Ipv4Addr,
        port: u16,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        let addr = SocketAddr::from((target, port));
        let client = Snmp2cClient::new(addr, community.as_bytes().to_vec(), None, 0)
            .await
            .map_err(|e| ProbeError::Protocol {
                target,
                message: e.to_string(),
            })?;

        let object_id = ObjectIdentifier::from_str(oid).map_err(|e| ProbeError::Protocol {
            target,
            message: format!("bad OID {oid}: {e}"),
        })?;

        match tokio::time::timeout(timeout, client.get(object_id)).await {
            Ok(Ok(value)) => Ok(value.to_string()),
            Ok(Err(e)) => Err(ProbeError::Protocol {
                target,
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout { target }),
        }
    }
}

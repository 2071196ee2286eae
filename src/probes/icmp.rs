//! ICMP echo driver (§4.2). Raw-socket send/receive runs on a blocking
//! thread (`spawn_blocking`) so the engine's concurrency-limiter slot
//! accounting stays accurate while the packet loop blocks on the socket,
//! the same isolation pattern the pack's raw-socket ICMP listener uses for
//! its own blocking `next_with_timeout` loop.

use super::{IcmpParams, IcmpProbeDriver, PingResponse, ProbeExtra, ProbeKind, ProbeResult};
use async_trait::async_trait;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::Packet;
use pnet::transport::{icmp_packet_iter, transport_channel, TransportChannelType, TransportProtocol};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

const ECHO_PAYLOAD: &[u8] = b"netsentry";
const INTER_PACKET_PACING: Duration = Duration::from_millis(500);

pub struct RealIcmpDriver;

impl RealIcmpDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealIcmpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IcmpProbeDriver for RealIcmpDriver {
    async fn probe(&self, params: &IcmpParams) -> ProbeResult {
        let params = params.clone();
        let result = tokio::task::spawn_blocking(move || send_echo_sequence(&params)).await;

        match result {
            Ok(extra) => build_result(extra),
            Err(join_err) => ProbeResult {
                success: false,
                latency_ms: None,
                protocol: ProbeKind::Icmp,
                extra: ProbeExtra::default(),
                error: Some(format!("icmp worker panicked: {join_err}")),
            },
        }
    }
}

fn build_result(extra: ProbeExtra) -> ProbeResult {
    let successes: Vec<f64> = extra
        .responses
        .iter()
        .filter_map(|r| r.latency_ms)
        .collect();
    let packet_loss = extra.packet_loss.unwrap_or(100.0);
    let success = packet_loss < 100.0;
    let latency_ms = if successes.is_empty() {
        None
    } else {
        Some(successes.iter().sum::<f64>() / successes.len() as f64)
    };
    ProbeResult {
        success,
        latency_ms,
        protocol: ProbeKind::Icmp,
        error: if success { None } else { Some("no echo reply received".to_string()) },
        extra,
    }
}

fn send_echo_sequence(params: &IcmpParams) -> ProbeExtra {
    let protocol = TransportChannelType::Layer4(TransportProtocol::Ipv4(
        pnet::packet::ip::IpNextHeaderProtocols::Icmp,
    ));

    let (mut tx, mut rx) = match transport_channel(4096, protocol) {
        Ok(channels) => channels,
        Err(e) => {
            let responses = (0..params.count)
                .map(|seq| PingResponse {
                    seq,
                    latency_ms: None,
                    error: Some(format!("socket error: {e}")),
                })
                .collect();
            return ProbeExtra {
                packet_loss: Some(100.0),
                responses,
                uptime_ticks: None,
            };
        }
    };

    let mut responses = Vec::with_capacity(params.count as usize);
    let mut success_count = 0u32;

    for seq in 0..params.count {
        if seq > 0 {
            std::thread::sleep(INTER_PACKET_PACING);
        }

        let response = send_single_echo(&mut tx, &mut rx, params.target, seq, params.per_packet_timeout);
        if response.latency_ms.is_some() {
            success_count += 1;
        }
        responses.push(response);
    }

    let packet_loss = if params.count == 0 {
        100.0
    } else {
        ((params.count - success_count) as f64 / params.count as f64) * 100.0
    };

    ProbeExtra {
        packet_loss: Some(packet_loss),
        responses,
        uptime_ticks: None,
    }
}

fn send_single_echo(
    tx: &mut pnet::transport::TransportSender,
    rx: &mut pnet::transport::TransportReceiver,
    target: Ipv4Addr,
    seq: u32,
    timeout: Duration,
) -> PingResponse {
    let mut buffer = [0u8; 64];
    let mut echo_packet = match MutableEchoRequestPacket::new(&mut buffer) {
        Some(p) => p,
        None => {
            return PingResponse {
                seq,
                latency_ms: None,
                error: Some("failed to build echo request".to_string()),
            }
        }
    };
    echo_packet.set_icmp_type(IcmpTypes::EchoRequest);
    echo_packet.set_identifier(std::process::id() as u16);
    echo_packet.set_sequence_number(seq as u16);
    echo_packet.set_payload(ECHO_PAYLOAD);
    let checksum = pnet::util::checksum(echo_packet.packet(), 1);
    echo_packet.set_checksum(checksum);

    let send_time = Instant::now();
    if let Err(e) = tx.send_to(echo_packet, IpAddr::V4(target)) {
        return PingResponse {
            seq,
            latency_ms: None,
            error: Some(format!("send failed: {e}")),
        };
    }

    let mut iter = icmp_packet_iter(rx);
    loop {
        if send_time.elapsed() >= timeout {
            return PingResponse {
                seq,
                latency_ms: None,
                error: Some("timeout".to_string()),
            };
        }
        let remaining = timeout.saturating_sub(send_time.elapsed());
        match iter.next_with_timeout(remaining.min(Duration::from_millis(200))) {
            Ok(Some((packet, addr))) => {
                if addr != IpAddr::V4(target) {
                    continue;
                }
                if let Some(icmp) = IcmpPacket::new(packet.packet()) {
                    if icmp.get_icmp_type() == IcmpTypes::EchoReply {
                        if let Some(reply) = EchoReplyPacket::new(packet.packet()) {
                            if reply.get_sequence_number() as u32 != seq {
                                continue;
                            }
                        }
                        return PingResponse {
                            seq,
                            latency_ms: Some(send_time.elapsed().as_secs_f64() * 1000.0),
                            error: None,
                        };
                    }
                }
            }
            Ok(None) => continue,
            Err(e) => {
                return PingResponse {
                    seq,
                    latency_ms: None,
                    error: Some(format!("recv error: {e}")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_loss_of_zero_is_success() {
        let extra = ProbeExtra {
            packet_loss: Some(0.0),
            responses: vec![PingResponse {
                seq: 0,
                latency_ms: Some(1.2),
                error: None,
            }],
            uptime_ticks: None,
        };
        let result = build_result(extra);
        assert!(result.success);
        assert_eq!(result.latency_ms, Some(1.2));
    }

    #[test]
    fn packet_loss_of_hundred_is_failure() {
        let extra = ProbeExtra {
            packet_loss: Some(100.0),
            responses: vec![PingResponse {
                seq: 0,
                latency_ms: None,
                error: Some("timeout".to_string()),
            }],
            uptime_ticks: None,
        };
        let result = build_result(extra);
        assert!(!result.success);
        assert!(result.latency_ms.is_none());
    }

    #[test]
    fn latency_averages_only_successful_packets() {
        let extra = ProbeExtra {
            packet_loss: Some(50.0),
            responses: vec![
                PingResponse { seq: 0, latency_ms: Some(10.0), error: None },
                PingResponse { seq: 1, latency_ms: None, error: Some("timeout".into()) },
            ],
            uptime_ticks: None,
        };
        let result = build_result(extra);
        assert!(result.success);
        assert_eq!(result.latency_ms, Some(10.0));
    }
}

//! Typed API frames exchanged with a ZigBee radio.

use crate::utils::error::{Result, SensorNetError};

pub const AT_COMMAND: u8 = 0x08;
pub const TX_REQUEST: u8 = 0x10;
pub const AT_RESPONSE: u8 = 0x88;
pub const MODEM_STATUS: u8 = 0x8A;
pub const TX_STATUS: u8 = 0x8B;
pub const RX_PACKET: u8 = 0x90;

/// 16-bit address used when the destination's network address is unknown.
pub const UNKNOWN_ADDR16: [u8; 2] = [0xFF, 0xFE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFrame {
    AtCommand {
        frame_id: u8,
        command: [u8; 2],
        parameter: Vec<u8>,
    },
    AtResponse {
        frame_id: u8,
        command: [u8; 2],
        status: u8,
        data: Vec<u8>,
    },
    TransmitRequest {
        frame_id: u8,
        dest_addr_long: [u8; 8],
        dest_addr: [u8; 2],
        broadcast_radius: u8,
        options: u8,
        rf_data: Vec<u8>,
    },
    TransmitStatus {
        frame_id: u8,
        dest_addr: [u8; 2],
        retries: u8,
        deliver_status: u8,
        discover_status: u8,
    },
    ReceivePacket {
        source_addr_long: [u8; 8],
        source_addr: [u8; 2],
        options: u8,
        rf_data: Vec<u8>,
    },
    ModemStatus {
        status: u8,
    },
    Unknown {
        frame_type: u8,
        data: Vec<u8>,
    },
}

/// Parsed parameter block of an `ND` (node discovery) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub source_addr: [u8; 2],
    pub source_addr_long: [u8; 8],
    pub node_identifier: String,
    pub parent_address: Option<[u8; 2]>,
    pub device_type: Option<u8>,
    pub status: Option<u8>,
    pub profile_id: Option<[u8; 2]>,
    pub manufacturer: Option<[u8; 2]>,
}

fn truncated(what: &str, needed: usize, got: usize) -> SensorNetError {
    SensorNetError::FrameError {
        message: format!("{} frame truncated: need {} bytes, got {}", what, needed, got),
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl ApiFrame {
    pub fn frame_type(&self) -> u8 {
        match self {
            Self::AtCommand { .. } => AT_COMMAND,
            Self::AtResponse { .. } => AT_RESPONSE,
            Self::TransmitRequest { .. } => TX_REQUEST,
            Self::TransmitStatus { .. } => TX_STATUS,
            Self::ReceivePacket { .. } => RX_PACKET,
            Self::ModemStatus { .. } => MODEM_STATUS,
            Self::Unknown { frame_type, .. } => *frame_type,
        }
    }

    /// Serialises into frame data (type byte first), without framing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.frame_type()];
        match self {
            Self::AtCommand {
                frame_id,
                command,
                parameter,
            } => {
                out.push(*frame_id);
                out.extend_from_slice(command);
                out.extend_from_slice(parameter);
            }
            Self::AtResponse {
                frame_id,
                command,
                status,
                data,
            } => {
                out.push(*frame_id);
                out.extend_from_slice(command);
                out.push(*status);
                out.extend_from_slice(data);
            }
            Self::TransmitRequest {
                frame_id,
                dest_addr_long,
                dest_addr,
                broadcast_radius,
                options,
                rf_data,
            } => {
                out.push(*frame_id);
                out.extend_from_slice(dest_addr_long);
                out.extend_from_slice(dest_addr);
                out.push(*broadcast_radius);
                out.push(*options);
                out.extend_from_slice(rf_data);
            }
            Self::TransmitStatus {
                frame_id,
                dest_addr,
                retries,
                deliver_status,
                discover_status,
            } => {
                out.push(*frame_id);
                out.extend_from_slice(dest_addr);
                out.push(*retries);
                out.push(*deliver_status);
                out.push(*discover_status);
            }
            Self::ReceivePacket {
                source_addr_long,
                source_addr,
                options,
                rf_data,
            } => {
                out.extend_from_slice(source_addr_long);
                out.extend_from_slice(source_addr);
                out.push(*options);
                out.extend_from_slice(rf_data);
            }
            Self::ModemStatus { status } => out.push(*status),
            Self::Unknown { data, .. } => out.extend_from_slice(data),
        }
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (&frame_type, body) = data.split_first().ok_or_else(|| SensorNetError::FrameError {
            message: "empty frame".to_string(),
        })?;

        let frame = match frame_type {
            AT_COMMAND => {
                if body.len() < 3 {
                    return Err(truncated("AT command", 4, data.len()));
                }
                Self::AtCommand {
                    frame_id: body[0],
                    command: array(&body[1..3]),
                    parameter: body[3..].to_vec(),
                }
            }
            AT_RESPONSE => {
                if body.len() < 4 {
                    return Err(truncated("AT response", 5, data.len()));
                }
                Self::AtResponse {
                    frame_id: body[0],
                    command: array(&body[1..3]),
                    status: body[3],
                    data: body[4..].to_vec(),
                }
            }
            TX_REQUEST => {
                if body.len() < 13 {
                    return Err(truncated("transmit request", 14, data.len()));
                }
                Self::TransmitRequest {
                    frame_id: body[0],
                    dest_addr_long: array(&body[1..9]),
                    dest_addr: array(&body[9..11]),
                    broadcast_radius: body[11],
                    options: body[12],
                    rf_data: body[13..].to_vec(),
                }
            }
            TX_STATUS => {
                if body.len() < 6 {
                    return Err(truncated("transmit status", 7, data.len()));
                }
                Self::TransmitStatus {
                    frame_id: body[0],
                    dest_addr: array(&body[1..3]),
                    retries: body[3],
                    deliver_status: body[4],
                    discover_status: body[5],
                }
            }
            RX_PACKET => {
                if body.len() < 11 {
                    return Err(truncated("receive packet", 12, data.len()));
                }
                Self::ReceivePacket {
                    source_addr_long: array(&body[0..8]),
                    source_addr: array(&body[8..10]),
                    options: body[10],
                    rf_data: body[11..].to_vec(),
                }
            }
            MODEM_STATUS => {
                if body.is_empty() {
                    return Err(truncated("modem status", 2, data.len()));
                }
                Self::ModemStatus { status: body[0] }
            }
            other => Self::Unknown {
                frame_type: other,
                data: body.to_vec(),
            },
        };
        Ok(frame)
    }
}

impl DiscoveredNode {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 10 {
            return Err(truncated("ND response", 10, data.len()));
        }
        let rest = &data[10..];
        let nul = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        let node_identifier = String::from_utf8_lossy(&rest[..nul]).into_owned();
        let tail = rest.get(nul + 1..).unwrap_or(&[]);

        Ok(Self {
            source_addr: array(&data[0..2]),
            source_addr_long: array(&data[2..10]),
            node_identifier,
            parent_address: tail.get(0..2).map(array),
            device_type: tail.get(2).copied(),
            status: tail.get(3).copied(),
            profile_id: tail.get(4..6).map(array),
            manufacturer: tail.get(6..8).map(array),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.node_identifier.len());
        out.extend_from_slice(&self.source_addr);
        out.extend_from_slice(&self.source_addr_long);
        out.extend_from_slice(self.node_identifier.as_bytes());
        out.push(0);
        if let Some(parent) = self.parent_address {
            out.extend_from_slice(&parent);
        }
        out.extend(self.device_type);
        out.extend(self.status);
        if let Some(profile) = self.profile_id {
            out.extend_from_slice(&profile);
        }
        if let Some(manufacturer) = self.manufacturer {
            out.extend_from_slice(&manufacturer);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: [u8; 8] = [0x00, 0x13, 0xA2, 0x00, 0x40, 0x52, 0x2B, 0xAA];

    #[test]
    fn test_parse_receive_packet() {
        let mut data = vec![RX_PACKET];
        data.extend_from_slice(&ADDR);
        data.extend_from_slice(&[0x7D, 0x84, 0x01, 19, 0x31]);
        let frame = ApiFrame::parse(&data).unwrap();
        assert_eq!(
            frame,
            ApiFrame::ReceivePacket {
                source_addr_long: ADDR,
                source_addr: [0x7D, 0x84],
                options: 0x01,
                rf_data: vec![19, 0x31],
            }
        );
        assert_eq!(frame.to_bytes(), data);
    }

    #[test]
    fn test_transmit_request_layout() {
        let frame = ApiFrame::TransmitRequest {
            frame_id: 1,
            dest_addr_long: ADDR,
            dest_addr: UNKNOWN_ADDR16,
            broadcast_radius: 0,
            options: 0,
            rf_data: vec![18],
        };
        let bytes = frame.to_bytes();
        assert_eq!(bytes[0], TX_REQUEST);
        assert_eq!(&bytes[2..10], &ADDR);
        assert_eq!(&bytes[10..12], &[0xFF, 0xFE]);
        assert_eq!(bytes.last(), Some(&18));
    }

    #[test]
    fn test_truncated_frames_are_rejected() {
        assert!(ApiFrame::parse(&[]).is_err());
        assert!(ApiFrame::parse(&[RX_PACKET, 0x00, 0x13]).is_err());
        assert!(ApiFrame::parse(&[TX_STATUS, 0x01]).is_err());
    }

    #[test]
    fn test_unknown_frame_type_is_preserved() {
        let frame = ApiFrame::parse(&[0x95, 0x01, 0x02]).unwrap();
        assert_eq!(
            frame,
            ApiFrame::Unknown {
                frame_type: 0x95,
                data: vec![0x01, 0x02]
            }
        );
    }

    #[test]
    fn test_parse_node_discovery_response() {
        let mut data = vec![0x7D, 0x84];
        data.extend_from_slice(&ADDR);
        data.extend_from_slice(b"ROUTER1\0");
        data.extend_from_slice(&[0xFF, 0xFE, 0x01, 0x00, 0xC1, 0x05, 0x10, 0x1E]);

        let node = DiscoveredNode::parse(&data).unwrap();
        assert_eq!(node.source_addr_long, ADDR);
        assert_eq!(node.node_identifier, "ROUTER1");
        assert_eq!(node.device_type, Some(0x01));
        assert_eq!(node.manufacturer, Some([0x10, 0x1E]));
        assert_eq!(node.to_bytes(), data);
    }

    #[test]
    fn test_parse_node_discovery_without_trailer() {
        let mut data = vec![0x00, 0x00];
        data.extend_from_slice(&ADDR);
        data.extend_from_slice(b"COORD");
        let node = DiscoveredNode::parse(&data).unwrap();
        assert_eq!(node.node_identifier, "COORD");
        assert_eq!(node.parent_address, None);
    }
}

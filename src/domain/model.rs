use crate::utils::error::{Result, SensorNetError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// First byte of every RF payload exchanged with a sensor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Packet {
    DataRequest = 16,
    DataResponse = 17,
    IoRequest = 18,
    IoResponse = 19,
    InfoRequest = 20,
    InfoResponse = 21,
    SetRequest = 22,
    DataAlert = 23,
    CtrlNack = 254,
    CtrlAck = 255,
}

impl Packet {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        let packet = match byte {
            16 => Self::DataRequest,
            17 => Self::DataResponse,
            18 => Self::IoRequest,
            19 => Self::IoResponse,
            20 => Self::InfoRequest,
            21 => Self::InfoResponse,
            22 => Self::SetRequest,
            23 => Self::DataAlert,
            254 => Self::CtrlNack,
            255 => Self::CtrlAck,
            _ => return None,
        };
        Some(packet)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DataRequest => "DATA_REQUEST",
            Self::DataResponse => "DATA_RESPONSE",
            Self::IoRequest => "IO_REQUEST",
            Self::IoResponse => "IO_RESPONSE",
            Self::InfoRequest => "INFO_REQUEST",
            Self::InfoResponse => "INFO_RESPONSE",
            Self::SetRequest => "SET_REQUEST",
            Self::DataAlert => "DATA_ALERT",
            Self::CtrlNack => "CTRL_NACK",
            Self::CtrlAck => "CTRL_ACK",
        }
    }
}

/// Kind of device a node exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Payload {
    #[serde(rename = "ANALOGUE_1BYTE")]
    Analogue1Byte = 0,
    #[serde(rename = "ANALOGUE_2BYTE")]
    Analogue2Byte = 1,
    DigitalInput = 2,
    DigitalOutput = 3,
    ByteInput = 4,
    ByteOutput = 5,
}

pub const MAX_PAYLOAD_INDEX: u8 = 15;

impl Payload {
    pub const ALL: [Payload; 6] = [
        Self::Analogue1Byte,
        Self::Analogue2Byte,
        Self::DigitalInput,
        Self::DigitalOutput,
        Self::ByteInput,
        Self::ByteOutput,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| SensorNetError::ProtocolError {
                message: format!("unknown payload type {}", value),
            })
    }

    /// Inputs receive data from the network; nothing can be read back out of them.
    pub fn is_sink(self) -> bool {
        matches!(self, Self::DigitalInput | Self::ByteInput)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Analogue1Byte => "ANALOGUE_1BYTE",
            Self::Analogue2Byte => "ANALOGUE_2BYTE",
            Self::DigitalInput => "DIGITAL_INPUT",
            Self::DigitalOutput => "DIGITAL_OUTPUT",
            Self::ByteInput => "BYTE_INPUT",
            Self::ByteOutput => "BYTE_OUTPUT",
        }
    }

    /// Selector byte addressing one instance of this payload on a node.
    pub fn selector(self, index: u8) -> Result<u8> {
        if index > MAX_PAYLOAD_INDEX {
            return Err(SensorNetError::InvalidArgument {
                message: format!("Index out of bounds (0-{}): {}", MAX_PAYLOAD_INDEX, index),
            });
        }
        Ok((self.value() << 4) + index)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A remote ZigBee node found through discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(with = "hex_addr")]
    pub long_addr: [u8; 8],
    pub identifier: String,
}

impl Node {
    pub fn new(long_addr: [u8; 8], identifier: impl Into<String>) -> Self {
        Self {
            long_addr,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}:{})", hex::encode(self.long_addr), self.identifier)
    }
}

mod hex_addr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &[u8; 8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(addr))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 8], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; 8];
        hex::decode_to_slice(&s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

/// Value read back from a source payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PayloadData {
    /// Eight digital lines, most significant bit first.
    Bits([bool; 8]),
    Analogue(u16),
    Bytes(Vec<u8>),
}

impl PayloadData {
    pub fn bits_from_byte(byte: u8) -> Self {
        let mut bits = [false; 8];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = byte & (0x80 >> i) != 0;
        }
        Self::Bits(bits)
    }
}

impl fmt::Display for PayloadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(bits) => {
                let rendered: Vec<&str> = bits
                    .iter()
                    .map(|b| if *b { "True" } else { "False" })
                    .collect();
                write!(f, "[{}] (bits)", rendered.join(", "))
            }
            Self::Analogue(value) => write!(f, "{} (analogue)", value),
            Self::Bytes(bytes) => write!(f, "{} (bytes)", hex::encode(bytes)),
        }
    }
}

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a `clean` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_round_trips_known_bytes() {
        assert_eq!(Packet::from_byte(19), Some(Packet::IoResponse));
        assert_eq!(Packet::from_byte(254), Some(Packet::CtrlNack));
        assert_eq!(Packet::from_byte(0), None);
        assert_eq!(Packet::DataAlert.value(), 23);
    }

    #[test]
    fn test_payload_selector() {
        assert_eq!(Payload::DigitalOutput.selector(0).unwrap(), 0x30);
        assert_eq!(Payload::ByteOutput.selector(15).unwrap(), 0x5F);
        assert!(matches!(
            Payload::Analogue1Byte.selector(16),
            Err(SensorNetError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_payload_from_value_rejects_unknown() {
        assert_eq!(Payload::from_value(1).unwrap(), Payload::Analogue2Byte);
        assert!(Payload::from_value(6).is_err());
    }

    #[test]
    fn test_sinks() {
        assert!(Payload::DigitalInput.is_sink());
        assert!(Payload::ByteInput.is_sink());
        assert!(!Payload::DigitalOutput.is_sink());
    }

    #[test]
    fn test_node_display() {
        let node = Node::new([0x00, 0x13, 0xA2, 0x00, 0x40, 0x52, 0x2B, 0xAA], "ROUTER1");
        assert_eq!(node.to_string(), "Node(0013a20040522baa:ROUTER1)");
    }

    #[test]
    fn test_node_serializes_address_as_hex() {
        let node = Node::new([0, 0, 0, 0, 0, 0, 0, 1], "N");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["long_addr"], "0000000000000001");
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_bits_are_msb_first() {
        assert_eq!(
            PayloadData::bits_from_byte(0b1000_0001),
            PayloadData::Bits([true, false, false, false, false, false, false, true])
        );
    }
}

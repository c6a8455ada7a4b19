//! Client for a network of sensor nodes reached through a ZigBee coordinator
//! radio in API mode.
//!
//! A background task decodes every frame the radio sends. Responses from
//! nodes are queued, node discovery results are recorded, and everything
//! else is logged. Request methods transmit an RF payload to one node and
//! then wait on the queue for the matching response.

use crate::domain::model::{Node, Packet, Payload, PayloadData};
use crate::utils::error::{Result, SensorNetError};
use crate::xbee::api::{self, ApiFrame, DiscoveredNode};
use crate::xbee::frame::{self, FrameDecoder};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const NODE_DISCOVERY: [u8; 2] = *b"ND";

/// Unclaimed responses kept before the oldest is dropped.
const MAX_QUEUED: usize = 64;
/// Timed-out requests remembered so their late responses can be discarded.
const MAX_ABANDONED: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSettings {
    pub device: String,
    pub baud: u32,
    /// API mode 2 (escaped framing).
    pub escaped: bool,
    pub discovery_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            escaped: true,
            discovery_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
        }
    }
}

/// RF data received from a remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RxMessage {
    source_addr_long: [u8; 8],
    rf_data: Vec<u8>,
}

/// What a request waits for: a `packet` response from one node, or a NACK of
/// `fail_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Expected {
    source_addr_long: [u8; 8],
    packet: Packet,
    fail_type: Packet,
    following: Option<Vec<u8>>,
    count: Option<usize>,
}

impl Expected {
    fn answered_by(&self, msg: &RxMessage) -> Option<Answer> {
        if msg.source_addr_long != self.source_addr_long {
            return None;
        }
        if response_matches(&msg.rf_data, self.packet, self.following.as_deref(), self.count) {
            return Some(Answer::Response);
        }
        if msg.rf_data == [Packet::CtrlNack.value(), self.fail_type.value()] {
            return Some(Answer::Nack);
        }
        None
    }
}

enum Answer {
    Response,
    Nack,
}

#[derive(Default)]
struct Inbox {
    messages: VecDeque<RxMessage>,
    abandoned: VecDeque<Expected>,
}

impl Inbox {
    /// Removes and returns the oldest message answering `expected`.
    fn take(&mut self, expected: &Expected) -> Option<(RxMessage, Answer)> {
        let (i, answer) = self
            .messages
            .iter()
            .enumerate()
            .find_map(|(i, msg)| expected.answered_by(msg).map(|a| (i, a)))?;
        self.messages.remove(i).map(|msg| (msg, answer))
    }

    fn push(&mut self, msg: RxMessage) {
        if let Some(i) = self
            .abandoned
            .iter()
            .position(|e| e.answered_by(&msg).is_some())
        {
            self.abandoned.remove(i);
            tracing::warn!(
                "Discarding late response from {}: {}",
                hex::encode(msg.source_addr_long),
                hex::encode(&msg.rf_data)
            );
            return;
        }
        if self.messages.len() >= MAX_QUEUED {
            if let Some(old) = self.messages.pop_front() {
                tracing::warn!(
                    "Response queue full, dropping unclaimed message from {}",
                    hex::encode(old.source_addr_long)
                );
            }
        }
        self.messages.push_back(msg);
    }

    fn abandon(&mut self, expected: Expected) {
        if self.abandoned.len() >= MAX_ABANDONED {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(expected);
    }
}

#[derive(Default)]
struct Shared {
    inbox: Mutex<Inbox>,
    nodes: Mutex<Vec<Node>>,
    notify: Notify,
    closed: AtomicBool,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub struct SensorNetwork {
    settings: NetworkSettings,
    writer: tokio::sync::Mutex<Option<Writer>>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    frame_id: AtomicU8,
}

impl SensorNetwork {
    /// Starts listening on an already-open transport to the coordinator radio.
    pub fn new<T>(io: T, settings: NetworkSettings) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let shared = Arc::new(Shared::default());
        let reader = tokio::spawn(read_loop(read_half, settings.escaped, shared.clone()));

        Self {
            settings,
            writer: tokio::sync::Mutex::new(Some(Box::new(write_half))),
            shared,
            reader: Mutex::new(Some(reader)),
            frame_id: AtomicU8::new(1),
        }
    }

    /// Opens the serial device named in the settings.
    #[cfg(feature = "serial")]
    pub fn open(settings: NetworkSettings) -> Result<Self> {
        let port = crate::adapters::serial::open_port(&settings)?;
        Ok(Self::new(port, settings))
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Asks the coordinator to discover nodes, then waits `timeout` for answers.
    pub async fn discover(&self, timeout: Duration) -> Result<()> {
        tracing::debug!("Starting node discovery...");
        let frame = ApiFrame::AtCommand {
            frame_id: self.next_frame_id(),
            command: NODE_DISCOVERY,
            parameter: Vec::new(),
        };
        self.send(&frame).await?;
        if !timeout.is_zero() {
            tokio::time::sleep(timeout).await;
        }
        Ok(())
    }

    /// Nodes found so far, in discovery order.
    pub fn nodes(&self) -> Vec<Node> {
        lock(&self.shared.nodes).clone()
    }

    /// Reads which payloads a node presents and how many of each.
    pub async fn get_node_io(&self, node: &Node) -> Result<BTreeMap<Payload, u8>> {
        self.transmit(node, vec![Packet::IoRequest.value()]).await?;
        tracing::info!("Waiting for IO_RESPONSE");
        let data = self
            .wait_for_response(node, Packet::IoResponse, Packet::IoRequest, None, None)
            .await?;

        let mut out = BTreeMap::new();
        for byte in data {
            let payload = Payload::from_value(byte >> 4)?;
            out.insert(payload, (byte & 0x0F) + 1);
        }
        Ok(out)
    }

    /// Raw description a node reports for one of its payloads.
    pub async fn get_payload_info(
        &self,
        node: &Node,
        payload: Payload,
        index: u8,
    ) -> Result<Vec<u8>> {
        let selector = payload.selector(index)?;
        self.transmit(node, vec![Packet::InfoRequest.value(), selector])
            .await?;
        tracing::info!("Waiting for INFO_RESPONSE");
        let data = self
            .wait_for_response(
                node,
                Packet::InfoResponse,
                Packet::InfoRequest,
                Some(&[selector][..]),
                None,
            )
            .await?;
        Ok(data[1..].to_vec())
    }

    /// Reads the current value of a source payload.
    pub async fn get_data(&self, node: &Node, payload: Payload, index: u8) -> Result<PayloadData> {
        if payload.is_sink() {
            return Err(SensorNetError::InvalidArgument {
                message: format!("Cannot get data out of a sink payload ({})", payload),
            });
        }
        let selector = payload.selector(index)?;
        self.transmit(node, vec![Packet::DataRequest.value(), selector])
            .await?;
        tracing::info!("Waiting for DATA_RESPONSE");

        let count = match payload {
            Payload::DigitalOutput | Payload::Analogue1Byte => Some(3),
            Payload::Analogue2Byte => Some(4),
            _ => None,
        };
        let data = self
            .wait_for_response(
                node,
                Packet::DataResponse,
                Packet::DataRequest,
                Some(&[selector][..]),
                count,
            )
            .await?;
        let value = &data[1..];

        let decoded = match payload {
            Payload::DigitalOutput => PayloadData::bits_from_byte(value[0]),
            Payload::Analogue1Byte => PayloadData::Analogue(u16::from(value[0])),
            Payload::Analogue2Byte => {
                PayloadData::Analogue(u16::from_be_bytes([value[0], value[1]]))
            }
            Payload::ByteOutput => PayloadData::Bytes(value.to_vec()),
            Payload::DigitalInput | Payload::ByteInput => unreachable!("sinks rejected above"),
        };
        Ok(decoded)
    }

    /// Stops the listener and releases the transport. Safe to call twice.
    pub async fn stop(&self) -> Result<()> {
        let handle = lock(&self.reader).take();
        if let Some(handle) = handle {
            tracing::info!("Stopping...");
            handle.abort();
        }
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();

        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn transmit(&self, node: &Node, rf_data: Vec<u8>) -> Result<()> {
        let frame = ApiFrame::TransmitRequest {
            frame_id: self.next_frame_id(),
            dest_addr_long: node.long_addr,
            dest_addr: api::UNKNOWN_ADDR16,
            broadcast_radius: 0,
            options: 0,
            rf_data,
        };
        self.send(&frame).await
    }

    async fn send(&self, frame: &ApiFrame) -> Result<()> {
        let bytes = frame::encode(&frame.to_bytes(), self.settings.escaped)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SensorNetError::Disconnected)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Waits until the queue holds a message from `node` that answers a request.
    ///
    /// Returns the RF data after the packet type byte. A NACK for `fail_type`
    /// from the same node ends the wait with a protocol error. On timeout the
    /// request is remembered, so a response arriving later is discarded rather
    /// than handed to the next caller.
    async fn wait_for_response(
        &self,
        node: &Node,
        packet: Packet,
        fail_type: Packet,
        following: Option<&[u8]>,
        count: Option<usize>,
    ) -> Result<Vec<u8>> {
        let expected = Expected {
            source_addr_long: node.long_addr,
            packet,
            fail_type,
            following: following.map(<[u8]>::to_vec),
            count,
        };
        let timeout = self.settings.response_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.take_response(node, &expected) {
                return result;
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(SensorNetError::Disconnected);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut inbox = lock(&self.shared.inbox);
                // A response may have landed between the last check and the deadline.
                if let Some(found) = inbox.take(&expected) {
                    drop(inbox);
                    return into_result(node, &expected, found);
                }
                inbox.abandon(expected);
                return Err(SensorNetError::Timeout {
                    what: format!("{} from {}", packet.name(), node),
                    after: timeout,
                });
            }
        }
    }

    fn take_response(&self, node: &Node, expected: &Expected) -> Option<Result<Vec<u8>>> {
        let found = lock(&self.shared.inbox).take(expected)?;
        Some(into_result(node, expected, found))
    }

    fn next_frame_id(&self) -> u8 {
        // Frame id 0 suppresses the transmit status, so skip it on wrap-around.
        loop {
            let id = self.frame_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Drop for SensorNetwork {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
    }
}

fn into_result(node: &Node, expected: &Expected, found: (RxMessage, Answer)) -> Result<Vec<u8>> {
    match found {
        (msg, Answer::Response) => Ok(msg.rf_data[1..].to_vec()),
        (_, Answer::Nack) => Err(SensorNetError::ProtocolError {
            message: format!(
                "{} returned NACK for {}, did you ask for something which doesn't exist?",
                node,
                expected.fail_type.name()
            ),
        }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whether `rf_data` is a `packet` response carrying `following` right after
/// the type byte and exactly `count` bytes in total.
fn response_matches(
    rf_data: &[u8],
    packet: Packet,
    following: Option<&[u8]>,
    count: Option<usize>,
) -> bool {
    if rf_data.first() != Some(&packet.value()) {
        return false;
    }
    if let Some(count) = count {
        if rf_data.len() != count {
            return false;
        }
    }
    if let Some(following) = following {
        if rf_data.len() <= 1 + following.len() || &rf_data[1..=following.len()] != following {
            return false;
        }
    }
    true
}

async fn read_loop<T>(mut reader: ReadHalf<T>, escaped: bool, shared: Arc<Shared>)
where
    T: AsyncRead + Send,
{
    let mut decoder = FrameDecoder::new(escaped);
    let mut buf = [0u8; 256];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::warn!("Radio link closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Failed to read from radio: {}", e);
                break;
            }
        };

        decoder.push(&buf[..n]);
        while let Some(decoded) = decoder.next_frame() {
            match decoded.and_then(|data| ApiFrame::parse(&data)) {
                Ok(frame) => shared.handle_frame(frame),
                Err(e) => tracing::warn!("Dropping frame: {}", e),
            }
        }
    }

    shared.closed.store(true, Ordering::SeqCst);
    shared.notify.notify_waiters();
}

impl Shared {
    fn handle_frame(&self, frame: ApiFrame) {
        match frame {
            ApiFrame::ReceivePacket {
                source_addr_long,
                rf_data,
                ..
            } => self.handle_rf_data(source_addr_long, rf_data),
            ApiFrame::TransmitStatus { deliver_status, .. } => {
                if deliver_status != 0 {
                    tracing::error!(
                        "Transmission was not delivered! (delivery status {:#04x})",
                        deliver_status
                    );
                }
            }
            ApiFrame::AtResponse {
                command,
                status,
                data,
                ..
            } => {
                if command != NODE_DISCOVERY {
                    tracing::error!(
                        "Unsupported command: {}",
                        String::from_utf8_lossy(&command)
                    );
                } else if status != 0 {
                    tracing::error!("Node discovery failed with status {:#04x}", status);
                } else if data.is_empty() {
                    tracing::debug!("Node discovery finished");
                } else {
                    match DiscoveredNode::parse(&data) {
                        Ok(found) => self.record_node(found),
                        Err(e) => tracing::error!("Bad node discovery response: {}", e),
                    }
                }
            }
            ApiFrame::ModemStatus { status } => {
                tracing::debug!("Modem status {:#04x}", status);
            }
            other => {
                tracing::error!("Received unknown packet: {:?}", other);
            }
        }
    }

    fn handle_rf_data(&self, source_addr_long: [u8; 8], rf_data: Vec<u8>) {
        let packet = rf_data.first().copied().and_then(Packet::from_byte);
        match packet {
            Some(
                p @ (Packet::IoResponse
                | Packet::InfoResponse
                | Packet::DataResponse
                | Packet::CtrlNack),
            ) => {
                tracing::debug!("Received {}", p.name());
                lock(&self.inbox).push(RxMessage {
                    source_addr_long,
                    rf_data,
                });
                self.notify.notify_waiters();
            }
            Some(Packet::DataAlert) => {
                tracing::info!(
                    "Data alert from {}: {}",
                    hex::encode(source_addr_long),
                    hex::encode(&rf_data[1..])
                );
            }
            _ => {
                tracing::warn!("Unknown data: {}", hex::encode(&rf_data));
            }
        }
    }

    fn record_node(&self, found: DiscoveredNode) {
        let node = Node::new(found.source_addr_long, found.node_identifier);
        let mut nodes = lock(&self.nodes);
        match nodes.iter_mut().find(|n| n.long_addr == node.long_addr) {
            Some(existing) => *existing = node,
            None => {
                tracing::info!("Discovered {}", node);
                nodes.push(node);
            }
        }
    }
}

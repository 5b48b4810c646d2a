use std::time::SystemTime;

use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType, decoder, encoder};

use crate::coord::Position;
use crate::error::TransportError;
use crate::registry::{TrackId, TrackParameter};

pub const PROTOCOL_VERSION: i32 = 1;
pub const DEFAULT_DEVICE_PORT: u16 = 4003;

pub const HELLO: &str = "/holo/hello";
pub const WELCOME: &str = "/holo/welcome";
pub const REJECT: &str = "/holo/reject";
pub const PING: &str = "/holo/ping";
pub const PONG: &str = "/holo/pong";
pub const SUBSCRIBE: &str = "/holo/subscribe";
pub const STATUS: &str = "/holo/status";
pub const ERROR: &str = "/holo/error";

/// `#bundle\0` plus the 8-byte timetag.
const BUNDLE_HEADER_SIZE: usize = 16;
/// Each bundle element is prefixed with its size.
const BUNDLE_ELEMENT_PREFIX: usize = 4;

/// Session messages exchanged on the `/holo` namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Hello { version: i32, nonce: i64 },
    Welcome { nonce: i64 },
    Reject { reason: String },
    Ping { timestamp_ms: i64 },
    Pong { timestamp_ms: i64 },
    Subscribe { port: i32 },
    Status(String),
    Error(String),
}

impl ControlMessage {
    pub fn to_osc(&self) -> OscMessage {
        let (addr, args) = match self {
            Self::Hello { version, nonce } => {
                (HELLO, vec![OscType::Int(*version), OscType::Long(*nonce)])
            }
            Self::Welcome { nonce } => (WELCOME, vec![OscType::Long(*nonce)]),
            Self::Reject { reason } => (REJECT, vec![OscType::String(reason.clone())]),
            Self::Ping { timestamp_ms } => (PING, vec![OscType::Long(*timestamp_ms)]),
            Self::Pong { timestamp_ms } => (PONG, vec![OscType::Long(*timestamp_ms)]),
            Self::Subscribe { port } => (SUBSCRIBE, vec![OscType::Int(*port)]),
            Self::Status(text) => (STATUS, vec![OscType::String(text.clone())]),
            Self::Error(text) => (ERROR, vec![OscType::String(text.clone())]),
        };
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    pub fn from_osc(message: &OscMessage) -> Option<Self> {
        let args = message.args.as_slice();
        let message = match (message.addr.as_str(), args) {
            (HELLO, [OscType::Int(version), nonce]) => Self::Hello {
                version: *version,
                nonce: as_long(nonce)?,
            },
            (WELCOME, [nonce]) => Self::Welcome {
                nonce: as_long(nonce)?,
            },
            (REJECT, [OscType::String(reason)]) => Self::Reject {
                reason: reason.clone(),
            },
            (REJECT, []) => Self::Reject {
                reason: String::new(),
            },
            (PING, [ts]) => Self::Ping {
                timestamp_ms: as_long(ts)?,
            },
            (PONG, [ts]) => Self::Pong {
                timestamp_ms: as_long(ts)?,
            },
            (SUBSCRIBE, [OscType::Int(port)]) => Self::Subscribe { port: *port },
            (STATUS, args) => Self::Status(join_text(args)),
            (ERROR, args) => Self::Error(join_text(args)),
            _ => return None,
        };
        Some(message)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        encode(&OscPacket::Message(self.to_osc()))
    }
}

fn as_long(arg: &OscType) -> Option<i64> {
    match arg {
        OscType::Long(v) => Some(*v),
        OscType::Int(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn join_text(args: &[OscType]) -> String {
    args.iter()
        .map(|arg| match arg {
            OscType::String(s) => s.clone(),
            OscType::Int(v) => v.to_string(),
            OscType::Long(v) => v.to_string(),
            OscType::Float(v) => v.to_string(),
            OscType::Double(v) => v.to_string(),
            OscType::Bool(v) => v.to_string(),
            other => format!("{other:?}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `/track/{id}/xyz` or `/track/{id}/aed` depending on the variant.
pub fn position_message(track: TrackId, position: &Position) -> OscMessage {
    let suffix = if position.is_polar() { "aed" } else { "xyz" };
    let [a, b, c] = position.components();
    OscMessage {
        addr: format!("/track/{}/{suffix}", track.0),
        args: vec![
            OscType::Float(a as f32),
            OscType::Float(b as f32),
            OscType::Float(c as f32),
        ],
    }
}

pub fn parameter_message(track: TrackId, parameter: &TrackParameter) -> OscMessage {
    let id = track.0;
    match parameter {
        TrackParameter::Gain(db) => OscMessage {
            addr: format!("/track/{id}/gain/value"),
            args: vec![OscType::Float(*db as f32)],
        },
        TrackParameter::Mute(mute) => OscMessage {
            addr: format!("/track/{id}/mute"),
            args: vec![OscType::Int(i32::from(*mute))],
        },
        TrackParameter::Color(rgba) => OscMessage {
            addr: format!("/track/{id}/color"),
            args: rgba.iter().map(|c| OscType::Float(*c as f32)).collect(),
        },
    }
}

/// A message on the `/track` namespace, as seen by a device.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackUpdate {
    Position {
        track: u32,
        polar: bool,
        values: [f32; 3],
    },
    Parameter {
        track: u32,
        name: String,
        args: Vec<OscType>,
    },
}

impl TrackUpdate {
    pub fn track(&self) -> u32 {
        match self {
            Self::Position { track, .. } | Self::Parameter { track, .. } => *track,
        }
    }

    pub fn from_osc(message: &OscMessage) -> Option<Self> {
        let rest = message.addr.strip_prefix("/track/")?;
        let (id, path) = rest.split_once('/')?;
        let track = id.parse().ok()?;

        match (path, message.args.as_slice()) {
            (
                "xyz" | "aed",
                [OscType::Float(a), OscType::Float(b), OscType::Float(c)],
            ) => Some(Self::Position {
                track,
                polar: path == "aed",
                values: [*a, *b, *c],
            }),
            ("xyz" | "aed", _) => None,
            _ => Some(Self::Parameter {
                track,
                name: path.to_string(),
                args: message.args.clone(),
            }),
        }
    }
}

pub fn encode(packet: &OscPacket) -> Result<Vec<u8>, TransportError> {
    encoder::encode(packet).map_err(|e| TransportError::Encode(format!("{e:?}")))
}

/// Decodes one datagram, flattening bundles into their messages.
pub fn decode(datagram: &[u8]) -> Result<Vec<OscMessage>, TransportError> {
    let (_, packet) =
        decoder::decode_udp(datagram).map_err(|e| TransportError::Decode(format!("{e:?}")))?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

/// Timetag for a wall-clock instant; falls back to "immediately" for times
/// before the OSC epoch.
pub fn timetag(at: SystemTime) -> OscTime {
    OscTime::try_from(at).unwrap_or(OscTime {
        seconds: 0,
        fractional: 1,
    })
}

/// Datagrams for one batch plus the messages that were left out of it.
#[derive(Debug, Default)]
pub struct PackedBatch {
    pub datagrams: Vec<Vec<u8>>,
    /// Messages that cannot fit a datagram on their own.
    pub rejected: Vec<TransportError>,
}

/// Packs `messages` into as few timetagged bundles as fit the datagram
/// ceiling, preserving order. A message that cannot fit on its own is
/// skipped and reported in [`PackedBatch::rejected`]; the rest still go out.
pub fn pack_bundles(
    messages: Vec<OscMessage>,
    timetag: OscTime,
    max_datagram_size: usize,
) -> Result<PackedBatch, TransportError> {
    let mut batch = PackedBatch::default();
    let mut current: Vec<OscPacket> = Vec::new();
    let mut current_size = BUNDLE_HEADER_SIZE;

    for message in messages {
        let packet = OscPacket::Message(message);
        let element_size = BUNDLE_ELEMENT_PREFIX + encode(&packet)?.len();

        if BUNDLE_HEADER_SIZE + element_size > max_datagram_size {
            batch.rejected.push(TransportError::MessageTooLarge {
                size: BUNDLE_HEADER_SIZE + element_size,
                limit: max_datagram_size,
            });
            continue;
        }

        if current_size + element_size > max_datagram_size {
            batch
                .datagrams
                .push(seal(std::mem::take(&mut current), timetag, max_datagram_size)?);
            current_size = BUNDLE_HEADER_SIZE;
        }

        current.push(packet);
        current_size += element_size;
    }

    if !current.is_empty() {
        batch.datagrams.push(seal(current, timetag, max_datagram_size)?);
    }

    Ok(batch)
}

fn seal(
    content: Vec<OscPacket>,
    timetag: OscTime,
    max_datagram_size: usize,
) -> Result<Vec<u8>, TransportError> {
    let bytes = encode(&OscPacket::Bundle(OscBundle { timetag, content }))?;
    if bytes.len() > max_datagram_size {
        return Err(TransportError::MessageTooLarge {
            size: bytes.len(),
            limit: max_datagram_size,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag() -> OscTime {
        OscTime {
            seconds: 1,
            fractional: 0,
        }
    }

    #[test]
    fn control_messages_survive_the_wire() {
        let messages = [
            ControlMessage::Hello {
                version: PROTOCOL_VERSION,
                nonce: -42,
            },
            ControlMessage::Welcome { nonce: 7 },
            ControlMessage::Reject {
                reason: "busy".to_string(),
            },
            ControlMessage::Ping { timestamp_ms: 1234 },
            ControlMessage::Subscribe { port: 9000 },
        ];

        for message in messages {
            let bytes = message.encode().unwrap();
            let decoded = decode(&bytes).unwrap();
            assert_eq!(ControlMessage::from_osc(&decoded[0]), Some(message));
        }
    }

    #[test]
    fn status_accepts_mixed_arguments() {
        let message = OscMessage {
            addr: STATUS.to_string(),
            args: vec![OscType::String("cpu".into()), OscType::Int(40)],
        };
        assert_eq!(
            ControlMessage::from_osc(&message),
            Some(ControlMessage::Status("cpu 40".to_string()))
        );
    }

    #[test]
    fn position_addresses_follow_the_variant() {
        let xyz = position_message(TrackId(3), &Position::cartesian(1.0, 2.0, 3.0));
        assert_eq!(xyz.addr, "/track/3/xyz");

        let aed = position_message(TrackId(12), &Position::polar(90.0, 10.0, 2.0));
        assert_eq!(aed.addr, "/track/12/aed");
        assert_eq!(
            TrackUpdate::from_osc(&aed),
            Some(TrackUpdate::Position {
                track: 12,
                polar: true,
                values: [90.0, 10.0, 2.0],
            })
        );
    }

    #[test]
    fn parameter_addresses() {
        let gain = parameter_message(TrackId(1), &TrackParameter::Gain(-6.0));
        assert_eq!(gain.addr, "/track/1/gain/value");
        let mute = parameter_message(TrackId(1), &TrackParameter::Mute(true));
        assert_eq!(mute.args, vec![OscType::Int(1)]);
        let color = parameter_message(TrackId(1), &TrackParameter::Color([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(color.addr, "/track/1/color");
        assert_eq!(color.args.len(), 4);

        assert!(matches!(
            TrackUpdate::from_osc(&gain),
            Some(TrackUpdate::Parameter { track: 1, ref name, .. }) if name == "gain/value"
        ));
    }

    #[test]
    fn small_batch_is_one_bundle() {
        let messages = (1..=10)
            .map(|id| position_message(TrackId(id), &Position::default()))
            .collect();
        let datagrams = pack_bundles(messages, tag(), 65_507).unwrap().datagrams;
        assert_eq!(datagrams.len(), 1);
        assert_eq!(decode(&datagrams[0]).unwrap().len(), 10);
    }

    #[test]
    fn oversized_batch_is_split_within_ceiling() {
        let ceiling = 256;
        let messages: Vec<OscMessage> = (1..=40)
            .map(|id| position_message(TrackId(id), &Position::cartesian(1.0, 1.0, 1.0)))
            .collect();

        let batch = pack_bundles(messages, tag(), ceiling).unwrap();
        assert!(batch.rejected.is_empty());
        let datagrams = batch.datagrams;
        assert!(datagrams.len() >= 2);

        let mut seen = Vec::new();
        for datagram in &datagrams {
            assert!(datagram.len() <= ceiling);
            for message in decode(datagram).unwrap() {
                seen.push(TrackUpdate::from_osc(&message).unwrap().track());
            }
        }
        assert_eq!(seen, (1..=40).collect::<Vec<u32>>());
    }

    #[test]
    fn single_message_over_ceiling_is_rejected() {
        let messages = vec![position_message(TrackId(1), &Position::default())];
        let batch = pack_bundles(messages, tag(), 24).unwrap();
        assert!(batch.datagrams.is_empty());
        assert!(matches!(
            batch.rejected[..],
            [TransportError::MessageTooLarge { limit: 24, .. }]
        ));
    }

    #[test]
    fn oversize_message_does_not_stall_the_rest() {
        // A bundled position for a short id takes 56 bytes, the color below 68.
        let ceiling = 64;
        let messages = vec![
            position_message(TrackId(1), &Position::cartesian(1.0, 0.0, 0.0)),
            parameter_message(TrackId(4_000_000_000), &TrackParameter::Color([1.0; 4])),
            position_message(TrackId(3), &Position::cartesian(3.0, 0.0, 0.0)),
        ];

        let batch = pack_bundles(messages, tag(), ceiling).unwrap();

        assert_eq!(batch.rejected.len(), 1);
        assert!(matches!(
            batch.rejected[0],
            TransportError::MessageTooLarge { limit: 64, .. }
        ));
        let tracks: Vec<u32> = batch
            .datagrams
            .iter()
            .inspect(|d| assert!(d.len() <= ceiling))
            .flat_map(|d| decode(d).unwrap())
            .map(|m| TrackUpdate::from_osc(&m).unwrap().track())
            .collect();
        assert_eq!(tracks, vec![1, 3]);
    }

    #[test]
    fn empty_batch_produces_nothing() {
        let batch = pack_bundles(Vec::new(), tag(), 1024).unwrap();
        assert!(batch.datagrams.is_empty());
        assert!(batch.rejected.is_empty());
    }
}

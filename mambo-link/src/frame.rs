use crate::commands;
use crate::error::{DecodeError, EncodeError};
use std::convert::TryFrom;
use std::fmt;

/// Size of the header of a data frame: type, sequence, channel, project, class and a 16 bit command id
pub const HEADER_LEN: usize = 7;
/// Size of an ack frame: type, sequence of the ack itself and acknowledged sequence
pub const ACK_LEN: usize = 3;

/// Logical stream of frames, identified on the wire by the characteristic suffix it travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Piloting commands that are never acknowledged
    Piloting,
    /// Commands acknowledged on [Channel::CommandAck]
    Command,
    /// High priority commands acknowledged on [Channel::EmergencyAck]
    Emergency,
    /// Acks written back for [Channel::EventWithAck] data
    Ack,
    /// Aircraft data that must be acknowledged
    EventWithAck,
    /// Aircraft data without acknowledgement
    Event,
    /// Acks for [Channel::Command]
    CommandAck,
    /// Acks for [Channel::Emergency]
    EmergencyAck,
}

impl Channel {
    pub const OUTBOUND: [Channel; 4] = [
        Channel::Piloting,
        Channel::Command,
        Channel::Emergency,
        Channel::Ack,
    ];
    pub const INBOUND: [Channel; 4] = [
        Channel::EventWithAck,
        Channel::Event,
        Channel::CommandAck,
        Channel::EmergencyAck,
    ];

    pub fn id(self) -> u8 {
        match self {
            Channel::Piloting => 0x0a,
            Channel::Command => 0x0b,
            Channel::Emergency => 0x0c,
            Channel::Ack => 0x1e,
            Channel::EventWithAck => 0x0e,
            Channel::Event => 0x0f,
            Channel::CommandAck => 0x1b,
            Channel::EmergencyAck => 0x1c,
        }
    }

    pub fn from_id(id: u8) -> Option<Channel> {
        match id {
            0x0a => Some(Channel::Piloting),
            0x0b => Some(Channel::Command),
            0x0c => Some(Channel::Emergency),
            0x1e => Some(Channel::Ack),
            0x0e => Some(Channel::EventWithAck),
            0x0f => Some(Channel::Event),
            0x1b => Some(Channel::CommandAck),
            0x1c => Some(Channel::EmergencyAck),
            _ => None,
        }
    }

    /// Channels a [CommandFrame] can be written on
    pub fn carries_commands(self) -> bool {
        matches!(self, Channel::Piloting | Channel::Command | Channel::Emergency)
    }

    /// Channel whose commands are acknowledged by acks arriving on this one
    pub fn acknowledged(self) -> Option<Channel> {
        match self {
            Channel::CommandAck => Some(Channel::Command),
            Channel::EmergencyAck => Some(Channel::Emergency),
            _ => None,
        }
    }

    /// Frames written on this channel wait for an ack from the aircraft
    pub fn expects_ack(self) -> bool {
        matches!(self, Channel::Command | Channel::Emergency)
    }

    /// Frame type used when writing a command on this channel
    pub fn frame_type(self) -> FrameType {
        match self {
            Channel::Command => FrameType::DataWithAck,
            Channel::Emergency => FrameType::LowLatency,
            Channel::Ack => FrameType::Ack,
            _ => FrameType::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Ack = 1,
    Data = 2,
    LowLatency = 3,
    DataWithAck = 4,
}

impl TryFrom<u8> for FrameType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FrameType::Ack),
            2 => Ok(FrameType::Data),
            3 => Ok(FrameType::LowLatency),
            4 => Ok(FrameType::DataWithAck),
            other => Err(DecodeError::InvalidFrameType(other)),
        }
    }
}

/// Project, class and command triple naming a command or a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    pub project: u8,
    pub class: u8,
    pub command: u16,
}

impl CommandId {
    pub const fn new(project: u8, class: u8, command: u16) -> Self {
        CommandId {
            project,
            class,
            command,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.class, self.command)
    }
}

/// Outgoing command
///
/// Only built for channels that carry commands. Acks have their own layout
/// and are written with [encode_ack].
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    channel: Channel,
    sequence: u8,
    command: CommandId,
    payload: Vec<u8>,
}

impl CommandFrame {
    pub fn new(
        channel: Channel,
        sequence: u8,
        command: CommandId,
        payload: Vec<u8>,
    ) -> Result<Self, EncodeError> {
        if !channel.carries_commands() {
            return Err(EncodeError::NotACommandChannel(channel));
        }
        Ok(CommandFrame {
            channel,
            sequence,
            command,
            payload,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of bytes written on the wire
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(ch: {:?}, seq: {}, cmd: {}, data: {})",
            self.channel,
            self.sequence,
            self.command,
            hex::encode(&self.payload)
        )
    }
}

impl From<&CommandFrame> for Vec<u8> {
    fn from(frame: &CommandFrame) -> Self {
        encode(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Ack,
    SensorUpdate,
    Event,
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFrame {
    pub frame_type: FrameType,
    pub channel: Channel,
    pub sequence: u8,
    /// `None` for ack frames
    pub command: Option<CommandId>,
    pub payload: Vec<u8>,
    pub kind: NotificationKind,
}

/// Frame kept as opaque bytes because it is not in the command table
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub frame_type: FrameType,
    pub sequence: u8,
    pub channel: u8,
    pub command: Option<CommandId>,
    pub payload: Vec<u8>,
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command {
            Some(command) => write!(
                f,
                "(ch: {:#04x}, seq: {}, cmd: {}, data: {})",
                self.channel,
                self.sequence,
                command,
                hex::encode(&self.payload)
            ),
            None => write!(
                f,
                "(ch: {:#04x}, seq: {}, data: {})",
                self.channel,
                self.sequence,
                hex::encode(&self.payload)
            ),
        }
    }
}

impl From<NotificationFrame> for RawFrame {
    fn from(frame: NotificationFrame) -> Self {
        RawFrame {
            frame_type: frame.frame_type,
            sequence: frame.sequence,
            channel: frame.channel.id(),
            command: frame.command,
            payload: frame.payload,
        }
    }
}

pub fn encode(frame: &CommandFrame) -> Vec<u8> {
    //
    // A data frame on the wire is laid out as:
    //
    //   [type, seq, channel, project, class, cmd_lo, cmd_hi, params...]
    //
    // with every multi-byte parameter in little-endian.
    //
    let mut bytes = Vec::with_capacity(frame.encoded_len());
    bytes.push(frame.channel.frame_type() as u8);
    bytes.push(frame.sequence);
    bytes.push(frame.channel.id());
    bytes.push(frame.command.project);
    bytes.push(frame.command.class);
    bytes.extend_from_slice(&frame.command.command.to_le_bytes());
    bytes.extend_from_slice(&frame.payload);
    bytes
}

/// Encode an ack frame. `sequence` is the next number of the ack stream,
/// `acked` the sequence of the frame being acknowledged.
pub fn encode_ack(sequence: u8, acked: u8) -> Vec<u8> {
    vec![FrameType::Ack as u8, sequence, acked]
}

/// Sequence to acknowledge if `bytes` start like a frame sent with ack.
/// Only the first two bytes are looked at, so frames failing to decode are still acknowledged.
pub fn ack_request(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [frame_type, sequence, ..] if *frame_type == FrameType::DataWithAck as u8 => Some(*sequence),
        _ => None,
    }
}

pub fn decode(bytes: &[u8]) -> Result<NotificationFrame, DecodeError> {
    let frame_type = match bytes.first() {
        Some(b) => FrameType::try_from(*b)?,
        None => {
            return Err(DecodeError::Truncated {
                needed: ACK_LEN,
                actual: 0,
            })
        }
    };

    if frame_type == FrameType::Ack {
        if bytes.len() < ACK_LEN {
            return Err(DecodeError::Truncated {
                needed: ACK_LEN,
                actual: bytes.len(),
            });
        }

        //
        // The ack layout carries no channel id: [type, seq, acked_seq].
        // The channel it arrived on tells which stream it acknowledges.
        //
        return Ok(NotificationFrame {
            frame_type,
            channel: Channel::Ack,
            sequence: bytes[1],
            command: None,
            payload: bytes[2..].to_vec(),
            kind: NotificationKind::Ack,
        });
    }

    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let command = CommandId::new(bytes[3], bytes[4], u16::from_le_bytes([bytes[5], bytes[6]]));
    let raw = RawFrame {
        frame_type,
        sequence: bytes[1],
        channel: bytes[2],
        command: Some(command),
        payload: bytes[HEADER_LEN..].to_vec(),
    };

    let (channel, info) = match (Channel::from_id(raw.channel), commands::lookup(command)) {
        (Some(channel), Some(info)) => (channel, info),
        _ => return Err(DecodeError::UnknownKind(raw)),
    };

    if raw.payload.len() != info.payload_len {
        return Err(DecodeError::LengthMismatch {
            expected: info.payload_len,
            actual: raw.payload.len(),
        });
    }

    Ok(NotificationFrame {
        frame_type,
        channel,
        sequence: raw.sequence,
        command: Some(command),
        payload: raw.payload,
        kind: info.kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{self, FlipDirection, Piloting};

    #[test]
    fn encode_take_off_layout() {
        let frame = CommandFrame::new(Channel::Command, 7, commands::TAKE_OFF, Vec::new()).unwrap();
        assert_eq!(encode(&frame), vec![4, 7, 0x0b, 2, 0, 1, 0]);
    }

    #[test]
    fn encode_pcmd_layout() {
        let payload = Piloting::new(10, -20, 0, 100).payload(0x0102_0304);
        let frame = CommandFrame::new(Channel::Command, 1, commands::PCMD, payload).unwrap();
        assert_eq!(
            encode(&frame),
            vec![4, 1, 0x0b, 2, 0, 2, 0, 1, 10, 0xec, 0, 100, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(frame.encoded_len(), 16);
    }

    #[test]
    fn decoded_command_keeps_channel_sequence_and_payload() {
        let frames = vec![
            (Channel::Command, 0, commands::TAKE_OFF, Vec::new()),
            (Channel::Emergency, 255, commands::EMERGENCY, Vec::new()),
            (Channel::Command, 42, commands::FLIP, FlipDirection::Left.payload()),
            (
                Channel::Piloting,
                9,
                commands::PCMD,
                Piloting::new(-100, 100, 3, -4).payload(77),
            ),
        ];

        for (channel, sequence, command, payload) in frames {
            let frame = CommandFrame::new(channel, sequence, command, payload).unwrap();
            let decoded = decode(&encode(&frame)).unwrap();
            assert_eq!(decoded.channel, frame.channel());
            assert_eq!(decoded.sequence, frame.sequence());
            assert_eq!(decoded.payload, frame.payload());
            assert_eq!(decoded.command, Some(frame.command()));
        }
    }

    #[test]
    fn ack_frames_are_not_command_frames() {
        for channel in [Channel::Ack, Channel::CommandAck, Channel::Event].iter() {
            assert_eq!(
                CommandFrame::new(*channel, 1, commands::TAKE_OFF, Vec::new()),
                Err(EncodeError::NotACommandChannel(*channel))
            );
        }
    }

    #[test]
    fn ack_layout() {
        // Second ack written back, acknowledging aircraft frame 14
        assert_eq!(encode_ack(2, 14), vec![1, 2, 14]);
    }

    #[test]
    fn decode_ack() {
        let decoded = decode(&[1, 5, 12]).unwrap();
        assert_eq!(decoded.kind, NotificationKind::Ack);
        assert_eq!(decoded.channel, Channel::Ack);
        assert_eq!(decoded.sequence, 5);
        assert_eq!(decoded.payload, vec![12]);
    }

    #[test]
    fn ack_requested_by_header_alone() {
        assert_eq!(ack_request(&[4, 5, 0x0e, 0, 5, 1, 0, 50, 0]), Some(5));
        assert_eq!(ack_request(&[4, 9]), Some(9));
        assert_eq!(ack_request(&[2, 5, 0x0f, 0, 5, 1, 0, 50]), None);
        assert_eq!(ack_request(&[4]), None);
    }

    #[test]
    fn decode_truncated() {
        assert_eq!(
            decode(&[]),
            Err(DecodeError::Truncated {
                needed: ACK_LEN,
                actual: 0
            })
        );
        assert_eq!(
            decode(&[1, 3]),
            Err(DecodeError::Truncated {
                needed: ACK_LEN,
                actual: 2
            })
        );
        assert_eq!(
            decode(&[2, 1, 0x0f, 0, 5]),
            Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                actual: 5
            })
        );
    }

    #[test]
    fn decode_invalid_frame_type() {
        assert_eq!(
            decode(&[9, 0, 0x0f, 0, 5, 1, 0]),
            Err(DecodeError::InvalidFrameType(9))
        );
    }

    #[test]
    fn decode_unknown_kind_keeps_payload() {
        let bytes = [2, 5, 0x0f, 2, 99, 3, 0, 0xaa, 0xbb];
        match decode(&bytes) {
            Err(DecodeError::UnknownKind(raw)) => {
                assert_eq!(raw.sequence, 5);
                assert_eq!(raw.command, Some(CommandId::new(2, 99, 3)));
                assert_eq!(raw.payload, vec![0xaa, 0xbb]);
            }
            other => panic!("Unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn decode_unknown_channel() {
        assert!(matches!(
            decode(&[2, 5, 0x42, 0, 5, 1, 0, 50]),
            Err(DecodeError::UnknownKind(_))
        ));
    }

    #[test]
    fn decode_length_mismatch() {
        // Battery state carries a single byte
        assert_eq!(
            decode(&[2, 5, 0x0f, 0, 5, 1, 0, 50, 0]),
            Err(DecodeError::LengthMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn channel_ids_round_trip() {
        for channel in Channel::OUTBOUND.iter().chain(Channel::INBOUND.iter()) {
            assert_eq!(Channel::from_id(channel.id()), Some(*channel));
        }
        assert_eq!(Channel::from_id(0x00), None);
    }
}

use crate::commands::{self, ClawState, GunState, ReportedFlyingState};
use crate::error::{DecodeError, ProtocolWarning};
use crate::frame::{self, Channel, NotificationFrame, NotificationKind, RawFrame};
use std::time::Instant;

/// Orientation in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    pub fn from_quaternion(w: f32, x: f32, y: f32, z: f32) -> Self {
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).max(-1.0).min(1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Attitude { roll, pitch, yaw }
    }
}

/// Speed in m/s
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Speed {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Last known sensor values of the aircraft
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub battery_percent: u8,
    pub attitude: Attitude,
    pub speed: Speed,
    /// Altitude in meters
    pub altitude: f32,
    pub reported_state: Option<ReportedFlyingState>,
    /// Id of the claw plugged in the USB port, used to address its commands
    pub claw_id: u8,
    pub claw_state: Option<ClawState>,
    pub gun_id: u8,
    pub gun_state: Option<GunState>,
    /// `None` until the first telemetry frame arrives
    pub updated_at: Option<Instant>,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        SensorSnapshot {
            battery_percent: 100,
            attitude: Attitude::default(),
            speed: Speed::default(),
            altitude: 0.0,
            reported_state: None,
            claw_id: 0,
            claw_state: None,
            gun_id: 0,
            gun_state: None,
            updated_at: None,
        }
    }
}

impl SensorSnapshot {
    pub fn apply(&mut self, telemetry: &Telemetry, now: Instant) {
        match *telemetry {
            Telemetry::Battery(percent) => self.battery_percent = percent,
            Telemetry::FlyingState(state) => self.reported_state = Some(state),
            Telemetry::Speed(speed) => self.speed = speed,
            Telemetry::Altitude(altitude) => self.altitude = altitude,
            Telemetry::Attitude(attitude) => self.attitude = attitude,
            Telemetry::Claw { id, state } => {
                self.claw_id = id;
                self.claw_state = Some(state);
            }
            Telemetry::Gun { id, state } => {
                self.gun_id = id;
                self.gun_state = Some(state);
            }
        }
        self.updated_at = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Battery(u8),
    FlyingState(ReportedFlyingState),
    Speed(Speed),
    Altitude(f32),
    Attitude(Attitude),
    Claw { id: u8, state: ClawState },
    Gun { id: u8, state: GunState },
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Ack { channel: Channel, sequence: u8 },
    Telemetry { frame: NotificationFrame, telemetry: Telemetry },
    /// Well-formed frame without a telemetry meaning, forwarded as is
    Event(RawFrame),
}

fn u32_at(payload: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

fn f32_at(payload: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Interpret the payload of a sensor frame. The codec has already checked its length.
fn parse_telemetry(frame: &NotificationFrame) -> Option<Telemetry> {
    let payload = &frame.payload;
    let telemetry = match frame.command? {
        commands::BATTERY_STATE_CHANGED => Telemetry::Battery(payload[0]),
        commands::FLYING_STATE_CHANGED => {
            Telemetry::FlyingState(ReportedFlyingState::from_u32(u32_at(payload, 0))?)
        }
        commands::DRONE_SPEED => Telemetry::Speed(Speed {
            x: f32_at(payload, 0),
            y: f32_at(payload, 4),
            z: f32_at(payload, 8),
        }),
        commands::DRONE_ALTITUDE => Telemetry::Altitude(f32_at(payload, 0)),
        commands::DRONE_QUATERNION => Telemetry::Attitude(Attitude::from_quaternion(
            f32_at(payload, 0),
            f32_at(payload, 4),
            f32_at(payload, 8),
            f32_at(payload, 12),
        )),
        commands::CLAW_STATE => Telemetry::Claw {
            id: payload[0],
            state: ClawState::from_u32(u32_at(payload, 1))?,
        },
        commands::GUN_STATE => Telemetry::Gun {
            id: payload[0],
            state: GunState::from_u32(u32_at(payload, 1))?,
        },
        _ => return None,
    };
    Some(telemetry)
}

/// Classify bytes received on `channel`.
///
/// Frames that are not in the command table are still returned as
/// [Notification::Event] so unknown telemetry never stops the pipeline.
/// Anything that cannot be parsed at all is a [ProtocolWarning].
pub fn classify(channel: Channel, bytes: &[u8]) -> Result<Notification, ProtocolWarning> {
    let frame = match frame::decode(bytes) {
        Ok(frame) => frame,
        Err(DecodeError::UnknownKind(raw)) => return Ok(Notification::Event(raw)),
        Err(error) => {
            return Err(ProtocolWarning {
                channel,
                bytes: hex::encode(bytes),
                error,
            })
        }
    };

    let notification = match frame.kind {
        NotificationKind::Ack => match (channel.acknowledged(), frame.payload.first()) {
            (Some(acked), Some(sequence)) => Notification::Ack {
                channel: acked,
                sequence: *sequence,
            },
            // Acks only travel on the ack channels
            _ => Notification::Event(frame.into()),
        },
        NotificationKind::SensorUpdate => match parse_telemetry(&frame) {
            Some(telemetry) => Notification::Telemetry { frame, telemetry },
            None => Notification::Event(frame.into()),
        },
        NotificationKind::Event => Notification::Event(frame.into()),
    };

    Ok(notification)
}

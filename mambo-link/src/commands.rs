//! # Minidrone command table
//!
//! Every command and notification is named by a (project, class, command) triple.
//! Project 0 is the set shared by all the vendor's products, project 2 is the
//! minidrone specific set.
//!
//! The table below records, for each known triple, the exact size of its
//! argument list. There is no length field on the wire so this size is what
//! decoding checks received payloads against.

use crate::frame::{CommandId, NotificationKind};

const COMMON: u8 = 0;
const MINIDRONE: u8 = 2;

// Minidrone classes
const PILOTING: u8 = 0;
const PILOTING_STATE: u8 = 3;
const ANIMATIONS: u8 = 4;
const USB_ACCESSORY_STATE: u8 = 15;
const USB_ACCESSORY: u8 = 16;
const NAVIGATION_DATA_STATE: u8 = 18;

// Common classes
const COMMON_COMMANDS: u8 = 4;
const COMMON_STATE: u8 = 5;

pub const FLAT_TRIM: CommandId = CommandId::new(MINIDRONE, PILOTING, 0);
pub const TAKE_OFF: CommandId = CommandId::new(MINIDRONE, PILOTING, 1);
pub const PCMD: CommandId = CommandId::new(MINIDRONE, PILOTING, 2);
pub const LANDING: CommandId = CommandId::new(MINIDRONE, PILOTING, 3);
pub const EMERGENCY: CommandId = CommandId::new(MINIDRONE, PILOTING, 4);
pub const AUTO_TAKE_OFF_MODE: CommandId = CommandId::new(MINIDRONE, PILOTING, 5);
pub const FLIP: CommandId = CommandId::new(MINIDRONE, ANIMATIONS, 0);
pub const CAP: CommandId = CommandId::new(MINIDRONE, ANIMATIONS, 1);
pub const ALL_STATES: CommandId = CommandId::new(COMMON, COMMON_COMMANDS, 0);
pub const CLAW_CONTROL: CommandId = CommandId::new(MINIDRONE, USB_ACCESSORY, 1);
pub const GUN_CONTROL: CommandId = CommandId::new(MINIDRONE, USB_ACCESSORY, 2);

pub const BATTERY_STATE_CHANGED: CommandId = CommandId::new(COMMON, COMMON_STATE, 1);
pub const FLYING_STATE_CHANGED: CommandId = CommandId::new(MINIDRONE, PILOTING_STATE, 1);
pub const DRONE_SPEED: CommandId = CommandId::new(MINIDRONE, NAVIGATION_DATA_STATE, 1);
pub const DRONE_ALTITUDE: CommandId = CommandId::new(MINIDRONE, NAVIGATION_DATA_STATE, 2);
pub const DRONE_QUATERNION: CommandId = CommandId::new(MINIDRONE, NAVIGATION_DATA_STATE, 3);
pub const CLAW_STATE: CommandId = CommandId::new(MINIDRONE, USB_ACCESSORY_STATE, 1);
pub const GUN_STATE: CommandId = CommandId::new(MINIDRONE, USB_ACCESSORY_STATE, 2);

pub const PCMD_LEN: usize = 9;
/// Accessory id and a u32 action
pub const ACCESSORY_CONTROL_LEN: usize = 5;
/// Accessory id, a u32 state and the list flags
pub const ACCESSORY_STATE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub payload_len: usize,
    pub kind: NotificationKind,
}

const TABLE: [(CommandId, CommandInfo); 18] = [
    (FLAT_TRIM, info("FlatTrim", 0, NotificationKind::Event)),
    (TAKE_OFF, info("TakeOff", 0, NotificationKind::Event)),
    (PCMD, info("PCMD", PCMD_LEN, NotificationKind::Event)),
    (LANDING, info("Landing", 0, NotificationKind::Event)),
    (EMERGENCY, info("Emergency", 0, NotificationKind::Event)),
    (AUTO_TAKE_OFF_MODE, info("AutoTakeOffMode", 1, NotificationKind::Event)),
    (FLIP, info("Flip", 4, NotificationKind::Event)),
    (CAP, info("Cap", 2, NotificationKind::Event)),
    (ALL_STATES, info("AllStates", 0, NotificationKind::Event)),
    (CLAW_CONTROL, info("ClawControl", ACCESSORY_CONTROL_LEN, NotificationKind::Event)),
    (GUN_CONTROL, info("GunControl", ACCESSORY_CONTROL_LEN, NotificationKind::Event)),
    (BATTERY_STATE_CHANGED, info("BatteryStateChanged", 1, NotificationKind::SensorUpdate)),
    (FLYING_STATE_CHANGED, info("FlyingStateChanged", 4, NotificationKind::SensorUpdate)),
    (DRONE_SPEED, info("DroneSpeed", 14, NotificationKind::SensorUpdate)),
    (DRONE_ALTITUDE, info("DroneAltitude", 6, NotificationKind::SensorUpdate)),
    (DRONE_QUATERNION, info("DroneQuaternion", 18, NotificationKind::SensorUpdate)),
    (CLAW_STATE, info("ClawState", ACCESSORY_STATE_LEN, NotificationKind::SensorUpdate)),
    (GUN_STATE, info("GunState", ACCESSORY_STATE_LEN, NotificationKind::SensorUpdate)),
];

const fn info(name: &'static str, payload_len: usize, kind: NotificationKind) -> CommandInfo {
    CommandInfo {
        name,
        payload_len,
        kind,
    }
}

pub fn lookup(id: CommandId) -> Option<&'static CommandInfo> {
    TABLE
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, info)| info)
}

/// Roll, pitch, yaw and vertical (gaz) setpoint, each in percent of the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Piloting {
    pub roll: i8,
    pub pitch: i8,
    pub yaw: i8,
    pub gaz: i8,
}

impl Piloting {
    /// Values outside [-100, 100] are clipped
    pub fn new(roll: i8, pitch: i8, yaw: i8, gaz: i8) -> Self {
        Piloting {
            roll: roll.clamp(-100, 100),
            pitch: pitch.clamp(-100, 100),
            yaw: yaw.clamp(-100, 100),
            gaz: gaz.clamp(-100, 100),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Piloting::default()
    }

    /// PCMD arguments: flag, roll, pitch, yaw, gaz and a millisecond timestamp.
    /// The flag tells the aircraft to apply roll and pitch, it is cleared for a neutral setpoint.
    pub fn payload(&self, timestamp: u32) -> Vec<u8> {
        let mut payload = Vec::with_capacity(PCMD_LEN);
        payload.push(if self.is_neutral() { 0 } else { 1 });
        payload.push(self.roll as u8);
        payload.push(self.pitch as u8);
        payload.push(self.yaw as u8);
        payload.push(self.gaz as u8);
        payload.extend_from_slice(&timestamp.to_le_bytes());
        payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Front,
    Back,
    Right,
    Left,
}

impl FlipDirection {
    pub fn payload(self) -> Vec<u8> {
        let value: u32 = match self {
            FlipDirection::Front => 0,
            FlipDirection::Back => 1,
            FlipDirection::Right => 2,
            FlipDirection::Left => 3,
        };
        value.to_le_bytes().to_vec()
    }
}

/// Heading change argument of the Cap command, clipped to [-180, 180]
pub fn cap_payload(degrees: i16) -> Vec<u8> {
    degrees.clamp(-180, 180).to_le_bytes().to_vec()
}

/// Action requested from an accessory plugged in the USB port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryAction {
    OpenClaw,
    CloseClaw,
    FireGun,
}

impl AccessoryAction {
    pub fn command(self) -> CommandId {
        match self {
            AccessoryAction::OpenClaw | AccessoryAction::CloseClaw => CLAW_CONTROL,
            AccessoryAction::FireGun => GUN_CONTROL,
        }
    }

    /// Accessory id followed by the action as a u32 enum
    pub fn payload(self, id: u8) -> Vec<u8> {
        let action: u32 = match self {
            AccessoryAction::OpenClaw => 0,
            AccessoryAction::CloseClaw => 1,
            AccessoryAction::FireGun => 0,
        };
        let mut payload = Vec::with_capacity(ACCESSORY_CONTROL_LEN);
        payload.push(id);
        payload.extend_from_slice(&action.to_le_bytes());
        payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClawState {
    Opened,
    Opening,
    Closed,
    Closing,
}

impl ClawState {
    pub fn from_u32(value: u32) -> Option<Self> {
        let state = match value {
            0 => ClawState::Opened,
            1 => ClawState::Opening,
            2 => ClawState::Closed,
            3 => ClawState::Closing,
            _ => return None,
        };
        Some(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GunState {
    Ready,
    Busy,
}

impl GunState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(GunState::Ready),
            1 => Some(GunState::Busy),
            _ => None,
        }
    }
}

/// Flying state as reported by the aircraft in FlyingStateChanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedFlyingState {
    Landed,
    TakingOff,
    Hovering,
    Flying,
    Landing,
    Emergency,
    Rolling,
    Init,
}

impl ReportedFlyingState {
    pub fn from_u32(value: u32) -> Option<Self> {
        let state = match value {
            0 => ReportedFlyingState::Landed,
            1 => ReportedFlyingState::TakingOff,
            2 => ReportedFlyingState::Hovering,
            3 => ReportedFlyingState::Flying,
            4 => ReportedFlyingState::Landing,
            5 => ReportedFlyingState::Emergency,
            6 => ReportedFlyingState::Rolling,
            7 => ReportedFlyingState::Init,
            _ => return None,
        };
        Some(state)
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piloting_is_clipped() {
        let piloting = Piloting::new(-128, 127, 100, -100);
        assert_eq!(piloting, Piloting::new(-100, 100, 100, -100));
    }

    #[test]
    fn neutral_pcmd_clears_flag() {
        assert_eq!(Piloting::default().payload(0)[0], 0);
        assert_eq!(Piloting::new(0, 1, 0, 0).payload(0)[0], 1);
        assert_eq!(Piloting::default().payload(0).len(), PCMD_LEN);
    }

    #[test]
    fn flip_is_a_u32_enum() {
        assert_eq!(FlipDirection::Left.payload(), vec![3, 0, 0, 0]);
    }

    #[test]
    fn cap_is_clipped() {
        assert_eq!(cap_payload(400), 180i16.to_le_bytes().to_vec());
        assert_eq!(cap_payload(-90), (-90i16).to_le_bytes().to_vec());
    }

    #[test]
    fn accessory_payloads() {
        assert_eq!(AccessoryAction::OpenClaw.payload(3), vec![3, 0, 0, 0, 0]);
        assert_eq!(AccessoryAction::CloseClaw.payload(3), vec![3, 1, 0, 0, 0]);
        assert_eq!(AccessoryAction::FireGun.payload(1), vec![1, 0, 0, 0, 0]);
        assert_eq!(AccessoryAction::FireGun.command(), GUN_CONTROL);
        assert_eq!(
            lookup(CLAW_CONTROL).map(|i| i.payload_len),
            Some(ACCESSORY_CONTROL_LEN)
        );
        assert_eq!(ClawState::from_u32(2), Some(ClawState::Closed));
        assert_eq!(GunState::from_u32(2), None);
    }

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(lookup(TAKE_OFF).map(|i| i.name), Some("TakeOff"));
        assert_eq!(
            lookup(BATTERY_STATE_CHANGED).map(|i| i.kind),
            Some(NotificationKind::SensorUpdate)
        );
        assert!(lookup(CommandId::new(2, 99, 0)).is_none());
    }
}

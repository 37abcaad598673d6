//! # Flight state machine
//!
//! Holds the aircraft state as known by the controller and decides which
//! intents may be sent. Issued commands move the machine into transient
//! states (taking off, landing, flying); telemetry from the aircraft confirms
//! or overrides them.
//!
//! ```text
//! Disconnected -> Landed <-> TakingOff -> Hovering <-> Flying -> Landing -> Landed
//! ```
//!
//! Emergency is reachable from every connected state and is left only through
//! [FlightStateMachine::acknowledge_emergency].

use crate::commands::{self, AccessoryAction, FlipDirection, Piloting, ReportedFlyingState};
use crate::error::{CommandFailed, Error, Result};
use crate::frame::{Channel, CommandId};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Disconnected,
    Landed,
    TakingOff,
    Hovering,
    Flying,
    Landing,
    Emergency,
}

/// High level request issued by the controlling program
#[derive(Debug, Clone, PartialEq)]
pub enum FlightIntent {
    TakeOff,
    Land,
    EmergencyStop,
    Move { piloting: Piloting, duration: Duration },
    /// Piloting setpoint written without ack, used to keep a move going and to stop it
    Pilot(Piloting),
    Flip(FlipDirection),
    TurnDegrees(i16),
    FlatTrim,
    SetAutoTakeOff(bool),
    RequestAllStates,
    /// Drive the accessory with the given id
    Accessory { action: AccessoryAction, id: u8 },
}

impl FlightIntent {
    pub fn channel(&self) -> Channel {
        match self {
            FlightIntent::EmergencyStop => Channel::Emergency,
            FlightIntent::Pilot(_) => Channel::Piloting,
            _ => Channel::Command,
        }
    }

    pub fn command(&self) -> CommandId {
        match self {
            FlightIntent::TakeOff => commands::TAKE_OFF,
            FlightIntent::Land => commands::LANDING,
            FlightIntent::EmergencyStop => commands::EMERGENCY,
            FlightIntent::Move { .. } | FlightIntent::Pilot(_) => commands::PCMD,
            FlightIntent::Flip(_) => commands::FLIP,
            FlightIntent::TurnDegrees(_) => commands::CAP,
            FlightIntent::FlatTrim => commands::FLAT_TRIM,
            FlightIntent::SetAutoTakeOff(_) => commands::AUTO_TAKE_OFF_MODE,
            FlightIntent::RequestAllStates => commands::ALL_STATES,
            FlightIntent::Accessory { action, .. } => action.command(),
        }
    }

    /// Command arguments. `timestamp` is only used by piloting setpoints.
    pub fn payload(&self, timestamp: u32) -> Vec<u8> {
        match self {
            FlightIntent::Move { piloting, .. } => piloting.payload(timestamp),
            FlightIntent::Pilot(piloting) => piloting.payload(timestamp),
            FlightIntent::Flip(direction) => direction.payload(),
            FlightIntent::TurnDegrees(degrees) => commands::cap_payload(*degrees),
            FlightIntent::SetAutoTakeOff(enabled) => vec![*enabled as u8],
            FlightIntent::Accessory { action, id } => action.payload(*id),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlightState,
    pub to: FlightState,
}

/// State to restore if a command fails while the machine is still in the state it entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollback {
    pub entered: FlightState,
    pub prior: FlightState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Already satisfied, nothing is sent
    Satisfied,
    Send { rollback: Option<Rollback> },
}

#[derive(Debug)]
pub struct FlightStateMachine {
    state: FlightState,
}

impl Default for FlightStateMachine {
    fn default() -> Self {
        FlightStateMachine {
            state: FlightState::Disconnected,
        }
    }
}

impl FlightStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    fn set(&mut self, to: FlightState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        Some(Transition { from, to })
    }

    pub fn connect(&mut self) -> Option<Transition> {
        if self.state == FlightState::Disconnected {
            self.set(FlightState::Landed)
        } else {
            None
        }
    }

    pub fn disconnect(&mut self) -> Option<Transition> {
        self.set(FlightState::Disconnected)
    }

    /// Validate `intent` against the current state and enter its transient state
    pub fn request(&mut self, intent: &FlightIntent) -> Result<(Admission, Option<Transition>)> {
        use FlightState::*;

        let state = self.state;
        if state == Disconnected {
            return Err(Error::Disconnected("not connected".to_owned()));
        }

        let target = match (intent, state) {
            (FlightIntent::EmergencyStop, _) => {
                return Ok((Admission::Send { rollback: None }, self.set(Emergency)));
            }
            (FlightIntent::Land, Landed) => return Ok((Admission::Satisfied, None)),
            (FlightIntent::TakeOff, Landed) => Some(TakingOff),
            (FlightIntent::Land, Hovering) | (FlightIntent::Land, Flying) => Some(Landing),
            (FlightIntent::Move { .. }, Hovering) | (FlightIntent::Move { .. }, Flying) => {
                Some(Flying)
            }
            (FlightIntent::Pilot(_), Hovering)
            | (FlightIntent::Pilot(_), Flying)
            | (FlightIntent::Flip(_), Hovering)
            | (FlightIntent::Flip(_), Flying)
            | (FlightIntent::TurnDegrees(_), Hovering)
            | (FlightIntent::TurnDegrees(_), Flying) => None,
            (FlightIntent::FlatTrim, s) | (FlightIntent::Accessory { .. }, s) if s != Emergency => None,
            (FlightIntent::SetAutoTakeOff(_), _) | (FlightIntent::RequestAllStates, _) => None,
            _ => {
                return Err(CommandFailed::IllegalState {
                    intent: intent.clone(),
                    state,
                }
                .into())
            }
        };

        match target {
            Some(entered) => {
                let rollback = Rollback {
                    entered,
                    prior: state,
                };
                let transition = self.set(entered);
                Ok((
                    Admission::Send {
                        rollback: Some(rollback),
                    },
                    transition,
                ))
            }
            None => Ok((Admission::Send { rollback: None }, None)),
        }
    }

    /// Undo the transient state of a failed command, unless something else moved the machine since
    pub fn rollback(&mut self, rollback: Rollback) -> Option<Transition> {
        if self.state == rollback.entered {
            self.set(rollback.prior)
        } else {
            None
        }
    }

    /// Apply the flying state reported by the aircraft. Emergency is only left
    /// through an explicit acknowledgement.
    pub fn apply_reported(&mut self, reported: ReportedFlyingState) -> Option<Transition> {
        if matches!(self.state, FlightState::Disconnected | FlightState::Emergency) {
            return None;
        }

        let to = match reported {
            ReportedFlyingState::Landed => FlightState::Landed,
            ReportedFlyingState::TakingOff => FlightState::TakingOff,
            ReportedFlyingState::Hovering => FlightState::Hovering,
            ReportedFlyingState::Flying => FlightState::Flying,
            ReportedFlyingState::Landing => FlightState::Landing,
            ReportedFlyingState::Emergency => FlightState::Emergency,
            ReportedFlyingState::Rolling | ReportedFlyingState::Init => return None,
        };
        self.set(to)
    }

    pub fn acknowledge_emergency(&mut self) -> Result<Option<Transition>> {
        match self.state {
            FlightState::Emergency => Ok(self.set(FlightState::Landed)),
            FlightState::Disconnected => Err(Error::Disconnected("not connected".to_owned())),
            state => Err(CommandFailed::IllegalState {
                intent: FlightIntent::EmergencyStop,
                state,
            }
            .into()),
        }
    }
}

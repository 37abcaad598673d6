//! # Mambo Link
//!
//! This Crate implements the command protocol of BLE minidrones of the Mambo family.
//! It turns flight intents into framed commands, tracks their acknowledgement,
//! retransmits them when needed and decodes the telemetry sent back by the aircraft.
//!
//! The entry point to this Crate is [Minidrone]. It drives a radio transport
//! through the [LinkGateway] trait: scanning, pairing and characteristic
//! discovery happen before the gateway is handed to the engine.
//!
//! Since this crate spawns async tasks, it needs to know about what async executor to use.
//! The [async_executors] crate is used to support the common async executors and should be
//! passed to [Minidrone::connect].
//!
//! Example:
//!
//! ``` no_run
//! # use std::error::Error;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # async fn test(gateway: Arc<dyn mambo_link::LinkGateway + Send + Sync>) -> Result<(), Box<dyn Error>> {
//! let config = mambo_link::EngineConfig::from_query("ack_timeout=150&retries=3")?;
//! let drone = mambo_link::Minidrone::connect(async_executors::AsyncStd, gateway, config).await?;
//!
//! drone.take_off_confirmed(Duration::from_secs(5)).await?;
//! drone.move_by(0, 20, 0, 0, Duration::from_secs(1)).await?;
//! drone.land().await?;
//!
//! println!("Battery: {}%", drone.sensors().battery_percent);
//! # Ok(())
//! # }
//! ```
//!
//! [async_executors]: https://crates.io/crates/async_executors

#[macro_use]
extern crate bitflags;

pub mod commands;
mod config;
mod error;
mod flight;
mod frame;
mod gateway;
mod minidrone;
mod notification;
mod sequence;
mod tracker;

pub use commands::{AccessoryAction, ClawState, FlipDirection, GunState, Piloting, ReportedFlyingState};
pub use config::{EngineConfig, EngineFlags};
pub use error::{CommandFailed, DecodeError, EncodeError, Error, LinkError, ProtocolWarning, Result};
pub use flight::{FlightIntent, FlightState, Transition};
pub use frame::{
    ack_request, decode, encode, encode_ack, Channel, CommandFrame, CommandId, FrameType, NotificationFrame, NotificationKind,
    RawFrame,
};
pub use gateway::{Inbound, LinkGateway};
pub use minidrone::{CommandHandle, Event, Minidrone};
pub use notification::{classify, Attitude, Notification, SensorSnapshot, Speed, Telemetry};

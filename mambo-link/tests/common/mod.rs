#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::lock::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use mambo_link::{
    encode_ack, Channel, CommandId, Event, FlightState, Inbound, LinkError, LinkGateway, ReportedFlyingState,
};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In memory transport recording every write
pub struct MockGateway {
    sinks: Mutex<Vec<(Channel, flume::Sender<Inbound>)>>,
    writes: Mutex<Vec<(Channel, Vec<u8>)>>,
    auto_ack: AtomicBool,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    disconnected: AtomicBool,
    /// Last sequence of the acks sent by the aircraft
    ack_sequence: AtomicU8,
    // Command channel writes wait on this lock
    gate: AsyncMutex<()>,
    entered_tx: flume::Sender<()>,
    entered_rx: flume::Receiver<()>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        let (entered_tx, entered_rx) = flume::unbounded();
        Arc::new(MockGateway {
            sinks: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            auto_ack: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            ack_sequence: AtomicU8::new(0),
            gate: AsyncMutex::new(()),
            entered_tx,
            entered_rx,
        })
    }

    /// Answer every Command and Emergency write with an ack
    pub fn set_auto_ack(&self, enabled: bool) {
        self.auto_ack.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, enabled: bool) {
        self.fail_subscribe.store(enabled, Ordering::SeqCst);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Block Command channel writes until the guard is dropped
    pub async fn hold_commands(&self) -> AsyncMutexGuard<'_, ()> {
        while self.entered_rx.try_recv().is_ok() {}
        self.gate.lock().await
    }

    /// Resolves once a Command channel write has started
    pub async fn command_write_started(&self) {
        let _ = self.entered_rx.recv_async().await;
    }

    pub fn writes(&self) -> Vec<(Channel, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Writes on `channel` only
    pub fn writes_on(&self, channel: Channel) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|(written, _)| *written == channel)
            .map(|(_, bytes)| bytes)
            .collect()
    }

    /// Writes of command frames, ack frames excluded
    pub fn commands(&self) -> Vec<(Channel, CommandId)> {
        self.writes()
            .iter()
            .filter(|(channel, _)| *channel != Channel::Ack)
            .map(|(channel, bytes)| (*channel, command_of(bytes)))
            .collect()
    }

    /// Push bytes to the engine as if received on `channel`
    pub fn inject(&self, channel: Channel, bytes: Vec<u8>) {
        for (subscribed, sink) in self.sinks.lock().unwrap().iter() {
            if *subscribed == channel {
                // The engine may already be gone
                let _ = sink.try_send(Inbound::new(channel, bytes.clone()));
            }
        }
    }

    /// Drop every sink, as a transport losing the aircraft would
    pub fn drop_sinks(&self) {
        self.sinks.lock().unwrap().clear();
    }
}

#[async_trait]
impl LinkGateway for MockGateway {
    async fn write(&self, channel: Channel, bytes: Vec<u8>) -> Result<(), LinkError> {
        if channel == Channel::Command {
            let _ = self.entered_tx.send(());
            let _gate = self.gate.lock().await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LinkError::WriteFailed {
                channel,
                reason: "radio unplugged".to_owned(),
            });
        }

        self.writes.lock().unwrap().push((channel, bytes.clone()));

        if self.auto_ack.load(Ordering::SeqCst) {
            let reply = match channel {
                Channel::Command => Some(Channel::CommandAck),
                Channel::Emergency => Some(Channel::EmergencyAck),
                _ => None,
            };
            if let Some(reply) = reply {
                let sequence = self.ack_sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
                self.inject(reply, encode_ack(sequence, bytes[1]));
            }
        }

        Ok(())
    }

    async fn subscribe(&self, channel: Channel, sink: flume::Sender<Inbound>) -> Result<(), LinkError> {
        if self.fail_subscribe.load(Ordering::SeqCst) && channel == Channel::CommandAck {
            return Err(LinkError::SubscribeFailed {
                channel,
                reason: "characteristic not found".to_owned(),
            });
        }
        self.sinks.lock().unwrap().push((channel, sink));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.drop_sinks();
    }
}

pub fn command_of(bytes: &[u8]) -> CommandId {
    CommandId::new(bytes[3], bytes[4], u16::from_le_bytes([bytes[5], bytes[6]]))
}

/// FlyingStateChanged notification. Frames sent with ack travel on the EventWithAck channel.
pub fn flying_state(sequence: u8, state: ReportedFlyingState, with_ack: bool) -> (Channel, Vec<u8>) {
    let (frame_type, channel) = if with_ack {
        (4, Channel::EventWithAck)
    } else {
        (2, Channel::Event)
    };
    telemetry(
        frame_type,
        channel,
        sequence,
        mambo_link::commands::FLYING_STATE_CHANGED,
        &state.to_u32().to_le_bytes(),
    )
}

pub fn battery(sequence: u8, percent: u8) -> (Channel, Vec<u8>) {
    telemetry(
        2,
        Channel::Event,
        sequence,
        mambo_link::commands::BATTERY_STATE_CHANGED,
        &[percent],
    )
}

pub fn claw_state(sequence: u8, id: u8, state: u32) -> (Channel, Vec<u8>) {
    let mut payload = vec![id];
    payload.extend_from_slice(&state.to_le_bytes());
    payload.push(0);
    telemetry(2, Channel::Event, sequence, mambo_link::commands::CLAW_STATE, &payload)
}

fn telemetry(frame_type: u8, channel: Channel, sequence: u8, command: CommandId, payload: &[u8]) -> (Channel, Vec<u8>) {
    let mut bytes = vec![frame_type, sequence, channel.id(), command.project, command.class];
    bytes.extend_from_slice(&command.command.to_le_bytes());
    bytes.extend_from_slice(payload);
    (channel, bytes)
}

/// Wait until a state change to `state` is received
pub async fn wait_for_state(events: &flume::Receiver<Event>, state: FlightState) -> anyhow::Result<()> {
    async_std::future::timeout(Duration::from_secs(2), next_state(events, state)).await?
}

async fn next_state(events: &flume::Receiver<Event>, state: FlightState) -> anyhow::Result<()> {
    loop {
        if let Event::StateChanged(transition) = events.recv_async().await? {
            if transition.to == state {
                return Ok(());
            }
        }
    }
}

/// Wait until the engine applied a flying state report
pub async fn wait_for_reported(events: &flume::Receiver<Event>, state: ReportedFlyingState) -> anyhow::Result<()> {
    async_std::future::timeout(Duration::from_secs(2), next_report(events, state)).await?
}

async fn next_report(events: &flume::Receiver<Event>, state: ReportedFlyingState) -> anyhow::Result<()> {
    loop {
        if let Event::Sensors(snapshot) = events.recv_async().await? {
            if snapshot.reported_state == Some(state) {
                return Ok(());
            }
        }
    }
}

/// Wait until the gateway recorded a write matching `predicate`
pub async fn wait_for_write<F>(gateway: &MockGateway, predicate: F) -> anyhow::Result<()>
where
    F: Fn(&(Channel, Vec<u8>)) -> bool,
{
    wait_for_writes(gateway, 1, predicate).await
}

/// Wait until the gateway recorded `count` writes matching `predicate`
pub async fn wait_for_writes<F>(gateway: &MockGateway, count: usize, predicate: F) -> anyhow::Result<()>
where
    F: Fn(&(Channel, Vec<u8>)) -> bool,
{
    async_std::future::timeout(Duration::from_secs(2), async {
        while gateway.writes().iter().filter(|write| predicate(*write)).count() < count {
            async_std::task::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

// Protocol engine: intents in, frames out, notifications back
use crate::commands::{AccessoryAction, FlipDirection, Piloting};
use crate::config::{EngineConfig, EngineFlags};
use crate::error::{CommandFailed, Error, ProtocolWarning, Result};
use crate::flight::{Admission, FlightIntent, FlightState, FlightStateMachine, Rollback, Transition};
use crate::frame::{self, Channel, CommandFrame, RawFrame};
use crate::gateway::{Inbound, LinkGateway};
use crate::notification::{self, Notification, SensorSnapshot, Telemetry};
use crate::sequence::SequenceAllocator;
use crate::tracker::{AckTracker, PendingCommand, Responder};
use futures::task::{Spawn, SpawnExt};
use futures::FutureExt;
use futures_channel::oneshot;
use futures_util::future::{self, Either};
use log::{debug, info, trace, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use wasm_timer::Delay;

/// Period at which confirmed take off and landing re-issue their command
const CONFIRM_RETRY: Duration = Duration::from_secs(1);

/// Notification delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged(Transition),
    Sensors(SensorSnapshot),
    /// Frame forwarded without interpretation
    Unhandled(RawFrame),
    Warning(ProtocolWarning),
}

/// Completion of a submitted intent
#[derive(Debug)]
pub struct CommandHandle {
    rx: oneshot::Receiver<Result<()>>,
}

impl CommandHandle {
    fn resolved(result: Result<()>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        CommandHandle { rx }
    }
}

impl Future for CommandHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Disconnected(
                "Command dropped by the engine".to_owned(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Intent accepted by the state machine and waiting for the writer task
struct Queued {
    intent: FlightIntent,
    rollback: Option<Rollback>,
    epoch: u64,
    responder: Responder,
}

impl Queued {
    fn fail(self, error: Error) -> Option<Rollback> {
        let _ = self.responder.send(Err(error));
        self.rollback
    }
}

/// Everything mutated by the engine, behind a single lock
struct Shared {
    sequences: SequenceAllocator,
    tracker: AckTracker,
    flight: FlightStateMachine,
    sensors: SensorSnapshot,
    subscribers: Vec<flume::Sender<Event>>,
    /// Incremented by every emergency stop, queued intents from an older epoch are discarded
    epoch: u64,
    disconnect_reason: Option<String>,
    /// Dropped on teardown, which stops the engine tasks
    shutdown: Option<flume::Sender<()>>,
}

impl Shared {
    fn emit(&mut self, event: Event) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn emit_transition(&mut self, transition: Option<Transition>) {
        if let Some(transition) = transition {
            debug!("Flight state {:?} -> {:?}", transition.from, transition.to);
            self.emit(Event::StateChanged(transition));
        }
    }

    fn rollback(&mut self, rollback: Option<Rollback>) {
        if let Some(rollback) = rollback {
            let transition = self.flight.rollback(rollback);
            self.emit_transition(transition);
        }
    }

    fn resolve(&mut self, command: PendingCommand, result: Result<()>) {
        let rollback = command.resolve(result);
        self.rollback(rollback);
    }

    fn disconnect_error(&self) -> Error {
        Error::Disconnected(
            self.disconnect_reason
                .clone()
                .unwrap_or_else(|| "not connected".to_owned()),
        )
    }

    fn handle_notification(&mut self, classified: std::result::Result<Notification, ProtocolWarning>) {
        let notification = match classified {
            Ok(notification) => notification,
            Err(warning) => {
                warn!("{}", warning);
                self.emit(Event::Warning(warning));
                return;
            }
        };

        match notification {
            Notification::Ack { channel, sequence } => {
                match self.tracker.acknowledge(channel, sequence) {
                    Some(command) => {
                        debug!("Ack for sequence {} on {:?}", sequence, channel);
                        self.resolve(command, Ok(()));
                    }
                    None => trace!("Ignoring unmatched ack {} on {:?}", sequence, channel),
                }
            }
            Notification::Telemetry { telemetry, .. } => {
                self.sensors.apply(&telemetry, Instant::now());
                if let Telemetry::FlyingState(reported) = telemetry {
                    let transition = self.flight.apply_reported(reported);
                    self.emit_transition(transition);
                }
                let snapshot = self.sensors.clone();
                self.emit(Event::Sensors(snapshot));
            }
            Notification::Event(raw) => {
                debug!("Unhandled frame {}", raw);
                self.emit(Event::Unhandled(raw));
            }
        }
    }
}

/// State shared between the [Minidrone] handle and the engine tasks
struct Engine {
    shared: Mutex<Shared>,
    gateway: Arc<dyn LinkGateway + Send + Sync>,
    config: EngineConfig,
    uplink: flume::Sender<Queued>,
    uplink_queue: flume::Receiver<Queued>,
    /// Emergency frames, written in order by their own task
    emergency: flume::Sender<(CommandFrame, Vec<u8>)>,
    emergency_queue: flume::Receiver<(CommandFrame, Vec<u8>)>,
    closed: flume::Receiver<()>,
    started: Instant,
}

impl Engine {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// PCMD timestamp: milliseconds since the session started
    fn timestamp(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Fail everything in flight and force the Disconnected state.
    /// Returns false if the session was already torn down.
    fn teardown(&self, reason: &str) -> bool {
        let mut shared = self.lock();
        if shared.shutdown.take().is_none() {
            return false;
        }

        info!("Disconnected: {}", reason);
        shared.disconnect_reason = Some(reason.to_owned());

        let error = Error::Disconnected(reason.to_owned());
        if !shared.tracker.is_empty() {
            debug!("Failing {} commands waiting for an ack", shared.tracker.len());
        }
        for command in shared.tracker.drain() {
            command.resolve(Err(error.clone()));
        }
        for queued in self.uplink_queue.try_iter() {
            queued.fail(error.clone());
        }

        shared.sequences.reset();
        let transition = shared.flight.disconnect();
        shared.emit_transition(transition);
        true
    }

    async fn handle_inbound(&self, inbound: Inbound) {
        trace!("<- {:?} {}", inbound.channel, hex::encode(&inbound.bytes));

        // Frames sent with ack are acknowledged even when their body cannot be decoded
        let requested = frame::ack_request(&inbound.bytes)
            .filter(|_| self.config.flags.contains(EngineFlags::ACK_DRONE_DATA));
        let classified = notification::classify(inbound.channel, &inbound.bytes);
        let ack = {
            let mut shared = self.lock();
            if shared.flight.state() == FlightState::Disconnected {
                return;
            }
            shared.handle_notification(classified);
            requested.map(|acked| frame::encode_ack(shared.sequences.next(Channel::Ack), acked))
        };

        if let Some(bytes) = ack {
            trace!("-> {:?} {}", Channel::Ack, hex::encode(&bytes));
            if let Err(e) = self.gateway.write(Channel::Ack, bytes).await {
                warn!("Cannot acknowledge aircraft data: {}", e);
            }
        }
    }

    /// Write a queued intent: allocate its sequence number, track it and hand it to the gateway
    async fn dispatch(&self, queued: Queued) {
        let (frame, bytes, unacked) = {
            let mut shared = self.lock();
            if shared.flight.state() == FlightState::Disconnected {
                let error = shared.disconnect_error();
                queued.fail(error);
                return;
            }
            if queued.epoch != shared.epoch {
                debug!("Discarding {:?} preempted by an emergency stop", queued.intent);
                let rollback = queued.fail(CommandFailed::Preempted.into());
                shared.rollback(rollback);
                return;
            }

            let channel = queued.intent.channel();
            let sequence = shared.sequences.next(channel);
            let built = CommandFrame::new(
                channel,
                sequence,
                queued.intent.command(),
                queued.intent.payload(self.timestamp()),
            );
            let frame = match built {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Cannot send {:?}: {}", queued.intent, e);
                    let rollback = queued.fail(e.into());
                    shared.rollback(rollback);
                    return;
                }
            };
            let bytes = frame::encode(&frame);

            if channel.expects_ack() {
                let pending = PendingCommand::new(
                    frame.clone(),
                    bytes.clone(),
                    Instant::now(),
                    queued.rollback,
                    queued.responder,
                );
                if let Some((displaced, error)) = shared.tracker.register(pending) {
                    shared.resolve(displaced, Err(error.into()));
                }
                (frame, bytes, None)
            } else {
                (frame, bytes, Some(queued))
            }
        };

        self.write(frame, bytes, unacked).await;
    }

    /// Hand a frame to the gateway. A write failure fails the command at once.
    async fn write(&self, frame: CommandFrame, bytes: Vec<u8>, unacked: Option<Queued>) {
        trace!("-> {} {}", frame, hex::encode(&bytes));

        let result = self.gateway.write(frame.channel(), bytes).await;

        match (result, unacked) {
            (Ok(()), Some(queued)) => {
                let _ = queued.responder.send(Ok(()));
            }
            (Ok(()), None) => {}
            (Err(e), unacked) => {
                warn!("Write of {} failed: {}", frame, e);
                let mut shared = self.lock();
                match unacked {
                    Some(queued) => {
                        let rollback = queued.fail(e.into());
                        shared.rollback(rollback);
                    }
                    None => {
                        if let Some(command) = shared.tracker.remove(frame.channel(), frame.sequence()) {
                            shared.resolve(command, Err(e.into()));
                        }
                    }
                }
            }
        }
    }

    /// Retransmit overdue commands and fail the ones out of retries
    async fn scan_timeouts(&self) {
        let retransmit = {
            let mut shared = self.lock();
            let scan = shared.tracker.poll_timeouts(Instant::now());
            for (command, error) in scan.expired {
                warn!("{}", error);
                shared.resolve(command, Err(error.into()));
            }
            scan.retransmit
        };

        for (channel, sequence, bytes) in retransmit {
            trace!("-> {:?} {} (retransmit)", channel, hex::encode(&bytes));
            if let Err(e) = self.gateway.write(channel, bytes).await {
                warn!("Retransmit of sequence {} on {:?} failed: {}", sequence, channel, e);
                let mut shared = self.lock();
                if let Some(command) = shared.tracker.remove(channel, sequence) {
                    shared.resolve(command, Err(e.into()));
                }
            }
        }
    }
}

async fn inbound_loop(engine: Arc<Engine>, inbound: flume::Receiver<Inbound>) {
    let closed = engine.closed.clone();
    loop {
        let next = {
            let recv = inbound.recv_async();
            let stop = closed.recv_async();
            futures_util::pin_mut!(recv, stop);
            match future::select(recv, stop).await {
                Either::Left((next, _)) => next,
                Either::Right(_) => break,
            }
        };

        match next {
            Ok(inbound) => engine.handle_inbound(inbound).await,
            Err(_) => {
                // Every sink handed to the transport is gone
                if engine.teardown("Link lost") {
                    engine.gateway.disconnect().await;
                }
                break;
            }
        }
    }
    debug!("Inbound task stopped");
}

async fn writer_loop(engine: Arc<Engine>) {
    let closed = engine.closed.clone();
    let uplink = engine.uplink_queue.clone();
    loop {
        let next = {
            let recv = uplink.recv_async();
            let stop = closed.recv_async();
            futures_util::pin_mut!(recv, stop);
            match future::select(recv, stop).await {
                Either::Left((Ok(queued), _)) => queued,
                Either::Left((Err(_), _)) | Either::Right(_) => break,
            }
        };
        engine.dispatch(next).await;
    }
    debug!("Writer task stopped");
}

async fn emergency_loop(engine: Arc<Engine>) {
    let closed = engine.closed.clone();
    let emergency = engine.emergency_queue.clone();
    loop {
        let (frame, bytes) = {
            let recv = emergency.recv_async();
            let stop = closed.recv_async();
            futures_util::pin_mut!(recv, stop);
            match future::select(recv, stop).await {
                Either::Left((Ok(next), _)) => next,
                Either::Left((Err(_), _)) | Either::Right(_) => break,
            }
        };
        engine.write(frame, bytes, None).await;
    }
    debug!("Emergency task stopped");
}

async fn timeout_loop(engine: Arc<Engine>) {
    let closed = engine.closed.clone();
    loop {
        let tick = Delay::new(engine.config.scan_interval);
        let stop = closed.recv_async();
        futures_util::pin_mut!(tick, stop);
        if let Either::Right(_) = future::select(tick, stop).await {
            break;
        }
        engine.scan_timeouts().await;
    }
    debug!("Timeout task stopped");
}

/// Session with one aircraft
///
/// All intents take `&self`, the object can be shared between tasks with an `Arc`.
/// Dropping it closes the session.
pub struct Minidrone {
    engine: Arc<Engine>,
    spawner: Arc<dyn Spawn + Send + Sync>,
}

impl Minidrone {
    /// Start a session on an already connected gateway
    ///
    /// Subscribes to every inbound channel and spawns the engine tasks on `executor`,
    /// any [async_executors] executor can be used. The aircraft is assumed to be on the ground.
    ///
    /// [async_executors]: https://crates.io/crates/async_executors
    pub async fn connect<E>(
        executor: E,
        gateway: Arc<dyn LinkGateway + Send + Sync>,
        config: EngineConfig,
    ) -> Result<Minidrone>
    where
        E: Spawn + Send + Sync + 'static,
    {
        config.validate()?;

        let (inbound_tx, inbound_rx) = flume::bounded(config.inbound_capacity);
        for channel in Channel::INBOUND.iter() {
            if let Err(e) = gateway.subscribe(*channel, inbound_tx.clone()).await {
                warn!("Cannot subscribe to {:?}: {}", channel, e);
                gateway.disconnect().await;
                return Err(e.into());
            }
        }
        drop(inbound_tx);

        let (shutdown_tx, shutdown_rx) = flume::bounded(0);
        let (uplink_tx, uplink_rx) = flume::bounded(config.uplink_capacity);
        let (emergency_tx, emergency_rx) = flume::unbounded();

        let mut flight = FlightStateMachine::new();
        flight.connect();

        let engine = Arc::new(Engine {
            shared: Mutex::new(Shared {
                sequences: SequenceAllocator::new(),
                tracker: AckTracker::new(config.ack_timeout, config.max_retries),
                flight,
                sensors: SensorSnapshot::default(),
                subscribers: Vec::new(),
                epoch: 0,
                disconnect_reason: None,
                shutdown: Some(shutdown_tx),
            }),
            gateway,
            config,
            uplink: uplink_tx,
            uplink_queue: uplink_rx,
            emergency: emergency_tx,
            emergency_queue: emergency_rx,
            closed: shutdown_rx,
            started: Instant::now(),
        });

        let spawned = executor
            .spawn(inbound_loop(engine.clone(), inbound_rx))
            .and_then(|_| executor.spawn(writer_loop(engine.clone())))
            .and_then(|_| executor.spawn(emergency_loop(engine.clone())))
            .and_then(|_| executor.spawn(timeout_loop(engine.clone())));

        if let Err(e) = spawned {
            engine.teardown("Cannot start engine tasks");
            engine.gateway.disconnect().await;
            return Err(e.into());
        }

        info!("Connected to minidrone");

        Ok(Minidrone {
            engine,
            spawner: Arc::new(executor),
        })
    }

    /// Validate an intent and queue it for sending
    ///
    /// Illegal intents fail here and never reach the radio. The returned handle
    /// resolves once the aircraft acknowledged the command, or with the reason
    /// it failed.
    pub fn submit(&self, intent: FlightIntent) -> Result<CommandHandle> {
        if intent == FlightIntent::EmergencyStop {
            return self.submit_emergency();
        }

        let mut shared = self.engine.lock();
        let (admission, transition) = shared.flight.request(&intent)?;
        shared.emit_transition(transition);

        let rollback = match admission {
            Admission::Satisfied => return Ok(CommandHandle::resolved(Ok(()))),
            Admission::Send { rollback } => rollback,
        };

        let (tx, rx) = oneshot::channel();
        let queued = Queued {
            intent,
            rollback,
            epoch: shared.epoch,
            responder: tx,
        };

        match self.engine.uplink.try_send(queued) {
            Ok(()) => Ok(CommandHandle { rx }),
            Err(flume::TrySendError::Full(queued)) | Err(flume::TrySendError::Disconnected(queued)) => {
                shared.rollback(queued.rollback);
                Err(Error::QueueFull)
            }
        }
    }

    /// Emergency stop skips the queue: queued commands are discarded and the
    /// frame goes to the emergency writer at once
    fn submit_emergency(&self) -> Result<CommandHandle> {
        let (tx, rx) = oneshot::channel();

        let mut shared = self.engine.lock();
        let (_, transition) = shared.flight.request(&FlightIntent::EmergencyStop)?;
        shared.emit_transition(transition);

        shared.epoch += 1;
        let mut discarded = 0;
        for queued in self.engine.uplink_queue.try_iter() {
            queued.fail(CommandFailed::Preempted.into());
            discarded += 1;
        }
        warn!("Emergency stop, {} queued commands discarded", discarded);

        let intent = FlightIntent::EmergencyStop;
        let channel = intent.channel();
        let sequence = shared.sequences.next(channel);
        let frame = CommandFrame::new(channel, sequence, intent.command(), intent.payload(0))?;
        let bytes = frame::encode(&frame);
        let pending = PendingCommand::new(frame.clone(), bytes.clone(), Instant::now(), None, tx);
        if let Some((displaced, error)) = shared.tracker.register(pending) {
            shared.resolve(displaced, Err(error.into()));
        }

        // Sent under the lock so emergency frames reach the writer in sequence order
        if self.engine.emergency.send((frame, bytes)).is_err() {
            if let Some(command) = shared.tracker.remove(channel, sequence) {
                shared.resolve(command, Err(Error::Disconnected("Emergency writer stopped".to_owned())));
            }
        }

        Ok(CommandHandle { rx })
    }

    /// Send `intent` until the aircraft reports one of `targets`
    ///
    /// `in_progress` is the state in which the intent is refused because it is
    /// already being carried out.
    async fn confirmed(
        &self,
        intent: FlightIntent,
        targets: &[FlightState],
        in_progress: FlightState,
        timeout: Duration,
    ) -> Result<()> {
        let events = self.subscribe();
        let deadline = Instant::now() + timeout;

        loop {
            let state = self.state();
            if targets.contains(&state) {
                return Ok(());
            }
            if state == FlightState::Disconnected {
                return Err(self.engine.lock().disconnect_error());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CommandFailed::NotConfirmed {
                    expected: targets[0],
                    timeout,
                }
                .into());
            }

            match self.submit(intent.clone()) {
                Ok(handle) => {
                    if let Err(e) = handle.await {
                        debug!("{:?} not acknowledged: {}", intent, e);
                    }
                }
                Err(Error::Command(CommandFailed::IllegalState { state, .. })) if state == in_progress => {}
                Err(e) => return Err(e),
            }

            // Next state change or the retry period, whichever comes first
            let wait = CONFIRM_RETRY.min(deadline.saturating_duration_since(Instant::now()));
            let tick = Delay::new(wait);
            let changed = async {
                while let Ok(event) = events.recv_async().await {
                    if let Event::StateChanged(_) = event {
                        break;
                    }
                }
            };
            futures_util::pin_mut!(tick, changed);
            future::select(tick, changed).await;
        }
    }

    pub async fn take_off(&self) -> Result<()> {
        self.submit(FlightIntent::TakeOff)?.await
    }

    /// Take off and wait until the aircraft reports it is hovering or flying
    ///
    /// The command is sent again while the aircraft still reports being landed.
    /// Fails with [CommandFailed::NotConfirmed] once `timeout` elapsed.
    pub async fn take_off_confirmed(&self, timeout: Duration) -> Result<()> {
        self.confirmed(
            FlightIntent::TakeOff,
            &[FlightState::Hovering, FlightState::Flying],
            FlightState::TakingOff,
            timeout,
        )
        .await
    }

    /// Land. Succeeds immediately when already landed.
    pub async fn land(&self) -> Result<()> {
        self.submit(FlightIntent::Land)?.await
    }

    /// Land and wait until the aircraft reports it is on the ground
    pub async fn land_confirmed(&self, timeout: Duration) -> Result<()> {
        self.confirmed(
            FlightIntent::Land,
            &[FlightState::Landed],
            FlightState::Landing,
            timeout,
        )
        .await
    }

    pub async fn emergency_stop(&self) -> Result<()> {
        self.submit(FlightIntent::EmergencyStop)?.await
    }

    /// Leave the Emergency state once the aircraft is known to be safe on the ground
    pub fn acknowledge_emergency(&self) -> Result<()> {
        let mut shared = self.engine.lock();
        let transition = shared.flight.acknowledge_emergency()?;
        shared.emit_transition(transition);
        Ok(())
    }

    /// Fly with the given roll, pitch, yaw and vertical setpoint, in percent between -100 and 100
    ///
    /// The first setpoint is acknowledged, then it is repeated on the piloting
    /// channel every [EngineConfig::piloting_period] until `duration` elapsed.
    /// An emergency stop, a landing or the end of the session interrupts the move.
    /// With [EngineFlags::NEUTRAL_AFTER_MOVE] a neutral setpoint is written afterwards.
    pub async fn move_by(&self, roll: i8, pitch: i8, yaw: i8, gaz: i8, duration: Duration) -> Result<()> {
        let piloting = Piloting::new(roll, pitch, yaw, gaz);
        let started = Instant::now();
        self.submit(FlightIntent::Move { piloting, duration })?.await?;

        let period = self.engine.config.piloting_period;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                break;
            }
            // Delay only fails when the timer thread is gone
            let _ = Delay::new(period.min(duration - elapsed)).await;
            if started.elapsed() >= duration {
                break;
            }

            match self.state() {
                FlightState::Hovering | FlightState::Flying => {}
                FlightState::Disconnected => return Err(self.engine.lock().disconnect_error()),
                state => {
                    debug!("Move interrupted while {:?}", state);
                    return Err(CommandFailed::Preempted.into());
                }
            }
            self.submit(FlightIntent::Pilot(piloting))?.await?;
        }

        if self.engine.config.flags.contains(EngineFlags::NEUTRAL_AFTER_MOVE)
            && !piloting.is_neutral()
            && self.state() == FlightState::Flying
        {
            let neutral = match self.submit(FlightIntent::Pilot(Piloting::default())) {
                Ok(handle) => handle.await,
                Err(e) => Err(e),
            };
            if let Err(e) = neutral {
                debug!("Neutral setpoint after move not sent: {}", e);
            }
        }

        Ok(())
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        self.submit(FlightIntent::Flip(direction))?.await
    }

    /// Change heading by `degrees`, clipped to [-180, 180]
    pub async fn turn_degrees(&self, degrees: i16) -> Result<()> {
        self.submit(FlightIntent::TurnDegrees(degrees))?.await
    }

    pub async fn flat_trim(&self) -> Result<()> {
        self.submit(FlightIntent::FlatTrim)?.await
    }

    /// Enable or disable throw to take off
    pub async fn set_auto_take_off(&self, enabled: bool) -> Result<()> {
        self.submit(FlightIntent::SetAutoTakeOff(enabled))?.await
    }

    /// Open the claw plugged in the USB port
    pub async fn open_claw(&self) -> Result<()> {
        self.accessory(AccessoryAction::OpenClaw).await
    }

    pub async fn close_claw(&self) -> Result<()> {
        self.accessory(AccessoryAction::CloseClaw).await
    }

    /// Fire the gun plugged in the USB port
    pub async fn fire_gun(&self) -> Result<()> {
        self.accessory(AccessoryAction::FireGun).await
    }

    /// Address the accessory by the id it last reported, 0 if it never did
    async fn accessory(&self, action: AccessoryAction) -> Result<()> {
        let id = {
            let shared = self.engine.lock();
            match action {
                AccessoryAction::OpenClaw | AccessoryAction::CloseClaw => shared.sensors.claw_id,
                AccessoryAction::FireGun => shared.sensors.gun_id,
            }
        };
        self.submit(FlightIntent::Accessory { action, id })?.await
    }

    /// Ask the aircraft to send every state notification again
    pub async fn request_all_states(&self) -> Result<()> {
        self.submit(FlightIntent::RequestAllStates)?.await
    }

    /// Receive state changes, sensor updates and protocol warnings from now on
    pub fn subscribe(&self) -> flume::Receiver<Event> {
        let (tx, rx) = flume::unbounded();
        self.engine.lock().subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> FlightState {
        self.engine.lock().flight.state()
    }

    pub fn sensors(&self) -> SensorSnapshot {
        self.engine.lock().sensors.clone()
    }

    /// Number of commands waiting for an ack
    pub fn pending_count(&self) -> usize {
        self.engine.lock().tracker.len()
    }

    /// Number of accepted commands not written yet
    pub fn queued_count(&self) -> usize {
        self.engine.uplink_queue.len()
    }

    /// Close the session: pending commands fail and the state becomes Disconnected
    pub async fn disconnect(&self) {
        if self.engine.teardown("Connection closed") {
            self.engine.gateway.disconnect().await;
        }
    }

    /// Wait for the session to end and return the reason
    pub async fn wait_disconnect(&self) -> String {
        // Resolves when the shutdown sender is dropped
        let _ = self.engine.closed.recv_async().await;
        self.engine
            .lock()
            .disconnect_reason
            .clone()
            .unwrap_or_else(|| "Still connected!".to_owned())
    }
}

impl Drop for Minidrone {
    fn drop(&mut self) {
        if self.engine.teardown("Connection dropped") {
            let gateway = self.engine.gateway.clone();
            if let Err(e) = self.spawner.spawn(async move { gateway.disconnect().await }) {
                warn!("Cannot close the link: {}", e);
            }
        }
    }
}

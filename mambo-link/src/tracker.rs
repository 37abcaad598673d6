use crate::error::{CommandFailed, Result};
use crate::flight::Rollback;
use crate::frame::{Channel, CommandFrame};
use futures_channel::oneshot;
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type Responder = oneshot::Sender<Result<()>>;

/// Command written to the aircraft and waiting for its ack
#[derive(Debug)]
pub struct PendingCommand {
    pub frame: CommandFrame,
    pub bytes: Vec<u8>,
    pub sent_at: Instant,
    pub retries: u32,
    pub rollback: Option<Rollback>,
    responder: Option<Responder>,
}

impl PendingCommand {
    pub fn new(
        frame: CommandFrame,
        bytes: Vec<u8>,
        sent_at: Instant,
        rollback: Option<Rollback>,
        responder: Responder,
    ) -> Self {
        PendingCommand {
            frame,
            bytes,
            sent_at,
            retries: 0,
            rollback,
            responder: Some(responder),
        }
    }

    pub fn key(&self) -> (Channel, u8) {
        (self.frame.channel(), self.frame.sequence())
    }

    /// Complete the caller's handle. Returns the state to roll back when the command failed.
    pub fn resolve(mut self, result: Result<()>) -> Option<Rollback> {
        let failed = result.is_err();
        if let Some(responder) = self.responder.take() {
            // The caller may have stopped waiting
            let _ = responder.send(result);
        }
        if failed {
            self.rollback
        } else {
            None
        }
    }

    fn timeout_error(&self) -> CommandFailed {
        CommandFailed::AckTimeout {
            channel: self.frame.channel(),
            sequence: self.frame.sequence(),
            attempts: self.retries + 1,
        }
    }
}

/// Result of a timeout scan: frames to write again and commands that ran out of retries
#[derive(Debug, Default)]
pub struct TimeoutScan {
    pub retransmit: Vec<(Channel, u8, Vec<u8>)>,
    pub expired: Vec<(PendingCommand, CommandFailed)>,
}

/// Table of outstanding commands keyed by channel and sequence number
#[derive(Debug)]
pub struct AckTracker {
    pending: HashMap<(Channel, u8), PendingCommand>,
    timeout: Duration,
    max_retries: u32,
}

impl AckTracker {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        AckTracker {
            pending: HashMap::new(),
            timeout,
            max_retries,
        }
    }

    /// Track a command. If its key is still in use after a full wraparound
    /// of the channel counter, the older command is returned as displaced.
    pub fn register(&mut self, command: PendingCommand) -> Option<(PendingCommand, CommandFailed)> {
        let displaced = self.pending.insert(command.key(), command)?;
        debug!(
            "Sequence {} on {:?} reused while still pending",
            displaced.frame.sequence(), displaced.frame.channel()
        );
        let error = displaced.timeout_error();
        Some((displaced, error))
    }

    /// Match an ack. Late and duplicate acks find nothing.
    pub fn acknowledge(&mut self, channel: Channel, sequence: u8) -> Option<PendingCommand> {
        self.pending.remove(&(channel, sequence))
    }

    pub fn remove(&mut self, channel: Channel, sequence: u8) -> Option<PendingCommand> {
        self.pending.remove(&(channel, sequence))
    }

    /// Find the commands whose ack is overdue at `now`.
    ///
    /// Overdue commands are retransmitted with the same sequence number and
    /// payload until `max_retries` retransmissions have been made, the next
    /// timeout then expires them.
    pub fn poll_timeouts(&mut self, now: Instant) -> TimeoutScan {
        let mut scan = TimeoutScan::default();
        let mut expired_keys = Vec::new();

        for (key, command) in self.pending.iter_mut() {
            if now.saturating_duration_since(command.sent_at) < self.timeout {
                continue;
            }

            if command.retries < self.max_retries {
                command.retries += 1;
                command.sent_at = now;
                debug!(
                    "Retransmitting sequence {} on {:?} (retry {})",
                    key.1, key.0, command.retries
                );
                scan.retransmit.push((key.0, key.1, command.bytes.clone()));
            } else {
                expired_keys.push(*key);
            }
        }

        for key in expired_keys {
            if let Some(command) = self.pending.remove(&key) {
                let error = command.timeout_error();
                scan.expired.push((command, error));
            }
        }

        scan
    }

    /// Remove every pending command, used when the link is torn down
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.pending.drain().map(|(_, command)| command).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

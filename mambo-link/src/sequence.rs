use crate::frame::Channel;
use std::collections::HashMap;

/// Per channel packet sequence counters
///
/// Every counter starts at [SequenceAllocator::INITIAL] and the first number
/// issued on a channel is `INITIAL + 1`. Counters wrap at 256, which is
/// expected during long flights.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    last: HashMap<Channel, u8>,
}

impl SequenceAllocator {
    pub const INITIAL: u8 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, channel: Channel) -> u8 {
        let last = self.last.entry(channel).or_insert(Self::INITIAL);
        *last = last.wrapping_add(1);
        *last
    }

    /// Restart every channel from the initial value, as on a new connection
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_from_initial() {
        let mut sequences = SequenceAllocator::new();
        for k in 1..=300u32 {
            let expected = ((SequenceAllocator::INITIAL as u32 + k) % 256) as u8;
            assert_eq!(sequences.next(Channel::Command), expected);
        }
    }

    #[test]
    fn wraps_back_to_first_value() {
        let mut sequences = SequenceAllocator::new();
        let first = sequences.next(Channel::Command);
        for _ in 0..255 {
            sequences.next(Channel::Command);
        }
        assert_eq!(sequences.next(Channel::Command), first);
    }

    #[test]
    fn channels_are_independent() {
        let mut sequences = SequenceAllocator::new();
        assert_eq!(sequences.next(Channel::Command), 1);
        assert_eq!(sequences.next(Channel::Command), 2);
        assert_eq!(sequences.next(Channel::Emergency), 1);
        assert_eq!(sequences.next(Channel::Piloting), 1);
        assert_eq!(sequences.next(Channel::Command), 3);
    }

    #[test]
    fn reset_restarts_counters() {
        let mut sequences = SequenceAllocator::new();
        sequences.next(Channel::Command);
        sequences.next(Channel::Command);
        sequences.reset();
        assert_eq!(sequences.next(Channel::Command), 1);
    }
}

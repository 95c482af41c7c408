//! Per-dummy state ring: incoming updates are scheduled ahead of the
//! dummy's current step, and rendering interpolates between the current
//! slot and the one immediately after it.

use std::collections::VecDeque;

/// A type a dummy's visible state can be blended between two arrivals of.
pub trait Interpolate {
    fn interpolate(&self, other: &Self, t: f32) -> Self;
}

pub struct StateBuffer<T: Clone> {
    /// `slots[0]` is the step about to become current on the next `advance()`.
    slots: VecDeque<Option<T>>,
    /// The most recently scheduled non-`NO_CHAIN` state, repeated into
    /// otherwise-empty slots so gaps don't freeze the object.
    last_authoritative: Option<T>,
}

impl<T: Clone> StateBuffer<T> {
    /// `buffering_length` is the configured ring depth N; the ring holds N+1 slots.
    pub fn new(buffering_length: usize) -> Self {
        let mut slots = VecDeque::with_capacity(buffering_length + 1);
        for _ in 0..=buffering_length {
            slots.push_back(None);
        }
        Self { slots, last_authoritative: None }
    }

    /// Places an incoming update `delay_in_steps` slots ahead of "now".
    /// `no_chain` holds the gap flat instead of repeating this state forward.
    pub fn schedule(&mut self, state: T, delay_in_steps: usize, no_chain: bool) {
        let last = self.slots.len() - 1;
        let idx = delay_in_steps.min(last);
        self.slots[idx] = Some(state.clone());
        self.last_authoritative = if no_chain { None } else { Some(state) };
    }

    /// Advances one step and returns the new current ("blue") state, if any.
    pub fn advance(&mut self) -> Option<T> {
        let front = self.slots.pop_front();
        self.slots.push_back(None);
        match front {
            Some(state) => Some(state),
            None => self.last_authoritative.clone(),
        }
    }

    /// Two-point interpolation between `current` and the next scheduled slot.
    pub fn interpolate(&self, current: &T, t: f32) -> T
    where
        T: Interpolate,
    {
        match self.slots.front() {
            Some(Some(next)) => current.interpolate(next, t),
            _ => current.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pos(f32);

    impl Interpolate for Pos {
        fn interpolate(&self, other: &Self, t: f32) -> Self {
            Pos(self.0 + (other.0 - self.0) * t)
        }
    }

    #[test]
    fn scheduled_state_becomes_current_after_enough_advances() {
        let mut buf = StateBuffer::new(2);
        buf.schedule(Pos(5.0), 1, false);
        assert_eq!(buf.advance(), None);
        assert_eq!(buf.advance(), Some(Pos(5.0)));
    }

    #[test]
    fn gaps_repeat_last_authoritative_state_by_default() {
        let mut buf = StateBuffer::new(2);
        buf.schedule(Pos(1.0), 0, false);
        assert_eq!(buf.advance(), Some(Pos(1.0)));
        assert_eq!(buf.advance(), Some(Pos(1.0)));
    }

    #[test]
    fn no_chain_holds_flat_instead_of_repeating() {
        let mut buf = StateBuffer::new(2);
        buf.schedule(Pos(1.0), 0, true);
        assert_eq!(buf.advance(), Some(Pos(1.0)));
        assert_eq!(buf.advance(), None);
    }

    #[test]
    fn interpolation_blends_toward_next_slot() {
        let mut buf = StateBuffer::new(2);
        buf.schedule(Pos(10.0), 1, false);
        let current = Pos(0.0);
        assert_eq!(buf.interpolate(&current, 0.5), Pos(5.0));
    }
}

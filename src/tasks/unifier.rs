//! Merges display-layer input and hardware touch tokens into one advance signal.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, trace};

use crate::events::{AdvanceToken, TickSignal, UiEvent};

pub struct EventUnifier {
    touch_rx: Receiver<AdvanceToken>,
    min_dwell: Duration,
}

impl EventUnifier {
    pub fn new(touch_rx: Receiver<AdvanceToken>, min_dwell: Duration) -> Self {
        Self {
            touch_rx,
            min_dwell,
        }
    }

    /// Resolve one tick. Display events are handled before queued touch
    /// tokens; a quit short-circuits everything else. Candidates inside the
    /// dwell window are dropped, and any number of accepted candidates yields
    /// a single [`TickSignal::Advance`].
    pub fn tick<I>(&mut self, ui_events: I, last_transition: Instant, now: Instant) -> TickSignal
    where
        I: IntoIterator<Item = UiEvent>,
    {
        let since = now.saturating_duration_since(last_transition);
        let dwell_ok = since >= self.min_dwell;
        let mut accepted = false;

        for event in ui_events {
            match event {
                UiEvent::Quit => {
                    info!("quit requested");
                    return TickSignal::Shutdown;
                }
                UiEvent::PointerDown => self.consider("pointer", dwell_ok, since, &mut accepted),
                UiEvent::Key => trace!("key press ignored"),
            }
        }

        for AdvanceToken in self.touch_rx.try_iter() {
            self.consider("evdev", dwell_ok, since, &mut accepted);
        }

        if accepted {
            TickSignal::Advance
        } else {
            TickSignal::Idle
        }
    }

    fn consider(&self, source: &'static str, dwell_ok: bool, since: Duration, accepted: &mut bool) {
        if !dwell_ok {
            debug!(
                source,
                since_ms = since.as_millis() as u64,
                min_dwell_ms = self.min_dwell.as_millis() as u64,
                "press ignored (under minimum view time)"
            );
        } else if *accepted {
            trace!(source, "press coalesced into this tick's advance");
        } else {
            *accepted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Sender, unbounded};

    fn unifier() -> (EventUnifier, Sender<AdvanceToken>) {
        let (tx, rx) = unbounded();
        (EventUnifier::new(rx, Duration::from_millis(1000)), tx)
    }

    #[test]
    fn pointer_after_dwell_advances() {
        let (mut u, _tx) = unifier();
        let t0 = Instant::now();
        let signal = u.tick([UiEvent::PointerDown], t0, t0 + Duration::from_millis(1000));
        assert_eq!(signal, TickSignal::Advance);
    }

    #[test]
    fn pointer_inside_dwell_is_dropped_not_queued() {
        let (mut u, _tx) = unifier();
        let t0 = Instant::now();
        assert_eq!(
            u.tick([UiEvent::PointerDown], t0, t0 + Duration::from_millis(999)),
            TickSignal::Idle
        );
        // Nothing carried over into a later tick.
        assert_eq!(
            u.tick([], t0, t0 + Duration::from_millis(5000)),
            TickSignal::Idle
        );
    }

    #[test]
    fn burst_yields_single_advance_and_drains_touch_queue() {
        let (mut u, tx) = unifier();
        for _ in 0..5 {
            tx.send(AdvanceToken).unwrap();
        }
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(2);
        assert_eq!(
            u.tick([UiEvent::PointerDown, UiEvent::PointerDown], t0, now),
            TickSignal::Advance
        );
        assert!(tx.is_empty());
        assert_eq!(u.tick([], t0, now), TickSignal::Idle);
    }

    #[test]
    fn touch_tokens_inside_dwell_are_discarded() {
        let (mut u, tx) = unifier();
        tx.send(AdvanceToken).unwrap();
        let t0 = Instant::now();
        assert_eq!(
            u.tick([], t0, t0 + Duration::from_millis(10)),
            TickSignal::Idle
        );
        assert!(tx.is_empty());
    }

    #[test]
    fn quit_short_circuits() {
        let (mut u, tx) = unifier();
        tx.send(AdvanceToken).unwrap();
        let t0 = Instant::now();
        let signal = u.tick(
            [UiEvent::PointerDown, UiEvent::Quit],
            t0,
            t0 + Duration::from_secs(5),
        );
        assert_eq!(signal, TickSignal::Shutdown);
        assert_eq!(tx.len(), 1, "touch queue is left untouched on shutdown");
    }

    #[test]
    fn other_keys_never_advance() {
        let (mut u, _tx) = unifier();
        let t0 = Instant::now();
        assert_eq!(
            u.tick([UiEvent::Key], t0, t0 + Duration::from_secs(5)),
            TickSignal::Idle
        );
    }

    #[test]
    fn listener_gone_is_harmless() {
        let (mut u, tx) = unifier();
        drop(tx);
        let t0 = Instant::now();
        assert_eq!(
            u.tick([], t0, t0 + Duration::from_secs(5)),
            TickSignal::Idle
        );
    }
}

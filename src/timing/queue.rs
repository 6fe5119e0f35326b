//! Sample-accurate note event queue.
//!
//! Events are computed ahead of time (arpeggiator look-ahead, timed preview
//! notes) and stamped with the engine sample at which they take effect. The
//! render loop pops everything due before producing each sample.

use std::collections::VecDeque;

/// What produced an event. Cancellation works per origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Arp,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    On { note: u8, velocity: f64 },
    Off { note: u8 },
}

impl NoteEvent {
    pub fn note(&self) -> u8 {
        match *self {
            NoteEvent::On { note, .. } | NoteEvent::Off { note } => note,
        }
    }

    /// Offs sort ahead of ons on the same sample so a repeated note
    /// releases before it retriggers.
    fn rank(&self) -> u8 {
        match self {
            NoteEvent::Off { .. } => 0,
            NoteEvent::On { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub at: u64,
    pub event: NoteEvent,
    pub origin: Origin,
    /// Shared by a note-on and its matching note-off.
    pub pair: u64,
    seq: u64,
}

impl ScheduledEvent {
    fn key(&self) -> (u64, u8, u64) {
        (self.at, self.event.rank(), self.seq)
    }
}

#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: VecDeque<ScheduledEvent>,
    next_seq: u64,
    next_pair: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Queue a note with its release. The off always lands at least one
    /// sample after the on.
    pub fn push_note(&mut self, origin: Origin, note: u8, velocity: f64, on_at: u64, off_at: u64) {
        let pair = self.next_pair;
        self.next_pair += 1;
        self.insert(on_at, NoteEvent::On { note, velocity }, origin, pair);
        self.insert(off_at.max(on_at + 1), NoteEvent::Off { note }, origin, pair);
    }

    fn insert(&mut self, at: u64, event: NoteEvent, origin: Origin, pair: u64) {
        let scheduled = ScheduledEvent {
            at,
            event,
            origin,
            pair,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let key = scheduled.key();
        let idx = self.events.partition_point(|e| e.key() <= key);
        self.events.insert(idx, scheduled);
    }

    /// Sample of the earliest pending event.
    pub fn next_at(&self) -> Option<u64> {
        self.events.front().map(|e| e.at)
    }

    /// Remove and return the earliest event due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<ScheduledEvent> {
        if self.events.front()?.at <= now {
            self.events.pop_front()
        } else {
            None
        }
    }

    /// Drop every pending event from `origin`.
    ///
    /// Notes that have not started are dropped with their release. Notes that
    /// already started lose their scheduled release too; their numbers are
    /// returned so the caller can release them right away.
    pub fn cancel(&mut self, origin: Origin) -> Vec<u8> {
        let pending_on: Vec<u64> = self
            .events
            .iter()
            .filter(|e| e.origin == origin && matches!(e.event, NoteEvent::On { .. }))
            .map(|e| e.pair)
            .collect();
        let mut sounding = Vec::new();
        self.events.retain(|e| {
            if e.origin != origin {
                return true;
            }
            if let NoteEvent::Off { note } = e.event {
                if !pending_on.contains(&e.pair) {
                    sounding.push(note);
                }
            }
            false
        });
        sounding
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(q: &mut EventQueue, now: u64) -> Vec<(u64, NoteEvent)> {
        std::iter::from_fn(|| q.pop_due(now)).map(|e| (e.at, e.event)).collect()
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push_note(Origin::Arp, 64, 1.0, 200, 300);
        q.push_note(Origin::Arp, 60, 1.0, 100, 150);
        assert_eq!(q.next_at(), Some(100));
        let times: Vec<u64> = drain(&mut q, 1000).iter().map(|(at, _)| *at).collect();
        assert_eq!(times, vec![100, 150, 200, 300]);
    }

    #[test]
    fn nothing_pops_early() {
        let mut q = EventQueue::new();
        q.push_note(Origin::Preview, 60, 1.0, 100, 200);
        assert!(q.pop_due(99).is_none());
        assert!(q.pop_due(100).is_some());
    }

    #[test]
    fn off_sorts_before_on_at_same_sample() {
        let mut q = EventQueue::new();
        q.push_note(Origin::Arp, 60, 1.0, 100, 100);
        q.push_note(Origin::Arp, 60, 1.0, 101, 150);
        let events = drain(&mut q, 200);
        assert_eq!(events[1], (101, NoteEvent::Off { note: 60 }), "off is pushed past its on");
        assert_eq!(events[2], (101, NoteEvent::On { note: 60, velocity: 1.0 }));
    }

    #[test]
    fn cancel_drops_future_and_releases_sounding() {
        let mut q = EventQueue::new();
        q.push_note(Origin::Arp, 60, 1.0, 0, 100);
        q.push_note(Origin::Arp, 62, 1.0, 50, 150);
        q.push_note(Origin::Preview, 36, 1.0, 10, 500);
        // Note 60 has started; 62 has not.
        assert_eq!(drain(&mut q, 0).len(), 1);

        let sounding = q.cancel(Origin::Arp);
        assert_eq!(sounding, vec![60]);
        let rest = drain(&mut q, 1000);
        assert_eq!(rest.len(), 2, "preview events are untouched");
        assert!(rest.iter().all(|(_, e)| e.note() == 36));
    }
}

//! Tempo, patterns and note scheduling.

pub mod arpeggiator;
pub mod division;
pub mod queue;
pub mod sequencer;
pub mod transport;

pub use arpeggiator::{ArpNote, ArpState, ArpStatus, ArpStep, ArpStepEvent, Arpeggiator};
pub use queue::{EventQueue, NoteEvent, Origin, ScheduledEvent};
pub use sequencer::Sequencer;
pub use transport::{BeatGrid, StepClock, Transport, TransportClock};

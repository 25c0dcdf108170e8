//! Reader phases and the pure transition function driving them.
//!
//! ```text
//! Init --Demand--> Opening(0) --Opened--> Reading(i) --EndOfStream--> Advancing(i)
//!                      ^                                                   |
//!                      +------------------ Closed (i + 1 < n) -------------+
//!                                          Closed (i + 1 == n) --> Exhausted
//! any non-terminal --Fault--> Failed(i)
//! ```
//!
//! Keeping the transitions free of I/O lets them be tested exhaustively; the
//! reader performs the side effect that belongs to each phase and then feeds
//! the resulting event back in.

/// Where a reader is in its split. Indices are component positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    Opening(usize),
    Reading(usize),
    Advancing(usize),
    Exhausted,
    Failed(usize),
}

impl Phase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed(_))
    }

    /// Component the phase refers to, if any.
    #[must_use]
    pub fn component(self) -> Option<usize> {
        match self {
            Self::Opening(i) | Self::Reading(i) | Self::Advancing(i) | Self::Failed(i) => Some(i),
            Self::Init | Self::Exhausted => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// The caller asked for a record.
    Demand,
    /// The current component's stream was opened.
    Opened,
    /// The current stream has no more records in its range.
    EndOfStream,
    /// The finished stream was released.
    Closed,
    /// Opening or reading failed.
    Fault,
}

/// Next phase for `event` in `phase`, for a split of `components` components.
/// Events that do not apply to a phase leave it unchanged.
#[must_use]
pub fn transition(phase: Phase, event: Event, components: usize) -> Phase {
    match (phase, event) {
        (Phase::Init, Event::Demand) if components == 0 => Phase::Exhausted,
        (Phase::Init, Event::Demand) => Phase::Opening(0),
        (Phase::Opening(i), Event::Opened) => Phase::Reading(i),
        (Phase::Reading(i), Event::EndOfStream) => Phase::Advancing(i),
        (Phase::Advancing(i), Event::Closed) if i + 1 < components => Phase::Opening(i + 1),
        (Phase::Advancing(_), Event::Closed) => Phase::Exhausted,
        (Phase::Init, Event::Fault) => Phase::Failed(0),
        (Phase::Opening(i) | Phase::Reading(i) | Phase::Advancing(i), Event::Fault) => {
            Phase::Failed(i)
        }
        (p, _) => p,
    }
}

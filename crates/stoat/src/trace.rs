use stoat_core::Snapshot;

// Trace — forward execution record
//
// A forward run appends one event per step. Plain operators leave a marker;
// control-flow constructs record which path the execution actually took
// (branch taken, iterations run) together with the scope snapshots the
// gradient engine needs to replay that path backward. The trace lives for a
// single forward-then-backward cycle and can be dropped afterwards.
//
// Taken-path information is a tagged variant rather than dynamic dispatch:
// the gradient engine matches on the event to decide which backward to run.

/// Which arm of a conditional ran during the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTaken {
    Then,
    Else,
    /// Condition was false and no else-sequence was given.
    Skipped,
}

/// One loop iteration: the body scope as it looked after the body ran, plus
/// the events of nested constructs inside the body.
#[derive(Debug)]
pub struct Iteration {
    pub snapshot: Snapshot,
    pub inner: Trace,
}

/// One forward step's record.
#[derive(Debug)]
pub enum TraceEvent {
    /// A plain operator, with the input values it read. Backward reads
    /// forward inputs from here, not from the live scope, so a later
    /// overwrite of a name cannot skew a gradient already earned.
    Op { inputs: Snapshot },
    /// A conditional: the branch taken, the branch scope snapshot (absent
    /// when skipped), and the branch's own events.
    Cond {
        taken: BranchTaken,
        snapshot: Option<Snapshot>,
        inner: Trace,
    },
    /// A loop: one record per iteration actually executed, in forward order.
    Loop { iterations: Vec<Iteration> },
}

/// Ordered record of one forward run over a sequence.
#[derive(Debug, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Trace { events: Vec::new() }
    }

    pub(crate) fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    /// The recorded events, one per step of the traced sequence.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

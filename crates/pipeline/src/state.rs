//! Pipeline states and the per-run trace.

use serde::Serialize;
use std::fmt;

/// Stage a query has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    InputChecked,
    Retrieved,
    Processed,
    Prompted,
    Generated,
    OutputChecked,
    Done,
    Error,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::InputChecked => "input_checked",
            Self::Retrieved => "retrieved",
            Self::Processed => "processed",
            Self::Prompted => "prompted",
            Self::Generated => "generated",
            Self::OutputChecked => "output_checked",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether `next` may follow `self`.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Error) => true,
            (Received, InputChecked) => true,
            (InputChecked, Retrieved | Prompted) => true,
            (Retrieved, Processed) => true,
            (Processed, Prompted) => true,
            (Prompted, Generated) => true,
            (Generated, OutputChecked) => true,
            (OutputChecked, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the states one run passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    states: Vec<PipelineState>,
}

impl Trace {
    pub(crate) fn start() -> Self {
        Self {
            states: vec![PipelineState::Received],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    /// Record a transition. Illegal transitions are logged and recorded as `Error`.
    pub(crate) fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        if current.can_advance_to(next) {
            tracing::debug!("{} -> {}", current, next);
            self.states.push(next);
        } else {
            tracing::error!("Illegal pipeline transition {} -> {}", current, next);
            if !current.is_terminal() {
                self.states.push(PipelineState::Error);
            }
        }
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn contains(&self, state: PipelineState) -> bool {
        self.states.contains(&state)
    }
}

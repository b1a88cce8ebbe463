//! The stepping state machine.
//!
//! Converts step commands into pause predicates over the current call-stack
//! depth and source line. Step-over collapses instruction-granularity events
//! into line-granularity user events and stays quiet inside callees; the
//! returning edge (depth decreased) always pauses.

/// Stepping state. Anything other than `Running` counts as "step mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepMode {
    /// No stepping; only breakpoints and pause requests stop execution.
    Running,
    /// Pause at the next instruction that has a valid source position.
    StepInto,
    /// Pause at the next line change at or above the baseline depth.
    StepOver {
        /// Call-stack depth when the command was issued.
        depth: usize,
        /// Line of the pause the command resumed from; None when armed
        /// out-of-band (first positioned instruction pauses).
        last_line: Option<u32>,
    },
    /// Pause once the call stack is shallower than the baseline.
    StepOut { depth: usize },
}

impl StepMode {
    /// Whether the machine is armed at all.
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self, StepMode::Running)
    }

    /// Evaluate the pause rule for the instruction about to execute.
    ///
    /// `depth` is the current call-stack depth, `line` the instruction's
    /// source line (None for synthetic code with no position).
    pub(crate) fn should_pause(&self, depth: usize, line: Option<u32>) -> bool {
        match self {
            StepMode::Running => false,
            StepMode::StepInto => line.is_some(),
            StepMode::StepOver {
                depth: baseline,
                last_line,
            } => {
                if depth > *baseline {
                    // Inside a callee we stepped over.
                    false
                } else if depth < *baseline {
                    // The callee returned.
                    true
                } else {
                    match (last_line, line) {
                        (None, Some(_)) => true,
                        // No position yet, or a transition into synthetic
                        // code: keep going and carry the baseline forward.
                        (None, None) | (Some(_), None) => false,
                        (Some(last), Some(current)) => current != *last,
                    }
                }
            }
            StepMode::StepOut { depth: baseline } => depth < *baseline,
        }
    }
}

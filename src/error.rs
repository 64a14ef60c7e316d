//! `ScheduleError`: the five error kinds from spec §7, carrying enough
//! context (offending node dump, relevant shape-tracker string, counts) to
//! print a diagnosis without the caller needing internal pass knowledge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("tensor IR spec violation: {rule} on {node}")]
    IrSpecViolation { rule: String, node: String },

    #[error("assign cycle detected: {node} is both read and written within the same kernel")]
    AssignCycle { node: String },

    #[error("non-contiguous self-assign: {node} assigns into {shapetracker} which is not contiguous")]
    NonContiguousSelfAssign { node: String, shapetracker: String },

    #[error("schedule cycle: {scheduled} of {total} items ordered, remainder form a cycle")]
    ScheduleCycle { scheduled: usize, total: usize },

    #[error("internal invariant breach: {invariant} ({detail})")]
    InternalInvariantBreach { invariant: String, detail: String },
}

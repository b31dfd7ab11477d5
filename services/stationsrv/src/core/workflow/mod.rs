//! SN workflow: MES chain, usage accounting and outcome signalling

pub mod engine;
pub mod state;

pub use engine::{MacProvider, WorkflowEngine};
pub use state::{Outcome, State, Verdict, WorkflowContext};

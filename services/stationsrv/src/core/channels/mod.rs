//! Write channel ownership and signal fan-out

pub mod connection_manager;
pub mod dispatcher;

pub use connection_manager::ConnectionManager;
pub use dispatcher::{DispatchReport, SignalDispatcher};

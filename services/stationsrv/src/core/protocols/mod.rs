//! Industrial protocol framing

pub mod fins;

//! FINS protocol family
//!
//! Only the one command the station needs is implemented: write a single bit
//! in the W area. It is framed three ways:
//!
//! - [`hostlink`]: ASCII HostLink framing for serial links, XOR frame check
//! - [`frame`]: binary FINS for UDP, and the FINS/TCP envelope and node
//!   handshake for TCP
//!
//! Replies are classified into a [`ReplyStatus`] so the transports can report
//! them uniformly.

pub mod address;
pub mod frame;
pub mod hostlink;

pub use address::BitAddress;

/// Memory area code of the W (work) bit area
pub const AREA_W_BIT: u8 = 0x31;

/// Fixed service id used on every request
pub const SERVICE_ID: u8 = 0x10;

/// Classification of a PLC reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Zero end code
    Normal,
    /// Non-zero end code, or a serial reply without the normal marker
    Abnormal(String),
    /// Reply shorter than the position of the end code
    Truncated { len: usize, expected: usize },
}

impl ReplyStatus {
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal completion"),
            Self::Abnormal(detail) => write!(f, "abnormal reply: {detail}"),
            Self::Truncated { len, expected } => {
                write!(f, "incomplete reply: {len} bytes, need {expected}")
            },
        }
    }
}

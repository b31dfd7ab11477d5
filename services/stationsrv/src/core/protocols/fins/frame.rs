//! Binary FINS frames, the FINS/TCP envelope and the node handshake
//!
//! Command frame (UDP payload, TCP envelope body):
//!
//! ```text
//! 80 00 02 | 00 DA1 00 | 00 SA1 00 | 10 | 01 02 | 31 | WH WL | BB | 00 01 | DD
//! ICF  GCT   dest net/node/unit       SID   MRC/SRC area  word   bit  count  data
//! ```
//!
//! FINS/TCP envelope: `"FINS"`, big-endian length of everything after the
//! length field, command, error code, then the frame.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{BitAddress, ReplyStatus, AREA_W_BIT, SERVICE_ID};

const MAGIC: &[u8; 4] = b"FINS";

/// Length of the complete bit-write command frame
pub const BIT_WRITE_LEN: usize = 19;

/// FINS/TCP envelope length preceding the frame
pub const TCP_ENVELOPE_LEN: usize = 16;

/// Node address request sent right after connect
pub const HANDSHAKE_REQUEST_LEN: usize = 20;

/// Shortest acceptable node address reply
pub const HANDSHAKE_REPLY_LEN: usize = 24;

/// Offset of the end code in a UDP reply
const UDP_END_CODE_AT: usize = 12;

/// Offset of the end code in a TCP reply
const TCP_END_CODE_AT: usize = TCP_ENVELOPE_LEN + UDP_END_CODE_AT;

const TCP_CMD_NODE_ADDRESS: u32 = 0x0000_0000;
const TCP_CMD_SEND_FRAME: u32 = 0x0000_0002;

/// Handshake failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("handshake reply too short: {0} bytes")]
    TooShort(usize),

    #[error("handshake rejected with error code {0:#04X}")]
    Rejected(u8),
}

/// Node numbers used in the command header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePair {
    pub pc_node: u8,
    pub plc_node: u8,
}

/// Build the bit-write command frame
pub fn build_bit_write(nodes: NodePair, address: BitAddress, on: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(BIT_WRITE_LEN);

    // ICF: response required, RSV, GCT
    buf.put_u8(0x80);
    buf.put_u8(0x00);
    buf.put_u8(0x02);
    // Destination network, node, unit
    buf.put_u8(0x00);
    buf.put_u8(nodes.plc_node);
    buf.put_u8(0x00);
    // Source network, node, unit
    buf.put_u8(0x00);
    buf.put_u8(nodes.pc_node);
    buf.put_u8(0x00);
    buf.put_u8(SERVICE_ID);

    // Memory area write
    buf.put_u8(0x01);
    buf.put_u8(0x02);
    buf.put_u8(AREA_W_BIT);
    buf.put_u16(address.word);
    buf.put_u8(address.bit);
    buf.put_u16(0x0001);
    buf.put_u8(u8::from(on));

    buf.freeze()
}

/// The 20-byte node address request
pub fn handshake_request() -> Bytes {
    let mut buf = BytesMut::with_capacity(HANDSHAKE_REQUEST_LEN);
    buf.put_slice(MAGIC);
    buf.put_u32(12);
    buf.put_u32(TCP_CMD_NODE_ADDRESS);
    buf.put_u32(0);
    // Client node 0 asks the PLC to assign one
    buf.put_u32(0);
    buf.freeze()
}

/// Extract the negotiated node numbers from a handshake reply
pub fn parse_handshake_reply(reply: &[u8]) -> Result<NodePair, HandshakeError> {
    if reply.len() < HANDSHAKE_REPLY_LEN {
        return Err(HandshakeError::TooShort(reply.len()));
    }
    if reply[15] != 0 {
        return Err(HandshakeError::Rejected(reply[15]));
    }

    Ok(NodePair {
        pc_node: reply[19],
        plc_node: reply[23],
    })
}

/// Wrap a command frame in the FINS/TCP send-frame envelope
pub fn wrap_tcp(frame: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TCP_ENVELOPE_LEN + frame.len());
    buf.put_slice(MAGIC);
    buf.put_u32((frame.len() + 8) as u32);
    buf.put_u32(TCP_CMD_SEND_FRAME);
    buf.put_u32(0);
    buf.put_slice(frame);
    buf.freeze()
}

/// Classify a UDP reply by its end code
pub fn udp_reply_status(reply: &[u8]) -> ReplyStatus {
    end_code_status(reply, UDP_END_CODE_AT)
}

/// Classify a TCP reply by its end code
pub fn tcp_reply_status(reply: &[u8]) -> ReplyStatus {
    end_code_status(reply, TCP_END_CODE_AT)
}

fn end_code_status(reply: &[u8], at: usize) -> ReplyStatus {
    let expected = at + 2;
    if reply.len() < expected {
        return ReplyStatus::Truncated {
            len: reply.len(),
            expected,
        };
    }

    let code = u16::from_be_bytes([reply[at], reply[at + 1]]);
    if code == 0 {
        ReplyStatus::Normal
    } else {
        ReplyStatus::Abnormal(format!("end code {code:04X}"))
    }
}

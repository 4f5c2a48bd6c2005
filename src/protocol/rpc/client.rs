//! Client-side call construction: building call envelopes and picking
//! apart replies.
//!
//! The transaction-id generator is owned by the [`Caller`] value and
//! incremented atomically, so concurrent call sites never reuse an
//! xid.

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::protocol::rpc::msg;
use crate::protocol::xdr::Value;

/// Builds call messages for one client endpoint.
#[derive(Default)]
pub struct Caller {
    xid: AtomicU32,
}

impl Caller {
    pub fn new() -> Self {
        Caller::default()
    }

    pub fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Encodes a call envelope with AUTH_NULL credentials and the
    /// already-encoded argument appended. Returns the xid to match
    /// the reply against.
    pub fn encode_call(
        &self,
        prog: u32,
        vers: u32,
        proc: u32,
        arg: &[u8],
    ) -> std::io::Result<(u32, Vec<u8>)> {
        let xid = self.next_xid();
        let mut buf = msg::RPC_MSG.encode_to_vec(&call_message(xid, prog, vers, proc))?;
        buf.extend_from_slice(arg);
        Ok((xid, buf))
    }
}

fn call_message(xid: u32, prog: u32, vers: u32, proc: u32) -> Value {
    Value::record(vec![
        ("xid", Value::Uint(xid)),
        (
            "body",
            Value::union(
                Value::Name("CALL"),
                vec![(
                    "cbody",
                    Value::record(vec![
                        ("rpcvers", Value::Uint(msg::RPC_VERSION)),
                        ("prog", Value::Uint(prog)),
                        ("vers", Value::Uint(vers)),
                        ("proc", Value::Uint(proc)),
                        ("cred", msg::null_auth()),
                        ("verf", msg::null_auth()),
                    ]),
                )],
            ),
        ),
    ])
}

/// A decoded reply envelope plus the unconsumed result bytes.
pub struct Reply {
    pub xid: u32,
    pub body: Value,
    /// Bytes following the envelope; for SUCCESS replies this is the
    /// encoded procedure result.
    pub result: Vec<u8>,
}

impl Reply {
    /// The accept status name of an accepted reply, e.g. `SUCCESS` or
    /// `PROG_MISMATCH`; `None` for denied replies.
    pub fn accept_stat(&self) -> Option<&'static str> {
        let rbody = self.body.field("rbody")?;
        if rbody.name() != Some("MSG_ACCEPTED") {
            return None;
        }
        rbody.field("areply")?.field("reply_data")?.name()
    }

    /// The reject status name of a denied reply, e.g. `RPC_MISMATCH`.
    pub fn reject_stat(&self) -> Option<&'static str> {
        let rbody = self.body.field("rbody")?;
        if rbody.name() != Some("MSG_DENIED") {
            return None;
        }
        rbody.field("rreply")?.name()
    }
}

/// Splits a raw reply record into its envelope and trailing result.
pub fn decode_reply(data: &[u8]) -> std::io::Result<Reply> {
    let mut input = Cursor::new(data);
    let envelope = msg::RPC_MSG.decode(&mut input)?;
    let consumed = input.position() as usize;
    let xid = envelope
        .field("xid")
        .and_then(Value::as_u32)
        .ok_or_else(|| crate::protocol::xdr::invalid_data("reply without xid"))?;
    let body = envelope
        .field("body")
        .cloned()
        .ok_or_else(|| crate::protocol::xdr::invalid_data("reply without body"))?;
    Ok(Reply { xid, body, result: data[consumed..].to_vec() })
}

//! The per-message dispatch pipeline.
//!
//! One inbound record goes through a fixed state machine: decode the
//! envelope, route by program / version / procedure, decode the
//! argument, invoke the callback, encode the result, wrap it in a
//! reply envelope. Every failure along the way maps to exactly one of
//! the structured reply shapes, or to no reply at all:
//!
//! - malformed envelope: dropped silently (we cannot trust the xid)
//! - non-CALL message or RPC version != 2: MSG_DENIED / RPC_MISMATCH
//! - unknown program: PROG_UNAVAIL
//! - unknown version: PROG_MISMATCH with the registered range
//! - unknown procedure: PROC_UNAVAIL
//! - undecodable argument: GARBAGE_ARGS
//! - unencodable result: dropped (logged) rather than sent corrupt
//!
//! Application-level failures are not visible here: callbacks report
//! them as typed status values inside an ordinary SUCCESS reply.

use std::io::Cursor;

use tracing::{debug, error, warn};

use crate::protocol::rpc::msg;
use crate::protocol::rpc::registry::{Registry, RpcError};
use crate::protocol::xdr::Value;

/// Services one request record. Returns the encoded reply, or `None`
/// when the request is deliberately ignored.
pub fn handle_call(registry: &Registry, data: &[u8]) -> Option<Vec<u8>> {
    let mut input = Cursor::new(data);

    let envelope = match msg::RPC_MSG.decode(&mut input) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Don't know what this is; distinct from "here is an error".
            debug!("Ignoring undecodable RPC message: {e}");
            return None;
        }
    };
    let xid = envelope.field("xid").and_then(Value::as_u32)?;
    let body = envelope.field("body")?;

    let outcome = route(registry, body, &mut input);

    let reply = match outcome {
        Ok(result) => {
            // Envelope first, then the procedure result verbatim.
            let mut out = match msg::RPC_MSG.encode_to_vec(&msg::success_reply(xid)) {
                Ok(out) => out,
                Err(e) => {
                    error!("Cannot encode success envelope for xid {xid}: {e}");
                    return None;
                }
            };
            out.extend_from_slice(&result);
            return Some(out);
        }
        Err(RpcError::Ignore) => return None,
        Err(RpcError::RpcMismatch { low, high }) => msg::rpc_mismatch_reply(xid, low, high),
        Err(RpcError::ProgUnavailable) => msg::prog_unavail_reply(xid),
        Err(RpcError::ProgMismatch { low, high }) => msg::prog_mismatch_reply(xid, low, high),
        Err(RpcError::ProcUnavailable) => msg::proc_unavail_reply(xid),
        Err(RpcError::GarbageArgs) => msg::garbage_args_reply(xid),
    };

    match msg::RPC_MSG.encode_to_vec(&reply) {
        Ok(out) => Some(out),
        Err(e) => {
            error!("Cannot encode error reply for xid {xid}: {e}");
            None
        }
    }
}

/// Routes a decoded call body to its procedure and runs it. The
/// cursor is positioned at the start of the procedure argument.
fn route(
    registry: &Registry,
    body: &Value,
    input: &mut Cursor<&[u8]>,
) -> Result<Vec<u8>, RpcError> {
    if body.name() != Some("CALL") {
        warn!("Received a non-CALL message");
        return Err(RpcError::RpcMismatch { low: msg::RPC_VERSION, high: msg::RPC_VERSION });
    }
    let call = body.field("cbody").ok_or(RpcError::Ignore)?;

    let rpcvers = call.field("rpcvers").and_then(Value::as_u32).ok_or(RpcError::Ignore)?;
    if rpcvers != msg::RPC_VERSION {
        warn!("Invalid RPC version {rpcvers} != {}", msg::RPC_VERSION);
        return Err(RpcError::RpcMismatch { low: msg::RPC_VERSION, high: msg::RPC_VERSION });
    }

    let prog = call.field("prog").and_then(Value::as_u32).ok_or(RpcError::Ignore)?;
    let vers = call.field("vers").and_then(Value::as_u32).ok_or(RpcError::Ignore)?;
    let proc = call.field("proc").and_then(Value::as_u32).ok_or(RpcError::Ignore)?;

    let program = registry.get(prog).ok_or_else(|| {
        warn!("Unknown RPC program number {prog}");
        RpcError::ProgUnavailable
    })?;
    let version = program.get(vers).ok_or_else(|| {
        warn!(
            "Unsupported version {vers} for program {prog} (supported {}..={})",
            program.low(),
            program.high()
        );
        RpcError::ProgMismatch { low: program.low(), high: program.high() }
    })?;
    let procedure = version.get(proc).ok_or_else(|| {
        warn!("Unsupported procedure {proc} for program {prog} version {vers}");
        RpcError::ProcUnavailable
    })?;

    let arg = procedure.arg_type().decode(input).map_err(|e| {
        warn!("Garbage arguments for {}: {e}", procedure.name());
        RpcError::GarbageArgs
    })?;

    let cred = call.field("cred").cloned().unwrap_or(Value::Void);
    let verf = call.field("verf").cloned().unwrap_or(Value::Void);

    let result = procedure.call(arg, &cred, &verf)?;

    // A result the return descriptor cannot express is a server-side
    // bug; dropping the request beats sending corrupt bytes.
    procedure.return_type().encode_to_vec(&result).map_err(|e| {
        error!("Cannot encode {} result: {e}", procedure.name());
        RpcError::Ignore
    })
}

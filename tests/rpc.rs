//! Dispatch pipeline tests: routing outcomes, reply shapes, and the
//! end-to-end call path against a small test program.

use std::io::Cursor;

use nfs_burrow::protocol::rpc::{decode_reply, handle_call, msg, Caller, Program, Registry};
use nfs_burrow::protocol::xdr::{self, Value};

const PROG: u32 = 200_100;
const VERS: u32 = 1;

fn test_registry() -> Registry {
    let mut program = Program::new(PROG);
    program.version(VERS, |v| {
        v.procedure(xdr::string(64), "ECHO", 1, xdr::string(64));
        v.procedure(xdr::uint(), "BROKEN", 2, xdr::void());
        v.procedure(xdr::uint(), "UNBOUND", 3, xdr::void());
    });
    program.on_call(VERS, "ECHO", Box::new(|arg, _, _| Ok(arg)));
    // Returns a value its return descriptor cannot encode.
    program.on_call(VERS, "BROKEN", Box::new(|_, _, _| Ok(Value::text("not a uint"))));
    let mut registry = Registry::new();
    registry.register(program);
    registry
}

fn call(registry: &Registry, prog: u32, vers: u32, proc_number: u32, arg: &[u8]) -> (u32, Option<Vec<u8>>) {
    let caller = Caller::new();
    let (xid, request) = caller.encode_call(prog, vers, proc_number, arg).unwrap();
    (xid, handle_call(registry, &request))
}

#[test]
fn null_procedure_succeeds_with_empty_result() {
    let registry = test_registry();
    let (xid, response) = call(&registry, PROG, VERS, 0, &[]);
    let reply = decode_reply(&response.expect("null must reply")).unwrap();
    assert_eq!(reply.xid, xid);
    assert_eq!(reply.accept_stat(), Some("SUCCESS"));
    assert!(reply.result.is_empty());
}

#[test]
fn echo_roundtrip() {
    let registry = test_registry();
    let arg = xdr::string(64).encode_to_vec(&Value::text("hello")).unwrap();
    let (xid, response) = call(&registry, PROG, VERS, 1, &arg);
    let reply = decode_reply(&response.expect("echo must reply")).unwrap();
    assert_eq!(reply.xid, xid);
    assert_eq!(reply.accept_stat(), Some("SUCCESS"));
    let result = xdr::string(64).decode(&mut Cursor::new(&reply.result[..])).unwrap();
    assert_eq!(result, Value::text("hello"));
}

#[test]
fn unknown_program_is_prog_unavail() {
    let registry = test_registry();
    let (_, response) = call(&registry, 999_999, VERS, 0, &[]);
    let reply = decode_reply(&response.unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), Some("PROG_UNAVAIL"));
}

#[test]
fn unsupported_version_reports_supported_range() {
    let registry = test_registry();
    let (_, response) = call(&registry, PROG, 7, 0, &[]);
    let reply = decode_reply(&response.unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), Some("PROG_MISMATCH"));
    let info = reply
        .body
        .field("rbody")
        .and_then(|b| b.field("areply"))
        .and_then(|a| a.field("reply_data"))
        .and_then(|d| d.field("mismatch_info"))
        .expect("mismatch info");
    assert_eq!(info.field("low").and_then(Value::as_u32), Some(VERS));
    assert_eq!(info.field("high").and_then(Value::as_u32), Some(VERS));
}

#[test]
fn unknown_procedure_is_proc_unavail() {
    let registry = test_registry();
    let (_, response) = call(&registry, PROG, VERS, 99, &[]);
    let reply = decode_reply(&response.unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), Some("PROC_UNAVAIL"));
}

#[test]
fn unbound_procedure_is_proc_unavail() {
    let registry = test_registry();
    let (_, response) = call(&registry, PROG, VERS, 3, &[]);
    let reply = decode_reply(&response.unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), Some("PROC_UNAVAIL"));
}

#[test]
fn undecodable_argument_is_garbage_args() {
    let registry = test_registry();
    // ECHO expects a counted string; promise 32 bytes and send none.
    let (_, response) = call(&registry, PROG, VERS, 1, &[0, 0, 0, 32]);
    let reply = decode_reply(&response.unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), Some("GARBAGE_ARGS"));
}

#[test]
fn wrong_rpc_version_is_denied() {
    let registry = test_registry();
    let caller = Caller::new();
    let (_, mut request) = caller.encode_call(PROG, VERS, 0, &[]).unwrap();
    // rpcvers sits after xid and msg_type.
    request[8..12].copy_from_slice(&3u32.to_be_bytes());
    let reply = decode_reply(&handle_call(&registry, &request).unwrap()).unwrap();
    assert_eq!(reply.accept_stat(), None);
    assert_eq!(reply.reject_stat(), Some("RPC_MISMATCH"));
    let info = reply
        .body
        .field("rbody")
        .and_then(|b| b.field("rreply"))
        .and_then(|r| r.field("mismatch_info"))
        .expect("mismatch info");
    assert_eq!(info.field("low").and_then(Value::as_u32), Some(2));
    assert_eq!(info.field("high").and_then(Value::as_u32), Some(2));
}

#[test]
fn reply_messages_are_denied_not_dispatched() {
    let registry = test_registry();
    // Feed the server one of its own replies.
    let (_, response) = call(&registry, PROG, VERS, 0, &[]);
    let reply = decode_reply(&handle_call(&registry, &response.unwrap()).unwrap()).unwrap();
    assert_eq!(reply.reject_stat(), Some("RPC_MISMATCH"));
}

#[test]
fn malformed_envelope_is_dropped() {
    let registry = test_registry();
    assert!(handle_call(&registry, &[]).is_none());
    assert!(handle_call(&registry, &[1, 2, 3]).is_none());
    // Valid xid, unknown message type 7.
    assert!(handle_call(&registry, &[0, 0, 0, 1, 0, 0, 0, 7]).is_none());
}

#[test]
fn unencodable_result_is_dropped() {
    let registry = test_registry();
    let (_, response) = call(&registry, PROG, VERS, 2, &[]);
    assert!(response.is_none());
}

#[test]
fn auth_unix_credential_round_trips() {
    let cred = Value::record(vec![
        ("stamp", Value::Uint(7)),
        ("machinename", Value::text("client.local")),
        ("uid", Value::Uint(1000)),
        ("gid", Value::Uint(1000)),
        ("gids", Value::List(vec![Value::Uint(4), Value::Uint(24)])),
    ]);
    let bytes = msg::AUTH_UNIX.encode_to_vec(&cred).unwrap();
    assert_eq!(bytes.len() % 4, 0);
    let decoded = msg::AUTH_UNIX.decode(&mut Cursor::new(&bytes[..])).unwrap();
    assert_eq!(decoded, cred);
    assert_eq!(decoded.field("machinename"), Some(&Value::text("client.local")));
}

#[test]
fn xids_are_unique_per_caller() {
    let caller = Caller::new();
    let (first, _) = caller.encode_call(PROG, VERS, 0, &[]).unwrap();
    let (second, _) = caller.encode_call(PROG, VERS, 0, &[]).unwrap();
    assert_ne!(first, second);
}

//! The RPC message envelope as specified in RFC 1057, expressed as
//! XDR descriptor compositions.
//!
//! Each RPC message begins with a transaction identifier (xid)
//! followed by a discriminated union containing either a CALL or
//! REPLY body. The xid is an opaque correlation token: a reply always
//! echoes the xid of the call that produced it, and servers must not
//! treat it as a sequence number.
//!
//! This module has no behavior of its own beyond building the
//! descriptors and the canonical reply values dispatch sends.

use std::sync::{Arc, LazyLock};

use crate::protocol::xdr::{
    self, enumeration, opaque, string, structure, uint, union, EnumTable, Value, Xdr,
};

/// Maximum length of an authentication body.
pub const MAX_AUTH_LEN: usize = 400;
/// Maximum machine-name length in AUTH_UNIX credentials.
pub const AUTH_UNIX_MAX_MACHINE_NAME_LEN: usize = 255;
/// Maximum number of supplementary gids in AUTH_UNIX credentials.
pub const AUTH_UNIX_MAX_GIDS: usize = 16;

/// The RPC protocol version this stack speaks.
pub const RPC_VERSION: u32 = 2;

pub const AUTH_FLAVOR: EnumTable = &[
    ("AUTH_NULL", 0),
    ("AUTH_UNIX", 1),
    ("AUTH_SHORT", 2),
    ("AUTH_DES", 3),
    /* and more to be defined */
];

pub const MSG_TYPE: EnumTable = &[("CALL", 0), ("REPLY", 1)];

pub const REPLY_STAT: EnumTable = &[("MSG_ACCEPTED", 0), ("MSG_DENIED", 1)];

pub const ACCEPT_STAT: EnumTable = &[
    ("SUCCESS", 0),       // RPC executed successfully
    ("PROG_UNAVAIL", 1),  // remote hasn't exported program
    ("PROG_MISMATCH", 2), // remote can't support version number
    ("PROC_UNAVAIL", 3),  // program can't support procedure
    ("GARBAGE_ARGS", 4),  // procedure can't decode params
];

pub const REJECT_STAT: EnumTable = &[
    ("RPC_MISMATCH", 0), // RPC version number != 2
    ("AUTH_ERROR", 1),   // remote can't authenticate caller
];

pub const AUTH_STAT: EnumTable = &[
    ("AUTH_BADCRED", 1),      // bad credentials (seal broken)
    ("AUTH_REJECTEDCRED", 2), // client must begin new session
    ("AUTH_BADVERF", 3),      // bad verifier (seal broken)
    ("AUTH_REJECTEDVERF", 4), // verifier expired or replayed
    ("AUTH_TOOWEAK", 5),      // rejected for security reasons
];

/// Authentication data carried in both call and reply messages: a
/// flavor tag and opaque bytes whose format the flavor defines.
pub static OPAQUE_AUTH: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![("flavor", enumeration(AUTH_FLAVOR)), ("body", opaque(MAX_AUTH_LEN))])
});

/// The body of an AUTH_UNIX credential.
pub static AUTH_UNIX: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("stamp", uint()),
        ("machinename", string(AUTH_UNIX_MAX_MACHINE_NAME_LEN)),
        ("uid", uint()),
        ("gid", uint()),
        ("gids", xdr::array(uint(), AUTH_UNIX_MAX_GIDS)),
    ])
});

pub static CALL_BODY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("rpcvers", uint()), // must be equal to two (2)
        ("prog", uint()),
        ("vers", uint()),
        ("proc", uint()),
        ("cred", OPAQUE_AUTH.clone()),
        ("verf", OPAQUE_AUTH.clone()),
        // procedure specific parameters start here
    ])
});

static MISMATCH_INFO: LazyLock<Arc<Xdr>> =
    LazyLock::new(|| structure(vec![("low", uint()), ("high", uint())]));

/// Reply to a call the server accepted. Successful results follow the
/// envelope in the byte stream and are appended by the caller, so the
/// SUCCESS arm itself carries no fields.
pub static ACCEPTED_REPLY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("verf", OPAQUE_AUTH.clone()),
        (
            "reply_data",
            union(
                enumeration(ACCEPT_STAT),
                vec![
                    (Value::Name("SUCCESS"), vec![]),
                    (
                        Value::Name("PROG_MISMATCH"),
                        vec![("mismatch_info", MISMATCH_INFO.clone())],
                    ),
                ],
                // Void. Cases include PROG_UNAVAIL, PROC_UNAVAIL, and
                // GARBAGE_ARGS.
                Some(vec![]),
            ),
        ),
    ])
});

pub static REJECTED_REPLY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    union(
        enumeration(REJECT_STAT),
        vec![
            (Value::Name("RPC_MISMATCH"), vec![("mismatch_info", MISMATCH_INFO.clone())]),
            (Value::Name("AUTH_ERROR"), vec![("stat", enumeration(AUTH_STAT))]),
        ],
        None,
    )
});

pub static REPLY_BODY: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    union(
        enumeration(REPLY_STAT),
        vec![
            (Value::Name("MSG_ACCEPTED"), vec![("areply", ACCEPTED_REPLY.clone())]),
            (Value::Name("MSG_DENIED"), vec![("rreply", REJECTED_REPLY.clone())]),
        ],
        None,
    )
});

pub static RPC_MSG: LazyLock<Arc<Xdr>> = LazyLock::new(|| {
    structure(vec![
        ("xid", uint()),
        (
            "body",
            union(
                enumeration(MSG_TYPE),
                vec![
                    (Value::Name("CALL"), vec![("cbody", CALL_BODY.clone())]),
                    (Value::Name("REPLY"), vec![("rbody", REPLY_BODY.clone())]),
                ],
                None,
            ),
        ),
    ])
});

/// A null-flavored auth value, used for server verifiers.
pub fn null_auth() -> Value {
    Value::record(vec![("flavor", Value::Name("AUTH_NULL")), ("body", Value::Bytes(vec![]))])
}

fn accepted(xid: u32, reply_data: Value) -> Value {
    Value::record(vec![
        ("xid", Value::Uint(xid)),
        (
            "body",
            Value::union(
                Value::Name("REPLY"),
                vec![(
                    "rbody",
                    Value::union(
                        Value::Name("MSG_ACCEPTED"),
                        vec![(
                            "areply",
                            Value::record(vec![
                                ("verf", null_auth()),
                                ("reply_data", reply_data),
                            ]),
                        )],
                    ),
                )],
            ),
        ),
    ])
}

fn denied(xid: u32, rreply: Value) -> Value {
    Value::record(vec![
        ("xid", Value::Uint(xid)),
        (
            "body",
            Value::union(
                Value::Name("REPLY"),
                vec![("rbody", Value::union(Value::Name("MSG_DENIED"), vec![("rreply", rreply)]))],
            ),
        ),
    ])
}

fn mismatch(low: u32, high: u32) -> Value {
    Value::record(vec![("low", Value::Uint(low)), ("high", Value::Uint(high))])
}

/// Reply envelope for a successfully executed call. The encoded
/// procedure result is appended verbatim after this envelope.
pub fn success_reply(xid: u32) -> Value {
    accepted(xid, Value::status("SUCCESS"))
}

pub fn prog_unavail_reply(xid: u32) -> Value {
    accepted(xid, Value::status("PROG_UNAVAIL"))
}

pub fn prog_mismatch_reply(xid: u32, low: u32, high: u32) -> Value {
    accepted(
        xid,
        Value::union(Value::Name("PROG_MISMATCH"), vec![("mismatch_info", mismatch(low, high))]),
    )
}

pub fn proc_unavail_reply(xid: u32) -> Value {
    accepted(xid, Value::status("PROC_UNAVAIL"))
}

pub fn garbage_args_reply(xid: u32) -> Value {
    accepted(xid, Value::status("GARBAGE_ARGS"))
}

pub fn rpc_mismatch_reply(xid: u32, low: u32, high: u32) -> Value {
    denied(
        xid,
        Value::union(Value::Name("RPC_MISMATCH"), vec![("mismatch_info", mismatch(low, high))]),
    )
}

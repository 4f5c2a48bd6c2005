//! The program / version / procedure routing table.
//!
//! A [`Registry`] owns [`Program`]s keyed by program number, a
//! program owns [`Version`]s keyed by version number, and a version
//! owns [`Procedure`]s keyed by procedure number. Every version
//! carries the customary null procedure at number 0.
//!
//! A procedure pairs an argument descriptor and a return descriptor
//! with a pluggable callback. Callbacks are bound while the registry
//! is still mutable, during server construction; once the registry is
//! shared with the transports it is read only, so workers touch it
//! without locking.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::xdr::{self, Value, Xdr};

/// A routing failure or short-circuit raised while servicing one
/// call. Each variant carries exactly the data its reply encoding
/// needs; `Ignore` means no reply is sent at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcError {
    /// Drop the request without replying.
    Ignore,
    /// The caller spoke an unsupported RPC protocol version.
    RpcMismatch { low: u32, high: u32 },
    /// Unknown program number.
    ProgUnavailable,
    /// Known program, unsupported version; carries the supported range.
    ProgMismatch { low: u32, high: u32 },
    /// Unknown procedure number within a supported version.
    ProcUnavailable,
    /// The argument payload could not be decoded.
    GarbageArgs,
}

/// Application logic bound to one procedure. Receives the decoded
/// argument together with the caller's credential and verifier, and
/// either produces a result value matching the procedure's return
/// descriptor or short-circuits with an [`RpcError`].
pub type Callback =
    Box<dyn Fn(Value, &Value, &Value) -> Result<Value, RpcError> + Send + Sync>;

pub struct Procedure {
    number: u32,
    name: &'static str,
    return_type: Arc<Xdr>,
    arg_type: Arc<Xdr>,
    callback: Option<Callback>,
}

impl Procedure {
    pub fn new(number: u32, name: &'static str, return_type: Arc<Xdr>, arg_type: Arc<Xdr>) -> Self {
        Procedure { number, name, return_type, arg_type, callback: None }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arg_type(&self) -> &Xdr {
        &self.arg_type
    }

    pub fn return_type(&self) -> &Xdr {
        &self.return_type
    }

    pub fn bind(&mut self, callback: Callback) {
        self.callback = Some(callback);
    }

    /// Invokes the bound callback. An unbound procedure is treated as
    /// unavailable even though its descriptors are registered.
    pub fn call(&self, arg: Value, cred: &Value, verf: &Value) -> Result<Value, RpcError> {
        match &self.callback {
            Some(callback) => callback(arg, cred, verf),
            None => Err(RpcError::ProcUnavailable),
        }
    }
}

pub struct Version {
    number: u32,
    procedures: BTreeMap<u32, Procedure>,
    names: HashMap<&'static str, u32>,
}

impl Version {
    pub fn new(number: u32) -> Self {
        let mut version =
            Version { number, procedures: BTreeMap::new(), names: HashMap::new() };
        // The customary null procedure, present in every version.
        version.procedure(xdr::void(), "NULL", 0, xdr::void());
        version.bind("NULL", Box::new(|_, _, _| Ok(Value::Void)));
        version
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Registers a procedure. The name is used for callback binding
    /// and client-side lookup.
    pub fn procedure(
        &mut self,
        return_type: Arc<Xdr>,
        name: &'static str,
        number: u32,
        arg_type: Arc<Xdr>,
    ) {
        self.names.insert(name, number);
        self.procedures.insert(number, Procedure::new(number, name, return_type, arg_type));
    }

    pub fn bind(&mut self, name: &'static str, callback: Callback) {
        if let Some(proc) = self.names.get(name).and_then(|n| self.procedures.get_mut(n)) {
            proc.bind(callback);
        }
    }

    pub fn get(&self, number: u32) -> Option<&Procedure> {
        self.procedures.get(&number)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Procedure> {
        self.names.get(name).and_then(|n| self.procedures.get(n))
    }
}

pub struct Program {
    number: u32,
    versions: BTreeMap<u32, Version>,
}

impl Program {
    pub fn new(number: u32) -> Self {
        Program { number, versions: BTreeMap::new() }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn add_version(&mut self, version: Version) -> &mut Version {
        let number = version.number();
        self.versions.entry(number).or_insert(version)
    }

    /// Builds a version in place; `build` registers its procedures.
    pub fn version(&mut self, number: u32, build: impl FnOnce(&mut Version)) {
        let mut version = Version::new(number);
        build(&mut version);
        self.versions.insert(number, version);
    }

    /// Binds behavior to a registered procedure of one version.
    pub fn on_call(&mut self, version: u32, name: &'static str, callback: Callback) {
        if let Some(version) = self.versions.get_mut(&version) {
            version.bind(name, callback);
        }
    }

    pub fn get(&self, version: u32) -> Option<&Version> {
        self.versions.get(&version)
    }

    /// Lowest registered version number.
    pub fn low(&self) -> u32 {
        self.versions.keys().next().copied().unwrap_or(0)
    }

    /// Highest registered version number.
    pub fn high(&self) -> u32 {
        self.versions.keys().next_back().copied().unwrap_or(0)
    }
}

/// The full routing table a server dispatches against.
#[derive(Default)]
pub struct Registry {
    programs: HashMap<u32, Program>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, program: Program) {
        self.programs.insert(program.number(), program);
    }

    pub fn get(&self, number: u32) -> Option<&Program> {
        self.programs.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Program> {
        self.programs.get_mut(&number)
    }
}

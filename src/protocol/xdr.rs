//! XDR is a standard for the description and encoding of data.
//! It is useful for transferring data between different computer
//! architectures and underlies the SUNRPC wire format.
//!
//! <https://datatracker.ietf.org/doc/html/rfc4506>
//!
//! Unlike a derive-based serializer, this module models XDR types as
//! runtime descriptors ([`Xdr`]) paired with a dynamic value tree
//! ([`Value`]). A protocol definition is an ordinary Rust expression
//! building descriptors, and the same descriptor both encodes and
//! decodes. This is what lets the RPC layer treat procedure argument
//! and result types as data: the registry stores a descriptor per
//! procedure and drives it generically.
//!
//! All scalars are big endian, and every encoding is padded to a
//! 4-byte boundary.

use std::io::{Read, Write};
use std::sync::{Arc, OnceLock};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::ToPrimitive;

/// XDR assumes big endian encoding.
pub type XdrEndian = BigEndian;

/// XDR word size. Every encoded object occupies a multiple of this.
pub const ALIGNMENT: usize = 4;

fn padding_len(src_len: usize) -> usize {
    (ALIGNMENT - (src_len % ALIGNMENT)) % ALIGNMENT
}

fn read_padding(src_len: usize, src: &mut impl Read) -> std::io::Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let mut padding_buffer: [u8; ALIGNMENT] = Default::default();
        src.read_exact(&mut padding_buffer[..pad_len])?;
    }
    Ok(())
}

fn write_padding(src_len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let padding_buffer: [u8; ALIGNMENT] = Default::default();
        dest.write_all(&padding_buffer[..pad_len])?;
    }
    Ok(())
}

pub fn invalid_data(m: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, m.into())
}

fn write_len(len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    let Some(val) = len.to_u32() else {
        return Err(invalid_data("cannot cast `usize` length to `u32`"));
    };
    dest.write_u32::<XdrEndian>(val)
}

fn read_len(src: &mut impl Read) -> std::io::Result<usize> {
    let Some(val) = src.read_u32::<XdrEndian>()?.to_usize() else {
        return Err(invalid_data("cannot cast `u32` length to `usize`"));
    };
    Ok(val)
}

/// A dynamic value, the domain every descriptor encodes from and
/// decodes into.
///
/// Structures decode to an ordered field list keyed by name; unions
/// always record their discriminant alongside the matched arm's
/// fields, even when the arm is empty. Optional data is `Void` when
/// absent and the inner value when present.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Int(i32),
    Uint(u32),
    /// A symbolic enumeration constant, e.g. `NFS_OK` or `TRUE`.
    Name(&'static str),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Str(String),
    List(Vec<Value>),
    Struct(Vec<(&'static str, Value)>),
    /// Discriminant plus the fields of the matched arm.
    Union(Box<Value>, Vec<(&'static str, Value)>),
}

impl Value {
    pub fn record(fields: Vec<(&'static str, Value)>) -> Value {
        Value::Struct(fields)
    }

    pub fn union(disc: Value, fields: Vec<(&'static str, Value)>) -> Value {
        Value::Union(Box::new(disc), fields)
    }

    /// Union carrying just a status discriminant and no arm fields.
    pub fn status(name: &'static str) -> Value {
        Value::union(Value::Name(name), Vec::new())
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Field lookup by name, for `Struct` and `Union` values.
    pub fn field(&self, name: &str) -> Option<&Value> {
        let fields = match self {
            Value::Struct(fields) => fields,
            Value::Union(_, fields) => fields,
            _ => return None,
        };
        fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// The discriminant of a `Union` value.
    pub fn discriminant(&self) -> Option<&Value> {
        match self {
            Value::Union(disc, _) => Some(disc),
            _ => None,
        }
    }

    /// The symbolic name of this value or of its discriminant.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Value::Name(n) => Some(n),
            Value::Union(disc, _) => disc.name(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Uint(v) => Some(v),
            Value::Int(v) => Some(v as u32),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Uint(v) => Some(v as i32),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Uint(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(v)
    }
}

/// Name table of an XDR enumeration: `(symbolic name, wire value)`.
pub type EnumTable = &'static [(&'static str, i32)];

/// `bool` is the enumeration `{ FALSE = 0, TRUE = 1 }`.
pub const BOOL_TABLE: EnumTable = &[("FALSE", 0), ("TRUE", 1)];

/// Fields of a structure or of one union arm, in declaration order.
pub type Fields = Vec<(&'static str, Arc<Xdr>)>;

/// A discriminated union descriptor: a discriminant type and arms
/// keyed by discriminant value. Encoding and decoding fall back to
/// the default arm, or to an empty arm, when no key matches.
#[derive(Clone)]
pub struct UnionType {
    disc: Arc<Xdr>,
    arms: Vec<(Value, Fields)>,
    default_arm: Option<Fields>,
}

impl UnionType {
    fn select(&self, disc: &Value) -> Option<&Fields> {
        self.arms
            .iter()
            .find(|(key, _)| key == disc)
            .map(|(_, fields)| fields)
            .or(self.default_arm.as_ref())
    }
}

/// A slot for a descriptor that references itself, e.g. the `next`
/// field of a linked directory-entry node. The slot is created empty,
/// used as a placeholder inside the descriptor under construction,
/// and bound once the full descriptor exists.
#[derive(Clone, Default)]
pub struct Slot(Arc<OnceLock<Arc<Xdr>>>);

impl Slot {
    pub fn new() -> Slot {
        Slot::default()
    }

    /// A placeholder descriptor that delegates to whatever the slot
    /// is later bound to.
    pub fn forward(&self) -> Arc<Xdr> {
        Arc::new(Xdr::Deferred(self.clone()))
    }

    /// Binds the slot. A second bind is ignored; the first one wins.
    pub fn bind(&self, ty: Arc<Xdr>) {
        let _ = self.0.set(ty);
    }

    fn get(&self) -> std::io::Result<&Arc<Xdr>> {
        self.0.get().ok_or_else(|| invalid_data("unbound deferred type slot"))
    }
}

/// An XDR type descriptor.
///
/// Each variant is immutable after construction and pure with respect
/// to encode/decode. Composite variants own their component
/// descriptors through `Arc`, so catalogs can share subtypes freely.
#[derive(Clone)]
pub enum Xdr {
    Void,
    Int,
    Uint,
    Enum(EnumTable),
    Float,
    Double,
    /// `n` bytes of text, zero padded on the wire to a word boundary.
    FixedString(usize),
    /// `n` raw bytes, zero padded on the wire to a word boundary.
    FixedOpaque(usize),
    /// Length-prefixed text with an optional maximum length.
    String(Option<usize>),
    /// Length-prefixed raw bytes with an optional maximum length.
    Opaque(Option<usize>),
    FixedArray(Arc<Xdr>, usize),
    /// Count-prefixed array with an optional maximum element count.
    Array(Arc<Xdr>, Option<usize>),
    /// Zero-or-one occurrence, encoded as an array of length 0 or 1.
    Optional(Arc<Xdr>),
    Struct(Fields),
    Union(UnionType),
    /// Late-bound self reference, see [`Slot`].
    Deferred(Slot),
}

// Constructor helpers. Protocol catalogs read best when a type
// definition is a single expression, so every variant gets a
// function returning `Arc<Xdr>`.

pub fn void() -> Arc<Xdr> {
    Arc::new(Xdr::Void)
}

pub fn int() -> Arc<Xdr> {
    Arc::new(Xdr::Int)
}

pub fn uint() -> Arc<Xdr> {
    Arc::new(Xdr::Uint)
}

pub fn enumeration(table: EnumTable) -> Arc<Xdr> {
    Arc::new(Xdr::Enum(table))
}

pub fn boolean() -> Arc<Xdr> {
    Arc::new(Xdr::Enum(BOOL_TABLE))
}

pub fn float() -> Arc<Xdr> {
    Arc::new(Xdr::Float)
}

pub fn double() -> Arc<Xdr> {
    Arc::new(Xdr::Double)
}

pub fn fixed_string(n: usize) -> Arc<Xdr> {
    Arc::new(Xdr::FixedString(n))
}

pub fn fixed_opaque(n: usize) -> Arc<Xdr> {
    Arc::new(Xdr::FixedOpaque(n))
}

pub fn string(limit: usize) -> Arc<Xdr> {
    Arc::new(Xdr::String(Some(limit)))
}

pub fn opaque(limit: usize) -> Arc<Xdr> {
    Arc::new(Xdr::Opaque(Some(limit)))
}

pub fn fixed_array(elem: Arc<Xdr>, n: usize) -> Arc<Xdr> {
    Arc::new(Xdr::FixedArray(elem, n))
}

pub fn array(elem: Arc<Xdr>, limit: usize) -> Arc<Xdr> {
    Arc::new(Xdr::Array(elem, Some(limit)))
}

pub fn optional(elem: Arc<Xdr>) -> Arc<Xdr> {
    Arc::new(Xdr::Optional(elem))
}

pub fn structure(fields: Fields) -> Arc<Xdr> {
    Arc::new(Xdr::Struct(fields))
}

pub fn union(disc: Arc<Xdr>, arms: Vec<(Value, Fields)>, default_arm: Option<Fields>) -> Arc<Xdr> {
    Arc::new(Xdr::Union(UnionType { disc, arms, default_arm }))
}

impl Xdr {
    /// Encodes `value` into `dest`. The output length is always a
    /// multiple of four bytes. Fails when the value does not fit the
    /// descriptor, e.g. a missing structure component.
    pub fn encode(&self, value: &Value, dest: &mut impl Write) -> std::io::Result<()> {
        match self {
            Xdr::Void => Ok(()),
            Xdr::Int => {
                let v = value.as_i32().ok_or_else(|| invalid_data("expected integer value"))?;
                dest.write_i32::<XdrEndian>(v)
            }
            Xdr::Uint => {
                let v =
                    value.as_u32().ok_or_else(|| invalid_data("expected unsigned value"))?;
                dest.write_u32::<XdrEndian>(v)
            }
            Xdr::Enum(table) => {
                let name =
                    value.name().ok_or_else(|| invalid_data("expected enumeration name"))?;
                let Some((_, wire)) = table.iter().find(|(n, _)| *n == name) else {
                    return Err(invalid_data(format!("unknown enumeration name {name}")));
                };
                dest.write_i32::<XdrEndian>(*wire)
            }
            Xdr::Float => match *value {
                Value::Float(v) => dest.write_f32::<XdrEndian>(v),
                _ => Err(invalid_data("expected float value")),
            },
            Xdr::Double => match *value {
                Value::Double(v) => dest.write_f64::<XdrEndian>(v),
                _ => Err(invalid_data("expected double value")),
            },
            Xdr::FixedString(n) | Xdr::FixedOpaque(n) => {
                let bytes = value.as_bytes().ok_or_else(|| invalid_data("expected bytes"))?;
                // Short values are zero padded to the declared width,
                // long ones truncated.
                let take = bytes.len().min(*n);
                dest.write_all(&bytes[..take])?;
                for _ in take..*n {
                    dest.write_all(&[0])?;
                }
                write_padding(*n, dest)
            }
            Xdr::String(limit) | Xdr::Opaque(limit) => {
                let bytes = value.as_bytes().ok_or_else(|| invalid_data("expected bytes"))?;
                let n = match limit {
                    Some(limit) => bytes.len().min(*limit),
                    None => bytes.len(),
                };
                write_len(n, dest)?;
                dest.write_all(&bytes[..n])?;
                write_padding(n, dest)
            }
            Xdr::FixedArray(elem, n) => {
                let Value::List(items) = value else {
                    return Err(invalid_data("expected list value"));
                };
                if items.len() != *n {
                    return Err(invalid_data(format!(
                        "fixed array expects {n} elements, got {}",
                        items.len()
                    )));
                }
                for item in items {
                    elem.encode(item, dest)?;
                }
                Ok(())
            }
            Xdr::Array(elem, limit) => {
                let Value::List(items) = value else {
                    return Err(invalid_data("expected list value"));
                };
                let n = match limit {
                    Some(limit) => items.len().min(*limit),
                    None => items.len(),
                };
                write_len(n, dest)?;
                for item in &items[..n] {
                    elem.encode(item, dest)?;
                }
                Ok(())
            }
            Xdr::Optional(elem) => match value {
                Value::Void => write_len(0, dest),
                present => {
                    write_len(1, dest)?;
                    elem.encode(present, dest)
                }
            },
            Xdr::Struct(fields) => encode_fields(fields, value, dest),
            Xdr::Union(u) => {
                let disc = value
                    .discriminant()
                    .ok_or_else(|| invalid_data("expected union value"))?;
                u.disc.encode(disc, dest)?;
                match u.select(disc) {
                    Some(arm) => encode_fields(arm, value, dest),
                    None => Ok(()),
                }
            }
            Xdr::Deferred(slot) => slot.get()?.encode(value, dest),
        }
    }

    pub fn encode_to_vec(&self, value: &Value) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(value, &mut buf)?;
        Ok(buf)
    }

    /// Decodes one value from the front of `src`, consuming exactly
    /// the bytes the descriptor declares. Truncated input and wire
    /// values outside the descriptor's domain (unknown enumeration
    /// constants, out-of-range lengths) fail with `InvalidData` or
    /// `UnexpectedEof` rather than reading past the buffer.
    pub fn decode(&self, src: &mut impl Read) -> std::io::Result<Value> {
        match self {
            Xdr::Void => Ok(Value::Void),
            Xdr::Int => Ok(Value::Int(src.read_i32::<XdrEndian>()?)),
            Xdr::Uint => Ok(Value::Uint(src.read_u32::<XdrEndian>()?)),
            Xdr::Enum(table) => {
                let wire = src.read_i32::<XdrEndian>()?;
                let Some((name, _)) = table.iter().find(|(_, v)| *v == wire) else {
                    return Err(invalid_data(format!("unknown enumeration value {wire}")));
                };
                Ok(Value::Name(name))
            }
            Xdr::Float => Ok(Value::Float(src.read_f32::<XdrEndian>()?)),
            Xdr::Double => Ok(Value::Double(src.read_f64::<XdrEndian>()?)),
            Xdr::FixedString(n) => {
                let mut buf = vec![0; *n];
                src.read_exact(&mut buf)?;
                read_padding(*n, src)?;
                String::from_utf8(buf)
                    .map(Value::Str)
                    .map_err(|_| invalid_data("string is not valid UTF-8"))
            }
            Xdr::FixedOpaque(n) => {
                let mut buf = vec![0; *n];
                src.read_exact(&mut buf)?;
                read_padding(*n, src)?;
                Ok(Value::Bytes(buf))
            }
            Xdr::String(limit) => {
                let buf = read_counted(src, limit)?;
                String::from_utf8(buf)
                    .map(Value::Str)
                    .map_err(|_| invalid_data("string is not valid UTF-8"))
            }
            Xdr::Opaque(limit) => Ok(Value::Bytes(read_counted(src, limit)?)),
            Xdr::FixedArray(elem, n) => {
                let mut items = Vec::with_capacity(*n);
                for _ in 0..*n {
                    items.push(elem.decode(src)?);
                }
                Ok(Value::List(items))
            }
            Xdr::Array(elem, limit) => {
                let count = read_len(src)?;
                if let Some(limit) = limit {
                    if count > *limit {
                        return Err(invalid_data(format!(
                            "array length {count} exceeds maximum {limit}"
                        )));
                    }
                }
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(elem.decode(src)?);
                }
                Ok(Value::List(items))
            }
            Xdr::Optional(elem) => match read_len(src)? {
                0 => Ok(Value::Void),
                1 => elem.decode(src),
                n => Err(invalid_data(format!("optional data with count {n}"))),
            },
            Xdr::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, ty) in fields {
                    out.push((*name, ty.decode(src)?));
                }
                Ok(Value::Struct(out))
            }
            Xdr::Union(u) => {
                let disc = u.disc.decode(src)?;
                let mut out = Vec::new();
                if let Some(arm) = u.select(&disc) {
                    for (name, ty) in arm {
                        out.push((*name, ty.decode(src)?));
                    }
                }
                Ok(Value::Union(Box::new(disc), out))
            }
            Xdr::Deferred(slot) => slot.get()?.decode(src),
        }
    }
}

fn encode_fields(
    fields: &Fields,
    value: &Value,
    dest: &mut impl Write,
) -> std::io::Result<()> {
    for (name, ty) in fields {
        let Some(component) = value.field(name) else {
            return Err(invalid_data(format!("missing structure component {name}")));
        };
        ty.encode(component, dest)?;
    }
    Ok(())
}

fn read_counted(src: &mut impl Read, limit: &Option<usize>) -> std::io::Result<Vec<u8>> {
    let len = read_len(src)?;
    if let Some(limit) = limit {
        if len > *limit {
            return Err(invalid_data(format!("length {len} exceeds maximum {limit}")));
        }
    }
    let mut buf = vec![0; len];
    src.read_exact(&mut buf)?;
    read_padding(len, src)?;
    Ok(buf)
}

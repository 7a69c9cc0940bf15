//! # Protobuf Wire Primitives
//!
//! Just enough of the protobuf encoding to emit OTLP metrics: varints,
//! 64-bit fixed fields and length-delimited fields. Every writer has a
//! matching length function so callers can size a message exactly before
//! writing it.

use bytes::BufMut;

/// Protobuf wire types used by OTLP metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
}

/// Encoded size of a base-128 varint
pub const fn varint_len(value: u64) -> usize {
    let mut len = 1;
    let mut v = value >> 7;
    while v != 0 {
        len += 1;
        v >>= 7;
    }
    len
}

/// Encoded size of a field key
pub const fn key_len(field: u32) -> usize {
    varint_len((field as u64) << 3)
}

/// Encoded size of a fixed64/double field
pub const fn fixed64_field_len(field: u32) -> usize {
    key_len(field) + 8
}

/// Encoded size of a length-delimited field carrying `payload_len` bytes
pub const fn len_field_len(field: u32, payload_len: usize) -> usize {
    key_len(field) + varint_len(payload_len as u64) + payload_len
}

/// Encoded size of a string field, zero when proto3 would omit it
pub const fn str_field_len(field: u32, value: &str) -> usize {
    if value.is_empty() {
        0
    } else {
        len_field_len(field, value.len())
    }
}

pub fn put_varint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn put_key<B: BufMut>(buf: &mut B, field: u32, wire_type: WireType) {
    put_varint(buf, (u64::from(field) << 3) | wire_type as u64);
}

pub fn put_fixed64<B: BufMut>(buf: &mut B, field: u32, value: u64) {
    put_key(buf, field, WireType::Fixed64);
    buf.put_u64_le(value);
}

pub fn put_sfixed64<B: BufMut>(buf: &mut B, field: u32, value: i64) {
    put_key(buf, field, WireType::Fixed64);
    buf.put_i64_le(value);
}

pub fn put_double<B: BufMut>(buf: &mut B, field: u32, value: f64) {
    put_key(buf, field, WireType::Fixed64);
    buf.put_f64_le(value);
}

/// Key and length prefix of a length-delimited field; the caller writes
/// exactly `payload_len` bytes next
pub fn put_len_prefix<B: BufMut>(buf: &mut B, field: u32, payload_len: usize) {
    put_key(buf, field, WireType::LengthDelimited);
    put_varint(buf, payload_len as u64);
}

/// String field, skipped when empty
pub fn put_str<B: BufMut>(buf: &mut B, field: u32, value: &str) {
    if value.is_empty() {
        return;
    }
    put_len_prefix(buf, field, value.len());
    buf.put_slice(value.as_bytes());
}

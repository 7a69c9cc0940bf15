//! Minimal protobuf reader for inspecting encoded payloads in tests

use bytes::Buf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match self.value {
            Value::Bytes(b) => b,
            other => panic!("field {} is not length-delimited: {:?}", self.number, other),
        }
    }

    pub fn fixed64(&self) -> u64 {
        match self.value {
            Value::Fixed64(v) => v,
            other => panic!("field {} is not fixed64: {:?}", self.number, other),
        }
    }
}

fn varint(buf: &mut &[u8]) -> u64 {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
        assert!(shift < 64, "varint too long");
    }
}

/// Split one message into its top-level fields; panics on malformed input
pub fn message(mut buf: &[u8]) -> Vec<Field<'_>> {
    let mut fields = Vec::new();
    while buf.has_remaining() {
        let key = varint(&mut buf);
        let number = (key >> 3) as u32;
        let value = match key & 0x7 {
            0 => Value::Varint(varint(&mut buf)),
            1 => Value::Fixed64(buf.get_u64_le()),
            2 => {
                let len = varint(&mut buf) as usize;
                assert!(len <= buf.len(), "field {} overruns message", number);
                let (head, tail) = buf.split_at(len);
                buf = tail;
                Value::Bytes(head)
            }
            5 => Value::Fixed32(buf.get_u32_le()),
            other => panic!("unsupported wire type {}", other),
        };
        fields.push(Field { number, value });
    }
    fields
}

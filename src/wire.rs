//! Compact binary key-value map codec for server-to-client frames.
//!
//! Frames are MessagePack maps with string keys; values are integers,
//! booleans, strings, byte blobs, arrays, and nested maps. Encoding goes
//! through the `rmp` primitives so the byte format is canonical
//! MessagePack; [`Value::decode`] is a small total reader over the same
//! subset, used by the round-trip tests and admin tooling (browser
//! clients decode with their own MessagePack library).
//!
//! Cell, style, row-id, and grapheme payloads are pre-packed byte blobs
//! ([`Value::Bin`]); this codec never looks inside them.

// Rust guideline compliant 2026-03

use anyhow::{bail, Context, Result};

/// A dynamically typed wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Non-negative integer.
    Uint(u64),
    /// Negative integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Str(String),
    /// Opaque byte blob.
    Bin(Vec<u8>),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// String-keyed map; entry order is preserved.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Build a map from `(key, value)` pairs.
    #[must_use]
    pub fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Build a string value.
    #[must_use]
    pub fn str(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    /// Look up a key in a map value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Integer view accepting both signed and unsigned encodings.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Signed integer view.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String view.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Byte-blob view.
    #[must_use]
    pub fn as_bin(&self) -> Option<&[u8]> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    /// Array view.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Encode to MessagePack bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, wr: &mut Vec<u8>) {
        use rmp::encode as enc;
        // Writes into a Vec cannot fail.
        const MSG: &str = "msgpack write to Vec cannot fail";
        match self {
            Value::Uint(v) => {
                enc::write_uint(wr, *v).expect(MSG);
            }
            Value::Int(v) => {
                enc::write_sint(wr, *v).expect(MSG);
            }
            Value::Bool(b) => enc::write_bool(wr, *b).expect(MSG),
            Value::Str(s) => enc::write_str(wr, s).expect(MSG),
            Value::Bin(b) => enc::write_bin(wr, b).expect(MSG),
            Value::Array(items) => {
                enc::write_array_len(wr, items.len() as u32).expect(MSG);
                for item in items {
                    item.encode_into(wr);
                }
            }
            Value::Map(entries) => {
                enc::write_map_len(wr, entries.len() as u32).expect(MSG);
                for (key, value) in entries {
                    enc::write_str(wr, key).expect(MSG);
                    value.encode_into(wr);
                }
            }
        }
    }

    /// Decode a single value, requiring the input to be fully consumed.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input, trailing bytes, or markers
    /// outside the protocol subset (nil, floats, extensions).
    pub fn decode(bytes: &[u8]) -> Result<Value> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        let value = reader.value()?;
        if reader.pos != bytes.len() {
            bail!(
                "trailing bytes after value: {} of {}",
                bytes.len() - reader.pos,
                bytes.len()
            );
        }
        Ok(value)
    }

    /// Convert a JSON tree (layout frames, admin payloads) to wire form.
    ///
    /// # Errors
    ///
    /// Returns an error for nulls and non-integral numbers, which the
    /// protocol does not carry.
    pub fn from_json(json: &serde_json::Value) -> Result<Value> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(Value::Uint(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else {
                    bail!("non-integral number in wire payload: {n}")
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Array(items) => Ok(Value::Array(
                items.iter().map(Value::from_json).collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(obj) => Ok(Value::Map(
                obj.iter()
                    .map(|(k, v)| Ok((k.clone(), Value::from_json(v)?)))
                    .collect::<Result<_>>()?,
            )),
            serde_json::Value::Null => bail!("null in wire payload"),
        }
    }
}

/// Cursor over a MessagePack byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.buf.len() {
            bail!("truncated msgpack input at offset {}", self.pos);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().expect("len 2")))
    }

    fn be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().expect("len 4")))
    }

    fn be_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().expect("len 8")))
    }

    fn str_value(&mut self, len: usize) -> Result<Value> {
        let bytes = self.take(len)?;
        Ok(Value::Str(
            std::str::from_utf8(bytes)
                .context("invalid UTF-8 in msgpack string")?
                .to_string(),
        ))
    }

    fn array_value(&mut self, len: usize) -> Result<Value> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.value()?);
        }
        Ok(Value::Array(items))
    }

    fn map_value(&mut self, len: usize) -> Result<Value> {
        let mut entries = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = match self.value()? {
                Value::Str(s) => s,
                other => bail!("non-string map key: {other:?}"),
            };
            entries.push((key, self.value()?));
        }
        Ok(Value::Map(entries))
    }

    fn value(&mut self) -> Result<Value> {
        let marker = self.byte()?;
        match marker {
            0x00..=0x7f => Ok(Value::Uint(u64::from(marker))),
            0x80..=0x8f => self.map_value(usize::from(marker & 0x0f)),
            0x90..=0x9f => self.array_value(usize::from(marker & 0x0f)),
            0xa0..=0xbf => self.str_value(usize::from(marker & 0x1f)),
            0xc2 => Ok(Value::Bool(false)),
            0xc3 => Ok(Value::Bool(true)),
            0xc4 => {
                let len = usize::from(self.byte()?);
                Ok(Value::Bin(self.take(len)?.to_vec()))
            }
            0xc5 => {
                let len = usize::from(self.be_u16()?);
                Ok(Value::Bin(self.take(len)?.to_vec()))
            }
            0xc6 => {
                let len = self.be_u32()? as usize;
                Ok(Value::Bin(self.take(len)?.to_vec()))
            }
            0xcc => Ok(Value::Uint(u64::from(self.byte()?))),
            0xcd => Ok(Value::Uint(u64::from(self.be_u16()?))),
            0xce => Ok(Value::Uint(u64::from(self.be_u32()?))),
            0xcf => Ok(Value::Uint(self.be_u64()?)),
            0xd0 => Ok(Value::Int(i64::from(self.byte()? as i8))),
            0xd1 => Ok(Value::Int(i64::from(self.be_u16()? as i16))),
            0xd2 => Ok(Value::Int(i64::from(self.be_u32()? as i32))),
            0xd3 => Ok(Value::Int(self.be_u64()? as i64)),
            0xd9 => {
                let len = usize::from(self.byte()?);
                self.str_value(len)
            }
            0xda => {
                let len = usize::from(self.be_u16()?);
                self.str_value(len)
            }
            0xdb => {
                let len = self.be_u32()? as usize;
                self.str_value(len)
            }
            0xdc => {
                let len = usize::from(self.be_u16()?);
                self.array_value(len)
            }
            0xdd => {
                let len = self.be_u32()? as usize;
                self.array_value(len)
            }
            0xde => {
                let len = usize::from(self.be_u16()?);
                self.map_value(len)
            }
            0xdf => {
                let len = self.be_u32()? as usize;
                self.map_value(len)
            }
            0xe0..=0xff => Ok(Value::Int(i64::from(marker as i8))),
            other => bail!("unsupported msgpack marker 0x{other:02x}"),
        }
    }
}

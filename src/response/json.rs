//! Fixed-capacity JSON document.
//!
//! The body is parsed with `serde_json` and charged against a fixed arena
//! budget the way a static document pool on the device would be: one slot per
//! object member or array element, plus every distinct string with its NUL
//! terminator. Charging happens while parsing, so an oversized body is
//! rejected as soon as it overflows instead of being read to the end.
//!
//! # Example
//!
//! ```
//! use weather_fetch_esp32::response::{DeserializeError, JsonDocument};
//!
//! let doc = JsonDocument::from_slice(br#"{"a":1,"b":"xy"}"#, 768).unwrap();
//! assert_eq!(doc.memory_usage(), 39);
//! assert_eq!(doc.to_json_string(), r#"{"a":1,"b":"xy"}"#);
//!
//! let err = JsonDocument::from_slice(br#"{"a":1,"b":"xy"}"#, 32).unwrap_err();
//! assert_eq!(err, DeserializeError::NoMemory);
//! ```

use log::debug;
use serde::de::{self, DeserializeSeed, Error as _, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Read};

/// Arena size used for the weather response.
pub const DEFAULT_CAPACITY: usize = 768;

/// Bytes charged per object member or array element.
pub const SLOT_SIZE: usize = 16;

/// Maximum nesting of objects and arrays.
pub const NESTING_LIMIT: usize = 10;

/// Longest escape for a single stored byte (`\u0001`).
const MAX_ESCAPE_LEN: usize = 6;

/// A parsed JSON value bounded by a fixed memory budget.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    root: Value,
    capacity: usize,
    memory_usage: usize,
}

impl JsonDocument {
    /// Read exactly one JSON value from `reader`.
    ///
    /// Reading stops at the end of the value, or as soon as the document
    /// overflows `capacity`. Bytes after an object or array are left unread.
    pub fn deserialize<R: Read>(reader: R, capacity: usize) -> Result<Self, DeserializeError> {
        let mut arena = Arena::new(capacity);
        let mut tracked = TrackingReader::new(reader, capacity.saturating_mul(MAX_ESCAPE_LEN));

        let result = {
            let mut de = serde_json::Deserializer::from_reader(&mut tracked);
            ValueSeed {
                arena: &mut arena,
                depth: 0,
            }
            .deserialize(&mut de)
        };

        match result {
            Ok(root) => {
                debug!("Read {} JSON bytes", tracked.count);
                Ok(Self {
                    root,
                    capacity,
                    memory_usage: arena.usage(),
                })
            }
            Err(e) => {
                let error = match arena.failure {
                    Some(failure) => failure,
                    None if tracked.overflow => DeserializeError::NoMemory,
                    None => DeserializeError::classify(&e, tracked.started),
                };
                debug!("Deserialize failed after {} bytes: {}", tracked.count, e);
                Err(error)
            }
        }
    }

    /// Parse a complete in-memory payload.
    pub fn from_slice(bytes: &[u8], capacity: usize) -> Result<Self, DeserializeError> {
        Self::deserialize(bytes, capacity)
    }

    /// Bytes of the arena in use.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Size of the arena.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Compact serialization with member order preserved.
    pub fn to_json_string(&self) -> String {
        self.root.to_string()
    }
}

/// Arena accounting for one document.
struct Arena {
    capacity: usize,
    slots: usize,
    strings: HashSet<String>,
    string_bytes: usize,
    /// First budget violation, if parsing was aborted by one.
    failure: Option<DeserializeError>,
}

impl Arena {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: 0,
            strings: HashSet::new(),
            string_bytes: 0,
            failure: None,
        }
    }

    fn enter(&mut self, depth: usize) -> Result<(), DeserializeError> {
        if depth > NESTING_LIMIT {
            return self.fail(DeserializeError::TooDeep);
        }
        Ok(())
    }

    fn slot(&mut self) -> Result<(), DeserializeError> {
        self.slots += 1;
        self.check()
    }

    fn intern(&mut self, s: &str) -> Result<(), DeserializeError> {
        if !self.strings.contains(s) {
            self.string_bytes += s.len() + 1;
            self.strings.insert(s.to_owned());
        }
        self.check()
    }

    fn check(&mut self) -> Result<(), DeserializeError> {
        if self.usage() > self.capacity {
            debug!(
                "Document needs at least {} bytes, capacity is {}",
                self.usage(),
                self.capacity
            );
            return self.fail(DeserializeError::NoMemory);
        }
        Ok(())
    }

    fn fail(&mut self, error: DeserializeError) -> Result<(), DeserializeError> {
        self.failure = Some(error);
        Err(error)
    }

    fn usage(&self) -> usize {
        self.slots * SLOT_SIZE + self.string_bytes
    }
}

/// Builds a [`Value`] while charging it to the arena.
struct ValueSeed<'a> {
    arena: &'a mut Arena,
    /// Nesting depth of the value's parent.
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(v.into()))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        self.arena.intern(v).map_err(E::custom)?;
        Ok(Value::String(v.to_owned()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let depth = self.depth + 1;
        self.arena.enter(depth).map_err(A::Error::custom)?;

        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(ValueSeed {
            arena: &mut *self.arena,
            depth,
        })? {
            self.arena.slot().map_err(A::Error::custom)?;
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let depth = self.depth + 1;
        self.arena.enter(depth).map_err(A::Error::custom)?;

        let mut object = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            self.arena.intern(&key).map_err(A::Error::custom)?;
            let value = map.next_value_seed(ValueSeed {
                arena: &mut *self.arena,
                depth,
            })?;
            self.arena.slot().map_err(A::Error::custom)?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}

/// Watches the raw bytes pulled by the parser.
///
/// Records whether a value has started and refuses string literals too long
/// to ever fit the arena, so the parser's scratch buffer stays bounded.
struct TrackingReader<R> {
    inner: R,
    count: usize,
    /// A non-whitespace byte has been seen.
    started: bool,
    in_string: bool,
    escaped: bool,
    run: usize,
    max_run: usize,
    overflow: bool,
}

impl<R> TrackingReader<R> {
    fn new(inner: R, max_run: usize) -> Self {
        Self {
            inner,
            count: 0,
            started: false,
            in_string: false,
            escaped: false,
            run: 0,
            max_run,
            overflow: false,
        }
    }

    fn scan(&mut self, byte: u8) {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                return;
            }
            self.run += 1;
            if self.run > self.max_run {
                self.overflow = true;
            }
        } else if !matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
            self.started = true;
            if byte == b'"' {
                self.in_string = true;
                self.run = 0;
            }
        }
    }
}

impl<R: Read> Read for TrackingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        for &byte in &buf[..n] {
            self.scan(byte);
        }
        if self.overflow {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "string literal exceeds arena",
            ));
        }
        Ok(n)
    }
}

/// Why a document could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeserializeError {
    /// No value before the end of input.
    EmptyInput,
    /// Input ended (or timed out) in the middle of a value.
    IncompleteInput,
    /// Input is not valid JSON.
    InvalidInput,
    /// The document does not fit in the arena.
    NoMemory,
    /// Nesting exceeds [`NESTING_LIMIT`].
    TooDeep,
}

impl DeserializeError {
    /// Short name printed on the console.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EmptyInput",
            Self::IncompleteInput => "IncompleteInput",
            Self::InvalidInput => "InvalidInput",
            Self::NoMemory => "NoMemory",
            Self::TooDeep => "TooDeep",
        }
    }

    fn classify(e: &serde_json::Error, started: bool) -> Self {
        match e.classify() {
            Category::Eof | Category::Io if !started => Self::EmptyInput,
            Category::Eof | Category::Io => Self::IncompleteInput,
            Category::Syntax | Category::Data => Self::InvalidInput,
        }
    }
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for DeserializeError {}

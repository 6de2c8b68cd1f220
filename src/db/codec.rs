//! Wire codec for the signed proxy protocol
//!
//! Big-endian, length-prefixed layout, kept byte-compatible with deployed
//! data servers:
//!
//! ```text
//! request:  int64  timestamp
//!           uint32 num_keys;   repeated: uint32 len, key bytes
//!           uint32 num_values; repeated: uint32 len, value bytes
//!           uint32 sig_len; signature bytes
//! response: uint32 num_entries; repeated: uint32 klen, key, uint32 vlen, value
//!           uint32 err_len; error message bytes
//! ```
//!
//! The signature covers exactly the bytes produced by
//! [`encode_signed_portion`], i.e. everything before the signature field.

use crate::error::{Error, Result};

/// Upper bound on any single length prefix, so a malformed frame cannot
/// trigger a huge allocation
const MAX_FIELD_LEN: usize = 1 << 20;

/// Upper bound on repeated-element counts
const MAX_COUNT: u32 = 4096;

/// A decoded signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    /// Unix seconds at signing time; doubles as the replay marker
    pub timestamp: i64,
    /// Keys to read, or to write when `values` is non-empty
    pub keys: Vec<String>,
    /// Values to store; empty for reads
    pub values: Vec<Vec<u8>>,
    /// Recoverable signature over the other three fields
    pub signature: Vec<u8>,
}

/// A decoded response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponsePayload {
    /// Key/value pairs found
    pub entries: Vec<(String, Vec<u8>)>,
    /// Error message; empty on success
    pub error: String,
}

impl ResponsePayload {
    /// Build an error response
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            error: message.into(),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::proxy(format!(
                "truncated frame: need {n} bytes at offset {}, have {}",
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_i64(&mut self) -> Result<i64> {
        let raw = self.take(8)?;
        Ok(i64::from_be_bytes(raw.try_into().expect("8 bytes")))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes(raw.try_into().expect("4 bytes")))
    }

    fn read_count(&mut self) -> Result<u32> {
        let n = self.read_u32()?;
        if n > MAX_COUNT {
            return Err(Error::proxy(format!("element count {n} exceeds limit")));
        }
        Ok(n)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > MAX_FIELD_LEN {
            return Err(Error::proxy(format!("field length {len} exceeds limit")));
        }
        Ok(self.take(len)?.to_vec())
    }

    fn read_string(&mut self) -> Result<String> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw).map_err(|e| Error::proxy(format!("non-utf8 key: {e}")))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::proxy(format!(
                "{} trailing bytes after frame",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Encode the signed portion of a request: timestamp, keys and values
///
/// This is both the wire prefix and the exact preimage of the request
/// signature digest.
pub fn encode_signed_portion(timestamp: i64, keys: &[String], values: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(&(keys.len() as u32).to_be_bytes());
    for key in keys {
        write_bytes(&mut out, key.as_bytes());
    }
    out.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for value in values {
        write_bytes(&mut out, value);
    }
    out
}

/// Encode a full request for transport
pub fn encode_request(req: &RequestPayload) -> Result<Vec<u8>> {
    if req.keys.is_empty() {
        return Err(Error::proxy("no keys in request"));
    }
    if req.signature.is_empty() {
        return Err(Error::proxy("cannot encode a request without a signature"));
    }
    if !req.values.is_empty() && req.values.len() != req.keys.len() {
        return Err(Error::proxy(
            "keys and values must have the same array dimensions",
        ));
    }
    let mut out = encode_signed_portion(req.timestamp, &req.keys, &req.values);
    write_bytes(&mut out, &req.signature);
    Ok(out)
}

/// Decode a request frame; signature verification is the caller's job
pub fn decode_request(data: &[u8]) -> Result<RequestPayload> {
    let mut r = Reader::new(data);
    let timestamp = r.read_i64()?;
    let num_keys = r.read_count()?;
    let mut keys = Vec::with_capacity(num_keys as usize);
    for _ in 0..num_keys {
        keys.push(r.read_string()?);
    }
    let num_values = r.read_count()?;
    let mut values = Vec::with_capacity(num_values as usize);
    for _ in 0..num_values {
        values.push(r.read_bytes()?);
    }
    let signature = r.read_bytes()?;
    r.finish()?;
    if keys.is_empty() {
        return Err(Error::proxy("no keys in incoming request"));
    }
    Ok(RequestPayload {
        timestamp,
        keys,
        values,
        signature,
    })
}

/// Encode a response frame
pub fn encode_response(resp: &ResponsePayload) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(resp.entries.len() as u32).to_be_bytes());
    for (key, value) in &resp.entries {
        write_bytes(&mut out, key.as_bytes());
        write_bytes(&mut out, value);
    }
    write_bytes(&mut out, resp.error.as_bytes());
    out
}

/// Decode a response frame
pub fn decode_response(data: &[u8]) -> Result<ResponsePayload> {
    let mut r = Reader::new(data);
    let num_entries = r.read_count()?;
    let mut entries = Vec::with_capacity(num_entries as usize);
    for _ in 0..num_entries {
        let key = r.read_string()?;
        let value = r.read_bytes()?;
        entries.push((key, value));
    }
    let error = r.read_string()?;
    r.finish()?;
    Ok(ResponsePayload { entries, error })
}

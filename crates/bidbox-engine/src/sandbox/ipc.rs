//! Sandbox IPC framing.
//!
//! Frames are a 4-byte big-endian length followed by a postcard-encoded
//! message. Each request is answered by exactly one response.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use bidbox_common::status::{Result, Status, StatusKind};

use crate::function::FunctionRole;

/// Upper bound on a single frame. Large enough for any realistic script or
/// batch, small enough to stop a corrupted length prefix from allocating
/// wildly.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Everything the worker needs to compile its one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileSpec {
    pub source: String,
    pub role: FunctionRole,
    pub flatten_arguments: bool,
    pub async_wait_ms: u64,
}

/// Host-to-worker request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Compile the worker's single function. Legal exactly once.
    Compile(CompileSpec),
    /// Invoke the compiled function once per JSON-encoded input, in order.
    BatchExecute { inputs: Vec<String> },
    /// Shut the worker down cleanly.
    Exit,
}

/// Worker-to-host response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// The `Compile` request succeeded.
    Compiled,
    /// JSON-encoded outputs of a `BatchExecute`, in input order.
    Outputs(Vec<String>),
    /// The request failed; carries the encoded status.
    Failure(WireStatus),
    /// Acknowledgement of `Exit`.
    Exiting,
}

/// A [`Status`] encoded by its canonical numeric code for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStatus {
    pub code: i32,
    pub message: String,
}

impl WireStatus {
    pub fn encode(status: &Status) -> Self {
        Self { code: status.kind().canonical_code(), message: status.message().to_string() }
    }

    pub fn decode(self) -> Status {
        match StatusKind::from_canonical_code(self.code) {
            Some(kind) => Status::new(kind, self.message),
            None => Status::internal(format!(
                "Unknown status code {} from sandbox: {}",
                self.code, self.message
            )),
        }
    }
}

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let payload = postcard::to_allocvec(message)
        .map_err(|e| Status::internal(format!("Unable to encode a sandbox frame: {e}")))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Status::internal(format!(
            "Sandbox frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let length = payload.len() as u32;
    writer
        .write_all(&length.to_be_bytes())
        .and_then(|_| writer.write_all(&payload))
        .and_then(|_| writer.flush())
        .map_err(|e| Status::internal(format!("Unable to write a sandbox frame: {e}")))
}

/// Reads one length-prefixed frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut length_bytes = [0u8; 4];
    reader
        .read_exact(&mut length_bytes)
        .map_err(|e| Status::internal(format!("Unable to read a sandbox frame: {e}")))?;
    let length = u32::from_be_bytes(length_bytes) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(Status::internal(format!(
            "Sandbox frame of {length} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
        )));
    }
    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .map_err(|e| Status::internal(format!("Unable to read a sandbox frame: {e}")))?;
    postcard::from_bytes(&payload)
        .map_err(|e| Status::internal(format!("Unable to decode a sandbox frame: {e}")))
}

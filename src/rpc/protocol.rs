//! # RPC Wire Protocol
//!
//! Every message is one frame: a 4-byte big-endian length followed by that
//! many bytes of JSON. Requests carry a method name, the JSON-encoded request
//! struct and optional call metadata; responses echo the request id.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::api::ApiError;

/// Largest frame either side accepts
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

pub const METHOD_CREATE_USER: &str = "SimpleBank/CreateUser";
pub const METHOD_LOGIN_USER: &str = "SimpleBank/LoginUser";
pub const METHOD_UPDATE_USER: &str = "SimpleBank/UpdateUser";
pub const METHOD_VERIFY_EMAIL: &str = "SimpleBank/VerifyEmail";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    /// `Authorization` metadata, e.g. `Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Result<serde_json::Value, ApiError>,
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Failed to bind RPC listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("RPC codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Response id {actual} does not match request id {expected}")]
    IdMismatch { expected: u64, actual: u64 },

    /// The call reached the server and failed there
    #[error(transparent)]
    Status(#[from] ApiError),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Read one frame; `Ok(None)` on a clean end of stream before a frame starts
pub async fn read_frame<R>(reader: &mut R) -> RpcResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_be_bytes(len_buf) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = vec![0u8; size];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> RpcResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_message<R, T>(reader: &mut R) -> RpcResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
        None => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> RpcResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    write_frame(writer, &serde_json::to_vec(message)?).await
}

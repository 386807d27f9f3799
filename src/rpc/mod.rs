//! # RPC Endpoint
//!
//! Binary front-end: length-prefixed JSON frames over TCP, dispatched to the
//! same [`BankService`](crate::api::BankService) the HTTP gateway uses.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use protocol::{RpcError, RpcRequest, RpcResponse, RpcResult, MAX_FRAME_SIZE};
pub use server::{dispatch, RpcServer};

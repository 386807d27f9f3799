//! RPC client for the length-prefixed JSON protocol.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::protocol::{
    read_message, write_message, RpcError, RpcRequest, RpcResponse, RpcResult,
    METHOD_CREATE_USER, METHOD_LOGIN_USER, METHOD_UPDATE_USER, METHOD_VERIFY_EMAIL,
};
use crate::api::{
    CreateUserRequest, CreateUserResponse, LoginUserRequest, LoginUserResponse,
    UpdateUserRequest, UpdateUserResponse, VerifyEmailRequest, VerifyEmailResponse,
};

/// One connection; calls are issued sequentially
pub struct RpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
    authorization: Option<String>,
}

impl RpcClient {
    pub async fn connect(address: impl ToSocketAddrs) -> RpcResult<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 1,
            authorization: None,
        })
    }

    /// Attach `Authorization: Bearer <token>` metadata to subsequent calls
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {token}"));
        self
    }

    pub async fn call<Req, Resp>(&mut self, method: &str, request: &Req) -> RpcResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest {
            id,
            method: method.to_string(),
            authorization: self.authorization.clone(),
            params: serde_json::to_value(request)?,
        };
        write_message(&mut self.writer, &request).await?;

        let response: RpcResponse = read_message(&mut self.reader)
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        if response.id != id {
            return Err(RpcError::IdMismatch {
                expected: id,
                actual: response.id,
            });
        }
        Ok(serde_json::from_value(response.result?)?)
    }

    pub async fn create_user(&mut self, req: &CreateUserRequest) -> RpcResult<CreateUserResponse> {
        self.call(METHOD_CREATE_USER, req).await
    }

    pub async fn login_user(&mut self, req: &LoginUserRequest) -> RpcResult<LoginUserResponse> {
        self.call(METHOD_LOGIN_USER, req).await
    }

    pub async fn update_user(&mut self, req: &UpdateUserRequest) -> RpcResult<UpdateUserResponse> {
        self.call(METHOD_UPDATE_USER, req).await
    }

    pub async fn verify_email(
        &mut self,
        req: &VerifyEmailRequest,
    ) -> RpcResult<VerifyEmailResponse> {
        self.call(METHOD_VERIFY_EMAIL, req).await
    }
}

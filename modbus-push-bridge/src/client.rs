//! Modbus-TCP client seam.
//!
//! [`Connector`] opens a session and hands back a [`RegisterClient`]. The
//! production implementation is backed by `tokio-modbus`; tests substitute
//! in-memory fakes.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info};

/// Failure to open a session with the device.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("No register addresses configured")]
    NoRegisters,
    #[error("Network failure: {0}")]
    NetworkFailure(String),
}

/// Failure of a single register read.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Device exception: {0}")]
    Device(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Device returned no register values")]
    EmptyResponse,
}

/// Register access on an open Modbus session.
#[async_trait]
pub trait RegisterClient: Send {
    /// Read `count` input registers starting at `address`.
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError>;

    /// Read `count` holding registers starting at `address`.
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), ReadError>;

    /// Read a single input register.
    async fn read_input_register(&mut self, address: u16) -> Result<u16, ReadError> {
        let values = self.read_input_registers(address, 1).await?;
        values.first().copied().ok_or(ReadError::EmptyResponse)
    }

    /// Read a single holding register.
    async fn read_holding_register(&mut self, address: u16) -> Result<u16, ReadError> {
        let values = self.read_holding_registers(address, 1).await?;
        values.first().copied().ok_or(ReadError::EmptyResponse)
    }
}

/// Opens Modbus sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Client: RegisterClient;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Client, ConnectError>;
}

/// Await `fut`, giving up after `limit` if one is set.
///
/// Returns `None` on timeout.
pub(crate) async fn within<F, T>(limit: Option<Duration>, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Connector for Modbus TCP devices.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    unit_id: u8,
    timeout: Option<Duration>,
}

impl TcpConnector {
    /// Create a connector addressing `unit_id` on the remote device.
    ///
    /// `timeout` bounds the TCP connect and every subsequent read. `None`
    /// waits indefinitely. A read that times out closes the connection; the
    /// next read reopens it.
    pub fn new(unit_id: u8, timeout: Option<Duration>) -> Self {
        Self { unit_id, timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Client = TcpRegisterClient;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpRegisterClient, ConnectError> {
        let resolve = async {
            tokio::net::lookup_host((host, port))
                .await
                .map_err(|e| ConnectError::NetworkFailure(format!("Cannot resolve {}: {}", host, e)))?
                .next()
                .ok_or_else(|| {
                    ConnectError::NetworkFailure(format!("No address found for {}", host))
                })
        };

        let addr = within(self.timeout, resolve)
            .await
            .unwrap_or_else(|| Err(ConnectError::NetworkFailure("Connection timeout".to_string())))?;

        let ctx = open_context(addr, self.unit_id, self.timeout).await?;

        Ok(TcpRegisterClient {
            addr,
            unit_id: self.unit_id,
            timeout: self.timeout,
            ctx: Some(ctx),
        })
    }
}

async fn open_context(
    addr: SocketAddr,
    unit_id: u8,
    timeout: Option<Duration>,
) -> Result<Context, ConnectError> {
    debug!(%addr, unit_id, "Opening Modbus TCP connection");

    let open = async {
        tcp::connect_slave(addr, Slave(unit_id))
            .await
            .map_err(|e| ConnectError::NetworkFailure(e.to_string()))
    };

    within(timeout, open)
        .await
        .unwrap_or_else(|| Err(ConnectError::NetworkFailure("Connection timeout".to_string())))
}

/// [`RegisterClient`] over a `tokio-modbus` TCP context.
///
/// A request that times out or fails in transport leaves the connection
/// out of step with the device: a late reply would be taken as the answer
/// to the next request. The context is dropped in that case and reopened
/// on the next read.
pub struct TcpRegisterClient {
    addr: SocketAddr,
    unit_id: u8,
    timeout: Option<Duration>,
    ctx: Option<Context>,
}

impl TcpRegisterClient {
    async fn context(&mut self) -> Result<&mut Context, ReadError> {
        if self.ctx.is_none() {
            info!(addr = %self.addr, "Reopening Modbus connection");
            let ctx = open_context(self.addr, self.unit_id, self.timeout)
                .await
                .map_err(|e| ReadError::Transport(e.to_string()))?;
            self.ctx = Some(ctx);
        }

        self.ctx
            .as_mut()
            .ok_or_else(|| ReadError::Transport("Connection unavailable".to_string()))
    }

    fn settle<T>(&mut self, result: Result<T, ReadError>) -> Result<T, ReadError> {
        if matches!(result, Err(ReadError::Timeout | ReadError::Transport(_))) {
            self.ctx = None;
        }
        result
    }
}

impl std::fmt::Debug for TcpRegisterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpRegisterClient")
            .field("addr", &self.addr)
            .field("unit_id", &self.unit_id)
            .field("timeout", &self.timeout)
            .field("open", &self.ctx.is_some())
            .finish()
    }
}

#[async_trait]
impl RegisterClient for TcpRegisterClient {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.context().await?;
        let result = within(timeout, ctx.read_input_registers(address, count))
            .await
            .ok_or(ReadError::Timeout)
            .and_then(|r| r.map_err(|e| ReadError::Transport(e.to_string())))
            .and_then(|r| r.map_err(|e| ReadError::Device(format!("{:?}", e))));
        self.settle(result)
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.context().await?;
        let result = within(timeout, ctx.read_holding_registers(address, count))
            .await
            .ok_or(ReadError::Timeout)
            .and_then(|r| r.map_err(|e| ReadError::Transport(e.to_string())))
            .and_then(|r| r.map_err(|e| ReadError::Device(format!("{:?}", e))));
        self.settle(result)
    }

    async fn close(&mut self) -> Result<(), ReadError> {
        match self.ctx.take() {
            Some(mut ctx) => match ctx.disconnect().await {
                Ok(_) => Ok(()),
                Err(e) => Err(ReadError::Transport(e.to_string())),
            },
            None => Ok(()),
        }
    }
}

//! Register client capability.
//!
//! A client performs exactly one holding-register read per session:
//! connect, read, close. Sessions are never pooled or reused, so a stale
//! connection cannot outlive a flaky link.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::error::{DeviceError, DeviceResult};

/// Shared client handle.
pub type DynRegisterClient = Arc<dyn RegisterClient>;

/// One holding-register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Unit identifier addressed behind the endpoint.
    pub unit_id: u8,
    /// First register address.
    pub start: u16,
    /// Number of consecutive registers.
    pub count: u16,
}

/// Capability to read holding registers from a network endpoint.
#[async_trait]
pub trait RegisterClient: Send + Sync {
    /// Open a session to `address:port`, read, close.
    ///
    /// Returns exactly `request.count` words in register order.
    async fn read_holding_registers(
        &self,
        address: &str,
        port: u16,
        request: RegisterRequest,
    ) -> DeviceResult<Vec<u16>>;
}

/// Modbus TCP client built on `tokio-modbus`.
#[derive(Debug, Clone)]
pub struct ModbusTcpClient {
    /// Bound for the whole session.
    timeout: Duration,
}

impl ModbusTcpClient {
    /// Create a client whose sessions are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn session(
        address: &str,
        port: u16,
        request: RegisterRequest,
    ) -> DeviceResult<Vec<u16>> {
        let socket_addr = resolve(address, port).await?;

        let mut ctx = tcp::connect_slave(socket_addr, Slave(request.unit_id))
            .await
            .map_err(|e| DeviceError::Connection(format!("{}: {}", socket_addr, e)))?;

        let response = ctx
            .read_holding_registers(request.start, request.count)
            .await;

        if let Err(e) = ctx.disconnect().await {
            debug!(endpoint = %socket_addr, error = %e, "disconnect failed");
        }

        match response {
            Ok(Ok(words)) => Ok(words),
            Ok(Err(exception)) => Err(DeviceError::Exception(exception.to_string())),
            Err(e) => Err(DeviceError::Protocol(e.to_string())),
        }
    }
}

#[async_trait]
impl RegisterClient for ModbusTcpClient {
    async fn read_holding_registers(
        &self,
        address: &str,
        port: u16,
        request: RegisterRequest,
    ) -> DeviceResult<Vec<u16>> {
        tokio::time::timeout(self.timeout, Self::session(address, port, request))
            .await
            .map_err(|_| DeviceError::Timeout(self.timeout))?
    }
}

async fn resolve(address: &str, port: u16) -> DeviceResult<SocketAddr> {
    tokio::net::lookup_host((address, port))
        .await
        .map_err(|e| DeviceError::Connection(format!("cannot resolve {}: {}", address, e)))?
        .next()
        .ok_or_else(|| DeviceError::Connection(format!("no address for {}", address)))
}

//! Register transport abstraction over the Modbus TCP client.
//!
//! The decoding pipeline only ever needs "read N contiguous holding registers
//! starting at address A"; everything else (framing, timeouts, reconnects) is
//! the client library's business. Tests substitute their own implementation.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use tokio_modbus::client::sync::{Context, Reader, tcp};

/// Errors raised while talking to the unit. Any of these aborts the whole
/// poll cycle; there is no partial recovery of later blocks.
#[derive(Debug)]
pub enum ProtocolError {
    /// The configured host/port did not resolve to a socket address.
    Resolve(String),
    /// TCP connect to the unit failed.
    Connect(String),
    /// Transport-level failure (IO error, timeout, malformed frame).
    Transport(String),
    /// The unit answered with a Modbus exception.
    Exception(String),
    /// A block response was too short for the fields it should carry.
    ShortResponse { start: u16, count: u16, got: usize },
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Resolve(addr) => write!(f, "cannot resolve device address {}", addr),
            ProtocolError::Connect(e) => write!(f, "connect failed: {}", e),
            ProtocolError::Transport(e) => write!(f, "transport error: {}", e),
            ProtocolError::Exception(code) => write!(f, "modbus exception: {}", code),
            ProtocolError::ShortResponse { start, count, got } => {
                write!(f, "short response for block {},{}: got {} register(s)", start, count, got)
            }
        }
    }
}

impl Error for ProtocolError {}

/// Read access to the unit's 16-bit holding registers.
pub trait RegisterTransport {
    fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError>;
}

/// Production transport: synchronous Modbus TCP with a per-request timeout.
pub struct ModbusTransport {
    ctx: Context,
}

impl ModbusTransport {
    /// Connect to the unit. The timeout bounds every subsequent register
    /// read as well as the protocol handshake.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ProtocolError> {
        let addr: SocketAddr = (host, port)
            .to_socket_addrs()
            .map_err(|_| ProtocolError::Resolve(format!("{}:{}", host, port)))?
            .next()
            .ok_or_else(|| ProtocolError::Resolve(format!("{}:{}", host, port)))?;
        debug!("connecting to {} (timeout {:?})", addr, timeout);
        let ctx = tcp::connect_with_timeout(addr, Some(timeout))
            .map_err(|e| ProtocolError::Connect(e.to_string()))?;
        Ok(ModbusTransport { ctx })
    }
}

impl RegisterTransport for ModbusTransport {
    fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>, ProtocolError> {
        self.ctx
            .read_holding_registers(start, count)
            .map_err(|e| ProtocolError::Transport(e.to_string()))?
            .map_err(|e| ProtocolError::Exception(e.to_string()))
    }
}

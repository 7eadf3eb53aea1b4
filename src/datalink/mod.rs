//! Data Link Layer
//!
//! This module covers the two data link transports this crate
//! implements in full: MS/TP (RS-485 master/slave token passing, see
//! [`mstp`]) and BVLC (the UDP virtual-link shim over IPv4 and IPv6,
//! see [`bvlc`]).

#[cfg(feature = "std")]
use std::error::Error;

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

#[cfg(not(feature = "std"))]
use alloc::string::String;

/// Result type for data link operations.
#[cfg(feature = "std")]
pub type Result<T> = std::result::Result<T, DataLinkError>;

#[cfg(not(feature = "std"))]
pub type Result<T> = core::result::Result<T, DataLinkError>;

/// Errors shared by the MS/TP and BVLC transports.
#[derive(Debug)]
pub enum DataLinkError {
    /// Network or serial I/O error.
    #[cfg(feature = "std")]
    IoError(std::io::Error),
    /// A received frame did not conform to the expected layout.
    InvalidFrame,
    /// A header or data CRC did not match.
    CrcError,
    /// Address resolution or validation failed.
    AddressError(String),
    /// Requested operation isn't supported by this transport.
    UnsupportedType,
    /// A bounded table (BDT/FDT) is full; registration rejected.
    TableFull,
    /// A cooperative timeout elapsed waiting for a reply or token.
    Timeout,
}

impl fmt::Display for DataLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "std")]
            DataLinkError::IoError(e) => write!(f, "I/O error: {}", e),
            DataLinkError::InvalidFrame => write!(f, "invalid frame format"),
            DataLinkError::CrcError => write!(f, "CRC check failed"),
            DataLinkError::AddressError(msg) => write!(f, "address error: {}", msg),
            DataLinkError::UnsupportedType => write!(f, "unsupported data link type"),
            DataLinkError::TableFull => write!(f, "table full"),
            DataLinkError::Timeout => write!(f, "timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl Error for DataLinkError {}

#[cfg(feature = "std")]
impl From<std::io::Error> for DataLinkError {
    fn from(e: std::io::Error) -> Self {
        DataLinkError::IoError(e)
    }
}

/// MS/TP (Master-Slave/Token-Passing) implementation: framing receive
/// FSM, master and slave state machines, zero-config address
/// assignment, and auto-baud detection.
pub mod mstp;

/// BVLC (BACnet Virtual Link Control) implementation over IPv4 and
/// IPv6, including BBMD broadcast forwarding and foreign device table
/// aging.
pub mod bvlc;

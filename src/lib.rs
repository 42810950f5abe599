#![deny(unsafe_code)]
#![warn(missing_docs)]

//! IPMB transport and request/response correlation for board management
//! controllers.
//!
//! The crate implements:
//! - the IPMB frame codec and its two checksums
//! - per-bus sequence allocation and a bounded pending-request ledger
//! - transmit and receive workers per bus, with retries and a timeout sweeper
//! - routing of responses back to local callers, the host KCS, the ME or a
//!   bridging peer
//! - an IPMI request dispatcher and the OEM "message out" bridge
//!
//! The entry point is [`Ipmb::builder`]. Physical buses plug in through the
//! [`transport::Link`] trait.

mod bridge;
mod debug;
mod engine;
mod error;
mod ipmb;
mod observe;
mod queue;

pub mod clock;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod ledger;
pub mod platform;
pub mod protocol;
pub mod seq;
pub mod transport;
pub mod types;

pub use crate::config::{BusConfig, Timing};
pub use crate::dispatch::{Dispatcher, Handler};
pub use crate::error::{Error, Result};
pub use crate::ipmb::{Ipmb, IpmbBuilder, Requests};
pub use crate::types::{Channel, DeviceId, Interface, Message};

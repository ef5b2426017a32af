//! # PiVESC
//!
//! A serial bridge for VESC motor controllers. One process owns the
//! half-duplex serial link, polls live telemetry on a fixed cadence, and
//! exposes it to any number of WebSocket observers, which can also issue
//! configuration and control commands over the same link.
//!
//! ## Features
//!
//! - VESC frame codec with CRC-16/CCITT integrity checking
//! - Fixed-point telemetry decoding into immutable snapshots
//! - Strict one-exchange-at-a-time link dispatching (the serial link is
//!   half-duplex; interleaved exchanges corrupt both)
//! - Park lock, current/duty/RPM setpoints, motor limits, battery cutoff
//! - Live session broadcasting with per-observer command replies
//!
//! ## Example
//!
//! ```no_run
//! use pivesc::{Dispatcher, LinkConfig, SerialLink, VescClient};
//!
//! #[tokio::main]
//! async fn main() -> pivesc::Result<()> {
//!     let link = SerialLink::open(&LinkConfig {
//!         port: "/dev/ttyACM0".into(),
//!         baud_rate: 115_200,
//!         timeout: std::time::Duration::from_millis(100),
//!     })?;
//!     let client = VescClient::new(Dispatcher::spawn(Some(Box::new(link))));
//!     let snapshot = client.poll_snapshot().await?;
//!     println!("battery voltage: {:.1}V", snapshot.v_in);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod messages;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use client::VescClient;
pub use command::Command;
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Result, VescError};
pub use session::{ObserverSession, SessionEvent, SessionHandle, SessionManager};
pub use telemetry::TelemetrySnapshot;
pub use transport::{LinkConfig, SerialLink, Transport};

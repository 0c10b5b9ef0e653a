//! Modbus-TCP register poller with webhook notifications.
//!
//! The bridge opens one Modbus-TCP session, seeds a table with the current
//! value of up to four registers, then polls them on a fixed cadence and
//! posts a chat-bot text message whenever a reading calls for it.
//!
//! # Notifications
//!
//! | event | message |
//! |-------|---------|
//! | session opened | `Data push enabled!` |
//! | register reads nonzero (every tick, unless `repeat_nonzero` is off) | `Register <address> value changed: <value>` |
//! | register differs from last reading | `Register <address> value changed: <value>` |

pub mod client;
pub mod config;
pub mod notifier;
pub mod poller;
pub mod session;

pub use client::{ConnectError, Connector, ReadError, RegisterClient, TcpConnector};
pub use config::ModbusPushConfig;
pub use notifier::{Notifier, NotifyError, WebhookNotifier, WebhookTarget};
pub use poller::{PollOptions, TickReport, run_poll_loop};
pub use session::{ConnectRequest, ConnectionManager, ConnectionState, RegisterTable, Session};

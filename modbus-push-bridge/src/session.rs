//! Connection management.
//!
//! A [`ConnectionManager`] owns at most one live [`Session`]: the Modbus
//! client, the table of last-seen register values, and the webhook the
//! session reports to. Connecting seeds the table with one input-register
//! read per address; addresses whose first read fails are dropped for the
//! lifetime of the session.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::client::{ConnectError, Connector, RegisterClient};
use crate::notifier::{Notifier, PUSH_ENABLED_MESSAGE, WebhookTarget, deliver};
use crate::poller::{PollOptions, TickReport, poll_once};

/// Last observed value per register address.
pub type RegisterTable = BTreeMap<u16, u16>;

/// Whether a session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Parameters for opening a session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub addresses: Vec<u16>,
    pub webhook: WebhookTarget,
}

/// State of one open connection.
#[derive(Debug)]
pub struct Session<C> {
    pub(crate) client: C,
    pub(crate) registers: RegisterTable,
    pub(crate) webhook: WebhookTarget,
}

impl<C> Session<C> {
    pub fn registers(&self) -> &RegisterTable {
        &self.registers
    }

    pub fn webhook(&self) -> &WebhookTarget {
        &self.webhook
    }
}

/// Opens, polls and closes the device session.
pub struct ConnectionManager<K: Connector, N: Notifier> {
    connector: K,
    notifier: N,
    options: PollOptions,
    session: Option<Session<K::Client>>,
}

impl<K: Connector, N: Notifier> ConnectionManager<K, N> {
    pub fn new(connector: K, notifier: N, options: PollOptions) -> Self {
        Self {
            connector,
            notifier,
            options,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.session.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Register table of the open session, if any.
    pub fn registers(&self) -> Option<&RegisterTable> {
        self.session.as_ref().map(Session::registers)
    }

    pub fn session(&self) -> Option<&Session<K::Client>> {
        self.session.as_ref()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Open a session and seed the register table.
    ///
    /// An already open session is closed first. Per-register read failures
    /// and the "data push enabled" notification never fail the connect.
    pub async fn connect(&mut self, request: &ConnectRequest) -> Result<(), ConnectError> {
        if request.addresses.is_empty() {
            return Err(ConnectError::NoRegisters);
        }

        if self.session.is_some() {
            info!("Replacing open session");
            self.disconnect().await;
        }

        info!(
            host = %request.host,
            port = request.port,
            registers = ?request.addresses,
            "Connecting to Modbus device"
        );

        let mut client = self.connector.connect(&request.host, request.port).await?;

        let mut registers = RegisterTable::new();
        for &address in &request.addresses {
            match client.read_input_register(address).await {
                Ok(value) => {
                    info!(address, value, "Read register");
                    registers.insert(address, value);
                }
                Err(e) => {
                    warn!(address, error = %e, "Failed to read register, it will not be polled");
                }
            }
        }

        let session = Session {
            client,
            registers,
            webhook: request.webhook.clone(),
        };

        deliver(&self.notifier, &session.webhook, PUSH_ENABLED_MESSAGE).await;

        info!(
            polled = session.registers.len(),
            configured = request.addresses.len(),
            "Connected"
        );
        self.session = Some(session);

        Ok(())
    }

    /// Close the session. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        match self.session.take() {
            Some(mut session) => {
                if let Err(e) = session.client.close().await {
                    warn!(error = %e, "Error closing Modbus connection");
                }
                info!("Disconnected");
            }
            None => debug!("Already disconnected"),
        }
    }

    /// Run one poll cycle. A no-op while disconnected.
    pub async fn tick(&mut self) -> TickReport {
        match self.session.as_mut() {
            Some(session) => poll_once(session, &self.notifier, &self.options).await,
            None => TickReport::default(),
        }
    }
}

impl<K: Connector, N: Notifier> fmt::Debug for ConnectionManager<K, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("options", &self.options)
            .field("registers", &self.registers())
            .finish_non_exhaustive()
    }
}

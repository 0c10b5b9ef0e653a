//! In-memory fakes for the Modbus device and the webhook.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modbus_push_bridge::{
    ConnectError, ConnectRequest, Connector, Notifier, NotifyError, ReadError, RegisterClient,
    WebhookTarget,
};

pub const WEBHOOK: &str = "http://hooks.test/bot";

/// Simulated device shared between the test and the fake client.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub input: HashMap<u16, u16>,
    pub holding: HashMap<u16, u16>,
    pub failing_input: HashSet<u16>,
    pub failing_holding: HashSet<u16>,
    pub refuse_connections: bool,
    pub connects: usize,
    pub closes: usize,
    pub holding_reads: Vec<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDevice(Arc<Mutex<DeviceState>>);

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both the input and holding view of a register.
    pub fn set(&self, address: u16, value: u16) {
        let mut state = self.0.lock().unwrap();
        state.input.insert(address, value);
        state.holding.insert(address, value);
    }

    pub fn set_holding(&self, address: u16, value: u16) {
        self.0.lock().unwrap().holding.insert(address, value);
    }

    pub fn fail_input(&self, address: u16) {
        self.0.lock().unwrap().failing_input.insert(address);
    }

    pub fn fail_holding(&self, address: u16) {
        self.0.lock().unwrap().failing_holding.insert(address);
    }

    pub fn refuse_connections(&self) {
        self.0.lock().unwrap().refuse_connections = true;
    }

    pub fn connects(&self) -> usize {
        self.0.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }

    pub fn holding_reads(&self) -> Vec<u16> {
        self.0.lock().unwrap().holding_reads.clone()
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            device: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeConnector {
    device: FakeDevice,
}

#[async_trait]
impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, host: &str, port: u16) -> Result<FakeClient, ConnectError> {
        let mut state = self.device.0.lock().unwrap();
        if state.refuse_connections {
            return Err(ConnectError::NetworkFailure(format!(
                "connection refused by {}:{}",
                host, port
            )));
        }
        state.connects += 1;
        Ok(FakeClient {
            device: self.device.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeClient {
    device: FakeDevice,
}

#[async_trait]
impl RegisterClient for FakeClient {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError> {
        assert_eq!(count, 1);
        let state = self.device.0.lock().unwrap();
        if state.failing_input.contains(&address) {
            return Err(ReadError::Device("IllegalDataAddress".to_string()));
        }
        Ok(vec![state.input.get(&address).copied().unwrap_or(0)])
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ReadError> {
        assert_eq!(count, 1);
        let mut state = self.device.0.lock().unwrap();
        state.holding_reads.push(address);
        if state.failing_holding.contains(&address) {
            return Err(ReadError::Device("IllegalDataAddress".to_string()));
        }
        Ok(vec![state.holding.get(&address).copied().unwrap_or(0)])
    }

    async fn close(&mut self) -> Result<(), ReadError> {
        self.device.0.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Notifier that records every message and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, webhook: &WebhookTarget, message: &str) -> Result<(), NotifyError> {
        assert_eq!(webhook.as_str(), WEBHOOK);
        self.messages.lock().unwrap().push(message.to_string());
        if *self.failing.lock().unwrap() {
            return Err(NotifyError::DeliveryFailed("HTTP 500 Internal Server Error".to_string()));
        }
        Ok(())
    }
}

pub fn request(addresses: &[u16]) -> ConnectRequest {
    ConnectRequest {
        host: "127.0.0.1".to_string(),
        port: 502,
        addresses: addresses.to_vec(),
        webhook: WebhookTarget::new(WEBHOOK).unwrap(),
    }
}

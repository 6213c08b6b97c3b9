// src/devices.rs - Device registry and command dispatch
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const POWER_ITEMS: [&str; 2] = ["ON", "OFF"];
pub const COLOR_ITEMS: [&str; 3] = ["Red", "Green", "Blue"];

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{device} does not support {action:?}")]
    UnsupportedAction { device: String, action: Capability },
    #[error("unknown {action:?} value {value:?}")]
    UnknownValue { action: Capability, value: String },
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),
    #[error("request to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Command kinds a device can accept. Ordering matches menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Power,
    Color,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "Power",
            Self::Color => "Color",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Power" => Some(Self::Power),
            "Color" => Some(Self::Color),
            _ => None,
        }
    }

    /// Sub-action menu entries offered for this capability.
    pub fn sub_action_items(&self) -> Vec<String> {
        let items: &[&str] = match self {
            Self::Power => &POWER_ITEMS,
            Self::Color => &COLOR_ITEMS,
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ON" => Some(Self::On),
            "OFF" => Some(Self::Off),
            _ => None,
        }
    }
}

pub fn color_hex(name: &str) -> Option<&'static str> {
    match name {
        "Red" => Some("#FF0000"),
        "Green" => Some("#00FF00"),
        "Blue" => Some("#0000FF"),
        _ => None,
    }
}

/// Sends one raw command string to a device address.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn send(&self, address: &str, command: &str) -> Result<(), DeviceError>;
}

/// Tasmota-style HTTP API: `GET http://<address>/cm?cmnd=<command>`, with the
/// command percent-encoded (`Power%20ON`, `Color%20%23FF0000`).
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeviceTransport for HttpTransport {
    async fn send(&self, address: &str, command: &str) -> Result<(), DeviceError> {
        let map_err = |source| DeviceError::Transport {
            address: address.to_string(),
            source,
        };
        let mut url = Url::parse(&format!("http://{address}/cm"))
            .map_err(|_| DeviceError::InvalidAddress(address.to_string()))?;
        // set_query escapes spaces as %20, not the form-style `+`
        url.set_query(Some(&format!("cmnd={command}")));

        self.client
            .get(url)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?;
        Ok(())
    }
}

/// Logs commands instead of sending them.
pub struct DryRunTransport;

#[async_trait]
impl DeviceTransport for DryRunTransport {
    async fn send(&self, address: &str, command: &str) -> Result<(), DeviceError> {
        info!(address, command, "dry run: command not sent");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub address: String,
    pub capabilities: BTreeSet<Capability>,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn switch(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(id, address, [Capability::Power])
    }

    pub fn light(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(id, address, [Capability::Power, Capability::Color])
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Action menu entries for this device.
    pub fn action_items(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.as_str().to_string()).collect()
    }

    pub async fn send_power_request(&self, transport: &dyn DeviceTransport, state: PowerState) -> bool {
        self.send(transport, &format!("Power {}", state.as_str())).await
    }

    pub async fn send_color_request(&self, transport: &dyn DeviceTransport, hex: &str) -> bool {
        self.send(transport, &format!("Color {hex}")).await
    }

    async fn send(&self, transport: &dyn DeviceTransport, command: &str) -> bool {
        match transport.send(&self.address, command).await {
            Ok(()) => true,
            Err(e) => {
                warn!(device = %self.id, error = %e, "device request failed");
                false
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.id, self.address)
    }
}

/// Devices in registration order. Built once at startup.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Power(PowerState),
    Color(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub device: Device,
    pub payload: Payload,
}

impl Command {
    /// Builds the command for a leaf menu selection.
    pub fn for_selection(device: &Device, action: Capability, value: &str) -> Result<Self, DeviceError> {
        if !device.supports(action) {
            return Err(DeviceError::UnsupportedAction {
                device: device.id.clone(),
                action,
            });
        }
        let unknown = || DeviceError::UnknownValue {
            action,
            value: value.to_string(),
        };
        let payload = match action {
            Capability::Power => Payload::Power(PowerState::from_label(value).ok_or_else(unknown)?),
            Capability::Color => Payload::Color(color_hex(value).ok_or_else(unknown)?),
        };
        Ok(Self {
            device: device.clone(),
            payload,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn action(&self) -> Capability {
        match self.payload {
            Payload::Power(_) => Capability::Power,
            Payload::Color(_) => Capability::Color,
        }
    }
}

/// Turns confirmed selections into device calls without blocking the
/// frame loop.
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn DeviceTransport>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn DeviceTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Issues the command in the background. Returns whether it was issued,
    /// not whether the device accepted it; that flag comes from [`execute`](Self::execute)
    /// and is only logged here.
    pub fn dispatch(&self, device: &Device, action: Capability, value: &str) -> bool {
        let command = match Command::for_selection(device, action, value) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "command not dispatched");
                return false;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(device = %device.id, "no async runtime, command dropped");
                return false;
            }
        };

        let dispatcher = self.clone();
        handle.spawn(async move {
            dispatcher.execute(command).await;
        });
        true
    }

    /// Runs a command to completion or until the timeout elapses, returning
    /// the device's success flag.
    pub async fn execute(&self, command: Command) -> bool {
        let transport = self.transport.as_ref();
        let request = async {
            match command.payload {
                Payload::Power(state) => command.device.send_power_request(transport, state).await,
                Payload::Color(hex) => command.device.send_color_request(transport, hex).await,
            }
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(true) => {
                info!(device = %command.device_id(), action = command.action().as_str(), "command delivered");
                true
            }
            Ok(false) => false,
            Err(_) => {
                warn!(
                    device = %command.device_id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "command timed out"
                );
                false
            }
        }
    }
}

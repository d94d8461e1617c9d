use serde::{Deserialize, Serialize};

use crate::encoding::{RfProtocol, DEFAULT_PROTOCOL};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
    pub hostname: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 80,
            hostname: "fan-remote".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RfConfig {
    pub tx_pin: i32,
    pub rmt_channel: u8,
    pub protocol: u8,
    pub pulse_length_us: Option<u32>,
    pub bit_length: u8,
    pub frame_repeats: u8,
    pub burst_repeats: u8,
    pub burst_gap_ms: u64,
}

impl Default for RfConfig {
    fn default() -> Self {
        Self {
            tx_pin: 4,
            rmt_channel: 0,
            protocol: DEFAULT_PROTOCOL,
            pulse_length_us: None,
            bit_length: 21,
            frame_repeats: 15,
            burst_repeats: 3,
            burst_gap_ms: 10,
        }
    }
}

impl RfConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if self.tx_pin < 0 {
            self.tx_pin = defaults.tx_pin;
        }

        if self.rmt_channel > 7 {
            self.rmt_channel = defaults.rmt_channel;
        }

        if !RfProtocol::is_known_preset(self.protocol) {
            self.protocol = defaults.protocol;
        }

        if self.pulse_length_us == Some(0) {
            self.pulse_length_us = None;
        }

        self.bit_length = self.bit_length.clamp(1, 32);
        self.frame_repeats = self.frame_repeats.clamp(1, 50);
        self.burst_repeats = self.burst_repeats.clamp(1, 10);
        self.burst_gap_ms = self.burst_gap_ms.min(1_000);
    }

    /// Preset for `protocol` with the pulse length override applied.
    pub fn resolved_protocol(&self) -> RfProtocol {
        RfProtocol::preset_or_default(self.protocol).with_pulse_length(self.pulse_length_us)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub rf: RfConfig,
    #[serde(default)]
    pub debug: bool,
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let mut runtime = serde_json::from_slice::<Self>(raw)?;
        runtime.sanitize();
        Ok(runtime)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn sanitize(&mut self) {
        self.rf.sanitize();
        if self.network.http_port == 0 {
            self.network.http_port = NetworkConfig::default().http_port;
        }
    }
}

use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    codes::RfCode,
    config::RfConfig,
    encoding::{encode_frame, RfFrame, RfProtocol},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmitError {
    #[error("RF transmitter is disabled")]
    Disabled,
    #[error("failed to encode RF frame: {0}")]
    Encoding(String),
    #[error("RF driver error: {0}")]
    Driver(String),
}

/// Sends one resolved code over the air.
pub trait RfTransmit {
    fn is_ready(&self) -> bool;

    fn transmit(&mut self, code: RfCode) -> Result<(), TransmitError>;
}

/// A single physical emission of an encoded frame.
pub trait FrameSink {
    fn send_frame(&mut self, frame: &RfFrame) -> Result<(), TransmitError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TransmitterDiagnostics {
    pub enabled: bool,
    pub protocol: u8,
    #[serde(rename = "pulseLengthUs")]
    pub pulse_length_us: u32,
    #[serde(rename = "bitLength")]
    pub bit_length: u8,
    #[serde(rename = "frameRepeats")]
    pub frame_repeats: u8,
    #[serde(rename = "burstRepeats")]
    pub burst_repeats: u8,
    #[serde(rename = "burstGapMs")]
    pub burst_gap_ms: u64,
    #[serde(rename = "sentBursts")]
    pub sent_bursts: u64,
    #[serde(rename = "sentFrames")]
    pub sent_frames: u64,
    #[serde(rename = "failedBursts")]
    pub failed_bursts: u64,
    #[serde(rename = "lastCode")]
    pub last_code: Option<RfCode>,
    #[serde(rename = "lastSendMs")]
    pub last_send_ms: Option<u64>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

/// Repeats each frame a few times with a fixed gap, since the receivers
/// never acknowledge. Blocks the caller for the whole burst.
pub struct BurstTransmitter<S> {
    sink: Option<S>,
    protocol_number: u8,
    protocol: RfProtocol,
    bit_length: u8,
    frame_repeats: u8,
    burst_repeats: u8,
    burst_gap: Duration,
    sent_bursts: u64,
    sent_frames: u64,
    failed_bursts: u64,
    last_code: Option<RfCode>,
    last_send_ms: Option<u64>,
    last_error: Option<String>,
}

impl<S: FrameSink> BurstTransmitter<S> {
    pub fn new(sink: S, config: &RfConfig) -> Self {
        Self::build(Some(sink), config)
    }

    pub fn disabled(config: &RfConfig) -> Self {
        Self::build(None, config)
    }

    fn build(sink: Option<S>, config: &RfConfig) -> Self {
        let mut config = config.clone();
        config.sanitize();

        Self {
            sink,
            protocol_number: config.protocol,
            protocol: config.resolved_protocol(),
            bit_length: config.bit_length,
            frame_repeats: config.frame_repeats,
            burst_repeats: config.burst_repeats,
            burst_gap: Duration::from_millis(config.burst_gap_ms),
            sent_bursts: 0,
            sent_frames: 0,
            failed_bursts: 0,
            last_code: None,
            last_send_ms: None,
            last_error: None,
        }
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn diagnostics(&self) -> TransmitterDiagnostics {
        TransmitterDiagnostics {
            enabled: self.sink.is_some(),
            protocol: self.protocol_number,
            pulse_length_us: self.protocol.pulse_length_us,
            bit_length: self.bit_length,
            frame_repeats: self.frame_repeats,
            burst_repeats: self.burst_repeats,
            burst_gap_ms: self.burst_gap.as_millis().try_into().unwrap_or(u64::MAX),
            sent_bursts: self.sent_bursts,
            sent_frames: self.sent_frames,
            failed_bursts: self.failed_bursts,
            last_code: self.last_code,
            last_send_ms: self.last_send_ms,
            last_error: self.last_error.clone(),
        }
    }

    fn send_burst(&mut self, code: RfCode) -> Result<(), TransmitError> {
        let Some(sink) = self.sink.as_mut() else {
            warn!("RF disabled, dropping code {code}");
            return Err(TransmitError::Disabled);
        };

        let frame = encode_frame(code, self.bit_length, &self.protocol, self.frame_repeats)?;
        debug!(
            "sending code {code} x{} ({} pulses, {}us per frame)",
            self.burst_repeats,
            frame.pulses.len(),
            frame.duration_us()
        );

        for _ in 0..self.burst_repeats {
            sink.send_frame(&frame)?;
            self.sent_frames = self.sent_frames.saturating_add(1);
            if !self.burst_gap.is_zero() {
                thread::sleep(self.burst_gap);
            }
        }

        Ok(())
    }
}

impl<S: FrameSink> RfTransmit for BurstTransmitter<S> {
    fn is_ready(&self) -> bool {
        self.sink.is_some()
    }

    fn transmit(&mut self, code: RfCode) -> Result<(), TransmitError> {
        let result = self.send_burst(code);

        self.last_code = Some(code);
        match &result {
            Ok(()) => {
                self.sent_bursts = self.sent_bursts.saturating_add(1);
                self.last_send_ms = Some(monotonic_ms());
                self.last_error = None;
            }
            Err(err) => {
                self.failed_bursts = self.failed_bursts.saturating_add(1);
                self.last_error = Some(err.to_string());
            }
        }

        result
    }
}

/// Milliseconds since the first call in this process.
pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

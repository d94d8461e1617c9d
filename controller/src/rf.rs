use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{
        config::TransmitConfig, PinState, Pulse as RmtPulse, PulseTicks, RmtChannel, TxRmtDriver,
        VariableLengthSignal,
    },
};

use fanremote_common::{BurstTransmitter, FrameSink, RfFrame, TransmitError};

// 80 MHz APB / 80 = 1 tick per microsecond.
const RF_TICK_DIVIDER: u8 = 80;
const MAX_PULSE_TICKS: u32 = 32_767;

pub type RfTransmitter = BurstTransmitter<RmtSink>;

/// Emits frames on a 433 MHz OOK module's data pin through one RMT channel.
/// There is no carrier; the module keys the RF itself.
pub struct RmtSink {
    tx: TxRmtDriver<'static>,
}

impl RmtSink {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let config = TransmitConfig::new()
            .clock_divider(RF_TICK_DIVIDER)
            .carrier(None)
            .idle(Some(PinState::Low));

        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT RF driver")?;
        Ok(Self { tx })
    }

    fn build_signal(frame: &RfFrame) -> Result<VariableLengthSignal, TransmitError> {
        let mut pulses = Vec::with_capacity(frame.pulses.len());
        for pulse in &frame.pulses {
            let level = if pulse.high {
                PinState::High
            } else {
                PinState::Low
            };

            // Long sync gaps do not fit one RMT item; split them into
            // consecutive items at the same level.
            let mut remaining = pulse.duration_us;
            while remaining > 0 {
                let chunk = remaining.min(MAX_PULSE_TICKS);
                let ticks = PulseTicks::new(chunk as u16).map_err(|err| {
                    TransmitError::Encoding(format!("invalid RF pulse duration {chunk}us: {err}"))
                })?;
                pulses.push(RmtPulse::new(level, ticks));
                remaining -= chunk;
            }
        }

        let pulse_refs: Vec<&RmtPulse> = pulses.iter().collect();
        let mut signal = VariableLengthSignal::with_capacity(pulses.len());
        signal.push(pulse_refs).map_err(|err| {
            TransmitError::Encoding(format!("failed to convert RF pulses to RMT signal: {err}"))
        })?;
        Ok(signal)
    }
}

impl FrameSink for RmtSink {
    fn send_frame(&mut self, frame: &RfFrame) -> Result<(), TransmitError> {
        let signal = Self::build_signal(frame)?;
        self.tx
            .start_blocking(&signal)
            .map_err(|err| TransmitError::Driver(format!("RMT transmit failed: {err}")))
    }
}

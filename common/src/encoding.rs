//! Pulse encoding for fixed-code 433 MHz receivers.
//!
//! Symbols are (high, low) multiples of a base pulse length. A code is sent
//! MSB-first followed by a sync symbol. Inverted protocols start each symbol
//! low instead of high.

use crate::{codes::RfCode, transmit::TransmitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub high: u16,
    pub low: u16,
}

impl Symbol {
    const fn new(high: u16, low: u16) -> Self {
        Self { high, low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfProtocol {
    pub pulse_length_us: u32,
    pub sync: Symbol,
    pub zero: Symbol,
    pub one: Symbol,
    pub inverted: bool,
}

pub const DEFAULT_PROTOCOL: u8 = 6;

const PRESETS: [RfProtocol; 7] = [
    RfProtocol {
        pulse_length_us: 350,
        sync: Symbol::new(1, 31),
        zero: Symbol::new(1, 3),
        one: Symbol::new(3, 1),
        inverted: false,
    },
    RfProtocol {
        pulse_length_us: 650,
        sync: Symbol::new(1, 10),
        zero: Symbol::new(1, 2),
        one: Symbol::new(2, 1),
        inverted: false,
    },
    RfProtocol {
        pulse_length_us: 100,
        sync: Symbol::new(30, 71),
        zero: Symbol::new(4, 11),
        one: Symbol::new(9, 6),
        inverted: false,
    },
    RfProtocol {
        pulse_length_us: 380,
        sync: Symbol::new(1, 6),
        zero: Symbol::new(1, 3),
        one: Symbol::new(3, 1),
        inverted: false,
    },
    RfProtocol {
        pulse_length_us: 500,
        sync: Symbol::new(6, 14),
        zero: Symbol::new(1, 2),
        one: Symbol::new(2, 1),
        inverted: false,
    },
    // HT6P20B, used by the fan receivers.
    RfProtocol {
        pulse_length_us: 450,
        sync: Symbol::new(23, 1),
        zero: Symbol::new(1, 2),
        one: Symbol::new(2, 1),
        inverted: true,
    },
    RfProtocol {
        pulse_length_us: 150,
        sync: Symbol::new(2, 62),
        zero: Symbol::new(1, 6),
        one: Symbol::new(6, 1),
        inverted: false,
    },
];

impl RfProtocol {
    /// Numbered preset, 1-based.
    pub fn preset(number: u8) -> Option<Self> {
        let index = usize::from(number).checked_sub(1)?;
        PRESETS.get(index).copied()
    }

    pub fn preset_or_default(number: u8) -> Self {
        Self::preset(number).unwrap_or(PRESETS[DEFAULT_PROTOCOL as usize - 1])
    }

    pub fn is_known_preset(number: u8) -> bool {
        Self::preset(number).is_some()
    }

    pub fn with_pulse_length(mut self, pulse_length_us: Option<u32>) -> Self {
        if let Some(length) = pulse_length_us.filter(|length| *length > 0) {
            self.pulse_length_us = length;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub high: bool,
    pub duration_us: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfFrame {
    pub code: RfCode,
    pub pulses: Vec<Pulse>,
}

impl RfFrame {
    pub fn duration_us(&self) -> u64 {
        self.pulses
            .iter()
            .map(|pulse| u64::from(pulse.duration_us))
            .sum()
    }
}

/// Encodes `code` into `repeats` back-to-back copies of its bit pattern.
pub fn encode_frame(
    code: RfCode,
    bit_length: u8,
    protocol: &RfProtocol,
    repeats: u8,
) -> Result<RfFrame, TransmitError> {
    if bit_length == 0 || bit_length > 32 {
        return Err(TransmitError::Encoding(format!(
            "bit length {bit_length} is outside 1..=32"
        )));
    }
    if bit_length < 32 && code.value() >> bit_length != 0 {
        return Err(TransmitError::Encoding(format!(
            "code {code} does not fit in {bit_length} bits"
        )));
    }

    let symbols_per_copy = usize::from(bit_length) + 1;
    let mut pulses = Vec::with_capacity(symbols_per_copy * 2 * usize::from(repeats));

    for _ in 0..repeats {
        for bit in (0..bit_length).rev() {
            let symbol = if code.value() & (1 << bit) != 0 {
                protocol.one
            } else {
                protocol.zero
            };
            push_symbol(&mut pulses, symbol, protocol);
        }
        push_symbol(&mut pulses, protocol.sync, protocol);
    }

    Ok(RfFrame { code, pulses })
}

fn push_symbol(pulses: &mut Vec<Pulse>, symbol: Symbol, protocol: &RfProtocol) {
    let first_high = !protocol.inverted;
    pulses.push(Pulse {
        high: first_high,
        duration_us: u32::from(symbol.high) * protocol.pulse_length_us,
    });
    pulses.push(Pulse {
        high: !first_high,
        duration_us: u32::from(symbol.low) * protocol.pulse_length_us,
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fan_protocol() -> RfProtocol {
        RfProtocol::preset(DEFAULT_PROTOCOL).unwrap()
    }

    #[test]
    fn preset_numbers_are_one_based() {
        assert_eq!(RfProtocol::preset(0), None);
        assert_eq!(RfProtocol::preset(1).unwrap().pulse_length_us, 350);
        assert_eq!(fan_protocol().pulse_length_us, 450);
        assert!(fan_protocol().inverted);
        assert_eq!(RfProtocol::preset(8), None);
    }

    #[test]
    fn frame_has_two_pulses_per_symbol() {
        let frame = encode_frame(RfCode(229389), 21, &fan_protocol(), 15).unwrap();
        assert_eq!(frame.pulses.len(), (21 + 1) * 2 * 15);
    }

    #[test]
    fn bits_are_sent_msb_first() {
        let protocol = RfProtocol::preset(1).unwrap();
        let frame = encode_frame(RfCode(0b100), 3, &protocol, 1).unwrap();
        let highs: Vec<u32> = frame
            .pulses
            .iter()
            .filter(|pulse| pulse.high)
            .map(|pulse| pulse.duration_us)
            .collect();

        // one, zero, zero, sync
        assert_eq!(highs, vec![3 * 350, 350, 350, 350]);
        assert_eq!(frame.pulses.last().unwrap().duration_us, 31 * 350);
    }

    #[test]
    fn inverted_protocol_starts_low() {
        let frame = encode_frame(RfCode(1), 1, &fan_protocol(), 1).unwrap();
        assert_eq!(
            frame.pulses,
            vec![
                Pulse {
                    high: false,
                    duration_us: 900
                },
                Pulse {
                    high: true,
                    duration_us: 450
                },
                Pulse {
                    high: false,
                    duration_us: 23 * 450
                },
                Pulse {
                    high: true,
                    duration_us: 450
                },
            ]
        );
    }

    #[test]
    fn rejects_code_wider_than_bit_length() {
        let err = encode_frame(RfCode(1 << 21), 21, &fan_protocol(), 1).unwrap_err();
        assert!(matches!(err, TransmitError::Encoding(_)));
    }

    #[test]
    fn pulse_length_override_ignores_zero() {
        let protocol = fan_protocol().with_pulse_length(Some(0));
        assert_eq!(protocol.pulse_length_us, 450);
        let protocol = fan_protocol().with_pulse_length(Some(320));
        assert_eq!(protocol.pulse_length_us, 320);
    }
}

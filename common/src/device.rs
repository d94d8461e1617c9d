use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A fan+light unit driven by its own row of recorded codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Tv,
    Lounge,
}

impl Device {
    pub const ALL: [Device; 2] = [Device::Tv, Device::Lounge];

    /// Row of this device in the code table.
    pub fn row(self) -> usize {
        match self {
            Self::Tv => 0,
            Self::Lounge => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::Lounge => "lounge",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device `{0}`")]
pub struct UnknownDevice(pub String);

impl FromStr for Device {
    type Err = UnknownDevice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "tv" => Ok(Self::Tv),
            "lounge" => Ok(Self::Lounge),
            _ => Err(UnknownDevice(value.to_string())),
        }
    }
}

const LIGHT_BIT: u8 = 0b100;
const FAN_MASK: u8 = 0b011;
const STATE_MASK: u8 = LIGHT_BIT | FAN_MASK;

/// Packed fan speed (bits 0-1) and light flag (bit 2).
///
/// The code table is addressed by the packed value directly, so the two
/// fields stay in one integer rather than an enumeration of eight states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceState(u8);

impl DeviceState {
    pub const OFF: DeviceState = DeviceState(0);
    pub const COUNT: usize = 8;

    /// Masks to three bits, so a corrupted value still lands inside [0, 8).
    pub fn new(raw: u8) -> Self {
        Self(raw & STATE_MASK)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn fan_speed(self) -> u8 {
        self.0 & FAN_MASK
    }

    pub fn light_on(self) -> bool {
        self.0 & LIGHT_BIT != 0
    }

    /// Next fan speed, wrapping 3 -> 0. The light flag is kept.
    pub fn with_next_fan_speed(self) -> Self {
        if self.fan_speed() == 3 {
            Self(self.0 - 3)
        } else {
            Self(self.0 + 1)
        }
    }

    pub fn with_light_toggled(self) -> Self {
        if self.0 < LIGHT_BIT {
            Self(self.0 + 4)
        } else {
            Self(self.0 - 4)
        }
    }

    pub fn all() -> impl Iterator<Item = DeviceState> {
        (0..Self::COUNT as u8).map(Self)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (fan {}, light {})",
            self.0,
            self.fan_speed(),
            if self.light_on() { "on" } else { "off" }
        )
    }
}

use crate::device::Device;

pub const PATH_STATUS: &str = "/api/status";
pub const PATH_DEVICE_FAN: &str = "/api/devices/{device}/fan";
pub const PATH_DEVICE_LIGHT: &str = "/api/devices/{device}/light";
pub const PATH_ALL_FANS: &str = "/api/fans";
pub const PATH_ALL_LIGHTS: &str = "/api/lights";
pub const PATH_ALL_OFF: &str = "/api/off";
pub const PATH_RESEND: &str = "/api/resend";
pub const PATH_RF_DIAGNOSTICS: &str = "/api/rf/diagnostics";
pub const PATH_RF_CONFIG: &str = "/api/rf/config";

/// Short paths used by the stock remote page.
pub const LEGACY_PATHS: [&str; 8] = [
    "/li", "/fa", "/off", "/tLi", "/tFa", "/lLi", "/lFa", "/reset",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    IncrementFan(Device),
    ToggleLight(Device),
    IncrementAllFans,
    ToggleAllLights,
    AllOff,
    ResendAll,
}

impl RemoteCommand {
    /// Maps a legacy remote path. The query string is ignored and the path
    /// must match exactly (`/favicon.ico` is not `/fa`).
    pub fn from_legacy_path(path: &str) -> Option<Self> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let command = match path {
            "/li" => Self::ToggleAllLights,
            "/fa" => Self::IncrementAllFans,
            "/off" => Self::AllOff,
            "/tLi" => Self::ToggleLight(Device::Tv),
            "/tFa" => Self::IncrementFan(Device::Tv),
            "/lLi" => Self::ToggleLight(Device::Lounge),
            "/lFa" => Self::IncrementFan(Device::Lounge),
            "/reset" => Self::ResendAll,
            _ => return None,
        };

        Some(command)
    }

    /// Devices touched by this command, in send order.
    pub fn devices(self) -> Vec<Device> {
        match self {
            Self::IncrementFan(device) | Self::ToggleLight(device) => vec![device],
            Self::IncrementAllFans | Self::ToggleAllLights | Self::AllOff | Self::ResendAll => {
                Device::ALL.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_paths_map_to_commands() {
        let cases = [
            ("/li", RemoteCommand::ToggleAllLights),
            ("/fa", RemoteCommand::IncrementAllFans),
            ("/off", RemoteCommand::AllOff),
            ("/tLi", RemoteCommand::ToggleLight(Device::Tv)),
            ("/tFa", RemoteCommand::IncrementFan(Device::Tv)),
            ("/lLi", RemoteCommand::ToggleLight(Device::Lounge)),
            ("/lFa", RemoteCommand::IncrementFan(Device::Lounge)),
            ("/reset", RemoteCommand::ResendAll),
        ];

        for (path, expected) in cases {
            assert_eq!(RemoteCommand::from_legacy_path(path), Some(expected), "{path}");
        }
    }

    #[test]
    fn every_legacy_path_is_routable() {
        for path in LEGACY_PATHS {
            assert!(RemoteCommand::from_legacy_path(path).is_some(), "{path}");
        }
    }

    #[test]
    fn legacy_match_ignores_query() {
        assert_eq!(
            RemoteCommand::from_legacy_path("/tFa?ts=123"),
            Some(RemoteCommand::IncrementFan(Device::Tv))
        );
        assert_eq!(RemoteCommand::from_legacy_path("/lights"), None);
    }

    #[test]
    fn root_and_unknown_paths_are_not_commands() {
        assert_eq!(RemoteCommand::from_legacy_path("/"), None);
        assert_eq!(RemoteCommand::from_legacy_path("/favicon.ico"), None);
        assert_eq!(RemoteCommand::from_legacy_path("/api/status"), None);
        assert_eq!(RemoteCommand::from_legacy_path(""), None);
    }

    #[test]
    fn prefix_lookalikes_are_not_commands() {
        for path in ["/lights", "/fast", "/offline", "/tFan", "/lLight", "/resetting", "/fa/"] {
            assert_eq!(RemoteCommand::from_legacy_path(path), None, "{path}");
        }
    }

    #[test]
    fn fan_out_commands_cover_both_devices() {
        assert_eq!(RemoteCommand::AllOff.devices(), vec![Device::Tv, Device::Lounge]);
        assert_eq!(
            RemoteCommand::ToggleLight(Device::Lounge).devices(),
            vec![Device::Lounge]
        );
    }
}

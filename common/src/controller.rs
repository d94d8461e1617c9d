use log::{debug, warn};
use serde::Serialize;

use crate::{
    codes::{code_for, RfCode},
    device::{Device, DeviceState},
    routes::RemoteCommand,
    transmit::RfTransmit,
};

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: Device,
    pub state: DeviceState,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: u8,
    #[serde(rename = "lightOn")]
    pub light_on: bool,
    pub code: RfCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    #[serde(rename = "transmitterReady")]
    pub transmitter_ready: bool,
    pub devices: Vec<DeviceStatus>,
}

/// Owns the per-device fan/light state and sends the matching code on
/// every change.
///
/// State lives only in memory and starts at 0 (fan off, light off). Calls
/// must be serialized by the owner; a read-modify-write here is not atomic.
/// Every operation blocks for the transmitter's full burst.
pub struct DeviceStateController<T> {
    states: [DeviceState; 2],
    transmitter: T,
}

impl<T: RfTransmit> DeviceStateController<T> {
    pub fn new(transmitter: T) -> Self {
        Self {
            states: [DeviceState::OFF; 2],
            transmitter,
        }
    }

    pub fn state(&self, device: Device) -> DeviceState {
        self.states[device.row()]
    }

    pub fn increment_fan(&mut self, device: Device) -> DeviceState {
        let next = self.state(device).with_next_fan_speed();
        self.commit(device, next)
    }

    pub fn toggle_light(&mut self, device: Device) -> DeviceState {
        let next = self.state(device).with_light_toggled();
        self.commit(device, next)
    }

    pub fn turn_off(&mut self, device: Device) -> DeviceState {
        self.commit(device, DeviceState::OFF)
    }

    /// Sends the current code again without changing state.
    pub fn resend(&mut self, device: Device) -> DeviceState {
        let current = self.state(device);
        self.commit(device, current)
    }

    pub fn apply(&mut self, command: RemoteCommand) -> Vec<(Device, DeviceState)> {
        command
            .devices()
            .into_iter()
            .map(|device| {
                let state = match command {
                    RemoteCommand::IncrementFan(_) | RemoteCommand::IncrementAllFans => {
                        self.increment_fan(device)
                    }
                    RemoteCommand::ToggleLight(_) | RemoteCommand::ToggleAllLights => {
                        self.toggle_light(device)
                    }
                    RemoteCommand::AllOff => self.turn_off(device),
                    RemoteCommand::ResendAll => self.resend(device),
                };
                (device, state)
            })
            .collect()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            transmitter_ready: self.transmitter.is_ready(),
            devices: Device::ALL
                .iter()
                .map(|device| {
                    let state = self.state(*device);
                    DeviceStatus {
                        device: *device,
                        state,
                        fan_speed: state.fan_speed(),
                        light_on: state.light_on(),
                        code: code_for(*device, state),
                    }
                })
                .collect(),
        }
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.transmitter
    }

    // State is committed even when the send fails.
    fn commit(&mut self, device: Device, state: DeviceState) -> DeviceState {
        let code = code_for(device, state);
        debug!("{device}: state {state}, sending code {code}");

        if let Err(err) = self.transmitter.transmit(code) {
            warn!("{device}: failed to send code {code}: {err}");
        }

        self.states[device.row()] = state;
        state
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transmit::{
        tests::{fast_config, RecordingSink},
        BurstTransmitter, TransmitError,
    };

    /// Remembers each code handed to the transmitter.
    #[derive(Default)]
    struct FakeTransmitter {
        sent: Vec<RfCode>,
        ready: bool,
        fail: bool,
    }

    impl FakeTransmitter {
        fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }
    }

    impl RfTransmit for FakeTransmitter {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn transmit(&mut self, code: RfCode) -> Result<(), TransmitError> {
            self.sent.push(code);
            if self.fail {
                return Err(TransmitError::Driver("no carrier".to_string()));
            }
            Ok(())
        }
    }

    fn codes(values: &[u32]) -> Vec<RfCode> {
        values.iter().copied().map(RfCode).collect()
    }

    #[test]
    fn starts_all_off() {
        let controller = DeviceStateController::new(FakeTransmitter::ready());
        for device in Device::ALL {
            assert_eq!(controller.state(device), DeviceState::OFF);
        }
        assert!(controller.transmitter().sent.is_empty());
    }

    #[test]
    fn tv_fan_cycles_through_recorded_codes() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());
        let mut states = Vec::new();

        for _ in 0..4 {
            states.push(controller.increment_fan(Device::Tv).raw());
        }

        assert_eq!(states, vec![1, 2, 3, 0]);
        assert_eq!(
            controller.transmitter().sent,
            codes(&[229472, 229455, 229422, 229389])
        );
    }

    #[test]
    fn returned_state_matches_transmitted_code() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());
        for _ in 0..10 {
            let state = controller.increment_fan(Device::Lounge);
            let sent = *controller.transmitter().sent.last().unwrap();
            assert_eq!(sent, code_for(Device::Lounge, state));
            assert_eq!(controller.state(Device::Lounge), state);
        }
    }

    #[test]
    fn tv_light_toggle_from_fan_one() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());
        controller.increment_fan(Device::Tv);

        assert_eq!(controller.toggle_light(Device::Tv).raw(), 5);
        assert_eq!(controller.transmitter().sent.last(), Some(&RfCode(229604)));
        assert_eq!(controller.toggle_light(Device::Tv).raw(), 1);
        assert_eq!(controller.transmitter().sent.last(), Some(&RfCode(229472)));
    }

    #[test]
    fn lounge_light_from_off() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());

        assert_eq!(controller.toggle_light(Device::Lounge).raw(), 4);
        assert_eq!(controller.transmitter().sent, codes(&[245891]));
        assert_eq!(controller.state(Device::Tv), DeviceState::OFF);
    }

    #[test]
    fn four_fan_increments_return_to_start_from_every_state() {
        for device in Device::ALL {
            for start in DeviceState::all() {
                let mut controller = DeviceStateController::new(FakeTransmitter::ready());
                controller.states[device.row()] = start;

                for _ in 0..4 {
                    let state = controller.increment_fan(device);
                    assert_eq!(state.light_on(), start.light_on());
                }

                assert_eq!(controller.state(device), start);
            }
        }
    }

    #[test]
    fn light_toggle_is_its_own_inverse() {
        for device in Device::ALL {
            for start in DeviceState::all() {
                let mut controller = DeviceStateController::new(FakeTransmitter::ready());
                controller.states[device.row()] = start;

                controller.toggle_light(device);
                controller.toggle_light(device);

                assert_eq!(controller.state(device), start);
            }
        }
    }

    #[test]
    fn failed_send_still_commits_state() {
        let mut controller = DeviceStateController::new(FakeTransmitter {
            ready: true,
            fail: true,
            ..FakeTransmitter::default()
        });

        assert_eq!(controller.increment_fan(Device::Tv).raw(), 1);
        assert_eq!(controller.state(Device::Tv).raw(), 1);
    }

    #[test]
    fn turn_off_and_resend() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());
        controller.toggle_light(Device::Tv);
        controller.increment_fan(Device::Tv);

        assert_eq!(controller.resend(Device::Tv).raw(), 5);
        assert_eq!(controller.turn_off(Device::Tv), DeviceState::OFF);
        assert_eq!(
            controller.transmitter().sent,
            codes(&[229505, 229604, 229604, 229389])
        );
    }

    #[test]
    fn fan_out_commands_touch_both_devices_in_order() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());

        let changed = controller.apply(RemoteCommand::IncrementAllFans);
        assert_eq!(
            changed,
            vec![
                (Device::Tv, DeviceState::new(1)),
                (Device::Lounge, DeviceState::new(1)),
            ]
        );

        controller.apply(RemoteCommand::ToggleAllLights);
        controller.apply(RemoteCommand::AllOff);

        assert_eq!(
            controller.transmitter().sent,
            codes(&[229472, 245858, 229604, 245990, 229389, 245775])
        );
    }

    #[test]
    fn single_device_command_leaves_other_alone() {
        let mut controller = DeviceStateController::new(FakeTransmitter::ready());

        let changed = controller.apply(RemoteCommand::ToggleLight(Device::Lounge));

        assert_eq!(changed, vec![(Device::Lounge, DeviceState::new(4))]);
        assert_eq!(controller.state(Device::Tv), DeviceState::OFF);
    }

    #[test]
    fn snapshot_reports_codes_and_readiness() {
        let mut controller = DeviceStateController::new(FakeTransmitter::default());
        controller.toggle_light(Device::Lounge);

        let snapshot = controller.snapshot();

        assert!(!snapshot.transmitter_ready);
        let lounge = &snapshot.devices[1];
        assert_eq!(lounge.device, Device::Lounge);
        assert_eq!(lounge.state.raw(), 4);
        assert!(lounge.light_on);
        assert_eq!(lounge.fan_speed, 0);
        assert_eq!(lounge.code, RfCode(245891));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["devices"][1]["code"], 245891);
        assert_eq!(json["devices"][1]["device"], "lounge");
        assert_eq!(json["devices"][1]["lightOn"], true);
    }

    #[test]
    fn burst_transmitter_sends_each_code_three_times() {
        let sink = RecordingSink::default();
        let frames: Rc<RefCell<Vec<RfCode>>> = sink.frames.clone();
        let mut controller =
            DeviceStateController::new(BurstTransmitter::new(sink, &fast_config()));

        controller.toggle_light(Device::Lounge);

        assert_eq!(*frames.borrow(), codes(&[245891, 245891, 245891]));
        assert_eq!(controller.transmitter().diagnostics().sent_bursts, 1);
    }

    #[test]
    fn disabled_transmitter_still_tracks_state() {
        let mut controller = DeviceStateController::new(
            BurstTransmitter::<RecordingSink>::disabled(&fast_config()),
        );

        assert!(!controller.snapshot().transmitter_ready);
        assert_eq!(controller.increment_fan(Device::Tv).raw(), 1);
        assert_eq!(controller.transmitter().diagnostics().failed_bursts, 1);
    }
}

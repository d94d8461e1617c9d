use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals, reset, rmt::RMT},
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn, LevelFilter};
use serde::Serialize;

use fanremote_common::{
    config::{NetworkConfig, RfConfig},
    ControllerSnapshot, Device, DeviceStateController, RemoteCommand, RfTransmit, RuntimeConfig,
    LEGACY_PATHS, PATH_ALL_FANS, PATH_ALL_LIGHTS, PATH_ALL_OFF, PATH_RESEND, PATH_RF_CONFIG,
    PATH_RF_DIAGNOSTICS, PATH_STATUS,
};

use crate::rf::{RfTransmitter, RmtSink};

const NVS_NAMESPACE: &str = "fanremote";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const WIFI_RESTART_DELAY_MS: u64 = 30_000;

const INDEX_HTML: &str = include_str!("../web/index.html");

type EspController = DeviceStateController<RfTransmitter>;

#[derive(Clone)]
struct SharedState {
    controller: Arc<Mutex<EspController>>,
    rf: Arc<RfConfig>,
}

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct RfDiagnosticsView {
    #[serde(rename = "txPin")]
    tx_pin: i32,
    #[serde(rename = "rmtChannel")]
    rmt_channel: u8,
    #[serde(flatten)]
    transmitter: fanremote_common::TransmitterDiagnostics,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    ensure_wifi_defaults(&mut runtime.network);

    log::set_max_level(if runtime.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;
    let transmitter = match init_rf_transmitter(rmt, &runtime.rf) {
        Ok(transmitter) => {
            info!(
                "RF transmitter initialized on RMT channel{} / GPIO{} (protocol {}, {} bits)",
                runtime.rf.rmt_channel, runtime.rf.tx_pin, runtime.rf.protocol, runtime.rf.bit_length
            );
            transmitter
        }
        Err(err) => {
            warn!("failed to initialize RF transmitter, running disabled: {err:#}");
            RfTransmitter::disabled(&runtime.rf)
        }
    };

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)?;
    disable_wifi_power_save();

    let state = SharedState {
        controller: Arc::new(Mutex::new(DeviceStateController::new(transmitter))),
        rf: Arc::new(runtime.rf.clone()),
    };

    let server = create_http_server(state, runtime.network.http_port)?;
    info!("fan remote ready on port {}", runtime.network.http_port);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn ensure_wifi_defaults(network: &mut NetworkConfig) {
    if network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            network.wifi_ssid = ssid.to_string();
        }
    }

    if network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            network.wifi_pass = pass.to_string();
        }
    }
}

fn create_http_server(state: SharedState, port: u16) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 12 * 1024,
        max_uri_handlers: 32,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_ok_response()?.write_all(INDEX_HTML.as_bytes())?;
        Ok(())
    })?;

    {
        let state = state.clone();
        server.fn_handler(PATH_STATUS, Method::Get, move |req| {
            let snapshot = build_snapshot(&state)?;
            write_json(req, &snapshot)
        })?;
    }

    for device in Device::ALL {
        let fan_path = format!("/api/devices/{device}/fan");
        let state_for_fan = state.clone();
        server.fn_handler(&fan_path, Method::Post, move |req| {
            respond_to_command(req, &state_for_fan, RemoteCommand::IncrementFan(device))
        })?;

        let light_path = format!("/api/devices/{device}/light");
        let state_for_light = state.clone();
        server.fn_handler(&light_path, Method::Post, move |req| {
            respond_to_command(req, &state_for_light, RemoteCommand::ToggleLight(device))
        })?;
    }

    let fan_out = [
        (PATH_ALL_FANS, RemoteCommand::IncrementAllFans),
        (PATH_ALL_LIGHTS, RemoteCommand::ToggleAllLights),
        (PATH_ALL_OFF, RemoteCommand::AllOff),
        (PATH_RESEND, RemoteCommand::ResendAll),
    ];
    for (path, command) in fan_out {
        let state = state.clone();
        server.fn_handler(path, Method::Post, move |req| {
            respond_to_command(req, &state, command)
        })?;
    }

    for path in LEGACY_PATHS {
        let Some(command) = RemoteCommand::from_legacy_path(path) else {
            continue;
        };
        let state = state.clone();
        server.fn_handler(path, Method::Get, move |req| {
            respond_to_command(req, &state, command)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler(PATH_RF_DIAGNOSTICS, Method::Get, move |req| {
            let transmitter = lock_controller(&state)?.transmitter().diagnostics();
            let view = RfDiagnosticsView {
                tx_pin: state.rf.tx_pin,
                rmt_channel: state.rf.rmt_channel,
                transmitter,
            };
            write_json(req, &view)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler(PATH_RF_CONFIG, Method::Get, move |req| {
            write_json(req, state.rf.as_ref())
        })?;
    }

    Ok(server)
}

fn respond_to_command(
    req: Request<&mut EspHttpConnection<'_>>,
    state: &SharedState,
    command: RemoteCommand,
) -> anyhow::Result<()> {
    let snapshot = {
        let mut controller = lock_controller(state)?;
        if !controller.transmitter().is_ready() {
            drop(controller);
            return write_error(req, 503, "RF transmitter is not available");
        }

        for (device, device_state) in controller.apply(command) {
            info!("{command:?}: {device} -> {device_state}");
        }
        controller.snapshot()
    };

    write_json(req, &snapshot)
}

fn lock_controller(
    state: &SharedState,
) -> anyhow::Result<std::sync::MutexGuard<'_, EspController>> {
    state
        .controller
        .lock()
        .map_err(|_| anyhow!("controller lock poisoned"))
}

fn build_snapshot(state: &SharedState) -> anyhow::Result<ControllerSnapshot> {
    Ok(lock_controller(state)?.snapshot())
}

fn write_json<T: Serialize>(
    req: Request<&mut EspHttpConnection<'_>>,
    payload: &T,
) -> anyhow::Result<()> {
    write_body(req, 200, payload)
}

fn write_error(
    req: Request<&mut EspHttpConnection<'_>>,
    status_code: u16,
    message: &str,
) -> anyhow::Result<()> {
    write_body(req, status_code, &ErrorBody { error: message })
}

fn write_body<T: Serialize>(
    req: Request<&mut EspHttpConnection<'_>>,
    status_code: u16,
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    let mut response = req.into_response(
        status_code,
        None,
        &[("Content-Type", "application/json; charset=utf-8")],
    )?;
    response.write_all(&body)?;
    Ok(())
}

fn init_rf_transmitter(rmt: RMT, rf: &RfConfig) -> anyhow::Result<RfTransmitter> {
    if rf.tx_pin < 0 {
        return Err(anyhow!("invalid tx pin: {}", rf.tx_pin));
    }

    let pin = rf.tx_pin;
    let sink = match rf.rmt_channel {
        0 => unsafe { RmtSink::new(rmt.channel0, AnyOutputPin::new(pin)) },
        1 => unsafe { RmtSink::new(rmt.channel1, AnyOutputPin::new(pin)) },
        2 => unsafe { RmtSink::new(rmt.channel2, AnyOutputPin::new(pin)) },
        3 => unsafe { RmtSink::new(rmt.channel3, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        4 => unsafe { RmtSink::new(rmt.channel4, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        5 => unsafe { RmtSink::new(rmt.channel5, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        6 => unsafe { RmtSink::new(rmt.channel6, AnyOutputPin::new(pin)) },
        #[cfg(any(esp32, esp32s3))]
        7 => unsafe { RmtSink::new(rmt.channel7, AnyOutputPin::new(pin)) },
        _ => Err(anyhow!("unsupported RMT channel: {}", rf.rmt_channel)),
    }?;

    Ok(RfTransmitter::new(sink, rf))
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    if let Err(err) = esp_wifi.sta_netif_mut().set_hostname(&network.hostname) {
        warn!("failed to set hostname `{}`: {err}", network.hostname);
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    join_or_restart(&mut wifi);

    match wifi.wifi().sta_netif().get_ip_info() {
        Ok(ip_info) => info!("wifi connected, remote at http://{}", ip_info.ip),
        Err(err) => warn!("wifi connected but IP info unavailable: {err}"),
    }

    drop(wifi);
    Ok(esp_wifi)
}

/// Joins the configured network. After the last failed attempt the visible
/// networks are logged and the chip restarts; this never returns on failure.
fn join_or_restart(wifi: &mut BlockingWifi<&mut EspWifi<'static>>) {
    let mut attempt = 1;
    loop {
        let joined = wifi
            .connect()
            .and_then(|()| wifi.wait_netif_up())
            .context("wifi join failed");

        let err = match joined {
            Ok(()) => return,
            Err(err) => err,
        };
        warn!("attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}: {err:#}");
        let _ = wifi.disconnect();

        if attempt == WIFI_CONNECT_ATTEMPTS {
            break;
        }
        attempt += 1;
        thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
    }

    log_visible_networks(wifi);
    warn!("restarting in {}s", WIFI_RESTART_DELAY_MS / 1_000);
    thread::sleep(Duration::from_millis(WIFI_RESTART_DELAY_MS));
    reset::restart();
}

fn log_visible_networks(wifi: &mut BlockingWifi<&mut EspWifi<'static>>) {
    match wifi.scan() {
        Ok(access_points) => {
            info!("{} access points visible:", access_points.len());
            for ap in access_points {
                info!("  `{}` (rssi {}, channel {})", ap.ssid, ap.signal_strength, ap.channel);
            }
        }
        Err(err) => warn!("wifi scan failed: {err}"),
    }
}

fn disable_wifi_power_save() {
    let mode = esp_idf_svc::sys::wifi_ps_type_t_WIFI_PS_NONE;
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(mode) };
    if let Err(err) = esp_idf_svc::sys::esp!(rc) {
        warn!("wifi power save left enabled: {err}");
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 2048];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => RuntimeConfig::from_json(value.as_bytes())
                .context("invalid runtime config in NVS"),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use fanremote_common::{
    BurstTransmitter, ControllerSnapshot, Device, DeviceStateController, FrameSink,
    RemoteCommand, RfConfig, RfFrame, RfTransmit, RuntimeConfig, TransmitError,
    TransmitterDiagnostics, LEGACY_PATHS, PATH_ALL_FANS, PATH_ALL_LIGHTS, PATH_ALL_OFF,
    PATH_DEVICE_FAN, PATH_DEVICE_LIGHT, PATH_RESEND, PATH_RF_CONFIG, PATH_RF_DIAGNOSTICS,
    PATH_STATUS,
};

type HostController = DeviceStateController<BurstTransmitter<LogSink>>;

const HOST_HTTP_PORT: u16 = 8080;

/// Stands in for the radio on a workstation: every frame goes to the log.
#[derive(Debug, Default)]
struct LogSink;

impl FrameSink for LogSink {
    fn send_frame(&mut self, frame: &RfFrame) -> Result<(), TransmitError> {
        info!(
            "rf frame: code {} ({} pulses, {}us)",
            frame.code,
            frame.pulses.len(),
            frame.duration_us()
        );
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<HostController>>,
    rf: Arc<RfConfig>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct RfDiagnosticsView {
    #[serde(rename = "txPin")]
    tx_pin: i32,
    #[serde(rename = "rmtChannel")]
    rmt_channel: u8,
    #[serde(flatten)]
    transmitter: TransmitterDiagnostics,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        host_default_runtime()
    });
    runtime.sanitize();

    let rf_disabled = std::env::var("FANREMOTE_RF_DISABLED").is_ok_and(|value| value == "1");
    let transmitter = if rf_disabled {
        warn!("RF output disabled by FANREMOTE_RF_DISABLED");
        BurstTransmitter::disabled(&runtime.rf)
    } else {
        BurstTransmitter::new(LogSink, &runtime.rf)
    };

    let app_state = AppState {
        controller: Arc::new(Mutex::new(DeviceStateController::new(transmitter))),
        rf: Arc::new(runtime.rf.clone()),
    };

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = build_router(app_state).fallback_service(ServeDir::new(web_root));

    let port = http_port(&runtime, std::env::var("FANREMOTE_HTTP_PORT").ok().as_deref());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("fan remote listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// `FANREMOTE_HTTP_PORT` wins over `network.http_port` when it parses to a
/// non-zero port.
fn http_port(runtime: &RuntimeConfig, env_override: Option<&str>) -> u16 {
    env_override
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(runtime.network.http_port)
}

fn host_default_runtime() -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.network.http_port = HOST_HTTP_PORT;
    runtime
}

fn build_router(app_state: AppState) -> Router {
    let mut router = Router::new()
        .route(PATH_STATUS, get(handle_get_status))
        .route(PATH_DEVICE_FAN, post(handle_device_fan))
        .route(PATH_DEVICE_LIGHT, post(handle_device_light))
        .route(PATH_ALL_FANS, post(handle_all_fans))
        .route(PATH_ALL_LIGHTS, post(handle_all_lights))
        .route(PATH_ALL_OFF, post(handle_all_off))
        .route(PATH_RESEND, post(handle_resend))
        .route(PATH_RF_DIAGNOSTICS, get(handle_get_rf_diagnostics))
        .route(PATH_RF_CONFIG, get(handle_get_rf_config));

    for path in LEGACY_PATHS {
        router = router.route(path, get(handle_legacy));
    }

    router.with_state(app_state)
}

async fn handle_get_status(State(state): State<AppState>) -> Json<ControllerSnapshot> {
    let controller = state.controller.lock().await;
    Json(controller.snapshot())
}

async fn handle_device_fan(State(state): State<AppState>, Path(device): Path<String>) -> Response {
    match device.parse::<Device>() {
        Ok(device) => run_command(&state, RemoteCommand::IncrementFan(device)).await,
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn handle_device_light(
    State(state): State<AppState>,
    Path(device): Path<String>,
) -> Response {
    match device.parse::<Device>() {
        Ok(device) => run_command(&state, RemoteCommand::ToggleLight(device)).await,
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn handle_all_fans(State(state): State<AppState>) -> Response {
    run_command(&state, RemoteCommand::IncrementAllFans).await
}

async fn handle_all_lights(State(state): State<AppState>) -> Response {
    run_command(&state, RemoteCommand::ToggleAllLights).await
}

async fn handle_all_off(State(state): State<AppState>) -> Response {
    run_command(&state, RemoteCommand::AllOff).await
}

async fn handle_resend(State(state): State<AppState>) -> Response {
    run_command(&state, RemoteCommand::ResendAll).await
}

async fn handle_legacy(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(command) = RemoteCommand::from_legacy_path(uri.path()) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown remote path");
    };
    run_command(&state, command).await
}

async fn handle_get_rf_diagnostics(State(state): State<AppState>) -> Json<RfDiagnosticsView> {
    let transmitter = state.controller.lock().await.transmitter().diagnostics();
    Json(RfDiagnosticsView {
        tx_pin: state.rf.tx_pin,
        rmt_channel: state.rf.rmt_channel,
        transmitter,
    })
}

async fn handle_get_rf_config(State(state): State<AppState>) -> Json<RfConfig> {
    Json(state.rf.as_ref().clone())
}

/// Runs one command on a blocking thread, since a burst sleeps between
/// frames, and replies with the resulting status.
async fn run_command(state: &AppState, command: RemoteCommand) -> Response {
    if !state.controller.lock().await.transmitter().is_ready() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "RF transmitter is not available",
        );
    }

    let controller = state.controller.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut controller = controller.blocking_lock();
        let changed = controller.apply(command);
        (changed, controller.snapshot())
    })
    .await;

    match result {
        Ok((changed, snapshot)) => {
            for (device, device_state) in changed {
                info!("{command:?}: {device} -> {device_state}");
            }
            Json(snapshot).into_response()
        }
        Err(err) => {
            warn!("remote command {command:?} did not complete: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Remote command failed")
        }
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("FANREMOTE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.fanremote"));

        Self::at(data_dir)
    }

    fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => RuntimeConfig::from_json(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(host_default_runtime()),
            Err(err) => Err(err.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

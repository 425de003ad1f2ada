use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use irmqtt_common::{
    AccessoryInformation, AccessoryStatus, AirConditioner, Characteristic, CharacteristicProps,
    PlatformConfig, TopicSet,
};

use crate::{broker::BrokerBridge, capability::Accessory};

const DEFAULT_CONFIG_PATH: &str = "irmqtt.json";
const DEFAULT_HTTP_PORT: u16 = 8581;

type BridgedAccessory = Accessory<BrokerBridge>;

#[derive(Clone)]
struct AppState {
    accessories: Arc<Vec<BridgedAccessory>>,
}

impl AppState {
    fn find(&self, name: &str) -> Option<&BridgedAccessory> {
        self.accessories.iter().find(|accessory| accessory.name() == name)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct AccessoryView<'a> {
    name: &'a str,
    prefix: &'a str,
    information: AccessoryInformation,
    characteristics: &'a [CharacteristicProps],
}

#[derive(Debug, Serialize)]
struct AccessoryState<'a> {
    name: &'a str,
    #[serde(flatten)]
    status: AccessoryStatus,
}

#[derive(Debug, Deserialize)]
struct CharacteristicWrite {
    value: Value,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("IRMQTT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path).await?;
    info!(
        "loaded {} accessory config(s) from {}",
        config.devices.len(),
        config_path.display()
    );

    let mut accessories = Vec::with_capacity(config.devices.len());
    for device in &config.devices {
        let state = Arc::new(Mutex::new(AirConditioner::new(device)));
        let bridge = Arc::new(BrokerBridge::new(
            &device.display_name,
            TopicSet::new(&device.mqtt.prefix),
            state.clone(),
        ));
        bridge
            .connect(device)
            .await
            .with_context(|| format!("failed to set up mqtt for '{}'", device.display_name))?;
        debug!(
            "{}: bridged under '{}'",
            device.display_name,
            bridge.topics().prefix()
        );
        accessories.push(Accessory::new(device, state, bridge));
    }

    let app_state = AppState {
        accessories: Arc::new(accessories),
    };

    let app = Router::new()
        .route("/api/accessories", get(handle_list_accessories))
        .route("/api/accessories/{name}", get(handle_get_accessory))
        .route(
            "/api/accessories/{name}/{characteristic}",
            get(handle_get_characteristic).put(handle_put_characteristic),
        )
        .with_state(app_state);

    let port = std::env::var("IRMQTT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind accessory server at {addr}"))?;

    info!("accessory server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<PlatformConfig> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = PlatformConfig::from_json(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn handle_list_accessories(State(state): State<AppState>) -> impl IntoResponse {
    let views: Vec<_> = state
        .accessories
        .iter()
        .map(|accessory| AccessoryView {
            name: accessory.name(),
            prefix: accessory.prefix(),
            information: accessory.information(),
            characteristics: accessory.props(),
        })
        .collect();
    Json(views).into_response()
}

async fn handle_get_accessory(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(accessory) = state.find(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown accessory");
    };

    Json(AccessoryState {
        name: accessory.name(),
        status: accessory.status().await,
    })
    .into_response()
}

async fn handle_get_characteristic(
    State(state): State<AppState>,
    Path((name, characteristic)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(accessory) = state.find(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown accessory");
    };
    let Some(characteristic) = Characteristic::parse(&characteristic) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown characteristic");
    };

    Json(serde_json::json!({ "value": accessory.get(characteristic).await })).into_response()
}

async fn handle_put_characteristic(
    State(state): State<AppState>,
    Path((name, characteristic)): Path<(String, String)>,
    Json(body): Json<CharacteristicWrite>,
) -> impl IntoResponse {
    let Some(accessory) = state.find(&name) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown accessory");
    };
    let Some(characteristic) = Characteristic::parse(&characteristic) else {
        return error_response(StatusCode::NOT_FOUND, "Unknown characteristic");
    };

    if let Err(err) = accessory.set(characteristic, &body.value).await {
        warn!("{name}: rejected write to {}: {err}", characteristic.as_str());
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    Json(serde_json::json!({ "value": accessory.get(characteristic).await })).into_response()
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

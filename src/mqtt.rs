use crate::config::MqttConfig;
use crate::error::{AppError, Result};
use crate::snapshot::Snapshot;
use rumqttc::v5 as mqtt5;
use rumqttc::Transport;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

// Use the MQTT v5 API surface only
pub type AsyncClient = mqtt5::AsyncClient;
pub type EventLoop = mqtt5::EventLoop;

pub fn connect(cfg: &MqttConfig) -> (AsyncClient, EventLoop) {
    let client_id = format!("isg-input-{}", Uuid::new_v4());
    let mut opts = mqtt5::MqttOptions::new(client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    opts.set_clean_start(true);
    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        opts.set_credentials(user.clone(), pass.clone());
    }
    if cfg.port == 8883 {
        opts.set_transport(Transport::tls_with_default_config());
    }
    mqtt5::AsyncClient::new(opts, 50)
}

pub fn qos(v: u8) -> mqtt5::mqttbytes::QoS {
    match v {
        2 => mqtt5::mqttbytes::QoS::ExactlyOnce,
        0 => mqtt5::mqttbytes::QoS::AtMostOnce,
        _ => mqtt5::mqttbytes::QoS::AtLeastOnce,
    }
}

/// Drive the MQTT event loop; rumqttc reconnects on the next poll, we just
/// keep polling and back off briefly on errors.
pub async fn run_event_loop(mut eventloop: EventLoop) {
    loop {
        if let Err(e) = eventloop.poll().await {
            error!("mqtt event loop error: {e}; reconnecting after short delay");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

/// Build the ingestion envelope the homelab pipelines consume:
/// `{ts, tags: {device_id}, fields: {..., stale}}`.
pub fn snapshot_payload(snapshot: &Snapshot, device_id: &str) -> Value {
    let mut fields = Map::new();
    for (key, value) in &snapshot.values {
        // PointValue serializes untagged as number or bool
        if let Ok(v) = serde_json::to_value(value) {
            fields.insert((*key).to_string(), v);
        }
    }
    fields.insert("stale".to_string(), json!(snapshot.stale));

    json!({
        "ts": snapshot.updated_at.map(|t| t.to_rfc3339()),
        "tags": { "device_id": device_id },
        "fields": fields,
    })
}

pub async fn publish_snapshot(
    client: &AsyncClient,
    cfg: &MqttConfig,
    snapshot: &Snapshot,
    device_id: &str,
) -> Result<()> {
    let payload = serde_json::to_vec(&snapshot_payload(snapshot, device_id))?;

    client
        .publish(cfg.topic.as_str(), qos(cfg.qos), false, payload)
        .await
        .map_err(|e| AppError::Mqtt(e.to_string()))?;

    debug!(topic = %cfg.topic, "snapshot published");
    Ok(())
}

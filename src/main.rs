use isg_input::config::Config;
use isg_input::gateway::IsgClient;
use isg_input::poller::Poller;
use isg_input::reconcile::Reconciler;
use isg_input::{mqtt, state};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(gateway = %cfg.gateway.host, interval = cfg.poll.interval_secs, "loaded config");

    let client = IsgClient::new(&cfg.gateway)?;
    if let Err(e) = client.connect().await {
        // the poller retries every cycle and flags staleness, so a gateway
        // that is down at startup is not fatal
        warn!(error = %e, "initial gateway check failed, continuing anyway");
    }

    let device = client.device_info().await;
    if let Some(version) = &device.sw_version {
        info!(version = %version, "ISG firmware");
    }
    let device_id = device
        .mac_address
        .clone()
        .unwrap_or_else(|| cfg.gateway.host.clone());
    info!(device_id = %device_id, "device identity resolved");

    let state_path = PathBuf::from(&cfg.state.path);
    let restored = state::load(&state_path)?.unwrap_or_default();
    if !restored.is_empty() {
        info!(counters = restored.len(), "restored counter state");
    }
    let reconciler = Reconciler::with_states(restored, cfg.poll.counter_anomaly_kwh);

    let poller = Poller::new(client, reconciler, &cfg.poll, Some(state_path));

    if let Some(mqtt_cfg) = cfg.mqtt.clone() {
        let (mqtt_client, eventloop) = mqtt::connect(&mqtt_cfg);
        tokio::spawn(mqtt::run_event_loop(eventloop));
        info!(
            broker = %mqtt_cfg.host,
            topic = %mqtt_cfg.topic,
            "MQTT publishing enabled"
        );

        let mut snapshots = poller.subscribe();
        let publisher_id = device_id.clone();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.updated_at.is_none() {
                    continue;
                }
                if let Err(e) =
                    mqtt::publish_snapshot(&mqtt_client, &mqtt_cfg, &snapshot, &publisher_id).await
                {
                    warn!(error = %e, "snapshot publish failed");
                }
            }
        });
    }

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    tokio::select! {
        biased;
        _ = &mut sig => {
            info!("shutdown requested");
        }
        _ = poller.run() => {}
    }

    Ok(())
}

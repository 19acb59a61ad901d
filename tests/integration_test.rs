use isg_input::config::{Config, GatewayConfig, PollConfig};
use isg_input::gateway::IsgClient;
use isg_input::normalize::PointValue;
use isg_input::poller::Poller;
use isg_input::reconcile::Reconciler;
use isg_input::state;
use mockito::{Mock, ServerGuard};
use pretty_assertions::assert_eq;
use serial_test::serial;

fn info_system_page(room_temp: &str) -> String {
    format!(
        r#"<html><head><title>STIEBEL ELTRON Reglersteuerung</title></head><body>
<div class="eingestelle_sprache">ENGLISH</div>
<table>
  <tr><th>ROOM TEMPERATURE</th></tr>
  <tr><td>ACTUAL TEMPERATURE 1</td><td>{room_temp}</td></tr>
  <tr><td>RELATIVE HUMIDITY 1</td><td>43,0%</td></tr>
  <tr><td>OUTSIDE TEMPERATURE</td><td>-3,2°C</td></tr>
  <tr><td>ACTUAL TEMPERATURE HK 1</td><td>32,4°C</td></tr>
  <tr><td>SET TEMPERATURE HK 1</td><td>33,0°C</td></tr>
</table>
</body></html>"#
    )
}

fn info_heatpump_page(heating_day_kwh: f64, consumption_day_kwh: f64) -> String {
    format!(
        r#"<html><body>
<div class="eingestelle_sprache">ENGLISH</div>
<table>
  <tr><th>AMOUNT OF HEAT</th></tr>
  <tr><td>VD HEATING DAY</td><td>{heating},0KWh</td></tr>
  <tr><td>VD HEATING TOTAL</td><td>3,250MWh</td></tr>
</table>
<table>
  <tr><th>POWER CONSUMPTION</th></tr>
  <tr><td>VD HEATING DAY</td><td>{consumption},0KWh</td></tr>
  <tr><td>VD HEATING TOTAL</td><td>1,100MWh</td></tr>
</table>
<table>
  <tr><th>STARTS</th></tr>
  <tr><td>COMPRESSOR</td><td>1234</td></tr>
</table>
</body></html>"#,
        heating = heating_day_kwh as i64,
        consumption = consumption_day_kwh as i64,
    )
}

fn system_status_page() -> String {
    r#"<html><body>
<div class="eingestelle_sprache">ENGLISH</div>
<table>
  <tr><th>OPERATING MODE</th></tr>
  <tr><td>DEFROST</td><td><img src="/pics/ste-symbol_aus-02.png"></td></tr>
</table>
</body></html>"#
        .to_string()
}

fn heatpump_status_page() -> String {
    r#"<html><body>
<div class="eingestelle_sprache">ENGLISH</div>
<table>
  <tr><th>HEAT PUMP STATUS</th></tr>
  <tr><td>COMPRESSOR</td><td><img src="/pics/ste-symbol_an-01.png"></td></tr>
  <tr><td>AUXILIARY HEATER</td><td><img src="/pics/ste-symbol_aus-01.png"></td></tr>
  <tr><td>BOOSTER HEATER STAGE 1</td><td><img src="/pics/ste-symbol_aus-01.png"></td></tr>
  <tr><td>BOOSTER HEATER STAGE 2</td><td><img src="/pics/ste-symbol_aus-01.png"></td></tr>
</table>
</body></html>"#
        .to_string()
}

/// Mock all four polled pages; the most recently created mocks win, so this
/// can be called again to swap the gateway's answers between cycles.
async fn mock_all_pages(server: &mut ServerGuard, heating_day_kwh: f64) -> Vec<Mock> {
    let mut mocks = Vec::new();
    for (path, body) in [
        ("/?s=1,0", info_system_page("21,5°C")),
        ("/?s=1,1", info_heatpump_page(heating_day_kwh, 4.0)),
        ("/?s=2,0", system_status_page()),
        ("/?s=2,2", heatpump_status_page()),
    ] {
        mocks.push(
            server
                .mock("GET", path)
                .with_status(200)
                .with_body(body)
                .create_async()
                .await,
        );
    }
    mocks
}

fn poll_config() -> PollConfig {
    PollConfig {
        interval_secs: 60,
        stale_after_cycles: 3,
        counter_anomaly_kwh: 100.0,
    }
}

fn test_client(url: &str) -> IsgClient {
    IsgClient::new(&GatewayConfig {
        host: url.to_string(),
        username: None,
        password: None,
        timeout_secs: 2,
        verify_title: true,
    })
    .unwrap()
}

fn number(snapshot: &isg_input::Snapshot, key: &str) -> f64 {
    snapshot
        .values
        .get(key)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("no numeric value for {}", key))
}

#[tokio::test]
async fn test_full_cycle_publishes_all_fields() {
    let mut server = mockito::Server::new_async().await;
    mock_all_pages(&mut server, 12.0).await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );
    poller.run_cycle().await;

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.values.len(), 15);
    assert!(!snapshot.stale);
    assert!(snapshot.updated_at.is_some());

    assert_eq!(number(&snapshot, "room_temperature"), 21.5);
    assert_eq!(number(&snapshot, "room_relative_humidity"), 43.0);
    assert_eq!(number(&snapshot, "outside_temperature"), -3.2);
    assert_eq!(number(&snapshot, "flow_temperature"), 32.4);
    assert_eq!(number(&snapshot, "target_flow_temperature"), 33.0);

    // first observation seeds the lifetime totals with the daily readings
    assert_eq!(number(&snapshot, "heating_energy"), 12.0);
    assert_eq!(number(&snapshot, "power_consumption"), 4.0);
    assert_eq!(number(&snapshot, "total_heating_energy"), 3250.0);
    assert_eq!(number(&snapshot, "total_power_consumption"), 1100.0);
    assert_eq!(number(&snapshot, "compressor_starts"), 1234.0);

    assert_eq!(
        snapshot.values.get("compressor_status"),
        Some(&PointValue::Bool(true))
    );
    assert_eq!(
        snapshot.values.get("auxiliary_heater_status"),
        Some(&PointValue::Bool(false))
    );
    assert_eq!(
        snapshot.values.get("defrost_status"),
        Some(&PointValue::Bool(false))
    );
}

#[tokio::test]
async fn test_counter_reset_keeps_total_monotonic() {
    let mut server = mockito::Server::new_async().await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );

    // day readings 5, 7, then a reset to 2, then 6
    let mut totals = Vec::new();
    for reading in [5.0, 7.0, 2.0, 6.0] {
        mock_all_pages(&mut server, reading).await;
        poller.run_cycle().await;
        totals.push(number(&poller.snapshot(), "heating_energy"));
    }

    assert_eq!(totals, vec![5.0, 7.0, 9.0, 13.0]);
}

#[tokio::test]
async fn test_partial_failure_keeps_previous_values() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_all_pages(&mut server, 12.0).await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );
    poller.run_cycle().await;
    assert_eq!(number(&poller.snapshot(), "room_temperature"), 21.5);

    // second cycle: Info > System now errors, the other pages answer with
    // fresh data
    for mock in first {
        mock.remove_async().await;
    }
    server
        .mock("GET", "/?s=1,0")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/?s=1,1")
        .with_status(200)
        .with_body(info_heatpump_page(13.0, 5.0))
        .create_async()
        .await;
    server
        .mock("GET", "/?s=2,0")
        .with_status(200)
        .with_body(system_status_page())
        .create_async()
        .await;
    server
        .mock("GET", "/?s=2,2")
        .with_status(200)
        .with_body(heatpump_status_page())
        .create_async()
        .await;

    poller.run_cycle().await;
    let snapshot = poller.snapshot();

    // previously-good reading survives the failed page
    assert_eq!(number(&snapshot, "room_temperature"), 21.5);
    // fields from the healthy pages moved on
    assert_eq!(number(&snapshot, "heating_energy"), 13.0);
    assert!(!snapshot.stale);
}

#[tokio::test]
async fn test_missing_row_degrades_single_field() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_all_pages(&mut server, 12.0).await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );
    poller.run_cycle().await;

    // the humidity row disappears from the page (rendering glitch)
    for mock in first {
        mock.remove_async().await;
    }
    mock_all_pages(&mut server, 12.0).await;
    let glitched = info_system_page("22,0°C").replace(
        "<tr><td>RELATIVE HUMIDITY 1</td><td>43,0%</td></tr>",
        "",
    );
    // created last, so it wins over the Info > System mock above
    server
        .mock("GET", "/?s=1,0")
        .with_status(200)
        .with_body(glitched)
        .create_async()
        .await;

    poller.run_cycle().await;
    let snapshot = poller.snapshot();

    assert_eq!(number(&snapshot, "room_temperature"), 22.0);
    // humidity keeps the value from the previous cycle
    assert_eq!(number(&snapshot, "room_relative_humidity"), 43.0);
}

#[tokio::test]
async fn test_staleness_escalates_and_clears() {
    let mut server = mockito::Server::new_async().await;
    let mocks = mock_all_pages(&mut server, 12.0).await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );
    poller.run_cycle().await;
    assert!(!poller.snapshot().stale);

    // gateway goes dark: every page errors from now on
    for mock in mocks {
        mock.remove_async().await;
    }

    poller.run_cycle().await;
    poller.run_cycle().await;
    assert!(!poller.snapshot().stale, "stale before the threshold");

    poller.run_cycle().await;
    let snapshot = poller.snapshot();
    assert!(snapshot.stale, "stale after 3 consecutive failures");
    // the last good values are still there
    assert_eq!(number(&snapshot, "room_temperature"), 21.5);
    assert_eq!(number(&snapshot, "heating_energy"), 12.0);

    // gateway comes back: flag clears on the next successful cycle
    mock_all_pages(&mut server, 12.0).await;
    poller.run_cycle().await;
    assert!(!poller.snapshot().stale);
}

#[tokio::test]
async fn test_counter_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("counters.json");

    let mut server = mockito::Server::new_async().await;
    mock_all_pages(&mut server, 5.0).await;

    // first service lifetime
    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        Some(state_path.clone()),
    );
    poller.run_cycle().await;
    assert_eq!(number(&poller.snapshot(), "heating_energy"), 5.0);
    drop(poller);

    // restart: reload persisted totals, then observe a higher daily reading
    let restored = state::load(&state_path).unwrap().unwrap();
    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::with_states(restored, 100.0),
        &poll_config(),
        Some(state_path.clone()),
    );
    mock_all_pages(&mut server, 7.0).await;
    poller.run_cycle().await;

    // 5 + (7 - 5): continued accumulation, no double-counting
    assert_eq!(number(&poller.snapshot(), "heating_energy"), 7.0);
}

#[tokio::test]
#[serial]
async fn test_config_loading_with_env_expansion() {
    let config_str = r#"
gateway:
  host: "192.168.1.30"
  username: "service"
  password: "$(ISG_TEST_PASSWORD)"

poll:
  interval_secs: 30

mqtt:
  host: "localhost"
  port: 1883
  topic: "home/heatpump/telemetry"
"#;

    let temp_file = std::env::temp_dir().join(format!("isg-config-{}.yaml", std::process::id()));
    std::fs::write(&temp_file, config_str).unwrap();

    std::env::set_var("ISG_TEST_PASSWORD", "hunter2");
    let config = Config::load(&temp_file).unwrap();
    std::env::remove_var("ISG_TEST_PASSWORD");

    assert_eq!(config.gateway.host, "192.168.1.30");
    assert_eq!(config.gateway.password.as_deref(), Some("hunter2"));
    assert_eq!(config.poll.interval_secs, 30);
    // unset sections fall back to defaults
    assert_eq!(config.poll.stale_after_cycles, 3);
    assert_eq!(config.state.path, "data/counter-state.json");
    assert_eq!(config.mqtt.unwrap().topic, "home/heatpump/telemetry");

    std::fs::remove_file(&temp_file).ok();
}

#[tokio::test]
async fn test_normalization_failure_keeps_previous_value() {
    let mut server = mockito::Server::new_async().await;
    let first = mock_all_pages(&mut server, 12.0).await;

    let mut poller = Poller::new(
        test_client(&server.url()),
        Reconciler::new(100.0),
        &poll_config(),
        None,
    );
    poller.run_cycle().await;

    // the temperature cell turns to garbage
    for mock in first {
        mock.remove_async().await;
    }
    mock_all_pages(&mut server, 12.0).await;
    server
        .mock("GET", "/?s=1,0")
        .with_status(200)
        .with_body(info_system_page("ERROR"))
        .create_async()
        .await;

    poller.run_cycle().await;
    assert_eq!(number(&poller.snapshot(), "room_temperature"), 21.5);
}

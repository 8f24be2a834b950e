use super::*;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn empty_environment_yields_defaults() {
    let cfg = RelayConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg, RelayConfig::default());
    assert_eq!(cfg.port, 3000);
    assert_eq!(cfg.max_content_bytes, 4096);
    assert_eq!(cfg.heartbeat.ping_interval, Duration::from_secs(25));
}

#[test]
fn overrides_are_applied() {
    let cfg = RelayConfig::from_lookup(lookup_from(&[
        ("PORT", "8080"),
        ("RELAY_MAX_CONTENT_BYTES", "16"),
        ("RELAY_OUTBOX_CAPACITY", " 4 "),
        ("RELAY_PING_INTERVAL_MS", "100"),
        ("RELAY_PING_TIMEOUT_MS", "50"),
        ("RELAY_RATE_LIMIT_PER_CONNECTION", "2"),
        ("RELAY_RATE_LIMIT_GLOBAL_WINDOW_SECS", "5"),
    ]))
    .unwrap();

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.max_content_bytes, 16);
    assert_eq!(cfg.outbox_capacity, 4);
    assert_eq!(
        cfg.heartbeat,
        HeartbeatConfig { ping_interval: Duration::from_millis(100), ping_timeout: Duration::from_millis(50) }
    );
    assert_eq!(cfg.rate_limit.per_connection_limit, 2);
    assert_eq!(cfg.rate_limit.global_window, Duration::from_secs(5));
    assert_eq!(cfg.rate_limit.global_limit, DEFAULT_GLOBAL_LIMIT);
}

#[test]
fn malformed_value_is_rejected() {
    let err = RelayConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { var: "PORT", value: "eighty".into() });
}

#[test]
fn zero_capacity_is_rejected() {
    let err = RelayConfig::from_lookup(lookup_from(&[("RELAY_OUTBOX_CAPACITY", "0")])).unwrap_err();
    assert_eq!(err, ConfigError::Zero { var: "RELAY_OUTBOX_CAPACITY" });
}

#[test]
fn negative_size_does_not_parse() {
    let err = RelayConfig::from_lookup(lookup_from(&[("RELAY_MAX_CONTENT_BYTES", "-1")])).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { var: "RELAY_MAX_CONTENT_BYTES", .. }));
}

#[test]
fn huge_heartbeat_timings_are_rejected() {
    for var in ["RELAY_PING_INTERVAL_MS", "RELAY_PING_TIMEOUT_MS"] {
        let huge = u64::MAX.to_string();
        let err = RelayConfig::from_lookup(lookup_from(&[(var, huge.as_str())])).unwrap_err();
        assert_eq!(err, ConfigError::TooLarge { var, max: MAX_HEARTBEAT_MS });
    }
}

#[test]
fn heartbeat_at_limit_is_accepted() {
    let limit = MAX_HEARTBEAT_MS.to_string();
    let cfg = RelayConfig::from_lookup(lookup_from(&[("RELAY_PING_INTERVAL_MS", limit.as_str())])).unwrap();
    assert_eq!(cfg.heartbeat.ping_interval, Duration::from_millis(MAX_HEARTBEAT_MS));

    // Deadline arithmetic stays in range at the limit.
    let mut heartbeat = crate::heartbeat::Heartbeat::new(cfg.heartbeat, tokio::time::Instant::now());
    assert!(heartbeat.next_wakeup() > tokio::time::Instant::now());
    assert_eq!(heartbeat.poll(tokio::time::Instant::now()), crate::heartbeat::Beat::Idle);
}

#[test]
fn content_limit_above_payload_limit_is_rejected() {
    let err = RelayConfig::from_lookup(lookup_from(&[
        ("RELAY_MAX_CONTENT_BYTES", "2048"),
        ("RELAY_MAX_PAYLOAD_BYTES", "1024"),
    ]))
    .unwrap_err();
    assert_eq!(err, ConfigError::ContentExceedsPayload { content: 2048, payload: 1024 });
}

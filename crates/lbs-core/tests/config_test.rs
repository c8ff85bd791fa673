//! Integration test: configuration loading
//!
//! Run with: cargo test -p lbs-core --test config_test

use lbs_core::config::{BusConfig, LbsConfig};
use lbs_core::CoreError;

#[test]
fn test_empty_file_gives_defaults() {
    let config = LbsConfig::parse("").expect("empty config");
    assert_eq!(config.server.service_name, "org.tizen.lbs.Providers.LbsServer");
    assert_eq!(config.server.max_clients, 64);
    assert_eq!(config.server.idle_timeout_secs, None);
    assert!(config.server.socket_path.is_none());
    assert_eq!(config.bus, BusConfig::default());
    assert_eq!(config.bus.object_path, "/org/freedesktop/DBus");
    assert!(config.arbiter.interval_arbitration);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = LbsConfig::parse(
        r#"
        [server]
        name = "gps-provider"
        socket_path = "/run/lbs/test.sock"
        max_clients = 8

        [bus]
        sender_name = "test.Bus"

        [arbiter]
        interval_arbitration = false
        "#,
    )
    .expect("valid config");

    assert_eq!(config.server.name.as_deref(), Some("gps-provider"));
    assert_eq!(config.server.socket_path.as_deref(), Some("/run/lbs/test.sock"));
    assert_eq!(config.server.max_clients, 8);
    assert_eq!(config.server.idle_timeout_secs, None);
    assert_eq!(config.bus.sender_name, "test.Bus");
    assert_eq!(config.bus.interface_name, "org.freedesktop.DBus");
    assert!(!config.arbiter.interval_arbitration);
}

#[test]
fn test_idle_timeout_is_opt_in() {
    let config = LbsConfig::parse("[server]\nidle_timeout_secs = 300\n").expect("valid config");
    assert_eq!(config.server.idle_timeout_secs, Some(300));

    let config = LbsConfig::parse("[server]\nidle_timeout_secs = 0\n").expect("valid config");
    assert_eq!(config.server.idle_timeout_secs, Some(0));

    assert_eq!(LbsConfig::default().server.idle_timeout_secs, None);
}

#[test]
fn test_bad_toml_is_config_error() {
    match LbsConfig::parse("[server\nname = ") {
        Err(CoreError::ConfigError(_)) => {}
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = LbsConfig::load_or_default("/nonexistent/lbs-test/lbs.toml");
    assert_eq!(config.server.max_clients, 64);
}

//! Integration tests for modbus-push-common library.

use modbus_push_common::{Error, LogFormat, LoggingConfig, init_tracing, parse_config};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AppConfig {
    name: String,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_config_with_logging_section() {
    let config: AppConfig = parse_config(
        r#"{
            // comments and trailing commas are JSON5
            name: "poller",
            logging: { level: "debug", format: "json", },
        }"#,
    )
    .expect("parse failed");

    assert_eq!(config.name, "poller");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_tracing_initializes_once() {
    let config = LoggingConfig::default();

    init_tracing(&config).expect("first init should succeed");

    // A global subscriber is already installed.
    let second = init_tracing(&config);
    assert!(matches!(second, Err(Error::Logging(_))));
}

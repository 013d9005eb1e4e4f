//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use wa_gateway::cli::{parse_args_from, Args};
use wa_gateway::config::Config;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("wa-gateway")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.host.is_none());
    assert!(result.port.is_none());
    assert!(result.config.is_none());
    assert!(result.bridge.is_none());
    assert!(result.log_level.is_none());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-H",
        "0.0.0.0",
        "-p",
        "8080",
        "--bridge",
        "/opt/wa-bridge/run.sh",
        "-l",
        "debug",
    ]))
    .unwrap();

    assert_eq!(result.host.unwrap().to_string(), "0.0.0.0");
    assert_eq!(result.port, Some(8080));
    assert_eq!(result.bridge.as_deref(), Some("/opt/wa-bridge/run.sh"));
    assert_eq!(result.log_level, Some("debug".to_string()));
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/wa-gateway.json"])).unwrap();

    assert_eq!(result.config, Some(PathBuf::from("/etc/wa-gateway.json")));
}

#[test]
fn test_cli_invalid_port() {
    let result = parse_args_from(args(&["-p", "not-a-number"]));
    assert!(result.is_err());
}

#[test]
fn test_cli_unknown_flag() {
    let result = parse_args_from(args(&["--api-key", "x"]));
    assert!(result.is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let file = config_file(
        r#"{
        "server": {
            "host": "192.168.1.100",
            "port": 9000,
            "graceful_shutdown": false
        },
        "session": {
            "retry_delay_ms": 250,
            "reset_delay_ms": 100,
            "max_retries": 4,
            "credentials_dir": "/var/lib/wa-gateway/creds"
        },
        "transport": {
            "command": "node",
            "args": ["bridge.js", "--headless"],
            "send_timeout_secs": 15
        },
        "uploads": {
            "dir": "/tmp/wa-uploads",
            "max_file_bytes": 2048
        },
        "logging": {
            "level": "debug"
        }
    }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.server.host, "192.168.1.100");
    assert_eq!(config.server.port, 9000);
    assert!(!config.server.graceful_shutdown);
    assert_eq!(config.logging.level, "debug");

    let policy = config.recovery_policy();
    assert_eq!(policy.retry_delay, Duration::from_millis(250));
    assert_eq!(policy.reset_delay, Duration::from_millis(100));
    assert_eq!(policy.max_retries, Some(4));

    let bridge = config.bridge_config();
    assert_eq!(bridge.program, "node");
    assert_eq!(bridge.args.len(), 2);
    assert_eq!(bridge.session_dir, PathBuf::from("/var/lib/wa-gateway/creds"));
    assert_eq!(
        config.credential_store().dir(),
        PathBuf::from("/var/lib/wa-gateway/creds").as_path()
    );

    assert_eq!(config.send_timeout(), Some(Duration::from_secs(15)));

    let uploads = config.upload_config();
    assert_eq!(uploads.dir, PathBuf::from("/tmp/wa-uploads"));
    assert_eq!(uploads.max_file_bytes, 2048);
}

#[test]
fn test_config_priority_cli_over_file() {
    let file = config_file(
        r#"{
        "server": {
            "host": "10.0.0.1",
            "port": 5000
        },
        "transport": { "command": "from-file" }
    }"#,
    );

    let args = Args {
        host: Some("192.168.1.1".to_string()),
        port: Some(8080),
        bridge: Some("from-cli".to_string()),
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    // CLI values should win
    assert_eq!(config.server.host, "192.168.1.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.transport.command, "from-cli");
}

#[test]
fn test_config_missing_file() {
    let args = Args {
        config: Some(PathBuf::from("/nonexistent/wa-gateway.json")),
        ..Args::default()
    };

    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_malformed_file() {
    let file = config_file("{ not json");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_config_to_server_config() {
    let args = Args {
        host: Some("0.0.0.0".to_string()),
        port: Some(8080),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();
    let server_config = config.to_server_config().unwrap();

    assert_eq!(server_config.bind_address().to_string(), "0.0.0.0:8080");
}

#[test]
fn test_cli_localhost_binds_loopback() {
    let args = parse_args_from(args(&["-H", "localhost", "-p", "8080"])).unwrap();

    let config = Config::load(&args).unwrap();
    let server_config = config.to_server_config().unwrap();

    assert_eq!(server_config.bind_address().to_string(), "127.0.0.1:8080");
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_roundtrip() {
    let original = Config::default();
    let json = serde_json::to_string(&original).unwrap();
    let loaded: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(original.server.host, loaded.server.host);
    assert_eq!(original.server.port, loaded.server.port);
    assert_eq!(original.session.credentials_dir, loaded.session.credentials_dir);
    assert_eq!(original.session.max_retries, loaded.session.max_retries);
}

#[test]
fn test_config_partial_deserialization() {
    // Only specify some fields, others should use defaults
    let json = r#"{"server": {"port": 9999}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.server.port, 9999);
    assert_eq!(config.server.host, "127.0.0.1"); // Default
    assert!(config.server.graceful_shutdown); // Default
    assert_eq!(config.transport.send_timeout_secs, 60);
}

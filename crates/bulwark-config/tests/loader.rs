//! File-based loader tests.

use std::io::Write;

use bulwark_config::{ConfigError, ConfigLoader, LogDestination};
use bulwark_core::ResultCodeFormat;
use tempfile::NamedTempFile;

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_partial_toml_file() {
    let file = write_temp(
        ".toml",
        r#"
            [cors]
            path_patterns = ["/api/**"]
            allowed_origins = ["https://app.example.com"]

            [logging]
            max_size = 256
            skip_path_prefixes = ["/health"]
        "#,
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.cors.path_patterns, vec!["/api/**"]);
    assert_eq!(config.cors.allowed_methods, vec!["*"]);
    assert_eq!(config.logging.max_size, 256);
    assert_eq!(config.logging.sensitive_fields, vec!["password"]);
    assert!(config.xss.enabled);
    assert!(!config.xss.signatures.is_empty());
}

#[test]
fn loads_json_file() {
    let file = write_temp(
        ".json",
        r#"{
            "envelope": {"result_code_format": "numeric", "include_timestamp": true},
            "logging": {"destination": "none"}
        }"#,
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();

    assert_eq!(config.envelope.result_code_format, ResultCodeFormat::Numeric);
    assert!(config.envelope.include_timestamp);
    assert_eq!(config.logging.destination, LogDestination::None);
}

#[test]
fn rejects_unknown_field_in_file() {
    let file = write_temp(".toml", "[cors]\nallowed_origin = [\"https://a.com\"]\n");

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::TomlError(_))));
}

#[test]
fn rejects_unsupported_extension() {
    let file = write_temp(".yaml", "cors:\n  enabled: true\n");

    let result = ConfigLoader::new().with_file(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn rejects_invalid_signature_on_load() {
    let file = write_temp(".toml", "[xss]\nsignatures = [\"(unclosed\"]\n");

    let result = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load();
    assert!(result.is_err());
}

#[test]
fn disabled_filter_skips_signature_validation() {
    let file = write_temp(
        ".toml",
        "[sql_injection]\nenabled = false\nsignatures = [\"(unclosed\"]\n",
    );

    let config = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load()
        .unwrap();
    assert!(!config.sql_injection.enabled);
}

#[test]
fn http_destination_requires_url() {
    let file = write_temp(".toml", "[logging]\ndestination = \"http\"\n");

    let result = ConfigLoader::new()
        .with_file(file.path())
        .unwrap()
        .load();
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn optional_file_is_loaded_when_present() {
    let file = write_temp(".toml", "[trace]\ntrust_incoming = false\n");

    let config = ConfigLoader::new()
        .with_production()
        .with_optional_file(file.path())
        .unwrap()
        .load_unvalidated();

    assert!(!config.trace.trust_incoming);
    // The file replaces the preset wholesale; unspecified sections fall back to defaults.
    assert!(!config.envelope.include_timestamp);
}

#[test]
fn string_replaces_preset_and_earlier_file() {
    let file = write_temp(".toml", "[logging]
max_size = 64
");

    let config = ConfigLoader::new()
        .with_production()
        .with_file(file.path())
        .unwrap()
        .with_string("[trace]
trust_incoming = false
", "toml")
        .unwrap()
        .load_unvalidated();

    assert!(!config.trace.trust_incoming);
    assert_eq!(config.logging.max_size, bulwark_config::BulwarkConfig::default().logging.max_size);
    assert!(!config.envelope.include_timestamp);
}

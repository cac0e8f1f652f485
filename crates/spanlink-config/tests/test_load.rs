//! Loading config files from disk.

use std::io::Write;

use pretty_assertions::assert_eq;
use spanlink_config::{Config, ConfigError, ModelType, Scheme, CONFIG_ENV};

fn write(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const TOML: &str = r#"
[model]
model_type = "nezha"
model_name_or_path = "models/nezha"
scheme = "tplinker_plus"
"#;

#[test]
fn test_from_path_by_extension() {
    let toml = write(".toml", TOML);
    let config = Config::from_path(toml.path()).unwrap();
    assert_eq!(config.model.model_type, ModelType::Nezha);
    assert_eq!(config.model.scheme, Scheme::TpLinkerPlus);

    let yaml = write(".yml", "model:\n  model_name_or_path: models/bert\n  scheme: gplinker_event\n");
    let config = Config::from_path(yaml.path()).unwrap();
    assert_eq!(config.model.scheme, Scheme::GpLinkerEvent);

    let json = write(".json", "{}");
    assert!(matches!(Config::from_path(json.path()), Err(ConfigError::UnsupportedFormat(_))));
}

#[test]
fn test_missing_file_and_env_override() {
    assert!(matches!(
        Config::from_path("/nonexistent/spanlink.toml"),
        Err(ConfigError::NotFound(_))
    ));

    let toml = write(".toml", TOML);
    std::env::set_var(CONFIG_ENV, toml.path());
    let config = Config::load().unwrap();
    std::env::remove_var(CONFIG_ENV);
    assert_eq!(config.model.model_type, ModelType::Nezha);
}

#[test]
fn test_missing_tokenizer_surfaces_codec_error() {
    let toml = write(".toml", TOML);
    let config = Config::from_path(toml.path()).unwrap();
    assert!(matches!(config.tokenizer(), Err(ConfigError::Codec(_))));
}

use std::fs;
use tempfile::TempDir;
use usagedash::config::{AppConfig, ConfigManager};
use usagedash::{LoadArgs, OpenOptions};

// Helper to create a temporary config directory for testing
fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.version, "0.1");

    assert_eq!(config.file_loading.delimiter, None);
    assert_eq!(config.file_loading.has_header, None);

    assert_eq!(config.merge.fill_column, "usage_storage");
    assert_eq!(config.merge.fill_group.as_deref(), Some("region"));
    assert!(!config.merge.left_join);
    assert_eq!(config.merge.output, "cleaned_merged.csv");

    assert_eq!(config.display.preview_rows, 10);
    assert_eq!(config.display.output, "text");

    assert_eq!(config.logging.level, "warn");
}

#[test]
fn test_generate_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let template = config_manager.generate_default_config();

    assert!(template.contains("[file_loading]"));
    assert!(template.contains("[merge]"));
    assert!(template.contains("[display]"));
    assert!(template.contains("[logging]"));
    assert!(template.contains("version = \"0.1\""));
}

#[test]
fn test_write_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let config_path = config_manager
        .write_default_config(false)
        .expect("Failed to write config");

    assert!(config_path.exists());

    let content = fs::read_to_string(&config_path).expect("Failed to read config");
    assert!(content.contains("[merge]"));
    assert!(content.contains("version = \"0.1\""));
}

#[test]
fn test_write_config_without_force_fails_if_exists() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    config_manager
        .write_default_config(false)
        .expect("First write should succeed");

    let result = config_manager.write_default_config(false);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("already exists"));
}

#[test]
fn test_write_config_with_force_overwrites() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let first_path = config_manager
        .write_default_config(false)
        .expect("First write should succeed");
    fs::write(&first_path, "version = \"0.1\"\n").expect("Failed to truncate config");

    let second_path = config_manager
        .write_default_config(true)
        .expect("Second write with force should succeed");

    assert_eq!(first_path, second_path);
    let content = fs::read_to_string(&second_path).expect("Failed to read config");
    assert!(content.contains("[logging]"));
}

#[test]
fn test_load_config_with_no_file() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let config = AppConfig::load_from(&config_manager).expect("Should load default config");

    assert_eq!(config.version, "0.1");
    assert_eq!(config.display.preview_rows, 10);
}

#[test]
fn test_load_written_template() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager
        .write_default_config(false)
        .expect("Failed to write config");

    let config = AppConfig::load_from(&config_manager).expect("Template should load");
    assert_eq!(config.merge.fill_column, "usage_storage");
    assert_eq!(config.logging.level, "warn");
}

#[test]
fn test_load_and_parse_minimal_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager
        .ensure_config_dir()
        .expect("Failed to create config dir");

    let minimal_config = r#"
version = "0.1"

[display]
preview_rows = 25

[merge]
left_join = true
"#;
    fs::write(config_manager.config_path("config.toml"), minimal_config)
        .expect("Failed to write minimal config");

    let config = AppConfig::load_from(&config_manager).expect("Failed to load config");

    assert_eq!(config.display.preview_rows, 25);
    assert!(config.merge.left_join);

    // Unspecified values keep their defaults
    assert_eq!(config.display.output, "text");
    assert_eq!(config.merge.fill_column, "usage_storage");
}

#[test]
fn test_load_rejects_invalid_file() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    config_manager
        .ensure_config_dir()
        .expect("Failed to create config dir");
    fs::write(config_manager.config_path("config.toml"), "[display\n")
        .expect("Failed to write config");

    let result = AppConfig::load_from(&config_manager);
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Failed to parse config file"));
}

#[test]
fn test_merge_configs() {
    let mut base = AppConfig::default();
    let mut override_config = AppConfig::default();

    override_config.display.preview_rows = 3;
    override_config.merge.fill_column = "temperature".to_string();
    override_config.file_loading.skip_rows = Some(1);
    override_config.logging.level = "debug".to_string();

    base.merge(override_config);

    assert_eq!(base.display.preview_rows, 3);
    assert_eq!(base.merge.fill_column, "temperature");
    assert_eq!(base.file_loading.skip_rows, Some(1));
    assert_eq!(base.logging.level, "debug");

    // Unmodified values remain default
    assert_eq!(base.display.output, "text");
    assert_eq!(base.merge.output, "cleaned_merged.csv");
}

#[test]
fn test_validate_config_valid() {
    assert!(AppConfig::default().validate().is_ok());
}

#[test]
fn test_validate_config_invalid_version() {
    let config = AppConfig {
        version: "1.0".to_string(),
        ..Default::default()
    };

    let result = config.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Unsupported config version"));
}

#[test]
fn test_validate_config_zero_preview_rows() {
    let mut config = AppConfig::default();
    config.display.preview_rows = 0;

    let result = config.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("preview_rows must be greater than 0"));
}

#[test]
fn test_validate_config_bad_output_format() {
    let mut config = AppConfig::default();
    config.display.output = "yaml".to_string();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("Invalid output format"));
}

#[test]
fn test_validate_config_bad_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "loud".to_string();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Invalid log level"));
}

#[test]
fn test_validate_config_bad_compression() {
    let mut config = AppConfig::default();
    config.file_loading.compression = Some("rar".to_string());

    assert!(config.validate().is_err());
}

#[test]
fn test_cli_overrides_config() {
    let mut config = AppConfig::default();
    config.file_loading.delimiter = Some(b';');
    config.file_loading.skip_rows = Some(3);

    let args = LoadArgs {
        delimiter: Some(b'\t'),
        ..Default::default()
    };
    let opts = OpenOptions::from_args_and_config(&args, &config);

    assert_eq!(opts.delimiter, Some(b'\t'));
    assert_eq!(opts.skip_rows, Some(3));
}

#[test]
fn test_parse_full_config() {
    let full_config = r#"
version = "0.1"

[file_loading]
delimiter = 59
has_header = false
skip_rows = 2
infer_schema_length = 500
compression = "gzip"

[merge]
fill_column = "temperature"
fill_group = ""
left_join = true
output = "merged.csv.gz"

[display]
preview_rows = 5
output = "json"

[logging]
level = "info"
"#;

    let config: AppConfig = toml::from_str(full_config).expect("Failed to parse full config");
    config.validate().expect("Full config should be valid");

    assert_eq!(config.file_loading.delimiter, Some(b';'));
    assert_eq!(config.file_loading.has_header, Some(false));
    assert_eq!(config.file_loading.skip_rows, Some(2));
    assert_eq!(config.file_loading.infer_schema_length, Some(500));
    assert_eq!(config.file_loading.compression.as_deref(), Some("gzip"));
    assert_eq!(config.merge.fill_group.as_deref(), Some(""));
    assert_eq!(config.merge.output, "merged.csv.gz");
    assert_eq!(config.display.output, "json");
    assert_eq!(config.logging.level, "info");
}

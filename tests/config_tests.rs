// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use mosaic::Config;
use mosaic::backends::camera::{ColorMatrix, ColorRange};
use mosaic::config::GpuPowerPreference;

#[test]
fn test_config_default() {
    let config = Config::default();

    // Check sensible defaults
    assert_eq!(config.block_size, 60, "Default block size should be 60");
    assert_eq!(config.block_size().get(), 60);
    assert_eq!(config.max_fps, Some(30));
    assert_eq!(config.power_preference, GpuPowerPreference::HighPerformance);
    assert_eq!(config.colorimetry.matrix, ColorMatrix::Bt601);
    assert_eq!(config.colorimetry.range, ColorRange::Limited);
}

#[test]
fn test_config_save_and_load() {
    let dir = std::env::temp_dir().join(format!("mosaic_config_test_{}", std::process::id()));
    let path = dir.join("nested").join("config.json");

    let config = Config {
        block_size: 12,
        max_fps: None,
        power_preference: GpuPowerPreference::LowPower,
        ..Config::default()
    };
    config.save_to(&path).expect("save should create parent directories");

    let loaded = Config::load_from(&path).expect("saved config should load");
    assert_eq!(loaded, config);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_config_missing_keys_use_defaults() {
    let dir = std::env::temp_dir().join(format!("mosaic_partial_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, r#"{ "block_size": 8 }"#).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.block_size, 8);
    assert_eq!(loaded.max_fps, Config::default().max_fps);
    assert_eq!(loaded.texture_cache_capacity, Config::default().texture_cache_capacity);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_config_invalid_json_is_error() {
    let dir = std::env::temp_dir().join(format!("mosaic_invalid_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.is_fatal(), "Config errors end the session");

    let _ = std::fs::remove_dir_all(&dir);
}

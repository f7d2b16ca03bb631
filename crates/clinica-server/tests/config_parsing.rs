use std::{env, fs};

use clinica_server::AppConfig;
use clinica_server::config::loader::load_config;

// Environment variables are process-wide, so everything touching them lives
// in this single test.
#[test]
fn config_parsing_and_env_overrides_and_validation() {
    unsafe {
        env::remove_var("REDIS_URL");
    }

    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("clinica.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8091
body_limit_bytes = 2048

[logging]
level = "debug"

[redis]
enabled = false
url = "redis://cache:6379"
pool_size = 4
timeout_ms = 500

[cache]
memory_max_entries = 500
default_ttl_secs = 60
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8091);
    assert_eq!(cfg.logging.level, "debug");
    assert!(!cfg.redis.enabled);
    assert_eq!(cfg.redis.pool_size, 4);
    assert_eq!(cfg.cache.memory_max_entries, 500);
    assert_eq!(cfg.cache.default_ttl_secs, 60);

    // 2) Env override should win over file
    unsafe {
        env::set_var("CLINICA__CACHE__DEFAULT_TTL_SECS", "90");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.default_ttl_secs, 90);
    unsafe {
        env::remove_var("CLINICA__CACHE__DEFAULT_TTL_SECS");
    }

    // 3) REDIS_URL turns Redis on and replaces the URL
    unsafe {
        env::set_var("REDIS_URL", "redis://shared:6380/1");
    }
    let cfg_redis = load_config(path.to_str()).expect("should parse with REDIS_URL");
    assert!(cfg_redis.redis.enabled);
    assert_eq!(cfg_redis.redis.url, "redis://shared:6380/1");
    unsafe {
        env::set_var("REDIS_URL", "");
    }
    let cfg_blank = load_config(path.to_str()).expect("blank REDIS_URL is ignored");
    assert!(!cfg_blank.redis.enabled);
    unsafe {
        env::remove_var("REDIS_URL");
    }

    // 4) Invalid values are rejected
    let bad_path = dir.path().join("bad.toml");
    fs::write(&bad_path, "[logging]\nlevel = \"loud\"\n").expect("write toml");
    let err = load_config(bad_path.to_str()).expect_err("invalid level");
    assert!(err.contains("logging.level"));

    fs::write(&bad_path, "[server]\nport = 0\n").expect("write toml");
    assert!(load_config(bad_path.to_str()).is_err());

    // 5) Missing file falls back to defaults
    let missing = dir.path().join("missing.toml");
    let cfg_default = load_config(missing.to_str()).expect("defaults");
    assert_eq!(cfg_default.server.port, 8090);
    assert_eq!(cfg_default.cache.memory_max_entries, 10_000);

    // 6) A serialized default config loads back unchanged
    let rendered = toml::to_string(&AppConfig::default()).expect("render toml");
    let rendered_path = dir.path().join("rendered.toml");
    fs::write(&rendered_path, rendered).expect("write toml");
    let reloaded = load_config(rendered_path.to_str()).expect("reload");
    assert_eq!(reloaded.redis, AppConfig::default().redis);
    assert_eq!(reloaded.cache, AppConfig::default().cache);
}

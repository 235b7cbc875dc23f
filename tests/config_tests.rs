use fleet_authz::{AppConfig, config::Env};
use serial_test::serial;
use std::{env, panic, time::Duration};

const VARS: [&str; 6] = [
    "APP_ENV",
    "DATABASE_URL",
    "BIND_ADDR",
    "JWT_SECRET",
    "TOKEN_TTL_SECS",
    "REQUEST_TIMEOUT_SECS",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set (every other configuration variable removed) and
/// restores the previous environment afterwards, even when the test panics.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> std::thread::Result<R>
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> =
        VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    unsafe {
        for (key, original) in originals {
            match original {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
    result
}

// --- Tests ---

#[test]
#[serial]
fn test_local_config_defaults() {
    let config = run_with_env(&[("DATABASE_URL", "postgres://u:p@localhost/fleet")], || {
        AppConfig::load()
    })
    .expect("local config loads with only a database url");

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.db_url, "postgres://u:p@localhost/fleet");
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    assert!(!config.jwt_secret.is_empty());
    assert_eq!(config.token_ttl, Duration::from_secs(3600));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
}

#[test]
#[serial]
fn test_overrides_are_read() {
    let config = run_with_env(
        &[
            ("DATABASE_URL", "postgres://db/fleet"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_SECS", "120"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ],
        AppConfig::load,
    )
    .expect("config with overrides loads");

    assert_eq!(config.bind_addr, "127.0.0.1:8080");
    assert_eq!(config.jwt_secret, "s3cret");
    assert_eq!(config.token_ttl, Duration::from_secs(120));
    assert_eq!(config.request_timeout, Duration::from_secs(5));
}

#[test]
#[serial]
fn test_production_requires_jwt_secret() {
    let result = run_with_env(
        &[("APP_ENV", "production"), ("DATABASE_URL", "postgres://db/fleet")],
        AppConfig::load,
    );
    assert!(result.is_err(), "production must not fall back to a built-in secret");

    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://db/fleet"),
            ("JWT_SECRET", "prod-secret"),
        ],
        AppConfig::load,
    )
    .expect("production config loads once the secret is set");
    assert_eq!(config.env, Env::Production);
    assert_eq!(config.jwt_secret, "prod-secret");
}

#[test]
#[serial]
fn test_missing_database_url_fails_fast() {
    let result = run_with_env(&[("JWT_SECRET", "x")], AppConfig::load);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_non_numeric_timeout_fails_fast() {
    let result = run_with_env(
        &[
            ("DATABASE_URL", "postgres://db/fleet"),
            ("REQUEST_TIMEOUT_SECS", "soon"),
        ],
        AppConfig::load,
    );
    assert!(result.is_err());
}

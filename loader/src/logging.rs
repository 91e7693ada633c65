//! Logger setup for loader sessions and the CLI.
//!
//! Everything logs through the `log` facade with `env_logger` behind it:
//!
//! - `error!` - a handle could not be cached (out of host memory)
//! - `warn!` - a driver returned a null handle, or validation rejected a call
//! - `info!` - session start/teardown
//! - `debug!` - wrapper construction and release
//!
//! With no `log-level` in `zecompat.toml`, `RUST_LOG` decides:
//!
//! ```bash
//! RUST_LOG=zecompat_cache=debug zecompat enumerate
//! ```
//!
//! Per-call API tracing (`trace_calls`) goes through `tracing` under the
//! `zecompat::api` target instead.

use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::config::SessionConfig;
use crate::result::ZeError;

/// Install a logger at a fixed level. A no-op if one is already installed.
pub fn init_with_level(level: LevelFilter) {
    install(fixed(level));
}

/// Install a logger driven by `RUST_LOG`, defaulting to `warn`.
pub fn init_from_env() {
    install(from_env());
}

/// The config's `log-level` wins over `RUST_LOG`.
pub fn init_from_config(config: &SessionConfig) -> Result<(), ZeError> {
    let builder = match config.log_filter()? {
        Some(level) => fixed(level),
        None => from_env(),
    };
    install(builder);
    Ok(())
}

/// Test logger; safe to call from every test.
pub fn init_test() {
    let _ = fixed(LevelFilter::Warn).is_test(true).try_init();
}

fn fixed(level: LevelFilter) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(level);
    builder
}

fn from_env() -> Builder {
    Builder::from_env(Env::default().default_filter_or("warn"))
}

fn install(mut builder: Builder) {
    builder.format(|buf, record| writeln!(buf, "[{:5}] {} - {}", record.level(), record.target(), record.args()));
    if builder.try_init().is_err() {
        log::debug!("logger already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        log::warn!("logging twice is fine");
    }

    #[test]
    fn test_second_install_is_harmless() {
        init_test();
        init_with_level(LevelFilter::Debug);
        init_from_env();
    }

    #[test]
    fn test_init_from_config_rejects_bad_level() {
        let config = SessionConfig {
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(matches!(init_from_config(&config), Err(ZeError::Config(_))));
    }

    #[test]
    fn test_init_from_config_accepts_level() {
        init_test();
        let config = SessionConfig {
            log_level: Some("info".to_string()),
            ..Default::default()
        };
        assert!(init_from_config(&config).is_ok());
    }
}

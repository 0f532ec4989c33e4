// In crates/app-config/src/lib.rs

use config::{Config, Environment, File};
use std::path::Path;

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{AppSettings, BacktestSettings, BusSettings, Settings};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from an optional `config/base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings() -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());
    load_settings_from(Path::new("config"), &environment)
}

/// Like [`load_settings`], reading the files from `dir`.
pub fn load_settings_from(dir: &Path, environment: &str) -> Result<Settings> {
    let base = dir.join("base");
    let overlay = dir.join(environment);

    let settings = Config::builder()
        .add_source(File::with_name(&base.to_string_lossy()).required(false))
        .add_source(File::with_name(&overlay.to_string_lossy()).required(false))
        // Settings from environment variables (e.g., `APP__BACKTEST__START_BALANCE=5000`).
        // The prefix is `APP`, separator is `__`.
        .add_source(Environment::with_prefix("APP").separator("__").try_parsing(true))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<()> {
    let simulation = &settings.simulation;
    for (name, value) in [
        ("simulation.commission_percent", simulation.commission_percent),
        ("simulation.slippage_percent", simulation.slippage_percent),
    ] {
        if !(0.0..1.0).contains(&value) {
            return Err(Error::Invalid(format!("{} must be in [0, 1), got {}", name, value)));
        }
    }
    if settings.backtest.start_balance <= 0.0 {
        return Err(Error::Invalid("backtest.start_balance must be positive".to_string()));
    }
    if settings.bus.subscriber_capacity == 0 {
        return Err(Error::Invalid("bus.subscriber_capacity must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution::ZeroQuantityPolicy;
    use std::path::PathBuf;

    /// A fresh directory under the system temp dir.
    fn config_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("app-config-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let settings = load_settings_from(&config_dir("empty"), "test").unwrap();
        assert_eq!(settings.app.log_level, "info");
        assert_eq!(settings.backtest.start_balance, 10_000.0);
        assert_eq!(settings.backtest.sweep_concurrency, 5);
        assert_eq!(settings.bus.subscriber_capacity, 100);
        assert_eq!(settings.simulation.commission_percent, 0.0005);
    }

    #[test]
    fn environment_file_overrides_base() {
        let dir = config_dir("layered");
        std::fs::write(
            dir.join("base.toml"),
            "[backtest]\nstart_balance = 500.0\n\n[simulation]\ncommission_percent = 0.001\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("staging.toml"),
            "[backtest]\nstart_balance = 750.0\nzero_quantity_policy = \"skip\"\n",
        )
        .unwrap();

        let settings = load_settings_from(&dir, "staging").unwrap();
        assert_eq!(settings.backtest.start_balance, 750.0);
        assert_eq!(settings.backtest.zero_quantity_policy, ZeroQuantityPolicy::Skip);
        assert_eq!(settings.simulation.commission_percent, 0.001);
        // Untouched keys keep their defaults.
        assert_eq!(settings.simulation.slippage_percent, 0.0005);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = config_dir("invalid");
        std::fs::write(dir.join("base.toml"), "[simulation]\nslippage_percent = 1.5\n").unwrap();

        assert!(matches!(load_settings_from(&dir, "test"), Err(Error::Invalid(_))));
    }
}

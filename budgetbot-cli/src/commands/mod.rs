//! CLI command implementations

pub mod balances;
pub mod operations;
pub mod scheduler;
pub mod subscriptions;

use anyhow::{Context, Result};
use budgetbot_engine::{
    BalanceLocks, EngineConfig, FileStorage, LedgerService, Stores, SubscriptionScheduler,
};
use std::path::Path;
use std::sync::Arc;

/// Engine services wired to the file store under the storage directory.
pub struct Engine {
    pub stores: Stores,
    pub ledger: LedgerService,
    pub scheduler: SubscriptionScheduler,
}

/// Open the data directory and build the engine services.
pub fn open_engine(storage_dir: &Path, config: EngineConfig) -> Result<Engine> {
    let storage = FileStorage::new(storage_dir.join("data"))
        .with_context(|| format!("opening storage at {}", storage_dir.display()))?;
    let stores = Stores::shared(Arc::new(storage));
    let locks = Arc::new(BalanceLocks::new());

    Ok(Engine {
        ledger: LedgerService::new(stores.clone(), Arc::clone(&locks)),
        scheduler: SubscriptionScheduler::new(stores.clone(), config).with_locks(locks),
        stores,
    })
}

/// Load the engine configuration: defaults, then the JSON file, then flags.
pub fn load_config(
    config_path: Option<&Path>,
    poll_interval_secs: Option<u64>,
    workers: Option<usize>,
) -> Result<EngineConfig> {
    let mut config = match config_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::default(),
    };

    if let Some(secs) = poll_interval_secs {
        config = config.with_poll_interval(std::time::Duration::from_secs(secs));
    }
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_then_flags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "workers": 8, "poll_interval_ms": 500 }"#).unwrap();

        let config = load_config(Some(path.as_path()), None, None).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));

        let config = load_config(Some(path.as_path()), Some(30), Some(2)).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(load_config(None, Some(0), None).is_err());
        assert!(load_config(None, None, Some(0)).is_err());
        assert!(load_config(Some(Path::new("/nonexistent/engine.json")), None, None).is_err());
    }

    #[test]
    fn test_open_engine_creates_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        open_engine(temp_dir.path(), EngineConfig::default()).unwrap();
        assert!(temp_dir.path().join("data").join("occurrences").is_dir());
    }
}

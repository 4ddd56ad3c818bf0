//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::QdrantStore;
use std::path::PathBuf;
use tracing::{info, warn};

/// Write a default config, create the SQLite schema and, when Qdrant is
/// reachable, the vector collection.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    match QdrantStore::connect(&config).await {
        Ok(store) => match store.ensure_collection().await {
            Ok(()) => info!("Qdrant collection '{}' ready", config.collection_name),
            Err(e) => warn!(
                "Could not create Qdrant collection: {}. Run 'precedent db init' later.",
                e
            ),
        },
        Err(e) => warn!("Qdrant not reachable: {}. Run 'precedent db init' later.", e),
    }

    Ok(config)
}

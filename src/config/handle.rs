//! Global config with atomic replacement.
//!
//! Uses `arc-swap` for lock-free reads on the sync hot path. Embedding
//! applications install a loaded config once with [`init_config`] and may
//! swap it later with [`reload_config`].

use super::SyncConfig;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Global config storage.
pub static CONFIG: LazyLock<ArcSwap<SyncConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(SyncConfig::default()));

#[inline]
pub fn cfg() -> Arc<SyncConfig> {
    CONFIG.load_full()
}

/// Install `config` as the process-wide configuration.
#[inline]
pub fn init_config(config: SyncConfig) -> Arc<SyncConfig> {
    crate::logger::set_verbose(config.log.verbose);
    let arc = Arc::new(config);
    CONFIG.store(Arc::clone(&arc));
    arc
}

/// Reload config from `path` if its content differs from the current one.
///
/// Returns `Ok(true)` if config was updated, `Ok(false)` if unchanged.
pub fn reload_config(path: &Path) -> Result<bool> {
    let new_config = SyncConfig::load(path)?;
    if *cfg() == new_config {
        return Ok(false);
    }
    init_config(new_config);
    Ok(true)
}

//! Configuration management for the comic engine

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::CacheConfig;

const MIB: usize = 1024 * 1024;
const ENV_PREFIX: &str = "AMNESIA_COMICS_";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Default bound for full page renders
    pub max_image_size: u32,
    /// Bound for thumbnails
    pub thumbnail_size: u32,
    /// Upper limit for a single decoder allocation
    pub max_decode_bytes: u64,
    /// Entries declaring more bytes than this are skipped at open
    pub max_entry_bytes: u64,
    pub render_timeout_secs: u64,
    /// Covers extraction of the whole container at open
    pub open_timeout_secs: u64,
    /// Concurrent thumbnail warm-ups in `preload`
    pub preload_concurrency: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_image_size: 2048,
            thumbnail_size: 200,
            max_decode_bytes: 512 * MIB as u64,
            max_entry_bytes: 256 * MIB as u64,
            render_timeout_secs: 30,
            open_timeout_secs: 300,
            preload_concurrency: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory that holds per-open extraction workspaces
    pub temp_root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            temp_root: env::temp_dir(),
        }
    }
}

impl EngineConfig {
    /// Build from `AMNESIA_COMICS_*` variables; missing or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();

        EngineConfig {
            cache: CacheConfig {
                page_budget_bytes: var_or("PAGE_CACHE_MB", defaults.cache.page_budget_bytes / MIB)
                    * MIB,
                thumbnail_budget_bytes: var_or(
                    "THUMB_CACHE_MB",
                    defaults.cache.thumbnail_budget_bytes / MIB,
                ) * MIB,
            },
            render: RenderConfig {
                max_image_size: var_or("MAX_IMAGE_SIZE", defaults.render.max_image_size),
                thumbnail_size: var_or("THUMBNAIL_SIZE", defaults.render.thumbnail_size),
                max_decode_bytes: var_or(
                    "MAX_DECODE_MB",
                    defaults.render.max_decode_bytes / MIB as u64,
                ) * MIB as u64,
                max_entry_bytes: var_or(
                    "MAX_ENTRY_MB",
                    defaults.render.max_entry_bytes / MIB as u64,
                ) * MIB as u64,
                render_timeout_secs: var_or(
                    "RENDER_TIMEOUT_SECS",
                    defaults.render.render_timeout_secs,
                ),
                open_timeout_secs: var_or("OPEN_TIMEOUT_SECS", defaults.render.open_timeout_secs),
                preload_concurrency: var_or(
                    "PRELOAD_CONCURRENCY",
                    defaults.render.preload_concurrency,
                )
                .max(1),
            },
            workspace: WorkspaceConfig {
                temp_root: env::var(format!("{ENV_PREFIX}TEMP_DIR"))
                    .map(PathBuf::from)
                    .unwrap_or(defaults.workspace.temp_root),
            },
        }
    }

    /// Same defaults with extraction workspaces under `temp_root`
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.workspace.temp_root = temp_root.into();
        self
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

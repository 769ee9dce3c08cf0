//! Worker configuration from environment variables

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::WorkerError;

/// Install locations probed when no override is given.
pub const WELL_KNOWN_ENGINE_PATHS: &[&str] = &[
    "/usr/games/stockfish",
    "/usr/local/bin/stockfish",
    "/usr/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
];

const ENGINE_BINARY: &str = "stockfish";

const MIN_THREADS: u32 = 1;
const MAX_THREADS: u32 = 16;
const MIN_HASH_MB: u32 = 16;
const MAX_HASH_MB: u32 = 4096;
const DEFAULT_HASH_MB: u32 = 256;
const DEFAULT_READY_TIMEOUT_MS: u64 = 5000;

/// Options sent to the engine after the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
}

impl EngineOptions {
    pub fn new(threads: u32, hash_mb: u32) -> Self {
        Self {
            threads: threads.clamp(MIN_THREADS, MAX_THREADS),
            hash_mb: hash_mb.clamp(MIN_HASH_MB, MAX_HASH_MB),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        let cpus = num_cpus::get() as u32;
        let options = Self::new(cpus, DEFAULT_HASH_MB);
        debug!(cpus, threads = options.threads, "Default engine threads");
        options
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Explicit engine binary (STOCKFISH_PATH); probed locations are used otherwise
    pub stockfish_path: Option<PathBuf>,

    pub engine_options: EngineOptions,

    /// How long to wait for `readyok` before proceeding anyway
    pub ready_timeout: Duration,

    /// Per-search limit; `None` waits indefinitely
    pub search_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stockfish_path: None,
            engine_options: EngineOptions::default(),
            ready_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            search_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let threads = env_parse("ENGINE_THREADS").unwrap_or(defaults.engine_options.threads);
        let hash_mb = env_parse("ENGINE_HASH_MB").unwrap_or(defaults.engine_options.hash_mb);

        let ready_timeout = env_parse("ENGINE_READY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.ready_timeout);

        let search_timeout = env_parse::<u64>("ENGINE_SEARCH_TIMEOUT_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            stockfish_path,
            engine_options: EngineOptions::new(threads, hash_mb),
            ready_timeout,
            search_timeout,
        }
    }

    /// Resolve the engine binary: override, then well-known paths, then `PATH`.
    pub fn locate_engine(&self) -> Result<PathBuf, WorkerError> {
        let path_var = env::var_os("PATH");
        resolve_engine_path(
            self.stockfish_path.as_deref(),
            WELL_KNOWN_ENGINE_PATHS,
            path_var.as_deref(),
        )
        .ok_or_else(|| {
            WorkerError::EngineUnavailable(
                "stockfish not found; set STOCKFISH_PATH or install it on PATH".to_string(),
            )
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// An override is returned as-is, even if missing; spawning reports that failure.
pub fn resolve_engine_path(
    override_path: Option<&Path>,
    candidates: &[&str],
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Some(found) = candidates.iter().map(Path::new).find(|p| p.is_file()) {
        return Some(found.to_path_buf());
    }

    path_var.and_then(|paths| {
        env::split_paths(paths)
            .map(|dir| dir.join(ENGINE_BINARY))
            .find(|p| p.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_options_are_clamped() {
        assert_eq!(EngineOptions::new(0, 1), EngineOptions { threads: 1, hash_mb: 16 });
        assert_eq!(
            EngineOptions::new(64, 100_000),
            EngineOptions { threads: 16, hash_mb: 4096 }
        );
        assert_eq!(EngineOptions::new(4, 256), EngineOptions { threads: 4, hash_mb: 256 });
    }

    #[test]
    fn test_override_wins_even_if_missing() {
        let path = resolve_engine_path(
            Some(Path::new("/definitely/not/here/stockfish")),
            WELL_KNOWN_ENGINE_PATHS,
            None,
        );
        assert_eq!(path, Some(PathBuf::from("/definitely/not/here/stockfish")));
    }

    #[test]
    fn test_nothing_found() {
        let path = resolve_engine_path(
            None,
            &["/definitely/not/here/stockfish"],
            Some(OsStr::new("/definitely/not/here")),
        );
        assert_eq!(path, None);
    }

    #[test]
    fn test_path_lookup() {
        let dir = env::temp_dir().join(format!("engine-lookup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let binary = dir.join(ENGINE_BINARY);
        std::fs::write(&binary, b"").unwrap();

        let path_var = env::join_paths([Path::new("/definitely/not/here"), dir.as_path()]).unwrap();
        let found = resolve_engine_path(None, &[], Some(path_var.as_os_str()));
        assert_eq!(found, Some(binary));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_default_ready_timeout() {
        let config = WorkerConfig::default();
        assert_eq!(config.ready_timeout, Duration::from_millis(5000));
        assert!(config.search_timeout.is_none());
    }
}

use std::env;

use analysis_worker::WorkerConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Jobs allowed to hold an engine at once
    pub max_concurrent_jobs: usize,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            max_concurrent_jobs: env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(num_cpus::get),
            worker: WorkerConfig::from_env(),
        }
    }
}

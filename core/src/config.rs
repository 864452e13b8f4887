//! Engine configuration
//!
//! Priority, highest first: builder overrides, `TEMPO_*` environment
//! variables, the config file, built-in defaults. The file is `tempo.toml`
//! in the working directory unless `TEMPO_CONFIG_PATH` or the builder names
//! another one.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames one machine may hold before further pushes yield a depth exception
    pub max_frame_depth: usize,

    /// Nested evaluations (native callbacks, reaction updates) allowed at once
    pub max_nesting: usize,

    /// Steps per slice when a host drives the engine incrementally
    pub run_budget: usize,

    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frame_depth: 10_000,
            max_nesting: 64,
            run_budget: 1_000,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default file and environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.max_frame_depth == 0 {
            bail!("max_frame_depth must be at least 1");
        }
        if self.max_nesting == 0 {
            bail!("max_nesting must be at least 1");
        }
        if self.run_budget == 0 {
            bail!("run_budget must be at least 1");
        }
        Ok(())
    }
}

/// Builder for `EngineConfig` with explicit overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_frame_depth: Option<usize>,
    log_filter: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_frame_depth(mut self, depth: Option<usize>) -> Self {
        self.max_frame_depth = depth;
        self
    }

    pub fn log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let path = self
            .config_path
            .or_else(|| std::env::var("TEMPO_CONFIG_PATH").ok().map(PathBuf::from));

        let mut builder = config::Config::builder();
        builder = match &path {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(config::File::with_name("tempo").required(false)),
        };
        builder = builder.add_source(config::Environment::with_prefix("TEMPO").try_parsing(true));

        let settings = builder.build().context("Failed to load configuration")?;
        let mut config: EngineConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(depth) = self.max_frame_depth {
            config.max_frame_depth = depth;
        }
        if let Some(filter) = self.log_filter {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }
}

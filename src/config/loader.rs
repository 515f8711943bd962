//! Configuration loader implementation
//!
//! Layers built-in defaults, an optional JSON file and environment variables
//! with the `config` crate. Command line overrides are applied afterwards
//! with [`TunnelConfig::merge`].

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use log::debug;

use crate::common::Result;
use crate::config::defaults;
use crate::config::TunnelConfig;

impl TunnelConfig {
    /// Load configuration with proper priority:
    /// 1. Default values (lowest priority)
    /// 2. Configuration file, when a path is given
    /// 3. Environment variables (`SOCKS_TUN_PROXY`, `SOCKS_TUN_USERNAME`, ...)
    ///
    /// A given file must exist and parse; unknown keys are ignored.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }

        // No key separator: field names contain underscores. Values stay
        // strings; numeric fields are converted on deserialization.
        builder = builder.add_source(Environment::with_prefix(defaults::ENV_PREFIX));

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.config_file = path.map(Path::to_path_buf);

        Ok(config)
    }
}

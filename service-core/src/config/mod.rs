//! Base configuration shared by every service binary in the workspace.
//! Service crates embed [`Config`] via `#[serde(flatten)]` and layer their
//! own sections on top.

use crate::error::AppError;
use config::File;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TCP port the HTTP listener binds.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Layered load: `.env` file if present, an optional `configuration`
    /// file, then `APP__`-prefixed environment variables (highest priority).
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Optional file-based settings.  Anything given on the command line
/// wins over the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub interface: Option<Ipv4Addr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub zones_dir: Option<String>,
    #[serde(default)]
    pub rop_server: Option<String>,
}

impl Settings {
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }
}

//! Settings from the command line and the optional `minecontrol.json` config file.
//!
//! A flag always wins over the config file, which wins over the built-in default.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use minecontrol_rcon::{Options, PaddingMode};
use serde::Deserialize;

use crate::server::Credentials;
use crate::{GlobalArgs, ServerArgs};

pub const DEFAULT_CONFIG_FILE: &str = "minecontrol.json";
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 25566;
pub const DEFAULT_SERVER_PORT: u16 = 7767;
pub const DEFAULT_ASSETS_DIR: &str = "gui/assets";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Contents of the config file. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub verbose: bool,
    pub strict_padding: bool,
    pub rcon: RconSection,
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RconSection {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub assets: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Loaded {
    pub file: FileConfig,
    /// Where the config was read from, `None` when no file was found.
    pub source: Option<PathBuf>,
}

/// Reads the config file at `explicit`, or `minecontrol.json` in the working directory if it
/// exists. Only an explicitly named file is required to exist.
pub fn load(explicit: Option<&Path>) -> Result<Loaded, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !path.is_file() {
                return Ok(Loaded::default());
            }
            path
        }
    };

    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let file = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    Ok(Loaded {
        file,
        source: Some(path),
    })
}

/// Everything needed to reach the RCON server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub verbose: bool,
    pub address: String,
    pub port: u16,
    pub password: Option<String>,
    pub options: Options,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs, file: &FileConfig) -> Self {
        let mut options = Options::default();
        if args.strict_padding || file.strict_padding {
            options = options.padding(PaddingMode::Strict);
        }
        if let Some(timeout) = args.timeout {
            options = options.io_timeout(timeout);
        }

        Settings {
            verbose: args.verbose || file.verbose,
            address: args
                .address
                .clone()
                .or_else(|| file.rcon.address.clone())
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            port: args.port.or(file.rcon.port).unwrap_or(DEFAULT_PORT),
            password: args
                .password
                .clone()
                .or_else(|| file.rcon.password.clone()),
            options,
        }
    }

    pub fn target(&self) -> (&str, u16) {
        (&self.address, self.port)
    }

    pub fn target_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Settings of the HTTP façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    /// Basic auth is only enforced when a username is configured.
    pub credentials: Option<Credentials>,
    pub assets: PathBuf,
}

impl ServerSettings {
    pub fn resolve(args: &ServerArgs, file: &FileConfig) -> Self {
        let username = args
            .server_username
            .clone()
            .or_else(|| file.server.username.clone())
            .filter(|username| !username.is_empty());
        let password = args
            .server_password
            .clone()
            .or_else(|| file.server.password.clone())
            .unwrap_or_default();

        ServerSettings {
            port: args
                .server_port
                .or(file.server.port)
                .unwrap_or(DEFAULT_SERVER_PORT),
            credentials: username.map(|username| Credentials { username, password }),
            assets: args
                .assets
                .clone()
                .or_else(|| file.server.assets.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
        }
    }
}

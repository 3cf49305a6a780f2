//! CLI arguments and server configuration defaults.

use clap::{ArgAction, Parser, ValueEnum};
use shadow_rs::formatcp;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::auth::Credentials;
use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_ADDR: &str = ":8080";
pub const DEFAULT_READ_TIMEOUT: &str = "24h";
pub const DEFAULT_READ_HEADER_TIMEOUT: &str = "5s";
pub const DEFAULT_WRITE_TIMEOUT: &str = "12h";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "serve", version = VERSION_INFO, about = "Static file server with optional uploads")]
pub struct Args {
    #[arg(long, env = "SERVE_DIR", default_value = ".", help = "Directory to serve")]
    pub dir: PathBuf,
    #[arg(
        long,
        env = "SERVE_ADDR",
        default_value = DEFAULT_ADDR,
        value_parser = parse_bind_addr,
        help = "Address to serve on (\":port\" binds every interface)"
    )]
    pub addr: SocketAddr,
    #[arg(long, env = "SERVE_CRT", help = "Path to crt file for TLS")]
    pub crt: Option<PathBuf>,
    #[arg(long, env = "SERVE_KEY", help = "Path to key file for TLS")]
    pub key: Option<PathBuf>,
    #[arg(
        long,
        env = "SERVE_LOG_REMOTE_ADDR",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Log remote address"
    )]
    pub log_remote_addr: bool,
    #[arg(
        long,
        env = "SERVE_READ_ONLY",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Allow only GET and HEAD requests"
    )]
    pub read_only: bool,
    #[arg(
        long,
        env = "SERVE_AUTH",
        hide_env_values = true,
        help = "Username:Password for basic auth, no auth if not set"
    )]
    pub auth: Option<Credentials>,
    #[arg(
        long,
        env = "SERVE_READ_TIMEOUT",
        default_value = DEFAULT_READ_TIMEOUT,
        help = "Maximum idle time while reading a request body"
    )]
    pub read_timeout: humantime::Duration,
    #[arg(
        long,
        env = "SERVE_READ_HEADER_TIMEOUT",
        default_value = DEFAULT_READ_HEADER_TIMEOUT,
        help = "Time allowed to read request headers"
    )]
    pub read_header_timeout: humantime::Duration,
    #[arg(
        long,
        env = "SERVE_WRITE_TIMEOUT",
        default_value = DEFAULT_WRITE_TIMEOUT,
        help = "Maximum idle time while writing a response body"
    )]
    pub write_timeout: humantime::Duration,
    #[arg(
        long,
        env = "SERVE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        help = "Log output format"
    )]
    pub log_format: LogFormat,
}

impl Args {
    /// Cert and key paths when TLS is enabled.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.crt, &self.key) {
            (Some(crt), Some(key)) => Some((crt.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// Checks the combinations clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crt.is_some() != self.key.is_some() {
            return Err(ConfigError::CrtKeyMismatch);
        }
        if let Some((crt, key)) = self.tls_paths() {
            let dir = resolve(&self.dir)?;
            if resolve(crt)?.starts_with(&dir) || resolve(key)?.starts_with(&dir) {
                return Err(ConfigError::CrtKeyServed);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    CrtKeyMismatch,
    CrtKeyServed,
    Io(io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CrtKeyMismatch => f.write_str("--crt and --key must be used together"),
            ConfigError::CrtKeyServed => {
                f.write_str("--crt and --key must not be in the directory being served")
            }
            ConfigError::Io(err) => write!(f, "failed to resolve path: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// Absolute form of `path`, with symlinks resolved when the path exists.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    path.canonicalize().or_else(|_| std::path::absolute(path))
}

/// Accepts `host:port`, `[v6]:port` and the bare `:port` form.
fn parse_bind_addr(value: &str) -> Result<SocketAddr, String> {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port in address {value:?}"))?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .to_socket_addrs()
        .map_err(|err| format!("invalid address {value:?}: {err}"))?
        .next()
        .ok_or_else(|| format!("address {value:?} did not resolve"))
}

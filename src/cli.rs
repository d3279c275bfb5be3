//! Command-line interface for session-hub.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Unset options leave the environment and config file values alone.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// QR codes a session may issue before it is destroyed.
    pub max_qr_attempts: Option<u32>,
    /// Credential store root.
    pub store: Option<PathBuf>,
    /// Driver executable.
    pub driver: Option<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('a') | Long("max-qr-attempts") => {
                let value: String = parser.value()?.parse()?;
                match value.parse::<u32>() {
                    Ok(n) if n > 0 => result.max_qr_attempts = Some(n),
                    _ => return Err(ArgsError::InvalidValue("max-qr-attempts", value)),
                }
            }
            Short('s') | Long("store") => {
                result.store = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("driver") => {
                result.driver = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"session-hub {version}
Multi-session QR pairing manager for messaging automation drivers

USAGE:
    session-hub [OPTIONS]

OPTIONS:
    -H, --host <ADDR>             Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>             Port to listen on [default: 3000]
    -c, --config <FILE>           Path to configuration file (JSON)
    -a, --max-qr-attempts <N>     QR codes a session may issue (required)
    -s, --store <DIR>             Credential store root [default: ./sessions]
    -d, --driver <CMD>            Driver executable started per session
    -l, --log-level <LVL>         Log level (error, warn, info, debug, trace)
    -h, --help                    Print help
    -V, --version                 Print version

ENVIRONMENT VARIABLES:
    SESSION_HUB_HOST              Host address (overrides config)
    SESSION_HUB_PORT              Port number (overrides config)
    SESSION_HUB_MAX_QR_ATTEMPTS   QR attempt limit (overrides config)
    SESSION_HUB_STORE             Credential store root (overrides config)
    SESSION_HUB_DRIVER            Driver executable (overrides config)
    SESSION_HUB_LOG_LEVEL         Log level (overrides config)
    RUST_LOG                      Alternative log level setting

EXAMPLES:
    # Start with a driver script and five QR attempts per session
    session-hub -a 5 -d ./driver.sh

    # Start on all interfaces with a config file
    session-hub -H 0.0.0.0 -c /etc/session-hub/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("session-hub {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

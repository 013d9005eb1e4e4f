//! Command-line interface for wa-gateway.

use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

/// Command-line arguments.
///
/// Every option is optional; an unset one leaves the environment and the
/// config file in charge.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Address or host name to bind, resolved when the server starts.
    pub host: Option<String>,
    pub port: Option<u16>,
    /// JSON configuration file.
    pub config: Option<PathBuf>,
    /// Bridge program driving the messaging client.
    pub bridge: Option<String>,
    /// Log level or filter directive.
    pub log_level: Option<String>,
    pub version: bool,
    pub help: bool,
}

/// Argument parsing errors.
#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("{0}")]
    Lexopt(#[from] lexopt::Error),

    #[error("invalid value for --{0}: '{1}'")]
    InvalidValue(&'static str, String),

    #[error("unexpected argument: '{0}'")]
    UnexpectedArgument(String),
}

/// Parse the process arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse `args`, whose first item is the program name.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => result.help = true,
            Short('V') | Long("version") => result.version = true,
            Short('H') | Long("host") => {
                let host: String = parser.value()?.parse()?;
                if host.trim().is_empty() {
                    return Err(ArgsError::InvalidValue("host", host));
                }
                result.host = Some(host);
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                let port = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("port", value))?;
                result.port = Some(port);
            }
            Short('c') | Long("config") => result.config = Some(parser.value()?.parse()?),
            Short('b') | Long("bridge") => result.bridge = Some(parser.value()?.parse()?),
            Short('l') | Long("log-level") => result.log_level = Some(parser.value()?.parse()?),
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

pub fn print_help() {
    println!(
        r#"wa-gateway {version}
Send WhatsApp messages and documents over HTTP through one paired device.

Usage: wa-gateway [OPTIONS]

Options:
  -H, --host <HOST>        Address or host name to bind (default 127.0.0.1)
  -p, --port <PORT>        Listening port (default 3000)
  -c, --config <FILE>      JSON configuration file
  -b, --bridge <PROGRAM>   Bridge program (default wa-bridge)
  -l, --log-level <LEVEL>  error, warn, info, debug, trace or a filter directive
  -h, --help               Print help
  -V, --version            Print version

Environment:
  WA_GATEWAY_HOST, IP, NODEJS_IP      bind host
  WA_GATEWAY_PORT, PORT, NODEJS_PORT  listening port
  WA_GATEWAY_LOG_LEVEL, RUST_LOG      log level

Command-line options win over the environment, which wins over the file.
"#,
        version = env!("CARGO_PKG_VERSION")
    );
}

pub fn print_version() {
    println!("wa-gateway {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, ArgsError> {
        parse_args_from(
            std::iter::once("wa-gateway")
                .chain(argv.iter().copied())
                .map(OsString::from),
        )
    }

    #[test]
    fn test_short_and_long_forms_agree() {
        let pairs: &[(&[&str], &[&str])] = &[
            (&["-H", "0.0.0.0"], &["--host", "0.0.0.0"]),
            (&["-p", "8080"], &["--port", "8080"]),
            (&["-b", "node"], &["--bridge", "node"]),
            (&["-l", "debug"], &["--log-level", "debug"]),
            (&["-c", "gw.json"], &["--config", "gw.json"]),
        ];

        for (short, long) in pairs {
            let a = parse(short).unwrap();
            let b = parse(long).unwrap();
            assert_eq!(a.host, b.host, "{:?}", short);
            assert_eq!(a.port, b.port, "{:?}", short);
            assert_eq!(a.bridge, b.bridge, "{:?}", short);
            assert_eq!(a.log_level, b.log_level, "{:?}", short);
            assert_eq!(a.config, b.config, "{:?}", short);
        }
    }

    #[test]
    fn test_host_name_kept_for_resolution() {
        let args = parse(&["-H", "localhost"]).unwrap();
        assert_eq!(args.host.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_blank_host_rejected() {
        assert!(matches!(
            parse(&["-H", " "]),
            Err(ArgsError::InvalidValue("host", _))
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let err = parse(&["-p", "70000"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for --port: '70000'");
    }

    #[test]
    fn test_flags() {
        let args = parse(&["-h", "--version"]).unwrap();
        assert!(args.help);
        assert!(args.version);
    }

    #[test]
    fn test_positional_rejected() {
        assert!(matches!(
            parse(&["serve"]),
            Err(ArgsError::UnexpectedArgument(arg)) if arg == "serve"
        ));
    }
}

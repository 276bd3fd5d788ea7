//! Command-line interface handling for the uplink world server.
//!
//! Flags override values from the configuration file; everything else comes
//! from the file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the UDP bind address
    pub bind_address: Option<String>,
    /// Optional override for the zone metadata file
    pub zones_file: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    ///
    /// Exits with a usage message when the arguments are invalid, the way
    /// clap does for any command line tool.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list; the first item is the program name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uplink.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            zones_file: matches.get_one::<String>("zones-file").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("Uplink World Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Zone-hosting world server with typed handler groups")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("uplink.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("UDP bind address (e.g., 0.0.0.0:2001)"),
        )
        .arg(
            Arg::new("zones-file")
                .short('z')
                .long("zones-file")
                .value_name("FILE")
                .help("TOML file describing the zones and what they spawn"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags_are_given() {
        let args = CliArgs::try_parse_from(["uplink"]).unwrap();
        assert_eq!(args.config_path, PathBuf::from("uplink.toml"));
        assert!(args.bind_address.is_none());
        assert!(args.zones_file.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn flags_override_everything() {
        let args = CliArgs::try_parse_from([
            "uplink",
            "--config",
            "prod.toml",
            "-b",
            "0.0.0.0:2005",
            "--zones-file",
            "zones.toml",
            "-l",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.config_path, PathBuf::from("prod.toml"));
        assert_eq!(args.bind_address.as_deref(), Some("0.0.0.0:2005"));
        assert_eq!(args.zones_file, Some(PathBuf::from("zones.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(CliArgs::try_parse_from(["uplink", "--plugins", "dir"]).is_err());
    }
}

//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "Modbus-TCP register poller with webhook notifications")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        Self::try_parse_from_with_default(default_config, std::env::args_os())
            .unwrap_or_else(|e| e.exit())
    }

    /// Parse the given arguments with a default config path.
    pub fn try_parse_from_with_default<I, T>(
        default_config: &'static str,
        args: I,
    ) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config))
            .try_get_matches_from(args)?;

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config() {
        let args =
            BridgeArgs::try_parse_from_with_default("modbus-push.json5", ["modbus-push"]).unwrap();
        assert_eq!(args.config, PathBuf::from("modbus-push.json5"));
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn test_args_overrides() {
        let args = BridgeArgs::try_parse_from_with_default(
            "modbus-push.json5",
            ["modbus-push", "-c", "/etc/plant.json5", "--log-level", "debug"],
        )
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/plant.json5"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_args_unknown_flag() {
        let result =
            BridgeArgs::try_parse_from_with_default("modbus-push.json5", ["modbus-push", "--bogus"]);
        assert!(result.is_err());
    }
}

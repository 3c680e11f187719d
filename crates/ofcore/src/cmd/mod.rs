use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use ofcore_controller::config::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_STATS_REQUEST_SKIP,
};
use ofcore_controller::ControllerConfig;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod serve;
pub mod slice;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept switch connections and print controller events.
    Serve(ServeArgs),
    /// Slice a raw OpenFlow byte capture into frames.
    Slice(SliceArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Slice(args) => slice::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to accept switches on.
    #[arg(long, env = "OFCORE_LISTEN", default_value = "0.0.0.0:6653")]
    pub listen: SocketAddr,
    /// JSON controller configuration; flags below override it.
    #[arg(long, env = "OFCORE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Seconds between stats polls.
    #[arg(long, env = "OFCORE_STATS_INTERVAL", value_name = "SECONDS")]
    pub stats_interval: Option<f64>,
    /// Polls that may be skipped while stats replies are outstanding.
    #[arg(long, env = "OFCORE_STATS_REQUEST_SKIP", value_name = "N")]
    pub stats_request_skip: Option<u32>,
    /// OpenFlow wire versions to accept (comma-separated, e.g. 1,4).
    #[arg(long, env = "OFCORE_SUPPORTED_VERSIONS", value_delimiter = ',')]
    pub versions: Option<Vec<u8>>,
    /// Do not send keepalive echo requests each poll cycle.
    #[arg(long, env = "OFCORE_NO_ECHO_REQUESTS")]
    pub no_echo_requests: bool,
    /// Do not push set-config after the handshake.
    #[arg(long, env = "OFCORE_NO_SET_CONFIG")]
    pub no_set_config: bool,
    /// Send a features request after every echo reply.
    #[arg(long, env = "OFCORE_FEATURES_REQUEST_ON_ECHO")]
    pub features_request_on_echo: bool,
    /// Apply interface updates even when they arrive late.
    #[arg(long, env = "OFCORE_APPLY_LATE_INTERFACE_UPDATES")]
    pub apply_late_interface_updates: bool,
    /// Capacity of each event subscriber channel.
    #[arg(long, env = "OFCORE_EVENT_CHANNEL_CAPACITY", value_name = "N")]
    pub event_channel_capacity: Option<usize>,
    /// Event name pattern to print (`*` matches anything).
    #[arg(long, default_value = "ofcore.*")]
    pub events: String,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

impl ServeArgs {
    /// Layer flags over the config file (if any) over defaults.
    pub fn controller_config(&self) -> CliResult<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|err| io_error(&format!("reading {}", path.display()), err))?;
                serde_json::from_str::<ControllerConfig>(&raw).map_err(|err| {
                    CliError::new(DATA_INVALID, format!("parsing {}: {err}", path.display()))
                })?
            }
            None => ControllerConfig::default(),
        };

        if let Some(secs) = self.stats_interval {
            let interval = Duration::try_from_secs_f64(secs).map_err(|err| {
                CliError::new(DATA_INVALID, format!("invalid stats interval {secs}: {err}"))
            })?;
            config.stats_interval = interval;
        }
        if let Some(skip) = self.stats_request_skip {
            config.stats_request_skip = skip;
        }
        if let Some(versions) = &self.versions {
            config.supported_versions = versions.clone();
        }
        if self.no_echo_requests {
            config.send_echo_requests = false;
        }
        if self.no_set_config {
            config.send_set_config = false;
        }
        if self.features_request_on_echo {
            config.send_features_request_on_echo = true;
        }
        if self.apply_late_interface_updates {
            config.skip_late_interface_updates = false;
        }
        if let Some(capacity) = self.event_channel_capacity {
            config.event_channel_capacity = capacity;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct SliceArgs {
    /// File holding raw OpenFlow bytes as captured from a TCP stream.
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args() -> ServeArgs {
        ServeArgs {
            listen: "127.0.0.1:6653".parse().unwrap(),
            config: None,
            stats_interval: None,
            stats_request_skip: None,
            versions: None,
            no_echo_requests: false,
            no_set_config: false,
            features_request_on_echo: false,
            apply_late_interface_updates: false,
            event_channel_capacity: None,
            events: "ofcore.*".to_string(),
            count: None,
        }
    }

    #[test]
    fn defaults_match_controller_defaults() {
        let config = serve_args().controller_config().unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.stats_request_skip, DEFAULT_STATS_REQUEST_SKIP);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn flags_override_defaults() {
        let args = ServeArgs {
            stats_interval: Some(2.5),
            versions: Some(vec![4]),
            no_set_config: true,
            apply_late_interface_updates: true,
            ..serve_args()
        };
        let config = args.controller_config().unwrap();
        assert_eq!(config.stats_interval, Duration::from_millis(2500));
        assert_eq!(config.supported_versions, vec![4]);
        assert!(!config.send_set_config);
        assert!(!config.skip_late_interface_updates);
        assert!(config.send_echo_requests);
    }

    #[test]
    fn negative_interval_is_rejected() {
        let args = ServeArgs {
            stats_interval: Some(-1.0),
            ..serve_args()
        };
        assert_eq!(args.controller_config().unwrap_err().code, DATA_INVALID);
    }
}

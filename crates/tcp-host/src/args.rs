// Copyright (C) 2026 The parlor authors. This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser as _;
use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use parlor_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::lobby::LobbyConfig;

#[derive(Parser, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[arg(
        long,
        value_name = "listen-address",
        help = "TCP listen address",
        default_value = "0.0.0.0:7777"
    )]
    pub listen_address: String,

    #[arg(
        long,
        value_name = "request-timeout-ms",
        help = "Default deadline, in milliseconds, for requests issued without one",
        default_value = "30000"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        value_name = "confirm-timeout-ms",
        help = "How long, in milliseconds, an arriving player has to confirm joining the lobby",
        default_value = "15000"
    )]
    pub confirm_timeout_ms: u64,

    #[arg(
        long,
        value_name = "heartbeat-interval-ms",
        help = "Interval, in milliseconds, between heartbeat sweeps",
        default_value = "5000"
    )]
    pub heartbeat_interval_ms: u64,

    #[arg(
        long,
        help = "Kick players who produce no traffic between two heartbeat sweeps",
        default_value = "false"
    )]
    pub kick_unresponsive: bool,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,

    #[arg(
        long,
        value_name = "config",
        help = "Path to configuration (YAML) file to use, if any. Values in the file override command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,
}

impl Args {
    /// Parse the command line, then layer the YAML config file (if any) over it.
    pub fn load() -> Result<Self, eyre::Report> {
        Self::from_cli(Self::parse())
    }

    pub fn from_cli(cli_args: Args) -> Result<Self, eyre::Report> {
        let config_file = cli_args.config_file.clone();
        let mut args_figment = Figment::new().merge(Serialized::defaults(cli_args));
        if let Some(config_file) = &config_file {
            args_figment = args_figment.merge(Yaml::file(config_file));
        }
        args_figment.extract::<Args>().map_err(|e| {
            eyre!(
                "Failed to parse configuration from {:?}: {}",
                config_file,
                e
            )
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            default_request_timeout: Duration::from_millis(self.request_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }

    pub fn lobby_config(&self) -> LobbyConfig {
        LobbyConfig {
            confirm_timeout: Some(Duration::from_millis(self.confirm_timeout_ms)),
            kick_unresponsive: self.kick_unresponsive,
        }
    }
}

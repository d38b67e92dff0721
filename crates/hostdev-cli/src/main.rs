//! `hostdev-device-plugin`: exposes host device nodes to kubelet-managed
//! containers.
//!
//! One device plugin socket is served per configured device. The process
//! keeps re-registering with the kubelet and runs until SIGINT, SIGTERM or
//! SIGQUIT. SIGHUP forces an immediate re-registration.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use hostdev_config::{Config, parse_device_list};
use hostdev_plugin::{HostEventLoop, PluginSupervisor};
use hostdev_telemetry::{LogConfig, LogFormat};
use tracing::{error, info};

/// Kubelet device plugin for host device nodes.
#[derive(Debug, Parser)]
#[command(name = "hostdev-device-plugin")]
#[command(author, version, about)]
struct Args {
    /// Devices to expose, comma separated. For example: /dev/mem:rwm,/dev/ecryptfs:r
    #[arg(long, env = "HOSTDEV_DEVS")]
    devs: Option<String>,

    /// TOML config file. `--devs` replaces its device list.
    #[arg(short, long, env = "HOSTDEV_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the kubelet and device plugin sockets.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Kubelet registration socket (default: <plugin-dir>/kubelet.sock).
    #[arg(long)]
    kubelet_socket: Option<PathBuf>,

    /// Prefix of advertised resource names.
    #[arg(long)]
    resource_prefix: Option<String>,

    /// Remove leftover sockets at our endpoint paths before starting.
    #[arg(long)]
    remove_stale_sockets: bool,

    /// Log format: pretty, compact, json or full.
    #[arg(long)]
    log_format: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Merge the config file (if any) with command line overrides.
    fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(devs) = &self.devs {
            config.devices = parse_device_list(devs)?;
        }
        if let Some(dir) = &self.plugin_dir {
            config.plugin.plugin_dir.clone_from(dir);
        }
        if let Some(sock) = &self.kubelet_socket {
            config.plugin.kubelet_socket = Some(sock.clone());
        }
        if let Some(prefix) = &self.resource_prefix {
            config.plugin.resource_prefix.clone_from(prefix);
        }
        if let Some(format) = &self.log_format {
            config.log.format.clone_from(format);
        }
        if self.verbose {
            config.log.level = "debug".to_string();
        }

        config.validate()?;
        config.check_device_files()?;
        Ok(config)
    }
}

fn log_config(config: &Config) -> Result<LogConfig> {
    let format: LogFormat = config.log.format.parse()?;
    Ok(LogConfig::new(config.log.level.clone()).with_format(format))
}

async fn run(config: Config, remove_stale_sockets: bool) -> Result<()> {
    let mut supervisor = PluginSupervisor::build_all(&config.devices, &config.plugin)?;
    if remove_stale_sockets {
        supervisor.remove_stale_sockets()?;
    }

    supervisor
        .start_all()
        .await
        .context("failed to start device plugins")?;

    for ep in supervisor.endpoints() {
        println!(
            "{}",
            format!(
                "serving {} as {} on {}",
                ep.device().device_name,
                ep.device().resource_name,
                ep.socket_path().display()
            )
            .cyan()
        );
    }

    HostEventLoop::new(supervisor, &config.plugin).run().await?;
    info!("shut down cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.to_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e:#}", "configuration error:".red().bold());
            return ExitCode::FAILURE;
        },
    };

    match log_config(&config) {
        Ok(log) => {
            if let Err(e) = hostdev_telemetry::setup_logging(&log) {
                eprintln!("Failed to initialize logging: {e}");
            }
        },
        Err(e) => {
            eprintln!("{} {e:#}", "configuration error:".red().bold());
            return ExitCode::FAILURE;
        },
    }

    info!(devices = config.devices.len(), "starting hostdev device plugin");

    if let Err(e) = run(config, args.remove_stale_sockets).await {
        error!(error = %format!("{e:#}"), "device plugin failed");
        eprintln!("{} {e:#}", "error:".red().bold());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "hostdev-device-plugin",
            "--devs",
            "/dev/null:rw",
            "--plugin-dir",
            "/tmp/plugins",
            "-v",
        ])
        .unwrap();
        let config = args.to_config().unwrap();
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].permissions.as_str(), "rw");
        assert_eq!(config.plugin.plugin_dir, PathBuf::from("/tmp/plugins"));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_devs_equals_syntax() {
        let args =
            Args::try_parse_from(["hostdev-device-plugin", "--devs=/dev/null:r,/dev/zero:rwm"])
                .unwrap();
        let config = args.to_config().unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].name, "/dev/zero");
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        for devs in ["/dev/null", "/dev/null:rwx", "/dev/null:rrw", "/dev/null:rwr", ""] {
            let args = Args::try_parse_from(["hostdev-device-plugin", "--devs", devs]).unwrap();
            assert!(args.to_config().is_err(), "{devs:?} should be rejected");
        }
    }

    #[test]
    fn test_non_device_rejected() {
        // The test binary itself is a regular file that surely exists.
        let exe = std::env::current_exe().unwrap();
        let devs = format!("{}:rw", exe.display());
        let args = Args::try_parse_from(["hostdev-device-plugin", "--devs", &devs]).unwrap();
        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_log_format_validated() {
        let mut config = Config::default();
        config.log.format = "xml".to_string();
        assert!(log_config(&config).is_err());
    }
}

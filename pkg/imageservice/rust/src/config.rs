// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::Level;

use crate::errors::ConfigError;

pub const DEFAULT_MODULE: &str = "external";
pub const DEFAULT_PORT: u16 = 8061;
pub const DEFAULT_MODULE_PATH: &str = ".";
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;
const MAX_DEFAULT_WORKERS: usize = 32;

const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Request shape served by a binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceKind {
    /// `Image -> Image`
    ImageGeneric,
    /// `ImageWithPoses -> Image`
    ImageWithPoses,
}

impl ServiceKind {
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::ImageGeneric => "image-generic-service",
            ServiceKind::ImageWithPoses => "image-with-poses-service",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ServiceKind::ImageGeneric | ServiceKind::ImageWithPoses => DEFAULT_PORT,
        }
    }
}

/// Command-line flags; each falls back to an environment variable.
#[derive(Parser, Debug)]
#[command(version, about = "Serve an image processing function over gRPC")]
pub struct Args {
    /// Module exporting the `calling_function` processing function
    #[arg(long, env = "MODULE", default_value = DEFAULT_MODULE)]
    pub module: String,

    /// Port to listen on [default: 8061]
    #[arg(long, env = "PORT")]
    pub port: Option<String>,

    /// Directories searched for shared-library modules, separated like PATH
    #[arg(long, env = "MODULE_PATH", default_value = DEFAULT_MODULE_PATH)]
    pub module_path: String,

    /// Maximum number of requests processed at the same time [default: min(32, cpus + 4)]
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Seconds in-flight requests get to finish after a shutdown signal
    #[arg(long, env = "GRACE_PERIOD_SECS", default_value_t = DEFAULT_GRACE_PERIOD_SECS)]
    pub grace_period_secs: u64,
}

/// Validated startup configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub kind: ServiceKind,
    pub module: String,
    pub port: u16,
    pub search_path: Vec<PathBuf>,
    pub workers: usize,
    pub grace_period: Duration,
}

impl Settings {
    pub fn from_args(kind: ServiceKind, args: Args) -> Result<Self, ConfigError> {
        let port = parse_port(args.port.as_deref(), kind.default_port())?;
        let workers = match args.workers {
            Some(0) => return Err(ConfigError::InvalidWorkers { value: 0 }),
            Some(n) => n,
            None => default_workers(),
        };

        Ok(Self {
            kind,
            module: args.module,
            port,
            search_path: env::split_paths(&args.module_path).collect(),
            workers,
            grace_period: Duration::from_secs(args.grace_period_secs),
        })
    }
}

/// Parse the listening port, using `default` when unset.
pub fn parse_port(value: Option<&str>, default: u16) -> Result<u16, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort {
            value: raw.to_string(),
        }),
    }
}

/// Same sizing as a default thread pool executor: `min(32, cpus + 4)`.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    (cpus + 4).min(MAX_DEFAULT_WORKERS)
}

/// Level from `LOG_LEVEL`, or the raw value when it is not a level name.
pub fn log_level_from_env() -> Result<Level, String> {
    match env::var(LOG_LEVEL_ENV) {
        Ok(value) => value.parse().map_err(|_| value),
        Err(_) => Ok(Level::Info),
    }
}

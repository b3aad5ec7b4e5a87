// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use thiserror::Error;

/// Startup failures while locating the processing function.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("module '{module}' not found in the registry or on the module search path [{searched}]")]
    ModuleNotFound { module: String, searched: String },

    #[error("unable to load module '{module}' from {}", .path.display())]
    ModuleLoad {
        module: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("module '{module}' has an invalid export table: {reason}")]
    InvalidExports { module: String, reason: String },

    #[error(
        "expected exactly one function '{symbol}' with signature {signature} in module '{module}', found {found}"
    )]
    AmbiguousOrMissingSymbol {
        module: String,
        symbol: String,
        signature: &'static str,
        found: usize,
    },
}

/// Invalid startup configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid port '{value}': port should be an integer between 1 and 65535")]
    InvalidPort { value: String },

    #[error("invalid worker count '{value}': at least one worker is required")]
    InvalidWorkers { value: usize },
}

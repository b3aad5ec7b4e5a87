// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Modules compiled into the service binaries.

use super::{CALLING_FUNCTION, Module, Registry};

/// Returns the image unchanged. Useful for smoke tests and health checks.
pub const ECHO: &str = "echo";

pub fn echo() -> Module {
    Module::new(ECHO)
        .export_image(CALLING_FUNCTION, |image| Ok(image))
        .export_with_poses(CALLING_FUNCTION, |image, _poses| Ok(image))
}

/// Registry holding every built-in module.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(echo());
    registry
}

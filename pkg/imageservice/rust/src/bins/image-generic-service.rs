// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Serves `image_generic.ImageGenericService/process` (Image -> Image).

use std::process::ExitCode;

use image_service::config::ServiceKind;
use image_service::lifecycle;

fn main() -> ExitCode {
    lifecycle::main(ServiceKind::ImageGeneric)
}

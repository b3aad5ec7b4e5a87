// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use image_plugin_abi::KeyPointEntry;

fn echo(image: &[u8]) -> Result<Vec<u8>, String> {
    Ok(image.to_vec())
}

fn echo_with_poses(image: &[u8], _poses: &[&[KeyPointEntry]]) -> Result<Vec<u8>, String> {
    Ok(image.to_vec())
}

image_plugin_abi::export_plugin! {
    "calling_function" => image(echo),
    "calling_function" => image_with_poses(echo_with_poses),
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

const PROTOS: [(&str, &str); 2] = [
    ("../proto/image_generic.proto", "image_generic_descriptor.bin"),
    ("../proto/image_with_poses.proto", "image_with_poses_descriptor.bin"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fall back to the bundled compiler when no protoc is configured.
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts are single threaded.
        unsafe { std::env::set_var("PROTOC", protoc) };
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    // One descriptor set per service so reflection only advertises the one served.
    for (proto, descriptor) in PROTOS {
        tonic_prost_build::configure()
            .file_descriptor_set_path(out_dir.join(descriptor))
            .compile_protos(&[proto], &["../proto"])?;
    }
    Ok(())
}

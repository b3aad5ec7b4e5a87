// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Wire messages and service stubs generated from `pkg/imageservice/proto`.

// Generated code is outside the crate's lint policy.
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
pub mod image_generic {
    tonic::include_proto!("image_generic");

    // Include file descriptor for reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("image_generic_descriptor");
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
pub mod image_with_poses {
    tonic::include_proto!("image_with_poses");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("image_with_poses_descriptor");
}

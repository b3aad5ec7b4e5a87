// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! gRPC server reflection so tools like `grpcurl` can call the service
//! without a local copy of the schema.

use tonic::transport::server::Router;
use tonic_reflection::server::{Builder, Error};

use crate::config::ServiceKind;
use crate::proto;

/// Encoded descriptor set of the schema served for `kind`.
pub fn file_descriptor_set(kind: ServiceKind) -> &'static [u8] {
    match kind {
        ServiceKind::ImageGeneric => proto::image_generic::FILE_DESCRIPTOR_SET,
        ServiceKind::ImageWithPoses => proto::image_with_poses::FILE_DESCRIPTOR_SET,
    }
}

/// Add reflection (v1 and v1alpha) describing `kind` to `router`.
pub fn register(router: Router, kind: ServiceKind) -> Result<Router, Error> {
    let v1 = Builder::configure()
        .register_encoded_file_descriptor_set(file_descriptor_set(kind))
        .build_v1()?;
    let v1alpha = Builder::configure()
        .register_encoded_file_descriptor_set(file_descriptor_set(kind))
        .build_v1alpha()?;
    Ok(router.add_service(v1).add_service(v1alpha))
}

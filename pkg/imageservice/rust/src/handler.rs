// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! gRPC handlers delegating each `process` call to the resolved function.
//!
//! The function runs on the blocking pool so a slow plugin never stalls the
//! I/O reactor; the pool size caps how many requests are processed at once.
//! A failing or panicking call only fails its own request.

use anyhow::Result;
use log::{debug, error, warn};
use tonic::transport::Server;
use tonic::transport::server::Router;
use tonic::{Request, Response, Status};

use crate::adapter;
use crate::config::ServiceKind;
use crate::plugin::{ImageFn, PosesFn};
use crate::proto::image_generic::image_generic_service_server::{
    ImageGenericService, ImageGenericServiceServer,
};
use crate::proto::image_with_poses::image_with_poses_service_server::{
    ImageWithPosesService, ImageWithPosesServiceServer,
};
use crate::proto::image_generic::Image;
use crate::proto::image_with_poses::{self, ImageWithPoses};
use crate::reflection;

/// Run `f` on the blocking pool and map its outcome to a gRPC status.
async fn run_blocking<F>(f: F) -> Result<Vec<u8>, Status>
where
    F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => {
            warn!("processing function failed: {e:#}");
            Err(Status::unknown(format!("{e:#}")))
        }
        Err(e) if e.is_panic() => {
            error!("processing function panicked");
            Err(Status::internal("processing function panicked"))
        }
        Err(e) => {
            error!("processing task did not complete: {e}");
            Err(Status::internal(format!("processing task did not complete: {e}")))
        }
    }
}

pub struct ImageGenericHandler {
    process: ImageFn,
}

impl ImageGenericHandler {
    pub fn new(process: ImageFn) -> Self {
        Self { process }
    }
}

#[tonic::async_trait]
impl ImageGenericService for ImageGenericHandler {
    async fn process(&self, request: Request<Image>) -> Result<Response<Image>, Status> {
        let image = adapter::decode_image_request(request.into_inner());
        debug!("process: {} byte image", image.len());

        let process = self.process.clone();
        let output = run_blocking(move || process.call(image)).await?;
        Ok(Response::new(adapter::encode_response(output)))
    }
}

pub struct ImageWithPosesHandler {
    process: PosesFn,
}

impl ImageWithPosesHandler {
    pub fn new(process: PosesFn) -> Self {
        Self { process }
    }
}

#[tonic::async_trait]
impl ImageWithPosesService for ImageWithPosesHandler {
    async fn process(
        &self,
        request: Request<ImageWithPoses>,
    ) -> Result<Response<image_with_poses::Image>, Status> {
        let (image, poses) = adapter::decode_pose_request(request.into_inner());
        debug!(
            "process: {} byte image with {} pose(s)",
            image.len(),
            poses.len()
        );

        let process = self.process.clone();
        let output = run_blocking(move || process.call(image, poses)).await?;
        Ok(Response::new(adapter::encode_pose_response(output)))
    }
}

/// Router serving `image_generic.ImageGenericService` plus reflection.
pub fn image_generic_router(mut server: Server, process: ImageFn) -> Result<Router> {
    let router =
        server.add_service(ImageGenericServiceServer::new(ImageGenericHandler::new(process)));
    Ok(reflection::register(router, ServiceKind::ImageGeneric)?)
}

/// Router serving `image_with_poses.ImageWithPosesService` plus reflection.
pub fn image_with_poses_router(mut server: Server, process: PosesFn) -> Result<Router> {
    let router =
        server.add_service(ImageWithPosesServiceServer::new(ImageWithPosesHandler::new(process)));
    Ok(reflection::register(router, ServiceKind::ImageWithPoses)?)
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![cfg(unix)]

mod helpers;

use helpers::{Service, ServiceHandle, echo_plugin_library, free_port};
use image_service::proto::image_generic::Image;
use image_service::proto::image_generic::image_generic_service_client::ImageGenericServiceClient;
use image_service::proto::image_with_poses::image_with_poses_service_client::ImageWithPosesServiceClient;
use image_service::proto::image_with_poses::{self, DetectedPoses, ImageWithPoses, KeyPoint, Pose};
use nix::sys::signal::Signal;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

fn process_generic(port: u16, data: &[u8]) -> Vec<u8> {
    runtime().block_on(async {
        let mut client = ImageGenericServiceClient::connect(format!("http://127.0.0.1:{port}"))
            .await
            .unwrap();
        let response = client
            .process(Image {
                data: data.to_vec(),
            })
            .await
            .unwrap();
        response.into_inner().data
    })
}

// ===========================================================================
// Group 1: Serving
// ===========================================================================

#[test]
fn test_generic_service_echo_round_trip() {
    let port = free_port();
    let port_str = port.to_string();
    let mut service = ServiceHandle::start(
        Service::ImageGeneric,
        &[("MODULE", "echo"), ("PORT", &port_str)],
    );
    assert!(
        service.wait_for_log_default("Server started at"),
        "service should log its address"
    );
    assert!(service.has_log(&format!(":{port}")));

    assert_eq!(process_generic(port, b"abc"), b"abc");
    assert_eq!(process_generic(port, b""), b"");

    let status = service.stop();
    assert!(status.success(), "service should exit cleanly on SIGTERM");
}

#[test]
fn test_poses_service_echo_round_trip() {
    let port = free_port();
    let port_str = port.to_string();
    let mut service = ServiceHandle::start(
        Service::ImageWithPoses,
        &[("MODULE", "echo"), ("PORT", &port_str)],
    );
    assert!(service.wait_for_log_default("Server started at"));

    let data = runtime().block_on(async {
        let mut client =
            ImageWithPosesServiceClient::connect(format!("http://127.0.0.1:{port}"))
                .await
                .unwrap();
        let request = ImageWithPoses {
            image: Some(image_with_poses::Image {
                data: b"frame".to_vec(),
            }),
            detected_poses: Some(DetectedPoses {
                poses: vec![Pose {
                    key_points: vec![KeyPoint {
                        index: 0,
                        x: 0.1,
                        y: 0.2,
                        score: 0.9,
                    }],
                }],
            }),
        };
        client.process(request).await.unwrap().into_inner().data
    });
    assert_eq!(data, b"frame");

    let status = service.stop();
    assert!(status.success());
}

#[test]
fn test_sigint_stops_service() {
    let port_str = free_port().to_string();
    let mut service = ServiceHandle::start(
        Service::ImageGeneric,
        &[("MODULE", "echo"), ("PORT", &port_str)],
    );
    assert!(service.wait_for_log_default("Server started at"));

    service.send_signal(Signal::SIGINT);
    let status = service.wait_with_timeout(Duration::from_secs(10));
    assert!(status.success());
    assert!(service.has_log("received SIGINT"));
}

#[test]
fn test_sigterm_right_after_startup_drains() {
    let port_str = free_port().to_string();
    let mut service = ServiceHandle::start(
        Service::ImageWithPoses,
        &[("MODULE", "echo"), ("PORT", &port_str)],
    );
    assert!(service.wait_for_log_default("Server started at"));

    // No request in between: the handlers must already be armed.
    service.send_signal(Signal::SIGTERM);
    let status = service.wait_with_timeout(Duration::from_secs(10));
    assert!(status.success(), "service should exit 0, got {status:?}");
    assert!(service.wait_for_log("received SIGTERM", Duration::from_secs(2)));
}

#[test]
fn test_shared_library_module() {
    let Some(library) = echo_plugin_library() else {
        eprintln!("echo plugin library not built, skipping");
        return;
    };
    let port = free_port();
    let port_str = port.to_string();
    let mut service = ServiceHandle::start(
        Service::ImageGeneric,
        &[("MODULE", library.to_str().unwrap()), ("PORT", &port_str)],
    );
    assert!(service.wait_for_log_default("Server started at"));
    assert_eq!(process_generic(port, b"from a library"), b"from a library");

    let status = service.stop();
    assert!(status.success());
}

// ===========================================================================
// Group 2: Startup failures
// ===========================================================================

fn assert_startup_fails(service: Service, env: &[(&str, &str)], expected_log: &str) {
    let mut service = ServiceHandle::start(service, env);
    let status = service.wait_with_timeout(Duration::from_secs(10));
    assert!(!status.success(), "service should refuse to start");
    assert!(
        service.wait_for_log(expected_log, Duration::from_secs(2)),
        "expected a log line containing '{expected_log}'"
    );
    assert!(!service.has_log("Server started at"));
}

#[test]
fn test_port_zero_rejected() {
    assert_startup_fails(
        Service::ImageGeneric,
        &[("MODULE", "echo"), ("PORT", "0")],
        "invalid port '0'",
    );
}

#[test]
fn test_non_numeric_port_rejected() {
    assert_startup_fails(
        Service::ImageWithPoses,
        &[("MODULE", "echo"), ("PORT", "abc")],
        "invalid port 'abc'",
    );
}

#[test]
fn test_empty_port_rejected() {
    assert_startup_fails(
        Service::ImageGeneric,
        &[("MODULE", "echo"), ("PORT", "")],
        "invalid port ''",
    );
}

#[test]
fn test_missing_module_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let port_str = free_port().to_string();
    assert_startup_fails(
        Service::ImageGeneric,
        &[
            ("MODULE", "no_such_module"),
            ("MODULE_PATH", dir.path().to_str().unwrap()),
            ("PORT", &port_str),
        ],
        "module 'no_such_module' not found",
    );
}

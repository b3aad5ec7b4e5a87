// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Conversions between wire messages and the plain values processing
//! functions work with. Absent fields take their protobuf defaults.

use crate::plugin::PoseDictionary;
use crate::proto::image_generic::Image;
use crate::proto::image_with_poses::{self, ImageWithPoses, Pose};

pub fn decode_image_request(msg: Image) -> Vec<u8> {
    msg.data
}

/// Image bytes plus one dictionary per pose, in request order.
pub fn decode_pose_request(msg: ImageWithPoses) -> (Vec<u8>, Vec<PoseDictionary>) {
    let image = msg.image.map(|image| image.data).unwrap_or_default();
    let poses = msg
        .detected_poses
        .map(|detected| detected.poses.iter().map(build_pose_dictionary).collect())
        .unwrap_or_default();
    (image, poses)
}

/// Index -> (x, y). A repeated index keeps its last coordinates.
pub fn build_pose_dictionary(pose: &Pose) -> PoseDictionary {
    pose.key_points
        .iter()
        .map(|kp| (kp.index, (kp.x, kp.y)))
        .collect()
}

pub fn encode_response(bytes: Vec<u8>) -> Image {
    Image { data: bytes }
}

pub fn encode_pose_response(bytes: Vec<u8>) -> image_with_poses::Image {
    image_with_poses::Image { data: bytes }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Processing functions and how they are found at startup.
//!
//! A deployment supplies a *module* exporting a function named
//! [`CALLING_FUNCTION`]. Modules come from the in-process [`Registry`] (see
//! [`builtin`]) or from shared libraries on the module search path (see
//! [`dylib`]). The [`Resolver`] picks exactly one export matching the name and
//! the signature the running service needs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

pub mod builtin;
pub mod dylib;
mod registry;

pub use registry::{Module, Registry, Resolver};

/// Symbol every module must export.
pub const CALLING_FUNCTION: &str = "calling_function";

/// Key-point index to `(x, y)` for one detected pose.
pub type PoseDictionary = BTreeMap<u32, (f32, f32)>;

type ImageCallback = dyn Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync;
type PosesCallback = dyn Fn(Vec<u8>, Vec<PoseDictionary>) -> Result<Vec<u8>> + Send + Sync;

/// `(image) -> image`
#[derive(Clone)]
pub struct ImageFn(Arc<ImageCallback>);

impl ImageFn {
    pub fn new(f: impl Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, image: Vec<u8>) -> Result<Vec<u8>> {
        (self.0)(image)
    }
}

/// `(image, poses) -> image`
#[derive(Clone)]
pub struct PosesFn(Arc<PosesCallback>);

impl PosesFn {
    pub fn new(
        f: impl Fn(Vec<u8>, Vec<PoseDictionary>) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, image: Vec<u8>, poses: Vec<PoseDictionary>) -> Result<Vec<u8>> {
        (self.0)(image, poses)
    }
}

impl fmt::Debug for ImageFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(<Self as Contract>::SIGNATURE)
    }
}

impl fmt::Debug for PosesFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(<Self as Contract>::SIGNATURE)
    }
}

/// A function exported by a module, tagged with its signature.
#[derive(Clone, Debug)]
pub enum Callable {
    Image(ImageFn),
    ImageWithPoses(PosesFn),
}

impl Callable {
    pub fn signature(&self) -> &'static str {
        match self {
            Callable::Image(_) => ImageFn::SIGNATURE,
            Callable::ImageWithPoses(_) => PosesFn::SIGNATURE,
        }
    }
}

/// The signature a service requires from its processing function.
pub trait Contract: Sized {
    const SIGNATURE: &'static str;

    fn from_callable(callable: &Callable) -> Option<Self>;
}

impl Contract for ImageFn {
    const SIGNATURE: &'static str = "(image) -> image";

    fn from_callable(callable: &Callable) -> Option<Self> {
        match callable {
            Callable::Image(f) => Some(f.clone()),
            Callable::ImageWithPoses(_) => None,
        }
    }
}

impl Contract for PosesFn {
    const SIGNATURE: &'static str = "(image, poses) -> image";

    fn from_callable(callable: &Callable) -> Option<Self> {
        match callable {
            Callable::ImageWithPoses(f) => Some(f.clone()),
            Callable::Image(_) => None,
        }
    }
}

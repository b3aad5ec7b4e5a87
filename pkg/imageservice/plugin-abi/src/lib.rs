// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! C ABI between the image service and shared-library plugins.
//!
//! A plugin library exports one static symbol, [`EXPORTS_SYMBOL`], holding an
//! [`ExportTable`]. Each [`ExportEntry`] pairs a NUL-terminated name with a
//! tagged [`EntryPoint`]. The host looks up the entry named
//! `calling_function` whose tag matches the service it runs.
//!
//! Entry points return [`STATUS_OK`] and fill the [`OutputBuffer`] with the
//! processed image, or return a non-zero status with an optional UTF-8 error
//! message in the buffer. The buffer carries its own `release` callback so the
//! allocation is always freed by the library that made it.
//!
//! Rust plugins should use [`export_plugin!`], which generates the table and
//! routes every call through [`call_image`] / [`call_image_with_poses`] so a
//! panic never unwinds into the host.

use std::ffi::{CStr, c_char};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Bumped on any incompatible change to the types below.
pub const ABI_VERSION: u32 = 1;

/// Name of the static [`ExportTable`] every plugin library must export.
pub const EXPORTS_SYMBOL: &str = "image_plugin_exports";

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = 1;
pub const STATUS_PANIC: i32 = 2;
pub const STATUS_INVALID_ARGUMENT: i32 = 3;

/// `(image) -> image`
pub type ImageEntryPoint =
    unsafe extern "C" fn(image: *const u8, image_len: usize, out: *mut OutputBuffer) -> i32;

/// `(image, poses) -> image`
pub type PosesEntryPoint = unsafe extern "C" fn(
    image: *const u8,
    image_len: usize,
    poses: *const PoseView,
    poses_len: usize,
    out: *mut OutputBuffer,
) -> i32;

#[repr(C, u32)]
#[derive(Clone, Copy)]
pub enum EntryPoint {
    Image(ImageEntryPoint),
    ImageWithPoses(PosesEntryPoint),
}

/// One key-point of a pose dictionary, in ascending `index` order.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyPointEntry {
    pub index: u32,
    pub x: f32,
    pub y: f32,
}

/// Borrowed slice of key-points for one pose. Only valid for the duration of
/// the call it was passed to.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PoseView {
    pub key_points: *const KeyPointEntry,
    pub len: usize,
}

impl PoseView {
    pub fn new(key_points: &[KeyPointEntry]) -> Self {
        Self {
            key_points: key_points.as_ptr(),
            len: key_points.len(),
        }
    }

    /// # Safety
    ///
    /// `key_points` must point to `len` initialized entries that outlive the
    /// returned slice.
    pub unsafe fn key_points<'a>(&self) -> &'a [KeyPointEntry] {
        // SAFETY: upheld by the caller.
        unsafe { raw_slice(self.key_points, self.len) }
    }
}

/// Result bytes handed from the plugin to the host.
#[repr(C)]
pub struct OutputBuffer {
    pub data: *mut u8,
    pub len: usize,
    pub release: Option<unsafe extern "C" fn(data: *mut u8, len: usize)>,
}

impl OutputBuffer {
    pub const EMPTY: Self = Self {
        data: ptr::null_mut(),
        len: 0,
        release: None,
    };

    /// Leak `bytes` into a buffer released by [`release_boxed_slice`].
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        let data = Box::into_raw(boxed).cast::<u8>();
        Self {
            data,
            len,
            release: Some(release_boxed_slice),
        }
    }

    /// Copy the bytes out and hand the allocation back to its owner.
    ///
    /// # Safety
    ///
    /// `data` must point to `len` initialized bytes (or be null), and
    /// `release`, when set, must accept exactly that pointer and length.
    pub unsafe fn into_vec(self) -> Vec<u8> {
        // SAFETY: upheld by the caller.
        let bytes = unsafe { raw_slice(self.data.cast_const(), self.len) }.to_vec();
        if let Some(release) = self.release {
            // SAFETY: the buffer is released once, with the values it was created with.
            unsafe { release(self.data, self.len) };
        }
        bytes
    }
}

unsafe extern "C" fn release_boxed_slice(data: *mut u8, len: usize) {
    if data.is_null() {
        return;
    }
    // SAFETY: `data`/`len` come from `Box::into_raw` in `OutputBuffer::from_vec`.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)) });
}

#[repr(C)]
pub struct ExportEntry {
    pub name: *const c_char,
    pub entry_point: EntryPoint,
}

// SAFETY: entries only point at immutable static data (names) and functions.
unsafe impl Sync for ExportEntry {}

impl ExportEntry {
    /// `name` must end with a NUL byte, e.g. `"calling_function\0"`.
    pub const fn new(name: &'static str, entry_point: EntryPoint) -> Self {
        let bytes = name.as_bytes();
        assert!(
            !bytes.is_empty() && bytes[bytes.len() - 1] == 0,
            "export names must be NUL-terminated"
        );
        Self {
            name: bytes.as_ptr().cast::<c_char>(),
            entry_point,
        }
    }

    /// # Safety
    ///
    /// `name` must be null or point to a NUL-terminated string that outlives
    /// the returned reference.
    pub unsafe fn name<'a>(&self) -> Option<&'a CStr> {
        if self.name.is_null() {
            return None;
        }
        // SAFETY: upheld by the caller.
        Some(unsafe { CStr::from_ptr(self.name) })
    }
}

#[repr(C)]
pub struct ExportTable {
    pub abi_version: u32,
    pub len: usize,
    pub entries: *const ExportEntry,
}

// SAFETY: the table is immutable and only references static entries.
unsafe impl Sync for ExportTable {}

impl ExportTable {
    pub const fn new(entries: &'static [ExportEntry]) -> Self {
        Self {
            abi_version: ABI_VERSION,
            len: entries.len(),
            entries: entries.as_ptr(),
        }
    }

    /// # Safety
    ///
    /// `entries` must point to `len` initialized entries that outlive the
    /// returned slice.
    pub unsafe fn entries<'a>(&self) -> &'a [ExportEntry] {
        // SAFETY: upheld by the caller.
        unsafe { raw_slice(self.entries, self.len) }
    }
}

/// Build a slice from a pointer/length pair, treating null as empty.
///
/// # Safety
///
/// A non-null `data` must point to `len` initialized values of `T`.
unsafe fn raw_slice<'a, T>(data: *const T, len: usize) -> &'a [T] {
    if data.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: upheld by the caller.
    unsafe { std::slice::from_raw_parts(data, len) }
}

fn finish<E: Display>(
    result: std::thread::Result<Result<Vec<u8>, E>>,
    out: *mut OutputBuffer,
) -> i32 {
    let (status, payload) = match result {
        Ok(Ok(bytes)) => (STATUS_OK, bytes),
        Ok(Err(e)) => (STATUS_ERROR, e.to_string().into_bytes()),
        Err(_) => (STATUS_PANIC, b"plugin panicked".to_vec()),
    };
    // SAFETY: `out` was checked for null by the caller and points to writable memory.
    unsafe { out.write(OutputBuffer::from_vec(payload)) };
    status
}

/// Bridge an `(image) -> image` entry point to a Rust function.
///
/// # Safety
///
/// `image` must point to `image_len` readable bytes (or be null) and `out`
/// must be null or writable.
pub unsafe fn call_image<F, E>(image: *const u8, image_len: usize, out: *mut OutputBuffer, f: F) -> i32
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, E>,
    E: Display,
{
    if out.is_null() {
        return STATUS_INVALID_ARGUMENT;
    }
    // SAFETY: upheld by the caller.
    let image = unsafe { raw_slice(image, image_len) };
    finish(panic::catch_unwind(AssertUnwindSafe(|| f(image))), out)
}

/// Bridge an `(image, poses) -> image` entry point to a Rust function.
///
/// # Safety
///
/// Same as [`call_image`]; additionally `poses` must point to `poses_len`
/// valid [`PoseView`]s whose key-points stay alive for the call.
pub unsafe fn call_image_with_poses<F, E>(
    image: *const u8,
    image_len: usize,
    poses: *const PoseView,
    poses_len: usize,
    out: *mut OutputBuffer,
    f: F,
) -> i32
where
    F: FnOnce(&[u8], &[&[KeyPointEntry]]) -> Result<Vec<u8>, E>,
    E: Display,
{
    if out.is_null() {
        return STATUS_INVALID_ARGUMENT;
    }
    // SAFETY: upheld by the caller.
    let image = unsafe { raw_slice(image, image_len) };
    // SAFETY: upheld by the caller.
    let views = unsafe { raw_slice(poses, poses_len) };
    let poses: Vec<&[KeyPointEntry]> = views
        .iter()
        // SAFETY: each view's key-points outlive the call.
        .map(|view| unsafe { view.key_points() })
        .collect();
    finish(panic::catch_unwind(AssertUnwindSafe(|| f(image, &poses))), out)
}

/// Declare the plugin's export table.
///
/// ```ignore
/// image_plugin_abi::export_plugin! {
///     "calling_function" => image(process),
///     "calling_function" => image_with_poses(process_with_poses),
/// }
/// ```
///
/// `image` functions have the shape `fn(&[u8]) -> Result<Vec<u8>, E>` and
/// `image_with_poses` functions `fn(&[u8], &[&[KeyPointEntry]]) -> Result<Vec<u8>, E>`,
/// with `E: Display`.
#[macro_export]
macro_rules! export_plugin {
    ($($name:literal => $kind:ident($func:path)),+ $(,)?) => {
        #[allow(non_upper_case_globals)]
        #[unsafe(no_mangle)]
        pub static image_plugin_exports: $crate::ExportTable = {
            const ENTRIES: &[$crate::ExportEntry] = &[
                $($crate::export_plugin!(@entry $name, $kind, $func)),+
            ];
            $crate::ExportTable::new(ENTRIES)
        };
    };
    (@entry $name:literal, image, $func:path) => {{
        unsafe extern "C" fn trampoline(
            image: *const u8,
            image_len: usize,
            out: *mut $crate::OutputBuffer,
        ) -> i32 {
            // SAFETY: arguments are forwarded unchanged from the host.
            unsafe { $crate::call_image(image, image_len, out, $func) }
        }
        $crate::ExportEntry::new(concat!($name, "\0"), $crate::EntryPoint::Image(trampoline))
    }};
    (@entry $name:literal, image_with_poses, $func:path) => {{
        unsafe extern "C" fn trampoline(
            image: *const u8,
            image_len: usize,
            poses: *const $crate::PoseView,
            poses_len: usize,
            out: *mut $crate::OutputBuffer,
        ) -> i32 {
            // SAFETY: arguments are forwarded unchanged from the host.
            unsafe { $crate::call_image_with_poses(image, image_len, poses, poses_len, out, $func) }
        }
        $crate::ExportEntry::new(
            concat!($name, "\0"),
            $crate::EntryPoint::ImageWithPoses(trampoline),
        )
    }};
}

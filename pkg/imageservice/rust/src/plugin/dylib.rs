// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Modules provided as shared libraries implementing `image_plugin_abi`.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use image_plugin_abi::{
    ABI_VERSION, EXPORTS_SYMBOL, EntryPoint, ExportTable, ImageEntryPoint, KeyPointEntry,
    OutputBuffer, PoseView, PosesEntryPoint, STATUS_OK,
};
use libloading::Library;
use log::debug;

use super::{Callable, ImageFn, Module, PoseDictionary, PosesFn};
use crate::errors::ResolveError;

/// `external` -> `libexternal.so` on Linux.
pub fn library_file_name(module: &str) -> String {
    format!("{DLL_PREFIX}{module}{DLL_SUFFIX}")
}

/// Find the library file for `module`. Identifiers that look like paths are
/// used as-is; bare names are looked up in each search directory in order.
pub fn locate(module: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    if module.contains(MAIN_SEPARATOR) || module.contains('/') || module.ends_with(DLL_SUFFIX) {
        let path = PathBuf::from(module);
        return path.is_file().then_some(path);
    }

    let file_name = library_file_name(module);
    search_path
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn display_search_path(search_path: &[PathBuf]) -> String {
    search_path
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load `module` from the search path and read its export table.
pub fn load(module: &str, search_path: &[PathBuf]) -> Result<Module, ResolveError> {
    let Some(path) = locate(module, search_path) else {
        return Err(ResolveError::ModuleNotFound {
            module: module.to_string(),
            searched: display_search_path(search_path),
        });
    };
    debug!("loading module '{module}' from {}", path.display());

    let library = open(module, &path)?;
    let table = {
        // SAFETY: per the plugin ABI the symbol is a static `ExportTable`;
        // dlsym yields its address.
        let symbol = unsafe { library.get::<*const ExportTable>(EXPORTS_SYMBOL) }.map_err(
            |e| ResolveError::InvalidExports {
                module: module.to_string(),
                reason: format!("missing symbol '{EXPORTS_SYMBOL}': {e}"),
            },
        )?;
        *symbol
    };
    if table.is_null() {
        return Err(ResolveError::InvalidExports {
            module: module.to_string(),
            reason: format!("symbol '{EXPORTS_SYMBOL}' is null"),
        });
    }

    // SAFETY: the table is static data of `library`, which every export
    // built from it keeps loaded.
    let table = unsafe { &*table };
    module_from_table(module, table, Some(Arc::new(library)))
}

fn open(module: &str, path: &Path) -> Result<Library, ResolveError> {
    // SAFETY: loading runs the library's initialisers; the operator vouches
    // for the module they configure.
    unsafe { Library::new(path.as_os_str()) }.map_err(|source| ResolveError::ModuleLoad {
        module: module.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

/// Turn an export table into a [`Module`]. `library` is the handle that owns
/// the table, if any; each export holds a reference so the code stays mapped.
pub(crate) fn module_from_table(
    name: &str,
    table: &ExportTable,
    library: Option<Arc<Library>>,
) -> Result<Module, ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidExports {
        module: name.to_string(),
        reason,
    };

    if table.abi_version != ABI_VERSION {
        return Err(invalid(format!(
            "ABI version {} does not match host ABI version {ABI_VERSION}",
            table.abi_version
        )));
    }
    if table.entries.is_null() && table.len > 0 {
        return Err(invalid(format!(
            "null entries with length {}",
            table.len
        )));
    }

    let mut module = Module::new(name);
    // SAFETY: `entries` points to `len` static entries (checked non-null above).
    for (i, entry) in unsafe { table.entries() }.iter().enumerate() {
        // SAFETY: export names are NUL-terminated static strings.
        let export_name = unsafe { entry.name() }
            .ok_or_else(|| invalid(format!("entry {i} has no name")))?
            .to_str()
            .map_err(|e| invalid(format!("entry {i} name is not UTF-8: {e}")))?
            .to_string();

        let callable = match entry.entry_point {
            EntryPoint::Image(f) => {
                let library = library.clone();
                Callable::Image(ImageFn::new(move |image| {
                    let _library = &library;
                    invoke_image(f, &image)
                }))
            }
            EntryPoint::ImageWithPoses(f) => {
                let library = library.clone();
                Callable::ImageWithPoses(PosesFn::new(move |image, poses| {
                    let _library = &library;
                    invoke_with_poses(f, &image, &poses)
                }))
            }
        };
        debug!("module '{name}' exports '{export_name}' {}", callable.signature());
        module = module.export(export_name, callable);
    }
    Ok(module)
}

fn into_result(status: i32, out: OutputBuffer) -> Result<Vec<u8>> {
    // SAFETY: the plugin either left `out` empty or filled it per the ABI.
    let bytes = unsafe { out.into_vec() };
    if status != STATUS_OK {
        bail!(
            "plugin returned status {status}: {}",
            String::from_utf8_lossy(&bytes)
        );
    }
    Ok(bytes)
}

fn invoke_image(entry: ImageEntryPoint, image: &[u8]) -> Result<Vec<u8>> {
    let mut out = OutputBuffer::EMPTY;
    // SAFETY: `image` is valid for the duration of the call and `out` is writable.
    let status = unsafe { entry(image.as_ptr(), image.len(), &mut out) };
    into_result(status, out)
}

fn invoke_with_poses(
    entry: PosesEntryPoint,
    image: &[u8],
    poses: &[PoseDictionary],
) -> Result<Vec<u8>> {
    let key_points: Vec<Vec<KeyPointEntry>> = poses
        .iter()
        .map(|pose| {
            pose.iter()
                .map(|(&index, &(x, y))| KeyPointEntry { index, x, y })
                .collect()
        })
        .collect();
    let views: Vec<PoseView> = key_points.iter().map(|pose| PoseView::new(pose)).collect();

    let mut out = OutputBuffer::EMPTY;
    // SAFETY: `image`, `views` and the key-points they point to outlive the call.
    let status = unsafe {
        entry(
            image.as_ptr(),
            image.len(),
            views.as_ptr(),
            views.len(),
            &mut out,
        )
    };
    into_result(status, out)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::undocumented_unsafe_blocks
)]
mod tests {
    use super::*;
    use crate::plugin::CALLING_FUNCTION;
    use image_plugin_abi::{ExportEntry, call_image, call_image_with_poses};

    fn upper(image: &[u8]) -> Result<Vec<u8>, String> {
        Ok(image.to_ascii_uppercase())
    }

    fn reject(_image: &[u8]) -> Result<Vec<u8>, String> {
        Err("unsupported format".to_string())
    }

    fn describe(_image: &[u8], poses: &[&[KeyPointEntry]]) -> Result<Vec<u8>, String> {
        let described = poses
            .iter()
            .map(|pose| {
                pose.iter()
                    .map(|kp| format!("{}:{}:{}", kp.index, kp.x, kp.y))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("|");
        Ok(described.into_bytes())
    }

    unsafe extern "C" fn upper_entry(image: *const u8, len: usize, out: *mut OutputBuffer) -> i32 {
        unsafe { call_image(image, len, out, upper) }
    }

    unsafe extern "C" fn reject_entry(image: *const u8, len: usize, out: *mut OutputBuffer) -> i32 {
        unsafe { call_image(image, len, out, reject) }
    }

    unsafe extern "C" fn describe_entry(
        image: *const u8,
        len: usize,
        poses: *const PoseView,
        poses_len: usize,
        out: *mut OutputBuffer,
    ) -> i32 {
        unsafe { call_image_with_poses(image, len, poses, poses_len, out, describe) }
    }

    static ENTRIES: [ExportEntry; 3] = [
        ExportEntry::new("calling_function\0", EntryPoint::Image(upper_entry)),
        ExportEntry::new("rejecting_function\0", EntryPoint::Image(reject_entry)),
        ExportEntry::new(
            "calling_function\0",
            EntryPoint::ImageWithPoses(describe_entry),
        ),
    ];

    fn table() -> ExportTable {
        ExportTable::new(&ENTRIES)
    }

    #[test]
    fn test_library_file_name() {
        let name = library_file_name("external");
        assert!(name.starts_with(DLL_PREFIX));
        assert!(name.ends_with(DLL_SUFFIX));
        assert!(name.contains("external"));
    }

    #[test]
    fn test_locate_searches_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let file_name = library_file_name("external");
        std::fs::write(second.path().join(&file_name), b"").unwrap();

        let search_path = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            locate("external", &search_path),
            Some(second.path().join(&file_name))
        );

        std::fs::write(first.path().join(&file_name), b"").unwrap();
        assert_eq!(
            locate("external", &search_path),
            Some(first.path().join(&file_name))
        );
    }

    #[test]
    fn test_locate_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(library_file_name("custom"));
        std::fs::write(&path, b"").unwrap();

        let module = path.to_str().unwrap();
        assert_eq!(locate(module, &[]), Some(path.clone()));
        assert_eq!(locate("custom", &[]), None);
    }

    #[test]
    fn test_load_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let err = load("external", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, ResolveError::ModuleNotFound { .. }));
    }

    #[test]
    fn test_load_rejects_non_library_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_file_name("broken")), b"not a library").unwrap();
        let err = load("broken", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, ResolveError::ModuleLoad { .. }));
    }

    #[test]
    fn test_module_from_table_resolves_by_signature() {
        let module = module_from_table("table", &table(), None).unwrap();

        let image_fn: ImageFn = module.find(CALLING_FUNCTION).unwrap();
        assert_eq!(image_fn.call(b"abc".to_vec()).unwrap(), b"ABC");

        let poses_fn: PosesFn = module.find(CALLING_FUNCTION).unwrap();
        let pose: PoseDictionary = [(1, (0.5, 0.25)), (0, (1.0, 2.0))].into_iter().collect();
        let out = poses_fn.call(Vec::new(), vec![pose]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0:1:2,1:0.5:0.25");
    }

    #[test]
    fn test_plugin_error_becomes_call_error() {
        let module = module_from_table("table", &table(), None).unwrap();
        let f: ImageFn = module.find("rejecting_function").unwrap();
        let err = f.call(b"abc".to_vec()).unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }

    #[test]
    fn test_abi_version_mismatch() {
        let mut table = table();
        table.abi_version = ABI_VERSION + 1;
        let err = module_from_table("table", &table, None).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidExports { .. }));
    }

    #[test]
    fn test_null_entries_with_length() {
        let table = ExportTable {
            abi_version: ABI_VERSION,
            len: 2,
            entries: std::ptr::null(),
        };
        assert!(module_from_table("table", &table, None).is_err());
    }
}

// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use log::{debug, info};

use super::{Callable, Contract, ImageFn, PoseDictionary, PosesFn, dylib};
use crate::errors::ResolveError;

#[derive(Clone, Debug)]
struct Export {
    name: String,
    callable: Callable,
}

/// A named unit of code exporting processing functions.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    exports: Vec<Export>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn export(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.exports.push(Export {
            name: name.into(),
            callable,
        });
        self
    }

    pub fn export_image(
        self,
        name: impl Into<String>,
        f: impl Fn(Vec<u8>) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.export(name, Callable::Image(ImageFn::new(f)))
    }

    pub fn export_with_poses(
        self,
        name: impl Into<String>,
        f: impl Fn(Vec<u8>, Vec<PoseDictionary>) -> Result<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        self.export(name, Callable::ImageWithPoses(PosesFn::new(f)))
    }

    /// The single export named `symbol` with signature `C`.
    pub fn find<C: Contract>(&self, symbol: &str) -> Result<C, ResolveError> {
        let mut candidates: Vec<C> = self
            .exports
            .iter()
            .filter(|export| export.name == symbol)
            .filter_map(|export| C::from_callable(&export.callable))
            .collect();

        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            found => Err(ResolveError::AmbiguousOrMissingSymbol {
                module: self.name.clone(),
                symbol: symbol.to_string(),
                signature: C::SIGNATURE,
                found,
            }),
        }
    }
}

/// Modules linked into the process, keyed by name.
#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Module>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering a name twice merges the exports, so a duplicated function
    /// shows up as ambiguous at resolution time instead of being hidden.
    pub fn register(&mut self, module: Module) -> &mut Self {
        match self.modules.get_mut(&module.name) {
            Some(existing) => existing.exports.extend(module.exports),
            None => {
                self.modules.insert(module.name.clone(), module);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }
}

/// Finds the processing function once, at startup.
pub struct Resolver {
    registry: Registry,
    search_path: Vec<PathBuf>,
}

impl Resolver {
    pub fn new(registry: Registry, search_path: Vec<PathBuf>) -> Self {
        Self {
            registry,
            search_path,
        }
    }

    /// Look `module` up in the registry, then on the search path, and return
    /// its single `symbol` export with signature `C`.
    pub fn resolve<C: Contract>(&self, module: &str, symbol: &str) -> Result<C, ResolveError> {
        let callable = match self.registry.get(module) {
            Some(registered) => {
                debug!("module '{module}' found in the registry");
                registered.find(symbol)?
            }
            None => dylib::load(module, &self.search_path)?.find(symbol)?,
        };
        info!(
            "resolved '{symbol}' {} from module '{module}'",
            C::SIGNATURE
        );
        Ok(callable)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::plugin::CALLING_FUNCTION;

    fn identity(image: Vec<u8>) -> Result<Vec<u8>> {
        Ok(image)
    }

    fn resolver(module: Module) -> Resolver {
        let mut registry = Registry::new();
        registry.register(module);
        Resolver::new(registry, Vec::new())
    }

    #[test]
    fn test_single_match_resolves() {
        let resolver = resolver(Module::new("ext").export_image(CALLING_FUNCTION, identity));
        let f: ImageFn = resolver.resolve("ext", CALLING_FUNCTION).unwrap();
        assert_eq!(f.call(b"abc".to_vec()).unwrap(), b"abc");
    }

    #[test]
    fn test_no_match_fails() {
        let resolver = resolver(Module::new("ext").export_image("other_function", identity));
        let err = resolver
            .resolve::<ImageFn>("ext", CALLING_FUNCTION)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AmbiguousOrMissingSymbol { found: 0, .. }
        ));
    }

    #[test]
    fn test_empty_module_fails() {
        let resolver = resolver(Module::new("ext"));
        let err = resolver
            .resolve::<PosesFn>("ext", CALLING_FUNCTION)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AmbiguousOrMissingSymbol { found: 0, .. }
        ));
    }

    #[test]
    fn test_two_matches_fail() {
        let resolver = resolver(
            Module::new("ext")
                .export_image(CALLING_FUNCTION, identity)
                .export_image(CALLING_FUNCTION, identity),
        );
        let err = resolver
            .resolve::<ImageFn>("ext", CALLING_FUNCTION)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AmbiguousOrMissingSymbol { found: 2, .. }
        ));
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_signature_mismatch_counts_as_missing() {
        let resolver = resolver(Module::new("ext").export_image(CALLING_FUNCTION, identity));
        let err = resolver
            .resolve::<PosesFn>("ext", CALLING_FUNCTION)
            .unwrap_err();
        match err {
            ResolveError::AmbiguousOrMissingSymbol {
                signature, found, ..
            } => {
                assert_eq!(signature, PosesFn::SIGNATURE);
                assert_eq!(found, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_one_of_each_signature_is_not_ambiguous() {
        let resolver = resolver(
            Module::new("ext")
                .export_image(CALLING_FUNCTION, identity)
                .export_with_poses(CALLING_FUNCTION, |image, poses| {
                    Ok(vec![image.len() as u8, poses.len() as u8])
                }),
        );
        let f: PosesFn = resolver.resolve("ext", CALLING_FUNCTION).unwrap();
        assert_eq!(f.call(vec![1, 2, 3], vec![]).unwrap(), vec![3, 0]);
        assert!(resolver.resolve::<ImageFn>("ext", CALLING_FUNCTION).is_ok());
    }

    #[test]
    fn test_registering_twice_merges_exports() {
        let mut registry = Registry::new();
        registry
            .register(Module::new("ext").export_image(CALLING_FUNCTION, identity))
            .register(Module::new("ext").export_image(CALLING_FUNCTION, identity));
        let resolver = Resolver::new(registry, Vec::new());
        assert!(matches!(
            resolver.resolve::<ImageFn>("ext", CALLING_FUNCTION),
            Err(ResolveError::AmbiguousOrMissingSymbol { found: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_module_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(Registry::new(), vec![dir.path().to_path_buf()]);
        let err = resolver
            .resolve::<ImageFn>("does_not_exist", CALLING_FUNCTION)
            .unwrap_err();
        assert!(matches!(err, ResolveError::ModuleNotFound { .. }));
        assert!(err.to_string().contains("does_not_exist"));
    }
}

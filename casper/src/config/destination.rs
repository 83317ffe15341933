use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::types::cache_entry::{CacheEntry, CacheEntryConfig};

/// On-disk shape of `<destination>.yaml` (`spec.md` §3 "ServiceConfig",
/// §6 "Configuration files"). `cached_endpoints` uses an `IndexMap` to
/// preserve insertion order from the YAML document: the spec only
/// promises pattern-search order is *stable*, and preserving document
/// order is both the simplest way to guarantee that and matches the
/// likely author intent (earlier-declared routes usually are meant to
/// shadow later, more general ones).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfigFile {
    pub cached_endpoints: IndexMap<String, CacheEntryConfig>,
    pub uncacheable_headers: Option<Vec<String>>,
    pub vary_headers: Option<Vec<String>>,
}

/// Compiled, immutable snapshot of one destination's config
/// (`spec.md` I7: "Config snapshots are immutable; readers see a
/// consistent `ServiceConfig` for the duration of a single request").
#[derive(Debug, Clone)]
pub struct ServiceConfigSnapshot {
    pub destination: String,
    pub cached_endpoints: Vec<Arc<CacheEntry>>,
    pub uncacheable_headers: Vec<String>,
    pub vary_headers: Vec<String>,
}

#[derive(Debug, thiserror::Error, displaydoc::Display)]
pub enum CompileError {
    /// invalid pattern in cache entry `{0}`: {1}
    InvalidPattern(String, regex::Error),
}

impl ServiceConfigFile {
    pub fn compile(self, destination: String) -> Result<ServiceConfigSnapshot, CompileError> {
        let mut cached_endpoints = Vec::with_capacity(self.cached_endpoints.len());
        for (cache_name, entry) in self.cached_endpoints {
            let compiled = entry
                .compile(cache_name.clone())
                .map_err(|e| CompileError::InvalidPattern(cache_name, e))?;
            cached_endpoints.push(Arc::new(compiled));
        }
        Ok(ServiceConfigSnapshot {
            destination,
            cached_endpoints,
            uncacheable_headers: self.uncacheable_headers.unwrap_or_default(),
            vary_headers: self.vary_headers.unwrap_or_default(),
        })
    }
}

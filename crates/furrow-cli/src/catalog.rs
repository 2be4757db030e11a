//! Catalog assembly: built-in types, lookup tables and disabled groups.

use crate::config;
use anyhow::{Context, Result, bail};
use furrow_core::{Catalog, SavedState, TypeGroup};
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "types")]
use furrow_types::{
    CachedLookup, DEFAULT_LOOKUP_TIMEOUT, ExternalLookups, SystemResolver, TableLookup,
};
#[cfg(feature = "types")]
use std::sync::Arc;

/// Where each external lookup gets its answers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LookupSources {
    pub country: Option<PathBuf>,
    pub asn: Option<PathBuf>,
    pub dns: bool,
    /// Limit per resolved name; the built-in default when unset.
    pub dns_timeout: Option<Duration>,
}

impl LookupSources {
    /// Config entries, overridden by `--lookup kind=path` flags.
    pub fn new(config: &config::Lookups, flags: &[String]) -> Result<Self> {
        let mut sources = Self {
            country: config.country.clone(),
            asn: config.asn.clone(),
            dns: config.dns,
            dns_timeout: config.dns_timeout.map(Duration::from_secs),
        };
        for flag in flags {
            let (kind, path) = match flag.split_once('=') {
                Some((kind, path)) => (kind.trim(), Some(PathBuf::from(path.trim()))),
                None => (flag.trim(), None),
            };
            match (kind, path) {
                ("country", Some(path)) => sources.country = Some(path),
                ("asn", Some(path)) => sources.asn = Some(path),
                ("dns", None) => sources.dns = true,
                ("country" | "asn", None) => bail!("--lookup {kind} needs a table: {kind}=<file.csv>"),
                ("dns", Some(_)) => bail!("--lookup dns takes no table"),
                (other, _) => bail!("Unknown lookup '{other}' (expected country, asn or dns)"),
            }
        }
        Ok(sources)
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.asn.is_none() && !self.dns
    }
}

/// Parse a `--disable` value.
pub fn parse_group(s: &str) -> Result<TypeGroup, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "general" => Ok(TypeGroup::General),
        "external" => Ok(TypeGroup::External),
        "custom" => Ok(TypeGroup::Custom),
        other => Err(format!(
            "unknown type group '{other}' (expected general, external or custom)"
        )),
    }
}

/// A built catalog and the caches in front of its lookups.
pub struct Setup {
    pub catalog: Catalog,
    #[cfg(feature = "types")]
    caches: Vec<Arc<CachedLookup>>,
}

impl Setup {
    #[cfg(feature = "types")]
    pub fn build(sources: &LookupSources, disabled: &[TypeGroup]) -> Result<Self> {
        let mut builder = Catalog::builder();
        furrow_types::register_all(&mut builder).context("Failed to register built-in types")?;

        let mut caches = Vec::new();
        let mut cached = |name: &str, inner: Arc<dyn furrow_types::Lookup>| {
            let cache = Arc::new(CachedLookup::new(name, inner));
            caches.push(cache.clone());
            cache as Arc<dyn furrow_types::Lookup>
        };

        let mut lookups = ExternalLookups::new();
        if let Some(path) = &sources.country {
            let table = TableLookup::from_path(path)
                .with_context(|| format!("Failed to read country table {}", path.display()))?;
            tracing::debug!(rows = table.len(), path = %path.display(), "loaded country table");
            lookups = lookups.country(cached("country", Arc::new(table)));
        }
        if let Some(path) = &sources.asn {
            let table = TableLookup::from_path(path)
                .with_context(|| format!("Failed to read asn table {}", path.display()))?;
            tracing::debug!(rows = table.len(), path = %path.display(), "loaded asn table");
            lookups = lookups.asn(cached("asn", Arc::new(table)));
        }
        if sources.dns {
            let timeout = sources.dns_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT);
            lookups = lookups.resolve(cached("dns", Arc::new(SystemResolver::new(timeout))));
        }
        furrow_types::register_external(&mut builder, &lookups)
            .context("Failed to register external types")?;

        for group in disabled {
            builder.disable_group(*group);
        }
        Ok(Self {
            catalog: builder.build(),
            caches,
        })
    }

    #[cfg(not(feature = "types"))]
    pub fn build(sources: &LookupSources, disabled: &[TypeGroup]) -> Result<Self> {
        if !sources.is_empty() {
            bail!("Lookups need the built-in types; rebuild with the `types` feature");
        }
        let mut builder = Catalog::builder();
        builder
            .register(
                furrow_core::TypeDecl::new(furrow_core::PLAINTEXT).description("Any text"),
            )
            .context("Failed to register plaintext")?;
        for group in disabled {
            builder.disable_group(*group);
        }
        Ok(Self {
            catalog: builder.build(),
        })
    }

    /// Seed lookup caches from an earlier run.
    pub fn restore(&self, state: &SavedState) {
        #[cfg(feature = "types")]
        for cache in &self.caches {
            cache.restore(state);
            tracing::debug!(cache = cache.name(), entries = cache.len(), "restored cache");
        }
        #[cfg(not(feature = "types"))]
        let _ = state;
    }

    /// Copy lookup caches into the state to be saved.
    pub fn export(&self, state: &mut SavedState) {
        #[cfg(feature = "types")]
        for cache in &self.caches {
            cache.export(state);
        }
        #[cfg(not(feature = "types"))]
        let _ = state;
    }
}

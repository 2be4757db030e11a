//! Types backed by an external service.
//!
//! Furrow never talks to a service on its own. The caller hands in a
//! [`Lookup`] per service; [`register_external`] wires each one into the
//! catalog under the `External` group, so disabling that group cuts every
//! path that would need the network.

use crossbeam_channel::RecvTimeoutError;
use furrow_core::{
    CatalogBuilder, CatalogError, ConvertError, Operation, SavedState, TypeDecl, TypeGroup,
};
use indexmap::IndexMap;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long a single question to an outside service may take.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A service answering questions about single values.
pub trait Lookup: Send + Sync {
    /// Results for one value. An empty list means the service knows nothing.
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Result<Vec<String>, ConvertError> + Send + Sync,
{
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        self(value)
    }
}

/// Services available to [`register_external`]. Missing ones register nothing.
#[derive(Clone, Default)]
pub struct ExternalLookups {
    /// ip -> country code
    pub country: Option<Arc<dyn Lookup>>,
    /// ip -> autonomous system
    pub asn: Option<Arc<dyn Lookup>>,
    /// hostname -> addresses
    pub resolve: Option<Arc<dyn Lookup>>,
}

impl ExternalLookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn country(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.country = Some(lookup);
        self
    }

    pub fn asn(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.asn = Some(lookup);
        self
    }

    pub fn resolve(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.resolve = Some(lookup);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.asn.is_none() && self.resolve.is_none()
    }
}

/// Register the types served by `lookups`.
///
/// Needs `ip` and `hostname` in the builder already.
pub fn register_external(
    builder: &mut CatalogBuilder,
    lookups: &ExternalLookups,
) -> Result<(), CatalogError> {
    if let Some(lookup) = &lookups.country {
        builder.register(
            TypeDecl::new("country")
                .description("Country code of an address")
                .group(TypeGroup::External)
                .usual_names(["country", "cc"])
                .exact_header(),
        )?;
        builder.register_edge("ip", "country", Operation::map(first_answer(lookup.clone())))?;
    }

    if let Some(lookup) = &lookups.asn {
        builder.register(
            TypeDecl::new("asn")
                .description("Autonomous system of an address")
                .group(TypeGroup::External)
                .usual_names(["asn", "as"])
                .exact_header(),
        )?;
        builder.register_edge("ip", "asn", Operation::map(first_answer(lookup.clone())))?;
    }

    if let Some(lookup) = &lookups.resolve {
        let lookup = lookup.clone();
        builder.register(
            TypeDecl::new("dns")
                .description("Addresses a hostname resolves to")
                .group(TypeGroup::External)
                .private(),
        )?;
        builder
            .register_edge(
                "hostname",
                "dns",
                Operation::expand(move |v| {
                    let addresses = lookup.lookup(v.trim())?;
                    if addresses.is_empty() {
                        return Err(ConvertError::Unknown(format!("{v} has no address")));
                    }
                    Ok(addresses)
                }),
            )?
            .register_edge(
                "dns",
                "ip",
                Operation::map(|v| parse_ip(v).map(|ip| ip.to_string())),
            )?;
    }

    Ok(())
}

fn parse_ip(value: &str) -> Result<IpAddr, ConvertError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConvertError::invalid(format!("not an IP address: {value}")))
}

/// Map operation asking `lookup` about a valid address and keeping the first answer.
fn first_answer(
    lookup: Arc<dyn Lookup>,
) -> impl Fn(&str) -> Result<String, ConvertError> + Send + Sync + 'static {
    move |v| {
        let ip = parse_ip(v)?.to_string();
        lookup
            .lookup(&ip)?
            .into_iter()
            .next()
            .ok_or_else(|| ConvertError::Unknown(format!("no record for {ip}")))
    }
}

/// Remembers answers of another lookup.
///
/// Only non-empty answers are kept; values the service knew nothing about
/// are asked again. The cache can be stored in a [`SavedState`] under the
/// lookup's name and restored in a later process.
pub struct CachedLookup {
    name: String,
    inner: Arc<dyn Lookup>,
    cache: Mutex<IndexMap<String, Vec<String>>>,
}

impl CachedLookup {
    pub fn new(name: impl Into<String>, inner: Arc<dyn Lookup>) -> Self {
        Self {
            name: name.into(),
            inner,
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.cache.lock().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load entries saved under this lookup's name.
    pub fn restore(&self, state: &SavedState) {
        let Some(saved) = state.caches.get(&self.name) else {
            return;
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.extend(saved.iter().map(|(k, v)| (k.clone(), v.clone())));
            tracing::debug!(lookup = %self.name, entries = cache.len(), "restored lookup cache");
        }
    }

    /// Store the cache in `state` under this lookup's name.
    pub fn export(&self, state: &mut SavedState) {
        if let Ok(cache) = self.cache.lock()
            && !cache.is_empty()
        {
            state.caches.insert(self.name.clone(), cache.clone());
        }
    }
}

impl Lookup for CachedLookup {
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| ConvertError::failed(format!("{} cache is poisoned", self.name)))?;
            if let Some(hit) = cache.get(value) {
                return Ok(hit.clone());
            }
        }

        // the service is asked without holding the lock
        let answer = self.inner.lookup(value)?;
        if !answer.is_empty()
            && let Ok(mut cache) = self.cache.lock()
        {
            cache.insert(value.to_string(), answer.clone());
        }
        Ok(answer)
    }
}

/// Lookup backed by a table of `value,answer[,answer...]` records.
///
/// Repeated values collect their answers. Lines starting with `#` are
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct TableLookup {
    entries: IndexMap<String, Vec<String>>,
}

impl TableLookup {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(io::BufReader::new(file))
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, csv::Error> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut entries: IndexMap<String, Vec<String>> = IndexMap::new();
        for record in csv.records() {
            let record = record?;
            let mut cells = record.iter().map(str::trim);
            let Some(key) = cells.next().filter(|k| !k.is_empty()) else {
                continue;
            };
            entries
                .entry(key.to_string())
                .or_default()
                .extend(cells.filter(|c| !c.is_empty()).map(str::to_string));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Lookup for TableLookup {
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        Ok(self.entries.get(value).cloned().unwrap_or_default())
    }
}

/// Gives up on another lookup once it takes longer than a timeout.
///
/// The question keeps running on its own thread; only the wait is cut
/// short, and the value fails with [`ConvertError::Timeout`].
pub struct TimedLookup {
    what: String,
    inner: Arc<dyn Lookup>,
    timeout: Duration,
}

impl TimedLookup {
    pub fn new(what: impl Into<String>, inner: Arc<dyn Lookup>, timeout: Duration) -> Self {
        Self {
            what: what.into(),
            inner,
            timeout,
        }
    }
}

impl Lookup for TimedLookup {
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        let inner = self.inner.clone();
        let value = value.to_string();
        let what = format!("{} {value}", self.what);
        wait_bounded(&what, self.timeout, move || inner.lookup(&value))?
    }
}

/// Run `work` on a fresh thread and wait at most `timeout` for it.
fn wait_bounded<T, F>(what: &str, timeout: Duration, work: F) -> Result<T, ConvertError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("furrow-lookup".to_string())
        .spawn(move || {
            // nobody listens any more once the wait expired
            let _ = tx.send(work());
        })
        .map_err(|e| ConvertError::failed(format!("cannot start lookup for {what}: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result),
        Err(RecvTimeoutError::Timeout) => {
            tracing::debug!(what, timeout_ms = timeout.as_millis() as u64, "lookup timed out");
            Err(ConvertError::Timeout {
                what: what.to_string(),
                seconds: timeout.as_secs_f64().ceil() as u64,
            })
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(ConvertError::failed(format!("lookup for {what} stopped without an answer")))
        }
    }
}

/// Resolves hostnames with the system resolver.
///
/// Each name gets at most `timeout` before it fails with
/// [`ConvertError::Timeout`].
#[derive(Debug, Clone, Copy)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT)
    }
}

impl Lookup for SystemResolver {
    fn lookup(&self, value: &str) -> Result<Vec<String>, ConvertError> {
        let host = value.to_string();
        let addresses = wait_bounded(&format!("dns {value}"), self.timeout, move || {
            (host.as_str(), 0).to_socket_addrs()
        })?
        .map_err(|e| ConvertError::Unknown(format!("cannot resolve {value}: {e}")))?;

        let mut seen: Vec<String> = Vec::new();
        for address in addresses {
            let ip = address.ip().to_string();
            if !seen.contains(&ip) {
                seen.push(ip);
            }
        }
        Ok(seen)
    }
}

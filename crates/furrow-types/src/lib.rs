//! Built-in semantic types for Furrow.
//!
//! Registers types and the conversions between them into a
//! [`CatalogBuilder`]. Enable families via feature flags.
//!
//! # Features
//!
//! - `encoding` (default) - `base64`, `hex`
//! - `net` (default) - `ip`, `source_ip`, `destination_ip`, `port`, `url`,
//!   `hostname`, `tld`, `email`
//! - `text` (default) - `reg` (regex extraction), `hash`, `split`, `lowercase`
//! - `time` (default) - `timestamp`, `unixtime`, `isotimestamp`, `date`
//! - `all` - every family
//!
//! `plaintext` is always registered. Types backed by an external service
//! (`country`, `asn`, hostname resolution) are added separately with
//! [`register_external`], because they need a caller-supplied [`Lookup`].

use furrow_core::{CatalogBuilder, CatalogError, ConvertError, Operation, TypeDecl};

#[cfg(feature = "net")]
mod external;

#[cfg(feature = "net")]
pub use external::{
    CachedLookup, DEFAULT_LOOKUP_TIMEOUT, ExternalLookups, Lookup, SystemResolver, TableLookup,
    TimedLookup, register_external,
};

/// Register all enabled built-in types and conversions.
pub fn register_all(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
    builder.register(
        TypeDecl::new(furrow_core::PLAINTEXT).description("Any text, read as is"),
    )?;

    #[cfg(feature = "encoding")]
    encoding::register(builder)?;

    #[cfg(feature = "net")]
    net::register(builder)?;

    #[cfg(feature = "text")]
    text::register(builder)?;

    #[cfg(feature = "time")]
    time::register(builder)?;

    Ok(())
}

/// Build a catalog holding every enabled built-in type.
pub fn catalog() -> Result<furrow_core::Catalog, CatalogError> {
    let mut builder = CatalogBuilder::new();
    register_all(&mut builder)?;
    Ok(builder.build())
}

// ============================================
// Encoding
// ============================================

#[cfg(feature = "encoding")]
mod encoding {
    use super::*;
    use base64::prelude::*;

    pub fn register(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
        builder
            .register(
                TypeDecl::new("base64")
                    .description("Base64 encoded text")
                    .usual_names(["base64", "b64"])
                    .identify(looks_like_base64),
            )?
            .register(
                TypeDecl::new("hex")
                    .description("Hexadecimal encoded text")
                    .usual_names(["hex"])
                    .identify(looks_like_hex),
            )?;

        builder
            .register_edge("base64", "plaintext", Operation::map(decode_base64))?
            .register_edge(
                "plaintext",
                "base64",
                Operation::map(|v| Ok(BASE64_STANDARD.encode(v))),
            )?
            .register_edge("hex", "plaintext", Operation::map(decode_hex))?
            .register_edge("plaintext", "hex", Operation::map(|v| Ok(hex::encode(v))))?;
        Ok(())
    }

    fn decode_base64(value: &str) -> Result<String, ConvertError> {
        let decoded = BASE64_STANDARD
            .decode(value.trim())
            .map_err(|e| ConvertError::invalid(format!("invalid base64: {e}")))?;
        utf8(decoded)
    }

    fn decode_hex(value: &str) -> Result<String, ConvertError> {
        // common separators, as in "de:ad:be:ef"
        let text = value.trim().replace([' ', ':', '-'], "");
        let decoded =
            hex::decode(&text).map_err(|e| ConvertError::invalid(format!("invalid hex: {e}")))?;
        utf8(decoded)
    }

    fn utf8(bytes: Vec<u8>) -> Result<String, ConvertError> {
        String::from_utf8(bytes).map_err(|e| ConvertError::invalid(format!("not UTF-8 text: {e}")))
    }

    fn looks_like_base64(sample: &str) -> bool {
        let s = sample.trim();
        s.len() >= 4 && s.len() % 4 == 0 && decode_base64(s).is_ok()
    }

    fn looks_like_hex(sample: &str) -> bool {
        let s = sample.trim();
        s.len() >= 4 && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit()) && decode_hex(s).is_ok()
    }

}

// ============================================
// Network
// ============================================

#[cfg(feature = "net")]
mod net {
    use super::*;
    use std::net::IpAddr;

    pub fn register(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
        builder
            .register(
                TypeDecl::new("ip")
                    .description("IPv4 or IPv6 address")
                    .usual_names(["ip", "ip address", "ipaddr", "addr"])
                    .identify(|s| s.trim().parse::<IpAddr>().is_ok()),
            )?
            .register(
                TypeDecl::new("source_ip")
                    .description("Source address of a flow")
                    .usual_names(["src", "source", "src ip", "source ip", "srcip"]),
            )?
            .register(
                TypeDecl::new("destination_ip")
                    .description("Destination address of a flow")
                    .usual_names(["dst", "destination", "dst ip", "destination ip", "dstip"]),
            )?
            .register(
                TypeDecl::new("port")
                    .description("TCP or UDP port")
                    .usual_names(["port", "sport", "dport", "src port", "dst port"])
                    .exact_header(),
            )?
            .register(
                TypeDecl::new("url")
                    .description("Web address")
                    .usual_names(["url", "uri", "link"])
                    .identify(looks_like_url),
            )?
            .register(
                TypeDecl::new("hostname")
                    .description("Domain name")
                    .usual_names(["hostname", "host", "domain", "fqdn"])
                    .identify(looks_like_hostname),
            )?
            .register(TypeDecl::new("tld").description("Top-level domain"))?
            .register(
                TypeDecl::new("email")
                    .description("E-mail address")
                    .usual_names(["email", "e-mail", "mail"])
                    .identify(|s| email_host(s).is_ok()),
            )?;

        builder
            .register_edge("source_ip", "ip", Operation::Equivalent)?
            .register_edge("destination_ip", "ip", Operation::Equivalent)?
            .register_edge("url", "hostname", Operation::map(url_host))?
            .register_edge("email", "hostname", Operation::map(email_host))?
            .register_edge("hostname", "tld", Operation::map(tld))?
            .register_edge(
                "plaintext",
                "port",
                Operation::map(|v| {
                    v.trim()
                        .parse::<u16>()
                        .map(|p| p.to_string())
                        .map_err(|_| ConvertError::invalid(format!("not a port: {v}")))
                }),
            )?;
        Ok(())
    }

    pub(crate) fn url_host(value: &str) -> Result<String, ConvertError> {
        let v = value.trim();
        let rest = v.split_once("://").map_or(v, |(_, rest)| rest);
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        let host = match host.strip_prefix('[') {
            // [v6]:port
            Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
            None => host.split(':').next().unwrap_or_default(),
        };
        if host.is_empty() {
            return Err(ConvertError::invalid(format!("no host in {v:?}")));
        }
        Ok(host.to_lowercase())
    }

    fn email_host(value: &str) -> Result<String, ConvertError> {
        match value.trim().split_once('@') {
            Some((local, host)) if !local.is_empty() && looks_like_hostname(host) => {
                Ok(host.to_lowercase())
            }
            _ => Err(ConvertError::invalid(format!("not an e-mail address: {value}"))),
        }
    }

    fn tld(value: &str) -> Result<String, ConvertError> {
        value
            .trim()
            .trim_end_matches('.')
            .rsplit_once('.')
            .map(|(_, tld)| tld.to_lowercase())
            .filter(|tld| !tld.is_empty())
            .ok_or_else(|| ConvertError::invalid(format!("no top-level domain in {value:?}")))
    }

    fn looks_like_url(sample: &str) -> bool {
        let s = sample.trim();
        (s.starts_with("http://") || s.starts_with("https://")) && url_host(s).is_ok()
    }

    pub(crate) fn looks_like_hostname(sample: &str) -> bool {
        let s = sample.trim().trim_end_matches('.');
        let labels: Vec<&str> = s.split('.').collect();
        labels.len() >= 2
            && s.len() <= 253
            && labels.iter().all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
            && labels
                .last()
                .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_alphabetic()))
    }

}

// ============================================
// Text
// ============================================

#[cfg(feature = "text")]
mod text {
    use super::*;
    use furrow_core::{ParameterizedOp, Step};
    use regex::Regex;
    use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

    pub fn register(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
        builder
            .register(TypeDecl::new("reg").description("Matches of a regular expression"))?
            .register(TypeDecl::new("hash").description("Hex digest of the text"))?
            .register(TypeDecl::new("split").description("Parts of the text around a delimiter"))?
            .register(TypeDecl::new("lowercase").description("Text in lower case"))?;

        builder
            .register_edge("plaintext", "reg", Operation::parameterized(RegexExtract))?
            .register_edge("plaintext", "hash", Operation::parameterized(HashText))?
            .register_edge("plaintext", "split", Operation::parameterized(SplitText))?
            .register_edge(
                "plaintext",
                "lowercase",
                Operation::map(|v| Ok(v.to_lowercase())),
            )?;
        Ok(())
    }

    /// Every match of a pattern; the first capture group when there is one.
    struct RegexExtract;

    impl ParameterizedOp for RegexExtract {
        fn prompt(&self) -> &str {
            "regular expression"
        }

        fn resolve(&self, parameter: &str) -> Result<Step, ConvertError> {
            let re = Regex::new(parameter).map_err(|e| ConvertError::Parameter {
                parameter: parameter.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Step::expand(move |v| {
                Ok(re
                    .captures_iter(v)
                    .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                    .map(|m| m.as_str().to_string())
                    .collect())
            }))
        }
    }

    struct HashText;

    const HASH_METHODS: [&str; 4] = ["sha224", "sha256", "sha384", "sha512"];

    impl ParameterizedOp for HashText {
        fn prompt(&self) -> &str {
            "hash method"
        }

        fn choices(&self) -> Vec<String> {
            HASH_METHODS.iter().map(|m| m.to_string()).collect()
        }

        fn default_parameter(&self) -> Option<String> {
            Some("sha256".to_string())
        }

        fn resolve(&self, parameter: &str) -> Result<Step, ConvertError> {
            let digest: fn(&[u8]) -> String = match parameter {
                "sha224" => |b| hex::encode(Sha224::digest(b)),
                "sha256" => |b| hex::encode(Sha256::digest(b)),
                "sha384" => |b| hex::encode(Sha384::digest(b)),
                "sha512" => |b| hex::encode(Sha512::digest(b)),
                other => {
                    return Err(ConvertError::Parameter {
                        parameter: other.to_string(),
                        reason: "unknown hash method".to_string(),
                    });
                }
            };
            Ok(Step::map(move |v| Ok(digest(v.as_bytes()))))
        }
    }

    struct SplitText;

    impl ParameterizedOp for SplitText {
        fn prompt(&self) -> &str {
            "delimiter"
        }

        fn default_parameter(&self) -> Option<String> {
            Some(",".to_string())
        }

        fn resolve(&self, parameter: &str) -> Result<Step, ConvertError> {
            if parameter.is_empty() {
                return Err(ConvertError::Parameter {
                    parameter: String::new(),
                    reason: "delimiter must not be empty".to_string(),
                });
            }
            let delimiter = parameter.to_string();
            Ok(Step::expand(move |v| {
                Ok(v.split(delimiter.as_str())
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect())
            }))
        }
    }

}

// ============================================
// Time
// ============================================

#[cfg(feature = "time")]
mod time {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
    ];

    pub fn register(builder: &mut CatalogBuilder) -> Result<(), CatalogError> {
        builder
            .register(
                TypeDecl::new("timestamp")
                    .description("Date and time in a common notation")
                    .usual_names(["timestamp", "time", "datetime", "created", "updated"])
                    .identify(|s| parse_timestamp(s).is_some()),
            )?
            .register(
                TypeDecl::new("unixtime")
                    .description("Seconds since 1970-01-01 UTC")
                    .usual_names(["unixtime", "epoch", "ts"])
                    .exact_header(),
            )?
            .register(
                TypeDecl::new("isotimestamp")
                    .description("RFC 3339 timestamp in UTC")
                    .identify(|s| DateTime::parse_from_rfc3339(s.trim()).is_ok()),
            )?
            .register(
                TypeDecl::new("date")
                    .description("Calendar date, YYYY-MM-DD")
                    .usual_names(["date", "day"]),
            )?;

        builder
            .register_edge("isotimestamp", "timestamp", Operation::Equivalent)?
            .register_edge(
                "timestamp",
                "isotimestamp",
                Operation::map(|v| timestamp(v).map(iso)),
            )?
            .register_edge(
                "timestamp",
                "unixtime",
                Operation::map(|v| timestamp(v).map(|t| t.timestamp().to_string())),
            )?
            .register_edge("unixtime", "isotimestamp", Operation::map(from_unix))?
            .register_edge(
                "isotimestamp",
                "date",
                Operation::map(|v| timestamp(v).map(|t| t.format("%Y-%m-%d").to_string())),
            )?;
        Ok(())
    }

    /// Parse the notations this family understands. Zone-less times are UTC.
    pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
        let v = value.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(v) {
            return Some(t.with_timezone(&Utc));
        }
        if let Ok(t) = DateTime::parse_from_rfc2822(v) {
            return Some(t.with_timezone(&Utc));
        }
        if let Some(t) = NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(v, f).ok())
        {
            return Some(t.and_utc());
        }
        NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc())
    }

    fn timestamp(value: &str) -> Result<DateTime<Utc>, ConvertError> {
        parse_timestamp(value).ok_or_else(|| ConvertError::invalid(format!("not a timestamp: {value}")))
    }

    fn iso(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn from_unix(value: &str) -> Result<String, ConvertError> {
        let v = value.trim();
        let seconds = match v.parse::<i64>() {
            Ok(s) => s,
            // fractional seconds are truncated
            Err(_) => v
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| ConvertError::invalid(format!("not a unix time: {v}")))?,
        };
        DateTime::from_timestamp(seconds, 0)
            .map(iso)
            .ok_or_else(|| ConvertError::invalid(format!("unix time out of range: {v}")))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use furrow_core::{Identifier, ResolveError, Resolver};

    #[test]
    fn test_plaintext_always_registered() {
        let catalog = catalog().unwrap();
        assert!(catalog.contains("plaintext"));
    }

    #[test]
    #[cfg(all(feature = "net", feature = "time"))]
    fn test_catalog_paths() {
        let catalog = catalog().unwrap();
        let resolver = Resolver::new(&catalog);

        let path = resolver.plan("url", "tld").unwrap();
        assert_eq!(path.nodes, vec!["url", "hostname", "tld"]);

        let chain = resolver.plan("unixtime", "date").unwrap().resolve(&[]).unwrap();
        assert_eq!(chain.apply("86400").unwrap(), vec!["1970-01-02"]);

        let chain = resolver.plan("source_ip", "ip").unwrap().resolve(&[]).unwrap();
        assert!(chain.is_identity());
    }

    #[test]
    #[cfg(all(feature = "net", feature = "text"))]
    fn test_identify_columns() {
        let catalog = catalog().unwrap();
        let identifier = Identifier::new(&catalog);

        let ranking = identifier.identify(&["10.0.0.1", "192.168.1.1", "::1"], Some("src"));
        assert_eq!(ranking[0].0, "ip");

        let ranking = identifier.identify(&["https://a.cz/x", "http://b.org"], Some("link"));
        assert_eq!(ranking[0].0, "url");
    }

    #[test]
    #[cfg(feature = "text")]
    fn test_parameterized_hash_default() {
        let catalog = catalog().unwrap();
        let resolver = Resolver::new(&catalog);
        let chain = resolver.plan("plaintext", "hash").unwrap().resolve(&[]).unwrap();
        assert_eq!(chain.parameters, vec!["sha256"]);

        let err = resolver
            .plan("plaintext", "hash")
            .unwrap()
            .resolve(&["md5".to_string()])
            .unwrap_err();
        assert!(matches!(err, ResolveError::Parameter { .. }));
    }
}

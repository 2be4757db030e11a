//! Pipeline settings.
//!
//! Settings are the serializable description of a run: which columns to
//! compute, how to filter, deduplicate, split and aggregate rows. They are
//! compiled against identified input columns with [`Settings::apply`]
//! before processing starts, so every resolution problem surfaces up front.

use crate::aggregate::AggregateSpec;
use crate::field::{ColumnRef, FieldRequest, Fields};
use crate::filter::Filter;
use crate::identifier::{IdentifyError, Identifier};
use crate::processor::{DEFAULT_OUTPUT_NAME, ProcessorOptions};
use crate::router::DEFAULT_MAX_OPEN;
use serde::{Deserialize, Serialize};

/// Confirmed type of an input column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnType {
    pub column: ColumnRef,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A serializable pipeline description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Worker threads; 0 keeps everything on one thread.
    #[serde(default)]
    pub threads: usize,

    #[serde(default = "default_max_open")]
    pub max_open_handles: usize,

    /// Halt on the first invalid row.
    #[serde(default)]
    pub debug: bool,

    /// Location name used when rows are not split.
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Column whose value names each row's output location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<ColumnRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<ColumnRef>,

    /// Input column types overriding identification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<ColumnType>,

    /// Columns to compute, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRequest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<ColumnRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregate: Vec<AggregateSpec>,

    /// Columns left out of written rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hide: Vec<ColumnRef>,
}

fn default_max_open() -> usize {
    DEFAULT_MAX_OPEN
}

fn default_output_name() -> String {
    DEFAULT_OUTPUT_NAME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: 0,
            max_open_handles: DEFAULT_MAX_OPEN,
            debug: false,
            output_name: default_output_name(),
            split: None,
            group_by: None,
            types: Vec::new(),
            fields: Vec::new(),
            filters: Vec::new(),
            unique: Vec::new(),
            aggregate: Vec::new(),
            hide: Vec::new(),
        }
    }
}

/// Errors related to settings parsing and compilation.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(String),

    #[error("unsupported settings format: {0}")]
    UnsupportedFormat(String),

    #[error("no such column: {0}")]
    UnknownColumn(ColumnRef),

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("cannot compute {target}: {source}")]
    Field {
        target: String,
        source: IdentifyError,
    },
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a computed column.
    pub fn field(mut self, request: FieldRequest) -> Self {
        self.fields.push(request);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn unique(mut self, column: impl Into<ColumnRef>) -> Self {
        self.unique.push(column.into());
        self
    }

    pub fn split(mut self, column: impl Into<ColumnRef>) -> Self {
        self.split = Some(column.into());
        self
    }

    pub fn aggregate(mut self, spec: AggregateSpec) -> Self {
        self.aggregate.push(spec);
        self
    }

    pub fn group_by(mut self, column: impl Into<ColumnRef>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn hide(mut self, column: impl Into<ColumnRef>) -> Self {
        self.hide.push(column.into());
        self
    }

    pub fn column_type(mut self, column: impl Into<ColumnRef>, type_name: impl Into<String>) -> Self {
        self.types.push(ColumnType {
            column: column.into(),
            type_name: type_name.into(),
        });
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Parse settings from bytes, detecting the format from `path`.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, SettingsError> {
        let format = path.and_then(detect_format).unwrap_or("yaml");
        Self::from_bytes_format(data, format)
    }

    /// Parse settings from bytes with an explicit format.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, SettingsError> {
        match format {
            "json" => serde_json::from_slice(data).map_err(|e| SettingsError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_slice(data).map_err(|e| SettingsError::Parse(e.to_string()))
            }
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| SettingsError::Parse(format!("invalid UTF-8: {e}")))?;
                toml::from_str(s).map_err(|e| SettingsError::Parse(e.to_string()))
            }
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Serialize settings.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>, SettingsError> {
        match format {
            "json" => {
                serde_json::to_vec_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))
            }
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(String::into_bytes)
                .map_err(|e| SettingsError::Parse(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(String::into_bytes)
                .map_err(|e| SettingsError::Parse(e.to_string())),
            other => Err(SettingsError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Compile against identified input columns.
    ///
    /// Computed columns are resolved in order, so a later request may use
    /// an earlier one as its source.
    pub fn apply(
        &self,
        identifier: &Identifier<'_>,
        mut fields: Fields,
    ) -> Result<(Fields, ProcessorOptions), SettingsError> {
        let catalog = identifier.catalog();

        for ColumnType { column, type_name } in &self.types {
            if !catalog.contains(type_name) {
                return Err(SettingsError::UnknownType(type_name.clone()));
            }
            let id = find(&fields, column)?;
            fields.retype(id, type_name.clone());
        }

        for request in &self.fields {
            let field = identifier
                .resolve_field(&fields, request)
                .map_err(|source| SettingsError::Field {
                    target: request.target.clone(),
                    source,
                })?;
            let id = fields.push(field);
            tracing::debug!(target = %request.target, id, "added computed column");
        }

        for column in &self.hide {
            let id = find(&fields, column)?;
            fields.set_output(id, false);
        }

        let mut options = ProcessorOptions::new()
            .threads(self.threads)
            .max_open_handles(self.max_open_handles)
            .debug(self.debug)
            .output_name(self.output_name.clone());
        for filter in &self.filters {
            options.filters.push((find(&fields, &filter.column)?, filter.clone()));
        }
        for column in &self.unique {
            options.unique.push(find(&fields, column)?);
        }
        if let Some(column) = &self.split {
            options.split = Some(find(&fields, column)?);
        }
        for spec in &self.aggregate {
            options.aggregate.push((spec.function, find(&fields, &spec.column)?));
        }
        if let Some(column) = &self.group_by {
            options.group_by = Some(find(&fields, column)?);
        }

        Ok((fields, options))
    }
}

fn find(fields: &Fields, column: &ColumnRef) -> Result<usize, SettingsError> {
    fields
        .find(column)
        .map(|f| f.id)
        .ok_or_else(|| SettingsError::UnknownColumn(column.clone()))
}

/// Detect settings format from a file extension.
pub fn detect_format(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext.to_lowercase().as_str() {
        "json" => Some("json"),
        "yaml" | "yml" => Some("yaml"),
        "toml" => Some("toml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFn;
    use crate::catalog::{Catalog, TypeDecl, TypeGroup};
    use crate::operation::Operation;
    use crate::resolver::ResolveError;

    fn catalog() -> Catalog {
        let mut b = Catalog::builder();
        b.register(TypeDecl::new("plaintext")).unwrap();
        b.register(TypeDecl::new("ip").identify(|s| s.contains('.'))).unwrap();
        b.register(TypeDecl::new("country").group(TypeGroup::External))
            .unwrap();
        b.register(TypeDecl::new("lowercase")).unwrap();
        b.register_edge("ip", "country", Operation::map(|v| Ok(format!("cc-{v}"))))
            .unwrap();
        b.register_edge("plaintext", "lowercase", Operation::map(|v| Ok(v.to_lowercase())))
            .unwrap();
        b.build()
    }

    fn fields(identifier: &Identifier) -> Fields {
        let header = vec!["ip".to_string(), "note".to_string()];
        identifier.identify_columns(Some(&header), &[vec!["1.2.3.4".into(), "Hi".into()]])
    }

    #[test]
    fn test_parse_formats() {
        let yaml = b"fields:\n  - target: country\n    column: 1\nunique: [ip]\nthreads: 4\n";
        let settings = Settings::from_bytes(yaml, Some("run.yaml")).unwrap();
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.fields[0].column, Some(ColumnRef::Index(1)));
        assert_eq!(settings.unique, vec![ColumnRef::Name("ip".into())]);
        assert_eq!(settings.max_open_handles, DEFAULT_MAX_OPEN);

        let toml = br#"
            split = "country"

            [[fields]]
            target = "country"
            source_type = "ip"

            [[aggregate]]
            function = "count"
            column = 2
        "#;
        let settings = Settings::from_bytes(toml, Some("run.toml")).unwrap();
        assert_eq!(settings.split, Some(ColumnRef::Name("country".into())));
        assert_eq!(settings.aggregate[0].function, AggregateFn::Count);
        assert_eq!(settings.output_name, "output");
    }

    #[test]
    fn test_json_roundtrip() {
        let settings = Settings::new()
            .field(FieldRequest::new("country").column(1usize))
            .filter(Filter::include("country", "cc-1.2.3.4"))
            .split("country")
            .hide(2usize);

        let bytes = settings.to_bytes("json").unwrap();
        assert_eq!(Settings::from_bytes_format(&bytes, "json").unwrap(), settings);
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            Settings::from_bytes_format(b"", "ron"),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_apply_resolves_everything() {
        let catalog = catalog();
        let identifier = Identifier::new(&catalog);
        let settings = Settings::new()
            .field(FieldRequest::new("country"))
            .field(FieldRequest::new("lowercase").column("country"))
            .filter(Filter::include("country", "cc-1.2.3.4"))
            .unique("ip")
            .split(3usize)
            .hide("note");

        let (fields, options) = settings.apply(&identifier, fields(&identifier)).unwrap();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get(3).unwrap().computation.as_ref().unwrap().source_field, 2);
        assert_eq!(fields.output_header(), vec!["ip", "country", "lowercase"]);
        assert_eq!(options.filters[0].0, 2);
        assert_eq!(options.unique, vec![0]);
        assert_eq!(options.split, Some(2));
    }

    #[test]
    fn test_apply_reports_disabled_path() {
        let mut b = Catalog::builder();
        b.register(TypeDecl::new("ip").identify(|s| s.contains('.'))).unwrap();
        b.register(TypeDecl::new("country").group(TypeGroup::External))
            .unwrap();
        b.register_edge("ip", "country", Operation::map(|v| Ok(v.into())))
            .unwrap();
        b.disable_group(TypeGroup::External);
        let catalog = b.build();
        let identifier = Identifier::new(&catalog);

        let err = Settings::new()
            .field(FieldRequest::new("country"))
            .apply(&identifier, fields(&identifier))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Field {
                source: IdentifyError::Resolve(ResolveError::Disabled { .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_apply_unknown_column() {
        let catalog = catalog();
        let identifier = Identifier::new(&catalog);

        let err = Settings::new()
            .unique("missing")
            .apply(&identifier, fields(&identifier))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnknownColumn(_)));

        let err = Settings::new()
            .column_type(1usize, "nope")
            .apply(&identifier, fields(&identifier))
            .unwrap_err();
        assert!(matches!(err, SettingsError::UnknownType(_)));
    }
}

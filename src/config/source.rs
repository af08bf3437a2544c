//! Manifest source resolution.
//!
//! A manifest can be supplied inline, as a reference resolved by a
//! [`ManifestResolver`], or produced by a generator. Resolution happens
//! once, synchronously, when the manager is built.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::loader::{load_value, ConfigError};
use crate::error::{BoxError, ConfigurationError};

/// Zero-argument manifest generator.
pub type ManifestGenerator = Box<dyn FnOnce() -> Result<Value, BoxError> + Send>;

/// Where the manifest comes from.
pub enum ManifestSource {
    /// An already structured value.
    Inline(Value),
    /// A reference handed to the resolver.
    Reference(String),
    /// A function invoked once to produce the value.
    Generator(ManifestGenerator),
}

impl ManifestSource {
    /// Build a generator source from a closure.
    pub fn generator<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Value, BoxError> + Send + 'static,
    {
        ManifestSource::Generator(Box::new(f))
    }

    /// Produce the manifest value.
    ///
    /// Whatever the source, the result must be a mapping.
    pub fn resolve(self, resolver: &dyn ManifestResolver) -> Result<Value, ConfigurationError> {
        let value = match self {
            ManifestSource::Inline(value) => {
                tracing::debug!("manifest is an inline value");
                value
            }
            ManifestSource::Reference(reference) => {
                tracing::debug!(reference = %reference, "manifest is a reference");
                resolver.resolve(&reference)?
            }
            ManifestSource::Generator(generate) => {
                tracing::debug!("manifest is a generator");
                generate().map_err(|e| ConfigurationError::Generator(e.to_string()))?
            }
        };

        match value {
            Value::Object(_) => Ok(value),
            other => Err(ConfigurationError::InvalidManifestType(json_type_name(&other))),
        }
    }
}

impl fmt::Debug for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestSource::Inline(v) => f.debug_tuple("Inline").field(v).finish(),
            ManifestSource::Reference(r) => f.debug_tuple("Reference").field(r).finish(),
            ManifestSource::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

impl From<Value> for ManifestSource {
    fn from(value: Value) -> Self {
        ManifestSource::Inline(value)
    }
}

impl From<&str> for ManifestSource {
    fn from(reference: &str) -> Self {
        ManifestSource::Reference(reference.to_string())
    }
}

impl From<String> for ManifestSource {
    fn from(reference: String) -> Self {
        ManifestSource::Reference(reference)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Turns a manifest reference into a structured value.
pub trait ManifestResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<Value, ConfigurationError>;
}

/// Resolves references as TOML or JSON file paths.
///
/// Relative references are joined onto the base directory.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ManifestResolver for FileResolver {
    fn resolve(&self, reference: &str) -> Result<Value, ConfigurationError> {
        let path = self.path_for(reference);

        load_value(&path).map_err(|e| match e {
            ConfigError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ConfigurationError::UnresolvedReference(path.display().to_string())
            }
            other => ConfigurationError::ManifestLoad {
                reference: path.display().to_string(),
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn inline_mapping_is_returned_unchanged() {
        let manifest = json!({ "servers": [{ "port": 8000 }], "plugins": {} });
        let value = ManifestSource::from(manifest.clone())
            .resolve(&FileResolver::new())
            .unwrap();
        assert_eq!(value, manifest);
    }

    #[test]
    fn number_manifest_names_its_type() {
        let err = ManifestSource::from(json!(123))
            .resolve(&FileResolver::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidManifestType("number")));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn generator_is_invoked() {
        let value = ManifestSource::generator(|| Ok(json!({ "plugins": {} })))
            .resolve(&FileResolver::new())
            .unwrap();
        assert_eq!(value, json!({ "plugins": {} }));
    }

    #[test]
    fn generator_error_is_a_configuration_error() {
        let err = ManifestSource::generator(|| Err("boom".into()))
            .resolve(&FileResolver::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Generator(ref m) if m == "boom"));
    }

    #[test]
    fn generator_must_produce_a_mapping() {
        let err = ManifestSource::generator(|| Ok(json!(["a"])))
            .resolve(&FileResolver::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidManifestType("array")));
    }

    #[test]
    fn reference_is_loaded_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("manifest.json")).unwrap();
        write!(file, r#"{{ "servers": [{{ "port": 0 }}], "plugins": {{}} }}"#).unwrap();

        let value = ManifestSource::from("manifest.json")
            .resolve(&FileResolver::with_base_dir(dir.path()))
            .unwrap();
        assert_eq!(value["servers"][0]["port"], 0);
    }

    #[test]
    fn missing_reference_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestSource::from("nope.toml")
            .resolve(&FileResolver::with_base_dir(dir.path()))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnresolvedReference(_)));
    }

    #[test]
    fn unparsable_reference_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "servers = [").unwrap();

        let err = ManifestSource::from("bad.toml")
            .resolve(&FileResolver::with_base_dir(dir.path()))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ManifestLoad { .. }));
    }
}

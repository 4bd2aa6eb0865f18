//! oschema loading.
//!
//! An oschema document is a JSON array of type definitions. Each definition
//! carries a `name`, a `schema` kind (`record`, `string`, `sequence`, ...) and
//! the namespace `path` it lives in; the remaining keys depend on the kind and
//! are kept verbatim.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, Result};

/// Environment variable holding extra schema search directories.
pub const MODULE_PATH_ENV: &str = "MOO_MODULE_PATH";

/// One type definition from an oschema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    pub schema: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Kind-specific keys (`fields`, `items`, `symbols`, ...).
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl TypeSpec {
    /// Fully qualified name, e.g. `dunedaq.appfwk.cmd.Init`.
    pub fn fqn(&self) -> String {
        if self.path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.path.join("."), self.name)
        }
    }
}

/// Directories searched for schema files when the caller gives none.
///
/// Always the current directory, followed by every entry of
/// `MOO_MODULE_PATH`.
pub fn default_schema_paths() -> Vec<PathBuf> {
    schema_paths_from(std::env::var_os(MODULE_PATH_ENV))
}

fn schema_paths_from(module_path: Option<OsString>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".")];
    if let Some(value) = module_path {
        paths.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
    }
    paths
}

/// Locate `filename`, searching `extra` before the default paths.
pub fn find_schema(filename: &str, extra: &[PathBuf]) -> Result<PathBuf> {
    let candidate = Path::new(filename);
    if candidate.is_absolute() {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(CommandError::SchemaNotFound {
                filename: filename.to_string(),
                searched: Vec::new(),
            })
        };
    }

    let searched: Vec<PathBuf> = extra
        .iter()
        .cloned()
        .chain(default_schema_paths())
        .collect();

    for dir in &searched {
        let path = dir.join(candidate);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "Found schema");
            return Ok(path);
        }
    }

    Err(CommandError::SchemaNotFound {
        filename: filename.to_string(),
        searched,
    })
}

/// Load an oschema document as a list of type definitions.
pub fn load_oschema(filename: &str, extra: &[PathBuf]) -> Result<Vec<TypeSpec>> {
    let path = find_schema(filename, extra)?;
    let text = std::fs::read_to_string(&path).map_err(|source| CommandError::Io {
        path: path.clone(),
        source,
    })?;
    let types: Vec<TypeSpec> =
        serde_json::from_str(&text).map_err(|source| CommandError::Parse {
            path: path.clone(),
            source,
        })?;
    tracing::debug!(path = %path.display(), num_types = types.len(), "Loaded oschema");
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schema")
    }

    #[test]
    fn default_paths_start_with_cwd() {
        let paths = schema_paths_from(None);
        assert_eq!(paths, vec![PathBuf::from(".")]);
    }

    #[test]
    fn module_path_entries_follow_cwd() {
        let joined = std::env::join_paths(["/opt/moo", "/usr/share/moo"]).unwrap();
        let paths = schema_paths_from(Some(joined));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("."),
                PathBuf::from("/opt/moo"),
                PathBuf::from("/usr/share/moo"),
            ]
        );
    }

    #[test]
    fn find_schema_searches_extra_dirs() {
        let path = find_schema("appfwk-cmd.json", &[schema_dir()]).unwrap();
        assert_eq!(path, schema_dir().join("appfwk-cmd.json"));
    }

    #[test]
    fn find_schema_accepts_absolute_path() {
        let abs = schema_dir().join("appfwk-cmd.json");
        let path = find_schema(abs.to_str().unwrap(), &[]).unwrap();
        assert_eq!(path, abs);
    }

    #[test]
    fn find_schema_reports_searched_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_schema("missing-schema.json", &[dir.path().to_path_buf()]).unwrap_err();
        match err {
            CommandError::SchemaNotFound { filename, searched } => {
                assert_eq!(filename, "missing-schema.json");
                assert_eq!(searched[0], dir.path());
                assert!(searched.contains(&PathBuf::from(".")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_oschema_parses_type_definitions() {
        let types = load_oschema("appfwk-cmd.json", &[schema_dir()]).unwrap();
        let init = types.iter().find(|t| t.name == "Init").unwrap();
        assert_eq!(init.schema, "record");
        assert_eq!(init.fqn(), "dunedaq.appfwk.cmd.Init");
        assert!(init.extra.contains_key("fields"));
    }

    #[test]
    fn load_oschema_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let err = load_oschema("broken.json", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, CommandError::Parse { .. }));
    }

    #[test]
    fn type_spec_keeps_kind_specific_keys() {
        let spec: TypeSpec = serde_json::from_value(serde_json::json!({
            "name": "Kind",
            "schema": "enum",
            "path": ["a", "b"],
            "symbols": ["X", "Y"],
            "default": "X"
        }))
        .unwrap();

        assert_eq!(spec.fqn(), "a.b.Kind");
        assert_eq!(spec.doc, None);
        insta::assert_json_snapshot!(spec, @r#"
        {
          "name": "Kind",
          "schema": "enum",
          "path": [
            "a",
            "b"
          ],
          "symbols": [
            "X",
            "Y"
          ],
          "default": "X"
        }
        "#);
    }

    #[test]
    fn fqn_without_path_is_bare_name() {
        let spec = TypeSpec {
            name: "Loose".to_string(),
            schema: "string".to_string(),
            path: Vec::new(),
            doc: None,
            extra: IndexMap::new(),
        };
        assert_eq!(spec.fqn(), "Loose");
    }
}

//! Tool catalog — loads tool definitions and their query templates.
//!
//! Definitions live under a fixed directory: `specs/*.json` declares
//! name/description/parameter schema/template reference, `sql/` holds the
//! parameterized query templates. The catalog is built once at startup and
//! is read-only afterwards; any malformed definition is startup-fatal.

use anyhow::{bail, Context, Result};
use jsonschema::{Draft, JSONSchema};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Immutable definition of one tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the tool's arguments.
    pub parameters: Value,
    /// Query template reference, relative to the catalog's sql/ directory.
    #[serde(rename = "x_sql_file")]
    pub sql_file: String,
    /// Resolved template body; filled at load time, never empty afterwards.
    #[serde(skip)]
    pub sql_text: String,
}

impl ToolSpec {
    /// Whether the parameter schema declares the given argument.
    pub fn accepts_parameter(&self, key: &str) -> bool {
        self.parameters
            .get("properties")
            .and_then(|p| p.get(key))
            .is_some()
    }
}

#[derive(Debug)]
struct CatalogEntry {
    spec: ToolSpec,
    validator: JSONSchema,
}

/// Name → tool mapping, with a compiled schema validator per tool.
#[derive(Debug)]
pub struct ToolCatalog {
    tools: BTreeMap<String, CatalogEntry>,
}

impl ToolCatalog {
    /// Load every definition under `dir` and fail fast on any defect:
    /// malformed JSON, duplicate name, missing or empty SQL template,
    /// uncompilable parameter schema, or zero definitions.
    pub fn load(dir: &Path) -> Result<Self> {
        let spec_dir = dir.join("specs");
        let sql_dir = dir.join("sql");

        let entries = std::fs::read_dir(&spec_dir)
            .with_context(|| format!("Failed to read tool spec directory {}", spec_dir.display()))?;

        let mut tools = BTreeMap::new();

        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tool spec {}", path.display()))?;
            let mut spec: ToolSpec = serde_json::from_str(&contents)
                .with_context(|| format!("Malformed tool spec {}", path.display()))?;

            let sql_path = sql_dir.join(&spec.sql_file);
            let sql_text = std::fs::read_to_string(&sql_path).with_context(|| {
                format!(
                    "SQL template not found for tool '{}': {}",
                    spec.name,
                    sql_path.display()
                )
            })?;
            if sql_text.trim().is_empty() {
                bail!("SQL template for tool '{}' is empty", spec.name);
            }
            spec.sql_text = sql_text;

            let validator = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&spec.parameters)
                .map_err(|e| {
                    anyhow::anyhow!("Invalid parameter schema for tool '{}': {}", spec.name, e)
                })?;

            if tools
                .insert(spec.name.clone(), CatalogEntry { spec, validator })
                .is_some()
            {
                bail!("Duplicate tool definition in {}", path.display());
            }
        }

        if tools.is_empty() {
            bail!("No tool specs found in {}", spec_dir.display());
        }

        info!("Loaded {} tool definitions from {}", tools.len(), dir.display());
        Ok(Self { tools })
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|e| &e.spec)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Validate an argument object against the tool's compiled schema.
    /// Returns the joined validation errors on mismatch.
    pub fn validate_args(&self, name: &str, instance: &Value) -> std::result::Result<(), String> {
        let entry = match self.tools.get(name) {
            Some(e) => e,
            None => return Err(format!("unknown tool: {name}")),
        };
        if let Err(errors) = entry.validator.validate(instance) {
            let detail = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            return Err(detail);
        }
        Ok(())
    }

    /// Render every tool into the function-call descriptor shape the chat
    /// endpoint expects. Formatting only.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|e| ToolDescriptor {
                r#type: "function".into(),
                function: FunctionDescriptor {
                    name: e.spec.name.clone(),
                    description: e.spec.description.clone(),
                    parameters: e.spec.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Function-call descriptor for the chat endpoint's `tools` array.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub r#type: String,
    pub function: FunctionDescriptor,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

use crate::error::{Error, Result};
use crate::traits::{Tool, ToolArgs, ToolSpec};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something the registry can (re)load tools from. Each element of `load` is
/// one unit; a failed unit is skipped without affecting the others.
pub trait ToolSource: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> Vec<Result<Arc<dyn Tool>>>;
}

pub struct StaticToolSource {
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolSource {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }
}

impl ToolSource for StaticToolSource {
    fn name(&self) -> &str {
        "static"
    }

    fn load(&self) -> Vec<Result<Arc<dyn Tool>>> {
        self.tools.iter().cloned().map(Ok).collect()
    }
}

/// Loads declarative tools from `*.toml` manifests in a directory.
///
/// ```toml
/// name = "greetTeam"
/// description = "Greets a whole team"
///
/// [parameters]
/// type = "object"
/// required = ["team"]
///
/// [parameters.properties.team]
/// type = "string"
/// description = "Team name"
///
/// [response]
/// greeting = "Hello, {team}!"
/// ```
pub struct ManifestToolSource {
    dir: PathBuf,
}

impl ManifestToolSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ToolSource for ManifestToolSource {
    fn name(&self) -> &str {
        "manifest"
    }

    fn load(&self) -> Vec<Result<Arc<dyn Tool>>> {
        if !self.dir.exists() {
            tracing::debug!("Tools directory does not exist: {}", self.dir.display());
            return Vec::new();
        }

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                return vec![Err(Error::registry_load(
                    self.dir.display().to_string(),
                    format!("failed to read tools directory: {e}"),
                ))];
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                load_manifest(path).map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            })
            .collect()
    }
}

pub struct ManifestTool {
    spec: ToolSpec,
    response: Option<Value>,
}

impl ManifestTool {
    /// Builds a tool from a manifest document. `unit` names the document in errors.
    pub fn from_manifest(unit: &str, manifest: Value) -> Result<Self> {
        let Value::Object(mut manifest) = manifest else {
            return Err(Error::registry_load(unit, "manifest must be a table"));
        };

        let name = match manifest.remove("name") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(Error::registry_load(unit, "name must be a string")),
            None => return Err(Error::registry_load(unit, "missing name")),
        };

        let description = match manifest.remove("description") {
            Some(Value::String(description)) => description,
            Some(_) => return Err(Error::registry_load(unit, "description must be a string")),
            None => String::new(),
        };

        let parameters = manifest
            .remove("parameters")
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));

        let spec = ToolSpec::new(name, description, parameters);
        spec.check().map_err(|reason| Error::registry_load(unit, reason))?;

        Ok(Self {
            spec,
            response: manifest.remove("response"),
        })
    }
}

fn load_manifest(path: &Path) -> Result<ManifestTool> {
    let unit = path.display().to_string();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::registry_load(&unit, format!("failed to read: {e}")))?;

    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| Error::registry_load(&unit, format!("invalid TOML: {e}")))?;

    let manifest = serde_json::to_value(table)
        .map_err(|e| Error::registry_load(&unit, format!("unsupported value: {e}")))?;

    ManifestTool::from_manifest(&unit, manifest)
}

#[async_trait]
impl Tool for ManifestTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.spec.parameter_schema.clone()
    }

    async fn invoke(&self, args: ToolArgs) -> anyhow::Result<Value> {
        match &self.response {
            Some(template) => Ok(render(template, &args)),
            None => Ok(args.to_value()),
        }
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }
}

/// Substitutes `{param}` placeholders in every string of `template`.
fn render(template: &Value, args: &ToolArgs) -> Value {
    match template {
        Value::String(text) => {
            let mut out = text.clone();
            for (name, value) in args.iter() {
                let replacement = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&format!("{{{name}}}"), &replacement);
            }
            Value::String(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render(v, args)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render(v, args)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

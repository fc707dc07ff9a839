//! Build configuration: registry entries and per-pass options.
//!
//! Everything here is deserialized from the JSON the host hands over once per build.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::TransformError;

pub const DEFAULT_FACTORY_MARKER: &str = "__nuxt_factory";
pub const DEFAULT_CLIENT_ONLY_RUNTIME: &str = "#app/components/client-only";

/// Where a keyed function lives. Legacy entries may carry a pattern instead of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Path(String),
    Pattern { pattern: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedFunctionEntry {
    pub name: String,
    #[serde(default)]
    pub source: Option<SourceSpec>,
    pub argument_length: usize,
}

impl KeyedFunctionEntry {
    pub fn new(name: &str, source: &str, argument_length: usize) -> Self {
        Self {
            name: name.to_string(),
            source: Some(SourceSpec::Path(source.to_string())),
            argument_length,
        }
    }

    pub fn sourceless(name: &str, argument_length: usize) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            argument_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryEntry {
    pub name: String,
    pub source: String,
    pub argument_length: usize,
}

impl FactoryEntry {
    pub fn new(name: &str, source: &str, argument_length: usize) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            argument_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentMode {
    Client,
    Server,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub pascal_name: String,
    pub file_path: String,
    #[serde(default)]
    pub mode: ComponentMode,
    #[serde(default = "default_export")]
    pub export: String,
    #[serde(default)]
    pub priority: i32,
    /// Raw components are imported as-is, never wrapped.
    #[serde(default, rename = "_raw")]
    pub raw: bool,
}

fn default_export() -> String {
    "default".to_string()
}

impl Component {
    pub fn new(pascal_name: &str, file_path: &str, mode: ComponentMode) -> Self {
        Self {
            pascal_name: pascal_name.to_string(),
            file_path: file_path.to_string(),
            mode,
            export: default_export(),
            priority: 0,
            raw: false,
        }
    }
}

/// Which bundle a component pass is producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleMode {
    #[default]
    Client,
    Server,
}

impl BundleMode {
    pub fn accepts(self, mode: ComponentMode) -> bool {
        matches!(
            (self, mode),
            (_, ComponentMode::All)
                | (BundleMode::Client, ComponentMode::Client)
                | (BundleMode::Server, ComponentMode::Server)
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    /// Keys are hashed from paths relative to this directory.
    #[serde(default)]
    pub root_dir: Option<String>,
    /// Alias prefix to absolute path, e.g. `#app` to `/node_modules/nuxt/dist/app`.
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
    /// Bare name to module source, used when a name has no static import.
    #[serde(default)]
    pub auto_imports: HashMap<String, String>,
    #[serde(default)]
    pub sourcemap: bool,
    #[serde(default = "default_factory_marker")]
    pub factory_marker: String,
}

fn default_factory_marker() -> String {
    DEFAULT_FACTORY_MARKER.to_string()
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            root_dir: None,
            alias: BTreeMap::new(),
            auto_imports: HashMap::new(),
            sourcemap: false,
            factory_marker: default_factory_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentLoaderOptions {
    #[serde(default)]
    pub mode: BundleMode,
    pub server_component_runtime: String,
    pub client_delayed_component_runtime: String,
    #[serde(default = "default_client_only_runtime")]
    pub client_only_runtime: String,
    #[serde(default)]
    pub experimental_component_islands: bool,
    #[serde(default)]
    pub sourcemap: bool,
}

fn default_client_only_runtime() -> String {
    DEFAULT_CLIENT_ONLY_RUNTIME.to_string()
}

impl ComponentLoaderOptions {
    pub fn new(mode: BundleMode) -> Self {
        Self {
            mode,
            server_component_runtime: "#app/components/nuxt-island".to_string(),
            client_delayed_component_runtime: "#app/components/client-delayed-component"
                .to_string(),
            client_only_runtime: default_client_only_runtime(),
            experimental_component_islands: false,
            sourcemap: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetaOptions {
    #[serde(default)]
    pub dev: bool,
}

/// Everything a build needs, in one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub keyed_functions: Vec<KeyedFunctionEntry>,
    #[serde(default)]
    pub factories: Vec<FactoryEntry>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub options: TransformOptions,
    #[serde(default)]
    pub loader: Option<ComponentLoaderOptions>,
    #[serde(default)]
    pub page_meta: PageMetaOptions,
}

impl BuildConfig {
    pub fn from_json(json: &str) -> Result<Self, TransformError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, TransformError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TransformError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }
}

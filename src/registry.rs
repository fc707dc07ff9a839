//! # Registries
//!
//! Build-wide lookup tables handed to every file pass.
//!
//! Keyed functions are the one registry that grows during a build: the factory scan appends the
//! functions it discovers. That happens through [`KeyedFunctionStore`], which only supports
//! appending, and becomes readable only after [`KeyedFunctionStore::seal`]. Passes that inject
//! keys take the sealed [`KeyedFunctionRegistry`], so they cannot run before every scan finished.

use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::warn;

use crate::config::{BundleMode, Component, ComponentMode, FactoryEntry, KeyedFunctionEntry, SourceSpec};
use crate::error::TransformError;
use crate::imports::{strip_extension, AliasTable};
use crate::naming::{default_export_name, file_stem, pascal_case};

// ═══════════════════════════════════════════════════════════════════════════════
// KEYED FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only store of keyed-function entries collected before the rewrite passes.
#[derive(Debug, Default, Clone)]
pub struct KeyedFunctionStore {
    entries: Vec<KeyedFunctionEntry>,
}

impl KeyedFunctionStore {
    pub fn new(initial: Vec<KeyedFunctionEntry>) -> Self {
        Self { entries: initial }
    }

    pub fn append<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = KeyedFunctionEntry>,
    {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[KeyedFunctionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closes the store for appends and builds the read-only registry.
    pub fn seal(self, aliases: &AliasTable) -> Result<KeyedFunctionRegistry, TransformError> {
        KeyedFunctionRegistry::build(self.entries, aliases)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedFunction {
    /// Name the function is called by. Default exports get their file's camel-cased name.
    pub name: String,
    /// Name in the defining module, `default` for default exports.
    pub export_name: String,
    /// Alias-resolved, extension-stripped source. `None` for pattern and sourceless entries.
    pub source: Option<String>,
    pub argument_length: usize,
}

#[derive(Debug, Default)]
pub struct KeyedFunctionRegistry {
    by_name: HashMap<String, HashMap<String, KeyedFunction>>,
    patterns: HashMap<String, Vec<(Regex, KeyedFunction)>>,
    sourceless: HashMap<String, KeyedFunction>,
    sources: HashSet<String>,
    names: BTreeSet<String>,
    /// File stems of default-export entries; importers may bind them under any name.
    default_stems: BTreeSet<String>,
}

impl KeyedFunctionRegistry {
    pub fn build(
        entries: Vec<KeyedFunctionEntry>,
        aliases: &AliasTable,
    ) -> Result<Self, TransformError> {
        let mut registry = KeyedFunctionRegistry::default();
        for entry in entries {
            match &entry.source {
                Some(SourceSpec::Path(source)) => {
                    let resolved = strip_extension(&aliases.resolve(source)).to_string();
                    let name = if entry.name == "default" {
                        registry.default_stems.insert(file_stem(&resolved).to_string());
                        default_export_name(&resolved)
                    } else {
                        entry.name.clone()
                    };
                    let function = KeyedFunction {
                        name: name.clone(),
                        export_name: entry.name.clone(),
                        source: Some(resolved.clone()),
                        argument_length: entry.argument_length,
                    };
                    let per_source = registry.by_name.entry(name.clone()).or_default();
                    if per_source.contains_key(&resolved) {
                        warn!(
                            "[nuxt] Duplicate keyed function `{}` registered for `{}`; keeping the first entry",
                            name, resolved
                        );
                        continue;
                    }
                    per_source.insert(resolved.clone(), function);
                    registry.sources.insert(resolved);
                    registry.names.insert(name);
                }
                Some(SourceSpec::Pattern { pattern }) => {
                    let regex = Regex::new(pattern).map_err(|e| {
                        TransformError::Config(format!(
                            "invalid source pattern for `{}`: {}",
                            entry.name, e
                        ))
                    })?;
                    let function = KeyedFunction {
                        name: entry.name.clone(),
                        export_name: entry.name.clone(),
                        source: None,
                        argument_length: entry.argument_length,
                    };
                    registry
                        .patterns
                        .entry(entry.name.clone())
                        .or_default()
                        .push((regex, function));
                    registry.names.insert(entry.name.clone());
                }
                None => {
                    if registry.sourceless.contains_key(&entry.name) {
                        warn!(
                            "[nuxt] Duplicate keyed function `{}` without source; keeping the first entry",
                            entry.name
                        );
                        continue;
                    }
                    registry.sourceless.insert(
                        entry.name.clone(),
                        KeyedFunction {
                            name: entry.name.clone(),
                            export_name: entry.name.clone(),
                            source: None,
                            argument_length: entry.argument_length,
                        },
                    );
                    registry.names.insert(entry.name.clone());
                }
            }
        }
        Ok(registry)
    }

    /// Entry for `name` exported by `source` (resolved form).
    pub fn get(&self, name: &str, source: &str) -> Option<&KeyedFunction> {
        if let Some(function) = self.by_name.get(name).and_then(|m| m.get(source)) {
            return Some(function);
        }
        self.patterns.get(name).and_then(|patterns| {
            patterns
                .iter()
                .find(|(regex, _)| regex.is_match(source))
                .map(|(_, function)| function)
        })
    }

    /// Entries registered without any source. Only the auto-import fallback reads these.
    pub fn get_sourceless(&self, name: &str) -> Option<&KeyedFunction> {
        self.sourceless.get(name)
    }

    /// Whether `source` (resolved form) defines at least one keyed function.
    pub fn is_source(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Cheap pre-filter: can `code` reference any registered name at all?
    pub fn mentioned_in(&self, code: &str) -> bool {
        self.names
            .iter()
            .chain(self.default_stems.iter())
            .any(|name| code.contains(name.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFactory {
    pub name: String,
    /// Alias-resolved, extension-stripped source.
    pub source: String,
    pub argument_length: usize,
}

#[derive(Debug, Default)]
pub struct FactoryRegistry {
    by_name: HashMap<String, ResolvedFactory>,
}

impl FactoryRegistry {
    pub fn new(entries: &[FactoryEntry], aliases: &AliasTable) -> Self {
        let mut by_name = HashMap::new();
        for entry in entries {
            if by_name.contains_key(&entry.name) {
                warn!(
                    "[nuxt] Duplicate keyed function factory `{}`; keeping the first entry",
                    entry.name
                );
                continue;
            }
            by_name.insert(
                entry.name.clone(),
                ResolvedFactory {
                    name: entry.name.clone(),
                    source: strip_extension(&aliases.resolve(&entry.source)).to_string(),
                    argument_length: entry.argument_length,
                },
            );
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedFactory> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn mentioned_in(&self, code: &str) -> bool {
        self.by_name.keys().any(|name| code.contains(name.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Components after priority resolution, at most one per `(pascalName, mode)`.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    components: Vec<Component>,
}

impl ComponentRegistry {
    pub fn new(components: Vec<Component>) -> Self {
        let mut winners: Vec<Component> = Vec::new();
        let mut index: HashMap<(String, ComponentMode), usize> = HashMap::new();
        for component in components {
            let key = (component.pascal_name.clone(), component.mode);
            match index.get(&key) {
                Some(&i) => {
                    let current = &winners[i];
                    if component.priority > current.priority {
                        winners[i] = component;
                    } else if component.priority == current.priority {
                        warn!(
                            "[nuxt] Two component files resolving to the same name `{}`:\n - {}\n - {}",
                            component.pascal_name, current.file_path, component.file_path
                        );
                    }
                }
                None => {
                    index.insert(key, winners.len());
                    winners.push(component);
                }
            }
        }
        Self {
            components: winners,
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn contains(&self, pascal_name: &str) -> bool {
        self.components.iter().any(|c| c.pascal_name == pascal_name)
    }

    pub fn has_variant(&self, pascal_name: &str, mode: ComponentMode) -> bool {
        self.components
            .iter()
            .any(|c| c.pascal_name == pascal_name && c.mode == mode)
    }

    fn position(&self, predicate: impl Fn(&Component) -> bool) -> Option<usize> {
        self.components.iter().position(predicate)
    }

    /// Resolves a requested component name for a bundle.
    ///
    /// Prefers a component usable in `bundle`. Otherwise returns the other-mode component, which
    /// the loader bridges; in the server bundle that bridge is the `ServerPlaceholder` component.
    pub fn find(&self, name: &str, bundle: BundleMode) -> Option<usize> {
        let id = pascal_case(name).replace(['"', '\''], "");
        if let Some(exact) = self.position(|c| c.pascal_name == id && bundle.accepts(c.mode)) {
            return Some(exact);
        }
        let other = self.position(|c| c.pascal_name == id)?;
        if bundle == BundleMode::Server {
            return self.position(|c| c.pascal_name == "ServerPlaceholder");
        }
        Some(other)
    }
}

//! # Build Pipeline
//!
//! Drives every pass over a set of files:
//!
//! 1. [`Build::scan_factories`] scans all files for factory-produced keyed functions, in parallel,
//!    appending what it finds to the build's [`KeyedFunctionStore`] in input order.
//! 2. [`Build::seal`] closes the store. Nothing can be appended afterwards.
//! 3. [`SealedBuild::transform_files`] runs the per-file passes, in parallel, each file with its
//!    own key counter.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::components::{should_resolve_components, ComponentLoader};
use crate::config::{BuildConfig, ComponentLoaderOptions, PageMetaOptions, TransformOptions};
use crate::error::{CompilerError, TransformError};
use crate::factories::FactoryPass;
use crate::imports::AliasTable;
use crate::keyed_functions::KeyInjection;
use crate::lazy_hydration::transform_lazy_hydration;
use crate::page_meta::extract_page_meta;
use crate::parse::should_transform_file;
use crate::registry::{ComponentRegistry, FactoryRegistry, KeyedFunctionRegistry, KeyedFunctionStore};
use crate::sourcemap::SourceMap;
use crate::splice::TransformOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub id: String,
    pub code: String,
}

impl SourceFile {
    pub fn new(id: &str, code: &str) -> Self {
        Self {
            id: id.to_string(),
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutput {
    pub id: String,
    /// `None` when no pass changed the file.
    pub code: Option<String>,
    /// One map per pass that changed the file, in pass order. Hosts chain them.
    pub maps: Vec<SourceMap>,
    pub error: Option<CompilerError>,
}

impl FileOutput {
    fn unchanged(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_changed(&self) -> bool {
        self.code.is_some()
    }
}

fn is_macro_request(id: &str) -> bool {
    id.split_once('?')
        .is_some_and(|(_, query)| query.split('&').any(|param| param == "macro=true"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCAN PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// A build that is still collecting keyed functions.
pub struct Build {
    options: TransformOptions,
    loader: Option<ComponentLoaderOptions>,
    page_meta: PageMetaOptions,
    aliases: AliasTable,
    factories: FactoryRegistry,
    components: ComponentRegistry,
    store: KeyedFunctionStore,
}

impl Build {
    pub fn new(config: BuildConfig) -> Self {
        let aliases = AliasTable::new(&config.options.alias);
        let factories = FactoryRegistry::new(&config.factories, &aliases);
        Self {
            factories,
            components: ComponentRegistry::new(config.components),
            store: KeyedFunctionStore::new(config.keyed_functions),
            options: config.options,
            loader: config.loader,
            page_meta: config.page_meta,
            aliases,
        }
    }

    pub fn keyed_functions(&self) -> &KeyedFunctionStore {
        &self.store
    }

    /// Scans `files` for exported factory calls. Returns how many keyed functions were added.
    ///
    /// Files that fail to parse are skipped. A missing factory entry aborts the scan.
    pub fn scan_factories(&mut self, files: &[SourceFile]) -> Result<usize, TransformError> {
        let scanned: Vec<_> = {
            let pass = FactoryPass::new(&self.factories, &self.options);
            files
                .par_iter()
                .map(|file| {
                    if !should_transform_file(&file.id) {
                        return Ok(Vec::new());
                    }
                    match pass.scan(&file.code, &file.id) {
                        Err(err) if err.is_recoverable() => {
                            warn!("skipping factory scan of {}: {}", file.id, err);
                            Ok(Vec::new())
                        }
                        other => other,
                    }
                })
                .collect()
        };

        let mut added = 0;
        for entries in scanned {
            let entries = entries?;
            added += entries.len();
            self.store.append(entries);
        }
        debug!("factory scan added {} keyed functions", added);
        Ok(added)
    }

    /// Closes the keyed-function store and opens the build for rewriting.
    pub fn seal(self) -> Result<SealedBuild, TransformError> {
        let keyed = self.store.seal(&self.aliases)?;
        Ok(SealedBuild {
            options: self.options,
            loader: self.loader,
            page_meta: self.page_meta,
            keyed,
            factories: self.factories,
            components: self.components,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITE PHASE
// ═══════════════════════════════════════════════════════════════════════════════

/// A build whose registries are final. Shared read-only by every file task.
pub struct SealedBuild {
    options: TransformOptions,
    loader: Option<ComponentLoaderOptions>,
    page_meta: PageMetaOptions,
    keyed: KeyedFunctionRegistry,
    factories: FactoryRegistry,
    components: ComponentRegistry,
}

impl SealedBuild {
    pub fn keyed_functions(&self) -> &KeyedFunctionRegistry {
        &self.keyed
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Runs every applicable pass over one file.
    ///
    /// `?macro=true` requests only get page-meta extraction. Otherwise the order is: lazy-hydration
    /// tags, factory rewrite, key injection, component loading. A parse failure leaves the file
    /// unchanged.
    pub fn transform(&self, code: &str, id: &str) -> Result<FileOutput, TransformError> {
        let mut output = FileOutput::unchanged(id);
        if is_macro_request(id) {
            let result = extract_page_meta(code, id, &self.page_meta, self.options.sourcemap);
            return match result {
                Err(err) if err.is_recoverable() => {
                    warn!("skipping page meta of {}: {}", id, err);
                    Ok(output)
                }
                Err(err) => Err(err),
                Ok(TransformOutput::Unchanged) => Ok(output),
                Ok(TransformOutput::Rewritten { code, map }) => {
                    output.code = Some(code);
                    output.maps.extend(map);
                    Ok(output)
                }
            };
        }
        if !should_transform_file(id) {
            debug!("not transforming {}", id);
            return Ok(output);
        }

        match self.run_passes(code, id) {
            Ok((current, maps)) => {
                if !maps.is_empty() || current != code {
                    output.code = Some(current);
                    output.maps = maps;
                }
                Ok(output)
            }
            Err(err) if err.is_recoverable() => {
                warn!("skipping {}: {}", id, err);
                Ok(output)
            }
            Err(err) => Err(err),
        }
    }

    fn run_passes(&self, code: &str, id: &str) -> Result<(String, Vec<SourceMap>), TransformError> {
        let mut current = code.to_string();
        let mut maps = Vec::new();
        let mut apply = |result: TransformOutput, current: &mut String| {
            if let TransformOutput::Rewritten { code, map } = result {
                *current = code;
                maps.extend(map);
            }
        };

        if !self.components.components().is_empty() {
            let result = transform_lazy_hydration(&current, id, &self.components, self.options.sourcemap)?;
            apply(result, &mut current);
        }
        let result = FactoryPass::new(&self.factories, &self.options).rewrite(&current, id)?;
        apply(result, &mut current);
        let result = KeyInjection::new(&self.keyed, &self.options).transform(&current, id)?;
        apply(result, &mut current);
        if let Some(loader) = &self.loader {
            if should_resolve_components(id) {
                let result = ComponentLoader::new(&self.components, loader).transform(&current, id)?;
                apply(result, &mut current);
            }
        }
        Ok((current, maps))
    }

    /// Transforms many files in parallel. Failures are reported per file.
    pub fn transform_files(&self, files: &[SourceFile]) -> Vec<FileOutput> {
        files
            .par_iter()
            .map(|file| {
                self.transform(&file.code, &file.id).unwrap_or_else(|err| FileOutput {
                    error: Some(CompilerError::from(&err)),
                    ..FileOutput::unchanged(&file.id)
                })
            })
            .collect()
    }
}

/// Scan, seal and transform in one go.
pub fn run_build(config: BuildConfig, files: &[SourceFile]) -> Result<Vec<FileOutput>, TransformError> {
    let mut build = Build::new(config);
    build.scan_factories(files)?;
    Ok(build.seal()?.transform_files(files))
}

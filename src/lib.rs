//! # Macro Compiler (native)
//!
//! Build-time rewriting of framework macros in application modules.
//!
//! ## Passes
//!
//! 1. **Factory scan / rewrite** (`factories`): `export const useX = createUseFetch()` registers
//!    `useX` as a keyed function during the scan, and points the call at the factory's real
//!    implementation during the rewrite.
//! 2. **Key injection** (`keyed_functions`): calls to registered keyed functions get a stable,
//!    file-local cache key appended as their last argument.
//! 3. **Component loading** (`components`): `resolveComponent("Name")` calls in compiled templates
//!    become direct imports, lazy loaders, client-only wrappers or server placeholders.
//! 4. **Lazy hydration** (`lazy_hydration`): `<LazyFoo hydrate-on-idle>` tags are renamed to the
//!    delayed-hydration variant before the template is compiled.
//! 5. **Page meta** (`page_meta`): `definePageMeta` arguments are extracted into their own module.
//!
//! ## Invariants
//!
//! - Every pass is a function of `(code, id, registries)`. The one cross-file effect is the
//!   factory scan appending to the keyed-function store, and the store is sealed before any
//!   rewrite runs (`pipeline`).
//! - Code is edited by splicing text, never by regenerating it. Edits never overlap.
//! - Only statically provable call sites are touched. Shadowed names, computed members and
//!   aliased factories are left alone.
//! - Key counters are per file and count in source visit order, so output is deterministic.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod call_site;
mod components;
mod config;
mod discovery;
mod error;
mod exports;
mod factories;
mod imports;
mod keyed_functions;
mod lazy_hydration;
mod naming;
mod page_meta;
mod parse;
mod pipeline;
mod registry;
mod scope;
mod sourcemap;
mod splice;

#[cfg(test)]
mod keyed_functions_tests;
#[cfg(test)]
mod safety_tests;

pub use call_site::{parse_static_call, parse_static_function_call, CalleeNode, NameFilter, StaticCall};
pub use components::{parse_component_request, resolve_components, ComponentLoader, HydrationStrategy};
pub use config::{
    BuildConfig, BundleMode, Component, ComponentLoaderOptions, ComponentMode, FactoryEntry,
    KeyedFunctionEntry, PageMetaOptions, SourceSpec, TransformOptions,
};
pub use discovery::{discover_source_files, find_source_files};
pub use error::{CompilerError, TransformError};
pub use exports::{parse_static_export_identifiers, ExportBinding};
pub use factories::{rewrite_factory_macros, scan_factories, FactoryCall, FactoryPass};
pub use imports::{find_static_imports, AliasTable, ImportRecord};
pub use keyed_functions::{generate_key, inject_keys, KeyInjection, KEY_HASH_LENGTH};
pub use lazy_hydration::transform_lazy_hydration;
pub use page_meta::extract_page_meta;
pub use parse::{should_transform_file, ParsedModule, ScriptBlock};
pub use pipeline::{run_build, Build, FileOutput, SealedBuild, SourceFile};
pub use registry::{
    ComponentRegistry, FactoryRegistry, KeyedFunction, KeyedFunctionRegistry, KeyedFunctionStore,
};
pub use scope::{Declaration, DeclarationKind, ScopeCursor, ScopeId, ScopeTracker};
pub use sourcemap::SourceMap;
pub use splice::{TextSplicer, TransformOutput};

#[cfg(feature = "napi")]
pub use discovery::discover_source_files_native;

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(err: TransformError) -> napi::Error {
    let compiler_error = CompilerError::from(&err);
    let reason = serde_json::to_string(&compiler_error).unwrap_or_else(|_| err.to_string());
    napi::Error::from_reason(reason)
}

/// Installs a stderr subscriber. `filter` uses `RUST_LOG` syntax and falls back to `RUST_LOG`.
#[cfg(feature = "napi")]
#[napi]
pub fn init_logging_native(filter: Option<String>) {
    use tracing_subscriber::EnvFilter;

    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::from_default_env(),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Scan phase only: the keyed functions `files` add through factories.
#[cfg(feature = "napi")]
#[napi]
pub fn scan_factories_native(files_json: String, config_json: String) -> napi::Result<String> {
    let config = BuildConfig::from_json(&config_json).map_err(to_napi_error)?;
    let files: Vec<SourceFile> = serde_json::from_str(&files_json)
        .map_err(|e| to_napi_error(TransformError::from(e)))?;

    let mut build = Build::new(config);
    let before = build.keyed_functions().len();
    build.scan_factories(&files).map_err(to_napi_error)?;
    let added = &build.keyed_functions().entries()[before..];
    serde_json::to_string(added).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Full build: scan, seal, then transform every file.
#[cfg(feature = "napi")]
#[napi]
pub fn run_build_native(files_json: String, config_json: String) -> napi::Result<String> {
    let config = BuildConfig::from_json(&config_json).map_err(to_napi_error)?;
    let files: Vec<SourceFile> = serde_json::from_str(&files_json)
        .map_err(|e| to_napi_error(TransformError::from(e)))?;

    let outputs = run_build(config, &files).map_err(to_napi_error)?;
    serde_json::to_string(&outputs).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Transforms one file against a config whose keyed functions are already complete.
#[cfg(feature = "napi")]
#[napi]
pub fn transform_native(code: String, id: String, config_json: String) -> napi::Result<String> {
    let config = BuildConfig::from_json(&config_json).map_err(to_napi_error)?;
    let sealed = Build::new(config).seal().map_err(to_napi_error)?;
    let output = sealed.transform(&code, &id).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// Resolves `resolveComponent` calls in one compiled module.
#[cfg(feature = "napi")]
#[napi]
pub fn resolve_components_native(code: String, id: String, config_json: String) -> napi::Result<String> {
    let config = BuildConfig::from_json(&config_json).map_err(to_napi_error)?;
    let Some(loader) = config.loader else {
        return Err(to_napi_error(TransformError::Config(
            "`loader` options are required to resolve components".to_string(),
        )));
    };
    let registry = ComponentRegistry::new(config.components);
    let output = resolve_components(&code, &id, &registry, &loader).map_err(to_napi_error)?;
    let file_output = FileOutput {
        id: id.clone(),
        code: output.code().map(str::to_string),
        maps: output.map().cloned().into_iter().collect(),
        error: None,
    };
    serde_json::to_string(&file_output).map_err(|e| napi::Error::from_reason(e.to_string()))
}

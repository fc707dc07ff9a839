//! # Component Resolution
//!
//! Turns runtime `resolveComponent("Name")` / `_resolveComponent("Name")` calls into direct
//! references to registered components, prepending the imports they need.
//!
//! - plain registered components become a static import
//! - `Lazy` / `lazy-` prefixed names become `defineAsyncComponent` wrappers
//! - `LazyIdle`, `LazyVisible`, ... select a delayed-hydration wrapper from the client runtime
//! - server-only components in the client bundle become `createServerComponent("Name")`
//! - client-only components are wrapped with `createClientOnly`
//!
//! Names that resolve to nothing are left for the runtime helper.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Argument, CallExpression};
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use oxc_syntax::scope::{ScopeFlags, ScopeId as OxcScopeId};
use regex::Regex;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::call_site::{parse_static_call, NameFilter};
use crate::config::{Component, ComponentLoaderOptions, ComponentMode};
use crate::error::TransformError;
use crate::imports::clean_id;
use crate::parse::{is_vue, ParsedModule, ScriptBlock};
use crate::registry::ComponentRegistry;
use crate::scope::ScopeCursor;
use crate::splice::{TextSplicer, TransformOutput};

lazy_static! {
    static ref RESOLVE_COMPONENT_RE: Regex = Regex::new(r"^_?resolveComponent$").unwrap();
    static ref JSX_EXTENSION_RE: Regex = Regex::new(r"\.[jt]sx$").unwrap();
}

/// SFCs and JSX/TSX modules call the runtime resolver.
pub fn should_resolve_components(id: &str) -> bool {
    is_vue(id) || JSX_EXTENSION_RE.is_match(clean_id(id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUESTED NAMES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrationStrategy {
    Idle,
    Visible,
    Interaction,
    MediaQuery,
    If,
    Never,
    Time,
}

impl HydrationStrategy {
    /// Name segment used in `Lazy<Strategy><Component>`.
    pub fn as_str(self) -> &'static str {
        match self {
            HydrationStrategy::Idle => "Idle",
            HydrationStrategy::Visible => "Visible",
            HydrationStrategy::Interaction => "Interaction",
            HydrationStrategy::MediaQuery => "MediaQuery",
            HydrationStrategy::If => "If",
            HydrationStrategy::Never => "Never",
            HydrationStrategy::Time => "Time",
        }
    }

    /// Runtime helper and identifier suffix. `Never` is handled with a plain async component.
    fn helper(self) -> Option<(&'static str, &'static str)> {
        match self {
            HydrationStrategy::Visible => Some(("createLazyVisibleComponent", "_lazy_visible")),
            HydrationStrategy::Interaction => Some(("createLazyInteractionComponent", "_lazy_event")),
            HydrationStrategy::Idle => Some(("createLazyIdleComponent", "_lazy_idle")),
            HydrationStrategy::MediaQuery => Some(("createLazyMediaQueryComponent", "_lazy_media")),
            HydrationStrategy::If => Some(("createLazyIfComponent", "_lazy_if")),
            HydrationStrategy::Time => Some(("createLazyTimeComponent", "_lazy_time")),
            HydrationStrategy::Never => None,
        }
    }
}

/// Tried in order; the first matching prefix wins.
const HYDRATION_MODIFIERS: &[(&str, HydrationStrategy)] = &[
    ("Idle", HydrationStrategy::Idle),
    ("Visible", HydrationStrategy::Visible),
    ("idle-", HydrationStrategy::Idle),
    ("visible-", HydrationStrategy::Visible),
    ("Interaction", HydrationStrategy::Interaction),
    ("interaction-", HydrationStrategy::Interaction),
    ("MediaQuery", HydrationStrategy::MediaQuery),
    ("media-query-", HydrationStrategy::MediaQuery),
    ("If", HydrationStrategy::If),
    ("if-", HydrationStrategy::If),
    ("Never", HydrationStrategy::Never),
    ("never-", HydrationStrategy::Never),
    ("Time", HydrationStrategy::Time),
    ("time-", HydrationStrategy::Time),
];

/// A component name as requested at a call site, split into its loader prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRequest<'s> {
    pub lazy: bool,
    /// Raw modifier text and the strategy it selects.
    pub modifier: Option<(&'s str, HydrationStrategy)>,
    pub name: &'s str,
}

pub fn parse_component_request(raw: &str) -> ComponentRequest<'_> {
    let (lazy, rest) = if let Some(rest) = raw.strip_prefix("lazy-") {
        (true, rest)
    } else {
        match raw.strip_prefix("Lazy") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => (true, rest),
            _ => (false, raw),
        }
    };
    if !lazy {
        return ComponentRequest {
            lazy,
            modifier: None,
            name: rest,
        };
    }
    match HYDRATION_MODIFIERS
        .iter()
        .find(|(prefix, _)| rest.starts_with(prefix))
    {
        Some(&(prefix, strategy)) => ComponentRequest {
            lazy,
            modifier: Some((prefix, strategy)),
            name: &rest[prefix.len()..],
        },
        None => ComponentRequest {
            lazy,
            modifier: None,
            name: rest,
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL SITE COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

struct ResolveCall {
    span: Span,
    name: String,
}

struct ResolveCallCollector<'f, 't> {
    cursor: ScopeCursor<'t>,
    filter: &'f NameFilter,
    calls: Vec<ResolveCall>,
    last_end: u32,
}

impl<'a, 'f, 't> Visit<'a> for ResolveCallCollector<'f, 't> {
    fn enter_scope(&mut self, flags: ScopeFlags, _scope_id: &Cell<Option<OxcScopeId>>) {
        self.cursor.enter_scope(flags);
    }

    fn leave_scope(&mut self) {
        self.cursor.exit_scope();
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(call) = parse_static_call(it, self.filter) {
            let shadowed = self
                .cursor
                .get_declaration(call.name)
                .is_some_and(|decl| decl.import().is_none());
            if let (None, false, Some(Argument::StringLiteral(lit))) =
                (call.namespace, shadowed, it.arguments.first())
            {
                if it.span.start >= self.last_end {
                    self.calls.push(ResolveCall {
                        span: it.span,
                        name: lit.value.as_str().to_string(),
                    });
                    self.last_end = it.span.end;
                }
            }
        }
        walk::walk_call_expression(self, it);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════════

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn gen_import(specifier: &str, name: &str, alias: Option<&str>) -> String {
    match alias {
        Some(alias) if alias != name => {
            format!("import {{ {} as {} }} from {}", name, alias, json_string(specifier))
        }
        _ => format!("import {{ {} }} from {}", name, json_string(specifier)),
    }
}

/// Per-file output state: identifiers handed out and the import lines to prepend.
#[derive(Default)]
struct LoaderOutput {
    counter: usize,
    identifiers: HashMap<usize, String>,
    imports: Vec<String>,
    seen: HashSet<String>,
}

impl LoaderOutput {
    fn add(&mut self, line: String) {
        if self.seen.insert(line.clone()) {
            self.imports.push(line);
        }
    }

    fn identifier_for(&mut self, index: usize) -> String {
        if let Some(identifier) = self.identifiers.get(&index) {
            return identifier.clone();
        }
        let identifier = format!("__nuxt_component_{}", self.counter);
        self.counter += 1;
        self.identifiers.insert(index, identifier.clone());
        identifier
    }
}

pub struct ComponentLoader<'r> {
    registry: &'r ComponentRegistry,
    options: &'r ComponentLoaderOptions,
    filter: NameFilter,
}

impl<'r> ComponentLoader<'r> {
    pub fn new(registry: &'r ComponentRegistry, options: &'r ComponentLoaderOptions) -> Self {
        Self {
            registry,
            options,
            filter: NameFilter::new(RESOLVE_COMPONENT_RE.clone()),
        }
    }

    /// Resolves a requested name: the plain name first, then modifier and name together.
    /// Returns the component index and whether the plain name matched.
    fn find(&self, request: &ComponentRequest<'_>) -> Option<(usize, bool)> {
        if let Some(index) = self.registry.find(request.name, self.options.mode) {
            return Some((index, true));
        }
        let (modifier, _) = request.modifier?;
        self.registry
            .find(&format!("{}{}", modifier, request.name), self.options.mode)
            .map(|index| (index, false))
    }

    fn emit(
        &self,
        out: &mut LoaderOutput,
        index: usize,
        component: &Component,
        request: &ComponentRequest<'_>,
        plain_match: bool,
        raw_name: &str,
    ) -> String {
        let mut identifier = out.identifier_for(index);

        let server_only = !component.raw
            && component.mode == ComponentMode::Server
            && !self
                .registry
                .has_variant(&component.pascal_name, ComponentMode::Client);
        if server_only {
            out.add(gen_import(
                &self.options.server_component_runtime,
                "createServerComponent",
                None,
            ));
            out.add(format!(
                "const {} = createServerComponent({})",
                identifier,
                json_string(&component.pascal_name)
            ));
            if !self.options.experimental_component_islands {
                warn!(
                    "Standalone server components (`{}`) are not yet supported without enabling `experimental.componentIslands`.",
                    raw_name
                );
            }
            return identifier;
        }

        let client_only = !component.raw && component.mode == ComponentMode::Client;
        if client_only {
            out.add(gen_import(&self.options.client_only_runtime, "createClientOnly", None));
            identifier.push_str("_client");
        }

        if !request.lazy {
            let export = if component.raw { "default" } else { component.export.as_str() };
            out.add(gen_import(&component.file_path, export, Some(&identifier)));
            if client_only {
                out.add(format!("const {0}_wrapped = createClientOnly({0})", identifier));
                identifier.push_str("_wrapped");
            }
            return identifier;
        }

        let dynamic_import = format!(
            "() => import({}).then(c => c.{} || c)",
            json_string(&component.file_path),
            component.export
        );
        let delayed = request.modifier.filter(|_| plain_match).map(|(_, s)| s);
        match delayed.map(HydrationStrategy::helper) {
            Some(Some((helper, suffix))) => {
                out.add(gen_import(&self.options.client_delayed_component_runtime, helper, None));
                identifier.push_str(suffix);
                out.add(format!("const {} = {}({})", identifier, helper, dynamic_import));
            }
            Some(None) => {
                out.add(gen_import("vue", "defineAsyncComponent", Some("__defineAsyncComponent")));
                identifier.push_str("_lazy_never");
                out.add(format!(
                    "const {} = __defineAsyncComponent({{loader: {}, hydrate: () => {{}}}})",
                    identifier, dynamic_import
                ));
            }
            None => {
                out.add(gen_import("vue", "defineAsyncComponent", Some("__defineAsyncComponent")));
                identifier.push_str("_lazy");
                let client_wrap = if client_only { ".then(c => createClientOnly(c))" } else { "" };
                out.add(format!(
                    "const {} = __defineAsyncComponent({}{})",
                    identifier, dynamic_import, client_wrap
                ));
            }
        }
        identifier
    }

    pub fn transform(&self, code: &str, id: &str) -> Result<TransformOutput, TransformError> {
        if !code.contains("resolveComponent") {
            return Ok(TransformOutput::Unchanged);
        }
        let block = ScriptBlock::locate(code, id);
        let allocator = Allocator::default();
        let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
        let program = module.program()?;
        let mut collector = ResolveCallCollector {
            cursor: module.scopes()?.cursor(),
            filter: &self.filter,
            calls: Vec::new(),
            last_end: 0,
        };
        collector.visit_program(program);

        let mut out = LoaderOutput::default();
        let mut splicer = TextSplicer::new(code);
        for call in collector.calls {
            let request = parse_component_request(&call.name);
            let Some((index, plain_match)) = self.find(&request) else {
                debug!("component `{}` is not registered; leaving it to the runtime", call.name);
                continue;
            };
            let Some(component) = self.registry.get(index) else {
                continue;
            };
            let identifier = self.emit(&mut out, index, component, &request, plain_match, &call.name);
            splicer.overwrite(
                block.offset + call.span.start as usize,
                block.offset + call.span.end as usize,
                identifier,
            )?;
        }

        if !out.imports.is_empty() {
            let mut intro = out.imports.join("\n");
            intro.push('\n');
            splicer.prepend(&intro);
        }
        Ok(splicer.into_output(id, self.options.sourcemap))
    }
}

/// One-off [`ComponentLoader`] over `code`.
pub fn resolve_components(
    code: &str,
    id: &str,
    registry: &ComponentRegistry,
    options: &ComponentLoaderOptions,
) -> Result<TransformOutput, TransformError> {
    ComponentLoader::new(registry, options).transform(code, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_component_request() {
        assert_eq!(
            parse_component_request("MyButton"),
            ComponentRequest { lazy: false, modifier: None, name: "MyButton" }
        );
        assert_eq!(
            parse_component_request("LazyMyButton"),
            ComponentRequest { lazy: true, modifier: None, name: "MyButton" }
        );
        assert_eq!(
            parse_component_request("lazy-my-button"),
            ComponentRequest { lazy: true, modifier: None, name: "my-button" }
        );
        assert_eq!(
            parse_component_request("LazyIdleMyButton"),
            ComponentRequest {
                lazy: true,
                modifier: Some(("Idle", HydrationStrategy::Idle)),
                name: "MyButton"
            }
        );
        assert_eq!(
            parse_component_request("lazy-media-query-chart").modifier,
            Some(("media-query-", HydrationStrategy::MediaQuery))
        );
        // `Lazy` must precede an uppercase letter
        assert!(!parse_component_request("Lazyload").lazy);
        // modifiers only follow the lazy prefix
        assert_eq!(parse_component_request("IdleBanner").name, "IdleBanner");
    }

    #[test]
    fn test_gen_import() {
        assert_eq!(
            gen_import("#app/components/client-only", "createClientOnly", None),
            "import { createClientOnly } from \"#app/components/client-only\""
        );
        assert_eq!(
            gen_import("/c/Foo.vue", "default", Some("__nuxt_component_0")),
            "import { default as __nuxt_component_0 } from \"/c/Foo.vue\""
        );
    }

    #[test]
    fn test_should_resolve_components() {
        assert!(should_resolve_components("/app/pages/index.vue"));
        assert!(should_resolve_components("/app/comp.tsx"));
        assert!(!should_resolve_components("/app/util.ts"));
    }
}

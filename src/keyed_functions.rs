//! # Keyed Function Key Injection
//!
//! Appends a deterministic cache-key literal to calls of registered keyed functions:
//!
//! ```text
//! import { useAsyncData } from '#app'
//! useAsyncData(() => $fetch('/api'))
//! // becomes
//! useAsyncData(() => $fetch('/api'), '$1f2e3d4c5b')
//! ```
//!
//! A call is only rewritten when its callee statically resolves to the registered source: through
//! a value import, a namespace import of that exact source, the file's own root-level exports, or
//! (for names with no binding at all) the auto-import table.

use oxc_ast::ast::{Argument, CallExpression, Program, Statement};
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::scope::{ScopeFlags, ScopeId as OxcScopeId};
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::collections::HashMap;
use tracing::debug;

use oxc_allocator::Allocator;

use crate::call_site::{parse_static_call, NameFilter, StaticCall};
use crate::config::TransformOptions;
use crate::error::TransformError;
use crate::exports::parse_static_export_identifiers;
use crate::imports::{
    clean_id, find_static_imports, process_imports, relative_to_root, strip_extension, AliasTable,
    ProcessedImports, SpecifierResolver,
};
use crate::naming::default_export_name;
use crate::parse::{ParsedModule, ScriptBlock};
use crate::registry::{KeyedFunction, KeyedFunctionRegistry};
use crate::scope::{Declaration, ImportedName, ScopeCursor};
use crate::splice::{TextSplicer, TransformOutput};

/// Length of the hex digest prefix used as key.
pub const KEY_HASH_LENGTH: usize = 10;

/// `'$' + first hex chars of sha256("{id}-{count}")`, without quotes.
pub fn generate_key(id: &str, count: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}", id, count).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("${}", &digest[..KEY_HASH_LENGTH])
}

fn is_generated_key(value: &str) -> bool {
    value.len() == KEY_HASH_LENGTH + 1
        && value.starts_with('$')
        && value[1..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Where a framework data function takes its explicit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyPosition {
    At(usize),
    Last,
}

/// Positions at which a string or template literal counts as a user-supplied key.
fn explicit_key_positions(name: &str) -> &'static [KeyPosition] {
    match name {
        "useState" => &[KeyPosition::At(0)],
        "useFetch" | "useLazyFetch" => &[KeyPosition::At(1)],
        "useAsyncData" | "useLazyAsyncData" => &[KeyPosition::At(0), KeyPosition::Last],
        _ => &[],
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Key injection configured for one build. Holds no per-file state.
pub struct KeyInjection<'r> {
    registry: &'r KeyedFunctionRegistry,
    options: &'r TransformOptions,
    aliases: AliasTable,
}

impl<'r> KeyInjection<'r> {
    pub fn new(registry: &'r KeyedFunctionRegistry, options: &'r TransformOptions) -> Self {
        Self {
            registry,
            options,
            aliases: AliasTable::new(&options.alias),
        }
    }

    /// Rewrites one module. The key counter starts at zero on every call.
    pub fn transform(&self, code: &str, id: &str) -> Result<TransformOutput, TransformError> {
        if self.registry.is_empty() || !self.registry.mentioned_in(code) {
            return Ok(TransformOutput::Unchanged);
        }
        let block = ScriptBlock::locate(code, id);
        let allocator = Allocator::default();
        let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
        let program = module.program()?;
        let scopes = module.scopes()?;

        let resolver = SpecifierResolver::new(&self.aliases, id);
        let imports = process_imports(&find_static_imports(block.content), &resolver);
        let file_id = strip_extension(clean_id(id)).to_string();
        let local_exports = self.local_exports(program, id, &file_id);
        let filter = self.local_filter(&imports, &local_exports);

        let context = FileContext {
            pass: self,
            resolver,
            imports,
            local_exports,
            file_id,
        };
        let mut injector = KeyInjector {
            context: &context,
            cursor: scopes.cursor(),
            filter: &filter,
            code,
            offset: block.offset,
            hash_id: relative_to_root(clean_id(id), self.options.root_dir.as_deref()),
            count: 0,
            insertions: Vec::new(),
        };
        injector.visit_program(program);

        let mut splicer = TextSplicer::new(code);
        for (pos, text) in injector.insertions {
            splicer.insert(pos, text)?;
        }
        Ok(splicer.into_output(id, self.options.sourcemap))
    }

    /// Local names of root-level exports that are themselves registered for this file, mapped to
    /// the registered function name.
    fn local_exports(&self, program: &Program<'_>, id: &str, file_id: &str) -> HashMap<String, String> {
        let mut locals = HashMap::new();
        if !self.registry.is_source(file_id) {
            return locals;
        }
        for stmt in &program.body {
            if !matches!(
                stmt,
                Statement::ExportNamedDeclaration(_)
                    | Statement::ExportDefaultDeclaration(_)
                    | Statement::TSExportAssignment(_)
            ) {
                continue;
            }
            for binding in parse_static_export_identifiers(stmt, None) {
                let function_name = if binding.exported_name == "default" {
                    Some(default_export_name(clean_id(id)))
                } else {
                    self.registry
                        .get(&binding.exported_name, file_id)
                        .map(|function| function.name.clone())
                };
                if let Some(function_name) = function_name {
                    locals.insert(binding.local_name, function_name);
                }
            }
        }
        locals
    }

    fn local_filter(
        &self,
        imports: &ProcessedImports,
        local_exports: &HashMap<String, String>,
    ) -> NameFilter {
        let mut names: Vec<String> = self.registry.names().map(str::to_string).collect();
        for (local, direct) in &imports.direct_imports {
            let function_name = imported_function_name(&direct.original_name, &direct.source);
            if self.registry.names().any(|name| name == function_name) {
                names.push(local.clone());
            }
        }
        names.extend(local_exports.keys().cloned());
        NameFilter::from_names(names)
    }
}

/// Rewrites `code` with a one-off [`KeyInjection`].
pub fn inject_keys(
    code: &str,
    id: &str,
    registry: &KeyedFunctionRegistry,
    options: &TransformOptions,
) -> Result<TransformOutput, TransformError> {
    KeyInjection::new(registry, options).transform(code, id)
}

fn imported_function_name(original_name: &str, source: &str) -> String {
    if original_name == "default" {
        default_export_name(source)
    } else {
        original_name.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PER-FILE RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

struct FileContext<'p, 'r> {
    pass: &'p KeyInjection<'r>,
    resolver: SpecifierResolver<'p>,
    imports: ProcessedImports,
    local_exports: HashMap<String, String>,
    file_id: String,
}

impl<'p, 'r> FileContext<'p, 'r> {
    fn registry(&self) -> &'r KeyedFunctionRegistry {
        self.pass.registry
    }

    fn lookup(&self, call: &StaticCall<'_, '_>, source: &str) -> Option<&'r KeyedFunction> {
        let local = call.name;
        // a namespace member is the export name itself; local bindings of that name are unrelated
        if call.namespace.is_some() {
            return self.registry().get(local, source);
        }
        if let Some(exported) = self.local_exports.get(local) {
            return self.registry().get(exported, source);
        }
        if let Some(direct) = self.imports.direct_imports.get(local) {
            let name = imported_function_name(&direct.original_name, &direct.source);
            return self.registry().get(&name, source);
        }
        self.registry().get(local, source)
    }

    fn is_local_export(&self, call: &StaticCall<'_, '_>, decl: Option<&Declaration>) -> bool {
        call.namespace.is_none()
            && self.local_exports.contains_key(call.name)
            && decl.is_some_and(|d| d.scope.is_root())
    }

    /// Names with no binding in scope may still be auto-imported. This is the only path that can
    /// reach sourceless registry entries.
    fn auto_imported_function(&self, name: &str) -> Option<&'r KeyedFunction> {
        let source = self.pass.options.auto_imports.get(name)?;
        let resolved = self.resolver.resolve(source);
        self.registry()
            .get(name, &resolved)
            .or_else(|| self.registry().get_sourceless(name))
    }

    /// The registered function this direct or namespaced call site resolves to, if any.
    fn resolve(&self, call: &StaticCall<'_, '_>, decl: Option<&Declaration>) -> Option<&'r KeyedFunction> {
        let source = if self.is_local_export(call, decl) {
            self.file_id.clone()
        } else if let Some(import) = decl.and_then(Declaration::value_import) {
            self.resolver.resolve(&import.source)
        } else if decl.is_none() && call.namespace.is_none() {
            let function = self.auto_imported_function(call.name)?;
            if exceeds_arguments(call, function) {
                return None;
            }
            return Some(function);
        } else {
            return None;
        };

        let function = self.lookup(call, &source)?;
        match call.namespace {
            None => {
                if exceeds_arguments(call, function) {
                    return None;
                }
                let imported_ok = decl
                    .and_then(Declaration::value_import)
                    .is_some_and(|import| match import.imported {
                        ImportedName::Named(ref imported) => function.export_name == *imported,
                        ImportedName::Default => function.export_name == "default",
                        ImportedName::Namespace => false,
                    });
                (imported_ok || self.is_local_export(call, decl)).then_some(function)
            }
            Some(namespace) => {
                let is_namespace_import = decl
                    .and_then(Declaration::value_import)
                    .is_some_and(|import| import.imported == ImportedName::Namespace);
                (is_namespace_import && self.imports.has_namespace(&source, namespace))
                    .then_some(function)
            }
        }
    }

    /// Explicit-key rule for the framework's own data functions, by registered name.
    fn has_explicit_key(&self, call: &StaticCall<'_, '_>, function: &KeyedFunction) -> bool {
        let last = call.argument_count().checked_sub(1);
        explicit_key_positions(&function.name).iter().any(|position| {
            let index = match *position {
                KeyPosition::At(index) => Some(index),
                KeyPosition::Last => last,
            };
            index.is_some_and(|index| call.has_literal_argument_at(index))
        })
    }
}

/// The call already passes every argument the function accepts.
fn exceeds_arguments(call: &StaticCall<'_, '_>, function: &KeyedFunction) -> bool {
    call.argument_count() >= function.argument_length && !call.has_spread()
}

fn ends_with_generated_key(call: &CallExpression<'_>) -> bool {
    matches!(
        call.arguments.last(),
        Some(Argument::StringLiteral(lit)) if is_generated_key(lit.value.as_str())
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

struct KeyInjector<'c, 'p, 'r, 't> {
    context: &'c FileContext<'p, 'r>,
    cursor: ScopeCursor<'t>,
    filter: &'c NameFilter,
    /// Full module text; call spans are relative to the script block at `offset`.
    code: &'c str,
    offset: usize,
    hash_id: &'c str,
    count: usize,
    insertions: Vec<(usize, String)>,
}

impl<'c, 'p, 'r, 't> KeyInjector<'c, 'p, 'r, 't> {
    fn process(&mut self, call: &StaticCall<'_, '_>) {
        let decl = self.cursor.get_declaration(call.binding_name());
        let Some(function) = self.context.resolve(call, decl) else {
            debug!("skipping `{}`: not a keyed function at this call site", call.name);
            return;
        };
        if self.context.has_explicit_key(call, function) || ends_with_generated_key(call.call) {
            return;
        }

        let start = self.offset + call.call.span.start as usize;
        let end = self.offset + call.call.span.end as usize;
        let bytes = self.code.as_bytes();
        // last non-whitespace character before the closing paren
        let mut i = end.saturating_sub(2);
        while i > start && bytes[i].is_ascii_whitespace() {
            i -= 1;
        }
        let ends_with_comma = bytes.get(i) == Some(&b',');

        self.count += 1;
        let separator = if call.argument_count() > 0 && !ends_with_comma {
            ", "
        } else {
            ""
        };
        let key = generate_key(self.hash_id, self.count);
        self.insertions
            .push((end - 1, format!("{}'{}'", separator, key)));
    }
}

impl<'a, 'c, 'p, 'r, 't> Visit<'a> for KeyInjector<'c, 'p, 'r, 't> {
    fn enter_scope(&mut self, flags: ScopeFlags, _scope_id: &Cell<Option<OxcScopeId>>) {
        self.cursor.enter_scope(flags);
    }

    fn leave_scope(&mut self) {
        self.cursor.exit_scope();
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Some(call) = parse_static_call(it, self.filter) {
            self.process(&call);
        }
        walk::walk_call_expression(self, it);
    }
}

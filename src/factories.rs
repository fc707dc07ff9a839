//! # Keyed Function Factories
//!
//! Two phases over the whole build:
//!
//! 1. **Scan**: every file is checked for root-level exports created by a registered factory
//!    (`export const useFetch = createUseFetch()`). Each one becomes a new keyed-function entry
//!    for the file that exports it.
//! 2. **Rewrite**: runs after every scan finished. The same call sites get their factory
//!    placeholder swapped for the real implementation:
//!    `createUseFetch()` becomes `createUseFetch.__nuxt_factory()`.
//!
//! Both phases share [`FactoryPass::find_factory_calls`], so a call is rewritten exactly when it
//! was scanned.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, ChainElement, Declaration as AstDeclaration, ExportDefaultDeclarationKind,
    Expression, ModuleExportName, Program, Statement, VariableDeclaration,
};
use oxc_span::Span;
use std::collections::HashSet;
use tracing::{debug, error};

use crate::call_site::{parse_static_call, CalleeNode, NameFilter, StaticCall};
use crate::config::{KeyedFunctionEntry, TransformOptions};
use crate::error::TransformError;
use crate::imports::{
    clean_id, find_static_imports, process_imports, AliasTable, ProcessedImports,
    SpecifierResolver,
};
use crate::naming::default_export_name;
use crate::parse::{ParsedModule, ScriptBlock};
use crate::registry::{FactoryRegistry, ResolvedFactory};
use crate::scope::{DeclarationKind, ImportedName, ScopeId, ScopeTracker};
use crate::splice::{TextSplicer, TransformOutput};

/// A factory call whose result is exported.
#[derive(Debug, Clone)]
pub struct FactoryCall<'r> {
    /// Name the produced function is exported under.
    pub function_name: String,
    /// Local name of the factory at the call site.
    pub factory_name: String,
    pub namespace: Option<String>,
    /// Callee node, relative to the parsed script.
    pub node: CalleeNode,
    pub factory: &'r ResolvedFactory,
}

/// Only plain `factory()` / `factory?.()` initializers count; `await`, parentheses around the
/// call and other wrappers do not.
fn direct_call<'n, 'a>(expr: &'n Expression<'a>, filter: &NameFilter) -> Option<StaticCall<'n, 'a>> {
    match expr {
        Expression::CallExpression(call) => parse_static_call(call, filter),
        Expression::ChainExpression(chain) => match &chain.expression {
            ChainElement::CallExpression(call) => parse_static_call(call, filter),
            _ => None,
        },
        _ => None,
    }
}

/// Root `const`/`let`/`var` declaration (plain or behind `export`) with the given span.
pub(crate) fn root_variable_declaration<'n, 'a>(
    program: &'n Program<'a>,
    span: Span,
) -> Option<&'n VariableDeclaration<'a>> {
    program.body.iter().find_map(|stmt| match stmt {
        Statement::VariableDeclaration(var) if var.span == span => Some(&**var),
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            Some(AstDeclaration::VariableDeclaration(var)) if var.span == span => Some(&**var),
            _ => None,
        },
        _ => None,
    })
}

struct Candidate {
    function_name: String,
    factory_name: String,
    namespace: Option<String>,
    node: CalleeNode,
}

impl Candidate {
    fn new(function_name: &str, call: &StaticCall<'_, '_>) -> Self {
        Self {
            function_name: function_name.to_string(),
            factory_name: call.name.to_string(),
            namespace: call.namespace.map(str::to_string),
            node: call.node,
        }
    }
}

/// Factory call candidates of one root statement, before source resolution.
fn parse_factory_exports(
    stmt: &Statement<'_>,
    program: &Program<'_>,
    scopes: &ScopeTracker,
    filter: &NameFilter,
    id: &str,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    match stmt {
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            // export const useFetch = createUseFetch()
            Some(AstDeclaration::VariableDeclaration(var)) => {
                for declarator in &var.declarations {
                    let (BindingPattern::BindingIdentifier(binding), Some(init)) =
                        (&declarator.id, &declarator.init)
                    else {
                        continue;
                    };
                    if let Some(call) = direct_call(init, filter) {
                        out.push(Candidate::new(binding.name.as_str(), &call));
                    }
                }
            }
            Some(_) => {}
            // const useFetch = createUseFetch(); export { useFetch }
            None if export.source.is_none() => {
                for spec in &export.specifiers {
                    let (ModuleExportName::IdentifierReference(local), ModuleExportName::IdentifierName(exported)) =
                        (&spec.local, &spec.exported)
                    else {
                        continue;
                    };
                    let Some(decl) = scopes.get_declaration_from(ScopeId::ROOT, local.name.as_str()) else {
                        continue;
                    };
                    if !matches!(decl.kind, DeclarationKind::Variable(_)) {
                        continue;
                    }
                    let Some(var) = root_variable_declaration(program, decl.node_span) else {
                        continue;
                    };
                    for declarator in &var.declarations {
                        let (BindingPattern::BindingIdentifier(binding), Some(init)) =
                            (&declarator.id, &declarator.init)
                        else {
                            continue;
                        };
                        if binding.name.as_str() != local.name.as_str() {
                            continue;
                        }
                        if let Some(call) = direct_call(init, filter) {
                            let function_name = match exported.name.as_str() {
                                "default" => default_export_name(clean_id(id)),
                                name => name.to_string(),
                            };
                            out.push(Candidate::new(&function_name, &call));
                        }
                    }
                }
            }
            None => {}
        },
        // export default createUseFetch()
        Statement::ExportDefaultDeclaration(export) => {
            if let ExportDefaultDeclarationKind::CallExpression(call) = &export.declaration {
                if let Some(call) = parse_static_call(call, filter) {
                    out.push(Candidate::new(&default_export_name(clean_id(id)), &call));
                }
            }
        }
        _ => {}
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS
// ═══════════════════════════════════════════════════════════════════════════════

pub struct FactoryPass<'r> {
    registry: &'r FactoryRegistry,
    options: &'r TransformOptions,
    aliases: AliasTable,
}

impl<'r> FactoryPass<'r> {
    pub fn new(registry: &'r FactoryRegistry, options: &'r TransformOptions) -> Self {
        Self {
            registry,
            options,
            aliases: AliasTable::new(&options.alias),
        }
    }

    fn local_filter(&self, imports: &ProcessedImports) -> NameFilter {
        let mut names: Vec<&str> = self.registry.names().collect();
        for (local, direct) in &imports.direct_imports {
            if self.registry.get(&direct.original_name).is_some() {
                names.push(local);
            }
        }
        NameFilter::from_names(names)
    }

    /// The registered factory a candidate call refers to, or `None` when the binding is something
    /// else: an import of another export or module, a default import used as a namespace, or a
    /// local declaration.
    ///
    /// A bare name with no binding at all must be a registered factory, since only those pass the
    /// call-site filter; anything else is reported as [`TransformError::MissingFactoryMetadata`].
    fn resolve_candidate(
        &self,
        candidate: &Candidate,
        scopes: &ScopeTracker,
        resolver: &SpecifierResolver<'_>,
        id: &str,
    ) -> Result<Option<&'r ResolvedFactory>, TransformError> {
        let binding = candidate.namespace.as_deref().unwrap_or(&candidate.factory_name);
        let decl = scopes.get_declaration_from(ScopeId::ROOT, binding);
        let Some(decl) = decl else {
            if candidate.namespace.is_some() {
                return Ok(None);
            }
            let Some(factory) = self.registry.get(&candidate.factory_name) else {
                error!(
                    "[nuxt] No factory function found for `{}` in file `{}`",
                    candidate.function_name, id
                );
                return Err(TransformError::MissingFactoryMetadata {
                    name: candidate.function_name.clone(),
                    file: id.to_string(),
                });
            };
            let auto_imported = self
                .options
                .auto_imports
                .get(&factory.name)
                .is_some_and(|source| resolver.resolve(source) == factory.source);
            return Ok(auto_imported.then_some(factory));
        };

        let Some(import) = decl.value_import() else {
            return Ok(None);
        };
        let factory = match (&candidate.namespace, &import.imported) {
            (None, ImportedName::Named(imported)) => self.registry.get(imported),
            (Some(_), ImportedName::Namespace) => self.registry.get(&candidate.factory_name),
            _ => None,
        };
        Ok(factory.filter(|factory| resolver.resolve(&import.source) == factory.source))
    }

    /// Every exported factory call in `program` whose factory resolves to its registered source.
    pub fn find_factory_calls(
        &self,
        program: &Program<'_>,
        scopes: &ScopeTracker,
        script: &str,
        id: &str,
    ) -> Result<Vec<FactoryCall<'r>>, TransformError> {
        let resolver = SpecifierResolver::new(&self.aliases, id);
        let imports = process_imports(&find_static_imports(script), &resolver);
        let filter = self.local_filter(&imports);

        let mut calls = Vec::new();
        for stmt in &program.body {
            for candidate in parse_factory_exports(stmt, program, scopes, &filter, id) {
                let Some(factory) = self.resolve_candidate(&candidate, scopes, &resolver, id)? else {
                    debug!(
                        "`{}` in `{}` is not created by an imported or auto-imported factory; skipping",
                        candidate.function_name, id
                    );
                    continue;
                };
                calls.push(FactoryCall {
                    function_name: candidate.function_name,
                    factory_name: candidate.factory_name,
                    namespace: candidate.namespace,
                    node: candidate.node,
                    factory,
                });
            }
        }
        Ok(calls)
    }

    /// Scan phase: the keyed functions `code` exports through registered factories.
    pub fn scan(&self, code: &str, id: &str) -> Result<Vec<KeyedFunctionEntry>, TransformError> {
        if self.registry.is_empty() || !self.registry.mentioned_in(code) {
            return Ok(Vec::new());
        }
        let block = ScriptBlock::locate(code, id);
        let allocator = Allocator::default();
        let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
        let calls = self.find_factory_calls(module.program()?, module.scopes()?, block.content, id)?;
        Ok(calls
            .into_iter()
            .map(|call| {
                KeyedFunctionEntry::new(&call.function_name, clean_id(id), call.factory.argument_length)
            })
            .collect())
    }

    /// Rewrite phase: points every scanned factory call at its real implementation.
    pub fn rewrite(&self, code: &str, id: &str) -> Result<TransformOutput, TransformError> {
        if self.registry.is_empty() || !self.registry.mentioned_in(code) {
            return Ok(TransformOutput::Unchanged);
        }
        let block = ScriptBlock::locate(code, id);
        let allocator = Allocator::default();
        let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
        let calls = self.find_factory_calls(module.program()?, module.scopes()?, block.content, id)?;

        let marker = &self.options.factory_marker;
        let mut splicer = TextSplicer::new(code);
        let mut seen = HashSet::new();
        for call in calls {
            let span = call.node.span();
            if !seen.insert(span) {
                continue;
            }
            let start = block.offset + span.start as usize;
            let end = block.offset + span.end as usize;
            let optional = code[end..].starts_with("?.");
            match call.node {
                CalleeNode::Identifier(_) | CalleeNode::Property(_) => {
                    let name = &code[start..end];
                    if optional {
                        // createUseFetch?.() -> createUseFetch?.__nuxt_factory()
                        splicer.overwrite(start, end + 2, format!("{}?.{}", name, marker))?;
                    } else {
                        splicer.overwrite(start, end, format!("{}.{}", name, marker))?;
                    }
                }
                CalleeNode::Wrapped(_) | CalleeNode::ComputedMember(_) => {
                    if optional {
                        splicer.insert(end + 2, marker.clone())?;
                    } else {
                        splicer.insert(end, format!(".{}", marker))?;
                    }
                }
            }
        }
        Ok(splicer.into_output(id, self.options.sourcemap))
    }
}

/// Scan phase for one file with a one-off [`FactoryPass`].
pub fn scan_factories(
    code: &str,
    id: &str,
    registry: &FactoryRegistry,
    options: &TransformOptions,
) -> Result<Vec<KeyedFunctionEntry>, TransformError> {
    FactoryPass::new(registry, options).scan(code, id)
}

/// Rewrite phase for one file with a one-off [`FactoryPass`].
pub fn rewrite_factory_macros(
    code: &str,
    id: &str,
    registry: &FactoryRegistry,
    options: &TransformOptions,
) -> Result<TransformOutput, TransformError> {
    FactoryPass::new(registry, options).rewrite(code, id)
}

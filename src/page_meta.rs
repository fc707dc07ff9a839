//! `definePageMeta` extraction.
//!
//! A page's `?macro=true` sub-request is replaced by a standalone module that only evaluates the
//! macro argument. Root-level imports, variables, functions and classes the argument refers to
//! are hoisted along with it, transitively.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{AwaitExpression, CallExpression, Expression, IdentifierReference, Program};
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::{ScopeFlags, ScopeId as OxcScopeId};
use regex::Regex;
use std::cell::Cell;
use std::collections::HashSet;
use tracing::error;

use crate::config::PageMetaOptions;
use crate::error::TransformError;
use crate::factories::root_variable_declaration;
use crate::imports::clean_id;
use crate::parse::{ParsedModule, ScriptBlock};
use crate::scope::{Declaration, DeclarationKind, ScopeCursor};
use crate::splice::{TextSplicer, TransformOutput};

pub const PAGE_META_MACRO: &str = "definePageMeta";

lazy_static! {
    static ref HAS_MACRO_RE: Regex = Regex::new(r"\bdefinePageMeta\s*\(\s*").unwrap();
}

const CODE_EMPTY: &str = "
const __nuxt_page_meta = null
export default __nuxt_page_meta
";

const CODE_DEV_EMPTY: &str = "
const __nuxt_page_meta = {}
export default __nuxt_page_meta
";

const CODE_HMR: &str = "
// Vite
if (import.meta.hot) {
  import.meta.hot.accept(mod => {
    Object.assign(__nuxt_page_meta, mod)
  })
}
// webpack
if (import.meta.webpackHot) {
  import.meta.webpackHot.accept((err) => {
    if (err) { window.location = window.location.href }
  })
}";

fn empty_module(options: &PageMetaOptions) -> String {
    if options.dev {
        format!("{}{}", CODE_DEV_EMPTY, CODE_HMR)
    } else {
        CODE_EMPTY.to_string()
    }
}

fn contains(outer: Span, inner: Span) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

fn slice(script: &str, span: Span) -> &str {
    &script[span.start as usize..span.end as usize]
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// An identifier use and the declaration it resolves to, if any.
struct Reference<'t> {
    span: Span,
    declaration: Option<&'t Declaration>,
}

struct MacroCollector<'t> {
    cursor: ScopeCursor<'t>,
    references: Vec<Reference<'t>>,
    /// First argument of every macro call, in source order.
    calls: Vec<Option<Span>>,
}

impl<'a, 't> Visit<'a> for MacroCollector<'t> {
    fn enter_scope(&mut self, flags: ScopeFlags, _scope_id: &Cell<Option<OxcScopeId>>) {
        self.cursor.enter_scope(flags);
    }

    fn leave_scope(&mut self) {
        self.cursor.exit_scope();
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.references.push(Reference {
            span: it.span,
            declaration: self.cursor.get_declaration(it.name.as_str()),
        });
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee {
            if callee.name.as_str() == PAGE_META_MACRO {
                self.calls.push(it.arguments.first().map(|arg| arg.span()));
            }
        }
        walk::walk_call_expression(self, it);
    }
}

#[derive(Default)]
struct AwaitFinder {
    found: bool,
}

impl<'a> Visit<'a> for AwaitFinder {
    fn visit_await_expression(&mut self, _it: &AwaitExpression<'a>) {
        self.found = true;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOISTING
// ═══════════════════════════════════════════════════════════════════════════════

struct Hoister<'s, 'n, 'a, 't> {
    script: &'s str,
    program: &'n Program<'a>,
    references: &'n [Reference<'t>],
    id: &'s str,
    imports: Vec<&'s str>,
    declarations: Vec<Span>,
    visited: HashSet<Span>,
}

impl<'s, 'n, 'a, 't> Hoister<'s, 'n, 'a, 't> {
    /// Hoists whatever the code inside `within` refers to but does not declare itself.
    fn hoist_references(&mut self, within: Span) -> Result<(), TransformError> {
        let references = self.references;
        for reference in references.iter().filter(|r| contains(within, r.span)) {
            let Some(declaration) = reference.declaration else {
                continue;
            };
            if contains(within, declaration.span) {
                continue;
            }
            self.hoist(declaration)?;
        }
        Ok(())
    }

    fn hoist(&mut self, declaration: &Declaration) -> Result<(), TransformError> {
        match declaration.kind {
            DeclarationKind::Import(_) => {
                let statement = slice(self.script, declaration.node_span).trim();
                if !self.imports.contains(&statement) {
                    self.imports.push(statement);
                }
                Ok(())
            }
            _ if !declaration.scope.is_root() => Ok(()),
            DeclarationKind::Variable(_) => {
                if !self.visited.insert(declaration.node_span) {
                    return Ok(());
                }
                if let Some(var) = root_variable_declaration(self.program, declaration.node_span) {
                    let mut finder = AwaitFinder::default();
                    finder.visit_variable_declaration(var);
                    if finder.found {
                        error!(
                            "Await expressions are not supported in definePageMeta. File: '{}'",
                            self.id
                        );
                        return Err(TransformError::AwaitInMacro {
                            macro_name: PAGE_META_MACRO.to_string(),
                            file: clean_id(self.id).to_string(),
                        });
                    }
                }
                self.declarations.push(declaration.node_span);
                self.hoist_references(declaration.node_span)
            }
            DeclarationKind::Function | DeclarationKind::Class => {
                if !self.visited.insert(declaration.node_span) {
                    return Ok(());
                }
                self.declarations.push(declaration.node_span);
                self.hoist_references(declaration.node_span)
            }
            DeclarationKind::FunctionParam => Ok(()),
        }
    }

    fn finish(mut self, meta: &str, dev: bool) -> String {
        self.declarations.sort_by_key(|span| span.start);
        let declarations: Vec<&str> = self
            .declarations
            .iter()
            .map(|span| slice(self.script, *span))
            .collect();
        let module = format!(
            "const __nuxt_page_meta = {}\nexport default __nuxt_page_meta{}",
            meta,
            if dev { CODE_HMR } else { "" }
        );
        [self.imports.join("\n"), declarations.join("\n"), module]
            .join("\n")
            .trim()
            .to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Replaces a page module with the module exporting its `definePageMeta` argument.
pub fn extract_page_meta(
    code: &str,
    id: &str,
    options: &PageMetaOptions,
    sourcemap: bool,
) -> Result<TransformOutput, TransformError> {
    let mut splicer = TextSplicer::new(code);

    if !HAS_MACRO_RE.is_match(code)
        && !code.contains("export { default }")
        && !code.contains("__nuxt_page_meta")
    {
        if code.is_empty() {
            error!("The file `{}` is not a valid page as it has no content.", clean_id(id));
            splicer.insert(0, empty_module(options))?;
        } else {
            splicer.overwrite(0, code.len(), empty_module(options))?;
        }
        return Ok(splicer.into_output(id, sourcemap));
    }

    let block = ScriptBlock::locate(code, id);
    let allocator = Allocator::default();
    let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
    let program = module.program()?;
    let scopes = module.scopes()?;

    let mut collector = MacroCollector {
        cursor: scopes.cursor(),
        references: Vec::new(),
        calls: Vec::new(),
    };
    collector.visit_program(program);

    if collector.calls.len() > 1 {
        error!(
            "Multiple `definePageMeta` calls are not supported. File: {}",
            clean_id(id)
        );
        return Err(TransformError::AmbiguousMacro {
            macro_name: PAGE_META_MACRO.to_string(),
            file: clean_id(id).to_string(),
        });
    }

    if let Some(Some(meta)) = collector.calls.first().copied() {
        let mut hoister = Hoister {
            script: block.content,
            program,
            references: &collector.references,
            id,
            imports: Vec::new(),
            declarations: Vec::new(),
            visited: HashSet::new(),
        };
        hoister.hoist_references(meta)?;
        let extracted = hoister.finish(slice(block.content, meta), options.dev);
        splicer.overwrite(0, code.len(), extracted)?;
    } else if !code.contains("__nuxt_page_meta") {
        splicer.overwrite(0, code.len(), empty_module(options))?;
    }
    Ok(splicer.into_output(id, sourcemap))
}

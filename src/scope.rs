//! # Scope Tracker
//!
//! Single-file lexical scope model built in two passes over one oxc `Program`:
//!
//! 1. [`DeclarationCollector`] walks the whole program once and records every binding
//!    (variables, functions, classes, imports, parameters) in the scope that owns it.
//!    Scope ids are assigned in walk order.
//! 2. The tracker is frozen. Each consuming pass then opens a [`ScopeCursor`] and forwards its
//!    `enter_scope`/`leave_scope` hooks to it. Because the consuming walk visits the same scopes in
//!    the same order, the cursor replays the ids of pass 1 and lookups see the complete table,
//!    including declarations that appear textually after the position being queried.
//!
//! Consuming visitors must always walk into children so the replay stays aligned.

use oxc_ast::ast::{
    BindingPattern, CatchParameter, Class, ClassType, FormalParameters, Function, FunctionType,
    ImportDeclaration, ImportDeclarationSpecifier, ImportOrExportKind, ModuleExportName, Program,
    TSTypeAnnotation, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast::ast::ArrowFunctionExpression;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::{ScopeFlags, ScopeId as OxcScopeId};
use std::cell::Cell;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The `Program` scope is always entered first.
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
    Using,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedName {
    Named(String),
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Raw module specifier as written.
    pub source: String,
    pub imported: ImportedName,
    pub type_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    Variable(VariableKind),
    Function,
    Class,
    Import(ImportBinding),
    FunctionParam,
}

/// One lexical binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub scope: ScopeId,
    /// Span of the binding identifier.
    pub span: Span,
    /// Span of the declaring node (variable declaration, function, class, import statement).
    pub node_span: Span,
}

impl Declaration {
    pub fn import(&self) -> Option<&ImportBinding> {
        match &self.kind {
            DeclarationKind::Import(binding) => Some(binding),
            _ => None,
        }
    }

    /// Value import, `import type` bindings excluded.
    pub fn value_import(&self) -> Option<&ImportBinding> {
        self.import().filter(|binding| !binding.type_only)
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    flags: ScopeFlags,
    declarations: HashMap<String, Declaration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeTrackerOptions {
    /// Keep declarations of exited scopes queryable. Required for the replay pass.
    pub preserve_exited_scopes: bool,
}

#[derive(Debug)]
pub struct ScopeTracker {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
    frozen: bool,
    options: ScopeTrackerOptions,
}

impl Default for ScopeTracker {
    fn default() -> Self {
        Self::new(ScopeTrackerOptions {
            preserve_exited_scopes: true,
        })
    }
}

impl ScopeTracker {
    pub fn new(options: ScopeTrackerOptions) -> Self {
        Self {
            scopes: Vec::new(),
            stack: Vec::new(),
            frozen: false,
            options,
        }
    }

    /// Collects every declaration of `program` and freezes the result.
    pub fn collect(program: &Program<'_>) -> Self {
        let mut tracker = ScopeTracker::default();
        DeclarationCollector::new(&mut tracker).visit_program(program);
        tracker.freeze();
        tracker
    }

    pub fn enter_scope(&mut self, flags: ScopeFlags) -> ScopeId {
        assert!(!self.frozen, "scope tracker is frozen; use a ScopeCursor to replay scopes");
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: self.stack.last().copied(),
            flags,
            declarations: HashMap::new(),
        });
        self.stack.push(id);
        id
    }

    pub fn exit_scope(&mut self) {
        if let Some(id) = self.stack.pop() {
            if !self.options.preserve_exited_scopes {
                self.scopes[id.index()].declarations.clear();
            }
        }
    }

    pub fn current_scope(&self) -> Option<ScopeId> {
        self.stack.last().copied()
    }

    /// Registers `declaration` in its scope. The first declaration of a name in a scope wins,
    /// except that a local declaration replaces an import of the same name.
    ///
    /// # Panics
    ///
    /// When called after [`ScopeTracker::freeze`]. Declaring into a frozen table is a bug in the
    /// calling pass, not a property of the input.
    pub fn declare(&mut self, declaration: Declaration) {
        assert!(
            !self.frozen,
            "cannot declare `{}` after the scope tracker has been frozen",
            declaration.name
        );
        let scope = &mut self.scopes[declaration.scope.index()];
        let replace = match scope.declarations.get(&declaration.name) {
            Some(existing) => existing.import().is_some() && declaration.import().is_none(),
            None => true,
        };
        if replace {
            scope.declarations.insert(declaration.name.clone(), declaration);
        }
    }

    /// Nearest scope on the stack that `var` and function-body bindings hoist to.
    pub fn hoist_target(&self) -> Option<ScopeId> {
        self.stack.iter().rev().copied().find(|id| {
            self.scopes[id.index()].flags.intersects(
                ScopeFlags::Top | ScopeFlags::Function | ScopeFlags::ClassStaticBlock,
            )
        })
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
        self.stack.clear();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Lookup from the innermost entered scope.
    pub fn get_declaration(&self, name: &str) -> Option<&Declaration> {
        let from = self.current_scope().unwrap_or(ScopeId::ROOT);
        self.get_declaration_from(from, name)
    }

    /// Walks the parent chain starting at `scope`.
    pub fn get_declaration_from(&self, scope: ScopeId, name: &str) -> Option<&Declaration> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id.index())?;
            if let Some(decl) = scope.declarations.get(name) {
                return Some(decl);
            }
            current = scope.parent;
        }
        None
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.index()).and_then(|s| s.parent)
    }

    /// True when `scope` is `ancestor` or nested inside it.
    pub fn is_within(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_of(id);
        }
        false
    }

    pub fn cursor(&self) -> ScopeCursor<'_> {
        ScopeCursor {
            tracker: self,
            stack: Vec::new(),
            next: 0,
        }
    }
}

/// Replays the scope ids of a frozen tracker during a second walk.
#[derive(Debug)]
pub struct ScopeCursor<'t> {
    tracker: &'t ScopeTracker,
    stack: Vec<ScopeId>,
    next: u32,
}

impl<'t> ScopeCursor<'t> {
    pub fn enter_scope(&mut self, flags: ScopeFlags) {
        let id = ScopeId(self.next);
        self.next += 1;
        debug_assert!(
            self.tracker
                .scopes
                .get(id.index())
                .is_some_and(|s| s.flags == flags),
            "scope replay diverged at {id:?}"
        );
        self.stack.push(id);
    }

    pub fn exit_scope(&mut self) {
        self.stack.pop();
    }

    pub fn current_scope(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::ROOT)
    }

    pub fn get_declaration(&self, name: &str) -> Option<&'t Declaration> {
        self.tracker.get_declaration_from(self.current_scope(), name)
    }

    pub fn tracker(&self) -> &'t ScopeTracker {
        self.tracker
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATION COLLECTOR (pass 1)
// ═══════════════════════════════════════════════════════════════════════════════

/// Binding names of a pattern, without descending into nested functions or type annotations.
#[derive(Default)]
struct PatternNames {
    names: Vec<(String, Span)>,
}

impl PatternNames {
    fn of_pattern(pattern: &BindingPattern<'_>) -> Vec<(String, Span)> {
        let mut collector = PatternNames::default();
        collector.visit_binding_pattern(pattern);
        collector.names
    }
}

impl<'a> Visit<'a> for PatternNames {
    fn visit_binding_identifier(&mut self, it: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.names.push((it.name.as_str().to_string(), it.span));
    }

    fn visit_function(&mut self, _it: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _it: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, _it: &Class<'a>) {}

    fn visit_ts_type_annotation(&mut self, _it: &TSTypeAnnotation<'a>) {}
}

pub struct DeclarationCollector<'t> {
    tracker: &'t mut ScopeTracker,
}

impl<'t> DeclarationCollector<'t> {
    pub fn new(tracker: &'t mut ScopeTracker) -> Self {
        Self { tracker }
    }

    fn declare_in(&mut self, scope: Option<ScopeId>, name: String, kind: DeclarationKind, span: Span, node_span: Span) {
        let scope = scope.unwrap_or(ScopeId::ROOT);
        self.tracker.declare(Declaration {
            name,
            kind,
            scope,
            span,
            node_span,
        });
    }
}

fn module_export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.as_str().to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.as_str().to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.as_str().to_string(),
    }
}

impl<'a, 't> Visit<'a> for DeclarationCollector<'t> {
    fn enter_scope(&mut self, flags: ScopeFlags, _scope_id: &Cell<Option<OxcScopeId>>) {
        self.tracker.enter_scope(flags);
    }

    fn leave_scope(&mut self) {
        self.tracker.exit_scope();
    }

    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        let source = it.source.value.as_str().to_string();
        let decl_is_type = matches!(it.import_kind, ImportOrExportKind::Type);
        if let Some(specifiers) = &it.specifiers {
            for spec in specifiers {
                let (local, imported, spec_is_type) = match spec {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => (
                        &s.local,
                        ImportedName::Named(module_export_name(&s.imported)),
                        matches!(s.import_kind, ImportOrExportKind::Type),
                    ),
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        (&s.local, ImportedName::Default, false)
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        (&s.local, ImportedName::Namespace, false)
                    }
                };
                let binding = ImportBinding {
                    source: source.clone(),
                    imported,
                    type_only: decl_is_type || spec_is_type,
                };
                self.declare_in(
                    Some(ScopeId::ROOT),
                    local.name.as_str().to_string(),
                    DeclarationKind::Import(binding),
                    local.span,
                    it.span,
                );
            }
        }
        walk::walk_import_declaration(self, it);
    }

    fn visit_variable_declaration(&mut self, it: &VariableDeclaration<'a>) {
        let (kind, scope) = match it.kind {
            VariableDeclarationKind::Var => (VariableKind::Var, self.tracker.hoist_target()),
            VariableDeclarationKind::Let => (VariableKind::Let, self.tracker.current_scope()),
            VariableDeclarationKind::Const => (VariableKind::Const, self.tracker.current_scope()),
            _ => (VariableKind::Using, self.tracker.current_scope()),
        };
        for declarator in &it.declarations {
            for (name, span) in PatternNames::of_pattern(&declarator.id) {
                self.declare_in(scope, name, DeclarationKind::Variable(kind), span, it.span);
            }
        }
        walk::walk_variable_declaration(self, it);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        if matches!(it.r#type, FunctionType::FunctionDeclaration) {
            if let Some(id) = &it.id {
                // Function declarations are block scoped in modules; the enclosing scope owns them.
                let scope = self.tracker.current_scope();
                self.declare_in(
                    scope,
                    id.name.as_str().to_string(),
                    DeclarationKind::Function,
                    id.span,
                    it.span,
                );
            }
        }
        walk::walk_function(self, it, flags);
    }

    fn visit_formal_parameters(&mut self, it: &FormalParameters<'a>) {
        let scope = self.tracker.current_scope();
        let mut names = PatternNames::default();
        names.visit_formal_parameters(it);
        for (name, span) in names.names {
            self.declare_in(scope, name, DeclarationKind::FunctionParam, span, it.span);
        }
        walk::walk_formal_parameters(self, it);
    }

    fn visit_catch_parameter(&mut self, it: &CatchParameter<'a>) {
        let scope = self.tracker.current_scope();
        for (name, span) in PatternNames::of_pattern(&it.pattern) {
            self.declare_in(
                scope,
                name,
                DeclarationKind::Variable(VariableKind::Let),
                span,
                it.span,
            );
        }
        walk::walk_catch_parameter(self, it);
    }

    fn visit_class(&mut self, it: &Class<'a>) {
        if matches!(it.r#type, ClassType::ClassDeclaration) {
            if let Some(id) = &it.id {
                let scope = self.tracker.current_scope();
                self.declare_in(
                    scope,
                    id.name.as_str().to_string(),
                    DeclarationKind::Class,
                    id.span,
                    it.span(),
                );
            }
        }
        walk::walk_class(self, it);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn collect(code: &str) -> ScopeTracker {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::default().with_module(true).with_typescript(true)).parse();
        assert!(ret.errors.is_empty());
        ScopeTracker::collect(&ret.program)
    }

    #[test]
    fn test_import_declared_at_root() {
        let tracker = collect("import { useKey as k } from '#app'\nimport * as ns from 'x'\n");
        let decl = tracker.get_declaration_from(ScopeId::ROOT, "k").unwrap();
        assert_eq!(
            decl.import(),
            Some(&ImportBinding {
                source: "#app".to_string(),
                imported: ImportedName::Named("useKey".to_string()),
                type_only: false,
            })
        );
        let ns = tracker.get_declaration_from(ScopeId::ROOT, "ns").unwrap();
        assert_eq!(ns.import().unwrap().imported, ImportedName::Namespace);
    }

    #[test]
    fn test_type_import_marked() {
        let tracker = collect("import type { A } from 'a'\nimport { type B, c } from 'b'\n");
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "A").unwrap().value_import().is_none());
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "B").unwrap().value_import().is_none());
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "c").unwrap().value_import().is_some());
    }

    #[test]
    fn test_var_hoists_to_function_scope() {
        // scopes: 0 program, 1 function, 2 if-block
        let tracker = collect("function f() { if (a) { var x = 1; let y = 2 } }");
        let x = tracker.get_declaration_from(ScopeId(1), "x").unwrap();
        assert_eq!(x.scope, ScopeId(1));
        assert!(tracker.get_declaration_from(ScopeId(1), "y").is_none());
        assert!(tracker.get_declaration_from(ScopeId(2), "y").is_some());
        let f = tracker.get_declaration_from(ScopeId::ROOT, "f").unwrap();
        assert_eq!(f.kind, DeclarationKind::Function);
    }

    #[test]
    fn test_params_shadow_outer() {
        let tracker = collect("import { useKey } from '#app'\nfunction f(useKey, { a, b: [c] }, ...rest) {}");
        let inner = tracker.get_declaration_from(ScopeId(1), "useKey").unwrap();
        assert_eq!(inner.kind, DeclarationKind::FunctionParam);
        for name in ["a", "c", "rest"] {
            assert_eq!(
                tracker.get_declaration_from(ScopeId(1), name).unwrap().kind,
                DeclarationKind::FunctionParam
            );
        }
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "useKey").unwrap().import().is_some());
    }

    #[test]
    fn test_later_declaration_visible_in_same_scope() {
        let tracker = collect("function f() { useKey(); const useKey = () => {} }");
        let decl = tracker.get_declaration_from(ScopeId(1), "useKey").unwrap();
        assert_eq!(decl.kind, DeclarationKind::Variable(VariableKind::Const));
    }

    #[test]
    fn test_local_declaration_replaces_import() {
        let tracker = collect("import { useKey } from '#app'\nuseKey()\nfunction useKey() {}\n");
        let decl = tracker.get_declaration_from(ScopeId::ROOT, "useKey").unwrap();
        assert_eq!(decl.kind, DeclarationKind::Function);

        // between two local declarations the first still wins
        let tracker = collect("var a = 1\nvar a = 2\n");
        let decl = tracker.get_declaration_from(ScopeId::ROOT, "a").unwrap();
        assert_eq!(decl.node_span.start, 0);
    }

    #[test]
    fn test_type_annotation_params_not_declared() {
        let tracker = collect("const f: (x: number) => void = () => {}");
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "x").is_none());
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "f").is_some());
    }

    #[test]
    fn test_class_and_catch() {
        let tracker = collect("class A {}\ntry {} catch (err) {}");
        assert_eq!(
            tracker.get_declaration_from(ScopeId::ROOT, "A").unwrap().kind,
            DeclarationKind::Class
        );
        assert!(tracker.get_declaration_from(ScopeId::ROOT, "err").is_none());
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_declare_after_freeze_panics() {
        let mut tracker = collect("const a = 1");
        tracker.declare(Declaration {
            name: "b".to_string(),
            kind: DeclarationKind::Function,
            scope: ScopeId::ROOT,
            span: Span::default(),
            node_span: Span::default(),
        });
    }

    #[test]
    fn test_exited_scopes_cleared_without_preserve() {
        let mut tracker = ScopeTracker::new(ScopeTrackerOptions::default());
        let root = tracker.enter_scope(ScopeFlags::Top);
        let inner = tracker.enter_scope(ScopeFlags::Function);
        tracker.declare(Declaration {
            name: "x".to_string(),
            kind: DeclarationKind::FunctionParam,
            scope: inner,
            span: Span::default(),
            node_span: Span::default(),
        });
        assert!(tracker.get_declaration("x").is_some());
        tracker.exit_scope();
        assert!(tracker.get_declaration_from(inner, "x").is_none());
        assert!(tracker.is_within(inner, root));
    }
}

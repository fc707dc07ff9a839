//! # Static Call-Site Parser
//!
//! Reduces a call expression to `{name, namespace, node}` when its callee is statically known.
//! Transforms only ever consume [`StaticCall`]; new callee syntax is added here and nowhere else.
//!
//! Accepted callee shapes:
//! - `foo()`
//! - `(foo)()`, `(foo as T)()`, `(<T>foo)()`, `foo!()` and nestings of those
//! - `ns.foo()`, `ns['foo']()`, `(ns).foo()`, `(ns as T)['foo']()`
//! - any of the above behind optional chaining (`foo?.()`, `ns?.foo()`)
//!
//! Everything else (`a.b.c()`, `ns[key]()`, `` ns[`foo`]() ``, `(a || b)()`, `f.bind(x)()`) is not
//! static and yields `None`.

use oxc_ast::ast::{Argument, CallExpression, ChainElement, Expression};
use oxc_span::{GetSpan, Span};
use regex::Regex;

/// Predicate on the resolved simple name of a callee.
///
/// Always tested with `Regex::is_match`, which keeps no state between calls.
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Option<Regex>,
}

impl NameFilter {
    pub fn new(regex: Regex) -> Self {
        Self { regex: Some(regex) }
    }

    /// Exact-match filter over a set of names. An empty set matches nothing.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut escaped: Vec<String> = names
            .into_iter()
            .map(|name| regex::escape(name.as_ref()))
            .collect();
        if escaped.is_empty() {
            return Self { regex: None };
        }
        escaped.sort();
        escaped.dedup();
        let pattern = format!("^(?:{})$", escaped.join("|"));
        Self {
            regex: Regex::new(&pattern).ok(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }
}

/// The node a rewrite should target for a static call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeNode {
    /// `foo()`: the identifier.
    Identifier(Span),
    /// `(foo)()`, `foo!()`, `(ns.foo)()`: the whole wrapped callee.
    Wrapped(Span),
    /// `ns.foo()`: the property identifier `foo`.
    Property(Span),
    /// `ns['foo']()`: the whole member expression.
    ComputedMember(Span),
}

impl CalleeNode {
    pub fn span(&self) -> Span {
        match *self {
            CalleeNode::Identifier(span)
            | CalleeNode::Wrapped(span)
            | CalleeNode::Property(span)
            | CalleeNode::ComputedMember(span) => span,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StaticCall<'n, 'a> {
    pub name: &'n str,
    pub namespace: Option<&'n str>,
    pub node: CalleeNode,
    pub call: &'n CallExpression<'a>,
}

impl<'n, 'a> StaticCall<'n, 'a> {
    /// The identifier the scope lookup starts from: the namespace for member calls.
    pub fn binding_name(&self) -> &'n str {
        self.namespace.unwrap_or(self.name)
    }

    pub fn has_spread(&self) -> bool {
        self.call
            .arguments
            .iter()
            .any(|arg| matches!(arg, Argument::SpreadElement(_)))
    }

    pub fn argument_count(&self) -> usize {
        self.call.arguments.len()
    }

    /// True when the argument at `index` is a string or template literal.
    pub fn has_literal_argument_at(&self, index: usize) -> bool {
        matches!(
            self.call.arguments.get(index),
            Some(Argument::StringLiteral(_)) | Some(Argument::TemplateLiteral(_))
        )
    }
}

/// Strips parentheses and TypeScript-only wrappers.
pub fn strip_wrappers<'n, 'a>(mut expr: &'n Expression<'a>) -> &'n Expression<'a> {
    loop {
        expr = match expr {
            Expression::ParenthesizedExpression(e) => &e.expression,
            Expression::TSAsExpression(e) => &e.expression,
            Expression::TSSatisfiesExpression(e) => &e.expression,
            Expression::TSTypeAssertion(e) => &e.expression,
            Expression::TSNonNullExpression(e) => &e.expression,
            _ => return expr,
        };
    }
}

fn wrapped_identifier<'n>(expr: &'n Expression<'_>) -> Option<&'n str> {
    match strip_wrappers(expr) {
        Expression::Identifier(id) => Some(id.name.as_str()),
        _ => None,
    }
}

fn callee_shape<'n>(callee: &'n Expression<'_>) -> Option<(&'n str, Option<&'n str>, CalleeNode)> {
    match callee {
        Expression::Identifier(id) => Some((id.name.as_str(), None, CalleeNode::Identifier(id.span))),
        Expression::StaticMemberExpression(member) => {
            let namespace = wrapped_identifier(&member.object)?;
            Some((
                member.property.name.as_str(),
                Some(namespace),
                CalleeNode::Property(member.property.span),
            ))
        }
        Expression::ComputedMemberExpression(member) => {
            let namespace = wrapped_identifier(&member.object)?;
            let Expression::StringLiteral(lit) = &member.expression else {
                return None;
            };
            Some((
                lit.value.as_str(),
                Some(namespace),
                CalleeNode::ComputedMember(member.span),
            ))
        }
        Expression::ParenthesizedExpression(_)
        | Expression::TSAsExpression(_)
        | Expression::TSSatisfiesExpression(_)
        | Expression::TSTypeAssertion(_)
        | Expression::TSNonNullExpression(_) => match strip_wrappers(callee) {
            Expression::Identifier(id) => {
                Some((id.name.as_str(), None, CalleeNode::Wrapped(callee.span())))
            }
            inner @ (Expression::StaticMemberExpression(_)
            | Expression::ComputedMemberExpression(_)) => {
                let (name, namespace, _) = callee_shape(inner)?;
                Some((name, namespace, CalleeNode::Wrapped(callee.span())))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Static descriptor of `call`, if its callee is one of the accepted shapes and its name passes
/// `filter`.
pub fn parse_static_call<'n, 'a>(
    call: &'n CallExpression<'a>,
    filter: &NameFilter,
) -> Option<StaticCall<'n, 'a>> {
    let (name, namespace, node) = callee_shape(&call.callee)?;
    if !filter.matches(name) {
        return None;
    }
    Some(StaticCall {
        name,
        namespace,
        node,
        call,
    })
}

/// Like [`parse_static_call`] but starting from an arbitrary expression: parentheses, type
/// wrappers, `await` and optional chaining around the call are looked through.
pub fn parse_static_function_call<'n, 'a>(
    expr: &'n Expression<'a>,
    filter: &NameFilter,
) -> Option<StaticCall<'n, 'a>> {
    let mut current = expr;
    loop {
        current = match strip_wrappers(current) {
            Expression::AwaitExpression(e) => &e.argument,
            Expression::CallExpression(call) => return parse_static_call(call, filter),
            Expression::ChainExpression(chain) => match &chain.expression {
                ChainElement::CallExpression(call) => return parse_static_call(call, filter),
                _ => return None,
            },
            _ => return None,
        };
    }
}

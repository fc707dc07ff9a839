//! Lazy-hydration template pre-pass.
//!
//! `<LazyFoo hydrate-on-idle>` in an SFC template is renamed to `<LazyIdleFoo hydrate-on-idle>`
//! (closing tag included) so the component loader later picks the delayed-hydration wrapper.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use regex::Regex;
use tracing::warn;

use crate::components::HydrationStrategy;
use crate::error::TransformError;
use crate::naming::{camel_case, pascal_case};
use crate::parse::{is_vue, script_blocks, ParsedModule};
use crate::registry::ComponentRegistry;
use crate::scope::{ScopeId, ScopeTracker};
use crate::splice::{TextSplicer, TransformOutput};

lazy_static! {
    static ref TEMPLATE_RE: Regex = Regex::new(r"<template>([\s\S]*)</template>").unwrap();
    static ref LAZY_HYDRATION_PROPS_RE: Regex = Regex::new(
        r"\b(?:hydrate-on-idle|hydrateOnIdle|hydrate-on-visible|hydrateOnVisible|hydrate-on-interaction|hydrateOnInteraction|hydrate-on-media-query|hydrateOnMediaQuery|hydrate-after|hydrateAfter|hydrate-when|hydrateWhen|hydrate-never|hydrateNever)\b"
    )
    .unwrap();
}

fn strategy_for_prop(prop: &str) -> Option<HydrationStrategy> {
    match prop {
        "hydrateOnIdle" => Some(HydrationStrategy::Idle),
        "hydrateOnVisible" => Some(HydrationStrategy::Visible),
        "hydrateOnInteraction" => Some(HydrationStrategy::Interaction),
        "hydrateOnMediaQuery" => Some(HydrationStrategy::MediaQuery),
        "hydrateAfter" => Some(HydrationStrategy::Time),
        "hydrateWhen" => Some(HydrationStrategy::If),
        "hydrateNever" => Some(HydrationStrategy::Never),
        _ => None,
    }
}

fn strip_lazy_prefix(name: &str) -> Option<&str> {
    name.strip_prefix("Lazy").or_else(|| name.strip_prefix("lazy-"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAG SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// One element of the template, offsets relative to the template text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    name: String,
    /// Start of the tag name in the opening tag.
    name_start: usize,
    attributes: Vec<String>,
    /// Start of the tag name in the matching closing tag.
    closing_name_start: Option<usize>,
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':')
}

/// Minimal HTML tag scanner: opening tags with their attribute names, paired with closing tags.
/// Quoted attribute values may contain `>`.
fn scan_elements(template: &str) -> Vec<Element> {
    let bytes = template.as_bytes();
    let mut elements: Vec<Element> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if template[i..].starts_with("<!--") {
            i = template[i..].find("-->").map_or(bytes.len(), |end| i + end + 3);
            continue;
        }
        if bytes.get(i + 1) == Some(&b'/') {
            let name_start = i + 2;
            let mut j = name_start;
            while j < bytes.len() && is_name_char(bytes[j]) {
                j += 1;
            }
            let name = &template[name_start..j];
            if let Some(pos) = open.iter().rposition(|&e| elements[e].name == name) {
                let element = open[pos];
                open.truncate(pos);
                elements[element].closing_name_start = Some(name_start);
            }
            i = template[j..].find('>').map_or(bytes.len(), |end| j + end + 1);
            continue;
        }
        if !bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic()) {
            i += 1;
            continue;
        }

        let name_start = i + 1;
        let mut j = name_start;
        while j < bytes.len() && is_name_char(bytes[j]) {
            j += 1;
        }
        let name = template[name_start..j].to_string();
        let mut attributes = Vec::new();
        let mut self_closing = false;
        while j < bytes.len() {
            match bytes[j] {
                b'>' => {
                    j += 1;
                    break;
                }
                b'/' if bytes.get(j + 1) == Some(&b'>') => {
                    self_closing = true;
                    j += 2;
                    break;
                }
                b if b.is_ascii_whitespace() => j += 1,
                _ => {
                    let attr_start = j;
                    while j < bytes.len()
                        && !bytes[j].is_ascii_whitespace()
                        && !matches!(bytes[j], b'=' | b'>')
                        && !(bytes[j] == b'/' && bytes.get(j + 1) == Some(&b'>'))
                    {
                        j += 1;
                    }
                    attributes.push(template[attr_start..j].to_string());
                    if bytes.get(j) == Some(&b'=') {
                        j += 1;
                        match bytes.get(j) {
                            Some(&quote @ (b'"' | b'\'')) => {
                                j = template[j + 1..]
                                    .find(quote as char)
                                    .map_or(bytes.len(), |end| j + 1 + end + 1);
                            }
                            _ => {
                                while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                                    j += 1;
                                }
                            }
                        }
                    }
                }
            }
        }

        let index = elements.len();
        elements.push(Element {
            name,
            name_start,
            attributes,
            closing_name_start: None,
        });
        if !self_closing {
            open.push(index);
        }
        i = j;
    }
    elements
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Root-scope bindings of every `<script>` block. Blocks that fail to parse contribute nothing.
fn script_root_scopes(code: &str, id: &str) -> Vec<ScopeTracker> {
    script_blocks(code)
        .into_iter()
        .filter_map(|block| {
            let allocator = Allocator::default();
            let module = ParsedModule::new(&allocator, block.content, id, block.lang.as_deref());
            let program = module.program().ok()?;
            Some(ScopeTracker::collect(program))
        })
        .collect()
}

pub fn transform_lazy_hydration(
    code: &str,
    id: &str,
    registry: &ComponentRegistry,
    sourcemap: bool,
) -> Result<TransformOutput, TransformError> {
    if !is_vue(id) {
        return Ok(TransformOutput::Unchanged);
    }
    let Some(template) = TEMPLATE_RE.captures(code).and_then(|caps| caps.get(0)) else {
        return Ok(TransformOutput::Unchanged);
    };
    if !LAZY_HYDRATION_PROPS_RE.is_match(template.as_str()) {
        return Ok(TransformOutput::Unchanged);
    }
    let offset = template.start();
    let scripts = script_root_scopes(code, id);
    let mut splicer = TextSplicer::new(code);

    for element in scan_elements(template.as_str()) {
        if scripts
            .iter()
            .any(|scopes| scopes.get_declaration_from(ScopeId::ROOT, &element.name).is_some())
        {
            continue;
        }
        let lazy_rest = strip_lazy_prefix(&element.name);
        let pascal_name = pascal_case(lazy_rest.unwrap_or(&element.name));
        if !registry.contains(&pascal_name) {
            continue;
        }

        let mut strategy = None;
        for attr in &element.attributes {
            let prop = camel_case(attr.strip_prefix(':').unwrap_or(attr));
            if let Some(found) = strategy_for_prop(&prop) {
                if strategy.is_some() {
                    warn!("Multiple hydration strategies are not supported in the same component");
                } else {
                    strategy = Some(found);
                }
            }
        }
        let Some(strategy) = strategy else {
            continue;
        };
        if lazy_rest.is_none() {
            if element.name != "template" {
                warn!(
                    "Component `<{}>` (used in `{}`) has lazy-hydration props but is not declared as a lazy component.\nRename it to `<Lazy{} />` or remove the lazy-hydration props to avoid unexpected behavior.",
                    element.name,
                    id,
                    pascal_case(&element.name)
                );
            }
            continue;
        }

        let new_name = format!("Lazy{}{}", strategy.as_str(), pascal_name);
        let start = offset + element.name_start;
        splicer.overwrite(start, start + element.name.len(), new_name.clone())?;
        if let Some(closing) = element.closing_name_start {
            let start = offset + closing;
            splicer.overwrite(start, start + element.name.len(), new_name)?;
        }
    }
    Ok(splicer.into_output(id, sourcemap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Component, ComponentMode};

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(vec![
            Component::new("MyChart", "/c/MyChart.vue", ComponentMode::All),
            Component::new("Plain", "/c/Plain.vue", ComponentMode::All),
        ])
    }

    fn run(code: &str) -> String {
        transform_lazy_hydration(code, "/app/page.vue", &registry(), false)
            .unwrap()
            .code_or(code)
            .to_string()
    }

    #[test]
    fn test_scan_elements_pairs_tags() {
        let elements = scan_elements("<div a=\"x > y\"><LazyFoo :b='1'/><span>t</span></div>");
        let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["div", "LazyFoo", "span"]);
        assert_eq!(elements[0].attributes, vec!["a".to_string()]);
        assert_eq!(elements[1].attributes, vec![":b".to_string()]);
        assert!(elements[0].closing_name_start.is_some());
        assert!(elements[1].closing_name_start.is_none());
    }

    #[test]
    fn test_renames_lazy_component_with_strategy() {
        let out = run("<template><LazyMyChart hydrate-on-idle>x</LazyMyChart></template>");
        assert_eq!(
            out,
            "<template><LazyIdleMyChart hydrate-on-idle>x</LazyIdleMyChart></template>"
        );
    }

    #[test]
    fn test_kebab_and_dynamic_props() {
        let out = run("<template><lazy-my-chart :hydrate-after=\"500\" /></template>");
        assert_eq!(out, "<template><LazyTimeMyChart :hydrate-after=\"500\" /></template>");
    }

    #[test]
    fn test_first_strategy_wins() {
        let out = run("<template><LazyMyChart hydrate-on-visible hydrate-never /></template>");
        assert!(out.contains("<LazyVisibleMyChart"));
    }

    #[test]
    fn test_skips_unregistered_and_non_lazy() {
        let code = "<template><LazyOther hydrate-on-idle /><Plain hydrate-on-idle /></template>";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_skips_components_declared_in_script() {
        let code = "<script setup>\nimport LazyMyChart from './chart'\n</script>\n<template><LazyMyChart hydrate-on-idle /></template>";
        assert_eq!(run(code), code);
    }

    #[test]
    fn test_without_hydration_props_unchanged() {
        let out = transform_lazy_hydration(
            "<template><LazyMyChart /></template>",
            "/app/page.vue",
            &registry(),
            false,
        )
        .unwrap();
        assert!(!out.is_changed());
    }
}

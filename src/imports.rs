//! # Static import analysis
//!
//! Text-level scan of `import` statements plus the specifier resolution rules every pass
//! compares sources with: alias expansion, relative joining and extension stripping.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

lazy_static! {
    static ref STATIC_IMPORT_RE: Regex = Regex::new(
        r#"(?m)(?:^|[;}])[ \t]*import\s*(?:(?P<clause>[\w\s$*{},]+?)\s*from\s*)?["'](?P<specifier>[^"'\n]+)["']"#
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedImport {
    pub imported: String,
    pub local: String,
}

/// One `import` statement as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportRecord {
    /// Raw specifier, before alias resolution.
    pub specifier: String,
    pub default_import: Option<String>,
    pub namespace_import: Option<String>,
    pub named_imports: Vec<NamedImport>,
    pub type_only: bool,
    pub start: usize,
    pub end: usize,
}

/// Finds every static import in `code`. Statements that do not look like a well-formed
/// import are skipped, never reported.
pub fn find_static_imports(code: &str) -> Vec<ImportRecord> {
    let mut records = Vec::new();
    for caps in STATIC_IMPORT_RE.captures_iter(code) {
        let Some(specifier) = caps.name("specifier") else {
            continue;
        };
        let (Some(whole), clause) = (caps.get(0), caps.name("clause")) else {
            continue;
        };
        let start = whole.as_str().find("import").map_or(whole.start(), |i| whole.start() + i);
        let mut record = match clause {
            Some(clause) => match parse_import_clause(clause.as_str()) {
                Some(record) => record,
                None => continue,
            },
            None => ImportRecord::default(),
        };
        record.specifier = specifier.as_str().to_string();
        record.start = start;
        record.end = whole.end();
        records.push(record);
    }
    records
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn parse_import_clause(clause: &str) -> Option<ImportRecord> {
    let mut record = ImportRecord::default();
    let mut rest = clause.trim();

    // `import type from 'x'` imports a default named `type`
    if let Some(stripped) = rest.strip_prefix("type") {
        if stripped.starts_with(char::is_whitespace) && !stripped.trim_start().starts_with(',') {
            record.type_only = true;
            rest = stripped.trim_start();
        }
    }

    if !rest.starts_with('{') && !rest.starts_with('*') {
        let (default, remainder) = match rest.find(',') {
            Some(idx) => (rest[..idx].trim(), rest[idx + 1..].trim()),
            None => (rest, ""),
        };
        if !is_identifier(default) {
            return None;
        }
        record.default_import = Some(default.to_string());
        rest = remainder;
    }

    if let Some(ns) = rest.strip_prefix('*') {
        let mut words = ns.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("as"), Some(local), None) if is_identifier(local) => {
                record.namespace_import = Some(local.to_string());
            }
            _ => return None,
        }
    } else if let Some(inner) = rest.strip_prefix('{') {
        let inner = inner.strip_suffix('}')?;
        for item in inner.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let words: Vec<&str> = item.split_whitespace().collect();
            if words.len() > 1 && words[0] == "type" {
                continue;
            }
            let named = match words.as_slice() {
                [name] => NamedImport {
                    imported: name.to_string(),
                    local: name.to_string(),
                },
                [imported, "as", local] => NamedImport {
                    imported: imported.to_string(),
                    local: local.to_string(),
                },
                _ => return None,
            };
            if !is_identifier(&named.local) {
                return None;
            }
            record.named_imports.push(named);
        }
    } else if !rest.is_empty() {
        return None;
    }

    Some(record)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPECIFIER RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Alias prefixes, longest first so `#app/composables` beats `#app`.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

impl AliasTable {
    pub fn new(aliases: &BTreeMap<String, String>) -> Self {
        let mut entries: Vec<(String, String)> = aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    pub fn resolve(&self, specifier: &str) -> String {
        for (alias, target) in &self.entries {
            if let Some(rest) = specifier.strip_prefix(alias.as_str()) {
                if rest.is_empty() || rest.starts_with('/') || alias.ends_with('/') {
                    let target = target.trim_end_matches('/');
                    let rest = rest.trim_start_matches('/');
                    return if rest.is_empty() {
                        target.to_string()
                    } else {
                        format!("{target}/{rest}")
                    };
                }
            }
        }
        specifier.to_string()
    }
}

/// Drops a trailing lowercase extension from the last path segment.
pub fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) => {
            let ext = &path[segment_start + dot + 1..];
            if !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_lowercase()) {
                &path[..segment_start + dot]
            } else {
                path
            }
        }
        None => path,
    }
}

/// Module id without bundler query (`?vue&type=script`).
pub fn clean_id(id: &str) -> &str {
    id.split('?').next().unwrap_or(id)
}

fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn join_normalized(base: &str, relative: &str) -> String {
    let absolute = base.starts_with('/');
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Path of `file` relative to `root`, or `file` itself when it is outside `root`.
pub fn relative_to_root<'a>(file: &'a str, root: Option<&str>) -> &'a str {
    let Some(root) = root else {
        return file;
    };
    let root = root.trim_end_matches('/');
    match file.strip_prefix(root) {
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => file,
    }
}

/// Turns import specifiers into the comparison key used against registry sources.
#[derive(Debug, Clone)]
pub struct SpecifierResolver<'t> {
    aliases: &'t AliasTable,
    importer_dir: String,
}

impl<'t> SpecifierResolver<'t> {
    pub fn new(aliases: &'t AliasTable, importer: &str) -> Self {
        Self {
            aliases,
            importer_dir: dirname(clean_id(importer)).to_string(),
        }
    }

    pub fn resolve(&self, specifier: &str) -> String {
        let aliased = self.aliases.resolve(specifier);
        let joined = if (aliased.starts_with("./") || aliased.starts_with("../"))
            && !self.importer_dir.is_empty()
        {
            join_normalized(&self.importer_dir, &aliased)
        } else {
            aliased
        };
        strip_extension(&joined).to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSED IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectImport {
    /// Exported name in the source module, `default` for default imports.
    pub original_name: String,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedImports {
    pub direct_imports: HashMap<String, DirectImport>,
    /// Resolved source to the local names that hold the whole module (namespace or default).
    pub namespaces: HashMap<String, HashSet<String>>,
}

impl ProcessedImports {
    pub fn has_namespace(&self, source: &str, local: &str) -> bool {
        self.namespaces
            .get(source)
            .is_some_and(|locals| locals.contains(local))
    }
}

pub fn process_imports(records: &[ImportRecord], resolver: &SpecifierResolver) -> ProcessedImports {
    let mut processed = ProcessedImports::default();
    for record in records.iter().filter(|r| !r.type_only) {
        let source = resolver.resolve(&record.specifier);
        for named in &record.named_imports {
            processed.direct_imports.insert(
                named.local.clone(),
                DirectImport {
                    original_name: named.imported.clone(),
                    source: source.clone(),
                },
            );
        }
        if let Some(default) = &record.default_import {
            processed.direct_imports.insert(
                default.clone(),
                DirectImport {
                    original_name: "default".to_string(),
                    source: source.clone(),
                },
            );
            processed
                .namespaces
                .entry(source.clone())
                .or_default()
                .insert(default.clone());
        }
        if let Some(ns) = &record.namespace_import {
            processed
                .namespaces
                .entry(source.clone())
                .or_default()
                .insert(ns.clone());
        }
    }
    processed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> AliasTable {
        let mut map = BTreeMap::new();
        map.insert("#app".to_string(), "/nuxt/app".to_string());
        map.insert("#app/composables".to_string(), "/nuxt/app/composables".to_string());
        map.insert("~".to_string(), "/project".to_string());
        AliasTable::new(&map)
    }

    #[test]
    fn test_find_static_imports_shapes() {
        let code = r#"
import { useAsyncData, useFetch as fetchIt } from '#app'
import def, * as ns from "./mod.ts"
import Foo, { bar } from 'foo'
import type { T } from 'types'
import 'side-effect'
const lazy = import('dynamic')
"#;
        let records = find_static_imports(code);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].specifier, "#app");
        assert_eq!(
            records[0].named_imports[1],
            NamedImport {
                imported: "useFetch".to_string(),
                local: "fetchIt".to_string()
            }
        );
        assert_eq!(records[1].default_import.as_deref(), Some("def"));
        assert_eq!(records[1].namespace_import.as_deref(), Some("ns"));
        assert_eq!(records[2].named_imports[0].local, "bar");
        assert!(records[3].type_only);
        assert_eq!(records[4].specifier, "side-effect");
        assert!(records[4].named_imports.is_empty());
    }

    #[test]
    fn test_inline_type_specifier_is_skipped() {
        let records = find_static_imports("import { type A, b } from 'x'\n");
        assert_eq!(records[0].named_imports.len(), 1);
        assert_eq!(records[0].named_imports[0].local, "b");
    }

    #[test]
    fn test_malformed_import_is_omitted() {
        let records = find_static_imports("import { a as } from 'x'\nimport { ok } from 'y'\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].specifier, "y");
    }

    #[test]
    fn test_alias_resolution_prefers_longest() {
        let table = aliases();
        assert_eq!(table.resolve("#app"), "/nuxt/app");
        assert_eq!(table.resolve("#app/composables/fetch"), "/nuxt/app/composables/fetch");
        assert_eq!(table.resolve("~/utils"), "/project/utils");
        assert_eq!(table.resolve("#application"), "#application");
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("#app/composables/fetch.ts"), "#app/composables/fetch");
        assert_eq!(strip_extension("/a/b.c/d"), "/a/b.c/d");
        assert_eq!(strip_extension("/a/Comp.VUE"), "/a/Comp.VUE");
    }

    #[test]
    fn test_specifier_resolver_compares_equal() {
        let table = aliases();
        let resolver = SpecifierResolver::new(&table, "/project/composables/index.ts?macro=true");
        assert_eq!(
            resolver.resolve("#app/composables/fetch"),
            resolver.resolve("#app/composables/fetch.ts")
        );
        assert_eq!(resolver.resolve("./fetch.ts"), "/project/composables/fetch");
        assert_eq!(resolver.resolve("../utils/x"), "/project/utils/x");
    }

    #[test]
    fn test_process_imports() {
        let table = aliases();
        let resolver = SpecifierResolver::new(&table, "/project/app.vue");
        let records = find_static_imports(
            "import { useKey as k } from '#app'\nimport * as ns from '#app/composables/fetch.ts'\nimport d from '~/d'\n",
        );
        let processed = process_imports(&records, &resolver);
        assert_eq!(
            processed.direct_imports["k"],
            DirectImport {
                original_name: "useKey".to_string(),
                source: "/nuxt/app".to_string()
            }
        );
        assert!(processed.has_namespace("/nuxt/app/composables/fetch", "ns"));
        assert!(processed.has_namespace("/project/d", "d"));
        assert_eq!(processed.direct_imports["d"].original_name, "default");
    }

    #[test]
    fn test_relative_to_root() {
        assert_eq!(relative_to_root("/root/app/a.ts", Some("/root/")), "app/a.ts");
        assert_eq!(relative_to_root("/other/a.ts", Some("/root")), "/other/a.ts");
        assert_eq!(relative_to_root("/other/a.ts", None), "/other/a.ts");
    }
}

//! Parse Module
//!
//! Locates the script to analyze inside a module id (whole file, or the first `<script>` block of
//! an SFC), picks the oxc dialect, and memoizes the parse and the frozen scope table so the
//! declaration pass and the rewrite pass share one AST.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::cell::OnceCell;

use crate::error::TransformError;
use crate::imports::clean_id;
use crate::scope::ScopeTracker;

lazy_static! {
    /// First capture: attributes. Second capture: content.
    static ref SCRIPT_REGEX: Regex = Regex::new(r"(?is)<script\b([^>]*)>([\s\S]*?)</script>").unwrap();

    static ref LANG_ATTR_REGEX: Regex =
        Regex::new(r#"(?i)\blang\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+))"#).unwrap();

    static ref FRAMEWORK_NODE_MODULES_RE: Regex =
        Regex::new(r"node_modules[\\/](?:nuxt|nuxt3|nuxt-nightly|@nuxt)[\\/]").unwrap();

    static ref SCRIPT_EXTENSION_RE: Regex =
        Regex::new(r"\.(?:[cm]?[jt]sx?|vue)$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE FILTER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_vue(id: &str) -> bool {
    clean_id(id).ends_with(".vue")
}

/// Whether a module id is something the macro passes should look at.
pub fn should_transform_file(id: &str) -> bool {
    if FRAMEWORK_NODE_MODULES_RE.is_match(id) {
        return false;
    }
    if let Some((_, query)) = id.split_once('?') {
        let params: Vec<&str> = query.split('&').collect();
        if params.contains(&"type=style") || params.contains(&"macro=true") {
            return false;
        }
    }
    SCRIPT_EXTENSION_RE.is_match(clean_id(id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// The part of a module that gets parsed, and where it sits in the full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock<'s> {
    pub content: &'s str,
    pub offset: usize,
    pub lang: Option<String>,
}

impl<'s> ScriptBlock<'s> {
    /// SFC ids analyze their first `<script>` block. Code that no longer contains a `<script>`
    /// tag (already compiled by the SFC plugin) is analyzed whole.
    pub fn locate(code: &'s str, id: &str) -> Self {
        if is_vue(id) {
            if let Some(caps) = SCRIPT_REGEX.captures(code) {
                if let Some(content) = caps.get(2) {
                    let lang = caps.get(1).and_then(|attrs| {
                        LANG_ATTR_REGEX.captures(attrs.as_str()).and_then(|lang| {
                            lang.get(1)
                                .or_else(|| lang.get(2))
                                .or_else(|| lang.get(3))
                                .map(|m| m.as_str().to_ascii_lowercase())
                        })
                    });
                    return ScriptBlock {
                        content: content.as_str(),
                        offset: content.start(),
                        lang,
                    };
                }
            }
        }
        ScriptBlock {
            content: code,
            offset: 0,
            lang: None,
        }
    }
}

/// Every `<script>` block of an SFC, in order. Used where all scripts contribute bindings.
pub fn script_blocks(code: &str) -> Vec<ScriptBlock<'_>> {
    SCRIPT_REGEX
        .captures_iter(code)
        .filter_map(|caps| {
            let content = caps.get(2)?;
            let lang = caps
                .get(1)
                .and_then(|attrs| LANG_ATTR_REGEX.captures(attrs.as_str()))
                .and_then(|lang| lang.get(1).or_else(|| lang.get(2)).or_else(|| lang.get(3)))
                .map(|m| m.as_str().to_ascii_lowercase());
            Some(ScriptBlock {
                content: content.as_str(),
                offset: content.start(),
                lang,
            })
        })
        .collect()
}

pub fn source_type_for(id: &str, lang: Option<&str>) -> SourceType {
    let path = clean_id(id);
    let ext = match lang {
        Some(lang) => lang,
        None => path.rsplit('.').next().unwrap_or(""),
    };
    let (typescript, jsx) = match ext {
        "js" | "mjs" | "cjs" => (false, false),
        "jsx" => (false, true),
        "tsx" => (true, true),
        // `.ts` and compiled SFC output; `<T>x` assertions need jsx off
        _ => (true, false),
    };
    SourceType::default()
        .with_module(true)
        .with_typescript(typescript)
        .with_jsx(jsx)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSED MODULE
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse-if-needed context shared by every pass over one script.
pub struct ParsedModule<'a> {
    allocator: &'a Allocator,
    source: &'a str,
    file: &'a str,
    source_type: SourceType,
    program: OnceCell<Program<'a>>,
    scopes: OnceCell<ScopeTracker>,
}

impl<'a> ParsedModule<'a> {
    pub fn new(allocator: &'a Allocator, source: &'a str, file: &'a str, lang: Option<&str>) -> Self {
        Self {
            allocator,
            source,
            file,
            source_type: source_type_for(file, lang),
            program: OnceCell::new(),
            scopes: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn file(&self) -> &'a str {
        self.file
    }

    pub fn program(&self) -> Result<&Program<'a>, TransformError> {
        if let Some(program) = self.program.get() {
            return Ok(program);
        }
        let ret = Parser::new(self.allocator, self.source, self.source_type).parse();
        if ret.panicked || !ret.errors.is_empty() {
            let message = ret
                .errors
                .first()
                .map(|err| err.to_string())
                .unwrap_or_else(|| "parser aborted".to_string());
            return Err(TransformError::Parse {
                file: self.file.to_string(),
                message,
            });
        }
        Ok(self.program.get_or_init(|| ret.program))
    }

    /// Frozen declaration table of the whole program.
    pub fn scopes(&self) -> Result<&ScopeTracker, TransformError> {
        if let Some(scopes) = self.scopes.get() {
            return Ok(scopes);
        }
        let tracker = ScopeTracker::collect(self.program()?);
        Ok(self.scopes.get_or_init(|| tracker))
    }
}

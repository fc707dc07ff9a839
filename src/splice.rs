//! # Text Splicer
//!
//! Applies byte-offset edits taken from AST spans to the original text. Untouched text is copied
//! through verbatim, so formatting and comments survive and the source map stays simple.
//!
//! Edits never overlap. Each `insert`/`overwrite` validates that on the spot and returns
//! [`TransformError::OverlappingEdit`] instead of trying to merge.

use crate::error::TransformError;
use crate::sourcemap::{MappingsBuilder, SourceMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    /// Equal to `start` for insertions.
    pub end: usize,
    pub text: String,
}

impl Edit {
    pub fn is_insert(&self) -> bool {
        self.start == self.end
    }
}

/// Result of one pass over one file.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    Unchanged,
    Rewritten {
        code: String,
        map: Option<SourceMap>,
    },
}

impl TransformOutput {
    pub fn is_changed(&self) -> bool {
        matches!(self, TransformOutput::Rewritten { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            TransformOutput::Rewritten { code, .. } => Some(code),
            TransformOutput::Unchanged => None,
        }
    }

    pub fn map(&self) -> Option<&SourceMap> {
        match self {
            TransformOutput::Rewritten { map, .. } => map.as_ref(),
            TransformOutput::Unchanged => None,
        }
    }

    /// Rewritten code, or `original` when nothing changed.
    pub fn code_or<'a>(&'a self, original: &'a str) -> &'a str {
        self.code().unwrap_or(original)
    }
}

#[derive(Debug)]
pub struct TextSplicer<'s> {
    original: &'s str,
    intro: String,
    edits: Vec<Edit>,
}

impl<'s> TextSplicer<'s> {
    pub fn new(original: &'s str) -> Self {
        Self {
            original,
            intro: String::new(),
            edits: Vec::new(),
        }
    }

    pub fn original(&self) -> &'s str {
        self.original
    }

    pub fn has_changed(&self) -> bool {
        !self.intro.is_empty() || !self.edits.is_empty()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    fn check_range(&self, start: usize, end: usize) -> Result<(), TransformError> {
        let len = self.original.len();
        if start > end
            || end > len
            || !self.original.is_char_boundary(start)
            || !self.original.is_char_boundary(end)
        {
            return Err(TransformError::InvalidEdit { start, end, len });
        }
        Ok(())
    }

    fn check_overlap(&self, start: usize, end: usize) -> Result<(), TransformError> {
        let conflict = self.edits.iter().find(|other| {
            if start == end {
                // insertion strictly inside a replaced range
                !other.is_insert() && other.start < start && start < other.end
            } else if other.is_insert() {
                start < other.start && other.start < end
            } else {
                start < other.end && other.start < end
            }
        });
        match conflict {
            Some(other) => Err(TransformError::OverlappingEdit {
                start,
                end,
                other_start: other.start,
                other_end: other.end,
            }),
            None => Ok(()),
        }
    }

    /// Inserts `text` at `pos`. Repeated inserts at one position keep their call order, and
    /// an insert at the start of a replaced range lands before the replacement.
    pub fn insert(&mut self, pos: usize, text: impl Into<String>) -> Result<(), TransformError> {
        self.check_range(pos, pos)?;
        self.check_overlap(pos, pos)?;
        self.edits.push(Edit {
            start: pos,
            end: pos,
            text: text.into(),
        });
        Ok(())
    }

    /// Replaces `start..end` (non-empty) with `text`.
    pub fn overwrite(
        &mut self,
        start: usize,
        end: usize,
        text: impl Into<String>,
    ) -> Result<(), TransformError> {
        if start == end {
            return Err(TransformError::InvalidEdit {
                start,
                end,
                len: self.original.len(),
            });
        }
        self.check_range(start, end)?;
        self.check_overlap(start, end)?;
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
        Ok(())
    }

    /// Adds `text` before everything, including earlier prepends.
    pub fn prepend(&mut self, text: &str) {
        self.intro.insert_str(0, text);
    }

    fn ordered_edits(&self) -> Vec<&Edit> {
        let mut ordered: Vec<&Edit> = self.edits.iter().collect();
        // stable: inserts at one offset keep call order and precede a replacement starting there
        ordered.sort_by_key(|edit| (edit.start, !edit.is_insert()));
        ordered
    }

    pub fn finish(&self) -> String {
        let mut out = String::with_capacity(self.original.len() + self.intro.len());
        out.push_str(&self.intro);
        let mut cursor = 0;
        for edit in self.ordered_edits() {
            out.push_str(&self.original[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end.max(cursor);
        }
        out.push_str(&self.original[cursor..]);
        out
    }

    pub fn generate_map(&self, file: &str) -> SourceMap {
        let mut builder = MappingsBuilder::new(self.original);
        builder.generated(&self.intro);
        let mut cursor = 0;
        for edit in self.ordered_edits() {
            builder.original_chunk(cursor, edit.start);
            builder.replacement(edit.start, &edit.text);
            cursor = edit.end.max(cursor);
        }
        builder.original_chunk(cursor, self.original.len());
        SourceMap::new(file, self.original, builder.finish())
    }

    pub fn into_output(self, file: &str, sourcemap: bool) -> TransformOutput {
        if !self.has_changed() {
            return TransformOutput::Unchanged;
        }
        let map = sourcemap.then(|| self.generate_map(file));
        TransformOutput::Rewritten {
            code: self.finish(),
            map,
        }
    }
}

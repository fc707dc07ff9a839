//! Source Map v3 output for spliced files.
//!
//! One segment is emitted at the start of every kept chunk and every kept line, plus one per
//! replacement pointing at the replaced range. Columns count UTF-16 units.

use serde::{Deserialize, Serialize};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn new(file: &str, content: &str, mappings: String) -> Self {
        Self {
            version: 3,
            file: file.to_string(),
            sources: vec![file.to_string()],
            sources_content: vec![content.to_string()],
            names: Vec::new(),
            mappings,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 31) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 32;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Incrementally builds the `mappings` string while the splicer replays its edits.
pub struct MappingsBuilder<'s> {
    original: &'s str,
    line_starts: Vec<usize>,
    mappings: String,
    gen_col: usize,
    line_has_segment: bool,
    prev_gen_col: i64,
    prev_src_line: i64,
    prev_src_col: i64,
}

impl<'s> MappingsBuilder<'s> {
    pub fn new(original: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(original.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            original,
            line_starts,
            mappings: String::new(),
            gen_col: 0,
            line_has_segment: false,
            prev_gen_col: 0,
            prev_src_line: 0,
            prev_src_col: 0,
        }
    }

    fn locate(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let col = utf16_len(&self.original[self.line_starts[line]..offset]);
        (line, col)
    }

    fn segment(&mut self, offset: usize) {
        let (line, col) = self.locate(offset);
        if self.line_has_segment {
            self.mappings.push(',');
        }
        encode_vlq(&mut self.mappings, self.gen_col as i64 - self.prev_gen_col);
        encode_vlq(&mut self.mappings, 0);
        encode_vlq(&mut self.mappings, line as i64 - self.prev_src_line);
        encode_vlq(&mut self.mappings, col as i64 - self.prev_src_col);
        self.prev_gen_col = self.gen_col as i64;
        self.prev_src_line = line as i64;
        self.prev_src_col = col as i64;
        self.line_has_segment = true;
    }

    fn advance(&mut self, text: &str) {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.gen_col += utf16_len(first);
        }
        for line in lines {
            self.mappings.push(';');
            self.gen_col = utf16_len(line);
            self.prev_gen_col = 0;
            self.line_has_segment = false;
        }
    }

    /// Text with no origin (prepended imports).
    pub fn generated(&mut self, text: &str) {
        self.advance(text);
    }

    /// Copied original text `start..end`.
    pub fn original_chunk(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let chunk = &self.original[start..end];
        let mut offset = start;
        for (i, line) in chunk.split('\n').enumerate() {
            if i > 0 {
                self.advance("\n");
            }
            if !line.is_empty() {
                self.segment(offset);
                self.advance(line);
            }
            offset += line.len() + 1;
        }
    }

    /// Replacement or inserted text attributed to `origin`.
    pub fn replacement(&mut self, origin: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        self.segment(origin);
        self.advance(text);
    }

    pub fn finish(self) -> String {
        self.mappings
    }
}

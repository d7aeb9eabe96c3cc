use base64::Engine;
use serde::{Deserialize, Serialize};

/// A V3 source map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `//# sourceMappingURL=` comment carrying the whole map.
    pub fn inline_comment(&self) -> String {
        let encoded = base64::prelude::BASE64_STANDARD.encode(self.to_json());
        format!("//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Segment {
    gen_line: u32,
    gen_col: u32,
    source: u32,
    src_line: u32,
    src_col: u32,
}

/// Collects sources and segments while the bundle is written.
#[derive(Debug, Default)]
pub(crate) struct SourceMapBuilder {
    sources: Vec<String>,
    sources_content: Vec<String>,
    segments: Vec<Segment>,
}

impl SourceMapBuilder {
    pub(crate) fn add_source(&mut self, path: &str, content: &str) -> u32 {
        let index = self.sources.len() as u32;
        self.sources.push(path.to_string());
        self.sources_content.push(content.to_string());
        index
    }

    pub(crate) fn add_segment(&mut self, gen_line: u32, gen_col: u32, source: u32, src_line: u32, src_col: u32) {
        self.segments.push(Segment { gen_line, gen_col, source, src_line, src_col });
    }

    pub(crate) fn build(mut self, file: Option<String>) -> SourceMap {
        self.segments.sort();
        self.segments.dedup_by_key(|s| (s.gen_line, s.gen_col));

        let mut mappings = String::new();
        let mut line = 0u32;
        let mut prev_gen_col = 0i64;
        let mut prev_source = 0i64;
        let mut prev_src_line = 0i64;
        let mut prev_src_col = 0i64;
        let mut first_on_line = true;

        for seg in &self.segments {
            while line < seg.gen_line {
                mappings.push(';');
                line += 1;
                prev_gen_col = 0;
                first_on_line = true;
            }
            if !first_on_line {
                mappings.push(',');
            }
            first_on_line = false;

            vlq_encode(i64::from(seg.gen_col) - prev_gen_col, &mut mappings);
            vlq_encode(i64::from(seg.source) - prev_source, &mut mappings);
            vlq_encode(i64::from(seg.src_line) - prev_src_line, &mut mappings);
            vlq_encode(i64::from(seg.src_col) - prev_src_col, &mut mappings);

            prev_gen_col = i64::from(seg.gen_col);
            prev_source = i64::from(seg.source);
            prev_src_line = i64::from(seg.src_line);
            prev_src_col = i64::from(seg.src_col);
        }

        SourceMap {
            version: 3,
            file,
            sources: self.sources,
            sources_content: self.sources_content,
            names: Vec::new(),
            mappings,
        }
    }
}

/// Base64 VLQ encoding of one signed value.
pub(crate) fn vlq_encode(value: i64, out: &mut String) {
    const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut v = (if value < 0 { ((-value) << 1) | 1 } else { value << 1 }) as u64;
    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20;
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

//! Correlation between transformed code and the original source.
//!
//! Lines and columns are zero-based, as in V3 source maps.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mapping {
    pub gen_line: u32,
    pub gen_col: u32,
    pub src_line: u32,
    pub src_col: u32,
}

/// Mappings sorted by generated position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMappings {
    mappings: Vec<Mapping>,
}

impl LineMappings {
    pub fn from_mappings(mappings: impl IntoIterator<Item = Mapping>) -> Self {
        let mut mappings: Vec<Mapping> = mappings.into_iter().collect();
        mappings.sort();
        mappings.dedup_by_key(|m| (m.gen_line, m.gen_col));
        Self { mappings }
    }

    /// Maps code onto itself: one mapping at the start of every token-ish run
    /// (each non-whitespace run that follows whitespace).
    pub fn identity(code: &str) -> Self {
        let mut mappings = Vec::new();
        for (line, text) in code.lines().enumerate() {
            let mut prev_ws = true;
            for (col, ch) in text.char_indices() {
                let ws = ch.is_whitespace();
                if !ws && prev_ws {
                    let (line, col) = (line as u32, col as u32);
                    mappings.push(Mapping { gen_line: line, gen_col: col, src_line: line, src_col: col });
                }
                prev_ws = ws;
            }
        }
        Self { mappings }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// All mappings whose generated position is on `line`.
    pub fn on_line(&self, line: u32) -> &[Mapping] {
        let start = self.mappings.partition_point(|m| m.gen_line < line);
        let end = self.mappings.partition_point(|m| m.gen_line <= line);
        &self.mappings[start..end]
    }

    /// Chain `self` (later stage) after `earlier`, so the result points at the
    /// positions `earlier` was generated from. Mappings with no counterpart are dropped.
    pub fn compose(&self, earlier: &LineMappings) -> LineMappings {
        let composed = self.mappings.iter().filter_map(|m| {
            let candidates = earlier.on_line(m.src_line);
            let base = candidates.iter().rev().find(|e| e.gen_col <= m.src_col).or(candidates.first())?;
            Some(Mapping {
                gen_line: m.gen_line,
                gen_col: m.gen_col,
                src_line: base.src_line,
                src_col: base.src_col + m.src_col.saturating_sub(base.gen_col),
            })
        });
        LineMappings::from_mappings(composed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(gen_line: u32, gen_col: u32, src_line: u32, src_col: u32) -> Mapping {
        Mapping { gen_line, gen_col, src_line, src_col }
    }

    #[test]
    fn test_identity_marks_token_starts() {
        let maps = LineMappings::identity("let a = 1;\n\n  foo(a);");
        assert_eq!(maps.on_line(0), &[m(0, 0, 0, 0), m(0, 4, 0, 4), m(0, 6, 0, 6), m(0, 8, 0, 8)]);
        assert!(maps.on_line(1).is_empty());
        assert_eq!(maps.on_line(2), &[m(2, 2, 2, 2)]);
    }

    #[test]
    fn test_from_mappings_sorts_and_dedups() {
        let maps = LineMappings::from_mappings(vec![m(2, 0, 5, 0), m(0, 3, 1, 3), m(0, 3, 9, 9)]);
        let all: Vec<_> = maps.iter().copied().collect();
        assert_eq!(all, vec![m(0, 3, 1, 3), m(2, 0, 5, 0)]);
    }

    #[test]
    fn test_compose() {
        // earlier: generated line 0 came from source line 4
        let earlier = LineMappings::from_mappings(vec![m(0, 0, 4, 2), m(1, 0, 7, 0)]);
        // later: generated line 3 came from earlier's line 0, column 5
        let later = LineMappings::from_mappings(vec![m(3, 1, 0, 5), m(4, 0, 9, 0)]);
        let composed = later.compose(&earlier);
        let all: Vec<_> = composed.iter().copied().collect();
        assert_eq!(all, vec![m(3, 1, 4, 7)]);
    }
}

//! Splitting a single-file component into its top-level blocks.

use oxipack_core::TransformError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) attrs: Vec<(String, Option<String>)>,
    pub(crate) content: String,
    /// Byte offset of the opening `<`
    pub(crate) start: usize,
    /// Byte offset of the first content byte
    pub(crate) content_start: usize,
    /// Byte offset of the closing tag's `<`
    pub(crate) content_end: usize,
    /// Byte offset just past the closing `>`
    pub(crate) end: usize,
}

impl Block {
    pub(crate) fn attr(&self, name: &str) -> Option<Option<&str>> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_deref())
    }

    pub(crate) fn lang(&self) -> Option<&str> {
        self.attr("lang").flatten()
    }

    fn is_module_context(&self) -> bool {
        self.attr("context").flatten() == Some("module") || self.attr("module").is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Sfc {
    pub(crate) module_script: Option<Block>,
    pub(crate) instance_script: Option<Block>,
    pub(crate) style: Option<Block>,
    pub(crate) markup: String,
    /// 1-based line of the first markup byte, for diagnostics
    pub(crate) markup_line: u32,
}

impl Sfc {
    /// Script blocks in source order.
    pub(crate) fn scripts(&self) -> Vec<&Block> {
        let mut scripts: Vec<&Block> =
            self.module_script.iter().chain(self.instance_script.iter()).collect();
        scripts.sort_by_key(|b| b.start);
        scripts
    }
}

pub(crate) fn line_of(source: &str, offset: usize) -> u32 {
    source[..offset.min(source.len())].matches('\n').count() as u32 + 1
}

pub(crate) fn split(source: &str) -> Result<Sfc, TransformError> {
    let mut sfc = Sfc::default();
    let mut markup = String::new();
    let mut markup_start: Option<usize> = None;
    let mut cursor = 0;

    while let Some(rel) = source[cursor..].find('<') {
        let at = cursor + rel;
        let rest = &source[at..];

        if rest.starts_with("<!--") {
            let close = rest.find("-->").ok_or_else(|| {
                TransformError::syntax("unterminated comment", Some(line_of(source, at)))
            })?;
            push_markup(&mut markup, &mut markup_start, source, cursor, at + close + 3);
            cursor = at + close + 3;
            continue;
        }

        let tag = if opens_tag(rest, "script") {
            "script"
        } else if opens_tag(rest, "style") {
            "style"
        } else {
            push_markup(&mut markup, &mut markup_start, source, cursor, at + 1);
            cursor = at + 1;
            continue;
        };

        push_markup(&mut markup, &mut markup_start, source, cursor, at);
        let block = read_block(source, at, tag)?;
        cursor = block.end;

        match tag {
            "style" => {
                if sfc.style.is_some() {
                    return Err(TransformError::syntax(
                        "a component can only have one top-level <style> element",
                        Some(line_of(source, at)),
                    ));
                }
                sfc.style = Some(block);
            }
            _ if block.is_module_context() => {
                if sfc.module_script.is_some() {
                    return Err(TransformError::syntax(
                        "a component can only have one <script context=\"module\"> element",
                        Some(line_of(source, at)),
                    ));
                }
                sfc.module_script = Some(block);
            }
            _ => {
                if sfc.instance_script.is_some() {
                    return Err(TransformError::syntax(
                        "a component can only have one instance-level <script> element",
                        Some(line_of(source, at)),
                    ));
                }
                sfc.instance_script = Some(block);
            }
        }
    }
    push_markup(&mut markup, &mut markup_start, source, cursor, source.len());

    sfc.markup_line = markup_start.map(|s| line_of(source, s)).unwrap_or(1);
    sfc.markup = markup;
    Ok(sfc)
}

fn push_markup(
    markup: &mut String,
    markup_start: &mut Option<usize>,
    source: &str,
    from: usize,
    to: usize,
) {
    let text = &source[from..to];
    if markup_start.is_none() {
        if let Some(offset) = text.find(|c: char| !c.is_whitespace()) {
            *markup_start = Some(from + offset);
        }
    }
    markup.push_str(text);
}

fn opens_tag(rest: &str, name: &str) -> bool {
    rest.len() > name.len() + 1
        && rest[1..].starts_with(name)
        && rest[name.len() + 1..].starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace())
}

fn read_block(source: &str, start: usize, tag: &str) -> Result<Block, TransformError> {
    let open_end = source[start..].find('>').map(|i| start + i).ok_or_else(|| {
        TransformError::syntax(format!("unterminated <{tag}> tag"), Some(line_of(source, start)))
    })?;
    let attrs = parse_attrs(&source[start + 1 + tag.len()..open_end], source, start)?;
    let content_start = open_end + 1;

    let closing = format!("</{tag}>");
    let content_end = source[content_start..].find(&closing).map(|i| content_start + i).ok_or_else(|| {
        TransformError::syntax(
            format!("<{tag}> was left open"),
            Some(line_of(source, start)),
        )
    })?;

    Ok(Block {
        attrs,
        content: source[content_start..content_end].to_string(),
        start,
        content_start,
        content_end,
        end: content_end + closing.len(),
    })
}

fn parse_attrs(
    raw: &str,
    source: &str,
    tag_start: usize,
) -> Result<Vec<(String, Option<String>)>, TransformError> {
    let mut attrs = Vec::new();
    let mut rest = raw.trim_start().trim_end_matches('/').trim_end();

    while !rest.is_empty() {
        let name_end = rest.find(|c: char| c == '=' || c.is_whitespace()).unwrap_or(rest.len());
        let name = rest[..name_end].to_string();
        rest = rest[name_end..].trim_start();

        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remaining) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let close = after_eq[1..].find(q).ok_or_else(|| {
                        TransformError::syntax(
                            format!("unterminated value for attribute '{name}'"),
                            Some(line_of(source, tag_start)),
                        )
                    })?;
                    (&after_eq[1..1 + close], &after_eq[close + 2..])
                }
                _ => {
                    let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            attrs.push((name, Some(value.to_string())));
            rest = remaining.trim_start();
        } else {
            attrs.push((name, None));
        }
    }

    Ok(attrs)
}

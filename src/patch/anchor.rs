//! Line-oriented anchor insertion.
//!
//! An [`Anchor`] names a literal pattern, which of its matching lines to use
//! and on which side of that line a block is spliced. Matching is purely
//! textual: an anchor inside a comment or a string literal counts the same as
//! a live one. That is a known limitation of textual patching, not something
//! this module tries to detect.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    First,
    Last,
    Every,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub pattern: String,
    pub position: Position,
    pub side: Side,
    /// When set, only lines after the first line containing this text are
    /// candidates. A missing scope line means no match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Anchor {
    pub fn new(pattern: impl Into<String>, position: Position, side: Side) -> Self {
        Self {
            pattern: pattern.into(),
            position,
            side,
            scope: None,
        }
    }

    pub fn before_first(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Position::First, Side::Before)
    }

    /// Restricts matching to the lines following `opening`, e.g. the
    /// closing line of one named block.
    pub fn within(mut self, opening: impl Into<String>) -> Self {
        self.scope = Some(opening.into());
        self
    }

    pub fn after_first(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Position::First, Side::After)
    }

    pub fn before_last(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Position::Last, Side::Before)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub content: String,
    pub applied: bool,
    /// 1-based numbers of the original lines the block was spliced next to.
    pub matched_lines: Vec<usize>,
}

impl Insertion {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            applied: false,
            matched_lines: Vec::new(),
        }
    }
}

/// Splices `block` next to the line(s) selected by `anchor`.
///
/// Original lines keep their bytes and order. If the pattern is empty or not
/// found the content is returned untouched with `applied == false`.
pub fn insert(content: &str, anchor: &Anchor, block: &str) -> Insertion {
    if anchor.pattern.is_empty() || block.is_empty() {
        return Insertion::unchanged(content);
    }

    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let start = match anchor.scope.as_deref() {
        Some(opening) => match lines.iter().position(|l| l.contains(opening)) {
            Some(i) => i + 1,
            None => return Insertion::unchanged(content),
        },
        None => 0,
    };
    let hits: Vec<usize> = lines
        .iter()
        .enumerate()
        .skip(start)
        .filter(|(_, line)| line.contains(anchor.pattern.as_str()))
        .map(|(i, _)| i)
        .collect();

    let selected: Vec<usize> = match anchor.position {
        Position::First => hits.first().copied().into_iter().collect(),
        // every candidate line is scanned above, so this is the true last match
        Position::Last => hits.last().copied().into_iter().collect(),
        Position::Every => hits,
    };
    if selected.is_empty() {
        return Insertion::unchanged(content);
    }

    let default_eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let block_lines: Vec<&str> = block.lines().collect();

    let mut out = String::with_capacity(content.len() + (block.len() + 2) * selected.len());
    let mut pending = selected.iter().peekable();
    for (i, line) in lines.iter().enumerate() {
        if pending.peek() != Some(&&i) {
            out.push_str(line);
            continue;
        }
        pending.next();

        let eol = line_ending(line).unwrap_or(default_eol);
        match anchor.side {
            Side::Before => {
                push_terminated(&mut out, &block_lines, eol);
                out.push_str(line);
            }
            Side::After => {
                out.push_str(line);
                if line_ending(line).is_some() {
                    push_terminated(&mut out, &block_lines, eol);
                } else {
                    // final line without a newline: keep the file unterminated
                    out.push_str(eol);
                    out.push_str(&block_lines.join(eol));
                }
            }
        }
    }

    Insertion {
        content: out,
        applied: true,
        matched_lines: selected.iter().map(|i| i + 1).collect(),
    }
}

fn line_ending(line: &str) -> Option<&'static str> {
    if line.ends_with("\r\n") {
        Some("\r\n")
    } else if line.ends_with('\n') {
        Some("\n")
    } else {
        None
    }
}

fn push_terminated(out: &mut String, block_lines: &[&str], eol: &str) {
    for l in block_lines {
        out.push_str(l);
        out.push_str(eol);
    }
}

/// Reports whether `content` already carries the patch identified by `marker`.
///
/// Plain substring test. A marker that happens to occur naturally makes the
/// patch look applied; markers are chosen to be unlikely in unpatched files.
pub fn already_applied(content: &str, marker: &str) -> bool {
    !marker.is_empty() && content.contains(marker)
}

/// Reports whether every line of `block` outside the marker text still
/// appears in `content`, i.e. the block survived with only its marker edited.
///
/// A block with nothing but its marker leaves no remnant to look for.
pub fn remnant_present(content: &str, block: &str, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }
    let mut lines = block
        .split(marker)
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .peekable();
    lines.peek().is_some() && lines.all(|l| content.contains(l))
}

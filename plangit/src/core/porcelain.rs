//! Parser for `git status --porcelain=v1` output.

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, "??" for untracked, "!!" for ignored.
    pub code: String,
    /// Path for the changed file (the post-rename path for renames and copies).
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    pub fn is_ignored(&self) -> bool {
        self.code == "!!"
    }

    /// True for staged or unstaged changes to a tracked path.
    pub fn is_tracked_change(&self) -> bool {
        !self.is_untracked() && !self.is_ignored()
    }
}

/// Parse every non-empty line of porcelain v1 output.
pub fn parse_status(output: &str) -> Result<Vec<StatusEntry>, String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_status_line)
        .collect()
}

/// Parse one porcelain v1 line: `XY path` or `XY old -> new`.
pub fn parse_status_line(line: &str) -> Result<StatusEntry, String> {
    if line.len() < 4 || !line.is_char_boundary(2) || line.as_bytes()[2] != b' ' {
        return Err(format!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let rest = &line[3..];
    let is_rename = code.contains('R') || code.contains('C');
    if is_rename && let Some(new) = rename_target(rest) {
        return Ok(StatusEntry {
            code,
            path: unquote(new),
        });
    }
    Ok(StatusEntry {
        code,
        path: unquote(rest),
    })
}

/// The new path of a rename record `old -> new`.
fn rename_target(rest: &str) -> Option<&str> {
    // A quoted source may itself contain " -> ", so skip past its closing quote.
    if rest.starts_with('"') {
        let close = closing_quote(rest)?;
        return rest[close + 1..].strip_prefix(" -> ");
    }
    rest.split_once(" -> ").map(|(_, new)| new)
}

fn closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Undo git's C-style path quoting (`"a\tb"`).
fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut bytes = Vec::with_capacity(inner.len());
    let mut iter = inner.bytes().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'"') => bytes.push(b'"'),
            Some(b'\\') => bytes.push(b'\\'),
            Some(d @ b'0'..=b'7') => {
                // Octal escape for non-ASCII bytes, always three digits.
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    if let Some(&next @ b'0'..=b'7') = iter.peek() {
                        value = value * 8 + u32::from(next - b'0');
                        iter.next();
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

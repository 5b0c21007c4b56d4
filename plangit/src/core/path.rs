//! Lexical path helpers for repository-relative paths.

use std::path::{Component, Path};

/// Clean a relative path lexically and render it with `/` separators.
///
/// `.` components are dropped and `..` pops the previous component. Returns
/// `None` when the path escapes its base through a leading `..`, is rooted, or
/// cleans down to nothing.
pub fn clean_relative(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

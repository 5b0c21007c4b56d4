//! Branch names derived from plan file names.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Leading date stamp convention (`2024-01-15-`, `20240115_`, ...).
static DATE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d_-]+").unwrap());

/// Derive a branch name from a plan file path.
///
/// The extension and any leading run of digits and separators are stripped.
/// If nothing is left, the stem is returned unmodified.
pub fn branch_name_for_plan(plan: &Path) -> String {
    let stem = plan
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stripped = DATE_PREFIX_RE.replace(&stem, "");
    if stripped.is_empty() {
        return stem;
    }
    stripped.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_date_prefix_and_extension() {
        assert_eq!(
            branch_name_for_plan(Path::new("2024-01-15-my-feature.md")),
            "my-feature"
        );
    }

    #[test]
    fn keeps_plain_names() {
        assert_eq!(branch_name_for_plan(Path::new("feature.md")), "feature");
    }

    #[test]
    fn degenerate_prefix_only_uses_stem() {
        assert_eq!(
            branch_name_for_plan(Path::new("2024-01-15-.md")),
            "2024-01-15-"
        );
    }

    #[test]
    fn ignores_parent_directories() {
        assert_eq!(
            branch_name_for_plan(Path::new("/work/docs/plans/2024-01-15-add-auth.md")),
            "add-auth"
        );
    }

    #[test]
    fn inner_digits_are_kept() {
        assert_eq!(
            branch_name_for_plan(Path::new("20240115_oauth2-v2.md")),
            "oauth2-v2"
        );
    }
}

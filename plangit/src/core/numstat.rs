//! Diff statistics and the `git diff --numstat` record format.

/// Aggregate diff statistics between two commits.
///
/// The zero value means "no difference" and is also returned for an
/// unresolvable base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffStats {
    /// Account for one file record. `None` marks a binary file.
    pub fn record(&mut self, lines: Option<(usize, usize)>) {
        self.files += 1;
        if let Some((added, deleted)) = lines {
            self.additions += added;
            self.deletions += deleted;
        }
    }
}

/// Accumulate `git diff --numstat` output (`added<TAB>deleted<TAB>path`).
pub fn parse_numstat(output: &str) -> Result<DiffStats, String> {
    let mut stats = DiffStats::default();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(_path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(format!("unexpected numstat line: '{line}'"));
        };
        if added == "-" && deleted == "-" {
            stats.record(None);
            continue;
        }
        let added = added
            .parse::<usize>()
            .map_err(|_| format!("bad added count in numstat line: '{line}'"))?;
        let deleted = deleted
            .parse::<usize>()
            .map_err(|_| format!("bad deleted count in numstat line: '{line}'"))?;
        stats.record(Some((added, deleted)));
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_text_records() {
        let stats = parse_numstat("5\t0\tnew.txt\n3\t1\tREADME.md\n").expect("parse");
        assert_eq!(
            stats,
            DiffStats {
                files: 2,
                additions: 8,
                deletions: 1
            }
        );
    }

    #[test]
    fn binary_records_only_count_files() {
        let stats = parse_numstat("-\t-\tlogo.png\n2\t2\tsrc/lib.rs\n").expect("parse");
        assert_eq!(stats.files, 2);
        assert_eq!(stats.additions, 2);
        assert_eq!(stats.deletions, 2);
    }

    #[test]
    fn empty_output_is_zero() {
        assert_eq!(parse_numstat("").expect("parse"), DiffStats::default());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_numstat("garbage\n").is_err());
        assert!(parse_numstat("x\t1\tfile\n").is_err());
    }
}

//! Classification of git diagnostic text into benign structural conditions.
//!
//! The external backend runs git under `LC_ALL=C`, so these messages are the
//! untranslated ones. A failure is benign only when *every* non-empty stderr
//! line is a known line for that probe; anything else (broken refs, corrupt
//! objects, permission errors) must propagate as a genuine error.

/// A failure that reflects repository structure rather than a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Benign {
    /// HEAD points at an unborn branch (no commits yet).
    EmptyRepository,
    /// HEAD points directly at a commit.
    DetachedHead,
}

/// The git invocation whose non-zero exit is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// `git rev-parse HEAD`
    HeadLookup,
    /// `git symbolic-ref --short HEAD`
    SymbolicHead,
}

const HEAD_LOOKUP_LINES: &[&str] = &[
    "fatal: ambiguous argument 'HEAD': unknown revision or path not in the working tree.",
    "Use '--' to separate paths from revisions, like this:",
    "'git <command> [<revision>...] -- [<file>...]'",
];

const SYMBOLIC_HEAD_LINES: &[&str] = &["fatal: ref HEAD is not a symbolic ref"];

impl Probe {
    fn known_lines(self) -> &'static [&'static str] {
        match self {
            Probe::HeadLookup => HEAD_LOOKUP_LINES,
            Probe::SymbolicHead => SYMBOLIC_HEAD_LINES,
        }
    }

    fn benign(self) -> Benign {
        match self {
            Probe::HeadLookup => Benign::EmptyRepository,
            Probe::SymbolicHead => Benign::DetachedHead,
        }
    }
}

/// Classify the stderr of a failed probe. `None` means a genuine error.
pub fn classify(probe: Probe, stderr: &str) -> Option<Benign> {
    let known = probe.known_lines();
    let mut lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
    lines.peek()?;
    if lines.all(|line| known.contains(&line)) {
        return Some(probe.benign());
    }
    None
}

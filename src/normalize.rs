//! Path rewriting applied before every store access.
//!
//! A git repository stored in a flat namespace mixes content-addressed keys
//! (`objects/ab/cdef...`) with ref names. Some clients name branches after
//! dash-joined hex identifiers (`1234-5678-9abc-def0-...`), which look like
//! hash-derived keys and get written to places the ref lookup never reads.
//! [`RefDisambiguator`] moves such names back under `refs/heads/`.
//!
//! Normalization is a targeted rewrite, not canonicalization: `.`/`..` and
//! repeated inner separators are left alone.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::store::DELIMITER;

/// Four dash-joined hex groups followed by an open trailing hex group.
pub const REF_PATTERN: &str = "([0-9a-fA-F]{4,40}-){4}[0-9a-fA-F]*";

/// Directory that marks the root of a repository.
pub const REPOSITORY_MARKER: &str = ".git/";

const CONTENT_SEGMENT: &str = "objects";

static REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REF_PATTERN).expect("ref pattern is a valid regex"));

/// Strategy mapping a logical path to the key it is stored under.
///
/// Implementations must be idempotent, so that a key produced on write maps
/// to itself when read back.
pub trait PathNormalizer: Send + Sync {
    fn normalize<'a>(&self, path: &'a str) -> Cow<'a, str>;
}

fn strip_leading(path: &str) -> &str {
    path.trim_start_matches(DELIMITER)
}

/// Only strips leading separators.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl PathNormalizer for Verbatim {
    fn normalize<'a>(&self, path: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(strip_leading(path))
    }
}

/// Rewrites hex-shaped ref names to `<root>refs/heads/<name>`.
#[derive(Debug, Clone)]
pub struct RefDisambiguator {
    pattern: Regex,
    default_root: String,
}

impl Default for RefDisambiguator {
    fn default() -> Self {
        Self {
            pattern: REF_REGEX.clone(),
            default_root: REPOSITORY_MARKER.to_owned(),
        }
    }
}

impl RefDisambiguator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom ref pattern instead of [`REF_PATTERN`].
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            ..Self::default()
        })
    }

    /// Root used for paths that carry no `.git/` marker before the ref.
    pub fn with_default_root(mut self, root: impl Into<String>) -> Self {
        let mut root = root.into();
        if !root.is_empty() && !root.ends_with(DELIMITER) {
            root.push(DELIMITER);
        }
        self.default_root = root;
        self
    }

    fn in_content_tree(path: &str) -> bool {
        path.split(DELIMITER).any(|segment| segment == CONTENT_SEGMENT)
    }
}

impl PathNormalizer for RefDisambiguator {
    fn normalize<'a>(&self, path: &'a str) -> Cow<'a, str> {
        let path = strip_leading(path);
        if Self::in_content_tree(path) {
            return Cow::Borrowed(path);
        }
        let Some(found) = self.pattern.find(path) else {
            return Cow::Borrowed(path);
        };
        // Only a marker ahead of the ref names its repository. One that
        // follows the match lies below the ref name and is discarded.
        let root = match path[..found.start()].rfind(REPOSITORY_MARKER) {
            Some(idx) => &path[..idx + REPOSITORY_MARKER.len()],
            None => self.default_root.as_str(),
        };
        let rewritten = format!("{root}refs/heads/{}", found.as_str());
        if rewritten == path {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(rewritten)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const REF: &str = "1234-5678-9abc-def0-1234567890ab";

    #[test]
    fn strips_leading_separator() {
        assert_eq!(Verbatim.normalize("/repo/.git/HEAD"), "repo/.git/HEAD");
        assert_eq!(RefDisambiguator::new().normalize("/repo/.git/HEAD"), "repo/.git/HEAD");
    }

    #[test]
    fn markers_after_the_ref_do_not_name_the_root() {
        let normalizer = RefDisambiguator::new();
        assert_eq!(
            normalizer.normalize(&format!("{REF}/.git/HEAD")),
            format!(".git/refs/heads/{REF}")
        );
        assert_eq!(
            normalizer.normalize(&format!("repo/.git/{REF}/.git/HEAD")),
            format!("repo/.git/refs/heads/{REF}")
        );
    }

    #[test]
    fn rewrites_bare_refs_under_default_root() {
        let normalizer = RefDisambiguator::new();
        assert_eq!(
            normalizer.normalize(&format!("refs/heads/{REF}")),
            format!(".git/refs/heads/{REF}")
        );
    }

    #[test]
    fn keeps_the_repository_root() {
        let normalizer = RefDisambiguator::new();
        let expected = format!("projects/demo/.git/refs/heads/{REF}");
        assert_eq!(
            normalizer.normalize(&format!("projects/demo/.git/refs/remotes/origin/{REF}")),
            expected
        );
        assert_eq!(normalizer.normalize(&expected), expected);
    }

    #[test]
    fn leaves_content_tree_alone() {
        let normalizer = RefDisambiguator::new();
        let path = format!("repo/.git/objects/{REF}");
        assert_eq!(normalizer.normalize(&path), path);
    }

    #[test]
    fn leaves_ordinary_paths_alone() {
        let normalizer = RefDisambiguator::new();
        for path in [
            "repo/.git/refs/heads/main",
            "repo/.git/objects/ab/cdef0123456789",
            "repo/.git/config",
            "repo/.git/refs/heads/dead-beef",
        ] {
            assert!(matches!(normalizer.normalize(path), Cow::Borrowed(p) if p == path));
        }
    }

    #[test]
    fn custom_root_gets_a_separator() {
        let normalizer = RefDisambiguator::new().with_default_root("bare.git");
        assert_eq!(
            normalizer.normalize(REF),
            format!("bare.git/refs/heads/{REF}")
        );
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        assert!(RefDisambiguator::with_pattern("([0-9").is_err());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(
            root in "([a-z]{1,6}/){0,2}(\\.git/)?",
            middle in "(refs/(heads|tags)/|objects/|logs/)?",
            name in "([0-9a-f]{4,8}-){3,5}[0-9a-f]{0,12}|[a-z]{1,10}",
            leading in "/{0,2}",
        ) {
            let normalizer = RefDisambiguator::new();
            let path = format!("{leading}{root}{middle}{name}");
            let once = normalizer.normalize(&path).into_owned();
            let twice = normalizer.normalize(&once).into_owned();
            prop_assert_eq!(once, twice);
        }
    }
}

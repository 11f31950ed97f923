//! PEP 440 version numbers: parsing, ordering, and the "base version"
//! (release segment with pre/post/dev/local dropped).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// The kind of pre-release tag: alpha, beta, or release-candidate.
///
/// Declaration order is also sort order (`Alpha < Beta < Rc`), matching
/// PEP 440's `a < b < rc` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl PrereleaseKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "rc" | "c" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }

    fn canonical_tag(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// A single local-version label, either a numeric or an alphanumeric
/// segment. Numeric segments always sort greater than alphanumeric ones,
/// per PEP 440.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    Num(u64),
    Str(String),
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Num(_), Self::Str(_)) => Ordering::Greater,
            (Self::Str(_), Self::Num(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A PEP 440 version.
///
/// Ordering and equality are derived from the normalized form: release
/// segments are compared with implicit trailing-zero padding (`1.0` ==
/// `1.0.0`), and pre/post/dev/local follow the escalation rules in
/// [`Version::cmp_key`].
#[derive(Debug, Clone, Eq)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PrereleaseKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// The version failed to parse as PEP 440.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid version: `{0}`")]
pub struct VersionParseError(pub String);

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?xi)
            ^\s*
            v?
            (?:(?P<epoch>[0-9]+)!)?
            (?P<release>[0-9]+(?:\.[0-9]+)*)
            (?P<pre>
                [-_.]?
                (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
                [-_.]?
                (?P<pre_n>[0-9]+)?
            )?
            (?P<post>
                (?:-(?P<post_n1>[0-9]+))
                |
                (?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)
            )?
            (?P<dev>
                [-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?
            )?
            (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
            \s*$",
        )
        .expect("static regex is valid")
    })
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = version_regex()
            .captures(s)
            .ok_or_else(|| VersionParseError(s.to_string()))?;

        let epoch = caps
            .name("epoch")
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);

        let release = caps["release"]
            .split('.')
            .map(|seg| seg.parse::<u64>().unwrap_or(0))
            .collect::<Vec<_>>();

        let pre = caps.name("pre_l").map(|m| {
            let kind = PrereleaseKind::from_tag(&m.as_str().to_lowercase())
                .unwrap_or(PrereleaseKind::Rc);
            let num = caps
                .name("pre_n")
                .map(|n| n.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            (kind, num)
        });

        let post = if caps.name("post").is_some() {
            let n = caps
                .name("post_n1")
                .or_else(|| caps.name("post_n2"))
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            Some(n)
        } else {
            None
        };

        let dev = caps.name("dev").map(|_| {
            caps.name("dev_n")
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0)
        });

        let local = caps
            .name("local")
            .map(|m| {
                m.as_str()
                    .split(['-', '_', '.'])
                    .map(|seg| {
                        if seg.chars().all(|c| c.is_ascii_digit()) {
                            LocalSegment::Num(seg.parse().unwrap_or(0))
                        } else {
                            LocalSegment::Str(seg.to_lowercase())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

/// An ordering key whose variant declaration order doubles as the
/// dev < prerelease < final escalation required by PEP 440.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    /// No explicit pre-release tag, but a dev segment: sorts below every
    /// prerelease of the same release.
    DevOnly,
    Pre(PrereleaseKind, u64),
    /// No pre-release tag at all (a "final" release, possibly with post):
    /// sorts above every prerelease of the same release.
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PostKey {
    NoPost,
    Post(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    NoDev,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LocalKey {
    NoLocal,
    Local(Vec<LocalSegment>),
}

type CmpKey = (u64, Vec<u64>, PreKey, PostKey, DevKey, LocalKey);

impl Version {
    /// Construct directly from components; used by tests and by callers
    /// synthesizing a version (e.g. a minimal `PKG-INFO`).
    #[must_use]
    pub fn new(release: Vec<u64>) -> Self {
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    fn cmp_key(&self) -> CmpKey {
        let pre = match (&self.pre, self.dev) {
            (Some((kind, n)), _) => PreKey::Pre(*kind, n),
            (None, Some(_)) => PreKey::DevOnly,
            (None, None) => PreKey::Final,
        };
        let post = match self.post {
            Some(n) => PostKey::Post(n),
            None => PostKey::NoPost,
        };
        let dev = match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::NoDev,
        };
        let local = if self.local.is_empty() {
            LocalKey::NoLocal
        } else {
            LocalKey::Local(self.local.clone())
        };
        (self.epoch, trim_trailing_zeros(&self.release), pre, post, dev, local)
    }

    /// `true` if this version carries a pre-release or dev tag.
    ///
    /// Per PEP 440, post-releases of a final version are *not*
    /// pre-releases even though they carry a suffix.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.dev.is_some()
    }

    #[must_use]
    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// The release segment as `major.minor.micro`-style components, drop
    /// all pre/post/dev/local information. This is the `BaseVersion` named
    /// in the data model.
    #[must_use]
    pub fn base_version(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// The `.post` suffix value alone, used by the settings-template
    /// variable `${version_post}`.
    #[must_use]
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// This version with its local segment stripped, keeping epoch,
    /// release, pre, post, and dev intact. Used to derive the
    /// `<override_name>-<version_no_local>` patch-directory name, which is
    /// sensitive to pre/post/dev but not to a `+local` build tag.
    #[must_use]
    pub fn without_local(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: self.pre,
            post: self.post,
            dev: self.dev,
            local: Vec::new(),
        }
    }
}

fn trim_trailing_zeros(release: &[u64]) -> Vec<u64> {
    let mut v = release.to_vec();
    while v.len() > 1 && *v.last().unwrap() == 0 {
        v.pop();
    }
    v
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cmp_key().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release = self
            .release
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{release}")?;
        if let Some((kind, n)) = &self.pre {
            write!(f, "{}{n}", kind.canonical_tag())?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if !self.local.is_empty() {
            let local = self
                .local
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::Version;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    impl Serialize for Version {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Version {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Version::from_str(&s).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1.0", "1.0.0")]
    #[test_case("1.0a1", "1.0a1")]
    #[test_case("1.0.dev1", "1.0.dev1")]
    #[test_case("1!1.0", "1!1.0")]
    fn test_roundtrip_or_equal(input: &str, display_like: &str) {
        let v: Version = input.parse().unwrap();
        let other: Version = display_like.parse().unwrap();
        assert_eq!(v, other);
    }

    #[test]
    fn test_ordering_chain() {
        let versions = [
            "1.0.dev1", "1.0a1", "1.0a1.post1", "1.0b1", "1.0rc1", "1.0", "1.0.post1", "1.0+local",
        ]
        .map(|s| s.parse::<Version>().unwrap());
        for window in versions.windows(2) {
            assert!(
                window[0] < window[1],
                "{} should be < {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn test_trailing_zero_equality() {
        assert_eq!(
            "1.0".parse::<Version>().unwrap(),
            "1.0.0".parse::<Version>().unwrap()
        );
    }

    #[test]
    fn test_dev_before_pre_dev() {
        let a: Version = "1.0a1.dev1".parse().unwrap();
        let b: Version = "1.0a1".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_epoch_dominates() {
        let a: Version = "1!0.1".parse().unwrap();
        let b: Version = "2.0".parse().unwrap();
        assert!(a > b);
    }

    #[test]
    fn test_is_prerelease() {
        assert!("1.0a1".parse::<Version>().unwrap().is_prerelease());
        assert!("1.0.dev1".parse::<Version>().unwrap().is_prerelease());
        assert!(!"1.0".parse::<Version>().unwrap().is_prerelease());
        assert!(!"1.0.post1".parse::<Version>().unwrap().is_prerelease());
    }

    #[test]
    fn test_base_version_drops_suffixes() {
        let v: Version = "1.2.3a1.post1.dev1+local".parse().unwrap();
        assert_eq!(v.base_version().to_string(), "1.2.3");
    }

    #[test]
    fn test_invalid() {
        assert!("not-a-version".parse::<Version>().is_err());
    }
}

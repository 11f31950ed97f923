//! The resolver provider registry (`spec.md` §4.5): pluggable backends
//! that, given a requirement, yield candidates in descending version
//! order. Transport is grounded in `uv-client`'s `registry_client.rs`
//! shape: a `reqwest` client wrapped in `reqwest-middleware` with a
//! retry-on-transient-failure policy.

mod pypi;
mod tags;

use std::time::Duration;

use fromager_constraints::ConstraintsStore;
use fromager_normalize::PackageName;
use fromager_types::Candidate;
use fromager_version::{Requirement, Version};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;

pub use pypi::PyPiProvider;
pub use tags::{GenericProvider, GitHubTagProvider, GitLabTagProvider};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no candidate of `{requirement}` satisfies the specifier set; considered versions: {considered:?}")]
    NoMatchingCandidate {
        requirement: String,
        considered: Vec<String>,
    },
    #[error("network error talking to `{url}`")]
    Network {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("could not parse simple-index response from `{url}`")]
    IndexParse { url: String },
    #[error(transparent)]
    InvalidVersion(#[from] fromager_version::VersionParseError),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        use fromager_types::severity::Severity;
        match self {
            Self::NoMatchingCandidate { .. } => Severity::Fatal,
            Self::Network { .. } => Severity::Transient,
            Self::IndexParse { .. } | Self::InvalidVersion(_) => Severity::NodeFailed,
        }
    }
}

/// A single candidate yielded by a provider, paired with whether it is a
/// pre-release (so the Orchestrator can apply the admits-prerelease rule
/// without re-parsing the version).
#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    pub candidate: Candidate,
    pub is_prerelease: bool,
}

/// Implemented by every resolver backend (`spec.md` §4.5). A provider
/// yields candidates already in descending version order; it does not
/// itself filter by the requirement's specifier set — that's the
/// Orchestrator's job, so providers stay simple data sources.
#[async_trait::async_trait]
pub trait ResolverProvider: Send + Sync {
    async fn candidates(
        &self,
        name: &PackageName,
        include_sdists: bool,
        include_wheels: bool,
    ) -> Result<Vec<ProviderCandidate>, Error>;
}

/// Builds the shared HTTP client used by every provider: `reqwest` plus a
/// `reqwest-retry` exponential-backoff-with-jitter policy honoring
/// `spec.md` §5/§9's retry contract.
#[must_use]
pub fn build_http_client(retries: u32, timeout: Duration) -> ClientWithMiddleware {
    let inner = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client builder with only timeout set cannot fail");
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retries);
    reqwest_middleware::ClientBuilder::new(inner)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Selects the highest-ordered candidate satisfying both `requirement`'s
/// specifier set and `constraints`, applying the pre-release admission
/// rule from `spec.md` §4.5: a pre-release is only eligible if the
/// requirement's specifiers explicitly admit one, or a matching
/// constraint does.
pub fn select_best(
    requirement: &Requirement,
    candidates: &[ProviderCandidate],
    constraints: &ConstraintsStore,
) -> Result<Candidate, Error> {
    let admit_prerelease =
        requirement.admits_prerelease_explicitly() || constraints.admits_prerelease(&requirement.name);

    let mut considered: Vec<String> = Vec::new();
    let mut best: Option<&ProviderCandidate> = None;

    for pc in candidates {
        considered.push(pc.candidate.version.to_string());
        if pc.is_prerelease && !admit_prerelease {
            continue;
        }
        if !requirement.satisfies(&pc.candidate.version) {
            continue;
        }
        if !constraints.allowed(&requirement.name, &pc.candidate.version) {
            continue;
        }
        best = match best {
            None => Some(pc),
            Some(current) if pc.candidate.version > current.candidate.version => Some(pc),
            Some(current) => Some(current),
        };
    }

    best.map(|pc| pc.candidate.clone()).ok_or_else(|| Error::NoMatchingCandidate {
        requirement: requirement.raw().to_string(),
        considered,
    })
}

#[must_use]
pub fn is_prerelease(version: &Version) -> bool {
    version.is_prerelease()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_types::RetrieveMethod;
    use url::Url;

    fn candidate(version: &str) -> ProviderCandidate {
        let v: Version = version.parse().unwrap();
        ProviderCandidate {
            is_prerelease: v.is_prerelease(),
            candidate: Candidate {
                name: PackageName::new("foo").unwrap(),
                version: v,
                retrieve_url: Url::parse("https://example.com/foo.tar.gz").unwrap(),
                retrieve_method: RetrieveMethod::Tarball,
                git_ref: None,
            },
        }
    }

    #[test]
    fn test_select_best_picks_highest_non_prerelease() {
        let req: Requirement = "foo>=1.0".parse().unwrap();
        let cands = vec![candidate("1.0"), candidate("2.0"), candidate("3.0rc1")];
        let store = ConstraintsStore::empty(false);
        let chosen = select_best(&req, &cands, &store).unwrap();
        assert_eq!(chosen.version.to_string(), "2.0");
    }

    #[test]
    fn test_select_best_honors_explicit_prerelease_admission() {
        let req: Requirement = "foo==2.0rc3".parse().unwrap();
        let cands = vec![candidate("2.0rc3")];
        let store = ConstraintsStore::empty(false);
        let chosen = select_best(&req, &cands, &store).unwrap();
        assert_eq!(chosen.version.to_string(), "2.0rc3");
    }

    #[test]
    fn test_select_best_no_match_reports_considered() {
        let req: Requirement = "foo>=10.0".parse().unwrap();
        let cands = vec![candidate("1.0"), candidate("2.0")];
        let store = ConstraintsStore::empty(false);
        let err = select_best(&req, &cands, &store).unwrap_err();
        match err {
            Error::NoMatchingCandidate { considered, .. } => assert_eq!(considered.len(), 2),
            _ => panic!("wrong error"),
        }
    }
}

//! The repeatable-build layer (`spec.md` §4.16 summary / "Repeatable-build
//! layer" paragraph in §5): given a prior `graph.json`, lets the
//! orchestrator pin a requirement to the version a previous run already
//! chose, instead of calling the resolver, whenever that prior version
//! still satisfies the current requirement and constraints.

use fromager_constraints::ConstraintsStore;
use fromager_graph::Graph;
use fromager_normalize::PackageName;
use fromager_version::{Requirement, Version};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("prior graph file is not valid JSON: {0}")]
    InvalidGraph(#[from] serde_json::Error),
}

/// A prior `graph.json`, loaded once at startup and consulted before
/// every resolve. Wrapping the raw [`Graph`] keeps the lookup-by-name
/// logic (graph nodes are keyed by `name==version`, not by bare name)
/// local to this crate instead of duplicated at call sites.
pub struct PriorGraph {
    graph: Graph,
}

impl PriorGraph {
    pub fn load(json: &str) -> Result<Self, Error> {
        let graph: Graph = serde_json::from_str(json)?;
        Ok(Self { graph })
    }

    #[must_use]
    pub fn from_graph(graph: Graph) -> Self {
        Self { graph }
    }

    /// All versions of `name` the prior graph recorded, in the order
    /// they were stored (a graph may legitimately contain more than one
    /// version of a name across separate subtrees).
    fn versions_for(&self, name: &PackageName) -> Vec<Version> {
        self.graph
            .non_root_keys()
            .filter_map(|key| {
                let node = self.graph.get(key)?;
                if node.canonicalized_name == name.as_str() {
                    node.version.parse().ok()
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Checks the prior graph for a version of `requirement`'s package that
/// still satisfies `requirement`'s specifier and the current
/// constraints store. Returns the first such version found, preferring
/// none over choosing arbitrarily among several equally-valid candidates
/// -- callers that need a deterministic pick should sort the prior
/// graph's entries themselves before constructing it, but in practice a
/// prior graph records a single winning version per name per subtree.
#[must_use]
pub fn pin_from_prior(prior: &PriorGraph, requirement: &Requirement, name: &PackageName, constraints: &ConstraintsStore) -> Option<Version> {
    prior
        .versions_for(name)
        .into_iter()
        .find(|version| requirement.satisfies(version) && constraints.allowed(name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_graph::Graph;

    fn make_prior(name: &str, version: &str) -> PriorGraph {
        let mut graph = Graph::new();
        let pkg = PackageName::new(name).unwrap();
        let v: Version = version.parse().unwrap();
        graph.insert_node(&pkg, &v, "https://example.invalid/pkg.tar.gz");
        PriorGraph::from_graph(graph)
    }

    #[test]
    fn test_pin_from_prior_when_still_satisfying() {
        let prior = make_prior("stevedore", "5.2.0");
        let name = PackageName::new("stevedore").unwrap();
        let req: Requirement = "stevedore>=5.0,<6".parse().unwrap();
        let constraints = ConstraintsStore::empty(false);

        let pinned = pin_from_prior(&prior, &req, &name, &constraints);
        assert_eq!(pinned, Some("5.2.0".parse().unwrap()));
    }

    #[test]
    fn test_no_pin_when_requirement_no_longer_satisfied() {
        let prior = make_prior("stevedore", "5.2.0");
        let name = PackageName::new("stevedore").unwrap();
        let req: Requirement = "stevedore>=6".parse().unwrap();
        let constraints = ConstraintsStore::empty(false);

        assert_eq!(pin_from_prior(&prior, &req, &name, &constraints), None);
    }

    #[test]
    fn test_no_pin_when_constraints_reject_it() {
        let prior = make_prior("stevedore", "5.2.0");
        let name = PackageName::new("stevedore").unwrap();
        let req: Requirement = "stevedore>=5".parse().unwrap();
        let constraints = ConstraintsStore::parse("stevedore==5.3.0\n", false).unwrap();

        assert_eq!(pin_from_prior(&prior, &req, &name, &constraints), None);
    }
}

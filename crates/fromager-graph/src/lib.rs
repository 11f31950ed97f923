//! The dependency graph store (`spec.md` §4.12): an in-memory map keyed by
//! `name==version` strings, plus the query surface the CLI and the
//! orchestrator both need (`why`, `subset`, `explain-duplicates`,
//! `to-constraints`, `to-dot`, `migrate`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use fromager_normalize::PackageName;
use fromager_types::RequirementType;
use fromager_version::Version;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub const ROOT_KEY: &str = "";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("two versions of `{name}` are present; a single-version constraints file cannot be emitted")]
    ConflictingVersions { name: String },
    #[error("cycle containing a build edge detected, starting at `{0}`")]
    CyclicBuildDependency(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub key: String,
    pub req_type: RequirementType,
    pub req: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub download_url: String,
    pub version: String,
    pub canonicalized_name: String,
    pub edges: Vec<Edge>,
}

/// The key a non-ROOT node is filed under: `name==version`.
#[must_use]
pub fn node_key(name: &PackageName, version: &Version) -> String {
    format!("{name}=={version}")
}

/// The dependency graph. Nodes are inserted once per (name, version) and
/// mutated only by edge appends, matching the spec's lifecycle rule that
/// nodes are never deleted during bootstrap.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_KEY.to_string(),
            Node {
                download_url: String::new(),
                version: String::new(),
                canonicalized_name: String::new(),
                edges: Vec::new(),
            },
        );
        Self { nodes }
    }

    pub fn insert_node(
        &mut self,
        name: &PackageName,
        version: &Version,
        download_url: impl Into<String>,
    ) -> String {
        let key = node_key(name, version);
        self.nodes.entry(key.clone()).or_insert_with(|| Node {
            download_url: download_url.into(),
            version: version.to_string(),
            canonicalized_name: name.to_string(),
            edges: Vec::new(),
        });
        key
    }

    pub fn add_edge(&mut self, from_key: &str, edge: Edge) {
        if let Some(node) = self.nodes.get_mut(from_key) {
            node.edges.push(edge);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    #[must_use]
    pub fn non_root_keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().filter(|k| !k.is_empty()).map(String::as_str)
    }

    fn incoming(&self, target: &str) -> Vec<(&str, &Edge)> {
        self.nodes
            .iter()
            .flat_map(|(k, n)| n.edges.iter().map(move |e| (k.as_str(), e)))
            .filter(|(_, e)| e.key == target)
            .collect()
    }

    /// Chains from `target` up to ROOT, following incoming edges, optionally
    /// filtered by edge type and bounded by `depth` (`-1` unlimited).
    #[must_use]
    pub fn why(&self, target: &str, type_filter: Option<RequirementType>, depth: i32) -> Vec<Vec<String>> {
        let mut chains = Vec::new();
        let mut stack = vec![(target.to_string(), vec![target.to_string()], 0i32)];
        while let Some((current, path, steps)) = stack.pop() {
            if current == ROOT_KEY {
                chains.push(path);
                continue;
            }
            if depth >= 0 && steps >= depth {
                continue;
            }
            let parents = self.incoming(&current);
            if parents.is_empty() {
                chains.push(path);
                continue;
            }
            for (parent_key, edge) in parents {
                if let Some(t) = type_filter {
                    if edge.req_type != t {
                        continue;
                    }
                }
                let mut next_path = path.clone();
                next_path.push(parent_key.to_string());
                stack.push((parent_key.to_string(), next_path, steps + 1));
            }
        }
        chains
    }

    /// The target, its transitive ancestors (dependents), its transitive
    /// descendants, and ROOT when reachable, as a new sub-graph containing
    /// only edges between included nodes.
    #[must_use]
    pub fn subset(&self, target: &str) -> Graph {
        let mut included: FxHashSet<String> = FxHashSet::default();
        included.insert(target.to_string());

        let mut stack = vec![target.to_string()];
        while let Some(k) = stack.pop() {
            if let Some(node) = self.nodes.get(&k) {
                for e in &node.edges {
                    if included.insert(e.key.clone()) {
                        stack.push(e.key.clone());
                    }
                }
            }
        }

        stack = vec![target.to_string()];
        while let Some(k) = stack.pop() {
            for (parent_key, _) in self.incoming(&k) {
                if included.insert(parent_key.to_string()) {
                    stack.push(parent_key.to_string());
                }
            }
        }

        let mut sub = Graph {
            nodes: BTreeMap::new(),
        };
        for key in &included {
            if let Some(node) = self.nodes.get(key) {
                let mut node = node.clone();
                node.edges.retain(|e| included.contains(&e.key));
                sub.nodes.insert(key.clone(), node);
            }
        }
        if !sub.nodes.contains_key(ROOT_KEY) && self.nodes.contains_key(ROOT_KEY) {
            // ROOT is included only if actually reachable via the ancestor walk above.
        }
        sub
    }

    /// Groups non-ROOT nodes by canonical name; names with 2+ distinct
    /// versions are reported along with the requirements that caused each
    /// version and whether a single version would have satisfied all of
    /// them (set-intersection of the requirement strings is left to the
    /// caller to interpret against a specifier set; here we just report
    /// the raw requirement strings per version).
    #[must_use]
    pub fn explain_duplicates(&self) -> Vec<DuplicateReport> {
        let mut by_name: FxHashMap<String, Vec<(&String, &Node)>> = FxHashMap::default();
        for (key, node) in &self.nodes {
            if key.is_empty() {
                continue;
            }
            by_name
                .entry(node.canonicalized_name.clone())
                .or_default()
                .push((key, node));
        }

        let mut reports: Vec<DuplicateReport> = by_name
            .into_iter()
            .filter(|(_, versions)| versions.len() >= 2)
            .map(|(name, versions)| {
                let per_version = versions
                    .into_iter()
                    .map(|(key, node)| {
                        let reqs: Vec<String> = self
                            .incoming(key)
                            .into_iter()
                            .map(|(_, e)| e.req.clone())
                            .collect();
                        (node.version.clone(), reqs)
                    })
                    .collect();
                DuplicateReport {
                    name,
                    versions: per_version,
                }
            })
            .collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    /// `name==version` lines for every non-ROOT node, sorted.
    pub fn to_constraints(&self, allow_conflicts: bool) -> Result<Vec<String>, Error> {
        let mut by_name: FxHashMap<String, Vec<&Node>> = FxHashMap::default();
        for (key, node) in &self.nodes {
            if key.is_empty() {
                continue;
            }
            by_name.entry(node.canonicalized_name.clone()).or_default().push(node);
        }
        if !allow_conflicts {
            for (name, nodes) in &by_name {
                if nodes.len() > 1 {
                    return Err(Error::ConflictingVersions { name: name.clone() });
                }
            }
        }
        let mut lines: Vec<String> = self
            .nodes
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(_, n)| format!("{}=={}", n.canonicalized_name, n.version))
            .collect();
        lines.sort();
        lines.dedup();
        Ok(lines)
    }

    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph fromager {\n");
        for (key, node) in &self.nodes {
            let label = if key.is_empty() { "ROOT".to_string() } else { key.clone() };
            let shape = if key.is_empty() { "doublecircle" } else { "box" };
            let _ = writeln!(out, "  \"{key}\" [label=\"{label}\" shape={shape}];");
            for edge in &node.edges {
                let style = match edge.req_type {
                    RequirementType::Install => "solid",
                    _ => "bold",
                };
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [label=\"{}\" style={style}];",
                    key, edge.key, edge.req_type
                );
            }
        }
        out.push_str("}\n");
        out
    }

    /// Reconstructs a graph from a legacy flat build-order list, computing
    /// edges from each entry's recorded `type` and `req` fields.
    #[must_use]
    pub fn migrate(entries: &[LegacyBuildOrderEntry]) -> Self {
        let mut graph = Self::new();
        for entry in entries {
            let key = format!("{}=={}", entry.dist, entry.version);
            graph.nodes.entry(key.clone()).or_insert_with(|| Node {
                download_url: entry.source_url.clone(),
                version: entry.version.clone(),
                canonicalized_name: entry.dist.clone(),
                edges: Vec::new(),
            });
            let from = if entry.req_type == RequirementType::Toplevel {
                ROOT_KEY.to_string()
            } else {
                // Legacy files don't record the parent explicitly; the best
                // available signal is that build-order is already a valid
                // topological order, so the edge is filed against ROOT and
                // left for `why`/`subset` consumers that tolerate a flatter
                // shape. Real parentage requires the graph.json format.
                ROOT_KEY.to_string()
            };
            graph.add_edge(
                &from,
                Edge {
                    key,
                    req_type: entry.req_type,
                    req: entry.req.clone(),
                },
            );
        }
        graph
    }

    /// Returns the (edge-origin-key, cycle member key) pair for the first
    /// cycle found that contains a build edge, if any (`spec.md` invariant:
    /// "any cycle containing a build edge is a fatal error").
    #[must_use]
    pub fn find_cyclic_build_dependency(&self) -> Option<String> {
        let mut visiting: FxHashSet<&str> = FxHashSet::default();
        let mut done: FxHashSet<&str> = FxHashSet::default();

        fn visit<'a>(
            graph: &'a Graph,
            key: &'a str,
            visiting: &mut FxHashSet<&'a str>,
            done: &mut FxHashSet<&'a str>,
        ) -> Option<String> {
            if done.contains(key) {
                return None;
            }
            visiting.insert(key);
            if let Some(node) = graph.nodes.get(key) {
                for edge in &node.edges {
                    if !edge.req_type.is_build_edge() {
                        continue;
                    }
                    if visiting.contains(edge.key.as_str()) {
                        return Some(edge.key.clone());
                    }
                    if let Some(found) = visit(graph, &edge.key, visiting, done) {
                        return Some(found);
                    }
                }
            }
            visiting.remove(key);
            done.insert(key);
            None
        }

        for key in self.nodes.keys() {
            if let Some(found) = visit(self, key, &mut visiting, &mut done) {
                return Some(found);
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateReport {
    pub name: String,
    pub versions: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyBuildOrderEntry {
    #[serde(rename = "type")]
    pub req_type: RequirementType,
    pub req: String,
    pub dist: String,
    pub version: String,
    pub source_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_normalize::PackageName;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }
    fn ver(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_root_node_present() {
        let graph = Graph::new();
        assert!(graph.contains(ROOT_KEY));
    }

    #[test]
    fn test_insert_and_edge() {
        let mut graph = Graph::new();
        let key = graph.insert_node(&name("stevedore"), &ver("5.2.0"), "https://example/stevedore.tar.gz").to_string();
        graph.add_edge(
            ROOT_KEY,
            Edge {
                key: key.clone(),
                req_type: RequirementType::Toplevel,
                req: "stevedore==5.2.0".to_string(),
            },
        );
        assert_eq!(graph.get(ROOT_KEY).unwrap().edges.len(), 1);
        assert!(graph.contains(&key));
    }

    #[test]
    fn test_why_chain_to_root() {
        let mut graph = Graph::new();
        let stevedore = graph.insert_node(&name("stevedore"), &ver("5.2.0"), "").to_string();
        graph.add_edge(ROOT_KEY, Edge { key: stevedore.clone(), req_type: RequirementType::Toplevel, req: "stevedore".into() });
        let pbr = graph.insert_node(&name("pbr"), &ver("6.1.0"), "").to_string();
        graph.add_edge(&stevedore, Edge { key: pbr.clone(), req_type: RequirementType::Install, req: "pbr".into() });

        let chains = graph.why(&pbr, None, -1);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0], vec![pbr, stevedore, ROOT_KEY.to_string()]);
    }

    #[test]
    fn test_to_constraints_rejects_duplicate_versions() {
        let mut graph = Graph::new();
        graph.insert_node(&name("django"), &ver("3.2.0"), "");
        graph.insert_node(&name("django"), &ver("4.0.0"), "");
        let err = graph.to_constraints(false).unwrap_err();
        assert!(matches!(err, Error::ConflictingVersions { .. }));
        assert_eq!(graph.to_constraints(true).unwrap().len(), 2);
    }

    #[test]
    fn test_explain_duplicates() {
        let mut graph = Graph::new();
        graph.insert_node(&name("django"), &ver("3.2.0"), "");
        graph.insert_node(&name("django"), &ver("4.0.0"), "");
        graph.insert_node(&name("pbr"), &ver("6.1.0"), "");
        let reports = graph.explain_duplicates();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "django");
        assert_eq!(reports[0].versions.len(), 2);
    }

    #[test]
    fn test_cyclic_build_dependency_detected() {
        let mut graph = Graph::new();
        let a = graph.insert_node(&name("a"), &ver("1.0"), "").to_string();
        let b = graph.insert_node(&name("b"), &ver("1.0"), "").to_string();
        graph.add_edge(&a, Edge { key: b.clone(), req_type: RequirementType::BuildSystem, req: "b".into() });
        graph.add_edge(&b, Edge { key: a.clone(), req_type: RequirementType::BuildSystem, req: "a".into() });
        assert!(graph.find_cyclic_build_dependency().is_some());
    }

    #[test]
    fn test_install_only_cycle_is_harmless() {
        let mut graph = Graph::new();
        let a = graph.insert_node(&name("a"), &ver("1.0"), "").to_string();
        let b = graph.insert_node(&name("b"), &ver("1.0"), "").to_string();
        graph.add_edge(&a, Edge { key: b.clone(), req_type: RequirementType::Install, req: "b".into() });
        graph.add_edge(&b, Edge { key: a.clone(), req_type: RequirementType::Install, req: "a".into() });
        assert!(graph.find_cyclic_build_dependency().is_none());
    }
}

//! Build-order linearization and output-file writers (`spec.md` §4.13,
//! §6): `build-order.json`, `graph.json`, `constraints.txt`.

use std::collections::BTreeMap;
use std::path::Path;

use fromager_graph::{Graph, ROOT_KEY};
use fromager_types::RequirementType;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("two versions of `{name}` are present; constraints.txt cannot be emitted")]
    ConstraintConflict { name: String },
    #[error(transparent)]
    Graph(#[from] fromager_graph::Error),
    #[error(transparent)]
    Fs(#[from] fromager_fs::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        fromager_types::severity::Severity::Fatal
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOrderEntry {
    #[serde(rename = "type")]
    pub req_type: RequirementType,
    pub req: String,
    pub constraint: String,
    pub dist: String,
    pub version: String,
    pub prebuilt: bool,
    pub source_url: String,
    pub source_url_type: String,
}

/// A topological linearization of every non-ROOT node such that every
/// build-edge-predecessor of N appears before N. Install edges do not
/// constrain ordering. Ties break lexicographically on canonical name
/// then version, so the emitted order is stable across runs.
#[must_use]
pub fn linearize(graph: &Graph) -> Vec<String> {
    let mut in_degree: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let keys: Vec<&str> = graph.non_root_keys().collect();
    for key in &keys {
        in_degree.entry((*key).to_string()).or_insert(0);
    }

    for key in &keys {
        let Some(node) = graph.get(key) else { continue };
        for edge in &node.edges {
            if !edge.req_type.is_build_edge() {
                continue;
            }
            if edge.key == ROOT_KEY || !in_degree.contains_key(&edge.key) {
                continue;
            }
            *in_degree.get_mut(*key).unwrap() += 1;
            dependents.entry(edge.key.clone()).or_default().push((*key).to_string());
        }
    }

    let mut ready: Vec<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(k, _)| k.clone())
        .collect();
    ready.sort();

    let mut order = Vec::with_capacity(keys.len());
    let mut remaining = in_degree;

    while let Some(next) = ready.pop() {
        order.push(next.clone());
        if let Some(deps) = dependents.get(&next) {
            let mut newly_ready = Vec::new();
            for dep in deps {
                if let Some(deg) = remaining.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dep.clone());
                    }
                }
            }
            newly_ready.sort();
            ready.extend(newly_ready);
            ready.sort();
        }
    }

    order
}

/// Emits `build-order.json`'s array for the linearized key order. Each
/// node may appear via several inbound edges (one per parent); this
/// picks the first edge found pointing at the node, since the array
/// records the node's own resolution, not every edge into it.
#[must_use]
pub fn build_order_entries(graph: &Graph, order: &[String]) -> Vec<BuildOrderEntry> {
    let mut inbound: BTreeMap<&str, (&fromager_graph::Edge, &str)> = BTreeMap::new();
    for key in graph.non_root_keys() {
        let Some(node) = graph.get(key) else { continue };
        for edge in &node.edges {
            inbound.entry(edge.key.as_str()).or_insert((edge, key));
        }
    }

    order
        .iter()
        .filter_map(|key| {
            let node = graph.get(key)?;
            let (edge, _parent) = inbound.get(key.as_str()).copied().unzip();
            let edge = edge?;
            Some(BuildOrderEntry {
                req_type: edge.req_type,
                req: edge.req.clone(),
                constraint: String::new(),
                dist: node.canonicalized_name.clone(),
                version: node.version.clone(),
                prebuilt: node.download_url.ends_with(".whl"),
                source_url: node.download_url.clone(),
                source_url_type: if node.download_url.ends_with(".whl") {
                    "prebuilt-wheel".to_string()
                } else if node.download_url.starts_with("git+ssh") {
                    "git+ssh".to_string()
                } else if node.download_url.starts_with("git+") {
                    "git+https".to_string()
                } else {
                    "sdist".to_string()
                },
            })
        })
        .collect()
}

/// Writes `graph.json`, `build-order.json`, and (unless `skip_constraints`)
/// `constraints.txt`, every write atomic (temp-then-rename).
pub fn write_outputs(graph: &Graph, output_dir: &Path, skip_constraints: bool) -> Result<(), Error> {
    let graph_json = serde_json::to_vec_pretty(graph)?;
    fromager_fs::atomic_write(&output_dir.join("graph.json"), &graph_json)?;

    let order = linearize(graph);
    let entries = build_order_entries(graph, &order);
    let build_order_json = serde_json::to_vec_pretty(&entries)?;
    fromager_fs::atomic_write(&output_dir.join("build-order.json"), &build_order_json)?;

    match graph.to_constraints(false) {
        Ok(lines) => {
            let mut body = lines.join("\n");
            body.push('\n');
            fromager_fs::atomic_write(&output_dir.join("constraints.txt"), body.as_bytes())?;
        }
        Err(fromager_graph::Error::ConflictingVersions { name }) if skip_constraints => {
            tracing::warn!(name, "skip-constraints set; constraints.txt not written due to conflicting versions");
        }
        Err(fromager_graph::Error::ConflictingVersions { name }) => {
            return Err(Error::ConstraintConflict { name });
        }
        Err(other) => return Err(other.into()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_normalize::PackageName;
    use fromager_types::RequirementType;
    use fromager_version::Version;

    fn add(graph: &mut Graph, name: &str, version: &str) -> String {
        let pkg = PackageName::new(name).unwrap();
        let v: Version = version.parse().unwrap();
        graph.insert_node(&pkg, &v, "https://example.invalid/x.tar.gz")
    }

    #[test]
    fn test_linearize_respects_build_edges() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", "1.0");
        let b = add(&mut graph, "b", "1.0");
        // a depends on b at build-system time: edge a -> b
        graph.add_edge(
            &a,
            fromager_graph::Edge {
                key: b.clone(),
                req_type: RequirementType::BuildSystem,
                req: "b".to_string(),
            },
        );

        let order = linearize(&graph);
        let pos_a = order.iter().position(|k| k == &a).unwrap();
        let pos_b = order.iter().position(|k| k == &b).unwrap();
        assert!(pos_b < pos_a, "build-dep b must precede a");
    }

    #[test]
    fn test_build_order_entries_records_edge_type_and_requirement() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", "1.0");
        let b = add(&mut graph, "b", "1.0");
        graph.add_edge(
            &a,
            fromager_graph::Edge {
                key: b.clone(),
                req_type: RequirementType::BuildSystem,
                req: "b>=1.0".to_string(),
            },
        );

        let order = linearize(&graph);
        let entries = build_order_entries(&graph, &order);
        let b_entry = entries.iter().find(|e| e.dist == "b").unwrap();
        assert_eq!(b_entry.req_type, RequirementType::BuildSystem);
        assert_eq!(b_entry.req, "b>=1.0");
        assert_eq!(b_entry.version, "1.0");
    }

    #[test]
    fn test_linearize_ignores_install_edges_for_ordering() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", "1.0");
        let b = add(&mut graph, "b", "1.0");
        graph.add_edge(
            &a,
            fromager_graph::Edge {
                key: b.clone(),
                req_type: RequirementType::Install,
                req: "b".to_string(),
            },
        );
        let order = linearize(&graph);
        assert_eq!(order.len(), 2);
    }
}

//! The parallel build scheduler (`spec.md` §4.14): given a serialized
//! graph and a starting set of already-available artifacts, dispatches
//! ready-to-build nodes onto a bounded worker pool, draining in-flight
//! work before and during any "exclusive build" package.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fromager_graph::Graph;
use fromager_normalize::PackageName;
use serde::Serialize;
use tokio::task::JoinSet;

#[derive(Debug, Clone, thiserror::Error)]
#[error("build of `{key}` failed: {detail}")]
pub struct JobError {
    pub key: String,
    pub detail: String,
}

/// One build job, run by the scheduler once `key`'s build-edge
/// predecessors are all available. The scheduler knows nothing about
/// what building actually entails (PEP-517 invocation is out of scope,
/// `spec.md` §1) -- it only dispatches and tracks outcomes.
#[async_trait::async_trait]
pub trait BuildJob: Send + Sync {
    async fn build(&self, key: &str, log_path: &Path) -> Result<(), JobError>;
}

/// `workers ≤ min(⌊cores / cpu_cores_per_job⌋, ⌊mem_gb / memory_per_job_gb⌋, --jobs)`.
#[must_use]
pub fn worker_count(cores: usize, cpu_cores_per_job: f64, mem_gb: f64, memory_per_job_gb: f64, jobs_cli: Option<usize>) -> usize {
    let by_cpu = if cpu_cores_per_job > 0.0 {
        ((cores as f64) / cpu_cores_per_job).floor() as usize
    } else {
        usize::MAX
    };
    let by_mem = if memory_per_job_gb > 0.0 {
        (mem_gb / memory_per_job_gb).floor() as usize
    } else {
        usize::MAX
    };
    let mut n = by_cpu.min(by_mem);
    if let Some(jobs) = jobs_cli {
        n = n.min(jobs);
    }
    n.max(1)
}

/// Nodes whose build-edge predecessors are all already in `available`,
/// excluding nodes that are themselves already available, in flight, or
/// previously failed.
#[must_use]
pub fn ready_nodes(graph: &Graph, available: &HashSet<String>, in_flight: &HashSet<String>, failed: &HashSet<String>) -> Vec<String> {
    let mut ready: Vec<String> = graph
        .non_root_keys()
        .filter(|key| !available.contains(*key) && !in_flight.contains(*key) && !failed.contains(*key))
        .filter(|key| {
            graph
                .get(key)
                .is_some_and(|node| node.edges.iter().filter(|e| e.req_type.is_build_edge()).all(|e| available.contains(&e.key)))
        })
        .map(str::to_string)
        .collect();
    ready.sort();
    ready
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub failed: Vec<JobFailure>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub key: String,
    pub detail: String,
}

impl RunSummary {
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Build summary\n\n");
        out.push_str(&format!("- completed: {}\n", self.completed.len()));
        out.push_str(&format!("- failed: {}\n", self.failed.len()));
        out.push_str(&format!("- skipped: {}\n\n", self.skipped.len()));
        if !self.failed.is_empty() {
            out.push_str("## Failures\n\n");
            for failure in &self.failed {
                out.push_str(&format!("- `{}`: {}\n", failure.key, failure.detail));
            }
        }
        out
    }
}

/// Runs every node in `graph` that isn't already in `initial_available`
/// to completion (success, failure, or skip), respecting `exclusive`
/// package names and `workers` concurrency.
pub async fn run(
    graph: &Graph,
    initial_available: HashSet<String>,
    exclusive: &HashSet<PackageName>,
    workers: usize,
    job: Arc<dyn BuildJob>,
    log_dir: &Path,
) -> RunSummary {
    let mut available = initial_available;
    let mut failed: HashSet<String> = HashSet::new();
    let mut failures = Vec::new();
    let mut in_flight_keys: HashSet<String> = HashSet::new();
    let mut in_flight: JoinSet<(String, Result<(), JobError>)> = JoinSet::new();
    let mut any_failure = false;

    loop {
        if !any_failure {
            let ready = ready_nodes(graph, &available, &in_flight_keys, &failed);
            for key in ready {
                let is_exclusive = graph
                    .get(&key)
                    .and_then(|n| PackageName::new(&n.canonicalized_name).ok())
                    .is_some_and(|n| exclusive.contains(&n));

                if is_exclusive {
                    drain_all(&mut in_flight, &mut in_flight_keys, &mut available, &mut failed, &mut failures).await;
                    run_one(&key, &job, log_dir, &mut available, &mut failed, &mut failures).await;
                    if !failures.is_empty() {
                        any_failure = true;
                    }
                    continue;
                }

                if in_flight_keys.len() >= workers.max(1) {
                    break;
                }
                in_flight_keys.insert(key.clone());
                let job = job.clone();
                let log_path = log_dir.join(format!("{}.log", sanitize(&key)));
                in_flight.spawn(async move {
                    let result = job.build(&key, &log_path).await;
                    (key, result)
                });
            }
        }

        if in_flight.is_empty() {
            break;
        }

        if let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((key, Ok(()))) => {
                    in_flight_keys.remove(&key);
                    available.insert(key);
                }
                Ok((key, Err(err))) => {
                    in_flight_keys.remove(&key);
                    failed.insert(key);
                    failures.push(JobFailure { key: err.key.clone(), detail: err.detail });
                    any_failure = true;
                }
                Err(join_err) => {
                    any_failure = true;
                    failures.push(JobFailure {
                        key: "<unknown>".to_string(),
                        detail: join_err.to_string(),
                    });
                }
            }
        }
    }

    let skipped: Vec<String> = graph
        .non_root_keys()
        .filter(|k| !available.contains(*k) && !failed.contains(*k))
        .map(str::to_string)
        .collect();

    RunSummary {
        completed: {
            let mut v: Vec<String> = available.into_iter().collect();
            v.sort();
            v
        },
        failed: failures,
        skipped,
    }
}

async fn drain_all(
    in_flight: &mut JoinSet<(String, Result<(), JobError>)>,
    in_flight_keys: &mut HashSet<String>,
    available: &mut HashSet<String>,
    failed: &mut HashSet<String>,
    failures: &mut Vec<JobFailure>,
) {
    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok((key, Ok(()))) => {
                in_flight_keys.remove(&key);
                available.insert(key);
            }
            Ok((key, Err(err))) => {
                in_flight_keys.remove(&key);
                failed.insert(key);
                failures.push(JobFailure { key: err.key.clone(), detail: err.detail });
            }
            Err(join_err) => failures.push(JobFailure {
                key: "<unknown>".to_string(),
                detail: join_err.to_string(),
            }),
        }
    }
}

async fn run_one(
    key: &str,
    job: &Arc<dyn BuildJob>,
    log_dir: &Path,
    available: &mut HashSet<String>,
    failed: &mut HashSet<String>,
    failures: &mut Vec<JobFailure>,
) {
    let log_path = log_dir.join(format!("{}.log", sanitize(key)));
    match job.build(key, &log_path).await {
        Ok(()) => {
            available.insert(key.to_string());
        }
        Err(err) => {
            failed.insert(key.to_string());
            failures.push(JobFailure { key: err.key, detail: err.detail });
        }
    }
}

fn sanitize(key: &str) -> String {
    key.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' }).collect()
}

/// Writes `summary.md` and `summary.json` under `output_dir`.
pub fn write_summary(summary: &RunSummary, output_dir: &Path) -> std::io::Result<()> {
    fs_err::write(PathBuf::from(output_dir).join("summary.md"), summary.to_markdown())?;
    let json = serde_json::to_vec_pretty(summary).unwrap_or_default();
    fs_err::write(PathBuf::from(output_dir).join("summary.json"), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fromager_graph::Edge;
    use fromager_types::RequirementType;
    use fromager_version::Version;
    use tempfile::tempdir;

    fn add(graph: &mut Graph, name: &str, version: &str) -> String {
        let pkg = PackageName::new(name).unwrap();
        let v: Version = version.parse().unwrap();
        graph.insert_node(&pkg, &v, "https://example.invalid/x.tar.gz")
    }

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl BuildJob for AlwaysSucceeds {
        async fn build(&self, _key: &str, _log_path: &Path) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[test]
    fn test_worker_count_respects_all_three_ceilings() {
        assert_eq!(worker_count(8, 2.0, 16.0, 4.0, None), 4);
        assert_eq!(worker_count(8, 2.0, 16.0, 4.0, Some(2)), 2);
    }

    #[test]
    fn test_ready_nodes_needs_build_predecessors_available() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", "1.0");
        let b = add(&mut graph, "b", "1.0");
        graph.add_edge(
            &a,
            Edge {
                key: b.clone(),
                req_type: RequirementType::BuildSystem,
                req: "b".to_string(),
            },
        );

        let empty = HashSet::new();
        let ready = ready_nodes(&graph, &empty, &empty, &empty);
        assert_eq!(ready, vec![b.clone()]);

        let mut available = HashSet::new();
        available.insert(b);
        let ready = ready_nodes(&graph, &available, &empty, &empty);
        assert_eq!(ready, vec![a]);
    }

    #[tokio::test]
    async fn test_run_completes_all_nodes() {
        let mut graph = Graph::new();
        add(&mut graph, "a", "1.0");
        add(&mut graph, "b", "1.0");

        let dir = tempdir().unwrap();
        let summary = run(&graph, HashSet::new(), &HashSet::new(), 2, Arc::new(AlwaysSucceeds), dir.path()).await;
        assert_eq!(summary.completed.len(), 2);
        assert!(summary.failed.is_empty());
        assert!(summary.skipped.is_empty());
    }
}

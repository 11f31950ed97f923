//! The bootstrap orchestrator (`spec.md` §4.13): the recursive
//! per-`(name, version)` state machine that ties every other
//! `fromager-*` crate together, matching the "bundle of collaborators
//! threaded down the call tree" role `uv-dispatch`'s `BuildDispatch`
//! plays in the teacher workspace.

mod memo;
mod order;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fromager_constraints::ConstraintsStore;
use fromager_graph::{Edge, Graph, ROOT_KEY};
use fromager_hooks::HookRegistry;
use fromager_normalize::PackageName;
use fromager_resolver::{ProviderCandidate, ResolverProvider};
use fromager_settings::Settings;
use fromager_types::{BuildArtifact, Candidate, RequirementType, RetrieveMethod};
use fromager_version::{MarkerEnvironment, Requirement, Version};
use memo::{MemoOutcome, MemoTable};
use reqwest_middleware::ClientWithMiddleware;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

pub use memo::MemoTable;
pub use order::{build_order_entries, linearize, write_outputs, BuildOrderEntry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`{name}` was already resolved to `{recorded}`, which does not satisfy the new requirement `{requirement}`")]
    IncompatibleReentry {
        name: String,
        recorded: String,
        requirement: String,
    },
    #[error("resolution of `{0}` failed previously and is not retried within one bootstrap run")]
    PriorFailure(String),
    #[error("`{dist}` has no parseable name/version in its source tree")]
    UnidentifiableSource { dist: String },
    #[error(transparent)]
    Settings(#[from] fromager_settings::Error),
    #[error(transparent)]
    Resolver(#[from] fromager_resolver::Error),
    #[error(transparent)]
    Source(#[from] fromager_source::Error),
    #[error(transparent)]
    Patch(#[from] fromager_patch::Error),
    #[error(transparent)]
    Extract(#[from] fromager_extract::Error),
    #[error(transparent)]
    BuildEnv(#[from] fromager_buildenv::Error),
    #[error(transparent)]
    Build(#[from] fromager_build::Error),
    #[error(transparent)]
    Cache(#[from] fromager_cache::Error),
    #[error(transparent)]
    Graph(#[from] fromager_graph::Error),
    #[error(transparent)]
    Order(#[from] order::Error),
    #[error(transparent)]
    Version(#[from] fromager_version::VersionParseError),
    #[error(transparent)]
    Requirement(#[from] fromager_version::InvalidRequirement),
    #[error(transparent)]
    Fs(#[from] fromager_fs::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl fromager_types::severity::BootstrapError for Error {
    fn severity(&self) -> fromager_types::severity::Severity {
        use fromager_types::severity::Severity;
        match self {
            Self::IncompatibleReentry { .. } | Self::PriorFailure(_) | Self::UnidentifiableSource { .. } => Severity::NodeFailed,
            Self::Settings(_) => Severity::Fatal,
            Self::Resolver(e) => e.severity(),
            Self::Source(e) => e.severity(),
            Self::Patch(e) => e.severity(),
            Self::Extract(e) => e.severity(),
            Self::BuildEnv(e) => e.severity(),
            Self::Build(e) => e.severity(),
            Self::Cache(_) | Self::Fs(_) | Self::Io(_) | Self::Zip(_) => Severity::NodeFailed,
            Self::Graph(_) | Self::Order(_) => Severity::Fatal,
            Self::Version(_) | Self::Requirement(_) => Severity::NodeFailed,
        }
    }
}

use fromager_types::severity::BootstrapError as _;

/// Per-`(name, version)` lifecycle state, tracked for introspection
/// (`--verbose` progress output, tests) alongside the memo table's own
/// claim/done bookkeeping, which is what actually gates recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Resolving,
    SourceReady,
    BuildDepsReady,
    Built,
    Recorded,
    Failed,
}

/// The black-box seams this crate plugs real implementations into. Every
/// field is `Arc<dyn Trait>` so `WorkContext` stays cheaply `Clone`.
pub struct Drivers {
    pub resolver: Arc<dyn ResolverProvider>,
    pub pep517: Arc<dyn fromager_extract::Pep517Driver>,
    pub env_installer: Arc<dyn fromager_buildenv::EnvInstaller>,
    pub build_driver: Arc<dyn fromager_build::BuildDriver>,
}

/// Filesystem roots the orchestrator writes under.
#[derive(Debug, Clone)]
pub struct Roots {
    pub sdists: PathBuf,
    pub wheels: PathBuf,
    pub work: PathBuf,
    pub patches: PathBuf,
    pub output: PathBuf,
}

/// The bundle of collaborators threaded through every recursive call.
/// `Clone` is cheap: every field is already `Arc`-wrapped or `Copy`.
#[derive(Clone)]
pub struct WorkContext {
    pub settings: Arc<Settings>,
    pub constraints: Arc<ConstraintsStore>,
    pub variant: String,
    pub sdist_only: bool,
    pub skip_constraints: bool,
    pub cache: Arc<fromager_cache::WheelCache>,
    pub graph: Arc<Mutex<Graph>>,
    pub node_states: Arc<Mutex<FxHashMap<String, NodeState>>>,
    pub hooks: Arc<HookRegistry<WorkContext>>,
    pub drivers: Arc<Drivers>,
    pub roots: Arc<Roots>,
    pub memo: Arc<MemoTable>,
    pub prior_graph: Option<Arc<fromager_repeatable::PriorGraph>>,
    pub http_client: ClientWithMiddleware,
    pub marker_env: Arc<MarkerEnvironment>,
    pub wheel_server_url: String,
}

impl WorkContext {
    /// `Settings::get` always wants a concrete version (for the
    /// version-specific overlay layer); before a name is resolved no
    /// version-specific override can meaningfully apply yet, so pre-resolve
    /// callers pass `None` and get the global/per-package/variant layers
    /// merged against a placeholder version.
    fn effective_settings(&self, name: &PackageName, version: Option<&Version>) -> Result<fromager_settings::EffectiveSettings, Error> {
        let placeholder;
        let version = match version {
            Some(v) => v,
            None => {
                placeholder = Version::new(vec![0]);
                &placeholder
            }
        };
        Ok(self.settings.get(name, &self.variant, version)?)
    }
}

/// Runs the full recursive walk for every toplevel requirement, then
/// writes `graph.json`/`build-order.json`/`constraints.txt` under
/// `ctx.roots.output`.
pub async fn bootstrap(ctx: WorkContext, toplevel: Vec<Requirement>) -> Result<Graph, Error> {
    for requirement in toplevel {
        resolve_and_build(ctx.clone(), ROOT_KEY.to_string(), requirement, RequirementType::Toplevel).await?;
    }

    let graph = ctx.graph.lock().await.clone();
    write_outputs(&graph, &ctx.roots.output, ctx.skip_constraints)?;
    Ok(graph)
}

/// Implements `spec.md` §4.13's 8-step contract for one requirement edge.
/// Recursion is boxed because `async fn` cannot be directly recursive.
fn resolve_and_build(
    ctx: WorkContext,
    parent_key: String,
    requirement: Requirement,
    req_type: RequirementType,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send>> {
    Box::pin(async move {
        let name = requirement.name.clone();

        // Step 1: consult the memoization table before doing any work.
        // "If the resolved (name, version) is already Recorded, simply
        // append the edge; do not recurse."
        match ctx.memo.claim_or_wait(&name).await {
            MemoOutcome::AlreadyDone(version) => {
                if !requirement.satisfies(&version) {
                    return Err(Error::IncompatibleReentry {
                        name: name.to_string(),
                        recorded: version.to_string(),
                        requirement: requirement.raw().to_string(),
                    });
                }
                let key = fromager_graph::node_key(&name, &version);
                let mut graph = ctx.graph.lock().await;
                graph.add_edge(
                    &parent_key,
                    Edge {
                        key,
                        req_type,
                        req: requirement.raw().to_string(),
                    },
                );
                return Ok(());
            }
            MemoOutcome::AlreadyFailed => return Err(Error::PriorFailure(name.to_string())),
            MemoOutcome::ClaimedByMe => {}
        }

        match build_one(&ctx, &parent_key, &requirement, req_type).await {
            Ok(version) => {
                ctx.memo.finish(&name, version).await;
                Ok(())
            }
            Err(err) => {
                ctx.memo.fail(&name).await;
                set_state(&ctx, &format!("{name}==?"), NodeState::Failed).await;
                Err(err)
            }
        }
    })
}

async fn set_state(ctx: &WorkContext, key: &str, state: NodeState) {
    ctx.node_states.lock().await.insert(key.to_string(), state);
}

/// Resolves, acquires, builds, and records one package, returning the
/// version it settled on so the caller can update the memo table.
async fn build_one(ctx: &WorkContext, parent_key: &str, requirement: &Requirement, req_type: RequirementType) -> Result<Version, Error> {
    let name = requirement.name.clone();

    // Step 1a/1c: direct-URL requirements skip the resolver entirely;
    // everything else goes through the provider registry, narrowed to a
    // prior-graph pin when one is compatible (the repeatable-build layer).
    let (candidate, acquired_first) = if let Some(direct) = &requirement.direct_url {
        let method = match direct.scheme {
            fromager_version::DirectUrlScheme::Sdist | fromager_version::DirectUrlScheme::Archive => RetrieveMethod::Tarball,
            fromager_version::DirectUrlScheme::GitHttps => RetrieveMethod::GitHttps,
            fromager_version::DirectUrlScheme::GitSsh => RetrieveMethod::GitSsh,
        };
        let placeholder = Candidate {
            name: name.clone(),
            version: Version::new(vec![0]),
            retrieve_url: direct.url.parse().map_err(|_| Error::UnidentifiableSource { dist: name.to_string() })?,
            retrieve_method: method,
            git_ref: direct.git_ref.clone(),
        };
        (placeholder, true)
    } else {
        let effective = ctx.effective_settings(&name, None)?;
        let include_wheels = effective.pre_built || !ctx.sdist_only;
        let candidates = ctx.drivers.resolver.candidates(&name, true, include_wheels).await?;
        let candidates = narrow_to_prior_pin(ctx, requirement, &name, candidates);
        let chosen = fromager_resolver::select_best(requirement, &candidates, &ctx.constraints)?;
        (chosen, false)
    };

    set_state(ctx, &format!("{name}==resolving"), NodeState::Resolving).await;

    let effective = ctx.effective_settings(&name, Some(&candidate.version))?;

    // Step 2: wheel-cache fast path. Skipped for direct-URL sources,
    // whose version isn't known until after acquisition.
    if !acquired_first {
        let fingerprint = compute_fingerprint(ctx, &effective)?;
        if let Some(cached_wheel) = ctx.cache.find_by_fingerprint(&name, &candidate.version, &fingerprint) {
            let key = fromager_graph::node_key(&name, &candidate.version);
            record_edge(ctx, parent_key, &key, req_type, requirement).await;
            insert_node(ctx, &name, &candidate.version, candidate.retrieve_url.as_str()).await;

            let wheel = BuildArtifact::Wheel {
                path: cached_wheel.clone(),
                build_tag: None,
                local_version: None,
            };
            ctx.hooks.fire_prebuilt_wheel(ctx, &name, &wheel).await;

            let metadata = read_wheel_metadata_text(&cached_wheel)?;
            recurse_install_deps(ctx, &key, &name, &metadata).await?;
            ctx.hooks.fire_post_bootstrap(ctx, &name, None, Some(&wheel)).await;
            set_state(ctx, &key, NodeState::Recorded).await;
            return Ok(candidate.version);
        }
    }

    // Step 3: acquire source and prepare the tree.
    let acquired = fromager_source::acquire(
        &ctx.http_client,
        &candidate,
        &ctx.roots.sdists,
        &ctx.roots.wheels,
        effective.git_options.as_ref(),
        None,
    )
    .await?;

    let (name, version) = if acquired_first {
        read_identity_from_tree(&acquired.path)?
    } else {
        (name, candidate.version.clone())
    };

    if acquired.retrieve_method == RetrieveMethod::PrebuiltWheel {
        let key = fromager_graph::node_key(&name, &version);
        record_edge(ctx, parent_key, &key, req_type, requirement).await;
        insert_node(ctx, &name, &version, candidate.retrieve_url.as_str()).await;

        let wheel = BuildArtifact::Wheel {
            path: acquired.path.clone(),
            build_tag: None,
            local_version: None,
        };
        ctx.hooks.fire_prebuilt_wheel(ctx, &name, &wheel).await;
        let metadata = read_wheel_metadata_text(&acquired.path)?;
        recurse_install_deps(ctx, &key, &name, &metadata).await?;
        ctx.hooks.fire_post_bootstrap(ctx, &name, None, Some(&wheel)).await;
        set_state(ctx, &key, NodeState::Recorded).await;
        return Ok(version);
    }

    let effective = ctx.effective_settings(&name, Some(&version))?;
    let source_root = ctx.roots.work.join(format!("{name}-{version}"));
    extract_archive(&acquired.path, &source_root)?;

    let override_name = fromager_patch::override_name(name.as_str());
    let patches = fromager_patch::collect_patches(&ctx.roots.patches, &override_name, &version, &ctx.variant);
    fromager_patch::apply_patches(&source_root, &patches, None, effective.vendor_rust_before_patch)?;
    fromager_patch::write_create_files(&source_root, &effective.create_files)?;
    fromager_patch::ensure_pkg_info(&source_root, None, name.as_str(), &version)?;
    if let Some(project_override) = &effective.project_override {
        fromager_patch::apply_project_override(&source_root, project_override)?;
    }

    let key = fromager_graph::node_key(&name, &version);
    record_edge(ctx, parent_key, &key, req_type, requirement).await;
    insert_node(ctx, &name, &version, candidate.retrieve_url.as_str()).await;
    set_state(ctx, &key, NodeState::SourceReady).await;

    // Step 4: build-system deps.
    let build_system_raw = fromager_extract::build_system_requires(&source_root)?;
    let build_system_reqs = fromager_extract::parse_and_filter(&build_system_raw, RequirementType::BuildSystem, &ctx.marker_env)?;
    for extracted in &build_system_reqs {
        resolve_and_build(ctx.clone(), key.clone(), extracted.requirement.clone(), RequirementType::BuildSystem).await?;
    }

    // Step 5: build environment seeded with build-system deps, then
    // build-backend/build-sdist deps extracted via the PEP-517 driver.
    let env_root = ctx.roots.work.join(format!("{name}-{version}-buildenv"));
    let env_requirements: Vec<_> = build_system_reqs
        .iter()
        .map(|r| fromager_buildenv::EnvRequirement {
            raw: r.requirement.raw().to_string(),
            needed_by: name.to_string(),
        })
        .collect();
    let build_env = fromager_buildenv::BuildEnvironment::create(env_root, &env_requirements, &ctx.wheel_server_url, ctx.drivers.env_installer.as_ref()).await?;

    let config_settings: std::collections::HashMap<String, String> = effective.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let backend_raw = ctx.drivers.pep517.get_requires_for_build_wheel(&source_root, &config_settings).await?;
    let sdist_raw = ctx.drivers.pep517.get_requires_for_build_sdist(&source_root, &config_settings).await?;
    let backend_reqs = fromager_extract::parse_and_filter(&backend_raw, RequirementType::BuildBackend, &ctx.marker_env)?;
    let sdist_reqs = fromager_extract::parse_and_filter(&sdist_raw, RequirementType::BuildSdist, &ctx.marker_env)?;
    for extracted in backend_reqs.iter().chain(sdist_reqs.iter()) {
        resolve_and_build(ctx.clone(), key.clone(), extracted.requirement.clone(), extracted.req_type).await?;
    }
    set_state(ctx, &key, NodeState::BuildDepsReady).await;

    // Step 6: build sdist then wheel, move the artifacts into the cache,
    // tag the wheel, populate its dist-info extras.
    let sdist_artifact = if effective.pre_built {
        None
    } else {
        let path = ctx.drivers.build_driver.build_sdist(&source_root, &build_env.root).await?;
        Some(BuildArtifact::Sdist { path })
    };
    let built_wheel_path = if ctx.sdist_only && !effective.pre_built {
        None
    } else {
        Some(ctx.drivers.build_driver.build_wheel(&source_root, &build_env.root).await?)
    };

    let wheel_artifact = if let Some(wheel_path) = built_wheel_path {
        let build_tag = effective.build_tag(&version, &ctx.variant);
        let renamed = fromager_build::rename_with_build_tag(&wheel_path, &name, &version, build_tag)?;
        fromager_build::populate_dist_info_extras(
            &renamed,
            &fromager_build::DistInfoExtras {
                build_settings_yaml: serde_yaml_snapshot(&effective),
                build_system_requirements: build_system_raw.clone(),
                build_backend_requirements: backend_raw.clone(),
                build_sdist_requirements: sdist_raw.clone(),
                elf_requires: None,
            },
        )?;
        let filename = renamed.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let recorded = ctx.cache.record_wheel(&name, &filename, &renamed)?;
        let fingerprint = compute_fingerprint(ctx, &effective)?;
        ctx.cache.record_fingerprint(&recorded, &fingerprint)?;
        Some(BuildArtifact::Wheel {
            path: recorded,
            build_tag: Some(build_tag),
            local_version: None,
        })
    } else {
        None
    };

    set_state(ctx, &key, NodeState::Built).await;
    if let Some(wheel) = &wheel_artifact {
        ctx.hooks.fire_post_build(ctx, &name, sdist_artifact.as_ref(), wheel).await;
    }

    // Step 7: install-deps, recursed as `install` edges.
    if let Some(wheel) = &wheel_artifact {
        let metadata = read_wheel_metadata_text(wheel.path())?;
        recurse_install_deps(ctx, &key, &name, &metadata).await?;
    }

    // Step 8.
    ctx.hooks.fire_post_bootstrap(ctx, &name, sdist_artifact.as_ref(), wheel_artifact.as_ref()).await;
    set_state(ctx, &key, NodeState::Recorded).await;

    Ok(version)
}

async fn recurse_install_deps(ctx: &WorkContext, key: &str, _name: &PackageName, metadata_text: &str) -> Result<(), Error> {
    let raw = fromager_extract::parse_requires_dist(metadata_text);
    let extracted = fromager_extract::parse_and_filter(&raw, RequirementType::Install, &ctx.marker_env)?;
    for req in extracted {
        resolve_and_build(ctx.clone(), key.to_string(), req.requirement, RequirementType::Install).await?;
    }
    Ok(())
}

async fn record_edge(ctx: &WorkContext, parent_key: &str, key: &str, req_type: RequirementType, requirement: &Requirement) {
    let mut graph = ctx.graph.lock().await;
    graph.add_edge(
        parent_key,
        Edge {
            key: key.to_string(),
            req_type,
            req: requirement.raw().to_string(),
        },
    );
}

async fn insert_node(ctx: &WorkContext, name: &PackageName, version: &Version, download_url: &str) {
    let mut graph = ctx.graph.lock().await;
    graph.insert_node(name, version, download_url);
}

/// Narrows resolver candidates to the prior graph's pinned version when
/// one exists and is still compatible, implementing the repeatable-build
/// layer without re-threading URL discovery through a separate path.
fn narrow_to_prior_pin(
    ctx: &WorkContext,
    requirement: &Requirement,
    name: &PackageName,
    candidates: Vec<ProviderCandidate>,
) -> Vec<ProviderCandidate> {
    let Some(prior) = &ctx.prior_graph else {
        return candidates;
    };
    match fromager_repeatable::pin_from_prior(prior, requirement, name, &ctx.constraints) {
        Some(pinned) => {
            let narrowed: Vec<_> = candidates.into_iter().filter(|c| c.candidate.version == pinned).collect();
            if narrowed.is_empty() {
                Vec::new()
            } else {
                narrowed
            }
        }
        None => candidates,
    }
}

fn compute_fingerprint(ctx: &WorkContext, effective: &fromager_settings::EffectiveSettings) -> Result<fromager_cache::Fingerprint, Error> {
    let patch_contents = effective
        .patches
        .iter()
        .filter_map(|p| fs_err::read(p).ok())
        .collect();
    let settings_hash = fromager_fs::sha256_bytes(serde_yaml_snapshot(effective).as_bytes());
    let inputs = fromager_cache::FingerprintInputs {
        settings_yaml_hashes: vec![settings_hash],
        patch_contents_in_order: patch_contents,
        variant: ctx.variant.clone(),
        env_vars: effective.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        resolver_provider_identity: "fromager-resolver".to_string(),
        override_plugin_identity: None,
    };
    Ok(fromager_cache::Fingerprint::compute(&inputs))
}

fn serde_yaml_snapshot(effective: &fromager_settings::EffectiveSettings) -> String {
    format!(
        "env: {:?}\npatches: {:?}\nvendor_rust_before_patch: {}\n",
        effective.env, effective.patches, effective.vendor_rust_before_patch
    )
}

/// Reads `<name>-<version>.dist-info/METADATA` out of a wheel archive.
fn read_wheel_metadata_text(wheel_path: &Path) -> Result<String, Error> {
    let file = std::fs::File::open(wheel_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let name = archive.name_for_index(i).unwrap_or_default().to_string();
        if name.ends_with(".dist-info/METADATA") {
            use std::io::Read;
            let mut entry = archive.by_index(i)?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            return Ok(text);
        }
    }
    Ok(String::new())
}

/// Reads the project name/version a direct-URL source tree declares,
/// preferring `pyproject.toml`'s `[project]` table and falling back to
/// `PKG-INFO`.
fn read_identity_from_tree(root: &Path) -> Result<(PackageName, Version), Error> {
    let pyproject = root.join("pyproject.toml");
    if let Ok(text) = fs_err::read_to_string(&pyproject) {
        if let Ok(doc) = text.parse::<toml_edit::DocumentMut>() {
            let project = doc.get("project");
            let name = project.and_then(|p| p.get("name")).and_then(|v| v.as_str());
            let version = project.and_then(|p| p.get("version")).and_then(|v| v.as_str());
            if let (Some(name), Some(version)) = (name, version) {
                let name = PackageName::new(name).map_err(|_| Error::UnidentifiableSource { dist: name.to_string() })?;
                let version: Version = version.parse()?;
                return Ok((name, version));
            }
        }
    }

    let pkg_info = root.join("PKG-INFO");
    if let Ok(text) = fs_err::read_to_string(&pkg_info) {
        let name = text.lines().find_map(|l| l.strip_prefix("Name: ")).map(str::trim);
        let version = text.lines().find_map(|l| l.strip_prefix("Version: ")).map(str::trim);
        if let (Some(name), Some(version)) = (name, version) {
            let name = PackageName::new(name).map_err(|_| Error::UnidentifiableSource { dist: name.to_string() })?;
            let version: Version = version.parse()?;
            return Ok((name, version));
        }
    }

    Err(Error::UnidentifiableSource {
        dist: root.display().to_string(),
    })
}

/// Extracting a downloaded tarball/zip into `dest` is ordinary archive
/// handling (not a black box per `spec.md` §1); kept as a thin wrapper so
/// the call site above reads in algorithm order.
fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), Error> {
    fs_err::create_dir_all(dest)?;
    if archive_path.extension().is_some_and(|e| e == "zip") {
        let file = std::fs::File::open(archive_path)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(dest)?;
    } else {
        let file = std::fs::File::open(archive_path)?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(dest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_identity_from_pyproject() {
        let dir = tempdir().unwrap();
        fs_err::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"stevedore\"\nversion = \"5.2.0\"\n",
        )
        .unwrap();
        let (name, version) = read_identity_from_tree(dir.path()).unwrap();
        assert_eq!(name.as_str(), "stevedore");
        assert_eq!(version, "5.2.0".parse().unwrap());
    }

    #[test]
    fn test_read_identity_falls_back_to_pkg_info() {
        let dir = tempdir().unwrap();
        fs_err::write(dir.path().join("PKG-INFO"), "Name: stevedore\nVersion: 5.2.0\n").unwrap();
        let (name, version) = read_identity_from_tree(dir.path()).unwrap();
        assert_eq!(name.as_str(), "stevedore");
        assert_eq!(version, "5.2.0".parse().unwrap());
    }
}

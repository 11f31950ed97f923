//! The settings store: YAML overlay resolution across global, per-package,
//! variant, and version-specific layers, plus template expansion of `env`
//! values (`spec.md` §4.3, §6).

mod schema;
pub mod template;

use std::collections::HashMap;
use std::path::Path;

use fromager_normalize::PackageName;
use fromager_version::Version;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

pub use schema::{
    ChangelogEntry, CreateFileEntry, DownloadSource, GitOptions, ProjectOverride, RawSettings,
    ResolverDist, SubmodulePolicy, VariantSettings,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read settings file `{path}`")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file `{path}`")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid package name in settings filename `{0}`")]
    InvalidPackageName(String),
    #[error(transparent)]
    Template(#[from] template::Error),
}

/// The fully merged settings for one (name, variant, version) triple, with
/// `env` expanded and list fields resolved to a single winning layer.
#[derive(Debug, Clone, Default)]
pub struct EffectiveSettings {
    pub download_source: Option<DownloadSource>,
    pub resolver_dist: Option<ResolverDist>,
    pub git_options: Option<GitOptions>,
    pub build_dir: Option<String>,
    pub env: IndexMap<String, String>,
    pub project_override: Option<ProjectOverride>,
    pub patches: Vec<String>,
    pub create_files: Vec<CreateFileEntry>,
    pub vendor_rust_before_patch: bool,
    pub cpu_cores_per_job: f64,
    pub memory_per_job_gb: f64,
    pub pre_built: bool,
    pub wheel_server_url: Option<String>,
    changelog: Vec<ChangelogEntry>,
}

impl EffectiveSettings {
    /// The build-tag integer: the count of changelog entries that apply to
    /// this exact version and variant (`spec.md` §4.3 invariant: "the build
    /// tag is the number of applicable changelog entries").
    #[must_use]
    pub fn build_tag(&self, version: &Version, variant: &str) -> u32 {
        let version_str = version.to_string();
        self.changelog
            .iter()
            .filter(|e| {
                e.version.as_deref().is_none_or(|v| v == version_str)
                    && e.variant.as_deref().is_none_or(|v| v == variant)
            })
            .count() as u32
    }
}

/// Loaded settings: one global document plus zero or more per-package
/// documents, keyed by the canonical name derived from the file's base
/// name (`spec.md` §4.3: "the per-package file's base name, sans
/// extension, is canonicalized to give the package name it overrides").
#[derive(Debug, Default)]
pub struct Settings {
    global: RawSettings,
    per_package: FxHashMap<PackageName, RawSettings>,
}

impl Settings {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(global_path: Option<&Path>, packages_dir: Option<&Path>) -> Result<Self, Error> {
        let global = match global_path {
            Some(p) => load_yaml(p)?,
            None => RawSettings::default(),
        };

        let mut per_package = FxHashMap::default();
        if let Some(dir) = packages_dir {
            if dir.is_dir() {
                let mut entries: Vec<_> = fs_err::read_dir(dir)
                    .map_err(|source| Error::Read {
                        path: dir.display().to_string(),
                        source,
                    })?
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| {
                        p.extension().is_some_and(|e| e == "yml" || e == "yaml")
                    })
                    .collect();
                // Lexicographic order, matching how the effective-settings
                // CLI subcommand enumerates package override files.
                entries.sort();

                for path in entries {
                    let stem = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default();
                    let name = PackageName::new(stem)
                        .map_err(|_| Error::InvalidPackageName(stem.to_string()))?;
                    let raw = load_yaml(&path)?;
                    per_package.insert(name, raw);
                }
            }
        }

        Ok(Self { global, per_package })
    }

    /// Resolve the effective settings for `name` at `version` under
    /// `variant`, applying the five-level overlay in order: defaults,
    /// global, per-package, variant, version-specific (`spec.md` §4.3).
    ///
    /// `env` maps merge key-by-key, later layers overriding individual
    /// keys. `patches`, `create_files`, and `changelog` are *not*
    /// concatenated across layers: the most specific layer that defines a
    /// non-empty list for that field wins outright, replacing anything a
    /// less specific layer set.
    pub fn get(
        &self,
        name: &PackageName,
        variant: &str,
        version: &Version,
    ) -> Result<EffectiveSettings, Error> {
        let empty = RawSettings::default();
        let per_pkg = self.per_package.get(name).unwrap_or(&empty);

        let variant_layer = per_pkg
            .variants
            .get(variant)
            .or_else(|| self.global.variants.get(variant));

        let version_str = version.to_string();
        let version_layer = variant_layer.and_then(|v| v.version.get(&version_str));

        let mut merged = EffectiveSettings::default();

        // scalars: later (more specific) layer wins if Some.
        macro_rules! scalar {
            ($field:ident) => {
                if let Some(v) = &self.global.$field {
                    merged.$field = Some(v.clone());
                }
                if let Some(v) = &per_pkg.$field {
                    merged.$field = Some(v.clone());
                }
                if let Some(v) = version_layer.and_then(|l| l.$field.as_ref()) {
                    merged.$field = Some(v.clone());
                }
            };
        }
        scalar!(download_source);
        scalar!(resolver_dist);
        scalar!(git_options);
        scalar!(build_dir);
        scalar!(project_override);

        merged.vendor_rust_before_patch = self
            .global
            .vendor_rust_before_patch
            .or(per_pkg.vendor_rust_before_patch)
            .or(version_layer.and_then(|l| l.vendor_rust_before_patch))
            .unwrap_or(false);
        merged.cpu_cores_per_job = self
            .global
            .cpu_cores_per_job
            .or(per_pkg.cpu_cores_per_job)
            .or(version_layer.and_then(|l| l.cpu_cores_per_job))
            .unwrap_or(1.0);
        merged.memory_per_job_gb = self
            .global
            .memory_per_job_gb
            .or(per_pkg.memory_per_job_gb)
            .or(version_layer.and_then(|l| l.memory_per_job_gb))
            .unwrap_or(1.0);

        merged.pre_built = variant_layer.and_then(|v| v.pre_built).unwrap_or(false);
        merged.wheel_server_url = variant_layer.and_then(|v| v.wheel_server_url.clone());

        // list fields: last non-empty layer wins wholesale.
        merged.patches = last_non_empty(
            [&self.global.patch, &per_pkg.patch]
                .into_iter()
                .chain(version_layer.map(|l| &l.patch)),
        );
        merged.create_files = last_non_empty_owned(
            [&self.global.create_files, &per_pkg.create_files]
                .into_iter()
                .chain(version_layer.map(|l| &l.create_files)),
        );
        merged.changelog = last_non_empty_owned(
            [&self.global.changelog, &per_pkg.changelog]
                .into_iter()
                .chain(version_layer.map(|l| &l.changelog)),
        );

        // env: key-by-key merge, global -> per-package -> variant -> version.
        let mut env_raw: IndexMap<String, String> = IndexMap::new();
        for (k, v) in &self.global.env {
            env_raw.insert(k.clone(), v.clone());
        }
        for (k, v) in &per_pkg.env {
            env_raw.insert(k.clone(), v.clone());
        }
        if let Some(v) = variant_layer {
            for (k, val) in &v.env {
                env_raw.insert(k.clone(), val.clone());
            }
        }
        if let Some(v) = version_layer {
            for (k, val) in &v.env {
                env_raw.insert(k.clone(), val.clone());
            }
        }

        let mut expanded: IndexMap<String, String> = IndexMap::new();
        let mut resolved_so_far: HashMap<String, String> = HashMap::new();
        for (k, raw_value) in &env_raw {
            let lookup = template::layered_lookup(&[&resolved_so_far]);
            let value = template::expand(raw_value, &lookup)?;
            resolved_so_far.insert(k.clone(), value.clone());
            expanded.insert(k.clone(), value);
        }
        merged.env = expanded;

        Ok(merged)
    }
}

fn load_yaml(path: &Path) -> Result<RawSettings, Error> {
    let text = fs_err::read_to_string(path).map_err(|source| Error::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| Error::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn last_non_empty<'a>(layers: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    layers
        .filter(|v| !v.is_empty())
        .last()
        .cloned()
        .unwrap_or_default()
}

fn last_non_empty_owned<'a, T: Clone + 'a>(layers: impl Iterator<Item = &'a Vec<T>>) -> Vec<T> {
    layers
        .filter(|v| !v.is_empty())
        .last()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    fn ver(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_global_only() {
        let global: RawSettings = serde_yaml::from_str("build_dir: /tmp/build\n").unwrap();
        let settings = Settings {
            global,
            per_package: FxHashMap::default(),
        };
        let effective = settings.get(&name("foo"), "default", &ver("1.0")).unwrap();
        assert_eq!(effective.build_dir.as_deref(), Some("/tmp/build"));
    }

    #[test]
    fn test_per_package_overrides_global_scalar() {
        let global: RawSettings = serde_yaml::from_str("build_dir: /global\n").unwrap();
        let mut per_package = FxHashMap::default();
        per_package.insert(
            name("foo"),
            serde_yaml::from_str::<RawSettings>("build_dir: /foo\n").unwrap(),
        );
        let settings = Settings { global, per_package };

        assert_eq!(
            settings.get(&name("foo"), "default", &ver("1.0")).unwrap().build_dir.as_deref(),
            Some("/foo")
        );
        assert_eq!(
            settings.get(&name("bar"), "default", &ver("1.0")).unwrap().build_dir.as_deref(),
            Some("/global")
        );
    }

    #[test]
    fn test_env_merges_key_by_key() {
        let global: RawSettings =
            serde_yaml::from_str("env:\n  A: one\n  B: two\n").unwrap();
        let mut per_package = FxHashMap::default();
        per_package.insert(
            name("foo"),
            serde_yaml::from_str::<RawSettings>("env:\n  B: override\n").unwrap(),
        );
        let settings = Settings { global, per_package };
        let effective = settings.get(&name("foo"), "default", &ver("1.0")).unwrap();
        assert_eq!(effective.env.get("A").unwrap(), "one");
        assert_eq!(effective.env.get("B").unwrap(), "override");
    }

    #[test]
    fn test_env_template_expansion_within_layer() {
        let global: RawSettings =
            serde_yaml::from_str("env:\n  BASE: /opt\n  DERIVED: ${BASE}/lib\n").unwrap();
        let settings = Settings {
            global,
            per_package: FxHashMap::default(),
        };
        let effective = settings.get(&name("foo"), "default", &ver("1.0")).unwrap();
        assert_eq!(effective.env.get("DERIVED").unwrap(), "/opt/lib");
    }

    #[test]
    fn test_patches_replaced_not_concatenated() {
        let global: RawSettings = serde_yaml::from_str("patch:\n  - a.patch\n").unwrap();
        let mut per_package = FxHashMap::default();
        per_package.insert(
            name("foo"),
            serde_yaml::from_str::<RawSettings>("patch:\n  - b.patch\n").unwrap(),
        );
        let settings = Settings { global, per_package };
        let effective = settings.get(&name("foo"), "default", &ver("1.0")).unwrap();
        assert_eq!(effective.patches, vec!["b.patch".to_string()]);
    }

    #[test]
    fn test_build_tag_counts_applicable_changelog_entries() {
        let global: RawSettings = serde_yaml::from_str(
            "changelog:\n  - message: one\n  - version: \"2.0\"\n    message: two\n",
        )
        .unwrap();
        let settings = Settings {
            global,
            per_package: FxHashMap::default(),
        };
        let effective = settings.get(&name("foo"), "default", &ver("1.0")).unwrap();
        assert_eq!(effective.build_tag(&ver("1.0"), "default"), 1);
        assert_eq!(effective.build_tag(&ver("2.0"), "default"), 2);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result: Result<RawSettings, _> = serde_yaml::from_str("not_a_real_field: 1\n");
        assert!(result.is_err());
    }
}

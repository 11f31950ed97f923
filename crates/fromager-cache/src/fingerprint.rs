//! The Wheel Build Settings Fingerprint (`spec.md` §3): a deterministic
//! digest of every input that could affect the produced wheel.

use fromager_fs::sha256_bytes;

/// The raw inputs that feed the fingerprint, gathered by the caller
/// (bootstrap orchestrator) from settings, the patch list, the active
/// variant, the builder's environment, and the active resolver/override
/// plugin identities.
#[derive(Debug, Clone, Default)]
pub struct FingerprintInputs {
    pub settings_yaml_hashes: Vec<String>,
    pub patch_contents_in_order: Vec<Vec<u8>>,
    pub variant: String,
    pub env_vars: Vec<(String, String)>,
    pub resolver_provider_identity: String,
    pub override_plugin_identity: Option<String>,
}

/// A digest string, opaque outside this crate except for equality and
/// display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Concatenates every input in a fixed, documented order (so the
    /// digest is reproducible across processes/platforms, per `spec.md`
    /// §8 invariant 4) and hashes the result with SHA-256.
    #[must_use]
    pub fn compute(inputs: &FingerprintInputs) -> Self {
        let mut buf = Vec::new();

        for hash in &inputs.settings_yaml_hashes {
            buf.extend_from_slice(hash.as_bytes());
            buf.push(0);
        }
        for patch in &inputs.patch_contents_in_order {
            buf.extend_from_slice(patch);
            buf.push(0);
        }
        buf.extend_from_slice(inputs.variant.as_bytes());
        buf.push(0);

        let mut env_vars = inputs.env_vars.clone();
        env_vars.sort();
        for (k, v) in &env_vars {
            buf.extend_from_slice(k.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(v.as_bytes());
            buf.push(0);
        }

        buf.extend_from_slice(inputs.resolver_provider_identity.as_bytes());
        buf.push(0);
        if let Some(plugin) = &inputs.override_plugin_identity {
            buf.extend_from_slice(plugin.as_bytes());
        }

        Self(sha256_bytes(&buf))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let inputs = FingerprintInputs {
            settings_yaml_hashes: vec!["h1".to_string()],
            variant: "cpu".to_string(),
            env_vars: vec![("B".to_string(), "2".to_string()), ("A".to_string(), "1".to_string())],
            resolver_provider_identity: "pypi".to_string(),
            ..Default::default()
        };
        assert_eq!(Fingerprint::compute(&inputs), Fingerprint::compute(&inputs));
    }

    #[test]
    fn test_env_var_order_does_not_affect_digest() {
        let a = FingerprintInputs {
            env_vars: vec![("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())],
            ..Default::default()
        };
        let b = FingerprintInputs {
            env_vars: vec![("B".to_string(), "2".to_string()), ("A".to_string(), "1".to_string())],
            ..Default::default()
        };
        assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
    }

    #[test]
    fn test_different_variant_differs() {
        let a = FingerprintInputs {
            variant: "cpu".to_string(),
            ..Default::default()
        };
        let b = FingerprintInputs {
            variant: "cuda".to_string(),
            ..Default::default()
        };
        assert_ne!(Fingerprint::compute(&a), Fingerprint::compute(&b));
    }
}

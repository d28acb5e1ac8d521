/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::consts::*;
use crate::{Error, Result};

/// How the webhook reacts to a watch-filter label that does not fit the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PolicyMode {
    /// Reject the managed label in exempt namespaces and any foreign label elsewhere.
    #[default]
    Strict,
    /// Leave exempt namespaces alone and only reject foreign labels elsewhere.
    Injector,
}

/// Namespace policy, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespacePolicy {
    #[serde(alias = "namespace_openshift_cluster_api")]
    pub exempt_namespace: String,
    #[serde(alias = "hyper_shift_label_name")]
    pub hosted_control_plane_label: String,
    #[serde(alias = "label_multi_cluster_engine")]
    pub managed_label_value: String,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            exempt_namespace: DEFAULT_EXEMPT_NAMESPACE.to_string(),
            hosted_control_plane_label: DEFAULT_HOSTED_CONTROL_PLANE_LABEL.to_string(),
            managed_label_value: DEFAULT_MANAGED_LABEL_VALUE.to_string(),
        }
    }
}

impl NamespacePolicy {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let policy: NamespacePolicy = serde_yaml::from_str(contents)
            .map_err(|e| Error::InvalidConfigError(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::ConfigFileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&contents)
    }

    // An empty managed value would make "unlabeled" and "managed" indistinguishable.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("exempt_namespace", &self.exempt_namespace),
            ("hosted_control_plane_label", &self.hosted_control_plane_label),
            ("managed_label_value", &self.managed_label_value),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidConfigError(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

#[derive(Debug, Parser, Clone)]
#[clap(name = "webhook", about = "Watch-filter label admission webhook for cluster-api resources")]
pub struct Cli {
    /// YAML file holding the namespace policy.
    #[clap(long, env = "WEBHOOK_CONFIG")]
    pub config: Option<PathBuf>,
    #[clap(long, value_enum, env = "WEBHOOK_MODE", default_value_t = PolicyMode::Strict)]
    pub mode: PolicyMode,
    #[clap(long, env = "WEBHOOK_BIND_ADDRESS", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: SocketAddr,
    #[clap(long, env = "WEBHOOK_TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,
    #[clap(long, env = "WEBHOOK_TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,
    #[clap(
        long,
        env = "WEBHOOK_NAMESPACE_LOOKUP_TIMEOUT_SECS",
        default_value_t = DEFAULT_NAMESPACE_LOOKUP_TIMEOUT_SECS
    )]
    pub namespace_lookup_timeout_secs: u64,
    #[clap(long)]
    pub exempt_namespace: Option<String>,
    #[clap(long)]
    pub hosted_control_plane_label: Option<String>,
    #[clap(long)]
    pub managed_label_value: Option<String>,
}

impl Cli {
    /// Builds the namespace policy from the optional file, then applies flag overrides.
    pub fn policy(&self) -> Result<NamespacePolicy> {
        let mut policy = match &self.config {
            Some(path) => NamespacePolicy::from_file(path)?,
            None => NamespacePolicy::default(),
        };
        if let Some(ns) = &self.exempt_namespace {
            policy.exempt_namespace.clone_from(ns);
        }
        if let Some(label) = &self.hosted_control_plane_label {
            policy.hosted_control_plane_label.clone_from(label);
        }
        if let Some(value) = &self.managed_label_value {
            policy.managed_label_value.clone_from(value);
        }
        policy.validate()?;
        Ok(policy)
    }

    pub fn tls(&self) -> Result<Option<TlsPaths>> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Ok(Some(TlsPaths {
                certificate_path: cert.clone(),
                private_key_path: key.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(Error::InvalidConfigError(
                "--tls-cert-path and --tls-key-path must be set together".to_string(),
            )),
        }
    }

    pub fn namespace_lookup_timeout(&self) -> Result<Duration> {
        if self.namespace_lookup_timeout_secs == 0 {
            return Err(Error::InvalidConfigError(
                "namespace lookup timeout must be at least one second".to_string(),
            ));
        }
        Ok(Duration::from_secs(self.namespace_lookup_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("webhook").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn defaults_match_the_multicluster_engine_setup() {
        let cli = parse(&[]);
        assert_eq!(cli.mode, PolicyMode::Strict);
        assert_eq!(cli.policy().unwrap(), NamespacePolicy::default());
        assert_eq!(cli.tls().unwrap(), None);
        assert_eq!(cli.namespace_lookup_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(cli.bind_address.port(), 9443);
    }

    #[test]
    fn mode_flag_selects_injector() {
        let cli = parse(&["--mode", "injector"]);
        assert_eq!(cli.mode, PolicyMode::Injector);
    }

    #[test]
    fn policy_file_accepts_partial_and_legacy_keys() {
        let policy = NamespacePolicy::from_yaml(
            "namespace_openshift_cluster_api: capi-system\nmanaged_label_value: acme\n",
        )
        .unwrap();
        assert_eq!(policy.exempt_namespace, "capi-system");
        assert_eq!(policy.hosted_control_plane_label, DEFAULT_HOSTED_CONTROL_PLANE_LABEL);
        assert_eq!(policy.managed_label_value, "acme");
    }

    #[test]
    fn policy_file_rejects_unknown_keys_and_empty_values() {
        assert!(matches!(
            NamespacePolicy::from_yaml("exempt_namespaces: foo\n"),
            Err(Error::InvalidConfigError(_))
        ));
        assert!(matches!(
            NamespacePolicy::from_yaml("managed_label_value: \"\"\n"),
            Err(Error::InvalidConfigError(_))
        ));
    }

    #[test]
    fn flags_override_the_policy_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exempt_namespace: from-file\nmanaged_label_value: from-file").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["--config", &path, "--managed-label-value", "from-flag"]);
        let policy = cli.policy().unwrap();
        assert_eq!(policy.exempt_namespace, "from-file");
        assert_eq!(policy.managed_label_value, "from-flag");
    }

    #[test]
    fn missing_policy_file_is_reported() {
        let cli = parse(&["--config", "/nonexistent/policy.yaml"]);
        assert!(matches!(cli.policy(), Err(Error::ConfigFileError { .. })));
    }

    #[test]
    fn tls_paths_must_come_in_pairs() {
        let cli = parse(&["--tls-cert-path", "/certs/tls.crt"]);
        assert!(matches!(cli.tls(), Err(Error::InvalidConfigError(_))));

        let cli = parse(&["--tls-cert-path", "/certs/tls.crt", "--tls-key-path", "/certs/tls.key"]);
        assert_eq!(
            cli.tls().unwrap(),
            Some(TlsPaths {
                certificate_path: PathBuf::from("/certs/tls.crt"),
                private_key_path: PathBuf::from("/certs/tls.key"),
            })
        );
    }

    #[test]
    fn zero_lookup_timeout_is_invalid() {
        let cli = parse(&["--namespace-lookup-timeout-secs", "0"]);
        assert!(cli.namespace_lookup_timeout().is_err());
    }
}

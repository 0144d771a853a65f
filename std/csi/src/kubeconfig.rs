//! Kubeconfig files, as written by `kubectl config`.
//!
//! Only a single file is read; the `KUBECONFIG` merge of several files is
//! not performed. Exec and auth-provider plugins are not run.

use crate::kube::{ClientIdentity, KubeConfigError, ResolvedConfig, Secret};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
    #[serde(default)]
    pub certificate_authority: Option<PathBuf>,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<PathBuf>,
    #[serde(default)]
    pub client_certificate: Option<PathBuf>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: String,
}

impl Kubeconfig {
    /// Parse a kubeconfig read from `path`.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, KubeConfigError> {
        serde_yaml::from_slice(bytes).map_err(|source| KubeConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Connection settings of `context`, or of the current context.
    ///
    /// Relative file references are taken relative to `dir`, the directory
    /// holding the kubeconfig.
    pub fn select(
        &self,
        context: Option<&str>,
        dir: &Path,
    ) -> Result<ResolvedConfig, KubeConfigError> {
        let context_name = context
            .or(self.current_context.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| KubeConfigError::Kubeconfig("no current context".into()))?;
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                KubeConfigError::Kubeconfig(format!("context {context_name} not found"))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                KubeConfigError::Kubeconfig(format!("cluster {} not found", context.cluster))
            })?;
        let user = if context.user.is_empty() {
            None
        } else {
            let user = self
                .users
                .iter()
                .find(|u| u.name == context.user)
                .map(|u| &u.user)
                .ok_or_else(|| {
                    KubeConfigError::Kubeconfig(format!("user {} not found", context.user))
                })?;
            Some(user)
        };
        tracing::debug!(context = context_name, cluster = %context.cluster, "kubeconfig context");

        let ca = secret(
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            dir,
        )?;
        let (token, identity) = match user {
            Some(user) => auth_of(&context.user, user, dir)?,
            None => (None, None),
        };
        Ok(ResolvedConfig {
            api_server: cluster.server.clone(),
            token,
            ca,
            identity,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

fn auth_of(
    name: &str,
    user: &AuthInfo,
    dir: &Path,
) -> Result<(Option<Secret>, Option<ClientIdentity>), KubeConfigError> {
    if user.exec.is_some() || user.auth_provider.is_some() {
        return Err(KubeConfigError::Kubeconfig(format!(
            "user {name} authenticates through a plugin, which is not supported"
        )));
    }
    let token = match (&user.token, &user.token_file) {
        (Some(token), _) => Some(Secret::Inline(token.clone().into_bytes())),
        (None, Some(path)) => Some(Secret::File(dir.join(path))),
        (None, None) => None,
    };
    let cert = secret(
        "client-certificate-data",
        user.client_certificate_data.as_deref(),
        user.client_certificate.as_deref(),
        dir,
    )?;
    let key = secret(
        "client-key-data",
        user.client_key_data.as_deref(),
        user.client_key.as_deref(),
        dir,
    )?;
    let identity = match (cert, key) {
        (Some(cert), Some(key)) => Some(ClientIdentity { cert, key }),
        (None, None) => None,
        _ => {
            return Err(KubeConfigError::Kubeconfig(format!(
                "user {name} needs both a client certificate and a client key"
            )));
        }
    };
    Ok((token, identity))
}

/// Inline base64 data wins over a file reference.
fn secret(
    field: &'static str,
    data: Option<&str>,
    file: Option<&Path>,
    dir: &Path,
) -> Result<Option<Secret>, KubeConfigError> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|source| KubeConfigError::Base64 { field, source })?;
        return Ok(Some(Secret::Inline(bytes)));
    }
    Ok(file.map(|path| Secret::File(dir.join(path))))
}

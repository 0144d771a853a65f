//! [`ClusterApi`] over the Kubernetes REST API.

use crate::{
    cluster::{
        ClusterApi, ClusterError, Node, PersistentVolume, PersistentVolumeClaim, Pod, PodList,
        PodSelector,
    },
    kubeconfig::Kubeconfig,
};
use reqwest::{Certificate, Client, Identity, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};
use thiserror::Error;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Errors while building the client.
#[derive(Error, Debug)]
pub enum KubeConfigError {
    #[error("no API server configured: not running in a cluster and no kubeconfig found")]
    NoApiServer,
    #[error("invalid API server URL {url:?}: {reason}")]
    ApiServer { url: String, reason: String },
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse kubeconfig {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("kubeconfig: {0}")]
    Kubeconfig(String),
    #[error("invalid base64 in {field}: {source}")]
    Base64 {
        field: &'static str,
        source: base64::DecodeError,
    },
    #[error("invalid CA bundle {origin}: {source}")]
    Certificate {
        origin: String,
        source: reqwest::Error,
    },
    #[error("invalid client certificate or key {origin}: {source}")]
    Identity {
        origin: String,
        source: reqwest::Error,
    },
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Credential material, either on disk or inline in a kubeconfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Secret {
    File(PathBuf),
    Inline(Vec<u8>),
}

impl Secret {
    async fn load(&self) -> Result<Vec<u8>, KubeConfigError> {
        match self {
            Self::File(path) => read(path).await,
            Self::Inline(bytes) => Ok(bytes.clone()),
        }
    }

    fn origin(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline(_) => "(inline data)".to_owned(),
        }
    }
}

/// PEM client certificate and key for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert: Secret,
    pub key: Secret,
}

/// Connection settings for the API server.
#[derive(Debug, Clone, Default)]
pub struct KubeConfig {
    /// Base URL, e.g. `https://10.96.0.1:443` or `http://127.0.0.1:8001`.
    pub api_server: Option<String>,
    /// File holding a bearer token.
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server.
    pub ca_file: Option<PathBuf>,
    /// Kubeconfig file to read instead of looking one up.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context; defaults to the current context.
    pub context: Option<String>,
}

impl KubeConfig {
    /// Work out where the API server is and how to authenticate.
    ///
    /// Sources are tried in order: an explicit API server, an explicit
    /// kubeconfig, `$KUBECONFIG`, the in-cluster service account, then
    /// `~/.kube/config`. An explicit token or CA file overrides whatever the
    /// chosen source provides. An explicit API server uses no other source,
    /// so `kubectl proxy` works without credentials.
    pub async fn resolve(self) -> Result<ResolvedConfig, KubeConfigError> {
        self.resolve_with(|key| std::env::var_os(key)).await
    }

    async fn resolve_with(
        self,
        env: impl Fn(&str) -> Option<OsString>,
    ) -> Result<ResolvedConfig, KubeConfigError> {
        let mut resolved = if let Some(api_server) = self.api_server.clone() {
            ResolvedConfig::bare(api_server)
        } else if let Some(path) = &self.kubeconfig {
            load_kubeconfig(path, self.context.as_deref()).await?
        } else if let Some(path) = env("KUBECONFIG").as_deref().and_then(first_file) {
            load_kubeconfig(&path, self.context.as_deref()).await?
        } else if let Some(host) = env("KUBERNETES_SERVICE_HOST") {
            let host = host.to_string_lossy().into_owned();
            let port = env("KUBERNETES_SERVICE_PORT")
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| "443".to_owned());
            let host = if host.contains(':') {
                format!("[{host}]")
            } else {
                host
            };
            let sa = Path::new(SERVICE_ACCOUNT_DIR);
            ResolvedConfig {
                token: Some(Secret::File(sa.join("token"))),
                ca: Some(Secret::File(sa.join("ca.crt"))),
                ..ResolvedConfig::bare(format!("https://{host}:{port}"))
            }
        } else if let Some(path) = env("HOME")
            .map(|home| PathBuf::from(home).join(".kube").join("config"))
            .filter(|p| p.is_file())
        {
            load_kubeconfig(&path, self.context.as_deref()).await?
        } else {
            return Err(KubeConfigError::NoApiServer);
        };
        if let Some(path) = self.token_file {
            resolved.token = Some(Secret::File(path));
        }
        if let Some(path) = self.ca_file {
            resolved.ca = Some(Secret::File(path));
        }
        Ok(resolved)
    }
}

/// First existing file of a `KUBECONFIG`-style path list.
fn first_file(paths: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(paths).find(|p| p.is_file())
}

async fn load_kubeconfig(
    path: &Path,
    context: Option<&str>,
) -> Result<ResolvedConfig, KubeConfigError> {
    tracing::debug!(path = %path.display(), "reading kubeconfig");
    let bytes = read(path).await?;
    let dir = path.parent().unwrap_or(Path::new("."));
    Kubeconfig::parse(&bytes, path)?.select(context, dir)
}

/// Configuration with the API server known.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_server: String,
    pub token: Option<Secret>,
    pub ca: Option<Secret>,
    pub identity: Option<ClientIdentity>,
    pub insecure_skip_tls_verify: bool,
}

impl ResolvedConfig {
    fn bare(api_server: String) -> Self {
        Self {
            api_server,
            token: None,
            ca: None,
            identity: None,
            insecure_skip_tls_verify: false,
        }
    }
}

/// Thin Kubernetes REST client exposing only what the CSI tools need.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl KubeClient {
    /// Build a client from resolved settings, reading credentials once.
    pub async fn new(config: ResolvedConfig) -> Result<Self, KubeConfigError> {
        let base = Url::parse(&config.api_server).map_err(|e| KubeConfigError::ApiServer {
            url: config.api_server.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(KubeConfigError::ApiServer {
                url: config.api_server,
                reason: "expected an http or https URL".into(),
            });
        }

        let mut builder = Client::builder();
        if let Some(ca) = &config.ca {
            let pem = ca.load().await?;
            let cert = Certificate::from_pem(&pem).map_err(|source| {
                KubeConfigError::Certificate {
                    origin: ca.origin(),
                    source,
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(identity) = &config.identity {
            let mut pem = identity.cert.load().await?;
            pem.push(b'\n');
            pem.extend(identity.key.load().await?);
            let identity = Identity::from_pem(&pem).map_err(|source| {
                KubeConfigError::Identity {
                    origin: identity.cert.origin(),
                    source,
                }
            })?;
            builder = builder.identity(identity);
        }
        if config.insecure_skip_tls_verify {
            tracing::warn!(api_server = %base, "API server certificate is not verified");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let token = match &config.token {
            Some(secret) => Some(String::from_utf8_lossy(&secret.load().await?).trim().to_owned()),
            None => None,
        };
        tracing::info!(api_server = %base, "using Kubernetes API server");
        Ok(Self {
            http: builder.build()?,
            base,
            token,
        })
    }

    /// URL of an API path, one percent-encoded segment per element.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        kind: &'static str,
        name: &str,
    ) -> Result<reqwest::Response, ClusterError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClusterError::Api {
                kind,
                name: name.to_owned(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        kind: &'static str,
        name: &str,
    ) -> Result<T, ClusterError> {
        let url = self.url(segments);
        tracing::debug!(kind, name, path = url.path(), "GET");
        let body = self.send(self.get(url), kind, name).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClusterError::Decode { kind, source })
    }
}

/// Reject names that would not address a single object once placed in a
/// path segment.
fn object_name<'a>(kind: &'static str, name: &'a str) -> Result<&'a str, ClusterError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(ClusterError::InvalidName {
            kind,
            name: name.to_owned(),
        });
    }
    Ok(name)
}

async fn read(path: &Path) -> Result<Vec<u8>, KubeConfigError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| KubeConfigError::Read {
            path: path.to_owned(),
            source,
        })
}

impl ClusterApi for KubeClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        let namespace = object_name("Namespace", namespace)?;
        let name = object_name("Pod", name)?;
        self.fetch(
            &["api", "v1", "namespaces", namespace, "pods", name],
            "Pod",
            name,
        )
        .await
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        let name = object_name("Node", name)?;
        self.fetch(&["api", "v1", "nodes", name], "Node", name)
            .await
    }

    async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume, ClusterError> {
        let name = object_name("PersistentVolume", name)?;
        self.fetch(
            &["api", "v1", "persistentvolumes", name],
            "PersistentVolume",
            name,
        )
        .await
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, ClusterError> {
        let namespace = object_name("Namespace", namespace)?;
        let name = object_name("PersistentVolumeClaim", name)?;
        self.fetch(
            &["api", "v1", "namespaces", namespace, "persistentvolumeclaims", name],
            "PersistentVolumeClaim",
            name,
        )
        .await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &PodSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        let namespace = object_name("Namespace", namespace)?;
        let url = self.url(&["api", "v1", "namespaces", namespace, "pods"]);
        let labels = selector.label_selector();
        let fields = selector.field_selector();
        tracing::debug!(namespace, labels = %labels, fields = %fields, "LIST pods");
        let request = self
            .get(url)
            .query(&[("labelSelector", labels), ("fieldSelector", fields)]);
        let body = self.send(request, "PodList", namespace).await?.bytes().await?;
        let list: PodList = serde_json::from_slice(&body).map_err(|source| {
            ClusterError::Decode {
                kind: "PodList",
                source,
            }
        })?;
        Ok(list.items)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail_lines: u64,
    ) -> Result<String, ClusterError> {
        let namespace = object_name("Namespace", namespace)?;
        let name = object_name("Pod", name)?;
        let url = self.url(&["api", "v1", "namespaces", namespace, "pods", name, "log"]);
        tracing::debug!(namespace, name, container, tail_lines, "GET logs");
        let request = self.get(url).query(&[
            ("container", container.to_owned()),
            ("tailLines", tail_lines.to_string()),
        ]);
        Ok(self.send(request, "Pod", name).await?.text().await?)
    }
}

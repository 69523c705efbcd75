use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::app::aws::ClusterMetadata;

pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

// Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub kind: String,
    pub preferences: Preferences,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamedCluster {
    pub cluster: ClusterEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClusterEntry {
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamedContext {
    pub context: ContextEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

/// Always serialized as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Preferences {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserEntry {
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub args: Vec<String>,
    pub command: String,
}

impl KubeConfig {
    /// Single cluster, context and user, all named after the cluster ARN.
    /// Tokens come from `aws eks get-token` at connection time.
    pub fn for_eks_cluster(metadata: &ClusterMetadata, cluster_name: &str, region: &str) -> Self {
        let arn = &metadata.arn;

        KubeConfig {
            api_version: "v1".to_string(),
            clusters: vec![NamedCluster {
                cluster: ClusterEntry {
                    certificate_authority_data: metadata.ca_data_base64.clone(),
                    server: metadata.endpoint.clone(),
                },
                name: arn.clone(),
            }],
            contexts: vec![NamedContext {
                context: ContextEntry {
                    cluster: arn.clone(),
                    user: arn.clone(),
                },
                name: arn.clone(),
            }],
            current_context: arn.clone(),
            kind: "Config".to_string(),
            preferences: Preferences::default(),
            users: vec![NamedUser {
                name: arn.clone(),
                user: UserEntry {
                    exec: ExecConfig {
                        api_version: EXEC_API_VERSION.to_string(),
                        args: vec![
                            "--region".to_string(),
                            region.to_string(),
                            "eks".to_string(),
                            "get-token".to_string(),
                            "--cluster-name".to_string(),
                            cluster_name.to_string(),
                        ],
                        command: "aws".to_string(),
                    },
                },
            }],
        }
    }
}

/// `{cluster_name}-config`, optionally under `output_dir`. The name is used as is.
pub fn kubeconfig_path(output_dir: Option<&Path>, cluster_name: &str) -> PathBuf {
    let file_name = format!("{}-config", cluster_name);
    match output_dir {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[derive(Error, Debug)]
pub enum WriteKubeconfigError {
    #[error("Failed to serialize kubeconfig: {source}")]
    FailedToSerializeKubeconfig { source: serde_yaml::Error },

    #[error("Failed to create kubeconfig file {}: {source}", path.display())]
    FailedToCreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write kubeconfig file {}: {source}", path.display())]
    FailedToWriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Serializes first so an encoding failure never leaves a file behind. The
/// document goes to `{path}.tmp` and is renamed over `path` once flushed, so a
/// failed write leaves neither a truncated kubeconfig nor the temp file.
pub async fn write_kubeconfig(
    kubeconfig: &KubeConfig,
    path: &Path,
) -> Result<(), WriteKubeconfigError> {
    let contents = serde_yaml::to_string(kubeconfig)
        .map_err(|source| WriteKubeconfigError::FailedToSerializeKubeconfig { source })?;

    let tmp_path = temp_path_for(path);
    let file = tokio::fs::File::create(&tmp_path).await.map_err(|source| {
        WriteKubeconfigError::FailedToCreateFile {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if let Err(source) = persist(file, contents.as_bytes(), &tmp_path, path).await {
        if let Err(err) = tokio::fs::remove_file(&tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), err);
        }
        return Err(WriteKubeconfigError::FailedToWriteFile {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    PathBuf::from(tmp_path)
}

async fn persist(
    mut file: tokio::fs::File,
    contents: &[u8],
    tmp_path: &Path,
    path: &Path,
) -> std::io::Result<()> {
    file.write_all(contents).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(tmp_path, path).await
}

#[cfg(test)]
pub(crate) const PROD_KUBECONFIG: &str = r#"apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: QQ==
    server: https://X.eks.amazonaws.com
  name: arn:aws:eks:us-west-2:123:cluster/prod
contexts:
- context:
    cluster: arn:aws:eks:us-west-2:123:cluster/prod
    user: arn:aws:eks:us-west-2:123:cluster/prod
  name: arn:aws:eks:us-west-2:123:cluster/prod
current-context: arn:aws:eks:us-west-2:123:cluster/prod
kind: Config
preferences: {}
users:
- name: arn:aws:eks:us-west-2:123:cluster/prod
  user:
    exec:
      apiVersion: client.authentication.k8s.io/v1beta1
      args:
      - --region
      - us-west-2
      - eks
      - get-token
      - --cluster-name
      - prod
      command: aws
"#;

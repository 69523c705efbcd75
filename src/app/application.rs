use super::aws::{
    load_aws_session, DescribeCluster, DescribeClusterError, EksClusterDescriber,
    LoadAwsConfigError,
};
use super::kubeconfig::{kubeconfig_path, write_kubeconfig, KubeConfig, WriteKubeconfigError};
use crate::app::cli::{CliArgs, GenerateKubeconfigInput};
use anyhow::Result;
use clap::Parser;
use log::debug;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum GenerateKubeconfigError {
    #[error("Failed to load AWS config: {source}")]
    FailedToLoadAwsConfig {
        #[from]
        source: LoadAwsConfigError,
    },

    #[error("Failed to fetch EKS cluster metadata: {source}")]
    FailedToFetchCluster {
        #[from]
        source: DescribeClusterError,
    },

    #[error("Failed to write kubeconfig: {source}")]
    FailedToWriteKubeconfig {
        #[from]
        source: WriteKubeconfigError,
    },
}

/// Fetch, build, write. Stops at the first failure, before anything is written.
pub async fn generate_kubeconfig(
    describer: &impl DescribeCluster,
    cluster_name: &str,
    region: &str,
    path: &Path,
) -> Result<(), GenerateKubeconfigError> {
    let metadata = describer.describe_cluster(cluster_name).await?;
    debug!(
        "Cluster '{}' has ARN {} and endpoint {}",
        cluster_name, metadata.arn, metadata.endpoint
    );

    let kubeconfig = KubeConfig::for_eks_cluster(&metadata, cluster_name, region);
    write_kubeconfig(&kubeconfig, path).await?;
    Ok(())
}

pub async fn run() -> Result<()> {
    let input: GenerateKubeconfigInput = CliArgs::parse().into();

    let session = load_aws_session(&input)
        .await
        .map_err(GenerateKubeconfigError::from)?;
    let describer = EksClusterDescriber::new(&session);
    let path = kubeconfig_path(input.output_dir.as_deref(), &input.cluster_name);

    generate_kubeconfig(&describer, &input.cluster_name, &session.region, &path).await?;

    let message = format!("Kube Config file created at {}\n", path.display());
    tokio::io::stdout().write_all(message.as_bytes()).await?;
    tokio::io::stdout().flush().await?;
    Ok(())
}

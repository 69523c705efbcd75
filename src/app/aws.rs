use aws_config::BehaviorVersion;
use aws_sdk_eks::config::retry::RetryConfig;
use aws_sdk_eks::error::DisplayErrorContext;
use aws_sdk_eks::types::Cluster;
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::debug;
use thiserror::Error;

use crate::app::cli::GenerateKubeconfigInput;

/// The three values the kubeconfig is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMetadata {
    pub endpoint: String,
    pub ca_data_base64: String,
    pub arn: String,
}

#[derive(Error, Debug)]
pub enum LoadAwsConfigError {
    #[error("No AWS region could be resolved. Please either specify the region via the --region switch or set the AWS_REGION environment variable.")]
    RegionNotResolved,

    #[error("Credentials provider was None when loading the AWS shared config")]
    CredentialsProviderNone,
}

#[derive(Error, Debug)]
pub enum DescribeClusterError {
    #[error("EKS cluster '{cluster_name}' was not found")]
    ClusterNotFound { cluster_name: String },

    #[error("Failed to describe EKS cluster '{cluster_name}': {message}")]
    RequestFailed {
        cluster_name: String,
        message: String,
    },

    #[error("DescribeCluster response is missing the {field} field")]
    MissingField { field: &'static str },
}

/// Loaded SDK config together with the region it resolved to.
#[derive(Debug, Clone)]
pub struct AwsSession {
    pub sdk_config: SdkConfig,
    pub region: String,
}

impl AwsSession {
    pub fn from_sdk_config(sdk_config: SdkConfig) -> Result<Self, LoadAwsConfigError> {
        if sdk_config.credentials_provider().is_none() {
            return Err(LoadAwsConfigError::CredentialsProviderNone);
        }

        let region = sdk_config
            .region()
            .map(|region| region.as_ref().to_string())
            .ok_or(LoadAwsConfigError::RegionNotResolved)?;

        Ok(Self { sdk_config, region })
    }
}

pub async fn load_aws_session(
    input: &GenerateKubeconfigInput,
) -> Result<AwsSession, LoadAwsConfigError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &input.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(profile) = &input.profile {
        loader = loader.profile_name(profile);
    }

    let session = AwsSession::from_sdk_config(loader.load().await)?;
    debug!(
        "Loaded AWS config for region {} (profile: {:?})",
        session.region, input.profile
    );
    Ok(session)
}

#[allow(async_fn_in_trait)]
pub trait DescribeCluster {
    async fn describe_cluster(
        &self,
        cluster_name: &str,
    ) -> Result<ClusterMetadata, DescribeClusterError>;
}

pub struct EksClusterDescriber {
    client: aws_sdk_eks::Client,
}

impl EksClusterDescriber {
    pub fn new(session: &AwsSession) -> Self {
        let config = aws_sdk_eks::config::Builder::from(&session.sdk_config)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: aws_sdk_eks::Client::from_conf(config),
        }
    }
}

impl DescribeCluster for EksClusterDescriber {
    async fn describe_cluster(
        &self,
        cluster_name: &str,
    ) -> Result<ClusterMetadata, DescribeClusterError> {
        debug!("Describing EKS cluster '{}'", cluster_name);

        let output = self
            .client
            .describe_cluster()
            .name(cluster_name)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_resource_not_found_exception());

                if not_found {
                    DescribeClusterError::ClusterNotFound {
                        cluster_name: cluster_name.to_string(),
                    }
                } else {
                    DescribeClusterError::RequestFailed {
                        cluster_name: cluster_name.to_string(),
                        message: DisplayErrorContext(&err).to_string(),
                    }
                }
            })?;

        let cluster = output
            .cluster()
            .ok_or(DescribeClusterError::MissingField { field: "cluster" })?;

        ClusterMetadata::try_from(cluster)
    }
}

impl TryFrom<&Cluster> for ClusterMetadata {
    type Error = DescribeClusterError;

    fn try_from(cluster: &Cluster) -> Result<Self, Self::Error> {
        let endpoint = cluster
            .endpoint()
            .ok_or(DescribeClusterError::MissingField { field: "endpoint" })?;

        let ca_data_base64 = cluster
            .certificate_authority()
            .and_then(|ca| ca.data())
            .ok_or(DescribeClusterError::MissingField {
                field: "certificateAuthority.data",
            })?;

        let arn = cluster
            .arn()
            .ok_or(DescribeClusterError::MissingField { field: "arn" })?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            ca_data_base64: ca_data_base64.to_string(),
            arn: arn.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aws_sdk_eks::config::{Credentials, SharedCredentialsProvider};
    use aws_sdk_eks::types::Certificate;
    use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
    use aws_smithy_runtime_api::http::{Request as HttpRequest, Response as HttpResponse};
    use aws_smithy_runtime_api::http::StatusCode;
    use aws_smithy_types::body::SdkBody;

    fn prod_cluster() -> Cluster {
        Cluster::builder()
            .name("prod")
            .endpoint("https://X.eks.amazonaws.com")
            .arn("arn:aws:eks:us-west-2:123:cluster/prod")
            .certificate_authority(Certificate::builder().data("QQ==").build())
            .build()
    }

    fn static_credentials() -> SharedCredentialsProvider {
        SharedCredentialsProvider::new(Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            None,
            None,
            "test",
        ))
    }

    /// Describer whose EKS client answers the single request with a canned response.
    fn replay_describer(
        status: u16,
        error_type: Option<&'static str>,
        body: &'static str,
    ) -> EksClusterDescriber {
        let mut response = HttpResponse::new(
            StatusCode::try_from(status).unwrap(),
            SdkBody::from(body),
        );
        response
            .headers_mut()
            .insert("content-type", "application/json");
        if let Some(error_type) = error_type {
            response.headers_mut().insert("x-amzn-errortype", error_type);
        }

        let http_client = StaticReplayClient::new(vec![ReplayEvent::new(
            HttpRequest::new(SdkBody::empty()),
            response,
        )]);

        let sdk_config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .credentials_provider(static_credentials())
            .http_client(http_client)
            .build();

        EksClusterDescriber::new(&AwsSession::from_sdk_config(sdk_config).unwrap())
    }

    #[test_log::test(tokio::test)]
    async fn test_describe_cluster_success() {
        let describer = replay_describer(
            200,
            None,
            r#"{"cluster":{"name":"prod","arn":"arn:aws:eks:us-west-2:123:cluster/prod","endpoint":"https://X.eks.amazonaws.com","certificateAuthority":{"data":"QQ=="}}}"#,
        );

        let metadata = describer.describe_cluster("prod").await.unwrap();
        assert_eq!(metadata.arn, "arn:aws:eks:us-west-2:123:cluster/prod");
        assert_eq!(metadata.endpoint, "https://X.eks.amazonaws.com");
        assert_eq!(metadata.ca_data_base64, "QQ==");
    }

    #[test_log::test(tokio::test)]
    async fn test_describe_cluster_not_found() {
        let describer = replay_describer(
            404,
            Some("ResourceNotFoundException"),
            r#"{"message":"No cluster found for name: prod."}"#,
        );

        let err = describer.describe_cluster("prod").await.unwrap_err();
        match err {
            DescribeClusterError::ClusterNotFound { cluster_name } => {
                assert_eq!(cluster_name, "prod")
            }
            other => panic!("expected ClusterNotFound, got {other:?}"),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_describe_cluster_server_failure() {
        let describer = replay_describer(500, None, "{}");

        let err = describer.describe_cluster("prod").await.unwrap_err();
        assert!(matches!(
            err,
            DescribeClusterError::RequestFailed { ref cluster_name, .. } if cluster_name == "prod"
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_describe_cluster_empty_response() {
        let describer = replay_describer(200, None, "{}");

        let err = describer.describe_cluster("prod").await.unwrap_err();
        assert!(matches!(
            err,
            DescribeClusterError::MissingField { field: "cluster" }
        ));
    }

    #[test]
    fn test_metadata_from_cluster() {
        let metadata = ClusterMetadata::try_from(&prod_cluster()).unwrap();

        assert_eq!(
            metadata,
            ClusterMetadata {
                endpoint: "https://X.eks.amazonaws.com".to_string(),
                ca_data_base64: "QQ==".to_string(),
                arn: "arn:aws:eks:us-west-2:123:cluster/prod".to_string(),
            }
        );
    }

    #[test]
    fn test_metadata_missing_ca_data() {
        let cluster = Cluster::builder()
            .endpoint("https://X.eks.amazonaws.com")
            .arn("arn:aws:eks:us-west-2:123:cluster/prod")
            .build();

        let err = ClusterMetadata::try_from(&cluster).unwrap_err();
        assert!(matches!(
            err,
            DescribeClusterError::MissingField {
                field: "certificateAuthority.data"
            }
        ));
    }

    #[test]
    fn test_metadata_missing_arn() {
        let cluster = Cluster::builder()
            .endpoint("https://X.eks.amazonaws.com")
            .certificate_authority(Certificate::builder().data("QQ==").build())
            .build();

        let err = ClusterMetadata::try_from(&cluster).unwrap_err();
        assert!(matches!(
            err,
            DescribeClusterError::MissingField { field: "arn" }
        ));
    }

    #[test]
    fn test_session_resolves_region() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("us-west-2"))
            .credentials_provider(static_credentials())
            .build();

        let session = AwsSession::from_sdk_config(sdk_config).unwrap();
        assert_eq!(session.region, "us-west-2");
    }

    #[test]
    fn test_session_without_region() {
        let sdk_config = SdkConfig::builder()
            .credentials_provider(static_credentials())
            .build();

        let err = AwsSession::from_sdk_config(sdk_config).unwrap_err();
        assert!(matches!(err, LoadAwsConfigError::RegionNotResolved));
    }

    #[test]
    fn test_session_without_credentials_provider() {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("us-west-2"))
            .build();

        let err = AwsSession::from_sdk_config(sdk_config).unwrap_err();
        assert!(matches!(err, LoadAwsConfigError::CredentialsProviderNone));
    }

    // Runs the real default chain, so it depends on the host's AWS config files.
    #[test_log::test(tokio::test)]
    #[ignore]
    async fn test_load_session_with_region_override() -> anyhow::Result<()> {
        let input = GenerateKubeconfigInput {
            cluster_name: "prod".to_string(),
            region: Some("eu-west-2".to_string()),
            profile: None,
            output_dir: None,
        };

        let session = load_aws_session(&input).await?;
        assert_eq!(session.region, "eu-west-2");
        Ok(())
    }
}

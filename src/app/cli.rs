use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Name of the EKS Kubernetes cluster to write a kubeconfig for
    #[clap(short, long, env = "EKS_CLUSTER_NAME")]
    pub cluster_name: String,

    /// Name of the AWS region that the cluster is in (defaults to the AWS config chain)
    #[clap(short, long, env = "AWS_REGION", default_value = None)]
    pub region: Option<String>,

    /// AWS profile to use for authentication
    #[clap(short, long, default_value = None)]
    pub profile: Option<String>,

    /// Directory to write the kubeconfig into (defaults to the current directory)
    #[clap(short, long, default_value = None)]
    pub output_dir: Option<PathBuf>,
}

/// Everything the generator needs, passed by value from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateKubeconfigInput {
    pub cluster_name: String,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl From<CliArgs> for GenerateKubeconfigInput {
    fn from(args: CliArgs) -> Self {
        GenerateKubeconfigInput {
            cluster_name: args.cluster_name,
            region: args.region,
            profile: args.profile,
            output_dir: args.output_dir,
        }
    }
}

pub mod application;
pub mod aws;
pub mod cli;
pub mod kubeconfig;

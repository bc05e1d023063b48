// CLI command definitions

use super::k8s::{EndpointCommand, StateCommand, StopCommand, WorkersCommand};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "flink-kube",
    version,
    about = "Inspect and manage Flink clusters running natively on Kubernetes",
    long_about = "A standalone CLI over the Flink cluster resource client: resolve endpoints, list and stop workers, tear clusters down and edit shared state"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Print the REST endpoint of a cluster
    Endpoint(EndpointCommand),

    /// List (or watch) the worker pods of a cluster
    Workers(WorkersCommand),

    /// Stop a single worker, or the whole cluster
    Stop(StopCommand),

    /// Read and edit shared-state config maps
    State(StateCommand),
}

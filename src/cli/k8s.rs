//! Cluster commands

use crate::domain::config::dynamic::apply_to_client_config;
use crate::{FlinkKubeClient, KubeClientConfig, KubeError, SharedStateEntry, WatchHandler, WorkerPod};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Connection and identity options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cluster ID
    /// If not provided, will use cluster_id from the config file
    #[arg(long, short = 'c')]
    pub cluster_id: Option<String>,

    /// Kubernetes namespace
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Path to kubeconfig file
    /// If not specified, uses default kubeconfig resolution (KUBECONFIG env or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubernetes context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to client configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    /// Dynamic configuration properties (-D key=value)
    ///
    /// Keys: kubernetes.cluster-id, kubernetes.namespace, kubernetes.config.file,
    /// kubernetes.context, kubernetes.transactional-operation.max-retries,
    /// kubernetes.client.io-pool.size, kubernetes.rest-service.exposed.type
    ///
    /// Example: -Dkubernetes.rest-service.exposed.type=NodePort
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl ClusterArgs {
    /// File settings first, then `-D` properties, then explicit flags.
    pub fn load_config(&self) -> anyhow::Result<KubeClientConfig> {
        let mut config = match &self.config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path, e))?;
                toml::from_str::<KubeClientConfig>(&content)
                    .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path, e))?
            }
            None => KubeClientConfig::default(),
        };

        let dynamic = parse_dynamic_configs(&self.properties).map_err(|e| anyhow::anyhow!(e))?;
        apply_to_client_config(&dynamic, &mut config)?;

        if let Some(cluster_id) = &self.cluster_id {
            config.cluster_id = cluster_id.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if self.kubeconfig.is_some() {
            config.kubeconfig = self.kubeconfig.clone();
        }
        if self.context.is_some() {
            config.context = self.context.clone();
        }

        if config.cluster_id.is_empty() {
            anyhow::bail!("cluster_id is required (use -c/--cluster-id)");
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn connect(&self) -> anyhow::Result<FlinkKubeClient> {
        let config = self.load_config()?;
        FlinkKubeClient::connect(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EndpointCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct WorkersCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Keep running and print worker events until interrupted
    #[arg(long, short = 'w')]
    pub watch: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StopCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Stop only this worker pod instead of the whole cluster
    #[arg(long)]
    pub worker: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct StateCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StateAction {
    /// List the shared-state entries of the cluster
    List,

    /// Print every key of an entry
    Get { name: String },

    /// Set one key, creating the entry if needed
    Set {
        name: String,
        key: String,
        value: String,
    },

    /// Remove one key from an entry
    Remove { name: String, key: String },

    /// Delete an entry
    Delete { name: String },
}

impl EndpointCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let client = self.cluster.connect().await?;
        let cluster_id = client.identity().cluster_id().to_string();

        let endpoint = client
            .get_endpoint(&cluster_id)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to resolve endpoint: {}", e))?;
        client.close().await;

        match endpoint {
            Some(endpoint) => println!("{}", endpoint),
            None => println!(
                "REST endpoint of cluster {} is not available yet",
                cluster_id
            ),
        }
        Ok(())
    }
}

impl WorkersCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let client = self.cluster.connect().await?;
        let labels = client.identity().worker_labels();

        let workers = client
            .list_workers(&labels)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list workers: {}", e))?;

        if workers.is_empty() {
            println!(
                "No workers found for cluster {} in namespace {}",
                client.identity().cluster_id(),
                client.namespace()
            );
        }
        for worker in &workers {
            println!("{}", describe_worker(worker));
        }

        if self.watch {
            let failed = Arc::new(Notify::new());
            let handle = client
                .watch_workers(
                    &labels,
                    Arc::new(PrintingHandler {
                        failed: failed.clone(),
                    }),
                )
                .await?;

            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = failed.notified() => {}
            }
            handle.close();
        }

        client.close().await;
        Ok(())
    }
}

impl StopCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let client = self.cluster.connect().await?;
        let cluster_id = client.identity().cluster_id().to_string();

        match &self.worker {
            Some(worker) => {
                client
                    .stop_worker(worker)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to stop worker: {}", e))?;
                println!("Worker {} stopped", worker);
            }
            None => {
                client
                    .stop_cluster(&cluster_id)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to stop cluster: {}", e))?;
                println!("Cluster {} stopped", cluster_id);
            }
        }

        client.close().await;
        Ok(())
    }
}

impl StateCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let client = self.cluster.connect().await?;
        let result = self.run(&client).await;
        client.close().await;
        result
    }

    async fn run(&self, client: &FlinkKubeClient) -> anyhow::Result<()> {
        match &self.action {
            StateAction::List => {
                let entries = client
                    .list_shared_state(&client.identity().shared_state_labels())
                    .await?;
                if entries.is_empty() {
                    println!("No shared state found for cluster {}", client.identity().cluster_id());
                }
                for entry in entries {
                    println!("{}\t{} keys", entry.name(), entry.data().len());
                }
            }
            StateAction::Get { name } => {
                let entry = client
                    .get_shared_state(name)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Shared state {} not found", name))?;
                for (key, value) in entry.data() {
                    println!("{}={}", key, value);
                }
            }
            StateAction::Set { name, key, value } => {
                let (k, v) = (key.clone(), value.clone());
                let updated = client.update_shared_state(name, move |entry| {
                    if entry.get(&k) == Some(v.as_str()) {
                        None
                    } else {
                        Some(entry.clone().with_data(k.clone(), v.clone()))
                    }
                });

                match updated.await {
                    Ok(true) => println!("Updated {} in {}", key, name),
                    Ok(false) => println!("{} already holds {}={}", name, key, value),
                    Err(e) if e.is_not_found() => {
                        client
                            .create_shared_state(
                                SharedStateEntry::new(name.clone()).with_data(key.clone(), value.clone()),
                            )
                            .await?;
                        println!("Created {} with {}", name, key);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            StateAction::Remove { name, key } => {
                let k = key.clone();
                let removed = client
                    .update_shared_state(name, move |entry| {
                        entry.get(&k).map(|_| entry.clone().without_data(&k))
                    })
                    .await?;
                if removed {
                    println!("Removed {} from {}", key, name);
                } else {
                    println!("{} has no key {}", name, key);
                }
            }
            StateAction::Delete { name } => {
                client.delete_shared_state(name).await?;
                println!("Shared state {} deleted", name);
            }
        }
        Ok(())
    }
}

struct PrintingHandler {
    failed: Arc<Notify>,
}

impl WatchHandler<WorkerPod> for PrintingHandler {
    fn on_changed(&self, worker: WorkerPod) {
        println!("changed  {}", describe_worker(&worker));
    }

    fn on_removed(&self, worker: WorkerPod) {
        println!("removed  {}", worker.name());
    }

    fn on_error(&self, error: KubeError) {
        eprintln!("watch closed: {}", error);
        self.failed.notify_one();
    }
}

fn describe_worker(worker: &WorkerPod) -> String {
    let phase = worker.phase().unwrap_or("Unknown");
    if worker.is_terminated() {
        format!("{}\t{}\t{}", worker.name(), phase, worker.terminated_diagnostics())
    } else {
        format!("{}\t{}", worker.name(), phase)
    }
}

/// Parse dynamic configuration properties from -D key=value format
fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();

    for config in configs {
        let Some((key, value)) = config.split_once('=') else {
            return Err(format!(
                "Invalid config format: '{}'. Expected 'key=value'",
                config
            ));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Empty key in config: '{}'", config));
        }

        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(properties: &[&str]) -> ClusterArgs {
        ClusterArgs {
            cluster_id: None,
            namespace: None,
            kubeconfig: None,
            context: None,
            config_file: None,
            properties: properties.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_dynamic_configs() {
        let parsed =
            parse_dynamic_configs(&["a.b=1".to_string(), "c = x=y".to_string()]).unwrap();
        assert_eq!(parsed["a.b"], "1");
        assert_eq!(parsed["c"], "x=y");

        assert!(parse_dynamic_configs(&["novalue".to_string()]).is_err());
        assert!(parse_dynamic_configs(&["=v".to_string()]).is_err());
    }

    #[test]
    fn test_flags_override_properties() {
        let mut cluster = args(&["kubernetes.cluster-id=from-prop", "kubernetes.namespace=flink"]);
        cluster.cluster_id = Some("from-flag".to_string());

        let config = cluster.load_config().unwrap();
        assert_eq!(config.cluster_id, "from-flag");
        assert_eq!(config.namespace, "flink");
    }

    #[test]
    fn test_cluster_id_is_required() {
        assert!(args(&[]).load_config().is_err());
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "cluster_id = \"session\"\nmax_retry_attempts = 3\n").unwrap();

        let mut cluster = args(&["kubernetes.transactional-operation.max-retries=7"]);
        cluster.config_file = Some(path.to_string_lossy().to_string());

        let config = cluster.load_config().unwrap();
        assert_eq!(config.cluster_id, "session");
        assert_eq!(config.max_retry_attempts, 7);
    }
}

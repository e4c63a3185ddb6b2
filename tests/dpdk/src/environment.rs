//! The nodes a scenario runs on.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use failover_core::{Config, PmdMode};
use failover_harness::{DriverFactory, HarnessError, Initializer, Node, SshNode};

/// Environment variable holding the config file path for live runs.
pub const CONFIG_ENV: &str = "FAILOVER_CONFIG";

/// Configuration plus the nodes it describes.
pub struct Environment {
    config: Arc<Config>,
    nodes: Vec<Arc<dyn Node>>,
    driver_factory: Option<DriverFactory>,
}

impl Environment {
    /// Environment over explicit nodes.
    pub fn new(config: Config, nodes: Vec<Arc<dyn Node>>) -> Self {
        Self {
            config: Arc::new(config),
            nodes,
            driver_factory: None,
        }
    }

    /// One ssh node per `[[nodes]]` entry.
    pub fn from_config(config: Config) -> Self {
        let nodes = config
            .nodes
            .iter()
            .map(|n| Arc::new(SshNode::from_config(n)) as Arc<dyn Node>)
            .collect();
        Self::new(config, nodes)
    }

    /// Load the config file named by `FAILOVER_CONFIG`.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .with_context(|| format!("{CONFIG_ENV} is not set"))?;
        let config = Config::from_file(&path)?;
        if config.nodes.is_empty() {
            bail!("{} lists no nodes", path.display());
        }
        Ok(Self::from_config(config))
    }

    /// Build workload drivers with `factory` instead of testpmd.
    pub fn with_driver_factory(mut self, factory: DriverFactory) -> Self {
        self.driver_factory = Some(factory);
        self
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// All nodes.
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// The first `count` nodes; fails when there are fewer.
    pub fn require_nodes(&self, count: usize) -> anyhow::Result<Vec<Arc<dyn Node>>> {
        if self.nodes.len() < count {
            bail!(
                "scenario needs {count} nodes, environment has {}",
                self.nodes.len()
            );
        }
        Ok(self.nodes[..count].to_vec())
    }

    /// Like [`Environment::require_nodes`], and every node must be remote.
    pub fn require_remote_nodes(&self, count: usize) -> anyhow::Result<Vec<Arc<dyn Node>>> {
        let nodes = self.require_nodes(count)?;
        if let Some(local) = nodes.iter().find(|n| !n.is_remote()) {
            return Err(HarnessError::NotRemote {
                node: local.name().to_string(),
            }
            .into());
        }
        Ok(nodes)
    }

    /// Node initializer for `pmd`.
    pub fn initializer(&self, pmd: PmdMode) -> Initializer {
        let init = Initializer::new(Arc::clone(&self.config), pmd);
        match &self.driver_factory {
            Some(factory) => init.with_driver_factory(Arc::clone(factory)),
            None => init,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use failover_harness::MockNode;

    fn env(remote: &[bool]) -> Environment {
        let nodes = remote
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let node = MockNode::new(&format!("n{i}"));
                node.set_remote(r);
                Arc::new(node) as Arc<dyn Node>
            })
            .collect();
        Environment::new(Config::default(), nodes)
    }

    #[test]
    fn require_nodes_checks_count() {
        assert_eq!(env(&[true, true]).require_nodes(2).unwrap().len(), 2);
        assert!(env(&[true]).require_nodes(2).is_err());
    }

    #[test]
    fn local_node_is_a_configuration_error() {
        let Err(err) = env(&[true, false]).require_remote_nodes(2) else {
            panic!("local node accepted");
        };
        let harness = err.downcast_ref::<HarnessError>().unwrap();
        assert!(matches!(harness, HarnessError::NotRemote { node } if node == "n1"));
    }

    #[test]
    fn from_config_builds_ssh_nodes() {
        let config = Config {
            nodes: vec![failover_core::NodeConfig {
                name: "sender".into(),
                host: "10.0.0.4".into(),
                user: "azureuser".into(),
                accelerated_status_cmd: "echo true".into(),
                accelerated_enable_cmd: "true".into(),
                accelerated_disable_cmd: "true".into(),
            }],
            ..Config::default()
        };
        let env = Environment::from_config(config);
        assert_eq!(env.nodes().len(), 1);
        assert_eq!(env.nodes()[0].name(), "sender");
        assert!(env.nodes()[0].is_remote());
    }
}

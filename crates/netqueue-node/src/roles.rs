//! Node loops for each role.
//!
//! Every loop checks the stop flag between steps. Bounded waits keep the
//! flag responsive; a Ctrl-C during a longer wait surfaces as
//! [`QueueError::Interrupted`] and is treated the same way.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use netqueue_core::{
    ClientState, ConfigError, ConfigSource, DispatchNode, NodeConfig, QueueClient, QueueError,
    QueueServer, ServerState, StaticStatus, TomlFile, Wait,
};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::{Cli, Role};

/// How long an idle loop waits before checking the stop flag.
const TICK: Duration = Duration::from_millis(500);

/// Errors that end a node process.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration could not be loaded.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// The queue failed unrecoverably.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Load the base configuration for this process.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    match path {
        Some(path) => TomlFile::new(path).load(),
        None => NodeConfig::default().load(),
    }
}

/// Run the chosen role until `stop` is raised, then close cleanly.
pub fn run(cli: Cli, stop: &AtomicBool) -> Result<(), NodeError> {
    let base = load_config(cli.config.as_deref())?;
    let parent_wait = cli.role.parent_wait();

    match cli.role {
        Role::Server { listen, policy } => {
            let mut config = base;
            listen.apply(&mut config);
            let server = QueueServer::new(config)?.with_policy(policy.build());
            run_server(server, stop)
        },
        Role::Client { parent, status } => {
            let mut config = base;
            parent.apply(&mut config);
            let mut client = QueueClient::new(config)?;
            if let Some(status) = status {
                client = client.with_status(StaticStatus(status));
            }
            run_client(client, stop)
        },
        Role::Dispatch { parent_host, parent_port, listen, policy, status, .. } => {
            let mut parent = base.clone();
            if let Some(host) = parent_host {
                parent.hostname = host;
            }
            parent.port = parent_port;

            let mut children = base;
            listen.apply(&mut children);

            let mut client = QueueClient::new(parent.clone())?;
            if let Some(status) = status {
                client = client.with_status(StaticStatus(status));
            }
            client.connect(&parent.hostname, parent.port)?;

            let mut server = QueueServer::new(children.clone())?.with_policy(policy.build());
            server.bind(&children.hostname, children.port)?;

            let mut node = DispatchNode::new(client, server)
                .with_parent_wait(parent_wait.unwrap_or(TICK));
            run_dispatch(&mut node, stop)
        },
    }
}

/// Keep going after expected outcomes of bounded waits.
fn tolerate(result: Result<(), QueueError>) -> Result<(), QueueError> {
    match result {
        Err(QueueError::Interrupted) => Ok(()),
        Err(err) if err.is_recoverable() => {
            warn!(error = %err, "step skipped");
            Ok(())
        },
        other => other,
    }
}

fn run_server(mut server: QueueServer, stop: &AtomicBool) -> Result<(), NodeError> {
    let config = server.config().clone();
    server.bind(&config.hostname, config.port)?;
    let mut rng = rand::thread_rng();

    while !stop.load(Ordering::SeqCst) {
        tolerate(server_step(&mut server, &mut rng))?;
    }

    server.close()?;
    Ok(())
}

fn run_client(mut client: QueueClient, stop: &AtomicBool) -> Result<(), NodeError> {
    let config = client.config().clone();
    client.connect(&config.hostname, config.port)?;
    let id: u32 = rand::thread_rng().gen_range(0..=100);
    info!(id, "leaf started");

    while !stop.load(Ordering::SeqCst) {
        tolerate(client_step(&mut client, id))?;
        if client.state() == ClientState::Closed {
            info!("parent disconnected");
            return Ok(());
        }
    }

    client.close(true)?;
    Ok(())
}

/// Block for the first child, otherwise hand out one job and wait briefly
/// for a response.
fn server_step(server: &mut QueueServer, rng: &mut impl Rng) -> Result<(), QueueError> {
    if server.state() == ServerState::Ready {
        server.accept_connections(Wait::Timeout(TICK))?;
        return Ok(());
    }
    server.accept_connections(Wait::Immediate)?;
    server.put(format!("Hello from server : {}", rng.gen_range(0..=1000)), Wait::Immediate)?;
    match server.get_or_none(Wait::Timeout(TICK)) {
        Ok(Some(response)) => info!(?response, "response"),
        Ok(None) => {},
        // Last child left while waiting
        Err(QueueError::StateMismatch { .. }) if server.state() == ServerState::Ready => {},
        Err(err) => return Err(err),
    }
    Ok(())
}

fn client_step(client: &mut QueueClient, id: u32) -> Result<(), QueueError> {
    match client.get_or_none(Wait::Timeout(TICK)) {
        Ok(Some(job)) => {
            info!(?job, "job");
            client.put(format!("Client {id} got msg"))?;
        },
        Ok(None) => {},
        // Parent sent DISCONN
        Err(QueueError::StateMismatch { .. }) if client.state() == ClientState::Closed => {},
        Err(err) => return Err(err),
    }
    Ok(())
}

fn run_dispatch(node: &mut DispatchNode, stop: &AtomicBool) -> Result<(), NodeError> {
    let relayed = node.run(|| !stop.load(Ordering::SeqCst));
    let closed = node.close();
    relayed?;
    closed?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/netqueue.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn config_file_fills_unset_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 7000").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.hostname, NodeConfig::default().hostname);
    }

    #[test]
    fn recoverable_errors_are_tolerated() {
        assert!(tolerate(Err(QueueError::Empty)).is_ok());
        assert!(tolerate(Err(QueueError::Interrupted)).is_ok());
        assert!(tolerate(Err(QueueError::ConnectionLost { missing: 1 })).is_err());
    }
}

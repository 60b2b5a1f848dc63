//! Command line interface.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use netqueue_core::{DispatchPolicy, NodeConfig, RandomChoice, RoundRobin};

/// Run one node of a netqueue tree.
#[derive(Parser, Debug)]
#[command(name = "netqueue-node", version, about, long_about = None)]
pub struct Cli {
    /// TOML file with node settings; flags override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub role: Role,
}

/// Which part of the tree this process plays.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Root: hands out jobs and prints the responses
    Server {
        #[command(flatten)]
        listen: Endpoint,

        /// How children are picked for each job
        #[arg(long, value_enum, default_value_t = PolicyKind::RoundRobin)]
        policy: PolicyKind,
    },

    /// Leaf: answers every job it is given
    Client {
        #[command(flatten)]
        parent: Endpoint,

        /// Status announced to the parent after connecting
        #[arg(long)]
        status: Option<String>,
    },

    /// Interior node: relays jobs down and responses up
    Dispatch {
        /// Parent host
        #[arg(long)]
        parent_host: Option<String>,

        /// Parent port
        #[arg(long)]
        parent_port: u16,

        #[command(flatten)]
        listen: Endpoint,

        /// How children are picked for each job
        #[arg(long, value_enum, default_value_t = PolicyKind::Random)]
        policy: PolicyKind,

        /// Status announced to the parent after connecting
        #[arg(long)]
        status: Option<String>,

        /// Milliseconds each relay step waits for a parent job
        #[arg(long, default_value_t = 1000)]
        parent_wait_ms: u64,
    },
}

/// Host and port, each optional so the config file can supply them.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl Endpoint {
    /// Overlay these flags on `config`.
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(host) = &self.host {
            config.hostname.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

/// Dispatch policy selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Cycle through children in join order
    RoundRobin,
    /// Pick a child at random
    Random,
}

impl PolicyKind {
    /// Build the policy.
    pub fn build(self) -> Box<dyn DispatchPolicy> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin),
            Self::Random => Box::new(RandomChoice::new()),
        }
    }
}

impl Role {
    /// Parent wait for dispatch nodes.
    pub fn parent_wait(&self) -> Option<Duration> {
        match self {
            Self::Dispatch { parent_wait_ms, .. } => Some(Duration::from_millis(*parent_wait_ms)),
            _ => None,
        }
    }
}

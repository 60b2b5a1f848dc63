//! Interior tree node: a client leg towards the parent and a server leg
//! towards the children.
//!
//! Jobs arriving from the parent are handed to one child chosen by the
//! server's dispatch policy. Responses from children are forwarded to the
//! parent one item at a time. The node keeps no state of its own beyond the
//! two legs.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    client::QueueClient,
    error::{QueueError, Result},
    server::QueueServer,
    state::{ClientState, ServerState},
    wait::Wait,
};

/// How long each step waits for a job from the parent.
pub const DEFAULT_PARENT_WAIT: Duration = Duration::from_secs(1);

/// What one [`DispatchNode::step`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Children accepted
    pub accepted: usize,
    /// Jobs pushed down to a child
    pub forwarded_down: usize,
    /// Responses pushed up to the parent
    pub forwarded_up: usize,
}

/// A client and a server relaying between one parent and many children.
#[derive(Debug)]
pub struct DispatchNode {
    client: QueueClient,
    server: QueueServer,
    parent_wait: Duration,
}

impl DispatchNode {
    /// Compose a connected client with a bound server.
    pub fn new(client: QueueClient, server: QueueServer) -> Self {
        Self { client, server, parent_wait: DEFAULT_PARENT_WAIT }
    }

    /// Bound on each step's wait for a parent job.
    #[must_use]
    pub fn with_parent_wait(mut self, wait: Duration) -> Self {
        self.parent_wait = wait;
        self
    }

    /// Parent leg.
    pub fn client(&self) -> &QueueClient {
        &self.client
    }

    /// Child leg.
    pub fn server(&self) -> &QueueServer {
        &self.server
    }

    /// Parent leg, mutably.
    pub fn client_mut(&mut self) -> &mut QueueClient {
        &mut self.client
    }

    /// Child leg, mutably.
    pub fn server_mut(&mut self) -> &mut QueueServer {
        &mut self.server
    }

    /// One relay cycle.
    ///
    /// Without children this blocks until the first one joins. Otherwise it
    /// sweeps for newcomers, waits up to the parent wait for one job and
    /// dispatches it, then forwards every response the children have sent.
    ///
    /// A job is offered to the children for up to the parent wait. If none
    /// takes it, the job goes back to the front of the parent queue and the
    /// step fails with [`QueueError::Full`]; the next step retries it.
    pub fn step(&mut self) -> Result<StepReport> {
        let mut report = StepReport::default();

        if self.server.state() == ServerState::Ready {
            report.accepted = self.server.accept_connections(Wait::Forever)?;
            info!(accepted = report.accepted, "children joined");
            return Ok(report);
        }

        report.accepted = self.server.accept_connections(Wait::Immediate)?;

        if let Some(job) = self.client.get_or_none(Wait::Timeout(self.parent_wait))? {
            debug!(items = job.len(), "job from parent");
            if let Err(err) = self.server.put(job.clone(), Wait::Timeout(self.parent_wait)) {
                self.client.requeue(job);
                return Err(err);
            }
            report.forwarded_down += 1;
        }

        if self.server.state() == ServerState::Connected {
            for response in self.server.get_all()? {
                self.client.put(response)?;
                report.forwarded_up += 1;
            }
        }

        Ok(report)
    }

    /// Step until `keep_running` says stop or the parent disconnects.
    ///
    /// `Empty`, `Full` and interrupted waits are logged and the loop carries
    /// on; any other error ends it.
    pub fn run(&mut self, keep_running: impl Fn() -> bool) -> Result<()> {
        while keep_running() {
            match self.step() {
                Ok(_) => {},
                // DISCONN from the parent has already closed the client leg
                Err(QueueError::StateMismatch { .. })
                    if self.client.state() == ClientState::Closed =>
                {
                    info!("parent disconnected");
                    return Ok(());
                },
                Err(QueueError::Interrupted) => debug!("wait interrupted"),
                Err(err) if err.is_recoverable() => warn!(error = %err, "relay step skipped"),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Close both legs, telling parent and children.
    pub fn close(&mut self) -> Result<()> {
        let server = match self.server.state() {
            ServerState::Closed => Ok(()),
            _ => self.server.close(),
        };
        let client = match self.client.state() {
            ClientState::Closed => Ok(()),
            _ => self.client.close(true),
        };
        server.and(client)
    }
}

//! Three-level tree: root server, one dispatch node, one leaf.

mod common;

use std::{cell::Cell, time::Duration};

use common::{STEP, StatusGate, bound_server, client_expect, config, port, server_expect};
use netqueue_core::{
    ClientState, DispatchNode, MsgType, QueueClient, QueueError, QueueServer, ServerState,
    StaticStatus, Wait,
};

struct Tree {
    root: QueueServer,
    node: DispatchNode,
    leaf: QueueClient,
}

fn tree() -> Tree {
    tree_with(bound_server(), QueueClient::new(config()).unwrap())
}

fn tree_with(mid_server: QueueServer, mut leaf: QueueClient) -> Tree {
    let mut root = bound_server();

    let mut mid_client = QueueClient::new(config()).unwrap();
    mid_client.connect("127.0.0.1", port(&root)).unwrap();
    assert_eq!(root.accept_connections(STEP).unwrap(), 1);

    leaf.connect("127.0.0.1", port(&mid_server)).unwrap();

    let mut node =
        DispatchNode::new(mid_client, mid_server).with_parent_wait(Duration::from_millis(100));

    // First step blocks until the leaf is accepted
    let report = node.step().unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(node.server().state(), ServerState::Connected);

    Tree { root, node, leaf }
}

#[test]
fn job_relays_down_and_response_relays_up() {
    let Tree { mut root, mut node, mut leaf } = tree();

    root.put("job-1", Wait::Immediate).unwrap();
    let report = node.step().unwrap();
    assert_eq!(report.forwarded_down, 1);

    assert_eq!(leaf.get(STEP).unwrap(), vec!["job-1"]);
    leaf.put("ack-1").unwrap();

    let mut forwarded = 0;
    for _ in 0..50 {
        forwarded += node.step().unwrap().forwarded_up;
        if forwarded > 0 {
            break;
        }
    }
    assert_eq!(forwarded, 1);
    assert_eq!(root.get(STEP).unwrap(), vec!["ack-1"]);
}

#[test]
fn multi_item_jobs_survive_the_hop() {
    let Tree { mut root, mut node, mut leaf } = tree();

    root.put(vec!["a", "b"], Wait::Immediate).unwrap();
    node.step().unwrap();
    assert_eq!(leaf.get(STEP).unwrap(), vec!["a", "b"]);
}

#[test]
fn run_stops_when_told() {
    let Tree { root: _root, mut node, leaf: _leaf } = tree();

    let steps = Cell::new(0);
    node.run(|| {
        steps.set(steps.get() + 1);
        steps.get() <= 3
    })
    .unwrap();
    assert_eq!(steps.get(), 4);
}

#[test]
fn run_ends_cleanly_when_the_parent_closes() {
    let Tree { mut root, mut node, leaf: _leaf } = tree();
    server_expect(&mut root, MsgType::Conn).unwrap();

    root.close().unwrap();

    let steps = Cell::new(0);
    node.run(|| {
        steps.set(steps.get() + 1);
        steps.get() <= 100
    })
    .unwrap();
    assert!(steps.get() <= 100, "run kept going after the parent left");
    assert_eq!(node.client().state(), ClientState::Closed);

    node.close().unwrap();
    assert_eq!(node.server().state(), ServerState::Closed);
}

#[test]
fn job_no_child_takes_is_kept_for_the_next_step() {
    let mid_server = bound_server().with_policy(StatusGate);
    let leaf = QueueClient::new(config()).unwrap().with_status(StaticStatus("ready".into()));
    let Tree { mut root, mut node, mut leaf } = tree_with(mid_server, leaf);

    root.put("job-1", Wait::Immediate).unwrap();
    let err = (0..50).find_map(|_| node.step().err()).unwrap();
    assert!(matches!(err, QueueError::Full { .. }));
    assert_eq!(node.client().pending(), 1);

    assert!(matches!(node.step(), Err(QueueError::Full { .. })));
    assert_eq!(node.client().pending(), 1);

    // The CONN reply makes the leaf announce its status
    client_expect(&mut leaf, MsgType::Conn).unwrap();
    assert_eq!(node.step().unwrap().forwarded_down, 1);
    assert_eq!(node.client().pending(), 0);
    assert_eq!(leaf.get(STEP).unwrap(), vec!["job-1"]);
}

#[test]
fn close_signals_both_directions() {
    let Tree { mut root, mut node, mut leaf } = tree();

    node.close().unwrap();
    assert_eq!(node.client().state(), ClientState::Closed);
    assert_eq!(node.server().state(), ServerState::Closed);

    client_expect(&mut leaf, MsgType::Disconn).unwrap();
    assert_eq!(leaf.state(), ClientState::Closed);

    for _ in 0..10 {
        if root.state() == ServerState::Ready {
            break;
        }
        root.poll(STEP).unwrap();
    }
    assert_eq!(root.state(), ServerState::Ready);
}

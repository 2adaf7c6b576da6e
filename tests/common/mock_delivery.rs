//! Mock DeliveryClient and ReplicaResolver for testing.
//!
//! `ScriptedDelivery` acknowledges exactly the nodes it is told to and records
//! every call, so tests can assert who was contacted and with which headers.

use std::collections::HashSet;
use std::sync::Mutex;
use update_sweeper::delivery::DeliveryFuture;
use update_sweeper::{
    DeliveryClient, DeliveryOutcome, HeaderMap, NodeId, ReplicaNode, ReplicaResolver, ReplicaSet,
    Result, UpdateOp,
};

/// A recorded deliver() call.
#[derive(Debug, Clone)]
pub struct DeliveryCall {
    pub node_id: NodeId,
    pub partition: u32,
    pub op: UpdateOp,
    pub path: String,
    pub headers: HeaderMap,
}

/// Delivery client with a configurable set of acknowledging nodes.
#[derive(Default)]
pub struct ScriptedDelivery {
    acking: Mutex<HashSet<NodeId>>,
    ack_all: Mutex<bool>,
    calls: Mutex<Vec<DeliveryCall>>,
}

impl ScriptedDelivery {
    /// Acknowledge only the given nodes.
    pub fn acking(ids: &[NodeId]) -> Self {
        let delivery = Self::default();
        delivery.set_acking(ids);
        delivery
    }

    /// Acknowledge every node.
    pub fn ack_all() -> Self {
        let delivery = Self::default();
        *delivery.ack_all.lock().unwrap() = true;
        delivery
    }

    pub fn set_acking(&self, ids: &[NodeId]) {
        *self.ack_all.lock().unwrap() = false;
        *self.acking.lock().unwrap() = ids.iter().copied().collect();
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_nodes(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().iter().map(|c| c.node_id).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl DeliveryClient for ScriptedDelivery {
    fn deliver<'a>(
        &'a self,
        node: &'a ReplicaNode,
        partition: u32,
        op: UpdateOp,
        path: &'a str,
        headers: &'a HeaderMap,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(DeliveryCall {
                node_id: node.id,
                partition,
                op,
                path: path.to_string(),
                headers: headers.clone(),
            });
            let acked = *self.ack_all.lock().unwrap() || self.acking.lock().unwrap().contains(&node.id);
            if acked {
                DeliveryOutcome::acked(node.id)
            } else {
                DeliveryOutcome::failed(node.id)
            }
        })
    }
}

/// Resolver that places every collection on the same nodes.
pub struct FixedResolver {
    pub partition: u32,
    pub nodes: Mutex<Vec<ReplicaNode>>,
}

impl FixedResolver {
    pub fn new(nodes: Vec<ReplicaNode>) -> Self {
        Self {
            partition: 17,
            nodes: Mutex::new(nodes),
        }
    }

    /// Simulate a topology change.
    pub fn set_nodes(&self, nodes: Vec<ReplicaNode>) {
        *self.nodes.lock().unwrap() = nodes;
    }
}

impl ReplicaResolver for FixedResolver {
    fn resolve(&self, _account: &str, _container: &str) -> Result<ReplicaSet> {
        Ok(ReplicaSet {
            partition: self.partition,
            nodes: self.nodes.lock().unwrap().clone(),
        })
    }
}

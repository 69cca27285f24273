use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tracing::debug;

use crate::domain::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&mut CustomEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CustomEvent {
    name: String,
    detail: Value,
    bubbles: bool,
    cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    immediate_propagation_stopped: bool,
    target: Option<NodeId>,
    current_target: Option<NodeId>,
}

impl CustomEvent {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: Value::Null,
            bubbles: false,
            cancelable: false,
            default_prevented: false,
            propagation_stopped: false,
            immediate_propagation_stopped: false,
            target: None,
            current_target: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn bubbling(mut self) -> Self {
        self.bubbles = true;
        self
    }

    #[must_use]
    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    #[must_use]
    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    #[must_use]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Node whose listeners are running right now; `None` outside dispatch.
    #[must_use]
    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn stop_immediate_propagation(&mut self) {
        self.propagation_stopped = true;
        self.immediate_propagation_stopped = true;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub listeners_invoked: usize,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    tag: String,
    parent: Option<NodeId>,
}

struct Registration {
    id: ListenerId,
    node: NodeId,
    event: String,
    callback: Listener,
}

/// The host document the bridge lives in: a node tree plus per-node event
/// listeners. Cloning shares the same document.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

struct PageInner {
    document: NodeId,
    body: NodeId,
    nodes: RwLock<HashMap<NodeId, NodeRecord>>,
    listeners: RwLock<Vec<Registration>>,
    next_node: AtomicU64,
    next_listener: AtomicU64,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    #[must_use]
    pub fn new() -> Self {
        let document = NodeId(0);
        let body = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            document,
            NodeRecord {
                tag: "#document".to_owned(),
                parent: None,
            },
        );
        nodes.insert(
            body,
            NodeRecord {
                tag: "body".to_owned(),
                parent: Some(document),
            },
        );

        Self {
            inner: Arc::new(PageInner {
                document,
                body,
                nodes: RwLock::new(nodes),
                listeners: RwLock::new(Vec::new()),
                next_node: AtomicU64::new(2),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn document(&self) -> NodeId {
        self.inner.document
    }

    #[must_use]
    pub fn body(&self) -> NodeId {
        self.inner.body
    }

    pub fn create_element(&self, parent: NodeId, tag: &str) -> Result<NodeId, BridgeError> {
        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !nodes.contains_key(&parent) {
            return Err(BridgeError::UnknownNode(parent.as_u64()));
        }

        let id = NodeId(self.inner.next_node.fetch_add(1, Ordering::Relaxed));
        nodes.insert(
            id,
            NodeRecord {
                tag: tag.to_owned(),
                parent: Some(parent),
            },
        );
        Ok(id)
    }

    /// Detaches `node` from its parent. The node keeps its listeners and can
    /// still be dispatched on, but events no longer bubble out of it.
    pub fn detach_node(&self, node: NodeId) -> Result<(), BridgeError> {
        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let record = nodes
            .get_mut(&node)
            .ok_or(BridgeError::UnknownNode(node.as_u64()))?;
        record.parent = None;
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&node)
    }

    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .map(|record| record.tag.clone())
    }

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event: &str,
        callback: Listener,
    ) -> Result<ListenerId, BridgeError> {
        if !self.contains(node) {
            return Err(BridgeError::UnknownNode(node.as_u64()));
        }

        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                node,
                event: event.to_owned(),
                callback,
            });
        Ok(id)
    }

    /// Returns whether a registration was removed.
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|registration| registration.node == node && registration.event == event)
            .count()
    }

    /// Runs the target phase on `target` and, for bubbling events, the bubble
    /// phase up to the document. Listeners are snapshotted per node, so a
    /// listener may add or remove registrations or dispatch nested events.
    pub fn dispatch_event(
        &self,
        target: NodeId,
        event: &mut CustomEvent,
    ) -> Result<DispatchOutcome, BridgeError> {
        let path = self.propagation_path(target)?;
        event.target = Some(target);
        let mut invoked = 0usize;

        for node in path {
            if node != target && !event.bubbles {
                break;
            }
            event.current_target = Some(node);
            for callback in self.listeners_for(node, &event.name) {
                callback(event);
                invoked += 1;
                if event.immediate_propagation_stopped {
                    break;
                }
            }
            if event.propagation_stopped {
                break;
            }
        }
        event.current_target = None;

        debug!(
            "dispatched event={} target={target} listeners={invoked} default_prevented={}",
            event.name, event.default_prevented
        );

        Ok(DispatchOutcome {
            default_prevented: event.default_prevented,
            propagation_stopped: event.propagation_stopped,
            listeners_invoked: invoked,
        })
    }

    fn propagation_path(&self, target: NodeId) -> Result<Vec<NodeId>, BridgeError> {
        let nodes = self
            .inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut current = nodes
            .get(&target)
            .ok_or(BridgeError::UnknownNode(target.as_u64()))?;
        let mut path = vec![target];
        while let Some(parent) = current.parent {
            path.push(parent);
            current = nodes
                .get(&parent)
                .ok_or(BridgeError::UnknownNode(parent.as_u64()))?;
        }
        Ok(path)
    }

    fn listeners_for(&self, node: NodeId, event: &str) -> Vec<Listener> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|registration| registration.node == node && registration.event == event)
            .map(|registration| Arc::clone(&registration.callback))
            .collect()
    }
}

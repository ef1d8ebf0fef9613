//! In-memory page model
//!
//! A small arena-backed document tree standing in for a rendered page. The
//! watcher only ever reads structure and text from it and writes inline
//! styles back; everything else about a real rendering engine is out of
//! scope.

mod page;
mod selector;

pub use page::{MutationKind, Page, PageEvent};
pub use selector::Selector;

use std::collections::BTreeMap;

/// Handle to a node in a [`Document`]. Stale after the node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        style: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena document. Slot 0 is the `body` root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Option<Node>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let body = Node {
            data: NodeData::Element {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
                style: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(body)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs,
            style: BTreeMap::new(),
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Some(Node {
            data,
            parent: None,
            children: Vec::new(),
        }));
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Append `child` under `parent`. Returns false if either handle is stale,
    /// `parent` is a text node, or the move would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let parent_is_element = matches!(
            self.node(parent).map(|n| &n.data),
            Some(NodeData::Element { .. })
        );
        if !parent_is_element || self.node(child).is_none() || self.contains(child, parent) {
            return false;
        }

        self.detach(child);
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        true
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Remove a node and its whole subtree. Returns the former parent.
    pub fn remove(&mut self, id: NodeId) -> Option<NodeId> {
        if id == self.root() || self.node(id).is_none() {
            return None;
        }
        let parent = self.node(id).and_then(|n| n.parent);
        self.detach(id);

        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
        parent
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Tag name, or `None` for text nodes and stale handles
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Element { tag, .. }) => Some(tag),
            _ => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).map(|n| &n.data), Some(NodeData::Text(_)))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Element { attrs, .. }) => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> bool {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element { attrs, .. }) => {
                attrs.insert(name.to_string(), value.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Element { style, .. }) => style.get(property).map(String::as_str),
            _ => None,
        }
    }

    /// Set an inline style property. Returns true only if the value changed.
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) -> bool {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element { style, .. }) => {
                if style.get(property).map(String::as_str) == Some(value) {
                    return false;
                }
                style.insert(property.to_string(), value.to_string());
                true
            }
            _ => false,
        }
    }

    /// Drop an inline style property. Returns true only if it was set.
    pub fn remove_style(&mut self, id: NodeId, property: &str) -> bool {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element { style, .. }) => style.remove(property).is_some(),
            _ => false,
        }
    }

    /// Concatenated text of a node's subtree
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.node(id) {
            Some(Node {
                data: NodeData::Text(text),
                ..
            }) => out.push_str(text),
            Some(node) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// Whether `node` is `ancestor` or lies inside its subtree
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return self.node(id).is_some();
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(self.root(), id)
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Element { tag, attrs, .. }) => selector.matches(tag, attrs),
            _ => false,
        }
    }

    /// Nearest inclusive ancestor matching the selector
    pub fn closest(&self, id: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.matches(node, selector) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// All descendants of `root` (excluding `root`) matching, in document order
    pub fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.matches(id, selector) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        found
    }

    pub fn query_first(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_all(root, selector).into_iter().next()
    }
}

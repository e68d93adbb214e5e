//! Host mutation contract and an in-memory host.
//!
//! The reconciler never touches platform nodes directly. Everything it needs
//! from the platform goes through [`Host`]: creating nodes, diffing their
//! props, moving them around and tearing them down. [`MemoryHost`] keeps the
//! whole tree in a vector and records every mutation, which is what tests and
//! the demo use.

use std::fmt;

use crate::value::Props;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    InvalidInsert { parent: NodeId, child: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::InvalidInsert { parent, child } => {
                write!(f, "cannot insert host node {child} into {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

pub trait Host {
    fn create_element(&mut self, tag: &str, props: &Props) -> Result<NodeId, HostError>;
    fn create_text(&mut self, text: &str) -> Result<NodeId, HostError>;
    /// Placeholder for a position that rendered nothing.
    fn create_empty(&mut self) -> Result<NodeId, HostError>;
    fn update_props(&mut self, id: NodeId, prev: &Props, next: &Props) -> Result<(), HostError>;
    fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), HostError>;
    /// Inserts `child` at `index` under `parent`, detaching it from any
    /// previous parent first. An index past the end appends.
    fn insert_child(&mut self, parent: NodeId, child: NodeId, index: usize)
        -> Result<(), HostError>;
    /// Detaches `id` and releases it together with its subtree.
    fn remove_node(&mut self, id: NodeId) -> Result<(), HostError>;
    /// Puts `new` where `old` sits and releases `old` with its subtree.
    fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), HostError>;
    fn begin_commit(&mut self) {}
    fn end_commit(&mut self) {}
}

#[derive(Debug, Clone)]
pub enum HostNodeKind {
    Element { tag: String, props: Props },
    Text(String),
    Empty,
}

#[derive(Debug, Clone)]
pub struct HostNode {
    pub kind: HostNodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    Create(NodeId),
    UpdateProps(NodeId),
    SetText(NodeId),
    Insert {
        parent: NodeId,
        child: NodeId,
        index: usize,
    },
    Remove(NodeId),
    Replace {
        old: NodeId,
        new: NodeId,
    },
}

#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<HostNode>>,
    log: Vec<HostOp>,
    commits: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: HostNodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(HostNode {
            kind,
            parent: None,
            children: Vec::new(),
        }));
        self.log.push(HostOp::Create(id));
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    pub fn node(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            HostNodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn props(&self, id: NodeId) -> Option<&Props> {
        match &self.node(id)?.kind {
            HostNodeKind::Element { props, .. } => Some(props),
            _ => None,
        }
    }

    /// Concatenated text of every text node below `id`, in tree order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        if let Some(node) = self.node(id) {
            if let HostNodeKind::Text(text) = &node.kind {
                output.push_str(text);
            }
            for child in &node.children {
                self.collect_text(*child, output);
            }
        }
    }

    /// Number of live (not yet released) nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn log(&self) -> &[HostOp] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.log)
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Some(node) => {
                match &node.kind {
                    HostNodeKind::Element { tag, .. } => {
                        output.push_str(&format!("{indent}[{id}] <{tag}>\n"))
                    }
                    HostNodeKind::Text(text) => {
                        output.push_str(&format!("{indent}[{id}] {text:?}\n"))
                    }
                    HostNodeKind::Empty => output.push_str(&format!("{indent}[{id}] (empty)\n")),
                }
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }

    fn detach(&mut self, id: NodeId) -> Result<Option<(NodeId, usize)>, HostError> {
        let parent = self.node_mut(id)?.parent.take();
        let Some(parent) = parent else {
            return Ok(None);
        };
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings.iter().position(|child| *child == id);
        if let Some(index) = index {
            siblings.remove(index);
            return Ok(Some((parent, index)));
        }
        Ok(None)
    }

    fn release(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.release(child);
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut cursor = Some(of);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.parent(id);
        }
        false
    }
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str, props: &Props) -> Result<NodeId, HostError> {
        Ok(self.alloc(HostNodeKind::Element {
            tag: tag.to_string(),
            props: props.clone(),
        }))
    }

    fn create_text(&mut self, text: &str) -> Result<NodeId, HostError> {
        Ok(self.alloc(HostNodeKind::Text(text.to_string())))
    }

    fn create_empty(&mut self) -> Result<NodeId, HostError> {
        Ok(self.alloc(HostNodeKind::Empty))
    }

    fn update_props(&mut self, id: NodeId, prev: &Props, next: &Props) -> Result<(), HostError> {
        let node = self.node_mut(id)?;
        if let HostNodeKind::Element { props, .. } = &mut node.kind {
            *props = next.clone();
        }
        if !prev.shallow_equal(next) {
            self.log.push(HostOp::UpdateProps(id));
        }
        Ok(())
    }

    fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), HostError> {
        let node = self.node_mut(id)?;
        node.kind = HostNodeKind::Text(text.to_string());
        self.log.push(HostOp::SetText(id));
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), HostError> {
        self.node_mut(child)?;
        if self.is_ancestor(child, parent) {
            return Err(HostError::InvalidInsert { parent, child });
        }
        if self.node_mut(parent)?.children.get(index) == Some(&child) {
            return Ok(());
        }
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.log.push(HostOp::Insert {
            parent,
            child,
            index,
        });
        Ok(())
    }

    fn remove_node(&mut self, id: NodeId) -> Result<(), HostError> {
        self.detach(id)?;
        self.release(id);
        self.log.push(HostOp::Remove(id));
        Ok(())
    }

    fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), HostError> {
        self.node_mut(new)?;
        self.detach(new)?;
        if let Some((parent, index)) = self.detach(old)? {
            self.node_mut(parent)?.children.insert(index, new);
            self.node_mut(new)?.parent = Some(parent);
        }
        self.release(old);
        self.log.push(HostOp::Replace { old, new });
        Ok(())
    }

    fn begin_commit(&mut self) {}

    fn end_commit(&mut self) {
        self.commits += 1;
    }
}

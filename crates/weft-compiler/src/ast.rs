#![forbid(unsafe_code)]

//! The compiled-template AST.
//!
//! # Design
//!
//! Arena storage: an [`Ast`] owns all nodes in a flat `Vec`, addressed by
//! [`NodeId`]. Children lists own the topology top-down; the parent
//! back-reference is a plain id used for navigation only (the template-loop
//! ancestry check walks it).
//!
//! Conditional chains are modeled the way the code generator consumes them:
//! the chain owner's `if_blocks` lists every branch, first entry being the
//! owner itself. Non-first branches are *not* children of anyone — they are
//! reachable only through the branch list.

use ahash::AHashMap;
use smallvec::SmallVec;

bitflags::bitflags! {
    /// Node marker flags.
    ///
    /// The low bits are set by the parser; `STATIC`, `STATIC_ROOT`, and
    /// `STATIC_IN_FOR` are computed by the optimizer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Inside a pre-formatted region: compile verbatim.
        const PRE             = 0b0000_0001;
        /// Render-once marker.
        const ONCE            = 0b0000_0010;
        /// Has dynamic attribute/directive bindings.
        const HAS_BINDINGS    = 0b0000_0100;
        /// Component carries an inline template.
        const INLINE_TEMPLATE = 0b0000_1000;
        /// Rendered output never changes (pass 1).
        const STATIC          = 0b0001_0000;
        /// Hoisting root for a static subtree (pass 2).
        const STATIC_ROOT     = 0b0010_0000;
        /// Static/once node sitting inside an ancestor loop (pass 2).
        const STATIC_IN_FOR   = 0b0100_0000;
    }
}

/// Node discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Tagged element (or component).
    Element,
    /// Text with interpolated expressions.
    Expression,
    /// Plain text.
    Text,
}

/// Conditional directive marker on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondKind {
    If(String),
    ElseIf(String),
    Else,
}

/// One branch of a conditional chain. The first block of a chain is the
/// owner node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBlock {
    /// Branch condition; `None` for the final `else`.
    pub condition: Option<String>,
    pub block: NodeId,
}

/// Index of a node within its [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single AST node.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Element tag; empty for text/expression nodes.
    pub tag: String,
    /// Text content (plain or interpolated source) for non-element nodes.
    pub text: String,
    /// Static attributes in source order. Structural: never affects
    /// staticness.
    pub attrs: Vec<(String, String)>,
    /// Non-structural annotations attached by the parser (class/style
    /// bindings, keys, refs, slot targets, …). Every key here must be on
    /// the optimizer's whitelist for the node to qualify as static.
    pub data: AHashMap<String, String>,
    /// Loop directive source, e.g. `item in items`.
    pub for_expr: Option<String>,
    /// Conditional marker on this node.
    pub condition: Option<CondKind>,
    /// Branch list when this node owns a conditional chain.
    pub if_blocks: Vec<IfBlock>,
    pub flags: NodeFlags,
    pub parent: Option<NodeId>,
    pub children: SmallVec<[NodeId; 4]>,
}

impl Node {
    fn new(kind: NodeKind, tag: String, text: String, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            tag,
            text,
            attrs: Vec::new(),
            data: AHashMap::new(),
            for_expr: None,
            condition: None,
            if_blocks: Vec::new(),
            flags: NodeFlags::empty(),
            parent,
            children: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(NodeFlags::STATIC)
    }

    #[inline]
    #[must_use]
    pub fn is_static_root(&self) -> bool {
        self.flags.contains(NodeFlags::STATIC_ROOT)
    }
}

/// Arena-owned template tree.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        if let Some(parent) = self.nodes[id.index()].parent {
            self.nodes[parent.index()].children.push(id);
        }
        id
    }

    /// Append an element node under `parent` (or as a root when `None`).
    pub fn element(&mut self, parent: Option<NodeId>, tag: impl Into<String>) -> NodeId {
        self.push(Node::new(
            NodeKind::Element,
            tag.into(),
            String::new(),
            parent,
        ))
    }

    /// Append a plain-text node.
    pub fn text(&mut self, parent: Option<NodeId>, content: impl Into<String>) -> NodeId {
        self.push(Node::new(
            NodeKind::Text,
            String::new(),
            content.into(),
            parent,
        ))
    }

    /// Append an interpolated-text node.
    pub fn expression(&mut self, parent: Option<NodeId>, content: impl Into<String>) -> NodeId {
        self.push(Node::new(
            NodeKind::Expression,
            String::new(),
            content.into(),
            parent,
        ))
    }

    /// Append a conditional branch that is *not* parented anywhere: it is
    /// reachable only through the chain owner's branch list.
    pub fn detached_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(Node::new(
            NodeKind::Element,
            tag.into(),
            String::new(),
            None,
        ))
    }

    // ── Parser-style mutators ────────────────────────────────────────

    /// Mark `id` as a conditional chain owner with the given condition.
    /// The owner becomes the first branch of its own chain.
    pub fn set_condition(&mut self, id: NodeId, expr: impl Into<String>) {
        let expr = expr.into();
        let node = self.node_mut(id);
        node.condition = Some(CondKind::If(expr.clone()));
        node.if_blocks.push(IfBlock {
            condition: Some(expr),
            block: id,
        });
    }

    /// Append an else-if/else branch to `owner`'s chain, marking `block`
    /// accordingly.
    pub fn add_branch(&mut self, owner: NodeId, condition: Option<String>, block: NodeId) {
        self.node_mut(block).condition = match &condition {
            Some(expr) => Some(CondKind::ElseIf(expr.clone())),
            None => Some(CondKind::Else),
        };
        self.node_mut(owner).if_blocks.push(IfBlock {
            condition,
            block,
        });
    }

    pub fn set_for(&mut self, id: NodeId, expr: impl Into<String>) {
        self.node_mut(id).for_expr = Some(expr.into());
    }

    pub fn set_flag(&mut self, id: NodeId, flag: NodeFlags) {
        self.node_mut(id).flags.insert(flag);
    }

    pub fn add_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.node_mut(id).attrs.push((name.into(), value.into()));
    }

    pub fn insert_data(&mut self, id: NodeId, key: impl Into<String>, value: impl Into<String>) {
        self.node_mut(id).data.insert(key.into(), value.into());
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_and_parents_are_linked() {
        let mut ast = Ast::new();
        let root = ast.element(None, "div");
        let child = ast.text(Some(root), "hi");

        assert_eq!(ast.node(root).children.as_slice(), &[child]);
        assert_eq!(ast.node(child).parent, Some(root));
        assert!(ast.node(root).is_element());
        assert!(!ast.node(child).is_element());
    }

    #[test]
    fn conditional_chain_links_branches() {
        let mut ast = Ast::new();
        let owner = ast.element(None, "p");
        ast.set_condition(owner, "show");
        let alt = ast.detached_element("p");
        ast.add_branch(owner, None, alt);

        let blocks = &ast.node(owner).if_blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block, owner);
        assert_eq!(blocks[1].block, alt);
        assert_eq!(ast.node(alt).condition, Some(CondKind::Else));
        assert!(ast.node(alt).parent.is_none());
    }

    #[test]
    fn flags_are_independent_bits() {
        let mut flags = NodeFlags::empty();
        flags.insert(NodeFlags::STATIC);
        flags.insert(NodeFlags::STATIC_IN_FOR);
        assert!(flags.contains(NodeFlags::STATIC));
        assert!(!flags.contains(NodeFlags::STATIC_ROOT));
    }
}

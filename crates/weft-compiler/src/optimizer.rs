#![forbid(unsafe_code)]

//! Static-subtree detection: two passes over a compiled template AST.
//!
//! Run once per compilation, never per render. Pass 1 (`mark_static`)
//! decides, bottom-up, which nodes can never change. Pass 2
//! (`mark_static_roots`) picks the subtrees worth hoisting into a
//! created-once render artifact.
//!
//! # Invariants
//!
//! 1. Staticness is a conjunction over the walked subtree: one dynamic
//!    descendant poisons every ancestor on the walk path.
//! 2. Slot content is fenced off: children of a non-reserved component tag
//!    are never walked, and never influence the component's own flag —
//!    they belong to the parent scope and mutating their marks would break
//!    re-rendering of that scope.
//! 3. A static root has at least one child and is not merely a single
//!    plain-text child (hoisting a lone text node costs more than it
//!    saves). Marking a root stops recursion beneath it.

use ahash::AHashSet;

use crate::ast::{Ast, NodeFlags, NodeId, NodeKind};

/// Keys the parser attaches for purely structural bookkeeping. A node whose
/// `data` map carries any key outside this set (plus the configured extras)
/// has semantically relevant annotations and cannot be static.
const STRUCTURAL_KEYS: [&str; 11] = [
    "type",
    "tag",
    "attrsList",
    "attrsMap",
    "plain",
    "parent",
    "children",
    "attrs",
    "start",
    "end",
    "rawAttrsMap",
];

/// Tags owned by the framework itself; never static.
fn is_built_in_tag(tag: &str) -> bool {
    tag == "slot" || tag == "component"
}

/// Options for [`optimize`].
pub struct OptimizeOptions {
    /// Comma-separated extra whitelist keys (the web platform passes
    /// `staticClass,staticStyle`).
    pub static_keys: String,
    /// Whether a tag is a platform-reserved (native) element, as opposed to
    /// a user component.
    pub is_reserved_tag: Box<dyn Fn(&str) -> bool>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            static_keys: String::new(),
            is_reserved_tag: Box::new(|_| false),
        }
    }
}

struct Pass<'a> {
    static_keys: AHashSet<&'a str>,
    is_reserved_tag: &'a dyn Fn(&str) -> bool,
}

/// Annotate `static`, `static_root`, and `static_in_for` marks in place,
/// starting from `root`.
pub fn optimize(ast: &mut Ast, root: NodeId, options: &OptimizeOptions) {
    if ast.is_empty() {
        return;
    }
    let mut static_keys: AHashSet<&str> = STRUCTURAL_KEYS.iter().copied().collect();
    static_keys.extend(
        options
            .static_keys
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty()),
    );
    let pass = Pass {
        static_keys,
        is_reserved_tag: options.is_reserved_tag.as_ref(),
    };
    mark_static(ast, root, &pass);
    mark_static_roots(ast, root, false);
}

// ── Pass 1 ───────────────────────────────────────────────────────────────

fn mark_static(ast: &mut Ast, id: NodeId, pass: &Pass<'_>) {
    let own = is_static(ast, id, pass);
    ast.node_mut(id).flags.set(NodeFlags::STATIC, own);

    if ast.node(id).kind != NodeKind::Element {
        return;
    }

    // Slot-content fence: do not walk into the children of a component.
    // Their staticness belongs to the parent scope and must not leak into
    // (or out of) the component node.
    {
        let node = ast.node(id);
        if !(pass.is_reserved_tag)(&node.tag)
            && node.tag != "slot"
            && !node.flags.contains(NodeFlags::INLINE_TEMPLATE)
        {
            return;
        }
    }

    let children: Vec<NodeId> = ast.node(id).children.to_vec();
    for child in children {
        mark_static(ast, child, pass);
        if !ast.node(child).is_static() {
            ast.node_mut(id).flags.remove(NodeFlags::STATIC);
        }
    }

    // Non-first conditional branches; the first block is this node itself.
    let branches: Vec<NodeId> = ast
        .node(id)
        .if_blocks
        .iter()
        .skip(1)
        .map(|b| b.block)
        .collect();
    for block in branches {
        mark_static(ast, block, pass);
        if !ast.node(block).is_static() {
            ast.node_mut(id).flags.remove(NodeFlags::STATIC);
        }
    }
}

fn is_static(ast: &Ast, id: NodeId, pass: &Pass<'_>) -> bool {
    let node = ast.node(id);
    match node.kind {
        NodeKind::Expression => false,
        NodeKind::Text => true,
        NodeKind::Element => {
            if node.flags.contains(NodeFlags::PRE) {
                return true;
            }
            !node.flags.contains(NodeFlags::HAS_BINDINGS)
                && node.condition.is_none()
                && node.for_expr.is_none()
                && !is_built_in_tag(&node.tag)
                && (pass.is_reserved_tag)(&node.tag)
                && !is_direct_child_of_template_for(ast, id)
                && node
                    .data
                    .keys()
                    .all(|key| pass.static_keys.contains(key.as_str()))
        }
    }
}

/// Whether the node hangs off a chain of `template` ancestors one of which
/// carries a loop directive. Such nodes re-render per iteration even though
/// nothing about them looks dynamic locally.
fn is_direct_child_of_template_for(ast: &Ast, id: NodeId) -> bool {
    let mut current = ast.node(id).parent;
    while let Some(parent_id) = current {
        let parent = ast.node(parent_id);
        if parent.tag != "template" {
            return false;
        }
        if parent.for_expr.is_some() {
            return true;
        }
        current = parent.parent;
    }
    false
}

// ── Pass 2 ───────────────────────────────────────────────────────────────

fn mark_static_roots(ast: &mut Ast, id: NodeId, in_for: bool) {
    if ast.node(id).kind != NodeKind::Element {
        return;
    }

    {
        let flags = ast.node(id).flags;
        if flags.contains(NodeFlags::STATIC) || flags.contains(NodeFlags::ONCE) {
            ast.node_mut(id).flags.set(NodeFlags::STATIC_IN_FOR, in_for);
        }
    }

    let qualifies = {
        let node = ast.node(id);
        node.flags.contains(NodeFlags::STATIC)
            && !node.children.is_empty()
            && !(node.children.len() == 1
                && ast.node(node.children[0]).kind == NodeKind::Text)
    };
    if qualifies {
        // Everything beneath is covered by the hoisted subtree; deeper
        // roots would be redundant.
        ast.node_mut(id).flags.insert(NodeFlags::STATIC_ROOT);
        return;
    }
    ast.node_mut(id).flags.remove(NodeFlags::STATIC_ROOT);

    let (children, child_in_for) = {
        let node = ast.node(id);
        (
            node.children.to_vec(),
            in_for || node.for_expr.is_some(),
        )
    };
    for child in children {
        mark_static_roots(ast, child, child_in_for);
    }

    let branches: Vec<NodeId> = ast
        .node(id)
        .if_blocks
        .iter()
        .skip(1)
        .map(|b| b.block)
        .collect();
    for block in branches {
        mark_static_roots(ast, block, in_for);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Analysis-facing syntax representation.
//!
//! The parser lowers the concrete tree-sitter tree into a flat arena of
//! [`SyntaxNode`]s in evaluation order (sub-expressions before the node that
//! consumes them). Each node carries the lexical scope table in effect at
//! its position, so type resolution never needs the concrete tree again.

use crate::typedef::TypeDef;

/// The identifier text the engine splices into the source at the cursor
/// before re-parsing. Chosen so it can never collide with real Lua code.
pub const PLACEHOLDER: &str = "__prefix_placeholder__";

/// Index into [`Nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Member access spelling. Colon access implies a method call, which matters
/// for suggestion filtering and `self` display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexer {
    Dot,
    Colon,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Top-level chunk; `returns` are the chunk's return statements, which
    /// define the module's exported types.
    Chunk { returns: Vec<NodeId> },
    Identifier { name: String },
    Member {
        base: NodeId,
        indexer: Indexer,
        name: String,
    },
    Index { base: NodeId, index: NodeId },
    Call { base: NodeId, args: Vec<NodeId> },
    NumberLiteral,
    StringLiteral { value: String },
    BooleanLiteral,
    NilLiteral,
    Vararg,
    Function {
        /// Assignment target when declared as `function name(...)`.
        name: Option<NodeId>,
        params: Vec<String>,
        is_method: bool,
        returns: Vec<NodeId>,
    },
    TableConstructor { entries: Vec<(Option<String>, NodeId)> },
    Assignment { targets: Vec<NodeId>, values: Vec<NodeId> },
    LocalDeclaration { targets: Vec<NodeId>, values: Vec<NodeId> },
    Return { values: Vec<NodeId> },
    /// Syntax the inference pass has no knowledge to draw from. Children are
    /// still lowered so placeholders inside them stay reachable.
    Unhandled,
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Innermost scope table at this node's position.
    pub scope: TypeDef,
}

/// Flat node arena, ordered by creation.
#[derive(Debug, Default)]
pub struct Nodes {
    nodes: Vec<SyntaxNode>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: SyntaxNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }
}

/// Why a scope was opened. Function scopes carry the declaration target so
/// the sink can seed parameter types from an already-known signature.
#[derive(Debug, Clone, Copy)]
pub enum ScopeKind {
    Block,
    Function {
        name: Option<NodeId>,
        is_method: bool,
    },
}

/// How an identifier entered its scope.
#[derive(Debug, Clone, Copy)]
pub enum Binding {
    Local,
    Parameter { index: usize },
}

/// Receiver for the parser's lowering events, in source order. Implemented
/// by the analysis session, which builds scope tables and the node arena as
/// the events arrive.
pub trait ParseSink {
    fn scope_opened(&mut self, kind: ScopeKind);
    fn scope_closed(&mut self);
    fn identifier_bound(&mut self, name: &str, binding: Binding);
    fn node_created(&mut self, kind: NodeKind) -> NodeId;
}

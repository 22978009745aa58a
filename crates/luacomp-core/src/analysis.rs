//! One file's end-to-end analysis session.
//!
//! The session owns the scope stack and node arena while the parser streams
//! events into it, tracks `require` dependencies discovered during parsing,
//! runs the extraction pass once dependencies are settled, and answers
//! completion queries once `Ready`. The shared base graph is activated under
//! a fresh overlay generation at construction, so nothing a session writes
//! can leak into another session's view.

use std::collections::HashMap;

use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::extraction::Extractor;
use crate::lattice::{apply_diff, merge};
use crate::parser::{LuaParser, ParseError};
use crate::resolve::Resolver;
use crate::syntax::{
    Binding, NodeId, NodeKind, Nodes, ParseSink, ScopeKind, SyntaxNode, PLACEHOLDER,
};
use crate::typedef::{
    ArgInfo, FieldKey, GlobalDiff, TypeArena, TypeContext, TypeDef, TypeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Parsing,
    Extracting,
    AwaitingRequires,
    Ready,
}

/// Member accessor spelling at the query site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Dot,
    Colon,
}

/// A module's cacheable analysis output: what its chunk returns and what it
/// wrote against the shared global scope.
#[derive(Debug, Clone, Default)]
pub struct ModuleResult {
    pub return_types: Vec<TypeDef>,
    pub global_diff: GlobalDiff,
}

/// One completion candidate before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Found {
    pub name: String,
    pub typedef: TypeDef,
    /// Set for `:` queries, where the leading `self` argument is implied.
    pub omit_self: bool,
}

struct PendingFunction {
    typedef: TypeDef,
    /// Previously known signature of the declaration target, if any; used to
    /// seed parameter types.
    seed: Option<TypeId>,
    args: Vec<ArgInfo>,
    scope: TypeDef,
    param_names: Vec<String>,
}

pub struct Analysis {
    ctx: TypeContext,
    nodes: Nodes,
    resolver: Resolver,
    global: TypeDef,
    scopes: SmallVec<[TypeDef; 8]>,
    pending: Vec<PendingFunction>,
    requires: Vec<(String, NodeId)>,
    module_diffs: HashMap<NodeId, GlobalDiff>,
    function_scopes: HashMap<NodeId, (TypeDef, Vec<String>)>,
    state: SessionState,
    chunk: Option<NodeId>,
}

impl Analysis {
    /// Activate the frozen base under a fresh overlay generation and push
    /// the root scope.
    pub fn new(arena: &mut TypeArena, global: TypeDef) -> Self {
        arena.invalidate_overlays();
        let mut ctx = TypeContext::new();
        let root = child_scope(arena, &mut ctx, global);
        Self {
            ctx,
            nodes: Nodes::new(),
            resolver: Resolver::new(),
            global,
            scopes: smallvec![root],
            pending: Vec::new(),
            requires: Vec::new(),
            module_diffs: HashMap::new(),
            function_scopes: HashMap::new(),
            state: SessionState::Parsing,
            chunk: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ctx(&self) -> &TypeContext {
        &self.ctx
    }

    fn current_scope(&self) -> TypeDef {
        *self.scopes.last().unwrap_or(&self.global)
    }

    pub fn parse(
        &mut self,
        arena: &mut TypeArena,
        parser: &mut LuaParser,
        source: &str,
    ) -> Result<(), ParseError> {
        let mut sink = SessionSink {
            arena,
            session: self,
        };
        parser.parse(source, &mut sink)?;
        self.state = SessionState::Extracting;
        debug!(nodes = self.nodes.len(), requires = self.requires.len(), "parsed");
        Ok(())
    }

    /// Distinct module names this file requires, in first-seen order.
    pub fn required_modules(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (name, _) in &self.requires {
            if !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    /// Capture the writes made so far against the global scope, before
    /// nested module analyses clobber the overlay generation.
    pub fn begin_requires(&mut self, arena: &TypeArena) -> GlobalDiff {
        self.state = SessionState::AwaitingRequires;
        match self.global.struct_id() {
            Some(global) => arena.diff_shallow(&self.ctx, global),
            None => GlobalDiff::default(),
        }
    }

    /// Re-activate this session's overlay after module resolution and record
    /// each resolved module at its `require` call sites.
    pub fn finish_requires(
        &mut self,
        arena: &mut TypeArena,
        main_diff: &GlobalDiff,
        resolved: &HashMap<String, ModuleResult>,
    ) {
        arena.invalidate_overlays();
        apply_diff(arena, &mut self.ctx, main_diff);
        for (name, call) in &self.requires {
            let Some(result) = resolved.get(name) else {
                continue;
            };
            if let Some(&first) = result.return_types.first() {
                self.resolver.register_require(*call, first);
            }
            self.module_diffs.insert(*call, result.global_diff.clone());
        }
        self.state = SessionState::Extracting;
    }

    /// Run extraction over every collected node in completion order, apply
    /// module diffs at their `require` sites, and become `Ready`.
    pub fn evaluate(&mut self, arena: &mut TypeArena, extractor: &mut Extractor) {
        for id in self.nodes.ids() {
            if let Some(diff) = self.module_diffs.get(&id) {
                apply_diff(arena, &mut self.ctx, diff);
            }
            extractor.extract(&self.nodes, arena, &mut self.ctx, &mut self.resolver, id);
        }
        self.refine_arguments(arena);
        self.state = SessionState::Ready;
    }

    /// Fold what a function body taught us about its parameters back into
    /// the function's argument slots.
    fn refine_arguments(&mut self, arena: &mut TypeArena) {
        for (&node, (scope, params)) in &self.function_scopes {
            let Some(TypeDef::Function(function)) = self.resolver.function_type(node) else {
                continue;
            };
            let Some(scope_id) = scope.struct_id() else {
                continue;
            };
            for (index, name) in params.iter().enumerate() {
                let learned = arena.get(&self.ctx, scope_id, &FieldKey::Name(name.clone()));
                let existing = arena.get(&self.ctx, function, &FieldKey::Argument(index));
                if let Some(merged) = merge(arena, &mut self.ctx, existing, learned) {
                    arena.set(&mut self.ctx, function, FieldKey::Argument(index), merged);
                }
            }
        }
    }

    /// Locate the spliced placeholder member and answer the query against
    /// its base (or the lexical scope for a bare-prefix query).
    pub fn solve_query(
        &mut self,
        arena: &mut TypeArena,
        prefix: &str,
        accessor: Option<Accessor>,
    ) -> Vec<Found> {
        if self.state != SessionState::Ready {
            return Vec::new();
        }
        let Some(base) = self.query_base() else {
            return Vec::new();
        };
        let base_type = match &self.nodes.get(base).kind {
            NodeKind::Identifier { name } if name == PLACEHOLDER => {
                Some(self.nodes.get(base).scope)
            }
            _ => self
                .resolver
                .type_of(&self.nodes, arena, &mut self.ctx, base),
        };
        let Some(base_type) = base_type else {
            return Vec::new();
        };
        let mut found: Vec<Found> = arena
            .search(&self.ctx, base_type, prefix)
            .into_iter()
            .filter_map(|(name, typedef)| {
                let typedef = self.ctx.canonical(typedef);
                match accessor {
                    Some(Accessor::Colon) => typedef.is_function().then_some(Found {
                        name,
                        typedef,
                        omit_self: true,
                    }),
                    _ => Some(Found {
                        name,
                        typedef,
                        omit_self: false,
                    }),
                }
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn query_base(&self) -> Option<NodeId> {
        for id in self.nodes.ids() {
            if let NodeKind::Member { base, name, .. } = &self.nodes.get(id).kind {
                if name == PLACEHOLDER {
                    return Some(*base);
                }
            }
        }
        None
    }

    /// The session's exportable result for cross-module caching.
    pub fn module_result(&mut self, arena: &mut TypeArena) -> ModuleResult {
        let mut return_types: Vec<TypeDef> = Vec::new();
        if let Some(chunk) = self.chunk {
            if let NodeKind::Chunk { returns } = &self.nodes.get(chunk).kind {
                let returns = returns.clone();
                for ret in returns {
                    let NodeKind::Return { values } = &self.nodes.get(ret).kind else {
                        continue;
                    };
                    let values = values.clone();
                    for (slot, value) in values.into_iter().enumerate() {
                        let incoming = self
                            .resolver
                            .type_of(&self.nodes, arena, &mut self.ctx, value);
                        if slot < return_types.len() {
                            if let Some(merged) = merge(
                                arena,
                                &mut self.ctx,
                                Some(return_types[slot]),
                                incoming,
                            ) {
                                return_types[slot] = merged;
                            }
                        } else {
                            return_types.push(incoming.unwrap_or(TypeDef::Unknown));
                        }
                    }
                }
            }
        }
        let global_diff = arena.diff_deep(&self.ctx, self.global);
        ModuleResult {
            return_types,
            global_diff,
        }
    }
}

fn child_scope(arena: &mut TypeArena, ctx: &mut TypeContext, parent: TypeDef) -> TypeDef {
    let scope = arena.table();
    let meta = arena.table();
    if let (Some(scope_id), Some(meta_id)) = (scope.struct_id(), meta.struct_id()) {
        arena.set(ctx, meta_id, FieldKey::Name("__index".to_string()), parent);
        arena.set_metatable(ctx, scope_id, meta);
    }
    scope
}

/// Parse-time view of the session: scope bookkeeping and node collection
/// happen here, type extraction happens later in [`Analysis::evaluate`].
struct SessionSink<'a> {
    arena: &'a mut TypeArena,
    session: &'a mut Analysis,
}

impl ParseSink for SessionSink<'_> {
    fn scope_opened(&mut self, kind: ScopeKind) {
        let session = &mut *self.session;
        let parent = session.current_scope();
        let scope = child_scope(self.arena, &mut session.ctx, parent);
        if let ScopeKind::Function { name, .. } = kind {
            let typedef = self.arena.function();
            let seed = name
                .and_then(|n| {
                    session
                        .resolver
                        .type_of(&session.nodes, self.arena, &mut session.ctx, n)
                })
                .and_then(|t| match t {
                    TypeDef::Function(id) => Some(session.ctx.find(id)),
                    _ => None,
                });
            session.pending.push(PendingFunction {
                typedef,
                seed,
                args: Vec::new(),
                scope,
                param_names: Vec::new(),
            });
        }
        session.scopes.push(scope);
    }

    fn scope_closed(&mut self) {
        if self.session.scopes.len() > 1 {
            self.session.scopes.pop();
        }
    }

    fn identifier_bound(&mut self, name: &str, binding: Binding) {
        let session = &mut *self.session;
        let scope = session.current_scope();
        let Some(scope_id) = scope.struct_id() else {
            return;
        };
        match binding {
            Binding::Local => {
                self.arena.set(
                    &mut session.ctx,
                    scope_id,
                    FieldKey::Name(name.to_string()),
                    TypeDef::Unknown,
                );
            }
            Binding::Parameter { index } => {
                let seeded = session
                    .pending
                    .last()
                    .and_then(|p| p.seed)
                    .and_then(|f| self.arena.get(&session.ctx, f, &FieldKey::Argument(index)))
                    .unwrap_or(TypeDef::Unknown);
                if let Some(pending) = session.pending.last_mut() {
                    if let Some(function) = pending.typedef.struct_id() {
                        self.arena.set(
                            &mut session.ctx,
                            function,
                            FieldKey::Argument(index),
                            seeded,
                        );
                    }
                    pending.args.push(ArgInfo::named(name));
                    pending.param_names.push(name.to_string());
                }
                self.arena.set(
                    &mut session.ctx,
                    scope_id,
                    FieldKey::Name(name.to_string()),
                    seeded,
                );
            }
        }
    }

    fn node_created(&mut self, kind: NodeKind) -> NodeId {
        let session = &mut *self.session;
        let scope = session.current_scope();
        let id = session.nodes.push(SyntaxNode { kind, scope });
        match session.nodes.get(id).kind.clone() {
            NodeKind::Function { .. } => {
                if let Some(pending) = session.pending.pop() {
                    session.resolver.register_function(id, pending.typedef);
                    if let Some(function) = pending.typedef.struct_id() {
                        self.arena.set_args(&session.ctx, function, pending.args);
                    }
                    session
                        .function_scopes
                        .insert(id, (pending.scope, pending.param_names));
                }
            }
            NodeKind::Call { base, args } => {
                if let NodeKind::Identifier { name } = &session.nodes.get(base).kind {
                    if name == "require" {
                        if let Some(&first) = args.first() {
                            if let NodeKind::StringLiteral { value } =
                                &session.nodes.get(first).kind
                            {
                                session.requires.push((value.clone(), id));
                            }
                        }
                    }
                }
            }
            NodeKind::Chunk { .. } => session.chunk = Some(id),
            _ => {}
        }
        id
    }
}

//! Single-pass type extraction.
//!
//! Runs once per syntax node in completion order. Assignments write inferred
//! types to their lvalue locations through the merge lattice; member access
//! and calls optionally contribute speculative knowledge according to the
//! configured discovery strategy. Speculation only ever upgrades values that
//! are still nil or unknown.

use std::collections::HashMap;

use serde::Deserialize;

use crate::lattice::merge;
use crate::resolve::{Location, Resolver};
use crate::syntax::{NodeId, NodeKind, Nodes, PLACEHOLDER};
use crate::typedef::{FieldKey, TypeArena, TypeContext, TypeDef, TypeId};

/// How aggressively members of unknown tables are guessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// Never guess.
    None,
    /// A member exists once it has been accessed in-file.
    #[default]
    UsedOnly,
    /// Additionally graft the most specific matching pre-named structural
    /// type onto the table.
    TypeAssumption,
}

pub struct Extractor {
    strategy: DiscoveryStrategy,
    named_types: Vec<(String, TypeDef)>,
    /// Field count of the named type last grafted onto a table. A new
    /// candidate must be at least this large, so assumptions refine rather
    /// than flip-flop.
    assumed: HashMap<TypeId, usize>,
    global: TypeDef,
}

impl Extractor {
    pub fn new(
        strategy: DiscoveryStrategy,
        named_types: Vec<(String, TypeDef)>,
        global: TypeDef,
    ) -> Self {
        Self {
            strategy,
            named_types,
            assumed: HashMap::new(),
            global,
        }
    }

    pub fn extract(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        id: NodeId,
    ) {
        match &nodes.get(id).kind {
            NodeKind::LocalDeclaration { targets, values }
            | NodeKind::Assignment { targets, values } => {
                let targets = targets.clone();
                let values = values.clone();
                self.assign(nodes, arena, ctx, resolver, &targets, &values);
            }
            NodeKind::Function { name, returns, .. } => {
                let name = *name;
                let returns = returns.clone();
                self.function_declaration(nodes, arena, ctx, resolver, id, name, &returns);
            }
            NodeKind::Member { base, name, .. } => {
                let base = *base;
                let name = name.clone();
                self.member_access(nodes, arena, ctx, resolver, base, &name);
            }
            NodeKind::Index { base, index } => {
                if let NodeKind::StringLiteral { value } = &nodes.get(*index).kind {
                    let base = *base;
                    let name = value.clone();
                    self.member_access(nodes, arena, ctx, resolver, base, &name);
                }
            }
            NodeKind::Call { base, args } => {
                let base = *base;
                let args = args.clone();
                self.call(nodes, arena, ctx, resolver, base, &args);
            }
            _ => {}
        }
    }

    fn assign(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        targets: &[NodeId],
        values: &[NodeId],
    ) {
        let types = resolver.value_types(nodes, arena, ctx, values, targets.len());
        for (&target, value_type) in targets.iter().zip(types) {
            let Some((owner, key)) = self.lvalue_for(nodes, arena, ctx, resolver, target) else {
                continue;
            };
            let existing = arena.get(ctx, owner, &key);
            let incoming = value_type.unwrap_or(TypeDef::Unknown);
            if let Some(merged) = merge(arena, ctx, existing, Some(incoming)) {
                arena.set(ctx, owner, key, merged);
            }
        }
    }

    fn function_declaration(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        id: NodeId,
        name: Option<NodeId>,
        returns: &[NodeId],
    ) {
        let Some(TypeDef::Function(function)) = resolver.function_type(id) else {
            return;
        };
        let function = ctx.find(function);
        let mut ret_count = arena.ret_count(ctx, function);
        for &ret in returns {
            let NodeKind::Return { values } = &nodes.get(ret).kind else {
                continue;
            };
            // All reachable returns merge together, control-flow-insensitive.
            let values = values.clone();
            for (slot, &value) in values.iter().enumerate() {
                let incoming = resolver
                    .type_of(nodes, arena, ctx, value)
                    .unwrap_or(TypeDef::Unknown);
                let existing = arena.get(ctx, function, &FieldKey::Return(slot));
                if let Some(merged) = merge(arena, ctx, existing, Some(incoming)) {
                    arena.set(ctx, function, FieldKey::Return(slot), merged);
                }
                ret_count = ret_count.max(slot + 1);
            }
        }
        arena.set_ret_count(ctx, function, ret_count);

        if let Some(target) = name {
            if let Some((owner, key)) = self.lvalue_for(nodes, arena, ctx, resolver, target) {
                let existing = arena.get(ctx, owner, &key);
                if let Some(merged) =
                    merge(arena, ctx, existing, Some(TypeDef::Function(function)))
                {
                    arena.set(ctx, owner, key, merged);
                }
            }
        }
    }

    /// A member access means the base is at least a table and the member is
    /// at least known to exist.
    fn member_access(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        base: NodeId,
        name: &str,
    ) {
        if name == PLACEHOLDER || self.strategy == DiscoveryStrategy::None {
            return;
        }
        let Some(base_type) = self.ensure_table(nodes, arena, ctx, resolver, base) else {
            return;
        };
        let Some(table) = base_type.struct_id() else {
            return;
        };
        if arena.resolve(ctx, base_type, name).is_some() {
            return;
        }
        if self.strategy == DiscoveryStrategy::TypeAssumption
            && self.assume(arena, ctx, table, name)
        {
            return;
        }
        arena.set(ctx, table, FieldKey::Name(name.to_string()), TypeDef::Unknown);
    }

    fn call(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        base: NodeId,
        args: &[NodeId],
    ) {
        if let NodeKind::Identifier { name } = &nodes.get(base).kind {
            if name == "setmetatable" && args.len() >= 2 {
                self.setmetatable(nodes, arena, ctx, resolver, args[0], args[1]);
            }
        }
        if self.strategy == DiscoveryStrategy::None {
            return;
        }
        // The callee is at least a function.
        match resolver.type_of(nodes, arena, ctx, base) {
            Some(TypeDef::Function(_)) | Some(TypeDef::Table(_)) => {}
            existing @ (None | Some(TypeDef::Unknown) | Some(TypeDef::Nil)) => {
                let Some((owner, key)) = self.lvalue_for(nodes, arena, ctx, resolver, base) else {
                    return;
                };
                let fresh = arena.function();
                if let Some(merged) = merge(arena, ctx, existing, Some(fresh)) {
                    arena.set(ctx, owner, key, merged);
                }
            }
            Some(_) => {}
        }
    }

    fn setmetatable(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        target: NodeId,
        metatable: NodeId,
    ) {
        let Some(TypeDef::Table(table)) = resolver.type_of(nodes, arena, ctx, target) else {
            return;
        };
        let Some(incoming) = resolver.type_of(nodes, arena, ctx, metatable) else {
            return;
        };
        let existing = arena.metatable(ctx, table);
        if let Some(merged) = merge(arena, ctx, existing, Some(incoming)) {
            arena.set_metatable(ctx, table, merged);
        }
    }

    /// An assignment target's location, creating speculative container
    /// tables for member targets whose base is still unknown.
    fn lvalue_for(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        target: NodeId,
    ) -> Option<Location> {
        if let Some(location) = resolver.lvalue(nodes, arena, ctx, self.global, target) {
            return Some(location);
        }
        match &nodes.get(target).kind {
            NodeKind::Member { base, name, .. } if name != PLACEHOLDER => {
                let base = *base;
                let name = name.clone();
                let table = self.ensure_table(nodes, arena, ctx, resolver, base)?;
                table
                    .struct_id()
                    .map(|id| (ctx.find(id), FieldKey::Name(name)))
            }
            NodeKind::Index { base, index } => {
                let name = match &nodes.get(*index).kind {
                    NodeKind::StringLiteral { value } => value.clone(),
                    _ => return None,
                };
                let base = *base;
                let table = self.ensure_table(nodes, arena, ctx, resolver, base)?;
                table
                    .struct_id()
                    .map(|id| (ctx.find(id), FieldKey::Name(name)))
            }
            _ => None,
        }
    }

    /// The type of `base`, upgraded to a fresh table when it is still nil or
    /// unknown. Never downgrades more specific knowledge.
    fn ensure_table(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        resolver: &mut Resolver,
        base: NodeId,
    ) -> Option<TypeDef> {
        match resolver.type_of(nodes, arena, ctx, base) {
            Some(table @ TypeDef::Table(_)) => return Some(ctx.canonical(table)),
            None | Some(TypeDef::Unknown) | Some(TypeDef::Nil) => {}
            Some(_) => return None,
        }
        if self.strategy == DiscoveryStrategy::None {
            return None;
        }
        let (owner, key) = self.lvalue_for(nodes, arena, ctx, resolver, base)?;
        let existing = arena.get(ctx, owner, &key);
        let fresh = arena.table();
        let merged = merge(arena, ctx, existing, Some(fresh))?;
        arena.set(ctx, owner, key, merged);
        match ctx.canonical(merged) {
            table @ TypeDef::Table(_) => Some(table),
            _ => None,
        }
    }

    /// One-shot heuristic: graft the smallest pre-named type containing
    /// `member` whose field count is at least as large as any previously
    /// grafted candidate's. The greater-or-equal floor lets an equally sized
    /// sibling type refine an earlier guess instead of being rejected.
    fn assume(
        &mut self,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        table: TypeId,
        member: &str,
    ) -> bool {
        let floor = self.assumed.get(&ctx.find(table)).copied().unwrap_or(0);
        let mut best: Option<(usize, TypeId)> = None;
        for (_, candidate) in &self.named_types {
            let TypeDef::Table(candidate_id) = ctx.canonical(*candidate) else {
                continue;
            };
            if ctx.find(candidate_id) == ctx.find(table) {
                continue;
            }
            if arena
                .resolve(ctx, TypeDef::Table(candidate_id), member)
                .is_none()
            {
                continue;
            }
            let size = arena.named_field_count(ctx, candidate_id);
            if size < floor {
                continue;
            }
            match best {
                Some((best_size, _)) if best_size <= size => {}
                _ => best = Some((size, candidate_id)),
            }
        }
        let Some((size, candidate_id)) = best else {
            return false;
        };
        // Field-by-field graft; no replacement registration, the named type
        // stays shared across assumption sites.
        for (key, value) in arena.effective_fields(ctx, candidate_id) {
            let existing = arena.get(ctx, table, &key);
            if let Some(merged) = merge(arena, ctx, existing, Some(value)) {
                arena.set(ctx, table, key, merged);
            }
        }
        self.assumed.insert(ctx.find(table), size);
        true
    }
}

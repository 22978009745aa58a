//! Expression and lvalue resolution over lowered syntax.
//!
//! `type_of` is a lazy structural recursion: it reads whatever knowledge the
//! scope tables and arena hold at the moment it is asked, which is how
//! earlier statements inform later ones during extraction. Unhandled forms
//! and dynamic keys resolve to nothing rather than erroring.

use std::collections::HashMap;

use crate::syntax::{NodeId, NodeKind, Nodes, PLACEHOLDER};
use crate::typedef::{FieldKey, TypeArena, TypeContext, TypeDef, TypeId};

/// An assignment target's defining location.
pub type Location = (TypeId, FieldKey);

#[derive(Debug, Default)]
pub struct Resolver {
    /// Function nodes to the function type created when their scope opened.
    function_types: HashMap<NodeId, TypeDef>,
    /// `require(...)` call nodes to the resolved module's first return type.
    require_types: HashMap<NodeId, TypeDef>,
    /// Table constructors evaluate to one table no matter how often asked.
    table_memo: HashMap<NodeId, TypeDef>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function(&mut self, node: NodeId, typedef: TypeDef) {
        self.function_types.insert(node, typedef);
    }

    pub fn function_type(&self, node: NodeId) -> Option<TypeDef> {
        self.function_types.get(&node).copied()
    }

    pub fn register_require(&mut self, node: NodeId, typedef: TypeDef) {
        self.require_types.insert(node, typedef);
    }

    /// Best-known type of an expression node, or `None` when no knowledge
    /// exists.
    pub fn type_of(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        id: NodeId,
    ) -> Option<TypeDef> {
        match &nodes.get(id).kind {
            NodeKind::Identifier { name } => {
                if name == PLACEHOLDER {
                    return None;
                }
                let scope = nodes.get(id).scope;
                arena.resolve(ctx, scope, name).map(|t| ctx.canonical(t))
            }
            NodeKind::Member { base, name, .. } => {
                if name == PLACEHOLDER {
                    return None;
                }
                let base = *base;
                let name = name.clone();
                let base_type = self.type_of(nodes, arena, ctx, base)?;
                arena.resolve(ctx, base_type, &name).map(|t| ctx.canonical(t))
            }
            NodeKind::Index { base, index } => {
                let name = match &nodes.get(*index).kind {
                    NodeKind::StringLiteral { value } => value.clone(),
                    _ => return None,
                };
                let base = *base;
                let base_type = self.type_of(nodes, arena, ctx, base)?;
                arena.resolve(ctx, base_type, &name).map(|t| ctx.canonical(t))
            }
            NodeKind::NumberLiteral => Some(TypeDef::Number),
            NodeKind::StringLiteral { .. } => Some(TypeDef::String),
            NodeKind::BooleanLiteral => Some(TypeDef::Boolean),
            NodeKind::NilLiteral => Some(TypeDef::Nil),
            NodeKind::Vararg => Some(TypeDef::Unknown),
            NodeKind::Function { .. } => self.function_type(id),
            NodeKind::TableConstructor { entries } => {
                if let Some(&memo) = self.table_memo.get(&id) {
                    return Some(ctx.canonical(memo));
                }
                let entries = entries.clone();
                let table = arena.table();
                self.table_memo.insert(id, table);
                for (name, value) in entries {
                    let Some(name) = name else { continue };
                    let value_type = self
                        .type_of(nodes, arena, ctx, value)
                        .unwrap_or(TypeDef::Unknown);
                    if let Some(table_id) = table.struct_id() {
                        arena.set(ctx, table_id, FieldKey::Name(name), value_type);
                    }
                }
                Some(table)
            }
            NodeKind::Call { base, .. } => {
                if let Some(&module) = self.require_types.get(&id) {
                    return Some(ctx.canonical(module));
                }
                let base = *base;
                match self.type_of(nodes, arena, ctx, base)? {
                    TypeDef::Function(function) => arena
                        .get(ctx, function, &FieldKey::Return(0))
                        .map(|t| ctx.canonical(t)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Where an assignment to this node lands: the owning table and key.
    /// Identifiers defined nowhere resolve to the global table as a new
    /// global. Member/index targets need their base to already be a table.
    pub fn lvalue(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        global: TypeDef,
        id: NodeId,
    ) -> Option<Location> {
        match &nodes.get(id).kind {
            NodeKind::Identifier { name } => {
                if name == PLACEHOLDER {
                    return None;
                }
                let name = name.clone();
                let scope = nodes.get(id).scope;
                match arena.resolve_owner(ctx, scope, &name) {
                    Some(owner) => Some((owner, FieldKey::Name(name))),
                    None => global.struct_id().map(|g| (ctx.find(g), FieldKey::Name(name))),
                }
            }
            NodeKind::Member { base, name, .. } => {
                if name == PLACEHOLDER {
                    return None;
                }
                let base = *base;
                let name = name.clone();
                match self.type_of(nodes, arena, ctx, base)? {
                    TypeDef::Table(table) => Some((ctx.find(table), FieldKey::Name(name))),
                    _ => None,
                }
            }
            NodeKind::Index { base, index } => {
                let name = match &nodes.get(*index).kind {
                    NodeKind::StringLiteral { value } => value.clone(),
                    _ => return None,
                };
                let base = *base;
                match self.type_of(nodes, arena, ctx, base)? {
                    TypeDef::Table(table) => Some((ctx.find(table), FieldKey::Name(name))),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Types of a value list aligned to `want` targets. A trailing call or
    /// vararg expands into the remaining slots, Lua style.
    pub fn value_types(
        &mut self,
        nodes: &Nodes,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
        values: &[NodeId],
        want: usize,
    ) -> Vec<Option<TypeDef>> {
        let mut out = vec![None; want];
        for (i, &value) in values.iter().enumerate() {
            if i >= want {
                break;
            }
            out[i] = self.type_of(nodes, arena, ctx, value);
        }
        if want > values.len() {
            if let Some(&last) = values.last() {
                match &nodes.get(last).kind {
                    NodeKind::Call { base, .. } => {
                        let base = *base;
                        if let Some(TypeDef::Function(function)) =
                            self.type_of(nodes, arena, ctx, base)
                        {
                            for slot in values.len()..want {
                                let offset = slot - (values.len() - 1);
                                out[slot] = arena.get(ctx, function, &FieldKey::Return(offset));
                            }
                        }
                    }
                    NodeKind::Vararg => {
                        for slot in values.len()..want {
                            out[slot] = Some(TypeDef::Unknown);
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }
}

//! The Lua type model.
//!
//! A [`TypeDef`] is a small copyable tag; structured kinds (tables and
//! functions) point into a [`TypeArena`] that owns their field maps. The
//! arena also carries the machinery that lets one large frozen base graph
//! (the standard library) be shared by every analysis session: writes to a
//! frozen value land in a generation-tagged overlay side record, and bumping
//! the generation invalidates every outstanding overlay in O(1).

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Index of a structured value inside a [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One piece of type knowledge. Primitives carry no payload; `Function` and
/// `Table` own a field mapping in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDef {
    Nil,
    Unknown,
    Boolean,
    Number,
    String,
    Function(TypeId),
    Table(TypeId),
}

impl TypeDef {
    /// Position in the merge lattice. Higher priority beats lower.
    pub fn priority(self) -> u8 {
        match self {
            TypeDef::Nil => 0,
            TypeDef::Unknown => 1,
            TypeDef::Boolean | TypeDef::Number | TypeDef::String => 2,
            TypeDef::Function(_) => 4,
            TypeDef::Table(_) => 5,
        }
    }

    /// The Lua-facing name of this kind, as shown in completion labels.
    pub fn kind_name(self) -> &'static str {
        match self {
            TypeDef::Nil => "nil",
            TypeDef::Unknown => "unknown",
            TypeDef::Boolean => "boolean",
            TypeDef::Number => "number",
            TypeDef::String => "string",
            TypeDef::Function(_) => "function",
            TypeDef::Table(_) => "table",
        }
    }

    pub fn struct_id(self) -> Option<TypeId> {
        match self {
            TypeDef::Function(id) | TypeDef::Table(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_table(self) -> bool {
        matches!(self, TypeDef::Table(_))
    }

    pub fn is_function(self) -> bool {
        matches!(self, TypeDef::Function(_))
    }
}

/// Key of one slot in a structured value. Member names are strings; the
/// metatable link and argument/return slots are reserved non-string tokens so
/// they can never collide with source-level member names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Name(String),
    Metatable,
    Argument(usize),
    Return(usize),
}

impl FieldKey {
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldKey::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// A declared function parameter, kept for display purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgInfo {
    pub name: String,
    pub display_name: Option<String>,
}

impl ArgInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }

    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// One documented overload of a standard-library function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocVariant {
    pub args: Option<Vec<ArgInfo>>,
    pub args_display: Option<String>,
    pub args_display_omit_self: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// Documentation metadata attached to standard-library values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocMeta {
    pub description: Option<String>,
    pub link: Option<String>,
    pub args_display: Option<String>,
    pub args_display_omit_self: Option<String>,
    pub variants: Vec<DocVariant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructKind {
    Table,
    Function,
}

#[derive(Debug, Clone)]
struct Overlay {
    generation: u64,
    fields: IndexMap<FieldKey, TypeDef>,
}

#[derive(Debug, Clone)]
struct StructData {
    kind: StructKind,
    fields: IndexMap<FieldKey, TypeDef>,
    /// Lazy copy-on-write link: fields live on the original until first write.
    copy_of: Option<TypeId>,
    frozen: bool,
    overlay: Option<Overlay>,
    args: Vec<ArgInfo>,
    ret_count: usize,
    doc: Option<Box<DocMeta>>,
}

impl StructData {
    fn new(kind: StructKind) -> Self {
        Self {
            kind,
            fields: IndexMap::new(),
            copy_of: None,
            frozen: false,
            overlay: None,
            args: Vec::new(),
            ret_count: 0,
            doc: None,
        }
    }
}

/// Per-session bookkeeping: the replacement map keeps references to
/// merged-away structured values valid (union-find style), and the clone memo
/// backs copy-on-write cloning.
#[derive(Debug, Default)]
pub struct TypeContext {
    replacements: HashMap<TypeId, TypeId>,
    copies: HashMap<TypeId, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a possibly merged-away id to its live representative.
    pub fn find(&self, id: TypeId) -> TypeId {
        let mut current = id;
        let mut seen = 0usize;
        while let Some(&next) = self.replacements.get(&current) {
            current = next;
            seen += 1;
            if seen > self.replacements.len() {
                break;
            }
        }
        current
    }

    /// Canonicalize the struct id inside a typedef.
    pub fn canonical(&self, value: TypeDef) -> TypeDef {
        match value {
            TypeDef::Table(id) => TypeDef::Table(self.find(id)),
            TypeDef::Function(id) => TypeDef::Function(self.find(id)),
            other => other,
        }
    }

    pub(crate) fn replace(&mut self, from: TypeId, to: TypeId) {
        if from != to {
            self.replacements.insert(from, to);
        }
    }
}

/// Everything written against frozen tables under one overlay generation,
/// captured as `(table, key, value)` triples so it can be re-applied onto a
/// later generation or another session's view.
#[derive(Debug, Clone, Default)]
pub struct GlobalDiff {
    pub entries: Vec<(TypeId, FieldKey, TypeDef)>,
}

impl GlobalDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Arena of structured type values plus the global overlay generation.
#[derive(Debug, Default)]
pub struct TypeArena {
    structs: Vec<StructData>,
    generation: u64,
}

impl TypeArena {
    pub fn new() -> Self {
        Self {
            structs: Vec::new(),
            generation: 1,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn alloc(&mut self, kind: StructKind) -> TypeId {
        let id = TypeId(self.structs.len() as u32);
        self.structs.push(StructData::new(kind));
        id
    }

    /// A fresh table with no members.
    pub fn table(&mut self) -> TypeDef {
        TypeDef::Table(self.alloc(StructKind::Table))
    }

    /// A fresh function with no known arguments or returns.
    pub fn function(&mut self) -> TypeDef {
        TypeDef::Function(self.alloc(StructKind::Function))
    }

    fn data(&self, id: TypeId) -> &StructData {
        &self.structs[id.index()]
    }

    pub fn is_frozen(&self, ctx: &TypeContext, id: TypeId) -> bool {
        self.data(ctx.find(id)).frozen
    }

    /// Read one field, honoring the replacement map, the live overlay, and
    /// the copy-on-write chain, in that order.
    pub fn get(&self, ctx: &TypeContext, id: TypeId, key: &FieldKey) -> Option<TypeDef> {
        let mut current = ctx.find(id);
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(current) {
                return None;
            }
            let data = self.data(current);
            if let Some(overlay) = &data.overlay {
                if overlay.generation == self.generation {
                    if let Some(value) = overlay.fields.get(key) {
                        return Some(*value);
                    }
                }
            }
            if let Some(value) = data.fields.get(key) {
                return Some(*value);
            }
            match data.copy_of {
                Some(original) => current = ctx.find(original),
                None => return None,
            }
        }
    }

    /// Write one field. Frozen values are never touched: the write goes to
    /// their overlay under the current generation. Unmaterialized copies
    /// first clone the original's current mapping (the lazy half of
    /// copy-on-write), then write their own.
    pub fn set(&mut self, ctx: &mut TypeContext, id: TypeId, key: FieldKey, value: TypeDef) {
        let id = ctx.find(id);
        if self.structs[id.index()].frozen {
            let generation = self.generation;
            let data = &mut self.structs[id.index()];
            let stale = data
                .overlay
                .as_ref()
                .map_or(true, |overlay| overlay.generation != generation);
            if stale {
                data.overlay = Some(Overlay {
                    generation,
                    fields: IndexMap::new(),
                });
            }
            if let Some(overlay) = data.overlay.as_mut() {
                overlay.fields.insert(key, value);
            }
            return;
        }
        if self.structs[id.index()].copy_of.is_some() {
            let materialized = self.effective_fields(ctx, id);
            let data = &mut self.structs[id.index()];
            data.fields = materialized;
            data.copy_of = None;
        }
        self.structs[id.index()].fields.insert(key, value);
    }

    /// The currently visible field mapping: copy-of chain flattened, live
    /// overlay entries layered over base fields.
    pub fn effective_fields(&self, ctx: &TypeContext, id: TypeId) -> IndexMap<FieldKey, TypeDef> {
        let mut chain = Vec::new();
        let mut current = ctx.find(id);
        let mut seen = HashSet::new();
        while seen.insert(current) {
            chain.push(current);
            match self.data(current).copy_of {
                Some(original) => current = ctx.find(original),
                None => break,
            }
        }
        let mut out = IndexMap::new();
        for &layer in chain.iter().rev() {
            let data = self.data(layer);
            for (key, value) in &data.fields {
                out.insert(key.clone(), *value);
            }
            if let Some(overlay) = &data.overlay {
                if overlay.generation == self.generation {
                    for (key, value) in &overlay.fields {
                        out.insert(key.clone(), *value);
                    }
                }
            }
        }
        out
    }

    /// Number of named members, used by the type-assumption heuristic to
    /// rank candidate named types.
    pub fn named_field_count(&self, ctx: &TypeContext, id: TypeId) -> usize {
        self.effective_fields(ctx, id)
            .keys()
            .filter(|key| key.name().is_some())
            .count()
    }

    pub fn metatable(&self, ctx: &TypeContext, id: TypeId) -> Option<TypeDef> {
        self.get(ctx, id, &FieldKey::Metatable)
    }

    pub fn set_metatable(&mut self, ctx: &mut TypeContext, id: TypeId, metatable: TypeDef) {
        self.set(ctx, id, FieldKey::Metatable, metatable);
    }

    pub fn args(&self, ctx: &TypeContext, id: TypeId) -> &[ArgInfo] {
        let mut current = ctx.find(id);
        let mut seen = HashSet::new();
        while seen.insert(current) {
            let data = self.data(current);
            if !data.args.is_empty() || data.copy_of.is_none() {
                return &data.args;
            }
            if let Some(original) = data.copy_of {
                current = ctx.find(original);
            }
        }
        &[]
    }

    pub fn set_args(&mut self, ctx: &TypeContext, id: TypeId, args: Vec<ArgInfo>) {
        let id = ctx.find(id);
        self.structs[id.index()].args = args;
    }

    pub fn ret_count(&self, ctx: &TypeContext, id: TypeId) -> usize {
        self.data(ctx.find(id)).ret_count
    }

    pub fn set_ret_count(&mut self, ctx: &TypeContext, id: TypeId, count: usize) {
        let id = ctx.find(id);
        self.structs[id.index()].ret_count = count;
    }

    pub fn doc(&self, ctx: &TypeContext, id: TypeId) -> Option<&DocMeta> {
        let mut current = ctx.find(id);
        let mut seen = HashSet::new();
        while seen.insert(current) {
            let data = self.data(current);
            if let Some(doc) = &data.doc {
                return Some(doc);
            }
            match data.copy_of {
                Some(original) => current = ctx.find(original),
                None => break,
            }
        }
        None
    }

    pub fn set_doc(&mut self, ctx: &TypeContext, id: TypeId, doc: DocMeta) {
        let id = ctx.find(id);
        self.structs[id.index()].doc = Some(Box::new(doc));
    }

    /// Field lookup through the metatable `__index` prototype chain. This is
    /// both Lua's `__index` semantics and lexical scope resolution.
    pub fn resolve(&self, ctx: &TypeContext, base: TypeDef, name: &str) -> Option<TypeDef> {
        self.resolve_owner(ctx, base, name)
            .and_then(|owner| self.get(ctx, owner, &FieldKey::Name(name.to_string())))
    }

    /// Like [`resolve`](Self::resolve) but returns the table that owns the
    /// field, so assignments land on the innermost defining scope instead of
    /// an ancestor.
    pub fn resolve_owner(&self, ctx: &TypeContext, base: TypeDef, name: &str) -> Option<TypeId> {
        let key = FieldKey::Name(name.to_string());
        let mut visited = HashSet::new();
        let mut current = base;
        loop {
            let id = match current {
                TypeDef::Table(id) => ctx.find(id),
                _ => return None,
            };
            if !visited.insert(id) {
                return None;
            }
            if self.get(ctx, id, &key).is_some() {
                return Some(id);
            }
            let meta = match self.metatable(ctx, id) {
                Some(TypeDef::Table(meta)) => meta,
                _ => return None,
            };
            current = self.get(ctx, meta, &FieldKey::Name("__index".to_string()))?;
        }
    }

    /// Collect `(name, type)` pairs along the prototype chain whose member
    /// name starts with `prefix`. Innermost definitions shadow outer ones.
    pub fn search(&self, ctx: &TypeContext, base: TypeDef, prefix: &str) -> Vec<(String, TypeDef)> {
        let mut results = Vec::new();
        let mut seen_names = HashSet::new();
        let mut visited = HashSet::new();
        let mut current = base;
        loop {
            let id = match current {
                TypeDef::Table(id) => ctx.find(id),
                _ => break,
            };
            if !visited.insert(id) {
                break;
            }
            for (key, value) in self.effective_fields(ctx, id) {
                if let FieldKey::Name(name) = key {
                    if name.starts_with(prefix) && seen_names.insert(name.clone()) {
                        results.push((name, value));
                    }
                }
            }
            let meta = match self.metatable(ctx, id) {
                Some(TypeDef::Table(meta)) => meta,
                _ => break,
            };
            match self.get(ctx, meta, &FieldKey::Name("__index".to_string())) {
                Some(next) => current = next,
                None => break,
            }
        }
        results
    }

    /// Mark every structured value reachable from `root` read-only. Cyclic
    /// metatable graphs are fine: traversal is visiting-set guarded.
    pub fn freeze(&mut self, ctx: &TypeContext, root: TypeDef) {
        let mut stack: Vec<TypeId> = root.struct_id().into_iter().collect();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            let id = ctx.find(id);
            if !visited.insert(id) {
                continue;
            }
            self.structs[id.index()].frozen = true;
            for (_, value) in self.effective_fields(ctx, id) {
                if let Some(child) = value.struct_id() {
                    stack.push(child);
                }
            }
        }
    }

    /// Invalidate every outstanding overlay in O(1).
    pub fn invalidate_overlays(&mut self) {
        self.generation += 1;
    }

    /// Memoized copy-on-write clone: the copy shares the original's mapping
    /// until its first write.
    pub fn clone_lazy(&mut self, ctx: &mut TypeContext, id: TypeId) -> TypeId {
        let id = ctx.find(id);
        if let Some(&copy) = ctx.copies.get(&id) {
            return copy;
        }
        let source = self.data(id);
        let kind = source.kind;
        let args = source.args.clone();
        let ret_count = source.ret_count;
        let doc = source.doc.clone();
        let copy = self.alloc(kind);
        {
            let data = &mut self.structs[copy.index()];
            data.copy_of = Some(id);
            data.args = args;
            data.ret_count = ret_count;
            data.doc = doc;
        }
        ctx.copies.insert(id, copy);
        copy
    }

    /// The live overlay entries of one table.
    pub fn diff_shallow(&self, ctx: &TypeContext, id: TypeId) -> GlobalDiff {
        let id = ctx.find(id);
        let mut entries = Vec::new();
        if let Some(overlay) = &self.data(id).overlay {
            if overlay.generation == self.generation {
                for (key, value) in &overlay.fields {
                    entries.push((id, key.clone(), ctx.canonical(*value)));
                }
            }
        }
        GlobalDiff { entries }
    }

    /// Every live overlay write reachable from `root`. The result stays
    /// valid after the generation is invalidated: entry values point at
    /// ordinary arena structs, only the overlay records themselves expire.
    pub fn diff_deep(&self, ctx: &TypeContext, root: TypeDef) -> GlobalDiff {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<TypeId> = root.struct_id().into_iter().collect();
        while let Some(id) = stack.pop() {
            let id = ctx.find(id);
            if !visited.insert(id) {
                continue;
            }
            let data = self.data(id);
            if let Some(overlay) = &data.overlay {
                if overlay.generation == self.generation {
                    for (key, value) in &overlay.fields {
                        entries.push((id, key.clone(), ctx.canonical(*value)));
                    }
                }
            }
            for (_, value) in self.effective_fields(ctx, id) {
                if let Some(child) = value.struct_id() {
                    stack.push(child);
                }
            }
        }
        GlobalDiff { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FieldKey {
        FieldKey::Name(s.to_string())
    }

    #[test]
    fn test_get_set_roundtrip() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let table = arena.table();
        let id = table.struct_id().unwrap();

        assert_eq!(arena.get(&ctx, id, &name("x")), None);
        arena.set(&mut ctx, id, name("x"), TypeDef::Number);
        assert_eq!(arena.get(&ctx, id, &name("x")), Some(TypeDef::Number));
    }

    #[test]
    fn test_reserved_keys_do_not_collide_with_names() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let func = arena.function();
        let id = func.struct_id().unwrap();

        arena.set(&mut ctx, id, FieldKey::Argument(0), TypeDef::String);
        arena.set(&mut ctx, id, FieldKey::Return(0), TypeDef::Number);
        arena.set(&mut ctx, id, name("call"), TypeDef::Boolean);

        assert_eq!(
            arena.get(&ctx, id, &FieldKey::Argument(0)),
            Some(TypeDef::String)
        );
        assert_eq!(
            arena.get(&ctx, id, &FieldKey::Return(0)),
            Some(TypeDef::Number)
        );
        assert_eq!(arena.get(&ctx, id, &name("call")), Some(TypeDef::Boolean));
    }

    #[test]
    fn test_resolve_through_metatable_chain() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let child = arena.table();
        let proto = arena.table();
        let meta = arena.table();

        arena.set(
            &mut ctx,
            proto.struct_id().unwrap(),
            name("inherited"),
            TypeDef::String,
        );
        arena.set(&mut ctx, meta.struct_id().unwrap(), name("__index"), proto);
        arena.set_metatable(&mut ctx, child.struct_id().unwrap(), meta);

        assert_eq!(
            arena.resolve(&ctx, child, "inherited"),
            Some(TypeDef::String)
        );
        assert_eq!(arena.resolve(&ctx, child, "missing"), None);
        assert_eq!(
            arena.resolve_owner(&ctx, child, "inherited"),
            proto.struct_id()
        );
    }

    #[test]
    fn test_resolve_is_total_on_cyclic_metatables() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let table = arena.table();
        let meta = arena.table();

        // table's metatable __index points back at table itself
        arena.set(&mut ctx, meta.struct_id().unwrap(), name("__index"), table);
        arena.set_metatable(&mut ctx, table.struct_id().unwrap(), meta);

        assert_eq!(arena.resolve(&ctx, table, "anything"), None);
        assert!(arena.search(&ctx, table, "").is_empty());
    }

    #[test]
    fn test_search_shadows_outer_definitions() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let child = arena.table();
        let parent = arena.table();
        let meta = arena.table();

        arena.set(
            &mut ctx,
            parent.struct_id().unwrap(),
            name("shadowed"),
            TypeDef::Number,
        );
        arena.set(
            &mut ctx,
            parent.struct_id().unwrap(),
            name("outer"),
            TypeDef::Boolean,
        );
        arena.set(
            &mut ctx,
            child.struct_id().unwrap(),
            name("shadowed"),
            TypeDef::String,
        );
        arena.set(&mut ctx, meta.struct_id().unwrap(), name("__index"), parent);
        arena.set_metatable(&mut ctx, child.struct_id().unwrap(), meta);

        let mut results = arena.search(&ctx, child, "");
        results.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            results,
            vec![
                ("outer".to_string(), TypeDef::Boolean),
                ("shadowed".to_string(), TypeDef::String),
            ]
        );
    }

    #[test]
    fn test_overlay_write_reverts_on_invalidation() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let table = arena.table();
        let id = table.struct_id().unwrap();
        arena.set(&mut ctx, id, name("pre"), TypeDef::Number);
        arena.freeze(&ctx, table);

        arena.set(&mut ctx, id, name("pre"), TypeDef::String);
        arena.set(&mut ctx, id, name("post"), TypeDef::Boolean);
        assert_eq!(arena.get(&ctx, id, &name("pre")), Some(TypeDef::String));
        assert_eq!(arena.get(&ctx, id, &name("post")), Some(TypeDef::Boolean));

        arena.invalidate_overlays();
        // The frozen backing data was never touched.
        assert_eq!(arena.get(&ctx, id, &name("pre")), Some(TypeDef::Number));
        assert_eq!(arena.get(&ctx, id, &name("post")), None);
    }

    #[test]
    fn test_lazy_clone_materializes_on_first_write() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let original = arena.table();
        let original_id = original.struct_id().unwrap();
        arena.set(&mut ctx, original_id, name("a"), TypeDef::Number);

        let copy_id = arena.clone_lazy(&mut ctx, original_id);
        // Memoized: same copy for the same original.
        assert_eq!(arena.clone_lazy(&mut ctx, original_id), copy_id);
        // Reads fall through to the original until the first write.
        assert_eq!(arena.get(&ctx, copy_id, &name("a")), Some(TypeDef::Number));

        arena.set(&mut ctx, copy_id, name("b"), TypeDef::String);
        assert_eq!(arena.get(&ctx, copy_id, &name("a")), Some(TypeDef::Number));
        assert_eq!(arena.get(&ctx, copy_id, &name("b")), Some(TypeDef::String));
        // The original never sees the copy's writes.
        assert_eq!(arena.get(&ctx, original_id, &name("b")), None);
    }

    #[test]
    fn test_deep_diff_captures_nested_overlay_writes() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let global = arena.table();
        let string_lib = arena.table();
        arena.set(
            &mut ctx,
            global.struct_id().unwrap(),
            name("string"),
            string_lib,
        );
        arena.freeze(&ctx, global);

        arena.set(
            &mut ctx,
            global.struct_id().unwrap(),
            name("answer"),
            TypeDef::Number,
        );
        arena.set(
            &mut ctx,
            string_lib.struct_id().unwrap(),
            name("trim"),
            TypeDef::Unknown,
        );

        let diff = arena.diff_deep(&ctx, global);
        assert_eq!(diff.len(), 2);

        arena.invalidate_overlays();
        assert_eq!(arena.get(&ctx, global.struct_id().unwrap(), &name("answer")), None);
        // The captured entries survive invalidation.
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_shallow_diff_only_covers_one_table() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let global = arena.table();
        let nested = arena.table();
        arena.set(&mut ctx, global.struct_id().unwrap(), name("nested"), nested);
        arena.freeze(&ctx, global);

        arena.set(
            &mut ctx,
            global.struct_id().unwrap(),
            name("top"),
            TypeDef::Number,
        );
        arena.set(
            &mut ctx,
            nested.struct_id().unwrap(),
            name("deep"),
            TypeDef::String,
        );

        let diff = arena.diff_shallow(&ctx, global.struct_id().unwrap());
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries[0].1, name("top"));
    }

    #[test]
    fn test_replacement_map_redirects_stale_references() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let live = arena.table();
        let stale = arena.table();
        arena.set(
            &mut ctx,
            live.struct_id().unwrap(),
            name("x"),
            TypeDef::Number,
        );

        ctx.replace(stale.struct_id().unwrap(), live.struct_id().unwrap());
        assert_eq!(
            arena.get(&ctx, stale.struct_id().unwrap(), &name("x")),
            Some(TypeDef::Number)
        );
        assert_eq!(ctx.canonical(stale), ctx.canonical(live));
    }
}

//! Knowledge merging.
//!
//! When two observations disagree about a value's type, the one higher in
//! the priority lattice wins; ties keep the earlier observation so inference
//! stays stable under re-analysis. Two tables are not a tie to discard: they
//! get merged structurally, and the losing table id is registered as a
//! replacement so stale references keep resolving.

use std::collections::HashSet;

use crate::typedef::{FieldKey, GlobalDiff, TypeArena, TypeContext, TypeDef, TypeId};

/// Combine two pieces of type knowledge about the same value.
pub fn merge(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    old: Option<TypeDef>,
    new: Option<TypeDef>,
) -> Option<TypeDef> {
    let mut visiting = HashSet::new();
    merge_inner(arena, ctx, old, new, &mut visiting)
}

fn merge_inner(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    old: Option<TypeDef>,
    new: Option<TypeDef>,
    visiting: &mut HashSet<(TypeId, TypeId)>,
) -> Option<TypeDef> {
    let old = old.map(|t| ctx.canonical(t));
    let new = new.map(|t| ctx.canonical(t));
    match (old, new) {
        (None, new) => new,
        (old, None) => old,
        (Some(TypeDef::Table(old_id)), Some(TypeDef::Table(new_id))) => {
            Some(merge_tables(arena, ctx, old_id, new_id, visiting))
        }
        (Some(old), Some(new)) => {
            if new.priority() > old.priority() {
                Some(new)
            } else {
                Some(old)
            }
        }
    }
}

fn merge_tables(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    old_id: TypeId,
    new_id: TypeId,
    visiting: &mut HashSet<(TypeId, TypeId)>,
) -> TypeDef {
    let old_id = ctx.find(old_id);
    let new_id = ctx.find(new_id);
    if old_id == new_id || !visiting.insert((old_id, new_id)) {
        return TypeDef::Table(old_id);
    }
    for (key, incoming) in arena.effective_fields(ctx, new_id) {
        let existing = arena.get(ctx, old_id, &key);
        if let Some(merged) = merge_inner(arena, ctx, existing, Some(incoming), visiting) {
            arena.set(ctx, old_id, key, merged);
        }
    }
    ctx.replace(new_id, old_id);
    TypeDef::Table(old_id)
}

/// Re-apply a captured diff onto the current overlay generation. Each entry
/// merges with whatever is already there, so applying several module diffs
/// is order-independent.
pub fn apply_diff(arena: &mut TypeArena, ctx: &mut TypeContext, diff: &GlobalDiff) {
    for (id, key, value) in &diff.entries {
        apply_entry(arena, ctx, *id, key.clone(), *value);
    }
}

fn apply_entry(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    id: TypeId,
    key: FieldKey,
    value: TypeDef,
) {
    let existing = arena.get(ctx, id, &key);
    if let Some(merged) = merge(arena, ctx, existing, Some(ctx.canonical(value))) {
        arena.set(ctx, id, key, merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FieldKey {
        FieldKey::Name(s.to_string())
    }

    #[test]
    fn test_higher_priority_wins() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let func = arena.function();

        assert_eq!(
            merge(&mut arena, &mut ctx, Some(TypeDef::Nil), Some(TypeDef::Number)),
            Some(TypeDef::Number)
        );
        assert_eq!(
            merge(&mut arena, &mut ctx, Some(TypeDef::Unknown), Some(func)),
            Some(func)
        );
        // Higher-priority old knowledge is kept against weaker new knowledge.
        assert_eq!(
            merge(&mut arena, &mut ctx, Some(func), Some(TypeDef::Nil)),
            Some(func)
        );
    }

    #[test]
    fn test_equal_priority_keeps_old() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        assert_eq!(
            merge(
                &mut arena,
                &mut ctx,
                Some(TypeDef::Boolean),
                Some(TypeDef::Number)
            ),
            Some(TypeDef::Boolean)
        );

        let first = arena.function();
        let second = arena.function();
        assert_eq!(merge(&mut arena, &mut ctx, Some(first), Some(second)), Some(first));
    }

    #[test]
    fn test_missing_sides() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        assert_eq!(merge(&mut arena, &mut ctx, None, Some(TypeDef::String)), Some(TypeDef::String));
        assert_eq!(merge(&mut arena, &mut ctx, Some(TypeDef::String), None), Some(TypeDef::String));
        assert_eq!(merge(&mut arena, &mut ctx, None, None), None);
    }

    #[test]
    fn test_tables_merge_structurally() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let old = arena.table();
        let new = arena.table();
        let old_id = old.struct_id().unwrap();
        let new_id = new.struct_id().unwrap();

        arena.set(&mut ctx, old_id, name("a"), TypeDef::Number);
        arena.set(&mut ctx, old_id, name("both"), TypeDef::Unknown);
        arena.set(&mut ctx, new_id, name("b"), TypeDef::String);
        arena.set(&mut ctx, new_id, name("both"), TypeDef::Boolean);

        let merged = merge(&mut arena, &mut ctx, Some(old), Some(new));
        assert_eq!(merged, Some(old));

        assert_eq!(arena.get(&ctx, old_id, &name("a")), Some(TypeDef::Number));
        assert_eq!(arena.get(&ctx, old_id, &name("b")), Some(TypeDef::String));
        // Field values merge recursively by priority too.
        assert_eq!(arena.get(&ctx, old_id, &name("both")), Some(TypeDef::Boolean));
        // References to the merged-away table follow to the survivor.
        assert_eq!(arena.get(&ctx, new_id, &name("a")), Some(TypeDef::Number));
        assert_eq!(ctx.canonical(new), old);
    }

    #[test]
    fn test_cyclic_table_merge_terminates() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let left = arena.table();
        let right = arena.table();
        let left_id = left.struct_id().unwrap();
        let right_id = right.struct_id().unwrap();

        // Each table holds the other under the same key.
        arena.set(&mut ctx, left_id, name("next"), right);
        arena.set(&mut ctx, right_id, name("next"), left);

        let merged = merge(&mut arena, &mut ctx, Some(left), Some(right));
        assert_eq!(merged, Some(left));
    }

    fn primitive_strategy() -> impl proptest::strategy::Strategy<Value = TypeDef> {
        proptest::prop_oneof![
            proptest::strategy::Just(TypeDef::Nil),
            proptest::strategy::Just(TypeDef::Unknown),
            proptest::strategy::Just(TypeDef::Boolean),
            proptest::strategy::Just(TypeDef::Number),
            proptest::strategy::Just(TypeDef::String),
        ]
    }

    proptest::proptest! {
        #[test]
        fn test_merge_never_loses_knowledge(
            old in primitive_strategy(),
            new in primitive_strategy(),
        ) {
            let mut arena = TypeArena::new();
            let mut ctx = TypeContext::new();
            let merged = merge(&mut arena, &mut ctx, Some(old), Some(new)).unwrap();
            proptest::prop_assert!(merged == old || merged == new);
            proptest::prop_assert!(merged.priority() >= old.priority());
            proptest::prop_assert!(merged.priority() >= new.priority());
            // Re-merging the same knowledge is a no-op.
            let again = merge(&mut arena, &mut ctx, Some(merged), Some(new)).unwrap();
            proptest::prop_assert_eq!(again, merged);
        }
    }

    #[test]
    fn test_apply_diff_is_order_independent() {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let global = arena.table();
        let global_id = global.struct_id().unwrap();
        arena.freeze(&ctx, global);

        let module_a = arena.table();
        arena.set(&mut ctx, module_a.struct_id().unwrap(), name("from_a"), TypeDef::Number);
        let module_b = arena.table();
        arena.set(&mut ctx, module_b.struct_id().unwrap(), name("from_b"), TypeDef::String);

        let diff_a = GlobalDiff {
            entries: vec![(global_id, name("shared"), module_a)],
        };
        let diff_b = GlobalDiff {
            entries: vec![(global_id, name("shared"), module_b)],
        };

        apply_diff(&mut arena, &mut ctx, &diff_a);
        apply_diff(&mut arena, &mut ctx, &diff_b);

        let shared = arena.get(&ctx, global_id, &name("shared")).unwrap();
        let shared_id = shared.struct_id().unwrap();
        assert_eq!(arena.get(&ctx, shared_id, &name("from_a")), Some(TypeDef::Number));
        assert_eq!(arena.get(&ctx, shared_id, &name("from_b")), Some(TypeDef::String));
    }
}

//! Configuration and the persisted type documents.
//!
//! The standard library ships as one JSON document per Lua version, each a
//! TypeDef graph with named cross-references (`{"type": "ref", "name": ..}`).
//! Project configuration (`.luacompleterc`) uses the same document shape and
//! is merged over the standard library. Revival is two-phase so named types
//! can reference each other cyclically.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::extraction::DiscoveryStrategy;
use crate::lattice::merge;
use crate::typedef::{
    ArgInfo, DocMeta, DocVariant, FieldKey, TypeArena, TypeContext, TypeDef,
};

pub const PROJECT_CONFIG_NAME: &str = ".luacompleterc";

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid type document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LuaVersion {
    #[serde(rename = "5.1")]
    Lua51,
    #[serde(rename = "5.2")]
    Lua52,
    #[serde(rename = "5.3")]
    Lua53,
    #[default]
    #[serde(rename = "5.4")]
    Lua54,
}

impl LuaVersion {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "5.1" => Some(Self::Lua51),
            "5.2" => Some(Self::Lua52),
            "5.3" => Some(Self::Lua53),
            "5.4" => Some(Self::Lua54),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lua51 => "5.1",
            Self::Lua52 => "5.2",
            Self::Lua53 => "5.3",
            Self::Lua54 => "5.4",
        }
    }

    fn stdlib_document(self) -> &'static str {
        match self {
            Self::Lua51 => include_str!("stdlib/lua_5_1.json"),
            Self::Lua52 => include_str!("stdlib/lua_5_2.json"),
            Self::Lua53 => include_str!("stdlib/lua_5_3.json"),
            Self::Lua54 => include_str!("stdlib/lua_5_4.json"),
        }
    }
}

impl std::fmt::Display for LuaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search-path entry or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PackagePath {
    One(String),
    Many(Vec<String>),
}

impl PackagePath {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PackagePath::One(path) => vec![path],
            PackagePath::Many(paths) => paths,
        }
    }
}

/// The on-disk document shape shared by stdlib documents and project
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawConfig {
    pub global: Option<RawTypeDef>,
    pub named_types: IndexMap<String, RawTypeDef>,
    #[serde(deserialize_with = "lenient_lua_version")]
    pub lua_version: Option<LuaVersion>,
    pub package_path: Option<PackagePath>,
    pub member_discovery: Option<DiscoveryStrategy>,
    pub use_snippets: Option<bool>,
}

/// Configs in the wild also carry versions like "luajit-2.0"; unrecognized
/// values fall back to the default instead of rejecting the document.
fn lenient_lua_version<'de, D>(deserializer: D) -> Result<Option<LuaVersion>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = Option::<String>::deserialize(deserializer)?;
    Ok(text.as_deref().and_then(LuaVersion::parse))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTypeDef {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Target of a `{"type": "ref", "name": ..}` cross-reference.
    pub name: Option<String>,
    pub fields: IndexMap<String, RawTypeDef>,
    pub metatable: Option<Box<RawTypeDef>>,
    pub args: Vec<RawArg>,
    pub return_types: Vec<RawTypeDef>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub args_display: Option<String>,
    pub args_display_omit_self: Option<String>,
    pub variants: Vec<RawVariant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArg {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawVariant {
    pub args: Option<Vec<RawArg>>,
    pub args_display: Option<String>,
    pub args_display_omit_self: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

/// A document revived into live arena values.
#[derive(Debug, Default)]
pub struct Revived {
    pub global: Option<TypeDef>,
    pub named_types: IndexMap<String, TypeDef>,
}

/// Revive a raw document. Named types are allocated as empty shells first so
/// `ref` entries (including cyclic ones) always have a target, then filled.
pub fn revive(arena: &mut TypeArena, ctx: &mut TypeContext, config: &RawConfig) -> Revived {
    let mut named_types = IndexMap::new();
    for (name, raw) in &config.named_types {
        let shell = match raw.kind.as_deref() {
            Some("function") => arena.function(),
            Some("table") | None => arena.table(),
            Some(_) => primitive(raw.kind.as_deref()),
        };
        named_types.insert(name.clone(), shell);
    }
    for (name, raw) in &config.named_types {
        if let Some(&shell) = named_types.get(name) {
            if let Some(id) = shell.struct_id() {
                fill(arena, ctx, &named_types, id, raw);
            }
        }
    }
    let global = config
        .global
        .as_ref()
        .map(|raw| revive_def(arena, ctx, &named_types, raw));
    Revived {
        global,
        named_types,
    }
}

fn primitive(kind: Option<&str>) -> TypeDef {
    match kind {
        Some("number") => TypeDef::Number,
        Some("string") => TypeDef::String,
        Some("boolean") => TypeDef::Boolean,
        Some("nil") => TypeDef::Nil,
        _ => TypeDef::Unknown,
    }
}

fn revive_def(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    named: &IndexMap<String, TypeDef>,
    raw: &RawTypeDef,
) -> TypeDef {
    match raw.kind.as_deref() {
        Some("ref") => {
            let target = raw.name.as_deref().and_then(|n| named.get(n)).copied();
            if target.is_none() {
                debug!(name = ?raw.name, "unresolved named type reference");
            }
            target.unwrap_or(TypeDef::Unknown)
        }
        Some("table") => {
            let table = arena.table();
            if let Some(id) = table.struct_id() {
                fill(arena, ctx, named, id, raw);
            }
            table
        }
        Some("function") => {
            let function = arena.function();
            if let Some(id) = function.struct_id() {
                fill(arena, ctx, named, id, raw);
            }
            function
        }
        other => primitive(other),
    }
}

fn fill(
    arena: &mut TypeArena,
    ctx: &mut TypeContext,
    named: &IndexMap<String, TypeDef>,
    id: crate::typedef::TypeId,
    raw: &RawTypeDef,
) {
    for (field, value) in &raw.fields {
        let value = revive_def(arena, ctx, named, value);
        arena.set(ctx, id, FieldKey::Name(field.clone()), value);
    }
    if let Some(metatable) = &raw.metatable {
        let metatable = revive_def(arena, ctx, named, metatable);
        arena.set_metatable(ctx, id, metatable);
    }
    if !raw.args.is_empty() {
        let args: Vec<ArgInfo> = raw.args.iter().map(arg_info).collect();
        for index in 0..args.len() {
            arena.set(ctx, id, FieldKey::Argument(index), TypeDef::Unknown);
        }
        arena.set_args(ctx, id, args);
    }
    for (slot, ret) in raw.return_types.iter().enumerate() {
        let ret = revive_def(arena, ctx, named, ret);
        arena.set(ctx, id, FieldKey::Return(slot), ret);
    }
    arena.set_ret_count(ctx, id, raw.return_types.len());
    if raw.description.is_some()
        || raw.link.is_some()
        || raw.args_display.is_some()
        || raw.args_display_omit_self.is_some()
        || !raw.variants.is_empty()
    {
        arena.set_doc(
            ctx,
            id,
            DocMeta {
                description: raw.description.clone(),
                link: raw.link.clone(),
                args_display: raw.args_display.clone(),
                args_display_omit_self: raw.args_display_omit_self.clone(),
                variants: raw.variants.iter().map(variant).collect(),
            },
        );
    }
}

fn arg_info(raw: &RawArg) -> ArgInfo {
    ArgInfo {
        name: raw.name.clone(),
        display_name: raw.display_name.clone(),
    }
}

fn variant(raw: &RawVariant) -> DocVariant {
    DocVariant {
        args: raw
            .args
            .as_ref()
            .map(|args| args.iter().map(arg_info).collect()),
        args_display: raw.args_display.clone(),
        args_display_omit_self: raw.args_display_omit_self.clone(),
        description: raw.description.clone(),
        link: raw.link.clone(),
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    pub lua_version: LuaVersion,
    pub strategy: DiscoveryStrategy,
    pub package_paths: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub use_snippets: bool,
    pub project: RawConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self::from_config(RawConfig::default(), None)
    }
}

impl Options {
    pub fn from_config(project: RawConfig, cwd: Option<PathBuf>) -> Self {
        let lua_version = project.lua_version.unwrap_or_default();
        let strategy = project.member_discovery.unwrap_or_default();
        let package_paths = project
            .package_path
            .clone()
            .map(PackagePath::into_vec)
            .unwrap_or_else(|| vec!["./?.lua".to_string()]);
        let use_snippets = project.use_snippets.unwrap_or(true);
        Self {
            lua_version,
            strategy,
            package_paths,
            cwd,
            use_snippets,
            project,
        }
    }

    /// The base graph for this configuration: the version's standard
    /// library, with the project document merged over it. The `_G`
    /// self-reference is ensured before the caller freezes the result.
    pub fn build_base(
        &self,
        arena: &mut TypeArena,
        ctx: &mut TypeContext,
    ) -> Result<(TypeDef, Vec<(String, TypeDef)>), OptionsError> {
        let stdlib: RawConfig = serde_json::from_str(self.lua_version.stdlib_document())?;
        let revived = revive(arena, ctx, &stdlib);
        let mut global = revived.global.unwrap_or_else(|| arena.table());
        let mut named: IndexMap<String, TypeDef> = revived.named_types;

        let project = revive(arena, ctx, &self.project);
        for (name, typedef) in project.named_types {
            named.insert(name, typedef);
        }
        if let Some(project_global) = project.global {
            if let Some(merged) = merge(arena, ctx, Some(global), Some(project_global)) {
                global = merged;
            }
        }

        if let Some(global_id) = global.struct_id() {
            if arena
                .get(ctx, global_id, &FieldKey::Name("_G".to_string()))
                .is_none()
            {
                arena.set(ctx, global_id, FieldKey::Name("_G".to_string()), global);
            }
        }
        Ok((global, named.into_iter().collect()))
    }
}

/// Find and parse the nearest `.luacompleterc`, walking up from `start`.
pub fn load_project_config(start: &Path) -> Result<Option<(RawConfig, PathBuf)>, OptionsError> {
    let mut dir = if start.is_dir() {
        Some(start.to_path_buf())
    } else {
        start.parent().map(Path::to_path_buf)
    };
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_CONFIG_NAME);
        if candidate.is_file() {
            let text = fs::read_to_string(&candidate).map_err(|source| OptionsError::Read {
                path: candidate.clone(),
                source,
            })?;
            let config: RawConfig = serde_json::from_str(&text)?;
            return Ok(Some((config, current)));
        }
        dir = current.parent().map(Path::to_path_buf);
    }
    Ok(None)
}

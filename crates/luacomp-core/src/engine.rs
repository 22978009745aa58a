//! The completion engine.
//!
//! Owns the shared arena with the frozen base graph, the parser, and the
//! module cache, and runs one analysis session per request. A completion
//! request is turned into a parseable buffer by replacing the typed prefix
//! with a placeholder member access, re-analyzing, and searching from the
//! placeholder's base.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{Accessor, Analysis, ModuleResult};
use crate::extraction::{DiscoveryStrategy, Extractor};
use crate::format::{self, Suggestion};
use crate::module_cache::ModuleCache;
use crate::options::{Options, OptionsError};
use crate::parser::{LuaParser, ParseError};
use crate::syntax::PLACEHOLDER;
use crate::typedef::{TypeArena, TypeContext, TypeDef};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Options(#[from] OptionsError),
}

pub struct Engine {
    arena: TypeArena,
    parser: LuaParser,
    global: TypeDef,
    named_types: Vec<(String, TypeDef)>,
    strategy: DiscoveryStrategy,
    use_snippets: bool,
    module_cache: ModuleCache,
    /// Modules currently being analyzed, to break require cycles.
    in_flight: HashSet<String>,
}

impl Engine {
    /// Build and freeze the base graph for this configuration.
    pub fn new(options: Options) -> Result<Self, EngineError> {
        let mut arena = TypeArena::new();
        let mut ctx = TypeContext::new();
        let (global, named_types) = options.build_base(&mut arena, &mut ctx)?;
        arena.freeze(&ctx, global);
        for (_, typedef) in &named_types {
            arena.freeze(&ctx, *typedef);
        }
        info!(version = %options.lua_version, "completion engine ready");
        Ok(Self {
            arena,
            parser: LuaParser::new()?,
            global,
            named_types,
            strategy: options.strategy,
            use_snippets: options.use_snippets,
            module_cache: ModuleCache::new(options.package_paths, options.cwd),
            in_flight: HashSet::new(),
        })
    }

    /// Answer a completion request at a byte offset into `source`.
    ///
    /// With `activated_manually` unset, an empty prefix with no accessor
    /// returns nothing rather than dumping the whole scope on every
    /// keystroke.
    pub fn complete(
        &mut self,
        source: &str,
        offset: usize,
        activated_manually: bool,
    ) -> Result<Vec<Suggestion>, EngineError> {
        let request = QueryRequest::at(source, offset);
        if !activated_manually && request.prefix.is_empty() && request.accessor.is_none() {
            return Ok(Vec::new());
        }
        let spliced = request.splice(source);
        let mut analysis = self.analyze(&spliced)?;
        let found = analysis.solve_query(&mut self.arena, &request.prefix, request.accessor);
        debug!(prefix = %request.prefix, results = found.len(), "query solved");
        let mut out = Vec::new();
        for item in &found {
            out.extend(format::suggestions(&self.arena, analysis.ctx(), item));
        }
        if !self.use_snippets {
            for suggestion in &mut out {
                suggestion.snippet = None;
            }
        }
        Ok(out)
    }

    /// Analyze a standalone buffer and return its module result.
    pub fn analyze_source(&mut self, source: &str) -> Result<ModuleResult, EngineError> {
        let mut analysis = self.analyze(source)?;
        Ok(analysis.module_result(&mut self.arena))
    }

    fn analyze(&mut self, source: &str) -> Result<Analysis, EngineError> {
        let mut analysis = Analysis::new(&mut self.arena, self.global);
        analysis.parse(&mut self.arena, &mut self.parser, source)?;
        let required = analysis.required_modules();
        if !required.is_empty() {
            let main_diff = analysis.begin_requires(&self.arena);
            let mut resolved = HashMap::new();
            for name in required {
                if let Some(result) = self.require_module(&name) {
                    resolved.insert(name, result);
                }
            }
            analysis.finish_requires(&mut self.arena, &main_diff, &resolved);
        }
        let mut extractor =
            Extractor::new(self.strategy, self.named_types.clone(), self.global);
        analysis.evaluate(&mut self.arena, &mut extractor);
        Ok(analysis)
    }

    /// Resolve one `require` target through the cache, analyzing it
    /// recursively on a miss. Failures contribute no knowledge.
    fn require_module(&mut self, name: &str) -> Option<ModuleResult> {
        if self.in_flight.contains(name) {
            debug!(module = name, "require cycle, skipping");
            return None;
        }
        let found = self.module_cache.lookup(name)?;
        if let Some(cached) = self.module_cache.cached(name, found.modified) {
            return Some(cached);
        }
        self.in_flight.insert(name.to_string());
        let result = self
            .analyze(&found.source)
            .ok()
            .map(|mut analysis| analysis.module_result(&mut self.arena));
        self.in_flight.remove(name);
        let result = result?;
        self.module_cache.store(name, found.modified, result.clone());
        Some(result)
    }
}

/// The typed prefix at the cursor and the accessor that introduced it.
#[derive(Debug, Clone, PartialEq)]
struct QueryRequest {
    prefix: String,
    accessor: Option<Accessor>,
    replace_start: usize,
    offset: usize,
}

impl QueryRequest {
    fn at(source: &str, offset: usize) -> Self {
        let mut offset = offset.min(source.len());
        while offset > 0 && !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let bytes = source.as_bytes();
        let mut start = offset;
        while start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_')
        {
            start -= 1;
        }
        // identifiers cannot start with a digit; leading digits belong to a
        // number literal
        while start < offset && bytes[start].is_ascii_digit() {
            start += 1;
        }
        let accessor = if start > 0 {
            match bytes[start - 1] {
                // `..` is concatenation, not member access
                b'.' if !(start > 1 && bytes[start - 2] == b'.') => Some(Accessor::Dot),
                b':' => Some(Accessor::Colon),
                _ => None,
            }
        } else {
            None
        };
        Self {
            prefix: source[start..offset].to_string(),
            accessor,
            replace_start: start,
            offset,
        }
    }

    /// Replace the prefix with a placeholder member access so the buffer
    /// parses. `a.fo|` becomes `a.__prefix_placeholder__()`; a bare prefix
    /// becomes `__prefix_placeholder__.__prefix_placeholder__()`, whose base
    /// identifier carries the lexical scope to search.
    fn splice(&self, source: &str) -> String {
        let mut out =
            String::with_capacity(source.len() + 2 * PLACEHOLDER.len() + 4);
        out.push_str(&source[..self.replace_start]);
        if self.accessor.is_none() {
            out.push_str(PLACEHOLDER);
            out.push('.');
        }
        out.push_str(PLACEHOLDER);
        out.push_str("()");
        out.push_str(&source[self.offset..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_dot_accessor() {
        let request = QueryRequest::at("local x = a.fo", 14);
        assert_eq!(request.prefix, "fo");
        assert_eq!(request.accessor, Some(Accessor::Dot));
        assert_eq!(request.replace_start, 12);
    }

    #[test]
    fn test_query_request_colon_accessor() {
        let request = QueryRequest::at("obj:met", 7);
        assert_eq!(request.prefix, "met");
        assert_eq!(request.accessor, Some(Accessor::Colon));
    }

    #[test]
    fn test_query_request_bare_prefix() {
        let request = QueryRequest::at("pri", 3);
        assert_eq!(request.prefix, "pri");
        assert_eq!(request.accessor, None);
    }

    #[test]
    fn test_concatenation_is_not_an_accessor() {
        let request = QueryRequest::at("a..b", 4);
        assert_eq!(request.prefix, "b");
        assert_eq!(request.accessor, None);
    }

    #[test]
    fn test_splice_with_accessor() {
        let request = QueryRequest::at("a.fo", 4);
        assert_eq!(request.splice("a.fo"), format!("a.{PLACEHOLDER}()"));
    }

    #[test]
    fn test_splice_bare_prefix_keeps_tail() {
        let request = QueryRequest::at("fo\nreturn 1", 2);
        assert_eq!(
            request.splice("fo\nreturn 1"),
            format!("{PLACEHOLDER}.{PLACEHOLDER}()\nreturn 1")
        );
    }

    proptest::proptest! {
        #[test]
        fn test_request_is_total_over_arbitrary_buffers(
            source in ".*",
            offset in 0usize..512,
        ) {
            let request = QueryRequest::at(&source, offset);
            proptest::prop_assert!(request.replace_start <= request.offset);
            proptest::prop_assert!(request.offset <= source.len());
            proptest::prop_assert!(request
                .prefix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_'));
            let spliced = request.splice(&source);
            proptest::prop_assert!(spliced.contains(PLACEHOLDER));
        }
    }
}

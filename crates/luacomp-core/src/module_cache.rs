//! On-disk module lookup and the per-module result cache.
//!
//! `require` targets are located through an ordered list of search-path
//! templates whose `?` is substituted with the slash-joined module name.
//! Analysis results are cached keyed by module name and invalidated when the
//! file's modification time changes. Lookup failures are swallowed: an
//! unresolvable module simply contributes no knowledge.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::analysis::ModuleResult;

#[derive(Debug)]
pub struct ModuleLookup {
    pub path: PathBuf,
    pub source: String,
    pub modified: SystemTime,
}

struct CachedModule {
    modified: SystemTime,
    result: ModuleResult,
}

pub struct ModuleCache {
    templates: Vec<String>,
    cwd: Option<PathBuf>,
    cache: HashMap<String, CachedModule>,
}

impl ModuleCache {
    pub fn new(templates: Vec<String>, cwd: Option<PathBuf>) -> Self {
        let templates = if templates.is_empty() {
            vec!["./?.lua".to_string()]
        } else {
            templates
        };
        Self {
            templates,
            cwd,
            cache: HashMap::new(),
        }
    }

    /// Locate a module's source file by trying each template in order.
    pub fn lookup(&self, name: &str) -> Option<ModuleLookup> {
        let relative = name.replace('.', "/");
        for template in &self.templates {
            let candidate = template.replace('?', &relative);
            let path = match &self.cwd {
                Some(cwd) => cwd.join(candidate),
                None => PathBuf::from(candidate),
            };
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            match fs::read_to_string(&path) {
                Ok(source) => {
                    return Some(ModuleLookup {
                        path,
                        source,
                        modified,
                    })
                }
                Err(err) => {
                    warn!(module = name, path = %path.display(), %err, "unreadable module");
                }
            }
        }
        debug!(module = name, "module not found on package path");
        None
    }

    /// A cached result, valid only while the file's mtime is unchanged.
    pub fn cached(&self, name: &str, modified: SystemTime) -> Option<ModuleResult> {
        let entry = self.cache.get(name)?;
        (entry.modified == modified).then(|| entry.result.clone())
    }

    pub fn store(&mut self, name: &str, modified: SystemTime, result: ModuleResult) {
        self.cache.insert(
            name.to_string(),
            CachedModule { modified, result },
        );
    }
}

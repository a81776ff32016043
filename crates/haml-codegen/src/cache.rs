//! Shared cache of compiled programs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{compile_with, CompileError, FilterRegistry, Options, Program};

/// Compiled-program cache keyed by source text and options fingerprint.
///
/// Two threads missing on the same key both compile; the later insert
/// wins. Compilation is deterministic, so either program is correct.
#[derive(Debug)]
pub struct ProgramCache {
    filters: Arc<FilterRegistry>,
    programs: RwLock<HashMap<(String, u64), Arc<Program>>>,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::with_filters(FilterRegistry::builtin())
    }

    pub fn with_filters(filters: Arc<FilterRegistry>) -> Self {
        Self {
            filters,
            programs: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached program, compiling and inserting it on a miss.
    /// Failed compiles are not cached.
    pub fn get_or_compile(&self, source: &str, options: &Options) -> Result<Arc<Program>, CompileError> {
        let key = (source.to_string(), options.fingerprint());

        let cached = self
            .programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(program) = cached {
            log::trace!("program cache hit");
            return Ok(program);
        }

        log::debug!("program cache miss, compiling {} bytes", source.len());
        let program = Arc::new(compile_with(source, options, &self.filters)?);
        self.programs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&program));
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.programs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.programs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

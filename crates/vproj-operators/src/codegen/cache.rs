//! Compile cache keyed by write-plan fingerprint.
//!
//! Operators recompile on every schema change; schemas tend to repeat, so
//! routines are shared across recompiles and across operator instances.
//!
//! The cache holds at most `capacity` routines. Once full, the least recently
//! used entry is evicted; operators that still run it keep their own `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vproj_core::hash::Hash256;

use super::{CompileError, ExecutableProjector, ProjectorCompiler, WritePlan};

/// Routines kept by `CachingCompiler::new`.
pub const DEFAULT_CACHE_ENTRIES: usize = 256;

struct Entry {
    routine: Arc<dyn ExecutableProjector>,
    last_used: u64,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<Hash256, Entry>,
    tick: u64,
}

pub struct CachingCompiler<C> {
    inner: C,
    capacity: usize,
    cache: Mutex<Slots>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: ProjectorCompiler> CachingCompiler<C> {
    pub fn new(inner: C) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_ENTRIES)
    }

    pub fn with_capacity(inner: C, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            cache: Mutex::new(Slots::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: ProjectorCompiler> ProjectorCompiler for CachingCompiler<C> {
    fn compile(&self, plan: &WritePlan) -> Result<Arc<dyn ExecutableProjector>, CompileError> {
        let key = plan.fingerprint()?;
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.tick += 1;
        let tick = cache.tick;
        if let Some(entry) = cache.entries.get_mut(&key) {
            entry.last_used = tick;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(&entry.routine));
        }
        // Failures are not cached; the next attempt recompiles.
        let routine = self.inner.compile(plan)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        if cache.entries.len() >= self.capacity {
            let oldest = cache
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k);
            if let Some(k) = oldest {
                cache.entries.remove(&k);
            }
        }
        cache.entries.insert(
            key,
            Entry {
                routine: Arc::clone(&routine),
                last_used: tick,
            },
        );
        Ok(routine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::InterpretedCompiler;
    use vproj_core::id::FieldId;
    use vproj_core::schema::{DataType, Field, Schema};
    use vproj_planner::TypedExpr;

    fn plan(name: &str) -> WritePlan {
        let mut plan = WritePlan::new(Schema::new(vec![Field::new("a", DataType::Int32, true)]));
        plan.push(
            TypedExpr::ColumnRead {
                field_id: FieldId::new(0),
                path: vec![],
                data_type: DataType::Int32,
            },
            Field::new(name, DataType::Int32, true),
        );
        plan
    }

    #[test]
    fn equal_plans_share_a_routine() {
        let compiler = CachingCompiler::new(InterpretedCompiler::default());
        let a = compiler.compile(&plan("x")).unwrap();
        let b = compiler.compile(&plan("x")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((compiler.hits(), compiler.misses()), (1, 1));

        compiler.compile(&plan("y")).unwrap();
        assert_eq!(compiler.len(), 2);
    }

    #[test]
    fn full_cache_evicts_least_recently_used() {
        let compiler = CachingCompiler::with_capacity(InterpretedCompiler::default(), 2);
        let x = compiler.compile(&plan("x")).unwrap();
        compiler.compile(&plan("y")).unwrap();
        compiler.compile(&plan("x")).unwrap();
        compiler.compile(&plan("z")).unwrap();
        assert_eq!(compiler.len(), 2);

        // "y" was evicted, "x" survived
        assert!(Arc::ptr_eq(&x, &compiler.compile(&plan("x")).unwrap()));
        compiler.compile(&plan("y")).unwrap();
        assert_eq!(compiler.misses(), 4);
        assert_eq!(compiler.hits(), 2);
    }
}

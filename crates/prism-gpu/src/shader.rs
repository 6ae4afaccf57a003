use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use prism_core::filters::ShaderKernel;

/// Vertex entry point shared by every filter pipeline.
pub const VERTEX_ENTRY_POINT: &str = "passthrough";

const PRELUDE: &str = include_str!("../shaders/passthrough.wgsl");

/// Fragment source for one kernel, without the prelude.
pub fn fragment_source(kernel: ShaderKernel) -> &'static str {
    match kernel {
        ShaderKernel::Fade => include_str!("../shaders/fade.wgsl"),
        ShaderKernel::Sepia => include_str!("../shaders/sepia.wgsl"),
        ShaderKernel::Vignette => include_str!("../shaders/vignette.wgsl"),
        ShaderKernel::Posterize => include_str!("../shaders/posterize.wgsl"),
    }
}

/// Complete WGSL module for `kernel`: prelude followed by its fragment stage.
pub fn module_source(kernel: ShaderKernel) -> String {
    format!("{PRELUDE}\n{}", fragment_source(kernel))
}

/// Append-only cache of compiled pipelines.
///
/// Lookups take a shared read lock. Insertion goes through a single lock,
/// so two callers racing on the same missing key compile it once.
pub struct PipelineCache<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
    insert_lock: Mutex<()>,
    compiled: AtomicUsize,
}

impl<K: Eq + Hash + Copy, V> PipelineCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            insert_lock: Mutex::new(()),
            compiled: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Return the cached value for `key`, building it on first use.
    /// A failed build is not cached.
    pub fn get_or_try_insert<E>(
        &self,
        key: K,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let _guard = self.insert_lock.lock();
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let value = Arc::new(build()?);
        self.compiled.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key, Arc::clone(&value));
        Ok(value)
    }

    /// Number of successful builds so far.
    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Copy, V> Default for PipelineCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

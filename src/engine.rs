use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, warn};

use prism_core::edit::{AppliedFilter, EditState};
use prism_core::error::PipelineError;
use prism_core::filters::{FilterCatalog, FilterParams, ShaderRenderer};
use prism_core::image_buf::ImageBuf;
use prism_core::source::SourceImage;

/// Thumbnails keyed by filter id.
pub type FilteredImages = HashMap<String, Arc<ImageBuf>>;

/// Cooperative cancellation for one batch. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Applies catalog filters to sources, on a bounded worker pool.
///
/// CPU kernels are pure and run concurrently. Shader kernels go through
/// the attached renderer, which serializes access to its queue.
pub struct FilterEngine {
    catalog: Arc<FilterCatalog>,
    renderer: Option<Arc<dyn ShaderRenderer>>,
    pool: rayon::ThreadPool,
}

impl FilterEngine {
    /// `worker_threads` of zero lets rayon pick from the core count.
    pub fn new(
        catalog: Arc<FilterCatalog>,
        renderer: Option<Arc<dyn ShaderRenderer>>,
        worker_threads: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("prism-worker-{i}"))
            .build()?;
        debug!(
            threads = pool.current_num_threads(),
            gpu = renderer.is_some(),
            "filter engine ready"
        );
        Ok(Self {
            catalog,
            renderer,
            pool,
        })
    }

    pub fn catalog(&self) -> &Arc<FilterCatalog> {
        &self.catalog
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Apply one filter to the upright source at full resolution.
    pub fn apply(
        &self,
        source: &SourceImage,
        id: &str,
        params: &FilterParams,
    ) -> Result<ImageBuf, PipelineError> {
        self.apply_image(source.upright().clone(), source.content_hash(), id, params)
    }

    /// Apply one filter to arbitrary upright pixels identified by `image_key`.
    pub fn apply_image(
        &self,
        image: ImageBuf,
        image_key: &str,
        id: &str,
        params: &FilterParams,
    ) -> Result<ImageBuf, PipelineError> {
        let filter = self.catalog.get(id)?;
        filter.apply(image, image_key, params, self.renderer.as_deref())
    }

    /// Compose `filters` in order. Each step gets a key naming its input so
    /// the renderer can tell distinct intermediates apart.
    fn render_chain(
        &self,
        image: ImageBuf,
        base_key: &str,
        filters: &[AppliedFilter],
    ) -> Result<ImageBuf, PipelineError> {
        let mut key = base_key.to_string();
        let mut current = image;
        for applied in filters {
            current = self.apply_image(current, &key, &applied.id, &applied.params)?;
            key = format!("{key}|{}:{:?}", applied.id, applied.params);
        }
        Ok(current)
    }

    /// Full-resolution upright render of `state`.
    pub fn render_state(&self, state: &EditState) -> Result<ImageBuf, PipelineError> {
        let source = state.source();
        self.pool.install(|| {
            self.render_chain(source.upright().clone(), source.content_hash(), state.filters())
        })
    }

    /// Render of `state` scaled so the long edge fits `max_edge`.
    pub fn preview_state(
        &self,
        state: &EditState,
        max_edge: u32,
    ) -> Result<ImageBuf, PipelineError> {
        let source = state.source();
        let key = format!("{}@{max_edge}", source.content_hash());
        self.pool.install(|| {
            let image = source.upright().downsample(max_edge);
            self.render_chain(image, &key, state.filters())
        })
    }

    /// Preview of a single filter over the unedited source.
    pub fn preview(
        &self,
        source: &Arc<SourceImage>,
        id: &str,
        params: &FilterParams,
        max_edge: u32,
    ) -> Result<ImageBuf, PipelineError> {
        let state = EditState::new(Arc::clone(source)).with_filter(&self.catalog, id, params)?;
        self.preview_state(&state, max_edge)
    }

    /// One thumbnail per filter id, each at its default parameters.
    ///
    /// Failed and unknown ids are logged and omitted; the batch never fails.
    pub fn apply_all<S: AsRef<str> + Sync>(
        &self,
        source: &SourceImage,
        ids: &[S],
        max_edge: u32,
    ) -> FilteredImages {
        let results = Mutex::new(FilteredImages::new());
        self.apply_all_with(source, ids, max_edge, &CancelToken::new(), |id, image| {
            results.lock().insert(id.to_string(), image);
        });
        results.into_inner()
    }

    /// Streaming form of [`FilterEngine::apply_all`]: `on_entry` runs as each
    /// thumbnail completes, in completion order. Nothing is computed or
    /// delivered once `cancel` fires. Returns the number of delivered entries.
    pub fn apply_all_with<S, F>(
        &self,
        source: &SourceImage,
        ids: &[S],
        max_edge: u32,
        cancel: &CancelToken,
        on_entry: F,
    ) -> usize
    where
        S: AsRef<str> + Sync,
        F: Fn(&str, Arc<ImageBuf>) + Sync,
    {
        let thumbnail = source.upright().downsample(max_edge);
        let key = format!("{}@{max_edge}", source.content_hash());

        self.pool.install(|| {
            ids.par_iter()
                .filter(|id| {
                    let id: &str = id.as_ref();
                    if cancel.is_cancelled() {
                        return false;
                    }
                    let Some(filter) = self.catalog.lookup(id) else {
                        warn!(filter = id, "unknown filter omitted from batch");
                        return false;
                    };
                    let result = filter.apply(
                        thumbnail.clone(),
                        &key,
                        &filter.default_params(),
                        self.renderer.as_deref(),
                    );
                    match result {
                        Ok(_) if cancel.is_cancelled() => false,
                        Ok(image) => {
                            on_entry(id, Arc::new(image));
                            true
                        }
                        Err(err) => {
                            warn!(filter = id, %err, "filter omitted from batch");
                            false
                        }
                    }
                })
                .count()
        })
    }

    /// Blocking full-resolution render for export. `None` on any failure.
    pub fn export(&self, state: &EditState) -> Option<ImageBuf> {
        match self.render_state(state) {
            Ok(image) => Some(image),
            Err(err) => {
                error!(%err, "export render failed");
                None
            }
        }
    }

    /// Like [`FilterEngine::export`] but with the source's stored
    /// orientation restored, for writers that keep the original tag.
    pub fn export_stored(&self, state: &EditState) -> Option<ImageBuf> {
        self.export(state)
            .map(|upright| state.source().restore_orientation(&upright))
    }
}

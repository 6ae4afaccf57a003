use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use prism_core::edit::{EditRecipe, EditState};
use prism_core::error::{HistoryError, PipelineError};
use prism_core::export;
use prism_core::filters::{FilterCatalog, FilterParams, ShaderRenderer};
use prism_core::history::EditStack;
use prism_core::image_buf::ImageBuf;
use prism_core::source::SourceImage;
use prism_gpu::RenderContext;

use crate::config::SessionConfig;
use crate::coordinator::ProcessingCoordinator;
use crate::engine::{FilterEngine, FilteredImages};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("failed to start filter workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

type PreviewSender = Arc<watch::Sender<Option<Arc<ImageBuf>>>>;

/// Shared between the session and the preview renderer task.
#[derive(Clone)]
struct PreviewChannel {
    engine: Arc<FilterEngine>,
    max_edge: u32,
    sender: PreviewSender,
    generation: Arc<AtomicU64>,
}

impl PreviewChannel {
    /// Render `state` off the async workers and publish it, unless a newer
    /// render was requested in the meantime.
    async fn render(&self, state: EditState) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let engine = Arc::clone(&self.engine);
        let max_edge = self.max_edge;
        let rendered =
            tokio::task::spawn_blocking(move || engine.preview_state(&state, max_edge)).await;

        match rendered {
            Ok(Ok(image)) => {
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!(generation, "dropping stale preview");
                    return;
                }
                self.sender.send_replace(Some(Arc::new(image)));
            }
            Ok(Err(err)) => warn!(%err, "preview render failed"),
            Err(err) => error!(%err, "preview task failed"),
        }
    }
}

/// Re-renders the preview once for every edit-stack publication.
async fn run_preview_renderer(
    mut updates: mpsc::UnboundedReceiver<Option<EditState>>,
    source: Arc<RwLock<Arc<SourceImage>>>,
    preview: PreviewChannel,
) {
    while let Some(state) = updates.recv().await {
        let state = state.unwrap_or_else(|| EditState::new(source.read().clone()));
        preview.render(state).await;
    }
    debug!("preview renderer stopped");
}

/// One photo being edited.
///
/// Owns the edit history, the live preview and the gallery thumbnails.
/// History is mutated only through `&mut self`, so publications stay in
/// call order.
pub struct EditingSession {
    config: SessionConfig,
    engine: Arc<FilterEngine>,
    coordinator: ProcessingCoordinator,
    history: EditStack<EditState>,
    source: Arc<RwLock<Arc<SourceImage>>>,
    preview: PreviewChannel,
    runtime: Handle,
    preview_task: JoinHandle<()>,
    gallery_task: Option<JoinHandle<()>>,
}

impl EditingSession {
    /// Acquire the GPU and start a session. Blocks while the adapter and
    /// device are requested, so call it off the interactive thread.
    pub fn start(
        config: SessionConfig,
        source: Arc<SourceImage>,
        runtime: Handle,
    ) -> Result<Self, SessionError> {
        let renderer: Arc<dyn ShaderRenderer> =
            Arc::new(RenderContext::acquire(config.gpu_preference)?);
        Self::with_renderer(config, source, Some(renderer), runtime)
    }

    /// Start a session around an existing renderer. With `None`, shader
    /// filters fail with `DeviceUnavailable`.
    pub fn with_renderer(
        config: SessionConfig,
        source: Arc<SourceImage>,
        renderer: Option<Arc<dyn ShaderRenderer>>,
        runtime: Handle,
    ) -> Result<Self, SessionError> {
        let engine = Arc::new(FilterEngine::new(
            Arc::new(FilterCatalog::builtin()),
            renderer,
            config.worker_threads,
        )?);

        let coordinator = ProcessingCoordinator::new(
            Arc::clone(&engine),
            config.gallery_filters.clone(),
            config.thumbnail_max_edge,
            runtime.clone(),
        );

        let (sender, _) = watch::channel(None);
        let preview = PreviewChannel {
            engine: Arc::clone(&engine),
            max_edge: config.preview_max_edge,
            sender: Arc::new(sender),
            generation: Arc::new(AtomicU64::new(0)),
        };

        let mut history = EditStack::with_limit(config.history_limit);
        let updates = history.subscribe();
        let shared_source = Arc::new(RwLock::new(Arc::clone(&source)));
        let preview_task = runtime.spawn(run_preview_renderer(
            updates,
            Arc::clone(&shared_source),
            preview.clone(),
        ));

        info!(
            width = source.width(),
            height = source.height(),
            gpu = engine.has_renderer(),
            "editing session started"
        );

        let mut session = Self {
            config,
            engine,
            coordinator,
            history,
            source: shared_source,
            preview,
            runtime,
            preview_task,
            gallery_task: None,
        };
        session.refresh_preview();
        session.gallery_task = session.coordinator.set_image(source);
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FilterCatalog {
        self.engine.catalog()
    }

    pub fn source(&self) -> Arc<SourceImage> {
        self.source.read().clone()
    }

    /// The active state: the history cursor, or the unedited source.
    pub fn current_state(&self) -> EditState {
        self.history
            .current()
            .unwrap_or_else(|| EditState::new(self.source()))
    }

    pub fn history(&self) -> &EditStack<EditState> {
        &self.history
    }

    fn candidate(&self, id: &str, params: &FilterParams) -> Result<EditState, SessionError> {
        Ok(self
            .current_state()
            .with_filter(self.engine.catalog(), id, params)?)
    }

    /// Render `state` into the preview channel without touching history.
    fn render_preview(&self, state: EditState) -> JoinHandle<()> {
        let preview = self.preview.clone();
        self.runtime.spawn(async move { preview.render(state).await })
    }

    fn refresh_preview(&self) -> JoinHandle<()> {
        self.render_preview(self.current_state())
    }

    /// Show `id` at `params` over the current state without recording it.
    pub fn preview_filter(
        &self,
        id: &str,
        params: &FilterParams,
    ) -> Result<JoinHandle<()>, SessionError> {
        let candidate = self.candidate(id, params)?;
        Ok(self.render_preview(candidate))
    }

    /// Drop an uncommitted preview and show the current state again.
    pub fn discard_preview(&self) -> JoinHandle<()> {
        self.refresh_preview()
    }

    /// Record `id` at `params` as a new history state.
    pub fn commit(&mut self, id: &str, params: &FilterParams) -> Result<(), SessionError> {
        let next = self.candidate(id, params)?;
        self.history.push(next)?;
        debug!(filter = id, position = self.history.position(), "edit committed");
        Ok(())
    }

    /// Replace the current edits with a saved recipe, as one history step.
    pub fn apply_recipe(&mut self, recipe: &EditRecipe) -> Result<(), SessionError> {
        let state = EditState::from_recipe(self.source(), recipe, self.engine.catalog())?;
        self.history.push(state)?;
        Ok(())
    }

    pub fn undo(&mut self) -> EditState {
        self.history.undo();
        self.current_state()
    }

    pub fn redo(&mut self) -> EditState {
        self.history.redo();
        self.current_state()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Switch to another photo. History is cleared and the gallery restarts.
    pub async fn replace_source(&mut self, source: Arc<SourceImage>) {
        self.coordinator.cancel();
        if let Some(task) = self.gallery_task.take()
            && let Err(err) = task.await
        {
            warn!(%err, "thumbnail batch ended abnormally");
        }

        *self.source.write() = Arc::clone(&source);
        if self.history.is_empty() {
            self.refresh_preview();
        } else {
            self.history.clear();
        }
        self.gallery_task = self.coordinator.set_image(Arc::clone(&source));
        info!(width = source.width(), height = source.height(), "source replaced");
    }

    /// Full-resolution render of the current state, upright.
    /// `None` if any filter fails.
    pub async fn export(&self) -> Option<ImageBuf> {
        let state = self.current_state();
        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || engine.export(&state)).await {
            Ok(image) => image,
            Err(err) => {
                error!(%err, "export task failed");
                None
            }
        }
    }

    /// Export encoded with the configured format.
    pub async fn export_encoded(&self) -> anyhow::Result<Vec<u8>> {
        let image = self.export().await.context("export render failed")?;
        let format = self.config.export_format;
        tokio::task::spawn_blocking(move || export::encode(&image, format))
            .await
            .context("export encoder task failed")?
    }

    /// Latest preview. `None` until the first render lands.
    pub fn preview(&self) -> watch::Receiver<Option<Arc<ImageBuf>>> {
        self.preview.sender.subscribe()
    }

    pub fn gallery(&self) -> watch::Receiver<Arc<FilteredImages>> {
        self.coordinator.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.coordinator.is_processing()
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.coordinator.cancel();
        self.preview_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prism_core::orientation::Orientation;

    use super::*;
    use crate::engine::tests::{FakeRenderer, test_source};

    fn config() -> SessionConfig {
        SessionConfig {
            preview_max_edge: 8,
            thumbnail_max_edge: 4,
            history_limit: 10,
            worker_threads: 2,
            gallery_filters: vec!["Mono".into(), "Fade".into()],
            ..SessionConfig::default()
        }
    }

    fn session(source: Arc<SourceImage>) -> EditingSession {
        let renderer: Arc<dyn ShaderRenderer> = Arc::new(FakeRenderer::default());
        EditingSession::with_renderer(config(), source, Some(renderer), Handle::current()).unwrap()
    }

    /// First published preview.
    async fn next_preview(rx: &mut watch::Receiver<Option<Arc<ImageBuf>>>) -> Arc<ImageBuf> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(image) = rx.borrow_and_update().clone() {
                    return image;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_undo_redo_walk_history() {
        let mut session = session(test_source(16, 8, Orientation::Up));
        assert!(!session.can_undo());

        session.commit("Mono", &FilterParams::Intensity { amount: 1.0 }).unwrap();
        session.commit("Exposure", &FilterParams::Exposure { ev: 1.0 }).unwrap();
        assert_eq!(session.current_state().filters().len(), 2);

        let state = session.undo();
        assert_eq!(state.filters().len(), 1);
        assert!(session.can_redo());

        let state = session.undo();
        assert!(state.is_unedited());
        assert!(!session.can_undo());

        // Clamped at the start.
        assert!(session.undo().is_unedited());

        let state = session.redo();
        assert_eq!(state.filters()[0].id, "Mono");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn identical_commit_is_rejected() {
        let mut session = session(test_source(4, 4, Orientation::Up));
        let params = FilterParams::Intensity { amount: 0.5 };
        session.commit("Noir", &params).unwrap();

        let err = session.commit("Noir", &params).unwrap_err();
        assert!(matches!(err, SessionError::History(HistoryError::EmptyOperation)));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commit_clamping_to_neutral_is_a_no_op() {
        let mut session = session(test_source(4, 4, Orientation::Up));
        let err = session
            .commit("Mono", &FilterParams::Intensity { amount: -0.5 })
            .unwrap_err();
        assert!(matches!(err, SessionError::History(HistoryError::EmptyOperation)));
        assert!(session.history().is_empty());

        let err = session.commit("Mono", &FilterParams::Exposure { ev: 1.0 });
        assert!(matches!(
            err,
            Err(SessionError::Pipeline(PipelineError::ParameterMismatch { .. }))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_filter_and_wrong_params_are_rejected() {
        let mut session = session(test_source(4, 4, Orientation::Up));

        let err = session.commit("UnknownX", &FilterParams::Intensity { amount: 1.0 });
        assert!(matches!(
            err,
            Err(SessionError::Pipeline(PipelineError::UnknownFilter(_)))
        ));

        let err = session.preview_filter("Exposure", &FilterParams::Intensity { amount: 1.0 });
        assert!(matches!(
            err,
            Err(SessionError::Pipeline(PipelineError::ParameterMismatch { .. }))
        ));
        assert!(session.history().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preview_follows_commits_and_candidates() {
        let source = test_source(16, 8, Orientation::Up);
        let mut session = session(Arc::clone(&source));
        let mut rx = session.preview();

        let initial = next_preview(&mut rx).await;
        assert_eq!((initial.width, initial.height), (8, 4));
        assert_eq!(*initial, source.upright().downsample(8));

        let params = FilterParams::Intensity { amount: 1.0 };
        session.preview_filter("Fade", &params).unwrap().await.unwrap();
        let candidate = rx.borrow_and_update().clone().unwrap();
        assert_ne!(*candidate, *initial);
        assert!(session.history().is_empty());

        session.discard_preview().await.unwrap();
        let restored = rx.borrow_and_update().clone().unwrap();
        assert_eq!(*restored, *initial);

        session.commit("Fade", &params).unwrap();
        let committed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                let image = rx.borrow_and_update().clone().unwrap();
                if *image == *candidate {
                    return image;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(*committed, *candidate);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gallery_fills_with_configured_filters() {
        let session = session(test_source(16, 8, Orientation::Up));
        let mut rx = session.gallery();

        let images = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let images = rx.borrow_and_update().clone();
                if images.len() == 2 {
                    return images;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(images.contains_key("Mono"));
        assert!(images.contains_key("Fade"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replace_source_clears_history() {
        let mut session = session(test_source(16, 8, Orientation::Up));
        session.commit("Mono", &FilterParams::Intensity { amount: 1.0 }).unwrap();

        let next = test_source(6, 6, Orientation::Right);
        session.replace_source(Arc::clone(&next)).await;

        assert!(session.history().is_empty());
        assert!(session.current_state().is_unedited());
        assert_eq!(session.source().content_hash(), next.content_hash());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn export_renders_full_resolution() {
        let mut session = session(test_source(16, 8, Orientation::Up));
        session.commit("Sepia", &FilterParams::Intensity { amount: 0.7 }).unwrap();

        let image = session.export().await.unwrap();
        assert_eq!((image.width, image.height), (16, 8));

        let bytes = session.export_encoded().await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn export_without_gpu_fails_for_shader_filters() {
        let mut session = EditingSession::with_renderer(
            config(),
            test_source(4, 4, Orientation::Up),
            None,
            Handle::current(),
        )
        .unwrap();
        session.commit("Vignette", &FilterParams::Intensity { amount: 1.0 }).unwrap();

        assert!(session.export().await.is_none());
        assert!(session.export_encoded().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn recipe_restores_edits() {
        let source = test_source(8, 8, Orientation::Up);
        let mut session = session(Arc::clone(&source));
        session.commit("Chrome", &FilterParams::Intensity { amount: 0.4 }).unwrap();
        session
            .commit("WhiteBalance", &FilterParams::WhiteBalance { temperature: 4000.0, tint: 10.0 })
            .unwrap();
        let json = session.current_state().recipe().to_json().unwrap();

        let mut restored = self::session(source);
        restored.apply_recipe(&EditRecipe::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.current_state().digest(), session.current_state().digest());
        assert_eq!(restored.history().len(), 1);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use prism_core::image_buf::ImageBuf;
use prism_core::source::SourceImage;

use crate::engine::{CancelToken, FilterEngine, FilteredImages};

/// Releases the processing flag when the batch ends, panics included.
struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Produces gallery thumbnails for the current source, one batch at a time.
///
/// A `set_image` that arrives while a batch is running is dropped, not
/// queued. Results stream into a watch channel as each filter finishes.
pub struct ProcessingCoordinator {
    engine: Arc<FilterEngine>,
    filter_ids: Arc<[String]>,
    max_edge: u32,
    processing: Arc<AtomicBool>,
    cancel: Mutex<CancelToken>,
    images: Arc<watch::Sender<Arc<FilteredImages>>>,
    runtime: Handle,
}

impl ProcessingCoordinator {
    pub fn new(
        engine: Arc<FilterEngine>,
        filter_ids: Vec<String>,
        max_edge: u32,
        runtime: Handle,
    ) -> Self {
        let (images, _) = watch::channel(Arc::new(FilteredImages::new()));
        Self {
            engine,
            filter_ids: filter_ids.into(),
            max_edge,
            processing: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancelToken::new()),
            images: Arc::new(images),
            runtime,
        }
    }

    /// Start a thumbnail batch for `source`. Returns `None` without doing
    /// anything when a batch is already in flight.
    pub fn set_image(&self, source: Arc<SourceImage>) -> Option<JoinHandle<()>> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("thumbnail batch in flight, ignoring new image");
            return None;
        }
        let guard = ProcessingGuard(Arc::clone(&self.processing));

        let cancel = CancelToken::new();
        *self.cancel.lock() = cancel.clone();

        let engine = Arc::clone(&self.engine);
        let ids = Arc::clone(&self.filter_ids);
        let images = Arc::clone(&self.images);
        let max_edge = self.max_edge;

        Some(self.runtime.spawn_blocking(move || {
            let _guard = guard;
            let started = Instant::now();
            images.send_replace(Arc::new(FilteredImages::new()));

            let delivered =
                engine.apply_all_with(&source, &ids[..], max_edge, &cancel, |id, image| {
                    if publish(&images, &cancel, id, image) {
                        debug!(filter = id, "thumbnail ready");
                    }
                });

            if cancel.is_cancelled() {
                info!(delivered, "thumbnail batch cancelled");
            } else {
                info!(
                    delivered,
                    requested = ids.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "thumbnail batch complete"
                );
            }
        }))
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Latest-value receiver for the thumbnail map.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FilteredImages>> {
        self.images.subscribe()
    }

    pub fn current(&self) -> Arc<FilteredImages> {
        self.images.borrow().clone()
    }

    /// Abandon the in-flight batch. Entries finishing after this are not
    /// published. The processing flag clears once the batch unwinds.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }
}

/// Insert one thumbnail unless the batch was cancelled. The check runs
/// inside the channel's write lock so a `cancel` cannot slip between the
/// check and the insert.
fn publish(
    images: &watch::Sender<Arc<FilteredImages>>,
    cancel: &CancelToken,
    id: &str,
    image: Arc<ImageBuf>,
) -> bool {
    images.send_if_modified(|map| {
        if cancel.is_cancelled() {
            return false;
        }
        Arc::make_mut(map).insert(id.to_string(), image);
        true
    })
}

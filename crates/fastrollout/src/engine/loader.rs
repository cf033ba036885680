//! Background scene loader thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::render::SceneLoader;
use crate::sync::{oneshot, OneShotReceiver, OneShotSender};

/// Minimum wall-time between consecutive loads on one thread. Throttles
/// disk and decompression pressure; not a correctness requirement.
pub(crate) const LOAD_SPACING: Duration = Duration::from_secs(1);

struct LoadRequest<S> {
    path: PathBuf,
    reply: OneShotSender<Arc<S>>,
}

/// A pinned thread that serializes and rate-limits scene asset loads.
///
/// Requests resolve through one-shot futures; a failed load is fatal.
/// Dropping the handle closes the queue and joins the thread.
pub(crate) struct BackgroundLoader<S: Send + Sync + 'static> {
    requests: Option<Sender<LoadRequest<S>>>,
    thread: Option<JoinHandle<()>>,
}

impl<S: Send + Sync + 'static> BackgroundLoader<S> {
    pub fn spawn<L>(mut loader: L, core: Option<core_affinity::CoreId>, spacing: Duration) -> Self
    where
        L: SceneLoader<Scene = S>,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<LoadRequest<S>>();
        let thread = std::thread::Builder::new()
            .name("scene-loader".into())
            .spawn(move || {
                if let Some(core) = core {
                    core_affinity::set_for_current(core);
                }
                let mut last_load: Option<Instant> = None;
                while let Ok(request) = rx.recv() {
                    if let Some(prev) = last_load {
                        let elapsed = prev.elapsed();
                        if elapsed < spacing {
                            std::thread::sleep(spacing - elapsed);
                        }
                    }
                    let scene = match loader.load_scene(&request.path) {
                        Ok(scene) => scene,
                        Err(err) => {
                            tracing::error!(
                                path = %request.path.display(),
                                %err,
                                "scene load failed"
                            );
                            panic!("scene load failed: {}: {err}", request.path.display());
                        }
                    };
                    last_load = Some(Instant::now());
                    tracing::debug!(path = %request.path.display(), "scene loaded");
                    request.reply.send(Arc::new(scene));
                }
            })
            .expect("failed to spawn scene-loader thread");

        Self {
            requests: Some(tx),
            thread: Some(thread),
        }
    }

    /// Queue an asynchronous load.
    pub fn request(&self, path: PathBuf) -> OneShotReceiver<Arc<S>> {
        let (reply, receiver) = oneshot();
        self.requests
            .as_ref()
            .expect("loader already shut down")
            .send(LoadRequest { path, reply })
            .expect("scene-loader thread exited");
        receiver
    }

    /// Load synchronously; used during construction only.
    pub fn load_blocking(&self, path: PathBuf) -> Arc<S> {
        self.request(path).take_blocking()
    }
}

impl<S: Send + Sync + 'static> Drop for BackgroundLoader<S> {
    fn drop(&mut self) {
        drop(self.requests.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

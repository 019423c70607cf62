//! Asynchronous loading front end.
//!
//! [`ImageLoader`] owns one worker thread. Callers [`submit`](ImageLoader::submit)
//! requests from any thread; the worker takes them strictly in order, runs
//! the [`Dispatcher`] and [`finalize`], parks the outcome in the result
//! store and signals completion.
//!
//! ```text
//! submit ─► queue (Mutex<VecDeque> + Condvar) ─► worker ─► results ─► collect
//!                                                  │
//!                                                  └─► LoadCompleted { handle }
//! ```
//!
//! Only the queue and the result store are shared; decoding and the decoder
//! cache live on the worker alone. The [`Dispatcher`] is built on the worker
//! thread, so open decoders never cross threads.
//!
//! Results stay in the store until they are collected. A caller that loses
//! interest in a request must [`discard`](ImageLoader::discard) it; a queued
//! request that is discarded is skipped without decoding. A panic inside a codec is caught at the
//! request boundary, reported as `exception`, and the worker carries on with
//! a cleared decoder cache.

use crate::config::{ConfigError, DisplayConfig, LoaderConfig};
use crate::dispatch::{Dispatcher, StepRecord};
use crate::imaging::CodecSet;
use crate::process::{ViewParams, finalize};
use crate::types::DecodedImage;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies one load request. Unique for the lifetime of the process;
/// handles issued later compare greater. Never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestHandle(u64);

impl RequestHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Sent once per load request when its result is ready to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCompleted {
    pub handle: RequestHandle,
}

/// The outcome of one load request.
#[derive(Debug)]
pub struct LoadResult {
    pub image: Option<DecodedImage>,
    pub out_of_memory: bool,
    pub exception: bool,
    /// Decode steps tried, in order.
    pub steps: Vec<StepRecord>,
}

impl LoadResult {
    fn exception() -> Self {
        Self {
            image: None,
            out_of_memory: false,
            exception: true,
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestState {
    Queued,
    Processing,
    /// Finished and waiting to be collected.
    Processed,
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct LoadRequest {
    handle: RequestHandle,
    path: PathBuf,
    frame: u32,
    view: ViewParams,
    notify: Option<Sender<LoadCompleted>>,
}

enum Request {
    Load(LoadRequest),
    Release { path: PathBuf, ack: Sender<()> },
    Shutdown,
}

enum Slot {
    Queued,
    Processing,
    Processed(LoadResult),
    /// Discarded before it finished; the worker drops it on sight.
    Abandoned,
}

impl Slot {
    fn state(&self) -> Option<RequestState> {
        match self {
            Slot::Queued => Some(RequestState::Queued),
            Slot::Processing => Some(RequestState::Processing),
            Slot::Processed(_) => Some(RequestState::Processed),
            Slot::Abandoned => None,
        }
    }
}

type Results = HashMap<RequestHandle, Slot>;

struct Shared {
    queue: Mutex<VecDeque<Request>>,
    ready: Condvar,
    results: Mutex<Results>,
    finished: Condvar,
}

impl Shared {
    fn push(&self, request: Request) {
        self.queue.lock().push_back(request);
        self.ready.notify_one();
    }

    fn pop(&self) -> Request {
        let mut queue = self.queue.lock();
        loop {
            if let Some(request) = queue.pop_front() {
                return request;
            }
            self.ready.wait(&mut queue);
        }
    }

    fn set(&self, handle: RequestHandle, slot: Slot) {
        self.results.lock().insert(handle, slot);
    }

    /// Mark a queued request as processing. False if it was discarded.
    fn begin(&self, handle: RequestHandle) -> bool {
        let mut results = self.results.lock();
        match results.get_mut(&handle) {
            Some(slot @ Slot::Queued) => {
                *slot = Slot::Processing;
                true
            }
            _ => {
                results.remove(&handle);
                false
            }
        }
    }

    /// Park a finished result. False if the request was discarded meanwhile.
    fn finish(&self, handle: RequestHandle, result: LoadResult) -> bool {
        let mut results = self.results.lock();
        match results.get_mut(&handle) {
            Some(slot @ Slot::Processing) => {
                *slot = Slot::Processed(result);
                true
            }
            _ => {
                results.remove(&handle);
                false
            }
        }
    }
}

fn state_of(results: &Results, handle: RequestHandle) -> Option<RequestState> {
    results.get(&handle).and_then(Slot::state)
}

fn take_processed(results: &mut Results, handle: RequestHandle) -> Option<LoadResult> {
    if state_of(results, handle) != Some(RequestState::Processed) {
        return None;
    }
    match results.remove(&handle) {
        Some(Slot::Processed(result)) => Some(result),
        _ => None,
    }
}

/// Queue-fed image loader with a single decoding thread.
///
/// Every handle returned by [`submit`](Self::submit) must end in either
/// [`collect`](Self::collect), [`wait`](Self::wait) or
/// [`discard`](Self::discard); a result nobody takes is held until the
/// loader is dropped.
pub struct ImageLoader {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ImageLoader {
    /// Start a loader with the built-in codecs.
    pub fn new(config: LoaderConfig) -> Result<Self, LoaderError> {
        let codecs = CodecSet::builtin(&config.limits);
        Self::with_codecs(config, codecs)
    }

    /// Start a loader with a caller-supplied codec set.
    pub fn with_codecs(config: LoaderConfig, codecs: CodecSet) -> Result<Self, LoaderError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            results: Mutex::new(HashMap::new()),
            finished: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("pixload-worker".into())
            .spawn(move || {
                let dispatcher = Dispatcher::new(codecs, &config);
                run(&worker_shared, dispatcher, &config.display)
            })?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queue `frame` of `path` for loading. Never blocks on decoding.
    pub fn submit(
        &self,
        path: impl Into<PathBuf>,
        frame: u32,
        view: ViewParams,
        notify: Option<Sender<LoadCompleted>>,
    ) -> RequestHandle {
        let handle = RequestHandle::next();
        let path = path.into();
        debug!("queue #{} {} frame {frame}", handle.0, path.display());
        self.shared.set(handle, Slot::Queued);
        self.shared.push(Request::Load(LoadRequest {
            handle,
            path,
            frame,
            view,
            notify,
        }));
        handle
    }

    /// Where `handle` is in its lifecycle. `None` once collected, or for
    /// handles this loader never issued.
    pub fn state(&self, handle: RequestHandle) -> Option<RequestState> {
        state_of(&self.shared.results.lock(), handle)
    }

    /// Take the result of a finished request. Each result is handed out once.
    pub fn collect(&self, handle: RequestHandle) -> Option<LoadResult> {
        take_processed(&mut self.shared.results.lock(), handle)
    }

    /// Block until `handle` finishes or `timeout` passes, then collect it.
    pub fn wait(&self, handle: RequestHandle, timeout: Duration) -> Option<LoadResult> {
        let deadline = Instant::now() + timeout;
        let mut results = self.shared.results.lock();
        loop {
            match state_of(&results, handle) {
                None => return None,
                Some(RequestState::Processed) => return take_processed(&mut results, handle),
                Some(RequestState::Queued | RequestState::Processing) => {}
            }
            if self.shared.finished.wait_until(&mut results, deadline).timed_out() {
                return take_processed(&mut results, handle);
            }
        }
    }

    /// Give up on `handle`. A finished result is dropped at once; a queued
    /// request is skipped by the worker and sends no completion. Returns
    /// false for handles that are unknown or already collected.
    pub fn discard(&self, handle: RequestHandle) -> bool {
        let mut results = self.shared.results.lock();
        match results.get_mut(&handle) {
            Some(Slot::Processed(_)) => {
                results.remove(&handle);
                true
            }
            Some(slot @ (Slot::Queued | Slot::Processing)) => {
                *slot = Slot::Abandoned;
                true
            }
            Some(Slot::Abandoned) | None => false,
        }
    }

    /// Drop any cached decoder holding `path`. Returns once the worker has
    /// handled every request queued before this one.
    pub fn release(&self, path: impl Into<PathBuf>) {
        let (ack, done) = mpsc::channel();
        self.shared.push(Request::Release {
            path: path.into(),
            ack,
        });
        if done.recv().is_err() {
            warn!("worker exited before acknowledging release");
        }
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        self.shared.push(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("loader worker panicked during shutdown");
            }
        }
    }
}

fn run(shared: &Shared, mut dispatcher: Dispatcher, display: &DisplayConfig) {
    debug!("worker started");
    loop {
        match shared.pop() {
            Request::Load(request) => process(shared, &mut dispatcher, display, request),
            Request::Release { path, ack } => {
                let released = dispatcher.release(&path);
                debug!("release {}: {released}", path.display());
                let _ = ack.send(());
            }
            Request::Shutdown => break,
        }
    }
    dispatcher.invalidate_all();
    debug!("worker stopped");
}

fn process(
    shared: &Shared,
    dispatcher: &mut Dispatcher,
    display: &DisplayConfig,
    request: LoadRequest,
) {
    let handle = request.handle;
    if !shared.begin(handle) {
        debug!("#{} discarded before loading", handle.0);
        return;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        load(dispatcher, display, &request)
    }));
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            warn!(
                "decoder panicked on {}: {}",
                request.path.display(),
                panic_message(payload.as_ref())
            );
            dispatcher.invalidate_all();
            LoadResult::exception()
        }
    };

    match &result.image {
        Some(image) => info!(
            "#{} {} frame {}/{}: {}x{} in {:.1?}",
            handle.0,
            request.path.display(),
            image.frame_index + 1,
            image.frame_count,
            image.width,
            image.height,
            image.load_duration
        ),
        None => info!(
            "#{} {} failed (out_of_memory={}, exception={})",
            handle.0,
            request.path.display(),
            result.out_of_memory,
            result.exception
        ),
    }

    let kept = shared.finish(handle, result);
    shared.finished.notify_all();
    if !kept {
        debug!("#{} discarded while loading", handle.0);
        return;
    }
    if let Some(notify) = request.notify {
        let _ = notify.send(LoadCompleted { handle });
    }
}

fn load(dispatcher: &mut Dispatcher, display: &DisplayConfig, request: &LoadRequest) -> LoadResult {
    let started = Instant::now();
    let report = dispatcher.decode(&request.path, request.frame);
    let mut result = LoadResult {
        image: None,
        out_of_memory: report.out_of_memory,
        exception: report.exception,
        steps: report.steps,
    };
    if let Some(mut image) = report.image {
        image.load_duration = started.elapsed();
        match finalize(&mut image, &request.view, display) {
            Ok(()) => result.image = Some(image),
            Err(e) => {
                warn!("discarding {}: {e}", request.path.display());
                result.out_of_memory = true;
            }
        }
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

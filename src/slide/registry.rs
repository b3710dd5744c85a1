//! Cache of opened slide handles keyed by source URL.
//!
//! Opening a slide means a metadata round-trip to the image source, so handles
//! are reused:
//! - LRU eviction bounds the number of open slides
//! - Singleflight prevents duplicate opens for the same URL
//!
//! The cache is an explicit resource passed to every pipeline call; there is no
//! process-wide "current image".
//!
//! # Example
//!
//! ```ignore
//! use slide_explorer::slide::{RasterImageSource, SlideHandles};
//!
//! let handles = SlideHandles::new(RasterImageSource::new());
//!
//! // Opens on first access, reuses afterwards
//! let slide = handles.get("slides/example.png").await?;
//! let info = slide.info();
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;

use super::source::ImageSourceProvider;
use crate::error::ImageSourceError;

/// Default number of open slides kept.
pub const DEFAULT_HANDLE_CAPACITY: usize = 4;

type OpenResult<I> = Result<Arc<I>, ImageSourceError>;
type InFlightMap<I> = SyncMutex<HashMap<String, Arc<InFlightState<I>>>>;

/// State for an in-flight open.
struct InFlightState<I> {
    /// Notification for waiters
    notify: Notify,
    /// Result of the open operation (set when complete)
    result: Mutex<Option<OpenResult<I>>>,
    /// Set when the opener was dropped before producing a result
    abandoned: AtomicBool,
}

/// Owned by the caller performing an open.
///
/// Dropping it removes the in-flight entry and wakes the waiters, whether the
/// open finished or the caller's future was cancelled halfway. Waiters of an
/// abandoned open retry, and one of them becomes the new opener.
struct OpenGuard<'a, I> {
    in_flight: &'a InFlightMap<I>,
    url: &'a str,
    state: Arc<InFlightState<I>>,
    completed: bool,
}

impl<I> Drop for OpenGuard<'_, I> {
    fn drop(&mut self) {
        if !self.completed {
            debug!(url = self.url, "Slide open abandoned");
            self.state.abandoned.store(true, Ordering::SeqCst);
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight
                .get(self.url)
                .is_some_and(|state| Arc::ptr_eq(state, &self.state))
            {
                in_flight.remove(self.url);
            }
        }
        self.state.notify.notify_waiters();
    }
}

/// URL-keyed cache of opened slides.
pub struct SlideHandles<P: ImageSourceProvider> {
    /// The provider that opens slides
    provider: P,

    /// Opened slides indexed by URL
    cache: RwLock<LruCache<String, Arc<P::Image>>>,

    /// In-flight opens for singleflight pattern. Never held across an await.
    in_flight: InFlightMap<P::Image>,
}

impl<P: ImageSourceProvider> SlideHandles<P> {
    /// Create a cache holding up to [`DEFAULT_HANDLE_CAPACITY`] slides.
    pub fn new(provider: P) -> Self {
        Self::with_capacity(provider, DEFAULT_HANDLE_CAPACITY)
    }

    /// Create a cache holding up to `capacity` slides (at least one).
    pub fn with_capacity(provider: P, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: SyncMutex::new(HashMap::new()),
        }
    }

    /// Get the slide at `url`, opening it if not cached.
    ///
    /// Concurrent calls for the same URL share a single open. Cancelling the
    /// call that performs the open hands the open over to a waiting caller.
    pub async fn get(&self, url: &str) -> OpenResult<P::Image> {
        {
            let mut cache = self.cache.write().await;
            if let Some(image) = cache.get(url) {
                return Ok(image.clone());
            }
        }

        loop {
            let (state, leader) = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match in_flight.get(url) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: Mutex::new(None),
                            abandoned: AtomicBool::new(false),
                        });
                        in_flight.insert(url.to_string(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                return self.open(url, state).await;
            }

            // Register interest before checking, so a completion between the
            // check and the await is not missed
            let notified = state.notify.notified();
            {
                let result_guard = state.result.lock().await;
                if let Some(ref result) = *result_guard {
                    return result.clone();
                }
            }
            if state.abandoned.load(Ordering::SeqCst) {
                continue;
            }
            notified.await;

            let result_guard = state.result.lock().await;
            if let Some(ref result) = *result_guard {
                return result.clone();
            }
        }
    }

    /// Open `url` as the single opener, publish the result and cache it.
    async fn open(&self, url: &str, state: Arc<InFlightState<P::Image>>) -> OpenResult<P::Image> {
        let mut guard = OpenGuard {
            in_flight: &self.in_flight,
            url,
            state,
            completed: false,
        };

        debug!(url = url, "Opening slide");
        let result = self.provider.open(url).await.map(Arc::new);

        {
            let mut result_guard = guard.state.result.lock().await;
            *result_guard = Some(result.clone());
        }
        guard.completed = true;

        if let Ok(ref image) = result {
            let mut cache = self.cache.write().await;
            cache.put(url.to_string(), image.clone());
        }

        drop(guard);
        result
    }

    /// Drop the cached handle for `url`.
    pub async fn invalidate(&self, url: &str) {
        let mut cache = self.cache.write().await;
        cache.pop(url);
    }

    /// Drop all cached handles.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Number of open slides.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

//! The offline interceptor worker and its event handlers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::{Method, Url};
use tokio::task::JoinSet;

use super::clients::Clients;
use super::fetcher::{FetchError, Fetcher};
use super::message::{ControlReply, ControlRequest, MessageEvent};
use super::request::{Request, Response};
use super::store::CacheStorage;
use super::ASSETS;

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Activated,
    /// Failed to install or replaced by a newer worker
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Kinds of events a worker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
}

/// An event delivered to the worker.
#[derive(Debug)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Message(MessageEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::Activate => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Message(_) => EventKind::Message,
        }
    }
}

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Not intercepted: non-GET or extension request
    Passthrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseSource::Cache => f.write_str("cache"),
            ResponseSource::Network => f.write_str("network"),
            ResponseSource::Passthrough => f.write_str("passthrough"),
        }
    }
}

/// Response to an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Installed { cached: usize },
    Activated { deleted: Vec<String>, claimed: usize },
    Fetched(FetchResponse),
    MessageHandled,
}

/// Errors raised by worker event handlers.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to cache {url}: {reason}")]
    Install { url: String, reason: String },

    #[error("invalid asset path '{0}'")]
    InvalidAsset(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("cache storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("no active worker")]
    NoActiveWorker,
}

/// Cache-first request interceptor bound to one versioned store.
pub struct ServiceWorker {
    cache_name: String,
    origin: Url,
    assets: Vec<String>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    clients: Clients,
    state: Mutex<WorkerState>,
    skip_waiting_on_install: bool,
    skip_waiting: AtomicBool,
    pending_writes: Mutex<JoinSet<()>>,
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("cache_name", &self.cache_name)
            .field("origin", &self.origin.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Create a worker serving `origin` from the store named `cache_name`,
    /// pre-caching the default asset list on install.
    pub fn new(
        cache_name: impl Into<String>,
        origin: Url,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            origin,
            assets: ASSETS.iter().map(|a| a.to_string()).collect(),
            storage,
            fetcher,
            clients: Clients::new(),
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting_on_install: true,
            skip_waiting: AtomicBool::new(false),
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_assets(mut self, assets: Vec<String>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = clients;
        self
    }

    /// Whether a successful install asks to activate without waiting.
    pub fn with_skip_waiting(mut self, skip: bool) -> Self {
        self.skip_waiting_on_install = skip;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(WorkerState::Redundant)
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        if let Ok(mut current) = self.state.lock() {
            log::debug!("Worker {}: {} -> {}", self.cache_name, *current, state);
            *current = state;
        }
    }

    /// Whether install requested to skip the waiting phase.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome, WorkerError> {
        match event {
            Event::Install => self.on_install().await,
            Event::Activate => self.on_activate().await,
            Event::Fetch(request) => self.on_fetch(request).await.map(EventOutcome::Fetched),
            Event::Message(message) => {
                self.on_message(message).await;
                Ok(EventOutcome::MessageHandled)
            }
        }
    }

    /// Fetch and store every asset. Nothing is stored unless all succeed.
    async fn on_install(&self) -> Result<EventOutcome, WorkerError> {
        log::info!("Worker {}: installing", self.cache_name);
        self.set_state(WorkerState::Installing);

        match self.precache().await {
            Ok(cached) => {
                log::info!("Worker {}: installed {} assets", self.cache_name, cached);
                if self.skip_waiting_on_install {
                    self.skip_waiting.store(true, Ordering::SeqCst);
                }
                self.set_state(WorkerState::Installed);
                Ok(EventOutcome::Installed { cached })
            }
            Err(e) => {
                log::error!("Worker {}: install failed: {}", self.cache_name, e);
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, WorkerError> {
        let mut fetched = Vec::with_capacity(self.assets.len());
        for asset in &self.assets {
            let url = self
                .origin
                .join(asset)
                .map_err(|_| WorkerError::InvalidAsset(asset.clone()))?;
            let request = Request::get(url);

            let response =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| WorkerError::Install {
                        url: request.url().to_string(),
                        reason: e.to_string(),
                    })?;
            if !response.ok() {
                return Err(WorkerError::Install {
                    url: request.url().to_string(),
                    reason: format!("HTTP status {}", response.status),
                });
            }
            fetched.push((request, response));
        }

        log::info!("Worker {}: caching {} files", self.cache_name, fetched.len());
        let store = self.storage.open(&self.cache_name).await?;
        let count = fetched.len();
        for (request, response) in fetched {
            store.put(&request, response).await?;
        }
        Ok(count)
    }

    /// Delete stale stores, then take control of every open page.
    async fn on_activate(&self) -> Result<EventOutcome, WorkerError> {
        log::info!("Worker {}: activating", self.cache_name);
        self.set_state(WorkerState::Activating);

        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != self.cache_name {
                log::info!("Deleting stale cache: {}", name);
                self.storage.delete(&name).await?;
                deleted.push(name);
            }
        }

        let claimed = self.clients.claim(&self.cache_name);
        self.set_state(WorkerState::Activated);
        log::info!(
            "Worker {}: activated, controlling {} client(s)",
            self.cache_name,
            claimed
        );
        Ok(EventOutcome::Activated { deleted, claimed })
    }

    /// Cache-first handling of one request.
    pub async fn on_fetch(&self, request: Request) -> Result<FetchResponse, WorkerError> {
        if *request.method() != Method::GET || request.is_extension_scheme() {
            log::debug!("Passing through {}", request.identity());
            let response = self.fetcher.fetch(&request).await?;
            return Ok(FetchResponse {
                response,
                source: ResponseSource::Passthrough,
            });
        }

        match self.lookup(&request).await {
            Some(response) => {
                log::info!("Serving from cache: {}", request.url());
                return Ok(FetchResponse {
                    response,
                    source: ResponseSource::Cache,
                });
            }
            None => log::info!("Fetching from network: {}", request.url()),
        }

        let response = match self.fetcher.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Fetch failed for {}: {}", request.url(), e);
                return Err(e.into());
            }
        };

        if response.is_cacheable() {
            self.store_in_background(request, response.duplicate());
        }

        Ok(FetchResponse {
            response,
            source: ResponseSource::Network,
        })
    }

    async fn lookup(&self, request: &Request) -> Option<Response> {
        let store = match self.storage.open(&self.cache_name).await {
            Ok(store) => store,
            Err(e) => {
                log::warn!("Cannot open cache {}: {}", self.cache_name, e);
                return None;
            }
        };
        match store.match_request(request).await {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("Cache lookup failed for {}: {}", request.url(), e);
                None
            }
        }
    }

    /// Fire-and-forget write of `response`. The caller's copy is never delayed.
    fn store_in_background(&self, request: Request, response: Response) {
        let storage = self.storage.clone();
        let cache_name = self.cache_name.clone();
        let task = async move {
            let result = match storage.open(&cache_name).await {
                Ok(store) => store.put(&request, response).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => log::info!("Stored in cache: {}", request.url()),
                Err(e) => log::warn!("Failed to cache {}: {}", request.url(), e),
            }
        };

        if let Ok(mut writes) = self.pending_writes.lock() {
            while writes.try_join_next().is_some() {}
            writes.spawn(task);
        }
    }

    /// Wait for every background cache write started so far.
    pub async fn flush_writes(&self) {
        let mut writes = match self.pending_writes.lock() {
            Ok(mut writes) => std::mem::take(&mut *writes),
            Err(_) => return,
        };
        while let Some(result) = writes.join_next().await {
            if let Err(e) = result {
                log::warn!("Cache write task failed: {}", e);
            }
        }
    }

    /// Answer a control message on its reply port.
    async fn on_message(&self, message: MessageEvent) {
        log::info!("Message received: {}", message.data);

        let Some(request) = message.request() else {
            log::debug!("Ignoring message without a known action");
            return;
        };

        let reply = match &request {
            ControlRequest::GetCacheInfo => {
                let cached_items = match self.storage.open(&self.cache_name).await {
                    Ok(store) => store.len().await.unwrap_or_else(|e| {
                        log::warn!("Cannot count cache entries: {}", e);
                        0
                    }),
                    Err(e) => {
                        log::warn!("Cannot open cache {}: {}", self.cache_name, e);
                        0
                    }
                };
                ControlReply::CacheInfo {
                    cache_name: self.cache_name.clone(),
                    cached_items,
                }
            }
            ControlRequest::ClearCache => {
                let success = match self.storage.delete(&self.cache_name).await {
                    Ok(_) => true,
                    Err(e) => {
                        log::error!("Failed to clear cache {}: {}", self.cache_name, e);
                        false
                    }
                };
                ControlReply::Cleared { success }
            }
        };

        match message.reply {
            Some(port) => {
                if port.send(reply).is_err() {
                    log::warn!("Reply port closed before the reply was sent");
                }
            }
            None => log::warn!("Message {:?} carried no reply port", request),
        }
    }
}

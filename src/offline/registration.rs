//! Worker registration: install, activation and version replacement.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;

use super::clients::Clients;
use super::message::{ControlReply, MessageEvent};
use super::request::Request;
use super::worker::{Event, FetchResponse, ServiceWorker, WorkerError, WorkerState};

/// Errors returned by [`Registration::register`].
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("installing {cache_name} failed: {source}")]
    InstallFailed {
        cache_name: String,
        #[source]
        source: WorkerError,
    },

    #[error("activating {cache_name} failed: {source}")]
    ActivationFailed {
        cache_name: String,
        #[source]
        source: WorkerError,
    },
}

/// Tracks the active worker and at most one waiting worker.
#[derive(Debug, Default)]
pub struct Registration {
    active: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    clients: Clients,
}

impl Registration {
    pub fn new(clients: Clients) -> Self {
        Self {
            active: None,
            waiting: None,
            clients,
        }
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn active(&self) -> Option<&Arc<ServiceWorker>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<ServiceWorker>> {
        self.waiting.as_ref()
    }

    /// Install `worker`; activate it right away when nothing is active or it
    /// asked to skip waiting, otherwise keep it waiting.
    ///
    /// A failed install leaves the current active worker untouched.
    pub async fn register(
        &mut self,
        worker: ServiceWorker,
    ) -> Result<Arc<ServiceWorker>, RegistrationError> {
        let worker = Arc::new(worker.with_clients(self.clients.clone()));

        if let Err(source) = worker.dispatch(Event::Install).await {
            return Err(RegistrationError::InstallFailed {
                cache_name: worker.cache_name().to_string(),
                source,
            });
        }

        if self.active.is_none() || worker.skip_waiting_requested() {
            self.activate(Arc::clone(&worker)).await?;
        } else {
            log::info!(
                "Worker {} installed, waiting for {} client(s) to close",
                worker.cache_name(),
                self.clients.len()
            );
            if let Some(previous) = self.waiting.replace(Arc::clone(&worker)) {
                previous.set_state(WorkerState::Redundant);
            }
        }
        Ok(worker)
    }

    /// Activate `worker` against a store filled by an earlier run, without
    /// installing again. Returns `Ok(None)` when that store does not exist.
    pub async fn resume(
        &mut self,
        worker: ServiceWorker,
    ) -> Result<Option<Arc<ServiceWorker>>, RegistrationError> {
        let worker = Arc::new(worker.with_clients(self.clients.clone()));
        if !worker.storage().has(worker.cache_name()).await {
            return Ok(None);
        }
        log::info!("Resuming installed worker {}", worker.cache_name());
        worker.set_state(WorkerState::Installed);
        self.activate(Arc::clone(&worker)).await?;
        Ok(Some(worker))
    }

    /// Reinstate `worker` as the active worker over a store kept from an
    /// earlier version. Other stores are left untouched.
    /// Returns `None` when that store does not exist.
    pub async fn restore(&mut self, worker: ServiceWorker) -> Option<Arc<ServiceWorker>> {
        let worker = Arc::new(worker.with_clients(self.clients.clone()));
        if !worker.storage().has(worker.cache_name()).await {
            return None;
        }
        log::warn!("Falling back to previous worker {}", worker.cache_name());
        self.clients.claim(worker.cache_name());
        worker.set_state(WorkerState::Activated);
        if let Some(previous) = self.active.replace(Arc::clone(&worker)) {
            previous.flush_writes().await;
            previous.set_state(WorkerState::Redundant);
        }
        Some(worker)
    }

    /// Activate the waiting worker once no client is open.
    /// Returns true if a worker was promoted.
    pub async fn promote_waiting(&mut self) -> Result<bool, RegistrationError> {
        if !self.clients.is_empty() {
            return Ok(false);
        }
        match self.waiting.take() {
            Some(worker) => {
                self.activate(worker).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn activate(&mut self, worker: Arc<ServiceWorker>) -> Result<(), RegistrationError> {
        if let Err(source) = worker.dispatch(Event::Activate).await {
            worker.set_state(WorkerState::Redundant);
            return Err(RegistrationError::ActivationFailed {
                cache_name: worker.cache_name().to_string(),
                source,
            });
        }
        if let Some(previous) = self.active.replace(worker) {
            previous.flush_writes().await;
            previous.set_state(WorkerState::Redundant);
        }
        Ok(())
    }

    /// Send `request` through the active worker.
    pub async fn fetch(&self, request: Request) -> Result<FetchResponse, WorkerError> {
        let worker = self.active.as_ref().ok_or(WorkerError::NoActiveWorker)?;
        worker.on_fetch(request).await
    }

    /// Post a control message to the active worker. The reply arrives on the
    /// returned receiver.
    pub async fn post_message(
        &self,
        data: Value,
    ) -> Result<oneshot::Receiver<ControlReply>, WorkerError> {
        let worker = self.active.as_ref().ok_or(WorkerError::NoActiveWorker)?;
        let (message, reply) = MessageEvent::with_reply(data);
        worker.dispatch(Event::Message(message)).await?;
        Ok(reply)
    }

    /// Wait for the active worker's background cache writes.
    pub async fn flush(&self) {
        if let Some(worker) = &self.active {
            worker.flush_writes().await;
        }
    }
}

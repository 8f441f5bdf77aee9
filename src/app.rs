//! Application shell.
//!
//! Wires the camera controller, the offline interceptor registration and the
//! status board together the way a single open page of the app would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

use crate::camera::{CameraController, CapturedPhoto, MediaDevices, TestPatternDevices};
use crate::config::{CameraBackend, CameraConfig, Config};
use crate::offline::{
    CacheStorage, ClientId, Clients, ControlReply, ControlRequest, FetchError, FetchResponse,
    Fetcher, HttpFetcher, Registration, RegistrationError, Request, ServiceWorker, WorkerError,
};
use crate::status::{Severity, StatusBoard, StatusSink};

/// Errors surfaced by the application shell.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("offline mode is not available")]
    OfflineUnavailable,

    #[error("no reply from the offline worker")]
    NoReply,

    #[error("no photo was captured")]
    NoPhoto,

    #[error("cache could not be cleared")]
    ClearFailed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Set up a Ctrl+C handler that requests a graceful shutdown.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Whether Ctrl+C was pressed since start-up.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Build the camera backend selected in the configuration.
///
/// Returns `None` when the backend is not compiled in, which leaves the
/// camera unsupported.
pub fn devices_for(camera: &CameraConfig) -> Option<Arc<dyn MediaDevices>> {
    match camera.backend {
        CameraBackend::TestPattern => Some(Arc::new(TestPatternDevices::new())),
        #[cfg(feature = "native-camera")]
        CameraBackend::Native => Some(Arc::new(crate::camera::NativeDevices::new(camera.device))),
        #[cfg(not(feature = "native-camera"))]
        CameraBackend::Native => {
            log::warn!("Native camera backend requested but the native-camera feature is disabled");
            None
        }
    }
}

/// Storage for the configured cache directory, or the platform default.
pub fn storage_for(config: &Config) -> Option<CacheStorage> {
    match &config.cache.dir {
        Some(dir) => Some(CacheStorage::new(dir.clone())),
        None => CacheStorage::with_default_dir(),
    }
}

/// Parse the configured origin.
pub fn origin_for(config: &Config) -> Result<Url, AppError> {
    Url::parse(&config.app.origin).map_err(|e| AppError::InvalidOrigin {
        origin: config.app.origin.clone(),
        reason: e.to_string(),
    })
}

/// Newest store named `<name>-v<N>` with `N` below `version`.
fn previous_store(names: &[String], name: &str, version: u32) -> Option<String> {
    let prefix = format!("{}-v", name);
    names
        .iter()
        .filter_map(|n| {
            let v = n.strip_prefix(&prefix)?.parse::<u32>().ok()?;
            (v < version).then_some((v, n))
        })
        .max_by_key(|(v, _)| *v)
        .map(|(_, n)| n.clone())
}

/// One open page: camera, offline registration and notifications.
pub struct App {
    config: Config,
    status: Arc<StatusBoard>,
    camera: CameraController,
    registration: Registration,
    client: Option<ClientId>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("camera", &self.camera)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

impl App {
    /// `devices` is `None` on hosts without camera capability.
    pub fn new(config: Config, devices: Option<Arc<dyn MediaDevices>>) -> Self {
        let status = Arc::new(StatusBoard::with_timeout(Duration::from_millis(
            config.status.timeout_ms,
        )));
        let sink: Arc<dyn StatusSink> = status.clone();
        let camera = match devices {
            Some(devices) => CameraController::new(devices, sink),
            None => CameraController::unsupported(sink),
        }
        .with_constraints(config.camera.constraints());

        let registration = Registration::new(Clients::new());
        let client = Some(registration.clients().open());

        Self {
            config,
            status,
            camera,
            registration,
            client,
        }
    }

    /// Build from configuration alone, using the configured camera backend.
    pub fn from_config(config: Config) -> Self {
        let devices = devices_for(&config.camera);
        Self::new(config, devices)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraController {
        &mut self.camera
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }

    /// Worker for the configured store, origin and asset list.
    pub fn build_worker(
        &self,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<ServiceWorker, AppError> {
        let origin = origin_for(&self.config)?;
        Ok(
            ServiceWorker::new(self.config.cache.store_name(), origin, storage, fetcher)
                .with_assets(self.config.cache.assets.clone()),
        )
    }

    /// Register the offline interceptor.
    ///
    /// Returns `true` when offline mode is ready. Without cache storage the
    /// app keeps working online only.
    pub async fn register_service_worker(
        &mut self,
        storage: Option<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> bool {
        let Some(storage) = storage else {
            log::warn!("Cache storage is not supported here; offline mode disabled");
            return false;
        };

        match self.try_register(storage, fetcher).await {
            Ok(name) => {
                log::info!("Service worker registered: {}", name);
                self.status.show_status("Offline mode ready", Severity::Success);
                true
            }
            Err(e) => {
                log::error!("Service worker registration failed: {}", e);
                self.status
                    .show_status("Failed to set up offline mode", Severity::Error);
                false
            }
        }
    }

    async fn try_register(
        &mut self,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<String, AppError> {
        let worker = self.build_worker(storage.clone(), Arc::clone(&fetcher))?;
        if let Some(worker) = self.registration.resume(worker).await? {
            return Ok(worker.cache_name().to_string());
        }
        let worker = self.build_worker(storage.clone(), Arc::clone(&fetcher))?;
        match self.registration.register(worker).await {
            Ok(worker) => Ok(worker.cache_name().to_string()),
            Err(e) => {
                if self.registration.active().is_none() {
                    self.restore_previous(storage, fetcher).await;
                }
                Err(e.into())
            }
        }
    }

    /// Keep serving the newest older version left on disk after a failed install.
    async fn restore_previous(&mut self, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) {
        let names = match storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                log::warn!("Cannot list cache stores: {}", e);
                return;
            }
        };
        let Some(name) = previous_store(&names, &self.config.cache.name, self.config.cache.version)
        else {
            return;
        };
        let origin = match origin_for(&self.config) {
            Ok(origin) => origin,
            Err(_) => return,
        };
        let worker = ServiceWorker::new(name, origin, storage, fetcher)
            .with_assets(self.config.cache.assets.clone());
        if let Some(worker) = self.registration.restore(worker).await {
            log::info!("Serving from previous store {}", worker.cache_name());
        }
    }

    /// Register using the configured storage and an HTTP fetcher for the origin.
    pub async fn register_default(&mut self) -> bool {
        let fetcher = match origin_for(&self.config).and_then(|o| Ok(HttpFetcher::new(o)?)) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                log::error!("Cannot create HTTP client: {}", e);
                self.status
                    .show_status("Failed to set up offline mode", Severity::Error);
                return false;
            }
        };
        let storage = storage_for(&self.config);
        self.register_service_worker(storage, Arc::new(fetcher))
            .await
    }

    /// Fetch a path of the origin through the active worker.
    pub async fn fetch_path(&self, path: &str) -> Result<FetchResponse, AppError> {
        let origin = origin_for(&self.config)?;
        let url = origin
            .join(path)
            .map_err(|_| AppError::InvalidPath(path.to_string()))?;
        Ok(self.registration.fetch(Request::get(url)).await?)
    }

    /// Post a control request to the active worker and wait for its reply.
    pub async fn control(&self, request: ControlRequest) -> Result<ControlReply, AppError> {
        let data: Value = serde_json::to_value(&request).map_err(|_| AppError::NoReply)?;
        let reply = self
            .registration
            .post_message(data)
            .await
            .map_err(|e| match e {
                WorkerError::NoActiveWorker => AppError::OfflineUnavailable,
                other => AppError::Worker(other),
            })?;
        reply.await.map_err(|_| AppError::NoReply)
    }

    /// Open the camera, grab one photo, and close it again.
    pub async fn capture_once(&mut self) -> Option<CapturedPhoto> {
        if !self.camera.open().await {
            return None;
        }
        if ctrlc_received() {
            self.camera.close();
            return None;
        }
        let photo = self.camera.capture();
        self.camera.close();
        photo
    }

    /// Release the camera, finish pending cache writes and close the page.
    pub async fn shutdown(&mut self) {
        if self.camera.is_active() {
            self.camera.close();
        }
        self.registration.flush().await;
        if let Some(id) = self.client.take() {
            self.registration.clients().close(id);
        }
        log::debug!("App shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraState, SimulatedOutcome};
    use crate::offline::{ResponseType, Response};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticOrigin {
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for StaticOrigin {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            if self.fail {
                return Err(FetchError::Offline(request.url().to_string()));
            }
            Ok(Response::new(200, request.url().path().to_string())
                .with_type(ResponseType::Basic))
        }
    }

    fn app() -> App {
        App::new(Config::default(), Some(Arc::new(TestPatternDevices::new())))
    }

    #[tokio::test]
    async fn test_register_reports_ready() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = app();
        let storage = Some(CacheStorage::new(temp_dir.path().to_path_buf()));

        assert!(
            app.register_service_worker(storage, Arc::new(StaticOrigin { fail: false }))
                .await
        );
        let latest = app.status().latest().unwrap();
        assert_eq!(latest.message, "Offline mode ready");
        assert_eq!(latest.severity, Severity::Success);
        assert!(app.registration().active().is_some());
    }

    #[tokio::test]
    async fn test_register_failure_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut app = app();
        let storage = Some(CacheStorage::new(temp_dir.path().to_path_buf()));

        assert!(
            !app.register_service_worker(storage, Arc::new(StaticOrigin { fail: true }))
                .await
        );
        assert_eq!(app.status().latest().unwrap().severity, Severity::Error);
        assert!(app.registration().active().is_none());
    }

    #[tokio::test]
    async fn test_second_run_resumes_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().to_path_buf());

        let mut first = app();
        assert!(
            first
                .register_service_worker(Some(storage.clone()), Arc::new(StaticOrigin { fail: false }))
                .await
        );
        first.shutdown().await;

        let mut second = app();
        assert!(
            second
                .register_service_worker(Some(storage), Arc::new(StaticOrigin { fail: true }))
                .await
        );
        let response = second.fetch_path("/app.js").await.unwrap();
        assert_eq!(response.source, crate::offline::ResponseSource::Cache);
        assert_eq!(&response.response.body[..], b"/app.js");
    }

    #[tokio::test]
    async fn test_failed_upgrade_keeps_previous_version_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().to_path_buf());

        let mut first = app();
        assert!(
            first
                .register_service_worker(Some(storage.clone()), Arc::new(StaticOrigin { fail: false }))
                .await
        );
        first.shutdown().await;

        let mut config = Config::default();
        config.cache.version = 2;
        let mut second = App::new(config, Some(Arc::new(TestPatternDevices::new())));
        assert!(
            !second
                .register_service_worker(Some(storage.clone()), Arc::new(StaticOrigin { fail: true }))
                .await
        );
        assert_eq!(second.status().latest().unwrap().severity, Severity::Error);
        assert_eq!(
            second.registration().active().unwrap().cache_name(),
            "pwa-camara-v1"
        );

        let response = second.fetch_path("/").await.unwrap();
        assert_eq!(response.source, crate::offline::ResponseSource::Cache);
        assert_eq!(storage.keys().await.unwrap(), vec!["pwa-camara-v1"]);
    }

    #[test]
    fn test_previous_store_picks_newest_older_version() {
        let names: Vec<String> = ["other-v9", "pwa-camara-v1", "pwa-camara-v3", "pwa-camara-v5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            previous_store(&names, "pwa-camara", 5).as_deref(),
            Some("pwa-camara-v3")
        );
        assert!(previous_store(&names, "pwa-camara", 1).is_none());
    }

    #[tokio::test]
    async fn test_register_without_storage_is_silent() {
        let mut app = app();
        assert!(
            !app.register_service_worker(None, Arc::new(StaticOrigin { fail: false }))
                .await
        );
        assert!(app.status().is_empty());
    }

    #[tokio::test]
    async fn test_control_without_worker() {
        let app = app();
        let err = app.control(ControlRequest::GetCacheInfo).await.unwrap_err();
        assert!(matches!(err, AppError::OfflineUnavailable));
    }

    #[tokio::test]
    async fn test_capture_once_leaves_camera_idle() {
        let mut app = app();
        let photo = app.capture_once().await.unwrap();
        assert_eq!(photo.blob().mime_type(), "image/png");
        assert_eq!(app.camera().state(), CameraState::Idle);
        assert_eq!(app.status().latest().unwrap().message, "Camera closed");
    }

    #[tokio::test]
    async fn test_capture_once_denied() {
        let devices = TestPatternDevices::with_outcome(SimulatedOutcome::Deny);
        let mut app = App::new(Config::default(), Some(Arc::new(devices)));
        assert!(app.capture_once().await.is_none());
        assert_eq!(app.status().latest().unwrap().severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_shutdown_releases_camera() {
        let devices = Arc::new(TestPatternDevices::new());
        let mut app = App::new(Config::default(), Some(devices.clone()));
        assert!(app.camera_mut().open().await);
        assert_eq!(devices.live_track_count(), 1);

        app.shutdown().await;
        assert_eq!(devices.live_track_count(), 0);
        assert!(app.registration().clients().is_empty());
    }

    #[test]
    fn test_invalid_origin() {
        let mut config = Config::default();
        config.app.origin = "not a url".to_string();
        assert!(matches!(
            origin_for(&config),
            Err(AppError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_storage_for_configured_dir() {
        let mut config = Config::default();
        config.cache.dir = Some("/tmp/pwa-stores".into());
        let storage = storage_for(&config).unwrap();
        assert_eq!(storage.root(), std::path::Path::new("/tmp/pwa-stores"));
    }

    #[test]
    fn test_test_pattern_backend_is_default() {
        assert!(devices_for(&CameraConfig::default()).is_some());
    }
}

//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::args::{CacheAction, ConfigAction, SimulateMode};
use crate::app::{ctrlc_received, devices_for, App, AppError};
use crate::camera::{MediaDevices, TestPatternDevices};
use crate::config::{default_path, Config, DEFAULT_CONFIG_TOML};
use crate::offline::{ControlReply, ControlRequest};
use crate::status::StatusBoard;

/// Print every notification shown during the command.
fn print_notifications(status: &StatusBoard) {
    for notification in status.history() {
        println!("[{}] {}", notification.severity, notification.message);
    }
}

fn default_output() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    PathBuf::from(format!("capture-{}.png", secs))
}

/// Open the camera, capture one photo, then write or print it.
pub async fn capture(
    config: Config,
    output: Option<PathBuf>,
    print_data_url: bool,
    simulate: Option<SimulateMode>,
) -> Result<(), AppError> {
    let devices: Option<Arc<dyn MediaDevices>> = match simulate {
        Some(mode) => Some(Arc::new(TestPatternDevices::with_outcome(mode.into()))),
        None => devices_for(&config.camera),
    };
    let mut app = App::new(config, devices);

    let photo = app.capture_once().await;
    app.shutdown().await;
    print_notifications(app.status());

    let photo = photo.ok_or(AppError::NoPhoto)?;
    if print_data_url {
        println!("{}", photo.data_url());
        return Ok(());
    }

    let path = output.unwrap_or_else(default_output);
    std::fs::write(&path, photo.blob().bytes())?;
    println!(
        "Saved {} photo ({} bytes) to {}",
        photo.resolution(),
        photo.blob().size(),
        path.display()
    );
    Ok(())
}

/// Register the interceptor and fetch each path through it.
pub async fn fetch(config: Config, paths: &[String]) -> Result<(), AppError> {
    let mut app = App::from_config(config);
    if !app.register_default().await && app.registration().active().is_none() {
        print_notifications(app.status());
        return Err(AppError::OfflineUnavailable);
    }

    let mut failed = None;
    for path in paths {
        if ctrlc_received() {
            println!("Interrupted, skipping remaining paths.");
            break;
        }
        match app.fetch_path(path).await {
            Ok(fetched) => println!(
                "{} -> {} ({} bytes, {})",
                path,
                fetched.response.status,
                fetched.response.body.len(),
                fetched.source
            ),
            Err(e) => {
                eprintln!("{} -> error: {}", path, e);
                failed = Some(e);
            }
        }
    }

    app.shutdown().await;
    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Run a cache control action against the registered interceptor.
pub async fn cache(config: Config, action: CacheAction) -> Result<(), AppError> {
    let mut app = App::from_config(config);
    if !app.register_default().await && app.registration().active().is_none() {
        print_notifications(app.status());
        return Err(AppError::OfflineUnavailable);
    }

    let request = match action {
        CacheAction::Info => ControlRequest::GetCacheInfo,
        CacheAction::Clear => ControlRequest::ClearCache,
    };
    let reply = app.control(request).await;
    app.shutdown().await;

    report_reply(reply?)
}

/// Print a control reply. A failed clear is an error.
fn report_reply(reply: ControlReply) -> Result<(), AppError> {
    match reply {
        ControlReply::CacheInfo {
            cache_name,
            cached_items,
        } => {
            println!("Cache: {}", cache_name);
            println!("Cached items: {}", cached_items);
            Ok(())
        }
        ControlReply::Cleared { success: true } => {
            println!("Cache cleared.");
            Ok(())
        }
        ControlReply::Cleared { success: false } => Err(AppError::ClearFailed),
    }
}

/// List available cameras and print them to stdout.
pub fn list_cameras(config: &Config) {
    let Some(devices) = devices_for(&config.camera) else {
        eprintln!("Error: camera backend is not available in this build.");
        std::process::exit(1);
    };

    match devices.enumerate_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No cameras found.");
                println!();
                println!("Make sure your camera is connected and permissions are granted.");
            } else {
                println!("Available cameras:");
                for device in devices {
                    println!("  {}", device);
                }
                println!();
                println!("Set camera.device in the config file to select a camera.");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config: &Config, path: Option<&Path>) {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Origin: {}", config.app.origin);
            println!("  Store: {}", config.cache.store_name());
            println!("  Assets: {}", config.cache.assets.len());
            println!(
                "  Camera: {:?} #{} ({} facing, {}x{})",
                config.camera.backend,
                config.camera.device,
                config.camera.facing_mode.name(),
                config.camera.width,
                config.camera.height
            );
            println!("  Status timeout: {} ms", config.status.timeout_ms);
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => {
            if let Err(e) = init_config(&config_path) {
                eprintln!("{}", e);
                eprintln!("Use 'pwa-camera config show' to view current settings.");
                std::process::exit(1);
            }
            println!("Created config file: {}", config_path.display());
        }
    }
}

/// Write the default config file. Never overwrites an existing one.
pub fn init_config(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!("Config file already exists: {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating config directory: {}", e))?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .map_err(|e| format!("Error writing config file: {}", e))
}

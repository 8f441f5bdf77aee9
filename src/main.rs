use clap::Parser;

use pwa_camera::app::setup_ctrlc_handler;
use pwa_camera::cli::{self, Args, Command};
use pwa_camera::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(origin) = args.origin {
        config.app.origin = origin;
    }

    if let Err(e) = setup_ctrlc_handler() {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    let result = match args.command {
        Command::Capture {
            output,
            print_data_url,
            simulate,
        } => cli::capture(config, output, print_data_url, simulate).await,
        Command::Fetch { paths } => cli::fetch(config, &paths).await,
        Command::Cache { action } => cli::cache(config, action).await,
        Command::ListCameras => {
            cli::list_cameras(&config);
            Ok(())
        }
        Command::Config { action } => {
            cli::handle_config_action(action, &config, args.config.as_deref());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

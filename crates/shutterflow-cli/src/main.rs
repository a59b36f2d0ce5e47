//! Shutterflow CLI
//!
//! Runs the photo workflow on a local file, or serves the HTTP API.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shutterflow_engine::{
    create_router, AppState, CameraParameters, Config, FeatureExtractor, SessionState,
    WorkflowEngine,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 8000;

/// How often the server looks for idle sessions.
const REAP_INTERVAL: Duration = Duration::from_secs(300);

/// Shutterflow - reference photo to camera settings to capture
///
/// Analyzes a reference photo, recommends camera parameters, refines them
/// from plain-language feedback and drives the camera to take the shot.
#[derive(Parser, Debug)]
#[command(name = "shutterflow")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: shutterflow.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Directory uploaded reference photos are stored in
    #[arg(long, value_name = "DIR", global = true)]
    upload_dir: Option<String>,

    /// Directory captured photos are written to
    #[arg(long, value_name = "DIR", global = true)]
    capture_dir: Option<String>,

    /// Do not fall back to the simulated camera
    #[arg(long, global = true)]
    no_simulation: bool,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole workflow on a photo and capture a matching shot
    Run {
        /// Reference photo
        #[arg(value_name = "PHOTO")]
        photo: PathBuf,

        /// Feedback to apply before capturing (repeatable)
        #[arg(short, long = "refine", value_name = "TEXT")]
        refine: Vec<String>,

        /// Print the final session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a photo and print the recommended parameters
    Analyze {
        /// Photo to analyze
        #[arg(value_name = "PHOTO")]
        photo: PathBuf,
    },

    /// Serve the HTTP API
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref dir) = args.upload_dir {
        config.upload_dir = PathBuf::from(dir);
    }
    if let Some(ref dir) = args.capture_dir {
        config.capture_dir = PathBuf::from(dir);
    }
    if args.no_simulation {
        config.device.simulation.enabled = false;
    }

    // Re-validate after overrides
    config.validate()?;

    match args.command {
        Command::Run {
            photo,
            refine,
            json,
        } => run_workflow(&config, &photo, &refine, json).await,
        Command::Analyze { photo } => analyze(&photo).await,
        Command::Serve { port, host } => {
            serve(&config, (host, port).into()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Loads configuration from the given path, or from the working directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Uploads `photo`, applies each piece of feedback and drives the session to
/// completion.
async fn run_workflow(
    config: &Config,
    photo: &Path,
    refinements: &[String],
    json: bool,
) -> anyhow::Result<ExitCode> {
    print_config(config);

    let bytes = tokio::fs::read(photo).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read photo '{}': {e}\n\nSuggestion: Check the path and file permissions",
            photo.display()
        )
    })?;
    let name = photo
        .file_name()
        .map_or_else(|| "photo.jpg".to_string(), |n| n.to_string_lossy().to_string());

    let engine = WorkflowEngine::from_config(config)?;

    println!();
    println!("Analyzing {}...", photo.display());
    let session = engine.upload_photo(&bytes, &name).await?;
    let session_id = session.session_id.clone();
    if let Some(ref error) = session.error_message {
        println!("  Analysis failed: {error}");
    } else if let Some(ref params) = session.current_parameters {
        println!("  Recommended: {}", describe_parameters(params));
    }

    for text in refinements {
        let session = engine.apply_refinement(&session_id, text).await?;
        match session.error_message {
            Some(ref error) => println!("  Feedback '{text}' not applied: {error}"),
            None => {
                if let Some(ref params) = session.current_parameters {
                    println!("  After '{text}': {}", describe_parameters(params));
                }
            }
        }
    }

    println!();
    println!("Driving camera...");
    let state = engine.run_full_workflow(&session_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!();
        print_summary(&state);
    }

    Ok(if state.has_error() || !state.current_step.is_terminal() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Analyzes a photo without creating a session.
async fn analyze(photo: &Path) -> anyhow::Result<ExitCode> {
    let path = photo.to_path_buf();
    let recommendation =
        tokio::task::spawn_blocking(move || FeatureExtractor::new().analyze_file(&path)).await??;

    let output = serde_json::json!({
        "analysis": recommendation.analysis,
        "parameters": recommendation.parameters,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

/// Serves the HTTP API until Ctrl+C, reaping idle sessions in the background.
async fn serve(config: &Config, addr: SocketAddr) -> anyhow::Result<()> {
    print_config(config);

    let engine = Arc::new(WorkflowEngine::from_config(config)?);
    let router = create_router(AppState::with_engine(Arc::clone(&engine)));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    let max_age = config.sessions.max_age();
    let reaper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        loop {
            ticker.tick().await;
            let reaped = engine.reap_sessions(max_age).await;
            tracing::debug!(reaped, "Session reaper pass");
        }
    });

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await;

    reaper.abort();
    result.map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
}

/// Prints the effective configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Upload directory: {}", config.upload_dir.display());
    println!("  Capture directory: {}", config.capture_dir.display());
    println!("  Control endpoint: {}", config.device.control_endpoint);
    println!("  Capture endpoint: {}", config.device.capture_endpoint);
    println!(
        "  Simulation: {}",
        if config.device.simulation.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
}

/// One-line rendering of a parameter snapshot.
fn describe_parameters(params: &CameraParameters) -> String {
    let mut parts = Vec::new();
    if let Some(ref aperture) = params.aperture {
        parts.push(aperture.clone());
    }
    if let Some(iso) = params.iso {
        parts.push(format!("ISO {iso}"));
    }
    if let Some(ev) = params.exposure_compensation {
        parts.push(format!("{ev:+.1} EV"));
    }
    if let Some(focus) = params.focus_mode {
        parts.push(format!("focus {focus}"));
    }
    if let Some(wb) = params.white_balance {
        parts.push(format!("WB {wb}"));
    }
    if let Some(scene) = params.scene_mode {
        parts.push(format!("scene {scene}"));
    }
    if parts.is_empty() {
        "no parameters".to_string()
    } else {
        parts.join(", ")
    }
}

/// Prints a summary of the finished session.
fn print_summary(state: &SessionState) {
    println!("=== Shutterflow Summary ===");
    println!("Session: {}", state.session_id);
    println!("Stage: {}", state.current_step);
    println!("Refinements: {}", state.refinement_history.len());
    if let Some(ref analysis) = state.analysis {
        println!("Scene: {}", analysis.scene_type);
    }
    if let Some(ref params) = state.current_parameters {
        println!("Parameters: {}", describe_parameters(params));
    }
    if let Some(ref photo) = state.captured_photo_path {
        println!("Captured photo: {}", photo.display());
    }
    if let Some(ref error) = state.error_message {
        println!("Error: {error}");
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceforge_analysis::{encode_jpeg, summarize_top_scores, AnalysisClient, AnalysisSlot};
use faceforge_camera::Camera;
use faceforge_core::AvatarScene;
use faceforge_tracker::{spawn_driver, AnimationDriver, DriverHandle, FaceTracker, Landmarker};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

mod config;

use config::Config;

/// Number of blendshape scores summarized for the analysis prompt.
const TOP_SHAPES_FOR_PROMPT: usize = 5;

#[derive(Parser)]
#[command(name = "faceforge", about = "FaceForge avatar puppeteering CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking loop, driving the avatar from the webcam
    Run {
        /// Request a cloud expression analysis every N seconds
        #[arg(long)]
        analyze_interval: Option<u64>,
    },
    /// Capture one frame and request a cloud expression analysis
    Analyze,
    /// Run camera diagnostics
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run { analyze_interval } => run(config, analyze_interval).await,
        Commands::Analyze => analyze_once(config).await,
        Commands::Probe => probe(config),
    }
}

async fn run(config: Config, analyze_interval: Option<u64>) -> Result<()> {
    // Analysis is optional, but if the user asked for it the credential
    // must be present before we start the loop.
    let analysis = match analyze_interval {
        Some(_) => Some(Arc::new(
            AnalysisClient::new(config.analysis_config())
                .context("analysis requested but not configured")?,
        )),
        None => None,
    };

    let handle = start_driver(&config)?;
    let slot = AnalysisSlot::new();

    let mut status_interval = tokio::time::interval(Duration::from_secs(2));
    let mut analysis_interval =
        tokio::time::interval(Duration::from_secs(analyze_interval.unwrap_or(u64::MAX / 1000)));
    analysis_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick fires immediately; swallow it.
    status_interval.tick().await;
    analysis_interval.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            _ = status_interval.tick() => {
                match handle.snapshot().await {
                    Ok(snap) => {
                        let top: Vec<String> = snap
                            .top_scores
                            .iter()
                            .map(|s| format!("{} {:.2}", s.name, s.score))
                            .collect();
                        tracing::info!(
                            state = %snap.state,
                            ticks = snap.ticks,
                            inferences = snap.inferences,
                            top = %top.join(", "),
                            "status"
                        );
                    }
                    Err(_) => break,
                }
            }
            _ = analysis_interval.tick(), if analysis.is_some() => {
                let client = Arc::clone(analysis.as_ref().unwrap());
                trigger_analysis(&handle, &slot, client).await;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Load the avatar and model, open the camera, and spawn the driver.
fn start_driver(config: &Config) -> Result<DriverHandle> {
    let manifest = File::open(&config.avatar_manifest).with_context(|| {
        format!(
            "failed to open avatar manifest {}",
            config.avatar_manifest.display()
        )
    })?;
    let scene = AvatarScene::from_manifest_reader(manifest)?;

    tracing::info!(path = %config.model_path.display(), "loading landmarker model");
    // Load failure is terminal: surfaced here, no automatic retry.
    let landmarker = Landmarker::load(&config.model_path.to_string_lossy())?;

    let camera = Camera::open(&config.camera_device)?;

    let driver = AnimationDriver::new(camera, landmarker, scene, config.driver_config());
    Ok(spawn_driver(driver))
}

/// Fire one gated analysis request in the background. Skips silently when a
/// previous request is still in flight.
async fn trigger_analysis(handle: &DriverHandle, slot: &AnalysisSlot, client: Arc<AnalysisClient>) {
    let Some(guard) = slot.try_begin() else {
        tracing::debug!("analysis already in flight; skipping");
        return;
    };
    let Ok(Some(capture)) = handle.capture().await else {
        tracing::debug!("no frame captured yet; skipping analysis");
        return;
    };

    tokio::spawn(async move {
        let _guard = guard;
        let jpeg = match encode_jpeg(&capture.frame.data, capture.frame.width, capture.frame.height)
        {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!(error = %e, "frame encode failed");
                return;
            }
        };
        let summary = summarize_top_scores(&capture.scores, TOP_SHAPES_FOR_PROMPT);

        match client.analyze(&jpeg, &summary).await {
            Ok(result) => {
                tracing::info!(
                    emotion = %result.emotion,
                    description = %result.description,
                    acting_tips = %result.acting_tips,
                    "expression analysis"
                );
            }
            Err(e) => {
                // Surfaced once; the slot reopens and the next interval
                // may try again.
                tracing::warn!(error = %e, "expression analysis failed");
            }
        }
    });
}

async fn analyze_once(config: Config) -> Result<()> {
    let client = AnalysisClient::new(config.analysis_config())?;

    let mut camera = Camera::open(&config.camera_device)?;
    let mut landmarker = Landmarker::load(&config.model_path.to_string_lossy())?;

    let frame = camera.capture_frame()?;
    let detection = landmarker
        .detect(&frame, 1)?
        .context("no face detected in the captured frame")?;

    let jpeg = encode_jpeg(&frame.data, frame.width, frame.height)?;
    let summary = summarize_top_scores(&detection.scores, TOP_SHAPES_FOR_PROMPT);
    tracing::info!(%summary, "requesting analysis");

    let result = client.analyze(&jpeg, &summary).await?;

    println!("Emotion:      {}", result.emotion);
    println!("Analysis:     {}", result.description);
    println!("Acting tips:  {}", result.acting_tips);
    Ok(())
}

fn probe(config: Config) -> Result<()> {
    println!("Available capture devices:");
    for dev in Camera::list_devices() {
        println!("  {}  {} ({})", dev.path, dev.name, dev.driver);
    }

    let mut camera = Camera::open(&config.camera_device)?;
    let frame = camera.capture_frame()?;
    println!(
        "{}: {}x{} {:?}, avg brightness {:.1}",
        camera.device_path,
        camera.width,
        camera.height,
        camera.fourcc,
        frame.avg_brightness()
    );
    Ok(())
}

// src/main.rs
mod classifier;
mod config;
mod controller;
mod data;
mod devices;
mod gesture;
mod landmark_feed;
mod menu;
mod tracking;

use anyhow::{Context, Result};
use clap::Parser;
use classifier::{
    CentroidClassifier, Classifier, FixedClassifier, LabelSet, DEFAULT_POSE_LABELS,
    DEFAULT_TRAJECTORY_LABELS,
};
use config::Settings;
use controller::{FrameController, FrameInput};
use data::DatasetLogger;
use devices::{CommandDispatcher, DeviceRegistry, DeviceTransport, DryRunTransport, HttpTransport};
use landmark_feed::{FeedError, LandmarkFeed};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};
use tracking::HAND_LANDMARK_COUNT;

#[derive(Parser, Debug)]
#[command(about = "Hand gesture menu for networked devices")]
struct Args {
    /// JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Hand tracker frame feed (JSON lines), `-` for stdin
    #[arg(long, default_value = "-")]
    input: String,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    height: Option<f64>,
    /// Write each frame's render model to stdout as JSON
    #[arg(long)]
    emit_frames: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(width) = args.width {
        settings.frame_width = width;
    }
    if let Some(height) = args.height {
        settings.frame_height = height;
    }

    // Failing to open the frame source is the one fatal condition
    let reader = open_input(&args.input)
        .await
        .with_context(|| format!("opening frame source {}", args.input))?;
    let mut feed = LandmarkFeed::new(reader);

    let mut controller = build_controller(&settings)?;

    let exit = run_frames(
        &mut feed,
        &mut controller,
        &settings,
        args.emit_frames,
        tokio::signal::ctrl_c(),
    )
    .await?;

    if exit == LoopExit::Interrupted {
        // stdin is read on a blocking thread that runtime shutdown would wait on
        std::process::exit(0);
    }
    Ok(())
}

/// Why the frame loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Interrupted,
    QuitKey,
    FeedEnded,
}

async fn run_frames<R, S>(
    feed: &mut LandmarkFeed<R>,
    controller: &mut FrameController,
    settings: &Settings,
    emit_frames: bool,
    shutdown: S,
) -> Result<LoopExit>
where
    R: AsyncBufRead + Unpin,
    S: Future,
{
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                return Ok(LoopExit::Interrupted);
            }
            next = feed.next_frame() => next,
        };

        let record = match next {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("frame feed ended");
                return Ok(LoopExit::FeedEnded);
            }
            Err(FeedError::Io(e)) => return Err(e).context("reading frame feed"),
            Err(e) => {
                warn!(error = %e, "skipping frame");
                continue;
            }
        };

        if record.is_quit() {
            info!("quit requested");
            return Ok(LoopExit::QuitKey);
        }

        let input = FrameInput {
            frame_width: record.width.unwrap_or(settings.frame_width),
            frame_height: record.height.unwrap_or(settings.frame_height),
            key: record.key,
            hand: record.hands.into_iter().next(),
        };
        let report = controller.process_frame(input);

        if emit_frames {
            let mut out = std::io::stdout().lock();
            serde_json::to_writer(&mut out, &report)?;
            writeln!(out)?;
        }
    }
}

async fn open_input(input: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(input).await?;
    Ok(Box::new(BufReader::new(file)))
}

fn build_controller(settings: &Settings) -> Result<FrameController> {
    let registry = DeviceRegistry::new(settings.devices.clone());
    if registry.is_empty() {
        warn!("no devices configured, the device menu will be empty");
    }
    for device in registry.iter() {
        info!(%device, capabilities = ?device.capabilities, "registered device");
    }
    info!(count = registry.len(), "device registry ready");

    let transport: Arc<dyn DeviceTransport> = if settings.dry_run {
        Arc::new(DryRunTransport)
    } else {
        Arc::new(HttpTransport::new(settings.dispatch_timeout()).context("building HTTP client")?)
    };
    let dispatcher = CommandDispatcher::new(transport, settings.dispatch_timeout());

    let pose_classifier = load_classifier(&settings.keypoint_dataset(), HAND_LANDMARK_COUNT * 2);
    let trajectory_classifier =
        load_classifier(&settings.point_history_dataset(), settings.history_length * 2);

    let pose_labels = load_labels(&settings.keypoint_labels(), &DEFAULT_POSE_LABELS);
    let trajectory_labels =
        load_labels(&settings.point_history_labels(), &DEFAULT_TRAJECTORY_LABELS);

    Ok(FrameController::new(
        registry,
        dispatcher,
        pose_classifier,
        trajectory_classifier,
        settings.history_length,
    )
    .with_labels(pose_labels, trajectory_labels)
    .with_dataset_logger(DatasetLogger::new(
        settings.keypoint_dataset(),
        settings.point_history_dataset(),
    )))
}

fn load_classifier(dataset: &Path, feature_len: usize) -> Box<dyn Classifier> {
    match CentroidClassifier::from_csv(dataset, feature_len) {
        Ok(classifier) => {
            info!(
                path = %dataset.display(),
                classes = classifier.classes().count(),
                "classifier loaded"
            );
            Box::new(classifier)
        }
        Err(e) => {
            warn!(error = %e, "no classifier, every frame will be class 0");
            Box::new(FixedClassifier(0))
        }
    }
}

fn load_labels(path: &Path, defaults: &[&str]) -> LabelSet {
    if !path.exists() {
        return LabelSet::new(defaults.iter().copied());
    }
    match LabelSet::from_csv(path) {
        Ok(labels) if !labels.is_empty() => {
            info!(path = %path.display(), count = labels.len(), "labels loaded");
            labels
        }
        Ok(_) => LabelSet::new(defaults.iter().copied()),
        Err(e) => {
            warn!(error = %e, "using built-in labels");
            LabelSet::new(defaults.iter().copied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quiet_controller() -> FrameController {
        let dispatcher =
            CommandDispatcher::new(Arc::new(DryRunTransport), Duration::from_millis(50));
        FrameController::new(
            DeviceRegistry::new(Settings::default().devices),
            dispatcher,
            Box::new(FixedClassifier(0)),
            Box::new(FixedClassifier(0)),
            tracking::HISTORY_LENGTH,
        )
    }

    #[tokio::test]
    async fn interrupt_stops_loop_while_feed_is_idle() {
        // writer half stays open so the feed never yields a line
        let (_writer, reader) = tokio::io::duplex(64);
        let mut feed = LandmarkFeed::new(BufReader::new(reader));
        let mut controller = quiet_controller();

        let exit = tokio::time::timeout(
            Duration::from_secs(1),
            run_frames(
                &mut feed,
                &mut controller,
                &Settings::default(),
                false,
                tokio::time::sleep(Duration::from_millis(10)),
            ),
        )
        .await
        .expect("loop returned")
        .expect("no feed error");
        assert_eq!(exit, LoopExit::Interrupted);
    }

    #[tokio::test]
    async fn quit_key_and_end_of_feed_stop_loop() {
        let input = "{\"hands\": []}\nnot json\n{\"key\": \"q\"}\n{\"hands\": []}\n";
        let mut feed = LandmarkFeed::new(BufReader::new(input.as_bytes()));
        let mut controller = quiet_controller();
        let settings = Settings::default();

        let exit = run_frames(
            &mut feed,
            &mut controller,
            &settings,
            false,
            std::future::pending::<()>(),
        )
        .await
        .expect("loop");
        assert_eq!(exit, LoopExit::QuitKey);

        let exit = run_frames(
            &mut feed,
            &mut controller,
            &settings,
            false,
            std::future::pending::<()>(),
        )
        .await
        .expect("loop");
        assert_eq!(exit, LoopExit::FeedEnded);
    }
}

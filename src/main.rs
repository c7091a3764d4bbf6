use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pose_tracker_rs::mailbox::{frame_mailbox, FrameMailbox, FrameWait};
use pose_tracker_rs::pipeline::{PipelineEvent, PosePipeline};
use pose_tracker_rs::types::{JointFrame, PoseRecord, RecordedFrame};
use pose_tracker_rs::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "pose_tracker")]
#[command(about = "Replay a recorded keypoint stream through the pose pipeline", long_about = None)]
struct Args {
    /// Recorded frames, JSON or .json.gz
    #[arg(long)]
    input: PathBuf,

    /// Pipeline configuration (JSON); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output file; a .gz suffix compresses it
    #[arg(long, default_value = "pose_output.json")]
    output: PathBuf,

    /// Replay rate in frames per second
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Override calibration.timeout_secs
    #[arg(long)]
    calibration_timeout: Option<f64>,

    /// Drive the target in absolute coordinates (no transfer rotations)
    #[arg(long, default_value_t = false)]
    absolute: bool,

    /// Abort on the first per-joint or per-bone failure
    #[arg(long, default_value_t = false)]
    strict: bool,
}

/// Either `{"frames": [...]}` or a bare array of frames.
#[derive(Deserialize)]
#[serde(untagged)]
enum Recording {
    Wrapped { frames: Vec<RecordedFrame> },
    Bare(Vec<RecordedFrame>),
}

impl Recording {
    fn into_frames(self) -> Vec<RecordedFrame> {
        match self {
            Recording::Wrapped { frames } | Recording::Bare(frames) => frames,
        }
    }
}

#[derive(Serialize, Default)]
struct Stats {
    frames_recorded: usize,
    frames_processed: u64,
    frames_dropped: u64,
    calibration_attempts: u32,
    calibration_divergence: f64,
    filter_fallbacks: usize,
    held_bones: usize,
}

#[derive(Serialize)]
struct ReplayOutput {
    generated_at: String,
    input: String,
    bones: Vec<String>,
    stats: Stats,
    frames: Vec<PoseRecord>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(args.fps.is_finite() && args.fps > 0.0) {
        bail!("--fps must be positive, got {}", args.fps);
    }

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(timeout) = args.calibration_timeout {
        config.calibration.timeout_secs = timeout;
    }
    config.reconstruction.use_absolute_coordinate |= args.absolute;
    config.strict |= args.strict;

    let recorded = load_recording(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let frames: Vec<JointFrame> = recorded
        .iter()
        .map(JointFrame::try_from)
        .collect::<Result<_, _>>()
        .context("decoding recorded frames")?;
    info!("[{}] Loaded {} frame(s) from {}", ts_now(), frames.len(), args.input.display());

    let pipeline = PosePipeline::new(config).context("building pipeline")?;
    let bones = pipeline.topology().bones().iter().map(|b| b.name.clone()).collect();
    let frames_recorded = frames.len();
    let period = Duration::from_secs_f64(1.0 / args.fps);

    // Producer paces the recording into the mailbox like a live source would
    let (publisher, mailbox) = frame_mailbox();
    let producer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        for frame in frames {
            ticker.tick().await;
            if publisher.publish(frame).is_err() {
                break;
            }
        }
    });

    let consumer = tokio::task::spawn_blocking(move || run_pipeline(pipeline, mailbox, period));
    let (records, mut stats) = consumer.await??;
    producer.await?;
    stats.frames_recorded = frames_recorded;

    info!(
        "[{}] Processed {} frame(s), dropped {}, {} filter fallback(s), {} held bone(s)",
        ts_now(),
        stats.frames_processed,
        stats.frames_dropped,
        stats.filter_fallbacks,
        stats.held_bones
    );

    let output = ReplayOutput {
        generated_at: Utc::now().to_rfc3339(),
        input: args.input.display().to_string(),
        bones,
        stats,
        frames: records,
    };
    write_output(&args.output, &output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("[{}] Wrote {}", ts_now(), args.output.display());
    Ok(())
}

/// Calibrates, then processes until the producer hangs up.
fn run_pipeline(
    mut pipeline: PosePipeline,
    mut mailbox: FrameMailbox,
    period: Duration,
) -> Result<(Vec<PoseRecord>, Stats)> {
    let mut stats = Stats::default();

    info!("[{}] Waiting for T-pose...", ts_now());
    if let PipelineEvent::Calibrated { attempts, divergence } = pipeline.calibrate(&mut mailbox)? {
        stats.calibration_attempts = attempts;
        stats.calibration_divergence = divergence;
    }

    let mut records = Vec::new();
    loop {
        match mailbox.wait_latest(period * 4) {
            FrameWait::Frame(frame) => {
                let output = pipeline.process(&frame)?;
                for event in &output.events {
                    match event {
                        PipelineEvent::JointFilterFallback { .. } => stats.filter_fallbacks += 1,
                        PipelineEvent::BoneHeld { .. } => stats.held_bones += 1,
                        other => warn!("unexpected event during replay: {:?}", other),
                    }
                }
                records.push(output.to_record(pipeline.topology()));
            }
            FrameWait::Timeout => continue,
            FrameWait::Closed => break,
        }
    }
    stats.frames_processed = pipeline.frames_processed();
    stats.frames_dropped = mailbox.discarded();
    Ok((records, stats))
}

fn load_recording(path: &Path) -> Result<Vec<RecordedFrame>> {
    let file = File::open(path)?;
    let recording: Recording = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(recording.into_frames())
}

fn write_output(path: &Path, output: &ReplayOutput) -> Result<()> {
    let file = File::create(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut gz, output)?;
        gz.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, output)?;
        writer.flush()?;
    }
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

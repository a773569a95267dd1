mod capture;
mod output;

use anyhow::{Context, Result};
use capture::{CaptureSource, ImageSequence};
use cblbsp::{BackgroundSubtractor, ModelFlags, SubtractorConfig};
use clap::Parser;
use output::{MaskDirectory, OutputSink};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of input frames, read in file name order
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Capture from this webcam device index instead of a directory
    #[cfg(feature = "webcam")]
    #[arg(long)]
    webcam: Option<u32>,

    /// Directory receiving one PNG mask per frame
    #[arg(short, long, default_value = "masks")]
    output: PathBuf,

    /// Run the single-channel model on grayscale frames
    #[arg(long)]
    grayscale: bool,

    /// Seed for the model's sampling (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Fixed color update period overriding the adaptive learning rate
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Base descriptor distance threshold per channel
    #[arg(long, default_value_t = 3)]
    desc_threshold: usize,

    /// Base color distance threshold per channel
    #[arg(long, default_value_t = 30)]
    color_threshold: usize,

    /// Local words per channel
    #[arg(long, default_value_t = 4.0)]
    local_words: f32,

    /// Global words per channel
    #[arg(long, default_value_t = 12.0)]
    global_words: f32,

    /// Disable the frame-wide dictionary
    #[arg(long)]
    no_global_words: bool,

    /// Save the reconstructed background image here when the input ends
    #[arg(long)]
    background: Option<PathBuf>,

    /// Target frames per second (0 = as fast as possible)
    #[arg(long, default_value_t = 0)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn subtractor_config(&self) -> SubtractorConfig {
        SubtractorConfig {
            desc_dist_threshold: self.desc_threshold,
            color_dist_threshold: self.color_threshold,
            local_words_per_channel: self.local_words,
            global_words_per_channel: self.global_words,
            seed: self.seed,
            flags: ModelFlags {
                global_words: !self.no_global_words,
                ..ModelFlags::default()
            },
            ..SubtractorConfig::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("cblbsp starting");
    tracing::info!(
        "Mode: {}",
        if args.grayscale { "grayscale" } else { "color" }
    );
    if args.fps > 0 {
        tracing::info!("Target FPS: {}", args.fps);
    }

    let mut model = BackgroundSubtractor::new(args.subtractor_config())
        .context("Invalid model configuration")?;

    #[cfg(feature = "webcam")]
    if let Some(index) = args.webcam {
        let mut capture = capture::WebcamCapture::new(index, args.grayscale)
            .context("Failed to initialize webcam capture")?;
        return run(&args, &mut capture, &mut model);
    }

    let input = args
        .input
        .as_ref()
        .context("No input given (use --input <dir>)")?;
    let mut capture = ImageSequence::open(input, args.grayscale)
        .context("Failed to open input frames")?;
    tracing::info!("Input: {} frames", capture.len());
    run(&args, &mut capture, &mut model)
}

fn run<C: CaptureSource>(args: &Args, capture: &mut C, model: &mut BackgroundSubtractor) -> Result<()> {
    let (width, height) = capture.resolution();
    let mut output =
        MaskDirectory::new(&args.output, width, height).context("Failed to initialize mask output")?;

    let frames = run_pipeline(capture, &mut output, model, args.fps, args.learning_rate)?;
    tracing::info!("Processed {} frames, wrote {} masks", frames, output.written());

    if let Some(path) = &args.background {
        let background = model
            .background_image()
            .context("No background model to save")?;
        background
            .save(path)
            .with_context(|| format!("Failed to save background to {}", path.display()))?;
        tracing::info!("Background image saved to {}", path.display());
    }
    Ok(())
}

fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    model: &mut BackgroundSubtractor,
    target_fps: u32,
    learning_rate: Option<f32>,
) -> Result<u64>
where
    C: CaptureSource,
    O: OutputSink,
{
    let frame_duration = (target_fps > 0).then(|| Duration::from_secs_f32(1.0 / target_fps as f32));
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;
    let mut foreground_pixels = 0u64;

    tracing::info!("Starting main pipeline loop");

    loop {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let Some(frame) = capture
            .capture_frame()
            .context("Failed to capture frame")?
        else {
            break;
        };
        total_capture_time += capture_start.elapsed();

        // Segmentation
        let segment_start = Instant::now();
        if !model.is_initialized() {
            model
                .initialize(&frame, None)
                .context("Failed to initialize background model")?;
        }
        let mask = model
            .apply(&frame, learning_rate)
            .context("Failed to segment frame")?;
        total_segment_time += segment_start.elapsed();
        foreground_pixels += mask.as_raw().iter().filter(|&&v| v != 0).count() as u64;

        // Output mask
        let output_start = Instant::now();
        output
            .write_frame(&mask)
            .context("Failed to write mask")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_segment_ms = total_segment_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_segment_ms + avg_output_ms;
            let actual_fps = 1000.0 / total_ms;
            let (width, height) = output.resolution();
            let fg_ratio =
                foreground_pixels as f64 / (frame_count * width as u64 * height as u64) as f64;

            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, fg={:.2}%",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_output_ms,
                total_ms,
                actual_fps,
                fg_ratio * 100.0
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }

    Ok(frame_count)
}

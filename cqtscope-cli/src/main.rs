mod audio;
mod output;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use cqtscope_core::listener::{BuildEvent, BuildListener};
use cqtscope_core::{CqtOptions, CqtRenderer, FrameSink, VIDEO_HEIGHT, VIDEO_WIDTH};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{PpmSink, RawSink};

/// Audio chunk size handed to the engine per call, in sample pairs. Any size
/// works; this mimics a typical host buffer.
const FEED_CHUNK: usize = 4096;

#[derive(Parser)]
#[command(name = "cqtscope", about = "Render a stereo WAV file as a CQT spectrum video")]
struct Cli {
    /// Input WAV file (stereo, 44100 or 48000 Hz)
    input: PathBuf,

    /// Output file for the raw RGB24 stream
    #[arg(short, long, default_value = "out.rgb")]
    output: PathBuf,

    /// Write numbered PPM images into this directory instead of a raw stream
    #[arg(long)]
    ppm_dir: Option<PathBuf>,

    /// Bar amplitude scale
    #[arg(long, default_value_t = 16.0)]
    volume: f64,

    /// Maximum analysis window length in seconds
    #[arg(long, default_value_t = 0.17)]
    timeclamp: f64,

    /// Kernel sparsification tolerance multiplier
    #[arg(long, default_value_t = 1.0)]
    coeffclamp: f32,

    /// Display gamma
    #[arg(long, default_value_t = 3.0)]
    gamma: f32,

    /// Output frame rate
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Transforms per output frame
    #[arg(long, default_value_t = 6)]
    count: u32,
}

/// Progress bar over the 1920 kernel columns.
struct KernelProgress {
    pb: ProgressBar,
}

impl KernelProgress {
    fn new() -> Self {
        let pb = ProgressBar::new(VIDEO_WIDTH as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} Designing kernels [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );
        Self { pb }
    }
}

impl BuildListener for KernelProgress {
    fn on_event(&mut self, event: BuildEvent) {
        match event {
            BuildEvent::Started { columns, .. } => self.pb.set_length(columns as u64),
            BuildEvent::ColumnDone { .. } => self.pb.inc(1),
            BuildEvent::Finished { fft_len, coefficients } => self
                .pb
                .finish_with_message(format!("fft_len={fft_len}, coefficients={coefficients}")),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = CqtOptions {
        volume: cli.volume,
        time_clamp: cli.timeclamp,
        coeff_clamp: cli.coeffclamp,
        gamma: cli.gamma,
        fps: cli.fps,
        count: cli.count,
    };

    // 1. Read input audio
    eprintln!("Reading {}", cli.input.display());
    let (samples, rate) = audio::read_wav(&cli.input)?;
    let pairs = samples.len() / 2;
    eprintln!(
        "  {} samples, {:.1}s, {} Hz, stereo",
        pairs,
        pairs as f64 / rate as f64,
        rate
    );

    // 2. Build the engine (designs the spectral kernel table)
    let start = Instant::now();
    let mut progress = KernelProgress::new();
    let mut renderer = CqtRenderer::with_listener(opts, rate, &mut progress)
        .context("Failed to initialize the CQT engine")?;
    eprintln!(
        "  kernels ready in {:.2}s (fft_len={}, step={})",
        start.elapsed().as_secs_f64(),
        renderer.fft_len(),
        renderer.step()
    );

    // 3. Render
    let frames = match cli.ppm_dir {
        Some(dir) => {
            let sink = PpmSink::create(dir.clone())?;
            let frames = render(&mut renderer, &samples, sink, |_| Ok(()))?;
            eprintln!("Wrote {} PPM frames to {}", frames, dir.display());
            frames
        }
        None => {
            let sink = RawSink::create(&cli.output)?;
            let frames = render(&mut renderer, &samples, sink, RawSink::finish)?;
            eprintln!(
                "Wrote {} frames ({}x{} rgb24) to {}",
                frames,
                VIDEO_WIDTH,
                VIDEO_HEIGHT,
                cli.output.display()
            );
            eprintln!(
                "Encode with: ffmpeg -f rawvideo -pix_fmt rgb24 -s {}x{} -r {} -i {} out.mp4",
                VIDEO_WIDTH,
                VIDEO_HEIGHT,
                cli.fps,
                cli.output.display()
            );
            frames
        }
    };

    if frames == 0 {
        eprintln!("Input shorter than half an analysis window; no frames produced");
    }
    Ok(())
}

/// Feed the whole stream through the renderer in host-sized chunks, drain,
/// and close the sink.
fn render<S: FrameSink>(
    renderer: &mut CqtRenderer,
    samples: &[f32],
    mut sink: S,
    close: impl FnOnce(S) -> Result<()>,
) -> Result<i64> {
    for chunk in samples.chunks(2 * FEED_CHUNK) {
        renderer.feed(chunk, &mut sink)?;
    }
    renderer.finish(&mut sink)?;
    close(sink)?;
    Ok(renderer.frames_emitted())
}

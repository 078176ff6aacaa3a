use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::dsp::dual_fft;
use crate::dsp::kernel::{self, SparseCoeff};
use crate::listener::{BuildListener, NoOpListener};
use crate::render::frame::{Column, FrameAssembler};

pub mod dsp;
pub mod error;
pub mod listener;
pub mod render;

pub use error::{CqtError, Result, SinkError};
pub use render::font::{GlyphProvider, NoteFont};

/// One output column per horizontal pixel: 16 bins/semitone, 12
/// semitones/octave, 10 octaves.
pub const VIDEO_WIDTH: usize = 1920;
pub const VIDEO_HEIGHT: usize = 1080;
pub const FONT_HEIGHT: usize = 32;
pub const SPECTROGRAM_HEIGHT: usize = (VIDEO_HEIGHT - FONT_HEIGHT) / 2;
pub const SPECTROGRAM_START: usize = VIDEO_HEIGHT - SPECTROGRAM_HEIGHT;

/// Sample rates the engine accepts. Both divide evenly by the supported
/// `fps * count` grid; anything else is rejected at build time.
pub const SUPPORTED_RATES: [u32; 2] = [44100, 48000];

/// Rendering options. Set once before building a renderer; immutable after.
#[derive(Debug, Clone)]
pub struct CqtOptions {
    /// Bar amplitude scale.
    pub volume: f64,
    /// Maximum analysis window length in seconds. Lower is time-accurate,
    /// higher is frequency-accurate at the low end.
    pub time_clamp: f64,
    /// Kernel sparsification tolerance multiplier. Lower is more precise,
    /// higher is faster.
    pub coeff_clamp: f32,
    /// Display gamma. Lower is more contrast, higher is more range.
    pub gamma: f32,
    /// Output frame rate.
    pub fps: u32,
    /// Transforms per output frame; `fps * count` is the evaluation rate.
    pub count: u32,
}

impl Default for CqtOptions {
    fn default() -> Self {
        Self {
            volume: 16.0,
            time_clamp: 0.17,
            coeff_clamp: 1.0,
            gamma: 3.0,
            fps: 25,
            count: 6,
        }
    }
}

impl CqtOptions {
    fn validate(&self) -> Result<()> {
        if !(0.1..=100.0).contains(&self.volume) {
            return Err(CqtError::Config(format!("volume {} out of range [0.1, 100]", self.volume)));
        }
        if !(0.1..=1.0).contains(&self.time_clamp) {
            return Err(CqtError::Config(format!(
                "time_clamp {} out of range [0.1, 1.0]",
                self.time_clamp
            )));
        }
        if !(0.1..=10.0).contains(&self.coeff_clamp) {
            return Err(CqtError::Config(format!(
                "coeff_clamp {} out of range [0.1, 10]",
                self.coeff_clamp
            )));
        }
        if !(1.0..=7.0).contains(&self.gamma) {
            return Err(CqtError::Config(format!("gamma {} out of range [1, 7]", self.gamma)));
        }
        if !(10..=100).contains(&self.fps) {
            return Err(CqtError::Config(format!("fps {} out of range [10, 100]", self.fps)));
        }
        if !(1..=30).contains(&self.count) {
            return Err(CqtError::Config(format!("count {} out of range [1, 30]", self.count)));
        }
        Ok(())
    }
}

/// One rendered 1920x1080 RGB24 frame. Rows are contiguous with a stride of
/// `VIDEO_WIDTH * 3`; `pts` counts frames, in units of `1/fps` seconds.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts: i64,
    pub data: Vec<u8>,
}

/// Consumer of rendered frames. Errors are propagated out of
/// [`CqtRenderer::feed`] / [`CqtRenderer::finish`] verbatim, wrapped in
/// [`CqtError::Sink`].
pub trait FrameSink {
    fn consume(&mut self, frame: &VideoFrame) -> std::result::Result<(), SinkError>;
}

/// Collecting sink for tests and small offline runs.
impl FrameSink for Vec<VideoFrame> {
    fn consume(&mut self, frame: &VideoFrame) -> std::result::Result<(), SinkError> {
        self.push(frame.clone());
        Ok(())
    }
}

/// Scheduler lifecycle. Frames are only ever emitted in `Running` and
/// `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// The first half-window of samples has not yet arrived.
    Priming,
    /// Evaluations fire every `step` samples.
    Running,
    /// EOF seen; the window is being flushed with zero padding.
    Draining,
    /// The tail has fully exited the window.
    Done,
}

/// The constant-Q spectrum renderer.
///
/// Single-threaded and push-driven: the host feeds interleaved stereo f32
/// buffers of any size and receives frames through its [`FrameSink`] at
/// exactly `fps` frames per second of audio time.
pub struct CqtRenderer {
    opts: CqtOptions,
    fft_len: usize,
    step: usize,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    kernels: Vec<Vec<SparseCoeff>>,
    /// Input ring: left samples in the real part, right in the imaginary.
    ring: Vec<Complex<f32>>,
    remaining_fill: usize,
    work: Vec<Complex<f32>>,
    left: Vec<Complex<f32>>,
    right: Vec<Complex<f32>>,
    columns: Vec<Column>,
    assembler: FrameAssembler,
    state: EngineState,
}

impl CqtRenderer {
    /// Build a renderer with the built-in note font and no progress listener.
    pub fn new(opts: CqtOptions, rate: u32) -> Result<Self> {
        Self::build(opts, rate, &NoteFont, &mut NoOpListener)
    }

    /// Build a renderer, reporting kernel-design progress to `listener`.
    pub fn with_listener(
        opts: CqtOptions,
        rate: u32,
        listener: &mut impl BuildListener,
    ) -> Result<Self> {
        Self::build(opts, rate, &NoteFont, listener)
    }

    pub fn build(
        opts: CqtOptions,
        rate: u32,
        font: &impl GlyphProvider,
        listener: &mut impl BuildListener,
    ) -> Result<Self> {
        opts.validate()?;
        if !SUPPORTED_RATES.contains(&rate) {
            return Err(CqtError::Format(format!(
                "sample rate {} not supported (expected one of {:?})",
                rate, SUPPORTED_RATES
            )));
        }
        let per_frame = opts.fps * opts.count;
        if rate % per_frame != 0 {
            return Err(CqtError::Config(format!(
                "sample rate {} is not divisible by fps*count ({}*{})",
                rate, opts.fps, opts.count
            )));
        }
        let step = (rate / per_frame) as usize;

        let fft_bits = (rate as f64 * opts.time_clamp).log2().ceil() as u32;
        let fft_len = 1usize << fft_bits;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);
        let zero = Complex::new(0.0f32, 0.0);
        let mut scratch =
            error::try_alloc(fft.get_inplace_scratch_len(), zero, "FFT scratch")?;

        let kernels = kernel::design_kernels(rate, &opts, fft.as_ref(), &mut scratch, listener)?;
        let assembler = FrameAssembler::new(opts.count as usize, font)?;

        Ok(Self {
            opts,
            fft_len,
            step,
            fft,
            scratch,
            kernels,
            ring: error::try_alloc(fft_len, zero, "input ring")?,
            remaining_fill: fft_len / 2,
            work: error::try_alloc(fft_len, zero, "FFT work buffer")?,
            left: error::try_alloc(fft_len, zero, "left spectrum")?,
            right: error::try_alloc(fft_len, zero, "right spectrum")?,
            columns: vec![Column::default(); VIDEO_WIDTH],
            assembler,
            state: EngineState::Priming,
        })
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Sample advance between consecutive evaluations: `rate / (fps * count)`.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of frames handed to sinks so far; also the next frame's PTS.
    pub fn frames_emitted(&self) -> i64 {
        self.assembler.frames_emitted()
    }

    /// Feed interleaved stereo samples (`[l0, r0, l1, r1, ...]`), firing an
    /// evaluation each time `step` new sample pairs complete the window.
    pub fn feed(&mut self, samples: &[f32], sink: &mut impl FrameSink) -> Result<()> {
        debug_assert_eq!(samples.len() % 2, 0, "samples must be interleaved stereo");
        debug_assert!(self.state != EngineState::Done, "feed after finish");

        let total = samples.len() / 2;
        let mut consumed = 0;
        while consumed < total {
            let n = self.remaining_fill.min(total - consumed);
            let base = self.fft_len - self.remaining_fill;
            for m in 0..n {
                let pair = &samples[2 * (consumed + m)..];
                self.ring[base + m] = Complex::new(pair[0], pair[1]);
            }
            consumed += n;
            self.remaining_fill -= n;

            if self.remaining_fill == 0 {
                self.evaluate(sink)?;
                self.ring.copy_within(self.step.., 0);
                self.remaining_fill = self.step;
            }
        }
        Ok(())
    }

    /// Signal end of stream: zero-pad and keep evaluating until the last real
    /// sample has scrolled out of the window, then enter `Done`.
    pub fn finish(&mut self, sink: &mut impl FrameSink) -> Result<()> {
        if self.state == EngineState::Done {
            return Ok(());
        }
        self.state = EngineState::Draining;
        let hlen = self.fft_len / 2;
        while self.remaining_fill < hlen {
            let base = self.fft_len - self.remaining_fill;
            self.ring[base..].fill(Complex::new(0.0, 0.0));
            self.evaluate(sink)?;
            self.ring.copy_within(self.step.., 0);
            self.remaining_fill += self.step;
        }
        self.state = EngineState::Done;
        Ok(())
    }

    /// One CQT evaluation over the current window contents.
    fn evaluate(&mut self, sink: &mut impl FrameSink) -> Result<()> {
        if self.state == EngineState::Priming {
            self.state = EngineState::Running;
        }

        self.work.copy_from_slice(&self.ring);
        self.fft.process_with_scratch(&mut self.work, &mut self.scratch);
        dual_fft::unpack_stereo(&self.work, &mut self.left, &mut self.right);

        let g = 1.0 / self.opts.gamma;
        for (x, kernel) in self.kernels.iter().enumerate() {
            let mut l = Complex::new(0.0f32, 0.0);
            let mut r = Complex::new(0.0f32, 0.0);
            for c in kernel {
                let bin = c.index as usize;
                l.re += c.value * self.left[bin].re;
                l.im += c.value * self.left[bin].im;
                r.re += c.value * self.right[bin].re;
                r.im += c.value * self.right[bin].im;
            }
            let pl = l.re * l.re + l.im * l.im;
            let pr = r.re * r.re + r.im * r.im;
            let pm = 0.5 * (pl + pr);
            self.columns[x] = Column {
                r: 255.0 * pl.min(1.0).powf(g),
                g: 255.0 * pm.min(1.0).powf(g),
                b: 255.0 * pr.min(1.0).powf(g),
                height: pm,
            };
        }

        self.assembler.push(&self.columns, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        CqtOptions::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        let cases = [
            CqtOptions { volume: 0.0, ..Default::default() },
            CqtOptions { volume: 101.0, ..Default::default() },
            CqtOptions { time_clamp: 0.05, ..Default::default() },
            CqtOptions { time_clamp: 1.5, ..Default::default() },
            CqtOptions { coeff_clamp: 11.0, ..Default::default() },
            CqtOptions { gamma: 0.5, ..Default::default() },
            CqtOptions { gamma: 8.0, ..Default::default() },
            CqtOptions { fps: 9, ..Default::default() },
            CqtOptions { fps: 101, ..Default::default() },
            CqtOptions { count: 0, ..Default::default() },
            CqtOptions { count: 31, ..Default::default() },
        ];
        for opts in cases {
            assert!(
                matches!(opts.validate(), Err(CqtError::Config(_))),
                "accepted {:?}",
                opts
            );
        }
    }

    #[test]
    fn spectrogram_geometry_adds_up() {
        assert_eq!(SPECTROGRAM_HEIGHT, 524);
        assert_eq!(SPECTROGRAM_START, 556);
        assert_eq!(SPECTROGRAM_HEIGHT + FONT_HEIGHT + SPECTROGRAM_HEIGHT, VIDEO_HEIGHT);
    }
}

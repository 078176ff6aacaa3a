//! Frame assembly: bar plot, note legend, and scrolling spectrogram history.

use crate::error::{try_alloc, Result};
use crate::render::font::GlyphProvider;
use crate::{
    CqtError, FrameSink, VideoFrame, FONT_HEIGHT, SPECTROGRAM_HEIGHT, SPECTROGRAM_START,
    VIDEO_WIDTH,
};

/// Note letters across one octave; spaces stand in for the sharps.
const OCTAVE_LABELS: &[u8; 12] = b"EF G A BC D ";

/// Pixels per octave in the legend band.
const OCTAVE_WIDTH: usize = VIDEO_WIDTH / 10;

/// One column's evaluated output: gamma-corrected color components in
/// `[0, 255]` and the raw mid power driving the bar height.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Column {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub height: f32,
}

/// Accumulates per-evaluation column data and emits one video frame every
/// `count` evaluations.
pub(crate) struct FrameAssembler {
    count: usize,
    spec_count: usize,
    spec_index: usize,
    frame_count: i64,
    spectrogram: Vec<u8>,
    legend: Vec<u8>,
    rcp: Vec<f32>,
    frame: VideoFrame,
}

impl FrameAssembler {
    pub(crate) fn new(count: usize, font: &impl GlyphProvider) -> Result<Self> {
        let row_bytes = VIDEO_WIDTH * 3;
        Ok(Self {
            count,
            // Gate so the first frame fires on the count-th evaluation.
            spec_count: 1 % count,
            spec_index: 0,
            frame_count: 0,
            spectrogram: try_alloc(SPECTROGRAM_HEIGHT * row_bytes, 0u8, "spectrogram history")?,
            legend: build_legend(font)?,
            rcp: vec![0.0; VIDEO_WIDTH],
            frame: VideoFrame {
                pts: 0,
                data: try_alloc(crate::VIDEO_HEIGHT * row_bytes, 0u8, "frame buffer")?,
            },
        })
    }

    pub(crate) fn frames_emitted(&self) -> i64 {
        self.frame_count
    }

    /// Record one evaluation's columns; emits a frame when the gate opens.
    pub(crate) fn push<S: FrameSink>(&mut self, columns: &[Column], sink: &mut S) -> Result<()> {
        let row_bytes = VIDEO_WIDTH * 3;
        let row = &mut self.spectrogram[self.spec_index * row_bytes..][..row_bytes];
        for (px, col) in row.chunks_exact_mut(3).zip(columns) {
            px[0] = (col.r + 0.5) as u8;
            px[1] = (col.g + 0.5) as u8;
            px[2] = (col.b + 0.5) as u8;
        }

        if self.spec_count == 0 {
            self.render_frame(columns);
            self.frame.pts = self.frame_count;
            sink.consume(&self.frame).map_err(CqtError::Sink)?;
            self.frame_count += 1;
        }

        self.spec_count = (self.spec_count + 1) % self.count;
        // Newest row moves up.
        self.spec_index = (self.spec_index + SPECTROGRAM_HEIGHT - 1) % SPECTROGRAM_HEIGHT;
        Ok(())
    }

    fn render_frame(&mut self, columns: &[Column]) {
        let row_bytes = VIDEO_WIDTH * 3;
        for (rcp, col) in self.rcp.iter_mut().zip(columns) {
            *rcp = 1.0 / (col.height + 1.0e-4);
        }

        // Bars: a column is lit from the bottom up to its mid power, the top
        // fading toward the column color by how far the power overshoots the
        // row threshold.
        for y in 0..SPECTROGRAM_HEIGHT {
            let threshold = (SPECTROGRAM_HEIGHT - y) as f32 * (1.0 / SPECTROGRAM_HEIGHT as f32);
            let line = &mut self.frame.data[y * row_bytes..][..row_bytes];
            for ((px, col), rcp) in line.chunks_exact_mut(3).zip(columns).zip(&self.rcp) {
                if col.height <= threshold {
                    px[0] = 0;
                    px[1] = 0;
                    px[2] = 0;
                } else {
                    let mul = (col.height - threshold) * rcp;
                    px[0] = (mul * col.r + 0.5) as u8;
                    px[1] = (mul * col.g + 0.5) as u8;
                    px[2] = (mul * col.b + 0.5) as u8;
                }
            }
        }

        // Legend band is static, precomputed at init.
        self.frame.data[SPECTROGRAM_HEIGHT * row_bytes..SPECTROGRAM_START * row_bytes]
            .copy_from_slice(&self.legend);

        // Spectrogram history, newest row first: two contiguous copies around
        // the ring seam.
        let dst = &mut self.frame.data[SPECTROGRAM_START * row_bytes..];
        let tail = &self.spectrogram[self.spec_index * row_bytes..];
        dst[..tail.len()].copy_from_slice(tail);
        dst[tail.len()..].copy_from_slice(&self.spectrogram[..self.spec_index * row_bytes]);
    }
}

/// Per-column legend intensity: one sine-squared arch spanning the octave
/// of A4, zero elsewhere.
fn build_palette() -> [u8; VIDEO_WIDTH] {
    const LO: usize = (12 * 3 + 8) * 16;
    const HI: usize = (12 * 4 + 8) * 16;
    let mut palette = [0u8; VIDEO_WIDTH];
    for x in LO..HI {
        let fx = (x - LO) as f32 * (1.0 / (HI - LO) as f32);
        let sv = (std::f32::consts::PI * fx).sin();
        palette[x] = (sv * sv * 255.0 + 0.5) as u8;
    }
    palette
}

/// Render the 32-row legend band once: palette-tinted background with the
/// note letters tiled across all ten octaves, each glyph stretched 2x.
fn build_legend(font: &impl GlyphProvider) -> Result<Vec<u8>> {
    let row_bytes = VIDEO_WIDTH * 3;
    let palette = build_palette();
    let mut band = try_alloc(FONT_HEIGHT * row_bytes, 0u8, "legend band")?;

    for y in 0..FONT_HEIGHT {
        for x in 0..VIDEO_WIDTH {
            let px = &mut band[y * row_bytes + x * 3..][..3];
            px[0] = palette[x];
            px[2] = palette[x];
        }
    }

    for x0 in (0..VIDEO_WIDTH).step_by(OCTAVE_WIDTH) {
        for (u, &ch) in OCTAVE_LABELS.iter().enumerate() {
            let glyph = font.glyph(ch);
            for (v, &bits) in glyph.iter().enumerate() {
                for bit in 0..8 {
                    if bits & (0x80 >> bit) == 0 {
                        continue;
                    }
                    let x = x0 + 16 * u + 2 * bit;
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let px = &mut band[(2 * v + dy) * row_bytes + (x + dx) * 3..][..3];
                            px[0] = 255 - palette[x + dx];
                            px[1] = 0;
                            px[2] = palette[x + dx];
                        }
                    }
                }
            }
        }
    }
    Ok(band)
}

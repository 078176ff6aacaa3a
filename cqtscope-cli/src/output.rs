use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cqtscope_core::{FrameSink, SinkError, VideoFrame, VIDEO_HEIGHT, VIDEO_WIDTH};

/// Writes frames as one concatenated raw RGB24 stream, ready for
/// `ffmpeg -f rawvideo`.
pub struct RawSink {
    writer: BufWriter<File>,
}

impl RawSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output file")
    }
}

impl FrameSink for RawSink {
    fn consume(&mut self, frame: &VideoFrame) -> std::result::Result<(), SinkError> {
        self.writer.write_all(&frame.data)?;
        Ok(())
    }
}

/// Writes each frame as a numbered binary PPM image.
pub struct PpmSink {
    dir: PathBuf,
}

impl PpmSink {
    pub fn create(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        Ok(Self { dir })
    }
}

impl FrameSink for PpmSink {
    fn consume(&mut self, frame: &VideoFrame) -> std::result::Result<(), SinkError> {
        let path = self.dir.join(format!("frame{:06}.ppm", frame.pts));
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "P6\n{} {}\n255\n", VIDEO_WIDTH, VIDEO_HEIGHT)?;
        writer.write_all(&frame.data)?;
        writer.flush()?;
        Ok(())
    }
}

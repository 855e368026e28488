use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc::{self, TryRecvError};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use image::{ImageReader, RgbaImage};
use tiny_skia::Pixmap;

use crate::background::remove_background;
use crate::compositor::pixmap_from_rgba;

/// Reads only the image header.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .into_dimensions()
        .context("failed to read image dimensions")
}

pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .decode()
        .context("failed to decode image")?;
    Ok(image.to_rgba8())
}

pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    decode_rgba(&bytes).with_context(|| format!("failed to decode image {}", path.display()))
}

/// Turns encoded bytes into a drawable bitmap, optionally stripping the
/// background on the way.
pub fn prepare_bitmap(bytes: &[u8], strip_background: bool) -> Result<Pixmap> {
    let mut rgba = decode_rgba(bytes)?;
    if strip_background {
        rgba = remove_background(&rgba);
    }
    pixmap_from_rgba(&rgba)
}

/// A bitmap decode running on its own thread.
///
/// The session never blocks on it: [`DecodeJob::try_finish`] is the completion
/// signal and is polled from the event loop.
pub struct DecodeJob {
    receiver: mpsc::Receiver<Result<Pixmap>>,
    worker: Option<JoinHandle<()>>,
}

impl DecodeJob {
    pub fn spawn(bytes: Vec<u8>, strip_background: bool) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Result<Pixmap>>(1);

        let worker = thread::Builder::new()
            .name("chequemark-decoder".to_owned())
            .spawn(move || {
                let result = prepare_bitmap(&bytes, strip_background);
                // The receiver is gone when the element was removed mid-decode.
                let _ = sender.send(result);
            })
            .context("failed to spawn decoder thread")?;

        Ok(Self {
            receiver,
            worker: Some(worker),
        })
    }

    /// `None` while the decode is still running.
    pub fn try_finish(&mut self) -> Option<Result<Pixmap>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.join_worker();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join_worker();
                Some(Err(anyhow!("decoder thread exited without a result")))
            }
        }
    }

    pub fn wait(&mut self) -> Result<Pixmap> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| anyhow!("decoder thread exited without a result"));
        self.join_worker();
        result?
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::warn!("decoder thread panicked");
            }
        }
    }
}

//! In-memory service doubles for unit tests

use crate::{
    error::{PipelineError, Result},
    services::{fetch::ImageFetcher, io::ImageIOService, matting::BackgroundRemover},
};
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Encode a solid-color RGB PNG
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)));
    ImageIOService::encode_png(&image).unwrap()
}

/// Fetcher serving fixed payloads by URL
#[derive(Default)]
pub struct StubFetcher {
    payloads: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.payloads.insert(url.to_string(), bytes);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for StubFetcher {
    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .get(locator)
            .cloned()
            .ok_or_else(|| PipelineError::fetch(locator, "HTTP 404 Not Found"))
    }

    async fn fetch_to_file(&self, locator: &str, dest: &Path) -> Result<u64> {
        let bytes = self.fetch_bytes(locator).await?;
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Remover that makes the right half of every image transparent
#[derive(Default)]
pub struct StubRemover {
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Remover that answers only after `delay`
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundRemover for StubRemover {
    async fn remove_background(&self, image_bytes: Vec<u8>) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(PipelineError::transform("matting service unavailable"));
        }

        let source = ImageIOService::decode(&image_bytes)?.to_rgb8();
        let (width, height) = source.dimensions();
        let cutout = RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b] = source.get_pixel(x, y).0;
            let alpha = if x < width / 2 { 255 } else { 0 };
            Rgba([r, g, b, alpha])
        });

        ImageIOService::encode_png(&DynamicImage::ImageRgba8(cutout))
    }
}

//! OCR collaborator seam.
//!
//! Text extraction from images is not implemented yet; the pipeline only
//! requires that the stage be injectable so a real engine can replace the
//! stub without coordinator changes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Abstraction over image text extraction.
#[async_trait]
pub trait OcrProcessor: Send + Sync {
    /// Extract text from the given images. Infallible; empty on no text.
    async fn extract(&self, images: &[PathBuf]) -> String;
}

/// Placeholder processor: waits a fixed delay and extracts nothing.
pub struct StubOcrProcessor {
    delay: Duration,
}

impl StubOcrProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl OcrProcessor for StubOcrProcessor {
    async fn extract(&self, images: &[PathBuf]) -> String {
        debug!(images = images.len(), "OCR stub invoked");
        tokio::time::sleep(self.delay).await;
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_returns_empty_text() {
        let ocr = StubOcrProcessor::new(Duration::from_millis(1));
        let text = ocr.extract(&[PathBuf::from("scan.png")]).await;
        assert!(text.is_empty());
    }
}

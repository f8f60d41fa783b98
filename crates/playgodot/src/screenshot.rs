//! Screenshot capture and comparison against reference images.
//!
//! Capturing is done by the remote, which returns a base64 encoded PNG.
//! Comparing images is left to an [`ImageComparator`] supplied by the caller.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::godot::Godot;

/// Compares two encoded images.
pub trait ImageComparator {
    /// Similarity between `reference` and `actual`, from 0 (completely
    /// different) to 1 (identical).
    fn similarity(
        &self,
        reference: &[u8],
        actual: &[u8],
    ) -> std::result::Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> ImageComparator for F
where
    F: Fn(&[u8], &[u8]) -> std::result::Result<f64, Box<dyn std::error::Error + Send + Sync>>,
{
    fn similarity(
        &self,
        reference: &[u8],
        actual: &[u8],
    ) -> std::result::Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        self(reference, actual)
    }
}

impl Godot {
    /// Capture the viewport, or only the node at `node`, as PNG bytes.
    pub async fn screenshot(&self, node: Option<&str>) -> Result<Vec<u8>> {
        let params = node.map(|node| json!({ "node": node }));
        let result = self.client().call("screenshot", params).await?;

        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::unexpected("screenshot", "no image data"))?;
        let png = STANDARD
            .decode(data)
            .map_err(|e| Error::unexpected("screenshot", format!("invalid base64: {e}")))?;

        tracing::debug!(bytes = png.len(), ?node, "captured screenshot");
        Ok(png)
    }

    /// Capture a screenshot and write it to `path`.
    pub async fn screenshot_to(&self, path: impl AsRef<Path>, node: Option<&str>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let png = self.screenshot(node).await?;
        tokio::fs::write(path, &png).await.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(png)
    }

    /// Capture a screenshot and return its similarity to the image at
    /// `reference`.
    pub async fn compare_screenshot(
        &self,
        reference: impl AsRef<Path>,
        comparator: &impl ImageComparator,
    ) -> Result<f64> {
        let reference = reference.as_ref();
        let expected = match tokio::fs::read(reference).await {
            Ok(expected) => expected,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingReference(reference.to_path_buf()));
            }
            Err(source) => {
                return Err(Error::Io {
                    path: reference.to_path_buf(),
                    source,
                });
            }
        };

        let actual = self.screenshot(None).await?;
        comparator
            .similarity(&expected, &actual)
            .map_err(Error::Compare)
    }

    /// Fail unless a fresh screenshot is at least `threshold` similar to the
    /// image at `reference`. Returns the similarity.
    pub async fn assert_screenshot(
        &self,
        reference: impl AsRef<Path>,
        threshold: f64,
        comparator: &impl ImageComparator,
    ) -> Result<f64> {
        let reference = reference.as_ref();
        let similarity = self.compare_screenshot(reference, comparator).await?;
        if similarity < threshold {
            return Err(Error::ScreenshotMismatch {
                reference: reference.to_path_buf(),
                similarity,
                threshold,
            });
        }
        Ok(similarity)
    }
}

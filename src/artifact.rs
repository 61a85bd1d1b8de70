// Persists one generated payload, embedding provenance text when the format allows it.

use crate::metadata::{ArtifactMetadata, embed_png_text};
use image::ImageFormat;
use std::io;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
#[error("failed to write {file_name}: {source}")]
pub struct ArtifactError {
    pub file_name: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    embed_metadata: bool,
}

impl ArtifactWriter {
    pub fn new(embed_metadata: bool) -> Self {
        Self { embed_metadata }
    }

    /// Writes exactly one new file at `path`; an existing file is never replaced.
    ///
    /// Any failure on the metadata path falls back to writing `payload` as-is;
    /// only a failure of that raw write is returned.
    pub async fn write(
        &self,
        path: &Path,
        payload: &[u8],
        output_format: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ArtifactError> {
        if self.wants_metadata(payload, output_format, metadata) {
            match embed_png_text(payload, metadata) {
                Ok(embedded) => match write_new(path, &embedded).await {
                    Ok(()) => {
                        debug!("Wrote {} with embedded metadata", display_name(path));
                        return Ok(());
                    }
                    Err(e) => warn!(
                        "Writing {} with metadata failed, retrying raw: {}",
                        display_name(path),
                        e
                    ),
                },
                Err(e) => warn!(
                    "Metadata embedding skipped for {}: {}",
                    display_name(path),
                    e
                ),
            }
        }

        write_new(path, payload)
            .await
            .map_err(|source| ArtifactError {
                file_name: display_name(path),
                source,
            })?;
        debug!("Wrote {} ({} bytes)", display_name(path), payload.len());
        Ok(())
    }

    fn wants_metadata(
        &self,
        payload: &[u8],
        output_format: &str,
        metadata: &ArtifactMetadata,
    ) -> bool {
        self.embed_metadata
            && output_format.eq_ignore_ascii_case("png")
            && matches!(image::guess_format(payload), Ok(ImageFormat::Png))
            && !metadata.is_empty()
    }
}

/// Creates `path` (failing if it exists) and fills it. A file this call
/// created but could not fill is removed again.
async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let filled: io::Result<()> = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = filled {
        drop(file);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!("Cannot remove partial {}: {}", display_name(path), remove_err);
        }
        return Err(e);
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            title: Some("fluxim2 flux-dev".into()),
            comment: Some("hello".into()),
            ..Default::default()
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_png_gets_metadata_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let payload = png_bytes();

        ArtifactWriter::new(true)
            .write(&path, &payload, "png", &metadata())
            .await
            .unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_ne!(written, payload);
        assert!(contains(&written, b"tEXtComment\0hello"));
    }

    #[tokio::test]
    async fn test_raw_write_when_disabled_or_other_format() {
        let dir = tempfile::tempdir().unwrap();
        let payload = png_bytes();

        let disabled = dir.path().join("disabled.png");
        ArtifactWriter::new(false)
            .write(&disabled, &payload, "png", &metadata())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&disabled).unwrap(), payload);

        let webp = dir.path().join("other.webp");
        ArtifactWriter::new(true)
            .write(&webp, b"RIFF....WEBP", "webp", &metadata())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&webp).unwrap(), b"RIFF....WEBP");
    }

    #[tokio::test]
    async fn test_mislabelled_payload_is_written_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        let payload = b"\xff\xd8\xff\xe0 jpeg bytes".to_vec();

        ArtifactWriter::new(true)
            .write(&path, &payload, "png", &metadata())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_exact_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        let mut payload = png_bytes();
        payload.truncate(payload.len() - 5);

        ArtifactWriter::new(true)
            .write(&path, &payload, "png", &metadata())
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken.png");
        std::fs::write(&path, b"earlier artifact").unwrap();

        for embed in [false, true] {
            let err = ArtifactWriter::new(embed)
                .write(&path, &png_bytes(), "png", &metadata())
                .await
                .unwrap_err();
            assert_eq!(err.source.kind(), std::io::ErrorKind::AlreadyExists);
            assert_eq!(err.file_name, "taken.png");
            assert_eq!(std::fs::read(&path).unwrap(), b"earlier artifact");
        }
    }

    #[tokio::test]
    async fn test_io_error_when_raw_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.png");

        let err = ArtifactWriter::new(true)
            .write(&path, &png_bytes(), "png", &metadata())
            .await
            .unwrap_err();
        assert_eq!(err.file_name, "x.png");
        assert!(!path.exists());
    }
}

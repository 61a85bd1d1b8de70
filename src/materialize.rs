// Turns an upstream result into files in the output directory.

use crate::{
    artifact::{ArtifactError, ArtifactWriter},
    file_name::FileNameGenerator,
    metadata::ArtifactMetadata,
    registry::OutputShape,
    upstream::UpstreamOutput,
};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("upstream returned no image")]
    EmptyOutput,
    #[error(transparent)]
    Write(#[from] ArtifactError),
}

#[derive(Debug, Clone)]
pub struct Materializer {
    output_dir: PathBuf,
    names: FileNameGenerator,
    writer: ArtifactWriter,
}

impl Materializer {
    pub fn new(output_dir: PathBuf, names: FileNameGenerator, writer: ArtifactWriter) -> Self {
        Self {
            output_dir,
            names,
            writer,
        }
    }

    /// Writes the result and returns the generated file names in upstream order.
    ///
    /// Files written before a failure are left in place.
    pub async fn materialize(
        &self,
        shape: OutputShape,
        output: UpstreamOutput,
        output_format: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<Vec<String>, MaterializeError> {
        match shape {
            OutputShape::Multi => {
                self.materialize_multi(output.into_payloads(), output_format, metadata)
                    .await
            }
            OutputShape::Single => {
                let payload = match output {
                    UpstreamOutput::Single(payload) => payload,
                    // Single-shape models occasionally wrap their one image in a list.
                    UpstreamOutput::Multi(payloads) => payloads
                        .into_iter()
                        .next()
                        .ok_or(MaterializeError::EmptyOutput)?,
                };
                self.materialize_single(payload, output_format, metadata)
                    .await
            }
        }
    }

    async fn materialize_multi(
        &self,
        payloads: Vec<Vec<u8>>,
        output_format: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<Vec<String>, MaterializeError> {
        let mut file_names = Vec::with_capacity(payloads.len());
        for (index, payload) in payloads.iter().enumerate() {
            let file_name = self.names.make_file_name(Some(index), output_format);
            self.writer
                .write(
                    &self.output_dir.join(&file_name),
                    payload,
                    output_format,
                    metadata,
                )
                .await?;
            file_names.push(file_name);
        }
        debug!("Materialized {} file(s)", file_names.len());
        Ok(file_names)
    }

    async fn materialize_single(
        &self,
        payload: Vec<u8>,
        output_format: &str,
        metadata: &ArtifactMetadata,
    ) -> Result<Vec<String>, MaterializeError> {
        let file_name = self.names.make_file_name(None, output_format);
        self.writer
            .write(
                &self.output_dir.join(&file_name),
                &payload,
                output_format,
                metadata,
            )
            .await?;
        Ok(vec![file_name])
    }
}

//! Zip-backed archive builder.

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::traits::{ArchiveBuilder, NamedPayload};

/// Bundles named payloads into a single deflate-compressed zip buffer.
pub struct ZipArchiveBuilder;

#[async_trait]
impl ArchiveBuilder for ZipArchiveBuilder {
    async fn build(&self, payloads: &[NamedPayload]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for payload in payloads {
            writer
                .start_file(payload.name.as_str(), options)
                .with_context(|| format!("failed to add {} to archive", payload.name))?;
            writer
                .write_all(&payload.bytes)
                .with_context(|| format!("failed to write {} to archive", payload.name))?;
        }

        let cursor = writer.finish().context("failed to finalize archive")?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[tokio::test]
    async fn builds_a_readable_zip() {
        let payloads = vec![
            NamedPayload::new("manifest.json", b"{}".to_vec()),
            NamedPayload::new("controls.json", b"[1,2,3]".to_vec()),
        ];

        let bytes = ZipArchiveBuilder.build(&payloads).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut contents = String::new();
        archive
            .by_name("controls.json")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "[1,2,3]");
    }

    #[tokio::test]
    async fn empty_payload_list_builds_an_empty_archive() {
        let bytes = ZipArchiveBuilder.build(&[]).await.unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}

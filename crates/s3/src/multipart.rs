//! Streaming uploads
//!
//! Bytes are buffered up to the part size. Small objects are sent with a
//! single PUT on commit; anything larger becomes a multipart upload that is
//! completed on commit and aborted on abort.

use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use urio_core::{BlockingRuntime, Operation, Result, Target, WriteAdapter};

use crate::error::classify;

/// Default part size: 8 MiB
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Multipart upload configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Part size in bytes
    pub part_size: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }
}

/// Write adapter for one object
pub(crate) struct S3Writer {
    pub(crate) client: aws_sdk_s3::Client,
    pub(crate) runtime: Arc<BlockingRuntime>,
    pub(crate) target: Target,
    pub(crate) bucket: String,
    pub(crate) key: String,
    pub(crate) path: String,
    pub(crate) part_size: usize,
    pub(crate) buffer: Vec<u8>,
    pub(crate) upload_id: Option<String>,
    pub(crate) parts: Vec<CompletedPart>,
}

impl S3Writer {
    pub(crate) fn new(
        client: aws_sdk_s3::Client,
        runtime: Arc<BlockingRuntime>,
        target: Target,
        bucket: String,
        path: &str,
        config: MultipartConfig,
    ) -> Self {
        Self {
            client,
            runtime,
            target,
            bucket,
            key: path.trim_start_matches('/').to_string(),
            path: path.to_string(),
            part_size: config.part_size as usize,
            buffer: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
        }
    }

    fn content_type(&self) -> String {
        mime_guess::from_path(&self.key)
            .first_or_octet_stream()
            .to_string()
    }

    fn upload_id(&mut self) -> Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let response = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .content_type(self.content_type())
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Write, &self.path, e))?;

        let id = response
            .upload_id()
            .ok_or_else(|| {
                self.target
                    .transfer(Operation::Write, "server returned no upload id")
            })?
            .to_string();
        tracing::debug!(target = %self.target, key = %self.key, "Started multipart upload");
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    /// Upload the first `len` buffered bytes as the next part
    fn upload_part(&mut self, len: usize) -> Result<()> {
        if self.parts.len() >= MAX_PARTS {
            return Err(self.target.transfer(
                Operation::Write,
                format!("object exceeds {MAX_PARTS} parts; raise part_size"),
            ));
        }

        let upload_id = self.upload_id()?;
        let part_number = self.parts.len() as i32 + 1;
        let body: Vec<u8> = self.buffer.drain(..len).collect();

        let response = self
            .runtime
            .block_on(
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Write, &self.path, e))?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(response.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    fn put_single(&mut self) -> Result<()> {
        let body = std::mem::take(&mut self.buffer);
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .content_type(self.content_type())
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Close, &self.path, e))?;
        Ok(())
    }

    fn complete(&mut self, upload_id: String) -> Result<()> {
        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            self.upload_part(len)?;
        }

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();
        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .multipart_upload(upload)
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Close, &self.path, e))?;
        self.upload_id = None;
        Ok(())
    }
}

impl WriteAdapter for S3Writer {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= self.part_size {
            self.upload_part(self.part_size)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match self.upload_id.clone() {
            Some(upload_id) => self.complete(upload_id),
            None => self.put_single(),
        }
    }

    fn abort(&mut self) -> Result<()> {
        self.buffer.clear();
        let Some(upload_id) = self.upload_id.take() else {
            return Ok(());
        };
        tracing::debug!(target = %self.target, key = %self.key, "Aborting multipart upload");
        self.runtime
            .block_on(
                self.client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .send(),
            )
            .map_err(|e| classify(&self.target, Operation::Close, &self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MultipartConfig::default();
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);
    }

    #[test]
    fn test_part_size_clamping() {
        let config = MultipartConfig::new().part_size(1024);
        assert_eq!(config.part_size, MIN_PART_SIZE);

        let config = MultipartConfig::new().part_size(10 * 1024 * 1024 * 1024);
        assert_eq!(config.part_size, MAX_PART_SIZE);

        let config = MultipartConfig::new().part_size(16 * 1024 * 1024);
        assert_eq!(config.part_size, 16 * 1024 * 1024);
    }
}

//! Streaming upload of select output.

use bytes::Bytes;
use tracing::{debug, warn};

use bulkcopy_core::{Encryption, Result};

use crate::select_reader::SelectRecordReader;
use crate::store::{CompletedPart, ObjectStoreApi};

/// Uploads a [`SelectRecordReader`] in fixed-size parts.
///
/// Output that fits in a single part is written with one `PutObject`;
/// anything larger goes through a multipart upload that is aborted if any
/// part fails.
pub struct StreamUploader<'a> {
    store: &'a dyn ObjectStoreApi,
    part_size: usize,
}

impl<'a> StreamUploader<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi, part_size: usize) -> Self {
        Self {
            store,
            part_size: part_size.max(1),
        }
    }

    /// Returns the number of bytes written.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut SelectRecordReader,
        encryption: &Encryption,
    ) -> Result<u64> {
        let (first, eof) = self.next_part(reader).await?;
        if eof {
            let written = first.len() as u64;
            self.store.put_object(bucket, key, first, encryption).await?;
            debug!(bucket = %bucket, key = %key, bytes = written, "Uploaded in a single request");
            return Ok(written);
        }

        let upload_id = self
            .store
            .create_multipart_upload(bucket, key, encryption)
            .await?;

        match self.upload_parts(bucket, key, &upload_id, first, reader).await {
            Ok((parts, written)) => {
                self.store
                    .complete_multipart_upload(bucket, key, &upload_id, &parts)
                    .await?;
                debug!(
                    bucket = %bucket,
                    key = %key,
                    parts = parts.len(),
                    bytes = written,
                    "Completed multipart upload"
                );
                Ok(written)
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .store
                    .abort_multipart_upload(bucket, key, &upload_id)
                    .await
                {
                    warn!(
                        upload_id = %upload_id,
                        error = %abort_err,
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut SelectRecordReader,
    ) -> Result<(Vec<CompletedPart>, u64)> {
        let mut parts = Vec::new();
        let mut written = 0u64;
        let mut part_number = 1i32;
        let mut pending = Some(first);
        let mut eof = false;

        while let Some(body) = pending.take() {
            written += body.len() as u64;
            let part = self
                .store
                .upload_part(bucket, key, upload_id, part_number, body)
                .await?;
            parts.push(part);
            part_number += 1;

            if !eof {
                let (body, done) = self.next_part(reader).await?;
                eof = done;
                if !body.is_empty() {
                    pending = Some(body);
                }
            }
        }

        Ok((parts, written))
    }

    /// Read up to one part; the flag reports whether the stream is exhausted.
    async fn next_part(&self, reader: &mut SelectRecordReader) -> Result<(Bytes, bool)> {
        let mut buf = vec![0u8; self.part_size];
        let mut filled = 0;
        loop {
            let chunk = reader.read(&mut buf[filled..]).await?;
            filled += chunk.bytes;
            if chunk.eof {
                buf.truncate(filled);
                return Ok((Bytes::from(buf), true));
            }
            if filled == self.part_size {
                return Ok((Bytes::from(buf), false));
            }
        }
    }
}

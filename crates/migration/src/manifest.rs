//! Filtered copy manifests derived from an inventory delivery.

use tracing::{info, instrument};

use bulkcopy_core::{
    FilterCriteria, JobStage, ManifestDocument, ManifestReference, MigrationError, Result,
    UploadedManifest, COMPRESSION_SUFFIX,
};

use crate::expression::{build_expression, ExpressionFilters};
use crate::select_reader::SelectRecordReader;
use crate::store::{ObjectStoreApi, SelectRequest};
use crate::upload::StreamUploader;

/// Suffix keeping the non-latest manifest of a dual run apart from the latest one.
pub const NONCURRENT_SUFFIX: &str = ".noncurrent";

/// Key of the uncompressed filtered output written next to `data_key`.
///
/// Both manifests of a dual run exist before the first job is submitted, so
/// the non-latest one gets its own key.
pub fn filtered_key(data_key: &str, stage: JobStage) -> String {
    let base = data_key.strip_suffix(COMPRESSION_SUFFIX).unwrap_or(data_key);
    match stage {
        JobStage::NonLatest => format!("{base}{NONCURRENT_SUFFIX}"),
        JobStage::NonVersioned | JobStage::Latest => base.to_string(),
    }
}

pub struct ManifestFilter<'a> {
    store: &'a dyn ObjectStoreApi,
    part_size: usize,
}

impl<'a> ManifestFilter<'a> {
    pub fn new(store: &'a dyn ObjectStoreApi, part_size: usize) -> Self {
        Self { store, part_size }
    }

    pub async fn read_manifest(&self, manifest: &ManifestReference) -> Result<ManifestDocument> {
        let body = self.store.get_object(&manifest.bucket, &manifest.key).await?;
        ManifestDocument::parse(&body)
    }

    /// Select the rows matching `criteria` from the manifest's first data file
    /// and upload them as a `bucket,key` CSV the batch job can consume.
    #[instrument(skip_all, fields(manifest = %manifest.key, stage = %stage))]
    pub async fn filter(
        &self,
        manifest: &ManifestReference,
        criteria: &FilterCriteria,
        versioning_disabled: bool,
        stage: JobStage,
    ) -> Result<UploadedManifest> {
        let document = self.read_manifest(manifest).await?;
        let data_key = document.first_data_key()?;

        let expression = build_expression(
            &document.file_schema,
            ExpressionFilters::from(criteria),
            versioning_disabled,
        )?;
        info!(data_file = %data_key, expression = %expression, "Filtering inventory data file");

        let request = SelectRequest {
            bucket: manifest.bucket.clone(),
            key: data_key.to_string(),
            expression: expression.to_string(),
        };
        let events = self.store.select_object_content(&request).await?;
        let mut reader = SelectRecordReader::new(events);

        let key = filtered_key(data_key, stage);
        let written = StreamUploader::new(self.store, self.part_size)
            .upload(&manifest.bucket, &key, &mut reader, &criteria.encryption)
            .await?;

        let etag = self.store.head_object_etag(&manifest.bucket, &key).await?;
        if etag.is_empty() {
            return Err(MigrationError::remote(
                "HeadObject",
                format!("filtered manifest '{key}' has no ETag"),
            ));
        }

        info!(key = %key, bytes = written, etag = %etag, "Uploaded filtered manifest");
        Ok(UploadedManifest {
            bucket: manifest.bucket.clone(),
            key,
            etag,
        })
    }
}

//! [`ObjectStoreApi`] backed by the AWS SDK S3 client.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::operation::select_object_content::SelectObjectContentOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketVersioningStatus, CompletedMultipartUpload, CompressionType, CsvInput, CsvOutput,
    ExpressionType, FileHeaderInfo, InputSerialization, InventoryConfiguration,
    InventoryDestination as SdkInventoryDestination, InventoryEncryption, InventoryFormat,
    InventoryFrequency, InventoryIncludedObjectVersions, InventoryOptionalField,
    InventoryS3BucketDestination, InventorySchedule, ObjectOwnership as SdkObjectOwnership,
    OutputSerialization, RequestProgress, SelectObjectContentEventStream, ServerSideEncryption,
    Sses3,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use bulkcopy_core::{
    Encryption, InventoryDestination, InventoryFeedConfig, InventoryField, MigrationError,
    ObjectOwnership, ObjectSummary, Result, ScheduleFrequency, VersioningStatus,
};

use crate::store::{CompletedPart, ObjectStoreApi, SelectEvent, SelectEventSource, SelectRequest};

/// Error code S3 returns for a missing inventory configuration.
const NO_SUCH_CONFIGURATION: &str = "NoSuchConfiguration";

fn remote_err<E>(operation: &'static str) -> impl FnOnce(E) -> MigrationError
where
    E: std::error::Error + 'static,
{
    move |e| MigrationError::remote(operation, DisplayErrorContext(&e).to_string())
}

fn missing(operation: &'static str, what: &str) -> MigrationError {
    MigrationError::remote(operation, format!("response is missing {what}"))
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

/// S3-backed object store.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
        }
    }

    fn feed_from_sdk(config: &InventoryConfiguration) -> Result<InventoryFeedConfig> {
        const OP: &str = "GetBucketInventoryConfiguration";

        let destination = Option::<&SdkInventoryDestination>::from(config.destination())
            .and_then(|d| Option::<&InventoryS3BucketDestination>::from(d.s3_bucket_destination()))
            .ok_or_else(|| missing(OP, "an S3 bucket destination"))?;
        let bucket_arn = Option::<&str>::from(destination.bucket())
            .ok_or_else(|| missing(OP, "a destination bucket"))?
            .to_string();

        let schedule = match Option::<&InventorySchedule>::from(config.schedule()).map(|s| s.frequency()) {
            Some(InventoryFrequency::Weekly) => ScheduleFrequency::Weekly,
            _ => ScheduleFrequency::Daily,
        };

        let optional_fields = config
            .optional_fields()
            .iter()
            .filter_map(|f| match f {
                InventoryOptionalField::Size => Some(InventoryField::Size),
                InventoryOptionalField::LastModifiedDate => Some(InventoryField::LastModifiedDate),
                InventoryOptionalField::ReplicationStatus => Some(InventoryField::ReplicationStatus),
                _ => None,
            })
            .collect();

        Ok(InventoryFeedConfig {
            name: Option::<&str>::from(config.id()).unwrap_or_default().to_string(),
            enabled: Option::<bool>::from(config.is_enabled()).unwrap_or(false),
            destination: InventoryDestination {
                bucket_arn,
                prefix: destination.prefix().map(str::to_string),
            },
            schedule,
            all_versions: matches!(
                Option::<&InventoryIncludedObjectVersions>::from(config.included_object_versions()),
                Some(InventoryIncludedObjectVersions::All)
            ),
            optional_fields,
        })
    }

    fn feed_to_sdk(config: &InventoryFeedConfig) -> Result<InventoryConfiguration> {
        const OP: &str = "PutBucketInventoryConfiguration";
        let build_err = |e: aws_sdk_s3::error::BuildError| MigrationError::remote(OP, e.to_string());

        let bucket_destination = InventoryS3BucketDestination::builder()
            .bucket(&config.destination.bucket_arn)
            .set_prefix(config.destination.prefix.clone())
            .format(InventoryFormat::Csv)
            .encryption(InventoryEncryption::builder().sses3(Sses3::builder().build()).build())
            .build()
            .map_err(build_err)?;

        let frequency = match config.schedule {
            ScheduleFrequency::Weekly => InventoryFrequency::Weekly,
            ScheduleFrequency::Daily => InventoryFrequency::Daily,
        };
        let versions = if config.all_versions {
            InventoryIncludedObjectVersions::All
        } else {
            InventoryIncludedObjectVersions::Current
        };
        let fields = config
            .optional_fields
            .iter()
            .map(|f| match f {
                InventoryField::Size => InventoryOptionalField::Size,
                InventoryField::LastModifiedDate => InventoryOptionalField::LastModifiedDate,
                InventoryField::ReplicationStatus => InventoryOptionalField::ReplicationStatus,
            })
            .collect::<Vec<_>>();

        InventoryConfiguration::builder()
            .id(&config.name)
            .is_enabled(config.enabled)
            .included_object_versions(versions)
            .destination(
                SdkInventoryDestination::builder()
                    .s3_bucket_destination(bucket_destination)
                    .build(),
            )
            .schedule(InventorySchedule::builder().frequency(frequency).build().map_err(build_err)?)
            .set_optional_fields(Some(fields))
            .build()
            .map_err(build_err)
    }
}

#[async_trait]
impl ObjectStoreApi for S3Store {
    async fn get_inventory_config(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<Option<InventoryFeedConfig>> {
        let resp = self
            .client
            .get_bucket_inventory_configuration()
            .bucket(bucket)
            .id(name)
            .send()
            .await;

        let out = match resp {
            Ok(out) => out,
            Err(err) => {
                if err.as_service_error().and_then(|e| e.code()) == Some(NO_SUCH_CONFIGURATION) {
                    return Ok(None);
                }
                return Err(remote_err("GetBucketInventoryConfiguration")(err));
            }
        };

        out.inventory_configuration()
            .map(Self::feed_from_sdk)
            .transpose()
    }

    async fn put_inventory_config(&self, bucket: &str, config: &InventoryFeedConfig) -> Result<()> {
        let sdk_config = Self::feed_to_sdk(config)?;
        self.client
            .put_bucket_inventory_configuration()
            .bucket(bucket)
            .id(&config.name)
            .inventory_configuration(sdk_config)
            .send()
            .await
            .map_err(remote_err("PutBucketInventoryConfiguration"))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: &str,
    ) -> Result<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .start_after(start_after)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(remote_err("ListObjectsV2"))?;

            objects.extend(out.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    last_modified: obj.last_modified().and_then(to_chrono),
                })
            }));

            match out.next_continuation_token() {
                Some(token) if !token.is_empty() => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(bucket, prefix, start_after, count = objects.len(), "ListObjectsV2 complete");
        Ok(objects)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(remote_err("GetObject"))?;

        let body = out.body.collect().await.map_err(remote_err("GetObject"))?;
        Ok(body.into_bytes())
    }

    async fn head_object_etag(&self, bucket: &str, key: &str) -> Result<String> {
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(remote_err("HeadObject"))?;

        out.e_tag()
            .map(str::to_string)
            .ok_or_else(|| missing("HeadObject", "an ETag"))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        encryption: &Encryption,
    ) -> Result<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body));
        req = match encryption {
            Encryption::S3Managed => req.server_side_encryption(ServerSideEncryption::Aes256),
            Encryption::Kms { key_id } => req
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(key_id),
        };
        req.send().await.map_err(remote_err("PutObject"))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        encryption: &Encryption,
    ) -> Result<String> {
        let mut req = self.client.create_multipart_upload().bucket(bucket).key(key);
        req = match encryption {
            Encryption::S3Managed => req.server_side_encryption(ServerSideEncryption::Aes256),
            Encryption::Kms { key_id } => req
                .server_side_encryption(ServerSideEncryption::AwsKms)
                .ssekms_key_id(key_id),
        };
        let out = req.send().await.map_err(remote_err("CreateMultipartUpload"))?;

        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| missing("CreateMultipartUpload", "an upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let out = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(remote_err("UploadPart"))?;

        let etag = out
            .e_tag()
            .ok_or_else(|| missing("UploadPart", "an ETag"))?
            .to_string();
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let parts = parts
            .iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(remote_err("CompleteMultipartUpload"))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(remote_err("AbortMultipartUpload"))?;
        Ok(())
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let out = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(remote_err("GetBucketVersioning"))?;

        Ok(match out.status() {
            None => VersioningStatus::Unversioned,
            Some(BucketVersioningStatus::Enabled) => VersioningStatus::Enabled,
            Some(_) => VersioningStatus::Suspended,
        })
    }

    async fn get_ownership_controls(&self, bucket: &str) -> Result<Vec<ObjectOwnership>> {
        let out = self
            .client
            .get_bucket_ownership_controls()
            .bucket(bucket)
            .send()
            .await
            .map_err(remote_err("GetBucketOwnershipControls"))?;

        let rules = out
            .ownership_controls()
            .map(|c| c.rules())
            .unwrap_or_default();

        Ok(rules
            .iter()
            .map(|rule| match rule.object_ownership() {
                SdkObjectOwnership::BucketOwnerEnforced => ObjectOwnership::BucketOwnerEnforced,
                SdkObjectOwnership::BucketOwnerPreferred => ObjectOwnership::BucketOwnerPreferred,
                SdkObjectOwnership::ObjectWriter => ObjectOwnership::ObjectWriter,
                other => ObjectOwnership::Other(other.as_str().to_string()),
            })
            .collect())
    }

    async fn select_object_content(
        &self,
        request: &SelectRequest,
    ) -> Result<Box<dyn SelectEventSource>> {
        let output = self
            .client
            .select_object_content()
            .bucket(&request.bucket)
            .key(&request.key)
            .expression(&request.expression)
            .expression_type(ExpressionType::Sql)
            .input_serialization(
                InputSerialization::builder()
                    .csv(
                        CsvInput::builder()
                            .field_delimiter(",")
                            .file_header_info(FileHeaderInfo::None)
                            .build(),
                    )
                    .compression_type(CompressionType::Gzip)
                    .build(),
            )
            .output_serialization(
                OutputSerialization::builder()
                    .csv(CsvOutput::builder().build())
                    .build(),
            )
            .request_progress(RequestProgress::builder().enabled(false).build())
            .send()
            .await
            .map_err(remote_err("SelectObjectContent"))?;

        Ok(Box::new(S3SelectEvents { output }))
    }
}

/// Event stream of an in-flight `SelectObjectContent` call.
struct S3SelectEvents {
    output: SelectObjectContentOutput,
}

#[async_trait]
impl SelectEventSource for S3SelectEvents {
    async fn next_event(&mut self) -> Result<Option<SelectEvent>> {
        let event = self
            .output
            .payload
            .recv()
            .await
            .map_err(remote_err("SelectObjectContent"))?;

        Ok(event.map(|e| match e {
            SelectObjectContentEventStream::Records(records) => SelectEvent::Records(
                records
                    .payload()
                    .map(|blob| Bytes::copy_from_slice(blob.as_ref()))
                    .unwrap_or_default(),
            ),
            SelectObjectContentEventStream::End(_) => SelectEvent::End,
            SelectObjectContentEventStream::Progress(_) => SelectEvent::Progress,
            SelectObjectContentEventStream::Stats(_) => SelectEvent::Stats,
            _ => SelectEvent::Continuation,
        }))
    }
}

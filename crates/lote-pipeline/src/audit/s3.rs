use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info, instrument};

use super::{AuditError, AuditResult, AuditSink};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3AuditConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Key prefix every artifact path is placed under
    pub prefix: String,
}

impl S3AuditConfig {
    pub fn from_env(prefix: impl Into<String>) -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "lote-audit".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            prefix: prefix.into(),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            prefix: "logs".to_string(),
        }
    }

    fn key(&self, path: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            path.to_string()
        } else {
            format!("{prefix}/{path}")
        }
    }
}

/// Uploads artifacts to an S3-compatible bucket
#[derive(Clone)]
pub struct S3AuditSink {
    client: Client,
    config: S3AuditConfig,
}

impl S3AuditSink {
    pub fn new(config: S3AuditConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "lote-audit",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!(bucket = %config.bucket, prefix = %config.prefix, "S3 audit sink initialized");

        Self { client, config }
    }
}

fn content_type(path: &str) -> &'static str {
    if path.ends_with(".json") {
        "application/json"
    } else {
        "text/plain; charset=utf-8"
    }
}

#[async_trait]
impl AuditSink for S3AuditSink {
    #[instrument(skip(self, bytes), fields(bucket = %self.config.bucket))]
    async fn write_artifact(&self, path: &str, bytes: Vec<u8>) -> AuditResult<()> {
        let key = self.config.key(path);
        debug!(size = bytes.len(), %key, "Uploading audit artifact");

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type(path))
            .send()
            .await
            .map_err(|e| AuditError::Upload {
                key: key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

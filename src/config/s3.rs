use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// S3 configuration for the agent source store
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: Option<String>,

    /// AWS region
    pub region: Option<String>,

    /// S3 endpoint URL (for MinIO, LocalStack, or S3-compatible services)
    pub endpoint: Option<String>,

    /// Explicit credentials; falls back to the AWS environment when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

impl S3Config {
    /// Merge CLI arguments into this config (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Cli) {
        if cli.s3_bucket.is_some() {
            self.bucket = cli.s3_bucket.clone();
        }
        if cli.s3_region.is_some() {
            self.region = cli.s3_region.clone();
        }
        if cli.s3_endpoint.is_some() {
            self.endpoint = cli.s3_endpoint.clone();
        }
    }

    /// Basic validation of the bucket name
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match &self.bucket {
            None => errors.push("S3 bucket is required when S3 storage is configured".to_string()),
            Some(bucket) => {
                if bucket.len() < 3 || bucket.len() > 63 {
                    errors.push("S3 bucket name must be between 3 and 63 characters".to_string());
                }
                if !bucket
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
                {
                    errors.push(
                        "S3 bucket name must contain only lowercase letters, numbers, hyphens, and periods"
                            .to_string(),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_bucket() {
        let config = S3Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_plain_bucket() {
        let config = S3Config {
            bucket: Some("proteus-agents".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}

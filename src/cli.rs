use clap::Parser;
use std::path::PathBuf;

/// Proteus - adaptive agent platform with hot-reloadable script agents
#[derive(Parser, Debug, Clone)]
#[command(name = "proteus", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "PROTEUS_CONFIG", default_value = "proteus.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "PROTEUS_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "PROTEUS_PORT")]
    pub port: Option<u16>,

    /// Local directory for agent source storage
    #[arg(long, env = "PROTEUS_STORAGE_PATH")]
    pub storage_path: Option<String>,

    /// S3 bucket for agent source storage
    #[arg(long, env = "PROTEUS_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// AWS region for S3
    #[arg(long, env = "PROTEUS_S3_REGION")]
    pub s3_region: Option<String>,

    /// S3 endpoint URL (for MinIO, LocalStack, or other S3-compatible services)
    #[arg(long, env = "PROTEUS_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
}

impl Cli {
    /// Check if any S3 configuration is provided via CLI or environment
    pub fn has_s3_config(&self) -> bool {
        self.s3_bucket.is_some() || self.s3_region.is_some() || self.s3_endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["proteus"]);
        assert_eq!(cli.config, PathBuf::from("proteus.toml"));
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.has_s3_config());
    }

    #[test]
    fn test_cli_with_args() {
        let cli = Cli::parse_from([
            "proteus",
            "--config",
            "custom.toml",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--s3-bucket",
            "my-agents",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(8080));
        assert!(cli.has_s3_config());
    }
}

use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Static access/secret key pair
#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Connection and transfer settings for an S3-compatible store
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint URL; `None` uses the regular AWS endpoint resolution
    pub endpoint: Option<String>,
    pub region: String,
    pub profile: Option<String>,
    pub credentials: Option<StaticCredentials>,
    /// Path-style addressing; required for SeaweedFS and most non-AWS stores
    pub force_path_style: bool,
    pub concurrency: usize,
    pub page_size: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            profile: None,
            credentials: None,
            force_path_style: true,
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = lookup("S3_ENDPOINT").filter(|s| !s.is_empty());
        if let Some(endpoint) = &endpoint {
            Self::validate_endpoint(endpoint)?;
        }

        let region = lookup("AWS_REGION").unwrap_or(defaults.region);
        Self::validate_region(&region)?;

        let profile = lookup("AWS_PROFILE").filter(|s| !s.is_empty());

        let credentials = match (lookup("AWS_ACCESS_KEY_ID"), lookup("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key), Some(secret_key)) => Some(StaticCredentials {
                access_key,
                secret_key,
            }),
            (None, None) => None,
            _ => anyhow::bail!(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together"
            ),
        };

        let force_path_style = match lookup("S3_FORCE_PATH_STYLE") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("S3_FORCE_PATH_STYLE '{}' is not a boolean", value))?,
            None => defaults.force_path_style,
        };

        let concurrency = match lookup("SYNC_CONCURRENCY") {
            Some(value) => value
                .parse()
                .with_context(|| format!("SYNC_CONCURRENCY '{}' is not a number", value))?,
            None => defaults.concurrency,
        };
        Self::validate_concurrency(concurrency)?;

        let page_size = match lookup("S3_PAGE_SIZE") {
            Some(value) => value
                .parse()
                .with_context(|| format!("S3_PAGE_SIZE '{}' is not a number", value))?,
            None => defaults.page_size,
        };
        Self::validate_page_size(page_size)?;

        Ok(Self {
            endpoint,
            region,
            profile,
            credentials,
            force_path_style,
            concurrency,
            page_size,
        })
    }

    /// Validate endpoint URL scheme
    pub fn validate_endpoint(endpoint: &str) -> Result<()> {
        let rest = endpoint
            .strip_prefix("http://")
            .or_else(|| endpoint.strip_prefix("https://"));

        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
            Some(_) => anyhow::bail!("S3_ENDPOINT '{}' has no host", endpoint),
            None => anyhow::bail!(
                "S3_ENDPOINT '{}' must start with http:// or https://",
                endpoint
            ),
        }
    }

    /// Validate region format. SeaweedFS ignores the region, but the
    /// signer still needs a non-empty one.
    pub fn validate_region(region: &str) -> Result<()> {
        if region.trim().is_empty() {
            anyhow::bail!("AWS_REGION cannot be empty");
        }

        if region.chars().any(char::is_whitespace) {
            anyhow::bail!("AWS_REGION '{}' cannot contain whitespace", region);
        }

        Ok(())
    }

    pub fn validate_concurrency(concurrency: usize) -> Result<()> {
        if concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        Ok(())
    }

    /// ListObjectsV2 returns at most 1000 keys per page
    pub fn validate_page_size(page_size: i32) -> Result<()> {
        if !(1..=1000).contains(&page_size) {
            anyhow::bail!("page size must be between 1 and 1000 (got {})", page_size);
        }
        Ok(())
    }

    /// Validate S3 bucket name according to AWS rules
    pub fn validate_bucket_name(bucket: &str) -> Result<()> {
        if bucket.len() < 3 || bucket.len() > 63 {
            anyhow::bail!(
                "bucket '{}' must be between 3 and 63 characters (got {})",
                bucket,
                bucket.len()
            );
        }

        let is_edge = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
        let (first, last) = (bucket.starts_with(is_edge), bucket.ends_with(is_edge));
        if !first || !last {
            anyhow::bail!(
                "bucket '{}' must start and end with a lowercase letter or number",
                bucket
            );
        }

        if let Some(c) = bucket
            .chars()
            .find(|&c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '.')
        {
            anyhow::bail!(
                "bucket '{}' contains invalid character '{}'. Only lowercase letters, numbers, hyphens, and periods are allowed",
                bucket,
                c
            );
        }

        if bucket.contains("..") {
            anyhow::bail!("bucket '{}' cannot contain consecutive periods", bucket);
        }

        if bucket.split('.').count() == 4 && bucket.split('.').all(|part| part.parse::<u8>().is_ok())
        {
            anyhow::bail!("bucket '{}' cannot be formatted as an IP address", bucket);
        }

        Ok(())
    }
}

/// clap value parser for bucket arguments
pub fn parse_bucket(bucket: &str) -> std::result::Result<String, String> {
    Config::validate_bucket_name(bucket)
        .map(|_| bucket.to_string())
        .map_err(|e| e.to_string())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected true/false"),
    }
}

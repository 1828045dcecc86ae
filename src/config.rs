use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

const DEFAULT_ALLOWED_TYPES: &str = "image/png,image/jpeg,image/gif";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 << 20;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket: String,
    pub storage_dir: PathBuf,
    pub database_url: String,
    pub static_dir: PathBuf,
    pub allowed_types: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "REST gateway for images stored in a bucket")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket holding the images (overrides BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory where bucket payloads are stored (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Metadata database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory served for paths outside the API (overrides STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Comma-separated upload content types (overrides ALLOWED_TYPES)
    #[arg(long)]
    pub allowed_types: Option<String>,

    /// Maximum request body size for uploads (overrides MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |key| env::var(key))
    }

    /// Merge parsed CLI args over values looked up from the environment.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        let port = match args.port {
            Some(port) => port,
            None => parse_var(var("PORT")?, "PORT")?.unwrap_or(8080),
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(limit) => limit,
            None => parse_var(var("MAX_UPLOAD_BYTES")?, "MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let bucket = match args.bucket.or(var("BUCKET")?) {
            Some(bucket) => bucket,
            None => bail!("BUCKET must be set (or pass --bucket)"),
        };

        let allowed_types = args
            .allowed_types
            .or(var("ALLOWED_TYPES")?)
            .unwrap_or_else(|| DEFAULT_ALLOWED_TYPES.into());

        Ok(Self {
            host: args.host.or(var("HOST")?).unwrap_or_else(|| "0.0.0.0".into()),
            port,
            bucket,
            storage_dir: args
                .storage_dir
                .or(var("STORAGE_DIR")?.map(PathBuf::from))
                .unwrap_or_else(|| "./data/buckets".into()),
            database_url: args
                .database_url
                .or(var("DATABASE_URL")?)
                .unwrap_or_else(|| "sqlite://./data/meta/images.db".into()),
            static_dir: args
                .static_dir
                .or(var("STATIC_DIR")?.map(PathBuf::from))
                .unwrap_or_else(|| "./static".into()),
            allowed_types: split_list(&allowed_types),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", key, raw))
        })
        .transpose()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

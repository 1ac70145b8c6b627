use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Which bucket implementation backs the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite metadata plus payload files on disk.
    Local,
    /// Process memory; nothing persists.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "memory" => Ok(Backend::Memory),
            other => anyhow::bail!("unknown backend `{}` (expected local or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub seed_writes: u32,
    /// Seconds between scheduled writes; zero disables the scheduler.
    pub schedule_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "HTTP worker for basic bucket operations")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_WORKER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_WORKER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket implementation (overrides BUCKET_WORKER_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where object payloads are stored (overrides BUCKET_WORKER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides BUCKET_WORKER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Writes performed by each request to `/` (overrides BUCKET_WORKER_SEED_WRITES)
    #[arg(long)]
    pub seed_writes: Option<u32>,

    /// Seconds between scheduled writes, 0 to disable (overrides BUCKET_WORKER_SCHEDULE_SECS)
    #[arg(long)]
    pub schedule_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |name| env::var(name))?, migrate))
    }

    /// Merge CLI args over values looked up through `lookup`, over defaults.
    pub fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |name: &str, default: &str| -> Result<String> {
            match lookup(name) {
                Ok(value) => Ok(value),
                Err(env::VarError::NotPresent) => Ok(default.to_string()),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        let env_host = var("BUCKET_WORKER_HOST", "0.0.0.0")?;
        let env_port = parse_var::<u16>("BUCKET_WORKER_PORT", &var("BUCKET_WORKER_PORT", "8787")?)?;
        let env_backend = var("BUCKET_WORKER_BACKEND", "local")?
            .parse::<Backend>()
            .context("parsing BUCKET_WORKER_BACKEND")?;
        let env_storage = var("BUCKET_WORKER_STORAGE_DIR", "./data/objects")?;
        let env_db = var("BUCKET_WORKER_DATABASE_URL", "sqlite://./data/meta/bucket.db")?;
        let env_seed = parse_var::<u32>(
            "BUCKET_WORKER_SEED_WRITES",
            &var("BUCKET_WORKER_SEED_WRITES", "5")?,
        )?;
        let env_schedule = parse_var::<u64>(
            "BUCKET_WORKER_SCHEDULE_SECS",
            &var("BUCKET_WORKER_SCHEDULE_SECS", "60")?,
        )?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            seed_writes: args.seed_writes.unwrap_or(env_seed),
            schedule_secs: args.schedule_secs.unwrap_or(env_schedule),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn schedule_interval(&self) -> Option<Duration> {
        (self.schedule_secs > 0).then(|| Duration::from_secs(self.schedule_secs))
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("parsing {} value `{}`", name, value))
}

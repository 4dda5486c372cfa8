/*!
 * Orbit Portability CLI
 *
 * Version: 0.6.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use orbit_portability::{
    backend::{Credentials, S3ConnectionFactory},
    config::{LogLevel, PortabilityConfig},
    importer::{
        ContainerResource, DirectoryItemSource, IdempotentExecutor, InMemoryIdempotentExecutor,
        TempFileStore, VideoModel, VideosContainer,
    },
    logging,
    provider::{DataVertical, ExtensionContext, IcpsrTransferExtension, TransferExtension},
    ClientCache, JobId,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "orbit-portability")]
#[command(version, about = "Upload data transfer payloads to per-service object storage buckets", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevelArg,

    /// Path to log file (default: stdout)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AccessArgs {
    /// Transfer job id (default: a new random id)
    #[arg(long, value_name = "UUID")]
    job: Option<Uuid>,

    /// Access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    key_id: String,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret: String,

    /// Routing hint selecting the destination bucket
    #[arg(long, default_value = "icpsr")]
    service: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one file, printing the stored version id
    Upload {
        #[command(flatten)]
        access: AccessArgs,

        /// Object key
        #[arg(short = 'k', long)]
        key: String,

        /// File to upload
        file: PathBuf,
    },

    /// Import videos from a local directory through the ICPSR extension
    ImportVideos {
        #[command(flatten)]
        access: AccessArgs,

        /// Directory holding the video files
        #[arg(long, value_name = "DIR")]
        source_dir: PathBuf,

        /// Video ids (file names under the source directory)
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

impl AccessArgs {
    fn job_id(&self) -> JobId {
        self.job.unwrap_or_else(Uuid::new_v4)
    }

    fn credentials(&self) -> Credentials {
        Credentials::new(&self.key_id, &self.secret, &self.service)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => PortabilityConfig::from_file(path)?,
        None => PortabilityConfig::default(),
    };
    config.log_level = cli.log_level.into();
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    logging::init_logging(&config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: PortabilityConfig) -> anyhow::Result<()> {
    let factory = Arc::new(S3ConnectionFactory::new(config.s3.clone()));
    let cache = Arc::new(ClientCache::with_config(factory, config.upload)?);

    match command {
        Commands::Upload { access, key, file } => {
            let client = cache
                .get_or_create(access.job_id(), &access.credentials())
                .await?;
            let version = client
                .upload_file(&key, &file)
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            println!("{}", version.as_deref().unwrap_or("(unversioned)"));
        }
        Commands::ImportVideos {
            access,
            source_dir,
            ids,
        } => {
            let temp_store = match config.temp_dir {
                Some(dir) => TempFileStore::in_dir(dir),
                None => TempFileStore::new(),
            };
            let extension = IcpsrTransferExtension::new();
            extension.initialize(
                ExtensionContext::new(cache, Arc::new(DirectoryItemSource::new(source_dir)))
                    .with_temp_store(temp_store),
            );

            let videos = ids
                .iter()
                .map(|id| VideoModel::new(id.as_str(), id.as_str()))
                .collect();
            let data = ContainerResource::Videos(VideosContainer::new(videos));
            let executor = InMemoryIdempotentExecutor::new();

            extension
                .importer_for(DataVertical::Videos)?
                .import_item(access.job_id(), &executor, &access.credentials(), Some(&data))
                .await?;

            let errors = executor.errors().await;
            for error in &errors {
                eprintln!("{}: {}", error.id, error.message);
            }
            if !errors.is_empty() {
                bail!("{} of {} videos failed to import", errors.len(), ids.len());
            }
        }
    }

    Ok(())
}

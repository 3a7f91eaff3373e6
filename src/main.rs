use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use coldpush::backend::b2::{B2Backend, B2Options};
use coldpush::backend::glacier::{GlacierBackend, GlacierOptions};
use coldpush::backend::StorageBackend;
use coldpush::constants::DEFAULT_CONCURRENCY;
use coldpush::error::UploadError;
use coldpush::source::SourceFile;
use coldpush::store::StateStore;
use coldpush::upload::{self, UploadContext};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Resumable multipart uploader for cold storage")]
struct Args {
    /// File to upload
    #[arg(long)]
    file: PathBuf,

    /// Working directory holding the resumable session state
    #[arg(long)]
    work: PathBuf,

    /// Storage service
    #[arg(long, value_enum)]
    service: Service,

    /// Max concurrent part uploads
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Disable progress rendering
    #[arg(long)]
    quiet: bool,

    /// Verbose diagnostics
    #[arg(long)]
    verbose: bool,

    /// Resume even if the file changed since the session was created
    #[arg(long)]
    force: bool,

    /// AWS region, e.g. us-east-1
    #[arg(long)]
    region: Option<String>,

    /// AWS access key id (falls back to AWS_ACCESS_KEY_ID)
    #[arg(long)]
    access: Option<String>,

    /// AWS secret access key (falls back to AWS_SECRET_ACCESS_KEY)
    #[arg(long)]
    secret: Option<String>,

    /// Glacier vault name
    #[arg(long)]
    vault: Option<String>,

    /// B2 account id
    #[arg(long)]
    account: Option<String>,

    /// B2 application key
    #[arg(long)]
    key: Option<String>,

    /// B2 bucket id
    #[arg(long)]
    bucket: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Service {
    Aws,
    B2,
}

fn missing(flag: &str, service: &str) -> UploadError {
    UploadError::Config(format!("missing {flag} (required for --service {service})"))
}

async fn build_backend(args: &Args) -> Result<Arc<dyn StorageBackend>, UploadError> {
    match args.service {
        Service::Aws => {
            let opts = GlacierOptions {
                region: args.region.clone().ok_or_else(|| missing("--region", "aws"))?,
                access_key: args
                    .access
                    .clone()
                    .or_else(|| env::var("AWS_ACCESS_KEY_ID").ok())
                    .ok_or_else(|| missing("--access", "aws"))?,
                secret_key: args
                    .secret
                    .clone()
                    .or_else(|| env::var("AWS_SECRET_ACCESS_KEY").ok())
                    .ok_or_else(|| missing("--secret", "aws"))?,
                vault: args.vault.clone().ok_or_else(|| missing("--vault", "aws"))?,
            };
            Ok(Arc::new(GlacierBackend::from_options(opts)?))
        }
        Service::B2 => {
            let opts = B2Options {
                account_id: args.account.clone().ok_or_else(|| missing("--account", "b2"))?,
                application_key: args.key.clone().ok_or_else(|| missing("--key", "b2"))?,
                bucket_id: args.bucket.clone().ok_or_else(|| missing("--bucket", "b2"))?,
            };
            Ok(Arc::new(B2Backend::from_options(opts).await?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("coldpush={level}")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let backend = build_backend(&args).await?;
    let file = SourceFile::probe(&args.file).await?;
    let store = StateStore::open(&args.work).await?;

    upload::run(UploadContext {
        file,
        store,
        backend,
        concurrency: args.concurrency,
        quiet: args.quiet,
        force: args.force,
    })
    .await?;

    Ok(())
}

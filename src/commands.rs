use crate::error::{ErrorKind, Result};
use crate::{Cli, Command, ExportArgs, MigrateArgs, ResumeArgs};
use exn::ResultExt;
use ferry_config::{Backend, Config};
use ferry_engine::{Engine, MigrationEvent, Options, RateLimiter, RetryPolicy};
use ferry_progress::{FileStatus, ProgressStore, ProgressTracker, Summary};
use ferry_remote::records::LocalRecords;
use ferry_remote::source::LocalSource;
use ferry_remote::{RecordsHandle, SourceHandle};
use ferry_storage::StoreHandle;
use ferry_storage::backend::LocalStore;
use futures::{Stream, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let store = ProgressStore::new(config.progress_directory().or_raise(|| ErrorKind::Config)?);
    match cli.command {
        Command::Scan(args) => scan(&config, &store, &args.folder).await,
        Command::Review(args) => review(&store, &args.folder).await,
        Command::Migrate(args) => migrate(&config, &store, args).await,
        Command::Resume(args) => resume(&config, &store, args).await,
        Command::Status(args) => status(&store, &args.folder).await,
        Command::Export(args) => export(&store, args).await,
    }
}

async fn scan(config: &Config, store: &ProgressStore, folder: &str) -> Result<()> {
    let engine = build_engine(config, options(config)).await?;
    let tracker = tracker(config, store, store.load_or_new(folder).await.or_raise(|| ErrorKind::Progress)?);
    let report = engine.scan(folder, &tracker).await.or_raise(|| ErrorKind::Migration)?;
    println!("Files:    {} ({} new)", report.total, report.new);
    println!("Single:   {}", report.single);
    println!("Multiple: {}", report.multiple);
    println!("Range:    {}", report.range);
    println!("Invalid:  {}", report.invalid);
    Ok(())
}

async fn review(store: &ProgressStore, folder: &str) -> Result<()> {
    let run = store.load_existing(folder).await.or_raise(|| ErrorKind::Progress)?;
    let mut count = 0;
    for (file_id, record) in run.files_with_status(FileStatus::NeedsReview) {
        println!("{}\t{}\t{}", file_id, record.filename, record.error.as_deref().unwrap_or("-"));
        count += 1;
    }
    println!("{count} file(s) need review");
    Ok(())
}

async fn migrate(config: &Config, store: &ProgressStore, args: MigrateArgs) -> Result<()> {
    let folder = args.folder.folder;
    let mut options = options(config);
    options.concurrency = args.concurrency.unwrap_or(options.concurrency);
    options.dry_run = args.dry_run;
    options.skip_existing = args.skip_existing;
    let engine = build_engine(config, options).await?;
    // An unreadable snapshot is an error: it is never overwritten.
    let run = store.load_or_new(&folder).await.or_raise(|| ErrorKind::Progress)?;
    let tracker = match args.dry_run {
        true => ProgressTracker::ephemeral(run),
        false => tracker(config, store, run),
    };
    report(engine.migrate(&folder, &tracker)).await
}

async fn resume(config: &Config, store: &ProgressStore, args: ResumeArgs) -> Result<()> {
    let mut options = options(config);
    options.concurrency = args.concurrency.unwrap_or(options.concurrency);
    options.skip_existing = args.skip_existing;
    let engine = build_engine(config, options).await?;
    let run = store.load_existing(&args.folder.folder).await.or_raise(|| ErrorKind::Progress)?;
    let tracker = tracker(config, store, run);
    report(engine.resume(&tracker)).await
}

async fn status(store: &ProgressStore, folder: &str) -> Result<()> {
    let mut run = store.load_existing(folder).await.or_raise(|| ErrorKind::Progress)?;
    run.recompute_summary();
    println!("Run:      {}", run.run_id);
    println!("Started:  {}", run.started_at);
    println!("Updated:  {}", run.updated_at);
    println!("Listed:   {}", run.total_files);
    print_summary(&run.summary);
    Ok(())
}

async fn export(store: &ProgressStore, args: ExportArgs) -> Result<()> {
    let run = store.load_existing(&args.folder.folder).await.or_raise(|| ErrorKind::Progress)?;
    let count = ferry_progress::export(&run, args.status, &args.output).await.or_raise(|| ErrorKind::Progress)?;
    println!("Exported {count} {} file(s) to {}", args.status, args.output.display());
    Ok(())
}

/// Print progress as events arrive, then the final summary.
async fn report(events: impl Stream<Item = ferry_engine::error::Result<MigrationEvent>>) -> Result<()> {
    let mut events = pin!(events);
    let (mut done, mut total) = (0u64, 0u64);
    while let Some(event) = events.next().await {
        match event.or_raise(|| ErrorKind::Migration)? {
            MigrationEvent::Started => {},
            MigrationEvent::Scanned(report) => {
                println!("Scanned {} file(s), {} new, {} invalid", report.total, report.new, report.invalid);
            },
            MigrationEvent::DiscoveryComplete(count) => {
                total = count;
                println!("Processing {total} file(s)");
            },
            MigrationEvent::Processed { record, .. } => {
                done += 1;
                match &record.error {
                    Some(error) => println!("[{done}/{total}] {:<12} {} ({error})", record.status.as_str(), record.filename),
                    None => println!("[{done}/{total}] {:<12} {}", record.status.as_str(), record.filename),
                }
            },
            MigrationEvent::Complete(summary) => {
                println!("Migration complete");
                print_summary(&summary);
            },
            MigrationEvent::Interrupted(summary) => {
                println!("Migration interrupted; run `ferry resume` to continue");
                print_summary(&summary);
            },
        }
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    for status in FileStatus::ALL {
        println!("{:<13} {}", format!("{}:", status.as_str()), summary.count(status));
    }
    println!("{:<13} {}", "total:", summary.total);
}

fn options(config: &Config) -> Options {
    let migration = &config.migration;
    Options {
        concurrency: migration.concurrency,
        retry: RetryPolicy {
            max_attempts: migration.retry_attempts,
            base_delay: migration.retry_delay,
            max_delay: migration.max_retry_delay,
        },
        metadata_timeout: migration.metadata_timeout,
        transfer_timeout: migration.transfer_timeout,
        dry_run: false,
        skip_existing: false,
        public: migration.default_media_public,
    }
}

fn tracker(config: &Config, store: &ProgressStore, run: ferry_progress::MigrationRun) -> ProgressTracker {
    ProgressTracker::new(store.clone(), run, config.migration.save_interval)
}

async fn build_engine(config: &Config, options: Options) -> Result<Engine> {
    let source_root = config.source.root.as_deref().ok_or_else(|| exn::Exn::from(ErrorKind::Missing("source.root")))?;
    let source: SourceHandle =
        Arc::new(LocalSource::new("source", source_root).or_raise(|| ErrorKind::Setup("file source"))?);
    let records_root =
        config.records.root.as_deref().ok_or_else(|| exn::Exn::from(ErrorKind::Missing("records.root")))?;
    let records: RecordsHandle =
        Arc::new(LocalRecords::open("records", records_root).await.or_raise(|| ErrorKind::Setup("record service"))?);
    let store = build_store(config).await?;
    let limiter = RateLimiter::new(config.source.requests_per_second, config.source.burst)
        .or_raise(|| ErrorKind::Setup("rate limiter"))?;
    Ok(Engine::new(source, store, records, limiter, options).with_cancellation(cancel_on_interrupt()))
}

async fn build_store(config: &Config) -> Result<StoreHandle> {
    let target = &config.target;
    match target.backend {
        Backend::Local => {
            let root = target.root.as_deref().ok_or_else(|| exn::Exn::from(ErrorKind::Missing("target.root")))?;
            let store = LocalStore::new("target", root, target.public_url.clone())
                .or_raise(|| ErrorKind::Setup("object store"))?;
            Ok(Arc::new(store))
        },
        #[cfg(feature = "s3")]
        Backend::S3 => {
            let required = |value: &Option<String>, name: &'static str| {
                value.clone().ok_or_else(|| exn::Exn::from(ErrorKind::Missing(name)))
            };
            let store = ferry_storage::backend::S3Store::new(
                "target",
                required(&target.bucket, "target.bucket")?,
                target.prefix.clone(),
                required(&target.region, "target.region")?,
                target.endpoint.clone(),
                target.public_url.clone(),
                required(&target.key_id, "target.key_id")?,
                required(&target.key_secret, "target.key_secret")?,
            )
            .await
            .or_raise(|| ErrorKind::Setup("object store"))?;
            Ok(Arc::new(store))
        },
        #[cfg(not(feature = "s3"))]
        Backend::S3 => exn::bail!(ErrorKind::Unsupported("the s3 backend")),
    }
}

/// A token cancelled on the first Ctrl-C. Files already being processed
/// finish; nothing new starts.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing files in progress");
            token.cancel();
        }
    });
    cancel
}

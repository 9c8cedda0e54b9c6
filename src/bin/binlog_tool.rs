use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use restorekit::binlog::{BinlogCoordinator, RemoteSegment, segment_sequence};
use restorekit::{BinlogDriver, BinlogEvent, BinlogInfo, DumpStream, Profile, RestoreError};
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "binlog-tool")]
#[command(about = "Operator tooling for the local binlog mirror")]
struct Cli {
    /// Profile JSON; `--data-dir` overrides its data directory (default `.`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror the segments of a source directory into the data directory
    Mirror {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        instance: i64,
        #[arg(long)]
        no_refresh_tail: bool,
    },
    /// List the mirrored segments of an instance
    Segments {
        #[arg(long)]
        instance: i64,
    },
    /// Print the events a PITR replay would apply, without applying them
    Events {
        #[arg(long)]
        instance: i64,
        /// Start coordinate as `<segment>:<position>`
        #[arg(long)]
        from: String,
        /// Inclusive cut line, unix seconds
        #[arg(long)]
        until: i64,
    },
}

/// Serves segments from a plain directory, e.g. a copy of a source's binlog dir.
struct DirBinlogSource {
    dir: PathBuf,
}

#[async_trait]
impl BinlogDriver for DirBinlogSource {
    async fn list_binlog_segments(&mut self) -> restorekit::Result<Vec<RemoteSegment>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut segments = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || segment_sequence(&name).is_err() {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                segments.push(RemoteSegment::new(name, metadata.len()));
            }
        }
        Ok(segments)
    }

    async fn read_binlog_segment(&mut self, name: &str, from: u64) -> restorekit::Result<Vec<u8>> {
        let mut file = fs::File::open(self.dir.join(name)).await?;
        file.seek(SeekFrom::Start(from)).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).await?;
        Ok(bytes)
    }

    async fn restore_into(&mut self, database: &str, _dump: &mut DumpStream) -> restorekit::Result<()> {
        Err(RestoreError::Invalid(format!(
            "directory source cannot restore into database {:?}",
            database
        )))
    }

    async fn apply_binlog_event(&mut self, database: &str, event: &BinlogEvent) -> restorekit::Result<()> {
        Err(RestoreError::Invalid(format!(
            "directory source cannot apply event {} to database {:?}",
            event.coordinate, database
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let profile = load_profile(cli.config, cli.data_dir)?;

    match cli.command {
        Command::Mirror {
            source,
            instance,
            no_refresh_tail,
        } => mirror(&profile, source, instance, !no_refresh_tail).await,
        Command::Segments { instance } => list_segments(&profile, instance).await,
        Command::Events {
            instance,
            from,
            until,
        } => print_events(&profile, instance, &from, until).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("restorekit=info,binlog_tool=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_profile(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Profile> {
    let mut profile = match config {
        Some(path) => Profile::from_json_file(&path)
            .with_context(|| format!("Failed to load profile '{}'", path.display()))?,
        None => Profile::default(),
    };
    if let Some(dir) = data_dir {
        profile.data_dir = dir;
    }
    Ok(profile)
}

async fn mirror(profile: &Profile, source: PathBuf, instance: i64, refresh_tail: bool) -> Result<()> {
    let coordinator = BinlogCoordinator::open(profile.binlog_dir(instance)).await?;
    let mut source = DirBinlogSource { dir: source };
    let report = coordinator
        .fetch_all(&mut source, refresh_tail)
        .await
        .with_context(|| format!("Failed to mirror '{}'", source.dir.display()))?;

    for name in &report.fetched {
        println!("fetched  {}", name);
    }
    for name in &report.skipped {
        println!("skipped  {}", name);
    }
    println!(
        "{} fetched, {} skipped, {} bytes written to {}",
        report.fetched.len(),
        report.skipped.len(),
        report.bytes,
        coordinator.dir().display()
    );
    Ok(())
}

async fn list_segments(profile: &Profile, instance: i64) -> Result<()> {
    let coordinator = BinlogCoordinator::open(profile.binlog_dir(instance)).await?;
    for segment in coordinator.segments().await? {
        println!("{:>8}  {:>12}  {}", segment.sequence, segment.size, segment.name);
    }
    Ok(())
}

async fn print_events(profile: &Profile, instance: i64, from: &str, until: i64) -> Result<()> {
    let start = parse_coordinate(from)?;
    let coordinator = BinlogCoordinator::open(profile.binlog_dir(instance))
        .await?
        .with_max_event_bytes(profile.max_binlog_event_bytes);
    let mut replay = coordinator.replay_from(&start, until).await?;

    while let Some(event) = replay.next_event().await? {
        println!("{}\t{}\t{}", event.coordinate, event.timestamp, event.statement);
    }
    eprintln!("{} events up to {}", replay.events_read(), until);
    Ok(())
}

fn parse_coordinate(value: &str) -> Result<BinlogInfo> {
    let (file, position) = value
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("Invalid coordinate '{}': expected <segment>:<position>", value))?;
    let position = position
        .parse::<u64>()
        .with_context(|| format!("Invalid position in coordinate '{}'", value))?;
    if file.is_empty() {
        return Err(anyhow!("Invalid coordinate '{}': empty segment name", value));
    }
    Ok(BinlogInfo::new(file, position))
}

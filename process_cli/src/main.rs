use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use futures::StreamExt;
use svs_process::{
    config::PatternSplit, discover_sources, fullcontext, label, load_config, matching,
    CorpusStats, HyperParameters, MelGenerator, Source, SourceProcessor, SourceReport,
    YinPitchGenerator,
};
use svs_store::{build_metadata, write_metadata, PatternStore};
use tracing::{debug, info, instrument};

mod audio;

use audio::SymphoniaLoader;

#[derive(Debug, clap::Parser)]
#[command(version, about = "Prepare singing voice training patterns")]
enum Command {
    /// Cut every labelled recording into training patterns.
    Generate {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory the corpus and pattern paths are relative to.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long, default_value_t = default_jobs())]
        jobs: usize,
        #[arg(long)]
        no_metadata: bool,
    },
    /// Rebuild the length index of already generated patterns.
    Metadata {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[arg(long, value_enum, default_value_t = SplitArg::Both)]
        split: SplitArg,
    },
    /// Turn a full-context label into a note label.
    ConvertLabels { input: PathBuf, output: PathBuf },
    /// Copy note numbers from a note label onto a mono label.
    MatchNotes {
        mono: PathBuf,
        notes: PathBuf,
        output: PathBuf,
    },
    /// Print the effective configuration as JSON.
    ShowConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    ValidateConfig { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum SplitArg {
    Train,
    Eval,
    Both,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init()
    }

    match Command::parse() {
        Command::Generate {
            config,
            root,
            jobs,
            no_metadata,
        } => {
            if jobs == 0 {
                bail!("--jobs must be at least 1");
            }
            let config = Arc::new(read_config(config.as_deref())?);
            generate(config.clone(), &root, jobs).await?;
            if !no_metadata {
                index_patterns(&config, &root, SplitArg::Both)?;
            }
        }
        Command::Metadata {
            config,
            root,
            split,
        } => {
            let config = read_config(config.as_deref())?;
            index_patterns(&config, &root, split)?;
        }
        Command::ConvertLabels { input, output } => convert_labels(&input, &output)?,
        Command::MatchNotes {
            mono,
            notes,
            output,
        } => match_notes(&mono, &notes, &output)?,
        Command::ShowConfig { config } => {
            let config = read_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::ValidateConfig { path } => {
            load_config(&path)
                .with_context(|| format!("{} is not a valid configuration", path.display()))?;
            info!(path = %path.display(), "configuration is valid");
        }
    };

    Ok(())
}

fn read_config(path: Option<&Path>) -> anyhow::Result<HyperParameters> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => {
            debug!("no configuration given, using defaults");
            Ok(HyperParameters::default())
        }
    }
}

#[instrument(skip(config))]
async fn generate(config: Arc<HyperParameters>, root: &Path, jobs: usize) -> anyhow::Result<()> {
    let sources = discover_sources(
        &root.join(&config.corpus.wav_dir),
        &root.join(&config.corpus.label_dir),
    )
    .context("failed to discover sources")?;
    info!(sources = sources.len(), "discovered corpus");

    let store = Arc::new(PatternStore::from_config(&config, root));
    let mel = Arc::new(MelGenerator::<f32>::default());

    let start = std::time::Instant::now();
    let mut reports = futures::stream::iter(sources.into_iter().map(|source| {
        let (config, store, mel) = (config.clone(), store.clone(), mel.clone());
        tokio::task::spawn_blocking(move || process_source(&config, &store, &mel, &source))
    }))
    .buffer_unordered(jobs);

    let mut patterns = 0;
    let mut stats = CorpusStats::default();
    while let Some(report) = reports.next().await {
        let report = report.context("source worker panicked")??;
        patterns += report.patterns;
        stats = stats.merge(report.stats);
    }

    let elapsed = start.elapsed();
    info!(
        patterns,
        duration = ?stats.duration,
        note = ?stats.note,
        ?elapsed,
        "completed pattern generation"
    );
    Ok(())
}

fn process_source(
    config: &HyperParameters,
    store: &PatternStore,
    mel: &MelGenerator<f32>,
    source: &Source,
) -> anyhow::Result<SourceReport> {
    let processor = SourceProcessor {
        config,
        loader: &SymphoniaLoader,
        mel,
        pitch: &YinPitchGenerator,
    };

    let mut writer = store.for_source(source.index);
    let report = processor
        .process(source, &mut writer)
        .with_context(|| format!("failed to process {}", source.label.display()))?;
    let counts = writer.counts();
    debug!(
        index = source.index,
        train = counts.train,
        eval = counts.eval,
        "source split"
    );
    Ok(report)
}

fn index_patterns(config: &HyperParameters, root: &Path, split: SplitArg) -> anyhow::Result<()> {
    let splits = match split {
        SplitArg::Train => vec![&config.train.train_pattern],
        SplitArg::Eval => vec![&config.train.eval_pattern],
        SplitArg::Both => vec![&config.train.train_pattern, &config.train.eval_pattern],
    };
    for split in splits {
        index_split(config, root, split)?;
    }
    Ok(())
}

#[instrument(skip(config))]
fn index_split(config: &HyperParameters, root: &Path, split: &PatternSplit) -> anyhow::Result<()> {
    let directory = root.join(&split.path);
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("failed to create {}", directory.display()))?;

    let metadata = build_metadata(&directory, &config.sound)
        .with_context(|| format!("failed to index {}", directory.display()))?;
    let path = write_metadata(&directory, &split.metadata_file, &metadata)
        .context("failed to write metadata")?;
    info!(path = %path.display(), patterns = metadata.len(), "wrote metadata");
    Ok(())
}

fn convert_labels(input: &Path, output: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let events = fullcontext::convert_full_context(&content, input)?;
    std::fs::write(output, fullcontext::format_note_labels(&events) + "\n")
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(events = events.len(), output = %output.display(), "converted labels");
    Ok(())
}

fn match_notes(mono: &Path, notes: &Path, output: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(mono)
        .with_context(|| format!("failed to read {}", mono.display()))?;
    let mut labels = matching::parse_mono_labels(&content, mono)?;
    let notes = label::read_labels(notes)?;

    matching::match_notes(&mut labels, &notes);
    std::fs::write(output, matching::format_matched(&labels) + "\n")
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(labels = labels.len(), output = %output.display(), "matched notes");
    Ok(())
}

//! Event camera CLI application.
//!
//! Inspects and replays EVT 3.0 RAW recordings through a camera session.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use evcam_core::{Camera, CdCsvWriter, FieldOrder, Timestamp, TriggerCsvWriter};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Inspect and replay event camera RAW recordings.
#[derive(Parser, Debug)]
#[command(name = "evcam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recording metadata and per-type event statistics
    Info {
        /// Input EVT3 .raw file path
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Replay a recording, optionally exporting events or re-recording it
    Replay(ReplayArgs),
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Input EVT3 .raw file path
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Replay at the speed the events were recorded
    #[arg(long)]
    real_time: bool,

    /// Write CD events to this CSV file
    #[arg(short, long, value_name = "CSV")]
    output: Option<PathBuf>,

    /// Field order for CSV output, e.g. "x,y,p,t" or "t,x,y,p"
    #[arg(short, long, default_value = "x,y,p,t")]
    format: String,

    /// Write external trigger events to this CSV file
    #[arg(short, long, value_name = "CSV")]
    triggers: Option<PathBuf>,

    /// Re-record the raw stream to this path (extension replaced by .raw)
    #[arg(short, long, value_name = "RAW")]
    record: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Info { input } => info(&input),
        Command::Replay(args) => replay(&args),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Blocks until the camera's acquisition thread ends on its own.
fn wait_for_end(camera: &Camera, progress: &ProgressBar, status: impl Fn() -> String) {
    while camera.is_running() {
        progress.set_message(status());
        thread::sleep(Duration::from_millis(50));
    }
}

/// Count and time span of one event type.
#[derive(Debug, Default, Clone, Copy)]
struct EventStats {
    count: u64,
    first: Option<Timestamp>,
    last: Timestamp,
}

impl EventStats {
    fn record(&mut self, count: usize, first: Timestamp, last: Timestamp) {
        self.count += count as u64;
        self.first.get_or_insert(first);
        self.last = last;
    }
}

#[derive(Debug, Default)]
struct ReplayStats {
    cd: EventStats,
    triggers: EventStats,
}

impl ReplayStats {
    fn duration(&self) -> Timestamp {
        self.cd.last.max(self.triggers.last)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn info(input: &Path) -> Result<()> {
    let camera = Camera::from_file(input, false)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let stats = Arc::new(Mutex::new(ReplayStats::default()));
    let sink = Arc::clone(&stats);
    camera.add_cd_callback(move |events| {
        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            sink.lock().cd.record(events.len(), first.timestamp, last.timestamp);
        }
    })?;
    let sink = Arc::clone(&stats);
    camera.add_ext_trigger_callback(move |events| {
        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            sink.lock()
                .triggers
                .record(events.len(), first.timestamp, last.timestamp);
        }
    })?;

    let progress = spinner(false, format!("Analysing {}", file_name(input)));
    camera.start()?;
    wait_for_end(&camera, &progress, || {
        format!("Analysing {}: {} CD events", file_name(input), stats.lock().cd.count)
    });
    camera.stop()?;
    progress.finish_and_clear();

    let stats = stats.lock();
    let geometry = camera.geometry()?;
    let separator = "=".repeat(60);

    println!("{separator}\n");
    println!("{:<20}{}", "Name", file_name(input));
    println!("{:<20}{}", "Path", input.display());
    println!("{:<20}{}", "Duration", human_readable_time(stats.duration()));
    if let Some(generation) = camera.generation()? {
        println!("{:<20}{}", "Camera generation", generation);
    }
    let serial = &camera.configuration()?.serial_number;
    if !serial.is_empty() {
        println!("{:<20}{}", "Camera serial", serial);
    }
    println!("{:<20}{}x{}", "Sensor geometry", geometry.width, geometry.height);
    println!("\n{separator}\n");

    println!(
        "{:<15}{:>18}{:>18}{:>18}{:>16}",
        "Type of event", "Number of events", "First timestamp", "Last timestamp", "Average rate"
    );
    println!("{}", "-".repeat(85));
    let seconds = stats.duration() as f64 / 1e6;
    for (label, event_stats) in [("CD", stats.cd), ("External trigger", stats.triggers)] {
        let Some(first) = event_stats.first else {
            continue;
        };
        let rate = if seconds > 0.0 {
            event_stats.count as f64 / seconds
        } else {
            0.0
        };
        println!(
            "{:<15}{:>18}{:>18}{:>18}{:>16}",
            label,
            event_stats.count,
            first,
            event_stats.last,
            human_readable_rate(rate)
        );
    }
    Ok(())
}

/// CSV destinations fed from the acquisition thread.
#[derive(Default)]
struct Export {
    cd: Option<CdCsvWriter<File>>,
    triggers: Option<TriggerCsvWriter<File>>,
    error: Option<io::Error>,
}

impl Export {
    fn keep_first_error(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        if let Some(writer) = self.cd.as_mut() {
            writer.flush()?;
        }
        if let Some(writer) = self.triggers.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

fn replay(args: &ReplayArgs) -> Result<()> {
    let field_order: FieldOrder = args
        .format
        .parse()
        .context("Invalid field format. Use comma-separated: x,y,p,t")?;

    let camera = Camera::from_file(&args.input, args.real_time)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut export = Export::default();
    if let Some(path) = &args.output {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = CdCsvWriter::new(file, field_order);
        writer
            .write_header(Some(camera.geometry()?))
            .context("Failed to write CSV header")?;
        export.cd = Some(writer);
    }
    if let Some(path) = &args.triggers {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = TriggerCsvWriter::new(file);
        writer
            .write_header()
            .context("Failed to write trigger CSV header")?;
        export.triggers = Some(writer);
    }
    let exporting_cd = export.cd.is_some();
    let exporting_triggers = export.triggers.is_some();
    let export = Arc::new(Mutex::new(export));

    let stats = Arc::new(Mutex::new(ReplayStats::default()));

    // counting alone keeps the decoder running, which the summary needs
    let (cd_export, cd_stats) = (Arc::clone(&export), Arc::clone(&stats));
    camera.add_cd_callback(move |events| {
        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            cd_stats
                .lock()
                .cd
                .record(events.len(), first.timestamp, last.timestamp);
        }
        if exporting_cd {
            let mut export = cd_export.lock();
            if let Some(writer) = export.cd.as_mut() {
                let result = writer.write_events(events);
                export.keep_first_error(result);
            }
        }
    })?;
    let (trigger_export, trigger_stats) = (Arc::clone(&export), Arc::clone(&stats));
    camera.add_ext_trigger_callback(move |events| {
        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            trigger_stats
                .lock()
                .triggers
                .record(events.len(), first.timestamp, last.timestamp);
        }
        if exporting_triggers {
            let mut export = trigger_export.lock();
            if let Some(writer) = export.triggers.as_mut() {
                let result = writer.write_events(events);
                export.keep_first_error(result);
            }
        }
    })?;

    if let Some(path) = &args.record {
        camera
            .start_recording(path)
            .with_context(|| format!("Failed to record to {}", path.display()))?;
        debug!(path = %path.display(), "Re-recording raw stream");
    }

    let progress = spinner(args.quiet, format!("Replaying {}", file_name(&args.input)));
    let start_time = Instant::now();
    camera.start()?;
    wait_for_end(&camera, &progress, || {
        let stats = stats.lock();
        format!(
            "Replaying {}: {} CD events, t = {}",
            file_name(&args.input),
            stats.cd.count,
            human_readable_time(stats.cd.last)
        )
    });
    camera.stop()?;
    let elapsed = start_time.elapsed();

    if let Err(e) = export.lock().finish() {
        bail!("Failed to write CSV output: {e}");
    }

    let stats = stats.lock();
    progress.finish_with_message(format!(
        "Done! Replayed {} events in {:.2}s",
        stats.cd.count + stats.triggers.count,
        elapsed.as_secs_f64()
    ));

    if !args.quiet {
        let events_per_sec = stats.cd.count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {}", args.input.display());
        if let Some(path) = &args.output {
            eprintln!("  Output:       {}", path.display());
        }
        if let Some(path) = &args.record {
            eprintln!("  Recording:    {}", path.with_extension("raw").display());
        }
        eprintln!("  CD Events:    {}", stats.cd.count);
        eprintln!("  Triggers:     {}", stats.triggers.count);
        eprintln!("  Event time:   {}", human_readable_time(stats.duration()));
        eprintln!("  Wall time:    {:.3}s", elapsed.as_secs_f64());
        eprintln!("  Throughput:   {}", human_readable_rate(events_per_sec));
    }

    Ok(())
}

fn human_readable_rate(rate: f64) -> String {
    if rate < 1e3 {
        format!("{rate:.0} ev/s")
    } else if rate < 1e6 {
        format!("{:.1} Kev/s", rate / 1e3)
    } else if rate < 1e9 {
        format!("{:.1} Mev/s", rate / 1e6)
    } else {
        format!("{:.1} Gev/s", rate / 1e9)
    }
}

/// Formats microseconds as `1m 2s 30ms 0us`, starting at the largest
/// non-zero unit.
fn human_readable_time(t: Timestamp) -> String {
    let parts = [
        (t / 86_400_000_000 % 365, "d"),
        (t / 3_600_000_000 % 24, "h"),
        (t / 60_000_000 % 60, "m"),
        (t / 1_000_000 % 60, "s"),
        (t / 1_000 % 1_000, "ms"),
        (t % 1_000, "us"),
    ];
    let shown: Vec<String> = parts
        .iter()
        .skip_while(|(value, _)| *value == 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();
    if shown.is_empty() {
        "0us".to_string()
    } else {
        shown.join(" ")
    }
}

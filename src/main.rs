mod bam_input;
mod classify;
mod cli;
mod config;
mod detect;
mod emit;
mod profile;
mod read;
mod region;
mod stats;
mod sv;
mod types;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use mimalloc::MiMalloc;
use std::io::{self, BufWriter};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const PROGRESS_UPDATE_INTERVAL: u64 = 100_000;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cfg = config::BamConfig::load(&args.config)?;
    let opts = args.to_options(&cfg);
    tracing::info!(
        libraries = cfg.libraries.len(),
        max_read_window_size = opts.max_read_window_size,
        "configuration loaded"
    );

    let bam_paths: Vec<String> = if args.bams.is_empty() {
        cfg.bam_files.clone()
    } else {
        args.bams
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    };

    let lib_info = profile::profile_libraries(&cfg, &opts, &bam_paths)?;

    let (mut alignments, ref_names) = bam_input::MergedAlignments::open(
        &cfg,
        &bam_paths,
        opts.illumina_long_insert,
        opts.need_sequence_data,
    )?;

    let progress = if !args.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(2));
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Failed to set progress bar template"),
        );
        pb.set_message("Scanning alignments...");
        Some(pb)
    } else {
        None
    };

    let stdout = io::stdout().lock();
    let mut detector = detect::Detector::new(
        &opts,
        &cfg,
        &lib_info,
        ref_names,
        BufWriter::new(stdout),
    );
    detector.write_header()?;

    while let Some(read) = alignments.next_read()? {
        detector.push(read);
        if let Some(pb) = &progress {
            let total = detector.stats().total_reads;
            if total % PROGRESS_UPDATE_INTERVAL == 0 {
                pb.set_message(format!("Scanned {total} reads"));
                pb.tick();
            }
        }
    }
    detector.finish()?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed: {} reads scanned",
            detector.stats().total_reads
        ));
    }

    let stats = detector.stats();
    tracing::info!(
        total_reads = stats.total_reads,
        skipped_no_library = alignments.skipped,
        anomalous_reads = stats.anomalous_reads,
        regions_promoted = stats.regions_promoted,
        regions_collapsed = stats.regions_collapsed,
        traversals = stats.traversals,
        calls_emitted = stats.calls_emitted,
        "svscan-rs: processing complete"
    );
    Ok(())
}

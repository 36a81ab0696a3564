// Continuator: CLI entry point.
//
// Loads the configuration and the starting memory, runs one of three modes,
// then saves the grown memory for the next session.
//
// Usage:
//   cargo run -p continuator -- <live|file|batch> [--config FILE] [--seed N]
//     [--memory-in FILE] [--memory-out FILE] [--input FILE.mid]
//     [--output FILE.mid] [--in-port NAME] [--out-port NAME]
//
// Modes:
//   live   Listen on a MIDI input and answer on a MIDI output until the
//          player has been inactive for the configured stop threshold.
//   file   Learn the notes of --input and write a continuation to --output.
//   batch  Learn and continue a fixed set of short pitch sequences, dumping
//          the memory after each one.
//
// Logging goes through env_logger; set RUST_LOG=debug for memory dumps and
// per-step generation detail.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{Context, bail};
use continuator::config::ContinuatorConfig;
use continuator::error::ContinuatorError;
use continuator::generate::generate;
use continuator::live::{MidirTransport, list_ports};
use continuator::memory::Memory;
use continuator::midi_file::{read_notes, write_notes};
use continuator::note::{self, Note};
use continuator::session::{Session, run};
use continuator::train::train;
use continuator_prng::ContinuatorRng;

const BATCH_SEQUENCES: [&[u8]; 5] = [
    &[48, 50, 52, 53],
    &[48, 50, 50, 52],
    &[48, 50],
    &[50, 48],
    &[48],
];

const USAGE: &str = "usage: continuator <live|file|batch> [--config FILE] [--seed N] \
[--memory-in FILE] [--memory-out FILE] [--input FILE.mid] [--output FILE.mid] \
[--in-port NAME] [--out-port NAME]";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str())
        .unwrap_or("live");

    let mut config = match parse_flag::<String>(&args, "--config") {
        Some(path) => ContinuatorConfig::load(Path::new(&path))
            .with_context(|| format!("loading configuration from {path}"))?,
        None => ContinuatorConfig::default(),
    };
    if let Some(seed) = parse_flag::<u64>(&args, "--seed") {
        config.seed = Some(seed);
    }
    config.validate()?;

    let rng = match config.seed {
        Some(seed) => ContinuatorRng::new(seed),
        None => {
            let (rng, seed) = ContinuatorRng::from_clock();
            log::info!("Seeded from clock: {seed} (pass --seed {seed} to replay)");
            rng
        }
    };

    let memory_in = parse_flag::<String>(&args, "--memory-in").unwrap_or_else(|| "PreMemory.json".into());
    let memory_out =
        parse_flag::<String>(&args, "--memory-out").unwrap_or_else(|| "PostMemory.json".into());
    let memory = Memory::load_or_default(Path::new(&memory_in))
        .with_context(|| format!("loading memory from {memory_in}"))?;

    let memory = match mode {
        "live" => run_live(&args, config, memory, rng)?,
        "file" => run_file(&args, &config, memory, rng)?,
        "batch" => run_batch(&config, memory, rng),
        other => bail!("unknown mode '{other}'\n{USAGE}"),
    };

    memory
        .save(Path::new(&memory_out))
        .with_context(|| format!("saving memory to {memory_out}"))?;
    log::info!("Saved memory to {memory_out} ({})", memory.stats());
    Ok(())
}

fn run_live(
    args: &[String],
    config: ContinuatorConfig,
    memory: Memory,
    rng: ContinuatorRng,
) -> anyhow::Result<Memory> {
    let (inputs, outputs) = list_ports()?;
    log::info!("MIDI ports available: input {inputs:?}, output {outputs:?}");

    let in_port: Option<String> = parse_flag(args, "--in-port");
    let out_port: Option<String> = parse_flag(args, "--out-port");
    let epoch = Instant::now();
    let mut transport = MidirTransport::connect(
        in_port.as_deref(),
        out_port.as_deref(),
        config.output_channel,
        epoch,
    )?;

    let mut session = Session::new(config, memory, rng);
    // Nothing clears this yet; the session ends on inactivity.
    let keep_running = AtomicBool::new(true);
    run(&mut session, &mut transport, epoch, &keep_running)?;
    Ok(session.into_memory())
}

fn run_file(
    args: &[String],
    config: &ContinuatorConfig,
    mut memory: Memory,
    mut rng: ContinuatorRng,
) -> anyhow::Result<Memory> {
    let input = parse_flag::<String>(args, "--input").unwrap_or_else(|| "PrePlayed.mid".into());
    let output = parse_flag::<String>(args, "--output").unwrap_or_else(|| "Continuation.mid".into());

    let notes = read_notes(Path::new(&input)).with_context(|| format!("reading {input}"))?;
    learn(&mut memory, &notes, config);

    let seed_start = notes.len().saturating_sub(config.max_played_notes_considered);
    let continuation = generate(
        &memory,
        &notes[seed_start..],
        config.max_continuation_length,
        config,
        &mut rng,
    );
    log::info!(
        "Continuation {:?} ({:?})",
        note::pitches(&continuation.notes),
        continuation.outcome
    );
    write_notes(Path::new(&output), &continuation.notes, config.default_duration_secs)
        .with_context(|| format!("writing {output}"))?;
    Ok(memory)
}

fn run_batch(config: &ContinuatorConfig, mut memory: Memory, mut rng: ContinuatorRng) -> Memory {
    println!("Batch test on: {BATCH_SEQUENCES:?}");
    for pitches in BATCH_SEQUENCES {
        let notes = Note::from_pitches(pitches, config.default_duration_secs, config.default_velocity);
        learn(&mut memory, &notes, config);
        println!("Memory after {pitches:?} ({}):", memory.stats());
        print!("{memory}");
        let continuation = generate(&memory, &notes, config.max_continuation_length, config, &mut rng);
        println!(
            "Continuation generated: {:?} ({:?})",
            note::pitches(&continuation.notes),
            continuation.outcome
        );
    }
    memory
}

/// Train, logging a too-short phrase instead of failing: generation still
/// runs against whatever is already in memory.
fn learn(memory: &mut Memory, notes: &[Note], config: &ContinuatorConfig) {
    match train(memory, notes, config) {
        Ok(report) => log::info!(
            "Learned {} notes ({} copies, {} skipped offsets): {}",
            notes.len(),
            report.copies,
            report.skipped_offsets.len(),
            memory.stats()
        ),
        Err(e @ ContinuatorError::InsufficientContext { .. }) => log::warn!("{e}"),
        Err(e) => log::error!("Training failed: {e}"),
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

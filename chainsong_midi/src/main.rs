// chainsong CLI entry point.
//
// Learns a Markov model from a MIDI performance and writes a new,
// stylistically related performance. The pipeline: load -> learn/analyze
// -> generate -> write.
//
// Usage:
//   chainsong input.mid [--output generated.mid] [--length N] [--seed N]
//     [--order K] [--track NAME] [--rest-threshold SECONDS] [--window N]
//     [--tempo BPM] [--json]
//   chainsong --demo            # fabricate and use the built-in melody

use chainsong_engine::analysis::AnalysisConfig;
use chainsong_engine::assemble::AssembleConfig;
use chainsong_engine::chain::ChainConfig;
use chainsong_engine::composer::{Composer, GenerationRequest};
use chainsong_engine::extract::{ExtractConfig, extract_events};
use chainsong_midi::demo::demo_smf_bytes;
use chainsong_midi::error::MidiError;
use chainsong_midi::file::{load_tracks, write_track};
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), MidiError> {
    let input_path = args
        .get(1)
        .filter(|s| !s.starts_with("--"))
        .map(|s| s.as_str());
    let use_demo = args.iter().any(|a| a == "--demo");
    let json_output = args.iter().any(|a| a == "--json");
    let output_path: String = parse_flag(args, "--output").unwrap_or_else(|| "generated.mid".to_string());
    let length: usize = parse_flag(args, "--length").unwrap_or(50);
    let order: usize = parse_flag(args, "--order").unwrap_or(1);
    let rest_threshold: f64 = parse_flag(args, "--rest-threshold").unwrap_or(0.05);
    let window: usize = parse_flag(args, "--window").unwrap_or(16);
    let tempo: u32 = parse_flag(args, "--tempo").unwrap_or(120);
    let seed: u64 = parse_flag(args, "--seed").unwrap_or_else(seed_from_clock);
    let track_choice: Option<String> = parse_flag(args, "--track");

    println!("=== chainsong ===");

    // Load
    println!("[1/4] Loading MIDI...");
    let bytes = if use_demo {
        let demo = demo_smf_bytes()?;
        std::fs::write("demo_melody.mid", &demo)?;
        println!("  Wrote built-in demo to demo_melody.mid");
        demo
    } else {
        let path = input_path.ok_or_else(|| {
            MidiError::Parse("no input file given (or pass --demo)".to_string())
        })?;
        println!("  Reading {path}");
        std::fs::read(path)?
    };
    let raw_tracks = load_tracks(&bytes)?;
    println!("  {} track(s) with notes.", raw_tracks.len());

    // Learn and analyze
    println!("[2/4] Learning models (order {order})...");
    let extract_config = ExtractConfig { rest_threshold };
    let chain_config = ChainConfig {
        order,
        ..ChainConfig::default()
    };
    let analysis_config = AnalysisConfig {
        entropy_window: window,
        ..AnalysisConfig::default()
    };
    let mut composer = Composer::with_configs(
        chain_config,
        analysis_config,
        AssembleConfig::default(),
    );
    for raw in &raw_tracks {
        let track = extract_events(&raw.events, &extract_config)?;
        match composer.learn_track(&raw.name, track) {
            Ok(()) => {}
            Err(e) => println!("  Skipping {:?}: {e}", raw.name),
        }
    }

    let reports = composer.analyze_all()?;
    if reports.is_empty() {
        return Err(MidiError::NoNotes);
    }
    if json_output {
        println!("{}", serde_json::to_string_pretty(&reports).map_err(|e| {
            MidiError::Parse(format!("report serialization: {e}"))
        })?);
    } else {
        for (name, report) in &reports {
            println!("  {name}:");
            println!("    Notes: {}", report.notes);
            println!("    Rests: {}", report.rests);
            match report.kemeny_constant {
                Some(k) => println!("    Kemeny constant: {k:.2}"),
                None => println!("    Kemeny constant: n/a (chain not ergodic)"),
            }
            println!("    Entropy: {:.3}", report.entropy);
            let preview: Vec<String> = report
                .entropy_timeline
                .iter()
                .take(5)
                .map(|v| format!("{v:.3}"))
                .collect();
            println!("    Entropy timeline (first 5): [{}]", preview.join(", "));
        }
    }

    // Generate
    let source = match track_choice {
        Some(name) => name,
        None => reports
            .keys()
            .next()
            .cloned()
            .unwrap_or_default(),
    };
    println!("[3/4] Generating {length} events from {source:?} (seed {seed})...");
    let generated = composer.generate(&GenerationRequest {
        track: source,
        length,
        start: None,
        seed,
    })?;
    println!(
        "  Generated {} notes and {} rests.",
        generated.notes().count(),
        generated.rests().count()
    );

    // Write
    println!("[4/4] Writing {output_path}...");
    write_track(&generated, tempo, Path::new(&output_path))?;
    println!("  Done. Play with any MIDI player.");
    Ok(())
}

/// Seed for runs without --seed: the wall clock, so repeated runs differ.
/// The chosen value is printed so any run can be reproduced.
fn seed_from_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

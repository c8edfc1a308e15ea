//! mtcopy CLI - memory transfer benchmark and topology report
//!
//! Exercises the transfer engine on freshly allocated buffers and shows the
//! NUMA topology it places workers on.

use clap::Parser;
use mtcopy::config::{parse_size, BenchArgs, CliArgs, Commands, OutputFormat, TransferConfig};
use mtcopy::core::{TransferCoordinator, TransferReport};
use mtcopy::error::{Result, TransferError};
use mtcopy::system::NumaTopology;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    match &args.command {
        Commands::Bench(bench) => cmd_bench(bench),
        Commands::Topology { json } => cmd_topology(*json),
    }
}

fn cmd_topology(json: bool) -> Result<()> {
    let topology = NumaTopology::detect();

    if json {
        println!("{}", serde_json::to_string_pretty(&topology)?);
    } else {
        topology.print_summary();
    }

    Ok(())
}

fn cmd_bench(args: &BenchArgs) -> Result<()> {
    let config = TransferConfig::from_cli(args).map_err(TransferError::Config)?;
    let size = parse_size(&args.size).map_err(TransferError::Config)? as usize;

    if args.items == 0 || args.iterations == 0 {
        return Err(TransferError::config("items and iterations must be at least 1"));
    }

    tracing::debug!("Transfer config: {:?}", config);

    let coordinator = TransferCoordinator::new(config);

    let sources: Vec<Vec<u8>> = (0..args.items)
        .map(|item| (0..size).map(|b| (b as u8).wrapping_add(item as u8)).collect())
        .collect();
    let mut destinations = vec![vec![0u8; size]; args.items];

    let mut reports: Vec<TransferReport> = Vec::with_capacity(args.iterations);

    for iteration in 0..args.iterations {
        destinations.iter_mut().for_each(|d| d.fill(0));

        let src: Vec<&[u8]> = sources.iter().map(|s| s.as_slice()).collect();
        let mut dst: Vec<&mut [u8]> = destinations.iter_mut().map(|d| d.as_mut_slice()).collect();

        let report = coordinator.transfer(&src, &mut dst, args.node)?;
        tracing::info!(
            "Iteration {}: {} in {:.2?} ({}/s)",
            iteration + 1,
            humansize::format_size(report.bytes_copied, humansize::BINARY),
            report.duration,
            humansize::format_size(report.throughput as u64, humansize::BINARY)
        );
        reports.push(report);
    }

    verify(&sources, &destinations)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            if let Some(last) = reports.last() {
                last.print_summary();
            }
            let best = reports.iter().map(|r| r.throughput).fold(0.0, f64::max);
            println!(
                "Best of {}:      {}/s",
                reports.len(),
                humansize::format_size(best as u64, humansize::BINARY)
            );
        }
    }

    Ok(())
}

/// Compare every destination with its source after the last iteration
fn verify(sources: &[Vec<u8>], destinations: &[Vec<u8>]) -> Result<()> {
    let mut failed_items = 0;
    let mut bytes_failed = 0u64;

    for (src, dst) in sources.iter().zip(destinations) {
        let differing = src.iter().zip(dst).filter(|(a, b)| a != b).count();
        if differing > 0 {
            failed_items += 1;
            bytes_failed += differing as u64;
        }
    }

    if failed_items > 0 {
        tracing::warn!("{} unit(s) differ from their source after transfer", failed_items);
        return Err(TransferError::PartialFailure {
            failed_workers: 0,
            failed_items,
            bytes_failed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_counts_differing_units() {
        let sources = vec![vec![1u8; 16], vec![2u8; 16], vec![3u8; 16]];
        let mut destinations = sources.clone();
        assert!(verify(&sources, &destinations).is_ok());

        destinations[1][..4].fill(0);
        match verify(&sources, &destinations) {
            Err(TransferError::PartialFailure { failed_items, bytes_failed, .. }) => {
                assert_eq!(failed_items, 1);
                assert_eq!(bytes_failed, 4);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}

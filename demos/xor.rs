//! Evolve a network that computes XOR.
//!
//! Run with `cargo run --example xor [config.json]`. The optional JSON file may
//! hold any subset of `NeatConfig` fields. Set `RUST_LOG=debug` to watch
//! speciation.

use neat_engine::{Genome, NeatConfig, Population};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_GENERATIONS: usize = 300;
/// Summed absolute error of 0.1 or less over the truth table.
const TARGET_FITNESS: f32 = 10.0;

const XOR_CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

fn xor_fitness(genome: &Genome) -> f32 {
    let error: f32 = XOR_CASES
        .iter()
        .map(|(inputs, expected)| match genome.feed_forward(inputs) {
            Ok(out) => (out[0] - *expected).abs(),
            Err(_) => 1.0,
        })
        .sum();
    1.0 / error.max(0.001)
}

fn load_config() -> Result<NeatConfig, Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => NeatConfig::new(2, 1),
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut population = Population::new(load_config()?)?;
    for _ in 0..MAX_GENERATIONS {
        let report = population.evolve(&xor_fitness);
        if report.best_fitness >= TARGET_FITNESS {
            info!(generation = report.generation, "solution found");
            break;
        }
    }

    let Some(best) = population.best_genome() else {
        return Ok(());
    };
    println!("best fitness: {:.3}", best.fitness);
    println!(
        "nodes: {}, enabled connections: {}",
        best.num_nodes(),
        best.num_enabled_connections()
    );
    for gene in best.connections() {
        println!(
            "  [{:>3}] {:>3} -> {:<3} w={:+.3}{}",
            gene.innovation,
            gene.source,
            gene.target,
            gene.weight,
            if gene.enabled { "" } else { " (disabled)" }
        );
    }
    for (inputs, expected) in &XOR_CASES {
        let out = best.feed_forward(inputs)?;
        println!("  {inputs:?} -> {:.3} (expected {expected})", out[0]);
    }
    Ok(())
}

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use lopater_analyzer::pipeline::{self, BlockVisitor, PipelineConfig};
use lopater_analyzer::stats::{NodeCountReport, NodeCounts};
use lopater_analyzer::world::World;
use lopater_engine::mapblock::MapBlock;
use lopater_engine::world::position::{Position, Region};

/// Count nodes by content type across a voxel world's map database.
#[derive(Debug, Parser)]
#[command(name = "lopater", version)]
struct Cli {
    /// World directory (the one containing world.mt).
    world: PathBuf,

    /// Decoder threads.
    #[arg(short = 't', long, default_value = "2")]
    threads: NonZeroUsize,

    /// Lower corner of the scanned region, in block coordinates.
    #[arg(long, value_name = "X,Y,Z", allow_hyphen_values = true)]
    min: Option<Position>,

    /// Upper corner of the scanned region, in block coordinates.
    #[arg(long, value_name = "X,Y,Z", allow_hyphen_values = true)]
    max: Option<Position>,

    /// Print only the N most frequent content types.
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Describe the single block at this position instead of scanning.
    #[arg(
        long,
        value_name = "X,Y,Z",
        allow_hyphen_values = true,
        conflicts_with_all = ["min", "max", "top"]
    )]
    block: Option<Position>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let world = World::open(&cli.world).await?;
    let result = match cli.block {
        Some(pos) => describe_block(&world, pos, cli.json).await,
        None => count_nodes(&world, &cli).await,
    };
    world.close().await;
    result
}

async fn count_nodes(world: &World, cli: &Cli) -> Result<()> {
    let region = Region::new(
        cli.min.unwrap_or(Region::WORLD.min),
        cli.max.unwrap_or(Region::WORLD.max),
    );
    let config = PipelineConfig {
        workers: cli.threads.get(),
        region,
        ..PipelineConfig::default()
    };

    let outcome = pipeline::run::<_, NodeCounts>(world.storage(), &config).await?;
    let mut report = NodeCountReport::new(outcome);
    if let Some(n) = cli.top {
        report.truncate(n);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

async fn describe_block(world: &World, pos: Position, json: bool) -> Result<()> {
    let Some(block) = world.get_block(pos).await? else {
        println!("No block stored at {pos}");
        return Ok(());
    };

    let mut counts = NodeCounts::default();
    counts.visit(pos, &block);

    if json {
        let value = serde_json::json!({
            "position": [pos.x, pos.y, pos.z],
            "version": block.version,
            "flags": block.flags,
            "lighting_complete": block.lighting_complete,
            "timestamp": block.timestamp,
            "mappings": sorted_mappings(&block),
            "node_meta_len": block.node_meta.len(),
            "static_objects": block.static_objects.len(),
            "node_timers": block.node_timers.len(),
            "counts": counts.ranked(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Block {pos}");
    println!("  version            {}", block.version);
    println!("  flags              {:#04x}", block.flags);
    println!("  lighting complete  {:#06x}", block.lighting_complete);
    println!("  timestamp          {}", block.timestamp);
    println!("  node metadata      {} bytes", block.node_meta.len());
    println!("  static objects     {}", block.static_objects.len());
    println!("  node timers        {}", block.node_timers.len());
    println!("  mappings:");
    for (id, name) in sorted_mappings(&block) {
        println!("    {id:>5}  {name}");
    }
    println!("  nodes:");
    for entry in counts.ranked() {
        println!("    {:>5}  {}", entry.count, entry.name);
    }
    Ok(())
}

fn sorted_mappings(block: &MapBlock) -> Vec<(u16, &str)> {
    let mut mappings: Vec<_> = block
        .mappings
        .iter()
        .map(|(id, name)| (*id, name.as_str()))
        .collect();
    mappings.sort();
    mappings
}

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use louvain_community::logger::init_logger;
use louvain_community::{read_edge_file, write_assignments, Louvain, LouvainConfig, WeightedGraph};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Edge list file, one `u v [weight]` record per line.
    #[arg(short, long)]
    input: PathBuf,

    /// Write `node<TAB>community` lines to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML configuration file, flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed of the visiting order.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Maximum passes of local moving and aggregation.
    #[arg(long)]
    max_passes: Option<usize>,

    /// Maximum local moving rounds per pass.
    #[arg(long)]
    max_local_rounds: Option<usize>,

    /// Sum the weights of repeated edges instead of keeping the last one.
    #[arg(long, default_value_t = false)]
    merge_duplicates: bool,

    /// Write a JSON summary of the run to this file.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Number of largest communities printed.
    #[arg(short, long, default_value_t = 10)]
    top: usize,

    /// Append log records to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn louvain_config(&self) -> Result<LouvainConfig> {
        let mut config = match &self.config {
            Some(path) => LouvainConfig::from_yaml_file(path)?,
            None => LouvainConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(passes) = self.max_passes {
            config = config.with_max_passes(passes);
        }
        if let Some(rounds) = self.max_local_rounds {
            config = config.with_max_local_rounds(rounds);
        }
        if self.merge_duplicates {
            config = config.with_merge_duplicates(true);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args: Args = Args::parse();
    init_logger(args.log_file.as_deref())?;
    let config = args.louvain_config()?;

    // Step 1: Load the graph.
    let edges = read_edge_file(&args.input, config.merge_duplicates)?;
    let graph = WeightedGraph::from_edges(edges);
    info!(
        "Loaded {}: {} vertices, {} edges",
        args.input.display(),
        graph.vertex_count(),
        graph.edge_count()
    );

    // Step 2: Detect communities.
    let start = Instant::now();
    let louvain = Louvain::new(graph, config);
    let run = louvain.run();
    let duration = start.elapsed();

    // Step 3: Report.
    for (index, community) in run.communities.iter().take(args.top).enumerate() {
        println!("Community {} : {:?}", index + 1, community);
    }
    println!("Total communities: {}", run.communities.len());
    println!("Termination: {}", run.termination);
    if let Some(modularity) = run.modularity() {
        println!("Modularity: {:.6}", modularity);
    }
    println!("Louvain Elapsed Time: {:?} us", duration.as_micros());

    if let Some(output) = &args.output {
        write_assignments(output, &run.assignments())?;
        info!("Assignments written to {}", output.display());
    }

    if let Some(summary) = &args.summary {
        let file = File::create(summary)
            .with_context(|| format!("failed to create summary {}", summary.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &run)
            .with_context(|| format!("failed to write summary {}", summary.display()))?;
    }
    Ok(())
}

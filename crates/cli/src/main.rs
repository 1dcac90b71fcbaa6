use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recallkit_core::{config, pipeline, DistanceMetric, HnswIndex, Index, SearchIndex};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

type DenseIndex = HnswIndex<u32, Vec<f32>, DistanceMetric>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Metric {
    Cosine,
    InnerProduct,
    Euclidean,
    Manhattan,
    Canberra,
    BrayCurtis,
    Correlation,
}

impl From<Metric> for DistanceMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Cosine => DistanceMetric::Cosine,
            Metric::InnerProduct => DistanceMetric::InnerProduct,
            Metric::Euclidean => DistanceMetric::Euclidean,
            Metric::Manhattan => DistanceMetric::Manhattan,
            Metric::Canberra => DistanceMetric::Canberra,
            Metric::BrayCurtis => DistanceMetric::BrayCurtis,
            Metric::Correlation => DistanceMetric::Correlation,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "recallkit",
    about = "Build an HNSW index over seeded random vectors and measure its recall"
)]
struct Args {
    /// Number of indexed vectors
    #[arg(short = 'n', long, default_value_t = 10_000)]
    items: usize,

    /// Vector dimensionality
    #[arg(short, long, default_value_t = 32)]
    dim: usize,

    /// Number of probe queries
    #[arg(short, long, default_value_t = 200)]
    queries: usize,

    /// Neighbors per query
    #[arg(short, default_value_t = 10)]
    k: usize,

    /// Links per node on upper layers (layer 0 keeps twice as many)
    #[arg(long, default_value_t = config::HNSW_DEFAULT_M)]
    m: usize,

    /// Candidate list size at query time
    #[arg(long, default_value_t = config::HNSW_DEFAULT_EF)]
    ef: usize,

    /// Candidate list size while building
    #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_CONSTRUCTION)]
    ef_construction: usize,

    /// Distance metric
    #[arg(long, value_enum, default_value_t = Metric::Cosine)]
    metric: Metric,

    /// Partitions of the evaluation dataset
    #[arg(short, long, default_value_t = config::DEFAULT_NUM_PARTITIONS)]
    partitions: usize,

    /// Seed for data generation and level assignment
    #[arg(long, default_value_t = config::HNSW_DEFAULT_SEED)]
    seed: u64,

    /// Load the index from this snapshot instead of building one.
    /// The snapshot's own build parameters are used.
    #[arg(long, conflicts_with_all = ["items", "dim", "m", "ef", "ef_construction", "metric"])]
    load: Option<PathBuf>,

    /// Save the index to this path after evaluation
    #[arg(long)]
    save: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn build_index(args: &Args) -> Result<DenseIndex, Box<dyn std::error::Error>> {
    let mut index: DenseIndex =
        HnswIndex::builder(args.dim, DistanceMetric::from(args.metric), args.items)
            .m(args.m)
            .ef(args.ef)
            .ef_construction(args.ef_construction)
            .seed(args.seed)
            .build()?;

    let start = Instant::now();
    let items = random_vectors(args.items, args.dim, args.seed)
        .into_iter()
        .enumerate()
        .map(|(i, v)| recallkit_core::Item::new(i as u32, v));
    index.add_all_with_progress(items, |done, total| {
        tracing::info!("Indexed {}/{} items", done, total);
    })?;
    tracing::info!(
        "Built index over {} items in {:?} (m={}, ef_construction={})",
        index.len(),
        start.elapsed(),
        args.m,
        args.ef_construction
    );
    Ok(index)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt().with_env_filter(
        EnvFilter::from_default_env()
            .add_directive("recallkit=info".parse().expect("valid directive literal"))
            .add_directive(
                "recallkit_core=info"
                    .parse()
                    .expect("valid directive literal"),
            ),
    );
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if args.k == 0 || args.k > config::MAX_K {
        eprintln!("Error: k must be between 1 and {}", config::MAX_K);
        std::process::exit(1);
    }
    if args.load.is_none() && (args.items == 0 || args.dim == 0) {
        eprintln!("Error: items and dim must be > 0");
        std::process::exit(1);
    }
    if args.partitions == 0 {
        eprintln!("Error: partitions must be > 0");
        std::process::exit(1);
    }

    let index = match &args.load {
        Some(path) => {
            tracing::info!("Loading index from {:?}", path);
            let index = DenseIndex::load_from_path(path)?;
            tracing::info!(
                "Using snapshot parameters: {} items, dim={}, m={}, ef={}, ef_construction={}, metric={:?}",
                index.len(),
                index.dimensions(),
                index.m(),
                index.ef(),
                index.ef_construction(),
                index.distance_function()
            );
            index
        }
        None => build_index(&args)?,
    };

    let probes = random_vectors(
        args.queries,
        index.dimensions(),
        args.seed.wrapping_add(1),
    );
    let recall = pipeline::measure_recall(&index, &probes, args.k, args.partitions)?;
    println!("recall@{} = {:.4} (ef={}, {} queries)", args.k, recall, index.ef(), probes.len());

    if let Some(path) = &args.save {
        index.save_to_path(path)?;
        tracing::info!("Saved index to {:?}", path);
    }
    Ok(())
}

use knncolle::prelude::{find_nearest_neighbors, Algorithm, Distance, ObservationIndex, SearchConfig, SimpleMatrix};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    data_json: Option<PathBuf>,
    config: SearchConfig,
    k: usize,
    limit_train: Option<usize>,
    limit_test: Option<usize>,
    synthetic_train: usize,
    synthetic_test: usize,
    dim: usize,
    seed: u64,
    all_neighbors: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            data_json: None,
            config: SearchConfig::default(),
            k: 10,
            limit_train: None,
            limit_test: None,
            synthetic_train: 10_000,
            synthetic_test: 200,
            dim: 16,
            seed: 42,
            all_neighbors: false,
        }
    }
}

#[derive(Debug)]
struct BenchmarkData {
    train: Vec<f32>,
    test: Vec<Vec<f32>>,
    num_train: usize,
    source: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct BenchmarkReport {
    dataset: String,
    algorithm: Algorithm,
    distance: Distance,
    k: usize,
    train_size: usize,
    test_size: usize,
    dimension: usize,
    build_seconds: f64,
    search_seconds: f64,
    qps: f64,
    recall_at_k: f64,
    all_neighbors_seconds: Option<f64>,
    threads: usize,
}

#[derive(Debug, Deserialize)]
struct JsonDataset {
    train: Vec<Vec<f32>>,
    test: Vec<Vec<f32>>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let data = if let Some(path) = &args.data_json {
        load_json_dataset(path, args.limit_train, args.limit_test)?
    } else {
        generate_synthetic_dataset(args.synthetic_train, args.synthetic_test, args.dim, args.seed)
    };
    tracing::info!(
        dataset = %data.source,
        train = data.num_train,
        test = data.test.len(),
        dim = data.dimension,
        "loaded dataset"
    );

    let num_train = ObservationIndex::try_from(data.num_train)?;
    let matrix = SimpleMatrix::new(data.dimension, num_train, &data.train)?;

    let build_start = Instant::now();
    let index = args.config.build_builder::<f32>()?.build(&matrix)?;
    let build_seconds = build_start.elapsed().as_secs_f64();
    tracing::info!(seconds = build_seconds, algorithm = ?args.config.algorithm, "built index");

    let search_start = Instant::now();
    let mut retrieved: Vec<Vec<ObservationIndex>> = Vec::with_capacity(data.test.len());
    {
        let mut searcher = index.initialize();
        let mut indices = Vec::with_capacity(args.k);
        for query in &data.test {
            searcher.search_query(query, args.k, Some(&mut indices), None)?;
            retrieved.push(indices.clone());
        }
    }
    let search_seconds = search_start.elapsed().as_secs_f64();

    let ground_truth = exact_ground_truth(&args.config, &matrix, &data.test, args.k)?;
    let recall_at_k = average_recall_at_k(&retrieved, &ground_truth, args.k);
    let qps = if search_seconds > 0.0 {
        data.test.len() as f64 / search_seconds
    } else {
        0.0
    };

    let threads = if args.config.num_threads == 0 {
        rayon::current_num_threads()
    } else {
        args.config.num_threads
    };
    let all_neighbors_seconds = if args.all_neighbors {
        let start = Instant::now();
        let all = find_nearest_neighbors(index.as_ref(), args.k, threads)?;
        let seconds = start.elapsed().as_secs_f64();
        tracing::info!(observations = all.len(), seconds, threads, "searched all observations");
        Some(seconds)
    } else {
        None
    };

    let report = BenchmarkReport {
        dataset: data.source,
        algorithm: args.config.algorithm,
        distance: args.config.distance,
        k: args.k,
        train_size: data.num_train,
        test_size: data.test.len(),
        dimension: data.dimension,
        build_seconds,
        search_seconds,
        qps,
        recall_at_k,
        all_neighbors_seconds,
        threads,
    };

    println!("=== k-NN benchmark report ===");
    println!("dataset: {}", report.dataset);
    println!("algorithm: {:?}", report.algorithm);
    println!("distance: {:?}", report.distance);
    println!("k: {}", report.k);
    println!(
        "train/test/dim: {}/{}/{}",
        report.train_size, report.test_size, report.dimension
    );
    println!("build_seconds: {:.6}", report.build_seconds);
    println!("search_seconds: {:.6}", report.search_seconds);
    println!("qps: {:.2}", report.qps);
    println!("recall@{}: {:.6}", report.k, report.recall_at_k);
    if let Some(seconds) = report.all_neighbors_seconds {
        println!("all_neighbors_seconds ({} threads): {:.6}", report.threads, seconds);
    }
    println!("json: {}", serde_json::to_string(&report)?);

    Ok(())
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(flag) = it.next() {
        if flag == "--help" || flag == "-h" {
            print_help();
            std::process::exit(0);
        }
        if flag == "--all-neighbors" {
            args.all_neighbors = true;
            continue;
        }

        let value = it.next();
        match flag.as_str() {
            "--data-json" => {
                let v = required_value(&flag, value)?;
                args.data_json = Some(PathBuf::from(v));
            }
            "--config" => {
                let v = required_value(&flag, value)?;
                args.config = SearchConfig::from_json_file(&PathBuf::from(v))?;
            }
            "--algorithm" => {
                let v = required_value(&flag, value)?;
                args.config.algorithm = parse_algorithm(&v)?;
            }
            "--distance" => {
                let v = required_value(&flag, value)?;
                args.config.distance = parse_distance(&v)?;
            }
            "--power" => {
                let v = required_value(&flag, value)?;
                args.config.kmknn.power = v.parse()?;
            }
            "--threads" => {
                let v = required_value(&flag, value)?;
                args.config.num_threads = v.parse()?;
            }
            "--k" => {
                let v = required_value(&flag, value)?;
                args.k = v.parse()?;
            }
            "--limit-train" => {
                let v = required_value(&flag, value)?;
                args.limit_train = Some(v.parse()?);
            }
            "--limit-test" => {
                let v = required_value(&flag, value)?;
                args.limit_test = Some(v.parse()?);
            }
            "--synthetic-train" => {
                let v = required_value(&flag, value)?;
                args.synthetic_train = v.parse()?;
            }
            "--synthetic-test" => {
                let v = required_value(&flag, value)?;
                args.synthetic_test = v.parse()?;
            }
            "--dim" => {
                let v = required_value(&flag, value)?;
                args.dim = v.parse()?;
            }
            "--seed" => {
                let v = required_value(&flag, value)?;
                args.seed = v.parse()?;
            }
            _ => {
                return Err(format!("unknown argument: {flag}").into());
            }
        }
    }

    args.config.validate()?;
    Ok(args)
}

fn required_value(flag: &str, value: Option<String>) -> Result<String, Box<dyn Error>> {
    value.ok_or_else(|| format!("missing value for {flag}").into())
}

fn parse_algorithm(s: &str) -> Result<Algorithm, Box<dyn Error>> {
    match s {
        "bruteforce" | "brute-force" | "brute_force" => Ok(Algorithm::Bruteforce),
        "vptree" | "vp-tree" => Ok(Algorithm::Vptree),
        "kmknn" => Ok(Algorithm::Kmknn),
        _ => Err(format!("unsupported algorithm: {s}").into()),
    }
}

fn parse_distance(s: &str) -> Result<Distance, Box<dyn Error>> {
    match s {
        "euclidean" | "l2" => Ok(Distance::Euclidean),
        "manhattan" | "l1" => Ok(Distance::Manhattan),
        "cosine" => Ok(Distance::Cosine),
        _ => Err(format!("unsupported distance: {s}").into()),
    }
}

fn print_help() {
    println!(
        "knn_benchmark\n\
        Exact k-nearest neighbor benchmark runner for knncolle.\n\n\
        Usage:\n\
          cargo run --release --bin knn_benchmark -- [options]\n\n\
        Options:\n\
          --data-json <path>          JSON file with train/test arrays\n\
          --config <path>             JSON search configuration\n\
          --algorithm <name>          bruteforce|vptree|kmknn\n\
          --distance <name>           euclidean|manhattan|cosine\n\
          --power <float>             KMKNN cluster exponent (default: 0.5)\n\
          --threads <int>             threads for --all-neighbors (default: all)\n\
          --k <int>                   neighbors to retrieve (default: 10)\n\
          --all-neighbors             also time the search over all observations\n\
          --limit-train <int>         cap train rows from input JSON\n\
          --limit-test <int>          cap test rows from input JSON\n\
          --synthetic-train <int>     train vectors for synthetic mode\n\
          --synthetic-test <int>      test vectors for synthetic mode\n\
          --dim <int>                 dimensionality for synthetic mode\n\
          --seed <int>                RNG seed for synthetic mode\n\
          --help                      print this help\n\n\
        Logging is controlled by RUST_LOG (default: info).\n"
    );
}

fn load_json_dataset(
    path: &PathBuf,
    limit_train: Option<usize>,
    limit_test: Option<usize>,
) -> Result<BenchmarkData, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let mut json: JsonDataset = serde_json::from_str(&raw)?;

    if let Some(n) = limit_train {
        json.train.truncate(n.min(json.train.len()));
    }
    if let Some(n) = limit_test {
        json.test.truncate(n.min(json.test.len()));
    }
    if json.train.is_empty() || json.test.is_empty() {
        return Err("dataset JSON must include non-empty train/test".into());
    }

    let dim = json.train[0].len();
    if json.train.iter().chain(json.test.iter()).any(|row| row.len() != dim) {
        return Err(format!("all train/test rows must have {dim} dimensions").into());
    }

    Ok(BenchmarkData {
        num_train: json.train.len(),
        train: json.train.concat(),
        test: json.test,
        source: path.display().to_string(),
        dimension: dim,
    })
}

fn generate_synthetic_dataset(
    train_size: usize,
    test_size: usize,
    dim: usize,
    seed: u64,
) -> BenchmarkData {
    let mut rng = StdRng::seed_from_u64(seed);
    let train: Vec<f32> = (0..train_size * dim)
        .map(|_| rng.sample(StandardNormal))
        .collect();
    let test: Vec<Vec<f32>> = (0..test_size)
        .map(|_| (0..dim).map(|_| rng.sample(StandardNormal)).collect())
        .collect();

    BenchmarkData {
        train,
        test,
        num_train: train_size,
        source: format!("synthetic_n{}_q{}_d{}", train_size, test_size, dim),
        dimension: dim,
    }
}

/// Reference neighbors from a brute-force search with the same distance.
fn exact_ground_truth(
    config: &SearchConfig,
    matrix: &SimpleMatrix<'_, f32>,
    queries: &[Vec<f32>],
    k: usize,
) -> Result<Vec<Vec<ObservationIndex>>, Box<dyn Error>> {
    let reference = config
        .clone()
        .with_algorithm(Algorithm::Bruteforce)
        .build_builder::<f32>()?
        .build(matrix)?;
    let mut searcher = reference.initialize();

    let mut truth = Vec::with_capacity(queries.len());
    for query in queries {
        let mut indices = Vec::new();
        searcher.search_query(query, k, Some(&mut indices), None)?;
        truth.push(indices);
    }
    Ok(truth)
}

fn average_recall_at_k(
    retrieved: &[Vec<ObservationIndex>],
    ground_truth: &[Vec<ObservationIndex>],
    k: usize,
) -> f64 {
    if retrieved.is_empty() || ground_truth.is_empty() || k == 0 {
        return 0.0;
    }

    let n = retrieved.len().min(ground_truth.len());
    let mut total = 0.0f64;

    for i in 0..n {
        let expected = &ground_truth[i];
        if expected.is_empty() {
            total += 1.0;
            continue;
        }
        let hits = retrieved[i]
            .iter()
            .take(k)
            .filter(|id| expected.iter().take(k).any(|gt_id| gt_id == *id))
            .count();
        total += hits as f64 / expected.len().min(k) as f64;
    }

    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_at_k_basic() {
        let retrieved = vec![vec![1, 2, 3], vec![5, 7, 9]];
        let gt = vec![vec![1, 4, 3], vec![5, 6, 7]];
        let recall = average_recall_at_k(&retrieved, &gt, 3);
        assert!((recall - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn ground_truth_matches_exact_search() {
        let data = generate_synthetic_dataset(200, 5, 4, 7);
        let matrix = SimpleMatrix::new(4, 200, &data.train).unwrap();
        let config = SearchConfig::new().with_algorithm(Algorithm::Kmknn);
        let truth = exact_ground_truth(&config, &matrix, &data.test, 5).unwrap();

        let index = config.build_builder::<f32>().unwrap().build(&matrix).unwrap();
        let mut searcher = index.initialize();
        let mut retrieved = Vec::new();
        for query in &data.test {
            let mut indices = Vec::new();
            searcher.search_query(query, 5, Some(&mut indices), None).unwrap();
            retrieved.push(indices);
        }
        assert_eq!(average_recall_at_k(&retrieved, &truth, 5), 1.0);
    }

    #[test]
    fn parses_names() {
        assert_eq!(parse_algorithm("vp-tree").unwrap(), Algorithm::Vptree);
        assert_eq!(parse_distance("l1").unwrap(), Distance::Manhattan);
        assert!(parse_algorithm("annoy").is_err());
    }
}

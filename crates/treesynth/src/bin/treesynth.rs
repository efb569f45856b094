//! Command-line front end: snap training data, inspect, emit and check
//! dumped models.
//!
//! ```text
//! treesynth snap train.json --bits 8 -o train_8bit.json
//! treesynth inspect model.json --bits 8
//! treesynth emit model.json --bits 8 --name hog_forest -o hog_forest.vhd
//! treesynth check model.json data.json --bits 8 --details --threads 4
//! ```
//!
//! Emitted circuits read features in `[-2, 2)`, so train on data normalized
//! into that range.
//!
//! Set `RUST_LOG` to adjust verbosity (default `info`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ndarray::Array2;
use tracing::info;
use tracing_subscriber::EnvFilter;

use treesynth::compat::sklearn::{Dataset, ModelKind, SklearnModel};
use treesynth::metrics::{accuracy, ConfusionMatrix};
use treesynth::source::{ReferenceForest, ReferenceTree};
use treesynth::{
    run_with_threads, ClassLabel, Classifier, EquivalenceChecker, Error, HardwareEmitter, HdlModel,
    QuantizedForest, QuantizedTree, Result, SynthConfig, TreeExtractor,
};

#[derive(Parser)]
#[command(
    name = "treesynth",
    version,
    about = "Fixed-point decision trees and random forests for hardware"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Snap dataset features to the fixed-point grid before training
    Snap {
        /// Dataset JSON: {"features": [[...]], "targets": [...]}
        data: PathBuf,
        /// Fractional bits per feature
        #[arg(short, long, default_value_t = 8)]
        bits: u32,
        /// Output dataset JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print tree and forest statistics
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Write the quantized model as VHDL
    Emit {
        #[command(flatten)]
        model: ModelArgs,
        /// Output .vhd file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Library member entities are instantiated from
        #[arg(long, default_value = "work")]
        library: String,
    },
    /// Compare float and quantized predictions on a dataset
    Check {
        #[command(flatten)]
        model: ModelArgs,
        /// Dataset JSON: {"features": [[...]], "targets": [...]}, optionally
        /// with the trained model's own "predictions"
        data: PathBuf,
        /// List every disagreeing sample
        #[arg(long)]
        details: bool,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model JSON dumped from scikit-learn
    model: PathBuf,
    /// Fractional bits per feature and threshold
    #[arg(short, long, default_value_t = 8)]
    bits: u32,
    /// Model name (default: from the dump, else the file stem)
    #[arg(long)]
    name: Option<String>,
    /// Worker threads (default: sequential)
    #[arg(long)]
    threads: Option<NonZeroUsize>,
}

/// A loaded dump together with its quantized counterpart.
struct Loaded {
    source: SklearnModel,
    config: SynthConfig,
    model: Quantized,
}

enum Quantized {
    Tree(QuantizedTree),
    Forest(QuantizedForest),
}

impl Quantized {
    fn as_hdl(&self) -> HdlModel<'_> {
        match self {
            Quantized::Tree(tree) => HdlModel::Tree(tree),
            Quantized::Forest(forest) => HdlModel::Forest(forest),
        }
    }

    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Quantized::Tree(tree) => tree,
            Quantized::Forest(forest) => forest,
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            Quantized::Tree(tree) => tree.n_classes(),
            Quantized::Forest(forest) => forest.n_classes(),
        }
    }

    fn trees(&self) -> Vec<&QuantizedTree> {
        match self {
            Quantized::Tree(tree) => vec![tree],
            Quantized::Forest(forest) => forest.trees().collect(),
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Only fails if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Snap { data, bits, output } => {
            let snapped = Dataset::load_json(&data)?.snapped(bits)?;
            match output {
                Some(path) => {
                    snapped.save_json(&path)?;
                    info!(path = %path.display(), bits, "wrote snapped dataset");
                }
                None => {
                    let mut out = io::stdout().lock();
                    snapped.write_json(&mut out)?;
                    writeln!(out)?;
                }
            }
            Ok(())
        }
        Command::Inspect { model } => {
            let loaded = load(&model)?;
            inspect(&loaded)
        }
        Command::Emit {
            model,
            output,
            library,
        } => {
            let loaded = load(&model)?;
            let emitter = HardwareEmitter::new().with_library(&library);
            match output {
                Some(path) => {
                    emitter.emit_to(loaded.model.as_hdl(), BufWriter::new(File::create(&path)?))?;
                    info!(path = %path.display(), "wrote VHDL");
                }
                None => emitter.emit_to(loaded.model.as_hdl(), io::stdout().lock())?,
            }
            Ok(())
        }
        Command::Check {
            model,
            data,
            details,
        } => {
            let n_threads = model.threads.map_or(1, NonZeroUsize::get);
            let loaded = load(&model)?;
            let dataset = Dataset::load_json(&data)?;
            run_with_threads(n_threads, |_| check(&loaded, &dataset, details))?
        }
    }
}

fn load(args: &ModelArgs) -> Result<Loaded> {
    let source = SklearnModel::load_json(&args.model)?;
    let name = args
        .name
        .clone()
        .or_else(|| source.name.clone())
        .or_else(|| file_stem(&args.model))
        .unwrap_or_else(|| "tree".to_string());
    let config = SynthConfig::builder()
        .name(name)
        .n_features(source.n_features)
        .bits_per_feature(args.bits)
        .maybe_n_threads(args.threads)
        .build()?;
    let extractor = TreeExtractor::new(config.clone())?;

    let model = match source.kind {
        ModelKind::Tree => {
            let tree = source.trees.first().ok_or(Error::EmptyModel)?;
            Quantized::Tree(extractor.extract_tree(tree)?)
        }
        ModelKind::Forest => Quantized::Forest(extractor.extract_forest(&source.trees)?),
    };
    info!(
        model = %config.name,
        n_trees = source.trees.len(),
        bits = config.bits_per_feature,
        "loaded model"
    );
    Ok(Loaded {
        source,
        config,
        model,
    })
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

fn inspect(loaded: &Loaded) -> Result<()> {
    let mut out = io::stdout().lock();
    let trees = loaded.model.trees();
    writeln!(
        out,
        "{}: {} tree(s), {} features at {} fractional bits",
        loaded.config.name,
        trees.len(),
        loaded.config.n_features,
        loaded.config.bits_per_feature
    )?;
    for tree in &trees {
        writeln!(out, "  {}", tree.stats())?;
    }
    let mut universe: Vec<ClassLabel> = trees
        .iter()
        .flat_map(|t| t.class_universe())
        .collect();
    universe.sort_unstable();
    universe.dedup();
    writeln!(out, "reachable classes: {universe:?}")?;
    Ok(())
}

fn check(loaded: &Loaded, dataset: &Dataset, details: bool) -> Result<()> {
    let samples: Array2<f64> = dataset.to_array()?;
    let n_classes = loaded.model.n_classes();
    dataset.validate_labels(n_classes)?;
    let n_features = loaded.config.n_features;
    let parallelism = loaded.config.parallelism();

    let source_tree;
    let source_forest;
    let reference: &dyn Classifier = match loaded.source.kind {
        ModelKind::Tree => {
            let tree = loaded.source.trees.first().ok_or(Error::EmptyModel)?;
            source_tree = ReferenceTree::new(tree, n_features);
            &source_tree
        }
        ModelKind::Forest => {
            source_forest =
                ReferenceForest::new(&loaded.source.trees, n_features).with_parallelism(parallelism);
            &source_forest
        }
    };
    let quantized = loaded.model.as_classifier();

    let checker = EquivalenceChecker::new()
        .with_details(details)
        .with_parallelism(parallelism);

    let report = checker.compare(reference, quantized, samples.view())?;
    println!("float vs quantized: {report}");
    if let Some(recorded) = &dataset.predictions {
        let report = checker.compare_labels(recorded, quantized, samples.view())?;
        println!("model predictions vs quantized: {report}");
        println!("model accuracy: {:.4}", accuracy(&dataset.targets, recorded)?);
    }

    let predictors: [(&str, &dyn Classifier); 2] = [("float", reference), ("quantized", quantized)];
    let targets = checker.compare_to_targets(&dataset.targets, &predictors, samples.view())?;
    print!("{targets}");

    let predicted = samples
        .rows()
        .into_iter()
        .map(|row| quantized.predict(&row.to_vec()))
        .collect::<Result<Vec<_>>>()?;
    println!("quantized accuracy: {:.4}", accuracy(&dataset.targets, &predicted)?);
    let confusion = ConfusionMatrix::from_labels(&dataset.targets, &predicted, n_classes)?;
    print!("confusion matrix:\n{confusion}");
    Ok(())
}

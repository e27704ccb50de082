//! `nnpool` - run and time pooling operators on the CPU backend.
//!
//! # Commands
//!
//! - `bench` - run one operator on seeded random input and report timings
//! - `schemas` - list the versioned operator table

mod bench;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nnpool::ops::schemas;

#[derive(Parser)]
#[command(name = "nnpool")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time a pooling operator on random input
    ///
    /// Examples:
    ///   nnpool bench --op MaxPool --shape 8,64,56,56 --kernel 3,3 --strides 2,2 --pads 1,1,1,1
    ///   nnpool bench --op AveragePool --opset 19 --shape 1,3,32,32 --kernel 2,2 --dilations 2,2
    Bench(BenchArgs),
    /// Print every operator version range with its dtypes and optional attributes
    Schemas,
}

#[derive(clap::Args, Debug)]
pub struct BenchArgs {
    /// Operator name, e.g. MaxPool, AveragePool, LpPool, GlobalMaxPool
    #[arg(long, default_value = "MaxPool")]
    pub op: String,

    /// Operator set version used to pick the schema
    #[arg(long, default_value_t = 12)]
    pub opset: u32,

    /// Input shape `N,C,D1[,D2[,D3]]`
    #[arg(long, value_delimiter = ',', required = true)]
    pub shape: Vec<usize>,

    #[arg(long, value_delimiter = ',')]
    pub kernel: Vec<i64>,

    #[arg(long, value_delimiter = ',')]
    pub strides: Vec<i64>,

    /// `begin..., end...`
    #[arg(long, value_delimiter = ',')]
    pub pads: Vec<i64>,

    #[arg(long, value_delimiter = ',')]
    pub dilations: Vec<i64>,

    /// NOTSET, VALID, SAME_UPPER or SAME_LOWER
    #[arg(long)]
    pub auto_pad: Option<String>,

    #[arg(long)]
    pub ceil: bool,

    #[arg(long)]
    pub count_include_pad: bool,

    /// Norm order for LpPool
    #[arg(long)]
    pub p: Option<i64>,

    /// Argmax flattening order: 0 row-major, 1 column-major
    #[arg(long)]
    pub storage_order: Option<i64>,

    /// f32, f64, i8 or u8
    #[arg(long, default_value = "f32")]
    pub dtype: String,

    /// Also produce the max-pool indices output
    #[arg(long)]
    pub indices: bool,

    #[arg(long, default_value_t = 20)]
    pub iters: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Kernel policy for the operator's family: `force=<name>`, `<name>`, `benchmark(cache=N)`
    #[arg(long)]
    pub policy: Option<String>,

    /// JSON runtime config layered over the NNPOOL_* environment
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the per-kernel profiling table to stderr
    #[arg(long)]
    pub profile: bool,
}

fn print_schemas() {
    println!(
        "{:<18} {:>5} {:>5}  {:<22} {:>7}  optional",
        "op", "since", "until", "dtypes", "outputs"
    );
    for schema in schemas() {
        let until = schema
            .end_version
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        let dtypes = schema
            .dtypes
            .iter()
            .map(|dtype| dtype.name())
            .collect::<Vec<_>>()
            .join(",");
        let optional = [
            ("dilations", schema.dilations),
            ("ceil_mode", schema.ceil_mode),
            ("storage_order", schema.storage_order),
        ]
        .iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",");
        println!(
            "{:<18} {:>5} {:>5}  {:<22} {:>7}  {}",
            schema.op_type.name(),
            schema.since_version,
            until,
            dtypes,
            schema.max_outputs,
            optional
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Bench(args) => bench::run(&args),
        Commands::Schemas => {
            print_schemas();
            Ok(())
        }
    }
}

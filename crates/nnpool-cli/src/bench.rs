use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::info;
use nnpool::{
    profiling, DType, NodeAttributes, PoolOpType, PoolOperator, RuntimeConfig, Shape, Tensor,
};
use nnpool_backend_ref_cpu::cpu_registry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::BenchArgs;

#[derive(Debug, Serialize)]
struct BenchSummary {
    op: String,
    opset: u32,
    kernel: &'static str,
    policy: String,
    dtype: &'static str,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    indices: bool,
    iters: usize,
    mean_ms: f64,
    min_ms: f64,
    max_ms: f64,
}

fn node_attributes(args: &BenchArgs) -> NodeAttributes {
    let mut attrs = NodeAttributes::new();
    for (name, values) in [
        ("kernel_shape", &args.kernel),
        ("strides", &args.strides),
        ("pads", &args.pads),
        ("dilations", &args.dilations),
    ] {
        if !values.is_empty() {
            attrs = attrs.with_ints(name, values);
        }
    }
    if let Some(auto_pad) = &args.auto_pad {
        attrs = attrs.with_string("auto_pad", auto_pad);
    }
    if args.ceil {
        attrs = attrs.with_int("ceil_mode", 1);
    }
    if args.count_include_pad {
        attrs = attrs.with_int("count_include_pad", 1);
    }
    if let Some(p) = args.p {
        attrs = attrs.with_int("p", p);
    }
    if let Some(order) = args.storage_order {
        attrs = attrs.with_int("storage_order", order);
    }
    attrs
}

fn random_input(dims: &[usize], dtype: DType, seed: u64) -> Result<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = Shape::try_new(dims)?;
    let len = shape.num_elements();
    let tensor = match dtype {
        DType::F32 => {
            Tensor::from_f32(shape, (0..len).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())?
        }
        DType::F64 => {
            Tensor::from_f64(shape, (0..len).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())?
        }
        DType::I8 => Tensor::from_i8(shape, (0..len).map(|_| rng.gen()).collect())?,
        DType::U8 => Tensor::from_u8(shape, (0..len).map(|_| rng.gen()).collect())?,
        DType::I64 => bail!("i64 is not a pooling input type"),
    };
    Ok(tensor)
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

pub fn run(args: &BenchArgs) -> Result<()> {
    let op_type = PoolOpType::parse(&args.op)
        .with_context(|| format!("unknown pooling operator {:?}", args.op))?;
    let dtype =
        DType::parse(&args.dtype).with_context(|| format!("unknown dtype {:?}", args.dtype))?;

    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(policy) = &args.policy {
        config
            .overrides
            .set(op_type.kernel_key(), policy)
            .with_context(|| format!("parsing --policy {policy:?}"))?;
    }
    let registry = cpu_registry(&config)?;
    let policy = format!("{:?}", registry.policy(op_type.kernel_key()));

    let op = PoolOperator::from_op_type(op_type, args.opset, &node_attributes(args))?;
    let input = random_input(&args.shape, dtype, args.seed)?;
    info!(
        "{} v{} on {:?} ({}), policy {policy}",
        op_type,
        args.opset,
        args.shape,
        dtype.name()
    );

    // Warm-up also settles benchmark-mode selection before timing.
    let (outputs, _) = op.compute_with_kernel(&registry, &input, args.indices)?;
    let output_shape = outputs.values.dims().to_vec();

    if args.profile {
        profiling::set_enabled(true);
        profiling::reset();
    }
    let iters = args.iters.max(1);
    let mut timings = Vec::with_capacity(iters);
    let mut kernel = "";
    for _ in 0..iters {
        let start = Instant::now();
        let (_, name) = op.compute_with_kernel(&registry, &input, args.indices)?;
        timings.push(millis(start.elapsed()));
        kernel = name;
    }

    let summary = BenchSummary {
        op: op_type.name().to_string(),
        opset: args.opset,
        kernel,
        policy,
        dtype: dtype.name(),
        input_shape: args.shape.clone(),
        output_shape,
        indices: args.indices,
        iters,
        mean_ms: timings.iter().sum::<f64>() / iters as f64,
        min_ms: timings.iter().copied().fold(f64::INFINITY, f64::min),
        max_ms: timings.iter().copied().fold(0.0, f64::max),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if args.profile {
        let report = profiling::take_report();
        profiling::set_enabled(false);
        if !report.is_empty() {
            eprintln!("{}", report.format_table());
        }
    }
    Ok(())
}

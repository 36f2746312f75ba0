use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;

use cfarray_codecs::{codec_by_name, ZstdCodec};
use cfarray_core::codec::scalars_to_le_bytes;
use cfarray_core::format::{CODEC_ZSTD, DEFAULT_RATE};
use cfarray_core::{Codec, DynArray, ScalarKind};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "cfarray",
    about = "Compressed floating-point arrays: compress synthetic fields, sweep rates, and benchmark random access",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a synthetic field and report size and error
    Compress {
        #[command(flatten)]
        field: FieldArgs,
        /// Bits per element (1–64)
        #[arg(short, long, default_value_t = DEFAULT_RATE)]
        rate: f64,
    },
    /// Time random element reads through the block cache
    Bench {
        #[command(flatten)]
        field: FieldArgs,
        /// Bits per element (1–64)
        #[arg(short, long, default_value_t = DEFAULT_RATE)]
        rate: f64,
        /// Number of random reads
        #[arg(short = 'n', long, default_value_t = 100_000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Decoded blocks kept resident (default: one row of blocks)
        #[arg(long)]
        cache_blocks: Option<usize>,
    },
    /// Compress the same field at every power-of-two rate from 1 to 64
    Sweep {
        #[command(flatten)]
        field: FieldArgs,
    },
}

#[derive(Args)]
struct FieldArgs {
    /// Extents per dimension, comma separated (1 to 4 of them)
    #[arg(short, long, value_delimiter = ',', default_value = "64,64,64")]
    extents: Vec<usize>,
    /// Codec to use: fixed | passthrough | zstd | lz4
    #[arg(short, long, default_value = "fixed")]
    codec: String,
    /// Zstd compression level (1–22, only used with --codec zstd)
    #[arg(long, default_value_t = 3)]
    zstd_level: i32,
    /// Scalar type stored in the array
    #[arg(long, value_enum, default_value_t = Scalar::F64)]
    scalar: Scalar,
    /// Synthetic field to compress
    #[arg(long, value_enum, default_value_t = Field::Smooth)]
    field: Field,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scalar {
    F32,
    F64,
}

impl From<Scalar> for ScalarKind {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::F32 => ScalarKind::F32,
            Scalar::F64 => ScalarKind::F64,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Field {
    /// Sum of low-frequency sinusoids
    Smooth,
    /// Uniform pseudo-random values in [-1, 1)
    Noise,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Bundled codec by name, with zstd at the requested level.
fn codec_from_name(name: &str, zstd_level: i32) -> anyhow::Result<Arc<dyn Codec>> {
    let codec = codec_by_name(name)?;
    if codec.id() == CODEC_ZSTD {
        return Ok(Arc::new(ZstdCodec::new(zstd_level)));
    }
    Ok(codec)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Simple LCG for reproducible pseudo-random streams (no external dep).
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 11
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        self.next_u64() as f64 / (1u64 << 53) as f64
    }
}

/// Values of `field` over `extents`, in row-major order.
fn synthesize(extents: &[usize], field: Field) -> Vec<f64> {
    let n: usize = extents.iter().product();
    match field {
        Field::Noise => {
            let mut rng = Lcg(0x5eed);
            (0..n).map(|_| rng.next_f64() * 2.0 - 1.0).collect()
        }
        Field::Smooth => {
            let mut coord = vec![0usize; extents.len()];
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                let v: f64 = coord
                    .iter()
                    .zip(extents)
                    .enumerate()
                    .map(|(k, (&c, &e))| {
                        let x = c as f64 / e as f64;
                        (std::f64::consts::TAU * (k + 1) as f64 * x).sin() / (k + 1) as f64
                    })
                    .sum();
                out.push(v * 100.0);
                for k in (0..coord.len()).rev() {
                    coord[k] += 1;
                    if coord[k] < extents[k] {
                        break;
                    }
                    coord[k] = 0;
                }
            }
            out
        }
    }
}

/// Build an array holding `data` and flush it, so sizes reflect every block.
fn build_array(
    field: &FieldArgs,
    rate: f64,
    data: &[f64],
    cache_blocks: Option<usize>,
) -> anyhow::Result<DynArray> {
    let codec = codec_from_name(&field.codec, field.zstd_level)?;
    let array = DynArray::new(&field.extents, rate, field.scalar.into(), codec)
        .with_context(|| format!("creating array with extents {:?}", field.extents))?;
    if let Some(blocks) = cache_blocks {
        array.set_cache_capacity(blocks)?;
    }
    array.write(data).context("encoding field")?;
    array.flush()?;
    Ok(array)
}

struct ErrorStats {
    rmse: f64,
    max: f64,
}

fn error_stats(original: &[f64], decoded: &[f64]) -> ErrorStats {
    let mut sum_sq = 0.0;
    let mut max = 0.0f64;
    for (a, b) in original.iter().zip(decoded) {
        let d = (a - b).abs();
        sum_sq += d * d;
        max = max.max(d);
    }
    ErrorStats {
        rmse: (sum_sq / original.len().max(1) as f64).sqrt(),
        max,
    }
}

fn gzip_size(data: &[f64], scalar: ScalarKind) -> anyhow::Result<u64> {
    let mut enc = GzEncoder::new(Vec::new(), GzCompression::default());
    enc.write_all(&scalars_to_le_bytes(data, scalar))?;
    Ok(enc.finish()?.len() as u64)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(field: FieldArgs, rate: f64) -> anyhow::Result<()> {
    let data = synthesize(&field.extents, field.field);
    let scalar: ScalarKind = field.scalar.into();

    let t0 = Instant::now();
    let array = build_array(&field, rate, &data, None)?;
    let encode_time = t0.elapsed();

    let t1 = Instant::now();
    let decoded = array.to_vec()?;
    let decode_time = t1.elapsed();

    let n = data.len() as u64;
    let raw_size = n * scalar.byte_width() as u64;
    let compressed = array.compressed_size() as u64;
    let errors = error_stats(&data, &decoded);
    let gzip = gzip_size(&data, scalar)?;

    eprintln!("  codec       : {}", array.codec().name());
    eprintln!("  extents     : {:?} ({})", array.shape(), scalar);
    eprintln!("  blocks      : {}", array.block_count());
    eprintln!("  rate        : {} bits/element", array.rate());
    eprintln!("  raw size    : {}", human_bytes(raw_size));
    eprintln!("  compressed  : {}", human_bytes(compressed));
    eprintln!("  ratio       : {:.2}x", raw_size as f64 / compressed.max(1) as f64);
    eprintln!("  bits/elem   : {:.3}", compressed as f64 * 8.0 / n as f64);
    eprintln!("  rmse        : {:.3e}", errors.rmse);
    eprintln!("  max error   : {:.3e}", errors.max);
    eprintln!(
        "  gzip (raw)  : {} ({:.2}x)",
        human_bytes(gzip),
        raw_size as f64 / gzip.max(1) as f64
    );
    eprintln!("  encode      : {:.3}s", encode_time.as_secs_f64());
    eprintln!("  decode      : {:.3}s", decode_time.as_secs_f64());
    array.close()?;
    Ok(())
}

fn run_bench(
    field: FieldArgs,
    rate: f64,
    count: u64,
    seed: u64,
    cache_blocks: Option<usize>,
) -> anyhow::Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    let data = synthesize(&field.extents, field.field);
    let array = build_array(&field, rate, &data, cache_blocks)?;
    let extents = array.shape();

    let mut rng = Lcg(seed);
    let coords: Vec<Vec<usize>> = (0..count)
        .map(|_| {
            extents
                .iter()
                .map(|&e| (rng.next_u64() % e as u64) as usize)
                .collect()
        })
        .collect();

    eprintln!(
        "benchmarking {} random reads across {} blocks...",
        count,
        array.block_count()
    );

    let t0 = Instant::now();
    let mut latencies_ns: Vec<u64> = Vec::with_capacity(count as usize);
    let mut checksum = 0.0;
    for coord in &coords {
        let t = Instant::now();
        checksum += array.get(coord)?;
        latencies_ns.push(t.elapsed().as_nanos() as u64);
    }
    let elapsed = t0.elapsed();
    latencies_ns.sort_unstable();

    let last = latencies_ns.len() - 1;
    let pick = |q: f64| latencies_ns[((latencies_ns.len() as f64 * q) as usize).min(last)];
    let stats = array.cache_stats();

    println!();
    println!("=== Random Element Access Benchmark ===");
    println!("  codec       : {}", array.codec().name());
    println!("  reads       : {}", count);
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {:.0} reads/s",
        count as f64 / elapsed.as_secs_f64()
    );
    println!("  latency:");
    println!("    min  : {} ns", latencies_ns[0]);
    println!("    p50  : {} ns", pick(0.50));
    println!("    p95  : {} ns", pick(0.95));
    println!("    p99  : {} ns", pick(0.99));
    println!("    max  : {} ns", latencies_ns[last]);
    println!("  cache:");
    println!("    hits      : {}", stats.hits);
    println!("    misses    : {}", stats.misses);
    println!("    evictions : {}", stats.evictions);
    println!("    hit ratio : {:.1}%", stats.hit_ratio() * 100.0);
    println!("  checksum    : {:.6e}", checksum);
    Ok(())
}

fn run_sweep(field: FieldArgs) -> anyhow::Result<()> {
    let data = synthesize(&field.extents, field.field);
    let n = data.len() as f64;
    let scalar: ScalarKind = field.scalar.into();

    println!(
        "  {:>6}  {:>12}  {:>10}  {:>8}  {:>12}  {:>12}",
        "rate", "compressed", "bits/elem", "ratio", "rmse", "max error"
    );
    println!("  {}", "-".repeat(70));
    let raw_size = n * scalar.byte_width() as f64;
    for rate in (0..=6).map(|k| (1u32 << k) as f64) {
        let array = build_array(&field, rate, &data, None)?;
        let compressed = array.compressed_size();
        let errors = error_stats(&data, &array.to_vec()?);
        println!(
            "  {:>6}  {:>12}  {:>10.3}  {:>7.2}x  {:>12.3e}  {:>12.3e}",
            rate,
            human_bytes(compressed as u64),
            compressed as f64 * 8.0 / n,
            raw_size / compressed.max(1) as f64,
            errors.rmse,
            errors.max
        );
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Compress { field, rate } => run_compress(field, rate),
        Commands::Bench {
            field,
            rate,
            count,
            seed,
            cache_blocks,
        } => run_bench(field, rate, count, seed, cache_blocks),
        Commands::Sweep { field } => run_sweep(field),
    }
}

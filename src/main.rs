use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use xzframe::archive::{self, CompressOptions, DecompressOptions, DEFAULT_BLOCK_SIZE, DEFAULT_DICT_SIZE};
use xzframe::CheckType;

#[derive(Parser)]
#[command(name = "xzframe", about = "XZ container compressor and inspector", override_usage = "xzframe -i <file>.xz -o <file> [-m decompress]")]
struct Cli {
    /// Path to the input file
    #[arg(short, long)]
    input: PathBuf,
    /// Path to the output file (stdout for `headers` when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Defaults to decompress for a `.xz` input and compress for a `.xz` output
    #[arg(short, long, value_enum)]
    method: Option<Method>,
    /// Block check: none, crc32, crc64
    #[arg(long, default_value = "crc64")]
    check: String,
    /// Uncompressed bytes per block, in KiB
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE / 1024)]
    block_size: usize,
    /// LZMA2 dictionary size, in KiB
    #[arg(long, default_value_t = DEFAULT_DICT_SIZE / 1024)]
    dict_size: u32,
    /// Refuse to decode blocks whose dictionary exceeds this many KiB
    #[arg(long)]
    max_dict_size: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum Method {
    Compress,
    Decompress,
    Headers,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let method = resolve_method(cli.method, &cli.input, cli.output.as_deref())?;
    info!(?method, input = %cli.input.display(), "starting");

    match method {
        // ── Compress ─────────────────────────────────────────────────────────
        Method::Compress => {
            let output = cli.output.as_deref().context("compress needs --output")?;
            let check = CheckType::from_name(&cli.check)
                .filter(|c| c.is_verifiable())
                .with_context(|| format!("unsupported check '{}'", cli.check))?;
            let opts = CompressOptions {
                check,
                block_size: cli.block_size.saturating_mul(1024),
                dict_size: cli.dict_size.saturating_mul(1024),
                ..Default::default()
            };
            let stream = archive::compress_file(&cli.input, output, &opts)
                .with_context(|| format!("compressing {}", cli.input.display()))?;
            info!(blocks = stream.blocks.len(), output = %output.display(), "wrote stream");
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Method::Decompress => {
            let output = cli.output.as_deref().context("decompress needs --output")?;
            let opts = DecompressOptions { max_dict_size: cli.max_dict_size.map(|kib| kib.saturating_mul(1024)) };
            let written = archive::decompress_file(&cli.input, output, &opts)
                .with_context(|| format!("decompressing {}", cli.input.display()))?;
            info!(bytes = written, output = %output.display(), "wrote output");
        }

        // ── Headers ──────────────────────────────────────────────────────────
        Method::Headers => {
            if !is_xz(&cli.input) {
                bail!("headers requires an .xz input file");
            }
            let stream = archive::read_headers(&cli.input)
                .with_context(|| format!("reading {}", cli.input.display()))?;
            let json = serde_json::to_string_pretty(&stream)?;
            match cli.output {
                Some(path) => std::fs::write(&path, json + "\n")?,
                None => writeln!(std::io::stdout(), "{json}")?,
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn is_xz(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "xz")
}

fn resolve_method(method: Option<Method>, input: &Path, output: Option<&Path>) -> Result<Method> {
    if let Some(method) = method {
        return Ok(method);
    }
    match (is_xz(input), output.map_or(false, is_xz)) {
        (true, true) => bail!("input and output are both .xz; pass --method"),
        (false, false) => bail!("neither input nor output is .xz; pass --method"),
        (true, false) => Ok(Method::Decompress),
        (false, true) => Ok(Method::Compress),
    }
}

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use tsvdump::{
    Columns, DumpConfig, DumpReader, DumpRequest, SizeBasis, codec_by_name, convert,
    find_dump_files,
};

#[derive(Parser)]
#[command(
    name = "tsvdump",
    version,
    about = "Pack delimited text into framed, compressed, size-rotated dumps"
)]
struct Cli {
    /// Log level filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a delimited text file into `<stem>.<NN>.<suffix>` dumps.
    Pack(PackArgs),
    /// List the files of a dump family in read order.
    List(FamilyArgs),
    /// Print every record of a dump family as delimited text.
    Cat(CatArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Basis {
    Compressed,
    Uncompressed,
}

impl From<Basis> for SizeBasis {
    fn from(b: Basis) -> Self {
        match b {
            Basis::Compressed => Self::Compressed,
            Basis::Uncompressed => Self::Uncompressed,
        }
    }
}

#[derive(Parser)]
struct PackArgs {
    /// Input file; gzip/zstd/bzip2/xz inputs are decompressed on the fly.
    input: PathBuf,

    /// Suffix of the produced files.
    #[arg(long, default_value = "bgz")]
    suffix: String,

    /// Rotate to a new file once the current one exceeds this many bytes.
    #[arg(long, default_value_t = 256 << 20)]
    max_file_size: u64,

    /// JSON config file; command line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compression codec (gzip, zstd, bzip2, xz, none).
    #[arg(long)]
    codec: Option<String>,

    /// Field delimiter.
    #[arg(long)]
    delimiter: Option<char>,

    /// Parser buffer size; bounds the longest accepted line.
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// What the rotation threshold is measured against.
    #[arg(long, value_enum)]
    size_basis: Option<Basis>,

    /// Write the conversion counters to this JSON file.
    #[arg(long)]
    result: Option<PathBuf>,
}

#[derive(Parser)]
struct FamilyArgs {
    /// Family prefix, e.g. `data/events` for `data/events.00.bgz`.
    prefix: PathBuf,

    #[arg(long, default_value = "bgz")]
    suffix: String,
}

#[derive(Parser)]
struct CatArgs {
    #[command(flatten)]
    family: FamilyArgs,

    /// Decompress with this codec instead of the one the extension selects.
    #[arg(long)]
    codec: Option<String>,

    /// Delimiter placed between columns.
    #[arg(long, default_value_t = '\t')]
    delimiter: char,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Command::Pack(args) => run_pack(args),
        Command::List(args) => run_list(&args),
        Command::Cat(args) => run_cat(&args),
    }
}

fn run_pack(args: PackArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => DumpConfig::from_json_file(path)?,
        None => DumpConfig::default(),
    };
    if let Some(codec) = args.codec {
        config.codec = Some(codec);
    }
    if let Some(delimiter) = args.delimiter {
        config.delimiter = delimiter;
    }
    if let Some(capacity) = args.buffer_capacity {
        config.buffer_capacity = capacity;
    }
    if let Some(basis) = args.size_basis {
        config.size_basis = basis.into();
    }

    let request =
        DumpRequest::new(args.input, args.suffix, args.max_file_size).with_config(config);
    let result = convert(&request, Columns::map_all)?;

    if let Some(path) = &args.result {
        result.save_to_file(path)?;
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "{} rows, {} written, {} skipped, {} file(s)",
        result.total_count,
        result.parsed_count,
        result.skipped_count(),
        result.dump_files.len()
    )?;
    for path in &result.dump_files {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

fn run_list(args: &FamilyArgs) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for path in find_dump_files(&args.prefix, &args.suffix) {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

fn run_cat(args: &CatArgs) -> Result<()> {
    let files = find_dump_files(&args.family.prefix, &args.family.suffix);
    let mut reader = DumpReader::<Columns>::new(&files);
    if let Some(name) = &args.codec {
        let codec =
            codec_by_name(name).with_context(|| format!("unknown compression codec: {name}"))?;
        reader = reader.with_codec(codec);
    }

    let mut delimiter = [0u8; 4];
    let delimiter = args.delimiter.encode_utf8(&mut delimiter).as_bytes();
    let mut out = BufWriter::new(io::stdout().lock());
    while let Some(record) = reader.next_record()? {
        for (i, column) in record.0.iter().enumerate() {
            if i > 0 {
                out.write_all(delimiter)?;
            }
            out.write_all(column.as_bytes())?;
        }
        out.write_all(b"\n")?;
    }
    out.flush()?;
    log::info!(
        "printed {} records from {} file(s)",
        reader.read_count(),
        reader.read_files().len()
    );
    Ok(())
}

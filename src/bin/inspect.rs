//! braid-inspect
//!
//! Command-line tool for looking into and editing a braid file.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use braid::{AllocationPolicy, Braid, Config};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// braid inspector
#[derive(Parser, Debug)]
#[command(name = "braid-inspect")]
#[command(about = "Inspect and edit braid container files")]
#[command(version)]
struct Args {
    /// Braid file
    #[arg(short, long, default_value = "./data.braid")]
    file: PathBuf,

    /// Free-knot selection policy for commands that allocate
    #[arg(short, long, value_enum, default_value = "ratio-fit")]
    policy: Policy,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print header and knot statistics
    Info,

    /// List strands with their length and knot count
    List,

    /// Write a strand's bytes to stdout
    Cat {
        /// Strand id
        id: u32,
    },

    /// Store a file as a new strand and print its id
    Put {
        /// File to store
        path: PathBuf,
    },

    /// Destroy a strand
    Rm {
        /// Strand id
        id: u32,
    },

    /// Destroy every strand
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Policy {
    RatioFit,
    BestFit,
}

impl From<Policy> for AllocationPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::RatioFit => AllocationPolicy::RatioFit,
            Policy::BestFit => AllocationPolicy::BestFit,
        }
    }
}

fn main() {
    // Logs go to stderr so `cat` output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,braid=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // Read-only commands must not create a file that is not there
    let create = matches!(args.command, Commands::Put { .. });

    let config = Config::builder()
        .path(&args.file)
        .create_if_missing(create)
        .allocation_policy(args.policy.into())
        .build();

    let braid = match Braid::open(config) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.file.display(), e);
            std::process::exit(1);
        }
    };

    let result = run(&braid, args.command);
    let closed = braid.close();

    if let Err(e) = result.and(closed) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(braid: &Braid, command: Commands) -> braid::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Info => {
            let knots = braid.knots();
            let free = knots.iter().filter(|k| k.is_free()).count();
            let free_bytes: u64 = knots
                .iter()
                .filter(|k| k.is_free())
                .map(|k| k.stitch.length() as u64)
                .sum();

            writeln!(out, "braid v{}", braid::VERSION)?;
            writeln!(out, "medium length:  {}", braid.medium_length()?)?;
            writeln!(out, "strands:        {}", braid.strand_count())?;
            writeln!(out, "last strand id: {}", braid.last_strand_id())?;
            writeln!(out, "knots:          {} ({} free, {} free bytes)", knots.len(), free, free_bytes)?;
        }

        Commands::List => {
            writeln!(out, "{:>8} {:>12} {:>6}", "id", "length", "knots")?;
            for strand in braid {
                let strand = strand?;
                writeln!(
                    out,
                    "{:>8} {:>12} {:>6}",
                    strand.id(),
                    strand.length(),
                    strand.knot_count()
                )?;
            }
        }

        Commands::Cat { id } => {
            let mut strand = braid.get_strand(id)?;
            io::copy(&mut strand, &mut out)?;
        }

        Commands::Put { path } => {
            let file = File::open(&path)?;
            let strand = braid.create_strand_from(file)?;
            writeln!(out, "{}", strand.id())?;
            tracing::info!(id = strand.id(), length = strand.length(), "stored {}", path.display());
        }

        Commands::Rm { id } => {
            braid.destroy_strand(id)?;
        }

        Commands::Clear => {
            braid.clear()?;
        }
    }

    Ok(())
}

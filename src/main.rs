//! rulekit CLI: compile rule documents and run self-play over them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use rulekit::{
    compile, init, self_play, CompileOutput, CompiledSpec, EnumerateOptions, EnumerationMode, InitInput,
    SelfPlayConfig, StrategyKind, StrategyTable,
};

/// Source document file name inside a rules directory.
const DSL_FILE: &str = "dsl.json";
const COMPILE_OUT: &str = "compile.out.json";
const INIT_OUT: &str = "init.out.json";

/// rulekit - compile declarative game rules and run them deterministically
#[derive(Parser, Debug)]
#[command(name = "rulekit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile <DIR>/dsl.json and write compile.out.json and init.out.json
    Compile {
        /// Directory holding dsl.json
        dir: PathBuf,

        /// Indentation width of the written JSON
        #[arg(long, default_value_t = 2)]
        pretty: usize,

        /// Write compact JSON
        #[arg(long)]
        minify: bool,

        /// Output directory (default: <DIR>)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Comma-separated seat ids (default: the document's default seat count)
        #[arg(long, value_delimiter = ',')]
        seats: Option<Vec<String>>,

        /// Init seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Compile <DIR>/dsl.json and print a self-play summary
    Selfplay {
        /// Directory holding dsl.json
        dir: PathBuf,

        #[arg(long, default_value_t = 10)]
        episodes: usize,

        #[arg(long, default_value_t = 100)]
        max_steps: usize,

        /// Comma-separated seat ids (default: the document's default seat count)
        #[arg(long, value_delimiter = ',')]
        seats: Option<Vec<String>>,

        #[arg(long, value_enum, default_value_t = StrategyArg::First)]
        strategy: StrategyArg,

        /// Offer one candidate per feasible count of each action's first resource op
        #[arg(long)]
        simulate: bool,

        /// First episode seed
        #[arg(long, default_value_t = 0)]
        seed_offset: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    First,
    Random,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::First => Self::First,
            StrategyArg::Random => Self::Random,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = match args.command {
        Commands::Compile {
            dir,
            pretty,
            minify,
            out,
            seats,
            seed,
        } => run_compile(&dir, out.as_deref(), seats, seed, Indent { pretty, minify }),

        Commands::Selfplay {
            dir,
            episodes,
            max_steps,
            seats,
            strategy,
            simulate,
            seed_offset,
        } => {
            let mode = if simulate {
                EnumerationMode::Simulate
            } else {
                EnumerationMode::RequireOnly
            };
            run_selfplay(&dir, seats, strategy.into(), mode, |config| {
                config
                    .with_episodes(episodes)
                    .with_max_steps(max_steps)
                    .with_seed_offset(seed_offset)
            })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Indent {
    pretty: usize,
    minify: bool,
}

fn run_compile(dir: &Path, out: Option<&Path>, seats: Option<Vec<String>>, seed: u64, indent: Indent) -> Result<()> {
    let output = compile_dir(dir)?;
    let out_dir = out.unwrap_or(dir);
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    write_json(&out_dir.join(COMPILE_OUT), &output, indent)?;

    let Some(spec) = &output.compiled_spec else {
        bail!("{} failed validation with {} error(s)", dir.join(DSL_FILE).display(), output.errors.len());
    };
    let seats = seats.unwrap_or_else(|| spec.source_meta.seats.default_seats());
    let started = init(spec, &InitInput::new(seats, seed)).context("initializing game state")?;
    write_json(&out_dir.join(INIT_OUT), &started, indent)?;

    if !output.ok {
        bail!("compilation reported {} error(s)", output.errors.len());
    }
    info!(spec_id = %spec.spec_id, out = %out_dir.display(), "wrote compile and init outputs");
    Ok(())
}

fn run_selfplay(
    dir: &Path,
    seats: Option<Vec<String>>,
    strategy: StrategyKind,
    mode: EnumerationMode,
    configure: impl FnOnce(SelfPlayConfig) -> SelfPlayConfig,
) -> Result<()> {
    let output = compile_dir(dir)?;
    let spec = usable_spec(output)?;
    let seats = seats.unwrap_or_else(|| spec.source_meta.seats.default_seats());
    let config = configure(
        SelfPlayConfig::new()
            .with_seats(seats)
            .with_enumerate(EnumerateOptions::new().with_mode(mode)),
    );
    let mut strategies = StrategyTable::uniform(strategy, &config.seats, config.seed_offset);
    let summary = self_play(&spec, &config, &mut strategies).context("starting self-play")?;
    println!("{}", render(&summary, Indent { pretty: 2, minify: false })?);
    Ok(())
}

fn compile_dir(dir: &Path) -> Result<CompileOutput> {
    let path = dir.join(DSL_FILE);
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let raw: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let output = compile(&raw);
    for issue in &output.errors {
        warn!(code = ?issue.code, path = %issue.path, "{}", issue.message);
    }
    Ok(output)
}

fn usable_spec(output: CompileOutput) -> Result<CompiledSpec> {
    match output.compiled_spec {
        Some(spec) if output.ok => Ok(spec),
        _ => bail!("compilation reported {} error(s)", output.errors.len()),
    }
}

fn render(value: &impl Serialize, indent: Indent) -> Result<String> {
    if indent.minify {
        return Ok(serde_json::to_string(value)?);
    }
    let spaces = " ".repeat(indent.pretty);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}

fn write_json(path: &Path, value: &impl Serialize, indent: Indent) -> Result<()> {
    let mut text = render(value, indent)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

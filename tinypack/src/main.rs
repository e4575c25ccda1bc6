use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tinypack_rs::config::DEFAULT_ENTRY_NAME;
use tinypack_rs::{BundlerOptions, Compiler, EntryConfig, Stats};

/// Config file picked up from the context directory when `--config` is not given.
const CONFIG_FILE_NAME: &str = "tinypack.config.json";

/// tinypack: Bundle CommonJS entry modules into self-contained chunk files
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON config file (default: tinypack.config.json in the context, if present)
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Entry module as `path` or `name=path`. May be repeated, replaces the configured entries
    #[clap(short, long)]
    pub entry: Vec<String>,

    /// Root directory that entries and module ids are relative to
    #[clap(long)]
    pub context: Option<PathBuf>,

    /// Directory to write the bundles to
    #[clap(short, long)]
    pub output_path: Option<PathBuf>,

    /// Chunk template file containing {{entryModuleId}} and {{modules}}
    #[clap(short, long)]
    pub template: Option<PathBuf>,

    /// Print build stats as JSON
    #[clap(long)]
    pub json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(stats) if !stats.has_errors() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<Stats> {
    let options = load_options(&args)?;
    let stats = Compiler::new(options).run().await.context("Build failed")?;

    if args.json {
        println!("{}", stats.to_json()?);
    } else {
        print!("{stats}");
    }
    Ok(stats)
}

/// Builds the options from the config file, if any, with the command line
/// flags applied on top.
fn load_options(args: &Args) -> anyhow::Result<BundlerOptions> {
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let context = args.context.as_ref().map(|context| cwd.join(context));

    let config_path = match &args.config {
        Some(path) => Some(cwd.join(path)),
        None => {
            let candidate = context.as_deref().unwrap_or(&cwd).join(CONFIG_FILE_NAME);
            candidate.is_file().then_some(candidate)
        }
    };
    let mut options = match config_path {
        Some(path) => BundlerOptions::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BundlerOptions::new(
            context.clone().unwrap_or_else(|| cwd.clone()),
            EntryConfig::default(),
        ),
    };

    if let Some(context) = context {
        options.context = context;
    }
    if !args.entry.is_empty() {
        options.entry = EntryConfig::default();
        for entry in &args.entry {
            let (name, path) = parse_entry(entry);
            options.insert_entry(name, path);
        }
    }
    if let Some(output_path) = &args.output_path {
        options.output.path = cwd.join(output_path);
    }
    if let Some(template) = &args.template {
        options.output.template = Some(cwd.join(template));
    }

    Ok(options.normalize(&cwd)?)
}

/// Splits `name=path`; a bare path is the `main` entry.
fn parse_entry(entry: &str) -> (&str, &str) {
    match entry.split_once('=') {
        Some((name, path)) if !name.is_empty() && !name.contains('/') => (name, path),
        _ => (DEFAULT_ENTRY_NAME, entry),
    }
}

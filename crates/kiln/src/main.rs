use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use kiln::{Config, DefaultExport, Kiln};
use log::info;

#[derive(Debug, Parser)]
#[command(name = "kiln", version, about = "Bundle a module graph into a single artifact")]
struct Cli {
    /// Entry module to bundle
    entry: PathBuf,

    /// Write the bundle here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory backing the persistent bundle cache
    #[arg(long, value_name = "DIR")]
    cache_path: Option<PathBuf>,

    /// Deployment identity scoping the cache; enables caching
    #[arg(long, value_name = "ID")]
    deploy_id: Option<String>,

    /// Resolve external imports at load time instead of requiring a
    /// self-contained bundle
    #[arg(long)]
    dynamic_imports: bool,

    /// Instantiate the bundle and print its default export output instead
    /// of the bundle code
    #[arg(long)]
    load: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write output to {}", path.display())),
        None => {
            io::stdout()
                .lock()
                .write_all(text.as_bytes())
                .context("failed to write output to stdout")
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if cli.cache_path.is_some() {
        config.cache_path = cli.cache_path.clone();
    }
    if cli.deploy_id.is_some() {
        config.deploy_id = cli.deploy_id.clone();
    }
    if cli.dynamic_imports {
        config.dynamic_imports = true;
    }

    let entry = cli
        .entry
        .canonicalize()
        .with_context(|| format!("entry module {} not found", cli.entry.display()))?;
    let kiln = Kiln::new(config)?;

    if cli.load {
        let module = kiln.process(&entry)?;
        let rendered = match &module.default {
            DefaultExport::Callable(_) => {
                let value = module.default.call(&[]).unwrap_or_default();
                format!("{}\n", serde_json::to_string_pretty(&value)?)
            }
            DefaultExport::Renderable(_) => {
                let component = module.default.render(None).unwrap_or_default();
                format!("{}\n", component.html)
            }
        };
        return write_output(cli.output.as_ref(), &rendered);
    }

    let bundle = kiln.bundle(&entry)?;
    for (specifier, candidates) in &bundle.external {
        info!("external import '{specifier}' -> [{}]", candidates.join(", "));
    }
    write_output(cli.output.as_ref(), &bundle.code)
}

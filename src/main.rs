use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use console::style;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tsumiki::reload::LiveReload;
use tsumiki::{Config, Environment, Mode, Orchestrator, Plan, Task};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Command {
    /// Build, serve and watch.
    Default,
    /// Clean, then build every asset once.
    Build,
    /// Re-run tasks on change, without serving.
    Watch,
    /// Serve the site (or proxy the upstream) with live reload.
    Server,
    Clean,
    Copy,
    Styles,
    Scripts,
    Images,
    Styleguide,
    /// Print the build graph as a Mermaid diagram.
    Graph,
}

#[derive(Parser, Debug)]
#[command(version, about = "Static site asset pipeline")]
struct Args {
    #[clap(value_enum, index = 1, default_value = "default")]
    command: Command,

    /// Settings file, relative paths inside it resolve against its directory.
    #[clap(short, long, default_value = "config.yml")]
    config: Utf8PathBuf,

    /// Minify, prune and compress instead of emitting source maps.
    #[clap(long)]
    production: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .try_init()?;

    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let mode = Mode::from_flag(args.production);

    if let Command::Graph = args.command {
        print!("{}", Plan::build(&config));
        return Ok(());
    }

    tracing::info!(
        "{} {} in {} mode",
        style("tsumiki").bold(),
        style(format!("{:?}", args.command).to_lowercase()).cyan(),
        style(mode).yellow(),
    );

    let env = Environment::new(mode, config);

    let task = match args.command {
        Command::Clean => Some(Task::Clean),
        Command::Copy => Some(Task::Copy),
        Command::Styles => Some(Task::Styles),
        Command::Scripts => Some(Task::Scripts),
        Command::Images => Some(Task::Images),
        Command::Styleguide => Some(Task::StyleGuide),
        _ => None,
    };

    if let Some(task) = task {
        Orchestrator::new(env).run(task)?;
        return Ok(());
    }

    if let Command::Build = args.command {
        let report = Orchestrator::new(env).build()?;
        eprint!("{report}");
        return Ok(());
    }

    let live = Arc::new(LiveReload::start()?);
    let orchestrator = Orchestrator::new(env.with_reload(live.clone()));

    match args.command {
        Command::Watch => orchestrator.watch(&args.config)?,
        Command::Server => {
            tsumiki::server::start(orchestrator.env(), Some(live))?
                .join()
                .map_err(|_| anyhow::anyhow!("server thread panicked"))??;
        }
        _ => orchestrator.develop(&args.config, live)?,
    }

    Ok(())
}

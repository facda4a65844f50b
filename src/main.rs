// ABOUTME: Main entry point for the rig CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rig::config::{AppConfig, SessionConfig};
use rig::docker::{DockerRuntime, RuntimeClient};
use rig::error::SessionError;
use rig::project::{self, Project, CONFIG_FILE_NAME};
use rig::session::commands::{self, DownOutcome};
use rig::session::SessionOrchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TEMPLATE_CONFIG: &str = r#"# rig configuration

languages:
  # Example configurations:
  # node:
  #   version: "lts"           # "lts", "latest", or specific version like "20"
  #   build_system: npm        # npm, yarn, or pnpm
  # python:
  #   version: "3.12"
  #   build_system: poetry
  #   build_system_version: "1.7.0"
  # java:
  #   version: "21"
  #   build_system: gradle
  # go:
  #   version: "1.22"
  # rust:
  #   version: "latest"
  # ruby:
  #   version: "3.3"
  #   build_system: bundler

ports: []
  # Port mappings in "host:container" or "port" format:
  # - "8080:8080"
  # - "3000"

env: {}
  # Environment variables (supports ${VAR} expansion from host):
  # API_KEY: "${API_KEY}"
  # DATABASE_URL: "postgres://localhost:5432/dev"

# shell: zsh
  # bash, zsh, or fish

# code_server: true
  # Install code-server (VS Code in browser) with language-specific extensions
  # Served on port 8080 unless code_server_port says otherwise
"#;

#[derive(Parser)]
#[command(name = "rig", version, about = "Per-project sandboxed development containers")]
#[command(long_about = "Creates isolated Docker containers configured with language runtimes, \
build tools and agent CLIs from a .rig.yml in the current directory.\n\n\
Containers persist between sessions and are recreated when the configuration changes.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start and enter the project container with the configured shell
    Up,
    /// Run a command inside the project container
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Write a template .rig.yml in the current directory
    Init,
    /// List rig containers
    #[command(alias = "ls")]
    List,
    /// Stop the container without removing it
    Down {
        /// Project name; defaults to the current directory's
        name: Option<String>,
    },
    /// Remove the container and every image built for the project
    Destroy { name: Option<String> },
    /// Discard the container and images, then build a fresh image
    Rebuild,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();
    setup_panic_handler();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(run(cli));
    // stdin reads run on a blocking thread that may never return
    runtime.shutdown_background();

    if let Err(e) = &result {
        error!("rig failed: {:#}", e);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("getting current directory")?;

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => run_session(&cwd, None).await,
        Command::Run { command } => run_session(&cwd, Some(command)).await,
        Command::Init => init(&cwd),
        Command::List => list().await,
        Command::Down { name } => down(&cwd, name).await,
        Command::Destroy { name } => destroy(&cwd, name).await,
        Command::Rebuild => rebuild(&cwd).await,
    }
}

fn connect() -> Result<Arc<dyn RuntimeClient>> {
    let app_config = AppConfig::load().context("loading user config")?;
    let runtime = DockerRuntime::connect(&app_config).context("creating docker client")?;
    Ok(Arc::new(runtime))
}

fn load_config(cwd: &Path) -> Result<SessionConfig> {
    let path = project::config_path(cwd);
    if !path.is_file() {
        bail!(
            "{} not found in {}; run `rig init` first",
            CONFIG_FILE_NAME,
            cwd.display()
        );
    }
    let mut config = SessionConfig::load(&path).context("loading config")?;
    config.validate().context("invalid config")?;
    config.expand_env_vars();
    Ok(config)
}

fn project_for(cwd: &Path, name: Option<String>) -> Project {
    match name {
        Some(name) => Project::named(name),
        None => Project::from_dir(cwd),
    }
}

fn progress_printer() -> (mpsc::UnboundedSender<String>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            println!("{}", line);
        }
    });
    (tx, printer)
}

/// Cancels `token` on SIGTERM or SIGHUP. Ctrl-C reaches the container while in raw mode.
fn cancel_on_signals(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let (Ok(mut terminate), Ok(mut hangup)) =
                (signal(SignalKind::terminate()), signal(SignalKind::hangup()))
            else {
                return;
            };
            tokio::select! {
                _ = terminate.recv() => info!("Received SIGTERM"),
                _ = hangup.recv() => info!("Received SIGHUP"),
                _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("Received interrupt");
        }
        token.cancel();
    });
}

async fn run_session(cwd: &Path, command: Option<Vec<String>>) -> Result<()> {
    let config = load_config(cwd)?;
    let project = Project::from_dir(cwd);
    let orchestrator = SessionOrchestrator::new(connect()?);

    let cancel = CancellationToken::new();
    cancel_on_signals(cancel.clone());

    let (progress, printer) = progress_printer();
    let container_id = tokio::select! {
        prepared = orchestrator.prepare(&config, &project, Some(progress)) => prepared?,
        _ = cancel.cancelled() => return Err(SessionError::Canceled.into()),
    };
    let _ = printer.await;

    let command = command.unwrap_or_else(|| config.default_command());
    match orchestrator.attach(&container_id, &command, cancel).await {
        Ok(()) | Err(SessionError::Canceled) => Ok(()),
        Err(SessionError::NotATerminal) => {
            bail!("rig needs an interactive terminal; stdin is not a tty")
        }
        Err(e) => Err(e).context("attaching to container"),
    }
}

fn init(cwd: &Path) -> Result<()> {
    if project::config_exists(cwd) {
        bail!("{} already exists", CONFIG_FILE_NAME);
    }
    let path: PathBuf = project::config_path(cwd);
    std::fs::write(&path, TEMPLATE_CONFIG).context("writing config")?;

    println!("Created {}", CONFIG_FILE_NAME);
    println!("Edit this file to configure your development environment, then run:");
    println!("  rig              # enter the container");
    println!("  rig run -- claude");
    Ok(())
}

async fn list() -> Result<()> {
    let runtime = connect()?;
    let containers = commands::list(&*runtime).await?;
    if containers.is_empty() {
        println!("No rig containers");
        return Ok(());
    }

    let width = containers
        .iter()
        .map(|c| display_name(&c.name).len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let status_width = containers
        .iter()
        .map(|c| c.status.len())
        .max()
        .unwrap_or(0)
        .max("STATUS".len());

    println!("{:<width$}  {:<status_width$}  IMAGE", "NAME", "STATUS");
    for container in &containers {
        println!(
            "{:<width$}  {:<status_width$}  {}",
            display_name(&container.name),
            container.status,
            container.image
        );
    }
    Ok(())
}

fn display_name(name: &str) -> &str {
    project::project_from_container_name(name).unwrap_or(name)
}

async fn down(cwd: &Path, name: Option<String>) -> Result<()> {
    let project = project_for(cwd, name);
    let runtime = connect()?;
    match commands::down(&*runtime, &project).await? {
        DownOutcome::Stopped => println!("Stopped {}", project.container_name()),
        DownOutcome::AlreadyStopped => {
            println!("Container {} is not running", project.container_name())
        }
        DownOutcome::NotFound => println!("No container found for {}", project.name()),
    }
    Ok(())
}

async fn destroy(cwd: &Path, name: Option<String>) -> Result<()> {
    let project = project_for(cwd, name);
    let runtime = connect()?;
    let report = commands::destroy(&*runtime, &project).await?;

    if report.container_removed {
        println!("Removed container {}", project.container_name());
    }
    for image in &report.images_removed {
        println!("Removed image {}", image);
    }
    if !report.container_removed && report.images_removed.is_empty() {
        println!("Nothing to destroy for {}", project.name());
    }
    Ok(())
}

async fn rebuild(cwd: &Path) -> Result<()> {
    let config = load_config(cwd)?;
    let project = Project::from_dir(cwd);
    let runtime = connect()?;
    runtime
        .ping()
        .await
        .map_err(|source| SessionError::RuntimeUnavailable {
            stage: "pinging docker",
            source,
        })?;

    let (progress, printer) = progress_printer();
    let image = commands::rebuild(runtime, &config, &project, Some(progress)).await?;
    let _ = printer.await;

    println!("Rebuilt {}; run `rig` to start a fresh container", image);
    Ok(())
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join("rig").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".rig/logs"));
    let _ = std::fs::create_dir_all(&log_dir);

    let log_file = log_dir.join(format!(
        "rig-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rig=info".into());

    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter)
            .init(),
        // Without a log file, only warnings reach stderr so raw-mode output stays clean
        Err(_) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(tracing_subscriber::EnvFilter::new("rig=warn"))
            .init(),
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        // Restore the terminal before anything is printed
        let _ = crossterm::terminal::disable_raw_mode();

        error!("rig panicked: {}", panic_info);
        eprintln!("rig panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}

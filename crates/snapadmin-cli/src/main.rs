mod output;

use anyhow::{anyhow, bail, Context};
use clap::error::ErrorKind;
use clap::{ArgAction, ArgGroup, Parser};
use snapadmin_core::compare::diff_files;
use snapadmin_core::config::ConfigSource;
use snapadmin_core::hosts::CliCredentials;
use snapadmin_core::orchestrator::Collaborators;
use snapadmin_core::{ActionKind, SnapAdmin, SnapError, Settings};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "snapadmin",
    about = "Capture network device state from many hosts and compare snapshots",
    disable_version_flag = true
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["snap", "check", "snapcheck", "diff", "version"])
))]
struct Cli {
    /// Take a snapshot for the commands in the test files
    #[arg(long)]
    snap: bool,

    /// Compare a pre and a post snapshot
    #[arg(long)]
    check: bool,

    /// Take a snapshot and evaluate it immediately
    #[arg(long)]
    snapcheck: bool,

    /// Show the differences between two snapshots (or two files)
    #[arg(long)]
    diff: bool,

    /// Print the version and exit
    #[arg(short = 'V', long)]
    version: bool,

    /// Pre snapshot label
    pre_snapfile: Option<String>,

    /// Post snapshot label
    post_snapfile: Option<String>,

    /// Main config file
    #[arg(short = 'f', long)]
    file: Option<String>,

    /// Target a single host instead of the config's host list
    #[arg(short = 't', long)]
    hostname: Option<String>,

    /// Device password
    #[arg(short = 'p', long)]
    passwd: Option<String>,

    /// Device user name
    #[arg(short = 'l', long)]
    login: Option<String>,

    /// Device port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// More -v means quieter: -v debug, -vv info, -vvv warning, -vvvv error
    #[arg(short = 'v', long = "verbosity", action = ArgAction::Count)]
    verbosity: u8,

    /// Hosts worked on concurrently (0 = all at once)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Tool settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Where snapshots and databases are stored
    #[arg(long, env = "SNAPADMIN_SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,
}

impl Cli {
    fn action(&self) -> Option<ActionKind> {
        if self.snap {
            Some(ActionKind::Snapshot)
        } else if self.check {
            Some(ActionKind::Check)
        } else if self.snapcheck {
            Some(ActionKind::SnapCheck)
        } else if self.diff {
            Some(ActionKind::Diff)
        } else {
            None
        }
    }
}

fn level_for(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        2 => tracing::Level::INFO,
        3 => tracing::Level::WARN,
        _ => tracing::Level::ERROR,
    }
}

/// A non-empty `RUST_LOG` replaces the `-v` level entirely.
fn log_filter(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::default().add_directive(level_for(verbosity).into()),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbosity, rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.version {
        println!("snapadmin {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let Some(kind) = cli.action() else {
        bail!("one of --snap, --check, --snapcheck or --diff is required");
    };

    if kind == ActionKind::Diff {
        if let (Some(a), Some(b)) = (&cli.pre_snapfile, &cli.post_snapfile) {
            if Path::new(a).is_file() && Path::new(b).is_file() {
                return diff_two_files(Path::new(a), Path::new(b), cli.json);
            }
        }
    }

    let file = cli
        .file
        .as_deref()
        .context("a main config file is required (-f <file>)")?;

    let settings = Settings::load(cli.settings.as_deref()).map_err(categorised)?;
    let mut paths = settings.default_paths();
    if let Some(dir) = &cli.snapshot_dir {
        paths.snapshot_dir = dir.clone();
    }

    let config = ConfigSource::Path(file.into())
        .load(&paths)
        .map_err(categorised)?;

    let collaborators = Collaborators::defaults(&paths, settings.ssh.clone());
    let admin = SnapAdmin::new(paths, collaborators)
        .with_max_parallel(cli.max_parallel.unwrap_or(settings.dispatch.max_parallel))
        .with_credentials(CliCredentials {
            username: cli.login.clone(),
            password: cli.passwd.clone(),
            port: cli.port,
        });

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = rt
        .block_on(admin.run(
            kind,
            config,
            cli.pre_snapfile.as_deref(),
            cli.post_snapfile.as_deref(),
            cli.hostname.as_deref(),
            None,
        ))
        .map_err(categorised)?;

    if cli.json {
        output::print_json(&result)?;
    } else {
        output::print_results(&result);
    }
    Ok(())
}

fn diff_two_files(a: &Path, b: &Path, json: bool) -> anyhow::Result<()> {
    let lines = diff_files(a, b)
        .map_err(categorised)
        .with_context(|| format!("comparing {} and {}", a.display(), b.display()))?;
    if json {
        return output::print_json(&serde_json::json!({
            "first": a,
            "second": b,
            "identical": lines.is_empty(),
            "differences": lines,
        }));
    }
    if lines.is_empty() {
        println!("{} and {} are identical", a.display(), b.display());
    } else {
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}

fn categorised(e: SnapError) -> anyhow::Error {
    anyhow!("{}: {e}", e.category())
}

//! gpkg-pack - package a project's layers into one GeoPackage.

use clap::{ArgAction, Args, Parser, Subcommand};
use gpkg_packager::{
    GpkgProviders, LogSink, PackError, PackageOptions, PackageOutcome, PackagingServices, Project,
    WorkerEvent, apply_updates, list_embedded_projects, read_embedded_project, worker,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CANCEL_WAIT: Duration = Duration::from_secs(2);
const EXIT_CANCELED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "gpkg-pack", version, about = "Package project layers into a GeoPackage")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy every packageable layer into a GeoPackage and embed the project.
    Package(PackageArgs),
    /// List the projects embedded in a GeoPackage.
    ListProjects {
        container: PathBuf,
    },
    /// Write an embedded project back out as a project document.
    Extract {
        container: PathBuf,
        name: String,
        /// Output file; the document is printed when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct PackageArgs {
    /// Project document to package.
    project: PathBuf,

    /// Output GeoPackage. Defaults to GPKG-<project>.gpkg next to the project.
    #[arg(short, long, env = "GPKG_PACK_OUTPUT")]
    output: Option<PathBuf>,

    /// Do not store the project inside the GeoPackage.
    #[arg(long)]
    no_embed: bool,

    /// Name of the embedded project.
    #[arg(long, env = "GPKG_PACK_PROJECT_NAME")]
    project_name: Option<String>,

    /// Save the rewritten project (pointing at the GeoPackage) to this file.
    #[arg(long, conflicts_with = "in_place")]
    save_project: Option<PathBuf>,

    /// Overwrite the input project with the rewritten one.
    #[arg(long)]
    in_place: bool,
}

struct StdoutLog;

impl LogSink for StdoutLog {
    fn log(&self, line: &str) {
        println!("{line}");
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Package(args) => package(args),
        Command::ListProjects { container } => list_projects(container),
        Command::Extract {
            container,
            name,
            output,
        } => extract(container, name, output),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn package(args: PackageArgs) -> Result<ExitCode, PackError> {
    let registry = GpkgProviders;
    let mut project = Project::load(&args.project, &registry)?;

    let mut options = PackageOptions::for_project(&project);
    if let Some(output) = args.output {
        options.container = output;
    }
    if args.project_name.is_some() {
        options.project_name = args.project_name;
    }
    options.embed_project = !args.no_embed;
    let options = options.validate()?;
    println!("Packaging into {}", options.container.display());

    let mut task = worker::spawn(project.clone(), options, PackagingServices::default())?;
    let cancel = task.cancel_handle();
    let handler = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler.cancel()) {
        tracing::warn!(error = %err, "Ctrl-C will not cancel packaging");
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while let Some(event) = task.next_event() {
        match event {
            WorkerEvent::Progress(percent) => bar.set_position(u64::from(percent)),
            WorkerEvent::Log(line) => bar.println(line),
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    let outcome = if cancel.is_cancelled() {
        match task.cancel_and_wait(CANCEL_WAIT) {
            Some(outcome) => outcome?,
            None => {
                bar.abandon_with_message("worker still busy, exiting");
                return Ok(ExitCode::from(EXIT_CANCELED));
            }
        }
    } else {
        task.finish()?
    };

    let (report, updates) = match outcome {
        PackageOutcome::Completed { report, updates } => (report, updates),
        PackageOutcome::Canceled => {
            bar.abandon_with_message("canceled");
            eprintln!("Packaging canceled by user");
            return Ok(ExitCode::from(EXIT_CANCELED));
        }
    };
    bar.finish_and_clear();

    let rewrite = apply_updates(&mut project, updates, &registry, &StdoutLog);
    println!("{report}");
    tracing::info!(updated = rewrite.updated, failed = rewrite.failed, "project rewritten");

    let save_to = if args.in_place {
        Some(args.project.clone())
    } else {
        args.save_project
    };
    if let Some(path) = save_to {
        project.save(&path)?;
        println!("Rewritten project saved to {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn list_projects(container: PathBuf) -> Result<ExitCode, PackError> {
    for name in list_embedded_projects(&container)? {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

fn extract(
    container: PathBuf,
    name: String,
    output: Option<PathBuf>,
) -> Result<ExitCode, PackError> {
    let mut project = read_embedded_project(&container, &name)?;
    match output {
        Some(path) => {
            project.save(&path)?;
            println!("Project '{name}' written to {}", path.display());
        }
        None => println!("{}", project.to_document()?),
    }
    Ok(ExitCode::SUCCESS)
}

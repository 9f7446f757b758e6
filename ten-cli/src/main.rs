use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use ten_cli::{EmitMode, Options, Report, build_cmd, check_cmd};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ten", version, about = "TEN template compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Common {
    /// Template root; include paths resolve below it
    #[arg(long)]
    root: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl From<Common> for Options {
    fn from(common: Common) -> Self {
        Options {
            root: common.root,
            config: common.config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template and its includes into JavaScript.
    Build {
        /// Path to the entry template
        input: PathBuf,
        #[command(flatten)]
        common: Common,
        /// Output directory (default: target/ten-gen)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// What to emit: one bundle script or one file per unit
        #[arg(long, value_enum, default_value_t = EmitMode::Bundle)]
        emit: EmitMode,
    },
    /// Compile a template and print its diagnostics.
    Check {
        /// Path to the entry template
        input: PathBuf,
        #[command(flatten)]
        common: Common,
        /// Print the parsed tag tree of the entry
        #[arg(long)]
        tree: bool,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let report = match cli.command {
        Commands::Build {
            input,
            common,
            out_dir,
            emit,
        } => {
            let report = build_cmd(&input, &common.into(), out_dir.as_deref(), emit)?;
            print_diagnostics(&report);
            for path in &report.written {
                println!("Generated: {}", path.display());
            }
            report
        }
        Commands::Check {
            input,
            common,
            tree,
            json,
        } => {
            let report = check_cmd(&input, &common.into(), tree)?;
            if let Some(outline) = &report.outline {
                print!("{outline}");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report.diagnostics)?);
            } else {
                print_diagnostics(&report);
            }
            report
        }
    };

    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_diagnostics(report: &Report) {
    for rendered in &report.rendered {
        eprintln!("{rendered}");
    }
}

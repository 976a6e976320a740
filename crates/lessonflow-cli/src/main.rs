//! lessonflow CLI: validate, play and grade branching lessons, and convert
//! legacy lesson backups.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lessonflow", version, about = "Branching lessons with graded questions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate lesson TOML files
    Validate {
        /// Path to a lesson file or directory
        #[arg(long)]
        lesson: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Play a lesson from a scripted list of submissions
    Play {
        /// Path to the lesson .toml file
        #[arg(long)]
        lesson: PathBuf,

        /// Submissions to play, as a .json array or a .toml `steps` list
        #[arg(long)]
        script: PathBuf,

        /// Learner id
        #[arg(long, default_value = "1")]
        user: u64,

        /// Retry number of this play-through
        #[arg(long, default_value = "0")]
        retry: u32,

        /// Play as a lesson manager (random-branch jumps go to the branch table's next page)
        #[arg(long)]
        manager: bool,

        /// Seed for random jumps (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory (overrides the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Convert a legacy lesson backup into linked pages
    Convert {
        /// Legacy backup XML
        #[arg(long)]
        input: PathBuf,

        /// Converted XML
        #[arg(long)]
        output: PathBuf,

        /// Also write the conversion report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show grade and page statistics of a session report
    Stats {
        /// Session report JSON
        #[arg(long)]
        report: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create starter config and example lesson
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lessonflow=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { lesson, config } => commands::validate::execute(lesson, config),
        Commands::Play {
            lesson,
            script,
            user,
            retry,
            manager,
            seed,
            output,
            config,
        } => commands::play::execute(commands::play::PlayArgs {
            lesson,
            script,
            user,
            retry,
            manager,
            seed,
            output,
            config,
        }),
        Commands::Convert {
            input,
            output,
            report,
        } => commands::convert::execute(input, output, report),
        Commands::Stats { report, format } => commands::stats::execute(report, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

mod handlers;

use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser, Subcommand};
use console::Style;
use handlers::{handle_inspect, handle_plan};
use ortmodel::binding::ShapeParams;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Cli {
    /// Log filter used when `RUST_LOG` is not set
    #[arg(long, global = true, default_value = "warn")]
    log: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe an exported model directory
    Inspect {
        /// Folder with model's files
        model_path: PathBuf,
    },
    /// Print the output buffers a task preallocates for the given input shape
    Plan {
        /// Folder with model's files
        model_path: PathBuf,
        #[arg(long, default_value = "feature-extraction")]
        task: String,
        #[arg(long, default_value_t = 1)]
        batch_size: usize,
        #[arg(long, default_value_t = 16)]
        sequence_length: usize,
        #[arg(long)]
        past_sequence_length: Option<usize>,
        /// Defaults to the sequence length
        #[arg(long)]
        encoder_sequence_length: Option<usize>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let result = match cli.command {
        Some(Commands::Inspect {
            model_path,
        }) => handle_inspect(&model_path),
        Some(Commands::Plan {
            model_path,
            task,
            batch_size,
            sequence_length,
            past_sequence_length,
            encoder_sequence_length,
        }) => {
            let mut params = ShapeParams::new(batch_size, sequence_length)
                .with_encoder_sequence_length(encoder_sequence_length.unwrap_or(sequence_length));
            if let Some(past_sequence_length) = past_sequence_length {
                params = params.with_past_sequence_length(past_sequence_length);
            }
            handle_plan(&model_path, &task, &params)
        },
        None => Cli::command().print_help().map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error}", Style::new().red().bold().apply_to("error:"));
            ExitCode::FAILURE
        },
    }
}

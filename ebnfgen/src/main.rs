use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate a C++ recursive-descent parser from an EBNF grammar description"
)]
struct CommandLine {
    #[arg(help = "The grammar description file to read")]
    grammar: PathBuf,
    #[arg(help = "The stem of the generated .hpp/.cpp files")]
    output: PathBuf,
}

/// Everything goes both to stderr and, at trace level, to `output.log`.
fn init_logging() {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match File::create("output.log") {
        Ok(log_file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(LevelFilter::TRACE)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(LevelFilter::TRACE)
                .with(stderr_layer)
                .init();
            error!("Cannot open `output.log` for writing: {}", err);
        }
    }
}

fn main() -> ExitCode {
    let args = match CommandLine::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging();
    tracing::trace!("Setup complete");

    match ebnfgen::generate(&args.grammar, &args.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors) => {
            for err in &errors {
                error!("{}", err);
            }
            ExitCode::from(1)
        }
    }
}

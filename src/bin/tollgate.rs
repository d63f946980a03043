use std::sync::Arc;

use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use tollgate::config::LOG_ENV;
use tollgate::orchestrator::RunError;
use tollgate::ui::{ConsoleReporter, MessageBlock, NoticeLevel, OutputMode, PlainRenderer, Renderer};
use tollgate::{parse_command, run_command, Command, CommandError, CommandOutput};

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return;
        }
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new(
                    "Invalid command arguments",
                    err.kind().as_str().unwrap_or("invalid arguments"),
                )
                .with_hint("Run `tollgate --help` to see supported flags"),
            );
            eprint!("{err}");
            std::process::exit(2);
        }
    };

    let verbose = matches!(&cmd, Command::Run(args) if args.verbose);
    let reporter = Arc::new(ConsoleReporter::stderr(output_mode, verbose));
    match run_command(cmd, reporter) {
        Ok(CommandOutput::Summary(summary)) => {
            let mut renderer = PlainRenderer::stdout(output_mode);
            let _ = renderer.success_block(&MessageBlock::new("Tests passed", summary));
        }
        Ok(CommandOutput::CacheCleared { removed }) => {
            let mut renderer = PlainRenderer::stdout(output_mode);
            let _ = if removed {
                renderer.notice(NoticeLevel::Success, "cached result cleared")
            } else {
                renderer.notice(NoticeLevel::Info, "no cached result to clear")
            };
        }
        Err(CommandError::Run(RunError::Failed { summary })) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(&MessageBlock::new("Tests failed", summary));
            std::process::exit(1);
        }
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(&MessageBlock::new("tollgate failed", err.to_string()));
            std::process::exit(1);
        }
    }
}

mod cli;
mod output;

use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cloudwait::action::{Action, ActionId};
use cloudwait::api::CloudClient;
use cloudwait::config::WaitConfig;
use cloudwait::context::WaitContext;
use cloudwait::progress::ProgressMode;
use cloudwait::waiter::ActionWaiter;

use cli::{Cli, Command, OutputFormat};
use output::{WaitReport, action_rows, failure_lines, print_json, render_table};

// Progress updates buffered for the renderer before new ones are dropped.
const PROGRESS_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Filter used when `RUST_LOG` is unset: `warn`, or `debug` with `-v`.
/// Progress lines are `info` events, so their module stays visible.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn,cloudwait::progress=info"
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => WaitConfig::load_from(path)?,
        None => WaitConfig::load()?,
    };
    if config.token.is_empty() {
        bail!("no API token configured: set CLOUDWAIT_TOKEN or `token` in cloudwait.toml");
    }
    let client = CloudClient::with_base_url(config.token.clone(), config.endpoint.clone())?;
    let machine_output = cli.output == OutputFormat::Json;

    match cli.command {
        Command::Status { ids } => {
            let ids: Vec<ActionId> = ids.into_iter().map(ActionId).collect();
            let actions = match ids.as_slice() {
                [id] => vec![client.get_action(*id).await?],
                _ => config.poller().fetch(&client, &ids).await?,
            };
            if machine_output {
                print_json(&actions)?;
            } else {
                let rows = action_rows(&actions);
                println!(
                    "{}",
                    render_table(&["ID", "COMMAND", "STATUS", "PROGRESS", "RESOURCES"], &rows)
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Wait {
            ids,
            timeout,
            poll_interval_ms,
        } => {
            config.apply_flags(timeout, poll_interval_ms);

            let token = CancellationToken::new();
            let interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupt received, cancelling wait");
                    interrupt.cancel();
                }
            });
            let ctx = match config.timeout() {
                Some(timeout) => WaitContext::with_timeout(token, timeout),
                None => WaitContext::new(token),
            };

            let actions: Vec<Action> = ids.into_iter().map(Action::running).collect();
            let sink = ProgressMode::detect(cli.quiet, machine_output).spawn(PROGRESS_QUEUE);
            let waiter = ActionWaiter::new(client, config.poller());
            let result = waiter.wait_for_actions(&ctx, &sink, &actions).await;
            sink.drained().await;

            if machine_output {
                print_json(&WaitReport::from_result(&result))?;
            }
            match result {
                Ok(()) => {
                    if !machine_output && !cli.quiet {
                        println!("All {} action(s) finished successfully", actions.len());
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    if !machine_output {
                        for line in failure_lines(&err) {
                            eprintln!("Error: {line}");
                        }
                    }
                    Ok(ExitCode::from(err.exit_code() as u8))
                }
            }
        }
    }
}

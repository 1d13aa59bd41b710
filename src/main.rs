// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod commands;
mod config;
mod view;

use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use mimalloc::MiMalloc;
use tokio::sync::mpsc;

use commands::Command;
use config::AppConfig;
use location_client::{HttpFetcher, LocationFetcher, Monitor, MonitorEvent};
use view::VehicleTable;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Upper bound on how long shutdown waits for the polling loop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Live vehicle location monitor
#[derive(Parser, Debug)]
#[command(name = "careye-monitor", version, about)]
struct Args {
    /// Location service base URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Seconds between automatic location sweeps
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Terminal to list at startup; may be repeated
    #[arg(long = "terminal", value_name = "ID")]
    terminals: Vec<String>,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Persist the effective configuration (including overrides) before starting
    #[arg(long)]
    save: bool,

    /// Print the full vehicle table on every update
    #[arg(long)]
    table: bool,

    /// Print the default config file path and exit
    #[arg(long)]
    print_config_path: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.print_config_path {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    config.apply_overrides(args.server, args.interval, args.terminals);

    if args.save {
        config.save()?;
        info!("Configuration saved to {}", AppConfig::get_config_path()?.display());
    }

    info!(
        "Starting CarEye monitor against {} (sweep every {}s)",
        config.server_url, config.poll_interval_secs
    );

    let monitor_config = config.to_monitor_config();
    let fetcher = HttpFetcher::new(monitor_config.fetcher.clone())?;
    let (monitor, mut events) = Monitor::spawn(monitor_config, fetcher);

    for terminal in config.terminals() {
        monitor.seed(terminal);
    }
    monitor.activate();

    println!("{}", commands::HELP);
    let mut table = VehicleTable::new(args.table);
    let mut input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_console(&monitor, &mut events, &mut input, &mut table, interrupted).await;

    monitor.close();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor.closed()).await.is_err() {
        warn!("Polling loop did not stop within {}s", SHUTDOWN_TIMEOUT.as_secs());
    }

    // Anything still queued was published before the view closed.
    while let Ok(event) = events.try_recv() {
        if let Some(text) = table.apply(event) {
            println!("{text}");
        }
    }

    info!("CarEye monitor stopped");
    Ok(())
}

/// Read console lines on a dedicated thread.
///
/// A blocked read cannot be cancelled, so it must not live on the runtime:
/// the thread is left behind when the process exits.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Drain monitor events and operator input on the single display context.
///
/// Returns on `quit`, when the event stream ends, or when `interrupted`
/// resolves, even while a console read is still pending.
async fn run_console<F: LocationFetcher>(
    monitor: &Monitor<F>,
    events: &mut mpsc::UnboundedReceiver<MonitorEvent>,
    input: &mut mpsc::UnboundedReceiver<String>,
    table: &mut VehicleTable,
    interrupted: impl Future<Output = ()>,
) {
    let mut input_open = true;
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(text) = table.apply(event) {
                    println!("{text}");
                }
            }

            line = input.recv(), if input_open => match line {
                Some(line) => match commands::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(monitor, command, table),
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                None => {
                    info!("Console input closed, continuing to monitor (Ctrl-C to stop)");
                    input_open = false;
                }
            },

            () = &mut interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }
}

fn execute<F: LocationFetcher>(monitor: &Monitor<F>, command: Command, table: &VehicleTable) {
    match command {
        Command::Request(id) => {
            println!("Requesting location for {id}...");
            monitor.request(id);
        }
        Command::Locate(id) => {
            if monitor.locate(&id).is_none() {
                println!("{id} is not in the vehicle list");
            }
        }
        Command::List => print!("{}", table.render()),
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use location_client::{EntityId, FetchError, LocationRecord, MonitorConfig};

    struct OfflineFetcher;

    impl LocationFetcher for OfflineFetcher {
        async fn fetch(&self, _id: &EntityId) -> Result<LocationRecord, FetchError> {
            Err(FetchError::Unreachable("offline".to_string()))
        }
    }

    #[test]
    fn test_line_reader_forwards_lines_then_closes() {
        let mut rx = spawn_line_reader(std::io::Cursor::new("list\nquit\n"));
        assert_eq!(rx.blocking_recv().as_deref(), Some("list"));
        assert_eq!(rx.blocking_recv().as_deref(), Some("quit"));
        assert_eq!(rx.blocking_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_while_input_idle() {
        let (monitor, mut events) = Monitor::spawn(MonitorConfig::default(), OfflineFetcher);
        // Keep the sender alive: input is open but nothing is ever typed.
        let (_typing, mut input) = mpsc::unbounded_channel();
        let mut table = VehicleTable::new(false);

        let interrupted = tokio::time::sleep(Duration::from_secs(1));
        tokio::time::timeout(
            Duration::from_secs(5),
            run_console(&monitor, &mut events, &mut input, &mut table, interrupted),
        )
        .await
        .expect("console loop ignored the interrupt");
    }

    #[tokio::test]
    async fn test_quit_command_ends_console() {
        let (monitor, mut events) = Monitor::spawn(MonitorConfig::default(), OfflineFetcher);
        let (typing, mut input) = mpsc::unbounded_channel();
        let mut table = VehicleTable::new(false);

        typing.send("list".to_string()).unwrap();
        typing.send("quit".to_string()).unwrap();
        run_console(&monitor, &mut events, &mut input, &mut table, std::future::pending()).await;
        assert_eq!(table.len(), 0);
    }
}

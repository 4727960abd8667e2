mod app;
mod core;
mod error;
mod launcher;
mod linux;
mod logging;
mod paths;
mod pid;
mod platform;
mod selection;
mod state;
mod supervisor;
mod window;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use argh::FromArgs;
use lwe_ipc::{parse_geometry, Command, LaunchRequest, SoundConfig, WindowMode};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::app::{ApplyOutcome, Orchestrator};
use crate::core::{format_window_id, Tuning};
use crate::launcher::BackendResolver;
use crate::linux::{Environment, SystemProcesses, SystemRunner};
use crate::paths::Paths;
use crate::pid::PidFile;
use crate::platform::{CommandRunner, ProcessControl};
use crate::state::StateStore;
use crate::supervisor::Supervisor;
use crate::window::{MonitorHandle, WindowQuery};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// lwe - run linux-wallpaperengine as a desktop wallpaper
#[derive(FromArgs)]
struct Cli {
    /// directory holding one subdirectory per wallpaper
    #[argh(option)]
    dir: Option<PathBuf>,

    /// drop always-on-top and keep the wallpaper window below everything
    #[argh(switch)]
    above: bool,

    /// candidate wallpaper for random and delay (repeatable)
    #[argh(option)]
    pool: Vec<String>,

    /// run in a window with geometry XxYxWxH
    #[argh(option)]
    window: Option<String>,

    /// render on the root window of this output
    #[argh(option)]
    screen_root: Option<String>,

    /// mute the backend
    #[argh(switch)]
    silent: bool,

    /// backend volume
    #[argh(option)]
    volume: Option<u32>,

    /// keep playing sound while other applications do
    #[argh(switch)]
    noautomute: bool,

    /// disable audio processing in the backend
    #[argh(switch)]
    no_audio_processing: bool,

    /// path to the linux-wallpaperengine binary
    #[argh(option)]
    backend: Option<PathBuf>,

    /// path to the tuning config file
    #[argh(option)]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    command: Option<SubCommand>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum SubCommand {
    Set(SetCmd),
    Random(RandomCmd),
    Delay(DelayCmd),
    List(ListCmd),
    Stop(StopCmd),
    Status(StatusCmd),
    Version(VersionCmd),
}

/// Apply a wallpaper by path or by name inside --dir
#[derive(FromArgs)]
#[argh(subcommand, name = "set")]
struct SetCmd {
    #[argh(positional)]
    wallpaper: String,
}

/// Apply a random wallpaper from --pool or --dir
#[derive(FromArgs)]
#[argh(subcommand, name = "random")]
struct RandomCmd {}

/// Apply a random wallpaper every SECONDS until stopped
#[derive(FromArgs)]
#[argh(subcommand, name = "delay")]
struct DelayCmd {
    #[argh(positional)]
    seconds: u64,
}

/// List wallpapers in --dir
#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
struct ListCmd {}

/// Stop the loop and the backend, and clear saved state
#[derive(FromArgs)]
#[argh(subcommand, name = "stop")]
struct StopCmd {}

/// Show the saved state and what is still running
#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
struct StatusCmd {}

/// Show version information
#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCmd {}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let Some(subcmd) = cli.command.as_ref() else {
        // No subcommand - show help (simulate --help)
        let args: Vec<&str> = vec!["lwe", "--help"];
        if let Err(e) = Cli::from_args(&args[..1], &args[1..]) {
            println!("{}", e.output);
        }
        return Ok(());
    };
    if let SubCommand::Version(_) = subcmd {
        println!("lwe {}", VERSION);
        return Ok(());
    }

    let request = to_launch_request(&cli)?;
    let command = to_command(subcmd);
    let paths = Paths::resolve(cli.config)?;
    let _log_guard = logging::init(&paths.log_file);
    let tuning = Tuning::load(&paths.config_file);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(command, request, paths, tuning))
}

fn to_launch_request(cli: &Cli) -> Result<LaunchRequest> {
    let window_mode = match (&cli.window, &cli.screen_root) {
        (Some(geometry), _) => {
            if let Err(e) = parse_geometry(geometry) {
                bail!(e);
            }
            WindowMode::Windowed {
                geometry: geometry.clone(),
            }
        }
        (None, Some(output)) => WindowMode::ScreenRoot {
            output: output.clone(),
        },
        (None, None) => WindowMode::Background,
    };

    let backend_override = cli
        .backend
        .clone()
        .or_else(|| std::env::var_os("LWE_BACKEND_BIN").map(PathBuf::from));

    Ok(LaunchRequest {
        directory: cli.dir.clone(),
        above: cli.above,
        pool: cli.pool.clone(),
        sound: SoundConfig {
            silent: cli.silent,
            volume: cli.volume,
            no_auto_mute: cli.noautomute,
            no_audio_processing: cli.no_audio_processing,
        },
        window_mode,
        backend_override,
    })
}

fn to_command(subcmd: &SubCommand) -> Command {
    match subcmd {
        SubCommand::Set(cmd) => Command::Set {
            wallpaper: cmd.wallpaper.clone(),
        },
        SubCommand::Random(_) => Command::Random,
        SubCommand::Delay(cmd) => Command::Delay {
            seconds: cmd.seconds,
        },
        SubCommand::List(_) => Command::List,
        SubCommand::Stop(_) => Command::Stop,
        SubCommand::Status(_) => Command::Status,
        SubCommand::Version(_) => unreachable!("handled in main"),
    }
}

async fn wait_for_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

/// Flips to true on SIGINT or SIGTERM.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

fn log_outcome(outcome: &ApplyOutcome) {
    let engine = &outcome.engine;
    tracing::info!(
        "[APPLY] {} running as pid {} since {} ({:?}), window {:?}, flags {:?}, args {:?}",
        engine.wallpaper.display(),
        engine.pid,
        engine.started_at.to_rfc3339(),
        outcome.lifecycle,
        outcome.window.as_ref().map(|w| format_window_id(w.id)),
        outcome.flags,
        engine.launch_args
    );
}

/// Stay resident while the retry monitor runs; a signal cancels it.
async fn hold_for_monitor(monitor: Option<MonitorHandle>, tuning: &Tuning) {
    let Some(monitor) = monitor else {
        return;
    };
    tracing::info!(
        "[MONITOR] Staying resident while pid {} is monitored",
        monitor.pid()
    );
    let mut shutdown = shutdown_signal();
    while !monitor.is_finished() {
        tokio::select! {
            _ = tokio::time::sleep(tuning.monitor_tick()) => {}
            _ = shutdown.changed() => {
                monitor.cancel();
                break;
            }
        }
    }
    let exit = monitor.join().await;
    tracing::info!("[MONITOR] Finished: {:?}", exit);
}

async fn run(command: Command, request: LaunchRequest, paths: Paths, tuning: Tuning) -> Result<()> {
    let environment = Environment::detect();
    let sandboxed = environment.is_sandboxed();
    tracing::info!("lwe {} starting ({:?}): {:?}", VERSION, environment, command);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let processes: Arc<dyn ProcessControl> = Arc::new(SystemProcesses::new(
        runner.clone(),
        environment.host_delegate(),
        tuning.tool_timeout(),
    ));
    let query = Arc::new(WindowQuery::for_environment(
        environment,
        runner.clone(),
        tuning.tool_timeout(),
    ));
    let resolver = BackendResolver::for_environment(
        request.backend_override.clone(),
        environment,
        runner,
        tuning.tool_timeout(),
    );

    let orchestrator = Orchestrator::new(
        request,
        query.clone(),
        processes.clone(),
        resolver,
        StateStore::new(&paths.state_file),
        tuning.clone(),
        sandboxed,
    );
    let supervisor = Supervisor::new(
        query,
        processes,
        StateStore::new(&paths.state_file),
        PidFile::new(&paths.pid_file),
        tuning.clone(),
        sandboxed,
    );

    match command {
        Command::Set { wallpaper } => {
            let path = orchestrator.resolve(&wallpaper);
            let outcome = orchestrator.apply(&path).await?;
            log_outcome(&outcome);
            hold_for_monitor(outcome.monitor, &tuning).await;
        }
        Command::Random => match orchestrator.apply_random().await? {
            Some(outcome) => {
                log_outcome(&outcome);
                hold_for_monitor(outcome.monitor, &tuning).await
            }
            None => println!("No wallpapers to choose from"),
        },
        Command::Delay { seconds } => {
            let config = orchestrator.request().loop_config(seconds);
            supervisor
                .run_loop(&orchestrator, &config, None, shutdown_signal())
                .await?;
        }
        Command::List => {
            for name in orchestrator.list() {
                println!("{}", name);
            }
        }
        Command::Stop => {
            supervisor.stop_all().await;
        }
        Command::Status => print_status(&supervisor),
    }
    Ok(())
}

fn print_status(supervisor: &Supervisor) {
    let report = supervisor.status();
    let state = &report.state;
    if state.is_empty() {
        println!("Nothing running");
    } else {
        println!("Wallpaper: {}", state.last_wallpaper);
        match state.last_pid {
            Some(pid) => println!(
                "Backend pid: {} ({})",
                pid,
                if report.backend_alive { "running" } else { "exited" }
            ),
            None => println!("Backend pid: -"),
        }
        println!("Windows: {}", state.last_windows.join(", "));
    }
    if let Some(time) = state.last_execution_time {
        println!("Last run: {}", time.to_rfc3339());
    }
    println!("Sandboxed: {}", state.sandboxed);
    if let Some((pid, alive)) = report.loop_owner {
        println!(
            "Loop owner: {} ({})",
            pid,
            if alive { "running" } else { "stale" }
        );
    }
}

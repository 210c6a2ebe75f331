use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tasktally::config::default_store_path;
use tasktally::{
    Backend, BlobStore, Config, JsonlBlobStore, PersistentStore, SystemClock, TimerEngine, format_elapsed, now_ms,
};
use tracing_subscriber::EnvFilter;

type Engine = TimerEngine<Box<dyn BlobStore>>;

#[derive(Parser)]
#[command(name = "tasktally")]
#[command(about = "tasktally - exclusive per-task time tracking")]
#[command(version)]
struct Cli {
    /// Path to the store directory (default: platform data directory)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Storage backend, overriding tasktally.yml
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task; `123` or `#123` becomes work item "WI #123"
    Add { name: String },

    /// Rename a task
    Rename { task: String, name: String },

    /// Delete a task
    Remove { task: String },

    /// Make a task the running one
    Start { task: String },

    /// Stop the running task
    Pause,

    /// Pause the task if it is running, start it otherwise
    Toggle { task: String },

    /// List tasks and the running task
    Status,

    /// Time per task, largest first
    Summary,

    /// Delete every task
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Select an accent preset or a custom #rrggbb color
    Accent {
        #[arg(long, conflicts_with = "color")]
        preset: Option<usize>,
        #[arg(long)]
        color: Option<String>,
    },

    /// Switch between light and dark display
    DisplayMode {
        #[arg(value_enum)]
        mode: DisplayMode,
    },

    /// Manage quick-access task names
    Quick {
        #[command(subcommand)]
        action: QuickAction,
    },

    /// Run the timer in the foreground, crediting time to the running task
    Watch {
        /// How long to run
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Rewrite the JSONL log keeping only the latest value per key
    Compact,
}

#[derive(Clone, Copy, ValueEnum)]
enum DisplayMode {
    Light,
    Dark,
}

#[derive(Subcommand)]
enum QuickAction {
    List,
    Add { name: String },
    Remove { name: String },
    Set { names: Vec<String> },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store_path = cli.store_path.unwrap_or_else(default_store_path);
    let mut config = Config::load(&store_path)?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    if let Commands::Compact = cli.command {
        let dropped = compact(&store_path, config.backend)?;
        println!("Compacted the log (dropped {} lines)", dropped);
        return Ok(());
    }

    let blob = config.open_blob_store(&store_path)?;
    let mut engine = TimerEngine::new(PersistentStore::new(blob), SystemClock)
        .with_tick_period(config.tick_ms)
        .with_max_tick_delta(config.max_tick_delta_ms);
    engine.hydrate();

    let result = run(&mut engine, cli.command);
    engine.shutdown();
    result
}

fn run(engine: &mut Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Add { name } => match engine.add_task_from_input(&name) {
            Some(id) => {
                let task = engine.state().task(&id).ok_or_else(|| eyre!("Task vanished after add"))?;
                println!("Added {}", task.name.bold());
            }
            None => println!("{}", "Not added: empty or duplicate name".yellow()),
        },
        Commands::Rename { task, name } => {
            let id = resolve_task(engine, &task)?;
            if engine.rename_task(&id, &name) {
                println!("Renamed to {}", name.trim().bold());
            } else {
                println!("{}", "Not renamed: empty, unchanged, or duplicate name".yellow());
            }
        }
        Commands::Remove { task } => {
            let id = resolve_task(engine, &task)?;
            engine.remove_task(&id);
            println!("Removed {}", task);
        }
        Commands::Start { task } => {
            let id = resolve_task(engine, &task)?;
            engine.start_task(&id);
            print_status(engine);
        }
        Commands::Pause => {
            if engine.pause() {
                println!("Paused");
            } else {
                println!("Nothing running");
            }
        }
        Commands::Toggle { task } => {
            let id = resolve_task(engine, &task)?;
            engine.toggle_task(&id);
            print_status(engine);
        }
        Commands::Status => print_status(engine),
        Commands::Summary => print_summary(engine),
        Commands::Clear { yes } => {
            if !yes {
                return Err(eyre!("Refusing to delete all tasks without --yes"));
            }
            engine.clear_all();
            println!("All tasks deleted");
        }
        Commands::Accent { preset, color } => {
            let changed = match (preset, color) {
                (Some(index), _) => engine.select_accent_preset(index),
                (None, Some(color)) => engine.set_custom_accent(&color),
                (None, None) => false,
            };
            let theme = engine.theme();
            println!(
                "Accent {} {}{}",
                theme.accent_hex,
                theme.accent.to_css(),
                if changed { "" } else { " (unchanged)" }
            );
        }
        Commands::DisplayMode { mode } => {
            engine.set_display_mode(matches!(mode, DisplayMode::Dark));
            println!("Display mode: {}", if engine.settings().dark_mode { "dark" } else { "light" });
        }
        Commands::Quick { action } => {
            match action {
                QuickAction::List => {}
                QuickAction::Add { name } => {
                    engine.add_quick_access(&name);
                }
                QuickAction::Remove { name } => {
                    engine.remove_quick_access(&name);
                }
                QuickAction::Set { names } => {
                    engine.set_quick_access(&names);
                }
            }
            for name in &engine.settings().quick_access {
                println!("  {}", name);
            }
        }
        Commands::Watch { seconds } => watch(engine, seconds),
        Commands::Compact => return Err(eyre!("Compaction runs without opening the engine")),
    }

    Ok(())
}

/// Compact the JSONL log under `store_path`. Returns the lines dropped.
fn compact(store_path: &Path, backend: Backend) -> Result<usize> {
    if backend != Backend::Jsonl {
        return Err(eyre!("Backend {:?} keeps no log to compact, use --backend jsonl", backend));
    }
    let mut store = JsonlBlobStore::open(store_path)?;
    store.compact()
}

/// Find a task by exact id, case-insensitive name, or id prefix
fn resolve_task(engine: &Engine, query: &str) -> Result<String> {
    let tasks = engine.tasks();
    let query = query.trim();

    if let Some(task) = tasks.iter().find(|t| t.id == query || t.name_matches(query)) {
        return Ok(task.id.clone());
    }

    let matches: Vec<_> = tasks.iter().filter(|t| t.id.starts_with(query)).collect();
    match matches.as_slice() {
        [task] => Ok(task.id.clone()),
        [] => Err(eyre!("No task matches {:?}", query)),
        _ => Err(eyre!("{:?} matches {} tasks, be more specific", query, matches.len())),
    }
}

fn print_status(engine: &Engine) {
    if engine.tasks().is_empty() {
        println!("No tasks");
        return;
    }

    for task in engine.tasks() {
        let marker = if engine.state().is_active(&task.id) {
            "▶".green().bold()
        } else {
            " ".normal()
        };
        let name = if task.is_external_item {
            task.name.cyan()
        } else {
            task.name.normal()
        };
        let short_id = task.id.get(..8).unwrap_or(&task.id);
        println!("{} {:<32} {:>10}  {}", marker, name, format_elapsed(task.elapsed), short_id.dimmed());
    }
}

fn print_summary(engine: &Engine) {
    let totals = engine.derived_totals();
    if totals.rows.is_empty() {
        println!("No time recorded");
        return;
    }

    for row in &totals.rows {
        println!("{:<32} {:>10} {:>4}%", row.name, format_elapsed(row.elapsed), row.percent);
    }
    println!("{:<32} {:>10}", "Total".bold(), format_elapsed(totals.total_elapsed).bold());
}

fn watch(engine: &mut Engine, seconds: u64) {
    let Some(task) = engine.active_task() else {
        println!("Nothing running");
        return;
    };
    println!("Tracking {} for {}s", task.name.bold(), seconds);

    let deadline = watch_deadline(now_ms(), seconds);
    loop {
        let now = now_ms();
        if now >= deadline {
            break;
        }

        let next = engine.ticker().next_due().unwrap_or(deadline).min(deadline);
        thread::sleep(Duration::from_millis((next - now).max(0) as u64));

        if !engine.poll_tick() {
            continue;
        }
        if let Some(task) = engine.active_task() {
            println!("{} {}", task.name, format_elapsed(task.elapsed));
        }
    }

    // Credit the partial interval before the deadline
    engine.tick(now_ms());
}

/// `now` plus `seconds`, saturating instead of overflowing
fn watch_deadline(now: i64, seconds: u64) -> i64 {
    let span = i64::try_from(seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
    now.saturating_add(span)
}

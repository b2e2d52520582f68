//! algoquest-progress: local progress tracker with optional cloud sync
//!
//! ## Usage
//!
//! ```bash
//! # Show level, streak and achievements
//! algoquest-progress show
//!
//! # Record a solve (15 minutes, first try)
//! algoquest-progress solve two-sum --difficulty easy --minutes 15 --first-attempt
//!
//! # Re-solve practice
//! algoquest-progress due
//! algoquest-progress resolve two-sum
//!
//! # Pull and reconcile with the remote copy
//! algoquest-progress --remote-url https://progress.example.com sync --user-id alice
//! ```
//!
//! Pass `--user-id` (or `ALGOQUEST_USER_ID`) to any command to attach before
//! it runs, so the change is also written to the remote store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use algoquest_progress::cache::Theme;
use algoquest_progress::derive::achievement;
use algoquest_progress::store::{self, Difficulty, Track};
use algoquest_progress::{
    Catalog, Config, HttpRemoteStore, Identity, LocalCache, ProgressService, ServiceDriver, SessionEvent,
    SqliteKv, StaticCatalog, SyncPhase, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "algoquest-progress")]
#[command(about = "Offline-first progress tracker for AlgoQuest")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "ALGOQUEST_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite cache file (overrides config)
    #[arg(long, env = "ALGOQUEST_CACHE")]
    cache_path: Option<PathBuf>,

    /// Remote progress API base URL (overrides config)
    #[arg(long, env = "ALGOQUEST_REMOTE_URL")]
    remote_url: Option<String>,

    /// Remote API key (overrides config)
    #[arg(long, env = "ALGOQUEST_API_KEY")]
    api_key: Option<String>,

    /// Curriculum catalogue JSON (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Attach this user before running the command
    #[arg(long, env = "ALGOQUEST_USER_ID")]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show current progress
    Show {
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set name, track and language
    Profile {
        name: String,
        /// 2-week or 3-week
        #[arg(short, long, default_value = "2-week", value_parser = parse_track)]
        track: Track,
        #[arg(short, long, default_value = "python")]
        language: String,
    },

    /// Mark a problem solved
    Solve {
        problem_id: String,
        /// easy, medium or hard
        #[arg(short, long, value_parser = parse_difficulty)]
        difficulty: Difficulty,
        /// Time spent in minutes
        #[arg(short, long, default_value = "0")]
        minutes: u64,
        /// Solved without help on the first try
        #[arg(long)]
        first_attempt: bool,
    },

    /// Record a re-solve attempt
    Resolve {
        problem_id: String,
        /// The attempt failed
        #[arg(long)]
        failed: bool,
    },

    /// List problems due for a re-solve
    Due,

    /// Write today's log
    Log {
        /// Energy score, 1 to 10
        energy: u8,
    },

    /// Mark a curriculum day complete
    Day {
        week: u32,
        day: u32,
        /// Unmark instead
        #[arg(long)]
        undo: bool,
    },

    /// Mark a learning resource watched
    Watch {
        resource_id: String,
        /// Unmark instead
        #[arg(long)]
        undo: bool,
    },

    /// Write a backup of the record
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replace the record with a backup
    Import { path: PathBuf },

    /// Show or set the theme (dark, light, toggle)
    Theme { value: Option<String> },

    /// Reconcile with the remote copy
    Sync {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        email: Option<String>,
    },
}

fn parse_track(s: &str) -> Result<Track, String> {
    Track::parse(s).ok_or_else(|| format!("unknown track '{}', expected 2-week or 3-week", s))
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    Difficulty::parse(s).ok_or_else(|| format!("unknown difficulty '{}', expected easy, medium or hard", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("algoquest_progress=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(path) = cli.cache_path.clone() {
        config.cache.path = path;
    }
    if let Some(url) = cli.remote_url.clone() {
        config.remote.base_url = Some(url);
    }
    if let Some(key) = cli.api_key.clone() {
        config.remote.api_key = Some(key);
    }
    if let Some(path) = cli.catalog.clone() {
        config.catalog_path = Some(path);
    }

    let kv = SqliteKv::open(&config.cache.path)?;
    let cache = LocalCache::with_keys(kv, config.cache.progress_key.clone(), config.cache.theme_key.clone());

    let catalog: Arc<dyn Catalog> = match &config.catalog_path {
        Some(path) => Arc::new(StaticCatalog::load(path)?),
        None => Arc::new(StaticCatalog::default()),
    };

    let mut service = ProgressService::new(cache, catalog, Arc::new(SystemClock))
        .with_fetch_timeout(config.remote.fetch_timeout());
    if let Some(client) = config.remote.client_config() {
        info!(base_url = %client.base_url, "Remote sync enabled");
        service = service.with_remote(Arc::new(HttpRemoteStore::new(client)?));
    }

    let identity = match &cli.command {
        Command::Sync { user_id, email } => {
            let identity = Identity::new(user_id.clone());
            Some(match email {
                Some(email) => identity.with_email(email.clone()),
                None => identity,
            })
        }
        _ => cli.user_id.clone().map(Identity::new),
    };
    if let Some(identity) = identity {
        if matches!(cli.command, Command::Sync { .. }) {
            service = attach_with_driver(service, identity, config.remote.ui_guard()).await?;
        } else {
            let source = service
                .handle_session_event(SessionEvent::initial(Some(identity)))
                .await;
            info!(?source, phase = ?service.phase(), "Session attached");
        }
    }

    run(&mut service, cli.command)?;

    service.settle().await;
    Ok(())
}

/// Reconcile through the event loop, reporting when the loading guard gives up
async fn attach_with_driver(
    service: ProgressService,
    identity: Identity,
    ui_guard: Duration,
) -> anyhow::Result<ProgressService> {
    let (driver, handle) = ServiceDriver::new(service, ui_guard);
    let task = tokio::spawn(driver.run());
    let mut rx = handle.subscribe();

    handle.send_session(SessionEvent::initial(Some(identity))).await?;

    let mut warned = false;
    loop {
        let (phase, loading) = {
            let snapshot = rx.borrow_and_update();
            (snapshot.phase, snapshot.loading)
        };
        if phase == SyncPhase::Attached {
            break;
        }
        if phase == SyncPhase::Reconciling && !loading && !warned {
            warn!(guard_secs = ui_guard.as_secs(), "Remote store is slow, still waiting to reconcile");
            warned = true;
        }
        rx.changed().await?;
    }

    drop(rx);
    drop(handle);
    let service = task.await?;
    info!(phase = ?service.phase(), "Session attached");
    Ok(service)
}

fn run(service: &mut ProgressService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Show { json } => {
            if json {
                println!("{}", store::serialize(service.record())?);
            } else {
                print_summary(service);
            }
        }

        Command::Profile { name, track, language } => {
            service.set_profile(&name, track, &language);
            println!("Profile saved: {} on the {} track", name, track.as_str());
        }

        Command::Solve {
            problem_id,
            difficulty,
            minutes,
            first_attempt,
        } => {
            let outcome =
                service.mark_problem_solved(&problem_id, difficulty, minutes.saturating_mul(60), first_attempt)?;
            println!("Solved {} ({}), {} XP total", problem_id, difficulty.as_str(), service.record().xp);
            print_notifications(service, outcome.leveled_up, &outcome.unlocked);
        }

        Command::Resolve { problem_id, failed } => {
            let outcome = service.mark_resolve(&problem_id, !failed)?;
            match service
                .record()
                .problem_records
                .get(&problem_id)
                .and_then(|p| p.next_resolve_due)
            {
                Some(due) => println!("Re-solve recorded, next due {}", due),
                None => println!("Re-solve recorded"),
            }
            print_notifications(service, outcome.leveled_up, &outcome.unlocked);
        }

        Command::Due => {
            let due = service.due_resolves();
            if due.is_empty() {
                println!("Nothing due");
            }
            for id in due {
                println!("{}", id);
            }
        }

        Command::Log { energy } => {
            service.log_daily(energy)?;
            println!("Logged energy {}", energy);
        }

        Command::Day { week, day, undo } => {
            let outcome = service.mark_day_complete(week, day, !undo);
            if !outcome.changed {
                println!("Week {} day {} unchanged", week, day);
            }
            print_notifications(service, outcome.leveled_up, &outcome.unlocked);
        }

        Command::Watch { resource_id, undo } => {
            let outcome = service.mark_video_watched(&resource_id, !undo)?;
            print_notifications(service, outcome.leveled_up, &outcome.unlocked);
        }

        Command::Export { out } => {
            let json = service.export()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)?;
            service.import(&raw)?;
            println!("Imported {} ({} XP)", path.display(), service.record().xp);
        }

        Command::Theme { value } => match value.as_deref() {
            None => println!("{}", service.theme().as_str()),
            Some("toggle") => {
                let theme = service.theme().toggled();
                service.set_theme(theme);
                println!("{}", theme.as_str());
            }
            Some(other) => {
                let theme = Theme::parse(other)
                    .ok_or_else(|| anyhow::anyhow!("unknown theme '{}', expected dark, light or toggle", other))?;
                service.set_theme(theme);
                println!("{}", theme.as_str());
            }
        },

        Command::Sync { .. } => print_summary(service),
    }
    Ok(())
}

fn print_summary(service: &ProgressService) {
    let record = service.record();
    let level = service.level_info();

    if !record.profile.display_name.is_empty() {
        println!("{}", record.profile.display_name);
    }
    match level.xp_next {
        Some(next) => println!("Level {} {} - {} XP ({} to next)", level.level, level.title, record.xp, next.saturating_sub(record.xp)),
        None => println!("Level {} {} - {} XP (max)", level.level, level.title, record.xp),
    }
    println!(
        "Streak {} days (best {})",
        record.streak.current_length, record.streak.longest_length
    );
    println!("Solved {} problems, {} due for re-solve", record.solved_count(), service.due_resolves().len());

    for id in &record.achievements {
        match achievement(id) {
            Ok(a) => println!("  * {} - {}", a.title, a.description),
            Err(_) => println!("  * {}", id),
        }
    }
    if let Some(identity) = service.identity() {
        println!("Signed in as {} ({:?})", identity.user_id, service.phase());
    }
}

fn print_notifications(service: &ProgressService, leveled_up: Option<u32>, unlocked: &[String]) {
    if let Some(level) = leveled_up {
        println!("Level up! Now level {}", level);
    }
    for id in unlocked {
        if let Ok(a) = achievement(id) {
            println!("Achievement unlocked: {}", a.title);
        }
    }
    if leveled_up.is_none() && unlocked.is_empty() {
        println!("{} XP", service.record().xp);
    }
}

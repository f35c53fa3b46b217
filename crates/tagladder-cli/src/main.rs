// Tag ladder command-line entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file, stdout is for command output)
// 3. Load config
// 4. Open database
// 5. Dispatch the subcommand

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tagladder_core::challenge::{ChallengeFilter, ChallengeSubmission};
use tagladder_core::config::{self, Config};
use tagladder_core::db::Database;
use tagladder_core::player::{format_tag, Division, NewPlayer, PlayerId, PlayerStatus, Tag};
use tagladder_core::roster;
use tagladder_core::service::Submitter;

mod render;

/// tagladder - bag tag ladder for a disc golf club
#[derive(Parser, Debug)]
#[command(name = "tagladder")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding `config/` (and `defaults/` on first run)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a challenge result from a JSON file and reassign tags
    Submit {
        /// Path to the challenge JSON
        file: PathBuf,

        /// Show the tag changes without recording anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Active players by tag, unranked last
    Leaderboard {
        /// Only show one division
        #[arg(short, long)]
        division: Option<String>,
    },

    /// Recorded challenges, newest first
    Challenges {
        /// All, Direct, Group, or a division name
        #[arg(short, long, default_value = "All")]
        filter: String,
    },

    /// Recent tag changes, newest first
    History {
        /// Number of entries (defaults to history.display_limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only show one player's changes
        #[arg(short, long)]
        player: Option<PlayerId>,
    },

    /// Player registry maintenance
    #[command(subcommand)]
    Player(PlayerCommands),

    /// Bulk-load players from a roster CSV (name,division,status,tag)
    Import {
        /// Path to the roster CSV
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PlayerCommands {
    /// Add a player
    Add {
        name: String,

        #[arg(short, long, default_value = "Mixed")]
        division: String,

        #[arg(short, long)]
        tag: Option<Tag>,
    },

    /// Edit a player; omitted fields keep their current value
    Update {
        id: PlayerId,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        division: Option<String>,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long, conflicts_with = "clear_tag")]
        tag: Option<Tag>,

        /// Remove the player's tag
        #[arg(long)]
        clear_tag: bool,
    },

    /// Mark a player inactive
    Deactivate { id: PlayerId },

    /// List every registered player
    #[command(alias = "ls")]
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.root, &cli.log_level)?;
    info!("tagladder starting: {:?}", cli.command);

    let config = config::load_config_at(&cli.root).context("failed to load configuration")?;

    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    match cli.command {
        Commands::Submit { file, dry_run } => submit(&db, &config, &file, dry_run),
        Commands::Leaderboard { division } => {
            let division = division.as_deref().map(parse_division).transpose()?;
            print!("{}", render::leaderboard(&db.leaderboard(division)?));
            Ok(())
        }
        Commands::Challenges { filter } => {
            let Some(filter) = ChallengeFilter::parse(&filter) else {
                bail!("unknown filter {filter:?}; use All, Direct, Group, or a division");
            };
            print!("{}", render::challenges(&db.challenges(filter)?));
            Ok(())
        }
        Commands::History { limit, player } => {
            let limit = limit.unwrap_or(config.history.display_limit);
            let entries = match player {
                Some(id) => db.history_for_player(id, limit)?,
                None => db.recent_history(limit)?,
            };
            print!("{}", render::history(&entries));
            Ok(())
        }
        Commands::Player(cmd) => player(&db, cmd),
        Commands::Import { file } => {
            let players = roster::load_roster(&file)?;
            let count = db.import_players(&players)?;
            println!("Imported {count} players.");
            Ok(())
        }
    }
}

fn submit(db: &Database, config: &Config, file: &Path, dry_run: bool) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let submission = ChallengeSubmission::from_json(&json)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let submitter = Submitter::from_config(db, config);

    if dry_run {
        let preview = submitter.preview(&submission)?;
        print!(
            "{}",
            render::reconciliation(&preview.reconciliation, &preview.snapshot)
        );
        println!("Dry run: nothing recorded.");
        return Ok(());
    }

    let outcome = submitter.submit(&submission, Utc::now())?;
    if outcome.attempts > 1 {
        warn!(
            "Challenge {} needed {} attempts",
            outcome.challenge_id, outcome.attempts
        );
    }
    let names = db.players_by_ids(&outcome.challenge.player_ids())?;
    println!("Recorded challenge #{}.", outcome.challenge_id);
    print!("{}", render::reconciliation(&outcome.reconciliation, &names));
    Ok(())
}

fn player(db: &Database, cmd: PlayerCommands) -> Result<()> {
    match cmd {
        PlayerCommands::Add {
            name,
            division,
            tag,
        } => {
            let id = db.add_player(&NewPlayer {
                name,
                division: parse_division(&division)?,
                status: PlayerStatus::Active,
                tag,
            })?;
            println!("Added player {id} with tag {}.", format_tag(tag));
        }
        PlayerCommands::Update {
            id,
            name,
            division,
            status,
            tag,
            clear_tag,
        } => {
            let Some(current) = db.get_player(id)? else {
                bail!("player {id} not found");
            };
            let status = match status {
                Some(s) => PlayerStatus::from_str_status(&s)
                    .with_context(|| format!("unknown status {s:?}; use Active or Inactive"))?,
                None => current.status,
            };
            let updated = NewPlayer {
                name: name.unwrap_or(current.name),
                division: division
                    .as_deref()
                    .map(parse_division)
                    .transpose()?
                    .unwrap_or(current.division),
                status,
                tag: if clear_tag { None } else { tag.or(current.tag) },
            };
            db.update_player(id, &updated)?;
            println!("Updated player {id}.");
        }
        PlayerCommands::Deactivate { id } => {
            db.deactivate_player(id)?;
            println!("Player {id} is now inactive.");
        }
        PlayerCommands::List => {
            for p in db.list_players()? {
                println!(
                    "{:>4}  {:>5}  {}  {}  {}",
                    p.id,
                    format_tag(p.tag),
                    p.name,
                    p.division,
                    p.status
                );
            }
        }
    }
    Ok(())
}

fn parse_division(s: &str) -> Result<Division> {
    Division::from_str_div(s)
        .with_context(|| format!("unknown division {s:?}; use Mixed, Female, Junior, or Senior"))
}

/// Initialize tracing to log to a file so command output stays clean.
fn init_tracing(root: &Path, level: &str) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = root.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tagladder.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("tagladder={level},tagladder_core={level},warn"))
        }))
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

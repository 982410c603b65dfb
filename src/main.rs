use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use snapcurate::albums::{RuleCatalog, SmartAlbumEngine};
use snapcurate::config::Config;
use snapcurate::db::Database;
use snapcurate::scanner::Importer;
use snapcurate::tasks::{AnalysisWorker, BackgroundTaskManager, MediaLocks, TaskState};
use snapcurate::vision::Analyzer;
use snapcurate::{clip, logging};

#[derive(Debug, PartialEq)]
enum Command {
    Import { dir: PathBuf },
    Analyze { all: bool },
    AlbumsCreate { force: bool },
    AlbumsSuggest,
    AlbumsRefresh { album_id: i64 },
    AlbumsPrune,
    AlbumsList,
}

#[derive(Debug, PartialEq)]
struct Cli {
    config_path: Option<PathBuf>,
    owner: String,
    command: Command,
}

fn default_owner() -> String {
    std::env::var("USER").unwrap_or_else(|_| "default".to_string())
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut config_path = None;
    let mut owner = None;
    let mut all = false;
    let mut force = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("snapcurate {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
                i += 1;
            }
            "--owner" | "-o" => {
                let name = args.get(i + 1).ok_or("--owner requires a name")?;
                owner = Some(name.clone());
                i += 1;
            }
            "--all" => all = true,
            "--force" => force = true,
            arg if arg.starts_with('-') => return Err(format!("Unknown argument: {}", arg)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let words: Vec<&str> = positional.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["import", dir] => Command::Import { dir: PathBuf::from(dir) },
        ["analyze"] => Command::Analyze { all },
        ["albums", "create"] => Command::AlbumsCreate { force },
        ["albums", "suggest"] => Command::AlbumsSuggest,
        ["albums", "refresh", id] => Command::AlbumsRefresh {
            album_id: id.parse().map_err(|_| format!("Invalid album id: {}", id))?,
        },
        ["albums", "prune"] => Command::AlbumsPrune,
        ["albums", "list"] => Command::AlbumsList,
        [] => return Err("No command given".to_string()),
        other => return Err(format!("Unknown command: {}", other.join(" "))),
    };

    Ok(Cli {
        config_path,
        owner: owner.unwrap_or_else(default_owner),
        command,
    })
}

fn print_help() {
    println!(
        r#"snapcurate - image analysis and smart albums

USAGE:
    snapcurate [OPTIONS] <COMMAND>

COMMANDS:
    import <DIR>            Register the media files under DIR
    analyze [--all]         Analyze images (--all re-analyzes analyzed ones)
    albums create [--force] Create or update smart albums (--force recreates)
    albums suggest          Preview the albums the rules would create
    albums refresh <ID>     Re-evaluate one auto album
    albums prune            Delete empty auto albums
    albums list             List albums

OPTIONS:
    --config, -c PATH   Path to config file
    --owner, -o NAME    Library owner (default: $USER)
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SNAPCURATE_CONFIG   Path to config file (overrides default location)
    SNAPCURATE_LOG      Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/snapcurate/config.toml"#
    );
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    if let Err(e) = logging::init(None) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    db.initialize()?;

    match cli.command {
        Command::Import { dir } => import(&config, db, &dir, &cli.owner),
        Command::Analyze { all } => analyze(&config, db, &cli.owner, all),
        Command::AlbumsCreate { force } => {
            let stats = engine(&config, db)?.create_all(&cli.owner, force);
            println!(
                "{} created, {} updated, {} skipped, {} failed",
                stats.created, stats.updated, stats.skipped, stats.failed
            );
            Ok(())
        }
        Command::AlbumsSuggest => {
            for s in engine(&config, db)?.suggest(&cli.owner)? {
                let status = if s.can_create { "ready" } else { "below threshold" };
                println!("{} {:<28} {:>5} media  [{}] ({})", s.icon, s.name, s.media_count, s.rule_key, status);
            }
            Ok(())
        }
        Command::AlbumsRefresh { album_id } => {
            match engine(&config, db)?.refresh_album(album_id)? {
                Some(album) => println!("{}: {} media", album.name, album.media_count),
                None => println!("Album {} cannot be refreshed", album_id),
            }
            Ok(())
        }
        Command::AlbumsPrune => {
            let removed = engine(&config, db)?.prune_empty(&cli.owner)?;
            println!("{} empty albums deleted", removed);
            Ok(())
        }
        Command::AlbumsList => {
            for album in db.list_albums(&cli.owner)? {
                println!(
                    "{:>5}  {:<6} {} {:<28} {:>5} media",
                    album.id,
                    album.kind.as_str(),
                    album.icon,
                    album.name,
                    album.media_count
                );
            }
            Ok(())
        }
    }
}

fn import(config: &Config, db: Arc<Database>, dir: &std::path::Path, owner: &str) -> Result<()> {
    let mut manager = BackgroundTaskManager::new();
    Importer::new(config.scanner.clone()).spawn(&mut manager, db, dir, owner);
    wait_for_tasks(&mut manager)
}

fn analyze(config: &Config, db: Arc<Database>, owner: &str, all: bool) -> Result<()> {
    let media = db.images_to_analyze(Some(owner), all)?;
    if media.is_empty() {
        println!("Nothing to analyze");
        return Ok(());
    }

    let classifier = clip::load_classifier(config);
    let analyzer = Analyzer::new(classifier, &config.analysis)?;
    let worker = AnalysisWorker::new(
        db,
        Arc::new(analyzer),
        Arc::new(MediaLocks::new()),
        config.analysis.ai_tag_count,
    );

    let mut manager = BackgroundTaskManager::new();
    Arc::new(worker).spawn(&mut manager, media);
    wait_for_tasks(&mut manager)
}

fn engine(config: &Config, db: Arc<Database>) -> Result<SmartAlbumEngine> {
    let catalog = match &config.albums.catalog_path {
        Some(path) => RuleCatalog::load(path).context("Rule catalog unusable")?,
        None => RuleCatalog::builtin(),
    };
    Ok(SmartAlbumEngine::new(db, catalog))
}

/// Set once the user presses Ctrl-C. If the handler cannot be installed the
/// flag simply never fires.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "Ctrl-C handler not installed");
    }
    flag
}

/// Print progress until every task has finished. Ctrl-C cancels the running
/// tasks, which stop after the item they are on.
fn wait_for_tasks(manager: &mut BackgroundTaskManager) -> Result<()> {
    let interrupt = interrupt_flag();
    let finished = manager.wait(&interrupt, |running| {
        for task in running {
            if let Some(progress) = &task.progress {
                eprint!(
                    "\r[{}] {}/{} {:>3}% {}",
                    task.task_type.name(),
                    progress.current,
                    progress.total,
                    progress.percent(),
                    progress.current_item.as_deref().unwrap_or("")
                );
            }
        }
    });

    let mut failed = None;
    for info in finished {
        eprintln!();
        println!(
            "{} ({:.1}s): {}",
            info.task_type.name(),
            info.elapsed.as_secs_f64(),
            info.message
        );
        match info.state {
            TaskState::Failed(error) => failed = Some(error),
            TaskState::Cancelled => failed = failed.or(Some("Interrupted".to_string())),
            _ => {}
        }
    }

    match failed {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        let cli = parse_args(&args("--owner alice import /photos")).unwrap();
        assert_eq!(cli.owner, "alice");
        assert_eq!(
            cli.command,
            Command::Import {
                dir: PathBuf::from("/photos")
            }
        );

        let cli = parse_args(&args("albums create --force -c /tmp/c.toml")).unwrap();
        assert_eq!(cli.command, Command::AlbumsCreate { force: true });
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/c.toml")));

        assert_eq!(
            parse_args(&args("albums refresh 12")).unwrap().command,
            Command::AlbumsRefresh { album_id: 12 }
        );
        assert_eq!(parse_args(&args("analyze --all")).unwrap().command, Command::Analyze { all: true });
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args("albums refresh twelve")).is_err());
        assert!(parse_args(&args("albums rename")).is_err());
        assert!(parse_args(&args("analyze --fast")).is_err());
        assert!(parse_args(&args("import /photos --owner")).is_err());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result, bail, eyre};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::{Cache, State};
use crate::cli::commands::*;
use crate::cli::output::*;
use crate::edit::TaskEditor;
use crate::edit::move_task::MoveTarget;
use crate::events::TasksEvents;
use crate::io::config_io;
use crate::model::config::Settings;
use crate::model::task::Task;
use crate::notice::{LogNotices, StderrNotices};
use crate::vault::{FsVault, Vault};

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub async fn dispatch(cli: Cli) -> Result<()> {
    let root = vault_root(cli.vault_dir.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::List(args) => cmd_list(&root, args, json).await,
        Commands::Watch => cmd_watch(&root, json).await,
        Commands::Toggle(args) => cmd_toggle(&root, args).await,
        Commands::Move(args) => cmd_move(&root, args).await,
        Commands::Config(args) => cmd_config(&root, args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vault_root(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(dir) => std::fs::canonicalize(dir)
            .wrap_err_with(|| format!("cannot resolve -C path '{}'", dir)),
        None => std::env::current_dir().wrap_err("cannot read current directory"),
    }
}

/// An open vault with a warm index over it
struct Session {
    vault: Arc<FsVault>,
    settings: Settings,
    events: Arc<TasksEvents>,
    cache: Arc<Cache>,
}

impl Session {
    async fn open(root: &Path, watch: bool) -> Result<Session> {
        let settings = config_io::read_settings(root)?;
        let vault = FsVault::open(root)?;
        let events = Arc::new(TasksEvents::new());
        let cache = Cache::new(vault.clone(), events.clone(), Arc::new(StderrNotices), &settings);

        vault.start(watch)?;
        cache
            .watch_state()
            .wait_for(|state| *state == State::Warm)
            .await
            .map_err(|_| eyre!("index stopped before it finished loading"))?;
        debug!(
            root = %vault.root().display(),
            tasks = cache.get_tasks().len(),
            "Session::open: index warm"
        );

        Ok(Session {
            vault,
            settings,
            events,
            cache,
        })
    }

    /// Edit failures come back as errors and `main` prints them, so the
    /// editor's own notices only go to the log
    fn editor(&self) -> TaskEditor {
        TaskEditor::new(self.vault.clone(), &self.settings, Arc::new(LogNotices))
    }

    fn find_task(&self, task_ref: &str) -> Result<Task> {
        let (path, line_number) = parse_task_ref(task_ref)?;
        let tasks = self.cache.get_tasks();
        tasks
            .iter()
            .find(|t| t.path() == path && t.line_number() == line_number)
            .cloned()
            .ok_or_else(|| eyre!("no task at {}:{}", path, line_number + 1))
    }
}

/// Parse `<path>:<line>` with a 1-based line into a vault path and a
/// 0-based line number
fn parse_task_ref(task_ref: &str) -> Result<(String, usize)> {
    let Some((path, line)) = task_ref.rsplit_once(':') else {
        bail!("expected <path>:<line>, got '{}'", task_ref);
    };
    let line: usize = line
        .parse()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| eyre!("invalid line number '{}' in '{}'", line, task_ref))?;
    Ok((normalize_path(path), line - 1))
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches("./").replace('\\', "/")
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

async fn cmd_list(root: &Path, args: ListArgs, json: bool) -> Result<()> {
    let session = Session::open(root, false).await?;
    let tasks = session.cache.get_tasks();
    let selected = tasks
        .iter()
        .filter(|t| args.path.as_deref().is_none_or(|p| t.path().contains(p)));
    let groups = group_by_file(selected);

    if json {
        println!("{}", serde_json::to_string_pretty(&files_to_json(&groups))?);
    } else {
        for line in format_file_listing(&groups) {
            println!("{}", line);
        }
    }
    session.cache.unload();
    Ok(())
}

async fn cmd_watch(root: &Path, json: bool) -> Result<()> {
    let session = Session::open(root, true).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    // The first load's own notification is still pending, so it prints too
    let handler = session.events.on_cache_update(move |update| {
        let _ = tx.send((update.state, update.tasks.clone()));
    });
    info!(root = %root.display(), "cmd_watch: watching for changes");

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some((state, tasks)) = update else { break };
                if json {
                    println!("{}", serde_json::to_string(&update_to_json(state, &tasks))?);
                } else {
                    println!("{}", format_update(state, &tasks));
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.wrap_err("cannot listen for ctrl-c")?;
                break;
            }
        }
    }

    session.events.off(handler);
    session.cache.unload();
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

async fn cmd_toggle(root: &Path, args: ToggleArgs) -> Result<()> {
    let session = Session::open(root, false).await?;
    let task = session.find_task(&args.task)?;
    let toggled = task.to_file_line_with_status(task.toggled_status_character());

    session
        .editor()
        .replace_task_with_lines(&task, std::slice::from_ref(&toggled))
        .await?;
    println!("{}", toggled.trim_start());
    session.cache.unload();
    Ok(())
}

async fn cmd_move(root: &Path, args: MoveArgs) -> Result<()> {
    let session = Session::open(root, false).await?;
    let task = session.find_task(&args.task)?;
    let target = MoveTarget {
        path: normalize_path(&args.target),
        heading: args.heading,
        append_to_end: args.end,
    };
    if !session.vault.exists(&target.path) {
        bail!("target file not found: {}", target.path);
    }

    session.editor().move_task_to_section(&task, &target).await?;
    match &target.heading {
        Some(heading) => println!("moved to {} under '{}'", target.path, heading),
        None => println!("moved to {}", target.path),
    }
    session.cache.unload();
    Ok(())
}

fn cmd_config(root: &Path, args: ConfigArgs) -> Result<()> {
    config_io::set_setting(root, &args.key, &args.value)?;
    println!("{} = {}", args.key, args.value);
    Ok(())
}

mod config;

use std::sync::Arc;

use anyhow::Context;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use quadrant_api::ListId;
use quadrant_api::TaskId;
use quadrant_api::TasksBackend;
use quadrant_api::title::Quadrant;
use quadrant_client::DEFAULT_BASE_URL;
use quadrant_client::HttpClient;
use quadrant_client::MockClient;
use quadrant_core::FetchOutcome;
use quadrant_core::NewTask;
use quadrant_core::RefreshSession;
use quadrant_core::Task;
use quadrant_core::TaskPatch;
use quadrant_core::TaskStore;
use quadrant_login::GoogleTokenProvider;
use quadrant_login::ProviderConfig;
use quadrant_login::SessionManager;
use quadrant_login::SessionPhase;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quadrant", about = "Google Tasks as an Eisenhower priority matrix")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with Google (opens a browser).
    Login,
    /// Revoke the token and clear the persisted session.
    Logout,
    /// Show session phase, user, and token expiry.
    Status,
    /// Fetch everything and print the four quadrants.
    Matrix {
        /// Also show completed tasks in the given quadrant (repeatable).
        #[arg(long = "completed", value_name = "QUADRANT")]
        completed: Vec<Quadrant>,
    },
    /// Create a task.
    Add {
        title: String,
        #[arg(long, default_value = "do")]
        quadrant: Quadrant,
        /// Delegate email; only meaningful with --quadrant delegate.
        #[arg(long = "to")]
        delegate: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Due date, YYYY-MM-DD or RFC 3339.
        #[arg(long)]
        due: Option<String>,
        /// Target category (list title or id); the primary list if absent.
        #[arg(long)]
        category: Option<String>,
    },
    /// Toggle a task between open and completed.
    Done { task_id: String },
    /// Reclassify a task into another quadrant.
    Mv {
        task_id: String,
        quadrant: Quadrant,
        /// New delegate email.
        #[arg(long = "to")]
        delegate: Option<String>,
        /// New due date, YYYY-MM-DD or RFC 3339.
        #[arg(long)]
        due: Option<String>,
    },
    /// Delete a task.
    Rm { task_id: String },
    /// Show or manage categories (task lists).
    Lists {
        #[command(subcommand)]
        action: Option<ListsCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum ListsCommand {
    /// Create a category.
    New { name: String },
    /// Rename a category.
    Rename { list_id: String, name: String },
    /// Delete a category and everything in it.
    Rm { list_id: String },
}

/// Mock mode has no session to refresh.
struct NoRefresh;

#[async_trait::async_trait]
impl RefreshSession for NoRefresh {
    async fn refresh_session(&self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    run(cli.command).await
}

async fn run(command: Command) -> anyhow::Result<()> {
    let home = config::find_quadrant_home()?;
    let cfg = config::load_config(&home)?;
    let mock = std::env::var("QUADRANT_MODE").is_ok_and(|m| m.eq_ignore_ascii_case("mock"));

    let session = if mock {
        None
    } else {
        let client_id = cfg
            .client_id
            .clone()
            .with_context(|| format!("missing client_id in {}/config.toml", home.display()))?;
        let client_secret = cfg
            .client_secret
            .clone()
            .with_context(|| format!("missing client_secret in {}/config.toml", home.display()))?;
        let provider =
            GoogleTokenProvider::new(home.clone(), ProviderConfig::google(client_id, client_secret))?;
        let manager = SessionManager::new(home.clone(), Arc::new(provider));
        manager.init().await;
        Some(manager)
    };

    let backend: Arc<dyn TasksBackend> = if mock {
        Arc::new(MockClient::seeded())
    } else {
        let base_url = std::env::var("QUADRANT_TASKS_BASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or(cfg.tasks_base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut client = HttpClient::new(base_url)?.with_user_agent("quadrant-cli");
        if let Some(session) = &session {
            client = client.with_token_source(Arc::new(session.clone()));
        }
        Arc::new(client)
    };
    let refresher: Arc<dyn RefreshSession> = match &session {
        Some(session) => Arc::new(session.clone()),
        None => Arc::new(NoRefresh),
    };
    let store = TaskStore::new(backend, refresher);

    let result = dispatch(command, &store, session.as_ref()).await;
    if let Some(session) = &session {
        session.dispose();
    }
    result
}

async fn dispatch(
    command: Command,
    store: &TaskStore,
    session: Option<&SessionManager>,
) -> anyhow::Result<()> {
    match command {
        Command::Login => {
            let session = require_session(session)?;
            session.login().await?;
            match session.current_user() {
                Some(user) => println!("Signed in as {} <{}>.", user.name, user.email),
                None => println!("Signed in."),
            }
        }
        Command::Logout => {
            let session = require_session(session)?;
            session.logout().await;
            println!("Signed out.");
        }
        Command::Status => print_status(session),
        Command::Matrix { completed } => {
            require_signed_in(session)?;
            for quadrant in completed {
                store.set_show_completed(quadrant, true);
            }
            fetch_with_retry(store).await?;
            print_matrix(store);
        }
        Command::Add {
            title,
            quadrant,
            delegate,
            notes,
            due,
            category,
        } => {
            require_signed_in(session)?;
            fetch_with_retry(store).await?;
            let category = match category {
                Some(name) => Some(resolve_category(store, &name)?),
                None => None,
            };
            let due = due.as_deref().map(parse_due).transpose()?;
            let task = store
                .create(NewTask {
                    title,
                    quadrant,
                    delegated_to: delegate,
                    notes,
                    due,
                    status: None,
                    category,
                })
                .await?;
            println!("Created {} in {}:", task.id, task.list_title);
            println!("{}", format_task(&task));
        }
        Command::Done { task_id } => {
            require_signed_in(session)?;
            fetch_with_retry(store).await?;
            let task = store.toggle_complete(&TaskId(task_id)).await?;
            let state = if task.is_completed() { "completed" } else { "open" };
            println!("{} is now {state}.", task.id);
        }
        Command::Mv {
            task_id,
            quadrant,
            delegate,
            due,
        } => {
            require_signed_in(session)?;
            fetch_with_retry(store).await?;
            let extra = TaskPatch {
                delegated_to: delegate.map(Some),
                due: due.as_deref().map(parse_due).transpose()?.map(Some),
                ..TaskPatch::default()
            };
            let task = store
                .move_to_quadrant(&TaskId(task_id), quadrant, extra)
                .await?;
            println!("{} moved to {}.", task.id, task.quadrant);
        }
        Command::Rm { task_id } => {
            require_signed_in(session)?;
            fetch_with_retry(store).await?;
            store.delete(TaskId(task_id.clone())).await?;
            println!("Deleted {task_id}.");
        }
        Command::Lists { action } => {
            require_signed_in(session)?;
            match action {
                None => {
                    fetch_with_retry(store).await?;
                    let primary = store.primary_list();
                    for list in store.task_lists() {
                        let marker = if primary.as_ref().is_some_and(|p| p.id == list.id) {
                            "*"
                        } else {
                            " "
                        };
                        println!("{marker} {}  {}", list.id, list.title);
                    }
                }
                Some(ListsCommand::New { name }) => {
                    let list = store.create_category(&name).await?;
                    println!("Created list {}  {}", list.id, list.title);
                }
                Some(ListsCommand::Rename { list_id, name }) => {
                    let list = store.rename_category(&ListId(list_id), &name).await?;
                    println!("Renamed {} to {}.", list.id, list.title);
                }
                Some(ListsCommand::Rm { list_id }) => {
                    store.delete_category(&ListId(list_id.clone())).await?;
                    println!("Deleted list {list_id}.");
                }
            }
        }
    }
    Ok(())
}

fn require_session<'a>(session: Option<&'a SessionManager>) -> anyhow::Result<&'a SessionManager> {
    session.context("not available in mock mode (QUADRANT_MODE=mock)")
}

/// Commands that hit the real API need a signed-in session; in mock mode
/// there is nothing to check.
fn require_signed_in(session: Option<&SessionManager>) -> anyhow::Result<()> {
    if let Some(session) = session
        && !session.is_authenticated()
    {
        match session.session_error() {
            Some(err) => anyhow::bail!("not signed in ({err}); run `quadrant login`"),
            None => anyhow::bail!("not signed in; run `quadrant login`"),
        }
    }
    Ok(())
}

/// Fetch, and on an authentication failure retry once after the refresh the
/// store already triggered.
async fn fetch_with_retry(store: &TaskStore) -> anyhow::Result<()> {
    if store.fetch_all().await? == FetchOutcome::Loaded {
        return Ok(());
    }
    tracing::info!("retrying fetch after token refresh");
    match store.fetch_all().await? {
        FetchOutcome::Loaded => Ok(()),
        FetchOutcome::AuthRequired => {
            anyhow::bail!("authentication failed twice; run `quadrant login`")
        }
    }
}

fn print_status(session: Option<&SessionManager>) {
    let Some(session) = session else {
        println!("mock mode (QUADRANT_MODE=mock); no session");
        return;
    };
    let phase = match session.phase() {
        SessionPhase::Unauthenticated => "unauthenticated",
        SessionPhase::Authenticating(_) => "authenticating",
        SessionPhase::Authenticated => "authenticated",
        SessionPhase::Expiring => "authenticated (renewal in flight)",
    };
    println!("session: {phase}");
    if let Some(user) = session.current_user() {
        println!("user: {} <{}>", user.name, user.email);
    }
    if let Some(expiry) = session.expires_at() {
        println!("token expires: {expiry}");
    }
    if let Some(err) = session.session_error() {
        println!("last error: {err}");
    }
}

fn print_matrix(store: &TaskStore) {
    for quadrant in Quadrant::ALL {
        let tasks = store.tasks_by_quadrant(quadrant);
        println!("[{}] {} task(s)", quadrant.tag(), tasks.len());
        for task in &tasks {
            println!("{}", format_task(task));
        }
        println!();
    }
}

fn format_task(task: &Task) -> String {
    let check = if task.is_completed() { "x" } else { " " };
    let mut line = format!("  [{check}] {}  {}", task.id, task.clean_title);
    if let Some(due) = task.due {
        line.push_str(&format!("  due {}", due.format("%Y-%m-%d")));
    }
    if let Some(who) = &task.delegated_to {
        line.push_str(&format!("  -> {who}"));
    }
    line.push_str(&format!("  ({})", task.list_title));
    line
}

/// Accepts a category by list title or by list id.
fn resolve_category(store: &TaskStore, name: &str) -> anyhow::Result<ListId> {
    store
        .task_lists()
        .iter()
        .find(|l| l.title == name || l.id.0 == name)
        .map(|l| l.id.clone())
        .with_context(|| {
            let known: Vec<String> = store.task_lists().iter().map(|l| l.title.clone()).collect();
            format!("unknown category `{name}` (known: {})", known.join(", "))
        })
}

fn parse_due(input: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("invalid due date `{input}` (expected YYYY-MM-DD or RFC 3339)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("invalid due date `{input}`"))?;
    Ok(midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn due_dates_parse_as_plain_dates_or_rfc3339() -> anyhow::Result<()> {
        let midnight = parse_due("2026-03-01")?;
        assert_eq!(midnight.to_rfc3339(), "2026-03-01T00:00:00+00:00");

        let exact = parse_due("2026-03-01T12:30:00+02:00")?;
        assert_eq!(exact.to_rfc3339(), "2026-03-01T10:30:00+00:00");

        assert!(parse_due("tomorrow").is_err());
        assert!(parse_due("2026-13-40").is_err());
        Ok(())
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::broadcast;

use promptrepo::config::Config;
use promptrepo::entity::RepoEntity;
use promptrepo::logging;
use promptrepo::store::{CacheSource, Notice, NoticeLevel, ResetOutcome};
use promptrepo::types::Prompt;
use promptrepo::Workspace;

#[derive(Parser, Debug)]
#[command(name = "promptrepo")]
#[command(about = "Browse and sync PromptRepo prompts from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/promptrepo/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Work with prompts
  #[command(subcommand)]
  Prompts(PromptCommand),
  /// Work with eval suites
  #[command(subcommand)]
  Evals(EvalCommand),
  /// Work with configured repositories
  #[command(subcommand)]
  Repos(RepoCommand),
  /// Drop all cached prompts and evals and rediscover them
  ClearCache,
  /// Show the signed-in user
  Whoami,
  /// Sign out and drop cached data
  Logout,
}

#[derive(Subcommand, Debug)]
enum PromptCommand {
  /// List cached prompts, discovering them if the cache is stale
  List {
    /// Rediscover even if the cache is fresh
    #[arg(long)]
    refresh: bool,
    /// Only show prompts from this repository
    #[arg(long)]
    repo: Option<String>,
  },
  /// Fetch and print one prompt
  Show { repo: String, path: String },
  /// Create a prompt; its path is derived from the name unless given
  New {
    repo: String,
    name: String,
    #[arg(long)]
    path: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// File whose contents become the prompt template
    #[arg(long)]
    content: Option<PathBuf>,
  },
  /// Delete a prompt
  Delete { repo: String, path: String },
}

#[derive(Subcommand, Debug)]
enum EvalCommand {
  /// List cached eval suites
  List {
    #[arg(long)]
    refresh: bool,
  },
  /// Fetch and print one eval suite
  Show { repo: String, path: String },
}

#[derive(Subcommand, Debug)]
enum RepoCommand {
  /// List configured repositories
  List,
  /// Reset a repository to its base branch and resync the caches
  Reset {
    repo: String,
    /// Prompt that is open and should be reloaded afterwards
    #[arg(long)]
    open: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.cache.storage_dir()?)?;

  let workspace = Workspace::from_config(&config)?;
  let mut notices = workspace.notices();

  let result = run(&workspace, args.command).await;
  print_notices(&mut notices);
  result
}

async fn run(workspace: &Workspace, command: Command) -> Result<()> {
  match command {
    Command::Prompts(cmd) => run_prompts(workspace, cmd).await,
    Command::Evals(cmd) => run_evals(workspace, cmd).await,
    Command::Repos(cmd) => run_repos(workspace, cmd).await,
    Command::ClearCache => {
      start(workspace).await;
      workspace.clear_caches().await?;
      println!(
        "Rediscovered {} prompts and {} evals",
        workspace.prompts.entries().len(),
        workspace.evals.entries().len()
      );
      Ok(())
    }
    Command::Whoami => {
      start(workspace).await;
      match workspace.auth.user() {
        Some(user) => {
          println!("{}", user.username);
          if let Some(name) = user.name {
            println!("name:  {}", name);
          }
          if let Some(email) = user.email {
            println!("email: {}", email);
          }
          Ok(())
        }
        None => Err(eyre!("Not signed in")),
      }
    }
    Command::Logout => {
      workspace.hydrate().await;
      workspace.logout().await?;
      println!("Signed out");
      Ok(())
    }
  }
}

/// Bootstrap the workspace. Failures are already reported as notices and the
/// hydrated data stays usable.
async fn start(workspace: &Workspace) {
  if let Err(e) = workspace.bootstrap().await {
    tracing::warn!(error = %e, "bootstrap incomplete");
  }
}

async fn run_prompts(workspace: &Workspace, cmd: PromptCommand) -> Result<()> {
  start(workspace).await;
  let prompts = &workspace.prompts;

  match cmd {
    PromptCommand::List { refresh, repo } => {
      if refresh {
        prompts.discover_all().await?;
      }
      let mut rows: Vec<Prompt> = prompts
        .entries()
        .into_iter()
        .filter(|p| repo.as_deref().map_or(true, |r| p.repo_name == r))
        .collect();
      rows.sort_by(|a, b| a.cache_key().cmp(&b.cache_key()));

      for p in &rows {
        println!("{:<40} {:<30} {}", p.cache_key(), p.name, p.description);
      }
      println!("{} prompts", rows.len());
      Ok(())
    }
    PromptCommand::Show { repo, path } => {
      let prompt = prompts.fetch_by_id(&repo, &path).await?;
      println!("{}", serde_yaml::to_string(&prompt)?);
      Ok(())
    }
    PromptCommand::New {
      repo,
      name,
      path,
      description,
      content,
    } => {
      let mut draft = Prompt::draft(&repo, &name);
      draft.description = description.unwrap_or_default();
      if let Some(file) = content {
        draft.content = Some(
          std::fs::read_to_string(&file)
            .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?,
        );
      }
      let saved = prompts
        .save(&repo, path.as_deref().unwrap_or_default(), draft)
        .await?;
      println!("Saved {}", saved.cache_key());
      Ok(())
    }
    PromptCommand::Delete { repo, path } => {
      prompts.delete(&repo, &path).await?;
      println!("Deleted {}:{}", repo, path);
      Ok(())
    }
  }
}

async fn run_evals(workspace: &Workspace, cmd: EvalCommand) -> Result<()> {
  start(workspace).await;
  let evals = &workspace.evals;

  match cmd {
    EvalCommand::List { refresh } => {
      if refresh {
        evals.discover_all().await?;
      }
      for eval in evals.entries() {
        println!(
          "{:<40} {:<30} {} tests",
          eval.cache_key(),
          eval.name,
          eval.tests.len()
        );
      }
      Ok(())
    }
    EvalCommand::Show { repo, path } => {
      let eval = evals.fetch_by_id(&repo, &path).await?;
      println!("{}", serde_yaml::to_string(&eval)?);
      Ok(())
    }
  }
}

async fn run_repos(workspace: &Workspace, cmd: RepoCommand) -> Result<()> {
  match cmd {
    RepoCommand::List => {
      workspace.hydrate().await;
      let source = workspace.config.initialize().await?;
      for repo in workspace.config.repo_configs() {
        println!(
          "{:<40} base: {:<15} current: {}",
          repo.repo_name, repo.base_branch, repo.current_branch
        );
      }
      if source == CacheSource::CacheFresh {
        println!("(cached)");
      }
      Ok(())
    }
    RepoCommand::Reset { repo, open } => {
      start(workspace).await;
      if let Some(path) = open {
        workspace.prompts.fetch_by_id(&repo, &path).await?;
      }

      match workspace.prompts.get_latest_from_base_branch(&repo).await? {
        ResetOutcome::Unaffected => {}
        ResetOutcome::Refreshed(prompt) => println!("Reloaded {}", prompt.cache_key()),
        ResetOutcome::NavigateToList => {
          println!("Open prompt no longer exists upstream; showing the list");
          for p in workspace.prompts.entries() {
            println!("  {}", p.cache_key());
          }
        }
      }

      if let Err(e) = workspace.evals.invalidate().await {
        tracing::warn!(error = %e, "eval resync after reset failed");
      }
      Ok(())
    }
  }
}

fn print_notices(notices: &mut broadcast::Receiver<Notice>) {
  while let Ok(notice) = notices.try_recv() {
    match notice.level {
      NoticeLevel::Success => eprintln!("✓ {}", notice.message),
      NoticeLevel::Error => eprintln!("✗ {}", notice.message),
    }
  }
}

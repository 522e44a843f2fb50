mod commands;

use civic_navigator::api::types::{ArticleStatus, IncidentStatus, Priority, Role};
use civic_navigator::store::{SqliteStore, Storage};
use civic_navigator::{logging, CivicClient, Config};
use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "civic")]
#[command(about = "Command-line client for CivicNavigator civic services")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/civic-navigator/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log debug output to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Print results as JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Sign in and store the session
  Login {
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
  },
  /// Create an account
  Register {
    #[arg(short, long)]
    name: String,
    #[arg(short, long)]
    email: String,
    #[arg(short, long)]
    password: String,
    #[arg(long, default_value = "resident")]
    role: Role,
  },
  /// Sign out and forget the stored session
  Logout,
  /// Show the stored session without contacting the backend
  Whoami,
  /// Request a password reset email
  ResetPassword { email: String },
  /// Check every backend health endpoint
  Health,
  /// Show endpoints and session state
  Info,
  /// Report and track incidents
  #[command(subcommand)]
  Incident(IncidentCommand),
  /// Ask the assistant a question
  Chat {
    message: String,
    /// Continue an existing conversation
    #[arg(short, long)]
    session: Option<String>,
  },
  /// List past conversations
  Sessions,
  /// Browse the knowledge base
  #[command(subcommand)]
  Kb(KbCommand),
  /// Manage users (staff)
  #[command(subcommand)]
  Users(UsersCommand),
  /// Download CSV exports (admin)
  #[command(subcommand)]
  Export(ExportCommand),
  /// Dashboard statistics (staff)
  Stats,
  /// Inspect and replay requests captured while offline
  #[command(subcommand)]
  Queue(QueueCommand),
  /// Drop cached responses
  #[command(subcommand)]
  Cache(CacheCommand),
  /// Forget the session and every cached response
  ClearLocalData,
  /// Probe the backend periodically and replay queued requests on reconnect
  Watch {
    /// Seconds between probes (default from config)
    #[arg(short, long)]
    interval: Option<u64>,
  },
}

#[derive(Subcommand, Debug)]
pub enum IncidentCommand {
  /// Submit a new report (queued when offline)
  Report(ReportArgs),
  /// List incidents
  List {
    #[arg(long)]
    status: Option<IncidentStatus>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    category: Option<String>,
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
  },
  /// Show one incident by id or INC- reference
  Show { id: String },
  /// Public status lookup by reference
  Status { reference: String },
  /// Change an incident's status (staff)
  Update {
    id: String,
    status: IncidentStatus,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    assign: Option<String>,
  },
  /// Comment on an incident
  Comment { id: String, text: String },
}

#[derive(ClapArgs, Debug)]
pub struct ReportArgs {
  #[arg(short, long)]
  pub title: String,
  #[arg(short, long)]
  pub description: String,
  #[arg(short, long)]
  pub category: String,
  #[arg(short, long)]
  pub location: String,
  #[arg(short, long)]
  pub priority: Option<Priority>,
  /// Contact email (default: the signed-in user's)
  #[arg(short, long)]
  pub email: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum KbCommand {
  /// List articles (staff)
  List {
    #[arg(long)]
    status: Option<ArticleStatus>,
    #[arg(long)]
    category: Option<String>,
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long)]
    page: Option<u32>,
  },
  /// Search the public knowledge base
  Search {
    query: String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long, default_value_t = 10)]
    limit: u32,
  },
  /// Most viewed articles
  Popular {
    #[arg(long, default_value_t = 5)]
    limit: u32,
  },
  /// Rebuild the search index (admin)
  Reindex,
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
  List {
    #[arg(short, long)]
    search: Option<String>,
    #[arg(long)]
    role: Option<Role>,
    #[arg(long)]
    page: Option<u32>,
  },
  Show {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
  Users {
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
  },
  Analytics {
    /// Export type, e.g. chat or incidents
    kind: String,
    #[arg(short, long, default_value = "30d")]
    timeframe: String,
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
  },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
  /// List pending and dead-lettered requests
  Status,
  /// Replay pending requests now
  Drain,
  /// Drop every pending request
  Clear,
  /// Drop dead-lettered requests
  ClearDead,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(config.log_dir().as_deref(), args.verbose)?;

  let storage: Arc<dyn Storage> = match &config.storage.path {
    Some(path) => Arc::new(SqliteStore::open(path)?),
    None => Arc::new(SqliteStore::open_default()?),
  };

  let client = Arc::new(CivicClient::new(
    &config,
    storage,
    Arc::new(commands::CliRedirect),
  )?);

  let output = commands::Output { json: args.json };
  commands::run(&client, &config, args.command, output).await
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use bugjournal::auth::Role;
use bugjournal::commands::{self, bugs::AddArgs, App};
use bugjournal::{Severity, SeverityFilter};

#[derive(Parser)]
#[command(name = "bugjournal")]
#[command(about = "Record, filter and review bug reports")]
#[command(version)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Only print errors and command output
  #[arg(long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create an account and sign in
  Signup {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    /// Account password (or use BUGJOURNAL_PASSWORD env var)
    #[arg(long, env = "BUGJOURNAL_PASSWORD", hide_env_values = true)]
    password: String,
    /// Developer, QA, Student or Product Manager
    #[arg(long, default_value = "Developer")]
    role: Role,
  },
  /// Sign in with email and password
  Login {
    #[arg(long)]
    email: String,
    /// Account password (or use BUGJOURNAL_PASSWORD env var)
    #[arg(long, env = "BUGJOURNAL_PASSWORD", hide_env_values = true)]
    password: String,
  },
  /// Sign out and forget the saved session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Report a new bug
  Add {
    #[arg(long)]
    title: String,
    /// Project the bug was found in
    #[arg(long = "app")]
    app_name: Option<String>,
    /// One-line summary
    #[arg(long, default_value = "")]
    bug: String,
    /// Low, Medium or High
    #[arg(short, long)]
    severity: Option<Severity>,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(short, long, default_value = "")]
    environment: String,
    /// Steps to reproduce
    #[arg(long, default_value = "")]
    steps: String,
    #[arg(short, long, default_value = "")]
    resolution: String,
    /// Comma-separated tags
    #[arg(short, long)]
    tags: Option<String>,
  },
  /// List reported bugs
  List {
    /// All, Low, Medium or High
    #[arg(short, long, default_value = "All")]
    severity: SeverityFilter,
    /// Match against tags and titles
    #[arg(short, long)]
    query: Option<String>,
  },
  /// Show one bug in full
  Show { id: String },
  /// Delete a bug
  Delete { id: String },
  /// Get an AI suggestion for a bug
  Suggest {
    id: String,
    /// Save the suggestion onto the bug
    #[arg(long)]
    save: bool,
    /// Ask again even if a suggestion is already saved
    #[arg(long)]
    refresh: bool,
  },
  /// Follow the list live
  Watch {
    #[arg(short, long, default_value = "All")]
    severity: SeverityFilter,
    #[arg(short, long)]
    query: Option<String>,
  },
}

#[tokio::main]
async fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("bugjournal=debug,warn")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bugjournal=info,warn"))
  };
  tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
  bentley::set_quiet(cli.quiet);

  if let Err(error) = run(cli.command).await {
    bentley::error!(&format!("{error:#}"));
    std::process::exit(1);
  }
}

async fn run(command: Commands) -> Result<()> {
  let app = App::load()?;

  match command {
    Commands::Signup { name, email, password, role } => {
      commands::account::signup(&app, name, email, password, role).await
    }
    Commands::Login { email, password } => commands::account::login(&app, email, password).await,
    Commands::Logout => commands::account::logout(&app).await,
    Commands::Whoami => commands::account::whoami(&app).await,
    Commands::Add { title, app_name, bug, severity, description, environment, steps, resolution, tags } => {
      let args = AddArgs { title, app_name, bug, severity, description, environment, steps, resolution, tags };
      commands::bugs::add(&app, args).await
    }
    Commands::List { severity, query } => commands::bugs::list(&app, severity, query).await,
    Commands::Show { id } => commands::bugs::show(&app, id).await,
    Commands::Delete { id } => commands::bugs::delete(&app, id).await,
    Commands::Suggest { id, save, refresh } => commands::suggest::handle(&app, id, save, refresh).await,
    Commands::Watch { severity, query } => commands::watch::handle(&app, severity, query).await,
  }
}

//! Privacy Shield CLI
//!
//! Runs the hiding engine over saved HTML pages and manages a store file with
//! the same layout as the extension's local storage.

mod commands;
mod file_store;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ps_rules::RuleKind;

#[derive(Parser)]
#[command(name = "ps-cli")]
#[command(about = "Privacy Shield rule engine and store tools")]
struct Cli {
    /// Store file, in the extension's storage layout
    #[arg(long, global = true, default_value = "privacy-shield-store.json")]
    store: PathBuf,

    /// Bundled rule file consulted after the stored domain rules
    #[arg(long, global = true)]
    rules_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed an empty store
    Init,

    /// Hide sensitive elements in an HTML file and report what was hidden
    Scan {
        /// HTML file to scan
        #[arg(long)]
        html: PathBuf,

        /// Hostname the page was served from
        #[arg(long)]
        host: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which rule set applies to a hostname
    Resolve {
        #[arg(long)]
        host: String,
    },

    /// Try a regular expression against some text
    TestPattern { pattern: String, text: String },

    /// Edit user rules and domain rule sets
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Pause protection everywhere
    Pause,

    /// Resume protection
    Resume,

    /// Write a settings export file
    Export {
        /// Output file; defaults to the dated export filename
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply a settings export file
    Import { input: PathBuf },

    /// Check a rule file for problems
    ValidateRules { input: PathBuf },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List user rules and domain rule sets
    List,

    /// Add a keyword or pattern
    Add { kind: KindArg, value: String },

    /// Remove rules by index
    Remove {
        kind: KindArg,
        #[arg(required = true)]
        indices: Vec<usize>,
    },

    /// Flip a rule between enabled and disabled
    Toggle { kind: KindArg, index: usize },

    /// Move a rule to a new position
    Move { kind: KindArg, from: usize, to: usize },

    /// Enable or disable a domain rule set
    Domain {
        key: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Restore defaults
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Keyword,
    Pattern,
}

impl From<KindArg> for RuleKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Keyword => RuleKind::Keyword,
            KindArg::Pattern => RuleKind::Pattern,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let ctx = commands::Context::new(cli.store, cli.rules_file);

    let result = match cli.command {
        Commands::Init => commands::init(&ctx).await,
        Commands::Scan { html, host, json } => commands::scan(&ctx, &html, &host, json).await,
        Commands::Resolve { host } => commands::resolve(&ctx, &host).await,
        Commands::TestPattern { pattern, text } => commands::test_pattern(&pattern, &text),
        Commands::Rules { action } => match action {
            RulesAction::List => commands::list_rules(&ctx).await,
            RulesAction::Add { kind, value } => commands::add_rule(&ctx, kind.into(), &value).await,
            RulesAction::Remove { kind, indices } => commands::remove_rules(&ctx, kind.into(), &indices).await,
            RulesAction::Toggle { kind, index } => commands::toggle_rule(&ctx, kind.into(), index).await,
            RulesAction::Move { kind, from, to } => commands::move_rule(&ctx, kind.into(), from, to).await,
            RulesAction::Domain { key, enabled } => commands::set_domain(&ctx, &key, enabled).await,
            RulesAction::Reset => commands::reset(&ctx).await,
        },
        Commands::Pause => commands::set_paused(&ctx, true).await,
        Commands::Resume => commands::set_paused(&ctx, false).await,
        Commands::Export { output } => commands::export(&ctx, output).await,
        Commands::Import { input } => commands::import(&ctx, &input).await,
        Commands::ValidateRules { input } => commands::validate_rules(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

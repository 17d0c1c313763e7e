use clap::{Args, Parser, Subcommand};
use xcrit_core::{Language, Medium};

mod commands;
mod util;

#[derive(Parser)]
#[command(name = "xcrit", version, about = "X-Critical CLI: two-stage media critiques and the ABBF scoring engine")]
struct Cli {
    /// Override the provider model (otherwise XCRIT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// The work being reviewed.
#[derive(Args, Clone)]
pub struct TitleArgs {
    /// Title of the work
    #[arg(long)]
    pub title: String,

    /// Medium: VN, Novel, Manga or Anime
    #[arg(long)]
    pub medium: Medium,

    /// Output language for free-text fields: zh, en or ja
    #[arg(long, default_value = "zh")]
    pub lang: Language,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local stage (and optionally the hybrid stage) and print the result
    Analyze(commands::analyze::AnalyzeArgs),
    /// Look up production trivia for a title
    Trivia {
        #[command(flatten)]
        target: TitleArgs,
    },
    /// Evaluate the IN/OUT threshold rules for a literal score vector
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Run the ABBF engine on literal inputs
    Reconcile {
        /// JSON file with {local, online, consensus_reliability, ...} (use '-' for stdin)
        #[arg(long)]
        request_file: String,
    },
    /// Print the hybrid-stage prompt for a stored local result
    Prompt {
        #[command(flatten)]
        target: TitleArgs,
        /// Local-stage result JSON (use '-' for stdin)
        #[arg(long)]
        local_file: String,
    },
    /// Print the review policy document
    Policy {
        /// Print the weight table as JSON instead of the document
        #[arg(long)]
        weights: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xcrit_cli=info,xcrit_runtime=warn".into()),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = util::load_config();
    if let Some(model) = cli.model {
        config.gemini.model = model;
    }

    let code = match cli.command {
        Commands::Analyze(args) => commands::analyze::run(&config, args).await,
        Commands::Trivia { target } => commands::trivia::run(&config, target).await,
        Commands::Evaluate(args) => commands::evaluate::run(args),
        Commands::Reconcile { request_file } => commands::reconcile::run(&config, &request_file),
        Commands::Prompt { target, local_file } => commands::prompt::run(target, &local_file),
        Commands::Policy { weights } => commands::policy::run(&config, weights),
    };

    std::process::exit(code);
}

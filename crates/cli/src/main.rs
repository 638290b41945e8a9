use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dataset::{Dataset, DatasetProvider};
use serde::Serialize;
use state::FileStore;
use std::path::PathBuf;
use std::sync::Arc;
use votematch_matcher::{Matcher, MatcherConfig};

mod dataset;
mod report;
mod state;

#[derive(Parser)]
#[command(name = "votematch")]
#[command(about = "Match a voter's answers against election candidates", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON dataset with constituencies, questions, parties and candidates
    #[arg(long, global = true, default_value = "dataset.json")]
    data: PathBuf,

    /// Where answers and the selected municipality are kept between runs
    #[arg(long, global = true, default_value = ".votematch/state.json")]
    state: PathBuf,

    /// Matcher settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List municipalities sorted by name
    Municipalities,

    /// Select a municipality and load its constituency
    Select(SelectArgs),

    /// List the questions of the selected constituency
    Questions,

    /// Answer a question
    Answer(AnswerArgs),

    /// Remove the answer to a question
    Unanswer(UnanswerArgs),

    /// Rank candidates against the stored answers
    Match(MatchArgs),

    /// Forget answers, favourites and the selected municipality
    Reset,
}

#[derive(Args)]
struct SelectArgs {
    /// Municipality id
    municipality: String,
}

#[derive(Args)]
struct AnswerArgs {
    /// Question id
    question: String,

    /// Scale key for numeric questions, comma-separated option keys for
    /// preference-order questions
    value: String,
}

#[derive(Args)]
struct UnanswerArgs {
    /// Question id
    question: String,
}

#[derive(Args)]
struct MatchArgs {
    /// Show only the best N candidates
    #[arg(long)]
    top: Option<usize>,

    /// Only candidates of this party
    #[arg(long, conflicts_with = "exclude_party")]
    party: Option<String>,

    /// Leave out candidates of this party
    #[arg(long)]
    exclude_party: Option<String>,

    /// Map every candidate around the centre, ignoring the voter
    #[arg(long)]
    without_voter: bool,
}

#[derive(Serialize)]
struct AnswerOutput<'a> {
    question: &'a str,
    answer: Option<String>,
    answered: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut matcher = open_matcher(&cli).await?;

    match cli.command {
        Commands::Municipalities => print_json(&report::municipalities(&matcher)?)?,
        Commands::Select(args) => run_select(&mut matcher, &args).await?,
        Commands::Questions => {
            ensure_selected(&matcher)?;
            print_json(&report::questions(&matcher))?;
        }
        Commands::Answer(args) => run_answer(&mut matcher, &args)?,
        Commands::Unanswer(args) => run_unanswer(&mut matcher, &args)?,
        Commands::Match(args) => run_match(&mut matcher, &args).await?,
        Commands::Reset => {
            matcher.unset_voter_answers()?;
            print_json(&matcher.state())?;
        }
    }

    Ok(())
}

async fn open_matcher(cli: &Cli) -> Result<Matcher> {
    let config = match &cli.config {
        Some(path) => MatcherConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MatcherConfig::default(),
    };
    let dataset = Dataset::load(&cli.data)?;
    let store = FileStore::open(&cli.state)?;

    let mut matcher = Matcher::new(
        config,
        Arc::new(DatasetProvider::new(dataset)),
        Box::new(store),
    );
    matcher
        .init()
        .await
        .context("Failed to restore the previous session")?;
    Ok(matcher)
}

fn ensure_selected(matcher: &Matcher) -> Result<()> {
    if matcher.constituency_id().is_none() {
        bail!("No municipality selected; run `votematch select <municipality>` first");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_select(matcher: &mut Matcher, args: &SelectArgs) -> Result<()> {
    matcher
        .set_municipality(&args.municipality)
        .await
        .with_context(|| format!("Cannot select municipality '{}'", args.municipality))?;
    print_json(&matcher.state())
}

fn run_answer(matcher: &mut Matcher, args: &AnswerArgs) -> Result<()> {
    ensure_selected(matcher)?;
    let answer = matcher
        .question(&args.question)?
        .parse_answer(&args.value)
        .with_context(|| format!("Cannot read '{}' as an answer", args.value))?;
    matcher.set_voter_answer(&args.question, answer)?;
    print_json(&AnswerOutput {
        question: &args.question,
        answer: matcher
            .question(&args.question)?
            .voter_answer()
            .map(ToString::to_string),
        answered: matcher.count_voter_answers(),
    })
}

fn run_unanswer(matcher: &mut Matcher, args: &UnanswerArgs) -> Result<()> {
    ensure_selected(matcher)?;
    matcher.delete_voter_answer(&args.question)?;
    print_json(&AnswerOutput {
        question: &args.question,
        answer: None,
        answered: matcher.count_voter_answers(),
    })
}

async fn run_match(matcher: &mut Matcher, args: &MatchArgs) -> Result<()> {
    ensure_selected(matcher)?;
    if !matcher.has_enough_answers_for_mapping() {
        bail!(
            "At least {} answers are needed for matching ({} given)",
            matcher.config().min_vals_for_mapping,
            matcher.count_voter_answers()
        );
    }
    matcher.set_voter_disabled(args.without_voter)?;

    if let Some(party) = &args.party {
        matcher.party(party)?;
        matcher.set_party_filter(Some(party), false)?;
    } else if let Some(party) = &args.exclude_party {
        matcher.party(party)?;
        matcher.set_party_filter(Some(party), true)?;
    }

    let result = matcher.init_mapping(None).await?;
    print_json(&report::match_report(matcher, result.method, args.top)?)
}

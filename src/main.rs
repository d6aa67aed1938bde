use anyhow::{bail, Result};
use clap::Parser;
use hiitsurvey::{BackendClient, HiitConfig, HiitOrchestrator, SessionSummary};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hiitsurvey")]
#[command(about = "Answer survey questions by doing exercise reps in front of a webcam")]
#[command(version)]
#[command(long_about = "Runs a survey where each multiple-choice option is tied to an exercise. \
The webcam feed is sent to a pose-detection backend; doing reps of an option's exercise selects \
that option, and finishing the required reps moves on to the next question. Answers are submitted \
to the backend when the survey is complete.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hiitsurvey.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Survey to run
    #[arg(short, long, value_name = "ID", help = "ID of the survey to run")]
    survey: Option<String>,

    /// List surveys and exit
    #[arg(long, help = "List the surveys available on the backend and exit")]
    list_surveys: bool,

    /// Print the backend rep counters and exit
    #[arg(long, help = "Print the detector's current rep counters and exit")]
    counters: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Disable keyboard controls
    #[arg(long, help = "Do not read keys from the terminal")]
    no_keyboard: bool,

    /// Disable spoken narration
    #[arg(long, help = "Do not speak question headings")]
    no_narration: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting hiitsurvey v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match HiitConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    if args.list_surveys {
        return list_surveys(&config).await;
    }
    if args.counters {
        return print_counters(&config).await;
    }

    let Some(survey_id) = args.survey.as_deref() else {
        bail!("No survey given; pass --survey <ID> or --list-surveys");
    };

    let mut orchestrator = HiitOrchestrator::new(config).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(!args.no_keyboard);
    if args.no_narration {
        orchestrator.set_narration_enabled(false);
    }

    let summary = orchestrator.run(survey_id).await.map_err(|e| {
        error!("Survey session failed: {}", e);
        e
    })?;

    print_summary(&summary);
    std::process::exit(if summary.completed { 0 } else { 1 });
}

async fn list_surveys(config: &HiitConfig) -> Result<()> {
    let client = BackendClient::new(&config.backend, &config.narration)?;
    let list = client.list_surveys().await?;

    if list.surveys.is_empty() {
        println!("No surveys available at {}", client.base_url());
        return Ok(());
    }
    for survey in &list.surveys {
        println!(
            "{}\t{}\t({} questions)",
            survey.id,
            survey.title,
            survey.questions.len()
        );
    }
    Ok(())
}

async fn print_counters(config: &HiitConfig) -> Result<()> {
    let client = BackendClient::new(&config.backend, &config.narration)?;
    let counters = client.counters().await?;
    for (exercise, count) in counters.iter() {
        println!("{:<18}{}", exercise.as_str(), count);
    }
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!();
    println!(
        "Survey '{}' {} in {}s",
        summary.title,
        if summary.completed { "completed" } else { "stopped" },
        elapsed.num_seconds()
    );
    println!(
        "Answered {}/{} questions",
        summary.answers.len(),
        summary.total_questions
    );
    for answer in &summary.answers {
        println!("  {}: {}", answer.question_id, answer.answer);
    }
    match &summary.submission {
        Some(outcome) if outcome.success => println!(
            "✓ Responses submitted{}",
            outcome
                .response_id
                .as_deref()
                .map(|id| format!(" ({})", id))
                .unwrap_or_default()
        ),
        Some(outcome) => println!(
            "✗ Backend rejected responses: {}",
            outcome.message.as_deref().unwrap_or("no reason given")
        ),
        None if summary.completed => println!("✗ Responses were not submitted"),
        None => {}
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hiitsurvey={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# hiitsurvey configuration file");
    println!("# Every value can also be set from the environment, e.g. HIIT_BACKEND__BASE_URL");
    println!();
    println!("{}", toml::to_string_pretty(&HiitConfig::default())?);
    Ok(())
}

mod autosave;
mod config;
mod repl;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use stoa_core::export::{classroom_export, classroom_export_since, full_export, test_export};
use stoa_core::{
    invoke_role, AgentType, ChatMessage, Language, LogEntry, LogSink, Role, SessionState,
    SessionStore, UnifiedLog,
};
use stoa_gateway::{HttpGateway, HttpLogSink, SurveyClient, SurveyKind};
use stoa_store::SqliteStore;

use autosave::Autosaver;
use config::Config;

#[derive(Parser)]
#[command(
    name = "stoa",
    version,
    about = "Multi-agent Bloom-level tutoring and assessment sessions"
)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a classroom role
    Chat {
        /// Who to talk to
        #[arg(short, long, default_value = "teacher")]
        role: CliPartner,

        /// Learning topic for this session
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Run the examiner-driven Bloom-level test session
    Test {
        /// Learning goal the examiner should keep in mind
        #[arg(short, long)]
        goal: Option<String>,
    },

    /// Ask the librarian for reading recommendations
    Library {
        /// Extra request to include (optional)
        query: Option<String>,
    },

    /// Generate a Graphviz mind map of the conversation so far
    Mindmap {
        /// Adjustment instruction for an existing map (optional)
        instruction: Option<String>,
    },

    /// Submit a pre-test or post-test survey response file
    Survey {
        /// Which instrument the responses belong to
        #[arg(short, long)]
        kind: CliSurveyKind,

        /// TOML file with flat question-id = answer entries
        file: PathBuf,
    },

    /// Upload a session export to the research log endpoint
    Export {
        /// Which slice of the session to upload
        #[arg(short, long, default_value = "full")]
        segment: CliSegment,

        /// Classroom only: upload just the entries added since the last
        /// incremental upload
        #[arg(long)]
        incremental: bool,
    },

    /// Show task scores across the six Bloom levels
    Scores,

    /// Print the unified conversation log
    History {
        /// Only the context view role agents see
        #[arg(long)]
        context: bool,
    },

    /// Clear the stored session
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show current configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum CliPartner {
    Teacher,
    Peer,
}

impl From<CliPartner> for Role {
    fn from(val: CliPartner) -> Self {
        match val {
            CliPartner::Teacher => Role::Teacher,
            CliPartner::Peer => Role::Peer,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliSurveyKind {
    Pre,
    Post,
}

impl From<CliSurveyKind> for SurveyKind {
    fn from(val: CliSurveyKind) -> Self {
        match val {
            CliSurveyKind::Pre => SurveyKind::Pre,
            CliSurveyKind::Post => SurveyKind::Post,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliSegment {
    Full,
    Classroom,
    Test,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "stoa", "stoa")
        .map(|dirs| dirs.data_dir().join("session.db"))
        .unwrap_or_else(|| PathBuf::from("session.db"))
}

fn open_store(db: Option<PathBuf>, config: &Config) -> Result<SqliteStore> {
    let path = db
        .or_else(|| config.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    SqliteStore::new(&path).context("failed to open database")
}

fn load_or_new_state(store: &SqliteStore, config: &Config) -> Result<SessionState> {
    let state = store
        .load()
        .context("failed to load session state")?
        .unwrap_or_else(|| {
            SessionState::new(&config.session.username, config.session.language)
        });
    Ok(state)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config()?;
    let store = open_store(cli.db, &config)?;

    match cli.command {
        Commands::Chat { role, topic } => cmd_chat(&store, &config, role.into(), topic),
        Commands::Test { goal } => cmd_test(&store, &config, goal),
        Commands::Library { query } => cmd_library(&store, &config, query.as_deref()),
        Commands::Mindmap { instruction } => {
            cmd_mindmap(&store, &config, instruction.as_deref())
        }
        Commands::Survey { kind, file } => cmd_survey(&config, kind.into(), &file),
        Commands::Export {
            segment,
            incremental,
        } => cmd_export(&store, &config, segment, incremental),
        Commands::Scores => cmd_scores(&store, &config),
        Commands::History { context } => cmd_history(&store, context),
        Commands::Reset { yes } => cmd_reset(&store, yes),
        Commands::Config => cmd_config(&config),
    }
}

fn gateway(config: &Config) -> HttpGateway {
    HttpGateway::new(&config.gateway.endpoint, &config.gateway.model)
}

fn log_sink(config: &Config) -> Arc<HttpLogSink> {
    Arc::new(HttpLogSink::new(&config.export.log_endpoint))
}

fn autosaver(config: &Config) -> Autosaver {
    Autosaver::spawn(
        log_sink(config),
        Duration::from_secs(config.export.autosave_secs.max(1)),
    )
}

fn cmd_chat(store: &SqliteStore, config: &Config, role: Role, topic: Option<String>) -> Result<()> {
    let mut state = load_or_new_state(store, config)?;
    if let Some(topic) = topic {
        state.meta.exam_topic = Some(topic.clone());
        state.selected_topic = Some(topic);
    }
    let client = gateway(config);
    let saver = autosaver(config);

    repl::run_classroom(store, &client, &saver, &mut state, role)?;

    store.save(&state)?;
    saver.flush(stoa_core::export::unload_export(&state), &state.meta);
    Ok(())
}

fn cmd_test(store: &SqliteStore, config: &Config, goal: Option<String>) -> Result<()> {
    let mut state = load_or_new_state(store, config)?;
    if goal.is_some() {
        state.test_goal = goal;
    }
    let client = gateway(config);
    let sink = log_sink(config);
    let saver = autosaver(config);

    let state = repl::run_test(
        store,
        &client,
        sink,
        &saver,
        state,
        config.evaluation,
        config.session.min_classroom_rounds,
    )?;

    store.save(&state)?;
    saver.flush(stoa_core::export::unload_export(&state), &state.meta);
    Ok(())
}

fn cmd_library(store: &SqliteStore, config: &Config, query: Option<&str>) -> Result<()> {
    let mut state = load_or_new_state(store, config)?;
    let language = state.language();
    let client = gateway(config);

    // The librarian reads the whole unified history, internal agents
    // included; it is itself excluded from other agents' context instead.
    let all: Vec<&LogEntry> = state.unified_log.read_all().iter().collect();
    let mut messages = UnifiedLog::to_chat_messages(&all);
    if let Some(query) = query {
        let username = state.meta.username.clone();
        state
            .unified_log
            .append(LogEntry::new(AgentType::User, query, username));
        messages.push(ChatMessage::user(query));
    }
    if messages.is_empty() {
        bail!("no conversation history yet; chat with the teacher or peer first");
    }

    let reply = invoke_role(
        &client,
        Role::Librarian,
        language,
        state.current_test_level,
        messages,
    )?;

    let separator = match language {
        Language::En => "---Recommendation Summary---",
        Language::Zh => "---推荐思路和总结---",
    };
    match reply.split_once(separator) {
        Some((books, summary)) => {
            println!("{}\n", books.trim());
            println!("{separator}");
            println!("{}", summary.trim());
        }
        None => println!("{reply}"),
    }

    state.unified_log.append(LogEntry::new(
        AgentType::Librarian,
        &reply,
        Role::Librarian.speaker_name(language),
    ));
    store.save(&state)?;
    Ok(())
}

fn cmd_mindmap(store: &SqliteStore, config: &Config, instruction: Option<&str>) -> Result<()> {
    let mut state = load_or_new_state(store, config)?;
    let language = state.language();
    let client = gateway(config);

    let all: Vec<&LogEntry> = state.unified_log.read_all().iter().collect();
    if all.is_empty() {
        bail!("no conversation history available for generation");
    }
    let mut messages = UnifiedLog::to_chat_messages(&all);
    if let Some(instruction) = instruction {
        messages.push(ChatMessage::user(instruction));
    }

    let reply = invoke_role(
        &client,
        Role::Mindmap,
        language,
        state.current_test_level,
        messages,
    )?;

    match stoa_core::extract::extract_dot_block(&reply) {
        Some(dot) => println!("{dot}"),
        None => bail!("could not find Graphviz code in the agent output"),
    }

    state.unified_log.append(LogEntry::new(
        AgentType::Mindmap,
        &reply,
        Role::Mindmap.speaker_name(language),
    ));
    store.save(&state)?;
    Ok(())
}

fn cmd_survey(config: &Config, kind: SurveyKind, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let raw: BTreeMap<String, toml::Value> =
        toml::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;

    // Flatten every answer to a string; multi-select arrays join with `|`.
    let responses: BTreeMap<String, String> = raw
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join("|"),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect();

    let client = SurveyClient::new(
        &config.export.pretest_endpoint,
        &config.export.posttest_endpoint,
    );
    client.submit(
        kind,
        &config.session.username,
        config.session.language,
        &responses,
    )?;
    println!("Submitted {} {} responses.", responses.len(), kind);
    Ok(())
}

fn cmd_export(
    store: &SqliteStore,
    config: &Config,
    segment: CliSegment,
    incremental: bool,
) -> Result<()> {
    let mut state = load_or_new_state(store, config)?;
    if state.unified_log.is_empty() {
        bail!("no conversation history is available to export");
    }

    let sink = log_sink(config);
    let (payload, filename) = match segment {
        CliSegment::Full => (full_export(&state), "conversation-history.json"),
        CliSegment::Classroom if incremental => {
            match classroom_export_since(&state, state.meta.last_upload_cursor) {
                Some(payload) => (payload, "classroom-history.json"),
                None => {
                    println!("Nothing new since the last incremental upload.");
                    return Ok(());
                }
            }
        }
        CliSegment::Classroom => (classroom_export(&state), "classroom-history.json"),
        CliSegment::Test => (test_export(&state), "test-history.json"),
    };
    sink.post_log(&payload, filename, &state.meta)
        .context("export upload failed")?;

    if incremental && matches!(segment, CliSegment::Classroom) {
        state.meta.last_upload_cursor = state.unified_log.classroom_history().len();
        store.save(&state)?;
    }
    println!("Uploaded {filename}.");
    Ok(())
}

fn cmd_scores(store: &SqliteStore, config: &Config) -> Result<()> {
    let state = load_or_new_state(store, config)?;
    let language = state.language();

    println!("Level        Points  Completed");
    for level in stoa_core::BloomLevel::ORDER {
        let score = state.task_score(level);
        println!(
            "{:<12} {:>5.1}   {:<4} {}",
            level.label(language),
            score.points,
            if score.completed { "yes" } else { "no" },
            level.description(language)
        );
    }
    println!("\nAverage score: {:.1}/10", state.average_score());
    println!("Questions issued: {}", state.test_count);
    Ok(())
}

fn cmd_history(store: &SqliteStore, context: bool) -> Result<()> {
    let state = match store.load()? {
        Some(state) => state,
        None => {
            println!("No stored session.");
            return Ok(());
        }
    };

    let entries: Vec<&LogEntry> = if context {
        state.unified_log.context_history()
    } else {
        state.unified_log.read_all().iter().collect()
    };

    for entry in entries {
        println!(
            "[{}] {} ({}): {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.speaker,
            entry.agent,
            entry.content
        );
    }
    Ok(())
}

fn cmd_reset(store: &SqliteStore, yes: bool) -> Result<()> {
    if !yes {
        print!("Clear the stored session? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }
    store.clear()?;
    println!("Session cleared.");
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Config file: {}", config::show_config_path());
    println!("Gateway endpoint: {}", config.gateway.endpoint);
    println!("Model: {}", config.gateway.model);
    println!("Username: {}", config.session.username);
    println!("Language: {}", config.session.language);
    println!(
        "Evaluation: variance threshold {}, max attempts {}",
        config.evaluation.variance_threshold, config.evaluation.max_attempts
    );
    println!("Log endpoint: {}", config.export.log_endpoint);
    println!("Autosave interval: {}s", config.export.autosave_secs);
    Ok(())
}

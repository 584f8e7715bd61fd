use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use exam_core::model::{ExamId, Phase, SubmitTrigger, WritingTask};
use services::{
    DraftService, ExamApi, LoginService, SessionController, StartOutcome, SubmitOutcome,
    spawn_ticker,
};
use storage::repository::{CredentialRepository, Storage};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidExamId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidPhase { raw: String },
    MissingNames,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidExamId { raw } => write!(f, "invalid --exam-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPhase { raw } => {
                write!(f, "--phase must be listening or reading, got: {raw}")
            }
            ArgsError::MissingNames => {
                write!(f, "login needs --first and --last, or --demo")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- login   (--first <name> --last <name> | --demo)");
    eprintln!("  cargo run -p app -- phase   --phase <listening|reading> [--answers <file.json>] [--wait]");
    eprintln!("  cargo run -p app -- writing [--task1 <file>] [--task2 <file>] [--save-only]");
    eprintln!("  cargo run -p app -- leave");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>   (default sqlite:exam.sqlite3)");
    eprintln!("  --base-url <url>    (default http://localhost:8000/api)");
    eprintln!("  --exam-id <id>      (default 3)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_API_URL, EXAM_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Login,
    Phase,
    Writing,
    Leave,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "login" => Some(Self::Login),
            "phase" => Some(Self::Phase),
            "writing" => Some(Self::Writing),
            "leave" => Some(Self::Leave),
            _ => None,
        }
    }
}

struct CommonArgs {
    db_url: String,
    base_url: String,
    exam_id: ExamId,
}

impl CommonArgs {
    fn from_env() -> Self {
        let db_url = std::env::var("EXAM_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://exam.sqlite3".into(), normalize_sqlite_url);
        let base_url = std::env::var("EXAM_API_URL")
            .ok()
            .unwrap_or_else(|| "http://localhost:8000/api".into());
        let exam_id = std::env::var("EXAM_ID")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .map_or_else(|| ExamId::new(3), ExamId::new);
        Self {
            db_url,
            base_url,
            exam_id,
        }
    }

    /// Consume one common flag; `false` means the flag belongs to the
    /// command-specific parser.
    fn accept(
        &mut self,
        arg: &str,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<bool, ArgsError> {
        match arg {
            "--db" => {
                let value = require_value(args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                self.db_url = normalize_sqlite_url(value);
                Ok(true)
            }
            "--base-url" => {
                self.base_url = require_value(args, "--base-url")?;
                Ok(true)
            }
            "--exam-id" => {
                let value = require_value(args, "--exam-id")?;
                let parsed: i64 = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidExamId { raw: value.clone() })?;
                self.exam_id = ExamId::new(parsed);
                Ok(true)
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => Ok(false),
        }
    }
}

struct LoginArgs {
    common: CommonArgs,
    first_name: Option<String>,
    last_name: Option<String>,
    demo: bool,
}

impl LoginArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut common = CommonArgs::from_env();
        let mut first_name = None;
        let mut last_name = None;
        let mut demo = false;

        while let Some(arg) = args.next() {
            if common.accept(&arg, args)? {
                continue;
            }
            match arg.as_str() {
                "--first" => first_name = Some(require_value(args, "--first")?),
                "--last" => last_name = Some(require_value(args, "--last")?),
                "--demo" => demo = true,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if !demo && (first_name.is_none() || last_name.is_none()) {
            return Err(ArgsError::MissingNames);
        }
        Ok(Self {
            common,
            first_name,
            last_name,
            demo,
        })
    }
}

struct PhaseArgs {
    common: CommonArgs,
    phase: Phase,
    answers: Option<PathBuf>,
    wait: bool,
}

impl PhaseArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut common = CommonArgs::from_env();
        let mut phase = None;
        let mut answers = None;
        let mut wait = false;

        while let Some(arg) = args.next() {
            if common.accept(&arg, args)? {
                continue;
            }
            match arg.as_str() {
                "--phase" => {
                    let value = require_value(args, "--phase")?;
                    // Writing has its own subcommand; only the numbered
                    // phases belong here.
                    phase = match value.parse::<Phase>() {
                        Ok(parsed @ (Phase::Listening | Phase::Reading)) => Some(parsed),
                        _ => return Err(ArgsError::InvalidPhase { raw: value }),
                    };
                }
                "--answers" => answers = Some(PathBuf::from(require_value(args, "--answers")?)),
                "--wait" => wait = true,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let phase = phase.ok_or(ArgsError::MissingValue { flag: "--phase" })?;
        Ok(Self {
            common,
            phase,
            answers,
            wait,
        })
    }
}

struct LeaveArgs {
    common: CommonArgs,
}

impl LeaveArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut common = CommonArgs::from_env();
        while let Some(arg) = args.next() {
            if !common.accept(&arg, args)? {
                return Err(ArgsError::UnknownArg(arg));
            }
        }
        Ok(Self { common })
    }
}

struct WritingArgs {
    common: CommonArgs,
    task1: Option<PathBuf>,
    task2: Option<PathBuf>,
    save_only: bool,
}

impl WritingArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut common = CommonArgs::from_env();
        let mut task1 = None;
        let mut task2 = None;
        let mut save_only = false;

        while let Some(arg) = args.next() {
            if common.accept(&arg, args)? {
                continue;
            }
            match arg.as_str() {
                "--task1" => task1 = Some(PathBuf::from(require_value(args, "--task1")?)),
                "--task2" => task2 = Some(PathBuf::from(require_value(args, "--task2")?)),
                "--save-only" => save_only = true,
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            common,
            task1,
            task2,
            save_only,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

/// Apply an answers file to the controller: a JSON object mapping question
/// keys to a string (scalar answers) or an array of strings (multi-select
/// options, toggled in order).
fn apply_answers(
    controller: &mut SessionController,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let map: serde_json::Map<String, Value> = serde_json::from_str(&raw)?;
    for (key, value) in &map {
        match value {
            Value::String(text) => controller.set_scalar(key, text)?,
            Value::Array(options) => {
                for option in options {
                    let Some(option) = option.as_str() else {
                        return Err(format!("answer {key}: options must be strings").into());
                    };
                    controller.toggle_selection(key, option)?;
                }
            }
            _ => {
                return Err(
                    format!("answer {key} must be a string or an array of strings").into(),
                );
            }
        }
    }
    Ok(())
}

async fn report_submission(
    outcome: Option<SubmitOutcome>,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        Some(SubmitOutcome::Submitted {
            next_phase,
            redirect_delay,
        }) => {
            tokio::time::sleep(redirect_delay).await;
            match next_phase {
                Some(next) => println!("submitted; next phase: {next}"),
                None => println!("submitted; exam complete"),
            }
            Ok(())
        }
        Some(SubmitOutcome::AlreadyInFlight) => {
            println!("a submission is already in flight");
            Ok(())
        }
        Some(SubmitOutcome::LoginRequired) | None => {
            eprintln!("credential rejected; run the login command and try again");
            std::process::exit(1);
        }
    }
}

async fn run_login(parsed: LoginArgs, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let api = Arc::new(ExamApi::new(&parsed.common.base_url));
    let login = LoginService::new(api, Arc::clone(&storage.credentials));

    let credentials = if parsed.demo {
        login.login_demo(parsed.common.exam_id).await?
    } else {
        // parse() guarantees both names are present here.
        let first = parsed.first_name.ok_or(ArgsError::MissingNames)?;
        let last = parsed.last_name.ok_or(ArgsError::MissingNames)?;
        login.login(parsed.common.exam_id, &first, &last).await?
    };

    println!("logged in as {}", credentials.display_name);
    Ok(())
}

async fn run_phase(parsed: PhaseArgs, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = Arc::new(ExamApi::new(&parsed.common.base_url));
    let mut controller = SessionController::new(
        parsed.common.exam_id,
        parsed.phase,
        gateway,
        Arc::clone(&storage.credentials),
    );

    match controller.start().await? {
        StartOutcome::LoginRequired => {
            eprintln!("no valid credential; run the login command first");
            std::process::exit(1);
        }
        StartOutcome::Started { countdown_secs } => {
            info!(phase = %parsed.phase, ?countdown_secs, "phase started");
        }
    }

    if let Some(path) = &parsed.answers {
        apply_answers(&mut controller, path)?;
    }

    let outcome = if parsed.wait {
        // Hold the ticker handle so the tick stream stays alive until
        // expiry drives the auto-submission.
        let (_ticker, mut ticks) = spawn_ticker(Duration::from_secs(1));
        controller.drive_countdown(&mut ticks).await?
    } else {
        Some(controller.submit(SubmitTrigger::Manual).await?)
    };
    report_submission(outcome).await
}

async fn run_writing(
    parsed: WritingArgs,
    storage: Storage,
) -> Result<(), Box<dyn std::error::Error>> {
    let task1 = parsed
        .task1
        .as_deref()
        .map(std::fs::read_to_string)
        .transpose()?;
    let task2 = parsed
        .task2
        .as_deref()
        .map(std::fs::read_to_string)
        .transpose()?;

    if parsed.save_only {
        let drafts = DraftService::new(Arc::clone(&storage.drafts));
        let draft = drafts
            .save(
                parsed.common.exam_id,
                task1.as_deref().unwrap_or(""),
                task2.as_deref().unwrap_or(""),
            )
            .await?;
        println!(
            "draft saved ({} / {} words)",
            draft.word_count1, draft.word_count2
        );
        return Ok(());
    }

    let gateway = Arc::new(ExamApi::new(&parsed.common.base_url));
    let mut controller = SessionController::new(
        parsed.common.exam_id,
        Phase::Writing,
        gateway,
        Arc::clone(&storage.credentials),
    )
    .with_draft_store(Arc::clone(&storage.drafts));

    match controller.start().await? {
        StartOutcome::LoginRequired => {
            eprintln!("no valid credential; run the login command first");
            std::process::exit(1);
        }
        StartOutcome::Started { .. } => {}
    }

    // Files override the restored draft; omitted tasks keep their saved text.
    if let Some(text) = &task1 {
        let count = controller.set_task_text(WritingTask::Task1, text).await?;
        info!(task = 1, words = count, "task text set");
    }
    if let Some(text) = &task2 {
        let count = controller.set_task_text(WritingTask::Task2, text).await?;
        info!(task = 2, words = count, "task text set");
    }

    let outcome = controller.submit(SubmitTrigger::Manual).await?;
    report_submission(Some(outcome)).await
}

async fn run_leave(parsed: LeaveArgs, storage: Storage) -> Result<(), Box<dyn std::error::Error>> {
    let Some(credentials) = storage.credentials.get_credentials().await? else {
        eprintln!("no valid credential; run the login command first");
        std::process::exit(1);
    };

    let api = ExamApi::new(&parsed.common.base_url);
    // Abandoning the exam keeps the local writing draft.
    api.leave_exam(credentials.bearer(), parsed.common.exam_id)
        .await?;
    println!("left exam {}", parsed.common.exam_id);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);
    let mut iter = argv.into_iter();

    let report_args = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };

    match cmd {
        Command::Login => {
            let parsed = LoginArgs::parse(&mut iter).map_err(report_args)?;
            prepare_sqlite_file(&parsed.common.db_url)?;
            let storage = Storage::sqlite(&parsed.common.db_url).await?;
            run_login(parsed, storage).await
        }
        Command::Phase => {
            let parsed = PhaseArgs::parse(&mut iter).map_err(report_args)?;
            prepare_sqlite_file(&parsed.common.db_url)?;
            let storage = Storage::sqlite(&parsed.common.db_url).await?;
            run_phase(parsed, storage).await
        }
        Command::Writing => {
            let parsed = WritingArgs::parse(&mut iter).map_err(report_args)?;
            prepare_sqlite_file(&parsed.common.db_url)?;
            let storage = Storage::sqlite(&parsed.common.db_url).await?;
            run_writing(parsed, storage).await
        }
        Command::Leave => {
            let parsed = LeaveArgs::parse(&mut iter).map_err(report_args)?;
            prepare_sqlite_file(&parsed.common.db_url)?;
            let storage = Storage::sqlite(&parsed.common.db_url).await?;
            run_leave(parsed, storage).await
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

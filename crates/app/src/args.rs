use std::fmt;

use campus_core::model::CourseStatus;

pub const DEFAULT_FLASHCARDS: usize = 5;
pub const DEFAULT_QUESTIONS: usize = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingCommand,
    UnknownArg(String),
    UnknownCommand(String),
    MissingArgument { command: &'static str, name: &'static str },
    UnexpectedArgument { command: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidStatus { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCommand => write!(f, "no command given"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnexpectedArgument { command, raw } => {
                write!(f, "unexpected argument for {command}: {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStatus { raw } => {
                write!(f, "invalid status (expected planned, ongoing or completed): {raw}")
            }
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

/// Chapter reference: an id or a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub course: String,
    pub chapter: String,
}

/// Fields given to `prefs`; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferencesUpdate {
    pub education_level: Option<String>,
    pub age: Option<u16>,
    pub content_tone: Option<String>,
    pub experience_level: Option<String>,
    pub interested_topics: Option<Vec<String>>,
}

impl PreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Syllabus { topic: String },
    Start { topic: String },
    Plan { topic: String },
    Courses,
    Read { target: Target, regenerate: bool },
    Complete { target: Target, undo: bool },
    Next { target: Target },
    Prev { target: Target },
    Status { course: String, status: CourseStatus },
    Remove { course: String },
    Flashcards { target: Target, count: usize },
    Quiz { target: Target, count: usize, answers: Option<Vec<usize>> },
    Ask { target: Target, question: String, selection: Option<String> },
    Prefs(PreferencesUpdate),
}

/// Values used when a global flag is not given.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    pub store: Option<String>,
    pub db_url: Option<String>,
    pub email: Option<String>,
}

impl Defaults {
    /// Reads `CAMPUS_STORE`, `CAMPUS_DB_URL` and `CAMPUS_EMAIL`.
    pub fn from_env() -> Self {
        Self {
            store: std::env::var("CAMPUS_STORE").ok(),
            db_url: std::env::var("CAMPUS_DB_URL").ok(),
            email: std::env::var("CAMPUS_EMAIL").ok(),
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    undo: bool,
    regenerate: bool,
    count: Option<usize>,
    answers: Option<Vec<usize>>,
    selection: Option<String>,
    prefs: PreferencesUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub store: String,
    pub db_url: Option<String>,
    pub email: Option<String>,
    pub command: Command,
}

impl Args {
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        defaults: Defaults,
    ) -> Result<Self, ArgsError> {
        let mut store = defaults.store.unwrap_or_else(|| "sqlite".into());
        let mut db_url = defaults.db_url;
        let mut email = defaults.email;
        let mut options = Options::default();
        let mut positionals = Vec::new();

        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--store" => store = require_value(&mut args, "--store")?,
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = Some(value);
                }
                "--email" => email = Some(require_value(&mut args, "--email")?),
                "--undo" => options.undo = true,
                "--regenerate" => options.regenerate = true,
                "--count" => {
                    let value = require_value(&mut args, "--count")?;
                    options.count = Some(parse_number(value, "--count")?);
                }
                "--answers" => {
                    let value = require_value(&mut args, "--answers")?;
                    options.answers = Some(parse_answers(value)?);
                }
                "--selection" => {
                    options.selection = Some(require_value(&mut args, "--selection")?);
                }
                "--education" => {
                    options.prefs.education_level = Some(require_value(&mut args, "--education")?);
                }
                "--age" => {
                    let value = require_value(&mut args, "--age")?;
                    options.prefs.age = Some(parse_number(value, "--age")?);
                }
                "--tone" => options.prefs.content_tone = Some(require_value(&mut args, "--tone")?),
                "--experience" => {
                    options.prefs.experience_level =
                        Some(require_value(&mut args, "--experience")?);
                }
                "--topics" => {
                    let value = require_value(&mut args, "--topics")?;
                    options.prefs.interested_topics = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(ToString::to_string)
                            .collect(),
                    );
                }
                "--help" | "-h" => positionals.insert(0, "help".to_string()),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positionals.push(arg),
            }
        }

        let command = build_command(positionals, options)?;
        Ok(Self {
            store,
            db_url,
            email,
            command,
        })
    }
}

/// `--answers 1,0,3` selects option indexes 1-based on the command line.
fn parse_answers(raw: String) -> Result<Vec<usize>, ArgsError> {
    raw.split(',')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n - 1),
            _ => Err(ArgsError::InvalidNumber {
                flag: "--answers",
                raw: raw.clone(),
            }),
        })
        .collect()
}

fn build_command(positionals: Vec<String>, options: Options) -> Result<Command, ArgsError> {
    let mut words = positionals.into_iter();
    let Some(name) = words.next() else {
        return Err(ArgsError::MissingCommand);
    };
    let rest: Vec<String> = words.collect();

    let command = match name.as_str() {
        "help" => Command::Help,
        "syllabus" => Command::Syllabus {
            topic: joined(rest, "syllabus", "topic")?,
        },
        "start" => Command::Start {
            topic: joined(rest, "start", "topic")?,
        },
        "plan" => Command::Plan {
            topic: joined(rest, "plan", "topic")?,
        },
        "courses" => {
            no_more(&rest, 0, "courses")?;
            Command::Courses
        }
        "read" => Command::Read {
            target: target(&rest, "read")?,
            regenerate: options.regenerate,
        },
        "complete" => Command::Complete {
            target: target(&rest, "complete")?,
            undo: options.undo,
        },
        "next" => Command::Next {
            target: target(&rest, "next")?,
        },
        "prev" => Command::Prev {
            target: target(&rest, "prev")?,
        },
        "status" => {
            let course = positional(&rest, 0, "status", "course")?;
            let raw = positional(&rest, 1, "status", "status")?;
            no_more(&rest, 2, "status")?;
            let status = raw
                .parse::<CourseStatus>()
                .map_err(|_| ArgsError::InvalidStatus { raw })?;
            Command::Status { course, status }
        }
        "remove" => {
            let course = positional(&rest, 0, "remove", "course")?;
            no_more(&rest, 1, "remove")?;
            Command::Remove { course }
        }
        "flashcards" => Command::Flashcards {
            target: target(&rest, "flashcards")?,
            count: options.count.unwrap_or(DEFAULT_FLASHCARDS),
        },
        "quiz" => Command::Quiz {
            target: target_prefix(&rest, "quiz")?,
            count: options.count.unwrap_or(DEFAULT_QUESTIONS),
            answers: options.answers,
        },
        "ask" => {
            let target = target_prefix(&rest, "ask")?;
            let question = joined(rest[2..].to_vec(), "ask", "question")?;
            Command::Ask {
                target,
                question,
                selection: options.selection,
            }
        }
        "prefs" => {
            no_more(&rest, 0, "prefs")?;
            Command::Prefs(options.prefs)
        }
        _ => return Err(ArgsError::UnknownCommand(name)),
    };
    Ok(command)
}

fn positional(
    rest: &[String],
    index: usize,
    command: &'static str,
    name: &'static str,
) -> Result<String, ArgsError> {
    rest.get(index)
        .cloned()
        .ok_or(ArgsError::MissingArgument { command, name })
}

fn no_more(rest: &[String], expected: usize, command: &'static str) -> Result<(), ArgsError> {
    match rest.get(expected) {
        Some(extra) => Err(ArgsError::UnexpectedArgument {
            command,
            raw: extra.clone(),
        }),
        None => Ok(()),
    }
}

fn target_prefix(rest: &[String], command: &'static str) -> Result<Target, ArgsError> {
    Ok(Target {
        course: positional(rest, 0, command, "course")?,
        chapter: positional(rest, 1, command, "chapter")?,
    })
}

fn target(rest: &[String], command: &'static str) -> Result<Target, ArgsError> {
    let target = target_prefix(rest, command)?;
    no_more(rest, 2, command)?;
    Ok(target)
}

fn joined(words: Vec<String>, command: &'static str, name: &'static str) -> Result<String, ArgsError> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        return Err(ArgsError::MissingArgument { command, name });
    }
    Ok(text.trim().to_string())
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  campus [--store memory|sqlite|remote] [--db <sqlite_url>] [--email <email>] <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  syllabus <topic>                     Propose chapters for a topic");
    eprintln!("  start <topic>                        Create an ongoing course from a new syllabus");
    eprintln!("  plan <topic>                         Create a planned course from a new syllabus");
    eprintln!("  courses                              List courses with progress");
    eprintln!("  read <course> <chapter> [--regenerate]");
    eprintln!("  complete <course> <chapter> [--undo]");
    eprintln!("  next <course> <chapter>");
    eprintln!("  prev <course> <chapter>");
    eprintln!("  status <course> planned|ongoing|completed");
    eprintln!("  remove <course>");
    eprintln!("  flashcards <course> <chapter> [--count <n>]");
    eprintln!("  quiz <course> <chapter> [--count <n>] [--answers 1,3,2,...]");
    eprintln!("  ask <course> <chapter> <question> [--selection <text>]");
    eprintln!("  prefs [--education <s>] [--age <n>] [--tone <s>] [--experience <s>] [--topics a,b]");
    eprintln!();
    eprintln!("<course> is an id or a unique id prefix; <chapter> is an id or a position (1, 2, ...).");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CAMPUS_STORE, CAMPUS_DB_URL, CAMPUS_EMAIL, CAMPUS_PASSWORD, CAMPUS_LOG");
    eprintln!("  CAMPUS_OPENAI_API_KEY, CAMPUS_AI_BASE_URL, CAMPUS_SYLLABUS_MODEL, CAMPUS_CONTENT_MODEL");
    eprintln!("  SUPABASE_URL, SUPABASE_ANON_KEY");
}

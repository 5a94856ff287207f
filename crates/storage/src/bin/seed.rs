use std::fmt;

use campus_core::model::{Course, CourseId, CourseStatus, SyllabusChapter, UserId};
use chrono::{DateTime, Duration, Utc};
use storage::repository::{OwnerScope, Storage, StorageError};

/// User id the `campus` CLI signs in as with the local identity and no `--email`.
const DEFAULT_USER: &str = "local:learner@localhost";

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidUser { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("CAMPUS_DB_URL").unwrap_or_else(|_| "sqlite://campus.sqlite3?mode=rwc".into());
        let mut user_id = UserId::new(
            std::env::var("CAMPUS_USER_ID").unwrap_or_else(|_| DEFAULT_USER.into()),
        );
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   SQLite URL (default: sqlite://campus.sqlite3?mode=rwc)");
    eprintln!("  --user <id>         Owner of the sample courses (default: {DEFAULT_USER})");
    eprintln!("  --now <rfc3339>     Timestamp for created_at (default: now)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CAMPUS_DB_URL, CAMPUS_USER_ID");
}

fn sample_courses() -> Vec<(String, CourseStatus, Vec<SyllabusChapter>)> {
    vec![
        (
            "Introduction to Machine Learning".to_string(),
            CourseStatus::Ongoing,
            vec![
                SyllabusChapter::new("What is Machine Learning?", "Supervised, unsupervised and reinforcement learning."),
                SyllabusChapter::new("Linear Regression", "Fitting a line and measuring error."),
                SyllabusChapter::new("Classification", "Logistic regression and decision boundaries."),
                SyllabusChapter::new("Model Evaluation", "Train/test splits, cross-validation and metrics."),
            ],
        ),
        (
            "Organic Chemistry Basics".to_string(),
            CourseStatus::Planned,
            vec![
                SyllabusChapter::new("Carbon Bonding", "Why carbon forms four bonds."),
                SyllabusChapter::new("Functional Groups", "Alcohols, ketones, acids and amines."),
                SyllabusChapter::new("Reaction Mechanisms", "Substitution and elimination."),
            ],
        ),
        (
            "World History: The Renaissance".to_string(),
            CourseStatus::Completed,
            vec![
                SyllabusChapter::new("Origins in Florence", "Patronage and the rediscovery of antiquity."),
                SyllabusChapter::new("Art and Science", "Perspective, anatomy and the printing press."),
            ],
        ),
    ]
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let now = args.now.unwrap_or_else(Utc::now);
    let storage = Storage::sqlite(&args.db_url).await?;
    let owner = OwnerScope::new(args.user_id.clone());

    for (index, (topic, status, syllabus)) in sample_courses().into_iter().enumerate() {
        let created = now - Duration::days(i64::try_from(index)?);
        let mut course = Course::from_syllabus(CourseId::generate(), &topic, &syllabus, status, created)?;
        if status == CourseStatus::Completed {
            let ids: Vec<_> = course.chapters().iter().map(|c| c.id().clone()).collect();
            for id in &ids {
                course.set_chapter_completed(id, true, created)?;
            }
        }

        match storage.courses.insert_course(&owner, &course).await {
            Ok(()) => {
                for chapter in course.chapters().iter().filter(|c| c.completed()) {
                    storage
                        .courses
                        .update_chapter(&owner, course.id(), chapter)
                        .await?;
                }
                println!("seeded {} ({} chapters)", course.title(), course.chapters().len());
            }
            Err(StorageError::Conflict) => println!("skipped {} (exists)", course.title()),
            Err(err) => return Err(err.into()),
        }
    }

    println!("seeded sample courses for user {}", args.user_id);
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

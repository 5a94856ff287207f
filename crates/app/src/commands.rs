use std::fmt;

use campus_core::model::{
    Chapter, ChapterId, Course, CourseStatus, LearnerPreferences, QuizAttempt, SyllabusChapter,
};
use services::{AppServices, ContentUpdate};
use storage::repository::OwnerScope;

use crate::args::{Command, PreferencesUpdate, Target, print_usage};

#[derive(Debug, PartialEq, Eq)]
pub enum LookupError {
    UnknownCourse(String),
    AmbiguousCourse { raw: String, matches: usize },
    UnknownChapter { course: String, raw: String },
    NoNeighbour { direction: &'static str },
    Superseded,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::UnknownCourse(raw) => write!(f, "no course matches {raw}"),
            LookupError::AmbiguousCourse { raw, matches } => {
                write!(f, "{raw} matches {matches} courses; use a longer prefix")
            }
            LookupError::UnknownChapter { course, raw } => {
                write!(f, "course {course} has no chapter {raw}")
            }
            LookupError::NoNeighbour { direction } => write!(f, "there is no {direction} chapter"),
            LookupError::Superseded => write!(f, "a newer request replaced this one"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Finds a course by exact id, then by unique id prefix.
pub fn find_course<'a>(courses: &'a [Course], raw: &str) -> Result<&'a Course, LookupError> {
    let raw = raw.trim();
    if let Some(course) = courses.iter().find(|c| c.id().as_str() == raw) {
        return Ok(course);
    }
    let matches: Vec<&Course> = courses
        .iter()
        .filter(|c| !raw.is_empty() && c.id().as_str().starts_with(raw))
        .collect();
    match matches.as_slice() {
        [course] => Ok(course),
        [] => Err(LookupError::UnknownCourse(raw.to_string())),
        many => Err(LookupError::AmbiguousCourse {
            raw: raw.to_string(),
            matches: many.len(),
        }),
    }
}

/// Finds a chapter by id or by 1-based position.
pub fn find_chapter<'a>(course: &'a Course, raw: &str) -> Result<&'a Chapter, LookupError> {
    let raw = raw.trim();
    let by_position = raw
        .parse::<u32>()
        .ok()
        .and_then(|n| course.chapters().iter().find(|c| c.position() == n));
    by_position
        .or_else(|| course.chapter(&ChapterId::new(raw)))
        .ok_or_else(|| LookupError::UnknownChapter {
            course: course.id().to_string(),
            raw: raw.to_string(),
        })
}

pub struct Context {
    pub services: AppServices,
    pub owner: OwnerScope,
    pub preferences: LearnerPreferences,
}

impl Context {
    fn preferences(&self) -> Option<&LearnerPreferences> {
        (!self.preferences.is_empty()).then_some(&self.preferences)
    }

    async fn resolve(&self, target: &Target) -> Result<(Course, Chapter), LookupError> {
        let courses = self.services.courses().courses().await;
        let course = find_course(&courses, &target.course)?;
        let chapter = find_chapter(course, &target.chapter)?.clone();
        Ok((course.clone(), chapter))
    }

    async fn resolve_course(&self, raw: &str) -> Result<Course, LookupError> {
        let courses = self.services.courses().courses().await;
        find_course(&courses, raw).cloned()
    }
}

pub async fn execute(ctx: &Context, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let courses = ctx.services.courses();
    match command {
        Command::Help => print_usage(),
        Command::Syllabus { topic } => {
            let chapters = courses
                .generator()
                .generate_syllabus(&topic, ctx.preferences())
                .await?;
            print_syllabus(&topic, &chapters);
        }
        Command::Start { topic } => create(ctx, &topic, CourseStatus::Ongoing).await?,
        Command::Plan { topic } => create(ctx, &topic, CourseStatus::Planned).await?,
        Command::Courses => {
            let all = courses.courses().await;
            if all.is_empty() {
                println!("No courses yet. Try `campus start <topic>`.");
            }
            for course in &all {
                print_course_line(course);
            }
        }
        Command::Read { target, regenerate } => {
            let (course, chapter) = ctx.resolve(&target).await?;
            let update = if regenerate {
                courses
                    .regenerate_chapter(course.id(), chapter.id(), ctx.preferences())
                    .await?
            } else {
                courses
                    .open_chapter(course.id(), chapter.id(), ctx.preferences())
                    .await?
            };
            let chapter = match update {
                ContentUpdate::Existing(chapter) | ContentUpdate::Applied(chapter) => chapter,
                ContentUpdate::Stale => return Err(LookupError::Superseded.into()),
            };
            println!("# {}. {}", chapter.position(), chapter.title());
            println!();
            println!("{}", chapter.content().unwrap_or_default());
        }
        Command::Complete { target, undo } => {
            let (course, chapter) = ctx.resolve(&target).await?;
            let updated = courses
                .mark_chapter_completed(course.id(), chapter.id(), !undo)
                .await?;
            let verb = if undo { "Reopened" } else { "Completed" };
            println!(
                "{verb} \"{}\". {} is {}% done.",
                chapter.title(),
                updated.title(),
                updated.progress()
            );
        }
        Command::Next { target } => {
            let (course, chapter) = ctx.resolve(&target).await?;
            let next = courses
                .next_chapter(course.id(), chapter.id())
                .await
                .ok_or(LookupError::NoNeighbour { direction: "next" })?;
            print_chapter_line(&next);
        }
        Command::Prev { target } => {
            let (course, chapter) = ctx.resolve(&target).await?;
            let previous = courses
                .previous_chapter(course.id(), chapter.id())
                .await
                .ok_or(LookupError::NoNeighbour {
                    direction: "previous",
                })?;
            print_chapter_line(&previous);
        }
        Command::Status { course, status } => {
            let course = ctx.resolve_course(&course).await?;
            let updated = courses.update_course_status(course.id(), status).await?;
            print_course_line(&updated);
        }
        Command::Remove { course } => {
            let course = ctx.resolve_course(&course).await?;
            courses.remove_course(course.id()).await?;
            println!("Removed {}.", course.title());
        }
        Command::Flashcards { target, count } => {
            let (_, chapter) = ctx.resolve(&target).await?;
            let cards = courses
                .generator()
                .generate_flashcards(&chapter, count, ctx.preferences())
                .await?;
            for card in &cards {
                println!("{}. {}", card.id(), card.front());
                println!("   {}", card.back());
            }
        }
        Command::Quiz {
            target,
            count,
            answers,
        } => {
            let (_, chapter) = ctx.resolve(&target).await?;
            let questions = courses
                .generator()
                .generate_test_questions(&chapter, count, ctx.preferences())
                .await?;
            let mut attempt = QuizAttempt::new(questions);
            if let Some(answers) = answers {
                for (question, choice) in answers.into_iter().enumerate() {
                    attempt.answer(question, choice)?;
                }
            }
            print_quiz(&attempt);
        }
        Command::Ask {
            target,
            question,
            selection,
        } => {
            let (_, chapter) = ctx.resolve(&target).await?;
            let answer = courses
                .generator()
                .answer_question(chapter.study_text(), selection.as_deref(), &question)
                .await?;
            println!("{answer}");
        }
        Command::Prefs(update) => {
            let service = ctx.services.preferences();
            let mut preferences = ctx.preferences.clone();
            if !update.is_empty() {
                apply_update(&mut preferences, update);
                service.save(&ctx.owner, &preferences).await?;
            }
            print_preferences(&preferences);
        }
    }
    Ok(())
}

async fn create(
    ctx: &Context,
    topic: &str,
    status: CourseStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let courses = ctx.services.courses();
    let chapters = courses
        .generator()
        .generate_syllabus(topic, ctx.preferences())
        .await?;
    let course = courses.create_from_syllabus(topic, &chapters, status).await?;
    print_course_line(&course);
    for chapter in course.chapters() {
        print_chapter_line(chapter);
    }
    Ok(())
}

pub fn apply_update(preferences: &mut LearnerPreferences, update: PreferencesUpdate) {
    if let Some(level) = update.education_level {
        preferences.education_level = Some(level);
    }
    if let Some(age) = update.age {
        preferences.age = Some(age);
    }
    if let Some(tone) = update.content_tone {
        preferences.content_tone = Some(tone);
    }
    if let Some(level) = update.experience_level {
        preferences.experience_level = Some(level);
    }
    if let Some(topics) = update.interested_topics {
        preferences.interested_topics = topics;
    }
}

fn print_syllabus(topic: &str, chapters: &[SyllabusChapter]) {
    println!("Syllabus for {topic}:");
    for (index, chapter) in chapters.iter().enumerate() {
        println!("  {}. {}: {}", index + 1, chapter.title, chapter.summary);
    }
}

fn print_course_line(course: &Course) {
    println!(
        "{}  [{}] {} ({}%, {}/{} chapters)",
        course.id(),
        course.status().as_str(),
        course.title(),
        course.progress(),
        course.completed_chapters(),
        course.chapters().len()
    );
}

fn print_chapter_line(chapter: &Chapter) {
    let mark = if chapter.completed() { "x" } else { " " };
    println!("  [{mark}] {}. {}", chapter.position(), chapter.title());
}

fn print_quiz(attempt: &QuizAttempt) {
    for (index, question) in attempt.questions().iter().enumerate() {
        println!("{}. {}", index + 1, question.question());
        for (option_index, option) in question.options().iter().enumerate() {
            let marker = match attempt.answer_for(index) {
                Some(choice) if choice == option_index && question.is_correct(choice) => "+",
                Some(choice) if choice == option_index => "-",
                Some(_) if question.is_correct(option_index) => "*",
                _ => " ",
            };
            println!("   {marker} {}) {option}", option_index + 1);
        }
    }
    if (0..attempt.questions().len()).any(|i| attempt.answer_for(i).is_some()) {
        println!(
            "Score: {}/{} ({}%)",
            attempt.score(),
            attempt.questions().len(),
            attempt.percent()
        );
    }
}

fn print_preferences(preferences: &LearnerPreferences) {
    let show = |value: Option<&str>| value.unwrap_or("-").to_string();
    println!("education:  {}", show(preferences.education_level.as_deref()));
    println!(
        "age:        {}",
        preferences
            .age
            .map_or_else(|| "-".to_string(), |age| age.to_string())
    );
    println!("tone:       {}", show(preferences.content_tone.as_deref()));
    println!("experience: {}", show(preferences.experience_level.as_deref()));
    if preferences.interested_topics.is_empty() {
        println!("topics:     -");
    } else {
        println!("topics:     {}", preferences.interested_topics.join(", "));
    }
}

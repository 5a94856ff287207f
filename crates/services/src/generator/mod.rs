//! AI content generation: syllabus, chapter prose, flashcards, quizzes and
//! tutor answers.

use std::sync::Arc;

use async_trait::async_trait;
use campus_core::model::{Chapter, Flashcard, LearnerPreferences, SyllabusChapter, TestQuestion};
use serde::Deserialize;

use crate::error::GeneratorError;

mod openai;
mod parse;
mod prompts;

pub use openai::{
    DEFAULT_BASE_URL, DEFAULT_CONTENT_MODEL, DEFAULT_SYLLABUS_MODEL, GeneratorConfig,
    OpenAiBackend,
};
pub use parse::{parse_json_array, strip_code_fences};

pub const TEMPERATURE: f32 = 0.7;
pub const SYLLABUS_MAX_TOKENS: u32 = 2000;
pub const CHAPTER_MAX_TOKENS: u32 = 2500;
pub const STUDY_MAX_TOKENS: u32 = 1500;
pub const TUTOR_MAX_TOKENS: u32 = 1000;

/// One chat completion: a system and a user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Transport to a chat-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Returns the trimmed text of the first choice.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` for a missing credential, an upstream failure
    /// or an empty completion.
    async fn complete(&self, request: CompletionRequest) -> Result<String, GeneratorError>;
}

#[derive(Debug, Deserialize)]
struct RawFlashcard {
    #[serde(alias = "question")]
    front: String,
    #[serde(alias = "answer")]
    back: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    #[serde(alias = "correct_answer")]
    correct_answer: usize,
}

/// Builds prompts, calls the backend, and validates what comes back.
#[derive(Clone)]
pub struct ContentGenerator {
    backend: Arc<dyn CompletionBackend>,
    syllabus_model: String,
    content_model: String,
}

impl ContentGenerator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        syllabus_model: impl Into<String>,
        content_model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            syllabus_model: syllabus_model.into(),
            content_model: content_model.into(),
        }
    }

    /// Generator backed by `OpenAiBackend`.
    #[must_use]
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(
            Arc::new(OpenAiBackend::new(config)),
            config.syllabus_model.clone(),
            config.content_model.clone(),
        )
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(&GeneratorConfig::from_env())
    }

    async fn complete(
        &self,
        model: &str,
        prompt: prompts::Prompt,
        max_tokens: u32,
    ) -> Result<String, GeneratorError> {
        self.backend
            .complete(CompletionRequest {
                model: model.to_string(),
                system: prompt.system,
                user: prompt.user,
                temperature: TEMPERATURE,
                max_tokens,
            })
            .await
    }

    /// Proposed chapters for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the call fails, the output is not a JSON
    /// array of `{title, content}`, it is empty, or a title is blank.
    pub async fn generate_syllabus(
        &self,
        topic: &str,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<Vec<SyllabusChapter>, GeneratorError> {
        let raw = self
            .complete(
                &self.syllabus_model,
                prompts::syllabus(topic.trim(), preferences),
                SYLLABUS_MAX_TOKENS,
            )
            .await?;
        let chapters: Vec<SyllabusChapter> = parse_json_array(&raw, "syllabus")?;
        if chapters.is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }
        if let Some(index) = chapters.iter().position(|c| c.title.trim().is_empty()) {
            return Err(GeneratorError::Parse {
                what: "syllabus",
                reason: format!("chapter {index} has no title"),
            });
        }
        tracing::info!(topic, chapters = chapters.len(), "generated syllabus");
        Ok(chapters)
    }

    /// Markdown prose for one chapter.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the call fails or the completion is empty.
    pub async fn generate_chapter_content(
        &self,
        chapter_title: &str,
        summary: &str,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<String, GeneratorError> {
        self.complete(
            &self.content_model,
            prompts::chapter_content(chapter_title, summary, preferences),
            CHAPTER_MAX_TOKENS,
        )
        .await
    }

    /// `count` revision cards for `chapter`, numbered from 1.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the call fails, the output is not an array,
    /// or any card has a blank side.
    pub async fn generate_flashcards(
        &self,
        chapter: &Chapter,
        count: usize,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<Vec<Flashcard>, GeneratorError> {
        let raw = self
            .complete(
                &self.content_model,
                prompts::flashcards(chapter.title(), chapter.study_text(), count, preferences),
                STUDY_MAX_TOKENS,
            )
            .await?;
        let items: Vec<RawFlashcard> = parse_json_array(&raw, "flashcards")?;
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Flashcard::new(item_id(index), chapter.id().clone(), item.front, item.back)
                    .map_err(|source| GeneratorError::Invalid { index, source })
            })
            .collect()
    }

    /// `count` multiple-choice questions for `chapter`, numbered from 1.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the call fails, the output is not an array,
    /// or any question lacks exactly four options or a valid answer index.
    pub async fn generate_test_questions(
        &self,
        chapter: &Chapter,
        count: usize,
        preferences: Option<&LearnerPreferences>,
    ) -> Result<Vec<TestQuestion>, GeneratorError> {
        let raw = self
            .complete(
                &self.content_model,
                prompts::test_questions(chapter.title(), chapter.study_text(), count, preferences),
                STUDY_MAX_TOKENS,
            )
            .await?;
        let items: Vec<RawQuestion> = parse_json_array(&raw, "quiz")?;
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                TestQuestion::new(
                    item_id(index),
                    chapter.id().clone(),
                    item.question,
                    item.options,
                    item.correct_answer,
                )
                .map_err(|source| GeneratorError::Invalid { index, source })
            })
            .collect()
    }

    /// Tutor reply to `question`, focused on `selection` when given.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the call fails or the completion is empty.
    pub async fn answer_question(
        &self,
        context: &str,
        selection: Option<&str>,
        question: &str,
    ) -> Result<String, GeneratorError> {
        self.complete(
            &self.content_model,
            prompts::tutor(context, selection, question),
            TUTOR_MAX_TOKENS,
        )
        .await
    }
}

fn item_id(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::model::{ChapterId, CourseId};
    use std::sync::Mutex;

    /// Replies with a canned completion and records what it was asked.
    struct Canned {
        reply: Result<String, u16>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> CompletionRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl CompletionBackend for Canned {
        async fn complete(&self, request: CompletionRequest) -> Result<String, GeneratorError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(GeneratorError::Upstream {
                    status: *status,
                    message: "You exceeded your current quota".into(),
                }),
            }
        }
    }

    fn generator(backend: Arc<Canned>) -> ContentGenerator {
        ContentGenerator::new(backend, "syllabus-model", "content-model")
    }

    fn chapter() -> Chapter {
        Chapter::new(
            ChapterId::for_position(&CourseId::new("c"), 1),
            "Ownership",
            "Moves and borrows",
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn syllabus_uses_syllabus_model_and_limits() {
        let backend = Canned::ok(
            "```json\n[{\"title\":\"Intro\",\"content\":\"Basics\"},{\"title\":\"Traits\",\"content\":\"Bounds\"}]\n```",
        );
        let chapters = generator(backend.clone())
            .generate_syllabus("Rust", None)
            .await
            .unwrap();
        assert_eq!(chapters[0], SyllabusChapter::new("Intro", "Basics"));
        assert_eq!(chapters.len(), 2);

        let request = backend.last();
        assert_eq!(request.model, "syllabus-model");
        assert_eq!(request.max_tokens, SYLLABUS_MAX_TOKENS);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn syllabus_object_is_rejected() {
        let backend = Canned::ok(r#"{"chapters":[{"title":"Intro"}]}"#);
        let err = generator(backend)
            .generate_syllabus("Rust", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::NotAnArray { .. }));
    }

    #[tokio::test]
    async fn empty_syllabus_is_an_error() {
        let err = generator(Canned::ok("[]"))
            .generate_syllabus("Rust", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::EmptyResponse));
    }

    #[tokio::test]
    async fn upstream_message_is_surfaced() {
        let err = generator(Canned::failing(429))
            .generate_chapter_content("Ownership", "", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("You exceeded your current quota"));
        assert!(matches!(err, GeneratorError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn chapter_content_uses_content_model() {
        let backend = Canned::ok("# Ownership\nEach value has one owner.");
        let text = generator(backend.clone())
            .generate_chapter_content("Ownership", "Moves and borrows", None)
            .await
            .unwrap();
        assert!(text.starts_with("# Ownership"));
        let request = backend.last();
        assert_eq!(request.model, "content-model");
        assert_eq!(request.max_tokens, CHAPTER_MAX_TOKENS);
        assert!(request.user.contains("Moves and borrows"));
    }

    #[tokio::test]
    async fn flashcards_accept_question_answer_aliases() {
        let backend = Canned::ok(
            r#"[{"front":"Owner?","back":"One per value"},{"question":"Borrow?","answer":"A reference"}]"#,
        );
        let cards = generator(backend)
            .generate_flashcards(&chapter(), 2, None)
            .await
            .unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].id(), 2);
        assert_eq!(cards[1].front(), "Borrow?");
        assert_eq!(cards[1].chapter_id(), chapter().id());
    }

    #[tokio::test]
    async fn quiz_with_three_options_fails_whole_call() {
        let backend = Canned::ok(
            r#"[
                {"question":"Q1","options":["a","b","c","d"],"correctAnswer":1},
                {"question":"Q2","options":["a","b","c"],"correctAnswer":0}
            ]"#,
        );
        let err = generator(backend)
            .generate_test_questions(&chapter(), 2, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Invalid { index: 1, .. }));
    }

    #[tokio::test]
    async fn quiz_parses_valid_questions() {
        let backend = Canned::ok(
            r#"[{"question":"Who owns a value?","options":["one","two","none","all"],"correctAnswer":0}]"#,
        );
        let questions = generator(backend.clone())
            .generate_test_questions(&chapter(), 1, None)
            .await
            .unwrap();
        assert!(questions[0].is_correct(0));
        assert_eq!(backend.last().max_tokens, STUDY_MAX_TOKENS);
    }

    #[tokio::test]
    async fn tutor_answer_is_passed_through() {
        let backend = Canned::ok("Because of the borrow checker.");
        let answer = generator(backend.clone())
            .answer_question("chapter text", None, "Why?")
            .await
            .unwrap();
        assert_eq!(answer, "Because of the borrow checker.");
        assert_eq!(backend.last().max_tokens, TUTOR_MAX_TOKENS);
    }
}

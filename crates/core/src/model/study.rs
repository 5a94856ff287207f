use thiserror::Error;

use crate::model::course::progress_percent;
use crate::model::ids::ChapterId;

/// Every quiz question carries exactly this many options.
pub const QUIZ_OPTION_COUNT: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StudyError {
    #[error("flashcard front cannot be empty")]
    EmptyFront,

    #[error("flashcard back cannot be empty")]
    EmptyBack,

    #[error("question text cannot be empty")]
    EmptyQuestion,

    #[error("expected {QUIZ_OPTION_COUNT} options, got {0}")]
    OptionCount(usize),

    #[error("correct answer index {index} is out of range")]
    CorrectAnswerOutOfRange { index: usize },

    #[error("question {0} does not exist in this quiz")]
    UnknownQuestion(usize),

    #[error("option {0} does not exist")]
    UnknownOption(usize),
}

/// A generated two-sided card. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcard {
    id: u32,
    chapter_id: ChapterId,
    front: String,
    back: String,
}

impl Flashcard {
    /// # Errors
    ///
    /// Returns `StudyError` if either side is blank.
    pub fn new(
        id: u32,
        chapter_id: ChapterId,
        front: impl Into<String>,
        back: impl Into<String>,
    ) -> Result<Self, StudyError> {
        let front = front.into().trim().to_string();
        let back = back.into().trim().to_string();
        if front.is_empty() {
            return Err(StudyError::EmptyFront);
        }
        if back.is_empty() {
            return Err(StudyError::EmptyBack);
        }
        Ok(Self {
            id,
            chapter_id,
            front,
            back,
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn chapter_id(&self) -> &ChapterId {
        &self.chapter_id
    }

    #[must_use]
    pub fn front(&self) -> &str {
        &self.front
    }

    #[must_use]
    pub fn back(&self) -> &str {
        &self.back
    }
}

/// A generated multiple-choice question. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestQuestion {
    id: u32,
    chapter_id: ChapterId,
    question: String,
    options: Vec<String>,
    correct_answer: usize,
}

impl TestQuestion {
    /// # Errors
    ///
    /// Returns `StudyError` if the question is blank, there are not exactly
    /// four options, or the correct index points outside them.
    pub fn new(
        id: u32,
        chapter_id: ChapterId,
        question: impl Into<String>,
        options: Vec<String>,
        correct_answer: usize,
    ) -> Result<Self, StudyError> {
        let question = question.into().trim().to_string();
        if question.is_empty() {
            return Err(StudyError::EmptyQuestion);
        }
        if options.len() != QUIZ_OPTION_COUNT {
            return Err(StudyError::OptionCount(options.len()));
        }
        if correct_answer >= options.len() {
            return Err(StudyError::CorrectAnswerOutOfRange {
                index: correct_answer,
            });
        }
        Ok(Self {
            id,
            chapter_id,
            question,
            options,
            correct_answer,
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn chapter_id(&self) -> &ChapterId {
        &self.chapter_id
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_answer(&self) -> usize {
        self.correct_answer
    }

    #[must_use]
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct_answer
    }
}

/// Answers given so far for one run through a set of questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    questions: Vec<TestQuestion>,
    answers: Vec<Option<usize>>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(questions: Vec<TestQuestion>) -> Self {
        let answers = vec![None; questions.len()];
        Self { questions, answers }
    }

    #[must_use]
    pub fn questions(&self) -> &[TestQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn answer_for(&self, question: usize) -> Option<usize> {
        self.answers.get(question).copied().flatten()
    }

    /// Records (or changes) the choice for a question.
    ///
    /// # Errors
    ///
    /// Returns `StudyError` if the question or option index does not exist.
    pub fn answer(&mut self, question: usize, choice: usize) -> Result<bool, StudyError> {
        let q = self
            .questions
            .get(question)
            .ok_or(StudyError::UnknownQuestion(question))?;
        if choice >= q.options.len() {
            return Err(StudyError::UnknownOption(choice));
        }
        self.answers[question] = Some(choice);
        Ok(q.is_correct(choice))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answers.iter().all(Option::is_some)
    }

    /// Number of correctly answered questions; unanswered count as wrong.
    #[must_use]
    pub fn score(&self) -> usize {
        self.questions
            .iter()
            .zip(&self.answers)
            .filter(|(q, a)| a.is_some_and(|choice| q.is_correct(choice)))
            .count()
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        progress_percent(self.score(), self.questions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(ToString::to_string).collect()
    }

    fn question(id: u32, correct: usize) -> TestQuestion {
        TestQuestion::new(id, ChapterId::new("c-1"), format!("Q{id}"), options(), correct).unwrap()
    }

    #[test]
    fn question_requires_four_options() {
        let err = TestQuestion::new(1, ChapterId::new("c-1"), "Q", vec!["a".into()], 0).unwrap_err();
        assert_eq!(err, StudyError::OptionCount(1));
    }

    #[test]
    fn question_rejects_out_of_range_answer() {
        let err = TestQuestion::new(1, ChapterId::new("c-1"), "Q", options(), 4).unwrap_err();
        assert_eq!(err, StudyError::CorrectAnswerOutOfRange { index: 4 });
    }

    #[test]
    fn flashcard_rejects_blank_sides() {
        assert_eq!(
            Flashcard::new(1, ChapterId::new("c-1"), " ", "b").unwrap_err(),
            StudyError::EmptyFront
        );
        assert_eq!(
            Flashcard::new(1, ChapterId::new("c-1"), "a", "").unwrap_err(),
            StudyError::EmptyBack
        );
    }

    #[test]
    fn quiz_scores_correct_answers_only() {
        let mut attempt = QuizAttempt::new(vec![question(1, 0), question(2, 3), question(3, 1)]);
        assert!(attempt.answer(0, 0).unwrap());
        assert!(!attempt.answer(1, 2).unwrap());
        assert!(!attempt.is_complete());
        assert_eq!(attempt.score(), 1);
        assert_eq!(attempt.percent(), 33);

        attempt.answer(1, 3).unwrap();
        attempt.answer(2, 1).unwrap();
        assert!(attempt.is_complete());
        assert_eq!(attempt.percent(), 100);
    }

    #[test]
    fn quiz_rejects_unknown_indexes() {
        let mut attempt = QuizAttempt::new(vec![question(1, 0)]);
        assert_eq!(attempt.answer(5, 0).unwrap_err(), StudyError::UnknownQuestion(5));
        assert_eq!(attempt.answer(0, 9).unwrap_err(), StudyError::UnknownOption(9));
        assert_eq!(attempt.answer_for(0), None);
    }
}

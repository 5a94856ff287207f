mod course;
mod ids;
mod preferences;
mod session;
mod study;
mod syllabus;

pub use ids::{ChapterId, CourseId, ParseIdError, UserId};

pub use course::{Chapter, Course, CourseError, CoursePatch, CourseStatus, progress_percent};
pub use preferences::{LearnerPreferences, PreferencesError};
pub use session::{AuthState, AuthTransition, Session, SessionEvent};
pub use study::{Flashcard, QUIZ_OPTION_COUNT, QuizAttempt, StudyError, TestQuestion};
pub use syllabus::{Syllabus, SyllabusChapter};

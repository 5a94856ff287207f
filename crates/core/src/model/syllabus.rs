use serde::{Deserialize, Serialize};

/// One proposed chapter of a syllabus, before any course exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusChapter {
    pub title: String,
    /// Overview of what the chapter covers. Completion services call this `content`.
    #[serde(alias = "content", default)]
    pub summary: String,
}

impl SyllabusChapter {
    #[must_use]
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
        }
    }
}

/// A generated syllabus waiting to be accepted as a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syllabus {
    pub topic: String,
    pub chapters: Vec<SyllabusChapter>,
}

impl Syllabus {
    #[must_use]
    pub fn new(topic: impl Into<String>, chapters: Vec<SyllabusChapter>) -> Self {
        Self {
            topic: topic.into(),
            chapters,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_content_field_from_completion_output() {
        let chapter: SyllabusChapter =
            serde_json::from_str(r#"{"title":"Intro","content":"Basics"}"#).unwrap();
        assert_eq!(chapter, SyllabusChapter::new("Intro", "Basics"));
    }
}

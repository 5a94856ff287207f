//! Prompt text sent to the completion service.

use campus_core::model::LearnerPreferences;

/// Characters of chapter prose quoted back as context.
const CONTEXT_LIMIT: usize = 6000;

pub(crate) struct Prompt {
    pub system: String,
    pub user: String,
}

fn with_hint(system: &str, preferences: Option<&LearnerPreferences>) -> String {
    match preferences.and_then(LearnerPreferences::prompt_hint) {
        Some(hint) => format!("{system}\n\n{hint}"),
        None => system.to_string(),
    }
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(CONTEXT_LIMIT) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub(crate) fn syllabus(topic: &str, preferences: Option<&LearnerPreferences>) -> Prompt {
    Prompt {
        system: with_hint(
            "You are an expert educational content creator specialized in creating \
             comprehensive course syllabi. Structure your response as a JSON array without \
             any additional text.",
            preferences,
        ),
        user: format!(
            "Create a detailed syllabus for learning about \"{topic}\".\n\
             Return a JSON array of chapters, where each chapter has a \"title\" and \
             \"content\" field. The content should be a comprehensive overview of what will \
             be covered in that chapter.\n\
             Include 8-12 chapters that cover the topic thoroughly from beginner to advanced \
             concepts.\n\
             Format your response ONLY as a valid JSON array, with no additional explanations \
             or text outside the JSON."
        ),
    }
}

pub(crate) fn chapter_content(
    chapter_title: &str,
    summary: &str,
    preferences: Option<&LearnerPreferences>,
) -> Prompt {
    let overview = if summary.trim().is_empty() {
        String::new()
    } else {
        format!("\nThe chapter should cover: {}\n", summary.trim())
    };
    Prompt {
        system: with_hint(
            "You are an expert educational content creator specialized in creating \
             comprehensive, engaging and educational content. Format your response with clear \
             headings, paragraphs, and use proper markdown for any mathematical formulas, code \
             blocks, or specialized notation.",
            preferences,
        ),
        user: format!(
            "Create detailed educational content for a chapter titled \"{chapter_title}\".\n\
             {overview}\
             Include:\n\
             - Clear explanations of key concepts\n\
             - Examples to illustrate points\n\
             - Any relevant mathematical formulas (use proper LaTeX notation)\n\
             - Key takeaways\n\n\
             The content should be educational, engaging and comprehensive."
        ),
    }
}

pub(crate) fn flashcards(
    chapter_title: &str,
    material: &str,
    count: usize,
    preferences: Option<&LearnerPreferences>,
) -> Prompt {
    Prompt {
        system: with_hint(
            "You are an expert teacher who writes concise revision flashcards. Respond only \
             with a JSON array.",
            preferences,
        ),
        user: format!(
            "Write {count} flashcards for the chapter \"{chapter_title}\".\n\
             Each element must be an object with a \"front\" (a short question or term) and a \
             \"back\" (a short answer).\n\
             Base them on this material:\n{}\n\n\
             Format your response ONLY as a valid JSON array.",
            clip(material)
        ),
    }
}

pub(crate) fn test_questions(
    chapter_title: &str,
    material: &str,
    count: usize,
    preferences: Option<&LearnerPreferences>,
) -> Prompt {
    Prompt {
        system: with_hint(
            "You are an expert examiner who writes multiple-choice questions. Respond only \
             with a JSON array.",
            preferences,
        ),
        user: format!(
            "Write {count} multiple-choice questions about the chapter \"{chapter_title}\".\n\
             Each element must be an object with \"question\", \"options\" (exactly 4 strings) \
             and \"correctAnswer\" (the 0-based index of the right option).\n\
             Base them on this material:\n{}\n\n\
             Format your response ONLY as a valid JSON array.",
            clip(material)
        ),
    }
}

pub(crate) fn tutor(context: &str, selection: Option<&str>, question: &str) -> Prompt {
    let system = match selection {
        Some(selected) => format!(
            "You are a helpful AI tutor. The user has selected the following text and has a \
             question about it: \"{selected}\". Answer their question while focusing on this \
             specific text."
        ),
        None => {
            let topic: String = context.chars().take(100).collect();
            format!(
                "You are a helpful AI tutor. The user is learning about the following topic: \
                 \"{topic}...\". Help them understand any concepts they're struggling with."
            )
        }
    };
    Prompt {
        system,
        user: format!(
            "Context: {}\n\nQuestion: {question}",
            clip(selection.unwrap_or(context))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_extend_the_system_prompt() {
        let prefs = LearnerPreferences {
            content_tone: Some("Casual".into()),
            ..LearnerPreferences::default()
        };
        let prompt = syllabus("Rust", Some(&prefs));
        assert!(prompt.system.contains("Casual"));
        assert!(prompt.user.contains("\"Rust\""));

        let plain = syllabus("Rust", Some(&LearnerPreferences::default()));
        assert!(!plain.system.contains("\n\n"));
    }

    #[test]
    fn tutor_focuses_on_selection() {
        let prompt = tutor("Long chapter text", Some("borrow checker"), "Why?");
        assert!(prompt.system.contains("\"borrow checker\""));
        assert!(prompt.user.starts_with("Context: borrow checker"));
        assert!(prompt.user.ends_with("Question: Why?"));
    }

    #[test]
    fn material_is_clipped() {
        let long = "x".repeat(CONTEXT_LIMIT + 50);
        assert_eq!(clip(&long).len(), CONTEXT_LIMIT);
        assert_eq!(clip("short"), "short");
    }
}

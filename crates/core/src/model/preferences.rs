use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PreferencesError {
    #[error("age must be between 5 and 120, got {0}")]
    InvalidAge(u16),
}

/// What the learner told us about themselves; shapes generated content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerPreferences {
    #[serde(default)]
    pub education_level: Option<String>,
    #[serde(default)]
    pub age: Option<u16>,
    #[serde(default)]
    pub content_tone: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub interested_topics: Vec<String>,
}

impl LearnerPreferences {
    /// # Errors
    ///
    /// Returns `PreferencesError::InvalidAge` for implausible ages.
    pub fn validate(&self) -> Result<(), PreferencesError> {
        match self.age {
            Some(age) if !(5..=120).contains(&age) => Err(PreferencesError::InvalidAge(age)),
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompt_hint().is_none()
    }

    /// One-paragraph description of the learner for a system prompt.
    ///
    /// Returns `None` when nothing was filled in.
    #[must_use]
    pub fn prompt_hint(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(level) = non_blank(self.education_level.as_deref()) {
            parts.push(format!("education level: {level}"));
        }
        if let Some(age) = self.age {
            parts.push(format!("age: {age}"));
        }
        if let Some(level) = non_blank(self.experience_level.as_deref()) {
            parts.push(format!("experience with the subject: {level}"));
        }
        if let Some(tone) = non_blank(self.content_tone.as_deref()) {
            parts.push(format!("preferred tone: {tone}"));
        }
        let topics: Vec<&str> = self
            .interested_topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !topics.is_empty() {
            parts.push(format!("interests: {}", topics.join(", ")));
        }

        if parts.is_empty() {
            None
        } else {
            Some(format!(
                "Tailor the material to this learner ({}).",
                parts.join("; ")
            ))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_preferences_produce_no_hint() {
        let prefs = LearnerPreferences {
            education_level: Some("  ".into()),
            ..LearnerPreferences::default()
        };
        assert!(prefs.prompt_hint().is_none());
        assert!(prefs.is_empty());
    }

    #[test]
    fn hint_lists_filled_fields() {
        let prefs = LearnerPreferences {
            education_level: Some("Undergraduate".into()),
            content_tone: Some("Casual".into()),
            interested_topics: vec!["Physics".into(), "Mathematics".into()],
            ..LearnerPreferences::default()
        };
        let hint = prefs.prompt_hint().unwrap();
        assert!(hint.contains("education level: Undergraduate"));
        assert!(hint.contains("preferred tone: Casual"));
        assert!(hint.contains("interests: Physics, Mathematics"));
        assert!(!hint.contains("age"));
    }

    #[test]
    fn age_is_validated() {
        let prefs = LearnerPreferences {
            age: Some(3),
            ..LearnerPreferences::default()
        };
        assert_eq!(prefs.validate(), Err(PreferencesError::InvalidAge(3)));
    }
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A quiz question as held by a match room for the duration of one match.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// Identifier assigned by the content service.
    pub id: String,
    /// Text shown to both players.
    pub prompt: String,
    /// Presentation kind together with the answer key.
    pub kind: QuestionKind,
    /// Difficulty between 1 and 5.
    pub difficulty: u8,
    /// Optional illustration for image questions.
    pub image_url: Option<String>,
}

/// Presentation kind of a question, carrying the answer key.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionKind {
    /// Pick one of the listed options.
    MultipleChoice {
        /// Ordered options shown to players.
        options: Vec<String>,
        /// Index of the correct option.
        correct_index: usize,
    },
    /// Decide whether the statement is true; option 0 is "True", 1 is "False".
    TrueFalse {
        /// Whether the statement is true.
        correct: bool,
    },
    /// Type a number; answers within `tolerance` of `correct` are accepted.
    Numeric {
        /// Expected value.
        correct: f64,
        /// Accepted absolute deviation.
        tolerance: f64,
    },
}

/// Answer submitted by a player: an option index or a typed number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnswerChoice {
    /// Index into the option list (multiple choice and true/false).
    Option(usize),
    /// Free numeric value (numeric questions).
    Value(f64),
}

impl AnswerChoice {
    fn as_value(self) -> f64 {
        match self {
            AnswerChoice::Option(index) => index as f64,
            AnswerChoice::Value(value) => value,
        }
    }
}

/// Correct answer disclosed when a question closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum CorrectAnswer {
    /// Index of the correct option.
    Option(usize),
    /// Expected numeric value.
    Value(f64),
}

impl Question {
    /// Options displayed to the players; empty for numeric questions.
    pub fn options(&self) -> Vec<String> {
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. } => options.clone(),
            QuestionKind::TrueFalse { .. } => vec!["True".into(), "False".into()],
            QuestionKind::Numeric { .. } => Vec::new(),
        }
    }

    /// Wire name of the presentation kind.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            QuestionKind::MultipleChoice { .. } => "multiple_choice",
            QuestionKind::TrueFalse { .. } => "true_false",
            QuestionKind::Numeric { .. } => "numeric",
        }
    }

    /// Check a submitted answer against the answer key.
    pub fn is_correct(&self, choice: AnswerChoice) -> bool {
        match (&self.kind, choice) {
            (QuestionKind::MultipleChoice { correct_index, .. }, AnswerChoice::Option(index)) => {
                index == *correct_index
            }
            (QuestionKind::TrueFalse { correct }, AnswerChoice::Option(index)) => {
                (index == 0) == *correct && index <= 1
            }
            (QuestionKind::Numeric { correct, tolerance }, choice) => {
                (choice.as_value() - correct).abs() <= *tolerance
            }
            _ => false,
        }
    }

    /// Answer key in the form revealed to clients.
    pub fn correct_answer(&self) -> CorrectAnswer {
        match &self.kind {
            QuestionKind::MultipleChoice { correct_index, .. } => {
                CorrectAnswer::Option(*correct_index)
            }
            QuestionKind::TrueFalse { correct } => CorrectAnswer::Option(if *correct { 0 } else { 1 }),
            QuestionKind::Numeric { correct, .. } => CorrectAnswer::Value(*correct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(kind: QuestionKind) -> Question {
        Question {
            id: "q-1".into(),
            prompt: "prompt".into(),
            kind,
            difficulty: 2,
            image_url: None,
        }
    }

    #[test]
    fn multiple_choice_accepts_only_the_key() {
        let q = question(QuestionKind::MultipleChoice {
            options: vec!["8".into(), "7".into()],
            correct_index: 0,
        });
        assert!(q.is_correct(AnswerChoice::Option(0)));
        assert!(!q.is_correct(AnswerChoice::Option(1)));
        assert!(!q.is_correct(AnswerChoice::Value(0.5)));
        assert_eq!(q.correct_answer(), CorrectAnswer::Option(0));
    }

    #[test]
    fn true_false_maps_option_zero_to_true() {
        let q = question(QuestionKind::TrueFalse { correct: false });
        assert!(q.is_correct(AnswerChoice::Option(1)));
        assert!(!q.is_correct(AnswerChoice::Option(0)));
        assert!(!q.is_correct(AnswerChoice::Option(3)));
        assert_eq!(q.options(), vec!["True".to_string(), "False".to_string()]);
    }

    #[test]
    fn numeric_uses_tolerance() {
        let q = question(QuestionKind::Numeric {
            correct: 12.0,
            tolerance: 0.5,
        });
        assert!(q.is_correct(AnswerChoice::Option(12)));
        assert!(q.is_correct(AnswerChoice::Value(12.4)));
        assert!(!q.is_correct(AnswerChoice::Value(13.0)));
        assert!(q.options().is_empty());
    }

    #[test]
    fn untagged_choice_parses_integers_as_options() {
        let choice: AnswerChoice = serde_json::from_str("2").unwrap();
        assert_eq!(choice, AnswerChoice::Option(2));
        let choice: AnswerChoice = serde_json::from_str("2.5").unwrap();
        assert_eq!(choice, AnswerChoice::Value(2.5));
    }
}

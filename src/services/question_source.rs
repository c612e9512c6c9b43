//! Question content collaborator.
//!
//! Rooms never wait on the network directly: [`load_questions`] bounds the
//! fetch with a timeout and always returns a playable sequence, falling back to
//! a built-in arithmetic set when the content service misbehaves.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::ContentSettings,
    state::question::{Question, QuestionKind},
};

/// Failures of the content service. Always recovered by the fallback set.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to build question client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to request questions from `{url}`")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("question service responded with status {status}")]
    Status { status: StatusCode },
    #[error("failed to decode question payload")]
    Decode {
        #[source]
        source: reqwest::Error,
    },
    #[error("question service returned no usable questions")]
    Empty,
    #[error("question fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid question `{id}`: {reason}")]
    InvalidQuestion { id: String, reason: &'static str },
}

/// Source of question sequences for a grade level.
pub trait QuestionSource: Send + Sync {
    fn fetch(&self, grade: u8, count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>>;
}

/// Content service reached over HTTP: `GET {base}/api/questions?grade=&limit=`.
#[derive(Clone)]
pub struct HttpQuestionSource {
    client: Client,
    base_url: Arc<str>,
}

impl HttpQuestionSource {
    pub fn new(settings: &ContentSettings) -> Result<Self, ContentError> {
        let client = Client::builder()
            .timeout(settings.fetch_timeout)
            .build()
            .map_err(|source| ContentError::ClientBuilder { source })?;
        Ok(Self {
            client,
            base_url: Arc::from(settings.base_url.trim_end_matches('/')),
        })
    }
}

impl QuestionSource for HttpQuestionSource {
    fn fetch(&self, grade: u8, count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>> {
        let source = self.clone();
        Box::pin(async move {
            let url = format!("{}/api/questions", source.base_url);
            let response = source
                .client
                .get(&url)
                .query(&[("grade", grade.to_string()), ("limit", count.to_string())])
                .send()
                .await
                .map_err(|source| ContentError::Request {
                    url: url.clone(),
                    source,
                })?;

            if !response.status().is_success() {
                return Err(ContentError::Status {
                    status: response.status(),
                });
            }

            let payload = response
                .json::<QuestionsResponse>()
                .await
                .map_err(|source| ContentError::Decode { source })?;
            let questions = parse_questions(payload.questions);
            if questions.is_empty() {
                return Err(ContentError::Empty);
            }
            Ok(questions)
        })
    }
}

/// Fetch `count` questions, never returning fewer than `min`.
///
/// Errors, empty answers and timeouts fall back to the built-in set; short
/// sequences are padded with built-in questions.
pub async fn load_questions(
    source: Arc<dyn QuestionSource>,
    grade: u8,
    count: usize,
    min: usize,
    timeout: Duration,
) -> Vec<Question> {
    let fetched = match tokio::time::timeout(timeout, source.fetch(grade, count)).await {
        Ok(Ok(questions)) => {
            info!(grade, loaded = questions.len(), "loaded questions from content service");
            questions
        }
        Ok(Err(err)) => {
            warn!(grade, error = %err, "question fetch failed; using fallback questions");
            Vec::new()
        }
        Err(_) => {
            warn!(grade, error = %ContentError::Timeout(timeout), "question fetch failed; using fallback questions");
            Vec::new()
        }
    };
    complete_sequence(fetched, count, min)
}

fn complete_sequence(mut questions: Vec<Question>, count: usize, min: usize) -> Vec<Question> {
    let min = min.max(1);
    questions.truncate(count.max(min));
    if questions.len() < min {
        let missing = min - questions.len();
        debug!(missing, "padding question sequence with fallback questions");
        questions.extend(fallback_questions(missing));
    }
    questions
}

/// Built-in arithmetic questions, repeated as needed to reach `count`.
pub fn fallback_questions(count: usize) -> Vec<Question> {
    FALLBACK
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(index, (prompt, options, difficulty))| {
            // Rotate so the key does not always sit at the same position.
            let correct_index = index % options.len();
            let mut options: Vec<String> = options.iter().map(|option| (*option).to_string()).collect();
            options.rotate_right(correct_index);
            Question {
                id: format!("fb-{}", index + 1),
                prompt: (*prompt).to_string(),
                kind: QuestionKind::MultipleChoice {
                    options,
                    correct_index,
                },
                difficulty: *difficulty,
                image_url: None,
            }
        })
        .collect()
}

// The first option of each entry is the correct one.
const FALLBACK: [(&str, [&str; 4], u8); 10] = [
    ("Was ist 5 + 3?", ["8", "7", "9", "6"], 1),
    ("Was ist 10 - 4?", ["6", "5", "7", "8"], 1),
    ("Was ist 2 × 5?", ["10", "8", "12", "7"], 2),
    ("Was ist 15 + 5?", ["20", "18", "22", "19"], 2),
    ("Was ist 20 - 8?", ["12", "10", "14", "11"], 2),
    ("Was ist 6 + 7?", ["13", "12", "14", "11"], 2),
    ("Was ist 18 - 9?", ["9", "8", "10", "7"], 2),
    ("Was ist 5 × 2?", ["10", "8", "12", "7"], 2),
    ("Was ist 25 + 5?", ["30", "28", "32", "29"], 2),
    ("Was ist 16 - 7?", ["9", "8", "10", "11"], 2),
];

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<Value>,
}

/// Question shapes served by the content service.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ApiQuestion {
    #[serde(rename_all = "camelCase")]
    MultipleChoice {
        id: String,
        question: String,
        answers: Vec<String>,
        correct_index: usize,
        #[serde(default = "default_difficulty")]
        difficulty: u8,
    },
    #[serde(rename_all = "camelCase")]
    TrueFalse {
        id: String,
        statement: String,
        correct: bool,
        #[serde(default = "default_difficulty")]
        difficulty: u8,
    },
    #[serde(rename_all = "camelCase")]
    NumberInput {
        id: String,
        question: String,
        correct_answer: f64,
        #[serde(default)]
        tolerance: Option<f64>,
        #[serde(default = "default_difficulty")]
        difficulty: u8,
    },
    #[serde(rename_all = "camelCase")]
    ImageQuestion {
        id: String,
        question: String,
        image_url: String,
        answers: Vec<String>,
        correct_index: usize,
        #[serde(default = "default_difficulty")]
        difficulty: u8,
    },
}

fn default_difficulty() -> u8 {
    1
}

impl TryFrom<ApiQuestion> for Question {
    type Error = ContentError;

    fn try_from(value: ApiQuestion) -> Result<Self, Self::Error> {
        let question = match value {
            ApiQuestion::MultipleChoice {
                id,
                question,
                answers,
                correct_index,
                difficulty,
            } => {
                check_options(&id, &answers, correct_index)?;
                Question {
                    id,
                    prompt: question,
                    kind: QuestionKind::MultipleChoice {
                        options: answers,
                        correct_index,
                    },
                    difficulty,
                    image_url: None,
                }
            }
            ApiQuestion::TrueFalse {
                id,
                statement,
                correct,
                difficulty,
            } => Question {
                id,
                prompt: statement,
                kind: QuestionKind::TrueFalse { correct },
                difficulty,
                image_url: None,
            },
            ApiQuestion::NumberInput {
                id,
                question,
                correct_answer,
                tolerance,
                difficulty,
            } => Question {
                id,
                prompt: question,
                kind: QuestionKind::Numeric {
                    correct: correct_answer,
                    tolerance: tolerance.unwrap_or(0.0).abs(),
                },
                difficulty,
                image_url: None,
            },
            ApiQuestion::ImageQuestion {
                id,
                question,
                image_url,
                answers,
                correct_index,
                difficulty,
            } => {
                check_options(&id, &answers, correct_index)?;
                Question {
                    id,
                    prompt: question,
                    kind: QuestionKind::MultipleChoice {
                        options: answers,
                        correct_index,
                    },
                    difficulty,
                    image_url: Some(image_url),
                }
            }
        };
        Ok(question)
    }
}

fn check_options(id: &str, answers: &[String], correct_index: usize) -> Result<(), ContentError> {
    if answers.len() < 2 {
        return Err(ContentError::InvalidQuestion {
            id: id.to_string(),
            reason: "fewer than two answers",
        });
    }
    if correct_index >= answers.len() {
        return Err(ContentError::InvalidQuestion {
            id: id.to_string(),
            reason: "correct index out of range",
        });
    }
    Ok(())
}

/// Keep every question that decodes and validates; skip the rest.
fn parse_questions(raw: Vec<Value>) -> Vec<Question> {
    raw.into_iter()
        .filter_map(|value| {
            let parsed = serde_json::from_value::<ApiQuestion>(value)
                .map_err(|err| debug!(error = %err, "skipping undecodable question"))
                .ok()?;
            Question::try_from(parsed)
                .map_err(|err| debug!(error = %err, "skipping invalid question"))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::question::AnswerChoice;

    struct FixedSource(Result<Vec<Question>, ()>);

    impl QuestionSource for FixedSource {
        fn fetch(&self, _grade: u8, _count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>> {
            let result = self.0.clone().map_err(|_| ContentError::Empty);
            Box::pin(async move { result })
        }
    }

    struct SlowSource;

    impl QuestionSource for SlowSource {
        fn fetch(&self, _grade: u8, _count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(fallback_questions(15))
            })
        }
    }

    #[test]
    fn parses_every_known_question_shape() {
        let raw = vec![
            json!({"id": "a", "type": "multiple-choice", "question": "1+1?", "answers": ["2", "3"], "correctIndex": 0, "difficulty": 1}),
            json!({"id": "b", "type": "true-false", "statement": "2 > 1", "correct": true}),
            json!({"id": "c", "type": "number-input", "question": "3*4?", "correctAnswer": 12, "tolerance": 0.5}),
            json!({"id": "d", "type": "image-question", "question": "Count", "imageUrl": "http://img", "answers": ["1", "2"], "correctIndex": 1}),
        ];
        let questions = parse_questions(raw);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[1].kind, QuestionKind::TrueFalse { correct: true });
        assert!(questions[2].is_correct(AnswerChoice::Value(12.3)));
        assert_eq!(questions[3].image_url.as_deref(), Some("http://img"));
    }

    #[test]
    fn invalid_and_unknown_questions_are_skipped() {
        let raw = vec![
            json!({"id": "a", "type": "multiple-choice", "question": "?", "answers": ["x", "y"], "correctIndex": 5}),
            json!({"id": "b", "type": "drag-and-drop", "question": "?"}),
            json!({"id": "c", "type": "true-false", "statement": "ok", "correct": false}),
        ];
        let questions = parse_questions(raw);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].id, "c");
    }

    #[test]
    fn fallback_cycles_with_unique_ids() {
        let questions = fallback_questions(12);
        assert_eq!(questions.len(), 12);
        assert_eq!(questions[10].prompt, questions[0].prompt);
        assert_eq!(questions[11].id, "fb-12");
        assert!(questions[0].is_correct(AnswerChoice::Option(0)));
        assert!(questions[1].is_correct(AnswerChoice::Option(1)));
        assert!(questions[3].is_correct(AnswerChoice::Option(3)));
        assert!(questions[4].is_correct(AnswerChoice::Option(0)));
    }

    #[tokio::test]
    async fn failure_falls_back_to_the_minimum_count() {
        let source: Arc<dyn QuestionSource> = Arc::new(FixedSource(Err(())));
        let questions = load_questions(source, 3, 15, 10, Duration::from_secs(1)).await;
        assert_eq!(questions.len(), 10);
        assert_eq!(questions[0].id, "fb-1");
    }

    #[tokio::test]
    async fn short_sequences_are_padded() {
        let source: Arc<dyn QuestionSource> = Arc::new(FixedSource(Ok(fallback_questions(3)
            .into_iter()
            .map(|mut q| {
                q.id = format!("api-{}", q.id);
                q
            })
            .collect())));
        let questions = load_questions(source, 3, 15, 10, Duration::from_secs(1)).await;
        assert_eq!(questions.len(), 10);
        assert!(questions[..3].iter().all(|q| q.id.starts_with("api-")));
        assert!(questions[3..].iter().all(|q| q.id.starts_with("fb-")));
    }

    #[tokio::test]
    async fn long_sequences_are_truncated_to_the_requested_count() {
        let source: Arc<dyn QuestionSource> = Arc::new(FixedSource(Ok(fallback_questions(20))));
        let questions = load_questions(source, 3, 15, 10, Duration::from_secs(1)).await;
        assert_eq!(questions.len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sources_time_out() {
        let source: Arc<dyn QuestionSource> = Arc::new(SlowSource);
        let questions = load_questions(source, 3, 15, 10, Duration::from_secs(5)).await;
        assert_eq!(questions.len(), 10);
    }
}

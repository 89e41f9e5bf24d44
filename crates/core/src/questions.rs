use crate::error::BackendError;
use crate::models::{GeneratedQuestion, Mcq};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_QUESTION_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "אתה יוצר שאלות קצרות לבחינה בעברית מתוך טקסט משפטי. \n\
\n\
כל שאלה חייבת להיות:\n\
- שאלה אמריקאית עם 4 אפשרויות תשובה\n\
- אחת מהאפשרויות היא הנכונה\n\
- השאלה והאפשרויות בעברית\n\
- השאלה מבוססת אך ורק על הטקסט שסופק\n\
- השאלה קצרה וברורה\n\
\n\
החזר JSON בפורמט:\n\
{\n\
  \"stem\": \"טקסט השאלה\",\n\
  \"options\": [\"אפשרות 1\", \"אפשרות 2\", \"אפשרות 3\", \"אפשרות 4\"],\n\
  \"correct_index\": 0,\n\
  \"explanation\": \"הסבר קצר למה התשובה נכונה\"\n\
}";

fn user_prompt(block_text: &str) -> String {
    format!(
        "צור שאלה אמריקאית אחת בעברית מתוך הטקסט הבא:\n\n{block_text}\n\n\
         השאלה חייבת להיות מבוססת אך ורק על הטקסט שסופק. \
         אל תיצור שאלות על נושאים שלא מופיעים בטקסט."
    )
}

/// The language-model seam. `Ok(None)` means the model answered but the
/// output failed structural validation; the caller skips the block.
#[async_trait]
pub trait QuestionGenerator {
    async fn generate(&self, block_text: &str) -> Result<Option<Mcq>, BackendError>;
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint
/// with a JSON response format.
pub struct OpenAiQuestionGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiQuestionGenerator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_QUESTION_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl QuestionGenerator for OpenAiQuestionGenerator {
    async fn generate(&self, block_text: &str) -> Result<Option<Mcq>, BackendError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_prompt(block_text) },
                ],
                "temperature": 0.1,
                "response_format": { "type": "json_object" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "chat-completions".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: ChatResponse = response.json().await?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);

        Ok(content.as_deref().and_then(parse_mcq))
    }
}

/// Structural validation of model output: JSON with a stem, exactly four
/// options, and a correct index in `0..4`. Explanation is optional.
pub fn parse_mcq(content: &str) -> Option<Mcq> {
    let value: Value = serde_json::from_str(content).ok()?;

    let stem = value.get("stem")?.as_str()?.to_string();

    let options = value.get("options")?.as_array()?;
    if options.len() != 4 {
        return None;
    }
    let options = options
        .iter()
        .map(|option| option.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;

    let correct_index = value.get("correct_index")?.as_u64()? as usize;
    if correct_index >= 4 {
        return None;
    }

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(Mcq {
        stem,
        options,
        correct_index,
        explanation,
    })
}

/// Composes the stored question from a validated MCQ. The reference suffix
/// is built here, in code, never by the model.
pub fn compose_question_with_reference(
    mcq: &Mcq,
    section_hint: Option<&str>,
    page_number: u32,
    block_id: &str,
    source_block_sha: String,
) -> GeneratedQuestion {
    let ref_title = section_hint
        .filter(|hint| !hint.trim().is_empty())
        .unwrap_or("הספר")
        .to_string();

    GeneratedQuestion {
        block_id: block_id.to_string(),
        question: format!("{} (ראו: {ref_title})", mcq.stem),
        ref_title,
        ref_note: format!("עמ׳ {page_number}"),
        choices: mcq.options.clone(),
        correct_index: mcq.correct_index,
        explanation: mcq.explanation.clone(),
        source_block_sha,
    }
}

#[cfg(test)]
mod tests {
    use super::{compose_question_with_reference, parse_mcq};
    use crate::models::Mcq;

    fn valid_payload() -> String {
        r#"{
            "stem": "מהי תקופת ההתיישנות?",
            "options": ["שנה", "שלוש שנים", "שבע שנים", "עשר שנים"],
            "correct_index": 2,
            "explanation": "כקבוע בטקסט"
        }"#
        .to_string()
    }

    #[test]
    fn valid_output_parses() {
        let mcq = parse_mcq(&valid_payload()).expect("payload is structurally valid");
        assert_eq!(mcq.stem, "מהי תקופת ההתיישנות?");
        assert_eq!(mcq.options.len(), 4);
        assert_eq!(mcq.correct_index, 2);
        assert_eq!(mcq.explanation, "כקבוע בטקסט");
    }

    #[test]
    fn wrong_option_count_is_rejected() {
        let payload = r#"{"stem":"ש","options":["א","ב","ג"],"correct_index":0}"#;
        assert!(parse_mcq(payload).is_none());
    }

    #[test]
    fn out_of_range_correct_index_is_rejected() {
        let payload = r#"{"stem":"ש","options":["א","ב","ג","ד"],"correct_index":4}"#;
        assert!(parse_mcq(payload).is_none());
    }

    #[test]
    fn missing_stem_is_rejected() {
        let payload = r#"{"options":["א","ב","ג","ד"],"correct_index":1}"#;
        assert!(parse_mcq(payload).is_none());
    }

    #[test]
    fn explanation_is_optional() {
        let payload = r#"{"stem":"ש","options":["א","ב","ג","ד"],"correct_index":1}"#;
        let mcq = parse_mcq(payload).expect("explanation may be absent");
        assert_eq!(mcq.explanation, "");
    }

    #[test]
    fn non_json_output_is_rejected() {
        assert!(parse_mcq("not json at all").is_none());
    }

    fn sample_mcq() -> Mcq {
        Mcq {
            stem: "מה קובע הסעיף?".to_string(),
            options: vec![
                "א".to_string(),
                "ב".to_string(),
                "ג".to_string(),
                "ד".to_string(),
            ],
            correct_index: 1,
            explanation: "הסבר".to_string(),
        }
    }

    #[test]
    fn reference_is_appended_in_code() {
        let question = compose_question_with_reference(
            &sample_mcq(),
            Some("חוק העונשין §34"),
            12,
            "p12-b03",
            "abc123".to_string(),
        );

        assert_eq!(question.question, "מה קובע הסעיף? (ראו: חוק העונשין §34)");
        assert_eq!(question.ref_title, "חוק העונשין §34");
        assert_eq!(question.ref_note, "עמ׳ 12");
        assert_eq!(question.block_id, "p12-b03");
        assert_eq!(question.source_block_sha, "abc123");
    }

    #[test]
    fn empty_hint_falls_back_to_book_reference() {
        let question =
            compose_question_with_reference(&sample_mcq(), Some("  "), 3, "p3-b00", "s".to_string());
        assert_eq!(question.ref_title, "הספר");
        assert!(question.question.ends_with("(ראו: הספר)"));
    }
}

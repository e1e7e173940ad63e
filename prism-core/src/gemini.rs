//! Image understanding and prompt writing backed by a hosted vision/language model.

use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use image::DynamicImage;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    encode_png, Error, Result, ANALYSIS_PROMPTS, CAPTION_PROMPTS, ENHANCE_PROMPTS,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

const SUGGEST_EDITS_PROMPT: &str = "Analyze this image and suggest specific edits that could improve it.\n\
Provide suggestions in these categories:\n\
1. Color adjustments (brightness, contrast, saturation)\n\
2. Composition improvements (cropping, straightening)\n\
3. Object removal or addition\n\
4. Style enhancements\n\
5. Background modifications\n\n\
Format your response as actionable suggestions.";

const EXTRACT_OBJECTS_PROMPT: &str = "List all the main objects and elements visible in this image. \
Provide just a comma-separated list.";

const PALETTE_PROMPT: &str = "Analyze the color palette of this image and provide:\n\
1. The dominant colors (name and approximate hex values)\n\
2. The overall color harmony (complementary, analogous, etc.)\n\
3. Suggested color adjustments to improve the image\n\
4. Alternative color schemes that would work well\n\n\
Format the response clearly with color names and hex codes.";

const COMPARE_PROMPT: &str = "Compare these two images and describe:\n\
1. Main differences\n\
2. Which aspects are better in each\n\
3. Overall comparison\n\n\
Be specific and objective.";

/// One piece of a multimodal prompt.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    Image(DynamicImage),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis: String,
    pub analysis_type: &'static str,
}

/// A hosted model that answers a text-and-image prompt with text.
///
/// Implementors supply [`generate`](Self::generate); the task methods build the
/// prompts and post-process the answers.
#[async_trait]
pub trait VisionLanguage: Send + Sync {
    async fn generate(&self, parts: Vec<Part>) -> Result<String>;

    async fn analyze_image(&self, image: DynamicImage, analysis_type: Option<&str>) -> Result<Analysis> {
        let (analysis_type, prompt) = ANALYSIS_PROMPTS.resolve(analysis_type);
        let analysis = self
            .generate(vec![Part::Text(prompt.to_string()), Part::Image(image)])
            .await?;
        Ok(Analysis {
            analysis,
            analysis_type,
        })
    }

    async fn generate_caption(&self, image: DynamicImage, style: Option<&str>) -> Result<String> {
        let (_, prompt) = CAPTION_PROMPTS.resolve(style);
        let caption = self
            .generate(vec![Part::Text(prompt.to_string()), Part::Image(image)])
            .await?;
        Ok(caption.trim().to_string())
    }

    async fn enhance_prompt(&self, prompt: &str, context: Option<&str>) -> Result<String> {
        let (_, template) = ENHANCE_PROMPTS.resolve(context);
        let text = self
            .generate(vec![Part::Text(template.replace("{prompt}", prompt))])
            .await?;
        Ok(strip_quotes(&text))
    }

    async fn suggest_edits(&self, image: DynamicImage) -> Result<String> {
        self.generate(vec![
            Part::Text(SUGGEST_EDITS_PROMPT.to_string()),
            Part::Image(image),
        ])
        .await
    }

    async fn extract_objects(&self, image: DynamicImage) -> Result<Vec<String>> {
        let text = self
            .generate(vec![
                Part::Text(EXTRACT_OBJECTS_PROMPT.to_string()),
                Part::Image(image),
            ])
            .await?;
        Ok(split_list(&text))
    }

    async fn generate_negative_prompt(&self, prompt: &str) -> Result<String> {
        let text = self
            .generate(vec![Part::Text(format!(
                "Given this image generation prompt: \"{prompt}\"\n\n\
                 Generate a comprehensive negative prompt that lists things to avoid in the generation.\n\
                 Include common unwanted elements like: bad quality, distortion, artifacts, etc.\n\n\
                 Negative prompt (provide ONLY the negative prompt, no explanations):"
            ))])
            .await?;
        Ok(strip_quotes(&text))
    }

    async fn suggest_color_palette(&self, image: DynamicImage) -> Result<String> {
        self.generate(vec![Part::Text(PALETTE_PROMPT.to_string()), Part::Image(image)])
            .await
    }

    async fn compare_images(&self, first: DynamicImage, second: DynamicImage) -> Result<String> {
        self.generate(vec![
            Part::Text(COMPARE_PROMPT.to_string()),
            Part::Image(first),
            Part::Image(second),
        ])
        .await
    }

    async fn generate_image_prompt(&self, description: &str, style: &str) -> Result<String> {
        let text = self
            .generate(vec![Part::Text(format!(
                "Create a detailed image generation prompt for Stable Diffusion based on this description:\n\
                 \"{description}\"\n\n\
                 Style: {style}\n\n\
                 Generate a comprehensive prompt that includes:\n\
                 - Main subject with details\n\
                 - Style specifications\n\
                 - Lighting and atmosphere\n\
                 - Quality tags\n\
                 - Technical details\n\n\
                 Prompt (provide ONLY the prompt, no explanations):"
            ))])
            .await?;
        Ok(strip_quotes(&text))
    }
}

/// Trims whitespace, then any wrapping double and single quotes.
pub fn strip_quotes(text: &str) -> String {
    text.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string()
}

fn split_list(text: &str) -> Vec<String> {
    text.trim()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Client for the `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

fn encode_parts(parts: Vec<Part>) -> Result<Vec<Value>> {
    parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => Ok(json!({ "text": text })),
            Part::Image(image) => Ok(json!({
                "inlineData": {
                    "mimeType": "image/png",
                    "data": BASE64_STANDARD.encode(encode_png(&image)?),
                }
            })),
        })
        .collect()
}

/// Concatenates the text parts of the first candidate.
fn extract_text(payload: &Value) -> Result<String> {
    if let Some(message) = payload.pointer("/error/message").and_then(Value::as_str) {
        return Err(Error::external(format!("gemini: {message}")));
    }
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = payload
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            Error::external(format!("gemini returned no text ({reason})"))
        })?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        return Err(Error::external("gemini returned an empty answer"));
    }
    Ok(text)
}

/// Turns a `generateContent` response into its answer text. Failed statuses are
/// reported with the status even when the body is not JSON.
fn parse_response(status: StatusCode, body: &str) -> Result<String> {
    let payload = serde_json::from_str::<Value>(body);
    if !status.is_success() {
        let detail = payload
            .ok()
            .and_then(|p| p.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(Error::external(format!("gemini returned {status}: {}", detail.trim())));
    }
    let payload =
        payload.map_err(|e| Error::external(format!("gemini returned invalid JSON: {e}")))?;
    extract_text(&payload)
}

#[async_trait]
impl VisionLanguage for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String> {
        let parts = tokio::task::spawn_blocking(move || encode_parts(parts))
            .await
            .map_err(Error::external)??;
        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Error::external)?;
        let status = response.status();
        let body = response.text().await.map_err(Error::external)?;
        if !status.is_success() {
            tracing::warn!(%status, model = %self.model, "gemini request rejected");
        }
        parse_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn text_parts_are_concatenated() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "a red " }, { "text": "bicycle" }] }
            }]
        });
        assert_eq!(extract_text(&payload).unwrap(), "a red bicycle");
    }

    #[test]
    fn api_errors_and_blocked_prompts_fail() {
        let err = json!({ "error": { "code": 400, "message": "API key not valid" } });
        assert!(matches!(extract_text(&err), Err(Error::ExternalCallFailed(m)) if m.contains("API key")));
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(extract_text(&blocked), Err(Error::ExternalCallFailed(m)) if m.contains("SAFETY")));
    }

    #[test]
    fn failed_status_is_reported_with_non_json_bodies() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>upstream timed out</html>");
        assert!(
            matches!(err, Err(Error::ExternalCallFailed(m)) if m.contains("502") && m.contains("upstream"))
        );

        let body = r#"{"error": {"code": 403, "message": "API key not valid"}}"#;
        let err = parse_response(StatusCode::FORBIDDEN, body);
        assert!(matches!(err, Err(Error::ExternalCallFailed(m)) if m.contains("403") && m.contains("API key")));

        let ok = r#"{"candidates": [{"content": {"parts": [{"text": "a harbour"}]}}]}"#;
        assert_eq!(parse_response(StatusCode::OK, ok).unwrap(), "a harbour");
    }

    #[test]
    fn endpoint_accepts_prefixed_models() {
        let client = GeminiClient::new("k").with_api_base("http://localhost:9/v1beta/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
        let client = client.with_model("models/gemini-1.5-pro");
        assert!(client.endpoint().ends_with("/models/gemini-1.5-pro:generateContent"));
    }

    #[test]
    fn quotes_and_lists_are_cleaned() {
        assert_eq!(strip_quotes("  \"cinematic, 35mm\"\n"), "cinematic, 35mm");
        assert_eq!(strip_quotes("'soft light'"), "soft light");
        assert_eq!(split_list("cat, sofa ,lamp,\n"), vec!["cat", "sofa", "lamp"]);
    }

    struct Echo(Mutex<Vec<String>>, &'static str);

    #[async_trait]
    impl VisionLanguage for Echo {
        async fn generate(&self, parts: Vec<Part>) -> Result<String> {
            for part in parts {
                if let Part::Text(t) = part {
                    self.0.lock().unwrap().push(t);
                }
            }
            Ok(self.1.to_string())
        }
    }

    #[tokio::test]
    async fn unknown_keys_use_default_prompts() {
        let vl = Echo(Mutex::new(Vec::new()), "\"a bright harbour\"");
        let img = DynamicImage::new_rgb8(8, 8);

        let analysis = vl.analyze_image(img, Some("forensic")).await.unwrap();
        assert_eq!(analysis.analysis_type, "detailed");

        let enhanced = vl.enhance_prompt("harbour", Some("nonsense")).await.unwrap();
        assert_eq!(enhanced, "a bright harbour");
        let sent = vl.0.lock().unwrap();
        assert!(sent[1].contains("Original prompt: \"harbour\""));
    }
}

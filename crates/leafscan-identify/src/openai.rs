use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::{Identification, IdentifyError, PlantIdentifier};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Where photos are assumed to be taken unless configured otherwise.
pub const DEFAULT_REGION: &str = "the UK";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 500;

const ROLE_PROMPT: &str = "You are a professional botanist, tree and plant identification expert. \
Analyze the leaf in the image and provide detailed information in JSON format of what plant, shrub or tree it belongs to.";

const FALLBACK_PROMPT: &str = "If you cannot identify it with reasonable confidence, \
still provide your best guess but lower the confidence score accordingly.";

const FORMAT_PROMPT: &str = r#"Response format:
{
  "scientificName": "Scientific name of the tree or plant",
  "commonName": "Common name of the tree or plant",
  "family": "Tree or plant family",
  "origin": "Geographic origin",
  "lightRequirements": "Light requirements description",
  "watering": "Watering instructions",
  "specialFeatures": "Notable characteristics or care tips",
  "confidence": number between 1-100
}"#;

/// Vision model behind an OpenAI-compatible chat completions endpoint.
pub struct OpenAiIdentifier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    region: String,
}

impl OpenAiIdentifier {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, IdentifyError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            region: DEFAULT_REGION.to_string(),
        })
    }

    /// Tell the model where the photos are taken, to narrow the candidates.
    pub fn with_region(mut self, region: Option<String>) -> Self {
        if let Some(region) = region {
            self.region = region;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn system_prompt(region: &str) -> String {
    format!(
        "{} The image was taken in {}. {}\n\n{}",
        ROLE_PROMPT, region, FALLBACK_PROMPT, FORMAT_PROMPT
    )
}

fn user_prompt(aroma_level: Option<u8>) -> String {
    let mut text =
        String::from("Please identify this tree, shrub or plant and provide details about it.");
    if let Some(level) = aroma_level {
        text.push_str(&format!(
            " The user rated the leaf's aroma intensity as {}/10 (where 0 is no smell and 10 is very strong). \
             Consider this aroma information in your identification and include relevant scent-related \
             details in the specialFeatures if applicable.",
            level
        ));
    }
    text
}

fn build_request(model: &str, region: &str, image_data: &str, aroma_level: Option<u8>) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt(region) },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": user_prompt(aroma_level) },
                    { "type": "image_url", "image_url": { "url": image_data } }
                ]
            }
        ],
        "response_format": { "type": "json_object" },
        "max_tokens": MAX_TOKENS
    })
}

/// Pull the JSON answer out of the first choice. An empty answer is treated
/// as `{}` and normalized to defaults.
fn parse_completion(completion: ChatCompletionResponse) -> Result<Identification, IdentifyError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| IdentifyError::MalformedResponse("no choices in response".into()))?;

    let content = choice.message.content.unwrap_or_default();
    let content = if content.trim().is_empty() { "{}" } else { content.as_str() };

    let value: Value = serde_json::from_str(content)
        .map_err(|e| IdentifyError::MalformedResponse(format!("answer is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(IdentifyError::MalformedResponse("answer is not a JSON object".into()));
    }

    Ok(Identification::from_model_json(&value))
}

#[async_trait]
impl PlantIdentifier for OpenAiIdentifier {
    async fn identify(
        &self,
        image_data: &str,
        aroma_level: Option<u8>,
    ) -> Result<Identification, IdentifyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = build_request(&self.model, &self.region, image_data, aroma_level);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .inspect_err(|e| error!("Identification request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Identification service returned {}: {}", status, body);
            return Err(IdentifyError::Status { status, body });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| IdentifyError::MalformedResponse(e.to_string()))?;

        let identification = parse_completion(completion)?;
        debug!(
            "Identified {} ({}) with confidence {}",
            identification.scientific_name, identification.common_name, identification.confidence
        );
        Ok(identification)
    }
}

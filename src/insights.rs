use polars::prelude::DataFrame;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::dataset;
use crate::domain::{DashConfig, GenerationError};

const STORE_CONTEXT: &str = "This is data from a fashion retail store which has purchase, sales, and stocks datasets. ";

pub trait TextGenerator {
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;
}

/// Client for an OpenAI compatible `chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: &DashConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.api_base.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        }
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}chat/completions", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

impl TextGenerator for ChatCompletionsClient {
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": max_tokens,
        });

        debug!("Requesting completion from {} ({} prompt bytes)", self.model, prompt.len());
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text()?;
        let answer = parse_completion(&text)?;
        info!("Received completion with {} characters", answer.len());
        Ok(answer)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|_| GenerationError::InvalidResponse)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .ok_or(GenerationError::InvalidResponse)
}

pub fn sales_prompt(sales: &DataFrame) -> Result<String, GenerationError> {
    let records = dataset::to_records_json(sales)?;
    Ok(format!(
        "{STORE_CONTEXT}\
         Below is a JSON representation of sales data. \
         As a retail expert, analyze the data and provide insights on trends, performance, and opportunities for improvement. \
         Your response should include specific brand names and actionable insights based on the monthly quantities.\n\n\
         Sales Data JSON:\n{records}"
    ))
}

pub fn executive_prompt(sales: &DataFrame, stock: &DataFrame) -> Result<String, GenerationError> {
    let sales_records = dataset::to_records_json(sales)?;
    let stock_records = dataset::to_records_json(stock)?;
    Ok(format!(
        "{STORE_CONTEXT}\
         Below are JSON representations of sales and inventory data. \
         As a retail expert, analyze the data and provide detailed insights on trends, performance, stock levels, and opportunities for improvement. \
         Your response should include specific brand names, categories mentioned in the data, and actionable insights based on the quantities.\n\n\
         Sales Data JSON:\n{sales_records}\n\nInventory Data JSON:\n{stock_records}"
    ))
}

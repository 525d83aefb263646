//! OpenAI兼容的向量模型客户端
//!
//! 错误映射是失败分类的依据：4xx内容类错误为内容致命，
//! 限流和5xx为瞬时错误。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trainer_core::{EmbeddingConfig, EmbeddingError, Result};
use trainer_domain::{Embedding, EmbeddingProvider};

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: EmbeddingUsage,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingUsage {
    total_tokens: u64,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model,
                input: [text],
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let err = match status.as_u16() {
                // 模型明确拒绝请求内容，重试无意义
                400 | 413 | 422 => EmbeddingError::InvalidRequest {
                    status: status.as_u16(),
                    message,
                },
                429 => EmbeddingError::RateLimited,
                code if code >= 500 => EmbeddingError::Unavailable(message),
                code => EmbeddingError::Unknown(format!("状态码 {code}: {message}")),
            };
            return Err(err.into());
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Unknown(format!("响应解析失败: {e}")))?;

        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Unknown("返回的向量列表为空".to_string()))?;

        Ok(Embedding {
            vector,
            tokens: body.usage.total_tokens,
        })
    }
}

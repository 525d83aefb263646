//! 平台协作方的HTTP客户端：余额、计费、通知
//!
//! 三者共用账户服务的地址与凭证。计费与通知的失败以错误返回，
//! 由调用方决定是否尽力而为。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use trainer_core::{Result, ServicesConfig, TrainerError};
use trainer_domain::{
    BalanceService, BillingReporter, Notification, NotificationService, UsageReport,
};

fn build_client(config: &ServicesConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
        .unwrap_or_default()
}

/// 余额检查客户端
///
/// 账户服务返回 402 表示余额不足，其余非2xx视为服务不可用。
pub struct HttpBalanceService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBalanceService {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            client: build_client(config),
            base_url: config.account_base_url.trim_end_matches('/').to_string(),
            api_key: config.account_api_key.clone(),
        }
    }
}

#[derive(Serialize)]
struct BalanceCheckRequest<'a> {
    #[serde(rename = "teamId")]
    team_id: &'a str,
}

#[async_trait]
impl BalanceService for HttpBalanceService {
    async fn check_balance(&self, team_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/balance/check", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&BalanceCheckRequest { team_id })
            .send()
            .await
            .map_err(|e| TrainerError::BalanceUnavailable(e.to_string()))?;

        match response.status().as_u16() {
            code if (200..300).contains(&code) => Ok(()),
            402 => Err(TrainerError::InsufficientBalance {
                team_id: team_id.to_string(),
            }),
            code => Err(TrainerError::BalanceUnavailable(format!("状态码 {code}"))),
        }
    }
}

/// 计费上报客户端
pub struct HttpBillingReporter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBillingReporter {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            client: build_client(config),
            base_url: config.account_base_url.trim_end_matches('/').to_string(),
            api_key: config.account_api_key.clone(),
        }
    }
}

#[async_trait]
impl BillingReporter for HttpBillingReporter {
    async fn report_usage(&self, report: UsageReport) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/usage/report", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&report)
            .send()
            .await
            .map_err(|e| TrainerError::Billing(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TrainerError::Billing(format!(
                "状态码 {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// 站内通知客户端
pub struct HttpNotificationService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpNotificationService {
    pub fn new(config: &ServicesConfig) -> Self {
        Self {
            client: build_client(config),
            base_url: config.account_base_url.trim_end_matches('/').to_string(),
            api_key: config.account_api_key.clone(),
        }
    }
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/api/notification/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&notification)
            .send()
            .await
            .map_err(|e| TrainerError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TrainerError::Notification(format!(
                "状态码 {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 系统配置
///
/// 加载顺序：默认值 -> TOML配置文件 -> 环境变量覆盖（前缀 TRAINER_）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub embedding: EmbeddingConfig,
    pub intake: IntakeConfig,
    pub services: ServicesConfig,
}

/// 任务存储驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// PostgreSQL持久化存储
    Postgres,
    /// 内存存储，用于嵌入式部署和测试
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Postgres,
            url: "postgresql://localhost/kb_trainer".to_string(),
            max_connections: 10,
            connect_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Worker标识，为空时使用主机名
    pub worker_id: String,
    /// 单进程最大并发向量生成数
    pub vector_max_process: usize,
    /// 任务租约窗口（秒），超过后任务可被重新认领
    pub lease_window_seconds: i64,
    /// 瞬时失败后的固定重试延迟（毫秒）
    pub retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: String::new(),
            vector_max_process: 10,
            lease_window_seconds: 60,
            retry_delay_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn lease_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_window_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// 向量模型服务地址（OpenAI兼容接口）
    pub endpoint: String,
    pub api_key: String,
    /// 向量模型名称
    pub model: String,
    /// 向量模型最大token窗口
    pub max_token: usize,
    /// QA拆分模型名称
    pub qa_model: String,
    /// QA模型最大上下文
    pub qa_max_context: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "text-embedding-ada-002".to_string(),
            max_token: 3000,
            qa_model: "gpt-3.5-turbo-16k".to_string(),
            qa_max_context: 16000,
        }
    }
}

impl EmbeddingConfig {
    /// chunk模式的token上限：向量模型窗口的1.5倍
    pub fn chunk_token_ceiling(&self) -> usize {
        (self.max_token as f64 * 1.5) as usize
    }

    /// qa模式的token上限：QA模型上下文的0.8倍
    pub fn qa_token_ceiling(&self) -> usize {
        (self.qa_max_context as f64 * 0.8) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// 单次提交的最大记录数
    pub max_batch_size: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 200,
        }
    }
}

/// 平台协作方服务配置（余额、计费、通知）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// 账户服务地址，为空时使用内置空实现（嵌入式部署）
    pub account_base_url: String,
    pub account_api_key: String,
    /// 协作方调用超时（秒）
    pub request_timeout_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            account_base_url: String::new(),
            account_api_key: String::new(),
            request_timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {path}"));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/trainer.toml", "trainer.toml"];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        // 环境变量覆盖（前缀 TRAINER_），优先级最高
        builder = builder.add_source(
            Environment::with_prefix("TRAINER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.worker.vector_max_process == 0 {
            return Err(anyhow::anyhow!("worker.vector_max_process 必须大于0"));
        }
        if self.worker.lease_window_seconds <= 0 {
            return Err(anyhow::anyhow!("worker.lease_window_seconds 必须大于0"));
        }
        if self.intake.max_batch_size == 0 {
            return Err(anyhow::anyhow!("intake.max_batch_size 必须大于0"));
        }
        if self.database.driver == DatabaseDriver::Postgres && self.database.url.is_empty() {
            return Err(anyhow::anyhow!("database.url 不能为空"));
        }
        if self.api.enabled && self.api.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "api.bind_address 格式非法: {}",
                self.api.bind_address
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker.vector_max_process, 10);
        assert_eq!(config.worker.lease_window_seconds, 60);
        assert_eq!(config.intake.max_batch_size, 200);
    }

    #[test]
    fn test_token_ceilings() {
        let embedding = EmbeddingConfig {
            max_token: 3000,
            qa_max_context: 16000,
            ..EmbeddingConfig::default()
        };
        assert_eq!(embedding.chunk_token_ceiling(), 4500);
        assert_eq!(embedding.qa_token_ceiling(), 12800);
    }

    #[test]
    fn test_validate_rejects_zero_max_process() {
        let mut config = AppConfig::default();
        config.worker.vector_max_process = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_bind_address() {
        let mut config = AppConfig::default();
        config.api.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").expect("创建临时文件失败");
        writeln!(
            file,
            r#"
[worker]
vector_max_process = 3
lease_window_seconds = 30

[database]
driver = "memory"
"#
        )
        .expect("写入临时文件失败");

        let config =
            AppConfig::load(Some(file.path().to_str().expect("临时路径非UTF-8"))).expect("加载失败");
        assert_eq!(config.worker.vector_max_process, 3);
        assert_eq!(config.worker.lease_window_seconds, 30);
        assert_eq!(config.database.driver, DatabaseDriver::Memory);
        // 未覆盖的部分保持默认值
        assert_eq!(config.intake.max_batch_size, 200);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/trainer.toml")).is_err());
    }
}

//! Configuração do cloudwait carregada a partir de `cloudwait.toml`.
//!
//! A struct [`WaitConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `CLOUDWAIT_TOKEN` e `CLOUDWAIT_ENDPOINT` têm
//! precedência sobre o arquivo; flags da CLI têm precedência sobre ambas.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::client::DEFAULT_ENDPOINT;
use crate::poller::{PollPolicy, Poller, RetryPolicy};

/// Configuração de nível superior carregada de `cloudwait.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct WaitConfig {
    /// Token da API.
    #[serde(default)]
    pub token: String,

    /// URL base da API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Intervalo base entre consultas de status, em milissegundos.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Jitter máximo somado ao intervalo, em milissegundos.
    #[serde(default = "default_poll_jitter_ms")]
    pub poll_jitter_ms: u64,

    /// Máximo de retentativas de uma consulta que falhou na rede ou no servidor.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Teto do atraso entre retentativas, em milissegundos.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Tempo máximo de espera em segundos; ausente significa sem limite.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

// Valor padrão para o intervalo de polling: 500ms.
fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_jitter_ms() -> u64 {
    100
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            endpoint: default_endpoint(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_jitter_ms: default_poll_jitter_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            timeout_secs: None,
        }
    }
}

impl WaitConfig {
    /// Carrega a configuração de `cloudwait.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("cloudwait.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Como [`WaitConfig::load_from`], lendo variáveis de ambiente por `env`.
    fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<WaitConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
        if let Some(token) = env("CLOUDWAIT_TOKEN")
            && !token.is_empty()
        {
            config.token = token;
        }
        if let Some(endpoint) = env("CLOUDWAIT_ENDPOINT")
            && !endpoint.is_empty()
        {
            config.endpoint = endpoint;
        }

        Ok(config)
    }

    /// Aplica as flags `--timeout` e `--poll-interval-ms`, que vencem arquivo e ambiente.
    pub fn apply_flags(&mut self, timeout_secs: Option<u64>, poll_interval_ms: Option<u64>) {
        if let Some(secs) = timeout_secs {
            self.timeout_secs = Some(secs);
        }
        if let Some(ms) = poll_interval_ms {
            self.poll_interval_ms = ms;
        }
    }

    /// Monta o [`Poller`] a partir dos intervalos configurados.
    pub fn poller(&self) -> Poller {
        Poller::new(
            PollPolicy {
                interval: Duration::from_millis(self.poll_interval_ms),
                jitter: Duration::from_millis(self.poll_jitter_ms),
            },
            RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

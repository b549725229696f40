//! Tipos de erro para o cliente da API de ações.
//!
//! Define [`ApiError`] com variantes para autenticação, rate limiting, erros
//! da API, falhas de rede e respostas ilegíveis. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao consultar o status de ações na API.
///
/// Estes erros dizem respeito à *consulta* em si, nunca ao resultado de uma
/// ação: uma ação que termina com `error` é um estado normal, não um `ApiError`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token ausente, inválido ou sem permissão (HTTP 401/403).
    #[error("unauthorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// O servidor retornou HTTP 429 (rate limit).
    /// O campo `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Qualquer outro erro HTTP, com o código e a mensagem do corpo da resposta.
    #[error("API error (status {status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// O corpo da resposta não pôde ser interpretado.
    #[error("failed to decode API response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Indica se vale a pena repetir a consulta.
    ///
    /// Falhas transitórias (rede, 429, 5xx) são repetidas; erros de
    /// autenticação, outros 4xx e respostas ilegíveis não mudam com o tempo.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited { .. } | ApiError::Network(_) => true,
            ApiError::Api { status, .. } => *status >= 500,
            ApiError::Unauthorized { .. } | ApiError::Decode(_) => false,
        }
    }

    /// Atraso mínimo sugerido pelo servidor, quando houver.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

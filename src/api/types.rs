//! Tipos de dados das respostas do endpoint de ações.
//!
//! As structs derivam `Deserialize` para o formato JSON retornado por
//! `GET /actions` e `GET /actions/{id}`, incluindo o envelope de erro comum
//! a todos os endpoints da API.

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Resposta de `GET /actions?id=...`: lista de ações e metadados de paginação.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionListResponse {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

/// Resposta de `GET /actions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: Action,
}

/// Metadados opcionais da resposta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub next_page: Option<u32>,
    #[serde(default)]
    pub total_entries: Option<u32>,
}

/// Envelope de erro retornado pela API em respostas não-2xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Código e mensagem legíveis do erro.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

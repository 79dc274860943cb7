//! Read-only view of the loaded email templates.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::template::LEGACY_ALIASES;

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<String>,
    pub total: usize,
    pub aliases: Vec<AliasInfo>,
}

#[derive(Debug, Serialize)]
pub struct AliasInfo {
    pub from: &'static str,
    pub to: &'static str,
    pub active: bool,
}

/// GET /api/v1/templates
pub async fn list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let registry = state.dispatcher.templates();
    let templates: Vec<String> = registry.names().into_iter().map(str::to_string).collect();
    let aliases = LEGACY_ALIASES
        .iter()
        .map(|&(from, to)| AliasInfo {
            from,
            to,
            active: !registry.contains(from) && registry.contains(to),
        })
        .collect();

    Json(TemplateListResponse {
        total: templates.len(),
        templates,
        aliases,
    })
}

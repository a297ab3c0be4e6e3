use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::observability::metrics;
use crate::substitution::{Registration, Substitution, SubstitutionChain};

pub async fn list_substitutions(State(chain): State<SubstitutionChain>) -> Json<Vec<Substitution>> {
    Json(chain.list())
}

pub async fn register_substitution(
    State(chain): State<SubstitutionChain>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => return form_error(e),
    };

    let mut key = None;
    let mut value = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return form_error(e),
        };

        let name = field.name().map(str::to_string);
        let text = match field.text().await {
            Ok(text) => text,
            Err(e) => return form_error(e),
        };

        match name.as_deref() {
            Some("key") if key.is_none() => key = Some(text),
            Some("value") if value.is_none() => value = Some(text),
            _ => {}
        }
    }

    let (Some(key), Some(value)) = (key.filter(|k| !k.is_empty()), value.filter(|v| !v.is_empty())) else {
        return (StatusCode::BAD_REQUEST, "both key and value must be supplied").into_response();
    };

    match chain.register(Substitution::new(key.clone(), value)) {
        Registration::Appended(index) => {
            tracing::info!(key = %key, index, "Substitution variable added")
        }
        Registration::Replaced(index) => {
            tracing::info!(key = %key, index, "Substitution variable replaced")
        }
    }
    metrics::record_substitution_write();

    StatusCode::OK.into_response()
}

fn form_error(e: impl std::fmt::Display) -> Response {
    tracing::warn!(error = %e, "Rejected substitution form");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("error parsing input form: {e}"),
    )
        .into_response()
}

//! Management API.
//!
//! `GET /substitution-variables` lists the chain; `POST` registers one
//! key/value pair from a multipart form.

pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::substitution::SubstitutionChain;
use self::handlers::*;

pub const SUBSTITUTION_VARIABLES_PATH: &str = "/substitution-variables";

pub fn admin_router(chain: SubstitutionChain) -> Router {
    Router::new()
        .route(
            SUBSTITUTION_VARIABLES_PATH,
            get(list_substitutions).post(register_substitution),
        )
        .with_state(chain)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id_layer())
}

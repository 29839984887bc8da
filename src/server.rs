//! REST API for embedstore.
//!
//! Provides JSON endpoints over a shared [`IngestPipeline`]. The pipeline is
//! handed to the app as `web::Data<AppState>`, so every server (and every
//! test) owns its own store.
//!
//! ## Endpoints
//!
//! - `GET /ready` - Health check
//! - `POST /insert` - Embed and store a text
//! - `POST /similarity` - Return the stored texts most similar to a text
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actix_web::{App, HttpServer, web};
//! use embedstore::{HttpEmbeddingProvider, IngestPipeline, RetryPolicy, RetryingEmbedder, VectorStore};
//! use embedstore::server::AppState;
//! use std::sync::Arc;
//!
//! #[actix_web::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = HttpEmbeddingProvider::new("http://localhost:9000/embed", std::time::Duration::from_secs(30))?;
//!     let embedder = RetryingEmbedder::new(Arc::new(provider), RetryPolicy::default());
//!     let pipeline = IngestPipeline::new(embedder, VectorStore::open("data/embeddings.json")?);
//!     let state = web::Data::new(AppState::new(pipeline, 5));
//!
//!     HttpServer::new(move || App::new().app_data(state.clone()).configure(embedstore::server::config))
//!         .bind("127.0.0.1:8000")?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::pipeline::IngestPipeline;

/// Shared per-server state.
pub struct AppState {
    pub pipeline: IngestPipeline,
    pub default_top_k: usize,
}

impl AppState {
    pub fn new(pipeline: IngestPipeline, default_top_k: usize) -> Self {
        Self { pipeline, default_top_k }
    }
}

// --- Request structs ---

#[derive(Deserialize)]
struct InsertRequest {
    text: String,
}

#[derive(Deserialize)]
struct SimilarityRequest {
    text: String,
    top_k: Option<usize>,
}

// --- Response structs ---

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct InsertResponse {
    message: String,
    id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Client mistakes are 400, everything else is the service's fault.
fn error_response(e: &Error) -> HttpResponse {
    let body = ErrorResponse { detail: e.to_string() };
    if e.is_client_error() {
        HttpResponse::BadRequest().json(body)
    } else {
        HttpResponse::InternalServerError().json(body)
    }
}

// --- Handlers ---

async fn ready_handler() -> impl Responder {
    HttpResponse::Ok().json(MessageResponse { message: "Ready".to_string() })
}

async fn insert_handler(state: web::Data<AppState>, body: web::Json<InsertRequest>) -> impl Responder {
    debug!(chars = body.text.chars().count(), "received insert request");

    match state.pipeline.process_text(&body.text).await {
        Ok(id) => {
            info!(%id, "data inserted");
            HttpResponse::Ok().json(InsertResponse {
                message: "Data inserted successfully".to_string(),
                id,
            })
        }
        Err(e) => {
            warn!(error = %e, "insert failed");
            error_response(&e)
        }
    }
}

async fn similarity_handler(state: web::Data<AppState>, body: web::Json<SimilarityRequest>) -> impl Responder {
    let top_k = body.top_k.unwrap_or(state.default_top_k);
    debug!(top_k, "received similarity request");

    match state.pipeline.search(&body.text, top_k).await {
        Ok(matches) => {
            let texts: Vec<String> = matches.into_iter().map(|m| m.text).collect();
            HttpResponse::Ok().json(texts)
        }
        Err(e) => {
            warn!(error = %e, "similarity search failed");
            // The query is not stored, so nothing here is the client's fault
            HttpResponse::InternalServerError().json(ErrorResponse { detail: e.to_string() })
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ready").route(web::get().to(ready_handler)))
       .service(web::resource("/insert").route(web::post().to(insert_handler)))
       .service(web::resource("/similarity").route(web::post().to(similarity_handler)));
}

//! API integration tests for the explorer endpoints.
//!
//! Tests verify:
//! - Read endpoints for documents, state and views
//! - State changes through PUT endpoints
//! - Dataset reloads and encoder model selection
//! - Slide embedding through the full pipeline
//! - Peer messages
//! - Error responses (status codes and JSON bodies)

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;

use slide_explorer::embedding::HttpInferenceRuntime;
use slide_explorer::explorer::Explorer;
use slide_explorer::slide::RasterImageSource;
use slide_explorer::{create_router, AppState, RouterConfig};

use super::test_utils::{
    black_square_slide, get, post, put, sample_documents, test_embedder, write_temp_file,
    ChannelMeanRuntime, TEST_MODEL_SERVER,
};

fn explorer() -> Explorer {
    Explorer::new(sample_documents(), Some("site".to_string())).unwrap()
}

/// Router without slide embedding.
fn read_only_router() -> Router {
    let state: AppState<RasterImageSource, HttpInferenceRuntime> = AppState::new(explorer());
    create_router(state, RouterConfig::new().with_tracing(false))
}

/// Router whose embedder serves `mem://square`.
fn embedding_router(runtime: ChannelMeanRuntime) -> Router {
    let source = RasterImageSource::new().with_image("mem://square", black_square_slide());
    let state = AppState::new(explorer())
        .with_embedder(test_embedder(source, runtime), TEST_MODEL_SERVER)
        .with_default_num_patches(3);
    create_router(state, RouterConfig::new())
}

// =============================================================================
// Read Endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = read_only_router();
    let (status, body) = get(&router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_documents() {
    let router = read_only_router();

    let (status, body) = get(&router, "/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["documents"][1]["properties"]["site"], "breast");
    assert_eq!(body["documents"][2]["index"], 2);

    let (status, body) = get(&router, "/documents/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embedding3d"], json!([0.9, 0.1, 0.0]));
}

#[tokio::test]
async fn test_state_and_views() {
    let router = read_only_router();

    let (status, state) = get(&router, "/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["documentCount"], 3);
    assert_eq!(state["focusDocument"], 0);
    assert_eq!(state["measure"], "cosine_similarity");
    assert_eq!(state["colorBy"], "site");

    let (status, table) = get(&router, "/views/table").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(table["focusIndex"], 0);
    assert_eq!(table["measure"], "similarity");
    assert_eq!(table["columns"], json!(["site", "similarity"]));
    let order: Vec<_> = table["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["documentIndex"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 2, 1]);

    let (status, view) = get(&router, "/views/explorer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["points"].as_array().unwrap().len(), 3);
    assert_eq!(view["points"][0]["size"], 50);
    assert_eq!(view["points"][1]["size"], 15);
    assert_eq!(view["legend"].as_array().unwrap().len(), 2);
}

// =============================================================================
// State Changes
// =============================================================================

#[tokio::test]
async fn test_change_focus_and_measure() {
    let router = read_only_router();

    let (status, state) = put(&router, "/state/focus", json!({ "index": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["focusDocument"], 1);
    assert_eq!(state["compareDocument"], json!([1]));

    let (status, state) = put(
        &router,
        "/state/measure",
        json!({ "measure": "euclidean_distance" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["measure"], "euclidean_distance");

    let (_, table) = get(&router, "/views/table").await;
    assert_eq!(table["focusIndex"], 1);
    assert_eq!(table["measure"], "distance");
    assert_eq!(table["rows"][0]["displayScore"], 0.0);
}

#[tokio::test]
async fn test_change_compare_and_color() {
    let router = read_only_router();

    let (status, state) = put(&router, "/state/compare", json!({ "indices": [1, 2] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["compareDocument"], json!([1, 2]));

    let (status, state) = put(&router, "/state/color-by", json!({ "colorBy": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(state["colorBy"].is_null());

    let (_, view) = get(&router, "/views/explorer").await;
    assert!(view["legend"].as_array().unwrap().is_empty());
    assert_eq!(view["points"][2]["borderWidth"], 5);
}

// =============================================================================
// Slide Embedding
// =============================================================================

#[tokio::test]
async fn test_embed_slide_adds_focus_document() {
    let runtime = ChannelMeanRuntime::new();
    let router = embedding_router(runtime.clone());

    let (status, body) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "mem://square", "label": "lung", "seed": 11 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["index"], 3);
    assert_eq!(body["sourceRef"], "mem://square");
    assert_eq!(body["dimension"], 3);
    assert_eq!(body["patchCount"], 3);
    assert_eq!(body["regions"][0]["topX"], 0);
    assert_eq!(runtime.run_count(), 3);

    let (_, state) = get(&router, "/state").await;
    assert_eq!(state["documentCount"], 4);
    assert_eq!(state["focusDocument"], 3);

    let (_, document) = get(&router, "/documents/3").await;
    assert_eq!(document["properties"]["site"], "lung");
    assert_eq!(document["sourceRef"], "mem://square");
}

#[tokio::test]
async fn test_embed_slide_numeric_label() {
    let router = embedding_router(ChannelMeanRuntime::new());

    let (status, body) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "mem://square", "label": "3+4", "seed": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, document) = get(&router, &format!("/documents/{}", body["index"])).await;
    assert_eq!(document["properties"]["site"], json!(3));
}

#[tokio::test]
async fn test_embed_slide_without_inference() {
    let router = read_only_router();
    let (status, body) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "mem://square", "label": "lung" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "embedding_unavailable");
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn test_embed_slide_errors() {
    let router = embedding_router(ChannelMeanRuntime::new());

    let (status, body) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "/nonexistent/slide.png", "label": "lung" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = post(&router, "/slides/embed", json!({ "slide": "mem://square" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, _) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "mem://square", "label": "lung", "numPatches": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&router, "/slides/embed", json!({ "slide": "  ", "label": 1 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_slide");

    // Nothing was added
    let (_, state) = get(&router, "/state").await;
    assert_eq!(state["documentCount"], 3);
}

#[tokio::test]
async fn test_embed_slide_model_unavailable() {
    let router = embedding_router(ChannelMeanRuntime::failing());
    let (status, body) = post(
        &router,
        "/slides/embed",
        json!({ "slide": "mem://square", "label": "lung" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_unavailable");
}

// =============================================================================
// Datasets and Models
// =============================================================================

const GLEASON_PATCHES: &str = r#"[
    {"embedding": [1.0, 0.0], "properties": {"gleason_score": 3, "slide": "a"}},
    {"embedding": [0.0, 1.0], "properties": {"gleason_score": 4, "slide": "b"}},
    {"embedding": [0.9, 0.2], "properties": {"gleason_score": 3, "slide": "c"}},
    {"embedding": [0.1, 0.8], "properties": {"gleason_score": 5, "slide": "d"}}
]"#;

#[tokio::test]
async fn test_load_catalog_dataset() {
    let path = write_temp_file("wsiGleasonPatchEmbeddingsTSNE.json", GLEASON_PATCHES);
    let data_dir = path.parent().unwrap().to_path_buf();
    let state: AppState<RasterImageSource, HttpInferenceRuntime> =
        AppState::new(explorer()).with_data_dir(data_dir);
    let router = create_router(state, RouterConfig::new().with_tracing(false));

    put(&router, "/state/compare", json!({ "indices": [1, 2] })).await;

    let (status, state) = put(&router, "/state/dataset", json!({ "dataset": "gleason_patches" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["documentCount"], 4);
    assert_eq!(state["focusDocument"], 0);
    assert_eq!(state["compareDocument"], json!([0]));
    assert_eq!(state["colorBy"], "gleason_score");
    assert_eq!(state["dataConfig"]["id"], "gleason_patches");

    let (_, table) = get(&router, "/views/table").await;
    assert_eq!(table["rows"][1]["documentIndex"], 2);
    let (_, view) = get(&router, "/views/explorer").await;
    assert_eq!(view["legend"].as_array().unwrap().len(), 3);

    let (status, state) = put(
        &router,
        "/state/dataset",
        json!({ "dataset": "gleason_patches", "colorBy": "slide" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["colorBy"], "slide");
}

#[tokio::test]
async fn test_load_dataset_errors() {
    let empty_dir = write_temp_file("README", "").parent().unwrap().to_path_buf();
    let state: AppState<RasterImageSource, HttpInferenceRuntime> =
        AppState::new(explorer()).with_data_dir(empty_dir);
    let router = create_router(state, RouterConfig::new().with_tracing(false));

    let (status, body) = put(&router, "/state/dataset", json!({ "dataset": "nope" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // Catalog dataset that was never downloaded
    let (status, body) = put(&router, "/state/dataset", json!({ "dataset": "wsi_slides" })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "io_error");

    let (_, state) = get(&router, "/state").await;
    assert_eq!(state["documentCount"], 3);
    assert!(state["dataConfig"].is_null());
}

#[tokio::test]
async fn test_list_models() {
    let router = read_only_router();
    let (status, body) = get(&router, "/models").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["selected"], "CTransPath");
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 4);
    assert_eq!(models[1]["modelName"], "Phikon");
    assert_eq!(models[3]["enabled"], false);
}

#[tokio::test]
async fn test_select_model_swaps_encoder() {
    let runtime = ChannelMeanRuntime::new();
    let router = embedding_router(runtime.clone());
    let embed = json!({ "slide": "mem://square", "label": "lung", "seed": 5 });

    let (status, _) = post(&router, "/slides/embed", embed.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, state) = put(&router, "/state/model", json!({ "model": "phikon" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["selectedModel"], "Phikon");
    assert_eq!(state["documentCount"], 4);

    let (status, _) = post(&router, "/slides/embed", embed).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        runtime.loaded_urls(),
        vec![
            "mem://models/v2/models/ctranspath".to_string(),
            "mem://models/v2/models/phikon".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_select_model_errors() {
    let router = read_only_router();

    let (status, body) = put(&router, "/state/model", json!({ "model": "resnet" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_model");

    let (status, body) = put(&router, "/state/model", json!({ "model": "CONCH" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "model_disabled");

    let (_, state) = get(&router, "/state").await;
    assert_eq!(state["selectedModel"], "CTransPath");
}

// =============================================================================
// Peer Messages
// =============================================================================

#[tokio::test]
async fn test_peer_message() {
    let router = read_only_router();

    let message = json!({
        "type": "newPatchEmbedding",
        "from": "peer-1",
        "data": {
            "embedding": [0.1, 0.9, 0.0],
            "properties": { "site": "kidney" },
            "wsiURL": "https://api.gdc.cancer.gov/data/ccc"
        }
    });
    let (status, body) = post(&router, "/peers/messages", message).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["index"], 3);

    let (_, state) = get(&router, "/state").await;
    assert_eq!(state["focusDocument"], 3);

    let (_, view) = get(&router, "/views/explorer").await;
    assert_eq!(view["legend"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_peer_message_dimension_mismatch() {
    let router = read_only_router();
    let message = json!({
        "type": "newPatchEmbedding",
        "data": { "embedding": [0.1, 0.9] }
    });

    let (status, body) = post(&router, "/peers/messages", message).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "dimension_mismatch");
}

// =============================================================================
// Error Responses
// =============================================================================

#[tokio::test]
async fn test_not_found_and_invalid_updates() {
    let router = read_only_router();

    let (status, body) = get(&router, "/documents/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["status"], 404);

    let (status, _) = put(&router, "/state/focus", json!({ "index": 42 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = put(&router, "/state/color-by", json!({ "colorBy": "stage" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_property");

    let (status, _) = get(&router, "/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

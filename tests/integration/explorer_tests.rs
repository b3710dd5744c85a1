//! Explorer integration tests over datasets read from disk.
//!
//! Tests verify:
//! - Dataset files load with stable ingestion indices and legacy fields
//! - Focus and measure changes re-rank the collection
//! - Coloring follows the selected property with a frequency-weighted legend
//! - Local additions are announced once committed; peer additions are not

use serde_json::json;

use slide_explorer::error::{DatasetError, ExplorerError};
use slide_explorer::explorer::{load_documents, Explorer, Origin, PeerMessage, SyncEvent};
use slide_explorer::similarity::{Measure, MeasureKind};

use super::test_utils::{document, sample_documents, write_temp_file};

const DATASET: &str = r#"[
    {"embedding": [1.0, 0.0, 0.0, 0.0], "properties": {"Primary Site": "Lung", "Gender": "male"},
     "wsiURL": "https://api.gdc.cancer.gov/data/aaa"},
    {"embedding": [0.0, 1.0, 0.0, 0.0], "properties": {"Primary Site": "Breast", "Gender": "female"},
     "tcgaWSIURL": "https://api.gdc.cancer.gov/data/bbb"},
    {"embedding": [0.8, 0.2, 0.0, 0.0], "properties": {"Primary Site": "Lung", "Gender": "female"}},
    {"embedding": [0.0, 0.0, 1.0, 0.0], "properties": {"Primary Site": "Kidney", "Gender": "male"},
     "embedding3d": [5.0, 6.0, 7.0]},
    {"embedding": [0.7, 0.3, 0.1, 0.0], "properties": {"Primary Site": "Lung", "Gender": "male"}}
]"#;

async fn dataset_explorer() -> Explorer {
    let path = write_temp_file("explorer_dataset.json", DATASET);
    let documents = load_documents(&path).await.unwrap();
    Explorer::new(documents, Some("Primary Site".to_string())).unwrap()
}

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_load_dataset_from_disk() {
    let path = write_temp_file("load_dataset.json", DATASET);
    let documents = load_documents(&path).await.unwrap();

    assert_eq!(documents.len(), 5);
    let indices: Vec<_> = documents.iter().map(|d| d.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    assert_eq!(
        documents[0].source_ref.as_deref(),
        Some("https://api.gdc.cancer.gov/data/aaa")
    );
    assert_eq!(
        documents[1].source_ref.as_deref(),
        Some("https://api.gdc.cancer.gov/data/bbb")
    );
    assert_eq!(documents[0].embedding_3d, [1.0, 0.0, 0.0]);
    assert_eq!(documents[3].embedding_3d, [5.0, 6.0, 7.0]);
}

#[tokio::test]
async fn test_load_rejects_archives_and_bad_files() {
    let archive = write_temp_file("dataset.json.zip", "PK");
    assert!(matches!(
        load_documents(&archive).await,
        Err(DatasetError::UnsupportedArchive(_))
    ));

    let broken = write_temp_file("broken.json", "{ not json");
    assert!(matches!(
        load_documents(&broken).await,
        Err(DatasetError::Parse(_))
    ));

    assert!(matches!(
        load_documents("/nonexistent/dataset.json").await,
        Err(DatasetError::Io { .. })
    ));
}

// =============================================================================
// Ranking
// =============================================================================

#[tokio::test]
async fn test_focus_and_measure_rerank() {
    let mut explorer = dataset_explorer().await;

    let ranked = explorer.ranked_view().unwrap();
    assert_eq!(ranked.focus_index, Some(0));
    let order: Vec<_> = ranked.rows.iter().map(|r| r.document_index).collect();
    assert_eq!(order[..3], [0, 2, 4]);
    assert_eq!(ranked.columns.last().map(String::as_str), Some("similarity"));

    explorer.set_measure(Measure::EuclideanDistance).unwrap();
    let ranked = explorer.ranked_view().unwrap();
    assert_eq!(ranked.measure, Some(MeasureKind::Distance));
    assert_eq!(ranked.rows[0].display_score, 0.0);
    assert!(ranked
        .rows
        .windows(2)
        .all(|pair| pair[0].score <= pair[1].score));

    explorer.set_focus(3).unwrap();
    let ranked = explorer.ranked_view().unwrap();
    assert_eq!(ranked.focus_index, Some(3));
    assert_eq!(ranked.rows[0].document_index, 3);

    // The best match becomes the compared document
    assert_eq!(explorer.snapshot().unwrap().compare_document, vec![3]);
}

#[tokio::test]
async fn test_focus_out_of_range() {
    let mut explorer = dataset_explorer().await;
    assert!(matches!(
        explorer.set_focus(17),
        Err(ExplorerError::DocumentNotFound(17))
    ));
    assert_eq!(explorer.focus().unwrap(), Some(0));
}

// =============================================================================
// Coloring
// =============================================================================

#[tokio::test]
async fn test_color_by_property() {
    let mut explorer = dataset_explorer().await;

    let snapshot = explorer.snapshot().unwrap();
    assert_eq!(snapshot.color_by_options, vec!["Gender", "Primary Site"]);

    let view = explorer.explorer_view().unwrap();
    let labels: Vec<_> = view.legend.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Breast", "Kidney", "Lung"]);

    let lung = &view.legend[2];
    assert_eq!(lung.count, 3);
    assert!((lung.opacity - 0.6).abs() < 1e-6);
    assert!((view.legend[0].opacity - 1.0).abs() < 1e-6);
    assert_eq!(view.points[0].color, view.points[2].color);

    explorer.set_color_by(Some("Gender".to_string())).unwrap();
    let view = explorer.explorer_view().unwrap();
    assert_eq!(view.color_by.as_deref(), Some("Gender"));
    assert_eq!(view.legend.len(), 2);
    assert!(view.legend.iter().all(|e| e.opacity > 0.0));

    assert!(matches!(
        explorer.set_color_by(Some("Stage".to_string())),
        Err(ExplorerError::UnknownProperty(_))
    ));

    explorer.set_color_by(None).unwrap();
    assert!(explorer.explorer_view().unwrap().legend.is_empty());
}

#[tokio::test]
async fn test_compare_highlighting() {
    let mut explorer = dataset_explorer().await;
    explorer.set_compare(vec![1, 3]).unwrap();

    let view = explorer.explorer_view().unwrap();
    let highlighted: Vec<_> = view
        .points
        .iter()
        .filter(|p| p.compared)
        .map(|p| p.index)
        .collect();
    assert_eq!(highlighted, vec![1, 3]);
    assert!(view.points[0].focused);
}

// =============================================================================
// Peer Synchronization
// =============================================================================

#[tokio::test]
async fn test_local_and_peer_additions() {
    let mut explorer = Explorer::new(sample_documents(), Some("site".to_string())).unwrap();
    let mut sync = explorer.subscribe_sync();

    let local = explorer
        .add_embedded_slide(vec![0.0, 0.9, 0.1], "slides/new.png", json!("breast"))
        .unwrap();
    assert_eq!(local, 3);

    let SyncEvent::NewPatchEmbedding(announced) = sync.try_recv().unwrap();
    assert_eq!(announced.index, 3);
    assert_eq!(announced.label("site"), "breast");

    // The announcement round-trips through the wire format to another instance
    let message = SyncEvent::NewPatchEmbedding(announced).into_message(Some("a".into()));
    let wire = serde_json::to_string(&message).unwrap();
    let mut other = Explorer::new(sample_documents(), Some("site".to_string())).unwrap();
    let mut other_sync = other.subscribe_sync();
    let message: PeerMessage = serde_json::from_str(&wire).unwrap();
    let index = other.receive_peer_message(message).unwrap();

    assert_eq!(index, 3);
    assert_eq!(other.focus().unwrap(), Some(3));
    assert_eq!(other.document(3).unwrap().source_ref.as_deref(), Some("slides/new.png"));
    assert!(other_sync.try_recv().is_err());

    // Peer additions never echo back
    let peer = Origin::Peer { from: None };
    explorer
        .add_document(document(vec![0.2, 0.2, 0.2], "lung"), peer)
        .unwrap();
    assert!(sync.try_recv().is_err());
    assert_eq!(explorer.documents().unwrap().len(), 5);
}

mod common;

use common::{rows, ScriptedVision, PNG_B64};
use std::fs;
use std::sync::Arc;
use tablescroll_common::{ScrollError, ServiceFailure};
use tablescroll_config::ExtractionSettings;
use tablescroll_core::{Extractor, MergeReport, ObservationFrame, ResultStore};

fn extractor(vision: Arc<ScriptedVision>) -> Extractor {
    Extractor::new(vision, ExtractionSettings::default())
}

fn frame() -> ObservationFrame {
    ObservationFrame::from_base64(PNG_B64).unwrap()
}

#[tokio::test]
async fn first_record_lands_in_an_empty_store() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let vision = Arc::new(ScriptedVision::texts([r#"[{"name":"A","audience_id":"123"}]"#]));

    let report = extractor(vision.clone())
        .extract_and_merge(&frame(), &path)
        .await
        .unwrap();
    assert_eq!(report, MergeReport { written: 1, skipped_duplicate: 0 });

    let stored: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        stored,
        serde_json::json!([{
            "Name": "A",
            "Type": "",
            "Availability": "",
            "Date created": "",
            "Audience ID": "123"
        }])
    );

    let request = &vision.requests()[0];
    assert_eq!(request.image_count(), 1);
    assert!((request.temperature - 0.1).abs() < f32::EPSILON);
}

#[tokio::test]
async fn same_record_again_is_skipped_and_store_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let payload = r#"[{"name":"A","audience_id":"123"}]"#;
    let vision = Arc::new(ScriptedVision::texts([payload, payload]));
    let extractor = extractor(vision);

    extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let before = fs::read_to_string(&path).unwrap();
    let report = extractor.extract_and_merge(&frame(), &path).await.unwrap();

    assert_eq!(report, MergeReport { written: 0, skipped_duplicate: 1 });
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn merging_twice_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let batch = rows(&["1", "2", "3"]);
    let vision = Arc::new(ScriptedVision::texts([batch.clone(), batch]));
    let extractor = extractor(vision);

    extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let once = ResultStore::load_or_new(&path).unwrap().records().to_vec();
    let report = extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let twice = ResultStore::load_or_new(&path).unwrap().records().to_vec();

    assert_eq!(report.skipped_duplicate, 3);
    assert_eq!(report.written, 0);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn existing_records_keep_their_position() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let vision = Arc::new(ScriptedVision::texts([rows(&["1", "2"]), rows(&["3", "2", "0"])]));
    let extractor = extractor(vision);

    extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let before = ResultStore::load_or_new(&path).unwrap().records().to_vec();
    extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let after = ResultStore::load_or_new(&path).unwrap();

    assert_eq!(&after.records()[..before.len()], before.as_slice());
    let ids: Vec<_> = after.records().iter().map(|r| r.audience_id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3", "0"]);
}

#[tokio::test]
async fn unparseable_payload_leaves_store_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let vision = Arc::new(ScriptedVision::texts([
        rows(&["1"]),
        "```json\n{\"oops\": true}\n```".to_string(),
    ]));
    let extractor = extractor(vision);

    extractor.extract_and_merge(&frame(), &path).await.unwrap();
    let before = fs::read_to_string(&path).unwrap();
    let err = extractor.extract_and_merge(&frame(), &path).await.unwrap_err();

    assert!(matches!(err, ScrollError::ExtractionParse(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn service_failure_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    let vision = Arc::new(ScriptedVision::new([Err(common::service_error(
        ServiceFailure::RateLimit,
    ))]));

    let err = extractor(vision).extract_and_merge(&frame(), &path).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!path.exists());
}

#[tokio::test]
async fn corrupt_store_aborts_without_overwriting() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("audience.json");
    fs::write(&path, "{ not a list").unwrap();
    let vision = Arc::new(ScriptedVision::texts([rows(&["1"])]));

    let err = extractor(vision).extract_and_merge(&frame(), &path).await.unwrap_err();
    assert!(matches!(err, ScrollError::StoreCorruption { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not a list");
}

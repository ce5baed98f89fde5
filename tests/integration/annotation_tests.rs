//! Annotation persistence tests against real files.

use tempfile::TempDir;
use wsi_viewer::annotation::{Annotation, AnnotationKind, AnnotationList, DEFAULT_GROUP};
use wsi_viewer::error::AnnotationError;
use wsi_viewer::geometry::Rect;

fn sample_list() -> AnnotationList {
    let mut list = AnnotationList::new();
    list.add(
        Annotation::new(
            "tumor",
            AnnotationKind::Polygon,
            vec![[100.0, 100.0], [400.0, 100.0], [400.0, 300.0], [100.0, 300.0]],
        )
        .with_group("regions")
        .with_color([255, 0, 0]),
    );
    list.add(Annotation::new(
        "mitosis",
        AnnotationKind::Point,
        vec![[5000.0, 5000.0]],
    ));
    list
}

#[test]
fn test_save_and_load_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("annotations.json");

    let mut original = sample_list();
    let tumor_id = original.iter().next().unwrap().id.clone();
    assert!(original.select(Some(&tumor_id)));
    original.save_to_json(&path).unwrap();

    let mut loaded = AnnotationList::new();
    loaded.load_from_json(&path).unwrap();

    assert_eq!(loaded.len(), 2);
    let tumor = loaded.get(&tumor_id).unwrap();
    assert_eq!(tumor.group, "regions");
    assert_eq!(tumor.color, [255, 0, 0]);
    assert_eq!(tumor.area(), 60000.0);
    // Selection is session state only.
    assert!(!tumor.selected);
    assert!(loaded.selected().is_none());

    let names = loaded.group_names();
    assert!(names.contains("regions"));
    assert!(names.contains(DEFAULT_GROUP));

    let view = Rect::new(0.0, 0.0, 1000.0, 1000.0);
    let visible: Vec<&str> = loaded.in_rect(&view).iter().map(|a| a.name.as_str()).collect();
    assert_eq!(visible, ["tumor"]);
}

#[test]
fn test_load_hand_written_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("external.json");
    std::fs::write(
        &path,
        r#"{
            "annotations": [
                {
                    "name": "stroma",
                    "type": "Polygon",
                    "coordinates": [[0, 0], [50, 0], [50, 50], [0, 50]],
                    "properties": {"score": 3}
                }
            ]
        }"#,
    )
    .unwrap();

    let mut list = AnnotationList::new();
    list.load_from_json(&path).unwrap();

    let stroma = list.iter().next().unwrap();
    assert!(!stroma.id.is_empty());
    assert_eq!(stroma.group, DEFAULT_GROUP);
    assert!(stroma.visible);
    assert_eq!(stroma.properties["score"], 3);
    assert_eq!(list.at_point(25.0, 25.0).len(), 1);
}

#[test]
fn test_failed_load_keeps_list() {
    let dir = TempDir::new().unwrap();
    let mut list = sample_list();

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        list.load_from_json(&missing),
        Err(AnnotationError::Io { .. })
    ));
    assert_eq!(list.len(), 2);

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ not json").unwrap();
    assert!(matches!(
        list.load_from_json(&broken),
        Err(AnnotationError::Json(_))
    ));
    assert_eq!(list.len(), 2);
}

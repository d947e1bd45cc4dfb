use super::*;
use crate::foundation::core::{BitDepth, OutputFormat};

#[test]
fn defaults_match_documented_values() {
    let s = Settings::default();
    assert_eq!(s.cook.optimization_level, 1);
    assert!(s.cook.enable_icons);
    assert_eq!(s.cook.timeout_secs, 300);
    assert_eq!(s.render.output_format, OutputFormat::Png);
    assert_eq!(s.render.bit_depth, BitDepth::U8);
    assert_eq!(s.render.resolution, Some(1024));
    assert_eq!(s.render.memory_budget_mb, Some(2000));
    assert_eq!(s.render.timeout_secs, 600);
    assert_eq!(s.batch.max_workers, 2);
    assert_eq!(s.batch.layout(), LayoutPolicy::ByMaterial);
    assert_eq!(s.cache.budget_bytes(), 1024 * 1024 * 1024);
    assert!(s.security.restrict_to_directories.is_empty());
    assert_eq!(s.logging.level, "info");
    s.validate().unwrap();
}

#[test]
fn partial_file_merges_over_defaults() {
    let s = Settings::from_json_str(
        r#"{
            "render": {"output_format": "exr", "bit_depth": "16f"},
            "batch": {"max_workers": 6},
            "cache": {"directory": "/tmp/mf-cache"}
        }"#,
    )
    .unwrap();
    assert_eq!(s.render.output_format, OutputFormat::Exr);
    assert_eq!(s.render.bit_depth, BitDepth::F16);
    assert_eq!(s.render.resolution, Some(1024));
    assert_eq!(s.batch.max_workers, 6);
    assert!(s.batch.organize_by_material);
    assert_eq!(s.cache.root(), PathBuf::from("/tmp/mf-cache"));
    assert_eq!(s.cook, CookSettings::default());
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let s = Settings::load(Some(&dir.path().join("absent.json"))).unwrap();
    assert_eq!(s, Settings::default());
}

#[test]
fn malformed_file_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        Settings::load(Some(&path)),
        Err(MatflowError::Validation(_))
    ));
}

#[test]
fn out_of_range_values_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"cook": {"optimization_level": 4}}"#).unwrap();
    assert!(matches!(
        Settings::load(Some(&path)),
        Err(MatflowError::Validation(_))
    ));

    let mut s = Settings::default();
    s.batch.max_workers = 0;
    assert!(s.validate().is_err());

    let mut s = Settings::default();
    s.render.timeout_secs = 0;
    assert!(s.validate().is_err());
}

#[test]
fn explicit_tool_path_must_exist() {
    let paths = ToolPaths {
        cooker: Some(PathBuf::from("/definitely/not/here/sbscooker")),
        renderer: None,
    };
    assert!(matches!(
        paths.locate(OperationKind::Cook),
        Err(MatflowError::ToolNotFound(_))
    ));
}

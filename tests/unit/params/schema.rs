use super::*;

const SCHEMA: &str = r#"{
  "parameters": {
    "roughness": {"type": "float", "default": 0.5, "min": 0.0, "max": 1.0},
    "tiles": {"type": "int", "default": 4, "min": 1, "max": 16},
    "invert": {"type": "bool", "default": false},
    "label": {"type": "string"}
  },
  "presets": {
    "wet": {"roughness": 0.1}
  }
}"#;

#[test]
fn parses_schema_json() {
    let schema = ParamSchema::from_json_str(SCHEMA).unwrap();
    assert_eq!(schema.parameters.len(), 4);
    let r = schema.get("roughness").unwrap();
    assert_eq!(r.kind, ParamType::Float);
    assert_eq!(r.default, Some(ParamValue::Float(0.5)));
    assert_eq!(r.range(), Some(ParamRange { min: 0.0, max: 1.0 }));
    assert!(r.is_randomizable());
    assert!(!schema.get("invert").unwrap().is_randomizable());
    assert!(!schema.get("label").unwrap().is_randomizable());
    assert_eq!(schema.presets["wet"]["roughness"], ParamValue::Float(0.1));
}

#[test]
fn check_enforces_type_and_range() {
    let schema = ParamSchema::from_json_str(SCHEMA).unwrap();
    let r = schema.get("roughness").unwrap();
    assert_eq!(
        r.check("roughness", &ParamValue::Int(1)).unwrap(),
        ParamValue::Float(1.0)
    );
    let err = r.check("roughness", &ParamValue::Float(1.5)).unwrap_err();
    match err {
        MatflowError::InvalidParameter { name, value, .. } => {
            assert_eq!(name, "roughness");
            assert_eq!(value, "1.5");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(r.check("roughness", &ParamValue::Bool(true)).is_err());
    assert!(r.check("roughness", &ParamValue::Float(f64::NAN)).is_err());

    let tiles = schema.get("tiles").unwrap();
    assert_eq!(
        tiles.check("tiles", &ParamValue::Float(8.0)).unwrap(),
        ParamValue::Int(8)
    );
    assert!(tiles.check("tiles", &ParamValue::Float(8.5)).is_err());
    assert!(tiles.check("tiles", &ParamValue::Int(0)).is_err());
}

#[test]
fn rejects_inverted_range_and_bad_default() {
    let inverted = r#"{"parameters": {"x": {"type": "float", "min": 2.0, "max": 1.0}}}"#;
    assert!(matches!(
        ParamSchema::from_json_str(inverted),
        Err(MatflowError::InvalidParameter { .. })
    ));
    let bad_default =
        r#"{"parameters": {"x": {"type": "float", "default": 3.0, "min": 0.0, "max": 1.0}}}"#;
    assert!(ParamSchema::from_json_str(bad_default).is_err());
    assert!(matches!(
        ParamSchema::from_json_str("not json"),
        Err(MatflowError::Validation(_))
    ));
}

#[test]
fn values_render_as_command_arguments() {
    assert_eq!(ParamValue::Bool(true).to_arg(), "1");
    assert_eq!(ParamValue::Bool(false).to_arg(), "0");
    assert_eq!(ParamValue::Int(-3).to_arg(), "-3");
    assert_eq!(ParamValue::Float(0.25).to_arg(), "0.25");
    assert_eq!(ParamValue::Str("a b".into()).to_arg(), "a b");
}

#[test]
fn missing_schema_file_is_input_not_found() {
    let err = ParamSchema::from_path(Path::new("/no/such/schema.json")).unwrap_err();
    assert!(matches!(err, MatflowError::InputNotFound(_)));
}

use super::*;

fn schema() -> ParamSchema {
    ParamSchema::from_json_str(
        r#"{
          "parameters": {
            "roughness": {"type": "float", "default": 0.5, "min": 0.0, "max": 1.0},
            "scale": {"type": "float", "default": 2.0, "min": 1.0, "max": 8.0},
            "tiles": {"type": "int", "default": 4, "min": 1, "max": 16},
            "invert": {"type": "bool", "default": false}
          },
          "presets": {"wet": {"roughness": 0.1, "tiles": 2}}
        }"#,
    )
    .unwrap()
}

fn seeded(seed: u64, strength: f64) -> ParamRequest {
    ParamRequest {
        randomization: Some(Randomization {
            seed: Seed::Explicit(seed),
            strength,
        }),
        ..ParamRequest::default()
    }
}

#[test]
fn defaults_only() {
    let schema = schema();
    let out = ParameterResolver::new(&schema)
        .resolve(&ParamRequest::default(), &[])
        .unwrap();
    assert_eq!(out.values.get("roughness"), Some(&ParamValue::Float(0.5)));
    assert_eq!(out.values.get("tiles"), Some(&ParamValue::Int(4)));
    assert_eq!(out.values.get("invert"), Some(&ParamValue::Bool(false)));
    assert_eq!(out.values.range("scale"), Some(ParamRange { min: 1.0, max: 8.0 }));
    assert_eq!(out.seed, None);
    assert!(out.unknown.is_empty());
}

#[test]
fn merge_order_preset_then_override() {
    let schema = schema();
    let mut req = ParamRequest {
        preset: Some("wet".into()),
        ..ParamRequest::default()
    };
    req.overrides.insert("tiles".into(), ParamValue::Int(9));
    let out = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap();
    assert_eq!(out.values.get("roughness"), Some(&ParamValue::Float(0.1)));
    assert_eq!(out.values.get("tiles"), Some(&ParamValue::Int(9)));
    assert_eq!(out.preset.as_deref(), Some("wet"));
}

#[test]
fn unknown_preset_passes_through() {
    let schema = schema();
    let req = ParamRequest {
        preset: Some("dusty".into()),
        ..ParamRequest::default()
    };
    let out = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap();
    assert_eq!(out.preset.as_deref(), Some("dusty"));
    assert_eq!(out.values.get("roughness"), Some(&ParamValue::Float(0.5)));
}

#[test]
fn zero_strength_reproduces_defaults() {
    let schema = schema();
    let resolver = ParameterResolver::new(&schema);
    let plain = resolver.resolve(&ParamRequest::default(), &[]).unwrap();
    let out = resolver.resolve(&seeded(42, 0.0), &[]).unwrap();
    assert_eq!(out.values, plain.values);
    assert_eq!(out.seed, Some(42));
    assert_eq!(out.sampled.len(), 3);
}

#[test]
fn full_strength_uses_sampled_values() {
    let schema = schema();
    let out = ParameterResolver::new(&schema)
        .resolve(&seeded(42, 1.0), &[])
        .unwrap();
    assert_eq!(
        out.values.get("roughness"),
        Some(&ParamValue::Float(out.sampled["roughness"]))
    );
    assert_eq!(
        out.values.get("scale"),
        Some(&ParamValue::Float(out.sampled["scale"]))
    );
    assert_eq!(
        out.values.get("tiles"),
        Some(&ParamValue::Int(out.sampled["tiles"] as i64))
    );
    let tiles = out.sampled["tiles"];
    assert_eq!(tiles.fract(), 0.0);
    assert!((1.0..=16.0).contains(&tiles));
    assert!(!out.sampled.contains_key("invert"));
}

#[test]
fn same_seed_same_values() {
    let schema = schema();
    let resolver = ParameterResolver::new(&schema);
    let a = resolver.resolve(&seeded(7, 0.6), &[]).unwrap();
    let b = resolver.resolve(&seeded(7, 0.6), &[]).unwrap();
    assert_eq!(a, b);
    for (name, value) in a.values.iter() {
        let spec = schema.get(name).unwrap();
        assert!(spec.check(name, value).is_ok());
    }
}

#[test]
fn unspecified_seed_is_reported() {
    let schema = schema();
    let req = ParamRequest {
        randomization: Some(Randomization {
            seed: Seed::from_i64(-1),
            strength: 0.5,
        }),
        ..ParamRequest::default()
    };
    let out = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap();
    let seed = out.seed.unwrap();
    let replay = ParameterResolver::new(&schema)
        .resolve(&seeded(seed, 0.5), &[])
        .unwrap();
    assert_eq!(replay.values, out.values);
}

#[test]
fn overrides_are_not_randomized() {
    let schema = schema();
    let mut req = seeded(42, 1.0);
    req.overrides.insert("roughness".into(), ParamValue::Float(0.25));
    let out = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap();
    assert_eq!(out.values.get("roughness"), Some(&ParamValue::Float(0.25)));
    assert!(!out.sampled.contains_key("roughness"));
}

#[test]
fn out_of_range_override_fails() {
    let schema = schema();
    let mut req = ParamRequest::default();
    req.overrides.insert("roughness".into(), ParamValue::Float(1.5));
    let err = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap_err();
    match err {
        MatflowError::InvalidParameter { name, .. } => assert_eq!(name, "roughness"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn strength_outside_unit_interval_fails() {
    let schema = schema();
    let err = ParameterResolver::new(&schema)
        .resolve(&seeded(1, 1.5), &[])
        .unwrap_err();
    assert!(matches!(err, MatflowError::InvalidParameter { .. }));
}

#[test]
fn unknown_names_pass_through_flagged() {
    let schema = schema();
    let mut req = ParamRequest::default();
    req.overrides.insert("$outputsize".into(), ParamValue::Int(10));
    let out = ParameterResolver::new(&schema).resolve(&req, &[]).unwrap();
    assert_eq!(out.values.get("$outputsize"), Some(&ParamValue::Int(10)));
    assert_eq!(out.unknown, vec!["$outputsize".to_string()]);
}

#[test]
fn missing_binding_file_fails() {
    let schema = schema();
    let dir = tempfile::tempdir().unwrap();
    let binding = ImageBinding::adopt("mask", dir.path().join("gone.png"));
    let err = ParameterResolver::new(&schema)
        .resolve(&ParamRequest::default(), &[binding])
        .unwrap_err();
    assert!(matches!(err, MatflowError::InputNotFound(_)));
}

#[test]
fn variant_seeds_advance() {
    assert_eq!(Seed::Explicit(42).for_variant(3), Seed::Explicit(45));
    assert_eq!(Seed::Explicit(u64::MAX).for_variant(1), Seed::Explicit(0));
    assert_eq!(Seed::Unspecified.for_variant(2), Seed::Unspecified);
    assert_eq!(Seed::from_i64(5), Seed::Explicit(5));
}

use super::*;

const LISTING: &str = "\
Archive loaded
  GRAPH: pkg://wood_planks
    Input: roughness type=float default=0.5 min=0 max=1
    Input: tiles type=int default=4 min=1 max=16
    Parameter: invert type=bool default=0
    Input: tint type=float3 default=1,1,1
    Input: broken type=float default=abc min=2 max=1
    Output: basecolor format=png
    Output: normal
    Output: mask
";

fn facts() -> FileFacts {
    FileFacts {
        path: PathBuf::from("/a/wood.sbsar"),
        name: "wood.sbsar".into(),
        stem: "wood".into(),
        size_bytes: 2 * 1024 * 1024,
        modified_secs: None,
    }
}

#[test]
fn parses_tolerant_listing() {
    let info = ArchiveInfo::parse(facts(), LISTING);
    assert_eq!(info.graphs, ["pkg://wood_planks"]);
    assert_eq!(info.parameters.len(), 5);
    assert_eq!(info.parameters[0].name, "roughness");
    assert_eq!(info.parameters[0].attributes["max"], "1");
    assert_eq!(info.outputs.len(), 3);
    assert_eq!(info.outputs[0].channel, Channel::Diffuse);
    assert_eq!(info.outputs[1].channel, Channel::Normal);
    assert_eq!(info.outputs[2].channel, Channel::Other);
    assert_eq!(info.outputs[0].attributes["format"], "png");
    assert_eq!(info.parameter_types["float"], 2);
    assert_eq!(info.parameter_types["float3"], 1);
    assert_eq!(info.output_types["diffuse"], 1);
    assert!(info.summary.contains("archive: wood.sbsar (2.00 MB)"));
    assert!(info.summary.contains("outputs: 3"));
}

#[test]
fn derives_schema_from_descriptors() {
    let schema = ArchiveInfo::parse(facts(), LISTING).schema();
    assert!(schema.validate().is_ok());
    assert_eq!(schema.parameters.len(), 4);
    let r = &schema.parameters["roughness"];
    assert_eq!(r.kind, ParamType::Float);
    assert_eq!(r.default, Some(ParamValue::Float(0.5)));
    assert_eq!((r.min, r.max), (Some(0.0), Some(1.0)));
    assert_eq!(schema.parameters["tiles"].default, Some(ParamValue::Int(4)));
    assert_eq!(
        schema.parameters["invert"].default,
        Some(ParamValue::Bool(false))
    );
    let broken = &schema.parameters["broken"];
    assert_eq!((broken.min, broken.max, &broken.default), (None, None, &None));
    assert!(!schema.parameters.contains_key("tint"));
}

#[test]
fn empty_listing_is_empty_info() {
    let info = ArchiveInfo::parse(facts(), "");
    assert!(info.graphs.is_empty());
    assert!(info.schema().parameters.is_empty());
}

#[test]
fn file_facts_of_missing_file() {
    assert!(matches!(
        FileFacts::read(Path::new("/no/such.sbsar")),
        Err(MatflowError::InputNotFound(_))
    ));
}

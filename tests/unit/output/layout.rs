use super::*;
use crate::foundation::core::JobId;
use crate::job::model::{CookSettings, RenderSettings};
use crate::params::resolve::ParameterSet;

fn source(dir: &Path, name: &str, channel: Channel) -> ClassifiedFile {
    let path = dir.join(name);
    std::fs::write(&path, name.as_bytes()).unwrap();
    ClassifiedFile { channel, path }
}

#[test]
fn job_dir_per_policy() {
    let base = Path::new("/out");
    assert_eq!(
        LayoutPolicy::ByMaterial.job_dir(base, "wood", Some(3)),
        PathBuf::from("/out/wood/variation_003")
    );
    assert_eq!(
        LayoutPolicy::ByMaterial.job_dir(base, "wood", None),
        PathBuf::from("/out/wood")
    );
    assert_eq!(LayoutPolicy::Flat.job_dir(base, "wood", Some(3)), base);
    assert_eq!(LayoutPolicy::from_organize_flag(false), LayoutPolicy::Flat);
}

#[test]
fn by_material_renames_to_channels() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let files = vec![
        source(src.path(), "wood_basecolor.png", Channel::Diffuse),
        source(src.path(), "wood_albedo_alt.png", Channel::Diffuse),
        source(src.path(), "wood_normal.png", Channel::Normal),
        source(src.path(), "wood_mask.png", Channel::Other),
    ];
    let job = Job::render(
        JobId(0),
        "/in/wood.sbsar",
        out.path(),
        ParameterSet::default(),
        RenderSettings::default(),
    )
    .with_variant(Some(1));

    let placed = place(&files, &job, LayoutPolicy::ByMaterial).unwrap();
    let dir = out.path().join("wood/variation_001");
    let names: Vec<_> = placed
        .iter()
        .map(|p| p.path.strip_prefix(&dir).unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["diffuse.png", "diffuse_2.png", "normal.png", "wood_mask.png"]);
    assert_eq!(
        std::fs::read(dir.join("normal.png")).unwrap(),
        b"wood_normal.png"
    );
    // Sources stay where they were.
    assert!(files.iter().all(|f| f.path.is_file()));
}

#[test]
fn flat_keeps_names_and_archives_take_material_name() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let files = vec![source(src.path(), "whatever.sbsar", Channel::Archive)];
    let job = Job::cook(JobId(0), "/in/bricks.sbs", out.path(), CookSettings::default());
    let placed = place(&files, &job, LayoutPolicy::Flat).unwrap();
    assert_eq!(placed[0].path, out.path().join("bricks.sbsar"));
    assert_eq!(placed[0].channel, Channel::Archive);

    let files = vec![source(src.path(), "bricks_height.png", Channel::Height)];
    let job = Job::render(
        JobId(1),
        "/in/bricks.sbsar",
        out.path(),
        ParameterSet::default(),
        RenderSettings::default(),
    );
    let placed = place(&files, &job, LayoutPolicy::Flat).unwrap();
    assert_eq!(placed[0].path, out.path().join("bricks_height.png"));
}

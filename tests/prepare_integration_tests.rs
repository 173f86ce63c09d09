//! Integration tests for the source preparation stage
//!
//! Builds a miniature target tree with the header, loading-speeds, and
//! language files and verifies the anchored insertions and the appended
//! string table.

use camino::{Utf8Path, Utf8PathBuf};
use costpatch::models::{PatchConfig, PatchSettings};
use costpatch::services::PrepareService;
use std::fs;
use tempfile::TempDir;

const HEADER: &str = "grf {\n\
    \x20   grfid: \"\\xF3\\x03\\x03\\x03\";\n\
    }\n\
    \n\
    param {\n\
    \x20   ISCONCEPT {\n\
    \x20       type:      bool;\n\
    \x20       name:      string(STR_PARAM_ISCONCEPT);\n\
    \x20       def_value: 0;\n\
    \x20   }\n\
    }\n";

const LOADING_SPEEDS: &str = "// Engines\n\
    #define LOADINGSPEEDDEF_ENGINE loading_speed: LOADINGSPEED(8);\n\
    \n\
    // Intercity vehicles\n\
    #define LOADINGSPEEDDEF_INTERCITY loading_speed: LOADINGSPEED(10);\n";

fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn service() -> PrepareService {
    PrepareService::new(PatchConfig::default().categories)
}

fn write_file(root: &Utf8Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn populate_target(root: &Utf8Path) {
    write_file(root, "src/header.pnml", HEADER);
    write_file(root, "src/loadingspeeds.pnml", LOADING_SPEEDS);
    write_file(root, "lang/english.lng", "##grflangid 0x01\n");
    write_file(root, "lang/german.lng", "##grflangid 0x02\n");
}

#[test]
fn test_run_prepares_all_three_files() {
    let (_temp, root) = utf8_temp_dir();
    populate_target(&root);

    service().run(&root, &PatchSettings::default()).unwrap();

    let header = fs::read_to_string(root.join("src/header.pnml")).unwrap();
    assert!(header.contains("param_locomotive_running_cost {"));
    let speeds = fs::read_to_string(root.join("src/loadingspeeds.pnml")).unwrap();
    assert!(speeds.contains("LOADINGSPEEDDEF_COACH"));
    let english = fs::read_to_string(root.join("lang/english.lng")).unwrap();
    assert!(english.contains("STR_PARAM_WAGON_RUNNING_COST"));
}

#[test]
fn test_parameter_blocks_inserted_before_anchor() {
    let (_temp, root) = utf8_temp_dir();
    populate_target(&root);
    let header = root.join("src/header.pnml");

    service().insert_cost_parameters(&header).unwrap();

    let text = fs::read_to_string(&header).unwrap();
    let anchor_at = text.find("ISCONCEPT").unwrap();
    for param in [
        "param_locomotive_running_cost {",
        "param_locomotive_running_cost_dynamic {",
        "param_wagon_unpowered_running_cost {",
        "param_reliability_decay {",
    ] {
        let at = text.find(param).unwrap_or_else(|| panic!("missing {param}"));
        assert!(at < anchor_at, "{param} inserted after the anchor");
    }

    // Two blocks per category, the reliability block, and the anchor itself.
    assert_eq!(text.matches("param {").count(), 12);
    assert!(text.contains("def_value:  100;"));
    assert!(text.contains("max_value:  2550;"));
    assert!(text.contains("max_value:  255;"));
    // The original header survives around the insertion.
    assert!(text.starts_with("grf {"));
    assert!(text.trim_end().ends_with('}'));
}

#[test]
fn test_missing_parameter_anchor_is_fatal() {
    let (_temp, root) = utf8_temp_dir();
    write_file(&root, "src/header.pnml", "grf {\n    version: 1;\n}\n");

    let err = service()
        .insert_cost_parameters(&root.join("src/header.pnml"))
        .unwrap_err();

    assert!(
        err.to_string().contains("parameter block anchor"),
        "unexpected error: {err:#}"
    );
    // File left untouched on failure
    assert_eq!(
        fs::read_to_string(root.join("src/header.pnml")).unwrap(),
        "grf {\n    version: 1;\n}\n"
    );
}

#[test]
fn test_coach_define_inserted_before_intercity() {
    let (_temp, root) = utf8_temp_dir();
    populate_target(&root);
    let speeds = root.join("src/loadingspeeds.pnml");

    service().insert_coach_loading_speed(&speeds).unwrap();

    let text = fs::read_to_string(&speeds).unwrap();
    let coach_at = text.find("LOADINGSPEEDDEF_COACH").unwrap();
    let intercity_at = text.find("LOADINGSPEEDDEF_INTERCITY").unwrap();
    assert!(coach_at < intercity_at);
    assert!(text.contains("isUltraSpeed ? 255 : LOADINGSPEED(12);"));
    // The engine define above the insertion point is untouched.
    assert!(text.starts_with("// Engines\n"));
}

#[test]
fn test_missing_loading_speed_anchor_is_fatal() {
    let (_temp, root) = utf8_temp_dir();
    write_file(&root, "src/loadingspeeds.pnml", "// nothing here\n");

    let err = service()
        .insert_coach_loading_speed(&root.join("src/loadingspeeds.pnml"))
        .unwrap_err();

    assert!(
        err.to_string().contains("loading speed define anchor"),
        "unexpected error: {err:#}"
    );
}

#[test]
fn test_string_table_appended_to_every_language_file() {
    let (_temp, root) = utf8_temp_dir();
    populate_target(&root);

    let updated = service()
        .append_language_strings(&root.join("lang"))
        .unwrap();
    assert_eq!(updated, 2);

    for lang in ["english.lng", "german.lng"] {
        let text = fs::read_to_string(root.join("lang").join(lang)).unwrap();
        assert!(text.starts_with("##grflangid"), "{lang} header lost");
        assert!(text.contains("STR_PARAM_COACH_RUNNING_COST_DYNAMIC_DESC"));
        assert!(text.contains("STR_PARAM_RELIABILITY_DECAY"));
    }
}

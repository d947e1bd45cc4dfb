use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        MatflowError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(MatflowError::cache("x").to_string().contains("cache error:"));
    assert!(
        MatflowError::permission("x")
            .to_string()
            .contains("permission error:")
    );
    assert!(
        MatflowError::tool_not_found("sbsrender")
            .to_string()
            .contains("tool not found:")
    );
    let err = MatflowError::invalid_parameter("roughness", "1.5", "above max 1");
    assert_eq!(
        err.to_string(),
        "invalid parameter 'roughness' = 1.5: above max 1"
    );
}

#[test]
fn tool_execution_reports_exit_code_or_signal() {
    let err = MatflowError::ToolExecution {
        code: Some(3),
        stderr: "bad graph".to_string(),
        log: "full log".to_string(),
    };
    assert!(err.to_string().contains("exit 3: bad graph"));
    assert_eq!(err.log(), Some("full log"));

    let err = MatflowError::ToolExecution {
        code: None,
        stderr: String::new(),
        log: String::new(),
    };
    assert!(err.to_string().contains("exit signal"));
}

#[test]
fn pre_spawn_classification() {
    assert!(MatflowError::input_not_found("a.sbs").is_pre_spawn());
    assert!(MatflowError::permission("x").is_pre_spawn());
    assert!(MatflowError::invalid_parameter("a", "b", "c").is_pre_spawn());
    assert!(
        !MatflowError::Timeout {
            secs: 1,
            log: String::new()
        }
        .is_pre_spawn()
    );
    assert!(!MatflowError::cache("x").is_pre_spawn());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = MatflowError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), "other");
}

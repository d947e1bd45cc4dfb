use super::*;

fn sh(script: &str) -> ToolCommand {
    ToolCommand {
        program: "/bin/sh".into(),
        args: vec!["-c".into(), script.into()],
    }
}

#[test]
fn captures_both_streams_and_exit_code() {
    let cmd = sh("echo out; echo err >&2; exit 4");
    let run = run_process(&cmd, Duration::from_secs(10)).unwrap();
    assert_eq!(run.exit, ProcessExit::Exited(Some(4)));
    assert!(!run.success());
    assert_eq!(run.stdout, "out\n");
    assert_eq!(run.stderr, "err\n");

    let log = run.log(&cmd);
    assert!(log.starts_with("$ /bin/sh -c \"echo out; echo err >&2; exit 4\"\n"));
    assert!(log.contains("--- stdout ---\nout\n"));
    assert!(log.contains("--- stderr ---\nerr\n"));
}

#[test]
fn large_output_does_not_block() {
    let cmd = sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done");
    let run = run_process(&cmd, Duration::from_secs(30)).unwrap();
    assert!(run.success());
    assert_eq!(run.stdout.lines().count(), 20000);
}

#[test]
fn timeout_kills_process_group() {
    let cmd = sh("echo begun; sleep 30 & sleep 30; wait");
    let start = Instant::now();
    let run = run_process(&cmd, Duration::from_millis(300)).unwrap();
    assert_eq!(run.exit, ProcessExit::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(run.stdout, "begun\n");
    assert!(run.log(&cmd).ends_with("--- killed after timeout ---\n"));
}

#[test]
fn missing_program_is_tool_not_found() {
    let cmd = ToolCommand {
        program: "/no/such/sbsrender".into(),
        args: vec!["render".into()],
    };
    assert!(matches!(
        run_process(&cmd, Duration::from_secs(1)),
        Err(MatflowError::ToolNotFound(_))
    ));
}

#[test]
fn background_child_does_not_outlive_the_tool() {
    let cmd = sh("echo started; sleep 30 & exit 0");
    let start = Instant::now();
    let run = run_process(&cmd, Duration::from_secs(10)).unwrap();
    assert!(run.success());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(run.stdout, "started\n");
}

#[test]
fn non_executable_program_is_tool_not_found() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    let program = dir.path().join("sbsrender");
    std::fs::write(&program, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o644)).unwrap();
    let cmd = ToolCommand {
        program,
        args: vec![],
    };
    assert!(matches!(
        run_process(&cmd, Duration::from_secs(1)),
        Err(MatflowError::ToolNotFound(_))
    ));
}

use assert_cmd::cargo::cargo_bin_cmd;
use flap_testing::TestWorld;
use flap_testing::assertions::{assert_detail, assert_record_count, read_ndjson};
use flap_testing::fixtures::{SessionDir, lines, scripts};
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let mut cmd = cargo_bin_cmd!("flap");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trace"))
        .stdout(predicate::str::contains("decode"));
}

#[test]
fn test_trace_requires_a_target() {
    let mut cmd = cargo_bin_cmd!("flap");
    cmd.arg("trace").assert().failure();
}

#[test]
fn test_decode_session_dir() -> anyhow::Result<()> {
    // `echo` as the fd helper answers "<pid> <fd>"
    let world = TestWorld::new().with_resolver_command("echo");
    let session = SessionDir::create(&world.root().join("session"))?;
    session.shard("io_logs", 0, &[lines::BANNER, lines::READ_WITH_FD])?;
    session.capture("event_logs", &[lines::EXIT_NO_FD])?;

    let result = world.run(&["decode", "--dir", "session"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert!(result.stdout().contains("io_logs: 1 event(s)"));

    let io = std::fs::read_to_string(session.path().join("io_logs.jsonl"))?;
    insta::assert_snapshot!(io.trim_end(), @r#"
    Attaching 12 probes...
    {"timestamp":"2025-11-18 21:07:22.089317","pid":5,"tid":5,"proc":"foo","event_type":"ENTER","operand":"read","details":{"fd":"3","fname":"5 3"}}
    "#);

    let events = read_ndjson(&session.path().join("event_logs.jsonl"))?;
    assert_eq!(events.len(), 1);
    assert_detail(&events[0], "fname", "UNKNOWN")?;
    Ok(())
}

#[test]
fn test_decode_can_drop_unparsed_lines() -> anyhow::Result<()> {
    let world = TestWorld::new();
    let session = SessionDir::create(&world.root().join("session"))?;
    session.shard("meta_logs", 0, &[lines::BANNER, lines::EXIT_NO_FD])?;

    let result = world.run(&["decode", "--dir", "session", "--unparsed", "drop"])?;
    assert!(result.success(), "stderr: {}", result.stderr());
    assert_record_count(&session.path().join("meta_logs.jsonl"), 1)?;
    Ok(())
}

#[test]
fn test_decode_without_meta_fails() -> anyhow::Result<()> {
    let world = TestWorld::new();
    std::fs::create_dir(world.root().join("empty"))?;

    let result = world.run(&["decode", "--dir", "empty"])?;
    assert_eq!(result.code(), Some(1));
    assert!(result.stderr().contains("Error:"));
    Ok(())
}

#[test]
fn test_trace_pid_captures_and_decodes() -> anyhow::Result<()> {
    let world = TestWorld::new().with_target_scripts("pid", scripts::ECHO_FIRST_ARG);

    let result = world.run(&["trace", "--pid", "4242", "-o", "out"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let out = world.root().join("out");
    assert!(out.join("meta.json").is_file());
    for id in ["meta_logs", "io_logs", "event_logs"] {
        let shard = std::fs::read_to_string(out.join(format!("trace_{}.00000.log", id)))?;
        assert_eq!(shard, "target=4242\n");

        let decoded = read_ndjson(&out.join(format!("{}.jsonl", id)))?;
        assert_eq!(decoded, vec![serde_json::json!("target=4242")]);
    }
    Ok(())
}

#[test]
fn test_trace_decodes_events_from_tracers() -> anyhow::Result<()> {
    let body = scripts::print_lines(&[lines::BANNER, lines::OPEN_WITH_FNAME]);
    let world = TestWorld::new()
        .with_capture_mode("file")
        .with_target_scripts("command", &body);

    let result = world.run(&["trace", "--command", "foo", "-o", "out"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let io = world.root().join("out").join("io_logs.jsonl");
    assert_record_count(&io, 2)?;
    let records = read_ndjson(&io)?;
    assert_eq!(records[0], serde_json::json!(lines::BANNER));
    assert_detail(&records[1], "fname", "/etc/hosts")?;
    assert_eq!(records[1]["timestamp"], "2025-11-18 21:07:22.089342");
    Ok(())
}

#[test]
fn test_trace_no_decode_leaves_raw_output() -> anyhow::Result<()> {
    let world = TestWorld::new().with_target_scripts("cgroup", scripts::ECHO_FIRST_ARG);

    let result = world.run(&["trace", "--cgroup", "12", "--no-decode", "-o", "out"])?;
    assert!(result.success(), "stderr: {}", result.stderr());

    let out = world.root().join("out");
    assert!(out.join("trace_io_logs.00000.log").is_file());
    assert!(!out.join("io_logs.jsonl").exists());
    Ok(())
}

#[test]
fn test_trace_exit_code_is_propagated() -> anyhow::Result<()> {
    let world = TestWorld::new().with_target_scripts("pid", &scripts::exit_with(3));

    let result = world.run(&["trace", "--pid", "1", "-o", "out"])?;
    assert_eq!(result.code(), Some(3));
    Ok(())
}

#[test]
fn test_trace_rejects_non_numeric_pid() -> anyhow::Result<()> {
    let world = TestWorld::new().with_target_scripts("pid", scripts::EXIT_OK);

    let result = world.run(&["trace", "--pid", "abc", "-o", "out"])?;
    assert_eq!(result.code(), Some(1));
    assert!(result.stderr().contains("pid must be numeric"));
    assert!(!world.root().join("out").exists());
    Ok(())
}

#[test]
fn test_trace_missing_scripts_is_a_startup_failure() -> anyhow::Result<()> {
    let world = TestWorld::new();

    let result = world.run(&["trace", "--pid", "1", "-o", "out"])?;
    assert_eq!(result.code(), Some(2));
    assert!(result.stderr().contains("failed to start tracer"));
    assert!(world.root().join("out").join("meta.json").is_file());
    Ok(())
}

// ABOUTME: Process-level tests using assert_cmd.
// ABOUTME: Exercises help/version/flag validation and signal handling of a live run.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_flags() {
    Command::cargo_bin("kmodeploy")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--debug"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn version_names_the_binary() {
    Command::cargo_bin("kmodeploy")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kmodeploy"));
}

#[test]
fn unknown_flag_is_rejected() {
    Command::cargo_bin("kmodeploy")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

/// Interrupt a live run with SIGINT while it is parked in the fetch backoff:
/// the process must exit 130 and the lock file must not outlive it.
#[test]
fn sigint_releases_lock_and_exits_130() {
    let dir = tempfile::tempdir().unwrap();
    let lock = dir.path().join("deploy.lock");
    let log = dir.path().join("run.log");

    // No tools to install, an unreachable repo, and a long backoff so the
    // run sits in the fetch retry sleep when the signal arrives.
    let config_path = dir.path().join("kmodeploy.yml");
    std::fs::write(
        &config_path,
        format!(
            "source_repo: \"file://{root}/absent.git\"\n\
             required_tools: []\n\
             lock_file: {lock}\n\
             log_file: {log}\n\
             backup_root: {root}/backups\n\
             fetch_attempts: 5\n\
             fetch_base_delay: 30s\n",
            root = dir.path().display(),
            lock = lock.display(),
            log = log.display(),
        ),
    )
    .unwrap();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("kmodeploy"))
        .arg("--config")
        .arg(&config_path)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    // Wait until the fetch stage has started (visible in the run log).
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let reached_fetch = std::fs::read_to_string(&log)
            .map(|c| c.contains("stage fetch started"))
            .unwrap_or(false);
        if reached_fetch {
            break;
        }
        if let Some(status) = child.try_wait().unwrap() {
            panic!("deployer exited before reaching fetch: {status}");
        }
        assert!(
            std::time::Instant::now() < deadline,
            "deployer never reached the fetch stage"
        );
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    // The first clone attempt fails within milliseconds; by now the run is
    // sleeping out the backoff.
    std::thread::sleep(std::time::Duration::from_millis(300));

    let kill = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));

    assert!(!lock.exists(), "lock must not outlive the interrupted run");
    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("Interrupted"));
    assert!(content.contains("deployment aborted by signal"));
}

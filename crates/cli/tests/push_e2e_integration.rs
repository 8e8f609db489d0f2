#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use tempfile::TempDir;

const JOBE: &str = env!("CARGO_BIN_EXE_jobe");

#[test]
fn push_to_intake_runs_job_and_publishes_result() {
    if !git_available() {
        eprintln!("skipping: git is not available");
        return;
    }
    let temp = TempDir::new().expect("tempdir should be created");
    let store = temp.path().join("store.git");
    let client = temp.path().join("client");

    let init = jobe(temp.path(), &["init", store.to_str().expect("utf8 store path"), "--json"]);
    assert!(init.status.success(), "init failed: {}", String::from_utf8_lossy(&init.stderr));
    assert!(store.join("hooks").join("post-receive").exists());

    run_git(temp.path(), &["clone", "--quiet", store.to_str().expect("utf8 store path"), "client"]);
    std::fs::write(client.join("jobe.ini"), "[jobe]\nrun = echo hello\nstart_time = +0\n")
        .expect("descriptor should be written");
    run_git(&client, &["add", "-A"]);
    run_git(
        &client,
        &[
            "-c",
            "user.name=Jobe Test",
            "-c",
            "user.email=jobe-test@example.test",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            "submit echo",
        ],
    );
    let push = git(&client, &["push", "origin", "HEAD:refs/heads/master"]);
    let push_output = String::from_utf8_lossy(&push.stderr).into_owned();
    assert!(push.status.success(), "push failed:\n{push_output}");

    let job_id = push_output
        .lines()
        .find_map(|line| line.split("jobe: accepted job ").nth(1))
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|| panic!("no job id in push output:\n{push_output}"));
    assert!(push_output.contains(&format!("git fetch && git checkout {job_id}")));

    let store_arg = store.to_str().expect("utf8 store path");
    let deadline = Instant::now() + Duration::from_secs(60);
    let shown = loop {
        let show = jobe(temp.path(), &["show", &job_id, "--repo", store_arg, "--json"]);
        assert!(show.status.success(), "show failed: {}", String::from_utf8_lossy(&show.stderr));
        let value: serde_json::Value =
            serde_json::from_slice(&show.stdout).expect("show should print JSON");
        if value["state"] != "pending" {
            break value;
        }
        assert!(Instant::now() < deadline, "job never finished; see {}", store.display());
        std::thread::sleep(Duration::from_millis(200));
    };

    assert_eq!(shown["state"], "succeeded");
    assert_eq!(shown["result"]["exit_code"], 0);

    let master_files = git(&store, &["ls-tree", "--name-only", "refs/heads/master"]);
    assert_eq!(String::from_utf8_lossy(&master_files.stdout), "jobe.ini\n");

    run_git(&client, &["fetch", "--quiet", "origin"]);
    let stdout = git(&client, &["show", &format!("origin/{job_id}:.jobe/stdout.log")]);
    assert_eq!(String::from_utf8_lossy(&stdout.stdout), "hello\n");
}

#[test]
fn show_outside_a_repository_exits_not_found() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("missing.git");

    let output = jobe(
        temp.path(),
        &["show", "7-3f5a9c2", "--repo", missing.to_str().expect("utf8 path"), "--json"],
    );

    assert_eq!(output.status.code(), Some(11));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("REPOSITORY_NOT_FOUND"), "stderr: {stderr}");
}

fn jobe(cwd: &Path, args: &[&str]) -> Output {
    Command::new(JOBE)
        .args(args)
        .current_dir(cwd)
        .env_remove("JOBE_BIN")
        .output()
        .expect("jobe should execute")
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok_and(|output| output.status.success())
}

fn git(cwd: &Path, args: &[&str]) -> Output {
    Command::new("git").args(args).current_dir(cwd).output().expect("git should execute")
}

fn run_git(cwd: &Path, args: &[&str]) {
    let output = git(cwd, args);
    assert!(
        output.status.success(),
        "git {:?} failed\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

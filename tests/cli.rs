use nix::sys::signal::{Signal, kill};
use nix::sys::stat::Mode;
use nix::unistd::{Pid, mkfifo};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Runs `minish -c <line>` inside `dir`, isolated from the user's config.
fn minish(dir: &Path, line: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minish"))
        .args(["-c", line])
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run minish")
}

/// Starts `minish` in the background inside `dir`.
fn spawn_minish(dir: &Path, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_minish"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run minish")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Polls `condition` for up to five seconds.
fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10));
    }
    false
}

/// First child process of the single-threaded process `pid`.
fn child_of(pid: u32) -> Option<u32> {
    let children = fs::read_to_string(format!("/proc/{pid}/task/{pid}/children")).ok()?;
    children.split_whitespace().next()?.parse().ok()
}

/// Whether `pid` has a handler installed for `signal`.
fn catches(pid: u32, signal: Signal) -> bool {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).unwrap_or_default();
    status
        .lines()
        .find_map(|line| line.strip_prefix("SigCgt:"))
        .and_then(|mask| u64::from_str_radix(mask.trim(), 16).ok())
        .is_some_and(|mask| mask & (1 << (signal as i32 - 1)) != 0)
}

fn send(pid: u32, signal: Signal) {
    kill(Pid::from_raw(pid as i32), signal).unwrap();
}

/// Waits for `child` to exit, killing it if it takes longer than ten seconds.
fn finish(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            child.wait().unwrap();
            panic!("minish did not exit");
        }
        sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_pipeline_reaches_stdout() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("words.txt"), "b\na\nb\n").unwrap();

    let out = minish(dir.path(), "cat words.txt | sort | uniq");
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(stdout(&out), "a\nb\n");
}

#[test]
fn test_redirections_in_either_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in.txt"), "x\n").unwrap();

    assert!(minish(dir.path(), "cat > one.txt < in.txt").status.success());
    assert!(minish(dir.path(), "cat < in.txt > two.txt").status.success());
    assert_eq!(fs::read_to_string(dir.path().join("one.txt")).unwrap(), "x\n");
    assert_eq!(fs::read_to_string(dir.path().join("two.txt")).unwrap(), "x\n");
}

#[test]
fn test_output_redirection_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    for _ in 0..2 {
        assert!(minish(dir.path(), "echo X > f").status.success());
    }
    assert_eq!(fs::read_to_string(dir.path().join("f")).unwrap(), "X\n");
}

#[test]
fn test_invalid_line_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();

    for line in ["echo a > b > c", "echo a | b > c", "echo a << b", "| wc"] {
        let out = minish(dir.path(), line);
        assert_eq!(out.status.code(), Some(2), "{line}");
        assert!(stdout(&out).contains("is not a valid command"), "{line}");
    }
    let created: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name())
        .filter(|name| name != ".config")
        .collect();
    assert!(created.is_empty(), "unexpected files {created:?}");
}

#[test]
fn test_exit_status_of_last_stage() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(minish(dir.path(), "true | false").status.code(), Some(1));
    assert_eq!(minish(dir.path(), "no-such-program-4711").status.code(), Some(127));
    assert_eq!(minish(dir.path(), "exit 5").status.code(), Some(5));
}

#[test]
fn test_interactive_session_reads_until_end_of_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_minish"))
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"echo one > a.txt\nhistory\nexit\necho never > b.txt\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();

    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.contains("echo one > a.txt\nhistory\n"), "{text:?}");
    assert!(text.contains("Exit requested"), "{text:?}");
    assert!(dir.path().join("a.txt").exists());
    assert!(!dir.path().join("b.txt").exists());
}

#[test]
fn test_dump_config_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_minish"))
        .arg("--dump-config")
        .env("HOME", dir.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("history_size = 10"), "{text}");
    assert!(text.contains("max_pipeline_stages = 256"), "{text}");
}

#[test]
fn test_bad_explicit_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[settings]\nhistory_size = \"ten\"\n").unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_minish"))
        .arg("--config")
        .arg(&config)
        .args(["-c", "true"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid config"));
}

#[test]
fn test_missing_input_file_is_reported_by_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let out = minish(dir.path(), "cat < missing.txt");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("minish: missing.txt: "), "{stderr}");
}

#[test]
fn test_input_redirection_blocked_on_a_fifo_can_be_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    mkfifo(&dir.path().join("fifo"), Mode::S_IRUSR | Mode::S_IWUSR).unwrap();

    let mut shell = spawn_minish(dir.path(), &["-c", "cat < fifo"]);
    let pid = shell.id();
    // The open blocks in a child, which has dropped the shell's handlers.
    let mut cat = None;
    let ready = eventually(|| {
        cat = child_of(pid);
        cat.is_some_and(|child| !catches(child, Signal::SIGINT))
    });
    assert!(ready, "no child is opening the fifo");

    send(cat.unwrap(), Signal::SIGINT);
    assert_eq!(finish(&mut shell).code(), Some(128 + Signal::SIGINT as i32));
}

#[test]
fn test_termination_while_reading_skips_the_pending_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut shell = spawn_minish(dir.path(), &[]);
    let pid = shell.id();
    assert!(eventually(|| catches(pid, Signal::SIGTERM)));

    send(pid, Signal::SIGTERM);
    let mut stdin = shell.stdin.take().unwrap();
    // The shell may already be gone if it saw the flag before reading.
    let _ = stdin.write_all(b"touch marker\n");
    drop(stdin);

    let status = finish(&mut shell);
    let out = shell.wait_with_output().unwrap();
    assert!(status.success());
    assert!(stdout(&out).contains("Exit requested"));
    assert!(!dir.path().join("marker").exists());
}

#[test]
fn test_termination_does_not_kill_the_running_command() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("slow.sh"), "sleep 0.5\ntouch done\n").unwrap();

    let mut shell = spawn_minish(dir.path(), &["-c", "sh slow.sh"]);
    let pid = shell.id();
    assert!(eventually(|| child_of(pid).is_some()));

    send(pid, Signal::SIGTERM);
    assert_eq!(finish(&mut shell).code(), Some(0));
    assert!(dir.path().join("done").exists());
}

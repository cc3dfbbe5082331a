use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("mixpanel-relay");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("mixpanel-relay"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute mixpanel-relay: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "mixpanel-relay {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn decode_prints_the_envelope() {
    let env = CliTestEnv::new();
    let args = [
        "decode",
        "eyJldmVudCI6ImV2ZW50X2ZvbyIsInByb3BlcnRpZXMiOnsidG9rZW4iOiJ0b2sifX0=",
    ];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("decode output is JSON");
    assert_eq!(
        value,
        serde_json::json!({"event": "event_foo", "properties": {"token": "tok"}})
    );
}

#[test]
fn disabled_config_sends_nothing() {
    let env = CliTestEnv::new();
    env.write_config("[api]\ntoken = \"tok\"\nserver = \"127.0.0.1:1\"\ndisabled = true\n");

    let args = ["track", "signup", "--properties", "{\"plan\": \"pro\"}"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("signup: delivery disabled"),
        "unexpected stdout:\n{stdout}"
    );
}

#[test]
fn config_shows_file_values_and_defaults() {
    let env = CliTestEnv::new();
    env.write_config("[api]\ntoken = \"from-file\"\n\n[delivery]\nmax_retries = 1\n");

    let output = run_bin(&env, &["config"]);
    assert_success(&["config"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("token = \"from-file\""));
    assert!(stdout.contains("tracking_endpoint = \"/track/\""));
    assert!(stdout.contains("max_retries = 1"));
}

#[test]
fn unknown_profile_operation_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["people", "frobnicate", "--distinct-id", "u1"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("invalid profile operation"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn unreachable_server_exhausts_retries() {
    let env = CliTestEnv::new();
    env.write_config(
        "[api]\ntoken = \"tok\"\nserver = \"127.0.0.1:1\"\n\n[delivery]\nmax_retries = 0\ntimeout_secs = 1\n",
    );

    let output = run_bin(&env, &["track", "signup"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("delivery failed after 1 attempts"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn non_finite_amount_is_rejected() {
    let env = CliTestEnv::new();
    env.write_config("[api]\ntoken = \"tok\"\nserver = \"127.0.0.1:1\"\n");

    let output = run_bin(
        &env,
        &["people", "track_charge", "--distinct-id", "u1", "--amount", "NaN"],
    );
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("amount must be a finite number"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn verbose_reports_the_log_file() {
    let env = CliTestEnv::new();
    env.write_config("[api]\ntoken = \"tok\"\ndisabled = true\n");

    let args = ["--verbose", "track", "signup"];
    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .find(|line| line.starts_with("Logging to "))
        .unwrap_or_else(|| panic!("no log path in stderr:\n{stderr}"));
    let path = PathBuf::from(line.trim_start_matches("Logging to "));
    assert!(path.starts_with(env.xdg_state.join("mixpanel-relay")));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("mixpanel-relay.log."));
}

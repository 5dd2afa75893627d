use std::{env, fs, path::PathBuf, process::Command};

fn run_bin(args: &[&str]) -> bool {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_orgtwin"));

    let output = Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command");

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");
    if !output.status.success() {
        eprintln!("{args:?} failed\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n");
    }

    output.status.success()
}

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "[engine]\n"
        + "seed = 42\n"
        + "\n"
        + "[market]\n"
        + "n_customers = 200\n"
        + "\n"
        + "[org]\n"
        + "initial_budget = 1000000.0\n"
        + "monthly_burn_rate = 150000.0\n"
        + "\n"
        + "[output]\n"
        + "days_per_save = 2\n"
        + "saves_per_file = 15\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    assert!(run_bin(&["--sim-dir", test_dir_str, "create"]));
    assert!(run_bin(&["--sim-dir", test_dir_str, "create"]));

    assert!(run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]));
    assert!(run_bin(&[
        "--sim-dir",
        test_dir_str,
        "crisis",
        "--run-idx",
        "0",
        "--kind",
        "key_talent_loss",
        "--severity",
        "0.8",
    ]));
    assert!(!run_bin(&[
        "--sim-dir",
        test_dir_str,
        "crisis",
        "--run-idx",
        "0",
        "--kind",
        "meteor_strike",
    ]));
    assert!(!run_bin(&[
        "--sim-dir",
        test_dir_str,
        "crisis",
        "--run-idx",
        "0",
        "--kind",
        "key_talent_loss",
        "--severity",
        "NaN",
    ]));
    assert!(run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "0"]));

    assert!(run_bin(&["--sim-dir", test_dir_str, "resume", "--run-idx", "1"]));

    assert!(run_bin(&["--sim-dir", test_dir_str, "status", "--run-idx", "1"]));
    assert!(!run_bin(&["--sim-dir", test_dir_str, "status", "--run-idx", "7"]));

    let run_dir = test_dir.join("run-0000");
    for file in [
        "checkpoint.msgpack",
        "trajectory-0000.msgpack",
        "trajectory-0001.msgpack",
        "trajectory-0002.msgpack",
    ] {
        assert!(run_dir.join(file).is_file(), "missing {file}");
    }

    assert!(run_bin(&["--sim-dir", test_dir_str, "analyze"]));
    assert!(run_dir.join("results.msgpack").is_file());

    assert!(run_bin(&["--sim-dir", test_dir_str, "clean"]));
    assert!(!run_dir.exists());

    fs::remove_dir_all(&test_dir).ok();
}

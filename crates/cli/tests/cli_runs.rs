use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

#[test]
fn create_info_utxos_flow() {
    let dir = TempDir::new().expect("tempdir");
    let dir_arg = dir.path().to_str().unwrap();

    let output = cargo_bin_cmd!("wallet-cli")
        .args([
            "create",
            "--dir",
            dir_arg,
            "--password",
            "pw",
            "--seed",
            "alpha beta gamma",
        ])
        .output()
        .expect("CLI execution failed");
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = cargo_bin_cmd!("wallet-cli")
        .args(["info", "--dir", dir_arg, "--password", "pw"])
        .output()
        .expect("CLI execution failed");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("height=0"), "stdout: {stdout}");
    assert!(stdout.contains("hash="), "stdout: {stdout}");

    let output = cargo_bin_cmd!("wallet-cli")
        .args(["utxos", "--dir", dir_arg, "--password", "pw"])
        .output()
        .expect("CLI execution failed");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("total=0"), "stdout: {stdout}");
}

#[test]
fn wrong_password_fails() {
    let dir = TempDir::new().expect("tempdir");
    let dir_arg = dir.path().to_str().unwrap();

    let output = cargo_bin_cmd!("wallet-cli")
        .args([
            "create",
            "--dir",
            dir_arg,
            "--password",
            "pw",
            "--seed",
            "seed",
        ])
        .output()
        .expect("CLI execution failed");
    assert!(output.status.success());

    let output = cargo_bin_cmd!("wallet-cli")
        .args(["info", "--dir", dir_arg, "--password", "other"])
        .output()
        .expect("CLI execution failed");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("wrong password"), "stderr: {stderr}");
}

#[test]
fn change_password_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let dir_arg = dir.path().to_str().unwrap();

    cargo_bin_cmd!("wallet-cli")
        .args([
            "create",
            "--dir",
            dir_arg,
            "--password",
            "old",
            "--seed",
            "seed",
        ])
        .output()
        .expect("CLI execution failed");

    let output = cargo_bin_cmd!("wallet-cli")
        .args([
            "change-password",
            "--dir",
            dir_arg,
            "--password",
            "old",
            "--new-password",
            "new",
        ])
        .output()
        .expect("CLI execution failed");
    assert!(
        output.status.success(),
        "change-password failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = cargo_bin_cmd!("wallet-cli")
        .args(["info", "--dir", dir_arg, "--password", "new"])
        .output()
        .expect("CLI execution failed");
    assert!(output.status.success());
}

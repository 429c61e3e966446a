use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn nova() -> Command {
    Command::cargo_bin("nova").unwrap()
}

fn tmp_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name)
}

#[test]
fn runs_without_arguments() {
    nova().assert().success();
}

#[test]
fn runs_add() {
    nova()
        .arg("run")
        .arg("tests/files/add.asm")
        .assert()
        .success()
        .stdout(contains("reg2: 5 (0x00000005)"))
        .stdout(contains("Halted"));
}

#[test]
fn path_shorthand_runs() {
    nova()
        .arg("tests/files/add.asm")
        .assert()
        .success()
        .stdout(contains("reg2: 5"));
}

#[test]
fn minimal_output_is_program_output_only() {
    nova()
        .arg("run")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .assert()
        .success()
        .stdout(predicate::eq(
            "reg0: 2 (0x00000002)\nreg0: 1 (0x00000001)\nreg0: 0 (0x00000000)\n",
        ));
}

#[test]
fn minimal_register_dump() {
    nova()
        .args(["run", "tests/files/add.asm", "--minimal", "--registers"])
        .assert()
        .success()
        .stdout(contains("R0 2\nR1 3\nR2 5\n"))
        .stdout(contains("PC 50\n"));
}

#[test]
fn checks_valid_file() {
    nova()
        .arg("check")
        .arg("tests/files/countdown.asm")
        .assert()
        .success()
        .stdout(contains("no errors found"));
}

#[test]
fn check_reports_undefined_label() {
    nova()
        .arg("check")
        .arg("tests/files/undefined.asm")
        .assert()
        .failure()
        .stderr(contains("nowhere"));
}

#[test]
fn compiles_then_runs_and_dumps_binary() {
    let out = tmp_path("add.bin");
    nova()
        .arg("compile")
        .arg("tests/files/add.asm")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("Saved"));

    let image = fs::read(&out).unwrap();
    assert_eq!(image.len(), 50);
    assert_eq!(&image[..10], &[0x05, 0, 0, 0, 0, 2, 0, 0, 0, 0]);
    assert_eq!(&image[40..], &[0; 10]);

    nova()
        .args(["run", "--minimal"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::eq("reg2: 5 (0x00000005)\n"));

    nova()
        .arg("dump")
        .arg(&out)
        .assert()
        .success()
        .stdout(contains("0x000000  0x2 -> reg0 byte"))
        .stdout(contains("dout reg2"))
        .stdout(contains("0x000028  hcf"));
}

#[test]
fn failed_compile_writes_nothing() {
    let out = tmp_path("undefined.bin");
    let _ = fs::remove_file(&out);
    nova()
        .arg("compile")
        .arg("tests/files/undefined.asm")
        .arg(&out)
        .assert()
        .failure();
    assert!(!out.exists());
}

#[test]
fn division_by_zero_faults() {
    nova()
        .args(["run", "tests/files/div_zero.asm", "--minimal"])
        .assert()
        .failure()
        .stderr(contains("Division by zero"));
}

#[test]
fn store_into_rom_faults() {
    nova()
        .args(["run", "tests/files/rom_write.asm", "--minimal"])
        .assert()
        .failure()
        .stderr(contains("read-only memory"));
}

#[test]
fn step_limit_stops_endless_loop() {
    nova()
        .args(["run", "tests/files/forever.asm", "--minimal", "--max-steps", "100"])
        .assert()
        .failure()
        .stderr(contains("did not halt"));
}

#[test]
fn dump_rejects_misaligned_image() {
    let out = tmp_path("misaligned.bin");
    fs::write(&out, [0u8; 7]).unwrap();
    nova().arg("dump").arg(&out).assert().failure();
}

#[test]
fn screenshot_is_written() {
    let out = tmp_path("screen.ppm");
    nova()
        .args(["run", "tests/files/add.asm", "--minimal", "--screenshot"])
        .arg(&out)
        .assert()
        .success();
    let image = fs::read(&out).unwrap();
    let header = b"P6\n320 240\n255\n";
    assert_eq!(&image[..header.len()], header);
    assert_eq!(image.len(), header.len() + 320 * 240 * 3);
}

#[test]
fn unknown_extension_is_rejected() {
    nova().arg("run").arg("Cargo.toml").assert().failure();
}

#[test]
fn trace_prints_each_record() {
    nova()
        .args(["run", "tests/files/add.asm"])
        .env("NOVA_TRACE", "1")
        .assert()
        .success()
        .stderr(contains("0x000000  0x2 -> reg0 byte"))
        .stderr(contains("0x00001e  dout reg2"))
        .stderr(contains("0x000028  hcf"));
}

#[test]
fn trace_is_off_by_default() {
    nova()
        .args(["run", "tests/files/add.asm"])
        .env_remove("NOVA_TRACE")
        .assert()
        .success()
        .stderr(contains("hcf").not());
}

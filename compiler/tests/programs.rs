use assert_cmd::Command;
use predicates::prelude::*;


fn run_program(prog_name: &str) -> assert_cmd::assert::Assert {
    let mut compiler_cmd = Command::cargo_bin("kaleidoc").unwrap();
    compiler_cmd
        .arg(&format!("../programs/{}.ks", prog_name))
        .env_remove("RUST_LOG")
        .assert()
}

#[test]
fn fib() {
    run_program("fib")
        .success()
        .stdout(predicate::str::contains("Evaluated to 55.000000"));
}

#[test]
fn stars() {
    run_program("stars")
        .success()
        .stdout(predicate::str::contains("declare double @putchard(double %char)"))
        .stdout(predicate::str::contains("Evaluated to 0.000000"))
        .stderr("*****");
}

#[test]
fn average() {
    run_program("average")
        .success()
        .stdout(predicate::str::contains("Evaluated to 3.500000"))
        .stdout(predicate::str::contains("fdiv double"))
        .stderr("1.500000\n");
}

#[test]
fn forward() {
    run_program("forward")
        .success()
        .stdout(predicate::str::contains("Evaluated to 12.000000"))
        .stderr("");
}

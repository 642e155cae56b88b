use predicates::prelude::*;

use super::common::TestEnv;

const PLAN: &str = r#"{
  "packages": [
    { "name": "lib", "inputs": ["src"], "commands": ["echo lib > \"$out/lib.txt\""] },
    { "name": "app", "dependencies": ["lib"], "commands": ["echo app > \"$out/app.txt\""] }
  ]
}"#;

#[cfg(unix)]
#[test]
fn second_build_is_cached() {
  let env = TestEnv::new();
  env.write_file("src/main.c", "int main() {}");
  env.write_file("build.json", PLAN);

  env
    .pkgver_cmd()
    .args(["build", "--plan", "build.json", "--work-dir", "work"])
    .assert()
    .success()
    .stdout(predicate::str::contains("2 built, 0 cached"));
  assert_eq!(env.read_file("work/output/app/app.txt"), "app\n");

  env
    .pkgver_cmd()
    .args(["build", "--plan", "build.json", "--work-dir", "work"])
    .assert()
    .success()
    .stdout(predicate::str::contains("0 built, 2 cached"));

  env.write_file("src/main.c", "int main() { return 1; }");
  env
    .pkgver_cmd()
    .args(["-o", "json", "build", "--plan", "build.json", "--work-dir", "work"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"ran\""))
    .stdout(predicate::str::contains("\"app\""));
}

#[test]
fn cyclic_plan_fails() {
  let env = TestEnv::new();
  env.write_file(
    "build.json",
    r#"{ "packages": [
      { "name": "a", "dependencies": ["b"], "commands": [] },
      { "name": "b", "dependencies": ["a"], "commands": [] }
    ] }"#,
  );

  env
    .pkgver_cmd()
    .args(["build", "--plan", "build.json"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cycle"));
}

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const TODAY: &str = "2024-03-15";

fn houseledger_cmd(home: &tempfile::TempDir, user: &str) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("houseledger"));
    cmd.env("HOUSELEDGER_HOME", home.path());
    cmd.env("HOUSELEDGER_USER", user);
    cmd.env("HOUSELEDGER_TODAY", TODAY);
    cmd
}

fn run_ok_out(home: &tempfile::TempDir, user: &str, args: &[&str]) -> String {
    let mut cmd = houseledger_cmd(home, user);
    cmd.args(args);
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).expect("utf8 stdout")
}

fn apply_json(home: &tempfile::TempDir, user: &str, json: &str) -> String {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(json.as_bytes()).expect("write edit-set");
    let path = file.path().to_str().expect("utf8 path").to_string();
    run_ok_out(home, user, &["apply", &path])
}

/// alice: Groceries (#1, private), Rent (#2, shared). bob: Coffee (#3, private).
fn household() -> tempfile::TempDir {
    let home = tempfile::tempdir().expect("tempdir");
    run_ok_out(&home, "", &["user", "add", "alice"]);
    run_ok_out(&home, "", &["user", "add", "bob"]);

    let out = run_ok_out(
        &home,
        "alice",
        &["add", "Groceries", "120.50", "--tag", "Mercado", "--date", "2024-03-02"],
    );
    assert_eq!(out, "Added expense #1.\n");
    run_ok_out(
        &home,
        "alice",
        &["add", "Rent", "1000", "--tag", "Casa", "--date", "2024-03-01", "--shared"],
    );
    run_ok_out(&home, "bob", &["add", "Coffee", "8", "--date", "2024-03-03"]);
    home
}

fn data_rows(list: &str) -> Vec<String> {
    list.lines().skip(1).map(str::to_string).collect()
}

#[test]
fn list_shows_own_rows_and_shared_rows_only() {
    let home = household();

    let out = run_ok_out(&home, "alice", &["list"]);
    assert_eq!(
        out,
        "pos\tid\tdate\tname\ttag\tamount\tshared\towner\n\
         0\t1\t2024-03-02\tGroceries\tMercado\t120.50\tno\talice\n\
         1\t2\t2024-03-01\tRent\tCasa\t1000.00\tyes\talice\n"
    );

    let out = run_ok_out(&home, "bob", &["list"]);
    let rows = data_rows(&out);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("Rent"));
    assert!(rows[1].contains("Coffee"));
}

#[test]
fn add_defaults_tag_and_date() {
    let home = tempfile::tempdir().expect("tempdir");
    run_ok_out(&home, "", &["user", "add", "alice"]);
    run_ok_out(&home, "alice", &["add", "Bus", "4,40"]);

    let out = run_ok_out(&home, "alice", &["list", "--json"]);
    let rows: serde_json::Value = serde_json::from_str(&out).expect("json list");
    assert_eq!(rows[0]["name"], "Bus");
    assert_eq!(rows[0]["tag"], "Outros");
    assert_eq!(rows[0]["date"], TODAY);
    assert_eq!(rows[0]["amount"], "4.40");
    assert_eq!(rows[0]["owner"], "alice");
}

#[test]
fn add_rejects_bad_amounts() {
    let home = tempfile::tempdir().expect("tempdir");
    run_ok_out(&home, "", &["user", "add", "alice"]);

    let mut cmd = houseledger_cmd(&home, "alice");
    cmd.args(["add", "Bread", "abc"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid amount: abc"));

    let mut cmd = houseledger_cmd(&home, "alice");
    cmd.args(["add", "Bread", "0"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be > 0"));

    let out = run_ok_out(&home, "alice", &["list"]);
    assert_eq!(out, "(no expenses)\n");
}

#[test]
fn oversized_amounts_are_rejected_and_reports_keep_working() {
    let home = household();
    let huge = "79228162514264337593543950335";

    for _ in 0..2 {
        let mut cmd = houseledger_cmd(&home, "alice");
        cmd.args(["add", "Yacht", huge]);
        cmd.assert()
            .failure()
            .stderr(predicate::str::contains("too large"));
    }

    let mut cmd = houseledger_cmd(&home, "alice");
    cmd.args(["edit", "1", "--amount", huge]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("too large"));

    let out = run_ok_out(&home, "alice", &["summary"]);
    assert!(out.contains("total\t620.50\n"));
    run_ok_out(&home, "alice", &["shared"]);
}

#[test]
fn positional_edit_set_deletes_then_updates_by_identity() {
    let home = household();

    // Position 1 is Rent; deleting position 0 first must not shift the edit.
    let out = apply_json(
        &home,
        "alice",
        r#"{"deleted": [0], "edited": {"1": {"amount": "50"}}}"#,
    );
    assert_eq!(out, "Applied: 0 added, 1 edited, 1 deleted.\n");

    let out = run_ok_out(&home, "alice", &["list"]);
    assert_eq!(
        data_rows(&out),
        vec!["0\t2\t2024-03-01\tRent\tCasa\t50.00\tyes\talice".to_string()]
    );

    // bob's private row is untouched.
    let out = run_ok_out(&home, "bob", &["list"]);
    assert!(out.contains("Coffee"));
}

#[test]
fn stale_positions_and_missing_ids_are_skipped_and_reported() {
    let home = household();

    let out = apply_json(
        &home,
        "alice",
        r#"{"deleted": [5], "edited_by_id": {"99": {"name": "Ghost"}}, "added": [{"name": "Milk", "amount": 6, "date": "2024-03-10"}]}"#,
    );
    assert_eq!(
        out,
        "Applied: 1 added, 0 edited, 0 deleted.\n\
         skipped\trow 5: no such row in the displayed ledger\n\
         skipped\texpense #99: row no longer exists (deleted elsewhere?)\n"
    );

    let out = run_ok_out(&home, "alice", &["rm", "1", "1234"]);
    assert_eq!(
        out,
        "Applied: 0 added, 0 edited, 1 deleted.\n\
         skipped\texpense #1234: row no longer exists (deleted elsewhere?)\n"
    );
}

#[test]
fn invalid_cell_aborts_the_whole_edit_set() {
    let home = household();
    let before = run_ok_out(&home, "alice", &["list"]);

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(br#"{"deleted": [0], "added": [{"name": "Milk", "amount": "lots"}]}"#)
        .expect("write edit-set");

    let mut cmd = houseledger_cmd(&home, "alice");
    cmd.args(["apply", file.path().to_str().expect("utf8 path")]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("added row 0: Invalid amount: lots"));

    assert_eq!(run_ok_out(&home, "alice", &["list"]), before);
}

#[test]
fn apply_reads_stdin_and_rejects_unknown_keys() {
    let home = household();

    let mut cmd = assert_cmd::Command::from_std(houseledger_cmd(&home, "alice"));
    cmd.args(["apply", "-"]);
    cmd.write_stdin(r#"{"edited": {"0": {"tag": "Feira"}}}"#);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Applied: 0 added, 1 edited, 0 deleted."));

    let out = run_ok_out(&home, "alice", &["list"]);
    assert!(out.contains("Groceries\tFeira"));

    let mut cmd = assert_cmd::Command::from_std(houseledger_cmd(&home, "alice"));
    cmd.args(["apply", "-"]);
    cmd.write_stdin(r#"{"removed": [0]}"#);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("malformed edit-set"));
}

#[test]
fn edit_by_id_changes_only_given_fields() {
    let home = household();

    let out = run_ok_out(
        &home,
        "alice",
        &["edit", "1", "--amount", "99.90", "--shared", "yes"],
    );
    assert_eq!(out, "Applied: 0 added, 1 edited, 0 deleted.\n");

    let out = run_ok_out(&home, "bob", &["list"]);
    assert!(out.contains("1\t2024-03-02\tGroceries\tMercado\t99.90\tyes\talice"));

    let out = run_ok_out(&home, "alice", &["edit", "1", "--amount", "99.9"]);
    assert_eq!(
        out,
        "Applied: 0 added, 0 edited, 0 deleted.\n\
         skipped\texpense #1: nothing changed\n"
    );

    let mut cmd = houseledger_cmd(&home, "alice");
    cmd.args(["edit", "1"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to edit"));
}

#[test]
fn summary_splits_shared_rows_across_the_household() {
    let home = household();

    let out = run_ok_out(&home, "alice", &["summary"]);
    assert!(out.contains("month\t2024-03\n"));
    assert!(out.contains("total\t620.50\n"));
    assert!(out.contains("daily_average\t41.37\n"));
    assert!(out.contains("Casa\t500.00\n"));
    assert!(out.contains("Mercado\t120.50\n"));

    let all_time = out.split("(tags all time)").nth(1).expect("all-time section");
    assert!(all_time.contains("Casa\t1000.00\n"));

    let out = run_ok_out(&home, "bob", &["summary", "--month", "2024-03"]);
    assert!(out.contains("total\t508.00\n"));

    let out = run_ok_out(&home, "bob", &["summary", "--month", "2024-02"]);
    assert!(out.contains("total\t0.00\n"));
}

#[test]
fn series_is_chronological() {
    let home = household();
    run_ok_out(&home, "alice", &["add", "Gas", "60", "--date", "2024-01-20"]);

    let out = run_ok_out(&home, "alice", &["series"]);
    assert_eq!(out, "2024-01\t60.00\n2024-03\t620.50\n");
}

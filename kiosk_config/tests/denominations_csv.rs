use std::fs::File;
use std::io::Write;

use kiosk_config::{check_denominations, load_denominations_csv};
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("denominations.csv");
    let mut f = File::create(&path).expect("create csv");
    f.write_all(contents.as_bytes()).expect("write csv");
    (dir, path)
}

#[rstest]
fn loads_table_in_file_order() {
    let (_dir, path) = write_csv("pulses,value\n1,1\n3,5\n6,10\n9,20\n");
    let rows = load_denominations_csv(&path).expect("load");
    assert_eq!(rows, vec![(1, 1), (3, 5), (6, 10), (9, 20)]);
}

#[rstest]
fn tolerates_padding_around_fields() {
    let (_dir, path) = write_csv("pulses,value\n 2 , 25 \n");
    let rows = load_denominations_csv(&path).expect("load");
    assert_eq!(rows, vec![(2, 25)]);
}

#[rstest]
#[case("count,value\n1,1\n", "headers 'pulses,value'")]
#[case("pulses,value\n1,abc\n", "invalid CSV row 2")]
#[case("pulses,value\n1,1\n1,5\n", "duplicate pulse count")]
#[case("pulses,value\n", "at least one row")]
#[case("pulses,value\n4,0\n", "must be > 0")]
fn rejects_bad_files(#[case] contents: &str, #[case] needle: &str) {
    let (_dir, path) = write_csv(contents);
    let err = load_denominations_csv(&path).expect_err("should fail");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "expected '{needle}' in '{msg}'");
}

#[rstest]
fn missing_file_names_the_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nope.csv");
    let err = load_denominations_csv(&path).expect_err("missing file");
    assert!(format!("{err}").contains("nope.csv"));
}

#[rstest]
fn stock_table_passes_checks() {
    check_denominations(&kiosk_config::DEFAULT_DENOMINATIONS).expect("stock table is valid");
}

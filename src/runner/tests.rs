//! Unit tests for the runner's configuration and output helpers.

use super::*;
use camino::Utf8PathBuf;
use clap::Parser as _;
use rstest::rstest;

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("gmake2cmake").chain(args.iter().copied()))
        .expect("parse")
}

#[rstest]
#[case(&[], false, false)]
#[case(&["-j", "4"], true, false)]
#[case(&["--break-cycles"], false, true)]
fn cli_flags_override_config(
    #[case] args: &[&str],
    #[case] parallel: bool,
    #[case] break_cycles: bool,
) {
    let config = load_config(&cli(args), Utf8Path::new("/work/zlib")).expect("config");
    assert_eq!(config.parallel, parallel);
    assert_eq!(config.break_cycles, break_cycles);
    assert_eq!(config.project_name(), "zlib");
}

#[rstest]
fn missing_config_file_is_an_error() {
    let err = load_config(&cli(&["--config", "/nonexistent/g2c.yaml"]), Utf8Path::new("/work"))
        .expect_err("missing config");
    assert!(err.to_string().contains("failed to load configuration"), "{err:#}");
}

#[rstest]
fn write_output_creates_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    let target = root.join("out/nested/ir.json");
    write_output("project IR", Some(target.as_path()), "{}").expect("write");
    assert_eq!(std::fs::read_to_string(&target).expect("read"), "{}");
}

#[rstest]
fn write_output_reports_the_destination() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    let err = write_output("run report", Some(root.as_path()), "{}").expect_err("directory target");
    insta::assert_snapshot!(
        err.to_string().replace(root.as_str(), "<dir>"),
        @"failed to write run report to <dir>"
    );
}

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vstage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vstage");
    path
}

const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n%%EOF\n";

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Temp dir with `config/vstage.toml` whose workdir is `<tmp>/stage`, and
/// an `inbox/` of mixed inputs.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let inbox = root.join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("notes.md"), "# Notes\n\nStaged as is.\n").unwrap();
    fs::write(inbox.join("report.pdf"), PDF_BYTES).unwrap();
    fs::write(inbox.join("people.csv"), "name,age\nAda,36\nAlan,41\n").unwrap();
    fs::write(
        inbox.join("bundle.zip"),
        zip_bytes(&[("docs/inner.txt", b"inside the archive\n")]),
    )
    .unwrap();

    let config_content = format!(
        r#"[stage]
workdir = "{}/stage"
max_rows_per_md = 100
jobs = 2

[convert]
binary = "{}/no-such-office-binary"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("vstage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vstage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vstage_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vstage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_formats_lists_registry() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_vstage(&config, &["formats"]);
    assert!(success, "formats failed: {}", stderr);
    assert!(stdout.contains(".pdf"));
    assert!(stdout.contains("application/pdf"));
    assert!(stdout.contains("indexable"));
    assert!(stdout.contains("unzip"));
    assert!(stdout.contains(".jpeg -> .jpg"));
}

#[test]
fn test_detect_sees_through_wrong_extension() {
    let (tmp, config) = setup_test_env();
    let disguised = tmp.path().join("invoice.txt");
    fs::write(&disguised, PDF_BYTES).unwrap();

    let (stdout, stderr, success) = run_vstage(&config, &["detect", disguised.to_str().unwrap()]);
    assert!(success, "detect failed: {}", stderr);
    let line = stdout.lines().next().unwrap();
    let cols: Vec<&str> = line.split('\t').collect();
    assert_eq!(cols[1], ".pdf");
    assert_eq!(cols[2], "application/pdf");
    assert_eq!(cols[3], "lib:infer:pdf");
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_detect_counts_missing_sources() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("gone.bin");
    let (stdout, _stderr, success) = run_vstage(&config, &["detect", missing.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("skipped: 1"));
}

#[test]
fn test_fetch_writes_normalized_names() {
    let (tmp, config) = setup_test_env();
    let src = tmp.path().join("Quarterly Report.txt");
    fs::write(&src, PDF_BYTES).unwrap();
    let png = tmp.path().join("logo.png");
    fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap();
    let noise = tmp.path().join("noise.bin");
    fs::write(&noise, [0u8, 159, 146, 150, 0, 1, 2, 3]).unwrap();
    let out = tmp.path().join("downloads");

    let (stdout, stderr, success) = run_vstage(
        &config,
        &[
            "fetch",
            src.to_str().unwrap(),
            png.to_str().unwrap(),
            noise.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ],
    );
    assert!(success, "fetch failed: {}", stderr);
    assert!(stdout.contains("quarterly_report.pdf\tapplication/pdf"));
    assert!(stdout.contains("logo.png\timage/png"));
    assert!(stdout.contains("fetched: 2"));
    assert!(stdout.contains("skipped: 1"));
    assert_eq!(fs::read(out.join("quarterly_report.pdf")).unwrap(), PDF_BYTES);
    assert!(out.join("logo.png").exists());
}

#[test]
fn test_stage_directory() {
    let (tmp, config) = setup_test_env();
    let inbox = tmp.path().join("inbox");

    let (stdout, stderr, success) = run_vstage(&config, &["stage", inbox.to_str().unwrap()]);
    assert!(success, "stage failed: {}", stderr);

    let staged: Vec<&str> = stdout
        .lines()
        .filter(|l| !l.contains(": ") && *l != "ok")
        .collect();
    assert!(staged.iter().any(|l| l.ends_with("notes.md")));
    assert!(staged.iter().any(|l| l.ends_with("report.pdf")));
    assert!(staged.iter().any(|l| l.ends_with("people.md")));
    assert!(staged.iter().any(|l| l.ends_with("inner.txt")));
    assert!(staged.iter().any(|l| l.ends_with("ZIP_MANIFEST.md")));
    assert!(stdout.contains("inputs: 4"));
    assert!(stdout.contains("staged: 5"));
    assert!(stdout.contains("unstageable: 0"));

    let table = staged.iter().find(|l| l.ends_with("people.md")).unwrap();
    let markdown = fs::read_to_string(table).unwrap();
    assert!(markdown.starts_with("# people.csv"));
    assert!(markdown.contains("| name | age |"));
    assert!(markdown.contains("| Ada | 36 |"));
    assert!(Path::new(table).starts_with(tmp.path().join("stage")));
}

#[test]
fn test_stage_workdir_flag_overrides_config() {
    let (tmp, config) = setup_test_env();
    let csv = tmp.path().join("inbox/people.csv");
    let workdir = tmp.path().join("elsewhere");

    let (stdout, stderr, success) = run_vstage(
        &config,
        &[
            "stage",
            csv.to_str().unwrap(),
            "--workdir",
            workdir.to_str().unwrap(),
        ],
    );
    assert!(success, "stage failed: {}", stderr);
    let line = stdout.lines().next().unwrap();
    assert!(Path::new(line).starts_with(&workdir), "staged at {}", line);
}

#[test]
fn test_stage_legacy_office_without_converter_fails() {
    let (tmp, config) = setup_test_env();
    let legacy = tmp.path().join("old.doc");
    fs::write(&legacy, [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]).unwrap();

    let (_stdout, stderr, success) = run_vstage(&config, &["stage", legacy.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("old.doc"), "stderr: {}", stderr);
}

#[test]
fn test_stage_missing_input_fails() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("missing");
    let (_stdout, stderr, success) = run_vstage(&config, &["stage", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Input does not exist"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[stage]\nmax_cols = 0\n").unwrap();

    let (_stdout, stderr, success) = run_vstage(&config, &["detect", "whatever"]);
    assert!(!success);
    assert!(stderr.contains("max_cols"), "stderr: {}", stderr);
}

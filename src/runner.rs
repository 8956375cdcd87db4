//! Directory Runner
//!
//! Reads the files of one directory into memory, runs them through the
//! engine and emits a JSON report. This is the only place that touches the
//! filesystem; the engine itself works on buffers.

use crate::{Config, DuplicateMap, EncodeReport, ImageDeduper, NamedImage, resolve};
use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;

/// What to scan and where the report goes.
#[derive(Debug)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    /// Print to stdout when absent.
    pub output: Option<PathBuf>,
    pub config: Config,
}

/// Scans `options.input_dir` for duplicate images and writes the report.
pub fn run(options: RunOptions) -> Result<()> {
    info!("Initializing scan with options: {:?}", options);

    let images = read_images(&options.input_dir)?;
    if images.is_empty() {
        warn!("No files found in {:?}.", options.input_dir);
    }

    let deduper = ImageDeduper::new(options.config).context("Invalid configuration")?;
    let config = deduper.config();

    let report = deduper
        .encode_images(&images)
        .context("Hash encoding failed")?;
    let duplicates = deduper
        .find_duplicates(&report.fingerprints, config.threshold, config.with_scores)
        .context("Duplicate search failed")?;
    let to_remove = resolve(&duplicates);
    info!(
        "Found {} image(s) with duplicates; {} can be removed.",
        duplicates.iter().filter(|(_, dups)| !dups.is_empty()).count(),
        to_remove.len()
    );

    let rendered = serde_json::to_string_pretty(&build_report(&report, &duplicates, &to_remove))?;
    match options.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create report directory")?;
            }
            fs::write(&path, rendered)
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Loads every regular file directly inside `dir`, sorted by file name so
/// that the survivor of each duplicate group is stable between runs.
pub fn read_images(dir: &std::path::Path) -> Result<Vec<NamedImage>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let bytes = fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(NamedImage::new(name, bytes))
        })
        .collect()
}

/// The JSON document printed by the command line tool.
pub fn build_report(report: &EncodeReport, duplicates: &DuplicateMap, to_remove: &[String]) -> Value {
    let skipped: Vec<Value> = report
        .skipped
        .iter()
        .map(|s| json!({ "name": s.name, "reason": s.reason.to_string() }))
        .collect();

    json!({
        "fingerprints": report.fingerprints,
        "skipped": skipped,
        "duplicates": duplicates,
        "to_remove": to_remove,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png() -> Vec<u8> {
        let image = RgbImage::from_fn(48, 48, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, ((x * y) % 256) as u8]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn files_are_read_in_name_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.png"), png()).unwrap();
        fs::write(dir.path().join("a.png"), png()).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let images = read_images(dir.path()).unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn run_writes_report_with_removal_list() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), png()).unwrap();
        fs::write(dir.path().join("b.png"), png()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"just text").unwrap();
        let output = dir.path().join("out").join("report.json");

        run(RunOptions {
            input_dir: dir.path().to_path_buf(),
            output: Some(output.clone()),
            config: Config {
                encode_workers: 2,
                distance_workers: 2,
                threshold: 0,
                ..Config::default()
            },
        })
        .unwrap();

        let report: Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(report["to_remove"], json!(["b.png"]));
        assert_eq!(report["duplicates"]["a.png"], json!(["b.png"]));
        assert_eq!(report["skipped"][0]["name"], "notes.txt");
        assert_eq!(report["fingerprints"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_images(&dir.path().join("absent")).is_err());
    }
}

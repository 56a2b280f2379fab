//! Catalog command: merge scraped registrar data into a compressed catalog.
//!
//! The scraper emits one JSON array of courses with raw, possibly duplicated
//! session rows. `nd catalog build` merges the rows, indexes session types and
//! writes the result as gzip-compressed JSON. Other commands read that file
//! back when no course server is configured.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use nd_core::catalog::Catalog;
use nd_core::course::{Course, ScrapedCourse};

/// Summary of a catalog build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub courses: usize,
    pub sessions: usize,
}

pub fn run<W: Write>(writer: &mut W, input: &Path, output: &Path, strip: bool) -> Result<()> {
    let stats = build(input, output, strip)?;
    writeln!(
        writer,
        "Wrote {} courses ({} sessions) to {}",
        stats.courses,
        stats.sessions,
        output.display()
    )?;
    Ok(())
}

/// Reads scraped courses from `input` and writes the merged catalog to `output`.
pub fn build(input: &Path, output: &Path, strip: bool) -> Result<BuildStats> {
    let file =
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let scraped: Vec<ScrapedCourse> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse scraped courses from {}", input.display()))?;

    let catalog = Catalog::build(scraped, strip);
    let stats = BuildStats {
        courses: catalog.len(),
        sessions: catalog.courses().iter().map(|c| c.sessions.len()).sum(),
    };
    write_catalog(output, catalog.courses())?;
    tracing::info!(
        courses = stats.courses,
        sessions = stats.sessions,
        path = %output.display(),
        "wrote catalog"
    );
    Ok(stats)
}

/// Writes courses as gzip JSON.
///
/// Writes atomically by writing to a uniquely named temp file then renaming.
fn write_catalog(path: &Path, courses: &[Course]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let result = write_gzip_json(&tmp_path, courses).and_then(|()| {
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to move catalog into {}", path.display()))
    });

    if result.is_err() {
        // Clean up temp file
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_gzip_json(path: &Path, courses: &[Course]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, courses).context("failed to serialize catalog")?;
    encoder
        .finish()
        .and_then(|mut inner| inner.flush())
        .context("failed to finish catalog file")
}

/// Loads the catalog at `path`.
///
/// A missing file yields an empty catalog so commands that do not need course
/// data still work before the first build.
pub fn load(path: &Path) -> Result<Catalog> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "no catalog found; run `nd catalog build`");
            return Ok(Catalog::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()));
        }
    };
    let courses: Vec<Course> = serde_json::from_reader(GzDecoder::new(BufReader::new(file)))
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    tracing::debug!(courses = courses.len(), path = %path.display(), "loaded catalog");
    Ok(Catalog::from_courses(courses))
}

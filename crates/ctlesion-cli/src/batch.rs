//! Parallel registration of the subjects listed in a TSV table.

use anyhow::{bail, Context, Result};
use ctlesion_pipeline::{RunRequest, TemplateAssets};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::{workflow, RunArgs};

/// One row of the subjects table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchEntry {
    pub subject: String,
    pub ct: PathBuf,
    /// Empty or missing runs the CT-only workflow.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub lesion: Option<PathBuf>,
}

/// Read the tab-separated subjects table. Relative paths are resolved
/// against the directory of the table.
pub fn read_subjects(path: &Path) -> Result<Vec<BatchEntry>> {
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open subjects table {}", path.display()))?;

    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let mut entry: BatchEntry = row.with_context(|| format!("Malformed row in {}", path.display()))?;
        entry.ct = base.join(&entry.ct);
        entry.lesion = entry
            .lesion
            .filter(|lesion| !lesion.as_os_str().is_empty())
            .map(|lesion| base.join(lesion));
        entries.push(entry);
    }
    Ok(entries)
}

pub fn run_batch(subjects: &Path, jobs: Option<usize>, run: &RunArgs) -> Result<()> {
    let entries = read_subjects(subjects)?;
    if entries.is_empty() {
        bail!("No subjects listed in {}", subjects.display());
    }
    let config = run.pipeline_config()?;
    let assets = TemplateAssets::from_dir(&run.templates)?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build().context("Failed to start the worker pool")?;

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} subjects ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    info!(subjects = entries.len(), threads = pool.current_num_threads(), "batch started");

    let failures: Vec<(String, anyhow::Error)> = pool.install(|| {
        entries
            .par_iter()
            .filter_map(|entry| {
                let result = register_subject(entry, &run.output, &config, &assets);
                pb.inc(1);
                pb.set_message(entry.subject.clone());
                result.err().map(|err| (entry.subject.clone(), err))
            })
            .collect()
    });
    pb.finish_with_message("done");

    for (subject, err) in &failures {
        error!(subject = %subject, "{:#}", err);
    }
    if !failures.is_empty() {
        bail!("{} of {} subjects failed", failures.len(), entries.len());
    }
    info!(subjects = entries.len(), "batch finished");
    Ok(())
}

/// Results of each subject land in `<output>/<subject>/`.
fn register_subject(
    entry: &BatchEntry,
    output: &Path,
    config: &ctlesion_pipeline::PipelineConfig,
    assets: &TemplateAssets,
) -> Result<()> {
    let output_dir = output.join(&entry.subject);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let request = RunRequest::new(&entry.ct, entry.lesion.clone(), output_dir);
    workflow(config.clone())
        .run_files(&request, assets, &Default::default())
        .with_context(|| format!("Subject {} failed", entry.subject))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("subjects.tsv");
        fs::write(
            &table,
            "subject\tct\tlesion\nsub-01\tsub-01/ct.nii.gz\tsub-01/lesion.nii.gz\nsub-02\t/data/ct.nii.gz\t\n",
        )
        .unwrap();

        let entries = read_subjects(&table).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].subject, "sub-01");
        assert_eq!(entries[0].ct, dir.path().join("sub-01/ct.nii.gz"));
        assert_eq!(entries[0].lesion, Some(dir.path().join("sub-01/lesion.nii.gz")));
        assert_eq!(entries[1].ct, PathBuf::from("/data/ct.nii.gz"));
        assert_eq!(entries[1].lesion, None);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let table = dir.path().join("subjects.tsv");
        fs::write(&table, "subject\nsub-01\n").unwrap();
        assert!(read_subjects(&table).is_err());
    }
}

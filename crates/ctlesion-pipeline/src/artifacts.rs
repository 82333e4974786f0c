//! Artifact naming, persistence and the run manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;
use ctlesion_core::image::Volume;
use ctlesion_core::transform::AffineMatrix;
use ctlesion_io::{write_affine, write_volume};
use serde::Serialize;
use tracing::debug;
use crate::config::PipelineConfig;
use crate::error::{EngineError, PipelineError, Result, Stage, StageResultExt};

/// File name of the exclusion mask, shared by every subject.
pub const EXCLUSION_MASK_FILE: &str = "ct_mask_no_lesion_pre_mni.nii.gz";

/// Every file a workflow writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    NoDevice,
    Skull,
    AffineMatrix,
    PreTemplateCt,
    ContrastStretched,
    PreTemplateContrastStretched,
    PreTemplateLesion,
    ExclusionMask,
    TemplateCt,
    TemplateLesion,
    Manifest,
}

impl Artifact {
    /// Suffix appended to the scan or lesion basename.
    pub fn suffix(self) -> &'static str {
        match self {
            Artifact::NoDevice => "no_device.nii.gz",
            Artifact::Skull => "skull.nii.gz",
            Artifact::AffineMatrix => "affine.mat",
            Artifact::PreTemplateCt => "pre_mni_no_device.nii.gz",
            Artifact::ContrastStretched => "contrast_stretching.nii.gz",
            Artifact::PreTemplateContrastStretched => "pre_mni_contrast_stretched.nii.gz",
            Artifact::PreTemplateLesion => "pre_mni.nii.gz",
            Artifact::ExclusionMask => EXCLUSION_MASK_FILE,
            Artifact::TemplateCt | Artifact::TemplateLesion => "MNI152.nii.gz",
            Artifact::Manifest => "manifest.json",
        }
    }

    /// Files that only feed later stages of the same run.
    pub fn is_intermediate(self) -> bool {
        matches!(self, Artifact::NoDevice | Artifact::Skull | Artifact::ContrastStretched)
    }

    fn uses_lesion_name(self) -> bool {
        matches!(self, Artifact::PreTemplateLesion | Artifact::TemplateLesion)
    }
}

/// Name of a NIfTI file without its `.nii` / `.nii.gz` extension.
pub fn scan_basename(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::invalid_input(format!("{} has no file name", path.display())))?;
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(name);
    if stem.is_empty() {
        return Err(PipelineError::invalid_input(format!("{} has an empty basename", path.display())));
    }
    Ok(stem.to_string())
}

/// Deterministic artifact paths of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    output_dir: PathBuf,
    ct_name: String,
    lesion_name: Option<String>,
}

impl ArtifactNames {
    pub fn new(output_dir: impl Into<PathBuf>, ct_name: impl Into<String>, lesion_name: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ct_name: ct_name.into(),
            lesion_name,
        }
    }

    /// Names derived from the input file names.
    pub fn for_inputs(output_dir: &Path, ct_path: &Path, lesion_path: Option<&Path>) -> Result<Self> {
        let lesion_name = lesion_path.map(scan_basename).transpose()?;
        Ok(Self::new(output_dir, scan_basename(ct_path)?, lesion_name))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ct_name(&self) -> &str {
        &self.ct_name
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        if artifact == Artifact::ExclusionMask {
            return self.output_dir.join(EXCLUSION_MASK_FILE);
        }
        let base = match (&self.lesion_name, artifact.uses_lesion_name()) {
            (Some(lesion), true) => lesion.as_str(),
            _ => self.ct_name.as_str(),
        };
        self.output_dir.join(format!("{}_{}", base, artifact.suffix()))
    }
}

/// Receives the artifacts of a run.
pub trait ArtifactSink<B: Backend> {
    fn volume(&mut self, artifact: Artifact, path: &Path, volume: &Volume<B, 3>) -> Result<()>;

    fn affine(&mut self, path: &Path, matrix: &AffineMatrix) -> Result<()>;

    fn manifest(&mut self, path: &Path, manifest: &RunManifest) -> Result<()>;
}

/// Writes artifacts to disk. An existing file is replaced whole, never
/// left half written.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl<B: Backend> ArtifactSink<B> for FileSink {
    fn volume(&mut self, artifact: Artifact, path: &Path, volume: &Volume<B, 3>) -> Result<()> {
        debug!(?artifact, path = %path.display(), "writing volume");
        replace_file(path, |partial| write_volume(partial, volume))
    }

    fn affine(&mut self, path: &Path, matrix: &AffineMatrix) -> Result<()> {
        debug!(path = %path.display(), "writing affine");
        replace_file(path, |partial| write_affine(partial, matrix))
    }

    fn manifest(&mut self, path: &Path, manifest: &RunManifest) -> Result<()> {
        debug!(path = %path.display(), "writing manifest");
        let json = serde_json::to_string_pretty(manifest).stage(Stage::Persist)?;
        replace_file(path, |partial| std::fs::write(partial, json))
    }
}

/// Run `write` on a temporary file in the directory of `path`, then rename
/// it onto `path`. The temporary file keeps the extension of `path`.
pub(crate) fn replace_file<F, E>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> std::result::Result<(), E>,
    E: Into<EngineError>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| PipelineError::invalid_input(format!("{} is not a file path", path.display())))?;
    let partial = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(name)
        .tempfile_in(dir)
        .stage(Stage::Persist)?;
    write(partial.path()).stage(Stage::Persist)?;
    partial.persist(path).stage(Stage::Persist)?;
    Ok(())
}

/// Keeps artifacts in memory.
#[derive(Debug, Clone)]
pub struct MemorySink<B: Backend> {
    pub volumes: BTreeMap<Artifact, (PathBuf, Volume<B, 3>)>,
    pub affine: Option<(PathBuf, AffineMatrix)>,
    pub manifest: Option<RunManifest>,
}

impl<B: Backend> Default for MemorySink<B> {
    fn default() -> Self {
        Self {
            volumes: BTreeMap::new(),
            affine: None,
            manifest: None,
        }
    }
}

impl<B: Backend> MemorySink<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, artifact: Artifact) -> Option<&Volume<B, 3>> {
        self.volumes.get(&artifact).map(|(_, volume)| volume)
    }
}

impl<B: Backend> ArtifactSink<B> for MemorySink<B> {
    fn volume(&mut self, artifact: Artifact, path: &Path, volume: &Volume<B, 3>) -> Result<()> {
        self.volumes.insert(artifact, (path.to_path_buf(), volume.clone()));
        Ok(())
    }

    fn affine(&mut self, path: &Path, matrix: &AffineMatrix) -> Result<()> {
        self.affine = Some((path.to_path_buf(), *matrix));
        Ok(())
    }

    fn manifest(&mut self, _path: &Path, manifest: &RunManifest) -> Result<()> {
        self.manifest = Some(manifest.clone());
        Ok(())
    }
}

/// Deformable stage summary stored in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeformableSummary {
    pub initial_loss: f64,
    pub final_loss: f64,
    pub order: u32,
}

/// Record of one run: what was written and with which settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunManifest {
    pub ct_name: String,
    pub artifacts: BTreeMap<Artifact, PathBuf>,
    pub affine: Option<[[f64; 4]; 4]>,
    pub deformable: Option<DeformableSummary>,
    pub config: PipelineConfig,
}

impl RunManifest {
    pub fn new(ct_name: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            ct_name: ct_name.into(),
            artifacts: BTreeMap::new(),
            affine: None,
            deformable: None,
            config: config.clone(),
        }
    }

    pub fn record(&mut self, artifact: Artifact, path: PathBuf) {
        self.artifacts.insert(artifact, path);
    }
}

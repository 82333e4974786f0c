//! Workflow orchestration: the lesion (or CT-only) registration run and the
//! ventricle removal run.

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;
use ctlesion_core::image::{Volume, VolumeKind};
use ctlesion_core::transform::AffineMatrix;
use ctlesion_io::{read_volume, write_volume, ParticipantsTable};
use ctlesion_registration::{AffineSolver, DeformableSolver};
use tracing::{debug, info};
use crate::affine_stage::{apply_affine, compute_affine};
use crate::artifacts::{replace_file, Artifact, ArtifactNames, ArtifactSink, DeformableSummary, FileSink, RunManifest};
use crate::assets::{TemplateAssets, Templates};
use crate::config::PipelineConfig;
use crate::deformable_stage::{compute_deformable, propagate_label};
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::exclusion::{build_ct_mask, build_exclusion_mask};
use crate::preprocess::{bound_intensity, extract_skull, DeviceRemover, LargestComponentDeviceRemoval};
use crate::ventricle::{remove_ventricles, AgeBand, AgeBandTable};

/// Subject-space inputs of a registration run.
#[derive(Debug, Clone)]
pub struct SubjectScan<B: Backend> {
    pub ct: Volume<B, 3>,
    /// Lesion annotation in the CT's physical space, on any grid. `None`
    /// runs the CT-only variant.
    pub lesion: Option<Volume<B, 3>>,
}

/// Input files of a registration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub ct: PathBuf,
    pub lesion: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl RunRequest {
    pub fn new(ct: impl Into<PathBuf>, lesion: Option<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            ct: ct.into(),
            lesion,
            output_dir: output_dir.into(),
        }
    }

    /// Inputs must exist and the output directory must already be there.
    pub fn validate(&self) -> Result<()> {
        if !self.ct.is_file() {
            return Err(PipelineError::invalid_input(format!(
                "CT scan path does not exist (could not find: {})",
                self.ct.display()
            )));
        }
        if let Some(lesion) = &self.lesion {
            if !lesion.is_file() {
                return Err(PipelineError::invalid_input(format!(
                    "lesion mask path does not exist (could not find: {})",
                    lesion.display()
                )));
            }
        }
        if !self.output_dir.is_dir() {
            return Err(PipelineError::invalid_input(format!(
                "output path does not exist (could not find: {})",
                self.output_dir.display()
            )));
        }
        Ok(())
    }
}

/// In-memory results of a registration run.
#[derive(Debug, Clone)]
pub struct WorkflowOutput<B: Backend> {
    pub affine: AffineMatrix,
    pub exclusion_mask: Volume<B, 3>,
    pub template_ct: Volume<B, 3>,
    pub template_lesion: Option<Volume<B, 3>>,
    pub manifest: RunManifest,
}

/// Subject CT (and lesion) to template registration.
///
/// Stages run strictly in order; the first failure ends the run.
pub struct LesionWorkflow<B: Backend, A, S> {
    config: PipelineConfig,
    affine_solver: A,
    deformable_solver: S,
    device_remover: Box<dyn DeviceRemover<B> + Send + Sync>,
}

impl<B, A, S> LesionWorkflow<B, A, S>
where
    B: Backend,
    A: AffineSolver<B>,
    S: DeformableSolver<B>,
{
    pub fn new(config: PipelineConfig, affine_solver: A, deformable_solver: S) -> Self {
        let device_remover = Box::new(LargestComponentDeviceRemoval::from(&config.device_removal));
        Self {
            config,
            affine_solver,
            deformable_solver,
            device_remover,
        }
    }

    pub fn with_device_remover(mut self, remover: impl DeviceRemover<B> + Send + Sync + 'static) -> Self {
        self.device_remover = Box::new(remover);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn affine_solver(&self) -> &A {
        &self.affine_solver
    }

    pub fn deformable_solver(&self) -> &S {
        &self.deformable_solver
    }

    fn emit(
        &self,
        sink: &mut dyn ArtifactSink<B>,
        manifest: &mut RunManifest,
        names: &ArtifactNames,
        artifact: Artifact,
        volume: &Volume<B, 3>,
    ) -> Result<()> {
        if artifact.is_intermediate() && !self.config.keep_intermediates {
            debug!(?artifact, "intermediate artifact skipped");
            return Ok(());
        }
        let path = names.path(artifact);
        sink.volume(artifact, &path, volume)?;
        manifest.record(artifact, path);
        Ok(())
    }

    /// Run every stage on loaded volumes, handing each artifact to `sink`.
    pub fn run(
        &self,
        scan: SubjectScan<B>,
        templates: &Templates<B>,
        names: &ArtifactNames,
        sink: &mut dyn ArtifactSink<B>,
    ) -> Result<WorkflowOutput<B>> {
        self.config.validate()?;
        let target = self.config.deformable_target;
        let deformable_fixed = templates.deformable_fixed(target)?;
        let mut manifest = RunManifest::new(names.ct_name(), &self.config);
        let reference = templates.t1.geometry();
        let SubjectScan { ct, lesion } = scan;
        info!(ct = names.ct_name(), lesion = lesion.is_some(), "registration run started");

        // 1. Preprocessing
        let ct = if self.config.device_removal.enabled {
            info!(remover = self.device_remover.name(), "device removal");
            let cleaned = self.device_remover.remove(&ct).stage(Stage::DeviceRemoval)?;
            self.emit(sink, &mut manifest, names, Artifact::NoDevice, &cleaned)?;
            cleaned
        } else {
            ct
        };
        let skull = extract_skull(&ct, self.config.skull_threshold, self.config.skull_min_size)
            .stage(Stage::SkullExtraction)?;
        self.emit(sink, &mut manifest, names, Artifact::Skull, &skull)?;

        // 2. Affine alignment, computed once and reused
        let affine = compute_affine(&self.affine_solver, &skull, &templates.bone)?;
        let affine_path = names.path(Artifact::AffineMatrix);
        sink.affine(&affine_path, &affine)?;
        manifest.record(Artifact::AffineMatrix, affine_path);
        manifest.affine = Some(affine.to_rows());

        let ct_pre = apply_affine(&affine, &ct, &reference)?;
        self.emit(sink, &mut manifest, names, Artifact::PreTemplateCt, &ct_pre)?;

        let [lower, upper] = self.config.intensity_window;
        let stretched = bound_intensity(&ct, lower, upper).stage(Stage::IntensityBounding)?;
        self.emit(sink, &mut manifest, names, Artifact::ContrastStretched, &stretched)?;
        let stretched_pre = apply_affine(&affine, &stretched, &reference)?;
        self.emit(sink, &mut manifest, names, Artifact::PreTemplateContrastStretched, &stretched_pre)?;

        let lesion_pre = match &lesion {
            Some(lesion) => {
                let lesion_pre = apply_affine(&affine, lesion, &reference)?;
                self.emit(sink, &mut manifest, names, Artifact::PreTemplateLesion, &lesion_pre)?;
                Some(lesion_pre)
            }
            None => None,
        };

        // 3. Exclusion mask
        let exclusion_mask = match &lesion_pre {
            Some(lesion_pre) => build_exclusion_mask(&stretched_pre, lesion_pre)?,
            None => build_ct_mask(&stretched_pre),
        };
        self.emit(sink, &mut manifest, names, Artifact::ExclusionMask, &exclusion_mask)?;

        // 4. Deformable alignment, reused for the lesion at order 0
        info!(%target, "deformable target");
        let deformable = compute_deformable(
            &self.deformable_solver,
            deformable_fixed,
            &stretched_pre,
            &exclusion_mask,
            &templates.bspline_parameters,
        )?;
        self.emit(sink, &mut manifest, names, Artifact::TemplateCt, &deformable.registered)?;
        manifest.deformable = Some(DeformableSummary {
            initial_loss: deformable.initial_loss,
            final_loss: deformable.final_loss,
            order: deformable.transform.order(),
        });

        let template_lesion = match &lesion_pre {
            Some(lesion_pre) => {
                let warped = propagate_label(&deformable.transform, lesion_pre)?;
                self.emit(sink, &mut manifest, names, Artifact::TemplateLesion, &warped)?;
                Some(warped)
            }
            None => None,
        };

        let manifest_path = names.path(Artifact::Manifest);
        manifest.record(Artifact::Manifest, manifest_path.clone());
        sink.manifest(&manifest_path, &manifest)?;
        info!(artifacts = manifest.artifacts.len(), "registration run finished");

        Ok(WorkflowOutput {
            affine,
            exclusion_mask,
            template_ct: deformable.registered,
            template_lesion,
            manifest,
        })
    }

    /// Read the inputs and templates, run, and write every artifact under
    /// the request's output directory.
    pub fn run_files(&self, request: &RunRequest, assets: &TemplateAssets, device: &B::Device) -> Result<RunManifest> {
        request.validate()?;
        let names = ArtifactNames::for_inputs(&request.output_dir, &request.ct, request.lesion.as_deref())?;
        let templates = assets.load::<B>(self.config.deformable_target, device)?;

        let ct = read_volume(&request.ct, VolumeKind::ContinuousIntensity, device).stage(Stage::Load)?;
        let lesion = match &request.lesion {
            Some(path) => Some(read_volume(path, VolumeKind::BinaryLabel, device).stage(Stage::Load)?),
            None => None,
        };
        // The lesion is resampled from its own header, like the CT.
        if let Some(lesion) = &lesion {
            if !ct.geometry().same_grid(&lesion.geometry()) {
                debug!(ct = ?ct.shape(), lesion = ?lesion.shape(), "lesion mask is not on the CT grid");
            }
        }

        let output = self.run(SubjectScan { ct, lesion }, &templates, &names, &mut FileSink)?;
        Ok(output.manifest)
    }
}

/// Input and output paths of the ventricle run inside a BIDS project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VentriclePaths {
    pub participants: PathBuf,
    pub lesion: PathBuf,
    pub output: PathBuf,
}

impl VentriclePaths {
    pub fn new(project: &Path, subject: &str) -> Self {
        let ct_dir = project.join(subject).join("ct");
        Self {
            participants: project.join("participants.tsv"),
            lesion: ct_dir.join("lesion_mask_MNI152.nii.gz"),
            output: ct_dir.join("lesion_mask_mni_novent.nii.gz"),
        }
    }
}

/// Removes the age-matched ventricle template from a template-space lesion.
#[derive(Debug, Clone, Default)]
pub struct VentricleRemovalWorkflow {
    table: AgeBandTable,
}

impl VentricleRemovalWorkflow {
    pub fn new(table: AgeBandTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &AgeBandTable {
        &self.table
    }

    /// Select the band of `age`, load its mask with `load_mask` and
    /// subtract it from `lesion`.
    pub fn remove<B, F>(&self, lesion: &Volume<B, 3>, age: f64, load_mask: F) -> Result<(AgeBand, Volume<B, 3>)>
    where
        B: Backend,
        F: FnOnce(&AgeBand) -> Result<Volume<B, 3>>,
    {
        let band = self.table.select(age)?;
        info!(age, band = %band, "ventricle template selected");
        let ventricle = load_mask(&band)?;
        let cleaned = remove_ventricles(lesion, &ventricle)?;
        Ok((band, cleaned))
    }

    /// Ventricle run for `subject` of the project at `project`.
    pub fn run_project<B: Backend>(
        &self,
        project: &Path,
        subject: &str,
        assets: &TemplateAssets,
        device: &B::Device,
    ) -> Result<PathBuf> {
        if !project.is_dir() {
            return Err(PipelineError::invalid_input(format!(
                "project path does not exist (could not find: {})",
                project.display()
            )));
        }
        if !project.join(subject).is_dir() {
            return Err(PipelineError::invalid_input(format!("folder for {} does not exist", subject)));
        }
        let paths = VentriclePaths::new(project, subject);

        let participants = ParticipantsTable::from_file(&paths.participants)
            .map_err(|e| PipelineError::metadata(format!("{:#}", e)))?;
        let age = participants
            .age_of(subject)
            .map_err(|e| PipelineError::metadata(format!("{:#}", e)))?;

        if !paths.lesion.is_file() {
            return Err(PipelineError::invalid_input(format!(
                "template-space lesion mask not found (could not find: {})",
                paths.lesion.display()
            )));
        }
        let lesion = read_volume::<B, _>(&paths.lesion, VolumeKind::BinaryLabel, device).stage(Stage::Load)?;

        let (_, cleaned) = self.remove(&lesion, age, |band| assets.load_ventricle_mask::<B>(band, device))?;
        debug!(path = %paths.output.display(), "writing lesion without ventricles");
        replace_file(&paths.output, |partial| write_volume(partial, &cleaned))?;
        info!(subject, voxels = cleaned.count_nonzero().stage(Stage::VentricleRemoval)?, "ventricle removal finished");
        Ok(paths.output)
    }
}

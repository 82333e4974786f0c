//! Template files in MNI152 space.

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;
use ctlesion_core::image::{Volume, VolumeKind};
use ctlesion_io::{read_volume, ParameterMap};
use tracing::debug;
use crate::config::DeformableTarget;
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::ventricle::AgeBand;

pub const BONE_TEMPLATE: &str = "MNI152_T1_1mm_bone.nii.gz";
pub const T1_TEMPLATE: &str = "MNI152_T1_1mm.nii.gz";
pub const BRAIN_TEMPLATE: &str = "MNI152_T1_1mm_brain.nii.gz";
pub const BSPLINE_PARAMETERS: &str = "Par0000bspline.txt";
pub const VENTRICLES_DIR: &str = "ventricles";

/// Paths of the template files under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAssets {
    root: PathBuf,
}

impl TemplateAssets {
    /// Check that `dir` holds the registration templates.
    ///
    /// The brain template and the ventricle masks are only checked when one
    /// is asked for.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(PipelineError::invalid_input(format!(
                "template directory does not exist (could not find: {})",
                root.display()
            )));
        }
        let assets = Self { root };
        for path in [assets.bone(), assets.t1(), assets.bspline_parameters()] {
            if !path.is_file() {
                return Err(PipelineError::invalid_input(format!("missing template file {}", path.display())));
            }
        }
        debug!(root = %assets.root.display(), "template assets found");
        Ok(assets)
    }

    /// Check only that `dir` holds a ventricle mask directory.
    pub fn for_ventricles<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let ventricles = root.join(VENTRICLES_DIR);
        if !ventricles.is_dir() {
            return Err(PipelineError::invalid_input(format!(
                "ventricle template directory does not exist (could not find: {})",
                ventricles.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bone(&self) -> PathBuf {
        self.root.join(BONE_TEMPLATE)
    }

    pub fn t1(&self) -> PathBuf {
        self.root.join(T1_TEMPLATE)
    }

    pub fn brain(&self) -> PathBuf {
        self.root.join(BRAIN_TEMPLATE)
    }

    pub fn bspline_parameters(&self) -> PathBuf {
        self.root.join(BSPLINE_PARAMETERS)
    }

    pub fn ventricle_mask(&self, band: &AgeBand) -> PathBuf {
        self.root
            .join(VENTRICLES_DIR)
            .join(format!("{}_ventricles_MNI152.nii.gz", band))
    }

    /// Read the registration templates, with the brain template when the
    /// deformable stage targets it.
    pub fn load<B: Backend>(&self, target: DeformableTarget, device: &B::Device) -> Result<Templates<B>> {
        let brain = match target {
            DeformableTarget::WholeHead => None,
            DeformableTarget::Brain => {
                let path = self.brain();
                if !path.is_file() {
                    return Err(PipelineError::invalid_input(format!("missing template file {}", path.display())));
                }
                Some(read_volume(path, VolumeKind::ContinuousIntensity, device).stage(Stage::Load)?)
            }
        };
        Ok(Templates {
            bone: read_volume(self.bone(), VolumeKind::ContinuousIntensity, device).stage(Stage::Load)?,
            t1: read_volume(self.t1(), VolumeKind::ContinuousIntensity, device).stage(Stage::Load)?,
            brain,
            bspline_parameters: ParameterMap::from_file(self.bspline_parameters()).stage(Stage::Load)?,
        })
    }

    /// Read the ventricle mask of `band` as a label volume.
    pub fn load_ventricle_mask<B: Backend>(&self, band: &AgeBand, device: &B::Device) -> Result<Volume<B, 3>> {
        let path = self.ventricle_mask(band);
        if !path.is_file() {
            return Err(PipelineError::invalid_input(format!("missing ventricle template {}", path.display())));
        }
        read_volume(path, VolumeKind::BinaryLabel, device).stage(Stage::Load)
    }
}

/// Loaded registration templates.
#[derive(Debug, Clone)]
pub struct Templates<B: Backend> {
    /// Skull template, fixed volume of the affine stage.
    pub bone: Volume<B, 3>,
    /// T1 template, reference grid of every resampling and whole-head
    /// target of the deformable stage.
    pub t1: Volume<B, 3>,
    /// Skull-stripped T1 template on the T1 grid.
    pub brain: Option<Volume<B, 3>>,
    pub bspline_parameters: ParameterMap,
}

impl<B: Backend> Templates<B> {
    /// Fixed volume of the deformable stage for `target`.
    pub fn deformable_fixed(&self, target: DeformableTarget) -> Result<&Volume<B, 3>> {
        match target {
            DeformableTarget::WholeHead => Ok(&self.t1),
            DeformableTarget::Brain => self
                .brain
                .as_ref()
                .ok_or_else(|| PipelineError::invalid_input("brain template was not loaded")),
        }
    }
}

//! CT lesion to MNI152 registration and ventricle removal workflows.
//!
//! A lesion run goes through these stages, in order:
//!
//! 1. optional scanner-device removal, skull extraction and HU bounding
//!    ([`preprocess`])
//! 2. affine alignment of the skull to the template skull, propagated to the
//!    CT, the bounded CT and the lesion ([`affine_stage`])
//! 3. the exclusion mask `binarize(CT) AND NOT lesion` ([`exclusion`])
//! 4. masked deformable alignment to the whole-head or brain T1 template,
//!    reused at order 0 for the lesion ([`deformable_stage`])
//!
//! The ventricle run ([`VentricleRemovalWorkflow`]) then subtracts an
//! age-matched ventricle template from the template-space lesion.

pub mod error;
pub mod config;
pub mod assets;
pub mod artifacts;
pub mod preprocess;
pub mod affine_stage;
pub mod exclusion;
pub mod deformable_stage;
pub mod ventricle;
pub mod workflow;

pub use error::{PipelineError, Result, Stage, StageResultExt};
pub use config::{DeformableTarget, DeviceRemovalConfig, PipelineConfig};
pub use assets::{TemplateAssets, Templates};
pub use artifacts::{Artifact, ArtifactNames, ArtifactSink, FileSink, MemorySink, RunManifest};
pub use preprocess::{bound_intensity, extract_skull, DeviceRemover, LargestComponentDeviceRemoval};
pub use affine_stage::{apply_affine, compute_affine};
pub use exclusion::{build_ct_mask, build_exclusion_mask};
pub use deformable_stage::{compute_deformable, propagate_label};
pub use ventricle::{remove_ventricles, select_band, AgeBand, AgeBandTable};
pub use workflow::{LesionWorkflow, RunRequest, SubjectScan, VentricleRemovalWorkflow, WorkflowOutput};

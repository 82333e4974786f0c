use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use clap::{Args, Parser, Subcommand};
use ctlesion_pipeline::{
    DeformableTarget, LesionWorkflow, PipelineConfig, RunRequest, TemplateAssets, VentricleRemovalWorkflow,
};
use ctlesion_registration::{BSplineSolver, MutualInformationAffineSolver};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod batch;

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser, Debug)]
#[command(name = "ctlesion")]
#[command(about = "CT lesion to MNI152 registration and ventricle removal")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a CT scan and its lesion mask to MNI152
    Register {
        /// Path to the CT scan
        #[arg(short = 'p', long = "ct-scan-path")]
        ct: PathBuf,

        /// Path to the lesion mask
        #[arg(short = 'l', long = "lesion-mask-path")]
        lesion: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Register a CT scan to MNI152 without a lesion mask
    RegisterCt {
        /// Path to the CT scan
        #[arg(short = 'p', long = "ct-scan-path")]
        ct: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Remove age-matched ventricles from a subject's MNI152 lesion mask
    RemoveVentricles {
        /// Path to the project (BIDS layout)
        #[arg(short = 'p', long = "project-path")]
        project: PathBuf,

        /// Name of the subject
        #[arg(short = 's', long = "sub-name")]
        subject: String,

        /// Template directory
        #[arg(long, env = "CTLESION_TEMPLATES")]
        templates: PathBuf,
    },

    /// Register many subjects in parallel
    Batch {
        /// Tab-separated table with `subject`, `ct` and optional `lesion` columns
        #[arg(long)]
        subjects: PathBuf,

        /// Number of subjects processed at once (default: all cores)
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Options shared by the registration commands.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Directory the results are written to; must exist
    #[arg(short = 'o', long = "output-path")]
    output: PathBuf,

    /// Whether CT scan device removal is desired: True or False
    #[arg(long = "scan-device-removal", visible_alias = "sdr", value_parser = parse_flag)]
    scan_device_removal: Option<bool>,

    /// Whether intermediate volumes are written: True or False
    #[arg(long, value_parser = parse_flag)]
    keep_intermediates: Option<bool>,

    /// Template of the deformable stage: whole-head or brain
    #[arg(long, value_parser = parse_target)]
    deformable_target: Option<DeformableTarget>,

    /// Template directory
    #[arg(long, env = "CTLESION_TEMPLATES")]
    templates: PathBuf,

    /// JSON settings file; command line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

impl RunArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(enabled) = self.scan_device_removal {
            config = config.with_device_removal(enabled);
        }
        if let Some(keep) = self.keep_intermediates {
            config = config.with_keep_intermediates(keep);
        }
        if let Some(target) = self.deformable_target {
            config = config.with_deformable_target(target);
        }
        Ok(config)
    }
}

/// Boolean written `True` or `False`.
fn parse_flag(value: &str) -> std::result::Result<bool, String> {
    match value {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        other => Err(format!("must be a boolean, write 'True' or 'False' (got '{}')", other)),
    }
}

fn parse_target(value: &str) -> std::result::Result<DeformableTarget, String> {
    value.parse().map_err(|e: ctlesion_pipeline::PipelineError| e.to_string())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Register { ct, lesion, run } => register(&ct, Some(lesion), &run)?,
        Commands::RegisterCt { ct, run } => register(&ct, None, &run)?,
        Commands::RemoveVentricles {
            project,
            subject,
            templates,
        } => remove_ventricles(&project, &subject, &templates)?,
        Commands::Batch { subjects, jobs, run } => batch::run_batch(&subjects, jobs, &run)?,
    }

    Ok(())
}

fn workflow(config: PipelineConfig) -> LesionWorkflow<Backend, MutualInformationAffineSolver, BSplineSolver> {
    let affine = MutualInformationAffineSolver::new(config.affine.clone());
    LesionWorkflow::new(config, affine, BSplineSolver::new())
}

fn register(ct: &Path, lesion: Option<PathBuf>, run: &RunArgs) -> Result<()> {
    let config = run.pipeline_config()?;
    let assets = TemplateAssets::from_dir(&run.templates)?;
    info!(templates = %assets.root().display(), "using templates");

    let request = RunRequest::new(ct, lesion, &run.output);
    let manifest = workflow(config)
        .run_files(&request, &assets, &Default::default())
        .with_context(|| format!("registration of {} failed", ct.display()))?;

    for (artifact, path) in &manifest.artifacts {
        info!(?artifact, path = %path.display(), "written");
    }
    Ok(())
}

fn remove_ventricles(project: &Path, subject: &str, templates: &Path) -> Result<()> {
    let assets = TemplateAssets::for_ventricles(templates)?;
    let output = VentricleRemovalWorkflow::default()
        .run_project::<Backend>(project, subject, &assets, &Default::default())
        .with_context(|| format!("ventricle removal for {} failed", subject))?;
    info!(path = %output.display(), "lesion mask without ventricles written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("True"), Ok(true));
        assert_eq!(parse_flag("False"), Ok(false));
        assert!(parse_flag("yes").is_err());
        assert!(parse_flag("1").is_err());
    }

    #[test]
    fn test_register_arguments() {
        let cli = Cli::try_parse_from([
            "ctlesion",
            "register",
            "-p",
            "ct.nii.gz",
            "-l",
            "lesion.nii.gz",
            "-o",
            "out",
            "--scan-device-removal",
            "False",
            "--templates",
            "templates",
        ])
        .unwrap();
        match cli.command {
            Commands::Register { ct, lesion, run } => {
                assert_eq!(ct, PathBuf::from("ct.nii.gz"));
                assert_eq!(lesion, PathBuf::from("lesion.nii.gz"));
                assert_eq!(run.scan_device_removal, Some(false));
                let config = run.pipeline_config().unwrap();
                assert!(!config.device_removal.enabled);
                assert!(config.keep_intermediates);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_deformable_target_flag() {
        let cli = Cli::try_parse_from([
            "ctlesion",
            "register-ct",
            "-p",
            "ct.nii.gz",
            "-o",
            "out",
            "--deformable-target",
            "brain",
            "--templates",
            "templates",
        ])
        .unwrap();
        match cli.command {
            Commands::RegisterCt { run, .. } => {
                let config = run.pipeline_config().unwrap();
                assert_eq!(config.deformable_target, DeformableTarget::Brain);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(parse_target("skull").is_err());
    }

    #[test]
    fn test_malformed_boolean_is_rejected() {
        let parsed = Cli::try_parse_from([
            "ctlesion",
            "register-ct",
            "-p",
            "ct.nii.gz",
            "-o",
            "out",
            "--scan-device-removal",
            "maybe",
            "--templates",
            "templates",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_config_file_and_flag_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "skull_threshold": 600.0, "keep_intermediates": false }"#).unwrap();

        let run = RunArgs {
            output: dir.path().to_path_buf(),
            scan_device_removal: None,
            keep_intermediates: Some(true),
            deformable_target: None,
            templates: dir.path().to_path_buf(),
            config: Some(path),
        };
        let config = run.pipeline_config().unwrap();
        assert_eq!(config.skull_threshold, 600.0);
        assert_eq!(config.deformable_target, DeformableTarget::WholeHead);
        assert!(config.keep_intermediates);
        assert!(config.device_removal.enabled);
    }
}

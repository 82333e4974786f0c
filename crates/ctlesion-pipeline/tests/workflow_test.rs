mod common;

use common::*;
use ctlesion_io::{read_affine, read_volume, write_volume, ParameterMap};
use ctlesion_core::image::VolumeKind;
use ctlesion_pipeline::{
    select_band, Artifact, ArtifactNames, DeformableTarget, MemorySink, PipelineConfig, PipelineError, Stage,
    SubjectScan, LesionWorkflow, RunRequest, TemplateAssets, Templates, VentricleRemovalWorkflow,
};

const SIZE: usize = 64;

fn templates(size: usize) -> Templates<B> {
    Templates {
        bone: corner_ct(size, 10),
        t1: template(size),
        brain: None,
        bspline_parameters: ParameterMap::new(),
    }
}

#[test]
fn test_end_to_end_with_identity_engines() {
    let workflow = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "sub-01_ct", Some("lesion_mask".to_string()));
    let mut sink = MemorySink::<B>::new();

    let scan = SubjectScan {
        ct: corner_ct(SIZE, 10),
        lesion: Some(block_label(SIZE, [5, 5, 2])),
    };
    let output = workflow.run(scan, &templates(SIZE), &names, &mut sink).unwrap();

    // 1000 skull voxels minus the 50 lesion voxels
    assert_eq!(output.exclusion_mask.count_nonzero().unwrap(), 950);
    let lesion = output.template_lesion.unwrap();
    assert!(lesion.kind().is_label());
    assert_eq!(lesion.count_nonzero().unwrap(), 50);

    let band = select_band(42.0).unwrap();
    assert_eq!(band.to_string(), "40-44");

    let ventricles = VentricleRemovalWorkflow::default();
    let (_, kept) = ventricles.remove(&lesion, 42.0, |_| Ok(far_label(SIZE, 32))).unwrap();
    assert_eq!(kept.count_nonzero().unwrap(), 50);
    let (_, emptied) = ventricles.remove(&lesion, 42.0, |_| Ok(lesion.clone())).unwrap();
    assert_eq!(emptied.count_nonzero().unwrap(), 0);

    // every artifact of the lesion run was produced once
    for artifact in [
        Artifact::NoDevice,
        Artifact::Skull,
        Artifact::PreTemplateCt,
        Artifact::ContrastStretched,
        Artifact::PreTemplateContrastStretched,
        Artifact::PreTemplateLesion,
        Artifact::ExclusionMask,
        Artifact::TemplateCt,
        Artifact::TemplateLesion,
    ] {
        assert!(sink.get(artifact).is_some(), "missing {:?}", artifact);
    }
    assert_eq!(sink.affine.as_ref().map(|(_, m)| *m), Some(output.affine));
    let manifest = sink.manifest.unwrap();
    assert_eq!(manifest.artifacts.len(), 11);
    assert_eq!(manifest.deformable.map(|d| d.order), Some(3));
}

#[test]
fn test_skull_and_bounded_intensities() {
    let workflow = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", None);
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };
    workflow.run(scan, &templates(16), &names, &mut sink).unwrap();

    let skull = sink.get(Artifact::Skull).unwrap();
    assert_eq!(skull.count_nonzero().unwrap(), 64);

    let stretched = sink.get(Artifact::ContrastStretched).unwrap().image().to_vec().unwrap();
    assert!(stretched.iter().all(|v| (0.0..=100.0).contains(v)));
    assert_eq!(stretched.iter().filter(|v| **v == 100.0).count(), 64);
}

#[test]
fn test_ct_only_run_masks_ct_foreground() {
    let workflow = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", None);
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };
    let output = workflow.run(scan, &templates(16), &names, &mut sink).unwrap();

    assert_eq!(output.exclusion_mask.count_nonzero().unwrap(), 64);
    assert!(output.template_lesion.is_none());
    assert!(sink.get(Artifact::PreTemplateLesion).is_none());
    assert!(sink.get(Artifact::TemplateLesion).is_none());
}

#[test]
fn test_intermediates_can_be_skipped() {
    let config = PipelineConfig::default().with_keep_intermediates(false);
    let workflow = LesionWorkflow::new(config, IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", None);
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };
    let output = workflow.run(scan, &templates(16), &names, &mut sink).unwrap();

    assert!(sink.get(Artifact::NoDevice).is_none());
    assert!(sink.get(Artifact::Skull).is_none());
    assert!(sink.get(Artifact::ContrastStretched).is_none());
    assert!(sink.get(Artifact::PreTemplateContrastStretched).is_some());
    assert!(!output.manifest.artifacts.contains_key(&Artifact::Skull));
}

#[test]
fn test_device_removal_can_be_disabled() {
    let config = PipelineConfig::default().with_device_removal(false);
    let workflow = LesionWorkflow::new(config, IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", None);
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };
    workflow.run(scan, &templates(16), &names, &mut sink).unwrap();
    assert!(sink.get(Artifact::NoDevice).is_none());
    assert!(sink.get(Artifact::Skull).is_some());
}

#[test]
fn test_non_convergence_stops_before_lesion_warp() {
    let workflow = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, DivergingDeformable);
    let names = ArtifactNames::new("/out", "ct", Some("lesion".to_string()));
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: Some(block_label(16, [2, 2, 2])),
    };

    let err = workflow.run(scan, &templates(16), &names, &mut sink).unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::DeformableRegistration));
    assert!(sink.get(Artifact::ExclusionMask).is_some());
    assert!(sink.get(Artifact::TemplateCt).is_none());
    assert!(sink.get(Artifact::TemplateLesion).is_none());
    assert!(sink.manifest.is_none());
}

#[test]
fn test_outputs_follow_template_grid() {
    let workflow = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", Some("lesion".to_string()));
    let mut sink = MemorySink::<B>::new();
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: Some(block_label(16, [2, 2, 2])),
    };
    let mut templates = templates(16);
    templates.t1 = template(12);
    let output = workflow.run(scan, &templates, &names, &mut sink).unwrap();
    assert_eq!(output.exclusion_mask.shape(), [12, 12, 12]);
    assert_eq!(output.template_ct.shape(), [12, 12, 12]);
    assert_eq!(output.template_lesion.unwrap().count_nonzero().unwrap(), 8);
}

#[test]
fn test_deformable_stage_uses_configured_template() {
    let names = ArtifactNames::new("/out", "ct", None);
    let mut templates = templates(16);
    templates.brain = Some(constant(16, 50.0));
    let scan = || SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };

    let whole_head = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, RecordingDeformable::default());
    whole_head.run(scan(), &templates, &names, &mut MemorySink::<B>::new()).unwrap();

    let config = PipelineConfig::default().with_deformable_target(DeformableTarget::Brain);
    let brain = LesionWorkflow::new(config, IdentityAffine, RecordingDeformable::default());
    let output = brain.run(scan(), &templates, &names, &mut MemorySink::<B>::new()).unwrap();

    let t1_values = templates.t1.image().to_vec().unwrap();
    let brain_values = constant(16, 50.0).image().to_vec().unwrap();
    assert_eq!(recorded_fixed(&whole_head), vec![t1_values]);
    assert_eq!(recorded_fixed(&brain), vec![brain_values]);
    assert_eq!(output.manifest.config.deformable_target, DeformableTarget::Brain);
}

fn recorded_fixed(workflow: &LesionWorkflow<B, IdentityAffine, RecordingDeformable>) -> Vec<Vec<f32>> {
    workflow.deformable_solver().fixed.lock().unwrap().clone()
}

#[test]
fn test_brain_target_without_brain_template_fails() {
    let config = PipelineConfig::default().with_deformable_target(DeformableTarget::Brain);
    let workflow = LesionWorkflow::new(config, IdentityAffine, IdentityDeformable);
    let names = ArtifactNames::new("/out", "ct", None);
    let scan = SubjectScan {
        ct: corner_ct(16, 4),
        lesion: None,
    };
    let mut sink = MemorySink::<B>::new();
    let err = workflow.run(scan, &templates(16), &names, &mut sink).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(sink.volumes.is_empty());
}

#[test]
fn test_cropped_lesion_is_resampled_from_its_own_grid() {
    let dir = tempfile::tempdir().unwrap();
    let size = 16;
    let template_dir = dir.path().join("templates");
    std::fs::create_dir_all(&template_dir).unwrap();
    write_volume(template_dir.join("MNI152_T1_1mm_bone.nii.gz"), &corner_ct(size, 4)).unwrap();
    write_volume(template_dir.join("MNI152_T1_1mm.nii.gz"), &template(size)).unwrap();
    std::fs::write(template_dir.join("Par0000bspline.txt"), "(FinalBSplineInterpolationOrder 1)\n").unwrap();

    // 8³ lesion crop sharing the CT's origin and spacing
    let ct_path = dir.path().join("ct.nii.gz");
    let lesion_path = dir.path().join("lesion.nii.gz");
    write_volume(&ct_path, &corner_ct(size, 4)).unwrap();
    write_volume(&lesion_path, &block_label(8, [2, 2, 2])).unwrap();

    let assets = TemplateAssets::from_dir(&template_dir).unwrap();
    let workflow: LesionWorkflow<B, _, _> = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let request = RunRequest::new(&ct_path, Some(lesion_path), dir.path());
    let manifest = workflow.run_files(&request, &assets, &Default::default()).unwrap();

    let path = &manifest.artifacts[&Artifact::TemplateLesion];
    let lesion = read_volume::<B, _>(path, VolumeKind::BinaryLabel, &Default::default()).unwrap();
    assert_eq!(lesion.shape(), [size; 3]);
    assert_eq!(lesion.count_nonzero().unwrap(), 8);
}

#[test]
fn test_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let size = 16;

    // templates
    let template_dir = dir.path().join("templates");
    std::fs::create_dir_all(template_dir.join("ventricles")).unwrap();
    write_volume(template_dir.join("MNI152_T1_1mm_bone.nii.gz"), &corner_ct(size, 4)).unwrap();
    write_volume(template_dir.join("MNI152_T1_1mm.nii.gz"), &template(size)).unwrap();
    std::fs::write(
        template_dir.join("Par0000bspline.txt"),
        "(Transform \"BSplineTransform\")\n(FinalBSplineInterpolationOrder 1)\n",
    )
    .unwrap();
    write_volume(template_dir.join("ventricles/40-44_ventricles_MNI152.nii.gz"), &far_label(size, 8)).unwrap();

    // subject
    let input_dir = dir.path().join("input");
    let output_dir = dir.path().join("project/sub-01/ct");
    std::fs::create_dir_all(&input_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();
    let ct_path = input_dir.join("sub-01_ct.nii.gz");
    let lesion_path = input_dir.join("lesion_mask.nii.gz");
    write_volume(&ct_path, &corner_ct(size, 4)).unwrap();
    write_volume(&lesion_path, &block_label(size, [2, 2, 2])).unwrap();

    let assets = TemplateAssets::from_dir(&template_dir).unwrap();
    let workflow: LesionWorkflow<B, _, _> = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let request = RunRequest::new(&ct_path, Some(lesion_path.clone()), &output_dir);
    let manifest = workflow.run_files(&request, &assets, &Default::default()).unwrap();

    for path in manifest.artifacts.values() {
        assert!(path.is_file(), "{} was not written", path.display());
    }
    assert_eq!(manifest.deformable.as_ref().map(|d| d.order), Some(1));
    let affine = read_affine(output_dir.join("sub-01_ct_affine.mat")).unwrap();
    assert!(affine.max_abs_diff(&ctlesion_core::transform::AffineMatrix::identity()) < 1e-12);
    let template_lesion =
        read_volume::<B, _>(output_dir.join("lesion_mask_MNI152.nii.gz"), VolumeKind::BinaryLabel, &Default::default())
            .unwrap();
    assert_eq!(template_lesion.count_nonzero().unwrap(), 8);

    // ventricle run on the same project
    let project = dir.path().join("project");
    std::fs::write(project.join("participants.tsv"), "BIDS\tSEX\tAGE\nsub-01\tF\t42\nsub-02\tM\tn/a\n").unwrap();
    let ventricle_assets = TemplateAssets::for_ventricles(&template_dir).unwrap();
    let output = VentricleRemovalWorkflow::default()
        .run_project::<B>(&project, "sub-01", &ventricle_assets, &Default::default())
        .unwrap();
    assert_eq!(output, output_dir.join("lesion_mask_mni_novent.nii.gz"));
    let cleaned = read_volume::<B, _>(&output, VolumeKind::BinaryLabel, &Default::default()).unwrap();
    assert_eq!(cleaned.count_nonzero().unwrap(), 8);

    // missing age is fatal
    std::fs::create_dir_all(project.join("sub-02/ct")).unwrap();
    let err = VentricleRemovalWorkflow::default()
        .run_project::<B>(&project, "sub-02", &ventricle_assets, &Default::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Metadata(_)));
}

#[test]
fn test_missing_inputs_fail_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let workflow: LesionWorkflow<B, _, _> = LesionWorkflow::new(PipelineConfig::default(), IdentityAffine, IdentityDeformable);
    let request = RunRequest::new(dir.path().join("ct.nii.gz"), None, dir.path());
    let assets_dir = dir.path().join("templates");
    std::fs::create_dir_all(&assets_dir).unwrap();
    for name in ["MNI152_T1_1mm_bone.nii.gz", "MNI152_T1_1mm.nii.gz", "Par0000bspline.txt"] {
        std::fs::write(assets_dir.join(name), b"").unwrap();
    }
    let assets = TemplateAssets::from_dir(&assets_dir).unwrap();

    let err = workflow.run_files(&request, &assets, &Default::default()).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(std::fs::read_dir(dir.path()).unwrap().count() == 1);
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use fantastic_filter::{
    catalog::ModelCatalog,
    controller::{Controller, ModelChoice, Notice, Phase, STATUS_DONE, STATUS_READY},
    errors::Result as EnhanceResult,
    imageops::vignette,
    job::JobKind,
    mocks::{Gate, MockBehaviour, MockLoader, MockModel},
    pipeline::SampleOptions,
    resize::Dimension,
    EnhancementModel, ModelLoader,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(models: &[&str]) -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        fs::create_dir_all(dir.path().join("pretrained"))?;
        for name in models {
            fs::write(dir.path().join("pretrained").join(format!("{name}.onnx")), b"graph")?;
        }
        Ok(Self { dir })
    }

    fn catalog(&self) -> ModelCatalog {
        ModelCatalog::new(self.dir.path().join("pretrained"))
    }

    fn image(&self, name: &str, width: u32, height: u32) -> image::ImageResult<PathBuf> {
        let path = self.dir.path().join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, 90]))
            .save(&path)?;
        Ok(path)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn load<L: ModelLoader>(controller: &mut Controller<L>, name: &str) -> TestResult {
    let ModelChoice::Resolved(path) = controller.resolve_model(name) else {
        return Err(format!("model {name} not found").into());
    };
    let job = controller.start_model_load(path)?;
    controller.finish_model_load(job.blocking_wait())?;
    Ok(())
}

#[test]
fn test_open_load_enhance_flow() -> TestResult {
    let workspace = Workspace::new(&["iphone"])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Invert),
        SampleOptions::default(),
    );

    controller.open_image(&workspace.image("photo.png", 40, 30)?)?;
    assert_eq!(controller.phase(), Phase::ImageLoaded);
    assert_eq!(controller.state().resize.width(), "40");
    assert_eq!(controller.state().resize.height(), "30");
    assert_eq!(controller.model_names(), vec!["iphone"]);

    load(&mut controller, "iphone")?;
    assert!(controller.model_loaded());
    assert_eq!(controller.model_label(), "Model: iphone");

    assert!(controller.edit_dimension(Dimension::Width, "18"));
    assert!(controller.edit_dimension(Dimension::Height, "10"));
    assert_eq!(controller.state().resize.width(), "13");

    let job = controller.start_enhance()?;
    assert_eq!(controller.phase(), Phase::Inferring);
    controller.finish_enhance(job.blocking_wait())?;

    let displayed = controller.state().canvas.image().ok_or("nothing displayed")?;
    assert_eq!(displayed.dimensions(), (8, 8));
    assert_eq!(controller.status().text, STATUS_DONE);
    assert_eq!(controller.phase(), Phase::ImageLoaded);
    Ok(())
}

#[test]
fn test_failed_inference_keeps_previous_image() -> TestResult {
    let workspace = Workspace::new(&["sony"])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Failing),
        SampleOptions::default(),
    );
    controller.open_image(&workspace.image("photo.png", 40, 30)?)?;
    load(&mut controller, "sony")?;
    let before = controller.state().canvas.image().cloned();

    let job = controller.start_enhance()?;
    let notice = controller.finish_enhance(job.blocking_wait()).unwrap_err();

    assert!(matches!(notice, Notice::EnhanceFailed(_)));
    assert!(notice.is_error());
    assert_eq!(controller.state().canvas.image().cloned(), before);
    assert_eq!(controller.state().clean, controller.state().origin);
    assert!(!controller.is_busy());

    // The failure is not sticky: another attempt can start.
    assert!(controller.start_enhance().is_ok());
    Ok(())
}

#[test]
fn test_second_load_is_rejected_while_loading() -> TestResult {
    let workspace = Workspace::new(&["iphone", "blackberry"])?;
    let gate = Gate::new();
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity).with_gate(gate.clone()),
        SampleOptions::default(),
    );

    let job = controller.start_model_load(workspace.path("pretrained/iphone.onnx"))?;
    assert_eq!(controller.phase(), Phase::ModelLoading);
    assert_eq!(controller.loading_model().as_deref(), Some("iphone"));

    let second = controller.start_model_load(workspace.path("pretrained/blackberry.onnx"));
    assert_eq!(second.err(), Some(Notice::Busy(JobKind::LoadModel)));

    gate.open();
    controller.finish_model_load(job.blocking_wait())?;
    assert_eq!(controller.loading_model(), None);
    assert_eq!(controller.model_label(), "Model: iphone");
    Ok(())
}

/// Returns one model whose inference waits on a gate.
struct SlowLoader {
    gate: Gate,
}

impl ModelLoader for SlowLoader {
    fn load(&self, path: &Path) -> EnhanceResult<Arc<dyn EnhancementModel>> {
        let name = path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
        Ok(Arc::new(
            MockModel::new(&name, MockBehaviour::Identity).with_gate(self.gate.clone()),
        ))
    }
}

#[test]
fn test_enhance_blocks_other_jobs() -> TestResult {
    let workspace = Workspace::new(&["iphone"])?;
    let gate = Gate::new();
    let mut controller = Controller::new(
        workspace.catalog(),
        SlowLoader { gate: gate.clone() },
        SampleOptions::default(),
    );
    controller.open_image(&workspace.image("photo.png", 16, 16)?)?;
    load(&mut controller, "iphone")?;

    let job = controller.start_enhance()?;
    assert_eq!(
        controller.start_enhance().err(),
        Some(Notice::Busy(JobKind::Enhance))
    );
    assert_eq!(
        controller
            .start_model_load(workspace.path("pretrained/iphone.onnx"))
            .err(),
        Some(Notice::Busy(JobKind::Enhance))
    );
    assert!(!controller.enhancer().available());

    gate.open();
    controller.finish_enhance(job.blocking_wait())?;
    assert!(controller.enhancer().available());
    Ok(())
}

#[test]
fn test_enhance_guards() -> TestResult {
    let workspace = Workspace::new(&["iphone"])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );

    let notice = controller.start_enhance().err();
    assert_eq!(notice, Some(Notice::NoImage));

    controller.open_image(&workspace.image("photo.png", 16, 16)?)?;
    assert_eq!(controller.start_enhance().err(), Some(Notice::NoModel));
    assert_eq!(controller.phase(), Phase::ImageLoaded);
    Ok(())
}

#[test]
fn test_vignette_is_recomputed_from_clean_image() -> TestResult {
    let workspace = Workspace::new(&[])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );
    controller.open_image(&workspace.image("photo.png", 32, 24)?)?;
    let clean = controller.state().clean.clone().ok_or("no clean image")?;

    controller.set_vignette_strength(1.0);
    assert!(controller.refresh_vignette());
    let once = controller.state().canvas.image().cloned().ok_or("nothing displayed")?;
    assert_eq!(once, vignette::apply(&clean, 1.0));

    controller.set_vignette_strength(1.0);
    assert!(controller.refresh_vignette());
    assert_eq!(controller.state().canvas.image(), Some(&once));
    assert!(!controller.refresh_vignette());

    controller.set_vignette_strength(0.0);
    controller.refresh_vignette();
    assert_eq!(controller.state().canvas.image(), Some(&clean));
    Ok(())
}

#[test]
fn test_save() -> TestResult {
    let workspace = Workspace::new(&[])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );

    let target = workspace.path("nothing.png");
    assert_eq!(controller.save(&target)?, None);
    assert!(!target.exists());

    controller.open_image(&workspace.image("photo.png", 16, 8)?)?;
    assert!(controller.can_save());
    assert_eq!(controller.suggested_file_name(), "photo_enhanced.png");

    let jpeg = controller.save(&workspace.path("out.jpg"))?;
    assert_eq!(jpeg, Some(workspace.path("out.jpg")));
    assert_eq!(image::open(workspace.path("out.jpg"))?.width(), 16);

    let appended = controller.save(&workspace.path("out"))?;
    assert_eq!(appended, Some(workspace.path("out.png")));
    assert!(workspace.path("out.png").is_file());
    Ok(())
}

#[test]
fn test_save_writes_vignetted_image() -> TestResult {
    let workspace = Workspace::new(&[])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );
    controller.open_image(&workspace.image("photo.png", 32, 24)?)?;
    let clean = controller.state().clean.clone().ok_or("no clean image")?;

    controller.set_vignette_strength(1.0);
    assert!(controller.refresh_vignette());
    let saved = controller.save(&workspace.path("vignetted.png"))?;
    assert_eq!(saved, Some(workspace.path("vignetted.png")));

    let written = image::open(workspace.path("vignetted.png"))?.into_rgb8();
    assert_eq!(written, vignette::apply(&clean, 1.0));
    assert_ne!(written, clean);
    Ok(())
}

#[test]
fn test_unknown_model_asks_for_file() -> TestResult {
    let workspace = Workspace::new(&["iphone"])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );

    assert_eq!(controller.resolve_model("nokia"), ModelChoice::PickFile);
    let missing = workspace.path("pretrained/nokia.onnx");
    assert_eq!(
        controller.start_model_load(missing.clone()).err(),
        Some(Notice::ModelMissing(missing))
    );
    assert!(!controller.is_busy());
    Ok(())
}

#[test]
fn test_failed_load_restores_label() -> TestResult {
    let workspace = Workspace::new(&["iphone", "broken"])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity).with_broken("broken"),
        SampleOptions::default(),
    );
    load(&mut controller, "iphone")?;

    let job = controller.start_model_load(workspace.path("pretrained/broken.onnx"))?;
    assert_eq!(controller.model_label(), "Model: broken");
    let notice = controller.finish_model_load(job.blocking_wait()).unwrap_err();

    assert!(matches!(notice, Notice::LoadFailed(_)));
    assert_eq!(controller.model_label(), "Model: iphone");
    assert_eq!(controller.enhancer().model_name(), Some("iphone"));
    Ok(())
}

#[test]
fn test_unreadable_image_is_reported() -> TestResult {
    let workspace = Workspace::new(&[])?;
    let mut controller = Controller::new(
        workspace.catalog(),
        MockLoader::new(MockBehaviour::Identity),
        SampleOptions::default(),
    );
    fs::write(workspace.path("broken.png"), b"not a png")?;

    let notice = controller.open_image(&workspace.path("broken.png")).unwrap_err();
    assert!(matches!(notice, Notice::OpenFailed(_)));
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.status().text, STATUS_READY);
    Ok(())
}

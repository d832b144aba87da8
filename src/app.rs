//! The iced front end. All state lives in [`Controller`]; this module only maps
//! widget events onto controller operations and job results back into messages.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iced::widget::image as image_widget;
use iced::widget::{
    button, center, column, container, opaque, pick_list, progress_bar, row, slider, stack, text,
    text_input,
};
use iced::{keyboard, time, window, Alignment, ContentFit, Element, Length, Size, Subscription, Task, Theme};
use image::RgbImage;
use rfd::{AsyncFileDialog, AsyncMessageDialog, MessageButtons, MessageLevel};
use tracing::{info, warn};

use crate::{
    catalog::ModelCatalog,
    config::Config,
    controller::{Controller, ModelChoice, Notice, Phase, STATUS_RESET_AFTER},
    display::RESIZE_DEBOUNCE,
    job::JobResult,
    model::{OnnxLoader, MODEL_EXTENSION},
    notify,
    resize::Dimension,
    traits::EnhancementModel,
};

const WINDOW_SIZE: Size = Size::new(1100.0, 720.0);
const PANEL_WIDTH: f32 = 260.0;
const STATUS_HEIGHT: f32 = 32.0;
const PADDING: f32 = 12.0;

/// Vignette polling interval; also drives the progress animations.
const TICK: Duration = Duration::from_millis(24);

/// Strongest slider position; keeps the vignette scale above zero.
const MAX_VIGNETTE_STRENGTH: f32 = 1.9;
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

/// Entries of the model selection list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEntry {
    Placeholder,
    Named(String),
    Browse,
}

impl fmt::Display for ModelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("Choose a model"),
            Self::Named(name) => f.write_str(name),
            Self::Browse => f.write_str("Other model..."),
        }
    }
}

fn model_entries(names: Vec<String>) -> Vec<ModelEntry> {
    std::iter::once(ModelEntry::Placeholder)
        .chain(names.into_iter().map(ModelEntry::Named))
        .chain(std::iter::once(ModelEntry::Browse))
        .collect()
}

#[derive(Debug, Clone)]
pub enum Message {
    OpenImage,
    ImagePicked(Option<PathBuf>),
    ModelSelected(ModelEntry),
    ModelFilePicked(Option<PathBuf>),
    ModelLoaded(JobResult<Arc<dyn EnhancementModel>>),
    WidthChanged(String),
    HeightChanged(String),
    Enhance,
    Enhanced(JobResult<RgbImage>),
    VignetteChanged(f32),
    Save,
    SavePicked(Option<PathBuf>),
    StatusExpired(u64),
    NoticeDismissed,
    WindowResized(Size),
    Tick,
    CanvasTick,
}

pub struct App {
    controller: Controller<OnnxLoader>,
    models: Vec<ModelEntry>,
    selected_model: Option<ModelEntry>,
    preview: Option<(u64, image_widget::Handle)>,
    animation: f32,
}

impl App {
    fn new(config: &Config) -> (Self, Task<Message>) {
        let catalog = ModelCatalog::new(config.model_dir());
        info!(model_dir = %catalog.dir().display(), "starting");

        let controller = Controller::new(
            catalog,
            OnnxLoader::new(config.session_options()),
            config.sample_options(),
        );
        let models = model_entries(controller.model_names());

        let mut app = Self {
            controller,
            models,
            selected_model: Some(ModelEntry::Placeholder),
            preview: None,
            animation: 0.0,
        };
        app.resize_canvas(WINDOW_SIZE);
        app.controller.refresh_canvas();
        (app, Task::none())
    }

    fn title(&self) -> String {
        match self.controller.state().source.as_deref().and_then(|p| p.file_name()) {
            Some(name) => format!("Fantastic Filter - {}", name.to_string_lossy()),
            None => "Fantastic Filter".to_string(),
        }
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        let task = self.handle(message);
        self.sync_preview();
        task
    }

    fn handle(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::OpenImage => match self.controller.check_can_open() {
                Ok(()) => Task::perform(pick_image(), Message::ImagePicked),
                Err(notice) => show_notice(notice),
            },
            Message::ImagePicked(None) => {
                info!("cancel opening image");
                Task::none()
            }
            Message::ImagePicked(Some(path)) => match self.controller.open_image(&path) {
                Ok(()) => Task::none(),
                Err(notice) => show_notice(notice),
            },
            Message::ModelSelected(entry) => {
                self.selected_model = Some(entry.clone());
                match entry {
                    ModelEntry::Placeholder => Task::none(),
                    ModelEntry::Named(name) => match self.controller.resolve_model(&name) {
                        ModelChoice::Resolved(path) => self.load_model(path),
                        ModelChoice::PickFile => {
                            Task::perform(pick_model(), Message::ModelFilePicked)
                        }
                    },
                    ModelEntry::Browse => Task::perform(pick_model(), Message::ModelFilePicked),
                }
            }
            Message::ModelFilePicked(None) => Task::none(),
            Message::ModelFilePicked(Some(path)) => self.load_model(path),
            Message::ModelLoaded(result) => {
                let outcome = self.controller.finish_model_load(result);
                self.models = model_entries(self.controller.model_names());
                match outcome {
                    Ok(()) => Task::none(),
                    Err(notice) => show_notice(notice),
                }
            }
            Message::WidthChanged(value) => {
                self.controller.edit_dimension(Dimension::Width, &value);
                Task::none()
            }
            Message::HeightChanged(value) => {
                self.controller.edit_dimension(Dimension::Height, &value);
                Task::none()
            }
            Message::Enhance => match self.controller.start_enhance() {
                Ok(job) => Task::perform(job.wait(), Message::Enhanced),
                Err(notice) => show_notice(notice),
            },
            Message::Enhanced(result) => match self.controller.finish_enhance(result) {
                Ok(()) => {
                    thread::spawn(|| {
                        notify::send("Image enhanced!", "<b>Fantastic Filter</b> finished your photo.")
                    });
                    self.expire_status_later()
                }
                Err(notice) => Task::batch([show_notice(notice), self.expire_status_later()]),
            },
            Message::VignetteChanged(strength) => {
                self.controller.set_vignette_strength(strength);
                Task::none()
            }
            Message::Save => {
                if !self.controller.can_save() {
                    return Task::none();
                }
                Task::perform(
                    pick_save_path(self.controller.suggested_file_name()),
                    Message::SavePicked,
                )
            }
            Message::SavePicked(None) => Task::none(),
            Message::SavePicked(Some(path)) => match self.controller.save(&path) {
                Ok(_) => Task::none(),
                Err(notice) => show_notice(notice),
            },
            Message::StatusExpired(generation) => {
                self.controller.expire_status(generation);
                Task::none()
            }
            Message::NoticeDismissed => Task::none(),
            Message::WindowResized(size) => {
                self.resize_canvas(size);
                Task::none()
            }
            Message::Tick => {
                self.controller.refresh_vignette();
                if self.controller.is_busy() {
                    self.animation = (self.animation + 0.02) % 1.0;
                }
                Task::none()
            }
            Message::CanvasTick => {
                self.controller.refresh_canvas();
                Task::none()
            }
        }
    }

    fn load_model(&mut self, path: PathBuf) -> Task<Message> {
        match self.controller.start_model_load(path) {
            Ok(job) => {
                self.animation = 0.0;
                Task::perform(job.wait(), Message::ModelLoaded)
            }
            Err(notice) => show_notice(notice),
        }
    }

    fn expire_status_later(&self) -> Task<Message> {
        let generation = self.controller.status().generation;
        Task::perform(tokio::time::sleep(STATUS_RESET_AFTER), move |()| {
            Message::StatusExpired(generation)
        })
    }

    fn resize_canvas(&mut self, window: Size) {
        let width = (window.width - PANEL_WIDTH - 3.0 * PADDING).max(1.0);
        let height = (window.height - STATUS_HEIGHT - 2.0 * PADDING).max(1.0);
        self.controller.resize_canvas(width as u32, height as u32);
    }

    /// Rebuild the image handle when the canvas preview changed.
    fn sync_preview(&mut self) {
        let canvas = &self.controller.state().canvas;
        let revision = canvas.revision();
        if self.preview.as_ref().is_some_and(|(seen, _)| *seen == revision) {
            return;
        }
        self.preview = canvas.preview().map(|preview| {
            let handle = image_widget::Handle::from_rgba(
                preview.width,
                preview.height,
                preview.rgba.clone(),
            );
            (revision, handle)
        });
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            window::resize_events().map(|(_, size)| Message::WindowResized(size)),
            time::every(RESIZE_DEBOUNCE).map(|_| Message::CanvasTick),
            keyboard::on_key_press(shortcut),
        ];
        if self.controller.state().vignette.dirty || self.controller.is_busy() {
            subscriptions.push(time::every(TICK).map(|_| Message::Tick));
        }
        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<'_, Message> {
        let state = self.controller.state();
        let busy = self.controller.is_busy();

        let canvas: Element<'_, Message> = match &self.preview {
            Some((_, handle)) => image_widget::Image::<image_widget::Handle>::new(handle.clone())
                .content_fit(ContentFit::None)
                .into(),
            None => text("Open an image to start (Ctrl+O)").size(18).into(),
        };
        let canvas = container(canvas)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .style(container::bordered_box);

        let enhancing = self.controller.phase() == Phase::Inferring;
        let panel = column![
            button("Open image...")
                .on_press_maybe((!enhancing).then_some(Message::OpenImage))
                .width(Length::Fill),
            text(self.controller.model_label()),
            pick_list(
                self.models.as_slice(),
                self.selected_model.clone(),
                Message::ModelSelected
            )
            .width(Length::Fill),
            text("Width"),
            text_input("width", state.resize.width()).on_input(Message::WidthChanged),
            text("Height"),
            text_input("height", state.resize.height()).on_input(Message::HeightChanged),
            button("Enhance")
                .on_press_maybe((!busy).then_some(Message::Enhance))
                .width(Length::Fill),
            progress_bar(0.0..=1.0, if enhancing { self.animation } else { 0.0 }).height(6),
            text("Vignette"),
            slider(
                0.0..=MAX_VIGNETTE_STRENGTH,
                state.vignette.strength,
                Message::VignetteChanged
            )
            .step(0.01),
            button("Save...")
                .on_press_maybe(self.controller.can_save().then_some(Message::Save))
                .width(Length::Fill),
        ]
        .spacing(10)
        .width(PANEL_WIDTH);

        let status = container(text(&state.status.text).size(14))
            .height(STATUS_HEIGHT)
            .align_y(Alignment::Center);

        let base = column![
            row![canvas, panel].spacing(PADDING).height(Length::Fill),
            status,
        ]
        .padding(PADDING);

        match self.controller.loading_model() {
            Some(name) => stack![base, opaque(center(self.loading_modal(name)))].into(),
            None => base.into(),
        }
    }

    fn loading_modal(&self, name: String) -> Element<'_, Message> {
        container(
            column![
                text(format!("Loading '{name}'...")),
                text("This won't take long.").size(14),
                progress_bar(0.0..=1.0, self.animation).height(6).width(200),
            ]
            .spacing(12)
            .align_x(Alignment::Center),
        )
        .padding(24)
        .style(container::rounded_box)
        .into()
    }
}

fn shortcut(key: keyboard::Key, modifiers: keyboard::Modifiers) -> Option<Message> {
    if !modifiers.command() {
        return None;
    }
    match key.as_ref() {
        keyboard::Key::Character("o") => Some(Message::OpenImage),
        keyboard::Key::Character("s") => Some(Message::Save),
        _ => None,
    }
}

async fn pick_image() -> Option<PathBuf> {
    AsyncFileDialog::new()
        .set_title("Open image")
        .add_filter("images", &IMAGE_EXTENSIONS)
        .add_filter("all files", &["*"])
        .pick_file()
        .await
        .map(|file| file.path().to_path_buf())
}

async fn pick_model() -> Option<PathBuf> {
    AsyncFileDialog::new()
        .set_title("Choose a pretrained model")
        .add_filter("pretrained model", &[MODEL_EXTENSION])
        .add_filter("all files", &["*"])
        .pick_file()
        .await
        .map(|file| file.path().to_path_buf())
}

async fn pick_save_path(file_name: String) -> Option<PathBuf> {
    AsyncFileDialog::new()
        .set_title("Save image")
        .set_file_name(file_name)
        .add_filter("PNG", &["png"])
        .add_filter("JPEG", &["jpg", "jpeg"])
        .save_file()
        .await
        .map(|file| file.path().to_path_buf())
}

fn show_notice(notice: Notice) -> Task<Message> {
    warn!(%notice, "notice");
    let level = if notice.is_error() {
        MessageLevel::Error
    } else {
        MessageLevel::Warning
    };
    let dialog = AsyncMessageDialog::new()
        .set_level(level)
        .set_title(notice.title())
        .set_description(notice.to_string())
        .set_buttons(MessageButtons::Ok);
    Task::perform(dialog.show(), |_| Message::NoticeDismissed)
}

pub fn run(config: Config) -> iced::Result {
    iced::application(App::title, App::update, App::view)
        .subscription(App::subscription)
        .theme(App::theme)
        .window_size(WINDOW_SIZE)
        .centered()
        .run_with(move || App::new(&config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_entries_wrap_names() {
        let entries = model_entries(vec!["blackberry".to_string(), "iphone".to_string()]);
        assert_eq!(entries.first(), Some(&ModelEntry::Placeholder));
        assert_eq!(entries.last(), Some(&ModelEntry::Browse));
        assert_eq!(entries[1].to_string(), "blackberry");
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_shortcuts_need_command_modifier() {
        let open = shortcut(
            keyboard::Key::Character("o".into()),
            keyboard::Modifiers::COMMAND,
        );
        assert!(matches!(open, Some(Message::OpenImage)));
        assert!(shortcut(keyboard::Key::Character("s".into()), keyboard::Modifiers::empty()).is_none());
    }
}

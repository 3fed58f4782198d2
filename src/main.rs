// Image Shrinker - batch resize and re-encode images to JPEG/WebP
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod batch;
mod config;
mod discovery;
mod logging;
mod metadata;
mod options;
mod processor;
mod theme;

use batch::{BatchReport, Progress, ProcessResult};
use config::SettingsStore;
use iced::widget::{button, column, container, pick_list, progress_bar, row, scrollable, text, text_input, checkbox, slider, Space};
use iced::{executor, subscription, window, Application, Command, Element, Event, Length, Settings, Subscription, Theme, Font};
use iced::font::{Family, Weight};
use options::{ProcessOptions, ResizeMethod, ResizeMode, MAX_QUALITY, MIN_QUALITY};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use theme::ThemeChoice;
use tracing::{debug, error, info, warn};

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const PROGRESS_POLL: Duration = Duration::from_millis(200);

pub fn main() -> iced::Result {
    let store = SettingsStore::default_location();
    let settings = store.load();

    let log_dir = config::project_dirs()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    logging::init_tracing(&settings.log_level, &log_dir);
    info!(settings = %store.path().display(), logs = %log_dir.display(), "Starting Image Shrinker");

    ImageShrinker::run(Settings {
        window: iced::window::Settings {
            size: (560, 780),
            min_size: Some((520, 640)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        flags: Flags {
            settings,
            settings_path: store.path().to_path_buf(),
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        ..Default::default()
    })
}

#[derive(Debug, Default)]
struct Flags {
    settings: config::Settings,
    settings_path: PathBuf,
}

struct ImageShrinker {
    store: SettingsStore,
    selected_paths: Vec<PathBuf>,
    output_dir: PathBuf,
    resize_method: ResizeMethod,
    percentage: u16,
    fixed_width: String,
    fixed_height: String,
    max_width: String,
    options: ProcessOptions,
    theme: ThemeChoice,
    workers: usize,
    log_level: String,
    is_processing: bool,
    progress: Arc<Progress>,
    progress_value: f32,
    status_message: String,
    results: Vec<ProcessResult>,
}

#[derive(Debug, Clone)]
enum Message {
    SelectFiles,
    SelectFolder,
    PathsSelected(Vec<PathBuf>),
    FileDropped(PathBuf),
    ClearSelection,
    ResizeMethodSelected(ResizeMethod),
    PercentageChanged(u16),
    FixedWidthChanged(String),
    FixedHeightChanged(String),
    MaxWidthChanged(String),
    QualityChanged(u8),
    ToJpgToggled(bool),
    ToWebpToggled(bool),
    PreserveExifToggled(bool),
    AllowEnlargeToggled(bool),
    PreserveTransparencyToggled(bool),
    GrayscaleToggled(bool),
    SharpenToggled(bool),
    PrefixChanged(String),
    SelectOutputDir,
    OutputDirSelected(Option<PathBuf>),
    ThemeSelected(ThemeChoice),
    Process,
    Tick,
    ProcessingComplete(Result<BatchReport, String>),
    OpenOutputFolder,
    ClearResults,
}

impl Application for ImageShrinker {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let Flags { settings, settings_path } = flags;

        // Remember the last values for every resize method, defaulting the rest
        let (mut percentage, mut fixed, mut max_width) = (100u16, (1920u32, 1080u32), 1920u32);
        match settings.processing.resize {
            ResizeMode::None => {}
            ResizeMode::Percentage { percent } => percentage = percent.min(u16::MAX as u32) as u16,
            ResizeMode::FixedSize { width, height } => fixed = (width, height),
            ResizeMode::MaxWidth { width } => max_width = width,
        }

        let app = Self {
            store: SettingsStore::new(settings_path),
            selected_paths: Vec::new(),
            output_dir: settings.output_dir,
            resize_method: settings.processing.resize.method(),
            percentage,
            fixed_width: fixed.0.to_string(),
            fixed_height: fixed.1.to_string(),
            max_width: max_width.to_string(),
            options: settings.processing,
            theme: settings.theme,
            workers: settings.workers,
            log_level: settings.log_level,
            is_processing: false,
            progress: Arc::new(Progress::default()),
            progress_value: 0.0,
            status_message: String::new(),
            results: Vec::new(),
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("Image Shrinker")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::SelectFiles => {
                return Command::perform(select_files(), Message::PathsSelected);
            }
            Message::SelectFolder => {
                return Command::perform(select_folder(), Message::PathsSelected);
            }
            Message::PathsSelected(paths) => {
                for path in paths {
                    self.add_path(path);
                }
            }
            Message::FileDropped(path) => {
                if !self.is_processing && path.exists() {
                    self.add_path(path);
                }
            }
            Message::ClearSelection => {
                self.selected_paths.clear();
                self.progress_value = 0.0;
                self.status_message.clear();
                info!("Selection cleared");
            }
            Message::ResizeMethodSelected(method) => {
                self.resize_method = method;
            }
            Message::PercentageChanged(value) => {
                self.percentage = value;
            }
            Message::FixedWidthChanged(value) => {
                self.fixed_width = value;
            }
            Message::FixedHeightChanged(value) => {
                self.fixed_height = value;
            }
            Message::MaxWidthChanged(value) => {
                self.max_width = value;
            }
            Message::QualityChanged(quality) => {
                self.options.quality = quality;
            }
            Message::ToJpgToggled(value) => {
                self.options.to_jpg = value;
            }
            Message::ToWebpToggled(value) => {
                self.options.to_webp = value;
            }
            Message::PreserveExifToggled(value) => {
                self.options.preserve_exif = value;
            }
            Message::AllowEnlargeToggled(value) => {
                self.options.allow_enlarge = value;
            }
            Message::PreserveTransparencyToggled(value) => {
                self.options.preserve_transparency = value;
            }
            Message::GrayscaleToggled(value) => {
                self.options.grayscale = value;
            }
            Message::SharpenToggled(value) => {
                self.options.sharpen = value;
            }
            Message::PrefixChanged(value) => {
                self.options.rename_prefix = value;
            }
            Message::SelectOutputDir => {
                return Command::perform(select_output_dir(self.output_dir.clone()), Message::OutputDirSelected);
            }
            Message::OutputDirSelected(dir) => {
                if let Some(dir) = dir {
                    self.output_dir = dir;
                }
            }
            Message::ThemeSelected(theme) => {
                self.theme = theme;
                self.save_settings();
            }
            Message::Process => {
                if self.is_processing || self.selected_paths.is_empty() {
                    return Command::none();
                }

                let options = match self.current_options() {
                    Ok(options) => options,
                    Err(e) => {
                        self.status_message = e;
                        return Command::none();
                    }
                };

                let files = discovery::collect_images(&self.selected_paths);
                if files.is_empty() {
                    warn!("No valid image files found in the selection");
                    self.status_message = String::from("No processable image files found in selection.");
                    return Command::none();
                }

                self.options = options.clone();
                self.save_settings();

                self.is_processing = true;
                self.results.clear();
                self.progress.reset(files.len());
                self.progress_value = 0.0;
                self.status_message = format!("0/{} (0%)", files.len());

                return Command::perform(
                    process_batch(
                        files,
                        self.output_dir.clone(),
                        options,
                        self.workers,
                        Arc::clone(&self.progress),
                    ),
                    Message::ProcessingComplete,
                );
            }
            Message::Tick => {
                if self.is_processing {
                    let (done, total) = self.progress.snapshot();
                    self.progress_value = if total > 0 { done as f32 / total as f32 } else { 0.0 };
                    self.status_message = format!("{}/{} ({:.0}%)", done, total, self.progress_value * 100.0);
                }
            }
            Message::ProcessingComplete(Ok(report)) => {
                debug!(succeeded = self.progress.succeeded(), "Batch finished");
                self.is_processing = false;
                self.progress_value = 1.0;
                self.status_message = format!(
                    "Processing Complete! {} processed, {} failed",
                    report.processed, report.failed
                );
                self.results = report.results;
            }
            Message::ProcessingComplete(Err(e)) => {
                error!(error = %e, "Batch could not run");
                self.is_processing = false;
                self.progress_value = 0.0;
                self.status_message = e;
            }
            Message::OpenOutputFolder => {
                if self.output_dir.exists() {
                    if let Err(e) = open::that(&self.output_dir) {
                        warn!(error = %e, "Could not open output folder");
                    }
                }
            }
            Message::ClearResults => {
                self.results.clear();
                self.progress_value = 0.0;
                self.status_message.clear();
            }
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let drops = subscription::events_with(|event, _status| match event {
            Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        if self.is_processing {
            Subscription::batch(vec![
                drops,
                iced::time::every(PROGRESS_POLL).map(|_| Message::Tick),
            ])
        } else {
            drops
        }
    }

    fn view(&self) -> Element<Message> {
        // Title
        let title = text("Image Shrinker")
            .size(22)
            .font(HEADING_FONT);

        // File selection
        let file_selection = column![
            text("Select Images")
                .size(16)
                .font(HEADING_FONT),
            text(selection_summary(&self.selected_paths))
                .size(12)
                .font(BODY_FONT),
            row![
                self.idle_button("Select Files", Message::SelectFiles),
                self.idle_button("Select Folder", Message::SelectFolder),
                self.idle_button("Clear Selection", Message::ClearSelection),
            ].spacing(8),
        ].spacing(8);

        // Resize settings
        let resize_values: Element<Message> = match self.resize_method {
            ResizeMethod::None => column![].into(),
            ResizeMethod::Percentage => row![
                slider(1..=200, self.percentage, Message::PercentageChanged)
                    .width(Length::Fill),
                text(format!("{}%", self.percentage))
                    .size(13)
                    .font(BODY_FONT)
                    .width(40),
            ].spacing(8).into(),
            ResizeMethod::FixedSize => row![
                text_input("W", &self.fixed_width)
                    .on_input(Message::FixedWidthChanged)
                    .width(Length::Fixed(70.0))
                    .padding(4)
                    .size(13),
                text("×")
                    .size(13)
                    .font(BODY_FONT),
                text_input("H", &self.fixed_height)
                    .on_input(Message::FixedHeightChanged)
                    .width(Length::Fixed(70.0))
                    .padding(4)
                    .size(13),
                text("px")
                    .size(13)
                    .font(BODY_FONT),
            ].spacing(6).into(),
            ResizeMethod::MaxWidth => row![
                text("Max Width:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(80),
                text_input("px", &self.max_width)
                    .on_input(Message::MaxWidthChanged)
                    .width(Length::Fixed(90.0))
                    .padding(4)
                    .size(13),
                text("px")
                    .size(13)
                    .font(BODY_FONT),
            ].spacing(6).into(),
        };

        let processing = column![
            text("Processing Options")
                .size(16)
                .font(HEADING_FONT),
            row![
                text("Resize:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(80),
                pick_list(
                    ResizeMethod::ALL.to_vec(),
                    Some(self.resize_method),
                    Message::ResizeMethodSelected,
                ),
            ].spacing(8),
            resize_values,
            row![
                text("Quality:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(80),
                slider(MIN_QUALITY..=MAX_QUALITY, self.options.quality, Message::QualityChanged)
                    .width(Length::Fill),
                text(format!("{}%", self.options.quality))
                    .size(13)
                    .font(BODY_FONT)
                    .width(40),
            ].spacing(8),
        ].spacing(8);

        // Output formats
        let formats = column![
            text("Output Formats")
                .size(16)
                .font(HEADING_FONT),
            row![
                checkbox("Convert to JPG", self.options.to_jpg, Message::ToJpgToggled)
                    .size(13)
                    .spacing(8),
                Space::with_width(20),
                checkbox("Convert to WebP", self.options.to_webp, Message::ToWebpToggled)
                    .size(13)
                    .spacing(8),
            ].spacing(12),
        ].spacing(8);

        // Additional options
        let additional = column![
            text("Additional Options")
                .size(16)
                .font(HEADING_FONT),
            checkbox("Preserve EXIF Data", self.options.preserve_exif, Message::PreserveExifToggled)
                .size(13)
                .spacing(8),
            checkbox("Allow Enlarging Images", self.options.allow_enlarge, Message::AllowEnlargeToggled)
                .size(13)
                .spacing(8),
            checkbox("Preserve Transparency (for WebP)", self.options.preserve_transparency, Message::PreserveTransparencyToggled)
                .size(13)
                .spacing(8),
            checkbox("Convert to Grayscale", self.options.grayscale, Message::GrayscaleToggled)
                .size(13)
                .spacing(8),
            checkbox("Apply Sharpening", self.options.sharpen, Message::SharpenToggled)
                .size(13)
                .spacing(8),
        ].spacing(6);

        // Output settings
        let output = column![
            text("Output Settings")
                .size(16)
                .font(HEADING_FONT),
            row![
                text(format!("Output: {}", truncate_path(&self.output_dir, 50)))
                    .size(12)
                    .font(BODY_FONT)
                    .width(Length::Fill),
                self.idle_button("Change...", Message::SelectOutputDir),
                button("Open Output")
                    .on_press(Message::OpenOutputFolder)
                    .padding([6, 12]),
            ].spacing(8),
            row![
                text("Prefix:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(80),
                text_input("Optional prefix (e.g., 'processed')", &self.options.rename_prefix)
                    .on_input(Message::PrefixChanged)
                    .width(Length::Fixed(240.0))
                    .padding(4)
                    .size(13),
            ].spacing(8),
            row![
                text("Theme:")
                    .size(13)
                    .font(BODY_FONT)
                    .width(80),
                pick_list(
                    ThemeChoice::ALL.to_vec(),
                    Some(self.theme),
                    Message::ThemeSelected,
                ),
            ].spacing(8),
        ].spacing(8);

        // Process button
        let process_button = if self.is_processing {
            button("Processing...")
                .padding([8, 16])
        } else if !self.selected_paths.is_empty() {
            button("Start Processing")
                .on_press(Message::Process)
                .padding([8, 16])
        } else {
            button("Start Processing")
                .padding([8, 16])
        };

        // Progress
        let progress_section = if self.is_processing || self.progress_value > 0.0 || !self.status_message.is_empty() {
            column![
                progress_bar(0.0..=1.0, self.progress_value)
                    .height(Length::Fixed(6.0)),
                text(&self.status_message)
                    .size(12)
                    .font(BODY_FONT),
            ].spacing(4)
        } else {
            column![]
        };

        // Results
        let results_section = if !self.results.is_empty() {
            let results_list: Vec<Element<Message>> = self.results.iter().map(|result| {
                let status = if result.success { "[OK]" } else { "[FAIL]" };

                row![
                    text(status)
                        .size(12)
                        .font(if result.success { BODY_FONT } else { HEADING_FONT })
                        .width(40),
                    text(&result.filename)
                        .size(12)
                        .font(BODY_FONT)
                        .width(Length::Fill),
                    if result.success {
                        text(format!("{} → {} KB ({:.0}%) {}",
                            result.original_size / 1024,
                            result.new_size / 1024,
                            result.compression_ratio() * 100.0,
                            output_formats(&result.outputs)
                        ))
                        .size(12)
                        .font(BODY_FONT)
                    } else {
                        text(&result.message)
                            .size(12)
                            .font(BODY_FONT)
                    }
                ].spacing(8).into()
            }).collect();

            column![
                text("Results")
                    .size(16)
                    .font(HEADING_FONT),
                container(
                    scrollable(
                        column(results_list).spacing(3)
                    ).height(Length::Fixed(120.0))
                )
                .style(iced::theme::Container::Box)
                .padding(8),
                button("Clear")
                    .on_press(Message::ClearResults)
                    .padding([6, 12]),
            ].spacing(8)
        } else {
            column![]
        };

        // Main layout
        let content = column![
            title,
            Space::with_height(12),
            file_selection,
            Space::with_height(12),
            processing,
            Space::with_height(12),
            formats,
            Space::with_height(12),
            additional,
            Space::with_height(12),
            output,
            Space::with_height(12),
            process_button,
            Space::with_height(8),
            progress_section,
            if !self.results.is_empty() {
                Space::with_height(12)
            } else {
                Space::with_height(0)
            },
            results_section,
        ]
        .padding(16);

        container(scrollable(content))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        self.theme.theme()
    }
}

impl ImageShrinker {
    fn add_path(&mut self, path: PathBuf) {
        if !self.selected_paths.contains(&path) {
            self.selected_paths.push(path);
        }
    }

    /// Button that only reacts while no batch is running.
    fn idle_button<'a>(&self, label: &'a str, message: Message) -> iced::widget::Button<'a, Message> {
        let button = button(label).padding([6, 12]);
        if self.is_processing {
            button
        } else {
            button.on_press(message)
        }
    }

    fn current_options(&self) -> Result<ProcessOptions, String> {
        let resize = match self.resize_method {
            ResizeMethod::None => ResizeMode::None,
            ResizeMethod::Percentage => ResizeMode::Percentage {
                percent: self.percentage as u32,
            },
            ResizeMethod::FixedSize => ResizeMode::FixedSize {
                width: parse_pixels("Width", &self.fixed_width)?,
                height: parse_pixels("Height", &self.fixed_height)?,
            },
            ResizeMethod::MaxWidth => ResizeMode::MaxWidth {
                width: parse_pixels("Max width", &self.max_width)?,
            },
        };

        let options = ProcessOptions {
            resize,
            ..self.options.clone()
        };
        options.validate().map_err(|e| e.to_string())?;
        Ok(options)
    }

    fn save_settings(&self) {
        let settings = config::Settings {
            output_dir: self.output_dir.clone(),
            theme: self.theme,
            workers: self.workers,
            log_level: self.log_level.clone(),
            processing: ProcessOptions {
                resize: self.current_options().map(|o| o.resize).unwrap_or(self.options.resize),
                ..self.options.clone()
            },
        };
        if let Err(e) = self.store.save(&settings) {
            warn!(error = %e, "Could not save settings");
        }
    }
}

// Helper functions
async fn select_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .add_filter("Images", discovery::IMAGE_EXTENSIONS)
        .pick_files()
        .await
        .map(|handles| handles.iter().map(|handle| handle.path().to_path_buf()).collect())
        .unwrap_or_default()
}

async fn select_folder() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .pick_folder()
        .await
        .map(|handle| vec![handle.path().to_path_buf()])
        .unwrap_or_default()
}

async fn select_output_dir(current: PathBuf) -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_directory(&current)
        .pick_folder()
        .await
        .map(|handle| handle.path().to_path_buf())
}

async fn process_batch(
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    options: ProcessOptions,
    workers: usize,
    progress: Arc<Progress>,
) -> Result<BatchReport, String> {
    tokio::task::spawn_blocking(move || {
        batch::run_batch(&files, &output_dir, &options, workers, &progress)
            .map_err(|e| e.to_string())
    })
    .await
    .unwrap_or_else(|e| Err(format!("Processing task failed: {}", e)))
}

fn output_formats(outputs: &[PathBuf]) -> String {
    outputs
        .iter()
        .filter_map(|p| p.extension())
        .map(|ext| ext.to_string_lossy().to_uppercase())
        .collect::<Vec<_>>()
        .join("+")
}

fn parse_pixels(label: &str, value: &str) -> Result<u32, String> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("{} must be a whole number of pixels", label))
}

fn selection_summary(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return String::from("Drag and drop files or folders here, or use the buttons below");
    }

    let names: Vec<String> = paths
        .iter()
        .take(3)
        .map(|p| p.file_name().unwrap_or(p.as_os_str()).to_string_lossy().to_string())
        .collect();
    let mut summary = format!("Selected {} items: {}", paths.len(), names.join(", "));
    if paths.len() > 3 {
        summary.push_str(&format!(" ...and {} more.", paths.len() - 3));
    }
    summary
}

fn truncate_path(path: &Path, max: usize) -> String {
    let display_path = path.display().to_string();
    let count = display_path.chars().count();
    if count > max {
        let tail: String = display_path.chars().skip(count - (max - 3)).collect();
        format!("...{}", tail)
    } else {
        display_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_first_three_names() {
        let paths: Vec<PathBuf> = ["a.jpg", "b.png", "dir/c.gif", "d.bmp", "e.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            selection_summary(&paths),
            "Selected 5 items: a.jpg, b.png, c.gif ...and 2 more."
        );
        assert_eq!(selection_summary(&paths[..1]), "Selected 1 items: a.jpg");
    }

    #[test]
    fn long_paths_keep_their_tail() {
        let path = PathBuf::from("/very/long/directory/structure/for/output/images/processed");
        let shown = truncate_path(&path, 20);
        assert_eq!(shown.chars().count(), 20);
        assert!(shown.starts_with("..."));
        assert!(shown.ends_with("processed"));
        assert_eq!(truncate_path(Path::new("/out"), 20), "/out");
    }

    #[test]
    fn formats_follow_written_outputs() {
        let outputs = vec![PathBuf::from("out/jpg/a.jpg"), PathBuf::from("out/webp/a.webp")];
        assert_eq!(output_formats(&outputs), "JPG+WEBP");
        assert_eq!(output_formats(&[]), "");
    }

    #[test]
    fn pixel_inputs_must_be_numbers() {
        assert_eq!(parse_pixels("Width", " 640 "), Ok(640));
        assert_eq!(
            parse_pixels("Width", "wide"),
            Err("Width must be a whole number of pixels".to_string())
        );
    }
}

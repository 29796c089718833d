use crate::batch::{BatchItem, LogStatus, SUPPORTED_EXTENSIONS};
use crate::compression::{display_name, BelowThreshold, Compressor, Outcome};
use crate::config::ConfigStore;
use crate::state::{AppState, BatchProgress};
use crate::watcher::WatchError;
use anyhow::{anyhow, Result};
use iced::font::{Family, Weight};
use iced::widget::{button, column, container, pick_list, row, scrollable, text, text_input, Space};
use iced::{
    executor, subscription, window, Application, Command, Element, Event, Font, Length, Settings,
    Subscription, Theme,
};
use rfd::{MessageButtons, MessageLevel};
use std::path::{Path, PathBuf};
use std::time::Duration;

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

const WATCH_POLL: Duration = Duration::from_millis(100);

pub fn run(store: ConfigStore) -> Result<()> {
    tracing::info!(config = %store.path().display(), "starting window");
    let mut settings = Settings::with_flags(store);
    settings.window = window::Settings {
        size: (460, 620),
        min_size: Some((420, 520)),
        resizable: true,
        decorations: true,
        ..Default::default()
    };
    settings.default_font = BODY_FONT;
    settings.default_text_size = 14.0;

    ImageCompressor::run(settings).map_err(|err| anyhow!("window failed: {err}"))
}

struct ImageCompressor {
    state: AppState,
}

impl ImageCompressor {
    fn process_next(&self, item: BatchItem) -> Command<Message> {
        match self.state.batch_compressor() {
            Some(compressor) => process_item(item, compressor),
            None => Command::none(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    SelectFiles,
    FilesSelected(Vec<PathBuf>),
    FileDropped(PathBuf),
    SelectSaveDirectory,
    SaveDirectorySelected(Option<PathBuf>),
    SelectWatchDirectory,
    WatchDirectorySelected(Option<PathBuf>),
    TargetFilenameChanged(String),
    PolicySelected(BelowThreshold),
    StartBatch,
    ItemProcessed(BatchItem, Outcome),
    ToggleWatch,
    PollWatch,
    OpenSaveFolder,
    ClearList,
    DialogClosed,
}

impl Application for ImageCompressor {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = ConfigStore;

    fn new(store: ConfigStore) -> (Self, Command<Message>) {
        let app = Self {
            state: AppState::new(store),
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("Image Compressor")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::SelectFiles => {
                return Command::perform(select_files(), Message::FilesSelected);
            }
            Message::FilesSelected(paths) => {
                self.state.add_files(paths);
            }
            Message::FileDropped(path) => {
                tracing::debug!(path = %path.display(), "file dropped");
                self.state.add_files([path]);
            }
            Message::SelectSaveDirectory => {
                return Command::perform(
                    select_folder("Choose where compressed files are saved"),
                    Message::SaveDirectorySelected,
                );
            }
            Message::SaveDirectorySelected(Some(dir)) => {
                self.state.set_save_directory(dir);
            }
            Message::SelectWatchDirectory => {
                if !self.state.is_watching() {
                    return Command::perform(
                        select_folder("Choose the folder to watch"),
                        Message::WatchDirectorySelected,
                    );
                }
            }
            Message::WatchDirectorySelected(Some(dir)) => {
                self.state.set_watch_directory(dir);
            }
            Message::SaveDirectorySelected(None) | Message::WatchDirectorySelected(None) => {}
            Message::TargetFilenameChanged(name) => {
                self.state.set_target_filename(name);
            }
            Message::PolicySelected(policy) => {
                if !self.state.set_below_threshold(policy) {
                    tracing::debug!(%policy, "policy change ignored while running");
                }
            }
            Message::StartBatch => match self.state.start_batch() {
                Ok(item) => return self.process_next(item),
                Err(err) => {
                    let level = match err {
                        crate::batch::BatchError::NoFiles => MessageLevel::Warning,
                        crate::batch::BatchError::MissingDestination(_) => MessageLevel::Error,
                    };
                    return show_dialog(level, "Cannot start", err.to_string());
                }
            },
            Message::ItemProcessed(item, outcome) => {
                match self.state.finish_item(&item, &outcome) {
                    Some(BatchProgress::Next(next)) => {
                        return self.process_next(next);
                    }
                    Some(BatchProgress::Finished {
                        summary,
                        output_dir,
                    }) => {
                        return show_dialog(
                            MessageLevel::Info,
                            "Done",
                            format!("{summary}.\nSaved to: {}", output_dir.display()),
                        );
                    }
                    None => {}
                }
            }
            Message::ToggleWatch => {
                if self.state.stop_watch() {
                    return Command::none();
                }
                if let Err(err) = self.state.start_watch() {
                    tracing::warn!(error = %err, "watch not started");
                    let level = match err {
                        WatchError::Notify(_) | WatchError::Spawn(_) => MessageLevel::Error,
                        _ => MessageLevel::Warning,
                    };
                    return show_dialog(level, "Cannot watch", err.to_string());
                }
            }
            Message::PollWatch => {
                self.state.poll_watch();
            }
            Message::OpenSaveFolder => {
                let dir = self.state.config().save_directory.clone();
                if !dir.is_dir() {
                    return show_dialog(
                        MessageLevel::Error,
                        "Folder not found",
                        format!("Save folder not found:\n{}", dir.display()),
                    );
                }
                if let Err(err) = open::that(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %err, "open folder failed");
                    return show_dialog(
                        MessageLevel::Warning,
                        "Could not open folder",
                        format!("Failed to open the folder: {err}"),
                    );
                }
            }
            Message::ClearList => {
                self.state.clear();
            }
            Message::DialogClosed => {}
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let drops = subscription::events_with(|event, _status| match event {
            Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
            _ => None,
        });

        if self.state.is_watching() {
            Subscription::batch(vec![
                drops,
                iced::time::every(WATCH_POLL).map(|_| Message::PollWatch),
            ])
        } else {
            drops
        }
    }

    fn view(&self) -> Element<Message> {
        let running = self.state.is_batch_running();
        let watching = self.state.is_watching();
        let config = self.state.config();

        let title = text("Image Compressor").size(22).font(HEADING_FONT);

        let file_selection = row![
            button("Select Files")
                .on_press(Message::SelectFiles)
                .padding([6, 12]),
            if running {
                button("Clear").padding([6, 12])
            } else {
                button("Clear").on_press(Message::ClearList).padding([6, 12])
            },
        ]
        .spacing(8);

        let save_location = row![
            text(format!("Save to: {}", truncate_path(&config.save_directory, 40)))
                .size(12)
                .width(Length::Fill),
            button("Change Save Folder")
                .on_press(Message::SelectSaveDirectory)
                .padding([4, 10]),
        ]
        .spacing(8);

        // pick_list has no disabled state, so a locked policy is shown as text.
        let policy_control: Element<Message> = if running || watching {
            text(config.below_threshold).size(13).into()
        } else {
            pick_list(
                &BelowThreshold::ALL[..],
                Some(config.below_threshold),
                Message::PolicySelected,
            )
            .into()
        };
        let policy = row![
            text("Files under 10 MB:").size(13).width(130),
            policy_control,
        ]
        .spacing(8);

        let lines: Vec<Element<Message>> = self
            .state
            .log()
            .iter()
            .map(|line| {
                row![
                    text(line.status.tag())
                        .size(12)
                        .font(if line.status == LogStatus::Failed {
                            HEADING_FONT
                        } else {
                            BODY_FONT
                        })
                        .width(110),
                    text(&line.name).size(12).width(Length::Fill),
                    text(&line.detail).size(12),
                ]
                .spacing(8)
                .into()
            })
            .collect();

        let log = column![
            text(format!(
                "Drag image files onto the window. {} queued.",
                self.state.pending().len()
            ))
            .size(12),
            container(scrollable(column(lines).spacing(3)).height(Length::Fixed(200.0)))
                .style(iced::theme::Container::Box)
                .width(Length::Fill)
                .padding(8),
            text(self.state.status()).size(12),
        ]
        .spacing(6);

        let actions = row![
            if running {
                button("Compressing...").padding([8, 16])
            } else {
                button("Start Compression")
                    .on_press(Message::StartBatch)
                    .padding([8, 16])
            },
            button("Open Save Folder")
                .on_press(Message::OpenSaveFolder)
                .padding([8, 16]),
        ]
        .spacing(8);

        let watch_dir_button = if watching {
            button("Change").padding([4, 10])
        } else {
            button("Change")
                .on_press(Message::SelectWatchDirectory)
                .padding([4, 10])
        };
        let filename_input = if watching {
            text_input("capture.png", &config.target_filename)
        } else {
            text_input("capture.png", &config.target_filename)
                .on_input(Message::TargetFilenameChanged)
        };

        let watch = column![
            text("Watch Folder").size(16).font(HEADING_FONT),
            row![
                text(truncate_path(&config.watch_directory, 40))
                    .size(12)
                    .width(Length::Fill),
                watch_dir_button,
            ]
            .spacing(8),
            row![
                text("Filename:").size(13).width(80),
                filename_input.padding(4).size(13),
            ]
            .spacing(8),
            button(if watching {
                "Stop Watching"
            } else {
                "Start Watching"
            })
            .on_press(Message::ToggleWatch)
            .padding([6, 12]),
        ]
        .spacing(8);

        let content = column![
            title,
            Space::with_height(12),
            file_selection,
            save_location,
            policy,
            Space::with_height(8),
            log,
            actions,
            Space::with_height(12),
            watch,
        ]
        .spacing(6)
        .padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }
}

fn process_item(item: BatchItem, compressor: Compressor) -> Command<Message> {
    let task_item = item.clone();
    Command::perform(
        async move {
            let outcome = tokio::task::spawn_blocking(move || {
                compressor.process(&task_item.path, &task_item.output_dir)
            })
            .await
            .unwrap_or_else(|err| Outcome::Failed {
                filename: display_name(&item.path),
                message: err.to_string(),
            });
            (item, outcome)
        },
        |(item, outcome)| Message::ItemProcessed(item, outcome),
    )
}

fn show_dialog(level: MessageLevel, title: &'static str, description: String) -> Command<Message> {
    Command::perform(
        async move {
            let _ = rfd::AsyncMessageDialog::new()
                .set_level(level)
                .set_title(title)
                .set_description(description.as_str())
                .set_buttons(MessageButtons::Ok)
                .show()
                .await;
        },
        |_| Message::DialogClosed,
    )
}

async fn select_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Select images to compress")
        .add_filter("Images", &SUPPORTED_EXTENSIONS)
        .pick_files()
        .await
        .map(|handles| {
            handles
                .iter()
                .map(|handle| handle.path().to_path_buf())
                .collect()
        })
        .unwrap_or_default()
}

async fn select_folder(title: &'static str) -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title(title)
        .pick_folder()
        .await
        .map(|handle| handle.path().to_path_buf())
}

fn truncate_path(path: &Path, max: usize) -> String {
    let display = path.display().to_string();
    let count = display.chars().count();
    if count <= max {
        return display;
    }
    let tail: String = display.chars().skip(count - max.saturating_sub(3)).collect();
    format!("...{tail}")
}

use base64::Engine as _;
use iced::{
    time,
    widget::{
        button, column, image, row, scrollable, slider, stack, text, Canvas, Column, Container,
    },
    Alignment, ContentFit, Element, Length, Subscription, Task, Theme,
};
use limnocore::model::MeasurementKey;
use limnocore::scene::SceneSnapshot;
use limnocore::{StatusLevel, ViewMode};
use map::LakeMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod map;

const DEFAULT_BRIDGE: &str = "http://127.0.0.1:9000";
const MARKER_LIST_LIMIT: usize = 12;

fn main() -> iced::Result {
    iced::application(Viewer::boot, Viewer::update, Viewer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Viewer) -> String {
    "Limnoview".into()
}

fn application_subscription(_: &Viewer) -> Subscription<Message> {
    time::every(Duration::from_secs(1)).map(|_| Message::Tick)
}

fn application_theme(_: &Viewer) -> Theme {
    Theme::Light
}

fn bridge_url() -> String {
    std::env::var("LIMNOVIEW_BRIDGE").unwrap_or_else(|_| DEFAULT_BRIDGE.to_owned())
}

/// Bridge command body, tagged the same way the bridge parses it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    Next,
    Prev,
    SelectTile {
        timestamp: String,
    },
    ViewMode {
        mode: ViewMode,
    },
    Opacity {
        value: f64,
    },
    Bandwidth {
        value: f64,
    },
    ReferencePoints {
        visible: bool,
    },
    Generate,
    Delete {
        #[serde(flatten)]
        key: MeasurementKey,
        confirmed: bool,
    },
    Export,
}

#[derive(Debug, Clone, Deserialize)]
struct Attachment {
    file_name: String,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CommandReply {
    status: String,
    level: Option<StatusLevel>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    attachment: Option<Attachment>,
}

#[derive(Debug)]
struct Viewer {
    snapshot: SceneSnapshot,
    connected: bool,
    overlay: Option<(String, image::Handle)>,
    opacity: f64,
    bandwidth: f64,
    dragging: bool,
    reference_points: bool,
    pending_delete: Option<MeasurementKey>,
    /// Generate requests still waiting on the server.
    generating: usize,
    status: String,
    history: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    SnapshotFetched(Result<SceneSnapshot, String>),
    Send(Command),
    CommandDone(Result<CommandReply, String>),
    GenerateDone(Result<CommandReply, String>),
    OpacityChanged(f64),
    BandwidthChanged(f64),
    SliderReleased,
    ToggleReferencePoints,
    AskDelete(MeasurementKey),
    ConfirmDelete,
    CancelDelete,
    Saved(Result<String, String>),
}

impl Viewer {
    fn boot() -> (Self, Task<Message>) {
        let snapshot = SceneSnapshot::default();
        (
            Viewer {
                opacity: snapshot.opacity,
                bandwidth: snapshot.bandwidth,
                snapshot,
                connected: false,
                overlay: None,
                dragging: false,
                reference_points: false,
                pending_delete: None,
                generating: 0,
                status: "Waiting for the session bridge...".into(),
                history: Vec::new(),
            },
            Task::perform(fetch_snapshot(), Message::SnapshotFetched),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => Task::perform(fetch_snapshot(), Message::SnapshotFetched),
            Message::SnapshotFetched(Ok(snapshot)) => {
                state.apply_snapshot(snapshot);
                Task::none()
            }
            Message::SnapshotFetched(Err(err)) => {
                if state.connected {
                    state.push_history(format!("Bridge unreachable: {err}"));
                }
                state.connected = false;
                state.status = format!("Bridge error: {err}");
                Task::none()
            }
            Message::Send(Command::Generate) => {
                state.generating += 1;
                state.status = "Generating heatmaps...".into();
                Task::perform(post_command(Command::Generate), Message::GenerateDone)
            }
            Message::Send(command) => Task::perform(post_command(command), Message::CommandDone),
            Message::GenerateDone(result) => {
                state.generating = state.generating.saturating_sub(1);
                Self::update(state, Message::CommandDone(result))
            }
            Message::CommandDone(Ok(reply)) => {
                if !reply.text.is_empty() {
                    let prefix = match reply.level {
                        Some(StatusLevel::Error) => "Error: ",
                        _ => "",
                    };
                    state.status = format!("{prefix}{}", reply.text);
                    state.push_history(state.status.clone());
                }
                let refresh = Task::perform(fetch_snapshot(), Message::SnapshotFetched);
                match reply.attachment {
                    Some(attachment) if reply.status == "ok" => Task::batch([
                        refresh,
                        Task::perform(save_attachment(attachment), Message::Saved),
                    ]),
                    _ => refresh,
                }
            }
            Message::CommandDone(Err(err)) => {
                state.status = format!("Command failed: {err}");
                state.push_history(state.status.clone());
                Task::none()
            }
            Message::OpacityChanged(value) => {
                state.dragging = true;
                state.opacity = value;
                Task::perform(
                    post_command(Command::Opacity { value }),
                    Message::CommandDone,
                )
            }
            Message::BandwidthChanged(value) => {
                state.dragging = true;
                state.bandwidth = value;
                Task::perform(
                    post_command(Command::Bandwidth { value }),
                    Message::CommandDone,
                )
            }
            Message::SliderReleased => {
                state.dragging = false;
                Task::none()
            }
            Message::ToggleReferencePoints => {
                state.reference_points = !state.reference_points;
                Task::perform(
                    post_command(Command::ReferencePoints {
                        visible: state.reference_points,
                    }),
                    Message::CommandDone,
                )
            }
            Message::AskDelete(key) => {
                state.pending_delete = Some(key);
                Task::none()
            }
            Message::ConfirmDelete => match state.pending_delete.take() {
                Some(key) => Task::perform(
                    post_command(Command::Delete {
                        key,
                        confirmed: true,
                    }),
                    Message::CommandDone,
                ),
                None => Task::none(),
            },
            Message::CancelDelete => {
                state.pending_delete = None;
                Task::none()
            }
            Message::Saved(Ok(file_name)) => {
                state.status = format!("Saved {file_name}");
                state.push_history(state.status.clone());
                Task::none()
            }
            Message::Saved(Err(err)) => {
                state.status = format!("Save failed: {err}");
                Task::none()
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: SceneSnapshot) {
        if !self.connected {
            self.push_history("Connected to session bridge".into());
        }
        self.connected = true;
        if !self.dragging {
            self.opacity = snapshot.opacity;
            self.bandwidth = snapshot.bandwidth;
        }
        if snapshot.reference_points.is_empty() {
            self.reference_points = false;
        }
        self.overlay = match &snapshot.visible_overlay {
            None => None,
            Some(view) => match &self.overlay {
                Some((encoded, handle)) if encoded == view.image.as_str() => {
                    Some((encoded.clone(), handle.clone()))
                }
                _ => view
                    .image
                    .decode()
                    .ok()
                    .map(|png| (view.image.as_str().to_owned(), image::Handle::from_bytes(png))),
            },
        };
        if self.generating == 0 {
            if let Some(status) = &snapshot.status {
                self.status = status.text.clone();
            }
        }
        self.snapshot = snapshot;
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let snapshot = &state.snapshot;
        let heatmap_mode = snapshot.view_mode == ViewMode::Heatmap;

        let map_bounds = snapshot
            .visible_overlay
            .as_ref()
            .map(|view| view.bounds)
            .unwrap_or(snapshot.bounds);
        let lake = Canvas::new(LakeMap {
            bounds: map_bounds,
            boundary: snapshot.boundary.clone(),
            markers: snapshot.markers.clone(),
            marker_opacity: snapshot.marker_opacity as f32,
            reference_points: snapshot.reference_points.clone(),
        })
        .width(Length::Fill)
        .height(Length::Fill);

        let map_area: Element<'_, Message> = match (&state.overlay, &snapshot.visible_overlay) {
            (Some((_, handle)), Some(view)) => stack![
                image(handle.clone())
                    .content_fit(ContentFit::Fill)
                    .opacity(view.opacity as f32)
                    .width(Length::Fill)
                    .height(Length::Fill),
                lake,
            ]
            .into(),
            _ => lake.into(),
        };

        let legend_line = match &snapshot.legend {
            Some(legend) => text(format!(
                "{} | {} | {:.2} .. {:.2}",
                legend.timestamp, legend.colormap, legend.range.min, legend.range.max
            ))
            .size(14),
            None => text("No legend").size(14),
        };

        let video_line = match &snapshot.video {
            Some(video) => text(format!("Video attached: {}", video.location)).size(12),
            None => text("").size(12),
        };

        let map_column = column![
            text("Lake").size(26),
            Container::new(map_area)
                .width(Length::Fill)
                .height(Length::Fixed(420.0)),
            legend_line,
            video_line,
            row![
                button("Prev").on_press(Message::Send(Command::Prev)).padding(8),
                text(snapshot.active_tile.clone().unwrap_or_else(|| "-".into())).size(16),
                button("Next").on_press(Message::Send(Command::Next)).padding(8),
            ]
            .spacing(12)
            .align_y(Alignment::Center),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        let tiles = if snapshot.tiles.is_empty() {
            Column::new().push(text("No heatmaps yet").size(12))
        } else {
            snapshot
                .tiles
                .iter()
                .fold(Column::new().spacing(4), |col, timestamp| {
                    let active = snapshot.active_tile.as_deref() == Some(timestamp.as_str());
                    let label = if active {
                        format!("> {timestamp}")
                    } else {
                        timestamp.clone()
                    };
                    col.push(
                        button(text(label).size(12))
                            .on_press(Message::Send(Command::SelectTile {
                                timestamp: timestamp.clone(),
                            }))
                            .padding(4),
                    )
                })
        };

        let marker_list = state.marker_list();

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let mode_label = if heatmap_mode { "Heatmap" } else { "Markers" };
        let generate_label = match state.generating {
            0 => "Generate heatmaps".to_owned(),
            n => format!("Generating... ({n} pending)"),
        };
        let generate = button(text(generate_label))
            .on_press(Message::Send(Command::Generate))
            .padding(10);
        let reference_label = if state.reference_points {
            "Hide reference points"
        } else {
            "Show reference points"
        };

        let controls_column = column![
            text("Controls").size(26),
            text(format!("View: {mode_label}")).size(16),
            row![
                button("Markers")
                    .on_press(Message::Send(Command::ViewMode {
                        mode: ViewMode::Markers
                    }))
                    .padding(8),
                button("Heatmap")
                    .on_press(Message::Send(Command::ViewMode {
                        mode: ViewMode::Heatmap
                    }))
                    .padding(8),
            ]
            .spacing(8),
            text(format!("Opacity {:.2}", state.opacity)).size(14),
            slider(0.0..=1.0, state.opacity, Message::OpacityChanged)
                .step(0.01)
                .on_release(Message::SliderReleased),
            text(format!("Bandwidth {:.2}", state.bandwidth)).size(14),
            slider(0.01..=1.0, state.bandwidth, Message::BandwidthChanged)
                .step(0.01)
                .on_release(Message::SliderReleased),
            generate,
            button(reference_label)
                .on_press(Message::ToggleReferencePoints)
                .padding(8),
            button("Export view")
                .on_press(Message::Send(Command::Export))
                .padding(8),
            text(&state.status).size(14),
            text(format!(
                "ok {} / failed {} / info {}",
                snapshot.counts.succeeded, snapshot.counts.failed, snapshot.counts.informational
            ))
            .size(12),
            text("Heatmaps").size(16),
            Container::new(scrollable(tiles).height(Length::Fixed(120.0))).padding(6),
            text("Markers").size(16),
            marker_list,
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(90.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fixed(360.0));

        let layout = row![controls_column, map_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn marker_list(&self) -> Element<'_, Message> {
        if let Some(key) = &self.pending_delete {
            return column![
                text(format!(
                    "Are you sure you want to delete the measurement for '{}' at this location?",
                    key.parameter
                ))
                .size(12),
                row![
                    button("Delete").on_press(Message::ConfirmDelete).padding(6),
                    button("Cancel").on_press(Message::CancelDelete).padding(6),
                ]
                .spacing(8),
            ]
            .spacing(6)
            .into();
        }

        let markers = &self.snapshot.markers;
        if markers.is_empty() {
            return text("No markers drawn").size(12).into();
        }
        let list = markers.iter().take(MARKER_LIST_LIMIT).fold(
            Column::new().spacing(4),
            |col, marker| {
                let m = &marker.measurement;
                col.push(
                    row![
                        text(format!(
                            "{:.4}, {:.4} | {} = {:.2}",
                            m.latitude, m.longitude, m.parameter, m.value
                        ))
                        .size(12)
                        .width(Length::Fill),
                        button(text("x").size(12))
                            .on_press(Message::AskDelete(m.key()))
                            .padding(4),
                    ]
                    .spacing(6)
                    .align_y(Alignment::Center),
                )
            },
        );
        let list = if markers.len() > MARKER_LIST_LIMIT {
            list.push(text(format!("... {} more", markers.len() - MARKER_LIST_LIMIT)).size(12))
        } else {
            list
        };
        Container::new(scrollable(list).height(Length::Fixed(140.0)))
            .padding(6)
            .into()
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > 20 {
            self.history.remove(0);
        }
    }
}

async fn fetch_snapshot() -> Result<SceneSnapshot, String> {
    let response = reqwest::get(format!("{}/snapshot", bridge_url()))
        .await
        .map_err(|e| e.to_string())?;
    response
        .json::<SceneSnapshot>()
        .await
        .map_err(|e| e.to_string())
}

async fn post_command(command: Command) -> Result<CommandReply, String> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/command", bridge_url()))
        .json(&command)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        response
            .json::<CommandReply>()
            .await
            .map_err(|e| e.to_string())
    } else {
        let status = response.status();
        let text = response.text().await.unwrap_or_else(|_| "".into());
        Err(format!("{}: {}", status, text))
    }
}

async fn save_attachment(attachment: Attachment) -> Result<String, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(attachment.data)
        .map_err(|e| e.to_string())?;
    let name = std::path::Path::new(&attachment.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "limnoview-export".into());
    tokio::fs::write(&name, bytes)
        .await
        .map_err(|e| e.to_string())?;
    Ok(name)
}

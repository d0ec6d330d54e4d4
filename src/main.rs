//! IPTV Web Player - Desktop Edition
//! Browse a public M3U playlist, filter channels and play them in an external player

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader};
use std::process::Child;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod filter;
mod geo;
mod m3u_parser;
mod models;
mod player;
mod region;
mod state;
mod storage;

use config::AppConfig;
use geo::GeoInfo;
use m3u_parser::ParsedPlaylist;
use models::{Channel, Selection, Tab};
use state::AppState;
use storage::JsonFileStore;

/// Delay between the last keystroke in the search box and refiltering
const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
const MAX_CONSOLE_LINES: usize = 500;

/// Background task messages
enum TaskResult {
    PlaylistLoaded { generation: u64, parsed: ParsedPlaylist },
    PlaylistFailed { generation: u64, message: String },
    GeoDetected(GeoInfo),
    GeoFailed(String),
    PlayerLog(String),
    PlayerExited { name: String, code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq)]
enum LoadStatus {
    Loading,
    Ready,
    Failed(String),
}

enum SettingsAction {
    SavePlaylist,
    ResetPlaylist,
    SaveConfig,
}

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting IPTV Web Player v{}", env!("CARGO_PKG_VERSION"));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([820.0, 500.0]),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "IPTV Web Player",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(PlayerApp::new()))
        }),
    )
}

struct PlayerApp {
    state: AppState,
    store: JsonFileStore,
    config: AppConfig,

    // Background task channel
    task_receiver: Receiver<TaskResult>,
    task_sender: Sender<TaskResult>,

    // Playlist loading
    status: LoadStatus,
    playlist_url: String,
    /// Bumped on every (re)load so results of superseded loads are dropped
    load_generation: u64,

    current_tab: Tab,
    status_message: String,

    // Search box, applied to the filter after SEARCH_DEBOUNCE
    search_input: String,
    search_edited_at: Option<Instant>,
    scroll_to_current: bool,

    // Settings dialog
    show_settings: bool,
    playlist_url_input: String,

    // Player process management
    current_player: Option<Child>,

    console_log: Vec<String>,
}

impl PlayerApp {
    fn new() -> Self {
        let config = AppConfig::load();
        let store = JsonFileStore::open_default();
        let state = AppState::new(&store);
        let (task_sender, task_receiver) = channel();

        let mut app = Self {
            state,
            store,
            config,
            task_receiver,
            task_sender,
            status: LoadStatus::Loading,
            playlist_url: String::new(),
            load_generation: 0,
            current_tab: Tab::Channels,
            status_message: "Ready".to_string(),
            search_input: String::new(),
            search_edited_at: None,
            scroll_to_current: false,
            show_settings: false,
            playlist_url_input: String::new(),
            current_player: None,
            console_log: Vec::new(),
        };
        app.log("[INFO] IPTV Web Player started");
        app.log(format!("[INFO] Storage: {}", app.store.path().display()));
        app.start();
        app
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        match message.split(']').next() {
            Some("[ERROR") => error!("{}", message),
            Some("[WARN") => warn!("{}", message),
            Some("[PLAYER") => debug!("{}", message),
            _ => info!("{}", message),
        }

        let timestamp = chrono::Local::now().format("%H:%M:%S");
        self.console_log.push(format!("[{}] {}", timestamp, message));
        // Keep last MAX_CONSOLE_LINES lines
        if self.console_log.len() > MAX_CONSOLE_LINES {
            self.console_log.remove(0);
        }
    }

    /// Kick off the playlist download and the geolocation lookup.
    ///
    /// Both run on their own thread and may finish in any order.
    fn start(&mut self) {
        self.load_generation += 1;
        self.playlist_url = storage::playlist_url(&self.store);
        self.status = LoadStatus::Loading;
        self.status_message = "Loading playlist...".to_string();
        self.log(format!("[INFO] Loading playlist: {}", self.playlist_url));

        if self.config.geo_lookup {
            self.detect_country();
        }

        let url = self.playlist_url.clone();
        let config = self.config.clone();
        let sender = self.task_sender.clone();
        let generation = self.load_generation;

        thread::spawn(move || {
            let result = match m3u_parser::download_playlist(&url, &config) {
                Ok(text) => TaskResult::PlaylistLoaded {
                    generation,
                    parsed: m3u_parser::parse_playlist(&text),
                },
                Err(e) => TaskResult::PlaylistFailed {
                    generation,
                    message: e.to_string(),
                },
            };
            let _ = sender.send(result);
        });
    }

    fn detect_country(&self) {
        let config = self.config.clone();
        let sender = self.task_sender.clone();

        thread::spawn(move || {
            let result = match geo::lookup_country(&config) {
                Ok(info) => TaskResult::GeoDetected(info),
                Err(e) => TaskResult::GeoFailed(e.to_string()),
            };
            let _ = sender.send(result);
        });
    }

    /// Start over with a fresh state, like a page reload
    fn reload(&mut self) {
        self.state = AppState::new(&self.store);
        self.search_input.clear();
        self.search_edited_at = None;
        self.start();
    }

    fn process_tasks(&mut self) {
        while let Ok(result) = self.task_receiver.try_recv() {
            match result {
                TaskResult::PlaylistLoaded { generation, parsed } => {
                    if generation != self.load_generation {
                        continue;
                    }
                    self.on_playlist_loaded(parsed);
                }
                TaskResult::PlaylistFailed { generation, message } => {
                    if generation != self.load_generation {
                        continue;
                    }
                    self.log(format!("[ERROR] Failed to load playlist: {}", message));
                    self.status_message = "Playlist failed to load".to_string();
                    self.status = LoadStatus::Failed(message);
                }
                TaskResult::GeoDetected(info) => {
                    if let Some(country) = self.state.set_detected_country(info) {
                        self.log(format!("[INFO] Detected country: {}", country));
                    }
                }
                TaskResult::GeoFailed(message) => {
                    self.log(format!("[WARN] Geo-detection failed: {}", message));
                }
                TaskResult::PlayerLog(line) => {
                    self.log(line);
                }
                TaskResult::PlayerExited { name, code } => {
                    self.log(format!("[WARN] Player for '{}' exited with code {:?}", name, code));
                }
            }
        }
    }

    fn on_playlist_loaded(&mut self, parsed: ParsedPlaylist) {
        self.state.load_parsed(parsed);
        self.status = LoadStatus::Ready;
        self.log(format!(
            "[INFO] Loaded {} channels, {} categories, {} countries",
            self.state.channels.len(),
            self.state.categories.len(),
            self.state.countries.len()
        ));

        if let Some(country) = self.state.apply_country_detection() {
            self.log(format!("[INFO] Detected country: {}", country));
        }

        if self.config.resume_last_channel {
            if let Some(channel) = self.state.restore_last_channel(&mut self.store).cloned() {
                self.log(format!("[INFO] Resuming last channel: {}", channel.name));
                self.play(&channel);
                self.scroll_to_current = true;
            }
        }

        self.status_message = format!("{} channels", self.state.filtered_len());
    }

    fn apply_pending_search(&mut self, ctx: &egui::Context) {
        let Some(edited_at) = self.search_edited_at else {
            return;
        };

        let elapsed = edited_at.elapsed();
        if elapsed >= SEARCH_DEBOUNCE {
            self.search_edited_at = None;
            let text = self.search_input.clone();
            self.state.set_search(&text);
        } else {
            ctx.request_repaint_after(SEARCH_DEBOUNCE - elapsed);
        }
    }

    fn select_and_play(&mut self, pos: usize) {
        if let Some(channel) = self.state.select(pos, &mut self.store).cloned() {
            self.play(&channel);
        }
    }

    fn play_next(&mut self) {
        if let Some(channel) = self.state.select_next(&mut self.store).cloned() {
            self.play(&channel);
            self.scroll_to_current = true;
        }
    }

    fn play_prev(&mut self) {
        if let Some(channel) = self.state.select_prev(&mut self.store).cloned() {
            self.play(&channel);
            self.scroll_to_current = true;
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        // Arrow keys belong to the text field while typing
        if ctx.wants_keyboard_input() {
            return;
        }

        let (up, down) = ctx.input(|i| (i.key_pressed(egui::Key::ArrowUp), i.key_pressed(egui::Key::ArrowDown)));
        let delta = match (up, down) {
            (true, _) => -1,
            (_, true) => 1,
            _ => return,
        };

        if let Some(channel) = self.state.navigate(delta, &mut self.store).cloned() {
            self.play(&channel);
            self.scroll_to_current = true;
        }
    }

    fn play(&mut self, channel: &Channel) {
        // Kill existing player if in single window mode
        if self.config.single_window_mode {
            if let Some(mut child) = self.current_player.take() {
                let _ = child.kill();
                let _ = child.wait(); // Reap the process
                self.log("[PLAY] Single window mode - closing previous player");
            }
        }

        self.log(format!("[PLAY] #{} {} | Player: {}", channel.sn, channel.name, self.config.player_command()));
        self.log(format!("[PLAY] URL: {}", channel.url));
        self.status_message = format!("Playing {}", channel.name);

        match player::launch(channel, &self.config) {
            Ok(mut child) => {
                self.log(format!("[PLAY] Player launched successfully (PID: {})", child.id()));

                // Spawn stderr reader thread
                if let Some(stderr) = child.stderr.take() {
                    let sender = self.task_sender.clone();
                    thread::spawn(move || {
                        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                            if !line.trim().is_empty() {
                                let _ = sender.send(TaskResult::PlayerLog(format!("[PLAYER] {}", line)));
                            }
                        }
                    });
                }

                if self.config.single_window_mode {
                    self.current_player = Some(child);
                } else {
                    // Track exit of detached players
                    let sender = self.task_sender.clone();
                    let name = channel.name.clone();
                    thread::spawn(move || match child.wait() {
                        Ok(status) if !status.success() => {
                            let _ = sender.send(TaskResult::PlayerExited { name, code: status.code() });
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = sender.send(TaskResult::PlayerLog(format!("[ERROR] Failed to wait for player: {}", e)));
                        }
                    });
                }
            }
            Err(e) => {
                self.status_message = e.to_string();
                self.log(format!("[ERROR] {}", e));
            }
        }
    }

    fn poll_player(&mut self) {
        let exited = self
            .current_player
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten());

        if let Some(status) = exited {
            self.current_player = None;
            if status.success() {
                self.log("[INFO] Player closed");
            } else {
                self.log(format!("[WARN] Player exited with code {:?}", status.code()));
            }
        }
    }

    fn show_filter_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("🔍");
            let search = ui.add(
                egui::TextEdit::singleline(&mut self.search_input)
                    .hint_text("Search channels...")
                    .desired_width(220.0),
            );
            if search.changed() {
                self.search_edited_at = Some(Instant::now());
            }

            if let Some(choice) = selection_combo(
                ui,
                "category_filter",
                "All Categories",
                &self.state.query.category,
                &self.state.categories,
            ) {
                self.state.set_category(choice);
            }

            if let Some(choice) = selection_combo(
                ui,
                "country_filter",
                "All Countries",
                &self.state.query.country,
                &self.state.countries,
            ) {
                self.state.set_country(choice);
            }

            let favorites_only = self.state.query.favorites_only;
            let fav_text = if favorites_only {
                egui::RichText::new("★ Favorites").color(egui::Color32::GOLD)
            } else {
                egui::RichText::new("☆ Favorites")
            };
            if ui
                .selectable_label(favorites_only, fav_text)
                .on_hover_text("Show only favorite channels")
                .clicked()
            {
                self.state.toggle_favorites_only();
            }

            ui.separator();

            if ui.button("⏮ Prev").clicked() {
                self.play_prev();
            }
            if ui.button("Next ⏭").clicked() {
                self.play_next();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⚙ Settings").clicked() {
                    self.playlist_url_input = storage::playlist_url(&self.store);
                    self.show_settings = true;
                }
                ui.selectable_value(&mut self.current_tab, Tab::Console, "🖥 Console");
                ui.selectable_value(&mut self.current_tab, Tab::Channels, "📺 Channels");
            });
        });
    }

    fn show_now_playing(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            match self.state.current_channel() {
                Some(channel) => {
                    ui.label(egui::RichText::new(format!("▶ {}", channel.name)).strong().size(16.0));
                    ui.label(egui::RichText::new(format!("{} | {}", channel.country, channel.group)).weak());
                    if !channel.logo.is_empty() {
                        ui.hyperlink_to("🖼 Logo", &channel.logo);
                    }
                }
                None => {
                    ui.label(egui::RichText::new("Select a channel").weak());
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if self.status == LoadStatus::Ready {
                    ui.label(format!("{} channels", self.state.filtered_len()));
                }
            });
        });
    }

    fn show_channel_list(&mut self, ui: &mut egui::Ui) {
        match &self.status {
            LoadStatus::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading playlist from {}...", self.playlist_url));
                });
                return;
            }
            LoadStatus::Failed(message) => {
                ui.colored_label(egui::Color32::RED, format!("Error: {}", message));
                return;
            }
            LoadStatus::Ready => {}
        }

        if self.state.filtered_len() == 0 {
            ui.label(egui::RichText::new("No channels found").weak());
            return;
        }

        let current = self.state.current_position();
        let scroll_to_current = self.scroll_to_current;
        let mut to_play: Option<usize> = None;
        let mut toggle_fav: Option<String> = None;
        let mut load_more = false;

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for (pos, channel) in self.state.visible() {
                    let is_fav = self.state.is_favorite(&channel.id);
                    let is_current = current == Some(pos);

                    ui.horizontal(|ui| {
                        // Favorite toggle - use colored text for better visibility
                        let fav_text = if is_fav {
                            egui::RichText::new("★").size(18.0).color(egui::Color32::GOLD)
                        } else {
                            egui::RichText::new("☆").size(18.0).color(egui::Color32::GRAY)
                        };
                        if ui
                            .button(fav_text)
                            .on_hover_text(if is_fav { "Remove from Favorites" } else { "Add to Favorites" })
                            .clicked()
                        {
                            toggle_fav = Some(channel.id.clone());
                        }

                        ui.label(egui::RichText::new(format!("#{}", channel.sn)).monospace().weak());

                        let mut row = ui.selectable_label(is_current, egui::RichText::new(&channel.name).strong());
                        if !channel.logo.is_empty() {
                            row = row.on_hover_text(channel.logo.as_str());
                        }
                        if row.clicked() {
                            to_play = Some(pos);
                        }
                        if is_current && scroll_to_current {
                            row.scroll_to_me(Some(egui::Align::Center));
                        }

                        ui.label(egui::RichText::new(format!("{} • {}", channel.country, channel.group)).weak());
                    });
                }

                // Infinite scroll: grow the window once the end is on screen
                if self.state.has_more() {
                    let marker = ui.label(egui::RichText::new("Loading more...").weak());
                    if ui.is_rect_visible(marker.rect) {
                        load_more = true;
                    }
                }
            });

        self.scroll_to_current = false;

        if load_more {
            self.state.load_more();
        }

        if let Some(id) = toggle_fav {
            let added = self.state.toggle_favorite(&id, &mut self.store);
            self.status_message = if added {
                format!("Added '{}' to favorites", id)
            } else {
                format!("Removed '{}' from favorites", id)
            };
        }

        if let Some(pos) = to_play {
            self.select_and_play(pos);
        }
    }

    fn show_settings_window(&mut self, ctx: &egui::Context) {
        if !self.show_settings {
            return;
        }

        let mut open = true;
        let mut action: Option<SettingsAction> = None;

        egui::Window::new("⚙ Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label("📄 Playlist URL:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.playlist_url_input)
                        .hint_text(m3u_parser::DEFAULT_PLAYLIST_URL)
                        .desired_width(440.0),
                );
                ui.horizontal(|ui| {
                    if ui.button("💾 Save & Reload").clicked() {
                        action = Some(SettingsAction::SavePlaylist);
                    }
                    if ui.button("↺ Reset to Default").clicked() {
                        action = Some(SettingsAction::ResetPlaylist);
                    }
                });

                ui.separator();

                ui.horizontal(|ui| {
                    ui.label("🎬 Player:");
                    ui.add(
                        egui::TextEdit::singleline(&mut self.config.external_player)
                            .hint_text("ffplay, mpv, vlc...")
                            .desired_width(300.0),
                    )
                    .on_hover_text("Media player command or path. Leave empty for ffplay (default)");

                    if ui.button("📁").on_hover_text("Browse for player executable").clicked() {
                        if let Some(path) = rfd::FileDialog::new().set_title("Select Media Player").pick_file() {
                            self.config.external_player = path.display().to_string();
                        }
                    }
                });

                ui.horizontal(|ui| {
                    ui.label("🌐 User Agent:");
                    ui.add(egui::TextEdit::singleline(&mut self.config.user_agent).desired_width(340.0));
                });

                ui.checkbox(&mut self.config.pass_user_agent_to_player, "Pass user agent to player");
                ui.checkbox(&mut self.config.single_window_mode, "Single Window")
                    .on_hover_text("Close previous player when opening new stream");
                ui.checkbox(&mut self.config.resume_last_channel, "Resume last channel on startup");
                ui.checkbox(&mut self.config.geo_lookup, "Preselect my country")
                    .on_hover_text("Looks up your country from your IP address");
                ui.checkbox(&mut self.config.dark_mode, "🌙 Dark");

                ui.add_space(5.0);
                if ui.button("💾 Save Settings").clicked() {
                    action = Some(SettingsAction::SaveConfig);
                }
            });

        if !open {
            self.show_settings = false;
        }

        match action {
            Some(SettingsAction::SavePlaylist) => {
                let url = self.playlist_url_input.clone();
                match storage::set_playlist_url(&mut self.store, &url) {
                    Ok(true) => {
                        self.show_settings = false;
                        self.reload();
                    }
                    Ok(false) => self.status_message = "Playlist URL is empty".to_string(),
                    Err(e) => self.log(format!("[ERROR] Failed to save playlist URL: {}", e)),
                }
            }
            Some(SettingsAction::ResetPlaylist) => {
                if let Err(e) = storage::reset_playlist_url(&mut self.store) {
                    self.log(format!("[ERROR] Failed to reset playlist URL: {}", e));
                }
                self.show_settings = false;
                self.reload();
            }
            Some(SettingsAction::SaveConfig) => match self.config.save() {
                Ok(()) => {
                    self.status_message = "Settings saved".to_string();
                    self.log("[INFO] Settings saved");
                }
                Err(e) => self.log(format!("[ERROR] Failed to save settings: {}", e)),
            },
            None => {}
        }
    }

    fn show_console_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Console Log");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.console_log.clear();
                }
            });
        });
        ui.separator();

        // Display log entries with monospace font
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.console_log {
                    let color = if line.contains("[ERROR]") {
                        egui::Color32::RED
                    } else if line.contains("[WARN]") {
                        egui::Color32::YELLOW
                    } else if line.contains("[INFO]") {
                        egui::Color32::LIGHT_BLUE
                    } else if line.contains("[PLAY]") {
                        egui::Color32::GREEN
                    } else {
                        egui::Color32::GRAY
                    };

                    ui.label(egui::RichText::new(line).monospace().color(color));
                }
            });
    }
}

/// Combo box over `options` with a leading "all" entry; returns the new
/// selection when the user picked one
fn selection_combo(
    ui: &mut egui::Ui,
    id: &str,
    all_label: &str,
    current: &Selection,
    options: &BTreeSet<String>,
) -> Option<Selection> {
    let mut choice = None;

    egui::ComboBox::from_id_salt(id)
        .selected_text(current.label(all_label).to_string())
        .width(170.0)
        .show_ui(ui, |ui| {
            if ui.selectable_label(*current == Selection::All, all_label).clicked() {
                choice = Some(Selection::All);
            }
            for option in options {
                let selected = matches!(current, Selection::Only(value) if value == option);
                if ui.selectable_label(selected, option.as_str()).clicked() {
                    choice = Some(Selection::Only(option.clone()));
                }
            }
        });

    choice
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Process background task results (non-blocking)
        self.process_tasks();
        self.poll_player();
        self.apply_pending_search(ctx);
        self.handle_keyboard(ctx);

        // Apply theme
        if self.config.dark_mode {
            ctx.set_visuals(egui::Visuals::dark());
        } else {
            ctx.set_visuals(egui::Visuals::light());
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_space(5.0);
            self.show_filter_bar(ui);
            ui.separator();
            self.show_now_playing(ui);
            ui.add_space(3.0);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status_message);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(egui::RichText::new(&self.playlist_url).weak().small());
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.current_tab {
            Tab::Channels => self.show_channel_list(ui),
            Tab::Console => self.show_console_tab(ui),
        });

        self.show_settings_window(ctx);

        // Keep polling background threads and player output
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

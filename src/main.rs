mod backend;
mod state;
mod ui;

use backend::favorites::FavoritesStore;
use backend::images::{fetch_cover_image, fetch_page_image};
use backend::proxy::{ApiError, CatalogSource, ChapterDetail, ProxyClient};
use backend::settings::Settings;
use image::DynamicImage;
use state::chapter::ChapterRequest;
use state::feed::{FeedResponse, FeedTicket};
use ui::ui::{App, Overlay, Tab, View, ui};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use ratatui_image::picker::Picker;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::{error::Error, fs, io};
use tokio::sync::mpsc;

const COVER_PRELOAD: usize = 6;

enum BackgroundTask {
    FeedLoaded {
        ticket: FeedTicket,
        response: FeedResponse,
    },
    ChapterLoaded {
        request: ChapterRequest,
        result: Result<ChapterDetail, ApiError>,
    },
    CoverLoaded {
        manga_id: String,
        image: Option<DynamicImage>,
    },
    PageImageLoaded {
        generation: u64,
        url: String,
        image: DynamicImage,
    },
}

/// Owns the remote source and launches background work for the event loop.
struct Backend {
    source: Option<Arc<dyn CatalogSource>>,
    favorites: FavoritesStore,
    tx: mpsc::UnboundedSender<BackgroundTask>,
    pending_covers: HashSet<String>,
}

impl Backend {
    fn connect(&mut self, settings: &Settings) -> Result<(), ApiError> {
        match ProxyClient::new(settings.effective_api_url()) {
            Ok(client) => {
                log::info!("using proxy {}", client.base_url());
                self.source = Some(Arc::new(client));
                Ok(())
            }
            Err(e) => {
                self.source = None;
                Err(e)
            }
        }
    }

    fn spawn_feed(&self, ticket: Option<FeedTicket>) {
        let Some(ticket) = ticket else {
            return;
        };
        let source = self.source.clone();
        let favorites = self.favorites.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let response = ticket.run(source.as_deref(), &favorites).await;
            let _ = tx.send(BackgroundTask::FeedLoaded { ticket, response });
        });
    }

    fn spawn_chapter(&self, request: Option<ChapterRequest>) {
        let Some(request) = request else {
            return;
        };
        let source = self.source.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = match source {
                Some(source) => request.run(source.as_ref()).await,
                None => Err(ApiError::NotConfigured),
            };
            let _ = tx.send(BackgroundTask::ChapterLoaded { request, result });
        });
    }

    fn spawn_page_image(&self, generation: u64, url: Option<String>) {
        let Some(url) = url else {
            return;
        };
        let tx = self.tx.clone();

        tokio::spawn(async move {
            if let Some(image) = fetch_page_image(&url).await {
                let _ = tx.send(BackgroundTask::PageImageLoaded {
                    generation,
                    url,
                    image,
                });
            }
        });
    }

    fn spawn_cover_loaders(&mut self, app: &App) {
        let state = app.feed.current_view();
        for manga in state
            .visible_items()
            .into_iter()
            .skip(app.selected)
            .take(COVER_PRELOAD)
        {
            if app.image_states.contains_key(&manga.id) || self.pending_covers.contains(&manga.id)
            {
                continue;
            }
            self.pending_covers.insert(manga.id.clone());

            let manga_id = manga.id.clone();
            let cover_url = manga.cover_image_url.clone();
            let tx = self.tx.clone();

            tokio::spawn(async move {
                let image = fetch_cover_image(&cover_url).await;
                let _ = tx.send(BackgroundTask::CoverLoaded { manga_id, image });
            });
        }
    }
}

fn init_logging() {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("manga-lite-tui");
    if fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("manga-lite-tui.log"))
    else {
        return;
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let settings = Settings::load();
    let favorites = FavoritesStore::new();
    let picker = Picker::from_query_stdio().ok();
    let mut app = App::new(settings, favorites.clone(), picker);

    // Create channel for background tasks
    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackgroundTask>();
    let mut backend = Backend {
        source: None,
        favorites,
        tx: task_tx,
        pending_covers: HashSet::new(),
    };

    match backend.connect(&app.settings) {
        Ok(()) => backend.spawn_feed(app.switch_tab(Tab::Latest)),
        Err(e) => {
            log::info!("{e}; asking for a proxy URL");
            app.open_settings(true);
        }
    }

    let res = run_app(&mut terminal, &mut app, &mut backend, &mut task_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("{err}");
        eprintln!("{err}");
    }
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    backend: &mut Backend,
    task_rx: &mut mpsc::UnboundedReceiver<BackgroundTask>,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();

    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            // Redraw regularly so spinners move
            _ = tokio::time::sleep(tokio::time::Duration::from_millis(50)) => {}

            Some(Ok(event)) = event_stream.next() => {
                if let Event::Key(key) = event {
                    if key.kind == KeyEventKind::Press && handle_key(app, backend, key) {
                        return Ok(());
                    }
                }
            }

            Some(task) = task_rx.recv() => {
                handle_task(app, backend, task);
            }
        }
    }
}

fn handle_task(app: &mut App, backend: &mut Backend, task: BackgroundTask) {
    match task {
        BackgroundTask::FeedLoaded { ticket, response } => {
            if app.feed.complete(&ticket, response) {
                app.clamp_selection();
                backend.spawn_cover_loaders(app);
            }
        }
        BackgroundTask::ChapterLoaded { request, result } => {
            let first_page = app.apply_chapter(&request, result);
            backend.spawn_page_image(request.generation, first_page);
        }
        BackgroundTask::CoverLoaded { manga_id, image } => {
            // A failed cover leaves the pending set too, so it is tried again later.
            backend.pending_covers.remove(&manga_id);
            if let Some(image) = image {
                app.add_cover_image(&manga_id, image);
            }
        }
        BackgroundTask::PageImageLoaded {
            generation,
            url,
            image,
        } => {
            if !app.set_page_image(generation, &url, image) {
                log::debug!("dropping page image {url} for an outdated page");
            }
        }
    }
}

/// Returns `true` when the user asked to quit.
fn handle_key(app: &mut App, backend: &mut Backend, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    app.status_message = None;

    match app.overlay {
        Overlay::None => {}
        Overlay::Settings(_) => {
            handle_settings_input(app, backend, key.code);
            return false;
        }
        Overlay::Detail(_) => {
            handle_detail_input(app, backend, key.code);
            return false;
        }
        Overlay::ChapterPicker { .. } => {
            handle_chapter_picker_input(app, backend, key.code);
            return false;
        }
    }

    match app.view {
        View::Browse if app.editing_search => {
            handle_search_input(app, backend, key.code);
            false
        }
        View::Browse => handle_browse_input(app, backend, key.code),
        View::Reader => handle_reader_input(app, backend, key.code),
    }
}

fn handle_settings_input(app: &mut App, backend: &mut Backend, key: KeyCode) {
    match key {
        KeyCode::Char(c) => {
            if let Overlay::Settings(form) = &mut app.overlay {
                form.input.push(c);
                form.error = None;
            }
        }
        KeyCode::Backspace => {
            if let Overlay::Settings(form) = &mut app.overlay {
                form.input.pop();
                form.error = None;
            }
        }
        KeyCode::Enter => {
            if app.submit_settings() {
                match backend.connect(&app.settings) {
                    // A new endpoint always starts a fresh feed
                    Ok(()) => backend.spawn_feed(app.switch_tab(app.tab)),
                    Err(e) => {
                        log::warn!("{e}");
                        app.open_settings(true);
                    }
                }
            }
        }
        KeyCode::Esc => app.dismiss_overlay(),
        _ => {}
    }
}

fn handle_detail_input(app: &mut App, backend: &mut Backend, key: KeyCode) {
    let Overlay::Detail(manga) = &app.overlay else {
        return;
    };
    let manga = manga.clone();

    match key {
        KeyCode::Enter => {
            let request = app.open_reader(&manga);
            backend.spawn_chapter(Some(request));
        }
        KeyCode::Char('f') => app.toggle_favorite(&manga),
        KeyCode::Esc | KeyCode::Char('q') => app.dismiss_overlay(),
        _ => {}
    }
}

fn handle_chapter_picker_input(app: &mut App, backend: &mut Backend, key: KeyCode) {
    let Overlay::ChapterPicker { selected } = app.overlay else {
        return;
    };
    let count = app.navigator.catalog().len();

    match key {
        KeyCode::Up | KeyCode::Char('k') => {
            app.overlay = Overlay::ChapterPicker {
                selected: selected.saturating_sub(1),
            };
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.overlay = Overlay::ChapterPicker {
                selected: (selected + 1).min(count.saturating_sub(1)),
            };
        }
        KeyCode::Enter => {
            let label = app.navigator.catalog().get(selected).map(|c| c.label.clone());
            match label {
                Some(label) => {
                    let request = app.go_to_chapter(&label);
                    backend.spawn_chapter(request);
                }
                None => app.dismiss_overlay(),
            }
        }
        KeyCode::Esc | KeyCode::Char('c') => app.dismiss_overlay(),
        _ => {}
    }
}

fn handle_search_input(app: &mut App, backend: &mut Backend, key: KeyCode) {
    match key {
        KeyCode::Char(c) => app.search_query.push(c),
        KeyCode::Backspace => {
            app.search_query.pop();
        }
        KeyCode::Enter => backend.spawn_feed(app.submit_search()),
        KeyCode::Esc => app.editing_search = false,
        _ => {}
    }
}

fn handle_browse_input(app: &mut App, backend: &mut Backend, key: KeyCode) -> bool {
    match key {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => backend.spawn_feed(app.next_tab()),
        KeyCode::BackTab => backend.spawn_feed(app.previous_tab()),
        KeyCode::Char('/') => {
            if app.tab == Tab::Search {
                app.editing_search = true;
            } else {
                backend.spawn_feed(app.switch_tab(Tab::Search));
                app.editing_search = true;
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.select_previous();
            backend.spawn_cover_loaders(app);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let ticket = app.select_next();
            backend.spawn_feed(ticket);
            backend.spawn_cover_loaders(app);
        }
        KeyCode::Enter => {
            if let Some(manga) = app.selected_manga() {
                let request = app.open_reader(&manga);
                backend.spawn_chapter(Some(request));
            }
        }
        KeyCode::Char('i') => app.show_detail(),
        KeyCode::Char('f') => {
            if let Some(manga) = app.selected_manga() {
                app.toggle_favorite(&manga);
            }
        }
        KeyCode::Char('g') => {
            app.cycle_genre_filter();
            backend.spawn_cover_loaders(app);
        }
        KeyCode::Char('G') => {
            app.clear_genre_filter();
            backend.spawn_cover_loaders(app);
        }
        KeyCode::Char('m') => backend.spawn_feed(app.feed.load_more()),
        KeyCode::Char('r') => backend.spawn_feed(app.refresh_feed()),
        KeyCode::Char('s') => app.open_settings(false),
        _ => {}
    }
    false
}

fn handle_reader_input(app: &mut App, backend: &mut Backend, key: KeyCode) -> bool {
    match key {
        KeyCode::Char('q') => return true,
        KeyCode::Esc | KeyCode::Backspace => app.go_back(),
        KeyCode::Left | KeyCode::Char('p') => {
            let request = app.previous_chapter();
            backend.spawn_chapter(request);
        }
        KeyCode::Right | KeyCode::Char('n') => {
            let request = app.next_chapter();
            backend.spawn_chapter(request);
        }
        KeyCode::Up | KeyCode::Char('k') => {
            let url = app.previous_page();
            backend.spawn_page_image(app.navigator.generation(), url);
        }
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char(' ') => {
            let url = app.next_page();
            backend.spawn_page_image(app.navigator.generation(), url);
        }
        KeyCode::Char('c') => app.open_chapter_picker(),
        KeyCode::Char('r') => {
            let request = app.retry_chapter();
            backend.spawn_chapter(request);
        }
        KeyCode::Char('o') => {
            if let Some(url) = app.current_page_url().map(str::to_string) {
                if let Err(e) = webbrowser::open(&url) {
                    log::warn!("failed to open {url}: {e}");
                    app.status_message = Some("Could not open a browser".to_string());
                }
            }
        }
        _ => {}
    }
    false
}

use image::DynamicImage;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use ratatui_image::{Resize, StatefulImage, picker::Picker, protocol::StatefulProtocol};
use std::collections::{HashMap, HashSet};

use crate::backend::favorites::FavoritesStore;
use crate::backend::proxy::{ApiError, ChapterDetail, MangaSummary};
use crate::backend::settings::Settings;
use crate::state::chapter::{ChapterNavigator, ChapterRequest, NavStatus};
use crate::state::feed::{FeedController, FeedMode, FeedTicket};

pub const INITIAL_CHAPTER: &str = "1";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Tab {
    #[default]
    Latest,
    Search,
    Favorites,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum View {
    #[default]
    Browse,
    Reader,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsForm {
    pub input: String,
    pub error: Option<String>,
    pub forced: bool,
}

#[derive(Debug, Clone, Default)]
pub enum Overlay {
    #[default]
    None,
    Detail(MangaSummary),
    ChapterPicker { selected: usize },
    Settings(SettingsForm),
}

#[derive(Default)]
pub struct ReaderView {
    pub title: String,
    pub page: usize,
    pub page_image: Option<StatefulProtocol>,
}

impl ReaderView {
    fn clear_pages(&mut self) {
        self.page = 0;
        self.page_image = None;
    }
}

pub struct App {
    pub view: View,
    pub tab: Tab,
    pub overlay: Overlay,
    pub search_query: String,
    pub editing_search: bool,
    pub selected: usize,
    pub feed: FeedController,
    pub navigator: ChapterNavigator,
    pub favorites: FavoritesStore,
    pub settings: Settings,
    pub reader: ReaderView,
    pub picker: Option<Picker>,
    pub image_states: HashMap<String, StatefulProtocol>,
    pub favorite_ids: HashSet<String>,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(settings: Settings, favorites: FavoritesStore, picker: Option<Picker>) -> Self {
        let mut app = Self {
            view: View::Browse,
            tab: Tab::Latest,
            overlay: Overlay::None,
            search_query: String::new(),
            editing_search: false,
            selected: 0,
            feed: FeedController::new(),
            navigator: ChapterNavigator::new(),
            favorites,
            settings,
            reader: ReaderView::default(),
            picker,
            image_states: HashMap::new(),
            favorite_ids: HashSet::new(),
            status_message: None,
        };
        app.reload_favorite_ids();
        app
    }

    /// Re-reads the favorites file. Called after a toggle and on every tab switch.
    pub fn reload_favorite_ids(&mut self) {
        self.favorite_ids = self.favorites.list().into_iter().map(|m| m.id).collect();
    }

    fn mode_for_tab(&self) -> FeedMode {
        match self.tab {
            Tab::Latest => FeedMode::Latest,
            Tab::Search => FeedMode::Search(self.search_query.clone()),
            Tab::Favorites => FeedMode::Favorites,
        }
    }

    pub fn switch_tab(&mut self, tab: Tab) -> Option<FeedTicket> {
        self.tab = tab;
        self.selected = 0;
        self.overlay = Overlay::None;
        self.editing_search = tab == Tab::Search && self.search_query.trim().is_empty();
        self.reload_favorite_ids();
        self.feed.reset(self.mode_for_tab())
    }

    pub fn next_tab(&mut self) -> Option<FeedTicket> {
        let tab = match self.tab {
            Tab::Latest => Tab::Search,
            Tab::Search => Tab::Favorites,
            Tab::Favorites => Tab::Latest,
        };
        self.switch_tab(tab)
    }

    pub fn previous_tab(&mut self) -> Option<FeedTicket> {
        let tab = match self.tab {
            Tab::Latest => Tab::Favorites,
            Tab::Search => Tab::Latest,
            Tab::Favorites => Tab::Search,
        };
        self.switch_tab(tab)
    }

    pub fn submit_search(&mut self) -> Option<FeedTicket> {
        self.editing_search = false;
        self.selected = 0;
        self.feed.reset(FeedMode::Search(self.search_query.clone()))
    }

    /// Reloads the current feed from its first page; also the "try again" action.
    pub fn refresh_feed(&mut self) -> Option<FeedTicket> {
        self.selected = 0;
        self.feed.refresh()
    }

    pub fn selected_manga(&self) -> Option<MangaSummary> {
        self.feed
            .current_view()
            .visible_items()
            .get(self.selected)
            .map(|m| (*m).clone())
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Moves down the list. Reaching the last item asks for the next page.
    pub fn select_next(&mut self) -> Option<FeedTicket> {
        let visible = self.feed.current_view().visible_items().len();
        if self.selected + 1 < visible {
            self.selected += 1;
        }
        if self.selected + 1 >= visible && self.feed.can_load_more() {
            return self.feed.load_more();
        }
        None
    }

    pub fn clamp_selection(&mut self) {
        let visible = self.feed.current_view().visible_items().len();
        self.selected = self.selected.min(visible.saturating_sub(1));
    }

    pub fn cycle_genre_filter(&mut self) {
        self.feed.cycle_genre_filter();
        self.clamp_selection();
    }

    pub fn clear_genre_filter(&mut self) {
        self.feed.set_genre_filter(None);
        self.clamp_selection();
    }

    pub fn toggle_favorite(&mut self, manga: &MangaSummary) {
        self.status_message = Some(match self.favorites.toggle(manga) {
            Ok(true) => format!("Added \"{}\" to favorites", manga.title),
            Ok(false) => format!("Removed \"{}\" from favorites", manga.title),
            Err(e) => format!("Could not update favorites: {e}"),
        });
        self.reload_favorite_ids();
    }

    pub fn show_detail(&mut self) {
        if let Some(manga) = self.selected_manga() {
            self.overlay = Overlay::Detail(manga);
        }
    }

    pub fn open_reader(&mut self, manga: &MangaSummary) -> ChapterRequest {
        self.view = View::Reader;
        self.overlay = Overlay::None;
        self.reader.clear_pages();
        self.reader.title = manga.title.clone();
        self.navigator.open(&manga.id, INITIAL_CHAPTER)
    }

    /// Leaves the reader. The feed keeps its mode, query and loaded pages.
    pub fn go_back(&mut self) {
        self.view = View::Browse;
        self.overlay = Overlay::None;
        self.navigator.close();
        self.reader.clear_pages();
    }

    fn chapter_changed(&mut self, request: Option<ChapterRequest>) -> Option<ChapterRequest> {
        if request.is_some() {
            self.reader.clear_pages();
        }
        request
    }

    pub fn previous_chapter(&mut self) -> Option<ChapterRequest> {
        let request = self.navigator.go_previous();
        self.chapter_changed(request)
    }

    pub fn next_chapter(&mut self) -> Option<ChapterRequest> {
        let request = self.navigator.go_next();
        self.chapter_changed(request)
    }

    pub fn go_to_chapter(&mut self, chapter: &str) -> Option<ChapterRequest> {
        self.overlay = Overlay::None;
        let request = self.navigator.go_to(chapter);
        self.chapter_changed(request)
    }

    pub fn retry_chapter(&mut self) -> Option<ChapterRequest> {
        let request = self.navigator.retry();
        self.chapter_changed(request)
    }

    pub fn open_chapter_picker(&mut self) {
        let selected = self
            .navigator
            .catalog()
            .iter()
            .position(|c| c.label == self.navigator.state().current_chapter_id)
            .unwrap_or(0);
        if !self.navigator.catalog().is_empty() {
            self.overlay = Overlay::ChapterPicker { selected };
        }
    }

    /// Applies a chapter fetch and returns the first page to download, if any.
    pub fn apply_chapter(
        &mut self,
        request: &ChapterRequest,
        result: Result<ChapterDetail, ApiError>,
    ) -> Option<String> {
        if !self.navigator.complete(request, result) {
            return None;
        }
        self.reader.clear_pages();
        self.current_page_url().map(str::to_string)
    }

    pub fn current_page_url(&self) -> Option<&str> {
        self.navigator
            .images()
            .get(self.reader.page)
            .map(String::as_str)
    }

    pub fn next_page(&mut self) -> Option<String> {
        if self.reader.page + 1 >= self.navigator.images().len() {
            return None;
        }
        self.reader.page += 1;
        self.reader.page_image = None;
        self.current_page_url().map(str::to_string)
    }

    pub fn previous_page(&mut self) -> Option<String> {
        if self.reader.page == 0 {
            return None;
        }
        self.reader.page -= 1;
        self.reader.page_image = None;
        self.current_page_url().map(str::to_string)
    }

    /// Shows a downloaded page only if it still belongs to the page on screen.
    pub fn set_page_image(&mut self, generation: u64, url: &str, image: DynamicImage) -> bool {
        if generation != self.navigator.generation() || self.current_page_url() != Some(url) {
            return false;
        }
        if let Some(ref picker) = self.picker {
            self.reader.page_image = Some(picker.new_resize_protocol(image));
        }
        true
    }

    pub fn add_cover_image(&mut self, manga_id: &str, image: DynamicImage) {
        if let Some(ref picker) = self.picker {
            let protocol = picker.new_resize_protocol(image);
            self.image_states.insert(manga_id.to_string(), protocol);
        }
    }

    pub fn open_settings(&mut self, forced: bool) {
        self.overlay = Overlay::Settings(SettingsForm {
            input: self
                .settings
                .effective_api_url()
                .unwrap_or_default()
                .to_string(),
            error: None,
            forced,
        });
    }

    /// Saves the URL typed into the settings form. Returns `true` when the
    /// endpoint changed and the feed must be rebuilt.
    pub fn submit_settings(&mut self) -> bool {
        let Overlay::Settings(form) = &mut self.overlay else {
            return false;
        };
        match self.settings.set_api_url(&form.input) {
            Ok(()) => {
                self.overlay = Overlay::None;
                self.status_message = Some("Proxy URL saved".to_string());
                true
            }
            Err(e) => {
                form.error = Some(e.to_string());
                false
            }
        }
    }

    /// Closes whatever overlay is open, unless it is the forced settings form.
    pub fn dismiss_overlay(&mut self) {
        if let Overlay::Settings(SettingsForm { forced: true, .. }) = self.overlay {
            return;
        }
        self.overlay = Overlay::None;
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    match app.view {
        View::Browse => draw_browse(f, app),
        View::Reader => draw_reader(f, app),
    }

    match &app.overlay {
        Overlay::None => {}
        Overlay::Detail(manga) => {
            draw_detail_overlay(f, manga, app.favorite_ids.contains(&manga.id))
        }
        Overlay::ChapterPicker { selected } => draw_chapter_picker(f, app, *selected),
        Overlay::Settings(form) => draw_settings(f, form),
    }
}

fn spinner() -> &'static str {
    let spinner_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let frame_idx = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        / 100) as usize
        % spinner_frames.len();
    spinner_frames[frame_idx]
}

fn loading_line(message: &str) -> Line<'_> {
    Line::from(vec![
        Span::styled(
            format!(" {} ", spinner()),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            message,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ])
}

fn draw_browse(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // tabs
            Constraint::Length(3), // search / filter bar
            Constraint::Min(10),   // feed
            Constraint::Length(3), // footer
        ])
        .split(area);

    draw_header(f, root[0], app);
    draw_query_bar(f, root[1], app);

    let content = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(root[2]);

    draw_feed_list(f, content[0], app);
    draw_preview(f, content[1], app);

    draw_footer(f, root[3], app);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let titles = vec!["Latest Updates", "Search", "Favorites"];
    let selected = match app.tab {
        Tab::Latest => 0,
        Tab::Search => 1,
        Tab::Favorites => 2,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Manga Lite")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_query_bar(f: &mut Frame, area: Rect, app: &App) {
    let state = app.feed.current_view();
    let mut spans = Vec::new();

    if app.tab == Tab::Search {
        let cursor = if app.editing_search { "▏" } else { "" };
        spans.push(Span::styled("Search: ", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(format!("{}{}", app.search_query, cursor)));
        if !state.loading && state.total_count > 0 {
            spans.push(Span::styled(
                format!("  ({} results)", state.total_count),
                Style::default().fg(Color::DarkGray),
            ));
        }
        spans.push(Span::raw("   "));
    }

    spans.push(Span::styled("Genre: ", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(
        state.genre_filter.as_deref().unwrap_or("All Genres").to_string(),
    ));

    let bar = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(if app.editing_search {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::DarkGray)
            }),
    );
    f.render_widget(bar, area);
}

fn draw_feed_list(f: &mut Frame, area: Rect, app: &App) {
    let state = app.feed.current_view();
    let title = match app.feed.mode() {
        FeedMode::Latest => "Latest Updates".to_string(),
        FeedMode::Search(query) if query.trim().is_empty() => "Search".to_string(),
        FeedMode::Search(query) => format!("Results for \"{}\"", query),
        FeedMode::Favorites => "My Favorites".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let visible = state.visible_items();

    let mut lines_below = Vec::new();
    if let Some(error) = &state.error {
        lines_below.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
        lines_below.push(Line::from(Span::styled(
            "r: try again",
            Style::default().fg(Color::DarkGray),
        )));
    } else if state.loading {
        lines_below.push(loading_line("Loading..."));
    } else if app.feed.can_load_more() {
        lines_below.push(Line::from(Span::styled(
            "m: load more",
            Style::default().fg(Color::DarkGray),
        )));
    }

    if state.shows_empty_notice() {
        let mut notice = vec![Line::from(""), Line::from("No manga found.")];
        if state.genre_filter.is_some() {
            notice.push(Line::from(Span::styled(
                "G: clear filter",
                Style::default().fg(Color::Cyan),
            )));
        }
        let p = Paragraph::new(notice)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, inner);
        return;
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(lines_below.len() as u16),
        ])
        .split(inner);

    let width = layout[0].width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = visible
        .iter()
        .map(|manga| {
            let marker = if app.favorite_ids.contains(&manga.id) {
                Span::styled("♥ ", Style::default().fg(Color::Red))
            } else {
                Span::raw("  ")
            };
            ListItem::new(Line::from(vec![
                marker,
                Span::raw(truncate_text(&manga.title, width.saturating_sub(2))),
            ]))
        })
        .collect();

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");
    let mut list_state = ListState::default().with_selected(if visible.is_empty() {
        None
    } else {
        Some(app.selected)
    });
    f.render_stateful_widget(list, layout[0], &mut list_state);

    f.render_widget(
        Paragraph::new(lines_below).alignment(Alignment::Center),
        layout[1],
    );
}

fn draw_preview(f: &mut Frame, area: Rect, app: &mut App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(manga) = app.selected_manga() else {
        return;
    };
    if inner.height < 4 || inner.width < 5 {
        return;
    }

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50), // cover
            Constraint::Length(2),      // title
            Constraint::Length(1),      // genres
            Constraint::Min(2),         // description
        ])
        .split(inner);

    if let Some(state) = app.image_states.get_mut(&manga.id) {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, layout[0], state);
    } else {
        let placeholder = vec![
            Line::from(""),
            Line::from(Span::styled("📚", Style::default().fg(Color::Magenta))),
            Line::from(Span::styled(
                "Loading cover...",
                Style::default().fg(Color::DarkGray),
            )),
        ];
        f.render_widget(
            Paragraph::new(placeholder).alignment(Alignment::Center),
            layout[0],
        );
    }

    let mut title = vec![Span::styled(
        truncate_text(&manga.title, inner.width.saturating_sub(4) as usize),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    )];
    if app.favorite_ids.contains(&manga.id) {
        title.push(Span::styled(" ♥", Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(title)), layout[1]);

    f.render_widget(
        Paragraph::new(manga.genres.join(", ")).style(Style::default().fg(Color::Cyan)),
        layout[2],
    );

    let desc_lines = wrap_text(
        &manga.description,
        inner.width as usize,
        layout[3].height.max(1) as usize,
    );
    f.render_widget(
        Paragraph::new(desc_lines.join("\n")).style(Style::default().fg(Color::DarkGray)),
        layout[3],
    );
}

fn draw_reader(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(area);

    let state = app.navigator.state();
    let neighbors = app.navigator.neighbors();
    let nav_style = |enabled: bool| {
        if enabled {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };
    let header = Line::from(vec![
        Span::styled("◀ prev  ", nav_style(neighbors.previous.is_some())),
        Span::styled(
            format!("Chapter {}", state.current_chapter_id),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("  next ▶", nav_style(neighbors.next.is_some())),
    ]);
    f.render_widget(
        Paragraph::new(header).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .title(app.reader.title.clone())
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        root[0],
    );

    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(root[1]);
    f.render_widget(block, root[1]);

    match state.status {
        NavStatus::Idle | NavStatus::Loading => {
            let center = centered_rect(60, 3, inner);
            f.render_widget(
                Paragraph::new(loading_line("Loading chapter...")).alignment(Alignment::Center),
                center,
            );
        }
        NavStatus::Error => {
            let message = state
                .error_message
                .clone()
                .unwrap_or_else(|| "Failed to load chapter.".to_string());
            let text = vec![
                Line::from(Span::styled(
                    message,
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled("r: retry", Style::default().fg(Color::DarkGray))),
            ];
            f.render_widget(
                Paragraph::new(text)
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true }),
                centered_rect(80, 5, inner),
            );
        }
        NavStatus::Ready => {
            if let Some(protocol) = app.reader.page_image.as_mut() {
                let image_widget = StatefulImage::new().resize(Resize::Scale(None));
                f.render_stateful_widget(image_widget, inner, protocol);
            } else if app.navigator.images().is_empty() {
                f.render_widget(
                    Paragraph::new("This chapter has no pages.")
                        .alignment(Alignment::Center)
                        .style(Style::default().fg(Color::DarkGray)),
                    centered_rect(60, 1, inner),
                );
            } else {
                let url = app.current_page_url().unwrap_or_default().to_string();
                let text = vec![
                    loading_line("Loading page..."),
                    Line::from(Span::styled(url, Style::default().fg(Color::DarkGray))),
                ];
                f.render_widget(
                    Paragraph::new(text)
                        .alignment(Alignment::Center)
                        .wrap(Wrap { trim: true }),
                    centered_rect(80, 4, inner),
                );
            }
        }
    }

    let page_info = if app.navigator.images().is_empty() {
        String::new()
    } else {
        format!(
            "Page {}/{}  ",
            app.reader.page + 1,
            app.navigator.images().len()
        )
    };
    let footer = Line::from(vec![
        Span::styled(page_info, Style::default().fg(Color::White)),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(": page  "),
        Span::styled("←/→", Style::default().fg(Color::Yellow)),
        Span::raw(": chapter  "),
        Span::styled("c", Style::default().fg(Color::Yellow)),
        Span::raw(": chapters  "),
        Span::styled("o", Style::default().fg(Color::Yellow)),
        Span::raw(": open in browser  "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(": back"),
    ]);
    f.render_widget(
        Paragraph::new(footer).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        root[2],
    );
}

fn draw_detail_overlay(f: &mut Frame, manga: &MangaSummary, is_favorite: bool) {
    let area = centered_rect(70, 18, f.area());
    f.render_widget(Clear, area);

    let favorite = if is_favorite {
        Span::styled("♥ In favorites", Style::default().fg(Color::Red))
    } else {
        Span::styled("♡ Not in favorites", Style::default().fg(Color::DarkGray))
    };
    let text = vec![
        Line::from(Span::styled(
            manga.title.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            manga.genres.join(", "),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(favorite),
        Line::from(""),
        Line::from(manga.description.clone()),
        Line::from(""),
        Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(": read  "),
            Span::styled("f", Style::default().fg(Color::Yellow)),
            Span::raw(": favorite  "),
            Span::styled("Esc", Style::default().fg(Color::Yellow)),
            Span::raw(": close"),
        ]),
    ];

    f.render_widget(
        Paragraph::new(text).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Details")
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        area,
    );
}

fn draw_chapter_picker(f: &mut Frame, app: &App, selected: usize) {
    let area = centered_rect(30, 20, f.area());
    f.render_widget(Clear, area);

    let current = &app.navigator.state().current_chapter_id;
    let items: Vec<ListItem> = app
        .navigator
        .catalog()
        .iter()
        .map(|c| {
            let style = if &c.label == current {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Span::styled(format!("Chapter {}", c.label), style))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Chapters")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    let mut state = ListState::default().with_selected(Some(selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_settings(f: &mut Frame, form: &SettingsForm) {
    let area = centered_rect(70, 11, f.area());
    f.render_widget(Clear, area);

    let mut text = vec![
        Line::from(Span::styled(
            "Enter the URL of your deployed Google Apps Script web app.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("URL: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}▏", form.input)),
        ]),
        Line::from(""),
    ];
    if let Some(error) = &form.error {
        text.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    let mut hints = vec![
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(": save"),
    ];
    if !form.forced {
        hints.push(Span::raw("  "));
        hints.push(Span::styled("Esc", Style::default().fg(Color::Yellow)));
        hints.push(Span::raw(": cancel"));
    }
    text.push(Line::from(hints));

    f.render_widget(
        Paragraph::new(text).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .title("API Configuration")
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        area,
    );
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.status_message {
        Some(message) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )),
        None => Line::from(vec![
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(": section  "),
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(": search  "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(": read  "),
            Span::styled("i", Style::default().fg(Color::Yellow)),
            Span::raw(": details  "),
            Span::styled("f", Style::default().fg(Color::Yellow)),
            Span::raw(": favorite  "),
            Span::styled("g", Style::default().fg(Color::Yellow)),
            Span::raw(": genre  "),
            Span::styled("s", Style::default().fg(Color::Yellow)),
            Span::raw(": settings  "),
            Span::styled("q", Style::default().fg(Color::Yellow)),
            Span::raw(": quit"),
        ]),
    };

    let p = Paragraph::new(line)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = area.width * percent_x.min(100) / 100;
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

fn wrap_text(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    if width == 0 || max_lines == 0 {
        return vec![];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.chars().count() + 1 + word.chars().count() <= width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            if lines.len() >= max_lines {
                if let Some(last) = lines.last_mut() {
                    let char_count = last.chars().count();
                    if char_count > 3 {
                        *last = last.chars().take(char_count - 3).collect::<String>() + "...";
                    }
                }
                return lines;
            }
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() && lines.len() < max_lines {
        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{chapter, manga, page};
    use crate::state::feed::{FeedRequest, FeedResponse};
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> App {
        App::new(
            Settings::load_from(dir.path().join("settings.json")),
            FavoritesStore::at(dir.path().join("favorites.json")),
            None,
        )
    }

    fn with_latest(app: &mut App, count: usize) {
        let ticket = app.switch_tab(Tab::Latest).unwrap();
        app.feed
            .complete(&ticket, FeedResponse::Page(Ok(page(0, count, 100))));
    }

    #[test]
    fn test_switch_to_empty_search_starts_editing_without_fetch() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        assert!(app.switch_tab(Tab::Search).is_none());
        assert!(app.editing_search);

        app.search_query = "vinland".to_string();
        let ticket = app.submit_search().unwrap();
        assert!(!app.editing_search);
        assert!(matches!(ticket.request, FeedRequest::Search { .. }));
    }

    #[test]
    fn test_select_next_at_end_loads_more() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        with_latest(&mut app, 24);

        for _ in 0..22 {
            assert!(app.select_next().is_none());
        }
        let ticket = app.select_next().unwrap();
        assert_eq!(app.selected, 23);
        assert_eq!(
            ticket.request,
            FeedRequest::Latest {
                offset: 24,
                limit: 24
            }
        );
        // in flight: further presses do not queue another page
        assert!(app.select_next().is_none());
    }

    #[test]
    fn test_back_from_reader_keeps_feed() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.search_query = "berserk".to_string();
        let ticket = app.switch_tab(Tab::Search).unwrap();
        app.feed
            .complete(&ticket, FeedResponse::Page(Ok(page(0, 3, 3))));
        app.selected = 2;

        let selected = app.selected_manga().unwrap();
        let request = app.open_reader(&selected);
        assert_eq!(request.chapter, INITIAL_CHAPTER);
        assert_eq!(app.view, View::Reader);

        app.go_back();
        assert_eq!(app.view, View::Browse);
        assert_eq!(app.tab, Tab::Search);
        assert_eq!(app.feed.current_view().items.len(), 3);
        assert_eq!(app.selected, 2);
        assert_eq!(app.navigator.state().status, NavStatus::Idle);
    }

    #[test]
    fn test_chapter_change_drops_page_state() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let request = app.open_reader(&manga("m", &[]));
        let first = app.apply_chapter(&request, Ok(chapter("m", "1", &["1", "2"])));
        assert_eq!(first.as_deref(), Some("https://img.test/m/1/1.jpg"));

        assert!(app.next_page().is_some());
        assert_eq!(app.reader.page, 1);
        let old_generation = app.navigator.generation();

        let request = app.next_chapter().unwrap();
        assert_eq!(request.chapter, "2");
        assert_eq!(app.reader.page, 0);
        assert!(app.current_page_url().is_none());

        // a page image from the previous chapter arrives late
        assert!(!app.set_page_image(
            old_generation,
            "https://img.test/m/1/2.jpg",
            DynamicImage::new_rgb8(1, 1)
        ));
    }

    #[test]
    fn test_page_bounds() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let request = app.open_reader(&manga("m", &[]));
        app.apply_chapter(&request, Ok(chapter("m", "1", &["1"])));

        assert!(app.previous_page().is_none());
        assert_eq!(app.next_page().as_deref(), Some("https://img.test/m/1/2.jpg"));
        assert!(app.next_page().is_none());
        assert_eq!(app.previous_page().as_deref(), Some("https://img.test/m/1/1.jpg"));
    }

    #[test]
    fn test_forced_settings_cannot_be_dismissed() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        app.open_settings(true);
        app.dismiss_overlay();
        assert!(matches!(app.overlay, Overlay::Settings(_)));

        if let Overlay::Settings(form) = &mut app.overlay {
            form.input = "https://example.com".to_string();
        }
        assert!(!app.submit_settings());
        match &app.overlay {
            Overlay::Settings(form) => assert!(form.error.is_some()),
            other => panic!("unexpected overlay {other:?}"),
        }

        if let Overlay::Settings(form) = &mut app.overlay {
            form.input = "https://script.google.com/macros/s/x/exec".to_string();
        }
        assert!(app.submit_settings());
        assert!(matches!(app.overlay, Overlay::None));
        assert!(app.settings.effective_api_url().is_some());
    }

    #[test]
    fn test_genre_filter_clamps_selection() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        with_latest(&mut app, 10);
        app.selected = 9;

        app.cycle_genre_filter();
        assert_eq!(app.selected, 0);
        assert!(app.selected_manga().is_none());

        app.clear_genre_filter();
        assert_eq!(app.feed.current_view().visible_items().len(), 10);
    }

    #[test]
    fn test_toggle_favorite_reports_status() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        let m = manga("fav", &[]);

        app.toggle_favorite(&m);
        assert!(app.favorites.contains("fav"));
        assert!(app.favorite_ids.contains("fav"));
        assert!(app.status_message.as_deref().unwrap().starts_with("Added"));

        app.toggle_favorite(&m);
        assert!(!app.favorites.contains("fav"));
        assert!(!app.favorite_ids.contains("fav"));
    }

    #[test]
    fn test_failed_favorite_write_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let mut app = App::new(
            Settings::load_from(dir.path().join("settings.json")),
            FavoritesStore::at(blocker.join("favorites.json")),
            None,
        );

        app.toggle_favorite(&manga("fav", &[]));
        assert!(
            app.status_message
                .as_deref()
                .unwrap()
                .starts_with("Could not update favorites")
        );
        assert!(app.favorite_ids.is_empty());
    }

    #[test]
    fn test_favorite_ids_follow_external_changes_on_tab_switch() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir);
        assert!(app.favorite_ids.is_empty());

        // another store handle writes the same file
        FavoritesStore::at(dir.path().join("favorites.json"))
            .toggle(&manga("elsewhere", &[]))
            .unwrap();
        assert!(app.favorite_ids.is_empty());

        app.switch_tab(Tab::Favorites);
        assert!(app.favorite_ids.contains("elsewhere"));
    }

    #[test]
    fn test_wrap_text_limits_lines() {
        let lines = wrap_text("one two three four five six", 9, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("..."));
        assert_eq!(truncate_text("abcdefgh", 6), "abc...");
    }
}

//! Paged manga feed shared by the latest, search and favorites views.
//!
//! The controller never awaits. Every operation that needs data hands back a
//! [`FeedTicket`]; the caller runs it (see [`FeedTicket::run`]) and feeds the
//! response back through [`FeedController::complete`]. Tickets carry the epoch
//! they were issued in, so a response that arrives after a reset is dropped.

use std::time::Duration;

use crate::backend::favorites::FavoritesStore;
use crate::backend::proxy::{ApiError, CatalogSource, MangaSummary, Page};

pub const RESULTS_PER_PAGE: usize = 24;

/// Favorites come from disk instantly; the pause only keeps the spinner from flickering.
pub const FAVORITES_DELAY: Duration = Duration::from_millis(300);

pub const COMMON_GENRES: [&str; 14] = [
    "Action",
    "Adventure",
    "Comedy",
    "Drama",
    "Fantasy",
    "Horror",
    "Isekai",
    "Mystery",
    "Psychological",
    "Romance",
    "Sci-Fi",
    "Slice of Life",
    "Sports",
    "Thriller",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedMode {
    #[default]
    Latest,
    Search(String),
    Favorites,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub items: Vec<MangaSummary>,
    pub offset: usize,
    pub has_more: bool,
    pub total_count: usize,
    pub genre_filter: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl FeedState {
    /// Accumulated items with the genre filter applied. The stored list is
    /// never touched by filtering.
    pub fn visible_items(&self) -> Vec<&MangaSummary> {
        match self.genre_filter.as_deref() {
            Some(genre) => self.items.iter().filter(|m| m.has_genre(genre)).collect(),
            None => self.items.iter().collect(),
        }
    }

    pub fn shows_empty_notice(&self) -> bool {
        !self.loading && self.error.is_none() && self.visible_items().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRequest {
    Latest {
        offset: usize,
        limit: usize,
    },
    Search {
        query: String,
        offset: usize,
        limit: usize,
    },
    Favorites,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTicket {
    pub epoch: u64,
    pub request: FeedRequest,
    replace: bool,
}

#[derive(Debug)]
pub enum FeedResponse {
    Page(Result<Page, ApiError>),
    Favorites(Vec<MangaSummary>),
}

impl FeedTicket {
    /// Performs the fetch. Favorites need no remote source; the other modes
    /// fail with [`ApiError::NotConfigured`] without one.
    pub async fn run(
        &self,
        source: Option<&dyn CatalogSource>,
        favorites: &FavoritesStore,
    ) -> FeedResponse {
        match (&self.request, source) {
            (FeedRequest::Latest { offset, limit }, Some(source)) => {
                FeedResponse::Page(source.list_latest(*offset, *limit).await)
            }
            (
                FeedRequest::Search {
                    query,
                    offset,
                    limit,
                },
                Some(source),
            ) => FeedResponse::Page(source.search(query, *offset, *limit).await),
            (FeedRequest::Latest { .. } | FeedRequest::Search { .. }, None) => {
                FeedResponse::Page(Err(ApiError::NotConfigured))
            }
            (FeedRequest::Favorites, _) => {
                tokio::time::sleep(FAVORITES_DELAY).await;
                FeedResponse::Favorites(favorites.list())
            }
        }
    }
}

#[derive(Debug)]
pub struct FeedController {
    mode: FeedMode,
    state: FeedState,
    epoch: u64,
    limit: usize,
}

impl Default for FeedController {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedController {
    pub fn new() -> Self {
        Self::with_limit(RESULTS_PER_PAGE)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            mode: FeedMode::Latest,
            state: FeedState::default(),
            epoch: 0,
            limit: limit.max(1),
        }
    }

    pub fn mode(&self) -> &FeedMode {
        &self.mode
    }

    pub fn current_view(&self) -> &FeedState {
        &self.state
    }

    /// Starts a new epoch for `mode`. State is cleared before this returns;
    /// any fetch still in flight from an earlier epoch will be ignored.
    pub fn reset(&mut self, mode: FeedMode) -> Option<FeedTicket> {
        self.epoch += 1;
        self.mode = mode;
        self.state = FeedState {
            genre_filter: self.state.genre_filter.take(),
            has_more: true,
            ..FeedState::default()
        };
        log::debug!("feed reset to {:?} (epoch {})", self.mode, self.epoch);

        let request = match &self.mode {
            FeedMode::Favorites => {
                self.state.has_more = false;
                FeedRequest::Favorites
            }
            FeedMode::Search(query) if query.trim().is_empty() => {
                self.state.has_more = false;
                return None;
            }
            FeedMode::Search(query) => FeedRequest::Search {
                query: query.clone(),
                offset: 0,
                limit: self.limit,
            },
            FeedMode::Latest => FeedRequest::Latest {
                offset: 0,
                limit: self.limit,
            },
        };

        self.state.loading = true;
        Some(FeedTicket {
            epoch: self.epoch,
            request,
            replace: true,
        })
    }

    /// Re-runs the current mode from the first page. Also serves as the
    /// "try again" action after an error.
    pub fn refresh(&mut self) -> Option<FeedTicket> {
        self.reset(self.mode.clone())
    }

    pub fn load_more(&mut self) -> Option<FeedTicket> {
        if self.state.loading || !self.state.has_more {
            return None;
        }

        let request = match &self.mode {
            FeedMode::Favorites => return None,
            FeedMode::Search(query) => FeedRequest::Search {
                query: query.clone(),
                offset: self.state.offset,
                limit: self.limit,
            },
            FeedMode::Latest => FeedRequest::Latest {
                offset: self.state.offset,
                limit: self.limit,
            },
        };

        self.state.loading = true;
        self.state.error = None;
        Some(FeedTicket {
            epoch: self.epoch,
            request,
            replace: false,
        })
    }

    /// Applies the response for `ticket`. Returns `false` when the ticket
    /// belongs to an earlier epoch and was discarded.
    pub fn complete(&mut self, ticket: &FeedTicket, response: FeedResponse) -> bool {
        if ticket.epoch != self.epoch || !self.state.loading {
            log::debug!(
                "discarding stale feed response (epoch {}, current {})",
                ticket.epoch,
                self.epoch
            );
            return false;
        }
        self.state.loading = false;

        match response {
            FeedResponse::Favorites(favorites) => {
                self.state.total_count = favorites.len();
                self.state.items = favorites;
                self.state.has_more = false;
            }
            FeedResponse::Page(Ok(page)) => {
                let received = page.data.len();
                if ticket.replace {
                    self.state.items = page.data;
                    self.state.total_count = page.total;
                } else {
                    self.state.items.extend(page.data);
                }

                if received < self.limit {
                    self.state.has_more = false;
                } else {
                    self.state.offset += self.limit;
                    self.state.has_more = true;
                }
            }
            FeedResponse::Page(Err(e)) => {
                log::warn!("feed fetch failed: {e}");
                self.state.error = Some(e.to_string());
                self.state.has_more = false;
            }
        }
        true
    }

    pub fn set_genre_filter(&mut self, genre: Option<String>) {
        self.state.genre_filter = genre;
    }

    /// Steps through [`COMMON_GENRES`], wrapping back to "all genres".
    pub fn cycle_genre_filter(&mut self) {
        let next = match self.state.genre_filter.as_deref() {
            None => COMMON_GENRES.first(),
            Some(current) => COMMON_GENRES
                .iter()
                .position(|g| g.eq_ignore_ascii_case(current))
                .and_then(|i| COMMON_GENRES.get(i + 1)),
        };
        self.set_genre_filter(next.map(|g| g.to_string()));
    }

    /// Whether a "load more" affordance should be offered.
    pub fn can_load_more(&self) -> bool {
        !self.state.loading
            && self.state.has_more
            && self.mode != FeedMode::Favorites
            && !self.state.visible_items().is_empty()
    }
}

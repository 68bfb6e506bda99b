use std::cmp::Ordering;

use crate::backend::proxy::{ApiError, CatalogSource, ChapterDetail, ChapterRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct NavState {
    pub manga_id: String,
    pub current_chapter_id: String,
    pub detail: Option<ChapterDetail>,
    pub status: NavStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Neighbors {
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// One chapter fetch, tagged with the generation it was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRequest {
    pub generation: u64,
    pub manga_id: String,
    pub chapter: String,
}

impl ChapterRequest {
    pub async fn run(&self, source: &dyn CatalogSource) -> Result<ChapterDetail, ApiError> {
        source.fetch_chapter(&self.manga_id, &self.chapter).await
    }
}

fn chapter_number(label: &str) -> Option<f64> {
    label.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Numeric ascending; labels that are not numbers go last. The sort is stable
/// so equal values keep catalog order.
pub fn sort_catalog(catalog: &[ChapterRef]) -> Vec<&ChapterRef> {
    let mut sorted: Vec<&ChapterRef> = catalog.iter().collect();
    sorted.sort_by(
        |a, b| match (chapter_number(&a.label), chapter_number(&b.label)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    );
    sorted
}

pub fn neighbors_in(catalog: &[ChapterRef], current: &str) -> Neighbors {
    let sorted = sort_catalog(catalog);
    let Some(index) = sorted.iter().position(|c| c.label == current) else {
        return Neighbors::default();
    };

    Neighbors {
        previous: index
            .checked_sub(1)
            .and_then(|i| sorted.get(i))
            .map(|c| c.label.clone()),
        next: sorted.get(index + 1).map(|c| c.label.clone()),
    }
}

/// Reader state for one manga across chapter changes.
#[derive(Debug, Default)]
pub struct ChapterNavigator {
    state: NavState,
    generation: u64,
}

impl ChapterNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.state.status == NavStatus::Loading
    }

    pub fn open(&mut self, manga_id: &str, initial_chapter: &str) -> ChapterRequest {
        self.state.manga_id = manga_id.to_string();
        self.begin(initial_chapter.to_string())
    }

    pub fn go_to(&mut self, chapter: &str) -> Option<ChapterRequest> {
        if self.is_loading()
            || self.state.status == NavStatus::Idle
            || chapter == self.state.current_chapter_id
        {
            return None;
        }
        Some(self.begin(chapter.to_string()))
    }

    pub fn go_previous(&mut self) -> Option<ChapterRequest> {
        let previous = self.neighbors().previous?;
        self.go_to(&previous)
    }

    pub fn go_next(&mut self) -> Option<ChapterRequest> {
        let next = self.neighbors().next?;
        self.go_to(&next)
    }

    /// Re-issues the fetch for the current chapter.
    pub fn retry(&mut self) -> Option<ChapterRequest> {
        match self.state.status {
            NavStatus::Ready | NavStatus::Error => {
                Some(self.begin(self.state.current_chapter_id.clone()))
            }
            NavStatus::Idle | NavStatus::Loading => None,
        }
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.state = NavState::default();
    }

    fn begin(&mut self, chapter: String) -> ChapterRequest {
        self.generation += 1;
        log::debug!(
            "loading chapter {chapter} of {} (generation {})",
            self.state.manga_id,
            self.generation
        );

        // Drop the old pages before anything else can render.
        self.state.detail = None;
        self.state.error_message = None;
        self.state.current_chapter_id = chapter;
        self.state.status = NavStatus::Loading;

        ChapterRequest {
            generation: self.generation,
            manga_id: self.state.manga_id.clone(),
            chapter: self.state.current_chapter_id.clone(),
        }
    }

    /// Applies a fetch result. Returns `false` if `request` was superseded.
    pub fn complete(
        &mut self,
        request: &ChapterRequest,
        result: Result<ChapterDetail, ApiError>,
    ) -> bool {
        if request.generation != self.generation || !self.is_loading() {
            log::debug!(
                "discarding stale chapter {} response (generation {}, current {})",
                request.chapter,
                request.generation,
                self.generation
            );
            return false;
        }

        match result {
            Ok(detail) => {
                self.state.detail = Some(detail);
                self.state.status = NavStatus::Ready;
            }
            Err(e) => {
                log::warn!("chapter {} failed: {e}", request.chapter);
                self.state.detail = None;
                self.state.error_message = Some(e.to_string());
                self.state.status = NavStatus::Error;
            }
        }
        true
    }

    pub fn neighbors(&self) -> Neighbors {
        match (&self.state.status, &self.state.detail) {
            (NavStatus::Ready, Some(detail)) => {
                neighbors_in(&detail.chapter_catalog, &self.state.current_chapter_id)
            }
            _ => Neighbors::default(),
        }
    }

    /// Page image URLs to display; empty unless the current chapter is ready.
    pub fn images(&self) -> &[String] {
        match (&self.state.status, &self.state.detail) {
            (NavStatus::Ready, Some(detail)) => detail.images.as_slice(),
            _ => &[],
        }
    }

    pub fn catalog(&self) -> &[ChapterRef] {
        self.state
            .detail
            .as_ref()
            .map(|d| d.chapter_catalog.as_slice())
            .unwrap_or_default()
    }
}

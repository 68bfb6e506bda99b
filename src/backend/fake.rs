use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::proxy::{ApiError, CatalogSource, ChapterDetail, ChapterRef, MangaSummary, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { offset: usize, limit: usize },
    Search { query: String, offset: usize, limit: usize },
    Chapter { manga_id: String, chapter: String },
}

/// In-memory catalog that replays queued responses and records every call.
#[derive(Default)]
pub struct FakeSource {
    pages: Mutex<VecDeque<Result<Page, ApiError>>>,
    chapters: Mutex<VecDeque<Result<ChapterDetail, ApiError>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeSource {
    pub fn push_page(&self, page: Result<Page, ApiError>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn push_chapter(&self, detail: Result<ChapterDetail, ApiError>) {
        self.chapters.lock().unwrap().push_back(detail);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_page(&self) -> Result<Page, ApiError> {
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no page queued".to_string())))
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn list_latest(&self, offset: usize, limit: usize) -> Result<Page, ApiError> {
        self.calls.lock().unwrap().push(Call::List { offset, limit });
        self.next_page()
    }

    async fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page, ApiError> {
        self.calls.lock().unwrap().push(Call::Search {
            query: query.to_string(),
            offset,
            limit,
        });
        self.next_page()
    }

    async fn fetch_chapter(
        &self,
        manga_id: &str,
        chapter: &str,
    ) -> Result<ChapterDetail, ApiError> {
        self.calls.lock().unwrap().push(Call::Chapter {
            manga_id: manga_id.to_string(),
            chapter: chapter.to_string(),
        });
        self.chapters
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("no chapter queued".to_string())))
    }
}

pub fn manga(id: &str, genres: &[&str]) -> MangaSummary {
    MangaSummary {
        id: id.to_string(),
        title: format!("Manga {id}"),
        description: String::new(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        cover_image_url: String::new(),
    }
}

/// A page of `count` items whose ids start at `first`.
pub fn page(first: usize, count: usize, total: usize) -> Page {
    Page {
        offset: first,
        limit: count,
        total,
        count,
        data: (first..first + count)
            .map(|i| manga(&format!("m{i}"), &[]))
            .collect(),
    }
}

pub fn chapter(manga_id: &str, current: &str, catalog: &[&str]) -> ChapterDetail {
    ChapterDetail {
        manga_id: manga_id.to_string(),
        images: vec![
            format!("https://img.test/{manga_id}/{current}/1.jpg"),
            format!("https://img.test/{manga_id}/{current}/2.jpg"),
        ],
        chapter_catalog: catalog
            .iter()
            .map(|label| ChapterRef {
                label: label.to_string(),
            })
            .collect(),
        current_chapter: current.to_string(),
    }
}

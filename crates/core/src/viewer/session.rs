use super::highlight::{transform_highlight, HighlightOverlay};
use super::viewport::{CanvasTarget, PageViewState, RenderQuality};
use crate::error::ViewerError;
use crate::models::{HighlightRequest, PageGeometry};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Backend that loads page geometry and paints pages onto a canvas.
#[async_trait]
pub trait PageRenderer {
    async fn page_count(&self) -> Result<u32, ViewerError>;

    async fn load_page(&self, page: u32) -> Result<PageGeometry, ViewerError>;

    async fn draw(&self, page: u32, canvas: &CanvasTarget) -> Result<(), ViewerError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Empty,
    Loaded,
    Rendered,
    Failed { page: u32, reason: String },
}

/// One document on screen: pages rendered in order, highlights that arrive
/// before their page is ready are held and applied once it is.
pub struct RenderSession<R> {
    renderer: Option<R>,
    page_count: u32,
    container_width: f32,
    quality: RenderQuality,
    pages: BTreeMap<u32, PageViewState>,
    pending: BTreeMap<u32, Vec<HighlightRequest>>,
    overlays: Vec<HighlightOverlay>,
    status: SessionStatus,
}

impl<R> RenderSession<R>
where
    R: PageRenderer + Send + Sync,
{
    pub fn new(container_width: f32, quality: RenderQuality) -> Self {
        Self {
            renderer: None,
            page_count: 0,
            container_width,
            quality,
            pages: BTreeMap::new(),
            pending: BTreeMap::new(),
            overlays: Vec::new(),
            status: SessionStatus::Empty,
        }
    }

    /// Replaces the current document. Everything tied to the previous one,
    /// including highlights still waiting for a page, is dropped first.
    pub async fn load(&mut self, renderer: R) -> Result<u32, ViewerError> {
        self.teardown();

        let page_count = renderer.page_count().await?;
        info!(page_count, "document loaded");

        self.renderer = Some(renderer);
        self.page_count = page_count;
        self.status = SessionStatus::Loaded;
        Ok(page_count)
    }

    pub fn teardown(&mut self) {
        let discarded: usize = self.pending.values().map(Vec::len).sum();
        if discarded > 0 {
            warn!(discarded, "discarding highlights for pages that never rendered");
        }

        self.renderer = None;
        self.page_count = 0;
        self.pages.clear();
        self.pending.clear();
        self.overlays.clear();
        self.status = SessionStatus::Empty;
    }

    /// Places a highlight. Returns the overlay when its page is already on
    /// screen, `None` when it was queued for a page still to render.
    pub fn request_highlight(
        &mut self,
        request: HighlightRequest,
    ) -> Result<Option<HighlightOverlay>, ViewerError> {
        if self.renderer.is_none() {
            return Err(ViewerError::NoDocument);
        }

        if request.page == 0 || request.page > self.page_count {
            warn!(
                page = request.page,
                page_count = self.page_count,
                "ignoring highlight for page outside the document"
            );
            return Err(ViewerError::PageOutOfRange {
                page: request.page,
                page_count: self.page_count,
            });
        }

        if !request.bbox.is_finite() {
            warn!(page = request.page, bbox = %request.bbox, "ignoring malformed highlight box");
            return Err(ViewerError::MalformedBox(request.bbox.to_string()));
        }

        match self.pages.get(&request.page) {
            Some(state) => {
                let overlay = overlay_for(state, &request)?;
                self.overlays.push(overlay);
                Ok(Some(overlay))
            }
            None => {
                debug!(page = request.page, "page not rendered yet, deferring highlight");
                self.pending.entry(request.page).or_default().push(request);
                Ok(None)
            }
        }
    }

    /// Renders every page not yet on screen, in page order. The first page
    /// that fails to load or draw stops the run and leaves the session in
    /// [`SessionStatus::Failed`].
    pub async fn render_all(&mut self) -> Result<(), ViewerError> {
        if self.renderer.is_none() {
            return Err(ViewerError::NoDocument);
        }

        for page in 1..=self.page_count {
            if self.pages.contains_key(&page) {
                continue;
            }

            let rendered = match self.renderer.as_ref() {
                Some(renderer) => {
                    render_page(renderer, page, self.container_width, &self.quality).await
                }
                None => return Err(ViewerError::NoDocument),
            };

            match rendered {
                Ok(state) => {
                    self.pages.insert(page, state);
                    self.apply_pending(page);
                }
                Err(err) => {
                    error!(page, error = %err, "page failed to render, halting");
                    self.status = SessionStatus::Failed {
                        page,
                        reason: err.to_string(),
                    };
                    return Err(err);
                }
            }
        }

        self.status = SessionStatus::Rendered;
        Ok(())
    }

    fn apply_pending(&mut self, page: u32) {
        let Some(requests) = self.pending.remove(&page) else {
            return;
        };
        let Some(state) = self.pages.get(&page) else {
            return;
        };

        for request in requests {
            match overlay_for(state, &request) {
                Ok(overlay) => self.overlays.push(overlay),
                Err(err) => warn!(page, error = %err, "dropping deferred highlight"),
            }
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn page_state(&self, page: u32) -> Option<&PageViewState> {
        self.pages.get(&page)
    }

    pub fn overlays(&self) -> &[HighlightOverlay] {
        &self.overlays
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn quality(&self) -> &RenderQuality {
        &self.quality
    }
}

async fn render_page<R>(
    renderer: &R,
    page: u32,
    container_width: f32,
    quality: &RenderQuality,
) -> Result<PageViewState, ViewerError>
where
    R: PageRenderer + Send + Sync,
{
    let geometry = renderer.load_page(page).await?;
    let state = PageViewState::fit_width(&geometry, container_width, quality);
    let canvas = state.canvas(quality);

    renderer.draw(page, &canvas).await?;
    debug!(
        page,
        scale = state.display_scale,
        pixel_width = canvas.pixel_width,
        pixel_height = canvas.pixel_height,
        "page rendered"
    );
    Ok(state)
}

fn overlay_for(
    state: &PageViewState,
    request: &HighlightRequest,
) -> Result<HighlightOverlay, ViewerError> {
    Ok(HighlightOverlay {
        page: request.page,
        bbox: request.bbox,
        rect: transform_highlight(&request.bbox, &state.display)?,
    })
}

use super::session::PageRenderer;
use super::viewport::CanvasTarget;
use crate::error::{ExtractError, ViewerError};
use crate::extractor::page_geometries;
use crate::models::PageGeometry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Page layout read straight from a PDF. Produces geometry only; painting is
/// left to whatever surface consumes the [`CanvasTarget`].
#[derive(Debug, Clone)]
pub struct PdfPageSource {
    path: PathBuf,
    geometries: Vec<PageGeometry>,
}

impl PdfPageSource {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        Ok(Self {
            path: path.to_path_buf(),
            geometries: page_geometries(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PageRenderer for PdfPageSource {
    async fn page_count(&self) -> Result<u32, ViewerError> {
        Ok(self.geometries.len() as u32)
    }

    async fn load_page(&self, page: u32) -> Result<PageGeometry, ViewerError> {
        self.geometries
            .iter()
            .find(|geometry| geometry.page == page)
            .copied()
            .ok_or_else(|| ViewerError::PageLoad {
                page,
                reason: format!("{} has no page {page}", self.path.display()),
            })
    }

    async fn draw(&self, page: u32, canvas: &CanvasTarget) -> Result<(), ViewerError> {
        debug!(
            page,
            width = canvas.pixel_width,
            height = canvas.pixel_height,
            "page layout ready"
        );
        Ok(())
    }
}

//! Paged rendering of the unlocked itinerary.
//!
//! The HTML is laid out offscreen at page width, cut into page-height tiles,
//! and each tile becomes one page. Actual rasterization sits behind
//! [`Rasterizer`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::unlock::UnlockController;

use super::ExportError;

/// Page size in pixels at render scale (A4 at 96 dpi by default)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for PageSize {
    fn default() -> Self {
        Self {
            width_px: 794,
            height_px: 1123,
        }
    }
}

impl From<&ExportConfig> for PageSize {
    fn from(config: &ExportConfig) -> Self {
        Self {
            width_px: config.page_width_px.max(1),
            height_px: config.page_height_px.max(1),
        }
    }
}

/// One horizontal band of the laid-out content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTile {
    pub index: usize,
    pub offset_px: u32,
    pub height_px: u32,
    pub width_px: u32,
}

/// Cut `content_height_px` of content into page-sized tiles.
///
/// Always yields at least one page; the last tile holds the remainder.
pub fn paginate(content_height_px: u32, page: PageSize) -> Vec<PageTile> {
    let page_height = page.height_px.max(1);
    let pages = content_height_px.div_ceil(page_height).max(1);

    (0..pages)
        .map(|i| {
            let offset_px = i * page_height;
            let height_px = content_height_px
                .saturating_sub(offset_px)
                .clamp(1, page_height);
            PageTile {
                index: i as usize,
                offset_px,
                height_px,
                width_px: page.width_px,
            }
        })
        .collect()
}

/// Offscreen renderer
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Resolve once every image referenced by `html` has loaded
    async fn load_images(&self, html: &str) -> Result<(), ExportError>;

    /// Lay out `html` at `width_px` and return the content height
    async fn measure(&self, html: &str, width_px: u32) -> Result<u32, ExportError>;

    /// Rasterize one tile of the laid-out content
    async fn rasterize(&self, html: &str, tile: &PageTile) -> Result<Vec<u8>, ExportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub tile: PageTile,
    pub image: Vec<u8>,
}

/// Multi-page output, one image per page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedDocument {
    pub page_size: PageSize,
    pub pages: Vec<PageImage>,
}

impl PagedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

pub struct PdfExporter {
    rasterizer: Arc<dyn Rasterizer>,
    page: PageSize,
}

impl PdfExporter {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            rasterizer,
            page: PageSize::default(),
        }
    }

    pub fn with_page_size(mut self, page: PageSize) -> Self {
        self.page = page;
        self
    }

    /// Export the full itinerary. Fails while it is still locked.
    pub async fn export(&self, controller: &UnlockController) -> Result<PagedDocument, ExportError> {
        let html = controller.unlocked_html().ok_or(ExportError::Locked)?;
        self.render(&html).await
    }

    pub async fn render(&self, html: &str) -> Result<PagedDocument, ExportError> {
        self.rasterizer.load_images(html).await?;

        let height = self.rasterizer.measure(html, self.page.width_px).await?;
        let tiles = paginate(height, self.page);
        debug!("Content is {}px tall, {} page(s)", height, tiles.len());

        let mut pages = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let image = self.rasterizer.rasterize(html, &tile).await?;
            pages.push(PageImage { tile, image });
        }

        info!("Rendered itinerary into {} page(s)", pages.len());
        Ok(PagedDocument {
            page_size: self.page,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const PAGE: PageSize = PageSize {
        width_px: 794,
        height_px: 1123,
    };

    #[test]
    fn test_single_page() {
        let tiles = paginate(800, PAGE);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].height_px, 800);
    }

    #[test]
    fn test_tall_content_spans_pages() {
        let tiles = paginate(2_500, PAGE);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[1].offset_px, 1_123);
        assert_eq!(tiles[2].offset_px, 2_246);
        assert_eq!(tiles[2].height_px, 254);
        assert!(tiles.iter().all(|t| t.width_px == 794));
    }

    #[test]
    fn test_exact_multiple_has_no_blank_page() {
        let tiles = paginate(2_246, PAGE);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].height_px, 1_123);
    }

    #[test]
    fn test_empty_content_still_one_page() {
        assert_eq!(paginate(0, PAGE).len(), 1);
    }

    /// Records the order of calls
    struct FakeRasterizer {
        height: u32,
        broken_image: bool,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn load_images(&self, _html: &str) -> Result<(), ExportError> {
            self.log.lock().unwrap().push("images".to_string());
            if self.broken_image {
                return Err(ExportError::ImageLoad("hero.jpg".to_string()));
            }
            Ok(())
        }

        async fn measure(&self, _html: &str, width_px: u32) -> Result<u32, ExportError> {
            self.log.lock().unwrap().push(format!("measure@{}", width_px));
            Ok(self.height)
        }

        async fn rasterize(&self, _html: &str, tile: &PageTile) -> Result<Vec<u8>, ExportError> {
            self.log.lock().unwrap().push(format!("tile{}", tile.index));
            Ok(vec![tile.index as u8])
        }
    }

    #[tokio::test]
    async fn test_images_load_before_tiling() {
        let rasterizer = Arc::new(FakeRasterizer {
            height: 3_000,
            broken_image: false,
            log: Mutex::new(Vec::new()),
        });
        let exporter = PdfExporter::new(rasterizer.clone());

        let document = exporter.render("<h1>Paris</h1>").await.unwrap();
        assert_eq!(document.page_count(), 3);
        assert_eq!(document.pages[2].image, vec![2]);
        assert_eq!(
            *rasterizer.log.lock().unwrap(),
            vec!["images", "measure@794", "tile0", "tile1", "tile2"]
        );
    }

    #[tokio::test]
    async fn test_image_failure_aborts() {
        let rasterizer = Arc::new(FakeRasterizer {
            height: 100,
            broken_image: true,
            log: Mutex::new(Vec::new()),
        });
        let exporter = PdfExporter::new(rasterizer.clone());

        assert!(matches!(
            exporter.render("<img src=\"hero.jpg\">").await,
            Err(ExportError::ImageLoad(_))
        ));
        assert_eq!(rasterizer.log.lock().unwrap().len(), 1);
    }
}

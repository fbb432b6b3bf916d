//! [`Rasterizer`] backed by a headless Chromium-family browser.
//!
//! Every step loads a generated page from a scratch directory. Layout facts
//! come back through `--dump-dom`: a small script writes the content height
//! and the number of broken images onto the `<html>` element once the page
//! has loaded. Tiles come out of `--screenshot` with the window sized to the
//! tile and the content shifted up by the tile offset.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use super::ExportError;
use super::pdf::{PageSize, PageTile, Rasterizer};

/// Virtual time the browser gets to fetch images before it reports
const LOAD_BUDGET_MS: u32 = 10_000;

/// Window height for layout passes; the content height is read from the DOM
const LAYOUT_WINDOW_HEIGHT_PX: u32 = 1_000;

const HEIGHT_ATTR: &str = "data-content-height";
const BROKEN_ATTR: &str = "data-broken-images";

static LAYOUT_ATTRS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-(content-height|broken-images)="(\d+)""#).expect("valid layout regex")
});

const LAYOUT_SCRIPT: &str = r#"<script>
window.addEventListener('load', function () {
  var root = document.documentElement;
  var content = document.getElementById('content');
  var broken = Array.prototype.filter.call(document.images, function (img) {
    return !img.complete || img.naturalWidth === 0;
  }).length;
  root.setAttribute('data-content-height', String(Math.ceil(content.getBoundingClientRect().height)));
  root.setAttribute('data-broken-images', String(broken));
});
</script>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    height_px: u32,
    broken_images: u32,
}

pub struct ChromeRasterizer {
    binary: PathBuf,
    scratch: PathBuf,
}

impl ChromeRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch: std::env::temp_dir().join(format!("itinerary-forge-{}", Uuid::new_v4())),
        }
    }

    async fn write_page(&self, name: &str, html: &str) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.scratch).await.map_err(io_error)?;
        let path = self.scratch.join(name);
        fs::write(&path, html).await.map_err(io_error)?;
        Ok(path)
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>, ExportError> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(["--headless", "--disable-gpu", "--hide-scrollbars", "--no-first-run"])
            .args(args)
            .output()
            .await
            .map_err(|e| {
                ExportError::Render(format!("Failed to start {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            return Err(ExportError::Render(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn layout(&self, html: &str, width_px: u32) -> Result<Layout, ExportError> {
        let page = self.write_page("layout.html", &layout_page(html, width_px)).await?;
        let dom = self
            .run(&[
                format!("--window-size={},{}", width_px, LAYOUT_WINDOW_HEIGHT_PX),
                format!("--virtual-time-budget={}", LOAD_BUDGET_MS),
                "--dump-dom".to_string(),
                file_url(&page),
            ])
            .await?;
        parse_layout(&String::from_utf8_lossy(&dom))
    }
}

impl Drop for ChromeRasterizer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.scratch) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove {}: {}", self.scratch.display(), e);
            }
        }
    }
}

#[async_trait]
impl Rasterizer for ChromeRasterizer {
    async fn load_images(&self, html: &str) -> Result<(), ExportError> {
        let layout = self.layout(html, PageSize::default().width_px).await?;
        if layout.broken_images > 0 {
            return Err(ExportError::ImageLoad(format!(
                "{} image(s) did not load",
                layout.broken_images
            )));
        }
        Ok(())
    }

    async fn measure(&self, html: &str, width_px: u32) -> Result<u32, ExportError> {
        Ok(self.layout(html, width_px).await?.height_px)
    }

    async fn rasterize(&self, html: &str, tile: &PageTile) -> Result<Vec<u8>, ExportError> {
        let page = self
            .write_page(&format!("page-{}.html", tile.index), &tile_page(html, tile))
            .await?;
        let shot = self.scratch.join(format!("page-{}.png", tile.index));
        self.run(&[
            format!("--window-size={},{}", tile.width_px, tile.height_px),
            format!("--virtual-time-budget={}", LOAD_BUDGET_MS),
            format!("--screenshot={}", shot.display()),
            file_url(&page),
        ])
        .await?;
        fs::read(&shot).await.map_err(io_error)
    }
}

fn layout_page(html: &str, width_px: u32) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <style>html,body{{margin:0;padding:0;width:{width_px}px}}</style>\
         {LAYOUT_SCRIPT}</head><body><div id=\"content\">{html}</div></body></html>"
    )
}

fn tile_page(html: &str, tile: &PageTile) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <style>html,body{{margin:0;padding:0;width:{}px;height:{}px;overflow:hidden}}\
         #content{{position:relative;top:-{}px}}</style>\
         </head><body><div id=\"content\">{}</div></body></html>",
        tile.width_px, tile.height_px, tile.offset_px, html
    )
}

fn parse_layout(dom: &str) -> Result<Layout, ExportError> {
    let mut height_px = None;
    let mut broken_images = None;
    for caps in LAYOUT_ATTRS.captures_iter(dom) {
        let value = caps[2].parse::<u32>().ok();
        match &caps[1] {
            "content-height" => height_px = height_px.or(value),
            _ => broken_images = broken_images.or(value),
        }
    }

    match (height_px, broken_images) {
        (Some(height_px), Some(broken_images)) => Ok(Layout {
            height_px,
            broken_images,
        }),
        _ => Err(ExportError::Render(format!(
            "Page never finished loading ({} / {} missing)",
            HEIGHT_ATTR, BROKEN_ATTR
        ))),
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn io_error(e: std::io::Error) -> ExportError {
    ExportError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_read_from_dumped_dom() {
        let dom = r#"<html data-content-height="2500" data-broken-images="0"><head></head><body><div id="content"><p>Day 1</p></div></body></html>"#;
        assert_eq!(
            parse_layout(dom).unwrap(),
            Layout {
                height_px: 2_500,
                broken_images: 0
            }
        );
    }

    #[test]
    fn test_unfinished_page_is_render_error() {
        let dom = r#"<html data-broken-images="1"><body></body></html>"#;
        assert!(matches!(parse_layout(dom), Err(ExportError::Render(_))));
    }

    #[test]
    fn test_itinerary_text_cannot_spoof_layout() {
        // The root element is dumped before any content
        let dom = r#"<html data-content-height="900" data-broken-images="2"><body><div id="content">data-content-height="1"</div></body></html>"#;
        let layout = parse_layout(dom).unwrap();
        assert_eq!(layout.height_px, 900);
        assert_eq!(layout.broken_images, 2);
    }

    #[test]
    fn test_tile_page_shifts_content_to_offset() {
        let tile = PageTile {
            index: 2,
            offset_px: 2_246,
            height_px: 254,
            width_px: 794,
        };
        let page = tile_page("<h1>Paris</h1>", &tile);
        assert!(page.contains("width:794px;height:254px;overflow:hidden"));
        assert!(page.contains("top:-2246px"));
        assert!(page.contains("<div id=\"content\"><h1>Paris</h1></div>"));
    }

    #[test]
    fn test_layout_page_sets_width_and_script() {
        let page = layout_page("<p>Day 1</p>", 794);
        assert!(page.contains("width:794px"));
        assert!(page.contains(HEIGHT_ATTR));
        assert!(page.contains(BROKEN_ATTR));
    }

    #[tokio::test]
    async fn test_missing_browser_is_render_error() {
        let rasterizer = ChromeRasterizer::new("/nonexistent/itinerary-forge-browser");
        let err = rasterizer.measure("<p>Day 1</p>", 794).await.unwrap_err();
        assert!(matches!(err, ExportError::Render(ref m) if m.contains("Failed to start")));
    }
}

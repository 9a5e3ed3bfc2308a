//! Structural complexity scoring for parser routing.
//!
//! The score is a weighted blend of image density, table density, and page
//! count, normalized to [0, 1]. Documents below the routing threshold go to
//! the fast parser; the rest need the comprehensive one.

/// Raw structural signals scanned from a document's text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexitySignals {
    pub image_count: usize,
    pub table_line_count: usize,
    pub page_count: usize,
    pub total_lines: usize,
}

/// Approximate characters per "page" for formats without explicit breaks.
const CHARS_PER_PAGE: usize = 3_000;

/// Image density saturates at this many images per page.
const IMAGES_PER_PAGE_CAP: f32 = 5.0;

/// Page-count factor saturates at this many pages.
const PAGE_CAP: f32 = 20.0;

const IMAGE_WEIGHT: f32 = 0.4;
const TABLE_WEIGHT: f32 = 0.4;
const PAGE_WEIGHT: f32 = 0.2;

impl ComplexitySignals {
    /// Scan text for structural signals. Binary input should be lossily
    /// decoded by the caller first; garbage lines just read as prose.
    pub fn scan(text: &str) -> Self {
        let mut image_count = 0;
        let mut table_line_count = 0;
        let mut total_lines = 0;

        for line in text.lines() {
            total_lines += 1;
            let trimmed = line.trim_start();
            image_count += trimmed.matches("![").count();
            image_count += trimmed.matches("<img").count();
            if is_table_line(trimmed) {
                table_line_count += 1;
            }
        }

        let form_feeds = text.matches('\u{0C}').count();
        let page_count = if form_feeds > 0 {
            form_feeds + 1
        } else {
            (text.len() / CHARS_PER_PAGE).max(1)
        };

        Self {
            image_count,
            table_line_count,
            page_count,
            total_lines: total_lines.max(1),
        }
    }

    /// Normalized complexity score in [0, 1].
    pub fn score(&self) -> f32 {
        let pages = self.page_count.max(1) as f32;

        let image_density =
            (self.image_count as f32 / pages / IMAGES_PER_PAGE_CAP).clamp(0.0, 1.0);
        let table_density =
            (self.table_line_count as f32 / self.total_lines as f32 * 4.0).clamp(0.0, 1.0);
        let page_factor = ((pages - 1.0) / PAGE_CAP).clamp(0.0, 1.0);

        (IMAGE_WEIGHT * image_density + TABLE_WEIGHT * table_density + PAGE_WEIGHT * page_factor)
            .clamp(0.0, 1.0)
    }
}

/// Markdown pipe tables and tab-separated rows both count as table lines.
fn is_table_line(line: &str) -> bool {
    if line.starts_with('|') && line.matches('|').count() >= 2 {
        return true;
    }
    line.matches('\t').count() >= 2
}

/// Counters collected while assembling one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderMetrics {
    pub pages: usize,
    pub summary_rows: usize,
    /// Image placements that landed as one block (fitted or scaled down).
    pub single_blocks: usize,
    /// Images that were cut into bands across pages.
    pub split_images: usize,
    pub split_chunks: usize,
    /// Images embedded from their source bytes because no drawing surface was available.
    pub passthrough_images: usize,
    pub skipped_images: usize,
    pub placeholder_records: usize,
    pub lossless_encodes: usize,
    pub lossy_encodes: usize,
}

impl RenderMetrics {
    /// Every image block placed on a page, split chunks counted once per source image.
    pub fn image_blocks(&self) -> usize {
        self.single_blocks + self.split_images
    }
}

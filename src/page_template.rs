use crate::config::ReportConfig;
use crate::frame::Frame;
use crate::types::{Margins, Rect, Size};

/// Fixed page geometry shared by every page of a report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTemplate {
    pub page_size: Size,
    pub margins: Margins,
}

impl PageTemplate {
    pub fn new(page_size: Size, margins: Margins) -> Self {
        Self { page_size, margins }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            Size::from_mm(config.page_width_mm, config.page_height_mm),
            Margins::all_mm(config.margin_mm),
        )
    }

    pub fn frame_rect(&self) -> Rect {
        Rect {
            x: self.margins.left,
            y: self.margins.top,
            width: self.page_size.width - self.margins.left - self.margins.right,
            height: self.page_size.height - self.margins.top - self.margins.bottom,
        }
    }

    pub fn instantiate_frame(&self) -> Frame {
        Frame::new(self.frame_rect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_a4_frame_is_180_by_267_mm() {
        let template = PageTemplate::from_config(&ReportConfig::default());
        let rect = template.frame_rect();
        assert!((rect.width.to_mm() - 180.0).abs() < 0.01);
        assert!((rect.height.to_mm() - 267.0).abs() < 0.01);
        assert!((rect.x.to_mm() - 15.0).abs() < 0.01);
    }
}

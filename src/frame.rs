use crate::types::{Pt, Rect};

/// Printable area of one page with a running vertical cursor. The cursor only
/// moves down; a new page gets a new frame.
#[derive(Debug, Clone)]
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Absolute page y of the next write position.
    pub fn cursor(&self) -> Pt {
        self.rect.y + self.cursor_y
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    pub fn fits(&self, height: Pt) -> bool {
        height <= self.remaining_height()
    }

    pub fn advance(&mut self, height: Pt) {
        if height > Pt::ZERO {
            self.cursor_y += height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(Rect {
            x: Pt::from_f32(10.0),
            y: Pt::from_f32(20.0),
            width: Pt::from_f32(100.0),
            height: Pt::from_f32(50.0),
        })
    }

    #[test]
    fn cursor_starts_at_top_of_rect() {
        let frame = frame();
        assert!(frame.is_empty());
        assert_eq!(frame.cursor(), Pt::from_f32(20.0));
        assert_eq!(frame.remaining_height(), Pt::from_f32(50.0));
    }

    #[test]
    fn advance_is_monotonic_and_remaining_never_negative() {
        let mut frame = frame();
        frame.advance(Pt::from_f32(30.0));
        frame.advance(Pt::from_f32(-10.0));
        assert_eq!(frame.cursor(), Pt::from_f32(50.0));
        assert!(frame.fits(Pt::from_f32(20.0)));
        assert!(!frame.fits(Pt::from_f32(20.5)));
        frame.advance(Pt::from_f32(40.0));
        assert_eq!(frame.remaining_height(), Pt::ZERO);
    }
}

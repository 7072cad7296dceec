use std::fmt;

/// Box in engine coordinates, each component nominally in `0..=1`.
///
/// Values are passed through from the engine unchanged; inverted or
/// out-of-range boxes are the engine's responsibility.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl NormalizedRect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Scale into pixel space for a viewport.
    pub fn to_screen(&self, viewport: Viewport) -> ScreenRect {
        let w = viewport.width as f32;
        let h = viewport.height as f32;
        ScreenRect {
            x: self.x0 * w,
            y: self.y0 * h,
            width: self.width() * w,
            height: self.height() * h,
        }
    }
}

/// Output surface size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One labeled box.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    pub score: f32,
    pub rect: NormalizedRect,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1} %", self.label, self.score * 100.0)
    }
}

/// Everything one completed cycle produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    /// 1-based cycle number.
    pub cycle: u64,
    pub detections: Vec<Detection>,
    /// Capture to decode, wall clock.
    pub latency_ms: u64,
    /// Time spent inside the engine call.
    pub inference_ms: u64,
}

impl DetectionBatch {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_rect_scales_by_viewport() {
        let rect = NormalizedRect {
            x0: 0.25,
            y0: 0.5,
            x1: 0.75,
            y1: 1.0,
        };
        let screen = rect.to_screen(Viewport {
            width: 200,
            height: 100,
        });
        assert_eq!(
            screen,
            ScreenRect {
                x: 50.0,
                y: 50.0,
                width: 100.0,
                height: 50.0,
            }
        );
    }

    #[test]
    fn inverted_rect_is_not_clamped() {
        let rect = NormalizedRect {
            x0: 0.6,
            y0: 0.5,
            x1: 0.2,
            y1: 0.1,
        };
        assert!(rect.width() < 0.0);
        assert!(rect.height() < 0.0);
    }

    #[test]
    fn display_shows_percent() {
        let det = Detection {
            class_id: 3,
            label: "cat".to_string(),
            score: 0.9,
            rect: NormalizedRect {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
            },
        };
        assert_eq!(det.to_string(), "cat: 90.0 %");
    }
}

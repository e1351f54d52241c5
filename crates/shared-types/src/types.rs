/// A rectangle in PDF user space (origin at the bottom-left of the page)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from a PDF `[llx lly urx ury]` array, normalizing swapped corners
    pub fn from_corners(corners: [f64; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Corners in the `[llx lly urx ury]` order used by `/Rect` and `/MediaBox`
    pub fn to_corners(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Zero or negative area rectangles cannot host an appearance stream
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_corners_normalizes() {
        let rect = PdfRect::from_corners([200.0, 100.0, 50.0, 20.0]);
        assert_eq!(rect, PdfRect::new(50.0, 20.0, 150.0, 80.0));
    }

    #[test]
    fn test_to_corners() {
        let rect = PdfRect::new(10.0, 20.0, 150.0, 60.0);
        assert_eq!(rect.to_corners(), [10.0, 20.0, 160.0, 80.0]);
    }

    #[test]
    fn test_is_empty() {
        assert!(PdfRect::new(0.0, 0.0, 0.0, 10.0).is_empty());
        assert!(!PdfRect::new(0.0, 0.0, 1.0, 1.0).is_empty());
    }
}

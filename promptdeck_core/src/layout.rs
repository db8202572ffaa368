//! Logical card geometry. Units are abstract (terminal cells for the TUI);
//! only relative positions matter to the reflow animation.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn lerp(&self, to: &Rect, t: f32) -> Rect {
        Rect {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
            width: self.width + (to.width - self.width) * t,
            height: self.height + (to.height - self.height) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Collapsed,
    /// Details: spans a whole grid row, in flow with the other cards.
    InFlow,
    /// Chat: covers the viewport; the grid underneath keeps its collapsed flow.
    FullScreen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub min_card_width: f32,
    pub card_height: f32,
    pub details_height: f32,
    pub gap: f32,
    /// Overrides the width-derived column count.
    pub columns: Option<u16>,
}

impl Default for GridMetrics {
    fn default() -> Self {
        Self {
            viewport_width: 120.0,
            viewport_height: 40.0,
            min_card_width: 36.0,
            card_height: 7.0,
            details_height: 21.0,
            gap: 1.0,
            columns: None,
        }
    }
}

impl GridMetrics {
    pub fn with_viewport(mut self, width: f32, height: f32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn columns(&self) -> usize {
        if let Some(fixed) = self.columns {
            return usize::from(fixed.max(1));
        }
        let fit = ((self.viewport_width + self.gap) / (self.min_card_width + self.gap)).floor();
        if fit.is_finite() && fit >= 1.0 {
            fit as usize
        } else {
            1
        }
    }

    pub fn card_width(&self) -> f32 {
        let cols = self.columns() as f32;
        ((self.viewport_width - self.gap * (cols - 1.0)) / cols).max(1.0)
    }
}

/// One rectangle per card, in card order.
pub fn compute_layout(metrics: &GridMetrics, placements: &[Placement]) -> Vec<Rect> {
    let cols = metrics.columns();
    let card_width = metrics.card_width();
    let row_step = metrics.card_height + metrics.gap;

    let mut rects = Vec::with_capacity(placements.len());
    let mut col = 0usize;
    let mut y = 0.0f32;

    for placement in placements {
        match placement {
            Placement::InFlow => {
                if col > 0 {
                    y += row_step;
                    col = 0;
                }
                rects.push(Rect::new(
                    0.0,
                    y,
                    metrics.viewport_width,
                    metrics.details_height,
                ));
                y += metrics.details_height + metrics.gap;
            }
            Placement::Collapsed | Placement::FullScreen => {
                let x = col as f32 * (card_width + metrics.gap);
                rects.push(Rect::new(x, y, card_width, metrics.card_height));
                col += 1;
                if col == cols {
                    col = 0;
                    y += row_step;
                }
            }
        }
    }

    for (rect, placement) in rects.iter_mut().zip(placements) {
        if *placement == Placement::FullScreen {
            *rect = Rect::new(0.0, 0.0, metrics.viewport_width, metrics.viewport_height);
        }
    }

    rects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> GridMetrics {
        GridMetrics {
            viewport_width: 100.0,
            viewport_height: 30.0,
            min_card_width: 30.0,
            card_height: 5.0,
            details_height: 12.0,
            gap: 2.0,
            columns: None,
        }
    }

    #[test]
    fn columns_follow_viewport_width() {
        assert_eq!(metrics().columns(), 3);
        assert_eq!(metrics().with_viewport(40.0, 30.0).columns(), 1);
        assert_eq!(metrics().with_viewport(10.0, 30.0).columns(), 1);
        let fixed = GridMetrics {
            columns: Some(2),
            ..metrics()
        };
        assert_eq!(fixed.columns(), 2);
    }

    #[test]
    fn collapsed_cards_fill_rows() {
        let rects = compute_layout(&metrics(), &[Placement::Collapsed; 4]);
        assert_eq!(rects[0].x, 0.0);
        assert_eq!(rects[1].y, 0.0);
        assert!(rects[1].x > rects[0].x);
        assert_eq!(rects[3].x, 0.0);
        assert_eq!(rects[3].y, 7.0);
    }

    #[test]
    fn in_flow_card_takes_its_own_row_and_pushes_followers_down() {
        let placements = [
            Placement::Collapsed,
            Placement::InFlow,
            Placement::Collapsed,
        ];
        let rects = compute_layout(&metrics(), &placements);
        assert_eq!(rects[1], Rect::new(0.0, 7.0, 100.0, 12.0));
        assert_eq!(rects[2].x, 0.0);
        assert_eq!(rects[2].y, 21.0);
    }

    #[test]
    fn full_screen_card_covers_viewport_without_moving_siblings() {
        let collapsed = compute_layout(&metrics(), &[Placement::Collapsed; 3]);
        let rects = compute_layout(
            &metrics(),
            &[Placement::Collapsed, Placement::FullScreen, Placement::Collapsed],
        );
        assert_eq!(rects[1], Rect::new(0.0, 0.0, 100.0, 30.0));
        assert_eq!(rects[0], collapsed[0]);
        assert_eq!(rects[2], collapsed[2]);
    }
}

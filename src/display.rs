use crate::config::DisplayConfig;
use crate::history::DetectionRecord;
use crate::status::ConnectionStatus;
use std::fmt::Write as _;

/// One rendered history row: the record plus its resolved display height
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRow {
    pub record: DetectionRecord,
    pub height: f32,
}

/// Renders the feed screen as text.
///
/// Lines are terminated with CRLF so output stays aligned while the
/// keyboard listener holds the terminal in raw mode.
pub struct FeedView {
    max_rows: usize,
}

impl FeedView {
    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            max_rows: display.max_rows,
        }
    }

    /// Number of history rows the view will show
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Render the full feed screen: status, latest image, history rows
    pub fn render(
        &self,
        status: ConnectionStatus,
        current_image: Option<&str>,
        rows: &[FeedRow],
    ) -> String {
        let mut out = String::new();

        let _ = write!(out, "Door Safety Monitor\r\n");
        let _ = write!(out, "Status: {}\r\n", status);

        match current_image {
            Some(url) => {
                let _ = write!(out, "Latest image: {}\r\n", url);
            }
            None => {
                let _ = write!(out, "Latest image: (none)\r\n");
            }
        }

        let _ = write!(out, "\r\nDetection history ({}):\r\n", rows.len());
        if rows.is_empty() {
            let _ = write!(out, "  (no detections yet)\r\n");
        }

        for row in rows.iter().take(self.max_rows) {
            let _ = write!(
                out,
                "  {}  {}  [{:.0}px]\r\n",
                row.record.time, row.record.url, row.height
            );
        }

        let _ = write!(out, "\r\nPress 'r' to refresh, 'q' to quit\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoorwatchConfig;

    fn view() -> FeedView {
        FeedView::new(&DoorwatchConfig::default().display)
    }

    fn row(url: &str, time: &str, height: f32) -> FeedRow {
        FeedRow {
            record: DetectionRecord::new(url, time),
            height,
        }
    }

    #[test]
    fn test_render_empty_history() {
        let screen = view().render(ConnectionStatus::Disconnected, None, &[]);

        assert!(screen.contains("Status: Disconnected"));
        assert!(screen.contains("Latest image: (none)"));
        assert!(screen.contains("(no detections yet)"));
    }

    #[test]
    fn test_render_rows_newest_first() {
        let rows = vec![
            row("https://x/b.png", "t2", 250.0),
            row("https://x/a.png", "t1", 175.0),
        ];
        let screen = view().render(
            ConnectionStatus::Detected,
            Some("https://x/b.png"),
            &rows,
        );

        assert!(screen.contains("Status: New detection received"));
        assert!(screen.contains("Latest image: https://x/b.png"));

        let b_pos = screen.find("t2  https://x/b.png  [250px]").unwrap();
        let a_pos = screen.find("t1  https://x/a.png  [175px]").unwrap();
        assert!(b_pos < a_pos);
    }

    #[test]
    fn test_render_truncates_to_max_rows() {
        let mut display = DoorwatchConfig::default().display;
        display.max_rows = 2;
        let view = FeedView::new(&display);

        let rows: Vec<FeedRow> = (0..5)
            .map(|i| row(&format!("https://x/{}.png", i), "t", 100.0))
            .collect();
        let screen = view.render(ConnectionStatus::Connected, None, &rows);

        assert!(screen.contains("https://x/0.png"));
        assert!(screen.contains("https://x/1.png"));
        assert!(!screen.contains("https://x/2.png"));
    }
}

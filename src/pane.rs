use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::widgets::Paragraph;

/// Rows reserved at the top of the screen for the progress header.
pub const HEADER_LINES: i32 = 2;

/// Rows one pane occupies in the stacked layout: title line, content rows,
/// one blank separator below.
pub fn pane_stride(shown_height: i32) -> i32 {
    shown_height + 2
}

/// Screen chrome a pane needs to map itself onto the terminal grid.
pub struct PaneChrome<'a> {
    pub width: u16,
    pub height: u16,
    pub global_offset: i32,
    pub title: Line<'a>,
}

/// One task's scrollback plus the state to map it onto a sub-rectangle of
/// the screen. The owning dashboard serializes all access; nothing here
/// locks on its own.
pub struct Pane {
    /// Completed output rows.
    lines: Vec<String>,
    /// Bytes received after the last newline; shown as the row in progress.
    partial: String,
    /// Rows of content this pane currently gets on screen (>= 1).
    pub shown_height: i32,
    /// Title row position within the full stacked layout, before the
    /// global offset is applied.
    pub layout_offset: i32,
    /// Scrollback index of the first visible content row.
    pub visible_pos: i32,
    /// Scrollback index of the selected row.
    pub cursor_pos: i32,
    /// While true, the cursor and viewport track new output as it arrives.
    pub watching_at_end: bool,
}

impl Pane {
    pub fn new(index: usize, shown_height: i32) -> Self {
        Self {
            lines: Vec::new(),
            partial: String::new(),
            shown_height: shown_height.max(1),
            layout_offset: index as i32 * pane_stride(shown_height.max(1)) + HEADER_LINES,
            visible_pos: 0,
            cursor_pos: 0,
            watching_at_end: true,
        }
    }

    /// Index of the last written scrollback row. 0 when nothing has arrived.
    pub fn last_row(&self) -> i32 {
        let mut rows = self.lines.len();
        if !self.partial.is_empty() {
            rows += 1;
        }
        rows.max(1) as i32 - 1
    }

    pub fn row_text(&self, row: i32) -> &str {
        if row < 0 {
            return "";
        }
        let row = row as usize;
        if row < self.lines.len() {
            &self.lines[row]
        } else if row == self.lines.len() {
            &self.partial
        } else {
            ""
        }
    }

    /// Append raw output. Text may end mid-line; the tail is kept and
    /// completed by the next append. While watching the end, the cursor
    /// advances to the newest row and the viewport follows.
    pub fn append(&mut self, text: &str) {
        self.partial.push_str(text);
        while let Some(nl) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=nl).collect();
            line.truncate(line.len() - 1);
            if line.ends_with('\r') {
                line.truncate(line.len() - 1);
            }
            self.lines.push(line);
        }
        if self.watching_at_end {
            self.cursor_pos = self.last_row();
        }
        self.maybe_update_visible_pos();
    }

    /// Move the cursor by one row. Leaves follow mode on any manual move,
    /// except that running past the last row lands on it and re-enters
    /// follow mode (how the user catches back up to live output).
    pub fn move_cursor(&mut self, direction: i32) {
        self.cursor_pos += direction;
        self.watching_at_end = false;
        if self.cursor_pos <= 0 {
            self.cursor_pos = 0;
        }
        if self.cursor_pos >= self.last_row() {
            self.cursor_pos = self.last_row();
            self.watching_at_end = true;
        }
        self.maybe_update_visible_pos();
    }

    /// Minimal-scroll rule: shift the viewport just enough to keep the
    /// cursor inside `[visible_pos, visible_pos + shown_height)`.
    pub fn maybe_update_visible_pos(&mut self) -> bool {
        if self.cursor_pos < self.visible_pos {
            self.visible_pos = self.cursor_pos.max(0);
            true
        } else if self.cursor_pos >= self.visible_pos + self.shown_height {
            self.visible_pos = self.cursor_pos - self.shown_height + 1;
            true
        } else {
            false
        }
    }

    /// Grow or shrink the pane, floored at one content row. Returns the
    /// realized delta so the caller can shift the panes below.
    pub fn adjust_height(&mut self, delta: i32) -> i32 {
        let new_height = (self.shown_height + delta).max(1);
        let realized = new_height - self.shown_height;
        self.shown_height = new_height;
        self.maybe_update_visible_pos();
        realized
    }

    /// Screen row of the cursor under the given global offset. May fall
    /// outside the displayable region; the dashboard decides what to do then.
    pub fn cursor_screen_row(&self, global_offset: i32) -> i32 {
        self.layout_offset + 1 + self.cursor_pos - self.visible_pos + global_offset
    }

    /// Draw the title and the visible scrollback slice into the screen rows
    /// this pane intersects. Panes scrolled fully off draw nothing.
    pub fn render(&self, frame: &mut Frame, chrome: PaneChrome) {
        let screen_h = chrome.height as i32;
        let title_row = self.layout_offset + chrome.global_offset;
        if (HEADER_LINES..screen_h).contains(&title_row) {
            let area = Rect {
                x: 0,
                y: title_row as u16,
                width: chrome.width,
                height: 1,
            };
            frame.render_widget(Paragraph::new(chrome.title), area);
        }

        let content_top = title_row + 1;
        let start = content_top.max(HEADER_LINES);
        let end = (content_top + self.shown_height - 1).min(screen_h - 1);
        if start > end {
            return;
        }

        let rows = (end - start + 1) as usize;
        let text: Vec<Line> = (0..rows)
            .map(|i| Line::from(self.row_text(self.visible_pos + i as i32).to_string()))
            .collect();
        let area = Rect {
            x: 0,
            y: start as u16,
            width: chrome.width,
            height: rows as u16,
        };
        frame.render_widget(Paragraph::new(text), area);
    }
}

use std::sync::{Arc, Mutex};

use crossterm::event::KeyCode;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::logging::FileLogger;
use crate::pane::{HEADER_LINES, Pane, PaneChrome, pane_stride};

/// Handle shared between the input/render loop and the worker threads.
/// Workers only ever call `append_line` and `mark_finished` through it.
pub type SharedDashboard = Arc<Mutex<Dashboard>>;

/// All mutable screen state for one run: the stacked panes, per-task status,
/// terminal dimensions, the global stack offset, and the focused pane.
/// Lives behind a single mutex; each entry point expects the caller to hold
/// the lock via `SharedDashboard`.
pub struct Dashboard {
    cmds: Vec<String>,
    running: Vec<bool>,
    retcodes: Vec<i32>,
    pub panes: Vec<Pane>,
    pub width: u16,
    pub height: u16,
    /// Shift applied to every pane's screen position; always <= 0. Scrolling
    /// the stack down makes it more negative.
    pub global_offset: i32,
    /// Index of the pane receiving cursor-movement keys.
    pub focused: usize,
    log: Arc<FileLogger>,
}

impl Dashboard {
    pub fn new(cmds: Vec<String>, pane_height: i32, log: Arc<FileLogger>) -> Self {
        let panes = (0..cmds.len())
            .map(|i| Pane::new(i, pane_height))
            .collect();
        let n = cmds.len();
        Self {
            cmds,
            running: vec![true; n],
            retcodes: vec![0; n],
            panes,
            width: 0,
            height: 0,
            global_offset: 0,
            focused: 0,
            log,
        }
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.log.log(
            "DASHBOARD",
            &format!("screen size set to {height} * {width}"),
            1,
        );
    }

    /// Entry point for worker threads: route a chunk of task output to its
    /// pane. `task_id` is 1-based and stable for the run.
    pub fn append_line(&mut self, task_id: usize, text: &str) {
        let Some(pane) = task_id.checked_sub(1).and_then(|i| self.panes.get_mut(i)) else {
            self.log
                .log("DASHBOARD", &format!("append for unknown task {task_id}"), 0);
            return;
        };
        pane.append(text);
    }

    /// Entry point for worker threads: record a task's exit. Idempotent; a
    /// second call for the same task changes nothing.
    pub fn mark_finished(&mut self, task_id: usize, retcode: i32) {
        let Some(i) = task_id.checked_sub(1).filter(|i| *i < self.running.len()) else {
            self.log
                .log("DASHBOARD", &format!("finish for unknown task {task_id}"), 0);
            return;
        };
        if !self.running[i] {
            return;
        }
        self.running[i] = false;
        self.retcodes[i] = retcode;
        self.log.log(
            "DASHBOARD",
            &format!("mark_finished {task_id} retcode {retcode}"),
            3,
        );
    }

    pub fn is_running(&self, task_id: usize) -> bool {
        task_id
            .checked_sub(1)
            .and_then(|i| self.running.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// Exit code of a task, once it has stopped.
    pub fn retcode(&self, task_id: usize) -> Option<i32> {
        let i = task_id.checked_sub(1)?;
        if *self.running.get(i)? {
            None
        } else {
            self.retcodes.get(i).copied()
        }
    }

    pub fn finished_count(&self) -> usize {
        self.running.iter().filter(|r| !**r).count()
    }

    pub fn all_finished(&self) -> bool {
        self.running.iter().all(|r| !*r)
    }

    /// Header row plus every pane's title, content, and separator.
    pub fn total_logical_height(&self) -> i32 {
        HEADER_LINES
            + self
                .panes
                .iter()
                .map(|p| pane_stride(p.shown_height))
                .sum::<i32>()
    }

    /// Lowest allowed global offset: the stack may scroll up until only its
    /// last logical row remains on screen, and no further.
    pub fn min_global_offset(&self) -> i32 {
        if self.total_logical_height() > self.height as i32 {
            1 - self.total_logical_height()
        } else {
            0
        }
    }

    /// Handle one key. Returns true when the user quit (only accepted once
    /// every task has stopped).
    pub fn on_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Down => {
                if self.focused + 1 < self.panes.len() {
                    self.focused += 1;
                    self.ensure_focus_visible();
                }
            }
            KeyCode::Up => {
                if self.focused > 0 {
                    self.focused -= 1;
                    self.ensure_focus_visible();
                } else {
                    // Top pane: jump the whole stack back to the top.
                    self.global_offset = 0;
                    self.maybe_move_focus();
                }
            }
            KeyCode::Char('j') => self.move_cursor_in_pane(1),
            KeyCode::Char('k') => self.move_cursor_in_pane(-1),
            KeyCode::Char('+') => self.adjust_focused_height(1),
            KeyCode::Char('-') => self.adjust_focused_height(-1),
            KeyCode::Char('e') => {
                if self.global_offset > self.min_global_offset() {
                    self.global_offset -= 1;
                    self.maybe_move_focus();
                }
            }
            KeyCode::Char('y') => {
                if self.global_offset < 0 {
                    self.global_offset += 1;
                    self.maybe_move_focus();
                }
            }
            KeyCode::Char('q') => {
                if self.all_finished() {
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    pub fn move_cursor_in_pane(&mut self, direction: i32) {
        if let Some(pane) = self.panes.get_mut(self.focused) {
            pane.move_cursor(direction);
        }
        self.scroll_cursor_into_view();
    }

    pub fn adjust_focused_height(&mut self, delta: i32) {
        let Some(pane) = self.panes.get_mut(self.focused) else {
            return;
        };
        let realized = pane.adjust_height(delta);
        for pane in self.panes.iter_mut().skip(self.focused + 1) {
            pane.layout_offset += realized;
        }
        // The floor can leave the stack shorter than the current scroll.
        self.global_offset = self.global_offset.max(self.min_global_offset());
    }

    /// After a focus change, shift the global offset by exactly the deficit
    /// needed to put the focused pane's title row inside the displayable
    /// region.
    fn ensure_focus_visible(&mut self) {
        let Some(pane) = self.panes.get(self.focused) else {
            return;
        };
        let title_row = pane.layout_offset + self.global_offset;
        let screen_h = self.height as i32;
        if screen_h <= HEADER_LINES {
            return;
        }
        if title_row < HEADER_LINES {
            self.global_offset += HEADER_LINES - title_row;
        } else if title_row >= screen_h {
            self.global_offset -= title_row - (screen_h - 1);
        }
    }

    /// After a global scroll, walk focus to the nearest pane whose cursor
    /// row is still on screen.
    fn maybe_move_focus(&mut self) {
        let screen_h = self.height as i32;
        while self.cursor_row(self.focused) < HEADER_LINES && self.focused + 1 < self.panes.len()
        {
            self.focused += 1;
        }
        while self.cursor_row(self.focused) >= screen_h && self.focused > 0 {
            self.focused -= 1;
        }
    }

    /// After a cursor move, shift the whole stack just enough to keep the
    /// focused cursor row on screen.
    fn scroll_cursor_into_view(&mut self) {
        let row = self.cursor_row(self.focused);
        let screen_h = self.height as i32;
        if row < HEADER_LINES {
            self.global_offset += HEADER_LINES - row;
        } else if row >= screen_h {
            self.global_offset -= row - screen_h + 1;
        }
    }

    fn cursor_row(&self, index: usize) -> i32 {
        self.panes
            .get(index)
            .map(|p| p.cursor_screen_row(self.global_offset))
            .unwrap_or(HEADER_LINES)
    }

    /// Draw the full screen: header, every intersecting pane, and the
    /// terminal cursor parked on the focused pane's cursor row.
    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        if area.width == 0 || area.height == 0 {
            return;
        }
        self.render_header(frame, area);
        for (i, pane) in self.panes.iter().enumerate() {
            pane.render(
                frame,
                PaneChrome {
                    width: area.width,
                    height: area.height,
                    global_offset: self.global_offset,
                    title: self.title_line(i, area.width),
                },
            );
        }
        if let Some(pane) = self.panes.get(self.focused) {
            let bottom = area.height as i32 - 1;
            // On a screen shorter than the header there is no row to park on.
            if bottom >= HEADER_LINES {
                let row = pane
                    .cursor_screen_row(self.global_offset)
                    .clamp(HEADER_LINES, bottom);
                frame.set_cursor_position((0, row as u16));
            }
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let finished = self.finished_count();
        let total = self.cmds.len().max(1);
        let header = header_text(area.width as usize, finished, total);
        let split = (area.width as usize * finished / total).min(header.len());
        let (done, rest) = header.split_at(split);
        let line = Line::from(vec![
            Span::styled(
                done.to_string(),
                Style::default().fg(Color::White).bg(Color::Blue),
            ),
            Span::raw(rest.to_string()),
        ]);
        frame.render_widget(
            Paragraph::new(line),
            Rect {
                x: 0,
                y: 0,
                width: area.width,
                height: 1,
            },
        );
    }

    fn title_line(&self, index: usize, width: u16) -> Line<'static> {
        let status = if self.running[index] {
            "RUNNING".to_string()
        } else {
            format!("STOPPED:{}", self.retcodes[index])
        };
        let mut text = format!("[PROC {}] ({status}) {}", index + 1, self.cmds[index]);
        let pad = (width as usize).saturating_sub(text.chars().count());
        text.extend(std::iter::repeat_n(' ', pad));
        let bg = if self.running[index] {
            Color::Green
        } else {
            Color::Red
        };
        Line::from(Span::styled(
            text,
            Style::default().fg(Color::White).bg(bg),
        ))
    }
}

/// Header layout, widest variant first: finished count on the left, title
/// centered, percentage on the right. Narrower screens drop the left and
/// right prompts in that order.
pub fn header_text(width: usize, finished: usize, total: usize) -> String {
    let title = concat!("PARA-RUN V", env!("CARGO_PKG_VERSION"));
    let finish_prompt = format!("Finished: {finished} / {total}");
    let process_prompt = format!("{}%", finished * 100 / total.max(1));

    let mut header = String::new();
    if width >= title.len() + 2 + 2 * finish_prompt.len() {
        header.push_str(&finish_prompt);
        let gap = (width - title.len()) / 2 - finish_prompt.len();
        header.extend(std::iter::repeat_n(' ', gap));
        header.push_str(title);
        let gap = width - header.chars().count() - process_prompt.len();
        header.extend(std::iter::repeat_n(' ', gap));
        header.push_str(&process_prompt);
    } else if width >= title.len() + 2 + 2 * process_prompt.len() {
        header.extend(std::iter::repeat_n(' ', (width - title.len()) / 2));
        header.push_str(title);
        let gap = width - header.chars().count() - process_prompt.len();
        header.extend(std::iter::repeat_n(' ', gap));
        header.push_str(&process_prompt);
    } else if width >= title.len() {
        header.extend(std::iter::repeat_n(' ', (width - title.len()) / 2));
        header.push_str(title);
        let gap = width - header.chars().count();
        header.extend(std::iter::repeat_n(' ', gap));
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn dashboard(cmds: &[&str], pane_height: i32) -> Dashboard {
        let mut dash = Dashboard::new(
            cmds.iter().map(|c| c.to_string()).collect(),
            pane_height,
            Arc::new(FileLogger::disabled()),
        );
        dash.set_size(40, 12);
        dash
    }

    fn render_to_text(dash: &Dashboard, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal.draw(|frame| dash.render(frame)).expect("draw");
        let buffer = terminal.backend().buffer().clone();
        let mut out = String::new();
        for y in 0..height {
            for x in 0..width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn header_percentage_is_floored() {
        for total in 1..=7usize {
            for finished in 0..=total {
                let header = header_text(80, finished, total);
                let pct = format!("{}%", finished * 100 / total);
                assert!(
                    header.ends_with(&pct),
                    "header {header:?} for {finished}/{total}"
                );
            }
        }
    }

    #[test]
    fn header_drops_prompts_as_width_shrinks() {
        let wide = header_text(80, 1, 3);
        assert!(wide.starts_with("Finished: 1 / 3"));
        assert!(wide.contains("PARA-RUN"));
        assert!(wide.ends_with("33%"));
        assert_eq!(wide.len(), 80);

        let medium = header_text(30, 1, 3);
        assert!(!medium.contains("Finished"));
        assert!(medium.contains("PARA-RUN"));
        assert!(medium.ends_with("33%"));
        assert_eq!(medium.len(), 30);

        let narrow = header_text(16, 1, 3);
        assert!(narrow.contains("PARA-RUN"));
        assert!(!narrow.contains('%'));
        assert_eq!(narrow.len(), 16);

        assert_eq!(header_text(3, 1, 3), "");
    }

    #[test]
    fn mark_finished_is_idempotent() {
        let mut dash = dashboard(&["a", "b"], 2);
        dash.mark_finished(1, 3);
        dash.mark_finished(1, 99);
        assert_eq!(dash.finished_count(), 1);
        assert_eq!(dash.retcode(1), Some(3));
        assert!(dash.is_running(2));
        assert!(!dash.all_finished());
        dash.mark_finished(2, 0);
        assert!(dash.all_finished());
    }

    #[test]
    fn out_of_range_task_ids_are_ignored() {
        let mut dash = dashboard(&["a"], 2);
        dash.append_line(0, "nope\n");
        dash.append_line(9, "nope\n");
        dash.mark_finished(9, 1);
        assert_eq!(dash.panes[0].row_text(0), "");
        assert_eq!(dash.finished_count(), 0);
    }

    #[test]
    fn append_line_reaches_the_right_pane() {
        let mut dash = dashboard(&["a", "b", "c"], 2);
        dash.append_line(2, "only two\n");
        assert_eq!(dash.panes[0].row_text(0), "");
        assert_eq!(dash.panes[1].row_text(0), "only two");
        assert_eq!(dash.panes[2].row_text(0), "");
    }

    #[test]
    fn finished_task_scenario_renders_header_and_title() {
        // 3 tasks, pane height 2; task 2 emits 5 lines then exits 0.
        let mut dash = dashboard(&["sleep 9", "echo hi", "sleep 9"], 2);
        dash.set_size(60, 20);
        for i in 1..=5 {
            dash.append_line(2, &format!("line {i}\n"));
        }
        dash.mark_finished(2, 0);

        assert_eq!(dash.finished_count(), 1);
        let pane = &dash.panes[1];
        assert!(pane.watching_at_end);
        assert_eq!(pane.visible_pos, 3);
        assert_eq!(pane.row_text(pane.visible_pos), "line 4");
        assert_eq!(pane.row_text(pane.visible_pos + 1), "line 5");

        let text = render_to_text(&dash, 60, 20);
        let rows: Vec<&str> = text.lines().collect();
        assert!(rows[0].contains("Finished: 1 / 3"));
        assert!(rows[0].trim_end().ends_with("33%"));
        // Pane 2: title at row 2 + (2+2) = 6, content below it.
        assert!(rows[6].contains("[PROC 2] (STOPPED:0) echo hi"));
        assert!(rows[7].contains("line 4"));
        assert!(rows[8].contains("line 5"));
        assert!(rows[2].contains("[PROC 1] (RUNNING) sleep 9"));
    }

    #[test]
    fn grow_twice_shrink_once_shifts_later_panes_by_one() {
        let mut dash = dashboard(&["a", "b", "c"], 1);
        let before: Vec<i32> = dash.panes.iter().map(|p| p.layout_offset).collect();

        dash.on_key(KeyCode::Char('+'));
        dash.on_key(KeyCode::Char('+'));
        dash.on_key(KeyCode::Char('-'));

        assert_eq!(dash.panes[0].shown_height, 2);
        for (pane, old) in dash.panes.iter().zip(&before).skip(1) {
            assert_eq!(pane.layout_offset, old + 1);
        }
    }

    #[test]
    fn height_round_trip_leaves_layout_unchanged() {
        let mut dash = dashboard(&["a", "b", "c"], 3);
        dash.focused = 1;
        let before: Vec<i32> = dash.panes.iter().map(|p| p.layout_offset).collect();

        dash.adjust_focused_height(2);
        dash.adjust_focused_height(-2);

        let after: Vec<i32> = dash.panes.iter().map(|p| p.layout_offset).collect();
        assert_eq!(before, after);
        assert_eq!(dash.panes[1].shown_height, 3);
    }

    #[test]
    fn global_offset_clamps_at_the_bottom() {
        let mut dash = dashboard(&["a", "b", "c", "d"], 3);
        dash.set_size(40, 8);
        // total logical height = 2 + 4 * 5 = 22 > 8.
        let floor = 1 - dash.total_logical_height();
        for _ in 0..100 {
            dash.on_key(KeyCode::Char('e'));
        }
        assert_eq!(dash.global_offset, floor);
        for _ in 0..100 {
            dash.on_key(KeyCode::Char('y'));
        }
        assert_eq!(dash.global_offset, 0);
    }

    #[test]
    fn global_scroll_disabled_when_everything_fits() {
        let mut dash = dashboard(&["a"], 2);
        dash.set_size(40, 24);
        dash.on_key(KeyCode::Char('e'));
        assert_eq!(dash.global_offset, 0);
    }

    #[test]
    fn focus_move_keeps_title_row_on_screen() {
        let mut dash = dashboard(&["a", "b", "c", "d", "e"], 3);
        dash.set_size(40, 9);
        // Walk focus all the way down, then all the way up; the focused
        // title row must always land inside [HEADER_LINES, height).
        for _ in 0..dash.panes.len() {
            dash.on_key(KeyCode::Down);
            let title_row = dash.panes[dash.focused].layout_offset + dash.global_offset;
            assert!(title_row >= HEADER_LINES && title_row < 9, "row {title_row}");
        }
        assert_eq!(dash.focused, 4);
        for _ in 0..dash.panes.len() {
            dash.on_key(KeyCode::Up);
            let title_row = dash.panes[dash.focused].layout_offset + dash.global_offset;
            assert!(title_row >= HEADER_LINES && title_row < 9, "row {title_row}");
        }
        assert_eq!(dash.focused, 0);
        assert_eq!(dash.global_offset, 0);
    }

    #[test]
    fn cursor_move_scrolls_stack_to_keep_cursor_on_screen() {
        let mut dash = dashboard(&["a", "b"], 4);
        dash.set_size(40, 6);
        dash.focused = 1;
        for i in 1..=6 {
            dash.append_line(2, &format!("line {i}\n"));
        }
        dash.on_key(KeyCode::Char('j'));
        let row = dash.panes[1].cursor_screen_row(dash.global_offset);
        assert!(row >= HEADER_LINES && row < 6, "row {row}");
    }

    #[test]
    fn quit_only_accepted_once_all_tasks_stopped() {
        let mut dash = dashboard(&["a", "b"], 2);
        assert!(!dash.on_key(KeyCode::Char('q')));
        dash.mark_finished(1, 0);
        assert!(!dash.on_key(KeyCode::Char('q')));
        dash.mark_finished(2, 1);
        assert!(dash.on_key(KeyCode::Char('q')));
    }

    #[test]
    fn render_survives_terminals_shorter_than_the_header() {
        let mut dash = dashboard(&["echo hi"], 2);
        dash.append_line(1, "hi\n");
        for height in 1..=3u16 {
            dash.set_size(10, height);
            let text = render_to_text(&dash, 10, height);
            assert_eq!(text.lines().count(), height as usize);
        }
    }

    #[test]
    fn global_scroll_walks_focus_to_visible_pane() {
        let mut dash = dashboard(&["a", "b", "c"], 2);
        dash.set_size(40, 8);
        // Stride 4: cursor rows sit at 3, 7, 11 plus the global offset.
        assert_eq!(dash.focused, 0);

        dash.on_key(KeyCode::Char('e'));
        assert_eq!(dash.focused, 0);
        dash.on_key(KeyCode::Char('e'));
        // Pane 0's cursor row slid under the header; focus moved on.
        assert_eq!(dash.global_offset, -2);
        assert_eq!(dash.focused, 1);

        for _ in 0..4 {
            dash.on_key(KeyCode::Char('e'));
        }
        assert_eq!(dash.global_offset, -6);
        assert_eq!(dash.focused, 2);

        // Scrolling back pushes the bottom pane's cursor row off the bottom
        // edge and focus walks back up.
        for _ in 0..3 {
            dash.on_key(KeyCode::Char('y'));
        }
        assert_eq!(dash.global_offset, -3);
        assert_eq!(dash.focused, 1);

        let row = dash.panes[dash.focused].cursor_screen_row(dash.global_offset);
        assert!(row >= HEADER_LINES && row < 8, "row {row}");
    }

    #[test]
    fn panes_scrolled_off_screen_draw_nothing() {
        let mut dash = dashboard(&["a", "b", "c"], 2);
        dash.set_size(20, 6);
        dash.append_line(3, "bottom pane\n");
        // Stack is 14 rows tall on a 6-row screen: pane 3 starts below it.
        let text = render_to_text(&dash, 20, 6);
        assert!(!text.contains("bottom pane"));
        assert!(text.contains("[PROC 1]"));
    }
}

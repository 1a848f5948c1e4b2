use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyModifiers};

use crate::dashboard::{Dashboard, SharedDashboard};
use crate::logging::FileLogger;
use crate::task;

pub struct RunOptions {
    pub subwin_height: u16,
    pub log_output: bool,
}

/// Take over the terminal and run the dashboard until the user quits.
///
/// One thread (this one) owns the terminal: it repaints on a short poll
/// cadence and handles keys, taking the dashboard lock only around state
/// reads and mutations, never while blocked waiting for input. Worker
/// threads feed the same dashboard through its locked entry points.
pub fn run(cmds: Vec<String>, opts: &RunOptions, log: Arc<FileLogger>) -> io::Result<()> {
    // Restore the terminal before the panic message prints.
    std::panic::set_hook(Box::new(|panic| {
        ratatui::restore();
        eprintln!("Panic: {panic}");
    }));

    let mut terminal = ratatui::init();
    let size = terminal.size()?;

    let dashboard: SharedDashboard = Arc::new(Mutex::new(Dashboard::new(
        cmds.clone(),
        opts.subwin_height.max(1) as i32,
        Arc::clone(&log),
    )));
    if let Ok(mut dash) = dashboard.lock() {
        dash.set_size(size.width, size.height);
    }

    let workers = task::spawn_workers(&dashboard, &cmds, &log, opts.log_output);

    loop {
        // Transient draw failures (e.g. a resize race) skip the frame; the
        // next tick repaints from scratch.
        if let Err(e) = terminal.draw(|frame| {
            if let Ok(dash) = dashboard.lock() {
                dash.render(frame);
            }
        }) {
            log.log("TUI", &format!("draw error, frame skipped: {e}"), 0);
        }

        if !event::poll(Duration::from_millis(30))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                // Interrupt stops the input loop; workers are still joined
                // below so no child process is abandoned.
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
                {
                    log.log("TUI", "interrupted", 0);
                    break;
                }
                let quit = match dashboard.lock() {
                    Ok(mut dash) => dash.on_key(key.code),
                    Err(_) => false,
                };
                if quit {
                    break;
                }
            }
            Event::Resize(cols, rows) => {
                if let Ok(mut dash) = dashboard.lock() {
                    dash.set_size(cols, rows);
                }
            }
            _ => {}
        }
    }

    ratatui::restore();

    for handle in workers {
        let _ = handle.join();
    }
    Ok(())
}

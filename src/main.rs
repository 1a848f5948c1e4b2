mod config;
mod dashboard;
mod hosts;
mod logging;
mod pane;
mod task;
mod tui;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use crate::config::ParaConfig;
use crate::logging::FileLogger;

#[derive(Parser)]
#[command(
    name = "pararun",
    version,
    about = "Run shell commands in parallel, each in its own live pane"
)]
struct Cli {
    /// Local commands. Wrap long commands in quotes ("").
    cmd: Vec<String>,

    /// Remote hosts and a command, e.g. -r "1,3-5" "uname -a".
    /// Hosts allow "," and "-"; multiple -r flags are allowed.
    #[arg(
        short = 'r',
        long = "remote-cmds",
        num_args = 2,
        value_names = ["HOSTS", "CMD"],
        action = clap::ArgAction::Append
    )]
    remote_cmds: Vec<String>,

    /// Store each task's output to a log file under .para-run/logs/.
    #[arg(short = 'l', long = "log-output")]
    log_output: bool,

    /// Starting height of each subwindow.
    #[arg(short = 'w', long = "subwin-height")]
    subwin_height: Option<u16>,

    /// Debug log verbosity, 0 by default.
    #[arg(short = 'd', long = "debug-level")]
    debug_level: Option<u8>,
}

/// Expand positional commands plus every -r flag into the final command
/// list. All malformed host pieces are reported together.
fn collect_commands(cli: &Cli) -> Result<Vec<String>, Vec<String>> {
    let mut cmds = cli.cmd.clone();
    let mut illegal = Vec::new();

    for pair in cli.remote_cmds.chunks(2) {
        let [hosts_spec, cmd] = pair else { continue };
        match hosts::expand_hosts(hosts_spec) {
            Ok(hosts) => {
                cmds.extend(hosts.iter().map(|h| hosts::remote_command(*h, cmd)));
            }
            Err(hosts::HostRangeError::IllegalHosts(bad)) => illegal.extend(bad),
        }
    }

    if illegal.is_empty() { Ok(cmds) } else { Err(illegal) }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cmds = match collect_commands(&cli) {
        Ok(cmds) => cmds,
        Err(illegal) => {
            eprintln!("Illegal hosts: {}", illegal.join(","));
            return ExitCode::FAILURE;
        }
    };
    if cmds.is_empty() {
        eprintln!("No commands given. See `pararun --help`.");
        return ExitCode::FAILURE;
    }

    let file_config = match ParaConfig::load_or_default(Path::new(".")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let subwin_height = cli
        .subwin_height
        .unwrap_or(file_config.display.subwin_height);
    let log_output = cli.log_output || file_config.logging.log_output;
    let debug_level = cli.debug_level.unwrap_or(file_config.logging.debug_level);

    let log = Arc::new(FileLogger::open(debug_level));
    log.log("MAIN", &format!("starting {} task(s)", cmds.len()), 0);

    let opts = tui::RunOptions {
        subwin_height,
        log_output,
    };
    match tui::run(cmds, &opts, Arc::clone(&log)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Terminal error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[macro_use]
mod log;

mod api;
mod backend;
mod cli;
mod config;
mod state;
mod sync;
mod watch;

use api::client::BackendClient;
use config::{Config, ServerConfig};
use state::StateStore;
use std::path::PathBuf;
use std::process::Command;
use sync::clock::SystemClock;
use sync::Synchronizer;

fn default_config_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("mailgroup").join("config.toml")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join("mailgroup")
            .join("config.toml")
    } else {
        PathBuf::from("config.toml")
    }
}

pub fn run_password_command(cmd: &str) -> Result<String, String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| format!("failed to execute password command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "password command exited with {}: {}",
            output.status, stderr
        ));
    }

    let password = String::from_utf8(output.stdout)
        .map_err(|e| format!("password command output is not valid UTF-8: {}", e))?;

    Ok(password.trim_end_matches('\n').to_string())
}

pub fn connect(server: &ServerConfig) -> Result<BackendClient, String> {
    let password = match server.password_command {
        Some(ref cmd) => Some(run_password_command(cmd)?),
        None => None,
    };
    log_info!(
        "[Main] using backend {} (profile {})",
        server.base_url,
        server.name
    );
    Ok(BackendClient::new(server, password.as_deref()))
}

fn show_log() {
    let path = log::log_path();
    if !path.exists() {
        eprintln!("No log file found at {}", path.display());
        std::process::exit(1);
    }
    let pager = std::env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    let status = Command::new(&pager).arg(&path).status();
    match status {
        Ok(s) if s.success() => {}
        Ok(s) => std::process::exit(s.code().unwrap_or(1)),
        Err(e) => {
            eprintln!("Failed to launch pager '{}': {}", pager, e);
            std::process::exit(1);
        }
    }
}

fn print_help_config() {
    let config_path = default_config_path();
    println!("Default config file: {}", config_path.display());
    println!();
    println!("Available options:");
    println!();
    println!("[server]                         # Required");
    println!("  base_url = \"http://127.0.0.1:5000\"   # Backend base URL (required, http or https)");
    println!("  name = \"default\"              # Profile name for local state (default: \"default\")");
    println!("  timeout_secs = 30            # Request timeout in seconds (default: 30)");
    println!("  username = \"me\"               # HTTP basic auth user (needs password_command)");
    println!("  password_command = \"pass show mailgroup\"  # Shell command printing the password");
    println!();
    println!("[list]");
    println!("  page_size = 10               # Emails per group page (default: 10)");
    println!();
    println!("[poll]");
    println!("  fast_interval_ms = 1000      # Poll interval early in a fetch (default: 1000)");
    println!("  slow_interval_ms = 3000      # Poll interval later in a fetch (default: 3000)");
    println!("  idle_interval_ms = 10000     # Heartbeat while paused or complete (default: 10000)");
    println!("  fast_window_ms = 5000        # How long the fast interval lasts (default: 5000)");
    println!("  min_spacing_ms = 800         # Minimum gap between observations (default: 800)");
}

/// `--pause`, `--resume` and `--logs` talk to the backend once and exit.
fn run_one_shot(client: &BackendClient, flag: &str) -> i32 {
    let result = match flag {
        "--pause" => client.pause().map(|s| format!("status: {}", s)),
        "--resume" => client.resume().map(|s| format!("status: {}", s)),
        _ => client.fetch_logs().map(|logs| {
            serde_json::to_string_pretty(&logs).unwrap_or_else(|e| e.to_string())
        }),
    };
    match result {
        Ok(out) => {
            println!("{}", out);
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: mailgroup [OPTIONS]");
        eprintln!();
        eprintln!("Without options, follows the backend fetch job and prints a grouped summary.");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --config=PATH    Use config file at PATH instead of default");
        eprintln!("  --clear-state    Delete all local state (collapsed groups, email cache)");
        eprintln!("  --clear-log      Truncate the log file at startup");
        eprintln!("  --log            View the log file in $PAGER");
        eprintln!("  --pause          Pause the backend fetch job and exit");
        eprintln!("  --resume         Resume the backend fetch job and exit");
        eprintln!("  --logs           Print the backend diagnostics snapshot and exit");
        eprintln!("  --cli            Run in JSON-over-stdin/stdout CLI mode");
        eprintln!("  --help-cli       Print CLI mode protocol documentation");
        eprintln!("  --help-config    Print default config path and all options");
        eprintln!("  --help           Show this help");
        std::process::exit(0);
    }

    if args.iter().any(|a| a == "--clear-state") {
        StateStore::clear_all_profiles();
        eprintln!("State cleared.");
    }

    if args.iter().any(|a| a == "--clear-log") {
        if let Err(e) = log::clear() {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    if args.iter().any(|a| a == "--log") {
        show_log();
        std::process::exit(0);
    }

    if args.iter().any(|a| a == "--help-cli") {
        cli::print_help_cli();
        std::process::exit(0);
    }

    if args.iter().any(|a| a == "--help-config") {
        print_help_config();
        std::process::exit(0);
    }

    log::init();

    let config_path = args
        .iter()
        .find(|a| a.starts_with("--config="))
        .map(|a| PathBuf::from(&a["--config=".len()..]))
        .unwrap_or_else(default_config_path);

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config from {}: {}", config_path.display(), e);
            eprintln!("Create a config file with:");
            eprintln!();
            eprintln!("  [server]");
            eprintln!("  base_url = \"http://127.0.0.1:5000\"");
            std::process::exit(1);
        }
    };

    let client = match connect(&config.server) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(flag) = args
        .iter()
        .find(|a| matches!(a.as_str(), "--pause" | "--resume" | "--logs"))
    {
        std::process::exit(run_one_shot(&client, flag));
    }

    let state = match StateStore::open(&config.server.name) {
        Ok(s) => Some(s),
        Err(e) => {
            log_warn!("[Main] running without local state: {}", e);
            None
        }
    };
    let sync = Synchronizer::new(
        config.list.page_size,
        config.poll,
        Box::new(SystemClock::new()),
        state,
    );
    let (cmd_tx, resp_rx) = backend::spawn(client);

    if args.iter().any(|a| a == "--cli") {
        cli::run_cli(sync, cmd_tx, resp_rx);
        std::process::exit(0);
    }

    std::process::exit(watch::run_watch(sync, cmd_tx, resp_rx));
}

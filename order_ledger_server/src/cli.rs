use std::{env, env::VarError};

/// There's no real CLI for the server. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "OLS_HOST",
        "OLS_PORT",
        "OLS_DATABASE_URL",
        "OLS_DB_MAX_CONNECTIONS",
        "OLS_RUN_MIGRATIONS",
        "OLS_DEFAULT_CURRENCY",
        "OLS_GATEWAY_URL",
        "OLS_GATEWAY_TIMEOUT_MS",
        "OLS_MAX_CONFLICT_RETRIES",
        "OLS_MAX_GATEWAY_RETRIES",
        "OLS_RETRY_INITIAL_BACKOFF_MS",
        "OLS_RETRY_MAX_BACKOFF_MS",
        "OLS_RECONCILE_ENABLED",
        "OLS_RECONCILE_INTERVAL_SECS",
        "OLS_RECONCILE_MAX_AGE_MINS",
        "OLS_RECONCILE_MAX_ATTEMPTS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}

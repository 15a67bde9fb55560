// CLI binary entry point for nowplaying

mod cli;

use std::io::{self, IsTerminal};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use env_logger::Env;
use log::debug;

use cli::{commands, interactive, Command, Config};

fn main() -> Result<()> {
    let mut config = Config::parse();

    // -i, or no arguments at all and the user asks for it
    let bare = std::env::args_os().len() == 1 && io::stdin().is_terminal();
    if config.interactive || (bare && ask_interactive()?) {
        let answers = interactive::prompt(&mut io::stdin().lock(), &mut io::stdout(), config.port)?;
        answers.apply(&mut config);
    }

    let level = if config.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if let Ok(json) = serde_json::to_string(&config) {
        debug!("effective configuration: {}", json);
    }

    match &config.command {
        Some(Command::Scan { files }) => commands::scan(&config, files),
        Some(Command::Listen) | None => commands::listen(&config),
    }
}

fn ask_interactive() -> Result<bool> {
    let help = Config::command().render_help().to_string();
    Ok(interactive::want_interactive(&mut io::stdin().lock(), &mut io::stdout(), &help)?)
}

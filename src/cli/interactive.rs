// Interactive startup prompts

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::cli::Config;

/// Settings chosen at the prompt; `None` keeps what the command line said
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Answers {
    pub port: Option<u16>,
    pub quiet: bool,
    pub outfile: Option<PathBuf>,
}

impl Answers {
    pub fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        config.quiet = self.quiet;
        if self.outfile.is_some() {
            config.outfile = self.outfile;
        }
    }
}

/// Asks whether to configure interactively. `h` prints `help` and asks again.
pub fn want_interactive<R: BufRead, W: Write>(input: &mut R, out: &mut W, help: &str) -> io::Result<bool> {
    loop {
        let answer = ask(
            input,
            out,
            "Type i (then Enter) to set options interactively, h for help, \
             or just press Enter to continue with the defaults: ",
        )?;
        match answer.as_deref().map(str::to_lowercase).as_deref() {
            Some("h") => writeln!(out, "{}\n", help)?,
            Some("i") => return Ok(true),
            _ => return Ok(false),
        }
    }
}

/// Ask for port, quiet mode and output file
pub fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, default_port: u16) -> io::Result<Answers> {
    writeln!(out, "Interactive mode is active. Press Enter to accept the default for each choice.")?;
    let port = ask_port(input, out, default_port)?;

    let quiet = ask(input, out, "Quiet mode (no track lines on the console)? (y/N): ")?
        .is_some_and(|a| a.to_lowercase().starts_with('y'));

    let outfile = ask(input, out, "File to write the current track to (none by default): ")?
        .filter(|a| !a.is_empty())
        .map(PathBuf::from);

    Ok(Answers { port, quiet, outfile })
}

fn ask_port<R: BufRead, W: Write>(input: &mut R, out: &mut W, default_port: u16) -> io::Result<Option<u16>> {
    let question = format!("Port to listen on (Enter for {}): ", default_port);
    loop {
        let Some(answer) = ask(input, out, &question)? else {
            return Ok(None);
        };
        if answer.is_empty() {
            return Ok(None);
        }
        match answer.parse::<u16>() {
            Ok(port) if port > 0 => return Ok(Some(port)),
            _ => writeln!(out, "Port needs to be an integer between 1-65535")?,
        }
    }
}

/// One trimmed line of input, or `None` at end of input
fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> io::Result<Option<String>> {
    write!(out, "{}", question)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

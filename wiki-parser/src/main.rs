use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use wiki_parser::{parse_episode_tables, parse_html_quotes, parse_wikitext_quotes, ParseOptions};

fn main() {
    if let Err(err) = run() {
        eprintln!("{}: {err}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let mode = match args.next() {
        Some(flag) if is_help_flag(&flag) => {
            print_help(&program);
            return Ok(());
        }
        Some(flag) if is_version_flag(&flag) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(mode) => Mode::parse(&mode).ok_or_else(|| {
            format!("unknown mode: {mode}\n{}", usage(&program))
        })?,
        None => return Err(usage(&program)),
    };

    let input = match args.next() {
        Some(path) if path == "-" => Input::Stdin,
        Some(path) => Input::File(path),
        None => Input::Stdin,
    };

    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {extra}\n{}", usage(&program)));
    }

    let document = match input {
        Input::Stdin => read_stdin()?,
        Input::File(path) => read_file(&path)?,
    };

    let json = match mode {
        Mode::Episodes => {
            serde_json::to_string_pretty(&parse_episode_tables(&document, &ParseOptions::default()))
        }
        Mode::QuotesHtml => serde_json::to_string_pretty(&parse_html_quotes(&document, None, false)),
        Mode::QuotesWikitext => serde_json::to_string_pretty(&parse_wikitext_quotes(&document, None)),
    }
    .map_err(|err| format!("failed to serialize JSON: {err}"))?;
    println!("{json}");
    Ok(())
}

enum Mode {
    Episodes,
    QuotesHtml,
    QuotesWikitext,
}

impl Mode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "episodes" => Some(Self::Episodes),
            "quotes-html" => Some(Self::QuotesHtml),
            "quotes-wikitext" => Some(Self::QuotesWikitext),
            _ => None,
        }
    }
}

enum Input {
    Stdin,
    File(String),
}

fn is_help_flag(arg: &str) -> bool {
    arg == "-h" || arg == "--help"
}

fn is_version_flag(arg: &str) -> bool {
    arg == "-V" || arg == "--version"
}

fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("failed to read '{path}': {err}"))
}

fn read_stdin() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|err| format!("failed to read stdin: {err}"))?;
    Ok(buf)
}

fn print_help(program: &str) {
    println!(
        "{}\n\nOptions:\n  -h, --help      Show this message\n  -V, --version   Print package version",
        usage(program)
    );
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} <episodes|quotes-html|quotes-wikitext> [FILE|-]\n\n\
         Parses a saved episode list page, rendered quote page or quote page wikitext \
         and prints the candidates as JSON. When no file is passed, stdin is used."
    )
}

use clap::*;
use clap_num::maybe_hex;
use exhume_stream::{SeekMode, Stream, StreamError, Token, TokenKind};
use log::{debug, error, info, LevelFilter};
use serde::Serialize;

/// Line buffer used by the `lines` mode.
const LINE_CAPACITY: usize = 1024;

#[derive(Serialize)]
#[serde(untagged)]
enum Item {
    Text(String),
    Int(i32),
    Float(f32),
}

#[derive(Serialize)]
struct Report {
    body: String,
    subfile: Option<String>,
    stream_size: u64,
    offset: u64,
    mode: String,
    items: Vec<Item>,
}

fn collect(stream: &mut Stream, mode: &str, size: u64) -> Result<Vec<Item>, StreamError> {
    let mut items = Vec::new();
    match mode {
        "raw" => {
            // Never allocate more than what is left in the stream.
            let available = stream.size()?.saturating_sub(stream.tell()?);
            let len = usize::try_from(size.min(available)).map_err(|_| {
                StreamError::Io(std::io::Error::other("requested size does not fit in memory"))
            })?;
            let mut bytes = vec![0u8; len];
            let n = stream.read_elements(&mut bytes, 1, len)?;
            bytes.truncate(n);
            items.push(Item::Text(String::from_utf8_lossy(&bytes).into_owned()));
        }
        "lines" => {
            let mut line = [0u8; LINE_CAPACITY];
            while (items.len() as u64) < size {
                match stream.read_line(&mut line)? {
                    Some(n) => items.push(Item::Text(String::from_utf8_lossy(&line[..n]).into_owned())),
                    None => break,
                }
            }
        }
        "ints" | "floats" => {
            let kind = if mode == "ints" { TokenKind::Int } else { TokenKind::Float };
            while (items.len() as u64) < size {
                match stream.scan_token(kind) {
                    Ok(Token::Int(v)) => items.push(Item::Int(v)),
                    Ok(Token::Float(v)) => items.push(Item::Float(v)),
                    Err(StreamError::Parse(_)) => {
                        debug!("No more {} tokens at offset {}", kind, stream.tell()?);
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        _ => unreachable!("mode is restricted by the argument parser"),
    }
    Ok(items)
}

fn process_file(
    file_path: &str,
    subfile: Option<&String>,
    mode: &str,
    size: u64,
    offset: u64,
    json: bool,
) -> Result<(), StreamError> {
    info!("Processing the file '{}' in '{}' mode...", file_path, mode);
    let mut stream = Stream::from_path(file_path);
    if !stream.is_valid() {
        return Err(StreamError::Unusable);
    }

    if let Some(path) = subfile {
        stream.open_subfile(path)?;
        info!("Reading from subfile '{}'", path);
    }

    let offset = i64::try_from(offset).unwrap_or(i64::MAX);
    let position = stream.seek_to(offset, SeekMode::FromStart)?;
    let stream_size = stream.size()?;
    debug!("------------------------------------------------------------");
    debug!("Stream size: {}", stream_size);
    debug!("Position: {}", position);
    debug!("------------------------------------------------------------");

    let items = collect(&mut stream, mode, size)?;
    if json {
        let report = Report {
            body: file_path.to_string(),
            subfile: subfile.cloned(),
            stream_size,
            offset: position,
            mode: mode.to_string(),
            items,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Cannot serialize report: {}", e),
        }
    } else {
        for item in items {
            match item {
                Item::Text(s) => print!("{}", s),
                Item::Int(v) => println!("{}", v),
                Item::Float(v) => println!("{}", v),
            }
        }
    }

    stream.close_subfile();
    Ok(())
}

fn main() {
    let matches = Command::new("exhume_stream")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Inspect a RAW container through the exhume stream primitives.")
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_parser(value_parser!(String))
                .required(true)
                .help("The path to the file to read."),
        )
        .arg(
            Arg::new("subfile")
                .long("subfile")
                .value_parser(value_parser!(String))
                .required(false)
                .help("Read from this file instead, as a subfile of the body."),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_parser(["raw", "lines", "ints", "floats"])
                .default_value("raw")
                .help("What to read: raw bytes, lines, integer or float tokens."),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .long("size")
                .value_parser(maybe_hex::<u64>)
                .default_value("256")
                .help("Bytes to read in raw mode, or the maximum number of lines/tokens."),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .value_parser(maybe_hex::<u64>)
                .required(false)
                .help("Start reading at a specific offset."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print a JSON report instead of plain output."),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set the log verbosity level"),
        )
        .get_matches();

    let log_level_str = matches
        .get_one::<String>("log_level")
        .map(String::as_str)
        .unwrap_or("info");
    let level_filter = match log_level_str {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    env_logger::Builder::new().filter_level(level_filter).init();

    let Some(file_path) = matches.get_one::<String>("body") else {
        error!("Missing --body argument");
        std::process::exit(1);
    };
    let subfile = matches.get_one::<String>("subfile");
    let mode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("raw");
    let size = *matches.get_one::<u64>("size").unwrap_or(&256);
    let offset = *matches.get_one::<u64>("offset").unwrap_or(&0);
    let json = matches.get_flag("json");

    if let Err(e) = process_file(file_path, subfile, mode, size, offset, json) {
        error!("{}: {}", file_path, e);
        std::process::exit(1);
    }
}

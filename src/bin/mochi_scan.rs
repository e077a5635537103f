//! Mochi Scan
//!
//! Pushes a byte stream through the scanner the way a terminal would
//! receive it, in read-sized chunks, and reports what came out.
//! Reads from a file, stdin, or a command running on a pty.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use serde::Serialize;

use mochi_scan::logging::{self, LogConfig};
use mochi_scan::scan::{find_either_of_two_bytes, PaddedBuffer};
use mochi_scan::{Config, Handler, ScanResult, ScanStats, SimdPreference, StreamScanner};

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!("Try 'mochi-scan --help' for more information.");
            return ExitCode::FAILURE;
        },
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            },
        },
        None => Config::default(),
    };
    if let Some(simd) = args.simd {
        config.simd = simd;
    }
    if let Some(chunk) = args.chunk {
        config.read_buffer_size = chunk;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Warning: {e}");
    }

    let mut source = match open_source(&args) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error opening input: {e}");
            return ExitCode::FAILURE;
        },
    };

    let report = match run(&config, &mut source) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        },
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            },
        }
    } else {
        print_report(&report);
    }

    source.finish()
}

/// Command-line arguments
#[derive(Default)]
struct Args {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    chunk: Option<usize>,
    simd: Option<SimdPreference>,
    exec: Vec<String>,
    json: bool,
    help: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut argv = std::env::args().skip(1);

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "-j" | "--json" => args.json = true,
            "-f" | "--file" => {
                let path = argv.next().ok_or("--file needs a path")?;
                args.input = Some(PathBuf::from(path));
            },
            "--config" => {
                let path = argv.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            },
            "-c" | "--chunk" => {
                let value = argv.next().ok_or("--chunk needs a size")?;
                let size = value
                    .parse()
                    .map_err(|_| format!("invalid chunk size '{value}'"))?;
                args.chunk = Some(size);
            },
            "--simd" => {
                let value = argv.next().ok_or("--simd needs a level")?;
                let simd = serde_json::from_value(serde_json::Value::String(value.clone()))
                    .map_err(|_| format!("unknown SIMD level '{value}'"))?;
                args.simd = Some(simd);
            },
            "-e" | "--exec" => {
                args.exec = argv.by_ref().collect();
                if args.exec.is_empty() {
                    return Err("--exec needs a command".to_string());
                }
            },
            _ if !arg.starts_with('-') && args.input.is_none() => {
                args.input = Some(PathBuf::from(arg));
            },
            _ => return Err(format!("unknown option '{arg}'")),
        }
    }

    Ok(args)
}

/// Where the bytes come from
enum Source {
    Reader(Box<dyn Read>),
    #[cfg(unix)]
    Pty(mochi_scan::pty::PtySource),
}

fn open_source(args: &Args) -> ScanResult<Source> {
    if let Some((program, rest)) = args.exec.split_first() {
        #[cfg(unix)]
        {
            use mochi_scan::pty::{PtySource, WindowSize};
            return Ok(Source::Pty(PtySource::spawn(program, rest, WindowSize::default())?));
        }
        #[cfg(not(unix))]
        {
            let _ = (program, rest);
            return Err(mochi_scan::ScanError::InvalidConfig(
                "--exec is only supported on unix".to_string(),
            ));
        }
    }

    Ok(match &args.input {
        Some(path) => Source::Reader(Box::new(File::open(path)?)),
        None => Source::Reader(Box::new(io::stdin())),
    })
}

impl Source {
    /// Append up to `max` bytes to `buf`; 0 means end of input
    fn fill(&mut self, buf: &mut PaddedBuffer, max: usize) -> ScanResult<usize> {
        match self {
            Source::Reader(reader) => loop {
                match reader.read(buf.spare(max)) {
                    Ok(n) => {
                        buf.commit(n);
                        return Ok(n);
                    },
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        buf.commit(0);
                        return Err(e.into());
                    },
                }
            },
            #[cfg(unix)]
            Source::Pty(pty) => pty.read_into(buf, max),
        }
    }

    fn finish(&mut self) -> ExitCode {
        match self {
            Source::Reader(_) => ExitCode::SUCCESS,
            #[cfg(unix)]
            Source::Pty(pty) => match pty.wait() {
                Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                },
            },
        }
    }
}

/// Counts text and steps over escape bytes; escape parsing happens elsewhere
struct Tally {
    log: LogConfig,
    longest_run: usize,
}

impl Handler for Tally {
    fn text(&mut self, chars: &[u32]) {
        self.longest_run = self.longest_run.max(chars.len());
    }

    fn escape(&mut self, input: &[u8]) -> usize {
        if tracing::enabled!(tracing::Level::TRACE) {
            let head = String::from_utf8_lossy(&input[..input.len().min(16)]);
            tracing::trace!(head = %self.log.scrub(&head), "escape");
        }
        1
    }
}

#[derive(Serialize)]
struct Report {
    simd: String,
    chunk_size: usize,
    reads: u64,
    line_breaks: u64,
    longest_text_run: usize,
    elapsed_ms: f64,
    throughput_mib_s: f64,
    stats: ScanStats,
}

fn run(config: &Config, source: &mut Source) -> ScanResult<Report> {
    let mut scanner = StreamScanner::from_config(config);
    let mut tally = Tally {
        log: config.log.clone(),
        longest_run: 0,
    };
    let mut buf = PaddedBuffer::with_capacity(config.read_buffer_size);
    let mut reads = 0u64;
    let mut line_breaks = 0u64;
    let mut busy = Duration::ZERO;

    loop {
        buf.clear();
        if source.fill(&mut buf, config.read_buffer_size)? == 0 {
            break;
        }
        reads += 1;

        let started = Instant::now();
        scanner.feed(buf.as_bytes(), &mut tally);
        busy += started.elapsed();

        line_breaks += count_line_breaks(&buf);
    }

    let stats = scanner.stats();
    let secs = busy.as_secs_f64();
    tracing::info!(bytes = stats.bytes, reads, "input exhausted");

    Ok(Report {
        simd: scanner.level().to_string(),
        chunk_size: config.read_buffer_size,
        reads,
        line_breaks,
        longest_text_run: tally.longest_run,
        elapsed_ms: secs * 1000.0,
        throughput_mib_s: if secs > 0.0 {
            stats.bytes as f64 / secs / (1024.0 * 1024.0)
        } else {
            0.0
        },
        stats,
    })
}

fn count_line_breaks(buf: &PaddedBuffer) -> u64 {
    let mut count = 0;
    let mut pos = 0;
    while let Some(found) = find_either_of_two_bytes(buf.window(pos..), b'\n', 0x0B) {
        count += 1;
        pos += found + 1;
    }
    count
}

fn print_report(report: &Report) {
    let stats = &report.stats;
    println!("Scanner: {} ({}-byte reads)", report.simd, report.chunk_size);
    println!("---");
    println!("Bytes:            {}", stats.bytes);
    println!("Reads:            {}", report.reads);
    println!("Code points:      {}", stats.chars);
    println!("Replacements:     {}", stats.replacements);
    println!("Escapes:          {}", stats.escapes);
    println!("Line breaks:      {}", report.line_breaks);
    println!("Decode calls:     {}", stats.decode_calls);
    println!("Longest text run: {}", report.longest_text_run);
    println!("---");
    println!(
        "Decode time: {:.3} ms ({:.1} MiB/s)",
        report.elapsed_ms, report.throughput_mib_s
    );
}

fn print_help() {
    println!("Mochi Scan - terminal input scanner");
    println!();
    println!("Usage: mochi-scan [OPTIONS] [INPUT_FILE]");
    println!("       mochi-scan [OPTIONS] --exec <COMMAND> [ARGS...]");
    println!();
    println!("Options:");
    println!("  -f, --file <PATH>    Read input from file");
    println!("  -c, --chunk <N>      Bytes per read (default: 65536)");
    println!("      --simd <LEVEL>   auto, scalar, sse2 or avx2 (default: auto)");
    println!("      --config <PATH>  Load settings from a JSON file");
    println!("  -e, --exec <CMD...>  Run a command on a pty and scan its output");
    println!("  -j, --json           Output the report as JSON");
    println!("  -h, --help           Show this help message");
    println!();
    println!("If no input file is specified, reads from stdin.");
    println!();
    println!("Examples:");
    println!("  cat /var/log/syslog | mochi-scan");
    println!("  mochi-scan --simd scalar -c 4096 capture.bin");
    println!("  mochi-scan --json --exec ls --color=always /usr/bin");
}

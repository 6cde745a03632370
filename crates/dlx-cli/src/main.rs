//! `dlx`: batch exact-cover solver, TCP server, and Sudoku front ends.
//!
//! Usage:
//!   dlx [<cover_path>] [<solution_output_path>]
//!   dlx --server <request_port> <solution_port>
//!   dlx sudoku-encode [<puzzle>] [<cover_out>]
//!   dlx sudoku-decode <puzzle> [<solution_in>] [<text_out>]
//!
//! `-` (or an omitted path) streams via stdin/stdout. When binary solutions
//! go to stdout, textual output is suppressed so the DLXS bytes stay clean.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use dlx_engine::{BinarySink, CompositeSink, CoverMatrix, Solver, TextSink};
use dlx_error::{DlxError, Result};
use dlx_server::{DlxTcpServer, ServerConfig};
use dlx_sudoku::{decode_solutions, write_cover, Grid, SudokuError};

const STREAM: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Solve {
        cover: String,
        output: String,
    },
    Server {
        request_port: u16,
        solution_port: u16,
    },
    SudokuEncode {
        puzzle: String,
        output: String,
    },
    SudokuDecode {
        puzzle: String,
        solution: String,
        output: String,
    },
}

fn print_usage() {
    eprintln!("dlx [<cover_path>] [<solution_output_path>]");
    eprintln!("dlx --server <request_port> <solution_port>");
    eprintln!("dlx sudoku-encode [<puzzle>] [<cover_out>]");
    eprintln!("dlx sudoku-decode <puzzle> [<solution_in>] [<text_out>]");
    eprintln!("Hints:");
    eprintln!("  Omit arguments or pass '-' to stream via stdin/stdout.");
}

fn parse_port(text: &str) -> std::result::Result<u16, String> {
    match text.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(format!("port '{text}' must be in [1, 65535]")),
    }
}

fn parse_args(args: &[String]) -> std::result::Result<Command, String> {
    let arg = |i: usize| args.get(i).map(String::as_str);

    match arg(0) {
        Some("--server") => {
            if args.len() != 3 {
                return Err("--server requires <request_port> <solution_port>".to_owned());
            }
            Ok(Command::Server {
                request_port: parse_port(&args[1])?,
                solution_port: parse_port(&args[2])?,
            })
        }
        Some("sudoku-encode") => {
            if args.len() > 3 {
                return Err("sudoku-encode takes at most two paths".to_owned());
            }
            Ok(Command::SudokuEncode {
                puzzle: arg(1).unwrap_or(STREAM).to_owned(),
                output: arg(2).unwrap_or(STREAM).to_owned(),
            })
        }
        Some("sudoku-decode") => {
            if args.is_empty() || args.len() > 4 {
                return Err("sudoku-decode requires <puzzle> [<solution_in>] [<text_out>]".to_owned());
            }
            let puzzle = arg(1)
                .ok_or_else(|| "sudoku-decode requires a puzzle path".to_owned())?
                .to_owned();
            Ok(Command::SudokuDecode {
                puzzle,
                solution: arg(2).unwrap_or(STREAM).to_owned(),
                output: arg(3).unwrap_or(STREAM).to_owned(),
            })
        }
        _ => {
            if args.len() > 2 {
                return Err("too many arguments".to_owned());
            }
            Ok(Command::Solve {
                cover: arg(0).unwrap_or(STREAM).to_owned(),
                output: arg(1).unwrap_or(STREAM).to_owned(),
            })
        }
    }
}

fn open_input(path: &str) -> Result<Box<dyn Read>> {
    if path == STREAM {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn read_text(path: &str) -> Result<String> {
    let mut input = open_input(path)?;
    let mut text = String::new();
    input.read_to_string(&mut text)?;
    Ok(text)
}

/// Batch path: decode the cover, build the matrix, run the search with a
/// binary sink on the output stream and, unless that stream is stdout, a
/// textual sink on stdout.
fn run_solve(cover_path: &str, output_path: &str) -> Result<()> {
    let problem = {
        let mut input = open_input(cover_path)?;
        dlx_codec::read_problem(&mut input)?
    };

    let matrix = CoverMatrix::build(&problem)?;
    let column_count = matrix.column_count() as u32;
    let mut solver = Solver::new(matrix);

    let to_stdout = output_path == STREAM;
    let output: Box<dyn Write> = if to_stdout {
        Box::new(std::io::stdout().lock())
    } else {
        Box::new(BufWriter::new(File::create(output_path)?))
    };

    let mut binary = BinarySink::start(output, column_count)?;
    let mut console = (!to_stdout).then(|| TextSink::new(std::io::stdout().lock()));

    {
        let mut sinks = CompositeSink::new();
        if let Some(text) = console.as_mut() {
            sinks.add_sink(text);
        }
        sinks.add_sink(&mut binary);
        solver.solve(&mut sinks);
    }

    binary.finish()?.flush()?;
    if let Some(mut text) = console {
        if let Some(error) = text.take_error() {
            return Err(error);
        }
    }
    Ok(())
}

/// Start the TCP server and block until both loops end.
fn run_server(request_port: u16, solution_port: u16) -> Result<()> {
    let mut server = DlxTcpServer::start(ServerConfig {
        request_port,
        solution_port,
    })?;
    server.wait();
    Ok(())
}

fn run_sudoku_encode(puzzle_path: &str, output_path: &str) -> std::result::Result<(), SudokuError> {
    let grid = Grid::parse(&read_text(puzzle_path).map_err(SudokuError::Dlx)?)?;
    if output_path == STREAM {
        write_cover(&grid, &mut std::io::stdout().lock())
    } else {
        let mut output = BufWriter::new(File::create(output_path)?);
        write_cover(&grid, &mut output)
    }
}

fn run_sudoku_decode(
    puzzle_path: &str,
    solution_path: &str,
    output_path: &str,
) -> std::result::Result<(), SudokuError> {
    let grid = Grid::parse(&read_text(puzzle_path).map_err(SudokuError::Dlx)?)?;
    let input = open_input(solution_path).map_err(SudokuError::Dlx)?;
    if output_path == STREAM {
        decode_solutions(&grid, input, &mut std::io::stdout().lock())?;
    } else {
        let mut output = BufWriter::new(File::create(output_path)?);
        decode_solutions(&grid, input, &mut output)?;
    }
    Ok(())
}

fn dlx_failure(error: &DlxError) -> ExitCode {
    eprintln!("dlx: {error}");
    ExitCode::from(error.exit_code().clamp(1, 255) as u8)
}

fn sudoku_failure(error: &SudokuError) -> ExitCode {
    eprintln!("dlx: {error}");
    match error {
        SudokuError::Dlx(inner) => ExitCode::from(inner.exit_code().clamp(1, 255) as u8),
        _ => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("DLX_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("dlx: {message}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Solve { cover, output } => match run_solve(&cover, &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => dlx_failure(&error),
        },
        Command::Server {
            request_port,
            solution_port,
        } => match run_server(request_port, solution_port) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => dlx_failure(&error),
        },
        Command::SudokuEncode { puzzle, output } => match run_sudoku_encode(&puzzle, &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => sudoku_failure(&error),
        },
        Command::SudokuDecode {
            puzzle,
            solution,
            output,
        } => match run_sudoku_decode(&puzzle, &solution, &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => sudoku_failure(&error),
        },
    }
}

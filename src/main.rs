use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use phl::codec::{self, CodecError};
use phl::compiler::{CompileError, Generator, Source};
use phl::diagnostic::{ansi::AnsiRenderer, json, registry, Diagnostic};
use phl::fault::Fault;
use phl::isa::{Instruction, Key, Program, Title, Value};
use phl::logging;
use phl::text::Text;
use phl::vm::link::DirLink;
use phl::vm::{input, FileArea, FrameBuffer, Interpreter, Keypad};

/// Exit status for an internal fault.
const EXIT_FAULT: u8 = 70;

#[derive(Parser)]
#[command(name = "phl", version, about = "Compiler and simulator for handheld terminal programs")]
struct Cli {
    /// Report errors as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a JSON construct tree into a program file
    Build {
        source: PathBuf,
        /// Output path (default: the source path with an .htc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the label/jump optimizer
        #[arg(long)]
        no_optimize: bool,
        /// Print the compiled instruction listing
        #[arg(long)]
        listing: bool,
    },
    /// Decode a program file and print its instructions
    Dump { program: PathBuf },
    /// Run a program (.htc or .json) in the simulator
    Run {
        program: PathBuf,
        /// Preload a file: NAME=PATH
        #[arg(long = "load", value_name = "NAME=PATH", value_parser = parse_load)]
        load: Vec<(String, PathBuf)>,
        /// Stop when the program returns to its entry point
        #[arg(long)]
        once: bool,
        /// Keys to press, space separated (e.g. "1 2 ENT F1"); more are read from stdin
        #[arg(long)]
        keys: Option<String>,
        /// Write the file area to this directory afterwards
        #[arg(long)]
        save: Option<PathBuf>,
        /// Directory standing in for the host end of the serial link
        #[arg(long)]
        link: Option<PathBuf>,
    },
    /// Explain an error code
    Explain {
        code: Option<String>,
        /// List every code
        #[arg(long)]
        list: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("{path}: invalid source: {source}")]
    Json { path: String, source: serde_json::Error },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{source}")]
    Codec { path: String, source: CodecError },
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
        move |source| CliError::Io { path: path.display().to_string(), source }
    }

    fn diagnostic(&self) -> Diagnostic {
        match self {
            CliError::Compile(e) => e.into(),
            CliError::Codec { path, source } => Diagnostic::from(source).with_path(path.clone()),
            CliError::Fault(f) => f.into(),
            other => Diagnostic::error(other.to_string()),
        }
    }

    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Fault(_) | CliError::Compile(CompileError::Fault(_)) => ExitCode::from(EXIT_FAULT),
            _ => ExitCode::FAILURE,
        }
    }
}

fn parse_load(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected NAME=PATH, got '{arg}'")),
    }
}

fn parse_key(token: &str) -> Result<i32, CliError> {
    if let Some(key) = Key::ALL.iter().find(|k| k.name().eq_ignore_ascii_case(token)) {
        return Ok(key.code());
    }
    token.parse().map_err(|_| CliError::Usage(format!("unknown key '{token}'")))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose));

    match execute(cli.command, cli.json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let d = e.diagnostic();
            if cli.json {
                eprintln!("{}", json::render(&d));
            } else {
                eprint!("{}", AnsiRenderer::for_stderr().render(&d));
            }
            e.exit_code()
        }
    }
}

fn execute(command: Command, json: bool) -> Result<(), CliError> {
    match command {
        Command::Build { source, output, no_optimize, listing } => build(&source, output, no_optimize, listing),
        Command::Dump { program } => dump(&program, json),
        Command::Run { program, load, once, keys, save, link } => {
            let options = RunOptions { once, keys, save, link, json };
            run(&program, &load, options)
        }
        Command::Explain { code, list } => explain(code.as_deref(), list),
    }
}

fn read_source(path: &Path) -> Result<Source, CliError> {
    let text = fs::read_to_string(path).map_err(CliError::io(path))?;
    serde_json::from_str(&text).map_err(|source| CliError::Json { path: path.display().to_string(), source })
}

fn build(path: &Path, output: Option<PathBuf>, no_optimize: bool, listing: bool) -> Result<(), CliError> {
    let source = read_source(path)?;
    let generator = Generator::new().with_optimizer(!no_optimize);
    let program = generator.compile(&source)?;
    let bytes = generator.encode(&program)?;
    let output = output.unwrap_or_else(|| path.with_extension("htc"));
    fs::write(&output, &bytes).map_err(CliError::io(&output))?;
    log::info!("wrote {} ({} bytes)", output.display(), bytes.len());
    if listing {
        print!("{}", program.listing());
    }
    Ok(())
}

fn load_program(path: &Path) -> Result<Program, CliError> {
    if path.extension().is_some_and(|e| e == "json") {
        return Ok(Generator::new().compile(&read_source(path)?)?);
    }
    let bytes = fs::read(path).map_err(CliError::io(path))?;
    codec::decode_program(&bytes).map_err(|source| CliError::Codec { path: path.display().to_string(), source })
}

#[derive(Serialize)]
struct DumpView<'a> {
    title: &'a Title,
    code: &'a [Instruction],
}

fn dump(path: &Path, json: bool) -> Result<(), CliError> {
    let program = load_program(path)?;
    if json {
        let view = DumpView { title: &program.title, code: &program.code };
        let text = serde_json::to_string_pretty(&view)
            .map_err(|source| CliError::Json { path: path.display().to_string(), source })?;
        println!("{text}");
    } else {
        print!("{}", program.listing());
    }
    Ok(())
}

/// Feeds `keys`, then stdin, into the keypad. The keypad is dropped once
/// stdin ends; the run then stops at its next input or the next time the
/// program returns to its entry point.
fn feed_keys(keypad: Keypad, keys: Option<&str>) -> Result<(), CliError> {
    for token in keys.unwrap_or_default().split_whitespace() {
        keypad.press(parse_key(token)?);
    }
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            for token in line.split_whitespace() {
                match parse_key(token) {
                    Ok(code) => {
                        keypad.press(code);
                    }
                    Err(e) => log::warn!("{e}"),
                }
            }
        }
    });
    Ok(())
}

#[derive(Serialize)]
struct RunReport {
    screen: Vec<String>,
    registers: BTreeMap<String, Value>,
    files: BTreeMap<String, String>,
}

struct RunOptions {
    once: bool,
    keys: Option<String>,
    save: Option<PathBuf>,
    link: Option<PathBuf>,
    json: bool,
}

fn run(path: &Path, load: &[(String, PathBuf)], options: RunOptions) -> Result<(), CliError> {
    let program = load_program(path)?;
    let mut files = FileArea::new();
    for (name, file) in load {
        let bytes = fs::read(file).map_err(CliError::io(file))?;
        files.put_whole(&Text::from(name.as_str()), bytes);
    }

    let (rows, columns) = program.title.profile.geometry();
    let (keypad, input) = input::channel();
    let mut vm = Interpreter::new(program, FrameBuffer::new(rows, columns), input)?.with_files(files);
    if let Some(dir) = options.link {
        vm = vm.with_link(Box::new(DirLink::new(dir)));
    }
    feed_keys(keypad, options.keys.as_deref())?;

    if options.once {
        let step = vm.run_until_return()?;
        log::info!("stopped at pc {}: {step:?}", vm.pc());
    } else {
        vm.run()?;
    }

    let (registers, files, display) = vm.into_parts();
    if let Some(dir) = options.save.as_deref() {
        fs::create_dir_all(dir).map_err(CliError::io(dir))?;
        for (name, file) in files.iter() {
            let target = dir.join(name.to_string_lossy());
            fs::write(&target, file.bytes()).map_err(CliError::io(&target))?;
        }
    }

    if options.json {
        let report = RunReport {
            screen: display.render().lines().map(str::to_string).collect(),
            registers: registers.explicit().into_iter().map(|(r, v)| (r.name().to_string(), v)).collect(),
            files: files.iter().map(|(n, f)| (n.to_string(), Text::from(f.bytes()).to_string())).collect(),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(source) => return Err(CliError::Json { path: path.display().to_string(), source }),
        }
    } else {
        println!("{}", display.render());
    }
    Ok(())
}

fn explain(code: Option<&str>, list: bool) -> Result<(), CliError> {
    if list || code.is_none() {
        for entry in registry::REGISTRY {
            println!("{}  {}", entry.code, entry.short);
        }
        return Ok(());
    }
    let code = code.unwrap_or_default().to_ascii_uppercase();
    match registry::lookup(&code) {
        Some(entry) => {
            print!("{}", entry.long);
            Ok(())
        }
        None => Err(CliError::Usage(format!("unknown error code '{code}'"))),
    }
}

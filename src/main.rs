//! arenascheme command-line interpreter
//!
//! Usage:
//!   arenascheme               - read a program from standard input, or start
//!                               the REPL when standard input is a terminal
//!   arenascheme <file.scm>    - run a file
//!   arenascheme -e <expr>     - evaluate an expression
//!   arenascheme --repl        - start the REPL

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process;
use std::thread;

use arenascheme::ast::Value;
use arenascheme::{Config, Error, Interpreter, MAX_PARSE_DEPTH};
use clap::{ArgAction, Parser};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{Level, debug, warn};

/// Default evaluation depth for the binary, sized for `--stack-size-mb`
const CLI_MAX_EVAL_DEPTH: usize = 50_000;

#[derive(Parser, Debug)]
#[command(name = "arenascheme")]
#[command(version)]
#[command(about = "A small Scheme-like interpreter backed by a bulk-release arena", long_about = None)]
struct Args {
    /// Program file to run
    #[arg()]
    file: Option<PathBuf>,

    /// Evaluate a program given on the command line
    #[arg(short, long)]
    eval: Option<String>,

    /// Start the interactive REPL
    #[arg(long)]
    repl: bool,

    /// Maximum nested evaluation depth
    #[arg(long, default_value_t = CLI_MAX_EVAL_DEPTH)]
    max_depth: usize,

    /// Maximum list nesting accepted by the parser
    #[arg(long, default_value_t = MAX_PARSE_DEPTH)]
    max_parse_depth: usize,

    /// Stack size of the evaluation thread, in MiB
    #[arg(long, default_value_t = 1024)]
    stack_size_mb: usize,

    /// Log to standard error; repeat for more detail (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config {
        max_eval_depth: args.max_depth,
        max_parse_depth: args.max_parse_depth,
    };
    let stack_size = args.stack_size_mb.saturating_mul(1024 * 1024);
    debug!(?config, stack_size, "starting evaluation thread");

    // Evaluation recurses on the native stack, so it runs on a thread sized
    // for the configured depth limit
    let worker = thread::Builder::new()
        .name("evaluator".into())
        .stack_size(stack_size)
        .spawn(move || run(&args, config));

    let (interpreter, status) = match worker.map(|handle| handle.join()) {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(err))) => {
            eprintln!("{}", err.report_line());
            process::exit(1);
        }
        Ok(Err(_)) => {
            eprintln!("The interpreter encountered an unexpected error and must exit.");
            process::exit(101);
        }
        Err(e) => {
            eprintln!("Could not start the evaluation thread: {e}");
            process::exit(1);
        }
    };
    interpreter.terminate(status)
}

/// Run whatever the arguments select. Returns the interpreter so the main
/// thread can release its arena on exit.
fn run(args: &Args, config: Config) -> Result<(Interpreter, i32), Error> {
    let mut interpreter = Interpreter::with_config(config)?;

    let status = if let Some(source) = &args.eval {
        run_source(&mut interpreter, source)
    } else if let Some(path) = &args.file {
        match fs::read_to_string(path) {
            Ok(source) => run_source(&mut interpreter, &source),
            Err(e) => {
                eprintln!("Cannot read {}: {e}", path.display());
                1
            }
        }
    } else if args.repl || io::stdin().is_terminal() {
        match run_repl(&mut interpreter) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("REPL error: {e}");
                1
            }
        }
    } else {
        let mut source = String::new();
        match io::stdin().read_to_string(&mut source) {
            Ok(_) => run_source(&mut interpreter, &source),
            Err(e) => {
                eprintln!("Cannot read standard input: {e}");
                1
            }
        }
    };

    Ok((interpreter, status))
}

fn run_source(interpreter: &mut Interpreter, source: &str) -> i32 {
    let mut out = io::stdout().lock();
    let status = interpreter.run_reporting(source, &mut out);
    if let Err(e) = out.flush() {
        warn!(error = %e, "could not flush standard output");
    }
    status
}

fn run_repl(interpreter: &mut Interpreter) -> rustyline::Result<()> {
    println!("arenascheme REPL");
    println!("Type :help for commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline("arenascheme> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => print_help(),
                    ":env" => print_environment(interpreter),
                    ":stats" => println!("Arena: {}", interpreter.stats()),
                    ":reset" => match interpreter.reset() {
                        Ok(()) => println!("Session reset."),
                        Err(err) => println!("{}", err.report_line()),
                    },
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => eval_line(interpreter, line),
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Evaluate every form on the line, printing non-void results. A fatal error
/// ends the session and starts a fresh one.
fn eval_line(interpreter: &mut Interpreter, line: &str) {
    let outcome = interpreter.read(line).and_then(|mut forms| {
        while let Value::Pair(cell) = forms {
            let result = interpreter.eval(interpreter.arena().car(cell))?;
            if !result.is_void() {
                println!("{}", interpreter.display(result));
            }
            forms = interpreter.arena().cdr(cell);
        }
        Ok(())
    });

    if let Err(err) = outcome {
        println!("{}", err.report_line());
        match interpreter.reset() {
            Ok(()) => println!("(session reset)"),
            Err(err) => println!("{}", err.report_line()),
        }
    }
}

fn print_help() {
    println!("arenascheme REPL commands:");
    println!("  :help   - Show this help message");
    println!("  :env    - Show top-level bindings");
    println!("  :stats  - Show arena block counts");
    println!("  :reset  - Release the arena and start a fresh session");
    println!("  :quit   - Exit the interpreter");
    println!("  Ctrl+D  - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote if define lambda let let* letrec cond set! begin and or");
    println!("Primitives:");
    println!("  + - * / modulo < > = car cdr cons null?");
    println!();
    println!("Examples:");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (square 12)");
    println!("  (let* ((x 1) (y (+ x 1))) (cons x y))");
    println!();
}

fn print_environment(interpreter: &Interpreter) {
    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in interpreter.bindings() {
        match value {
            Value::Primitive(_) => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !primitives.is_empty() {
        println!("Primitives ({}):", primitives.len());
        for row in primitives.chunks(6) {
            let names: Vec<String> = row.iter().map(|name| format!("{name:<10}")).collect();
            println!("  {}", names.concat().trim_end());
        }
        println!();
    }

    if user_defined.is_empty() {
        println!("No user definitions.");
    } else {
        println!("User definitions ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {}", interpreter.display(value));
        }
    }
}

use std::{
    io::{stdout, Write},
    path::PathBuf,
};

use clap::Parser;
use miette::miette;
use rustyline::{error::ReadlineError, DefaultEditor};
use thimble::{dump, Error, Forth, ForthParams, Step};
use tracing::debug;

/// A tiny forth machine.
///
/// Sources are consumed in order: inline text from `-c`, then each FILE,
/// then (with `-i`, or when no other source was given) an interactive REPL.
#[derive(Debug, Parser)]
#[clap(about, version)]
struct App {
    /// Arena size in bytes.
    #[clap(short = 'm', long, default_value_t = ForthParams::default().mem_bytes)]
    mem: usize,

    /// Evaluate TEXT before any files.
    #[clap(short = 'c', long, value_name = "TEXT")]
    eval: Option<String>,

    /// Enter the REPL after all other sources are consumed.
    #[clap(short, long)]
    interactive: bool,

    /// Source files, consumed in order.
    files: Vec<PathBuf>,

    /// Tracing filter for VM internals.
    #[clap(
        long = "trace",
        alias = "log",
        env = "RUST_LOG",
        default_value = "warn",
        global = true
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

fn main() -> miette::Result<()> {
    use tracing_subscriber::prelude::*;

    let app = App::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().without_time())
        .with(app.trace_filter.clone())
        .init();

    let interactive = app.interactive || (app.eval.is_none() && app.files.is_empty());

    let mut forth = Forth::new(ForthParams {
        mem_bytes: app.mem,
        ..Default::default()
    })
    .map_err(|e| miette!("cannot bring up the VM: {e:?}"))?;

    if let Some(text) = &app.eval {
        forth.input.push_text(text);
    }
    for path in &app.files {
        forth
            .input
            .push_file(path)
            .map_err(|e| miette!("cannot open {}: {e:?}", path.display()))?;
    }

    // Batch phase: everything queued so far is fatal on error.
    run_to_end(&mut forth).map_err(|e| fatal(&forth, e))?;

    if interactive {
        repl(&mut forth)?;
    }
    Ok(())
}

/// Interpret until the queued input runs dry, draining output as it appears.
fn run_to_end(forth: &mut Forth) -> Result<(), Error> {
    loop {
        let step = forth.interpret_one()?;
        drain(forth);
        if step == Step::Done {
            return Ok(());
        }
    }
}

fn drain(forth: &mut Forth) {
    let text = forth.output.as_str();
    if !text.is_empty() {
        print!("{text}");
        let _ = stdout().flush();
        forth.output.clear();
    }
}

/// Report an error the way the VM wants to die: state dump to stderr, then a
/// diagnostic.
fn fatal(forth: &Forth, err: Error) -> miette::Report {
    let mut text = String::new();
    if dump::write_dump(&mut text, forth).is_ok() {
        eprintln!("{text}");
    }
    miette!("fatal: {err:?}")
}

fn repl(forth: &mut Forth) -> miette::Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| miette!("readline: {e}"))?;
    let history = dirs::home_dir().map(|home| home.join(".threpl_history"));
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline(" ok ") {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                forth.input.push_text(&line);
                match run_to_end(forth) {
                    Ok(()) => {}
                    Err(err) => {
                        // Interactive errors are survivable: report, reset,
                        // keep the dictionary.
                        drain(forth);
                        eprintln!("error: {err:?}");
                        debug!(?err, "line failed");
                        if forth.reset().is_err() {
                            return Err(fatal(forth, err));
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(miette!("readline: {e}")),
        }
    }

    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

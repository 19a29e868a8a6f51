//! # Test Utilities
//!
//! Helpers for running "ui tests": forth source executed at test time, with
//! expectations written alongside the input.
//!
//! Each line of a ui test is one of the following:
//!
//! * Configuration values for the VM, specified as "frontmatter comments".
//!   These must appear before any other non-comment lines. Currently
//!   accepted:
//!     * `( mem_bytes USIZE )`
//!     * `( data_stack_cells N )`
//!     * `( return_stack_cells N )`
//!     * `( output_cap USIZE )`
//! * Comment lines: anything else of the `( ... )` shape.
//! * Input lines, starting with `> ...`, expected to succeed.
//! * Output lines, starting with `< ...`: the expected output of the most
//!   recent input line. Zero or more per input line; with none given, any
//!   output is accepted.
//! * Failing input lines, starting with `x ...`. These must make the
//!   interpreter return an `Err`, after which the VM is reset. There is no
//!   way to specify which error yet.
//!
//! ```rust
//! # use thimble::testutil::blocking_runtest;
//! #
//! # blocking_runtest(r#"
//! ( tiny data stack to show frontmatter at work )
//! ( data_stack_cells 8 )
//!
//! > : star 42 emit ;
//! > star
//! < *
//!
//! x starb
//! # "#)
//! ```

use crate::{
    vm::{Forth, ForthParams},
    Error,
};

/// Run the given forth ui test on a fresh VM, sized by the frontmatter.
pub fn blocking_runtest(contents: &str) {
    let tokd = tokenize(contents, true);
    let mut forth = Forth::new(tokd.settings).unwrap();
    steps_with(tokd.steps.as_slice(), &mut forth);
}

/// Run the given forth ui test against an existing VM.
///
/// Does not accept frontmatter configuration (will panic).
pub fn blocking_runtest_with(forth: &mut Forth, contents: &str) {
    let tokd = tokenize(contents, false);
    steps_with(tokd.steps.as_slice(), forth);
}

fn steps_with(steps: &[Step], forth: &mut Forth) {
    for Step { input, output: outcome } in steps {
        println!("> {input}");
        forth.input.push_text(input);
        let res = forth.interpret();
        check_output(&res, outcome, forth.output.as_str());
        forth.output.clear();
        if res.is_err() {
            forth.reset().unwrap();
        }
    }
}

fn check_output(res: &Result<(), Error>, outcome: &Outcome, output: &str) {
    println!("< {output}");
    match (res, outcome) {
        (Ok(()), Outcome::OkAnyOutput) => {}
        (Ok(()), Outcome::OkWithOutput(exp)) => {
            let act_lines = output.lines().collect::<Vec<&str>>();
            assert_eq!(act_lines.len(), exp.len());
            act_lines.iter().zip(exp.iter()).for_each(|(a, e)| {
                assert_eq!(a.trim_end(), e.trim_end());
            })
        }
        (Err(_e), Outcome::FatalError) => {}
        (res, exp) => {
            eprintln!("Error!");
            eprintln!("Expected: {exp:?}");
            eprintln!("Got: {res:?}");
            if res.is_ok() {
                eprintln!("Output:\n{output}");
            }
            panic!();
        }
    }
}

#[derive(Debug)]
enum Outcome {
    OkAnyOutput,
    OkWithOutput(Vec<String>),
    FatalError,
}

#[derive(Debug)]
struct Step {
    input: String,
    output: Outcome,
}

#[derive(Debug)]
struct Tokenized {
    settings: ForthParams,
    steps: Vec<Step>,
}

fn tokenize(contents: &str, allow_frontmatter: bool) -> Tokenized {
    let mut output = Tokenized {
        settings: ForthParams::default(),
        steps: Vec::new(),
    };
    let mut frontmatter_done = !allow_frontmatter;

    for line in contents.lines() {
        let (tok, remain) = match line.trim_start().split_once(' ') {
            Some(t) => t,
            None => continue,
        };

        match tok {
            ">" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::OkAnyOutput,
                });
            }
            "<" => {
                frontmatter_done = true;
                let cur_step = output.steps.last_mut().unwrap();
                let expected = remain.to_string();
                match &mut cur_step.output {
                    Outcome::OkAnyOutput => {
                        cur_step.output = Outcome::OkWithOutput(vec![expected]);
                    }
                    Outcome::OkWithOutput(o) => o.push(expected),
                    Outcome::FatalError => panic!("Fatal error can't set output"),
                }
            }
            "x" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::FatalError,
                });
            }
            "(" => {
                let mut split = remain.split_whitespace();
                let mut is_comment = false;
                match split.next() {
                    Some("mem_bytes") => {
                        output.settings.mem_bytes = split.next().unwrap().parse().unwrap();
                    }
                    Some("data_stack_cells") => {
                        output.settings.data_stack_cells = split.next().unwrap().parse().unwrap();
                    }
                    Some("return_stack_cells") => {
                        output.settings.return_stack_cells =
                            split.next().unwrap().parse().unwrap();
                    }
                    Some("output_cap") => {
                        output.settings.output_cap = split.next().unwrap().parse().unwrap();
                    }
                    Some(_) => {
                        is_comment = true;
                    }
                    None => panic!(),
                }
                if !is_comment {
                    assert!(!frontmatter_done, "Unexpected frontmatter settings!");
                    assert_eq!(Some(")"), split.next());
                }
            }
            _ => {}
        }
    }

    output
}

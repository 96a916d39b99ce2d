use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use schemer::scheduler::{Defer, Scheduler, TurnOutcome, View};

/// Console rendering of the view contract: results go to stdout with a
/// blank line between them; enable/disable need no affordance because the
/// prompt only returns once the scheduler idles.
#[derive(Default)]
struct ConsoleView {
    printed_any: bool,
}

impl View for ConsoleView {
    fn clear(&mut self) {
        self.printed_any = false;
    }

    fn print(&mut self, text: &str) {
        if self.printed_any {
            println!();
        }
        println!("{text}");
        self.printed_any = true;
    }

    fn enable(&mut self) {}

    fn disable(&mut self) {}
}

/// The console's deferred-callback facility: scheduled turns queue up and
/// the driver loop below drains them.
#[derive(Default)]
struct TurnQueue {
    pending: usize,
}

impl Defer for TurnQueue {
    fn schedule_soon(&mut self) {
        self.pending += 1;
    }
}

impl TurnQueue {
    fn take(&mut self) -> bool {
        if self.pending > 0 {
            self.pending -= 1;
            true
        } else {
            false
        }
    }
}

fn print_help() {
    println!("Enter expressions like: (+ 1 2)");
    println!("Forms: quote if lambda letcc define set! begin apply");
    println!("Builtins: + * - < > add1 sub1 not list cons car cdr eq? null? atom?");
    println!();
    println!("  :help   show this message");
    println!("  Ctrl-D  exit");
}

fn main() {
    env_logger::init();

    println!("Schemer - a small Scheme with escape continuations");
    println!("Enter expressions like: (letcc k (+ 1 (k 42)))");
    println!("Type :help for more, or Ctrl-D to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("could not initialize line editor");
    let mut scheduler = Scheduler::new();
    let mut view = ConsoleView::default();
    let mut queue = TurnQueue::default();

    loop {
        match rl.readline("schemer> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line == ":help" {
                    print_help();
                    continue;
                }

                let mut outcome = scheduler.start(line, &mut view, &mut queue);
                while outcome == TurnOutcome::Yielded && queue.take() {
                    outcome = scheduler.turn(&mut view, &mut queue);
                }
            }
            Err(ReadlineError::Interrupted) => {
                scheduler.interrupt(&mut view);
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error reading input: {err}");
                break;
            }
        }
    }
}

use std::error::Error;
use std::io::{self, Write};

use clap::Args;
use segeval_core::QUESTION_COUNT;
use segeval_exp::{
    Collaborators, Confirmer, DatasetHandle, DisplaySurface, ExperimentController,
    FileProbeLoader, Navigation, NavigationOutcome, NoSurfaces, SlotView,
};
use tracing::info;

use crate::{boxed, ConfigArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Move between evaluations without asking for confirmation.
    #[arg(long)]
    pub yes: bool,
    /// Ignore an existing score table and start over.
    #[arg(long)]
    pub fresh: bool,
}

const HELP: &str = "commands: first | prev | next | last | score <q1> <q2> <q3> <q4> | q<n> <value> | save | status | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplCommand {
    Navigate(Navigation),
    Scores([i64; QUESTION_COUNT]),
    Score { question: usize, value: i64 },
    Save,
    Status,
    Help,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return Ok(ReplCommand::Empty);
    };
    let rest: Vec<&str> = tokens.collect();
    let command = match head.to_ascii_lowercase().as_str() {
        "first" => ReplCommand::Navigate(Navigation::First),
        "prev" | "previous" | "p" => ReplCommand::Navigate(Navigation::Previous),
        "next" | "n" => ReplCommand::Navigate(Navigation::Next),
        "last" => ReplCommand::Navigate(Navigation::Last),
        "save" | "s" => ReplCommand::Save,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        "score" => {
            if rest.len() != QUESTION_COUNT {
                return Err(format!("score expects {QUESTION_COUNT} values"));
            }
            let mut values = [0i64; QUESTION_COUNT];
            for (value, token) in values.iter_mut().zip(&rest) {
                *value = parse_value(token)?;
            }
            return Ok(ReplCommand::Scores(values));
        }
        other => {
            let question = other
                .strip_prefix('q')
                .and_then(|digits| digits.parse::<usize>().ok())
                .ok_or_else(|| format!("unknown command `{head}`, type help"))?;
            let [token] = rest.as_slice() else {
                return Err(format!("{head} expects one value"));
            };
            return Ok(ReplCommand::Score {
                question,
                value: parse_value(token)?,
            });
        }
    };
    if !rest.is_empty() {
        return Err(format!("{head} takes no arguments"));
    }
    Ok(command)
}

fn parse_value(token: &str) -> Result<i64, String> {
    token
        .parse::<i64>()
        .map_err(|_| format!("`{token}` is not an integer"))
}

/// Prints the blinded view of each dataset as it is shown.
struct ConsoleDisplay;

impl DisplaySurface for ConsoleDisplay {
    fn set_busy(&mut self, busy: bool) {
        if busy {
            eprintln!("loading...");
        }
    }

    fn show(&mut self, view: &SlotView, _volume: DatasetHandle, _segmentation: DatasetHandle) {
        let marker = if view.scored { " (scored)" } else { "" };
        println!(
            "evaluation {} of {}: {}{marker}",
            view.evaluation, view.total, view.volume_file
        );
    }

    fn clear(&mut self) {}
}

/// Asks on stderr and reads the answer from stdin.
struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&mut self, _navigation: Navigation, question: &str) -> bool {
        eprint!("{question} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = args.config.resolve()?;
    if args.yes {
        config.confirm_navigation = false;
    }
    if args.fresh {
        config.resume = false;
    }
    let collaborators = Collaborators {
        loader: Box::new(FileProbeLoader::default()),
        surfaces: Box::new(NoSurfaces),
        display: Box::new(ConsoleDisplay),
        confirmer: Box::new(PromptConfirmer),
    };
    let mut controller = ExperimentController::new(config, collaborators);
    let report = controller.launch().map_err(boxed)?;
    if report.resumed {
        println!(
            "resumed seed {}: {} of {} evaluations already scored",
            report.seed, report.scored, report.total_evaluations
        );
    } else {
        println!(
            "started seed {} with {} evaluations",
            report.seed, report.total_evaluations
        );
    }
    println!("{HELP}");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print_prompt(&controller)?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let command = match parse_command(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        if let Err(err) = execute(&mut controller, command) {
            eprintln!("error: {err}");
        }
    }

    if let Some(progress) = controller.progress() {
        info!(scored = progress.scored, total = progress.total_evaluations, "session ended");
        println!(
            "{} of {} evaluations scored",
            progress.scored, progress.total_evaluations
        );
    }
    controller.teardown();
    Ok(())
}

fn print_prompt(controller: &ExperimentController) -> io::Result<()> {
    let mut stdout = io::stdout();
    if let (Some(progress), Some(draft)) = (controller.progress(), controller.draft_scores()) {
        let [q1, q2, q3, q4] = draft.values();
        write!(
            stdout,
            "[{}/{} q={q1},{q2},{q3},{q4}] > ",
            progress.current_evaluation, progress.total_evaluations
        )?;
    }
    stdout.flush()
}

fn execute(
    controller: &mut ExperimentController,
    command: ReplCommand,
) -> Result<(), Box<dyn Error>> {
    match command {
        ReplCommand::Navigate(navigation) => {
            match controller.navigate(navigation).map_err(boxed)? {
                NavigationOutcome::Moved { export_error, .. } => {
                    if let Some(err) = export_error {
                        eprintln!("warning: scores kept in memory only: {err}");
                    }
                }
                NavigationOutcome::AlreadyFirst => println!("already at the first evaluation"),
                NavigationOutcome::AlreadyLast => println!("already at the last evaluation"),
                NavigationOutcome::Declined => println!("staying on this evaluation"),
            }
        }
        ReplCommand::Scores(values) => controller.set_scores(values).map_err(boxed)?,
        ReplCommand::Score { question, value } => {
            controller.set_score(question, value).map_err(boxed)?
        }
        ReplCommand::Save => {
            controller.save().map_err(boxed)?;
            println!("saved");
        }
        ReplCommand::Status => {
            if let Some(progress) = controller.progress() {
                println!(
                    "evaluation {} of {}, {} scored ({:.0}%)",
                    progress.current_evaluation,
                    progress.total_evaluations,
                    progress.scored,
                    100.0 * progress.scored as f64 / progress.total_evaluations as f64
                );
            }
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit | ReplCommand::Empty => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation_and_scores() {
        assert_eq!(
            parse_command("next"),
            Ok(ReplCommand::Navigate(Navigation::Next))
        );
        assert_eq!(
            parse_command("  Prev \n"),
            Ok(ReplCommand::Navigate(Navigation::Previous))
        );
        assert_eq!(
            parse_command("score 3 4 2 5"),
            Ok(ReplCommand::Scores([3, 4, 2, 5]))
        );
        assert_eq!(
            parse_command("q2 4"),
            Ok(ReplCommand::Score {
                question: 2,
                value: 4
            })
        );
        assert_eq!(parse_command(""), Ok(ReplCommand::Empty));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_command("score 1 2 3").is_err());
        assert!(parse_command("score 1 2 x 4").is_err());
        assert!(parse_command("q3").is_err());
        assert!(parse_command("next 2").is_err());
        assert!(parse_command("jump").is_err());
    }
}

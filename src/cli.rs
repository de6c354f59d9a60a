use std::path::PathBuf;
use std::time::Duration;

use humantime::parse_duration;
use structopt::clap::{self, AppSettings};
use structopt::StructOpt;

use crate::model::ResizePolicy;

/// Commands typed during a session. Tasks are addressed by the position
/// shown by `list`, starting at 1.
#[derive(Debug, PartialEq, StructOpt)]
#[structopt(
    name = "command",
    no_version,
    setting = AppSettings::NoBinaryName,
    setting = AppSettings::DisableHelpFlags,
    setting = AppSettings::VersionlessSubcommands
)]
pub enum Command {
    /// Set how many task slots the day has (1-10).
    #[structopt(alias = "resize")]
    Count {
        #[structopt()]
        count: usize,
    },
    /// Start the focus timer of a task, pausing any other.
    Start {
        #[structopt()]
        position: usize,
    },
    /// Pause the focus timer of a task.
    Pause {
        #[structopt()]
        position: usize,
    },
    /// Start a paused task or pause a running one.
    Toggle {
        #[structopt()]
        position: usize,
    },
    /// Mark a task as completed.
    Done {
        #[structopt()]
        position: usize,
    },
    /// Reopen a completed task. Its focus time starts over.
    Redo {
        #[structopt()]
        position: usize,
    },
    /// Replace the text of a task with the rest of the line. Nothing clears
    /// it.
    Text {
        #[structopt()]
        position: usize,

        #[structopt(allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Add a task slot, optionally with its text.
    Add {
        #[structopt(allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Remove a task slot.
    Rm {
        #[structopt()]
        position: usize,
    },
    /// List the tasks of the day.
    List,
    /// Show the focus time and progress of the day.
    Summary,
    /// End the session.
    #[structopt(alias = "exit")]
    Quit,
}

/// What follows the first `tokens` words of `line`, minus the single space
/// that separates it from them. Inner and trailing spacing is kept.
fn rest_of_line(line: &str, tokens: usize) -> &str {
    let mut rest = line.trim_start();
    for n in 0..tokens {
        if n > 0 {
            rest = rest.trim_start();
        }
        let end = rest.find(char::is_whitespace).unwrap_or_else(|| rest.len());
        rest = &rest[end..];
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.as_str(),
        _ => rest,
    }
}

fn as_typed(line: &str, tokens: usize) -> Vec<String> {
    match rest_of_line(line, tokens) {
        "" => Vec::new(),
        rest => vec![rest.to_string()],
    }
}

impl Command {
    /// Parse one input line. Blank lines yield no command. The text of
    /// `text` and `add` is kept as typed, as a single word.
    pub fn parse_line(line: &str) -> Result<Option<Command>, clap::Error> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        let command = match Command::from_iter_safe(words)? {
            Command::Text { position, .. } => Command::Text {
                position,
                words: as_typed(line, 2),
            },
            Command::Add { .. } => Command::Add {
                words: as_typed(line, 1),
            },
            command => command,
        };
        Ok(Some(command))
    }
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dayfocus",
    about = "A minimalistic daily focus tracker. Commands are read from standard input."
)]
pub struct CommandLineArgs {
    /// Use a different config file.
    #[structopt(parse(from_os_str), short, long)]
    pub config: Option<PathBuf>,

    /// Task slots to start the day with (1-10).
    #[structopt(short = "n", long)]
    pub tasks: Option<usize>,

    /// How often running timers are refreshed (parse_duration, e.g. "1s").
    #[structopt(long, parse(try_from_str = parse_duration))]
    pub tick: Option<Duration>,

    /// What shrinking the task count may drop: "truncate" or "keep-work".
    #[structopt(long)]
    pub resize_policy: Option<ResizePolicy>,

    /// Allow completing a task that has no focus time.
    #[structopt(long)]
    pub allow_empty_completion: bool,

    /// Keep a status line with the running timer up to date.
    #[structopt(long)]
    pub live: bool,

    /// Log more (-v debug, -vv trace). RUST_LOG is used otherwise.
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|word| word.to_string()).collect()
    }

    #[rstest]
    #[case("count 4", Command::Count { count: 4 })]
    #[case("resize 2", Command::Count { count: 2 })]
    #[case("start 1", Command::Start { position: 1 })]
    #[case("pause 3", Command::Pause { position: 3 })]
    #[case("toggle 2", Command::Toggle { position: 2 })]
    #[case("done 2", Command::Done { position: 2 })]
    #[case("redo 2", Command::Redo { position: 2 })]
    #[case("rm 5", Command::Rm { position: 5 })]
    #[case("list", Command::List)]
    #[case("summary", Command::Summary)]
    #[case("quit", Command::Quit)]
    #[case("exit", Command::Quit)]
    fn parses_commands(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(Command::parse_line(line).unwrap(), Some(expected));
    }

    #[test]
    fn text_takes_the_rest_of_the_line_as_typed() {
        assert_eq!(
            Command::parse_line("  text 2   Write the  report ").unwrap(),
            Some(Command::Text {
                position: 2,
                words: words(&["  Write the  report "]),
            })
        );
        assert_eq!(
            Command::parse_line("text 1").unwrap(),
            Some(Command::Text {
                position: 1,
                words: vec![],
            })
        );
        assert_eq!(
            Command::parse_line("text 1    ").unwrap(),
            Some(Command::Text {
                position: 1,
                words: words(&["   "]),
            })
        );
        assert_eq!(
            Command::parse_line("add call  mum").unwrap(),
            Some(Command::Add {
                words: words(&["call  mum"]),
            })
        );
    }

    #[test]
    fn blank_lines_are_not_commands() {
        assert_eq!(Command::parse_line("   ").unwrap(), None);
    }

    #[rstest]
    #[case("bogus")]
    #[case("start")]
    #[case("start first")]
    fn rejects_bad_lines(#[case] line: &str) {
        assert!(Command::parse_line(line).is_err());
    }

    #[test]
    fn help_is_reported_as_a_message() {
        let err = Command::parse_line("help").unwrap_err();
        assert_eq!(err.kind, clap::ErrorKind::HelpDisplayed);
        assert!(err.message.contains("start"));
    }

    #[test]
    fn process_arguments() {
        let args = CommandLineArgs::from_iter_safe(vec![
            "dayfocus",
            "-n",
            "3",
            "--tick",
            "500ms",
            "--resize-policy",
            "keep-work",
            "--live",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.tasks, Some(3));
        assert_eq!(args.tick, Some(Duration::from_millis(500)));
        assert_eq!(args.resize_policy, Some(ResizePolicy::KeepWork));
        assert!(args.live);
        assert!(!args.allow_empty_completion);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, None);
    }

    #[test]
    fn unknown_policy_is_a_usage_error() {
        let args = vec!["dayfocus", "--resize-policy", "shrink"];
        assert!(CommandLineArgs::from_iter_safe(args).is_err());
    }
}

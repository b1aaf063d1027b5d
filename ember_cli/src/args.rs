//! Command-line argument parser for the workload driver.
//!
//! Hand-rolled: the flag surface is tiny and the driver should start
//! without pulling in a parser dependency.

use crate::workload::SimulationMode;

/// Usage text printed for `--help` and on parse errors.
pub const USAGE: &str = "\
Usage: ember [OPTIONS]

Drive synthetic mutator traffic against the Ember heap manager.

Options:
  --threads <N,N,...>   Mutator thread counts to run (default: 1,2,5,10)
  --mode <MODE>         stress, relaxed, or both (default: both)
  --tls <N>             Thread-local stack roots per run (default: 5)
  --globals <N>         Global roots per run (default: 5)
  --registers <N>       Register roots per run (default: 5)
  -h, --help            Print this help and exit
  -V, --version         Print version and exit";

/// Parsed driver options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Mutator thread counts, one simulation batch per entry.
    pub thread_counts: Vec<usize>,
    /// Simulation modes to run, in order.
    pub modes: Vec<SimulationMode>,
    /// Thread-local stack roots per run.
    pub tls_roots: usize,
    /// Global roots per run.
    pub global_roots: usize,
    /// Register roots per run.
    pub register_roots: usize,
    /// `-h` / `--help` was given.
    pub print_help: bool,
    /// `-V` / `--version` was given.
    pub print_version: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            thread_counts: vec![1, 2, 5, 10],
            modes: vec![SimulationMode::Stress, SimulationMode::Relaxed],
            tls_roots: 5,
            global_roots: 5,
            register_roots: 5,
            print_help: false,
            print_version: false,
        }
    }
}

/// Argument parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    /// An unrecognized flag.
    UnknownFlag(String),
    /// A flag that requires a value was given none.
    MissingValue(String),
    /// A flag value that failed to parse.
    InvalidValue {
        /// The flag the value belongs to.
        flag: String,
        /// The offending value.
        value: String,
    },
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgsError::UnknownFlag(flag) => write!(f, "unknown flag '{flag}'"),
            ArgsError::MissingValue(flag) => write!(f, "flag '{flag}' requires a value"),
            ArgsError::InvalidValue { flag, value } => {
                write!(f, "invalid value '{value}' for flag '{flag}'")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

/// Parse driver options from an argument iterator (program name already
/// stripped).
pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Options, ArgsError> {
    let mut options = Options::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => options.print_help = true,
            "-V" | "--version" => options.print_version = true,
            "--threads" => {
                let value = expect_value(&arg, args.next())?;
                options.thread_counts = parse_count_list(&arg, &value)?;
            }
            "--mode" => {
                let value = expect_value(&arg, args.next())?;
                options.modes = parse_modes(&arg, &value)?;
            }
            "--tls" => options.tls_roots = parse_count(&arg, &expect_value(&arg, args.next())?)?,
            "--globals" => {
                options.global_roots = parse_count(&arg, &expect_value(&arg, args.next())?)?;
            }
            "--registers" => {
                options.register_roots = parse_count(&arg, &expect_value(&arg, args.next())?)?;
            }
            _ => return Err(ArgsError::UnknownFlag(arg)),
        }
    }

    Ok(options)
}

fn expect_value(flag: &str, value: Option<String>) -> Result<String, ArgsError> {
    value.ok_or_else(|| ArgsError::MissingValue(flag.to_owned()))
}

fn parse_count(flag: &str, value: &str) -> Result<usize, ArgsError> {
    value.parse().map_err(|_| ArgsError::InvalidValue {
        flag: flag.to_owned(),
        value: value.to_owned(),
    })
}

fn parse_count_list(flag: &str, value: &str) -> Result<Vec<usize>, ArgsError> {
    let counts: Vec<usize> = value
        .split(',')
        .map(|part| parse_count(flag, part.trim()))
        .collect::<Result<_, _>>()?;
    if counts.is_empty() || counts.contains(&0) {
        return Err(ArgsError::InvalidValue {
            flag: flag.to_owned(),
            value: value.to_owned(),
        });
    }
    Ok(counts)
}

fn parse_modes(flag: &str, value: &str) -> Result<Vec<SimulationMode>, ArgsError> {
    match value {
        "stress" => Ok(vec![SimulationMode::Stress]),
        "relaxed" => Ok(vec![SimulationMode::Relaxed]),
        "both" => Ok(vec![SimulationMode::Stress, SimulationMode::Relaxed]),
        _ => Err(ArgsError::InvalidValue {
            flag: flag.to_owned(),
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_strs(args: &[&str]) -> Result<Options, ArgsError> {
        parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let options = parse_strs(&[]).expect("parse");
        assert_eq!(options.thread_counts, vec![1, 2, 5, 10]);
        assert_eq!(options.modes.len(), 2);
        assert_eq!(options.tls_roots, 5);
    }

    #[test]
    fn test_threads_and_mode() {
        let options = parse_strs(&["--threads", "2,4", "--mode", "relaxed"]).expect("parse");
        assert_eq!(options.thread_counts, vec![2, 4]);
        assert_eq!(options.modes, vec![SimulationMode::Relaxed]);
    }

    #[test]
    fn test_root_counts() {
        let options =
            parse_strs(&["--tls", "3", "--globals", "0", "--registers", "7"]).expect("parse");
        assert_eq!(options.tls_roots, 3);
        assert_eq!(options.global_roots, 0);
        assert_eq!(options.register_roots, 7);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_strs(&["--frobnicate"]),
            Err(ArgsError::UnknownFlag(_))
        ));
        assert!(matches!(
            parse_strs(&["--threads"]),
            Err(ArgsError::MissingValue(_))
        ));
        assert!(matches!(
            parse_strs(&["--threads", "0"]),
            Err(ArgsError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_strs(&["--mode", "chaotic"]),
            Err(ArgsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_help_and_version_flags() {
        assert!(parse_strs(&["--help"]).expect("parse").print_help);
        assert!(parse_strs(&["-V"]).expect("parse").print_version);
    }
}

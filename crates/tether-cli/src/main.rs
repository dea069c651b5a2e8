use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tether_runtime::{Arg, MarshalError, ReturnKind};
use tether_config::MAX_ARGUMENTS_LIMIT;

mod commands;
mod settings;

/// Call native library functions by name.
///
/// Tether resolves an exported function from a shared library at run time and
/// calls it with arguments given on the command line, through one generic call
/// path and without compiled glue.
///
/// EXAMPLES:
///     tether call c strlen str:hello                Call strlen("hello")
///     tether call m sin --returns double f64:2.0    Call sin(2.0)
///     tether tour                                   Walk through the bridge against libc
///     tether config                                 Show the effective configuration
///
/// ENVIRONMENT VARIABLES:
///     TETHER_LIBRARY_PATH          Extra library directories, searched first
///     TETHER_MAX_ARGUMENTS         Override dispatch.max_arguments
///     TETHER_DEFAULT_CONVENTION    Override dispatch.default_convention
///     RUST_LOG                     Log filter (overrides --verbose)
#[derive(Parser)]
#[command(name = "tether")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Use this configuration file instead of searching for tether.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a function and call it once
    ///
    /// Arguments are written as TAG:VALUE. The return type and the argument
    /// types must match the function's real signature; tether cannot check them.
    ///
    /// ARGUMENT TAGS:
    ///     i32:-5    i64:9000000000    f32:1.5    f64:2.0
    ///     str:text  ptr:0x7f00        null
    ///
    /// EXAMPLES:
    ///     tether call c abs i32:-42
    ///     tether call c getenv --returns pointer --read-string str:HOME
    ///     tether call ./libvendor.so vendor_init --convention JNI
    #[command(visible_alias = "c")]
    Call {
        /// Library name, alias, or path
        library: String,
        /// Exported symbol name
        symbol: String,
        /// Return type: int, long, void, float, double, pointer
        #[arg(long, short = 'r', default_value = "int")]
        returns: ReturnKind,
        /// Calling convention token (C or JNI)
        #[arg(long)]
        convention: Option<String>,
        /// Override the configured argument limit
        #[arg(long, value_name = "N", value_parser = parse_max_args)]
        max_args: Option<usize>,
        /// Print a pointer result as the C string it points to
        #[arg(long)]
        read_string: bool,
        /// Arguments as TAG:VALUE
        #[arg(allow_hyphen_values = true, value_parser = parse_arg)]
        args: Vec<Arg>,
    },

    /// Walk through the bridge against the C library
    ///
    /// Calls puts, time, ctime, sin, clock and qsort (with a Rust comparator)
    /// and prints what each returns.
    Tour,

    /// Show the effective configuration
    ///
    /// Prints the merged global, project and environment settings as a
    /// tether.toml document.
    ///
    /// EXAMPLES:
    ///     tether config                  Print effective settings
    ///     tether config --global-path    Print the global config file location
    Config {
        /// Print the global configuration file path instead
        #[arg(long)]
        global_path: bool,
    },

    /// Generate shell completions
    ///
    /// EXAMPLES:
    ///     tether completions bash > ~/.bash_completions/tether.bash
    ///     tether completions zsh > ~/.zfunc/_tether
    ///     tether completions fish > ~/.config/fish/completions/tether.fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a TAG:VALUE argument; `Arg` also converts from a plain `String`,
/// which clap would otherwise pick
fn parse_arg(s: &str) -> Result<Arg, MarshalError> {
    s.parse()
}

fn parse_max_args(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a whole number", s))?;
    if value == 0 || value > MAX_ARGUMENTS_LIMIT {
        return Err(format!("must be between 1 and {}", MAX_ARGUMENTS_LIMIT));
    }
    Ok(value)
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Call {
            library,
            symbol,
            returns,
            convention,
            max_args,
            read_string,
            args,
        } => {
            let config = settings::load(cli.config.as_deref())?;
            let call_args = commands::call::CallArgs {
                library,
                symbol,
                returns,
                convention,
                max_arguments: max_args,
                read_string,
                args,
            };
            commands::call::run(call_args, &config)?;
        }
        Commands::Tour => {
            let config = settings::load(cli.config.as_deref())?;
            commands::tour::run(&config)?;
        }
        Commands::Config { global_path } => {
            if global_path {
                commands::config::run_global_path()?;
            } else {
                let config = settings::load(cli.config.as_deref())?;
                commands::config::run(&config)?;
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_call_parses_tagged_args() {
        let cli = Cli::parse_from(["tether", "call", "c", "abs", "i32:-42", "null"]);
        match cli.command {
            Commands::Call {
                library,
                symbol,
                returns,
                args,
                ..
            } => {
                assert_eq!(library, "c");
                assert_eq!(symbol, "abs");
                assert_eq!(returns, ReturnKind::Int);
                assert_eq!(args, vec![Arg::Int(-42), Arg::Null]);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_return_and_convention_flags() {
        let cli = Cli::parse_from([
            "tether",
            "call",
            "m",
            "sin",
            "--returns",
            "double",
            "--convention",
            "JNI",
            "--max-args",
            "4",
            "f64:2.0",
        ]);
        match cli.command {
            Commands::Call {
                returns,
                convention,
                max_args,
                args,
                ..
            } => {
                assert_eq!(returns, ReturnKind::Double);
                assert_eq!(convention.as_deref(), Some("JNI"));
                assert_eq!(max_args, Some(4));
                assert_eq!(args, vec![Arg::Double(2.0)]);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_rejects_unknown_tag() {
        let result = Cli::try_parse_from(["tether", "call", "c", "abs", "u8:1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_call_args_keep_their_tags() {
        let cli = Cli::parse_from([
            "tether", "call", "c", "f", "str:i32:1", "i64:-9", "f32:1.5", "ptr:0x10",
        ]);
        match cli.command {
            Commands::Call { args, .. } => {
                assert_eq!(args.len(), 4);
                assert_eq!(args[0], Arg::Str("i32:1".to_string()));
                assert_eq!(args[1], Arg::Long(-9));
                assert_eq!(args[2], Arg::Float(1.5));
                assert!(!matches!(args[3], Arg::Str(_)));
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_max_args_range() {
        for rejected in ["0", "256", "-1", "many"] {
            let result =
                Cli::try_parse_from(["tether", "call", "c", "abs", "--max-args", rejected]);
            assert!(result.is_err(), "--max-args {} was accepted", rejected);
        }
        for accepted in ["1", "255"] {
            let result =
                Cli::try_parse_from(["tether", "call", "c", "abs", "--max-args", accepted]);
            assert!(result.is_ok(), "--max-args {} was rejected", accepted);
        }
    }

    #[test]
    fn test_call_rejects_unknown_return_kind() {
        let result = Cli::try_parse_from(["tether", "call", "c", "abs", "--returns", "struct"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_alias_c_for_call() {
        let cli = Cli::parse_from(["tether", "c", "c", "clock", "-r", "long"]);
        assert!(matches!(
            cli.command,
            Commands::Call {
                returns: ReturnKind::Long,
                ..
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tether", "tour", "--verbose", "--config", "x.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Tour));
    }

    #[test]
    fn test_config_global_path_flag() {
        let cli = Cli::parse_from(["tether", "config", "--global-path"]);
        assert!(matches!(cli.command, Commands::Config { global_path: true }));
    }

    #[test]
    fn test_completions_shell() {
        let cli = Cli::parse_from(["tether", "completions", "zsh"]);
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Zsh),
            _ => panic!("Expected Completions command"),
        }
    }
}

//! Call command - resolve a native function and call it once

use anyhow::{bail, Context, Result};
use log::debug;
use tether_config::Config;
use tether_runtime::{Arg, DynamicSymbol, NativePointer, ReturnKind, ReturnValue};

/// Arguments for a single ad-hoc call
#[derive(Debug, Clone)]
pub struct CallArgs {
    pub library: String,
    pub symbol: String,
    pub returns: ReturnKind,
    /// Convention token; the configured default when absent
    pub convention: Option<String>,
    /// Override for the configured argument cap
    pub max_arguments: Option<usize>,
    /// Read a pointer result as a NUL-terminated string
    pub read_string: bool,
    pub args: Vec<Arg>,
}

/// Resolve and call, printing the result to stdout
pub fn run(args: CallArgs, config: &Config) -> Result<()> {
    let output = call(&args, config)?;
    if let Some(line) = output {
        println!("{}", line);
    }
    Ok(())
}

/// Resolve and call; returns the text to print, `None` for void results
pub fn call(args: &CallArgs, config: &Config) -> Result<Option<String>> {
    if args.read_string && args.returns != ReturnKind::Pointer {
        bail!("--read-string requires --returns pointer");
    }

    let mut settings = crate::settings::bridge_settings(config)?;
    if let Some(max) = args.max_arguments {
        settings.max_arguments = max;
    }
    tether_runtime::init(settings);

    let convention = args
        .convention
        .as_deref()
        .unwrap_or_else(|| config.default_convention());
    let symbol = DynamicSymbol::new(&args.library, &args.symbol, convention)
        .with_context(|| format!("Failed to resolve {} in {}", args.symbol, args.library))?;

    debug!(
        "calling {}::{} with {} arguments returning {}",
        args.library,
        args.symbol,
        args.args.len(),
        args.returns.display_name()
    );

    // The user asserts the signature on the command line; nothing here can check it.
    let value = unsafe { symbol.call(args.returns, &args.args) }
        .with_context(|| format!("Call to {} failed", args.symbol))?;

    Ok(render(value, args.read_string))
}

fn render(value: ReturnValue, read_string: bool) -> Option<String> {
    match value {
        ReturnValue::Void => None,
        ReturnValue::Pointer(p) if read_string => {
            if p.is_null() {
                Some("(null)".to_string())
            } else {
                // The caller asked for a C string at this address.
                Some(unsafe { p.get_string(0) })
            }
        }
        other => Some(other.to_string()),
    }
}

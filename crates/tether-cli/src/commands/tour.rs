//! Tour command - a guided walk through the bridge against the C library
//!
//! Each step resolves a libc or libm function by name and calls it through
//! the shared dispatch path: a string argument, a null argument, a pointer
//! to a managed allocation, a double, and a Rust callback handed to `qsort`.

use anyhow::{ensure, Context, Result};
use std::io::Write;
use tether_config::Config;
use tether_runtime::{
    Arg, DynamicSymbol, ManagedAllocation, NativeCallback, NativePointer, ReturnKind, ReturnValue,
    ValueKind,
};

const LIBC: &str = "c";
const LIBM: &str = "m";

pub fn run(config: &Config) -> Result<()> {
    tether_runtime::init(crate::settings::bridge_settings(config)?);
    let mut out = std::io::stdout();

    greet(&mut out)?;
    let now = current_time(&mut out)?;
    format_time(&mut out, now)?;
    sine(&mut out)?;
    processor_time(&mut out)?;
    sort_with_callback(&mut out)?;

    Ok(())
}

fn symbol(library: &str, name: &str) -> Result<DynamicSymbol> {
    DynamicSymbol::native(library, name)
        .with_context(|| format!("Failed to resolve {} in {}", name, library))
}

/// `puts` writes through C stdio; flush it so output stays in order
fn greet(out: &mut impl Write) -> Result<()> {
    writeln!(out, "== puts(\"Hello from tether\")")?;
    out.flush()?;

    let puts = symbol(LIBC, "puts")?;
    let fflush = symbol(LIBC, "fflush")?;
    let written = unsafe { puts.call_int(&[Arg::from("Hello from tether")]) }?;
    unsafe { fflush.call_int(&[Arg::Null]) }?;

    ensure!(written >= 0, "puts reported an error ({})", written);
    Ok(())
}

fn current_time(out: &mut impl Write) -> Result<i64> {
    let time = symbol(LIBC, "time")?;
    let now = unsafe { time.call_long(&[Arg::Null]) }?;
    writeln!(out, "== time(NULL) = {}", now)?;
    Ok(now)
}

/// `ctime` reads a `time_t` through a pointer into a managed allocation
fn format_time(out: &mut impl Write, now: i64) -> Result<()> {
    let ctime = symbol(LIBC, "ctime")?;
    let text = ManagedAllocation::scoped(8, |slot| -> Result<String> {
        slot.set_long(0, now)?;
        let formatted = unsafe { ctime.call_pointer(&[Arg::from(&*slot)]) }?;
        ensure!(!formatted.is_null(), "ctime returned NULL");
        Ok(unsafe { formatted.get_string(0) })
    })?;
    writeln!(out, "== ctime(&now) = {}", text.trim_end())?;
    Ok(())
}

fn sine(out: &mut impl Write) -> Result<()> {
    let sin = symbol(LIBM, "sin")?;
    let value = unsafe { sin.call_double(&[Arg::Double(2.0)]) }?;
    writeln!(out, "== sin(2.0) = {}", value)?;
    Ok(())
}

fn processor_time(out: &mut impl Write) -> Result<()> {
    let clock = symbol(LIBC, "clock")?;
    let ticks = unsafe { clock.call_long(&[]) }?;
    writeln!(out, "== clock() = {}", ticks)?;
    Ok(())
}

fn sort_with_callback(out: &mut impl Write) -> Result<()> {
    let qsort = symbol(LIBC, "qsort")?;
    let compare = NativeCallback::new(
        vec![ValueKind::Pointer, ValueKind::Pointer],
        ReturnKind::Int,
        |args| match (args[0].as_pointer(), args[1].as_pointer()) {
            (Some(a), Some(b)) => {
                let (a, b) = unsafe { (a.get_int(0), b.get_int(0)) };
                ReturnValue::Int(a.cmp(&b) as i32)
            }
            _ => ReturnValue::Int(0),
        },
    );

    let values = [42i32, -7, 19, 0, 3];
    let sorted = ManagedAllocation::scoped(values.len() * 4, |array| -> Result<Vec<i32>> {
        array.copy_in(0, &values, 0, values.len())?;
        unsafe {
            qsort.call_void(&[
                Arg::from(&*array),
                Arg::size(values.len()),
                Arg::size(4),
                Arg::from(&compare),
            ])
        }?;
        let mut sorted = vec![0i32; values.len()];
        array.copy_out(0, &mut sorted, 0, values.len())?;
        Ok(sorted)
    })?;

    writeln!(out, "== qsort({:?}) = {:?}", values, sorted)?;
    Ok(())
}

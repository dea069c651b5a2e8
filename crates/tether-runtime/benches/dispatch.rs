//! Dispatch overhead benchmarks
//!
//! Measures the cost of the shared call path relative to the work done:
//! - Argument marshaling alone
//! - Calls with growing argument counts
//! - String arguments (transient buffer per call)
//! - Checked allocation access

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::os::raw::{c_char, c_int};
use tether_runtime::{
    Arg, CallDispatcher, CallingConvention, ManagedAllocation, MarshalContext, RawPointer,
    ReturnKind,
};

extern "C" fn sum4(a: c_int, b: c_int, c: c_int, d: c_int) -> c_int {
    a.wrapping_add(b).wrapping_add(c).wrapping_add(d)
}

extern "C" fn first_byte(s: *const c_char) -> c_int {
    unsafe { *s as c_int }
}

extern "C" fn count_args(
    a: c_int,
    b: c_int,
    c: c_int,
    d: c_int,
    e: c_int,
    f: c_int,
    g: c_int,
    h: c_int,
    i: c_int,
    j: c_int,
    k: c_int,
    l: c_int,
    m: c_int,
    n: c_int,
    o: c_int,
    p: c_int,
) -> c_int {
    a + b + c + d + e + f + g + h + i + j + k + l + m + n + o + p
}

// ============================================================================
// Marshaling
// ============================================================================

fn bench_marshal_mixed(c: &mut Criterion) {
    let args = vec![
        Arg::Int(1),
        Arg::Double(2.0),
        Arg::from("three"),
        Arg::Null,
        Arg::Long(5),
    ];
    c.bench_function("marshal_mixed_5", |b| {
        b.iter(|| {
            let mut ctx = MarshalContext::new();
            ctx.push_all(black_box(&args)).ok();
            black_box(ctx.ffi_args().len())
        });
    });
}

// ============================================================================
// Dispatch
// ============================================================================

fn bench_dispatch_ints(c: &mut Criterion) {
    let dispatcher = CallDispatcher::default();
    let function = RawPointer::from_ptr(sum4 as *const ());
    let args: Vec<Arg> = (1..=4).map(Arg::Int).collect();
    c.bench_function("dispatch_sum4", |b| {
        b.iter(|| unsafe {
            dispatcher.dispatch(
                function,
                CallingConvention::Native,
                black_box(&args),
                ReturnKind::Int,
            )
        });
    });
}

fn bench_dispatch_arg_count(c: &mut Criterion) {
    let dispatcher = CallDispatcher::default();
    let mut group = c.benchmark_group("dispatch_arg_count");
    let cases = [
        (4usize, RawPointer::from_ptr(sum4 as *const ())),
        (16, RawPointer::from_ptr(count_args as *const ())),
    ];
    for (count, function) in cases {
        let args: Vec<Arg> = (0..count as i32).map(Arg::Int).collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &args, |b, args| {
            b.iter(|| unsafe {
                dispatcher.dispatch(function, CallingConvention::Native, args, ReturnKind::Int)
            });
        });
    }
    group.finish();
}

fn bench_dispatch_string(c: &mut Criterion) {
    let dispatcher = CallDispatcher::default();
    let function = RawPointer::from_ptr(first_byte as *const ());
    let args = vec![Arg::from("a moderately long string argument")];
    c.bench_function("dispatch_string", |b| {
        b.iter(|| unsafe {
            dispatcher.dispatch(
                function,
                CallingConvention::Native,
                black_box(&args),
                ReturnKind::Int,
            )
        });
    });
}

// ============================================================================
// Checked access
// ============================================================================

fn bench_checked_access(c: &mut Criterion) {
    let mut alloc = match ManagedAllocation::allocate(4096) {
        Ok(alloc) => alloc,
        Err(_) => return,
    };
    c.bench_function("checked_set_get_int_1k", |b| {
        b.iter(|| {
            for i in 0..1024i64 {
                alloc.set_int(i * 4, i as i32).ok();
            }
            let mut sum = 0i64;
            for i in 0..1024i64 {
                sum += alloc.get_int(i * 4).unwrap_or(0) as i64;
            }
            black_box(sum)
        });
    });
    alloc.release();
}

criterion_group!(
    benches,
    bench_marshal_mixed,
    bench_dispatch_ints,
    bench_dispatch_arg_count,
    bench_dispatch_string,
    bench_checked_access
);
criterion_main!(benches);

//! Benchmarks for the reconstruction pipeline.
//!
//! Measures the stages that dominate on real bodies:
//! - Switch analysis over long comparison cascades
//! - Value-set algebra on fragmented sets
//! - Parenthesization of deep operator chains
//! - The full pipeline over a batch of bodies

extern crate cildecomp;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use cildecomp::{
    analysis::{LongInterval, LongSet, SwitchAnalysis},
    ast::{BinaryOperator, InsertParenthesesVisitor, SyntaxTree},
    il::{ComparisonKind, ILFunction, ILVariable, IlType, InstrId, MethodRef, PrimitiveType, Sign, VariableKind},
    pipeline::{decompile_all, Decompiler},
    settings::DecompilerSettings,
};
use std::hint::black_box;

/// `if (x == 0) C.Case0(); else if (x == 1) ... else C.Default();` with `cases` tests.
fn cascade(cases: i32) -> (ILFunction, InstrId) {
    let mut func = ILFunction::new("Dispatch");
    let body = func.body();
    let x = func.add_variable(ILVariable::new(
        VariableKind::Parameter,
        IlType::primitive(PrimitiveType::I4),
        "x",
    ));
    let call_block = |func: &mut ILFunction, name: String| {
        let call = func
            .call(MethodRef::static_method("C", &name, 0, IlType::Void), &[])
            .unwrap();
        let ret = func.ret(None).unwrap();
        func.block(&[call, ret]).unwrap()
    };

    let mut next = call_block(&mut func, "Default".to_string());
    let mut blocks = vec![next];
    for value in (0..cases).rev() {
        let target = call_block(&mut func, format!("Case{value}"));
        let load = func.ld_loc(x);
        let constant = func.ldc_i4(value);
        let cond = func
            .comp(ComparisonKind::Equality, Sign::None, load, constant)
            .unwrap();
        let to_target = func.branch(target);
        let if_inst = func.if_then(cond, to_target).unwrap();
        let to_next = func.branch(next);
        next = func.block(&[if_inst, to_next]).unwrap();
        blocks.push(target);
        blocks.push(next);
    }
    for &block in blocks.iter().rev() {
        func.add_child(body, block).unwrap();
    }
    (func, next)
}

/// Benchmark switch analysis of a 64-way equality cascade.
fn bench_switch_analysis_cascade(c: &mut Criterion) {
    let (func, root) = cascade(64);

    c.bench_function("switch_analysis_cascade_64", |b| {
        b.iter(|| {
            let mut analysis = SwitchAnalysis::new(false);
            let found = analysis.analyze_block(black_box(&func), black_box(root));
            black_box((found, analysis.sections().len()))
        });
    });
}

/// Benchmark union, complement and offset on sets of 256 intervals.
fn bench_longset_algebra(c: &mut Criterion) {
    let evens = LongSet::from_intervals((0..256).map(|i| LongInterval::new(i * 4, i * 4 + 1)));
    let odds = LongSet::from_intervals((0..256).map(|i| LongInterval::new(i * 4 + 2, i * 4 + 2)));

    c.bench_function("longset_algebra_256", |b| {
        b.iter(|| {
            let union = black_box(&evens).union_with(black_box(&odds));
            let shifted = union.invert().add_offset(black_box(-7));
            black_box(shifted.intersect_with(&evens))
        });
    });
}

/// Benchmark parenthesization of a 200-deep right-nested subtraction chain.
fn bench_parentheses_chain(c: &mut Criterion) {
    let build = || {
        let mut tree = SyntaxTree::new();
        let mut expr = tree.identifier("x0");
        for i in 1..200 {
            let left = tree.identifier(&format!("x{i}"));
            expr = tree.binary(left, BinaryOperator::Subtract, expr).unwrap();
        }
        tree.set_root(expr).unwrap();
        tree
    };

    c.bench_function("parentheses_chain_200", |b| {
        b.iter_batched(
            build,
            |mut tree| {
                let inserted = InsertParenthesesVisitor::readability().run(&mut tree).unwrap();
                black_box(inserted)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark the full pipeline on one 32-way cascade.
fn bench_pipeline_single(c: &mut Criterion) {
    let settings = DecompilerSettings::default();
    let decompiler = Decompiler::new(&settings);

    c.bench_function("pipeline_cascade_32", |b| {
        b.iter_batched(
            || cascade(32).0,
            |func| black_box(decompiler.decompile(func, None).unwrap().node_count()),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark the parallel batch driver on 64 bodies.
fn bench_pipeline_batch(c: &mut Criterion) {
    let settings = DecompilerSettings::default();

    c.bench_function("pipeline_batch_64x16", |b| {
        b.iter_batched(
            || (0..64).map(|_| cascade(16).0).collect::<Vec<_>>(),
            |functions| black_box(decompile_all(&settings, functions, None).len()),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_switch_analysis_cascade,
    bench_longset_algebra,
    bench_parentheses_chain,
    bench_pipeline_single,
    bench_pipeline_batch,
);
criterion_main!(benches);

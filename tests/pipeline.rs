//! Whole-pipeline behaviour: pass interplay, batches and cancellation.

use std::sync::atomic::AtomicBool;

use cildecomp::{analysis::make_set_where_comparison_is_true, prelude::*};

/// `i = 0; while (i < 10) { C.Tick(); i = i + 1; } return;` as a flat block graph.
fn counting_loop(name: &str) -> Result<ILFunction> {
    let mut func = ILFunction::new(name);
    let body = func.body();
    let i = func.add_variable(ILVariable::new(
        VariableKind::Local,
        IlType::primitive(PrimitiveType::I4),
        "i",
    ));

    let ret = func.ret(None)?;
    let exit = func.block(&[ret])?;

    let tick = func.call(MethodRef::static_method("C", "Tick", 0, IlType::Void), &[])?;
    let load = func.ld_loc(i);
    let one = func.ldc_i4(1);
    let add = func.binary(BinaryNumericOperator::Add, load, one)?;
    let increment = func.st_loc(i, add)?;
    let latch = func.block(&[tick, increment])?;

    let load = func.ld_loc(i);
    let ten = func.ldc_i4(10);
    let condition = func.comp(ComparisonKind::LessThan, Sign::Signed, load, ten)?;
    let to_latch = func.branch(latch);
    let test = func.if_then(condition, to_latch)?;
    let to_exit = func.branch(exit);
    let head = func.block(&[test, to_exit])?;

    let to_head = func.branch(head);
    func.add_child(latch, to_head)?;
    let zero = func.ldc_i4(0);
    let init = func.st_loc(i, zero)?;
    let to_head = func.branch(head);
    let entry = func.block(&[init, to_head])?;

    for block in [entry, head, latch, exit] {
        func.add_child(body, block)?;
    }
    Ok(func)
}

#[test]
fn test_counting_loop() -> Result<()> {
    let settings = DecompilerSettings::default();
    let tree = Decompiler::new(&settings).decompile(counting_loop("Count")?, None)?;
    assert_eq!(
        tree.to_text(),
        "static void Count() {\n    int i;\n    i = 0;\n    while (true) {\n        if (i < 10) {\n            C.Tick();\n            i++;\n            continue;\n        }\n        break;\n    }\n    return;\n}\n"
    );
    Ok(())
}

#[test]
fn test_pass_report() -> Result<()> {
    let settings = DecompilerSettings::default();
    let decompiler = Decompiler::new(&settings);
    let mut func = counting_loop("Count")?;
    let changed = decompiler.run_transforms(&mut func, None)?;
    assert_eq!(
        changed,
        vec!["loop-detection", "condition-detection", "compound-assignment"]
    );
    assert!(decompiler.run_transforms(&mut func, None)?.is_empty());
    Ok(())
}

#[test]
fn test_batch_matches_single_runs() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = DecompilerSettings::default();
    let names = ["A", "B", "C", "D", "E", "F"];
    let functions = names
        .iter()
        .map(|name| counting_loop(name))
        .collect::<Result<Vec<_>>>()?;
    let results = decompile_all(&settings, functions, None);
    assert_eq!(results.len(), names.len());

    let decompiler = Decompiler::new(&settings);
    for (result, name) in results.into_iter().zip(names) {
        let single = decompiler.decompile(counting_loop(name)?, None)?;
        assert_eq!(result?.to_text(), single.to_text());
    }
    Ok(())
}

#[test]
fn test_cancelled_batch() -> Result<()> {
    let settings = DecompilerSettings::default();
    let cancel = AtomicBool::new(true);
    let functions = vec![counting_loop("A")?, counting_loop("B")?];
    let results = decompile_all(&settings, functions, Some(&cancel));
    assert!(results
        .iter()
        .all(|result| matches!(result, Err(Error::Cancelled))));
    Ok(())
}

/// A container running `C.<name>()` and then leaving itself.
fn protected_region(func: &mut ILFunction, name: &str) -> Result<InstrId> {
    let container = func.container(ContainerKind::Normal);
    let call = func.call(MethodRef::static_method("C", name, 0, IlType::Void), &[])?;
    let leave = func.leave(container)?;
    let block = func.block(&[call, leave])?;
    func.add_child(container, block)?;
    Ok(container)
}

#[test]
fn test_try_finally_survives_the_pipeline() -> Result<()> {
    let mut func = ILFunction::new("Guarded");
    let body = func.body();
    let try_body = protected_region(&mut func, "Work")?;
    let handler = protected_region(&mut func, "Done")?;
    let try_finally = func.make(InstructionKind::TryFinally, &[try_body, handler])?;
    let ret = func.ret(None)?;
    let entry = func.block(&[try_finally, ret])?;
    func.add_child(body, entry)?;

    let settings = DecompilerSettings::default();
    let tree = Decompiler::new(&settings).decompile(func, None)?;
    assert_eq!(
        tree.to_text(),
        "static void Guarded() {\n    try {\n        C.Work();\n    } finally {\n        \
         C.Done();\n    }\n    return;\n}\n"
    );
    Ok(())
}

#[test]
fn test_comparison_sets_partition_the_domain() {
    let kinds = [
        ComparisonKind::Equality,
        ComparisonKind::LessThan,
        ComparisonKind::LessThanOrEqual,
        ComparisonKind::GreaterThan,
        ComparisonKind::GreaterThanOrEqual,
        ComparisonKind::Inequality,
    ];
    for sign in [Sign::Signed, Sign::Unsigned] {
        for kind in kinds {
            for value in [i64::MIN, -7, 0, 1, 42, i64::MAX] {
                let holds = make_set_where_comparison_is_true(kind, value, sign);
                let fails = make_set_where_comparison_is_true(kind.negate(), value, sign);
                assert!(!holds.overlaps(&fails), "{kind:?} {value} {sign:?}");
                assert!(holds.union_with(&fails).is_universe(), "{kind:?} {value} {sign:?}");
            }
        }
    }
}

#[test]
fn test_longset_laws() {
    let a = LongSet::from_intervals([
        LongInterval::new(-10, 0),
        LongInterval::new(5, 9),
    ]);
    let b = LongSet::inclusive(-3, 6);
    assert_eq!(a.invert().invert(), a);
    assert_eq!(
        a.union_with(&b).invert(),
        a.invert().intersect_with(&b.invert())
    );
    assert_eq!(a.except_with(&b), a.intersect_with(&b.invert()));
    assert!(a.intersect_with(&b).is_subset_of(&a));
    assert_eq!(a.add_offset(4).add_offset(-4), a);
    assert!(LongSet::universe().add_offset(i64::MAX).is_universe());
}

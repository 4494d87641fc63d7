//! Compound assignments and increments, end to end.

use cildecomp::{prelude::*, transforms::is_binary_compatible_with_type};

fn int() -> IlType {
    IlType::primitive(PrimitiveType::I4)
}

fn local(func: &mut ILFunction, name: &str, ty: IlType) -> VarId {
    func.add_variable(ILVariable::new(VariableKind::Local, ty, name))
}

/// `var = var op rhs`, detached; returns (store, binary).
fn self_update(
    func: &mut ILFunction,
    var: VarId,
    operator: BinaryNumericOperator,
    rhs: InstrId,
) -> Result<(InstrId, InstrId)> {
    let load = func.ld_loc(var);
    let binary = func.binary(operator, load, rhs)?;
    let store = func.st_loc(var, binary)?;
    Ok((store, binary))
}

/// Puts `statements` and a trailing `return` into the entry block of the body.
fn finish(func: &mut ILFunction, statements: &[InstrId]) -> Result<()> {
    let ret = func.ret(None)?;
    let entry = func.block(statements)?;
    func.add_child(entry, ret)?;
    let body = func.body();
    func.add_child(body, entry)
}

#[test]
fn test_pointer_offsets_must_be_element_multiples() -> Result<()> {
    let mut func = ILFunction::new("Advance");
    let p = local(&mut func, "p", IlType::pointer_to(int()));
    let q = local(&mut func, "q", IlType::pointer_to(int()));
    let four = func.ldc_i4(4);
    let (aligned, _) = self_update(&mut func, p, BinaryNumericOperator::Add, four)?;
    let three = func.ldc_i4(3);
    let (misaligned, _) = self_update(&mut func, q, BinaryNumericOperator::Add, three)?;
    finish(&mut func, &[aligned, misaligned])?;

    let settings = DecompilerSettings::default();
    let tree = Decompiler::new(&settings).decompile(func, None)?;
    assert_eq!(
        tree.to_text(),
        "static void Advance() {\n    int* p;\n    int* q;\n    p++;\n    q = q + 3;\n    return;\n}\n"
    );
    Ok(())
}

#[test]
fn test_gate_is_a_pure_query() -> Result<()> {
    let mut func = ILFunction::new("M");
    let ptr = IlType::pointer_to(int());
    let p = local(&mut func, "p", ptr.clone());
    let eight = func.ldc_i4(8);
    let (_, binary) = self_update(&mut func, p, BinaryNumericOperator::Add, eight)?;
    let settings = DecompilerSettings::default();
    let first = is_binary_compatible_with_type(&func, binary, &ptr, &settings);
    let second = is_binary_compatible_with_type(&func, binary, &ptr, &settings);
    assert!(first);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_local_updates() -> Result<()> {
    let mut func = ILFunction::new("Update");
    let x = local(&mut func, "x", int());
    let y = local(&mut func, "y", int());
    let five = func.ldc_i4(5);
    let (add, _) = self_update(&mut func, x, BinaryNumericOperator::Add, five)?;
    let one = func.ldc_i4(1);
    let (dec, _) = self_update(&mut func, y, BinaryNumericOperator::Sub, one)?;
    let two = func.ldc_i4(2);
    let (shift, _) = self_update(&mut func, x, BinaryNumericOperator::ShiftLeft, two)?;
    finish(&mut func, &[add, dec, shift])?;

    let settings = DecompilerSettings::default();
    let tree = Decompiler::new(&settings).decompile(func, None)?;
    assert_eq!(
        tree.to_text(),
        "static void Update() {\n    int x;\n    int y;\n    x += 5;\n    y--;\n    x <<= 2;\n    return;\n}\n"
    );
    Ok(())
}

#[test]
fn test_disabled_pass_keeps_expanded_form() -> Result<()> {
    let mut func = ILFunction::new("Update");
    let x = local(&mut func, "x", int());
    let five = func.ldc_i4(5);
    let (add, _) = self_update(&mut func, x, BinaryNumericOperator::Add, five)?;
    finish(&mut func, &[add])?;

    let settings = DecompilerSettings {
        compound_assignment: false,
        ..DecompilerSettings::default()
    };
    let tree = Decompiler::new(&settings).decompile(func, None)?;
    assert!(tree.to_text().contains("    x = x + 5;\n"));
    Ok(())
}

/// `t = v; v = t op step; return t;`
fn saved_update(name: &str, step: i32) -> Result<ILFunction> {
    let mut func = ILFunction::new(name);
    let t = local(&mut func, "t", int());
    let v = local(&mut func, "v", int());
    let load = func.ld_loc(v);
    let save = func.st_loc(t, load)?;
    let old = func.ld_loc(t);
    let rhs = func.ldc_i4(step);
    let add = func.binary(BinaryNumericOperator::Add, old, rhs)?;
    let store = func.st_loc(v, add)?;
    let result = func.ld_loc(t);
    let ret = func.ret(Some(result))?;
    let entry = func.block(&[save, store, ret])?;
    let body = func.body();
    func.add_child(body, entry)?;
    func.set_return_type(int());
    Ok(func)
}

#[test]
fn test_post_increment_only_for_unit_steps() -> Result<()> {
    let settings = DecompilerSettings::default();

    let tree = Decompiler::new(&settings).decompile(saved_update("Next", 1)?, None)?;
    assert_eq!(
        tree.to_text(),
        "static int Next() {\n    int t;\n    int v;\n    t = v++;\n    return t;\n}\n"
    );

    let tree = Decompiler::new(&settings).decompile(saved_update("Skip", 5)?, None)?;
    assert_eq!(
        tree.to_text(),
        "static int Skip() {\n    int t;\n    int v;\n    t = v;\n    v = t + 5;\n    return t;\n}\n"
    );
    Ok(())
}

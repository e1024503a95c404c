use yay::{at, AsmError, Call, CpuSpec, Operand, Program, Register};

fn program() -> Program {
    Program::new(CpuSpec::load_named("AT89S8253").expect("bundled catalog loads"))
}

fn r(n: u8) -> Operand {
    Operand::Register(Register::new(n, n < 2))
}

fn direct(addr: u8) -> Operand {
    Operand::Byte(yay::Byte::new(addr))
}

/// S1. `nop()` -> `0x00`.
#[test]
fn nop_emits_single_zero_byte() {
    let mut p = program();
    p.emit("nop", Call::Positional(&[])).unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x00]);
}

/// S2. `add(R3)` then `add(Byte(42))` -> `0x2B, 0x25, 0x2A`.
#[test]
fn add_dispatches_register_then_direct_forms() {
    let mut p = program();
    p.emit("add", Call::Positional(&[r(3)])).unwrap();
    p.emit("add", Call::Positional(&[direct(42)])).unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x2B, 0x25, 0x2A]);
}

/// S3. `acall(1234)` -> `0x91, 0xD2`.
#[test]
fn acall_encodes_addr11_into_opcode_top_bits() {
    let mut p = program();
    p.emit("acall", Call::Positional(&[Operand::Addr16(1234)])).unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x91, 0xD2]);
}

/// S4. `Label("L"); sjmp("L")` -> `0x80, 0xFE` (relative target = L - (pos+2) = -2).
#[test]
fn sjmp_to_its_own_label_is_minus_two() {
    let mut p = program();
    p.add_label("here").unwrap();
    p.emit("sjmp", Call::Positional(&[Operand::Label("here".to_owned())])).unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x80, 0xFE]);
}

/// S5. `ajmp(3000)` from byte 0 -> RangeError (cross-page target).
#[test]
fn ajmp_to_another_2kib_page_is_range_error() {
    let mut p = program();
    p.emit("ajmp", Call::Positional(&[Operand::Addr16(3000)])).unwrap();
    let err = p.assemble().unwrap_err();
    assert!(matches!(err, AsmError::Range { .. }));
}

/// S6. A sub called once is emitted after `main`'s body, body ends in `RET`.
#[test]
fn sub_with_one_caller_is_emitted_with_trailing_ret() {
    let mut p = program();
    p.define_sub("foo", |p| p.emit("inc", Call::Positional(&[])));
    p.emit("nop", Call::Positional(&[])).unwrap();
    p.call_sub("foo", "lcall").unwrap();
    p.emit("nop", Call::Positional(&[])).unwrap();
    p.assemble().unwrap();
    let bytes = p.to_bytes().unwrap();
    // nop, lcall <hh><ll>, nop, [sub: inc, ret]
    assert_eq!(bytes[0], 0x00);
    assert_eq!(bytes[1], 0x12);
    assert_eq!(bytes[4], 0x00);
    let foo_addr = u16::from_be_bytes([bytes[2], bytes[3]]);
    assert_eq!(foo_addr as usize, 5);
    assert_eq!(&bytes[5..], &[0x04, 0x22]);
}

/// An uncalled sub contributes nothing to the output.
#[test]
fn uncalled_sub_emits_no_bytes() {
    let mut p = program();
    p.define_sub("unused", |p| p.emit("nop", Call::Positional(&[])));
    p.emit("nop", Call::Positional(&[])).unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x00]);
}

/// S7. `inc()`, `inc(R7)`, `inc(Byte(42))`, `inc(@R0)`, `inc(DPTR)`.
#[test]
fn inc_forms_match_reference_encoding() {
    let mut p = program();
    p.emit("inc", Call::Positional(&[])).unwrap();
    p.emit("inc", Call::Positional(&[r(7)])).unwrap();
    p.emit("inc", Call::Positional(&[direct(42)])).unwrap();
    p.emit("inc", Call::Positional(&[at(r(0)).unwrap()])).unwrap();
    p.emit("inc", Call::Positional(&[Operand::Dptr])).unwrap();
    p.assemble().unwrap();
    assert_eq!(
        p.to_bytes().unwrap(),
        &[0x04, 0x0F, 0x05, 0x2A, 0x06, 0xA3]
    );
}

/// S8. `Program::relocate(0x8000)` with body `inc()` -> 0x8000 zero bytes then `0x04`.
#[test]
fn relocate_zero_pads_before_the_program_body() {
    let mut p = program();
    p.relocate(0x8000).unwrap();
    p.emit("inc", Call::Positional(&[])).unwrap();
    p.assemble().unwrap();
    let bytes = p.to_bytes().unwrap();
    assert_eq!(bytes.len(), 0x8000 + 1);
    assert!(bytes[..0x8000].iter().all(|&b| b == 0));
    assert_eq!(bytes[0x8000], 0x04);
}

/// Labels are recorded at the position they were declared, contributing no
/// bytes themselves (`examples/original_source/tests/test_label.py`).
#[test]
fn labels_contribute_no_bytes_and_sit_between_instructions() {
    let mut p = program();
    p.add_label("before_nop").unwrap();
    p.emit("nop", Call::Positional(&[])).unwrap();
    p.add_label("after_nop").unwrap();
    p.assemble().unwrap();
    assert_eq!(p.to_bytes().unwrap(), &[0x00]);
    assert_eq!(p.offsetof("before_nop").unwrap(), 1);
    assert_eq!(p.offsetof("after_nop").unwrap(), 0);
}

/// Referencing a label that is never declared is a pass-2 LabelError.
#[test]
fn undeclared_label_reference_is_label_error() {
    let mut p = program();
    p.emit("sjmp", Call::Positional(&[Operand::Label("nowhere".to_owned())])).unwrap();
    let err = p.assemble().unwrap_err();
    assert!(matches!(err, AsmError::Label(_)));
}

/// `at(R2)` is rejected: only R0/R1 can be used indirectly on MCS-51.
#[test]
fn at_on_a_register_that_cannot_go_indirect_is_register_error() {
    let err = at(r(2)).unwrap_err();
    assert!(matches!(err, AsmError::Register(_)));
}

/// Assembling the same program definition twice yields byte-identical output.
#[test]
fn assembling_equivalent_programs_is_deterministic() {
    let build = || {
        let mut p = program();
        p.emit("add", Call::Positional(&[r(3)])).unwrap();
        p.emit("mov", Call::Positional(&[r(0), Operand::Immediate(5)])).unwrap();
        p.assemble().unwrap();
        p.to_bytes().unwrap().to_vec()
    };
    assert_eq!(build(), build());
}

/// `with_loop`/`infinitely` macros expand into real instructions that
/// assemble cleanly end to end (`examples/original_source/tests/test_macros.py`).
#[test]
fn blink_style_macro_program_assembles() {
    let mut p = program();
    let bit = p.operand("P1").unwrap();
    let bit = match bit {
        Operand::Sfr(sfr) => Operand::Bit(sfr.bit(0).unwrap()),
        _ => unreachable!(),
    };
    let r7 = p.operand("R7").unwrap();
    p.infinitely(|p| {
        p.emit("cpl", Call::Positional(std::slice::from_ref(&bit)))?;
        p.with_loop(r7.clone(), Some(Operand::Immediate(3)), |_| Ok(()))
    })
    .unwrap();
    p.assemble().unwrap();
    assert!(!p.to_bytes().unwrap().is_empty());
}

//! Switch structuring and indirect-transfer recovery scenarios.

mod common;

use common::{decompile_to_c, MockDecoder, MockImage};
use relift::ir::{
    Assign, BranchStatement, CaseStatement, GotoStatement, Operator, ReturnStatement, SwitchInfo,
    SwitchKind,
};
use relift::prelude::*;

fn assign(lhs: SharedExp, rhs: SharedExp) -> StatementKind {
    StatementKind::Assign(Assign::new(lhs, rhs))
}

fn ret() -> StatementKind {
    StatementKind::Return(ReturnStatement::new())
}

fn goto(dest: u64) -> StatementKind {
    StatementKind::Goto(GotoStatement {
        dest: Exp::addr(Address(dest)),
    })
}

/// A three-case switch with a default, already recovered: emits
/// `switch(...)` with the cases in index order, breaks, and the default.
#[test]
fn test_three_case_switch_with_default() {
    let info = SwitchInfo {
        exp: Exp::reg(24),
        kind: SwitchKind::Uniform,
        table_addr: Address(0x2000),
        lower: 0,
        upper: 2,
        num_cases: 3,
        targets: vec![Address(0x1004), Address(0x1008), Address(0x100c)],
        default: Some(Address(0x1010)),
    };

    let mut decoder = MockDecoder::new();
    decoder
        .insn(
            0x1000,
            vec![StatementKind::Case(CaseStatement {
                dest: Exp::mem_of(Exp::binary(
                    Operator::Plus,
                    Exp::binary(Operator::Mult, Exp::reg(24), Exp::int(4)),
                    Exp::int(0x2000),
                )),
                info: Some(info),
            })],
        )
        .insn(0x1004, vec![assign(Exp::reg(25), Exp::int(10)), goto(0x1014)])
        .insn(0x1008, vec![assign(Exp::reg(25), Exp::int(20)), goto(0x1014)])
        .insn(0x100c, vec![assign(Exp::reg(25), Exp::int(30)), goto(0x1014)])
        .insn(0x1010, vec![assign(Exp::reg(25), Exp::int(99))])
        .insn(0x1014, vec![ret()]);

    let (text, _) = decompile_to_c(decoder, MockImage::new(), &[("proc", 0x1000)]);

    assert!(text.contains("switch(r24) {"), "got:\n{text}");
    for case in ["case 0:", "case 1:", "case 2:", "default:"] {
        assert!(text.contains(case), "missing {case}:\n{text}");
    }
    assert!(text.contains("break;"), "got:\n{text}");

    // Cases come out in index order
    let p0 = text.find("case 0:").unwrap();
    let p1 = text.find("case 1:").unwrap();
    let p2 = text.find("case 2:").unwrap();
    let pd = text.find("default:").unwrap();
    assert!(p0 < p1 && p1 < p2 && p2 < pd, "got:\n{text}");

    // Each arm body landed under its case
    assert!(text.contains("r25 = 10;"), "got:\n{text}");
    assert!(text.contains("r25 = 99;"), "got:\n{text}");
}

/// An indirect jump through a bounded table is recovered mid-analysis, the
/// procedure restarts, and the second pass reaches `Final` with a `switch`
/// in the output.
#[test]
fn test_indirect_jump_recovery_with_restart() {
    let mut image = MockImage::new();
    // Jump table at 0x2000: three code targets
    image.word(0x2000, 0x1010).word(0x2004, 0x1018).word(0x2008, 0x1020);

    let mut decoder = MockDecoder::new();
    decoder
        // Guard: default when r24 >u 2
        .insn(
            0x1000,
            vec![StatementKind::Branch(BranchStatement {
                cond: Some(Exp::binary(Operator::GtrUns, Exp::reg(24), Exp::int(2))),
                dest: Address(0x1030),
            })],
        )
        // Computed jump through the table
        .insn(
            0x1004,
            vec![StatementKind::Goto(GotoStatement {
                dest: Exp::mem_of(Exp::binary(
                    Operator::Plus,
                    Exp::binary(Operator::Mult, Exp::reg(24), Exp::int(4)),
                    Exp::int(0x2000),
                )),
            })],
        )
        // Case arms, discovered only through the table
        .insn(0x1010, vec![assign(Exp::reg(25), Exp::int(1)), goto(0x1028)])
        .insn(0x1018, vec![assign(Exp::reg(25), Exp::int(2)), goto(0x1028)])
        .insn(0x1020, vec![assign(Exp::reg(25), Exp::int(3)), goto(0x1028)])
        .insn(0x1028, vec![ret()])
        // Default arm
        .insn(0x1030, vec![assign(Exp::reg(25), Exp::int(99)), goto(0x1028)]);

    let (text, program) = decompile_to_c(decoder, image, &[("proc", 0x1000)]);

    // The restart converged and the procedure finished
    let proc = program.user_proc(ProcId(0)).unwrap();
    assert_eq!(proc.status, ProcStatus::CodeGenerated);

    // The recovered dispatch prints as a switch over the index
    assert!(text.contains("switch(r24) {"), "got:\n{text}");
    for case in ["case 0:", "case 1:", "case 2:"] {
        assert!(text.contains(case), "missing {case}:\n{text}");
    }

    // The arm bodies were decoded by the restart
    assert!(text.contains("r25 = 1;"), "got:\n{text}");
    assert!(text.contains("r25 = 3;"), "got:\n{text}");
    assert!(text.contains("r25 = 99;"), "got:\n{text}");
}

/// An unrecognized computed jump stays a computed jump and the emitter
/// prints a goto comment instead of failing.
#[test]
fn test_unrecognized_indirect_jump() {
    let mut decoder = MockDecoder::new();
    decoder
        // No bounding guard anywhere: the table idiom cannot be proven
        .insn(
            0x1000,
            vec![StatementKind::Goto(GotoStatement {
                dest: Exp::mem_of(Exp::reg(24)),
            })],
        )
        .insn(0x1004, vec![ret()]);

    let (text, program) = decompile_to_c(decoder, MockImage::new(), &[("proc", 0x1000)]);

    let proc = program.user_proc(ProcId(0)).unwrap();
    assert_eq!(proc.status, ProcStatus::CodeGenerated);
    assert!(text.contains("goto *r24"), "got:\n{text}");
}

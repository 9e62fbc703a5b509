//! Tests for Opcode encoding

use bytecode_system::format::{decode_instructions, encode_instructions};
use bytecode_system::Opcode;

#[test]
fn test_encoded_len_matches_encoding() {
    let ops = [
        Opcode::Nop,
        Opcode::LoadConst(7),
        Opcode::LoadSmall(-3),
        Opcode::LoadLocal(2),
        Opcode::Call { target: 4, argc: 2 },
        Opcode::CallIndirect(1),
        Opcode::CallIntrinsic { name: 9, argc: 0 },
        Opcode::Halt,
    ];
    for op in ops {
        let mut out = Vec::new();
        op.encode(&mut out);
        assert_eq!(out.len(), op.encoded_len(), "length mismatch for {}", op);
    }
}

#[test]
fn test_load_small_keeps_sign() {
    let bytes = encode_instructions(&[Opcode::LoadSmall(-42)]);
    assert_eq!(decode_instructions(&bytes).unwrap(), vec![Opcode::LoadSmall(-42)]);
}

#[test]
fn test_unknown_tag_rejected() {
    let err = Opcode::decode(&[0xEE]).unwrap_err();
    assert_eq!(err.offset, 0);
    assert!(err.reason.contains("0xEE"));
}

#[test]
fn test_truncated_operand_offset_is_rebased() {
    // Halt, then LoadConst with only two operand bytes
    let err = decode_instructions(&[0x67, 0x01, 0x00, 0x00]).unwrap_err();
    assert_eq!(err.offset, 2);
}

#[test]
fn test_terminators() {
    assert!(Opcode::Return.is_terminator());
    assert!(Opcode::Jump(0).is_terminator());
    assert!(!Opcode::Add.is_terminator());
}

#[test]
fn test_allocating_opcodes() {
    assert!(Opcode::MakeTuple(2).may_allocate());
    assert!(Opcode::Box.may_allocate());
    assert!(!Opcode::Pop.may_allocate());
}

#[test]
fn test_constant_operand() {
    assert_eq!(Opcode::LoadConst(3).constant_operand(), Some(3));
    assert_eq!(
        Opcode::CallIntrinsic { name: 5, argc: 1 }.constant_operand(),
        Some(5)
    );
    assert_eq!(Opcode::LoadLocal(3).constant_operand(), None);
}

#[test]
fn test_display_uses_mnemonic() {
    assert_eq!(Opcode::Call { target: 2, argc: 1 }.to_string(), "call 2 1");
    assert_eq!(Opcode::ArrayPush.to_string(), "push_elem");
}
